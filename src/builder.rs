//! AnimatorBuilder for configuring and constructing animators
//!
//! ## Table of Contents
//! - **AnimatorConfig**: Tunables, loadable from JSON
//! - **AnimatorBuilder**: Builder pattern wiring worlds, hooks and listeners

use crate::archetype::{Archetype, ArchetypeRegistry};
use crate::clock::TickClock;
use crate::error::{AnimatorError, Result};
use crate::events::{EventBus, ToggleListener};
use crate::messaging::{BoxedMessageSink, LogMessageSink};
use crate::metrics::AnimatorMetrics;
use crate::protection::{BoxedProtectionHook, ProtectionManager};
use crate::resilience::RetryConfig;
use crate::runtime::{Animator, AnimatorParts};
use crate::storage::{BoxedPersistence, BoxedStateStore, FileStore, MemoryStore, StorePersistence};
use crate::structure::{Structure, StructureStore};
use crate::types::WorldId;
use crate::world::BoxedWorld;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Animator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    /// World ticks per second
    pub tick_rate: u32,
    /// Shortest animation
    pub min_duration_secs: f64,
    /// Longest animation
    pub max_duration_secs: f64,
    /// Blocks per second used when a request names no duration
    pub default_speed: f64,
    /// Deadline for all protection hooks together
    pub access_check_timeout: Duration,
    /// Reject OPEN on open and CLOSE on closed structures
    pub reject_redundant_actions: bool,
    /// Schedule auto-close, auto-open and perpetual re-toggles
    pub auto_toggle_enabled: bool,
    /// Block count above which trajectories are evaluated in parallel
    pub parallel_threshold: usize,
    /// Retry policy for restoring blocks after an abort or failure
    pub restore_retry: RetryConfig,
    /// Enable Prometheus metrics
    pub metrics_enabled: bool,
    /// Store path for file-based persistence
    pub store_path: Option<PathBuf>,
    /// Events buffered for broadcast subscribers
    pub event_capacity: usize,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            min_duration_secs: 0.25,
            max_duration_secs: 30.0,
            default_speed: 4.0,
            access_check_timeout: Duration::from_secs(2),
            reject_redundant_actions: true,
            auto_toggle_enabled: true,
            parallel_threshold: 512,
            restore_retry: RetryConfig::default(),
            metrics_enabled: true,
            store_path: None,
            event_capacity: 256,
        }
    }
}

impl AnimatorConfig {
    /// Create a default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        info!(path = %path.display(), "Animator config loaded");
        Ok(config)
    }

    /// Parse and validate JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the tick rate
    pub fn tick_rate(mut self, rate: u32) -> Self {
        self.tick_rate = rate;
        self
    }

    /// Set the duration bounds
    pub fn duration_bounds(mut self, min_secs: f64, max_secs: f64) -> Self {
        self.min_duration_secs = min_secs;
        self.max_duration_secs = max_secs;
        self
    }

    /// Set the default speed
    pub fn default_speed(mut self, blocks_per_sec: f64) -> Self {
        self.default_speed = blocks_per_sec;
        self
    }

    /// Set the protection check deadline
    pub fn access_check_timeout(mut self, timeout: Duration) -> Self {
        self.access_check_timeout = timeout;
        self
    }

    /// Reject or animate redundant OPEN/CLOSE requests
    pub fn reject_redundant_actions(mut self, reject: bool) -> Self {
        self.reject_redundant_actions = reject;
        self
    }

    /// Enable or disable auto-toggles
    pub fn auto_toggle(mut self, enabled: bool) -> Self {
        self.auto_toggle_enabled = enabled;
        self
    }

    /// Set the parallel evaluation threshold
    pub fn parallel_threshold(mut self, blocks: usize) -> Self {
        self.parallel_threshold = blocks;
        self
    }

    /// Set the restore retry policy
    pub fn restore_retry(mut self, retry: RetryConfig) -> Self {
        self.restore_retry = retry;
        self
    }

    /// Enable or disable metrics
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Persist structures to a JSON file
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Check invariants between fields
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 {
            return Err(AnimatorError::config("tick_rate must be positive"));
        }
        if !(self.min_duration_secs > 0.0) {
            return Err(AnimatorError::config("min_duration_secs must be positive"));
        }
        if !(self.max_duration_secs >= self.min_duration_secs) {
            return Err(AnimatorError::config(
                "max_duration_secs must not be below min_duration_secs",
            ));
        }
        if !(self.default_speed > 0.0) || !self.default_speed.is_finite() {
            return Err(AnimatorError::config("default_speed must be positive"));
        }
        if self.access_check_timeout.is_zero() {
            return Err(AnimatorError::config("access_check_timeout must be positive"));
        }
        Ok(())
    }
}

/// Builder for constructing animators
pub struct AnimatorBuilder {
    config: AnimatorConfig,
    worlds: Vec<(WorldId, BoxedWorld)>,
    archetypes: ArchetypeRegistry,
    protection: ProtectionManager,
    persistence: Option<BoxedPersistence>,
    store: Option<BoxedStateStore>,
    listeners: Vec<Arc<dyn ToggleListener>>,
    message_sink: Option<BoxedMessageSink>,
    clock: Option<TickClock>,
    structures: Vec<Structure>,
}

impl AnimatorBuilder {
    /// Create a builder with default configuration and the built-in archetypes
    pub fn new() -> Self {
        Self {
            config: AnimatorConfig::default(),
            worlds: Vec::new(),
            archetypes: ArchetypeRegistry::with_defaults(),
            protection: ProtectionManager::new(),
            persistence: None,
            store: None,
            listeners: Vec::new(),
            message_sink: None,
            clock: None,
            structures: Vec::new(),
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: AnimatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a world
    pub fn with_world(mut self, id: impl Into<WorldId>, world: BoxedWorld) -> Self {
        self.worlds.push((id.into(), world));
        self
    }

    /// Register an additional archetype (replaces one with the same kind)
    pub fn with_archetype<A: Archetype + 'static>(mut self, archetype: A) -> Self {
        self.archetypes.register(archetype);
        self
    }

    /// Register a protection hook
    pub fn with_protection_hook(mut self, hook: BoxedProtectionHook) -> Self {
        self.protection.add_hook(hook);
        self
    }

    /// Use a custom persistence boundary
    pub fn with_persistence(mut self, persistence: BoxedPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set a custom state store
    pub fn with_store(mut self, store: BoxedStateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a toggle listener
    pub fn with_listener(mut self, listener: Arc<dyn ToggleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Set the default sink for rejection messages
    pub fn with_message_sink(mut self, sink: BoxedMessageSink) -> Self {
        self.message_sink = Some(sink);
        self
    }

    /// Share an existing tick clock
    pub fn with_clock(mut self, clock: TickClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register a structure
    pub fn with_structure(mut self, structure: Structure) -> Self {
        self.structures.push(structure);
        self
    }

    /// Build the animator
    pub fn build(self) -> Result<Animator> {
        self.config.validate()?;

        let clock = match self.clock {
            Some(clock) => {
                if clock.tick_rate() != self.config.tick_rate {
                    warn!(
                        clock = clock.tick_rate(),
                        config = self.config.tick_rate,
                        "Shared clock tick rate differs from config"
                    );
                }
                clock
            }
            None => TickClock::new(self.config.tick_rate),
        };

        // Create or use provided state store
        let store: BoxedStateStore = match self.store {
            Some(s) => s,
            None => match &self.config.store_path {
                Some(path) => Arc::new(FileStore::open(path)?) as BoxedStateStore,
                None => Arc::new(MemoryStore::new()) as BoxedStateStore,
            },
        };
        let loader = StorePersistence::new(store);
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(loader.clone()) as BoxedPersistence);

        let metrics = if self.config.metrics_enabled {
            Some(Arc::new(AnimatorMetrics::new()?))
        } else {
            None
        };

        let events = EventBus::new(self.config.event_capacity);
        for listener in self.listeners {
            events.add_listener(listener);
        }

        let structures = StructureStore::new();
        for structure in self.structures {
            structures.insert(structure);
        }

        info!(
            tick_rate = clock.tick_rate(),
            worlds = self.worlds.len(),
            archetypes = ?self.archetypes.kinds(),
            protection_hooks = self.protection.len(),
            "Building animator"
        );

        Ok(Animator::from_parts(AnimatorParts {
            config: self.config,
            worlds: self.worlds,
            archetypes: self.archetypes,
            protection: self.protection,
            persistence,
            loader,
            events,
            message_sink: self
                .message_sink
                .unwrap_or_else(|| Arc::new(LogMessageSink) as BoxedMessageSink),
            clock,
            metrics,
            structures,
        }))
    }
}

impl Default for AnimatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{GeometryError, TargetGeometry};
    use crate::geometry::Cuboid;
    use crate::structure::StructureSnapshot;
    use crate::types::{ActionType, ActorId};
    use crate::world::MemoryWorld;
    use glam::IVec3;

    #[test]
    fn test_builder_default() {
        let animator = AnimatorBuilder::new().build();
        assert!(animator.is_ok());
    }

    #[test]
    fn test_builder_with_world_and_structure() {
        let structure = Structure::new(
            "gate",
            "portcullis",
            "overworld",
            Cuboid::new(IVec3::ZERO, IVec3::new(2, 2, 0)),
            ActorId::new(),
        );
        let id = structure.id;
        let animator = AnimatorBuilder::new()
            .with_world("overworld", Arc::new(MemoryWorld::new()))
            .with_structure(structure)
            .with_config(AnimatorConfig::default().metrics(false))
            .build()
            .unwrap();
        assert!(animator.structure(id).is_some());
        assert!(animator.metrics().is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = AnimatorBuilder::new()
            .with_config(AnimatorConfig::default().duration_bounds(5.0, 1.0))
            .build();
        assert!(matches!(result, Err(AnimatorError::Config(_))));
    }

    #[test]
    fn test_builder_with_custom_archetype() {
        struct Elevator;

        impl Archetype for Elevator {
            fn kind(&self) -> &str {
                "elevator"
            }

            fn compute_target(
                &self,
                snapshot: &StructureSnapshot,
                _action: ActionType,
            ) -> std::result::Result<TargetGeometry, GeometryError> {
                Ok(TargetGeometry::stationary(snapshot, !snapshot.is_open()))
            }
        }

        let animator = AnimatorBuilder::new().with_archetype(Elevator).build().unwrap();
        assert!(animator.archetype_kinds().contains(&"elevator".to_string()));
    }

    #[test]
    fn test_config_json_defaults() {
        let config = AnimatorConfig::from_json_str(r#"{"tick_rate": 10, "auto_toggle_enabled": false}"#)
            .unwrap();
        assert_eq!(config.tick_rate, 10);
        assert!(!config.auto_toggle_enabled);
        assert_eq!(config.max_duration_secs, 30.0);
        assert_eq!(config.restore_retry, RetryConfig::default());
    }

    #[test]
    fn test_config_json_validation() {
        assert!(AnimatorConfig::from_json_str(r#"{"tick_rate": 0}"#).is_err());
        assert!(AnimatorConfig::from_json_str(r#"{"default_speed": -1.0}"#).is_err());
        assert!(AnimatorConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("animator.json");
        let config = AnimatorConfig::default()
            .tick_rate(40)
            .reject_redundant_actions(false)
            .access_check_timeout(Duration::from_millis(750));
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AnimatorConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(matches!(
            AnimatorConfig::from_json_file(dir.path().join("missing.json")),
            Err(AnimatorError::Io(_))
        ));
    }
}
