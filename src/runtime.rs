//! Animator runtime and toggle pipeline
//!
//! ## Table of Contents
//! - **Animator**: Cloneable front door for toggles, aborts and structure management
//! - **AnimatorInner**: Shared state; runs the pipeline and reacts to finished animations
//!
//! A toggle request passes these checks in order, and the first failing check
//! decides the rejection:
//!
//! 0. the structure exists
//! 1. the requested action applies to the structure
//! 2. the actor holds the toggle permission
//! 3. the structure is not locked
//! 4. nothing animates the structure, and its world is available
//! 5. the archetype computes a target and a duration
//! 6. protection hooks allow the affected region
//! 7. no listener cancels the toggle
//! 8. the registry reservation is won
//!
//! Nothing is reserved before step 8, so a rejected request leaves no state behind.

use crate::archetype::{Archetype, ArchetypeRegistry, TargetGeometry};
use crate::autotoggle::{AutoToggleScheduler, ToggleSubmitter};
use crate::builder::AnimatorConfig;
use crate::clock::TickClock;
use crate::error::{Result, ToggleRejection};
use crate::events::{EventBus, PrepareOutcome, ToggleEvent, ToggleEventData, ToggleListener};
use crate::geometry::Cuboid;
use crate::messaging::BoxedMessageSink;
use crate::metrics::AnimatorMetrics;
use crate::mover::{
    AnimationHandle, AnimationJob, AnimationOutcome, BlockMover, CompletionHook, MoverContext,
};
use crate::protection::ProtectionManager;
use crate::registry::AnimationRegistry;
use crate::request::ToggleRequest;
use crate::resilience::RetryPolicy;
use crate::storage::{BoxedPersistence, StorePersistence};
use crate::structure::{Structure, StructureSnapshot, StructureStore};
use crate::types::{
    ActionType, Actor, PermissionLevel, StructureAttribute, StructureId, WorldId,
};
use crate::world::BoxedWorld;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Components assembled by [`AnimatorBuilder`](crate::builder::AnimatorBuilder)
pub(crate) struct AnimatorParts {
    pub config: AnimatorConfig,
    pub worlds: Vec<(WorldId, BoxedWorld)>,
    pub archetypes: ArchetypeRegistry,
    pub protection: ProtectionManager,
    pub persistence: BoxedPersistence,
    pub loader: StorePersistence,
    pub events: EventBus,
    pub message_sink: BoxedMessageSink,
    pub clock: TickClock,
    pub metrics: Option<Arc<AnimatorMetrics>>,
    pub structures: StructureStore,
}

/// Structure animator
///
/// Cheap to clone; clones share every structure, reservation and pending
/// auto-toggle.
#[derive(Clone)]
pub struct Animator {
    inner: Arc<AnimatorInner>,
}

struct AnimatorInner {
    config: AnimatorConfig,
    worlds: DashMap<WorldId, BoxedWorld>,
    archetypes: ArchetypeRegistry,
    protection: ProtectionManager,
    persistence: BoxedPersistence,
    loader: StorePersistence,
    events: Arc<EventBus>,
    message_sink: BoxedMessageSink,
    clock: TickClock,
    metrics: Option<Arc<AnimatorMetrics>>,
    structures: Arc<StructureStore>,
    registry: Arc<AnimationRegistry>,
    scheduler: AutoToggleScheduler,
    restore: RetryPolicy,
    self_ref: Weak<AnimatorInner>,
}

impl Animator {
    /// Assemble an animator (use AnimatorBuilder instead)
    pub(crate) fn from_parts(parts: AnimatorParts) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<AnimatorInner>| {
            let submitter: Weak<dyn ToggleSubmitter> = weak.clone();
            let scheduler =
                AutoToggleScheduler::new(submitter, parts.clock.clone(), parts.metrics.clone());
            AnimatorInner {
                restore: RetryPolicy::new(parts.config.restore_retry.clone()),
                config: parts.config,
                worlds: parts.worlds.into_iter().collect(),
                archetypes: parts.archetypes,
                protection: parts.protection,
                persistence: parts.persistence,
                loader: parts.loader,
                events: Arc::new(parts.events),
                message_sink: parts.message_sink,
                clock: parts.clock,
                metrics: parts.metrics,
                structures: Arc::new(parts.structures),
                registry: Arc::new(AnimationRegistry::new()),
                scheduler,
                self_ref: weak.clone(),
            }
        });
        Self { inner }
    }

    /// Run a request through the pipeline and start the animation
    pub async fn submit(
        &self,
        request: ToggleRequest,
    ) -> std::result::Result<AnimationHandle, ToggleRejection> {
        self.inner.submit(request).await
    }

    /// Submit a request and wait for the animation to end
    pub async fn toggle(&self, request: ToggleRequest) -> AnimationOutcome {
        match self.submit(request).await {
            Ok(handle) => handle.wait().await,
            Err(rejection) => AnimationOutcome::Rejected(rejection),
        }
    }

    /// Abort the running animation of a structure. Does not wait for the rollback.
    pub fn abort(&self, structure_id: StructureId) -> bool {
        let aborted = self.inner.registry.abort_if_present(structure_id);
        if aborted {
            info!(structure = %structure_id, "Animation abort requested");
        }
        aborted
    }

    /// Abort every animation touching a region that is being unloaded
    pub fn on_region_unavailable(&self, world: &WorldId, region: &Cuboid) -> usize {
        let aborted = self.inner.registry.abort_intersecting(world, region);
        if aborted > 0 {
            info!(world = %world, region = %region, aborted, "Region unavailable, animations aborted");
        }
        aborted
    }

    /// Register or replace a world
    pub fn register_world(&self, id: impl Into<WorldId>, world: BoxedWorld) {
        let id = id.into();
        debug!(world = %id, "World registered");
        self.inner.worlds.insert(id, world);
    }

    /// Forget a world. Running animations in it are aborted.
    pub fn unregister_world(&self, id: &WorldId) -> bool {
        let removed = self.inner.worlds.remove(id).is_some();
        if removed {
            for structure_id in self.inner.registry.active() {
                if self
                    .inner
                    .registry
                    .entry(structure_id)
                    .is_some_and(|e| &e.world == id)
                {
                    self.inner.registry.abort_if_present(structure_id);
                }
            }
            info!(world = %id, "World unregistered");
        }
        removed
    }

    /// Register a structure
    pub fn add_structure(&self, structure: Structure) -> StructureId {
        self.inner.structures.insert(structure)
    }

    /// Copy of a structure's live record
    pub fn structure(&self, structure_id: StructureId) -> Option<Structure> {
        self.inner.structures.get(structure_id)
    }

    /// Snapshot of a structure
    pub fn snapshot(&self, structure_id: StructureId) -> Option<Arc<StructureSnapshot>> {
        self.inner.structures.snapshot(structure_id)
    }

    /// Number of registered structures
    pub fn structure_count(&self) -> usize {
        self.inner.structures.len()
    }

    /// Delete a structure.
    ///
    /// A running animation is aborted and rolls back on its own; the pending
    /// auto-toggle is cancelled.
    pub async fn delete_structure(
        &self,
        structure_id: StructureId,
        actor: Option<&Actor>,
    ) -> std::result::Result<Structure, ToggleRejection> {
        let snapshot = self.inner.lookup(structure_id)?;
        authorize(&snapshot, actor, StructureAttribute::Delete.required_level())?;

        self.inner.registry.abort_if_present(structure_id);
        self.inner.scheduler.cancel(structure_id);
        let removed = self
            .inner
            .structures
            .remove(structure_id)
            .ok_or_else(|| ToggleRejection::StructureNotFound(structure_id.to_string()))?;

        if let Err(e) = self.inner.persistence.delete_structure_state(&snapshot).await {
            error!(structure = %structure_id, error = %e, "Failed to delete persisted structure");
        }
        info!(structure = %structure_id, name = %removed.name, "Structure deleted");
        Ok(removed)
    }

    /// Lock or unlock a structure
    pub async fn set_locked(
        &self,
        structure_id: StructureId,
        locked: bool,
        actor: Option<&Actor>,
    ) -> std::result::Result<(), ToggleRejection> {
        let snapshot = self.inner.lookup(structure_id)?;
        authorize(&snapshot, actor, StructureAttribute::Lock.required_level())?;

        if !self.inner.structures.set_locked(structure_id, locked) {
            return Err(ToggleRejection::StructureNotFound(structure_id.to_string()));
        }
        if let Some(updated) = self.inner.structures.snapshot(structure_id) {
            if let Err(e) = self.inner.persistence.save_structure_state(&updated).await {
                error!(structure = %structure_id, error = %e, "Failed to persist lock state");
            }
        }
        info!(structure = %structure_id, locked, "Structure lock changed");
        Ok(())
    }

    /// Load saved structures from the state store. Returns how many were loaded.
    pub async fn load_structures(&self) -> Result<usize> {
        let structures = self.inner.loader.load_all().await?;
        let count = structures.len();
        for structure in structures {
            self.inner.structures.insert(structure);
        }
        info!(count, "Structures loaded");
        Ok(count)
    }

    /// Whether a structure has an in-flight animation
    pub fn is_animating(&self, structure_id: StructureId) -> bool {
        self.inner.registry.is_reserved(structure_id)
    }

    /// Structures with an in-flight animation
    pub fn active_animations(&self) -> Vec<StructureId> {
        self.inner.registry.active()
    }

    /// Subscribe to toggle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ToggleEvent> {
        self.inner.events.subscribe()
    }

    /// Register a toggle listener
    pub fn add_listener(&self, listener: Arc<dyn ToggleListener>) {
        self.inner.events.add_listener(listener);
    }

    /// Shared tick clock
    pub fn clock(&self) -> &TickClock {
        &self.inner.clock
    }

    /// Drive the tick clock from a timer until the returned task is aborted
    pub fn start_clock(&self) -> JoinHandle<()> {
        self.inner.clock.start()
    }

    /// Get metrics instance
    pub fn metrics(&self) -> Option<&Arc<AnimatorMetrics>> {
        self.inner.metrics.as_ref()
    }

    /// Auto-toggle scheduler
    pub fn scheduler(&self) -> &AutoToggleScheduler {
        &self.inner.scheduler
    }

    /// Active configuration
    pub fn config(&self) -> &AnimatorConfig {
        &self.inner.config
    }

    /// Registered archetype kinds
    pub fn archetype_kinds(&self) -> Vec<String> {
        self.inner.archetypes.kinds()
    }
}

impl std::fmt::Debug for Animator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animator")
            .field("structures", &self.inner.structures.len())
            .field("worlds", &self.inner.worlds.len())
            .field("active", &self.inner.registry.len())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl AnimatorInner {
    fn lookup(
        &self,
        structure_id: StructureId,
    ) -> std::result::Result<Arc<StructureSnapshot>, ToggleRejection> {
        self.structures
            .snapshot(structure_id)
            .ok_or_else(|| ToggleRejection::StructureNotFound(structure_id.to_string()))
    }

    async fn submit(
        &self,
        request: ToggleRequest,
    ) -> std::result::Result<AnimationHandle, ToggleRejection> {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(request.cause().as_str());
        }
        match self.admit(&request).await {
            Ok(handle) => Ok(handle),
            Err(rejection) => {
                self.reject(&request, &rejection);
                Err(rejection)
            }
        }
    }

    async fn admit(
        &self,
        request: &ToggleRequest,
    ) -> std::result::Result<AnimationHandle, ToggleRejection> {
        let structure_id = request.structure_id();
        let snapshot = self.lookup(structure_id)?;
        let archetype = self.archetypes.get(snapshot.kind());

        let has_open_status = archetype.as_ref().map_or(true, |a| a.has_open_status());
        let (action, redundant) = resolve_action(
            &snapshot,
            request.action(),
            has_open_status,
            self.config.reject_redundant_actions,
        )?;

        if !request.bypass_permission() {
            if let Some(actor) = request.actor() {
                authorize(&snapshot, Some(actor), snapshot.toggle_permission())?;
            }
        }

        if snapshot.is_locked() && !request.bypass_lock() {
            return Err(ToggleRejection::StructureLocked);
        }

        if self.registry.is_reserved(structure_id) {
            return Err(ToggleRejection::AnimationInProgress);
        }
        let world = self
            .worlds
            .get(snapshot.world())
            .map(|w| w.value().clone())
            .ok_or_else(|| ToggleRejection::WorldUnavailable(snapshot.world().to_string()))?;

        let archetype = archetype?;
        let geometry = if redundant {
            TargetGeometry::stationary(&snapshot, snapshot.is_open())
        } else {
            archetype.compute_target(&snapshot, action)?
        };
        let region = geometry.affected_region();
        if !world.is_region_loaded(&region) {
            return Err(ToggleRejection::WorldUnavailable(snapshot.world().to_string()));
        }
        let (duration, duration_ticks) = self.resolve_duration(request, archetype.as_ref(), &geometry);

        // Causes without an actor are checked on behalf of the creator.
        let responsible = request
            .actor()
            .map(|a| a.id)
            .or_else(|| snapshot.prime_owner());
        if let Some(actor_id) = responsible {
            let started = tokio::time::Instant::now();
            let checked = self
                .protection
                .check(actor_id, snapshot.world(), &region, self.config.access_check_timeout)
                .await;
            if let Some(metrics) = &self.metrics {
                metrics.record_protection_check(started.elapsed().as_secs_f64());
            }
            checked?;
        }

        let event = ToggleEventData {
            snapshot: snapshot.clone(),
            cause: request.cause(),
            action,
            responsible: request.actor().cloned(),
            target: geometry.new_cuboid,
        };
        if let PrepareOutcome::Cancel(reason) = self.events.prepare(&event) {
            return Err(ToggleRejection::CancelledByExtension(reason));
        }

        let reservation = self
            .registry
            .try_reserve(structure_id, snapshot.world().clone(), region)
            .ok_or(ToggleRejection::AnimationInProgress)?;
        if !request.cause().is_automatic() {
            self.scheduler.cancel(structure_id);
        }

        let abort = reservation.abort_signal().clone();
        let job = AnimationJob {
            snapshot,
            archetype,
            geometry,
            duration,
            duration_ticks,
            skip_animation: request.skip_animation(),
            event,
        };
        let (mover, progress) = BlockMover::new(job, self.mover_context(world), reservation);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(mover.run().await);
        });

        info!(
            structure = %structure_id,
            action = %action,
            cause = %request.cause(),
            ticks = duration_ticks,
            "Toggle admitted"
        );
        Ok(AnimationHandle::new(structure_id, abort, progress, rx))
    }

    fn mover_context(&self, world: BoxedWorld) -> MoverContext {
        let on_completed: Weak<dyn CompletionHook> = self.self_ref.clone();
        MoverContext {
            world,
            store: self.structures.clone(),
            registry: self.registry.clone(),
            persistence: Some(self.persistence.clone()),
            events: self.events.clone(),
            clock: self.clock.clone(),
            metrics: self.metrics.clone(),
            restore: self.restore.clone(),
            parallel_threshold: self.config.parallel_threshold,
            on_completed: Some(on_completed),
        }
    }

    /// Requested or nominal length, clamped, and at least one tick
    fn resolve_duration(
        &self,
        request: &ToggleRequest,
        archetype: &dyn Archetype,
        geometry: &TargetGeometry,
    ) -> (Duration, u64) {
        let min = self.config.min_duration_secs;
        let max = self.config.max_duration_secs;
        let secs = request
            .duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or_else(|| archetype.nominal_duration(geometry, self.config.default_speed));
        let secs = if secs.is_finite() { secs } else { min };
        let secs = secs.clamp(min, max);
        let ticks = self.clock.secs_to_ticks(secs).max(1);
        (Duration::from_secs_f64(secs), ticks)
    }

    /// Log, count and tell the actor. Automatic requests have no actor and stay silent.
    fn reject(&self, request: &ToggleRequest, rejection: &ToggleRejection) {
        debug!(
            structure = %request.structure_id(),
            action = %request.action(),
            cause = %request.cause(),
            reason = %rejection,
            "Toggle rejected"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(rejection.label());
        }
        if let Some(actor) = request.actor() {
            let sink = request.message_sink().unwrap_or(&self.message_sink);
            sink.send_message(actor, rejection.message_key(), &rejection.message_args());
        }
    }

    /// Schedule the next automatic toggle of a structure that just completed
    fn after_animation(&self, snapshot: &StructureSnapshot) {
        if !self.config.auto_toggle_enabled {
            return;
        }
        let structure_id = snapshot.id();
        if snapshot.is_perpetual() {
            self.scheduler.schedule_perpetual(structure_id);
        } else if let Some((auto_close_secs, auto_open_secs)) = snapshot.timer() {
            if snapshot.is_open() {
                self.scheduler.schedule_auto_close(structure_id, auto_close_secs);
            } else {
                self.scheduler.schedule_auto_open(structure_id, auto_open_secs);
            }
        }
    }
}

// Called while the structure is still reserved.
impl CompletionHook for AnimatorInner {
    fn on_completed(&self, snapshot: &StructureSnapshot) {
        self.after_animation(snapshot);
    }
}

#[async_trait]
impl ToggleSubmitter for AnimatorInner {
    async fn submit_deferred(
        &self,
        request: ToggleRequest,
    ) -> std::result::Result<AnimationHandle, ToggleRejection> {
        self.submit(request).await
    }
}

/// Resolve the requested action against the structure.
///
/// Returns the action and whether it is redundant (OPEN on open, CLOSE on closed).
fn resolve_action(
    snapshot: &StructureSnapshot,
    requested: ActionType,
    has_open_status: bool,
    reject_redundant: bool,
) -> std::result::Result<(ActionType, bool), ToggleRejection> {
    let redundant = match requested {
        ActionType::Toggle => return Ok((ActionType::Toggle, false)),
        _ if !has_open_status => {
            return Err(ToggleRejection::UnsupportedActionType {
                action: requested.to_string(),
                kind: snapshot.kind().to_string(),
            })
        }
        ActionType::Open => snapshot.is_open(),
        ActionType::Close => !snapshot.is_open(),
    };
    if redundant && reject_redundant {
        let state = if snapshot.is_open() { "open" } else { "closed" };
        return Err(ToggleRejection::ActionNotApplicable { state });
    }
    Ok((requested, redundant))
}

/// Check an actor's level on a structure. No actor and bypass actors pass.
fn authorize(
    snapshot: &StructureSnapshot,
    actor: Option<&Actor>,
    required: PermissionLevel,
) -> std::result::Result<(), ToggleRejection> {
    let Some(actor) = actor.filter(|a| !a.bypass) else {
        return Ok(());
    };
    let actual = snapshot.permission_of(actor.id);
    if actual.satisfies(required) {
        Ok(())
    } else {
        Err(ToggleRejection::PermissionDenied {
            required: required.to_string(),
            actual: actual.to_string(),
        })
    }
}
