//! Animation target calculators for structure archetypes
//!
//! ## Table of Contents
//! - **Archetype**: Capability interface every structure type implements
//! - **TargetGeometry**: Where a structure ends up and how its blocks get there
//! - **ArchetypeRegistry**: Kind key to calculator lookup
//!
//! The engine never branches on a concrete archetype; it only calls the
//! methods of [`Archetype`].

pub mod rotating;
pub mod sliding;

use crate::geometry::{round_to_block, Cuboid, Motion};
use crate::structure::StructureSnapshot;
use crate::types::{ActionType, MovementDirection};
use glam::{DVec3, IVec3};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use rotating::{BigDoor, Drawbridge, RevolvingDoor};
pub use sliding::{Portcullis, SlidingDoor};

/// Failure to compute a target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// The structure's open direction makes no sense for the archetype
    #[error("open direction {0} is not valid for this archetype")]
    InvalidDirection(String),

    /// The structure would not move at all
    #[error("structure has no distance to move")]
    NoMovement,

    /// No calculator is registered for the kind key
    #[error("unknown archetype {0}")]
    UnknownArchetype(String),
}

/// Result of a target computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGeometry {
    /// Extent before the animation
    pub old_cuboid: Cuboid,
    /// Extent after the animation
    pub new_cuboid: Cuboid,
    /// How blocks travel
    pub motion: Motion,
    /// Open flag once the animation completes
    pub resulting_open: bool,
}

impl TargetGeometry {
    /// Target derived by applying `motion` to the snapshot's cuboid
    pub fn from_motion(snapshot: &StructureSnapshot, motion: Motion, resulting_open: bool) -> Self {
        let old_cuboid = snapshot.cuboid();
        Self {
            old_cuboid,
            new_cuboid: motion.apply(&old_cuboid),
            motion,
            resulting_open,
        }
    }

    /// Zero-displacement target that still runs a full lifecycle
    pub fn stationary(snapshot: &StructureSnapshot, resulting_open: bool) -> Self {
        Self::from_motion(snapshot, Motion::Stationary, resulting_open)
    }

    /// Region touched by the animation
    pub fn affected_region(&self) -> Cuboid {
        self.old_cuboid.union(&self.new_cuboid)
    }
}

/// Capability interface implemented per structure archetype
pub trait Archetype: Send + Sync {
    /// Kind key structures refer to
    fn kind(&self) -> &str;

    /// Whether the archetype distinguishes open from closed.
    ///
    /// Archetypes without the concept only accept TOGGLE.
    fn has_open_status(&self) -> bool {
        true
    }

    /// Compute where the structure ends up for an already-resolved action
    fn compute_target(
        &self,
        snapshot: &StructureSnapshot,
        action: ActionType,
    ) -> Result<TargetGeometry, GeometryError>;

    /// Position of a block at `progress`. Must be pure.
    fn trajectory_at(&self, origin: DVec3, geometry: &TargetGeometry, progress: f64) -> DVec3 {
        geometry.motion.position_at(origin, progress)
    }

    /// Block a real block is materialized in at the end
    fn final_position(&self, origin: IVec3, geometry: &TargetGeometry) -> IVec3 {
        round_to_block(self.trajectory_at(origin.as_dvec3(), geometry, 1.0))
    }

    /// Seconds the animation takes at `speed` blocks per second
    fn nominal_duration(&self, geometry: &TargetGeometry, speed: f64) -> f64 {
        geometry.motion.max_travel(&geometry.old_cuboid) / speed
    }
}

/// Whether a resolved action moves the structure towards its open state
pub(crate) fn is_opening(snapshot: &StructureSnapshot, action: ActionType) -> bool {
    match action {
        ActionType::Open => true,
        ActionType::Close => false,
        ActionType::Toggle => !snapshot.is_open(),
    }
}

pub(crate) fn invalid_direction(direction: MovementDirection) -> GeometryError {
    GeometryError::InvalidDirection(direction.to_string())
}

/// Type alias for a shared calculator
pub type BoxedArchetype = Arc<dyn Archetype>;

/// Kind key to calculator lookup
#[derive(Clone, Default)]
pub struct ArchetypeRegistry {
    archetypes: HashMap<String, BoxedArchetype>,
}

impl ArchetypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            archetypes: HashMap::new(),
        }
    }

    /// Registry with every built-in archetype
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(BigDoor);
        registry.register(Drawbridge);
        registry.register(RevolvingDoor);
        registry.register(Portcullis);
        registry.register(SlidingDoor);
        registry
    }

    /// Register a calculator under its kind key
    pub fn register<A: Archetype + 'static>(&mut self, archetype: A) {
        self.archetypes
            .insert(archetype.kind().to_string(), Arc::new(archetype));
    }

    /// Look up a calculator
    pub fn get(&self, kind: &str) -> Result<BoxedArchetype, GeometryError> {
        self.archetypes
            .get(kind)
            .cloned()
            .ok_or_else(|| GeometryError::UnknownArchetype(kind.to_string()))
    }

    /// Registered kind keys
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.archetypes.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for ArchetypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchetypeRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
