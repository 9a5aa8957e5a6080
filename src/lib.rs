//! # Structure Animator
//!
//! Toggle validation, per-structure locking and tick-driven block animation
//! for multi-block structures (doors, drawbridges, portcullises) in a
//! voxel world.
//!
//! ## Features
//!
//! - **Toggle Pipeline**: Ordered permission, lock, protection and extension checks
//!   with typed rejections
//! - **Animation Registry**: At most one in-flight animation per structure
//! - **Block Mover**: Tick-driven animation with guaranteed rollback on abort or failure
//! - **Archetypes**: Pluggable target calculators (big door, drawbridge, portcullis,
//!   sliding door, revolving door)
//! - **Auto-Toggles**: Timed auto-close/auto-open and perpetual movers
//! - **Persistence**: JSON state store (memory or file)
//! - **Metrics**: Prometheus-compatible metrics export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use structure_animator::prelude::*;
//! use structure_animator::{Cuboid, MemoryWorld, MovementDirection};
//! use glam::IVec3;
//!
//! #[tokio::main]
//! async fn main() -> structure_animator::Result<()> {
//!     let world = Arc::new(MemoryWorld::new());
//!     let animator = AnimatorBuilder::new()
//!         .with_world("overworld", world)
//!         .build()?;
//!     let _clock = animator.start_clock();
//!
//!     let owner = Actor::new("alex");
//!     let cuboid = Cuboid::new(IVec3::new(0, 64, 0), IVec3::new(2, 66, 0));
//!     let gate = animator.add_structure(
//!         Structure::new("gate", "portcullis", "overworld", cuboid, owner.id)
//!             .with_open_direction(MovementDirection::Up),
//!     );
//!
//!     let request = ToggleRequest::builder(gate)
//!         .cause(ToggleCause::Player)
//!         .actor(owner)
//!         .build()?;
//!     match animator.toggle(request).await {
//!         AnimationOutcome::Rejected(reason) => println!("rejected: {}", reason),
//!         outcome => println!("finished: {:?}", outcome),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod archetype;
pub mod autotoggle;
pub mod builder;
pub mod clock;
pub mod error;
pub mod events;
pub mod geometry;
pub mod messaging;
pub mod metrics;
pub mod mover;
pub mod protection;
pub mod registry;
pub mod request;
pub mod resilience;
pub mod runtime;
pub mod storage;
pub mod structure;
pub mod types;
pub mod world;

// Re-exports for ergonomic API
pub use archetype::{Archetype, ArchetypeRegistry, GeometryError, TargetGeometry};
pub use autotoggle::{AutoToggleScheduler, ScheduledToggle};
pub use builder::{AnimatorBuilder, AnimatorConfig};
pub use clock::TickClock;
pub use error::{AnimatorError, Result, ToggleRejection};
pub use events::{EndReason, PrepareOutcome, ToggleEvent, ToggleEventData, ToggleListener};
pub use geometry::{Cuboid, Motion, RotationAxis};
pub use messaging::{LogMessageSink, MessageSink};
pub use metrics::AnimatorMetrics;
pub use mover::{AnimationHandle, AnimationOutcome, MoverProgress, MoverState};
pub use protection::{ProtectionHook, ProtectionManager};
pub use registry::AnimationRegistry;
pub use request::{ToggleRequest, ToggleRequestBuilder};
pub use runtime::Animator;
pub use storage::{FileStore, MemoryStore, StateStore, StorePersistence, StructurePersistence};
pub use structure::{Capability, Structure, StructureSnapshot, StructureStore};
pub use types::{
    ActionType, Actor, ActorId, MovementDirection, PermissionLevel, StructureAttribute,
    StructureId, ToggleCause, WorldId,
};
pub use world::{BlockDescriptor, MemoryWorld, PlaceholderHandle, World, WorldError};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::{AnimatorBuilder, AnimatorConfig};
    pub use crate::error::{Result, ToggleRejection};
    pub use crate::mover::{AnimationHandle, AnimationOutcome};
    pub use crate::request::ToggleRequest;
    pub use crate::runtime::Animator;
    pub use crate::structure::{Capability, Structure};
    pub use crate::types::{ActionType, Actor, StructureId, ToggleCause};
}
