//! World boundary
//!
//! ## Table of Contents
//! - **World**: The only operations the animator uses to touch a world
//! - **BlockDescriptor**: Material and state of a block
//! - **PlaceholderHandle**: Reference to a detached, animated block
//! - **MemoryWorld**: In-memory world with failure injection

use crate::geometry::Cuboid;
use dashmap::DashMap;
use glam::{DVec3, IVec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

/// World boundary failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// The addressed region cannot be accessed right now
    #[error("region around {0} is unavailable")]
    RegionUnavailable(String),

    /// The placeholder no longer exists
    #[error("unknown placeholder {0}")]
    UnknownPlaceholder(u64),

    /// The world refused the operation
    #[error("operation rejected: {0}")]
    Rejected(String),
}

/// Material and state of a block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Material key, e.g. `oak_planks`
    pub material: String,
    /// Opaque block state (facing, half, ...)
    pub state: Option<String>,
}

impl BlockDescriptor {
    /// Block of a material with default state
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            material: material.into(),
            state: None,
        }
    }

    /// Set the block state
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Empty space
    pub fn air() -> Self {
        Self::new("air")
    }

    /// Whether this is empty space
    pub fn is_air(&self) -> bool {
        self.material == "air"
    }
}

impl fmt::Display for BlockDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Some(state) => write!(f, "{}[{}]", self.material, state),
            None => f.write_str(&self.material),
        }
    }
}

/// Reference to a detached, animated block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderHandle(pub u64);

/// Operations the animator may perform on a world.
///
/// The block mover only ever calls the five block operations; the pipeline
/// additionally asks [`World::is_region_loaded`] before admitting a toggle.
pub trait World: Send + Sync {
    /// Read the block at a position
    fn read_block(&self, pos: IVec3) -> Result<BlockDescriptor, WorldError>;

    /// Replace the block at a position
    fn write_block(&self, pos: IVec3, block: BlockDescriptor) -> Result<(), WorldError>;

    /// Create a detached representation of a block
    fn spawn_placeholder(
        &self,
        pos: IVec3,
        block: BlockDescriptor,
    ) -> Result<PlaceholderHandle, WorldError>;

    /// Move a placeholder to an interpolated position
    fn move_placeholder(&self, handle: PlaceholderHandle, pos: DVec3) -> Result<(), WorldError>;

    /// Remove a placeholder
    fn remove_placeholder(&self, handle: PlaceholderHandle) -> Result<(), WorldError>;

    /// Whether every block of a region can currently be accessed
    fn is_region_loaded(&self, _region: &Cuboid) -> bool {
        true
    }
}

/// Type alias for a shared world
pub type BoxedWorld = Arc<dyn World>;

/// A placeholder tracked by [`MemoryWorld`]
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    /// Current interpolated position
    pub position: DVec3,
    /// What it looks like
    pub block: BlockDescriptor,
}

/// In-memory world used for tests and demos
#[derive(Debug, Default)]
pub struct MemoryWorld {
    blocks: DashMap<IVec3, BlockDescriptor>,
    placeholders: DashMap<u64, Placeholder>,
    next_handle: AtomicU64,
    unloaded: RwLock<Vec<Cuboid>>,
    failing_writes: AtomicU32,
    failing_moves: AtomicBool,
    moves: AtomicU64,
}

impl MemoryWorld {
    /// Create an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a block directly
    pub fn set_block(&self, pos: IVec3, block: BlockDescriptor) {
        if block.is_air() {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, block);
        }
    }

    /// Fill a cuboid with one material
    pub fn fill(&self, cuboid: &Cuboid, block: BlockDescriptor) {
        for pos in cuboid.positions() {
            self.set_block(pos, block.clone());
        }
    }

    /// Block at a position (air when unset)
    pub fn block_at(&self, pos: IVec3) -> BlockDescriptor {
        self.blocks
            .get(&pos)
            .map(|b| b.value().clone())
            .unwrap_or_else(BlockDescriptor::air)
    }

    /// Non-air blocks inside a cuboid
    pub fn solid_blocks_in(&self, cuboid: &Cuboid) -> usize {
        cuboid
            .positions()
            .filter(|p| self.blocks.contains_key(p))
            .count()
    }

    /// Number of live placeholders
    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Total placeholder moves performed
    pub fn move_count(&self) -> u64 {
        self.moves.load(Ordering::SeqCst)
    }

    /// Mark a region as unavailable
    pub fn unload_region(&self, region: Cuboid) {
        self.unloaded.write().push(region);
    }

    /// Make every region available again
    pub fn load_all(&self) {
        self.unloaded.write().clear();
    }

    /// Make the next `count` block writes fail
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make every placeholder move fail until reset
    pub fn fail_moves(&self, failing: bool) {
        self.failing_moves.store(failing, Ordering::SeqCst);
    }
}

impl World for MemoryWorld {
    fn read_block(&self, pos: IVec3) -> Result<BlockDescriptor, WorldError> {
        Ok(self.block_at(pos))
    }

    fn write_block(&self, pos: IVec3, block: BlockDescriptor) -> Result<(), WorldError> {
        let consumed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(WorldError::Rejected(format!("write at {} refused", pos)));
        }
        self.set_block(pos, block);
        Ok(())
    }

    fn spawn_placeholder(
        &self,
        pos: IVec3,
        block: BlockDescriptor,
    ) -> Result<PlaceholderHandle, WorldError> {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.placeholders.insert(
            id,
            Placeholder {
                position: pos.as_dvec3(),
                block,
            },
        );
        Ok(PlaceholderHandle(id))
    }

    fn move_placeholder(&self, handle: PlaceholderHandle, pos: DVec3) -> Result<(), WorldError> {
        if self.failing_moves.load(Ordering::SeqCst) {
            return Err(WorldError::RegionUnavailable(format!("{}", pos)));
        }
        let mut placeholder = self
            .placeholders
            .get_mut(&handle.0)
            .ok_or(WorldError::UnknownPlaceholder(handle.0))?;
        placeholder.position = pos;
        self.moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_placeholder(&self, handle: PlaceholderHandle) -> Result<(), WorldError> {
        self.placeholders
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(WorldError::UnknownPlaceholder(handle.0))
    }

    fn is_region_loaded(&self, region: &Cuboid) -> bool {
        !self.unloaded.read().iter().any(|u| u.intersects(region))
    }
}
