//! Structures, their capability tags, and immutable snapshots
//!
//! ## Table of Contents
//! - **Structure**: Live, mutable record of a multi-block structure
//! - **Capability**: Behavior tags attached by composition
//! - **StructureSnapshot**: Immutable point-in-time copy used by one toggle attempt
//! - **StructureStore**: Owned map of live structures

use crate::geometry::Cuboid;
use crate::types::{ActorId, MovementDirection, PermissionLevel, StructureId, WorldId};
use dashmap::DashMap;
use glam::IVec3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// An owner entry on a structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureOwner {
    /// Owning actor
    pub actor: ActorId,
    /// Their permission tier
    pub level: PermissionLevel,
}

/// Behavior tag attached to a structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    /// Re-toggles itself after opening or closing. Negative delays disable.
    Timer {
        /// Seconds after opening until auto-close
        auto_close_secs: i32,
        /// Seconds after closing until auto-open
        auto_open_secs: i32,
    },
    /// Moves a fixed number of blocks
    DiscreteMovement {
        /// Distance in blocks
        blocks: u32,
    },
    /// Keeps toggling for as long as it is allowed to
    Perpetual,
}

/// Live record of a multi-block structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    /// Unique id
    pub id: StructureId,
    /// Display name
    pub name: String,
    /// Archetype key used to look up the target calculator
    pub kind: String,
    /// World the structure lives in
    pub world: WorldId,
    /// Current extent
    pub cuboid: Cuboid,
    /// Rotation point
    pub engine: IVec3,
    /// Whether the structure is open
    pub is_open: bool,
    /// Direction the structure moves when opening
    pub open_direction: MovementDirection,
    /// Owners, creator first
    pub owners: Vec<StructureOwner>,
    /// Locked structures refuse non-bypass toggles
    pub locked: bool,
    /// Level an owner needs to toggle
    pub toggle_permission: PermissionLevel,
    /// Behavior tags
    pub capabilities: Vec<Capability>,
}

impl Structure {
    /// Create a closed, unlocked structure owned by `creator`
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        world: impl Into<WorldId>,
        cuboid: Cuboid,
        creator: ActorId,
    ) -> Self {
        Self {
            id: StructureId::new(),
            name: name.into(),
            kind: kind.into(),
            world: world.into(),
            engine: cuboid.min(),
            cuboid,
            is_open: false,
            open_direction: MovementDirection::None,
            owners: vec![StructureOwner {
                actor: creator,
                level: PermissionLevel::Creator,
            }],
            locked: false,
            toggle_permission: PermissionLevel::User,
            capabilities: Vec::new(),
        }
    }

    /// Set the rotation point
    pub fn with_engine(mut self, engine: IVec3) -> Self {
        self.engine = engine;
        self
    }

    /// Set the open direction
    pub fn with_open_direction(mut self, direction: MovementDirection) -> Self {
        self.open_direction = direction;
        self
    }

    /// Add a co-owner
    pub fn with_owner(mut self, actor: ActorId, level: PermissionLevel) -> Self {
        self.owners.push(StructureOwner { actor, level });
        self
    }

    /// Set the level needed to toggle
    pub fn with_toggle_permission(mut self, level: PermissionLevel) -> Self {
        self.toggle_permission = level;
        self
    }

    /// Attach a capability, replacing one of the same kind
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities
            .retain(|c| std::mem::discriminant(c) != std::mem::discriminant(&capability));
        self.capabilities.push(capability);
        self
    }

    /// Mark as open or closed
    pub fn with_open(mut self, is_open: bool) -> Self {
        self.is_open = is_open;
        self
    }

    /// Lock or unlock
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Take an immutable snapshot
    pub fn snapshot(&self) -> StructureSnapshot {
        StructureSnapshot {
            inner: self.clone(),
        }
    }
}

/// Immutable point-in-time copy of a structure.
///
/// Created once per toggle attempt and shared read-only behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureSnapshot {
    inner: Structure,
}

impl StructureSnapshot {
    /// Structure id
    pub fn id(&self) -> StructureId {
        self.inner.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Archetype key
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// World id
    pub fn world(&self) -> &WorldId {
        &self.inner.world
    }

    /// Extent at snapshot time
    pub fn cuboid(&self) -> Cuboid {
        self.inner.cuboid
    }

    /// Rotation point
    pub fn engine(&self) -> IVec3 {
        self.inner.engine
    }

    /// Open flag at snapshot time
    pub fn is_open(&self) -> bool {
        self.inner.is_open
    }

    /// Open direction
    pub fn open_direction(&self) -> MovementDirection {
        self.inner.open_direction
    }

    /// Lock flag at snapshot time
    pub fn is_locked(&self) -> bool {
        self.inner.locked
    }

    /// Level needed to toggle
    pub fn toggle_permission(&self) -> PermissionLevel {
        self.inner.toggle_permission
    }

    /// Owner list
    pub fn owners(&self) -> &[StructureOwner] {
        &self.inner.owners
    }

    /// Permission level an actor holds on this structure
    pub fn permission_of(&self, actor: ActorId) -> PermissionLevel {
        self.inner
            .owners
            .iter()
            .filter(|o| o.actor == actor)
            .map(|o| o.level)
            .min()
            .unwrap_or(PermissionLevel::NoPermission)
    }

    /// The creator, responsible for toggles that have no actor
    pub fn prime_owner(&self) -> Option<ActorId> {
        self.inner
            .owners
            .iter()
            .find(|o| o.level == PermissionLevel::Creator)
            .map(|o| o.actor)
    }

    /// Capability tags
    pub fn capabilities(&self) -> &[Capability] {
        &self.inner.capabilities
    }

    /// Auto-close and auto-open delays, when the structure has a timer
    pub fn timer(&self) -> Option<(i32, i32)> {
        self.inner.capabilities.iter().find_map(|c| match c {
            Capability::Timer {
                auto_close_secs,
                auto_open_secs,
            } => Some((*auto_close_secs, *auto_open_secs)),
            _ => None,
        })
    }

    /// Discrete distance in blocks, when the structure has one
    pub fn blocks_to_move(&self) -> Option<u32> {
        self.inner.capabilities.iter().find_map(|c| match c {
            Capability::DiscreteMovement { blocks } => Some(*blocks),
            _ => None,
        })
    }

    /// Whether the structure re-toggles itself
    pub fn is_perpetual(&self) -> bool {
        self.inner.capabilities.contains(&Capability::Perpetual)
    }

    /// The record this snapshot was taken from
    pub fn as_structure(&self) -> &Structure {
        &self.inner
    }
}

/// Owned map of live structures.
///
/// Spatial state (`cuboid`, `is_open`) only changes through
/// [`StructureStore::apply_completed`], which the block mover calls while it
/// still holds the structure's reservation.
#[derive(Debug, Default)]
pub struct StructureStore {
    structures: DashMap<StructureId, Structure>,
}

impl StructureStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            structures: DashMap::new(),
        }
    }

    /// Insert or replace a structure
    pub fn insert(&self, structure: Structure) -> StructureId {
        let id = structure.id;
        debug!(structure = %id, kind = %structure.kind, "Structure registered");
        self.structures.insert(id, structure);
        id
    }

    /// Get a copy of a structure
    pub fn get(&self, id: StructureId) -> Option<Structure> {
        self.structures.get(&id).map(|e| e.value().clone())
    }

    /// Remove a structure
    pub fn remove(&self, id: StructureId) -> Option<Structure> {
        self.structures.remove(&id).map(|(_, s)| s)
    }

    /// Whether a structure exists
    pub fn contains(&self, id: StructureId) -> bool {
        self.structures.contains_key(&id)
    }

    /// Number of structures
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Take a snapshot for a toggle attempt
    pub fn snapshot(&self, id: StructureId) -> Option<Arc<StructureSnapshot>> {
        self.structures.get(&id).map(|e| Arc::new(e.value().snapshot()))
    }

    /// Lock or unlock. Returns false when the structure does not exist.
    pub fn set_locked(&self, id: StructureId, locked: bool) -> bool {
        match self.structures.get_mut(&id) {
            Some(mut s) => {
                s.locked = locked;
                true
            }
            None => false,
        }
    }

    /// Record the outcome of a completed animation and return the new snapshot.
    ///
    /// Returns `None` when the structure was deleted mid-animation.
    pub fn apply_completed(
        &self,
        id: StructureId,
        new_cuboid: Cuboid,
        is_open: bool,
    ) -> Option<StructureSnapshot> {
        let mut entry = self.structures.get_mut(&id)?;
        entry.cuboid = new_cuboid;
        entry.is_open = is_open;
        Some(entry.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn door() -> Structure {
        Structure::new(
            "front door",
            "big_door",
            "overworld",
            Cuboid::new(IVec3::ZERO, IVec3::new(2, 3, 0)),
            ActorId::new(),
        )
    }

    #[test]
    fn test_snapshot_permissions() {
        let admin = ActorId::new();
        let structure = door().with_owner(admin, PermissionLevel::Admin);
        let snapshot = structure.snapshot();

        assert_eq!(snapshot.permission_of(admin), PermissionLevel::Admin);
        assert_eq!(snapshot.permission_of(ActorId::new()), PermissionLevel::NoPermission);
        assert_eq!(snapshot.prime_owner(), Some(structure.owners[0].actor));
    }

    #[test]
    fn test_capability_lookup() {
        let snapshot = door()
            .with_capability(Capability::Timer {
                auto_close_secs: 5,
                auto_open_secs: -1,
            })
            .with_capability(Capability::DiscreteMovement { blocks: 4 })
            .with_capability(Capability::DiscreteMovement { blocks: 6 })
            .snapshot();

        assert_eq!(snapshot.timer(), Some((5, -1)));
        assert_eq!(snapshot.blocks_to_move(), Some(6));
        assert!(!snapshot.is_perpetual());
        assert_eq!(snapshot.capabilities().len(), 2);
    }

    #[test]
    fn test_snapshot_is_detached_from_store() {
        let store = StructureStore::new();
        let id = store.insert(door());
        let before = store.snapshot(id).unwrap();

        let moved = Cuboid::new(IVec3::new(0, 0, 0), IVec3::new(0, 3, 2));
        let after = store.apply_completed(id, moved, true).unwrap();

        assert!(!before.is_open());
        assert_eq!(before.cuboid(), Cuboid::new(IVec3::ZERO, IVec3::new(2, 3, 0)));
        assert!(after.is_open());
        assert_eq!(after.cuboid(), moved);
    }

    #[test]
    fn test_store_lock_and_remove() {
        let store = StructureStore::new();
        let id = store.insert(door());
        assert!(store.set_locked(id, true));
        assert!(store.get(id).unwrap().locked);
        assert!(store.remove(id).is_some());
        assert!(!store.set_locked(id, false));
        assert!(store.apply_completed(id, Cuboid::single(IVec3::ZERO), true).is_none());
    }
}
