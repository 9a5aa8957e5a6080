//! Structure animation registry
//!
//! ## Table of Contents
//! - **AbortSignal**: Flag plus wake-up used to stop a running block mover
//! - **RegistryEntry**: One in-flight animation
//! - **Reservation**: Token proving a caller owns a structure's animation slot
//! - **AnimationRegistry**: At most one in-flight animation per structure
//!
//! Every operation takes the single map lock, so reservation is a plain
//! test-and-set and two attempts on the same structure can never both win.

use crate::geometry::Cuboid;
use crate::types::{StructureId, WorldId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Flag plus wake-up used to stop a running block mover
#[derive(Debug, Default)]
pub struct AbortSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort. Returns true only for the first request.
    pub fn abort(&self) -> bool {
        let first = !self.requested.swap(true, Ordering::SeqCst);
        if first {
            // notify_one stores a permit, so a mover that is not waiting yet
            // still wakes up on its next wait.
            self.notify.notify_one();
        }
        first
    }

    /// Whether an abort was requested
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once an abort is requested
    pub async fn requested(&self) {
        if self.is_requested() {
            return;
        }
        self.notify.notified().await;
    }
}

/// One in-flight animation
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Animated structure
    pub structure_id: StructureId,
    /// Reservation serial, unique per registry
    pub serial: u64,
    /// World the structure lives in
    pub world: WorldId,
    /// Union of old and new extents
    pub region: Cuboid,
    /// Abort channel of the block mover
    pub abort: Arc<AbortSignal>,
    /// When the reservation was taken
    pub started_at: DateTime<Utc>,
}

/// Token proving ownership of a structure's animation slot
#[derive(Debug, Clone)]
pub struct Reservation {
    structure_id: StructureId,
    serial: u64,
    abort: Arc<AbortSignal>,
}

impl Reservation {
    /// Reserved structure
    pub fn structure_id(&self) -> StructureId {
        self.structure_id
    }

    /// Abort channel shared with the registry entry
    pub fn abort_signal(&self) -> &Arc<AbortSignal> {
        &self.abort
    }
}

/// At most one in-flight animation per structure
#[derive(Debug, Default)]
pub struct AnimationRegistry {
    entries: Mutex<HashMap<StructureId, RegistryEntry>>,
    serial: AtomicU64,
}

impl AnimationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a structure. `None` means another animation holds it.
    pub fn try_reserve(
        &self,
        structure_id: StructureId,
        world: WorldId,
        region: Cuboid,
    ) -> Option<Reservation> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&structure_id) {
            return None;
        }

        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let abort = Arc::new(AbortSignal::new());
        entries.insert(
            structure_id,
            RegistryEntry {
                structure_id,
                serial,
                world,
                region,
                abort: abort.clone(),
                started_at: Utc::now(),
            },
        );
        debug!(structure = %structure_id, serial, "Structure reserved");

        Some(Reservation {
            structure_id,
            serial,
            abort,
        })
    }

    /// Release a reservation. Returns false if it was already released.
    pub fn release(&self, reservation: &Reservation) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&reservation.structure_id) {
            Some(entry) if entry.serial == reservation.serial => {
                entries.remove(&reservation.structure_id);
                debug!(structure = %reservation.structure_id, serial = reservation.serial, "Structure released");
                true
            }
            _ => false,
        }
    }

    /// Signal the running animation of a structure to stop.
    ///
    /// Does not wait for the animation to finish.
    pub fn abort_if_present(&self, structure_id: StructureId) -> bool {
        let abort = self
            .entries
            .lock()
            .get(&structure_id)
            .map(|e| e.abort.clone());
        match abort {
            Some(signal) => {
                signal.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every animation in `world` whose region intersects `region`
    pub fn abort_intersecting(&self, world: &WorldId, region: &Cuboid) -> usize {
        let signals: Vec<Arc<AbortSignal>> = self
            .entries
            .lock()
            .values()
            .filter(|e| &e.world == world && e.region.intersects(region))
            .map(|e| e.abort.clone())
            .collect();
        for signal in &signals {
            signal.abort();
        }
        signals.len()
    }

    /// Whether a structure has an in-flight animation
    pub fn is_reserved(&self, structure_id: StructureId) -> bool {
        self.entries.lock().contains_key(&structure_id)
    }

    /// Copy of a structure's entry
    pub fn entry(&self, structure_id: StructureId) -> Option<RegistryEntry> {
        self.entries.lock().get(&structure_id).cloned()
    }

    /// Structures with an in-flight animation
    pub fn active(&self) -> Vec<StructureId> {
        self.entries.lock().keys().copied().collect()
    }

    /// Number of in-flight animations
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is animating
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
