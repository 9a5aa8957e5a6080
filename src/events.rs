//! Toggle notifications
//!
//! ## Table of Contents
//! - **ToggleEventData**: Payload shared by every notification
//! - **PrepareOutcome**: Answer of a listener to the cancellable prepare hook
//! - **ToggleListener**: Synchronous listener trait
//! - **ToggleEvent / EventBus**: Listener fan-out plus a broadcast stream for observers

use crate::geometry::Cuboid;
use crate::structure::StructureSnapshot;
use crate::types::{ActionType, Actor, StructureId, ToggleCause};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Payload shared by every notification
#[derive(Debug, Clone)]
pub struct ToggleEventData {
    /// Structure state before the toggle
    pub snapshot: Arc<StructureSnapshot>,
    /// Why the toggle happens
    pub cause: ToggleCause,
    /// Resolved action
    pub action: ActionType,
    /// Actor that asked, if any
    pub responsible: Option<Actor>,
    /// Extent after the toggle
    pub target: Cuboid,
}

impl ToggleEventData {
    /// Id of the toggled structure
    pub fn structure_id(&self) -> StructureId {
        self.snapshot.id()
    }
}

/// Answer to the prepare hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Let the toggle go ahead
    Proceed,
    /// Stop the toggle
    Cancel(String),
}

/// How an animation ended, as reported by the end notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Blocks reached their targets
    Completed,
    /// Stopped early and rolled back
    Aborted,
    /// Failed and rolled back
    Failed,
}

/// Listener for toggle notifications. Only `on_prepare` can cancel.
pub trait ToggleListener: Send + Sync {
    /// Called before the structure is reserved
    fn on_prepare(&self, _event: &ToggleEventData) -> PrepareOutcome {
        PrepareOutcome::Proceed
    }

    /// Called when the block mover starts
    fn on_start(&self, _event: &ToggleEventData) {}

    /// Called once the block mover reaches a terminal state
    fn on_end(&self, _event: &ToggleEventData, _reason: EndReason) {}
}

/// Event published on the broadcast stream
#[derive(Debug, Clone)]
pub enum ToggleEvent {
    /// The toggle passed every check and is about to be reserved
    Prepared(ToggleEventData),
    /// The animation started
    Started(ToggleEventData),
    /// The animation ended
    Ended(ToggleEventData, EndReason),
}

impl ToggleEvent {
    /// Payload of the event
    pub fn data(&self) -> &ToggleEventData {
        match self {
            Self::Prepared(d) | Self::Started(d) | Self::Ended(d, _) => d,
        }
    }
}

/// Fan-out to listeners and broadcast subscribers
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn ToggleListener>>>,
    tx: broadcast::Sender<ToggleEvent>,
}

impl EventBus {
    /// Create a bus whose broadcast stream buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            tx,
        }
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn ToggleListener>) {
        self.listeners.write().push(listener);
    }

    /// Subscribe to the broadcast stream
    pub fn subscribe(&self) -> broadcast::Receiver<ToggleEvent> {
        self.tx.subscribe()
    }

    /// Ask every listener; the first cancellation wins
    pub fn prepare(&self, event: &ToggleEventData) -> PrepareOutcome {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let PrepareOutcome::Cancel(reason) = listener.on_prepare(event) {
                return PrepareOutcome::Cancel(reason);
            }
        }
        let _ = self.tx.send(ToggleEvent::Prepared(event.clone()));
        PrepareOutcome::Proceed
    }

    /// Notify that an animation started
    pub fn started(&self, event: &ToggleEventData) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_start(event);
        }
        let _ = self.tx.send(ToggleEvent::Started(event.clone()));
    }

    /// Notify that an animation ended
    pub fn ended(&self, event: &ToggleEventData, reason: EndReason) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_end(event, reason);
        }
        let _ = self.tx.send(ToggleEvent::Ended(event.clone(), reason));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Structure;
    use crate::types::ActorId;
    use glam::IVec3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Veto;

    impl ToggleListener for Veto {
        fn on_prepare(&self, _event: &ToggleEventData) -> PrepareOutcome {
            PrepareOutcome::Cancel("maintenance".to_string())
        }
    }

    #[derive(Default)]
    struct Counter {
        starts: AtomicUsize,
        ends: AtomicUsize,
    }

    impl ToggleListener for Counter {
        fn on_start(&self, _event: &ToggleEventData) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_end(&self, _event: &ToggleEventData, _reason: EndReason) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn data() -> ToggleEventData {
        let cuboid = Cuboid::new(IVec3::ZERO, IVec3::ONE);
        let structure = Structure::new("s", "big_door", "overworld", cuboid, ActorId::new());
        ToggleEventData {
            snapshot: Arc::new(structure.snapshot()),
            cause: ToggleCause::Redstone,
            action: ActionType::Open,
            responsible: None,
            target: cuboid,
        }
    }

    #[test]
    fn test_prepare_cancellation() {
        let bus = EventBus::default();
        assert_eq!(bus.prepare(&data()), PrepareOutcome::Proceed);
        bus.add_listener(Arc::new(Veto));
        assert_eq!(
            bus.prepare(&data()),
            PrepareOutcome::Cancel("maintenance".to_string())
        );
    }

    #[tokio::test]
    async fn test_broadcast_and_listeners() {
        let bus = EventBus::default();
        let counter = Arc::new(Counter::default());
        bus.add_listener(counter.clone());
        let mut rx = bus.subscribe();

        let event = data();
        bus.started(&event);
        bus.ended(&event, EndReason::Completed);

        assert_eq!(counter.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counter.ends.load(Ordering::SeqCst), 1);
        assert!(matches!(rx.recv().await.unwrap(), ToggleEvent::Started(_)));
        match rx.recv().await.unwrap() {
            ToggleEvent::Ended(d, reason) => {
                assert_eq!(reason, EndReason::Completed);
                assert_eq!(d.structure_id(), event.structure_id());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
