//! Auto-toggle scheduler
//!
//! ## Table of Contents
//! - **ToggleSubmitter**: Where deferred requests are sent (the animator)
//! - **ScheduledToggle**: A pending deferred toggle
//! - **AutoToggleScheduler**: Fires deferred toggles after a delay in world ticks
//!
//! Deferred requests carry no actor and no privileges. They run through the
//! full pipeline and may be rejected; a rejection is logged at `debug` and
//! dropped.

use crate::clock::TickClock;
use crate::error::ToggleRejection;
use crate::metrics::AnimatorMetrics;
use crate::mover::AnimationHandle;
use crate::request::ToggleRequest;
use crate::types::{ActionType, StructureId, ToggleCause};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::debug;

/// Receiver of deferred toggle requests
#[async_trait]
pub trait ToggleSubmitter: Send + Sync {
    /// Run a request through the toggle pipeline
    async fn submit_deferred(
        &self,
        request: ToggleRequest,
    ) -> std::result::Result<AnimationHandle, ToggleRejection>;
}

/// A pending deferred toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledToggle {
    /// Target structure
    pub structure_id: StructureId,
    /// Action that will be requested
    pub action: ActionType,
    /// Cause the request will carry
    pub cause: ToggleCause,
    /// Tick at which the request fires
    pub due_tick: u64,
}

struct Pending {
    serial: u64,
    toggle: ScheduledToggle,
    task: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<StructureId, Pending>>>;

/// Fires deferred toggles. At most one is pending per structure.
pub struct AutoToggleScheduler {
    submitter: Weak<dyn ToggleSubmitter>,
    clock: TickClock,
    pending: PendingMap,
    serial: AtomicU64,
    metrics: Option<Arc<AnimatorMetrics>>,
}

impl AutoToggleScheduler {
    /// Create a scheduler sending requests to `submitter`
    pub fn new(
        submitter: Weak<dyn ToggleSubmitter>,
        clock: TickClock,
        metrics: Option<Arc<AnimatorMetrics>>,
    ) -> Self {
        Self {
            submitter,
            clock,
            pending: Arc::new(Mutex::new(HashMap::new())),
            serial: AtomicU64::new(0),
            metrics,
        }
    }

    /// Close the structure after `delay_secs`. A negative delay does nothing.
    pub fn schedule_auto_close(&self, structure_id: StructureId, delay_secs: i32) -> bool {
        self.schedule_secs(structure_id, delay_secs, ActionType::Close)
    }

    /// Open the structure after `delay_secs`. A negative delay does nothing.
    pub fn schedule_auto_open(&self, structure_id: StructureId, delay_secs: i32) -> bool {
        self.schedule_secs(structure_id, delay_secs, ActionType::Open)
    }

    /// Toggle the structure again on the next world tick
    pub fn schedule_perpetual(&self, structure_id: StructureId) -> bool {
        self.schedule_ticks(structure_id, 1, ActionType::Toggle, ToggleCause::Perpetual)
    }

    fn schedule_secs(&self, structure_id: StructureId, delay_secs: i32, action: ActionType) -> bool {
        if delay_secs < 0 {
            return false;
        }
        let ticks = self.clock.secs_to_ticks(delay_secs as f64);
        self.schedule_ticks(structure_id, ticks, action, ToggleCause::AutoClose)
    }

    fn schedule_ticks(
        &self,
        structure_id: StructureId,
        ticks: u64,
        action: ActionType,
        cause: ToggleCause,
    ) -> bool {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let due_tick = self.clock.current_tick().saturating_add(ticks);
        let toggle = ScheduledToggle {
            structure_id,
            action,
            cause,
            due_tick,
        };

        let submitter = self.submitter.clone();
        let clock = self.clock.clone();
        let pending = self.pending.clone();
        let metrics = self.metrics.clone();

        // Held across the spawn so the task cannot look itself up before it is inserted.
        let mut map = self.pending.lock();
        let task = tokio::spawn(async move {
            clock.wait_until(due_tick).await;
            {
                let mut map = pending.lock();
                match map.get(&structure_id) {
                    Some(p) if p.serial == serial => {
                        map.remove(&structure_id);
                    }
                    _ => return,
                }
            }
            fire(submitter, toggle, metrics).await;
        });

        if let Some(previous) = map.insert(structure_id, Pending { serial, toggle, task }) {
            previous.task.abort();
        }
        debug!(
            structure = %structure_id,
            action = %action,
            cause = %cause,
            due_tick = toggle.due_tick,
            "Auto-toggle scheduled"
        );
        true
    }

    /// Drop the pending toggle of a structure
    pub fn cancel(&self, structure_id: StructureId) -> bool {
        match self.pending.lock().remove(&structure_id) {
            Some(p) => {
                p.task.abort();
                debug!(structure = %structure_id, "Auto-toggle cancelled");
                true
            }
            None => false,
        }
    }

    /// Pending toggles
    pub fn pending(&self) -> Vec<ScheduledToggle> {
        self.pending.lock().values().map(|p| p.toggle).collect()
    }

    /// Pending toggle of one structure
    pub fn pending_for(&self, structure_id: StructureId) -> Option<ScheduledToggle> {
        self.pending.lock().get(&structure_id).map(|p| p.toggle)
    }
}

async fn fire(
    submitter: Weak<dyn ToggleSubmitter>,
    toggle: ScheduledToggle,
    metrics: Option<Arc<AnimatorMetrics>>,
) {
    let Some(submitter) = submitter.upgrade() else {
        return;
    };
    let request = match ToggleRequest::builder(toggle.structure_id)
        .action(toggle.action)
        .cause(toggle.cause)
        .build()
    {
        Ok(request) => request,
        Err(e) => {
            debug!(structure = %toggle.structure_id, error = %e, "Auto-toggle request invalid");
            return;
        }
    };

    let admitted = match submitter.submit_deferred(request).await {
        Ok(_) => {
            debug!(structure = %toggle.structure_id, action = %toggle.action, "Auto-toggle admitted");
            true
        }
        Err(rejection) => {
            debug!(
                structure = %toggle.structure_id,
                action = %toggle.action,
                reason = %rejection,
                "Auto-toggle rejected"
            );
            false
        }
    };
    if let Some(metrics) = &metrics {
        metrics.record_auto_toggle(admitted);
    }
}

impl Drop for AutoToggleScheduler {
    fn drop(&mut self) {
        for (_, p) in self.pending.lock().drain() {
            p.task.abort();
        }
    }
}

impl std::fmt::Debug for AutoToggleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoToggleScheduler")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}
