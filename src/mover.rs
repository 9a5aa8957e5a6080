//! Block mover
//!
//! ## Table of Contents
//! - **MoverState**: `Scheduled -> Running -> {Completed, Aborted, Failed}`
//! - **AnimationJob**: Everything a mover needs, produced by the pipeline
//! - **AnimatedBlock**: One detached block and its placeholder
//! - **BlockMover**: Tick loop for one structure
//! - **AnimationHandle / AnimationOutcome**: Caller side of a running animation
//!
//! A mover owns its blocks exclusively. All cleanup (placeholder removal,
//! restore or materialize, reservation release) happens inside [`BlockMover::run`],
//! so it runs exactly once no matter how an abort races with completion.
//! Block writes during cleanup are retried until they succeed, and the
//! structure stays reserved until every block is back in the world.

use crate::archetype::{Archetype, BoxedArchetype, TargetGeometry};
use crate::clock::TickClock;
use crate::error::{AnimatorError, Result, ToggleRejection};
use crate::events::{EndReason, EventBus, ToggleEventData};
use crate::geometry::Cuboid;
use crate::metrics::AnimatorMetrics;
use crate::registry::{AbortSignal, AnimationRegistry, Reservation};
use crate::resilience::RetryPolicy;
use crate::storage::BoxedPersistence;
use crate::structure::{StructureSnapshot, StructureStore};
use crate::types::StructureId;
use crate::world::{BlockDescriptor, BoxedWorld, PlaceholderHandle, World};
use glam::{DVec3, IVec3};
use rayon::prelude::*;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Lifecycle of a block mover. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoverState {
    /// Admitted, blocks not yet detached
    Scheduled,
    /// Advancing on world ticks
    Running,
    /// Blocks materialized at their targets
    Completed,
    /// Stopped early, blocks restored
    Aborted,
    /// A tick failed, blocks restored
    Failed,
}

impl MoverState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    /// Lowercase name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }
}

/// Progress published after every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoverProgress {
    /// Mover state
    pub state: MoverState,
    /// Fraction in `[0, 1]`, never decreasing
    pub progress: f64,
    /// Ticks since the mover started
    pub elapsed_ticks: u64,
}

impl MoverProgress {
    fn scheduled() -> Self {
        Self {
            state: MoverState::Scheduled,
            progress: 0.0,
            elapsed_ticks: 0,
        }
    }
}

/// An admitted animation
pub struct AnimationJob {
    /// Structure state before the toggle
    pub snapshot: Arc<StructureSnapshot>,
    /// Trajectory source
    pub archetype: BoxedArchetype,
    /// Target extent and motion
    pub geometry: TargetGeometry,
    /// Clamped animation length
    pub duration: Duration,
    /// Animation length in world ticks, at least 1
    pub duration_ticks: u64,
    /// Jump to the final configuration on the first tick
    pub skip_animation: bool,
    /// Payload of the start and end notifications
    pub event: ToggleEventData,
}

impl AnimationJob {
    /// Block positions the animation starts from
    pub fn origins(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.geometry.old_cuboid.positions()
    }
}

impl std::fmt::Debug for AnimationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationJob")
            .field("structure", &self.snapshot.id())
            .field("kind", &self.archetype.kind())
            .field("geometry", &self.geometry)
            .field("duration_ticks", &self.duration_ticks)
            .field("skip_animation", &self.skip_animation)
            .finish()
    }
}

/// One detached block
#[derive(Debug, Clone)]
pub struct AnimatedBlock {
    /// Where the real block was
    pub origin: IVec3,
    /// Current interpolated position
    pub position: DVec3,
    /// What the block is
    pub block: BlockDescriptor,
    /// Placeholder representing it while animated
    pub handle: PlaceholderHandle,
    /// Whether the placeholder still exists
    pub is_placeholder: bool,
}

/// How an animation request ended
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationOutcome {
    /// Blocks reached their targets and the new state was saved
    Completed {
        /// Animated structure
        structure_id: StructureId,
        /// Extent after the animation
        cuboid: Cuboid,
        /// Open flag after the animation
        is_open: bool,
        /// Ticks the animation took
        ticks: u64,
    },
    /// Stopped early, blocks restored
    Aborted {
        /// Animated structure
        structure_id: StructureId,
        /// Progress reached before the abort
        progress: f64,
    },
    /// Failed mid-flight, blocks restored
    Failed {
        /// Animated structure
        structure_id: StructureId,
        /// What went wrong
        reason: String,
    },
    /// The pipeline refused the request
    Rejected(ToggleRejection),
}

impl AnimationOutcome {
    /// Whether the animation completed
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Rejection reason, if the request never started
    pub fn rejection(&self) -> Option<&ToggleRejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Mover-level failure as an error
    pub fn as_error(&self) -> Option<AnimatorError> {
        match self {
            Self::Aborted { structure_id, .. } => {
                Some(AnimatorError::AnimationAborted(structure_id.to_string()))
            }
            Self::Failed { reason, .. } => Some(AnimatorError::animation_failed(reason.clone())),
            _ => None,
        }
    }
}

/// Caller side of an admitted animation
#[derive(Debug)]
pub struct AnimationHandle {
    structure_id: StructureId,
    abort: Arc<AbortSignal>,
    progress: watch::Receiver<MoverProgress>,
    outcome: oneshot::Receiver<AnimationOutcome>,
}

impl AnimationHandle {
    pub(crate) fn new(
        structure_id: StructureId,
        abort: Arc<AbortSignal>,
        progress: watch::Receiver<MoverProgress>,
        outcome: oneshot::Receiver<AnimationOutcome>,
    ) -> Self {
        Self {
            structure_id,
            abort,
            progress,
            outcome,
        }
    }

    /// Animated structure
    pub fn structure_id(&self) -> StructureId {
        self.structure_id
    }

    /// Ask the mover to stop and roll back. Returns true for the first request.
    ///
    /// Has no effect once the animation finished.
    pub fn abort(&self) -> bool {
        self.abort.abort()
    }

    /// Latest published progress
    pub fn progress(&self) -> MoverProgress {
        *self.progress.borrow()
    }

    /// Wait until the mover runs and reached `at_least`, or ended
    pub async fn wait_for_progress(&self, at_least: f64) -> MoverProgress {
        let mut rx = self.progress.clone();
        let reached = rx
            .wait_for(|p| {
                p.state.is_terminal() || (p.state == MoverState::Running && p.progress >= at_least)
            })
            .await
            .map(|p| *p);
        match reached {
            Ok(p) => p,
            Err(_) => *rx.borrow(),
        }
    }

    /// Wait for the animation to end
    pub async fn wait(self) -> AnimationOutcome {
        let structure_id = self.structure_id;
        self.outcome.await.unwrap_or_else(|_| AnimationOutcome::Failed {
            structure_id,
            reason: "animation task ended unexpectedly".to_string(),
        })
    }
}

/// Told about a completed animation while its structure is still reserved
pub(crate) trait CompletionHook: Send + Sync {
    fn on_completed(&self, snapshot: &StructureSnapshot);
}

/// Collaborators shared by every mover of an animator
#[derive(Clone)]
pub(crate) struct MoverContext {
    pub world: BoxedWorld,
    pub store: Arc<StructureStore>,
    pub registry: Arc<AnimationRegistry>,
    pub persistence: Option<BoxedPersistence>,
    pub events: Arc<EventBus>,
    pub clock: TickClock,
    pub metrics: Option<Arc<AnimatorMetrics>>,
    pub restore: RetryPolicy,
    pub parallel_threshold: usize,
    pub on_completed: Option<Weak<dyn CompletionHook>>,
}

/// Evaluate the trajectory of every origin at `progress`.
///
/// Runs on the rayon pool once there are more than `parallel_threshold` blocks.
pub fn evaluate_positions(
    archetype: &dyn Archetype,
    geometry: &TargetGeometry,
    origins: &[IVec3],
    progress: f64,
    parallel_threshold: usize,
) -> Vec<DVec3> {
    if origins.len() > parallel_threshold {
        origins
            .par_iter()
            .map(|o| archetype.trajectory_at(o.as_dvec3(), geometry, progress))
            .collect()
    } else {
        origins
            .iter()
            .map(|o| archetype.trajectory_at(o.as_dvec3(), geometry, progress))
            .collect()
    }
}

/// Tick loop for one structure
pub struct BlockMover {
    job: AnimationJob,
    ctx: MoverContext,
    reservation: Reservation,
    state: MoverState,
    blocks: Vec<AnimatedBlock>,
    origins: Vec<IVec3>,
    progress: f64,
    elapsed_ticks: u64,
    progress_tx: watch::Sender<MoverProgress>,
}

impl BlockMover {
    pub(crate) fn new(
        job: AnimationJob,
        ctx: MoverContext,
        reservation: Reservation,
    ) -> (Self, watch::Receiver<MoverProgress>) {
        let (progress_tx, progress_rx) = watch::channel(MoverProgress::scheduled());
        let mover = Self {
            job,
            ctx,
            reservation,
            state: MoverState::Scheduled,
            blocks: Vec::new(),
            origins: Vec::new(),
            progress: 0.0,
            elapsed_ticks: 0,
            progress_tx,
        };
        (mover, progress_rx)
    }

    /// Current state
    pub fn state(&self) -> MoverState {
        self.state
    }

    fn structure_id(&self) -> StructureId {
        self.job.snapshot.id()
    }

    fn publish(&self) {
        self.progress_tx.send_replace(MoverProgress {
            state: self.state,
            progress: self.progress,
            elapsed_ticks: self.elapsed_ticks,
        });
    }

    fn transition(&mut self, next: MoverState) {
        if self.state.is_terminal() {
            return;
        }
        debug!(structure = %self.structure_id(), from = self.state.as_str(), to = next.as_str(), "Mover state change");
        self.state = next;
        self.publish();
    }

    /// Drive the animation to a terminal state
    pub async fn run(mut self) -> AnimationOutcome {
        if let Some(metrics) = &self.ctx.metrics {
            metrics.record_animation_started();
        }

        if let Err(e) = self.detach_blocks() {
            return self.roll_back(MoverState::Failed, Some(e.to_string())).await;
        }

        let abort = self.reservation.abort_signal().clone();
        let mut ticks = self.ctx.clock.subscribe();
        let start_tick = *ticks.borrow_and_update();

        self.ctx.events.started(&self.job.event);
        self.transition(MoverState::Running);
        info!(
            structure = %self.structure_id(),
            kind = %self.job.archetype.kind(),
            blocks = self.blocks.len(),
            ticks = self.job.duration_ticks,
            "Animation started"
        );

        loop {
            if abort.is_requested() {
                return self.roll_back(MoverState::Aborted, None).await;
            }

            tokio::select! {
                biased;
                _ = abort.requested() => {
                    return self.roll_back(MoverState::Aborted, None).await;
                }
                changed = ticks.changed() => {
                    if changed.is_err() {
                        return self
                            .roll_back(MoverState::Failed, Some("tick clock stopped".to_string()))
                            .await;
                    }
                }
            }

            if abort.is_requested() {
                return self.roll_back(MoverState::Aborted, None).await;
            }

            let now = *ticks.borrow_and_update();
            self.elapsed_ticks = now.saturating_sub(start_tick);
            let progress = self.progress_at(self.elapsed_ticks);

            if let Err(e) = self.step(progress) {
                return self.roll_back(MoverState::Failed, Some(e.to_string())).await;
            }
            if self.progress >= 1.0 {
                return self.complete().await;
            }
        }
    }

    fn progress_at(&self, elapsed_ticks: u64) -> f64 {
        let raw = if self.job.skip_animation {
            1.0
        } else {
            (elapsed_ticks as f64 / self.job.duration_ticks.max(1) as f64).min(1.0)
        };
        raw.max(self.progress)
    }

    /// Replace every non-air block of the old extent with a placeholder
    fn detach_blocks(&mut self) -> Result<()> {
        let world = self.ctx.world.clone();
        let cuboid = self.job.geometry.old_cuboid;
        for pos in cuboid.positions() {
            let block = world.read_block(pos)?;
            if block.is_air() {
                continue;
            }
            let handle = world.spawn_placeholder(pos, block.clone())?;
            self.blocks.push(AnimatedBlock {
                origin: pos,
                position: pos.as_dvec3(),
                block,
                handle,
                is_placeholder: true,
            });
            world.write_block(pos, BlockDescriptor::air())?;
        }
        self.origins = self.blocks.iter().map(|b| b.origin).collect();
        debug!(structure = %self.structure_id(), blocks = self.blocks.len(), "Blocks detached");
        Ok(())
    }

    fn step(&mut self, progress: f64) -> Result<()> {
        let positions = evaluate_positions(
            self.job.archetype.as_ref(),
            &self.job.geometry,
            &self.origins,
            progress,
            self.ctx.parallel_threshold,
        );

        if let Some(i) = positions.iter().position(|p| !p.is_finite()) {
            return Err(AnimatorError::animation_failed(format!(
                "non-finite position for block from {}",
                self.origins[i]
            )));
        }

        for (block, pos) in self.blocks.iter_mut().zip(positions) {
            self.ctx.world.move_placeholder(block.handle, pos)?;
            block.position = pos;
        }

        self.progress = progress;
        self.publish();
        Ok(())
    }

    async fn complete(mut self) -> AnimationOutcome {
        let structure_id = self.structure_id();
        let geometry = self.job.geometry;
        let targets: Vec<IVec3> = self
            .origins
            .iter()
            .map(|o| self.job.archetype.final_position(*o, &geometry))
            .collect();

        let world = self.ctx.world.clone();
        for (block, target) in self.blocks.iter_mut().zip(targets) {
            let material = block.block.clone();
            self.ctx
                .restore
                .run_until_ok("materialize block", || world.write_block(target, material.clone()))
                .await;
            remove_placeholder(world.as_ref(), structure_id, block);
        }

        let updated = self
            .ctx
            .store
            .apply_completed(structure_id, geometry.new_cuboid, geometry.resulting_open);
        if let (Some(snapshot), Some(hook)) = (
            &updated,
            self.ctx.on_completed.as_ref().and_then(Weak::upgrade),
        ) {
            hook.on_completed(snapshot);
        }
        self.ctx.registry.release(&self.reservation);

        match (&updated, &self.ctx.persistence) {
            (Some(snapshot), Some(persistence)) => {
                if let Err(e) = persistence.save_structure_state(snapshot).await {
                    error!(structure = %structure_id, error = %e, "Failed to persist structure state");
                }
            }
            (None, _) => warn!(structure = %structure_id, "Structure removed during animation"),
            _ => {}
        }

        self.ctx.events.ended(&self.job.event, EndReason::Completed);
        if let Some(metrics) = &self.ctx.metrics {
            metrics.record_animation_finished(MoverState::Completed.as_str(), self.elapsed_ticks);
        }
        info!(
            structure = %structure_id,
            cuboid = %geometry.new_cuboid,
            is_open = geometry.resulting_open,
            ticks = self.elapsed_ticks,
            "Animation completed"
        );
        self.transition(MoverState::Completed);

        AnimationOutcome::Completed {
            structure_id,
            cuboid: geometry.new_cuboid,
            is_open: geometry.resulting_open,
            ticks: self.elapsed_ticks,
        }
    }

    /// Put every block back where it came from.
    ///
    /// A placeholder is removed only once its real block is back in place.
    async fn roll_back(mut self, state: MoverState, reason: Option<String>) -> AnimationOutcome {
        let structure_id = self.structure_id();
        let world = self.ctx.world.clone();

        let mut retried = false;
        for block in &mut self.blocks {
            let origin = block.origin;
            let material = block.block.clone();
            let mut attempts = 0u32;
            self.ctx
                .restore
                .run_until_ok("restore block", || {
                    attempts += 1;
                    world.write_block(origin, material.clone())
                })
                .await;
            retried |= attempts > 1;
            remove_placeholder(world.as_ref(), structure_id, block);
        }

        self.ctx.registry.release(&self.reservation);

        let end_reason = if state == MoverState::Failed {
            EndReason::Failed
        } else {
            EndReason::Aborted
        };
        self.ctx.events.ended(&self.job.event, end_reason);
        if let Some(metrics) = &self.ctx.metrics {
            if retried {
                metrics.record_restore_retry();
            }
            metrics.record_animation_finished(state.as_str(), self.elapsed_ticks);
        }
        self.transition(state);

        match reason {
            Some(reason) => {
                error!(structure = %structure_id, progress = self.progress, reason = %reason, "Animation failed, blocks restored");
                AnimationOutcome::Failed {
                    structure_id,
                    reason,
                }
            }
            None => {
                info!(structure = %structure_id, progress = self.progress, "Animation aborted, blocks restored");
                AnimationOutcome::Aborted {
                    structure_id,
                    progress: self.progress,
                }
            }
        }
    }
}

fn remove_placeholder(world: &dyn World, structure_id: StructureId, block: &mut AnimatedBlock) {
    if !block.is_placeholder {
        return;
    }
    if let Err(e) = world.remove_placeholder(block.handle) {
        warn!(structure = %structure_id, position = %block.origin, error = %e, "Failed to remove placeholder");
    }
    block.is_placeholder = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{Archetype, Portcullis};
    use crate::resilience::RetryConfig;
    use crate::storage::{BoxedPersistence, MockStructurePersistence};
    use crate::structure::Structure;
    use crate::types::{ActionType, ActorId, MovementDirection, ToggleCause};
    use crate::world::MemoryWorld;

    struct Harness {
        world: Arc<MemoryWorld>,
        store: Arc<StructureStore>,
        registry: Arc<AnimationRegistry>,
        clock: TickClock,
        structure: Structure,
    }

    fn harness() -> Harness {
        let world = Arc::new(MemoryWorld::new());
        let cuboid = Cuboid::new(IVec3::new(0, 64, 0), IVec3::new(2, 66, 0));
        world.fill(&cuboid, BlockDescriptor::new("iron_bars"));
        let structure = Structure::new("gate", "portcullis", "overworld", cuboid, ActorId::new())
            .with_open_direction(MovementDirection::Up);
        let store = Arc::new(StructureStore::new());
        store.insert(structure.clone());
        Harness {
            world,
            store,
            registry: Arc::new(AnimationRegistry::new()),
            clock: TickClock::new(20),
            structure,
        }
    }

    fn persistence(expected_saves: usize) -> BoxedPersistence {
        let mut mock = MockStructurePersistence::new();
        mock.expect_save_structure_state()
            .times(expected_saves)
            .returning(|_| Ok(()));
        Arc::new(mock)
    }

    fn mover(
        h: &Harness,
        persistence: BoxedPersistence,
        duration_ticks: u64,
        skip: bool,
    ) -> (BlockMover, watch::Receiver<MoverProgress>, Arc<AbortSignal>) {
        let snapshot = Arc::new(h.structure.snapshot());
        let geometry = Portcullis.compute_target(&snapshot, ActionType::Open).unwrap();
        let reservation = h
            .registry
            .try_reserve(snapshot.id(), snapshot.world().clone(), geometry.affected_region())
            .unwrap();
        let abort = reservation.abort_signal().clone();
        let job = AnimationJob {
            event: ToggleEventData {
                snapshot: snapshot.clone(),
                cause: ToggleCause::Redstone,
                action: ActionType::Open,
                responsible: None,
                target: geometry.new_cuboid,
            },
            snapshot,
            archetype: Arc::new(Portcullis),
            geometry,
            duration: Duration::from_millis(duration_ticks * 50),
            duration_ticks,
            skip_animation: skip,
        };
        let ctx = MoverContext {
            world: h.world.clone(),
            store: h.store.clone(),
            registry: h.registry.clone(),
            persistence: Some(persistence),
            events: Arc::new(EventBus::default()),
            clock: h.clock.clone(),
            metrics: None,
            restore: RetryPolicy::new(RetryConfig::default().max_retries(4)),
            parallel_threshold: 4,
            on_completed: None,
        };
        let (mover, rx) = BlockMover::new(job, ctx, reservation);
        (mover, rx, abort)
    }

    async fn started(rx: &mut watch::Receiver<MoverProgress>) {
        rx.wait_for(|p| p.state != MoverState::Scheduled).await.unwrap();
    }

    async fn tick(clock: &TickClock, rx: &mut watch::Receiver<MoverProgress>) -> MoverProgress {
        let before = rx.borrow().elapsed_ticks;
        clock.advance();
        *rx.wait_for(|p| p.elapsed_ticks > before || p.state.is_terminal())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_completes_and_persists_once() {
        let h = harness();
        let (mover, mut rx, _) = mover(&h, persistence(1), 4, false);
        let task = tokio::spawn(mover.run());
        started(&mut rx).await;

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(tick(&h.clock, &mut rx).await.progress);
        }
        let outcome = task.await.unwrap();

        assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        let new_cuboid = Cuboid::new(IVec3::new(0, 67, 0), IVec3::new(2, 69, 0));
        assert_eq!(
            outcome,
            AnimationOutcome::Completed {
                structure_id: h.structure.id,
                cuboid: new_cuboid,
                is_open: true,
                ticks: 4,
            }
        );
        assert_eq!(h.world.solid_blocks_in(&new_cuboid), 9);
        assert_eq!(h.world.solid_blocks_in(&h.structure.cuboid), 0);
        assert_eq!(h.world.placeholder_count(), 0);
        assert!(h.registry.is_empty());

        let stored = h.store.get(h.structure.id).unwrap();
        assert_eq!(stored.cuboid, new_cuboid);
        assert!(stored.is_open);
    }

    #[tokio::test]
    async fn test_skip_animation_jumps_to_end() {
        let h = harness();
        let (mover, mut rx, _) = mover(&h, persistence(1), 100, true);
        let task = tokio::spawn(mover.run());
        started(&mut rx).await;

        let first = tick(&h.clock, &mut rx).await;
        assert_eq!(first.progress, 1.0);
        let outcome = task.await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(rx.borrow().state, MoverState::Completed);
    }

    #[tokio::test]
    async fn test_abort_midway_restores_origins() {
        let h = harness();
        let (mover, mut rx, abort) = mover(&h, persistence(0), 10, false);
        let task = tokio::spawn(mover.run());
        started(&mut rx).await;

        for _ in 0..5 {
            tick(&h.clock, &mut rx).await;
        }
        assert_eq!(rx.borrow().progress, 0.5);
        assert_eq!(h.world.placeholder_count(), 9);
        assert!(abort.abort());

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, AnimationOutcome::Aborted { progress, .. } if progress == 0.5));
        assert!(matches!(outcome.as_error(), Some(AnimatorError::AnimationAborted(_))));
        assert_eq!(h.world.solid_blocks_in(&h.structure.cuboid), 9);
        assert_eq!(h.world.placeholder_count(), 0);
        assert!(h.registry.is_empty());

        // Aborting again after the end changes nothing.
        assert!(!abort.abort());
        let stored = h.store.get(h.structure.id).unwrap();
        assert_eq!(stored.cuboid, h.structure.cuboid);
        assert!(!stored.is_open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_rolls_back_with_retries() {
        let h = harness();
        let (mover, mut rx, _) = mover(&h, persistence(0), 10, false);
        let task = tokio::spawn(mover.run());
        started(&mut rx).await;
        tick(&h.clock, &mut rx).await;

        h.world.fail_moves(true);
        h.world.fail_next_writes(2);
        h.clock.advance();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, AnimationOutcome::Failed { .. }));
        assert_eq!(rx.borrow().state, MoverState::Failed);
        assert_eq!(h.world.solid_blocks_in(&h.structure.cuboid), 9);
        assert_eq!(h.world.placeholder_count(), 0);
        assert!(h.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_restores_every_block_past_retry_budget() {
        let h = harness();
        let (mover, mut rx, abort) = mover(&h, persistence(0), 10, false);
        let task = tokio::spawn(mover.run());
        started(&mut rx).await;
        tick(&h.clock, &mut rx).await;

        // Far more refusals than the four retries of the harness policy
        h.world.fail_next_writes(40);
        assert!(abort.abort());

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, AnimationOutcome::Aborted { progress, .. } if progress == 0.1));
        assert_eq!(h.world.solid_blocks_in(&h.structure.cuboid), 9);
        assert_eq!(h.world.placeholder_count(), 0);
        assert!(h.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_materialize_retries_until_written() {
        let h = harness();
        let (mover, mut rx, _) = mover(&h, persistence(1), 2, false);
        let task = tokio::spawn(mover.run());
        started(&mut rx).await;
        tick(&h.clock, &mut rx).await;

        h.world.fail_next_writes(40);
        h.clock.advance();

        let outcome = task.await.unwrap();
        let new_cuboid = Cuboid::new(IVec3::new(0, 67, 0), IVec3::new(2, 69, 0));
        assert!(matches!(outcome, AnimationOutcome::Completed { is_open: true, .. }));
        assert_eq!(h.world.solid_blocks_in(&new_cuboid), 9);
        assert_eq!(h.world.solid_blocks_in(&h.structure.cuboid), 0);
        assert_eq!(h.world.placeholder_count(), 0);
        assert!(h.registry.is_empty());
        assert!(h.store.get(h.structure.id).unwrap().is_open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholders_stay_until_blocks_are_back() {
        let h = harness();
        let (mover, mut rx, abort) = mover(&h, persistence(0), 10, false);
        let task = tokio::spawn(mover.run());
        started(&mut rx).await;

        h.world.fail_next_writes(3);
        abort.abort();
        // The first restore write is refused and the mover backs off.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.world.placeholder_count(), 9);
        assert!(h.registry.is_reserved(h.structure.id));

        task.await.unwrap();
        assert_eq!(h.world.placeholder_count(), 0);
        assert_eq!(h.world.solid_blocks_in(&h.structure.cuboid), 9);
    }

    #[tokio::test]
    async fn test_abort_before_first_tick() {
        let h = harness();
        let (mover, mut rx, abort) = mover(&h, persistence(0), 10, false);
        abort.abort();
        let outcome = mover.run().await;
        assert!(matches!(outcome, AnimationOutcome::Aborted { progress, .. } if progress == 0.0));
        assert_eq!(rx.borrow_and_update().state, MoverState::Aborted);
        assert_eq!(h.world.solid_blocks_in(&h.structure.cuboid), 9);
    }

    #[test]
    fn test_parallel_and_serial_evaluation_agree() {
        let h = harness();
        let snapshot = h.structure.snapshot();
        let geometry = Portcullis.compute_target(&snapshot, ActionType::Open).unwrap();
        let origins: Vec<IVec3> = geometry.old_cuboid.positions().collect();

        let serial = evaluate_positions(&Portcullis, &geometry, &origins, 0.5, usize::MAX);
        let parallel = evaluate_positions(&Portcullis, &geometry, &origins, 0.5, 0);
        assert_eq!(serial, parallel);
        assert_eq!(serial[0], DVec3::new(0.0, 65.5, 0.0));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!MoverState::Scheduled.is_terminal());
        assert!(!MoverState::Running.is_terminal());
        assert!(MoverState::Completed.is_terminal());
        assert!(MoverState::Aborted.is_terminal());
        assert!(MoverState::Failed.is_terminal());
    }
}
