//! Lowers and raises a drawbridge in an in-memory world.
//!
//! Run with `cargo run --example drawbridge_demo`; set `RUST_LOG=debug` for
//! mover state changes and rejections.

use anyhow::Context;
use async_trait::async_trait;
use glam::IVec3;
use std::sync::Arc;
use std::time::Duration;
use structure_animator::prelude::*;
use structure_animator::{
    ActorId, BlockDescriptor, Cuboid, MemoryWorld, MovementDirection, ProtectionHook, ToggleEvent,
    WorldId,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Refuses everything below the moat
struct MoatGuard;

#[async_trait]
impl ProtectionHook for MoatGuard {
    fn name(&self) -> &str {
        "MoatGuard"
    }

    async fn can_modify(&self, _actor: ActorId, _world: &WorldId, region: &Cuboid) -> bool {
        region.min().y >= 60
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let world = Arc::new(MemoryWorld::new());
    let bridge = Cuboid::new(IVec3::new(0, 64, 0), IVec3::new(2, 68, 0));
    world.fill(&bridge, BlockDescriptor::new("spruce_planks"));

    let animator = AnimatorBuilder::new()
        .with_config(AnimatorConfig::default().default_speed(5.0))
        .with_world("overworld", world.clone())
        .with_protection_hook(Arc::new(MoatGuard))
        .build()
        .context("failed to build animator")?;
    let clock = animator.start_clock();

    let keeper = Actor::new("keeper");
    let id = animator.add_structure(
        Structure::new("castle bridge", "drawbridge", "overworld", bridge, keeper.id)
            .with_engine(IVec3::new(0, 64, 0))
            .with_open_direction(MovementDirection::North)
            .with_capability(Capability::Timer {
                auto_close_secs: 2,
                auto_open_secs: -1,
            }),
    );

    let mut events = animator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ToggleEvent::Prepared(data) => info!(action = %data.action, "Bridge toggle prepared"),
                ToggleEvent::Started(data) => info!(target = %data.target, "Bridge moving"),
                ToggleEvent::Ended(data, reason) => {
                    info!(structure = %data.structure_id(), reason = ?reason, "Bridge stopped")
                }
            }
        }
    });

    let lower = ToggleRequest::builder(id)
        .action(ActionType::Open)
        .cause(ToggleCause::Player)
        .actor(keeper.clone())
        .build()?;
    let handle = animator.submit(lower).await?;
    let halfway = handle.wait_for_progress(0.5).await;
    info!(progress = halfway.progress, ticks = halfway.elapsed_ticks, "Halfway down");
    match handle.wait().await {
        AnimationOutcome::Completed { cuboid, .. } => {
            info!(cuboid = %cuboid, blocks = world.solid_blocks_in(&cuboid), "Bridge lowered")
        }
        other => anyhow::bail!("bridge did not lower: {:?}", other),
    }

    // A second OPEN is redundant and rejected.
    let again = ToggleRequest::builder(id)
        .action(ActionType::Open)
        .cause(ToggleCause::Player)
        .actor(keeper)
        .build()?;
    if let AnimationOutcome::Rejected(reason) = animator.toggle(again).await {
        info!(reason = %reason, "Second open rejected");
    }

    // The timer raises the bridge again.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let raised = animator.structure(id).context("bridge vanished")?;
    info!(open = raised.is_open, cuboid = %raised.cuboid, "After auto-close");

    if let Some(metrics) = animator.metrics() {
        println!("{}", metrics.gather_text()?);
    }
    clock.abort();
    Ok(())
}
