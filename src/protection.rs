//! Protection boundary
//!
//! ## Table of Contents
//! - **ProtectionHook**: External authority that may veto block modification
//! - **ProtectionManager**: Queries every hook under one deadline
//!
//! This is the only place the toggle pipeline suspends on an external call.

use crate::error::ToggleRejection;
use crate::geometry::Cuboid;
use crate::types::{ActorId, WorldId};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// External authority consulted before a structure moves
#[async_trait]
pub trait ProtectionHook: Send + Sync {
    /// Authority name reported when it denies access
    fn name(&self) -> &str;

    /// Whether `actor` may modify every block of `region` in `world`
    async fn can_modify(&self, actor: ActorId, world: &WorldId, region: &Cuboid) -> bool;
}

/// Type alias for a shared hook
pub type BoxedProtectionHook = Arc<dyn ProtectionHook>;

/// Queries every registered hook under one deadline
#[derive(Clone, Default)]
pub struct ProtectionManager {
    hooks: Vec<BoxedProtectionHook>,
}

impl ProtectionManager {
    /// Create a manager without hooks (allows everything)
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Register a hook
    pub fn add_hook(&mut self, hook: BoxedProtectionHook) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hook is registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Check a region. The first denying hook in registration order is
    /// reported; a deadline overrun is a rejection of its own.
    pub async fn check(
        &self,
        actor: ActorId,
        world: &WorldId,
        region: &Cuboid,
        timeout: Duration,
    ) -> Result<(), ToggleRejection> {
        if self.hooks.is_empty() {
            return Ok(());
        }

        let queries = self.hooks.iter().map(|hook| async move {
            let allowed = hook.can_modify(actor, world, region).await;
            (hook.name().to_string(), allowed)
        });

        let answers = match tokio::time::timeout(timeout, join_all(queries)).await {
            Ok(answers) => answers,
            Err(_) => {
                warn!(
                    actor = %actor,
                    world = %world,
                    timeout_ms = timeout.as_millis() as u64,
                    "Protection check timed out"
                );
                return Err(ToggleRejection::AccessCheckTimedOut);
            }
        };

        match answers.into_iter().find(|(_, allowed)| !allowed) {
            Some((authority, _)) => {
                debug!(actor = %actor, authority = %authority, region = %region, "Protection denied");
                Err(ToggleRejection::AccessDenied { authority })
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProtectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("ProtectionManager").field("hooks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    struct Fixed {
        name: &'static str,
        allow: bool,
        delay: Duration,
    }

    #[async_trait]
    impl ProtectionHook for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn can_modify(&self, _actor: ActorId, _world: &WorldId, _region: &Cuboid) -> bool {
            tokio::time::sleep(self.delay).await;
            self.allow
        }
    }

    fn hook(name: &'static str, allow: bool, delay_ms: u64) -> BoxedProtectionHook {
        Arc::new(Fixed {
            name,
            allow,
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn region() -> Cuboid {
        Cuboid::new(IVec3::ZERO, IVec3::splat(3))
    }

    #[tokio::test]
    async fn test_no_hooks_allows() {
        let manager = ProtectionManager::new();
        let result = manager
            .check(ActorId::new(), &"overworld".into(), &region(), Duration::from_secs(1))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_first_denial_is_reported() {
        let mut manager = ProtectionManager::new();
        manager.add_hook(hook("Towny", true, 0));
        manager.add_hook(hook("WorldGuard", false, 0));
        manager.add_hook(hook("GriefPrevention", false, 0));

        let result = manager
            .check(ActorId::new(), &"overworld".into(), &region(), Duration::from_secs(1))
            .await;
        assert_eq!(
            result,
            Err(ToggleRejection::AccessDenied {
                authority: "WorldGuard".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_hook_times_out() {
        let mut manager = ProtectionManager::new();
        manager.add_hook(hook("SlowPlugin", true, 10_000));

        let result = manager
            .check(ActorId::new(), &"overworld".into(), &region(), Duration::from_millis(500))
            .await;
        assert_eq!(result, Err(ToggleRejection::AccessCheckTimedOut));
    }
}
