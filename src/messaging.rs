//! Messaging boundary for player-facing feedback
//!
//! Every pipeline rejection sends exactly one localized message to the actor
//! that asked; successful toggles stay silent.

use crate::types::Actor;
use std::sync::Arc;
use tracing::info;

/// Delivers localized messages to actors
pub trait MessageSink: Send + Sync {
    /// Send the message identified by `key`
    fn send_message(&self, actor: &Actor, key: &str, args: &[String]);
}

/// Type alias for a shared sink
pub type BoxedMessageSink = Arc<dyn MessageSink>;

/// Sink that writes messages to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessageSink;

impl MessageSink for LogMessageSink {
    fn send_message(&self, actor: &Actor, key: &str, args: &[String]) {
        info!(actor = %actor.name, key = %key, args = ?args, "Message to actor");
    }
}

/// Localized message keys
pub mod keys {
    /// Structure id does not resolve
    pub const NOT_FOUND: &str = "toggle.error.not_found";
    /// OPEN on an open structure
    pub const ALREADY_OPEN: &str = "toggle.error.already_open";
    /// CLOSE on a closed structure
    pub const ALREADY_CLOSED: &str = "toggle.error.already_closed";
    /// OPEN/CLOSE on an archetype without open status
    pub const UNSUPPORTED_ACTION: &str = "toggle.error.unsupported_action";
    /// Actor lacks the required level
    pub const NO_PERMISSION: &str = "toggle.error.no_permission";
    /// Structure is locked
    pub const LOCKED: &str = "toggle.error.locked";
    /// Structure is already animating
    pub const BUSY: &str = "toggle.error.busy";
    /// World or region is not available
    pub const WORLD_UNAVAILABLE: &str = "toggle.error.world_unavailable";
    /// Archetype could not compute a target
    pub const INVALID_GEOMETRY: &str = "toggle.error.invalid_geometry";
    /// Protection hook refused
    pub const ACCESS_DENIED: &str = "toggle.error.access_denied";
    /// Protection hooks did not answer in time
    pub const ACCESS_TIMEOUT: &str = "toggle.error.access_timeout";
    /// A listener cancelled the toggle
    pub const CANCELLED: &str = "toggle.error.cancelled";
}
