//! Toggle requests
//!
//! ## Table of Contents
//! - **ToggleRequest**: One toggle attempt, consumed by the pipeline
//! - **ToggleRequestBuilder**: Builder that validates cause/actor consistency

use crate::error::{AnimatorError, Result};
use crate::messaging::BoxedMessageSink;
use crate::types::{ActionType, Actor, StructureId, ToggleCause};
use std::time::Duration;

/// One toggle attempt
#[derive(Clone)]
pub struct ToggleRequest {
    structure_id: StructureId,
    action: ActionType,
    cause: ToggleCause,
    actor: Option<Actor>,
    duration: Option<Duration>,
    skip_animation: bool,
    message_sink: Option<BoxedMessageSink>,
    bypass_lock: bool,
}

impl ToggleRequest {
    /// Start building a request for a structure
    pub fn builder(structure_id: StructureId) -> ToggleRequestBuilder {
        ToggleRequestBuilder::new(structure_id)
    }

    /// Target structure
    pub fn structure_id(&self) -> StructureId {
        self.structure_id
    }

    /// Requested action, not yet resolved against the structure
    pub fn action(&self) -> ActionType {
        self.action
    }

    /// Why the toggle happens
    pub fn cause(&self) -> ToggleCause {
        self.cause
    }

    /// Actor that asked, if any
    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    /// Requested animation length, before clamping
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Whether the animation jumps straight to the end
    pub fn skip_animation(&self) -> bool {
        self.skip_animation
    }

    /// Sink overriding the animator's default for rejection messages
    pub fn message_sink(&self) -> Option<&BoxedMessageSink> {
        self.message_sink.as_ref()
    }

    /// Whether the lock check is skipped
    pub fn bypass_lock(&self) -> bool {
        self.bypass_lock || self.actor.as_ref().is_some_and(|a| a.bypass)
    }

    /// Whether the permission check is skipped
    pub(crate) fn bypass_permission(&self) -> bool {
        self.actor.as_ref().map_or(true, |a| a.bypass)
    }
}

impl std::fmt::Debug for ToggleRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleRequest")
            .field("structure_id", &self.structure_id)
            .field("action", &self.action)
            .field("cause", &self.cause)
            .field("actor", &self.actor)
            .field("duration", &self.duration)
            .field("skip_animation", &self.skip_animation)
            .field("has_message_sink", &self.message_sink.is_some())
            .field("bypass_lock", &self.bypass_lock)
            .finish()
    }
}

/// Builder for [`ToggleRequest`]
#[derive(Clone)]
pub struct ToggleRequestBuilder {
    structure_id: StructureId,
    action: ActionType,
    cause: ToggleCause,
    actor: Option<Actor>,
    duration: Option<Duration>,
    skip_animation: bool,
    message_sink: Option<BoxedMessageSink>,
    bypass_lock: bool,
}

impl ToggleRequestBuilder {
    /// A TOGGLE by the server, with default duration
    pub fn new(structure_id: StructureId) -> Self {
        Self {
            structure_id,
            action: ActionType::Toggle,
            cause: ToggleCause::Server,
            actor: None,
            duration: None,
            skip_animation: false,
            message_sink: None,
            bypass_lock: false,
        }
    }

    /// Set the action
    pub fn action(mut self, action: ActionType) -> Self {
        self.action = action;
        self
    }

    /// Set the cause
    pub fn cause(mut self, cause: ToggleCause) -> Self {
        self.cause = cause;
        self
    }

    /// Set the responsible actor
    pub fn actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Request an animation length
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Jump straight to the final configuration
    pub fn skip_animation(mut self, skip: bool) -> Self {
        self.skip_animation = skip;
        self
    }

    /// Send rejection messages through this sink
    pub fn message_sink(mut self, sink: BoxedMessageSink) -> Self {
        self.message_sink = Some(sink);
        self
    }

    /// Ignore the structure's lock flag
    pub fn bypass_lock(mut self, bypass: bool) -> Self {
        self.bypass_lock = bypass;
        self
    }

    /// Finish the request
    pub fn build(self) -> Result<ToggleRequest> {
        if self.cause == ToggleCause::Player && self.actor.is_none() {
            return Err(AnimatorError::config(
                "a player-caused toggle needs a responsible actor",
            ));
        }
        if let Some(duration) = self.duration {
            if duration.is_zero() {
                return Err(AnimatorError::config("requested duration must be positive"));
            }
        }

        Ok(ToggleRequest {
            structure_id: self.structure_id,
            action: self.action,
            cause: self.cause,
            actor: self.actor,
            duration: self.duration,
            skip_animation: self.skip_animation,
            message_sink: self.message_sink,
            bypass_lock: self.bypass_lock,
        })
    }
}
