//! Error types for the structure animator
//!
//! ## Table of Contents
//! - **AnimatorError**: Infrastructure and block-mover level failures
//! - **ToggleRejection**: Typed rejection outcomes of the toggle pipeline
//! - **Result**: Type alias for `Result<T, AnimatorError>`

use crate::archetype::GeometryError;
use crate::messaging::keys;
use crate::world::WorldError;
use thiserror::Error;

/// Result type alias for animator operations
pub type Result<T> = std::result::Result<T, AnimatorError>;

/// Main error type for animator operations
#[derive(Error, Debug)]
pub enum AnimatorError {
    /// Configuration error during builder setup or request construction
    #[error("configuration error: {0}")]
    Config(String),

    /// World boundary failure
    #[error("world error: {0}")]
    World(#[from] WorldError),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// The animation was aborted before completion and rolled back
    #[error("animation of {0} aborted")]
    AnimationAborted(String),

    /// The animation failed mid-flight and was rolled back
    #[error("animation failed: {0}")]
    AnimationFailed(String),

    /// Metrics registration or export failure
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Reading a config file failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnimatorError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an animation failure
    pub fn animation_failed(msg: impl Into<String>) -> Self {
        Self::AnimationFailed(msg.into())
    }
}

impl From<prometheus::Error> for AnimatorError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

/// Why the toggle pipeline refused a request.
///
/// Rejections are values, not faults: the caller may retry, and none of them
/// leaves a registry reservation behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToggleRejection {
    /// No structure with the requested id exists
    #[error("structure {0} does not exist")]
    StructureNotFound(String),

    /// OPEN on an open structure, or CLOSE on a closed one
    #[error("structure is already {state}")]
    ActionNotApplicable {
        /// Current state of the structure ("open" or "closed")
        state: &'static str,
    },

    /// OPEN/CLOSE requested on an archetype without an open/closed concept
    #[error("action {action} is not supported by archetype {kind}")]
    UnsupportedActionType {
        /// Requested action
        action: String,
        /// Archetype kind key
        kind: String,
    },

    /// The actor's permission level is too low for the action
    #[error("permission level {actual} does not satisfy required level {required}")]
    PermissionDenied {
        /// Level required by the structure
        required: String,
        /// Level the actor holds
        actual: String,
    },

    /// The structure is locked
    #[error("structure is locked")]
    StructureLocked,

    /// Another animation already holds the reservation
    #[error("structure is already animating")]
    AnimationInProgress,

    /// The structure's world is not registered or its region is not loaded
    #[error("world {0} is unavailable")]
    WorldUnavailable(String),

    /// The archetype could not compute a target
    #[error("invalid target geometry: {0}")]
    InvalidTargetGeometry(String),

    /// An external protection authority refused access
    #[error("access denied by {authority}")]
    AccessDenied {
        /// Name of the denying protection hook
        authority: String,
    },

    /// The protection check did not answer in time
    #[error("access check timed out")]
    AccessCheckTimedOut,

    /// A prepare listener cancelled the toggle
    #[error("cancelled by extension: {0}")]
    CancelledByExtension(String),
}

impl ToggleRejection {
    /// Localized message key sent to the responsible actor
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::StructureNotFound(_) => keys::NOT_FOUND,
            Self::ActionNotApplicable { state: "open" } => keys::ALREADY_OPEN,
            Self::ActionNotApplicable { .. } => keys::ALREADY_CLOSED,
            Self::UnsupportedActionType { .. } => keys::UNSUPPORTED_ACTION,
            Self::PermissionDenied { .. } => keys::NO_PERMISSION,
            Self::StructureLocked => keys::LOCKED,
            Self::AnimationInProgress => keys::BUSY,
            Self::WorldUnavailable(_) => keys::WORLD_UNAVAILABLE,
            Self::InvalidTargetGeometry(_) => keys::INVALID_GEOMETRY,
            Self::AccessDenied { .. } => keys::ACCESS_DENIED,
            Self::AccessCheckTimedOut => keys::ACCESS_TIMEOUT,
            Self::CancelledByExtension(_) => keys::CANCELLED,
        }
    }

    /// Arguments substituted into the localized message
    pub fn message_args(&self) -> Vec<String> {
        match self {
            Self::StructureNotFound(id) => vec![id.clone()],
            Self::UnsupportedActionType { action, kind } => vec![action.clone(), kind.clone()],
            Self::PermissionDenied { required, .. } => vec![required.clone()],
            Self::WorldUnavailable(world) => vec![world.clone()],
            Self::InvalidTargetGeometry(reason) => vec![reason.clone()],
            Self::AccessDenied { authority } => vec![authority.clone()],
            Self::CancelledByExtension(reason) => vec![reason.clone()],
            _ => Vec::new(),
        }
    }

    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::StructureNotFound(_) => "not_found",
            Self::ActionNotApplicable { .. } => "action_not_applicable",
            Self::UnsupportedActionType { .. } => "unsupported_action",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::StructureLocked => "locked",
            Self::AnimationInProgress => "in_progress",
            Self::WorldUnavailable(_) => "world_unavailable",
            Self::InvalidTargetGeometry(_) => "invalid_geometry",
            Self::AccessDenied { .. } => "access_denied",
            Self::AccessCheckTimedOut => "access_timeout",
            Self::CancelledByExtension(_) => "cancelled",
        }
    }
}

impl From<GeometryError> for ToggleRejection {
    fn from(err: GeometryError) -> Self {
        Self::InvalidTargetGeometry(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_message_keys() {
        assert_eq!(
            ToggleRejection::ActionNotApplicable { state: "open" }.message_key(),
            keys::ALREADY_OPEN
        );
        assert_eq!(
            ToggleRejection::ActionNotApplicable { state: "closed" }.message_key(),
            keys::ALREADY_CLOSED
        );
        assert_eq!(ToggleRejection::StructureLocked.message_key(), keys::LOCKED);
    }

    #[test]
    fn test_access_denied_names_authority() {
        let rejection = ToggleRejection::AccessDenied {
            authority: "WorldGuard".to_string(),
        };
        assert_eq!(rejection.to_string(), "access denied by WorldGuard");
        assert_eq!(rejection.message_args(), vec!["WorldGuard".to_string()]);
    }

    #[test]
    fn test_geometry_error_conversion() {
        let rejection: ToggleRejection = GeometryError::InvalidDirection("Up".to_string()).into();
        assert!(matches!(rejection, ToggleRejection::InvalidTargetGeometry(_)));
    }
}
