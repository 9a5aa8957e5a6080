//! Core types for structure animation
//!
//! ## Table of Contents
//! - **StructureId**: Unique identifier for a structure
//! - **ActorId / Actor**: Who is responsible for a toggle
//! - **WorldId**: Identifier of a simulated world
//! - **PermissionLevel**: Ownership tiers on a structure
//! - **ActionType / ToggleCause**: What a toggle asks for and why
//! - **MovementDirection**: Open direction of a structure

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureId(Uuid);

impl StructureId {
    /// Create a new random StructureId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a StructureId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StructureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "structure-{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for an actor (usually a player)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(Uuid);

impl ActorId {
    /// Create a new random ActorId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", &self.0.to_string()[..8])
    }
}

/// The party responsible for a toggle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier
    pub id: ActorId,
    /// Display name
    pub name: String,
    /// Operators bypass permission and lock checks
    pub bypass: bool,
}

impl Actor {
    /// Create a new actor without bypass rights
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(),
            name: name.into(),
            bypass: false,
        }
    }

    /// Use a specific id
    pub fn with_id(mut self, id: ActorId) -> Self {
        self.id = id;
        self
    }

    /// Grant or revoke bypass rights
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }
}

/// Identifier of a simulated world
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldId(String);

impl WorldId {
    /// Create a new world id
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get world name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorldId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for WorldId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Ownership tier on a structure. Lower is more privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// The structure's creator
    Creator = 0,
    /// Co-owner with administrative rights
    Admin = 100,
    /// Co-owner allowed to use the structure
    User = 200,
    /// Not an owner
    NoPermission = 999,
}

impl PermissionLevel {
    /// Whether this level is at least as privileged as `required`
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        self <= required
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creator => "creator",
            Self::Admin => "admin",
            Self::User => "user",
            Self::NoPermission => "none",
        };
        f.write_str(name)
    }
}

/// Operations on a structure that are gated by ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureAttribute {
    /// Open, close or toggle
    Toggle,
    /// Lock or unlock
    Lock,
    /// Delete the structure
    Delete,
}

impl StructureAttribute {
    /// Default level required for this attribute
    pub fn required_level(self) -> PermissionLevel {
        match self {
            Self::Toggle => PermissionLevel::User,
            Self::Lock => PermissionLevel::Admin,
            Self::Delete => PermissionLevel::Creator,
        }
    }
}

/// What a toggle request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// Move to the open state
    Open,
    /// Move to the closed state
    Close,
    /// Flip the current state
    Toggle,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Toggle => "toggle",
        };
        f.write_str(name)
    }
}

/// Why a toggle was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToggleCause {
    /// A player command or interaction
    Player,
    /// A redstone signal
    Redstone,
    /// The server or an API call
    Server,
    /// A scheduled auto-close or auto-open
    AutoClose,
    /// A perpetual mover re-toggling itself
    Perpetual,
}

impl ToggleCause {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Redstone => "redstone",
            Self::Server => "server",
            Self::AutoClose => "autoclose",
            Self::Perpetual => "perpetual",
        }
    }

    /// Whether the request was generated by the animator itself
    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::AutoClose | Self::Perpetual)
    }
}

impl fmt::Display for ToggleCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction a structure moves when it opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementDirection {
    /// Towards negative z
    North,
    /// Towards positive x
    East,
    /// Towards positive z
    South,
    /// Towards negative x
    West,
    /// Towards positive y
    Up,
    /// Towards negative y
    Down,
    /// Clockwise seen from above
    Clockwise,
    /// Counter-clockwise seen from above
    CounterClockwise,
    /// Not set
    None,
}

impl MovementDirection {
    /// Unit offset for linear directions
    pub fn offset(&self) -> Option<glam::IVec3> {
        match self {
            Self::North => Some(glam::IVec3::new(0, 0, -1)),
            Self::East => Some(glam::IVec3::new(1, 0, 0)),
            Self::South => Some(glam::IVec3::new(0, 0, 1)),
            Self::West => Some(glam::IVec3::new(-1, 0, 0)),
            Self::Up => Some(glam::IVec3::new(0, 1, 0)),
            Self::Down => Some(glam::IVec3::new(0, -1, 0)),
            _ => None,
        }
    }

    /// Whether this is one of the four horizontal compass directions
    pub fn is_horizontal(&self) -> bool {
        matches!(self, Self::North | Self::East | Self::South | Self::West)
    }
}

impl fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
