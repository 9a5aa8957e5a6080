//! Archetypes that swing around their engine

use super::{invalid_direction, is_opening, Archetype, GeometryError, TargetGeometry};
use crate::geometry::{Motion, RotationAxis};
use crate::structure::StructureSnapshot;
use crate::types::{ActionType, MovementDirection};
use std::f64::consts::FRAC_PI_2;

/// Quarter-turn angle around the vertical axis for a turning direction
fn quarter_turn(direction: MovementDirection) -> Result<f64, GeometryError> {
    match direction {
        MovementDirection::Clockwise => Ok(-FRAC_PI_2),
        MovementDirection::CounterClockwise => Ok(FRAC_PI_2),
        other => Err(invalid_direction(other)),
    }
}

/// Door hinged on a vertical line through its engine
#[derive(Debug, Clone, Copy, Default)]
pub struct BigDoor;

impl Archetype for BigDoor {
    fn kind(&self) -> &str {
        "big_door"
    }

    fn compute_target(
        &self,
        snapshot: &StructureSnapshot,
        action: ActionType,
    ) -> Result<TargetGeometry, GeometryError> {
        let angle = quarter_turn(snapshot.open_direction())?;
        let opening = is_opening(snapshot, action);
        let motion = Motion::Rotate {
            pivot: snapshot.engine().as_dvec3(),
            axis: RotationAxis::Y,
            angle: if opening { angle } else { -angle },
        };
        Ok(TargetGeometry::from_motion(snapshot, motion, opening))
    }
}

/// Bridge that tips over a horizontal line through its engine
#[derive(Debug, Clone, Copy, Default)]
pub struct Drawbridge;

impl Drawbridge {
    /// Axis and angle that lower the bridge towards `direction`
    fn lowering(direction: MovementDirection) -> Result<(RotationAxis, f64), GeometryError> {
        match direction {
            MovementDirection::North => Ok((RotationAxis::X, -FRAC_PI_2)),
            MovementDirection::South => Ok((RotationAxis::X, FRAC_PI_2)),
            MovementDirection::East => Ok((RotationAxis::Z, -FRAC_PI_2)),
            MovementDirection::West => Ok((RotationAxis::Z, FRAC_PI_2)),
            other => Err(invalid_direction(other)),
        }
    }
}

impl Archetype for Drawbridge {
    fn kind(&self) -> &str {
        "drawbridge"
    }

    fn compute_target(
        &self,
        snapshot: &StructureSnapshot,
        action: ActionType,
    ) -> Result<TargetGeometry, GeometryError> {
        let (axis, angle) = Self::lowering(snapshot.open_direction())?;
        let opening = is_opening(snapshot, action);
        let motion = Motion::Rotate {
            pivot: snapshot.engine().as_dvec3(),
            axis,
            angle: if opening { angle } else { -angle },
        };
        Ok(TargetGeometry::from_motion(snapshot, motion, opening))
    }
}

/// Door that keeps turning a quarter turn per toggle and is never open or closed
#[derive(Debug, Clone, Copy, Default)]
pub struct RevolvingDoor;

impl Archetype for RevolvingDoor {
    fn kind(&self) -> &str {
        "revolving_door"
    }

    fn has_open_status(&self) -> bool {
        false
    }

    fn compute_target(
        &self,
        snapshot: &StructureSnapshot,
        _action: ActionType,
    ) -> Result<TargetGeometry, GeometryError> {
        let motion = Motion::Rotate {
            pivot: snapshot.engine().as_dvec3(),
            axis: RotationAxis::Y,
            angle: quarter_turn(snapshot.open_direction())?,
        };
        Ok(TargetGeometry::from_motion(snapshot, motion, snapshot.is_open()))
    }
}
