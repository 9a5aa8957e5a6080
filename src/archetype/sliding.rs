//! Archetypes that translate along an axis

use super::{invalid_direction, is_opening, Archetype, GeometryError, TargetGeometry};
use crate::geometry::Motion;
use crate::structure::StructureSnapshot;
use crate::types::{ActionType, MovementDirection};
use glam::IVec3;

/// Offset for opening `blocks` far towards `direction`, negated when closing
fn linear_motion(
    direction: MovementDirection,
    blocks: u32,
    opening: bool,
) -> Result<Motion, GeometryError> {
    if blocks == 0 {
        return Err(GeometryError::NoMovement);
    }
    let unit = direction.offset().ok_or_else(|| invalid_direction(direction))?;
    let offset = unit * blocks as i32;
    let offset = if opening { offset } else { -offset };
    Ok(Motion::Translate {
        offset: offset.as_dvec3(),
    })
}

/// Gate that slides straight up or down
#[derive(Debug, Clone, Copy, Default)]
pub struct Portcullis;

impl Archetype for Portcullis {
    fn kind(&self) -> &str {
        "portcullis"
    }

    fn compute_target(
        &self,
        snapshot: &StructureSnapshot,
        action: ActionType,
    ) -> Result<TargetGeometry, GeometryError> {
        let direction = snapshot.open_direction();
        if !matches!(direction, MovementDirection::Up | MovementDirection::Down) {
            return Err(invalid_direction(direction));
        }
        let blocks = snapshot
            .blocks_to_move()
            .unwrap_or(snapshot.cuboid().dimensions().y as u32);
        let opening = is_opening(snapshot, action);
        let motion = linear_motion(direction, blocks, opening)?;
        Ok(TargetGeometry::from_motion(snapshot, motion, opening))
    }
}

/// Door that slides sideways
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingDoor;

impl Archetype for SlidingDoor {
    fn kind(&self) -> &str {
        "sliding_door"
    }

    fn compute_target(
        &self,
        snapshot: &StructureSnapshot,
        action: ActionType,
    ) -> Result<TargetGeometry, GeometryError> {
        let direction = snapshot.open_direction();
        if !direction.is_horizontal() {
            return Err(invalid_direction(direction));
        }
        let blocks = snapshot.blocks_to_move().unwrap_or_else(|| {
            let dims: IVec3 = snapshot.cuboid().dimensions();
            match direction {
                MovementDirection::East | MovementDirection::West => dims.x as u32,
                _ => dims.z as u32,
            }
        });
        let opening = is_opening(snapshot, action);
        let motion = linear_motion(direction, blocks, opening)?;
        Ok(TargetGeometry::from_motion(snapshot, motion, opening))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cuboid;
    use crate::structure::{Capability, Structure};
    use crate::types::ActorId;

    fn structure(kind: &str, direction: MovementDirection) -> Structure {
        Structure::new(
            "gate",
            kind,
            "overworld",
            Cuboid::new(IVec3::ZERO, IVec3::new(3, 2, 0)),
            ActorId::new(),
        )
        .with_open_direction(direction)
    }

    #[test]
    fn test_portcullis_defaults_to_height() {
        let snap = structure("portcullis", MovementDirection::Up).snapshot();
        let target = Portcullis.compute_target(&snap, ActionType::Open).unwrap();
        assert_eq!(target.new_cuboid, Cuboid::new(IVec3::new(0, 3, 0), IVec3::new(3, 5, 0)));
    }

    #[test]
    fn test_portcullis_discrete_distance_round_trip() {
        let base = structure("portcullis", MovementDirection::Down)
            .with_capability(Capability::DiscreteMovement { blocks: 2 });
        let open = Portcullis.compute_target(&base.snapshot(), ActionType::Open).unwrap();
        assert_eq!(open.new_cuboid.min(), IVec3::new(0, -2, 0));

        let mut opened = base.clone();
        opened.cuboid = open.new_cuboid;
        opened.is_open = true;
        let close = Portcullis.compute_target(&opened.snapshot(), ActionType::Close).unwrap();
        assert_eq!(close.new_cuboid, base.cuboid);
    }

    #[test]
    fn test_portcullis_rejects_zero_distance() {
        let snap = structure("portcullis", MovementDirection::Up)
            .with_capability(Capability::DiscreteMovement { blocks: 0 })
            .snapshot();
        assert_eq!(
            Portcullis.compute_target(&snap, ActionType::Open).unwrap_err(),
            GeometryError::NoMovement
        );
    }

    #[test]
    fn test_sliding_door_moves_its_width() {
        let snap = structure("sliding_door", MovementDirection::West).snapshot();
        let target = SlidingDoor.compute_target(&snap, ActionType::Open).unwrap();
        assert_eq!(target.new_cuboid, Cuboid::new(IVec3::new(-4, 0, 0), IVec3::new(-1, 2, 0)));

        let snap = structure("sliding_door", MovementDirection::Up).snapshot();
        assert!(SlidingDoor.compute_target(&snap, ActionType::Open).is_err());
    }
}
