//! Spatial primitives
//!
//! ## Table of Contents
//! - **Cuboid**: Inclusive axis-aligned box of block coordinates
//! - **RotationAxis**: World axis a rotation happens around
//! - **Motion**: Kinematic description of how blocks travel during an animation

use glam::{DQuat, DVec3, IVec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive axis-aligned box of block coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cuboid {
    min: IVec3,
    max: IVec3,
}

impl Cuboid {
    /// Create a cuboid spanning two corners in any order
    pub fn new(a: IVec3, b: IVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Cuboid covering a single block
    pub fn single(pos: IVec3) -> Self {
        Self { min: pos, max: pos }
    }

    /// Lowest corner
    pub fn min(&self) -> IVec3 {
        self.min
    }

    /// Highest corner
    pub fn max(&self) -> IVec3 {
        self.max
    }

    /// Size in blocks along each axis
    pub fn dimensions(&self) -> IVec3 {
        self.max - self.min + IVec3::ONE
    }

    /// Number of blocks inside the cuboid
    pub fn volume(&self) -> u64 {
        let d = self.dimensions();
        d.x as u64 * d.y as u64 * d.z as u64
    }

    /// Whether a block position lies inside
    pub fn contains(&self, pos: IVec3) -> bool {
        pos.cmpge(self.min).all() && pos.cmple(self.max).all()
    }

    /// Whether two cuboids share at least one block
    pub fn intersects(&self, other: &Cuboid) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Smallest cuboid containing both
    pub fn union(&self, other: &Cuboid) -> Cuboid {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Shift by an offset
    pub fn translate(&self, offset: IVec3) -> Cuboid {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Rotate around `pivot`, snapping the result back onto the block grid.
    ///
    /// Exact for quarter turns; other angles yield the bounding box of the
    /// rotated corners.
    pub fn rotate(&self, pivot: DVec3, axis: RotationAxis, angle: f64) -> Cuboid {
        let corners = self.corners().map(|c| round_to_block(rotate_point(c.as_dvec3(), pivot, axis, angle)));
        let (min, max) = corners
            .iter()
            .skip(1)
            .fold((corners[0], corners[0]), |(lo, hi), c| (lo.min(*c), hi.max(*c)));
        Self { min, max }
    }

    /// Geometric center
    pub fn center(&self) -> DVec3 {
        (self.min.as_dvec3() + self.max.as_dvec3()) * 0.5
    }

    /// Iterate all block positions, x fastest then z then y
    pub fn positions(&self) -> impl Iterator<Item = IVec3> + '_ {
        (self.min.y..=self.max.y).flat_map(move |y| {
            (self.min.z..=self.max.z)
                .flat_map(move |z| (self.min.x..=self.max.x).map(move |x| IVec3::new(x, y, z)))
        })
    }

    fn corners(&self) -> [IVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            IVec3::new(a.x, a.y, a.z),
            IVec3::new(b.x, a.y, a.z),
            IVec3::new(a.x, b.y, a.z),
            IVec3::new(a.x, a.y, b.z),
            IVec3::new(b.x, b.y, a.z),
            IVec3::new(b.x, a.y, b.z),
            IVec3::new(a.x, b.y, b.z),
            IVec3::new(b.x, b.y, b.z),
        ]
    }
}

impl fmt::Display for Cuboid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}] -> [{}, {}, {}]",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}

/// World axis a rotation happens around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationAxis {
    /// East-west axis
    X,
    /// Vertical axis
    Y,
    /// North-south axis
    Z,
}

impl RotationAxis {
    /// Unit vector along the axis
    pub fn unit(&self) -> DVec3 {
        match self {
            Self::X => DVec3::X,
            Self::Y => DVec3::Y,
            Self::Z => DVec3::Z,
        }
    }
}

/// Rotate `point` around the line through `pivot` along `axis`
pub fn rotate_point(point: DVec3, pivot: DVec3, axis: RotationAxis, angle: f64) -> DVec3 {
    pivot + DQuat::from_axis_angle(axis.unit(), angle) * (point - pivot)
}

/// Snap an interpolated position to the nearest block
pub fn round_to_block(pos: DVec3) -> IVec3 {
    pos.round().as_ivec3()
}

/// How blocks travel from their origin to their final position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Blocks stay where they are
    Stationary,
    /// Linear translation
    Translate {
        /// Total displacement at progress 1.0
        offset: DVec3,
    },
    /// Rotation around a line
    Rotate {
        /// A point on the rotation line
        pivot: DVec3,
        /// Direction of the rotation line
        axis: RotationAxis,
        /// Total angle in radians at progress 1.0
        angle: f64,
    },
}

impl Motion {
    /// Interpolated position of a block at `progress` in `[0, 1]`
    pub fn position_at(&self, origin: DVec3, progress: f64) -> DVec3 {
        let t = progress.clamp(0.0, 1.0);
        match *self {
            Self::Stationary => origin,
            Self::Translate { offset } => origin + offset * t,
            Self::Rotate { pivot, axis, angle } => rotate_point(origin, pivot, axis, angle * t),
        }
    }

    /// Block a real block ends up in once the motion completes
    pub fn final_position(&self, origin: IVec3) -> IVec3 {
        round_to_block(self.position_at(origin.as_dvec3(), 1.0))
    }

    /// Apply the full motion to a cuboid
    pub fn apply(&self, cuboid: &Cuboid) -> Cuboid {
        match *self {
            Self::Stationary => *cuboid,
            Self::Translate { offset } => cuboid.translate(round_to_block(offset)),
            Self::Rotate { pivot, axis, angle } => cuboid.rotate(pivot, axis, angle),
        }
    }

    /// Longest distance any block of `cuboid` travels
    pub fn max_travel(&self, cuboid: &Cuboid) -> f64 {
        match *self {
            Self::Stationary => 0.0,
            Self::Translate { offset } => offset.length(),
            Self::Rotate { pivot, axis, angle } => {
                let radius = cuboid
                    .corners()
                    .iter()
                    .map(|c| {
                        let rel = c.as_dvec3() - pivot;
                        rel.reject_from_normalized(axis.unit()).length()
                    })
                    .fold(0.0_f64, f64::max);
                radius * angle.abs()
            }
        }
    }
}
