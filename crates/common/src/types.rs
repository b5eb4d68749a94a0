use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! report_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Decode an id stored as a float inside a binary report.
            ///
            /// Returns `None` for anything that cannot be a valid id: zero,
            /// negative, fractional or non-finite values.
            pub fn from_report(value: f32) -> Option<Self> {
                if value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f32 {
                    Some(Self(value as u32))
                } else {
                    None
                }
            }

            /// Encode the id the way reports carry it.
            pub fn to_report(self) -> f32 {
                self.0 as f32
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

report_id!(
    /// Identifier of a registered body (rigid, soft or compound child).
    ObjectId,
    "object"
);
report_id!(
    /// Identifier of a registered constraint.
    ConstraintId,
    "constraint"
);
report_id!(
    /// Identifier of a registered raycast vehicle.
    VehicleId,
    "vehicle"
);

/// Identifier of a shared physics material, chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub u32);

/// Monotonic id source. Starts at 1 and never hands out the same value twice.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The value the next call to [`allocate`](Self::allocate) will return.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// World-space position and orientation of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub quaternion: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            quaternion: Quat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: Vec3, quaternion: Quat) -> Self {
        Self {
            position,
            quaternion,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Map a point expressed in this pose's local frame into world space.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.quaternion * local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_monotonic() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn report_id_rejects_invalid_floats() {
        assert_eq!(ObjectId::from_report(7.0), Some(ObjectId(7)));
        assert_eq!(ObjectId::from_report(0.0), None);
        assert_eq!(ObjectId::from_report(-3.0), None);
        assert_eq!(ObjectId::from_report(2.5), None);
        assert_eq!(ObjectId::from_report(f32::NAN), None);
    }

    #[test]
    fn pose_default_is_identity() {
        let p = Pose::default();
        assert_eq!(p.position, Vec3::ZERO);
        assert_eq!(p.quaternion, Quat::IDENTITY);
    }

    #[test]
    fn transform_point_rotates_then_translates() {
        let pose = Pose::new(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        );
        let world = pose.transform_point(Vec3::X);
        assert!((world - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn display_carries_kind() {
        assert_eq!(ObjectId(3).to_string(), "object#3");
        assert_eq!(VehicleId(1).to_string(), "vehicle#1");
    }
}
