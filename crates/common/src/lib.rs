//! Shared types for the physlink workspace: typed ids, id allocation, poses.
//!
//! # Invariants
//! - Ids are small positive integers and are never reused within a session.

mod types;

pub use glam::{EulerRot, Quat, Vec3};
pub use types::{ConstraintId, IdAllocator, MaterialId, ObjectId, Pose, VehicleId};

pub fn crate_info() -> &'static str {
    "physlink-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
