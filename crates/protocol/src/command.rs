use glam::{Quat, Vec3};
use physlink_common::{ConstraintId, MaterialId, ObjectId, VehicleId};
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::report::SoftKind;

/// Collision shape of a body, chosen at construction.
///
/// Geometry extraction happens before registration; the variants carry the
/// already-computed parameters the simulation needs to build the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Cylinder { radius: f32, height: f32 },
    Capsule { radius: f32, height: f32 },
    Cone { radius: f32, height: f32 },
    Plane { normal: Vec3 },
    ConvexHull { points: Vec<Vec3> },
    Concave { triangles: Vec<[Vec3; 3]> },
    Heightfield { xpts: u32, zpts: u32, points: Vec<f32> },
    /// Container whose children carry the actual shapes.
    Compound,
    SoftTrimesh,
    Cloth { segments: [u32; 2] },
    Rope,
}

impl Shape {
    pub fn is_soft(&self) -> bool {
        self.soft_kind().is_some()
    }

    /// Vertex encoding used by soft-body reports for this shape.
    pub fn soft_kind(&self) -> Option<SoftKind> {
        match self {
            Self::SoftTrimesh => Some(SoftKind::Trimesh),
            Self::Cloth { .. } => Some(SoftKind::Cloth),
            Self::Rope => Some(SoftKind::Rope),
            _ => None,
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Box { .. } => "box",
            Self::Sphere { .. } => "sphere",
            Self::Cylinder { .. } => "cylinder",
            Self::Capsule { .. } => "capsule",
            Self::Cone { .. } => "cone",
            Self::Plane { .. } => "plane",
            Self::ConvexHull { .. } => "convex_hull",
            Self::Concave { .. } => "concave",
            Self::Heightfield { .. } => "heightfield",
            Self::Compound => "compound",
            Self::SoftTrimesh => "soft_trimesh",
            Self::Cloth { .. } => "cloth",
            Self::Rope => "rope",
        }
    }
}

/// Initial vertex data and tuning for a soft body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftProxy {
    /// World-space vertex positions, xyz-interleaved.
    pub positions: Vec<f32>,
    /// Triangle indices into `positions` (empty for ropes).
    pub indices: Vec<u32>,
    pub stiffness: f32,
    pub pressure: f32,
    pub iterations: u32,
}

/// A compound child, flattened into its root parent's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildProxy {
    pub id: ObjectId,
    pub shape: Shape,
    pub mass: f32,
    pub offset: Vec3,
    pub rotation: Quat,
}

/// Simulation-facing mirror of a registered body, sent with `addObject`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyProxy {
    pub id: ObjectId,
    pub shape: Shape,
    pub mass: f32,
    pub position: Vec3,
    pub quaternion: Quat,
    pub material: Option<MaterialId>,
    pub children: Vec<ChildProxy>,
    pub soft: Option<SoftProxy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialProxy {
    pub id: MaterialId,
    pub friction: f32,
    pub restitution: f32,
}

/// Kind tag of a constraint, used to validate kind-specific tuning ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKindTag {
    Point,
    Hinge,
    Slider,
    ConeTwist,
    SixDof,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintDef {
    Point {
        object_a: ObjectId,
        object_b: Option<ObjectId>,
        pivot: Vec3,
    },
    Hinge {
        object_a: ObjectId,
        object_b: Option<ObjectId>,
        pivot: Vec3,
        axis: Vec3,
    },
    Slider {
        object_a: ObjectId,
        object_b: Option<ObjectId>,
        pivot: Vec3,
        axis: Vec3,
    },
    ConeTwist {
        object_a: ObjectId,
        object_b: ObjectId,
        pivot: Vec3,
        axis_a: Vec3,
        axis_b: Vec3,
    },
    SixDof {
        object_a: ObjectId,
        object_b: Option<ObjectId>,
        pivot: Vec3,
        rotation: Quat,
    },
}

impl ConstraintDef {
    pub fn kind(&self) -> ConstraintKindTag {
        match self {
            Self::Point { .. } => ConstraintKindTag::Point,
            Self::Hinge { .. } => ConstraintKindTag::Hinge,
            Self::Slider { .. } => ConstraintKindTag::Slider,
            Self::ConeTwist { .. } => ConstraintKindTag::ConeTwist,
            Self::SixDof { .. } => ConstraintKindTag::SixDof,
        }
    }

    /// The participating objects. The second is absent for constraints
    /// pinned to the world.
    pub fn objects(&self) -> (ObjectId, Option<ObjectId>) {
        match *self {
            Self::Point {
                object_a, object_b, ..
            }
            | Self::Hinge {
                object_a, object_b, ..
            }
            | Self::Slider {
                object_a, object_b, ..
            }
            | Self::SixDof {
                object_a, object_b, ..
            } => (object_a, object_b),
            Self::ConeTwist {
                object_a, object_b, ..
            } => (object_a, Some(object_b)),
        }
    }

    pub fn pivot(&self) -> Vec3 {
        match *self {
            Self::Point { pivot, .. }
            | Self::Hinge { pivot, .. }
            | Self::Slider { pivot, .. }
            | Self::ConeTwist { pivot, .. }
            | Self::SixDof { pivot, .. } => pivot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintProxy {
    pub id: ConstraintId,
    pub def: ConstraintDef,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleTuning {
    pub suspension_stiffness: f32,
    pub suspension_compression: f32,
    pub suspension_damping: f32,
    pub max_suspension_travel: f32,
    pub friction_slip: f32,
    pub max_suspension_force: f32,
}

impl Default for VehicleTuning {
    fn default() -> Self {
        Self {
            suspension_stiffness: 5.88,
            suspension_compression: 0.83,
            suspension_damping: 0.88,
            max_suspension_travel: 500.0,
            friction_slip: 10.5,
            max_suspension_force: 6000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProxy {
    pub id: VehicleId,
    pub chassis: ObjectId,
    pub tuning: VehicleTuning,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelDesc {
    pub connection_point: Vec3,
    pub direction: Vec3,
    pub axle: Vec3,
    pub suspension_rest_length: f32,
    pub radius: f32,
    pub is_front: bool,
}

/// Per-body operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BodyOp {
    ApplyCentralImpulse { impulse: Vec3 },
    ApplyImpulse { impulse: Vec3, offset: Vec3 },
    ApplyTorque { torque: Vec3 },
    ApplyCentralForce { force: Vec3 },
    ApplyForce { force: Vec3, offset: Vec3 },
    SetLinearVelocity { velocity: Vec3 },
    SetAngularVelocity { velocity: Vec3 },
    SetLinearFactor { factor: Vec3 },
    SetAngularFactor { factor: Vec3 },
    SetDamping { linear: f32, angular: f32 },
    SetCcdMotionThreshold { threshold: f32 },
    SetCcdSweptSphereRadius { radius: f32 },
    /// Pin soft-body node `node` to another body.
    AppendAnchor {
        node: u32,
        target: ObjectId,
        collide_linked: bool,
        influence: f32,
    },
}

/// Kind-specific constraint tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ConstraintOp {
    HingeSetLimits {
        low: f32,
        high: f32,
        bias_factor: f32,
        relaxation_factor: f32,
    },
    HingeEnableAngularMotor { velocity: f32, acceleration: f32 },
    HingeDisableMotor,
    SliderSetLimits {
        lin_lower: f32,
        lin_upper: f32,
        ang_lower: f32,
        ang_upper: f32,
    },
    SliderSetRestitution { linear: f32, angular: f32 },
    SliderEnableLinearMotor { velocity: f32, acceleration: f32 },
    SliderDisableLinearMotor,
    SliderEnableAngularMotor { velocity: f32, acceleration: f32 },
    SliderDisableAngularMotor,
    ConeTwistSetAngularOnly { angular_only: bool },
    ConeTwistSetLimit { limit: Vec3 },
    ConeTwistEnableMotor,
    ConeTwistSetMaxMotorImpulse { impulse: f32 },
    ConeTwistSetMotorTarget { target: Quat },
    ConeTwistDisableMotor,
    DofSetLinearLowerLimit { limit: Vec3 },
    DofSetLinearUpperLimit { limit: Vec3 },
    DofSetAngularLowerLimit { limit: Vec3 },
    DofSetAngularUpperLimit { limit: Vec3 },
    DofEnableAngularMotor { axis: u8 },
    DofConfigureAngularMotor {
        axis: u8,
        low: f32,
        high: f32,
        velocity: f32,
        max_force: f32,
    },
    DofDisableAngularMotor { axis: u8 },
}

impl ConstraintOp {
    /// The constraint kind this op applies to.
    pub fn kind(&self) -> ConstraintKindTag {
        use ConstraintOp::*;
        match self {
            HingeSetLimits { .. } | HingeEnableAngularMotor { .. } | HingeDisableMotor => {
                ConstraintKindTag::Hinge
            }
            SliderSetLimits { .. }
            | SliderSetRestitution { .. }
            | SliderEnableLinearMotor { .. }
            | SliderDisableLinearMotor
            | SliderEnableAngularMotor { .. }
            | SliderDisableAngularMotor => ConstraintKindTag::Slider,
            ConeTwistSetAngularOnly { .. }
            | ConeTwistSetLimit { .. }
            | ConeTwistEnableMotor
            | ConeTwistSetMaxMotorImpulse { .. }
            | ConeTwistSetMotorTarget { .. }
            | ConeTwistDisableMotor => ConstraintKindTag::ConeTwist,
            DofSetLinearLowerLimit { .. }
            | DofSetLinearUpperLimit { .. }
            | DofSetAngularLowerLimit { .. }
            | DofSetAngularUpperLimit { .. }
            | DofEnableAngularMotor { .. }
            | DofConfigureAngularMotor { .. }
            | DofDisableAngularMotor { .. } => ConstraintKindTag::SixDof,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum WheelOp {
    SetSteering(f32),
    SetBrake(f32),
    ApplyEngineForce(f32),
}

/// A named operation sent from the core to the simulation context.
///
/// Serializes as `{"cmd": <name>, "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "camelCase")]
pub enum Command {
    Init {
        config: SimConfig,
        engine_module: Option<Vec<u8>>,
    },
    AddObject(BodyProxy),
    RemoveObject { id: ObjectId },
    AddVehicle(VehicleProxy),
    RemoveVehicle { id: VehicleId },
    AddWheel { vehicle: VehicleId, wheel: WheelDesc },
    AddConstraint(ConstraintProxy),
    RemoveConstraint { id: ConstraintId },
    UpdateTransform {
        id: ObjectId,
        pos: Option<Vec3>,
        quat: Option<Quat>,
    },
    Simulate { time_step: f32, max_sub_steps: u32 },
    RegisterMaterial(MaterialProxy),
    UnregisterMaterial(MaterialProxy),
    SetGravity { gravity: Vec3 },
    SetFixedTimeStep { time_step: f32 },
    Body { id: ObjectId, op: BodyOp },
    Constraint { id: ConstraintId, op: ConstraintOp },
    Wheel {
        vehicle: VehicleId,
        wheel: u32,
        op: WheelOp,
    },
}

impl Command {
    /// Wire name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::AddObject(_) => "addObject",
            Self::RemoveObject { .. } => "removeObject",
            Self::AddVehicle(_) => "addVehicle",
            Self::RemoveVehicle { .. } => "removeVehicle",
            Self::AddWheel { .. } => "addWheel",
            Self::AddConstraint(_) => "addConstraint",
            Self::RemoveConstraint { .. } => "removeConstraint",
            Self::UpdateTransform { .. } => "updateTransform",
            Self::Simulate { .. } => "simulate",
            Self::RegisterMaterial(_) => "registerMaterial",
            Self::UnregisterMaterial(_) => "unregisterMaterial",
            Self::SetGravity { .. } => "setGravity",
            Self::SetFixedTimeStep { .. } => "setFixedTimeStep",
            Self::Body { .. } => "body",
            Self::Constraint { .. } => "constraint",
            Self::Wheel { .. } => "wheel",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_shapes_report_their_kind() {
        assert_eq!(Shape::SoftTrimesh.soft_kind(), Some(SoftKind::Trimesh));
        assert_eq!(Shape::Rope.soft_kind(), Some(SoftKind::Rope));
        assert_eq!(
            Shape::Cloth { segments: [4, 4] }.soft_kind(),
            Some(SoftKind::Cloth)
        );
        assert!(!Shape::Sphere { radius: 1.0 }.is_soft());
    }

    #[test]
    fn command_wire_shape_is_cmd_and_params() {
        let cmd = Command::RemoveObject { id: ObjectId(4) };
        let v: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(v["cmd"], "removeObject");
        assert_eq!(v["params"]["id"], 4);
    }

    #[test]
    fn command_name_matches_serde_tag() {
        let cmds = [
            Command::Simulate {
                time_step: 0.016,
                max_sub_steps: 2,
            },
            Command::UpdateTransform {
                id: ObjectId(1),
                pos: Some(Vec3::ONE),
                quat: None,
            },
            Command::SetGravity { gravity: Vec3::ZERO },
        ];
        for cmd in cmds {
            let v: serde_json::Value = serde_json::to_value(&cmd).unwrap();
            assert_eq!(v["cmd"], cmd.name());
        }
    }

    #[test]
    fn constraint_ops_declare_their_kind() {
        assert_eq!(
            ConstraintOp::HingeDisableMotor.kind(),
            ConstraintKindTag::Hinge
        );
        assert_eq!(
            ConstraintOp::DofEnableAngularMotor { axis: 2 }.kind(),
            ConstraintKindTag::SixDof
        );
        assert_eq!(
            ConstraintOp::ConeTwistSetMaxMotorImpulse { impulse: 1.0 }.kind(),
            ConstraintKindTag::ConeTwist
        );
    }

    #[test]
    fn cone_twist_always_has_two_objects() {
        let def = ConstraintDef::ConeTwist {
            object_a: ObjectId(1),
            object_b: ObjectId(2),
            pivot: Vec3::ZERO,
            axis_a: Vec3::X,
            axis_b: Vec3::X,
        };
        assert_eq!(def.objects(), (ObjectId(1), Some(ObjectId(2))));
        assert_eq!(def.kind(), ConstraintKindTag::ConeTwist);
    }
}
