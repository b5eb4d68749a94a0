use glam::{Quat, Vec3};
use physlink_common::{ConstraintId, ObjectId, VehicleId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every binary report starts with `[tag, record_count]`.
pub const HEADER_LEN: usize = 2;

/// Length of the buffer used to detect transferable-ownership support.
pub const PROBE_LEN: usize = 1;

/// Errors from normalizing an inbound payload.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty payload")]
    Empty,
    #[error("byte payload of {len} bytes is not a whole number of floats")]
    Misaligned { len: usize },
    #[error("unknown report tag {0}")]
    UnknownTag(f32),
    #[error("bad report header: record count {0}")]
    BadHeader(f32),
    #[error("{kind:?} report truncated: needs {needed} floats, has {len}")]
    Truncated {
        kind: ReportKind,
        needed: usize,
        len: usize,
    },
    #[error("{0:?} reports have no fixed record stride")]
    NoFixedStride(ReportKind),
    #[error("unknown notification {0:?}")]
    UnknownNotification(String),
    #[error("bad params for {cmd:?}: {source}")]
    BadParams {
        cmd: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Binary report kinds, by leading tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReportKind {
    World = 0,
    Collision = 1,
    Vehicle = 2,
    Constraint = 3,
    Soft = 4,
}

impl ReportKind {
    pub fn from_tag(tag: f32) -> Option<Self> {
        match tag {
            t if t == 0.0 => Some(Self::World),
            t if t == 1.0 => Some(Self::Collision),
            t if t == 2.0 => Some(Self::Vehicle),
            t if t == 3.0 => Some(Self::Constraint),
            t if t == 4.0 => Some(Self::Soft),
            _ => None,
        }
    }

    pub fn tag(self) -> f32 {
        self as u8 as f32
    }

    /// Floats per record. Soft-body records have no fixed stride.
    pub fn stride(self) -> Option<usize> {
        match self {
            Self::World => Some(14),
            Self::Collision => Some(5),
            Self::Vehicle => Some(9),
            Self::Constraint => Some(6),
            Self::Soft => None,
        }
    }

    /// Whether the buffer is handed back to the simulation after decoding.
    pub fn recyclable(self) -> bool {
        !matches!(self, Self::Collision)
    }
}

/// Vertex encoding of a soft body in soft reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftKind {
    /// Three vertices of position + normal per logical triangle.
    Trimesh,
    /// Position only, one per point.
    Rope,
    /// Position + normal per vertex.
    Cloth,
}

/// Floats per logical unit (triangle, point or vertex) in the report, and
/// how many of them land in the mesh position and normal buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftLayout {
    pub record_stride: usize,
    pub position_stride: usize,
    pub normal_stride: usize,
}

impl SoftLayout {
    /// Vertices packed into one logical unit.
    pub fn vertices_per_unit(&self) -> usize {
        self.position_stride / 3
    }

    /// Floats per vertex inside a unit.
    pub fn vertex_stride(&self) -> usize {
        self.record_stride / self.vertices_per_unit()
    }

    pub fn has_normals(&self) -> bool {
        self.normal_stride > 0
    }
}

impl SoftKind {
    pub fn layout(self) -> SoftLayout {
        match self {
            Self::Trimesh => SoftLayout {
                record_stride: 18,
                position_stride: 9,
                normal_stride: 9,
            },
            Self::Rope => SoftLayout {
                record_stride: 3,
                position_stride: 3,
                normal_stride: 0,
            },
            Self::Cloth => SoftLayout {
                record_stride: 6,
                position_stride: 3,
                normal_stride: 3,
            },
        }
    }
}

/// A validated binary report: known tag and a sane record count.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    kind: ReportKind,
    data: Vec<f32>,
}

impl Report {
    pub fn new(data: Vec<f32>) -> Result<Self, ProtocolError> {
        let tag = *data.first().ok_or(ProtocolError::Empty)?;
        let kind = ReportKind::from_tag(tag).ok_or(ProtocolError::UnknownTag(tag))?;
        let count = data.get(1).copied().unwrap_or(0.0);
        // Every record takes at least one float, so a count beyond the body
        // length can never be satisfied.
        let body = data.len().saturating_sub(HEADER_LEN);
        if !count.is_finite() || count < 0.0 || count.fract() != 0.0 || count > body as f32 {
            return Err(ProtocolError::BadHeader(count));
        }
        Ok(Self { kind, data })
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    pub fn record_count(&self) -> usize {
        self.data.get(1).map_or(0, |c| *c as usize)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Fixed-stride records, after checking the buffer holds all of them.
    pub fn records(&self) -> Result<std::slice::ChunksExact<'_, f32>, ProtocolError> {
        let stride = self
            .kind
            .stride()
            .ok_or(ProtocolError::NoFixedStride(self.kind))?;
        let needed = self
            .record_count()
            .checked_mul(stride)
            .and_then(|n| n.checked_add(HEADER_LEN))
            .unwrap_or(usize::MAX);
        let records = self.data.get(HEADER_LEN..needed).ok_or(ProtocolError::Truncated {
            kind: self.kind,
            needed,
            len: self.data.len(),
        })?;
        Ok(records.chunks_exact(stride))
    }

    /// Decode fixed-stride records into typed entries. Records whose ids do
    /// not decode yield `None`.
    pub fn entries<'a, E: Entry + 'a>(
        &'a self,
    ) -> Result<impl Iterator<Item = Option<E>> + 'a, ProtocolError> {
        Ok(self.records()?.map(E::read))
    }

    /// Encode typed entries into a report buffer.
    pub fn encode<E: Entry>(entries: &[E]) -> Self {
        let stride = E::KIND.stride().unwrap_or(0);
        let mut data = Vec::with_capacity(HEADER_LEN + entries.len() * stride);
        data.push(E::KIND.tag());
        data.push(entries.len() as f32);
        for e in entries {
            e.write(&mut data);
        }
        Self {
            kind: E::KIND,
            data,
        }
    }

    pub fn encode_soft(entries: &[SoftEntry]) -> Self {
        let mut data = vec![ReportKind::Soft.tag(), entries.len() as f32];
        for e in entries {
            data.push(e.id.to_report());
            data.push(e.count as f32);
            data.extend_from_slice(&e.data);
        }
        Self {
            kind: ReportKind::Soft,
            data,
        }
    }

    /// Native-endian byte view, as a transport would ship it.
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.data).to_vec()
    }
}

/// A fixed-stride report record.
pub trait Entry: Sized {
    const KIND: ReportKind;
    fn read(record: &[f32]) -> Option<Self>;
    fn write(&self, out: &mut Vec<f32>);
}

fn vec3(s: &[f32]) -> Vec3 {
    Vec3::new(s[0], s[1], s[2])
}

fn quat(s: &[f32]) -> Quat {
    Quat::from_xyzw(s[0], s[1], s[2], s[3])
}

fn index(value: f32) -> Option<u32> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as u32)
}

/// `id, pos.xyz, quat.xyzw, linVel.xyz, angVel.xyz`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldEntry {
    pub id: ObjectId,
    pub position: Vec3,
    pub quaternion: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl Entry for WorldEntry {
    const KIND: ReportKind = ReportKind::World;

    fn read(r: &[f32]) -> Option<Self> {
        Some(Self {
            id: ObjectId::from_report(r[0])?,
            position: vec3(&r[1..4]),
            quaternion: quat(&r[4..8]),
            linear_velocity: vec3(&r[8..11]),
            angular_velocity: vec3(&r[11..14]),
        })
    }

    fn write(&self, out: &mut Vec<f32>) {
        out.push(self.id.to_report());
        out.extend_from_slice(&self.position.to_array());
        out.extend_from_slice(&self.quaternion.to_array());
        out.extend_from_slice(&self.linear_velocity.to_array());
        out.extend_from_slice(&self.angular_velocity.to_array());
    }
}

/// `idA, idB, contactNormal.xyz`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEntry {
    pub a: ObjectId,
    pub b: ObjectId,
    pub normal: Vec3,
}

impl CollisionEntry {
    /// Offset of the normal inside a collision record.
    pub const NORMAL_OFFSET: usize = 2;
}

impl Entry for CollisionEntry {
    const KIND: ReportKind = ReportKind::Collision;

    fn read(r: &[f32]) -> Option<Self> {
        Some(Self {
            a: ObjectId::from_report(r[0])?,
            b: ObjectId::from_report(r[1])?,
            normal: vec3(&r[2..5]),
        })
    }

    fn write(&self, out: &mut Vec<f32>) {
        out.push(self.a.to_report());
        out.push(self.b.to_report());
        out.extend_from_slice(&self.normal.to_array());
    }
}

/// `vehicleId, wheelIndex, pos.xyz, quat.xyzw`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEntry {
    pub vehicle: VehicleId,
    pub wheel: u32,
    pub position: Vec3,
    pub quaternion: Quat,
}

impl Entry for WheelEntry {
    const KIND: ReportKind = ReportKind::Vehicle;

    fn read(r: &[f32]) -> Option<Self> {
        Some(Self {
            vehicle: VehicleId::from_report(r[0])?,
            wheel: index(r[1])?,
            position: vec3(&r[2..5]),
            quaternion: quat(&r[5..9]),
        })
    }

    fn write(&self, out: &mut Vec<f32>) {
        out.push(self.vehicle.to_report());
        out.push(self.wheel as f32);
        out.extend_from_slice(&self.position.to_array());
        out.extend_from_slice(&self.quaternion.to_array());
    }
}

/// `constraintId, objectId, anchorOffset.xyz, appliedImpulse`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintEntry {
    pub constraint: ConstraintId,
    pub object: ObjectId,
    pub anchor_offset: Vec3,
    pub impulse: f32,
}

impl Entry for ConstraintEntry {
    const KIND: ReportKind = ReportKind::Constraint;

    fn read(r: &[f32]) -> Option<Self> {
        Some(Self {
            constraint: ConstraintId::from_report(r[0])?,
            object: ObjectId::from_report(r[1])?,
            anchor_offset: vec3(&r[2..5]),
            impulse: r[5],
        })
    }

    fn write(&self, out: &mut Vec<f32>) {
        out.push(self.constraint.to_report());
        out.push(self.object.to_report());
        out.extend_from_slice(&self.anchor_offset.to_array());
        out.push(self.impulse);
    }
}

/// One soft body inside a soft report: `id, count, count * stride floats`.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftEntry {
    pub id: ObjectId,
    /// Logical units: triangles for trimesh, points for ropes, vertices otherwise.
    pub count: usize,
    pub data: Vec<f32>,
}

/// Out-of-band named notifications from the simulation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    ObjectReady(ObjectId),
    WorldReady,
    EngineLoaded,
}

#[derive(Deserialize)]
struct IdParams {
    id: ObjectId,
}

impl Notification {
    pub fn from_named(cmd: &str, params: Value) -> Result<Self, ProtocolError> {
        match cmd {
            "worldReady" => Ok(Self::WorldReady),
            "engineLoaded" => Ok(Self::EngineLoaded),
            "objectReady" => {
                let parsed = match params {
                    Value::Number(_) => serde_json::from_value::<ObjectId>(params),
                    other => serde_json::from_value::<IdParams>(other).map(|p| p.id),
                };
                parsed
                    .map(Self::ObjectReady)
                    .map_err(|source| ProtocolError::BadParams {
                        cmd: cmd.to_string(),
                        source,
                    })
            }
            other => Err(ProtocolError::UnknownNotification(other.to_string())),
        }
    }

    /// The `(cmd, params)` pair a simulation context would send.
    pub fn to_named(self) -> (String, Value) {
        match self {
            Self::ObjectReady(id) => ("objectReady".into(), serde_json::json!({ "id": id })),
            Self::WorldReady => ("worldReady".into(), Value::Null),
            Self::EngineLoaded => ("engineLoaded".into(), Value::Null),
        }
    }
}

/// A payload as it arrives from the simulation context, before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Raw transferable buffer.
    Bytes(Vec<u8>),
    Floats(Vec<f32>),
    Named { cmd: String, params: Value },
}

/// A normalized inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Echo of the transfer-support probe; carries no data.
    Probe,
    Report(Report),
    Notification(Notification),
}

impl Inbound {
    pub fn normalize(self) -> Result<Payload, ProtocolError> {
        match self {
            Self::Bytes(bytes) if bytes.len() == PROBE_LEN => Ok(Payload::Probe),
            Self::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(ProtocolError::Empty);
                }
                if bytes.len() % 4 != 0 {
                    return Err(ProtocolError::Misaligned { len: bytes.len() });
                }
                let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
                Report::new(floats).map(Payload::Report)
            }
            Self::Floats(floats) => Report::new(floats).map(Payload::Report),
            Self::Named { cmd, params } => {
                Notification::from_named(&cmd, params).map(Payload::Notification)
            }
        }
    }
}
