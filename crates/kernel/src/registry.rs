//! Authoritative id → record map for bodies, constraints, vehicles and
//! shared materials.
//!
//! Every mutation that the simulation must hear about appends a [`Command`]
//! to the registry's outbox; the owner drains it into the command channel.

use glam::{EulerRot, Quat, Vec3};
use physlink_common::{ConstraintId, IdAllocator, MaterialId, ObjectId, Pose, VehicleId};
use physlink_protocol::{
    BodyProxy, ChildProxy, Command, ConstraintDef, ConstraintKindTag, ConstraintProxy,
    MaterialProxy, Shape, SoftProxy, VehicleProxy, VehicleTuning, WheelDesc,
};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::error::SyncError;
use crate::events::{Emitter, ListenerId, ObjectEvent, ObjectEventKind};

/// Physical surface properties shared between bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub id: MaterialId,
    pub friction: f32,
    pub restitution: f32,
}

impl Material {
    fn proxy(&self) -> MaterialProxy {
        MaterialProxy {
            id: self.id,
            friction: self.friction,
            restitution: self.restitution,
        }
    }
}

/// A material plus the number of live records using it.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub material: Material,
    refcount: usize,
}

impl MaterialRecord {
    pub fn refcount(&self) -> usize {
        self.refcount
    }
}

/// Flat render buffers of a soft body's mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    /// Set when decoding wrote new positions that still need uploading.
    pub positions_need_upload: bool,
    pub normals_need_upload: bool,
}

impl MeshBuffers {
    pub fn new(positions: Vec<f32>, normals: Vec<f32>) -> Self {
        Self {
            positions,
            normals,
            ..Self::default()
        }
    }

    /// Zeroed buffers for `vertices` vertices.
    pub fn with_vertices(vertices: usize, normals: bool) -> Self {
        Self::new(
            vec![0.0; vertices * 3],
            if normals { vec![0.0; vertices * 3] } else { Vec::new() },
        )
    }
}

/// Everything needed to register a body. Children are posed relative to
/// their parent.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub shape: Shape,
    pub mass: f32,
    pub pose: Pose,
    pub material: Option<Material>,
    pub children: Vec<BodyDesc>,
    pub mesh: Option<MeshBuffers>,
    pub soft: Option<SoftProxy>,
}

impl BodyDesc {
    pub fn new(shape: Shape, mass: f32) -> Self {
        Self {
            shape,
            mass,
            pose: Pose::default(),
            material: None,
            children: Vec::new(),
            mesh: None,
            soft: None,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.pose.position = position;
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_child(mut self, child: BodyDesc) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_soft(mut self, soft: SoftProxy, mesh: MeshBuffers) -> Self {
        self.soft = Some(soft);
        self.mesh = Some(mesh);
        self
    }

    /// Per-shape checks run before anything is registered.
    fn validate(&self) -> Result<(), SyncError> {
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(SyncError::InvalidBody(format!("mass {}", self.mass)));
        }
        match &self.shape {
            Shape::Compound if self.children.is_empty() => {
                return Err(SyncError::InvalidBody("compound body without children".into()));
            }
            shape if shape.is_soft() => {
                if self.soft.is_none() || self.mesh.is_none() {
                    return Err(SyncError::InvalidBody(format!(
                        "{} body needs soft parameters and mesh buffers",
                        shape.name()
                    )));
                }
                if !self.children.is_empty() {
                    return Err(SyncError::InvalidBody("soft bodies cannot have children".into()));
                }
            }
            _ => {}
        }
        if let Some(child) = self.children.iter().find(|c| c.shape.is_soft()) {
            return Err(SyncError::InvalidBody(format!(
                "{} cannot be a compound child",
                child.shape.name()
            )));
        }
        self.children.iter().try_for_each(BodyDesc::validate)
    }
}

/// Registry entry for a body: the renderable transform plus its proxy state.
#[derive(Debug)]
pub struct ObjectRecord {
    id: ObjectId,
    shape: Shape,
    mass: f32,
    /// For roots this is the world pose; for compound children, the offset
    /// from the parent.
    pose: Pose,
    pub(crate) dirty_position: bool,
    pub(crate) dirty_rotation: bool,
    pub(crate) linear_velocity: Vec3,
    pub(crate) angular_velocity: Vec3,
    pub(crate) touches: Vec<ObjectId>,
    material: Option<MaterialId>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    pub(crate) mesh: Option<MeshBuffers>,
    /// Soft vertex data is world-space; the local transform is reset once on
    /// the first soft report after registration.
    pub(crate) soft_transform_reset: bool,
    pub(crate) events: Emitter<ObjectEvent>,
}

impl ObjectRecord {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    pub fn quaternion(&self) -> Quat {
        self.pose.quaternion
    }

    /// Euler angles (XYZ order) of the current orientation.
    pub fn rotation(&self) -> Vec3 {
        let (x, y, z) = self.pose.quaternion.to_euler(EulerRot::XYZ);
        Vec3::new(x, y, z)
    }

    /// External write: marks the position dirty.
    ///
    /// Compound children are baked into their root's shape, so writes to them
    /// are refused and return false.
    pub fn set_position(&mut self, position: Vec3) -> bool {
        if !self.accepts_writes() {
            return false;
        }
        self.pose.position = position;
        self.dirty_position = true;
        true
    }

    /// External write: marks the rotation dirty. Refused on compound children.
    pub fn set_quaternion(&mut self, quaternion: Quat) -> bool {
        if !self.accepts_writes() {
            return false;
        }
        self.pose.quaternion = quaternion;
        self.dirty_rotation = true;
        true
    }

    fn accepts_writes(&self) -> bool {
        if let Some(parent) = self.parent {
            tracing::warn!(id = %self.id, %parent, "transform write to compound child ignored");
            return false;
        }
        true
    }

    /// External write from Euler angles (XYZ order): marks the rotation dirty.
    pub fn set_rotation(&mut self, euler: Vec3) -> bool {
        self.set_quaternion(Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z))
    }

    pub fn dirty_position(&self) -> bool {
        self.dirty_position
    }

    pub fn dirty_rotation(&self) -> bool {
        self.dirty_rotation
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Currently-colliding partners, in the order contact began.
    pub fn touches(&self) -> &[ObjectId] {
        &self.touches
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    pub fn mesh(&self) -> Option<&MeshBuffers> {
        self.mesh.as_ref()
    }

    /// Mesh access for the renderer, e.g. to clear the upload flags.
    pub fn mesh_mut(&mut self) -> Option<&mut MeshBuffers> {
        self.mesh.as_mut()
    }

    pub fn on(&mut self, kind: ObjectEventKind, listener: impl FnMut(&ObjectEvent) + 'static) -> ListenerId {
        self.events.on(kind, listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Decoder write: position/rotation arbitrated by the dirty flags.
    pub(crate) fn apply_reported_pose(&mut self, position: Vec3, quaternion: Quat) {
        if !self.dirty_position {
            self.pose.position = position;
        }
        if !self.dirty_rotation {
            self.pose.quaternion = quaternion;
        }
    }

    pub(crate) fn reset_local_transform(&mut self) {
        self.pose = Pose::default();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRecord {
    pub id: ConstraintId,
    pub kind: ConstraintKindTag,
    pub object_a: ObjectId,
    pub object_b: Option<ObjectId>,
    /// World-space anchor, refreshed by constraint reports.
    pub anchor: Vec3,
    pub applied_impulse: f32,
}

/// A wheel handle, written only by vehicle reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    pub desc: WheelDesc,
    pub pose: Pose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub id: VehicleId,
    pub chassis: ObjectId,
    pub tuning: VehicleTuning,
    pub wheels: Vec<Wheel>,
}

/// The registry. Owns the id counter; ids are never reused.
#[derive(Debug, Default)]
pub struct Registry {
    ids: IdAllocator,
    objects: BTreeMap<ObjectId, ObjectRecord>,
    constraints: BTreeMap<ConstraintId, ConstraintRecord>,
    vehicles: BTreeMap<VehicleId, VehicleRecord>,
    materials: BTreeMap<MaterialId, MaterialRecord>,
    outbox: Vec<Command>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain commands produced by registry mutations, in order.
    pub fn drain_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_commands(&self) -> &[Command] {
        &self.outbox
    }

    // --- Objects ---

    /// Register a body. Children are registered first and flattened into the
    /// parent's `addObject` so the simulation builds one compound shape.
    pub fn register(&mut self, mut desc: BodyDesc) -> Result<ObjectId, SyncError> {
        desc.validate()?;
        let soft = desc.soft.take();
        let (id, children) = self.insert_tree(desc);
        let record = &self.objects[&id];
        let proxy = BodyProxy {
            id,
            shape: record.shape.clone(),
            mass: record.mass,
            position: record.pose.position,
            quaternion: record.pose.quaternion,
            material: record.material,
            children,
            soft,
        };
        tracing::debug!(%id, shape = proxy.shape.name(), children = proxy.children.len(), "registered");
        self.outbox.push(Command::AddObject(proxy));
        Ok(id)
    }

    fn insert_tree(&mut self, desc: BodyDesc) -> (ObjectId, Vec<ChildProxy>) {
        let BodyDesc {
            shape,
            mass,
            pose,
            material,
            children,
            mesh,
            soft: _,
        } = desc;

        let mut child_ids = Vec::with_capacity(children.len());
        let mut flattened = Vec::new();
        for child in children {
            let (child_id, grandchildren) = self.insert_tree(child);
            child_ids.push(child_id);
            let c = &self.objects[&child_id];
            let offset = c.pose;
            flattened.push(ChildProxy {
                id: child_id,
                shape: c.shape.clone(),
                mass: c.mass,
                offset: offset.position,
                rotation: offset.quaternion,
            });
            flattened.extend(grandchildren.into_iter().map(|gc| ChildProxy {
                offset: offset.transform_point(gc.offset),
                rotation: offset.quaternion * gc.rotation,
                ..gc
            }));
        }

        let id = ObjectId(self.ids.allocate());
        let material_id = material.map(|m| self.acquire_material(m));
        for child_id in &child_ids {
            if let Some(c) = self.objects.get_mut(child_id) {
                c.parent = Some(id);
            }
        }
        let soft_transform_reset = !shape.is_soft();
        self.objects.insert(
            id,
            ObjectRecord {
                id,
                shape,
                mass,
                pose,
                dirty_position: false,
                dirty_rotation: false,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                touches: Vec::new(),
                material: material_id,
                parent: None,
                children: child_ids,
                mesh,
                soft_transform_reset,
                events: Emitter::new(),
            },
        );
        (id, flattened)
    }

    /// Remove a body and, for compound roots, all of its children.
    ///
    /// Constraints and vehicles referencing any removed body are removed
    /// first. Returns false (and does nothing) if `id` is not registered,
    /// which makes double removal a no-op.
    pub fn unregister(&mut self, id: ObjectId) -> bool {
        let Some(parent) = self.objects.get(&id).map(|r| r.parent) else {
            tracing::trace!(%id, "unregister of unknown id ignored");
            return false;
        };
        let tree = self.tree_ids(id);
        self.remove_dependents(&tree);
        match parent {
            // The simulation only knows the root; a detached child just stops
            // being tracked here.
            Some(parent) => {
                if let Some(p) = self.objects.get_mut(&parent) {
                    p.children.retain(|c| *c != id);
                }
            }
            None => self.outbox.push(Command::RemoveObject { id }),
        }
        self.remove_tree(id);
        tracing::debug!(%id, "unregistered");
        true
    }

    fn tree_ids(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut ids = vec![id];
        let mut next = 0;
        while let Some(current) = ids.get(next).copied() {
            if let Some(record) = self.objects.get(&current) {
                ids.extend_from_slice(&record.children);
            }
            next += 1;
        }
        ids
    }

    fn remove_dependents(&mut self, bodies: &[ObjectId]) {
        let constraints: Vec<ConstraintId> = self
            .constraints
            .values()
            .filter(|c| bodies.contains(&c.object_a) || c.object_b.is_some_and(|b| bodies.contains(&b)))
            .map(|c| c.id)
            .collect();
        for id in constraints {
            tracing::debug!(%id, "constraint removed with its body");
            self.remove_constraint(id);
        }
        let vehicles: Vec<VehicleId> = self
            .vehicles
            .values()
            .filter(|v| bodies.contains(&v.chassis))
            .map(|v| v.id)
            .collect();
        for id in vehicles {
            tracing::debug!(%id, "vehicle removed with its chassis");
            self.remove_vehicle(id);
        }
    }

    fn remove_tree(&mut self, id: ObjectId) {
        let Some(record) = self.objects.remove(&id) else {
            return;
        };
        if let Some(material) = record.material {
            self.release_material(material);
        }
        for child in record.children {
            self.remove_tree(child);
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.values()
    }

    pub(crate) fn objects_mut(&mut self) -> impl Iterator<Item = &mut ObjectRecord> {
        self.objects.values_mut()
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // --- Materials ---

    fn acquire_material(&mut self, material: Material) -> MaterialId {
        let record = match self.materials.entry(material.id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                tracing::debug!(material = material.id.0, "material registered");
                self.outbox.push(Command::RegisterMaterial(material.proxy()));
                e.insert(MaterialRecord {
                    material,
                    refcount: 0,
                })
            }
        };
        record.refcount += 1;
        material.id
    }

    fn release_material(&mut self, id: MaterialId) {
        let Some(record) = self.materials.get_mut(&id) else {
            return;
        };
        record.refcount = record.refcount.saturating_sub(1);
        if record.refcount == 0 {
            let proxy = record.material.proxy();
            self.materials.remove(&id);
            tracing::debug!(material = id.0, "material unregistered");
            self.outbox.push(Command::UnregisterMaterial(proxy));
        }
    }

    pub fn material(&self, id: MaterialId) -> Option<&MaterialRecord> {
        self.materials.get(&id)
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    // --- Constraints ---

    pub fn add_constraint(&mut self, def: ConstraintDef) -> Result<ConstraintId, SyncError> {
        let (a, b) = def.objects();
        for object in std::iter::once(a).chain(b) {
            if !self.objects.contains_key(&object) {
                return Err(SyncError::UnknownObject(object));
            }
        }
        let id = ConstraintId(self.ids.allocate());
        self.constraints.insert(
            id,
            ConstraintRecord {
                id,
                kind: def.kind(),
                object_a: a,
                object_b: b,
                anchor: def.pivot(),
                applied_impulse: 0.0,
            },
        );
        tracing::debug!(%id, kind = ?def.kind(), "constraint added");
        self.outbox.push(Command::AddConstraint(ConstraintProxy { id, def }));
        Ok(id)
    }

    /// Idempotent: removing an unknown constraint does nothing.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> bool {
        if self.constraints.remove(&id).is_none() {
            return false;
        }
        self.outbox.push(Command::RemoveConstraint { id });
        true
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&ConstraintRecord> {
        self.constraints.get(&id)
    }

    pub(crate) fn constraint_mut(&mut self, id: ConstraintId) -> Option<&mut ConstraintRecord> {
        self.constraints.get_mut(&id)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &ConstraintRecord> {
        self.constraints.values()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // --- Vehicles ---

    pub fn add_vehicle(&mut self, chassis: ObjectId, tuning: VehicleTuning) -> Result<VehicleId, SyncError> {
        if !self.objects.contains_key(&chassis) {
            return Err(SyncError::UnknownObject(chassis));
        }
        let id = VehicleId(self.ids.allocate());
        self.vehicles.insert(
            id,
            VehicleRecord {
                id,
                chassis,
                tuning,
                wheels: Vec::new(),
            },
        );
        tracing::debug!(%id, %chassis, "vehicle added");
        self.outbox.push(Command::AddVehicle(VehicleProxy { id, chassis, tuning }));
        Ok(id)
    }

    /// Append a wheel; its index is its position in the wheel list.
    pub fn add_wheel(&mut self, vehicle: VehicleId, desc: WheelDesc) -> Result<u32, SyncError> {
        let record = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(SyncError::UnknownVehicle(vehicle))?;
        let index = record.wheels.len() as u32;
        record.wheels.push(Wheel {
            desc,
            pose: Pose::from_position(desc.connection_point),
        });
        self.outbox.push(Command::AddWheel { vehicle, wheel: desc });
        Ok(index)
    }

    /// Idempotent: removing an unknown vehicle does nothing.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        if self.vehicles.remove(&id).is_none() {
            return false;
        }
        self.outbox.push(Command::RemoveVehicle { id });
        true
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleRecord> {
        self.vehicles.get(&id)
    }

    pub(crate) fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut VehicleRecord> {
        self.vehicles.get_mut(&id)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }
}
