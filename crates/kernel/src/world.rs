//! The sync world: registry, command channel and event surface tied together.

use glam::Vec3;
use physlink_common::{ConstraintId, ObjectId, VehicleId};
use physlink_protocol::{
    BodyOp, Command, ConstraintDef, ConstraintOp, Inbound, Notification, Payload, Report,
    ReportKind, SimConfig, VehicleTuning, WheelDesc, WheelOp,
};

use crate::channel::{CommandChannel, Transport};
use crate::decode;
use crate::deferred::ReadyState;
use crate::error::{EngineLoadError, SyncError};
use crate::events::{Emitter, ListenerId, ObjectEvent, WorldEvent, WorldEventKind};
use crate::reconcile::reconcile;
use crate::registry::{BodyDesc, ObjectRecord, Registry};

/// Main-context half of the simulation pair.
///
/// Owns the [`Registry`], sends every mutation through a [`CommandChannel`]
/// and applies whatever the simulation context sends back through
/// [`handle_message`](Self::handle_message).
#[derive(Debug)]
pub struct SyncWorld<T: Transport> {
    config: SimConfig,
    registry: Registry,
    channel: CommandChannel<T>,
    events: Emitter<WorldEvent>,
    awaiting_engine: bool,
    step_in_flight: bool,
    steps_completed: u64,
}

impl<T: Transport> SyncWorld<T> {
    /// Create the world and start initialization.
    ///
    /// Without an engine payload `init` goes out immediately. With one, the
    /// world waits for [`provide_engine`](Self::provide_engine).
    pub fn new(config: SimConfig, transport: T) -> Self {
        let mut world = Self {
            awaiting_engine: config.engine_module.is_some(),
            config,
            registry: Registry::new(),
            channel: CommandChannel::new(transport),
            events: Emitter::new(),
            step_in_flight: false,
            steps_completed: 0,
        };
        if world.awaiting_engine {
            tracing::debug!(module = ?world.config.engine_module, "waiting for engine payload");
        } else {
            world.send_init(None);
        }
        world
    }

    /// Complete initialization with the fetched engine payload, or fail it.
    ///
    /// A failure is terminal: queued commands are never flushed and later
    /// commands are dropped.
    pub fn provide_engine(&mut self, payload: Result<Vec<u8>, EngineLoadError>) {
        if !self.awaiting_engine {
            tracing::warn!("engine payload provided but none was expected");
            return;
        }
        self.awaiting_engine = false;
        match payload {
            Ok(bytes) => {
                tracing::debug!(bytes = bytes.len(), "engine payload fetched");
                self.send_init(Some(bytes));
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::error!(%err, "engine payload failed to load");
                self.channel.fail(reason.clone());
                self.events.emit(&WorldEvent::Failed(reason));
            }
        }
    }

    /// Read the configured engine payload from disk and hand it to
    /// [`provide_engine`](Self::provide_engine).
    pub fn load_engine_from_disk(&mut self) {
        let Some(path) = self.config.engine_module.clone() else {
            return;
        };
        let payload = std::fs::read(&path).map_err(EngineLoadError::from);
        self.provide_engine(payload);
    }

    fn send_init(&mut self, engine_module: Option<Vec<u8>>) {
        self.channel.send_now(Command::Init {
            config: self.config.clone(),
            engine_module,
        });
    }

    // --- Events ---

    pub fn on(&mut self, kind: WorldEventKind, listener: impl FnMut(&WorldEvent) + 'static) -> ListenerId {
        self.events.on(kind, listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // --- Objects ---

    /// Register a body (the scene graph's attach hook).
    pub fn attach(&mut self, desc: BodyDesc) -> Result<ObjectId, SyncError> {
        let id = self.registry.register(desc)?;
        self.pump();
        Ok(id)
    }

    /// Remove a body (the scene graph's detach hook). Idempotent.
    pub fn detach(&mut self, id: ObjectId) -> bool {
        let removed = self.registry.unregister(id);
        self.pump();
        removed
    }

    pub fn object(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.registry.get(id)
    }

    /// Mutable access for external writes (`set_position`, listeners, mesh uploads).
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.registry.get_mut(id)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Send a per-body command.
    pub fn body_op(&mut self, id: ObjectId, op: BodyOp) -> Result<(), SyncError> {
        if let BodyOp::AppendAnchor { target, .. } = &op {
            if !self.registry.contains(*target) {
                return Err(SyncError::UnknownObject(*target));
            }
        }
        let record = self.registry.get_mut(id).ok_or(SyncError::UnknownObject(id))?;
        match &op {
            BodyOp::SetLinearVelocity { velocity } => record.linear_velocity = *velocity,
            BodyOp::SetAngularVelocity { velocity } => record.angular_velocity = *velocity,
            BodyOp::AppendAnchor { .. } if !record.shape().is_soft() => {
                return Err(SyncError::NotSoftBody(id));
            }
            _ => {}
        }
        self.channel.send(Command::Body { id, op });
        Ok(())
    }

    // --- Constraints ---

    pub fn add_constraint(&mut self, def: ConstraintDef) -> Result<ConstraintId, SyncError> {
        let id = self.registry.add_constraint(def)?;
        self.pump();
        Ok(id)
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> bool {
        let removed = self.registry.remove_constraint(id);
        self.pump();
        removed
    }

    /// Send a kind-specific tuning command.
    pub fn constraint_op(&mut self, id: ConstraintId, op: ConstraintOp) -> Result<(), SyncError> {
        let record = self
            .registry
            .constraint(id)
            .ok_or(SyncError::UnknownConstraint(id))?;
        if record.kind != op.kind() {
            return Err(SyncError::ConstraintKindMismatch {
                id,
                kind: record.kind,
                op: op.kind(),
            });
        }
        self.channel.send(Command::Constraint { id, op });
        Ok(())
    }

    // --- Vehicles ---

    pub fn add_vehicle(&mut self, chassis: ObjectId, tuning: VehicleTuning) -> Result<VehicleId, SyncError> {
        let id = self.registry.add_vehicle(chassis, tuning)?;
        self.pump();
        Ok(id)
    }

    pub fn add_wheel(&mut self, vehicle: VehicleId, desc: WheelDesc) -> Result<u32, SyncError> {
        let index = self.registry.add_wheel(vehicle, desc)?;
        self.pump();
        Ok(index)
    }

    pub fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        let removed = self.registry.remove_vehicle(id);
        self.pump();
        removed
    }

    pub fn wheel_op(&mut self, vehicle: VehicleId, wheel: u32, op: WheelOp) -> Result<(), SyncError> {
        let record = self
            .registry
            .vehicle(vehicle)
            .ok_or(SyncError::UnknownVehicle(vehicle))?;
        let count = record.wheels.len();
        if wheel as usize >= count {
            return Err(SyncError::WheelOutOfRange { vehicle, wheel, count });
        }
        self.channel.send(Command::Wheel { vehicle, wheel, op });
        Ok(())
    }

    /// Apply `op` to every wheel of `vehicle`. Returns the wheel count.
    pub fn wheel_op_all(&mut self, vehicle: VehicleId, op: WheelOp) -> Result<usize, SyncError> {
        let count = self
            .registry
            .vehicle(vehicle)
            .ok_or(SyncError::UnknownVehicle(vehicle))?
            .wheels
            .len();
        for wheel in 0..count as u32 {
            self.channel.send(Command::Wheel { vehicle, wheel, op });
        }
        Ok(count)
    }

    // --- World ---

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
        self.channel.send(Command::SetGravity { gravity });
    }

    pub fn set_fixed_time_step(&mut self, time_step: f32) {
        self.config.fixed_time_step = time_step;
        self.channel.send(Command::SetFixedTimeStep { time_step });
    }

    /// Request one simulation step.
    ///
    /// Returns false, sending nothing, while the context is not ready or the
    /// previous step's world report has not arrived yet. Also returns false
    /// when the transport rejects `simulate`, leaving no step in flight.
    /// Dirty transforms are flushed ahead of `simulate`.
    pub fn step(&mut self, time_step: Option<f32>, max_sub_steps: Option<u32>) -> bool {
        if !self.channel.is_ready() {
            tracing::trace!("step requested before simulation is ready");
            return false;
        }
        if self.step_in_flight {
            tracing::trace!("step rejected, previous step still in flight");
            return false;
        }
        self.pump();
        for command in reconcile(&mut self.registry) {
            self.channel.send(command);
        }
        let sent = self.channel.send(Command::Simulate {
            time_step: time_step.unwrap_or(self.config.fixed_time_step),
            max_sub_steps: max_sub_steps.unwrap_or(self.config.max_sub_steps),
        });
        self.step_in_flight = sent;
        sent
    }

    // --- Inbound ---

    /// Apply one message from the simulation context. Never fails: malformed
    /// payloads and unresolved ids are logged and skipped.
    pub fn handle_message(&mut self, inbound: Inbound) {
        let payload = match inbound.normalize() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%err, "inbound message ignored");
                return;
            }
        };
        match payload {
            Payload::Probe => tracing::trace!("transfer probe echoed"),
            Payload::Notification(notification) => self.on_notification(notification),
            Payload::Report(report) => self.on_report(report),
        }
    }

    fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::WorldReady => {
                if *self.channel.state() != ReadyState::Initializing {
                    tracing::warn!(state = ?self.channel.state(), "unexpected worldReady");
                    return;
                }
                let flushed = self.channel.mark_ready();
                tracing::info!(flushed, "simulation ready");
                self.events.emit(&WorldEvent::Ready);
            }
            Notification::EngineLoaded => {
                self.events.emit(&WorldEvent::Loaded);
            }
            Notification::ObjectReady(id) => match self.registry.get_mut(id) {
                Some(record) => {
                    record.events.emit(&ObjectEvent::Added);
                }
                None => tracing::trace!(%id, "objectReady for unregistered id"),
            },
        }
    }

    fn on_report(&mut self, report: Report) {
        let kind = report.kind();
        match decode::decode(&mut self.registry, &report) {
            Ok(stats) => tracing::trace!(?kind, applied = stats.applied, skipped = stats.skipped, "report applied"),
            Err(err) => tracing::warn!(?kind, %err, "report decode failed"),
        }
        if kind == ReportKind::World {
            self.step_in_flight = false;
            self.steps_completed += 1;
            self.events.emit(&WorldEvent::Update);
        }
        if kind.recyclable() {
            self.channel.recycle(report.into_data());
        }
    }

    /// Forward registry commands to the channel in the order they were produced.
    fn pump(&mut self) {
        for command in self.registry.drain_commands() {
            self.channel.send(command);
        }
    }

    // --- Inspection ---

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &ReadyState {
        self.channel.state()
    }

    pub fn is_ready(&self) -> bool {
        self.channel.is_ready()
    }

    /// `Ok` once ready; otherwise why commands are not reaching the simulation.
    pub fn readiness(&self) -> Result<(), SyncError> {
        match self.channel.state() {
            ReadyState::Ready => Ok(()),
            ReadyState::Initializing => Err(SyncError::NotReady),
            ReadyState::Failed(reason) => Err(SyncError::InitFailed(reason.clone())),
        }
    }

    /// Commands waiting for readiness.
    pub fn pending_commands(&self) -> usize {
        self.channel.pending_len()
    }

    pub fn transfer_supported(&self) -> bool {
        self.channel.transfer_supported()
    }

    pub fn step_in_flight(&self) -> bool {
        self.step_in_flight
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.channel.transport_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingTransport;
    use crate::events::ObjectEventKind;
    use physlink_protocol::{CollisionEntry, Shape, WorldEntry};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ready_world() -> SyncWorld<RecordingTransport> {
        let mut world = SyncWorld::new(SimConfig::default(), RecordingTransport::new());
        world.handle_message(Inbound::Named {
            cmd: "worldReady".into(),
            params: serde_json::Value::Null,
        });
        world.transport_mut().take_sent();
        world
    }

    fn sphere() -> BodyDesc {
        BodyDesc::new(Shape::Sphere { radius: 0.5 }, 1.0)
    }

    fn world_report(id: ObjectId, position: Vec3) -> Inbound {
        Inbound::Floats(
            Report::encode(&[WorldEntry {
                id,
                position,
                quaternion: glam::Quat::IDENTITY,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
            }])
            .into_data(),
        )
    }

    #[test]
    fn init_is_sent_on_construction() {
        let world = SyncWorld::new(SimConfig::default(), RecordingTransport::new());
        assert_eq!(world.transport().names(), ["init"]);
        assert_eq!(*world.state(), ReadyState::Initializing);
        assert!(matches!(world.readiness(), Err(SyncError::NotReady)));
    }

    #[test]
    fn engine_payload_gates_init() {
        let config = SimConfig {
            engine_module: Some("engine.bin".into()),
            ..SimConfig::default()
        };
        let mut world = SyncWorld::new(config, RecordingTransport::new());
        assert!(world.transport().sent.is_empty());

        world.provide_engine(Ok(vec![1, 2, 3]));
        match world.transport().sent.as_slice() {
            [Command::Init { engine_module, .. }] => assert_eq!(engine_module.as_deref(), Some(&[1, 2, 3][..])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn step_requires_readiness() {
        let mut world = SyncWorld::new(SimConfig::default(), RecordingTransport::new());
        assert!(!world.step(None, None));
        assert!(!world.step_in_flight());
    }

    #[test]
    fn step_uses_config_defaults() {
        let mut world = ready_world();
        assert!(world.step(None, None));
        assert_eq!(
            world.transport().sent.last(),
            Some(&Command::Simulate {
                time_step: 1.0 / 60.0,
                max_sub_steps: 10,
            })
        );
    }

    #[test]
    fn world_report_completes_step_and_fires_update() {
        let mut world = ready_world();
        let id = world.attach(sphere()).unwrap();
        let updates = Rc::new(RefCell::new(0));
        let u = updates.clone();
        world.on(WorldEventKind::Update, move |_| *u.borrow_mut() += 1);

        assert!(world.step(None, None));
        assert!(!world.step(None, None));
        world.handle_message(world_report(id, Vec3::new(0.0, 4.0, 0.0)));
        assert!(!world.step_in_flight());
        assert_eq!(world.steps_completed(), 1);
        assert_eq!(*updates.borrow(), 1);
        assert_eq!(world.object(id).unwrap().position(), Vec3::new(0.0, 4.0, 0.0));
        assert!(world.step(None, None));
    }

    #[test]
    fn body_ops_validate_targets() {
        let mut world = ready_world();
        let id = world.attach(sphere()).unwrap();
        world.transport_mut().take_sent();

        world
            .body_op(id, BodyOp::SetLinearVelocity { velocity: Vec3::X })
            .unwrap();
        assert_eq!(world.object(id).unwrap().linear_velocity(), Vec3::X);
        assert!(matches!(
            world.body_op(ObjectId(99), BodyOp::ApplyTorque { torque: Vec3::Y }),
            Err(SyncError::UnknownObject(_))
        ));
        let anchor = BodyOp::AppendAnchor {
            node: 0,
            target: id,
            collide_linked: false,
            influence: 1.0,
        };
        assert!(matches!(world.body_op(id, anchor), Err(SyncError::NotSoftBody(_))));
        assert_eq!(world.transport().names(), ["body"]);
    }

    #[test]
    fn constraint_op_checks_kind() {
        let mut world = ready_world();
        let a = world.attach(sphere()).unwrap();
        let hinge = world
            .add_constraint(ConstraintDef::Hinge {
                object_a: a,
                object_b: None,
                pivot: Vec3::ZERO,
                axis: Vec3::Y,
            })
            .unwrap();
        world.transport_mut().take_sent();

        world
            .constraint_op(
                hinge,
                ConstraintOp::HingeEnableAngularMotor {
                    velocity: 1.0,
                    acceleration: 5.0,
                },
            )
            .unwrap();
        let err = world
            .constraint_op(hinge, ConstraintOp::SliderDisableLinearMotor)
            .unwrap_err();
        assert!(matches!(err, SyncError::ConstraintKindMismatch { .. }));
        assert!(matches!(
            world.constraint_op(ConstraintId(404), ConstraintOp::HingeDisableMotor),
            Err(SyncError::UnknownConstraint(_))
        ));
        assert_eq!(world.transport().names(), ["constraint"]);
    }

    #[test]
    fn wheel_ops_are_range_checked() {
        let mut world = ready_world();
        let chassis = world.attach(BodyDesc::new(Shape::Box { half_extents: Vec3::ONE }, 800.0)).unwrap();
        let v = world.add_vehicle(chassis, VehicleTuning::default()).unwrap();
        let desc = WheelDesc {
            connection_point: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            axle: Vec3::NEG_X,
            suspension_rest_length: 0.6,
            radius: 0.4,
            is_front: true,
        };
        world.add_wheel(v, desc).unwrap();
        world.add_wheel(v, desc).unwrap();
        world.transport_mut().take_sent();

        world.wheel_op(v, 1, WheelOp::SetSteering(0.3)).unwrap();
        assert!(matches!(
            world.wheel_op(v, 2, WheelOp::SetBrake(1.0)),
            Err(SyncError::WheelOutOfRange { count: 2, .. })
        ));
        assert_eq!(world.wheel_op_all(v, WheelOp::ApplyEngineForce(100.0)).unwrap(), 2);
        assert_eq!(world.transport().names(), ["wheel", "wheel", "wheel"]);
    }

    #[test]
    fn collision_report_is_not_recycled() {
        let mut world = ready_world();
        let a = world.attach(sphere()).unwrap();
        let b = world.attach(sphere()).unwrap();
        let added = Rc::new(RefCell::new(0));
        let hits = added.clone();
        world
            .object_mut(a)
            .unwrap()
            .on(ObjectEventKind::Collision, move |_| *hits.borrow_mut() += 1);

        let report = Report::encode(&[CollisionEntry { a, b, normal: Vec3::Y }]);
        world.handle_message(Inbound::Bytes(report.to_bytes()));
        assert_eq!(*added.borrow(), 1);
        assert!(world.transport().recycled.is_empty());

        world.handle_message(world_report(a, Vec3::ZERO));
        assert_eq!(world.transport().recycled.len(), 1);
    }

    #[test]
    fn object_ready_fires_added() {
        let mut world = ready_world();
        let id = world.attach(sphere()).unwrap();
        let added = Rc::new(RefCell::new(false));
        let flag = added.clone();
        world
            .object_mut(id)
            .unwrap()
            .on(ObjectEventKind::Added, move |_| *flag.borrow_mut() = true);
        world.handle_message(Inbound::Named {
            cmd: "objectReady".into(),
            params: serde_json::json!({ "id": id }),
        });
        assert!(*added.borrow());
    }

    #[test]
    fn oversized_record_counts_are_ignored() {
        use crate::registry::MeshBuffers;
        use physlink_protocol::SoftProxy;

        let mut world = ready_world();
        let soft = SoftProxy {
            positions: vec![0.0; 6],
            indices: Vec::new(),
            stiffness: 1.0,
            pressure: 0.0,
            iterations: 4,
        };
        let rope = world
            .attach(BodyDesc::new(Shape::Rope, 1.0).with_soft(soft, MeshBuffers::with_vertices(2, false)))
            .unwrap();
        assert!(world.step(None, None));

        world.handle_message(Inbound::Floats(vec![0.0, 1e20]));
        world.handle_message(Inbound::Floats(vec![1.0, 1e20]));
        world.handle_message(Inbound::Floats(vec![4.0, 1.0, rope.to_report(), 1e20]));
        world.handle_message(Inbound::Bytes(Report::new(vec![2.0, 0.0]).unwrap().to_bytes()));

        let record = world.object(rope).unwrap();
        assert_eq!(record.mesh().unwrap().positions, vec![0.0; 6]);
        assert!(!record.mesh().unwrap().positions_need_upload);
        assert!(world.step_in_flight(), "malformed world reports do not complete a step");
    }

    #[test]
    fn rejected_simulate_leaves_no_step_in_flight() {
        let mut world = ready_world();
        world.transport_mut().disconnected = true;
        assert!(!world.step(None, None));
        assert!(!world.step_in_flight());

        world.transport_mut().disconnected = false;
        assert!(world.step(None, None));
        assert!(world.step_in_flight());
        assert_eq!(world.transport().names(), ["simulate"]);
    }

    #[test]
    fn set_gravity_updates_config() {
        let mut world = ready_world();
        world.set_gravity(Vec3::new(0.0, -1.62, 0.0));
        world.set_fixed_time_step(1.0 / 120.0);
        assert_eq!(world.config().gravity, Vec3::new(0.0, -1.62, 0.0));
        assert_eq!(world.transport().names(), ["setGravity", "setFixedTimeStep"]);
    }
}
