//! In-process simulation context on its own thread.
//!
//! Commands cross as JSON text, reports come back as flat float or byte
//! buffers, so the demo exercises the same wire shapes a remote context would.
//! The integrator is deliberately small: gravity, a ground plane and
//! sphere-sphere overlap detection.

use crossbeam_channel::{Receiver, Sender};
use glam::{Quat, Vec3};
use physlink_common::ObjectId;
use physlink_kernel::{Transport, TransportError};
use physlink_protocol::{
    BodyOp, CollisionEntry, Command, Entry, Inbound, Notification, ReportKind, Shape, SimConfig,
    WorldEntry,
};
use std::collections::BTreeMap;
use std::thread::JoinHandle;

/// Messages from the sync core to the simulation thread.
#[derive(Debug)]
pub enum ToSim {
    Command(String),
    Probe(Vec<u8>),
    Recycle(Vec<f32>),
}

/// Main-context end of the loopback pair.
#[derive(Debug)]
pub struct LoopbackTransport {
    tx: Sender<ToSim>,
}

impl LoopbackTransport {
    pub fn new(tx: Sender<ToSim>) -> Self {
        Self { tx }
    }
}

impl Transport for LoopbackTransport {
    fn post(&mut self, command: &Command) -> Result<(), TransportError> {
        let json = command
            .to_json()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.tx
            .send(ToSim::Command(json))
            .map_err(|_| TransportError::Disconnected)
    }

    fn probe_transfer(&mut self, probe: Vec<u8>) -> Vec<u8> {
        // Moving the buffer into the channel is the transfer; a failed send
        // hands it back intact.
        match self.tx.send(ToSim::Probe(probe)) {
            Ok(()) => Vec::new(),
            Err(err) => match err.into_inner() {
                ToSim::Probe(probe) => probe,
                _ => Vec::new(),
            },
        }
    }

    fn recycle(&mut self, buffer: Vec<f32>) -> Result<(), TransportError> {
        self.tx
            .send(ToSim::Recycle(buffer))
            .map_err(|_| TransportError::Disconnected)
    }
}

#[derive(Debug, Clone)]
struct Body {
    position: Vec3,
    quaternion: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    radius: f32,
    inverse_mass: f32,
}

/// Toy simulation state owned by the simulation thread.
#[derive(Debug, Default)]
struct Sim {
    config: SimConfig,
    bodies: BTreeMap<ObjectId, Body>,
    /// Height of the ground plane, once one has been added.
    ground: Option<(ObjectId, f32)>,
    pool: Vec<Vec<f32>>,
}

const RESTITUTION: f32 = 0.4;

impl Sim {
    fn apply(&mut self, command: Command, out: &Sender<Inbound>) {
        match command {
            Command::Init { config, engine_module } => {
                self.config = config;
                if engine_module.is_some() {
                    send_named(out, Notification::EngineLoaded);
                }
                send_named(out, Notification::WorldReady);
            }
            Command::AddObject(proxy) => {
                let id = proxy.id;
                if let Shape::Plane { .. } = proxy.shape {
                    self.ground = Some((id, proxy.position.y));
                } else {
                    let radius = match proxy.shape {
                        Shape::Sphere { radius } => radius,
                        Shape::Box { half_extents } => half_extents.max_element(),
                        _ => 0.5,
                    };
                    self.bodies.insert(
                        id,
                        Body {
                            position: proxy.position,
                            quaternion: proxy.quaternion,
                            linear_velocity: Vec3::ZERO,
                            angular_velocity: Vec3::ZERO,
                            radius,
                            inverse_mass: if proxy.mass > 0.0 { 1.0 / proxy.mass } else { 0.0 },
                        },
                    );
                }
                send_named(out, Notification::ObjectReady(id));
            }
            Command::RemoveObject { id } => {
                self.bodies.remove(&id);
                if self.ground.is_some_and(|(g, _)| g == id) {
                    self.ground = None;
                }
            }
            Command::UpdateTransform { id, pos, quat } => {
                if let Some(body) = self.bodies.get_mut(&id) {
                    if let Some(pos) = pos {
                        body.position = pos;
                    }
                    if let Some(quat) = quat {
                        body.quaternion = quat;
                    }
                }
            }
            Command::SetGravity { gravity } => self.config.gravity = gravity,
            Command::SetFixedTimeStep { time_step } => self.config.fixed_time_step = time_step,
            Command::Body { id, op } => {
                if let Some(body) = self.bodies.get_mut(&id) {
                    match op {
                        BodyOp::SetLinearVelocity { velocity } => body.linear_velocity = velocity,
                        BodyOp::SetAngularVelocity { velocity } => body.angular_velocity = velocity,
                        BodyOp::ApplyCentralImpulse { impulse } => {
                            body.linear_velocity += impulse * body.inverse_mass;
                        }
                        other => tracing::debug!(?other, "body op not modelled by loopback"),
                    }
                }
            }
            Command::Simulate { time_step, max_sub_steps } => {
                let contacts = self.simulate(time_step, max_sub_steps);
                self.report_collisions(&contacts, out);
                self.report_world(out);
            }
            other => tracing::debug!(cmd = other.name(), "command not modelled by loopback"),
        }
    }

    fn simulate(&mut self, time_step: f32, max_sub_steps: u32) -> Vec<(ObjectId, ObjectId, Vec3)> {
        let fixed = self.config.fixed_time_step;
        let sub_steps = ((time_step / fixed).ceil() as u32).clamp(1, max_sub_steps.max(1));
        let gravity = self.config.gravity;
        let ground = self.ground;
        let mut contacts = Vec::new();

        for _ in 0..sub_steps {
            for body in self.bodies.values_mut().filter(|b| b.inverse_mass > 0.0) {
                body.linear_velocity += gravity * fixed;
                body.position += body.linear_velocity * fixed;
                if let Some((_, height)) = ground {
                    let floor = height + body.radius;
                    if body.position.y < floor {
                        body.position.y = floor;
                        body.linear_velocity.y = -body.linear_velocity.y * RESTITUTION;
                    }
                }
            }
        }

        if let Some((ground_id, height)) = ground {
            for (id, body) in &self.bodies {
                if body.position.y - body.radius <= height + 1e-3 {
                    contacts.push((*id, ground_id, Vec3::NEG_Y));
                }
            }
        }
        let bodies: Vec<_> = self.bodies.iter().collect();
        for (i, (a, ba)) in bodies.iter().enumerate() {
            for (b, bb) in &bodies[i + 1..] {
                let delta = bb.position - ba.position;
                if delta.length() < ba.radius + bb.radius {
                    contacts.push((**a, **b, delta.normalize_or_zero()));
                }
            }
        }
        contacts
    }

    fn buffer(&mut self, kind: ReportKind, count: usize) -> Vec<f32> {
        let mut data = self.pool.pop().unwrap_or_default();
        data.clear();
        data.push(kind.tag());
        data.push(count as f32);
        data
    }

    fn report_collisions(&mut self, contacts: &[(ObjectId, ObjectId, Vec3)], out: &Sender<Inbound>) {
        // Collision buffers are not recycled by the core, so they are never pooled.
        let mut data = vec![ReportKind::Collision.tag(), contacts.len() as f32];
        for &(a, b, normal) in contacts {
            CollisionEntry { a, b, normal }.write(&mut data);
        }
        let _ = out.send(Inbound::Floats(data));
    }

    fn report_world(&mut self, out: &Sender<Inbound>) {
        let mut data = self.buffer(ReportKind::World, self.bodies.len());
        for (id, body) in &self.bodies {
            WorldEntry {
                id: *id,
                position: body.position,
                quaternion: body.quaternion,
                linear_velocity: body.linear_velocity,
                angular_velocity: body.angular_velocity,
            }
            .write(&mut data);
        }
        let _ = out.send(Inbound::Floats(data));
    }
}

fn send_named(out: &Sender<Inbound>, notification: Notification) {
    let (cmd, params) = notification.to_named();
    let _ = out.send(Inbound::Named { cmd, params });
}

/// Start the simulation thread. It exits when the core drops its transport.
pub fn spawn(rx: Receiver<ToSim>, out: Sender<Inbound>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut sim = Sim::default();
        for message in rx {
            match message {
                ToSim::Command(json) => match serde_json::from_str::<Command>(&json) {
                    Ok(command) => sim.apply(command, &out),
                    Err(err) => tracing::warn!(%err, "undecodable command"),
                },
                ToSim::Probe(probe) => {
                    let _ = out.send(Inbound::Bytes(probe));
                }
                ToSim::Recycle(buffer) => sim.pool.push(buffer),
            }
        }
        tracing::debug!(bodies = sim.bodies.len(), "simulation thread stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn probe_is_moved_into_the_channel() {
        let (tx, rx) = unbounded();
        let mut transport = LoopbackTransport::new(tx);
        assert!(transport.probe_transfer(vec![0]).is_empty());
        assert!(matches!(rx.try_recv(), Ok(ToSim::Probe(p)) if p == vec![0]));
    }

    #[test]
    fn probe_is_returned_when_disconnected() {
        let (tx, rx) = unbounded();
        drop(rx);
        let mut transport = LoopbackTransport::new(tx);
        assert_eq!(transport.probe_transfer(vec![0]), vec![0]);
        assert!(matches!(
            transport.post(&Command::RemoveObject { id: ObjectId(1) }),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn init_answers_world_ready() {
        let (tx, rx) = unbounded();
        let mut sim = Sim::default();
        sim.apply(
            Command::Init {
                config: SimConfig::default(),
                engine_module: None,
            },
            &tx,
        );
        match rx.try_recv() {
            Ok(Inbound::Named { cmd, .. }) => assert_eq!(cmd, "worldReady"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn falling_sphere_rests_on_ground() {
        let mut sim = Sim::default();
        sim.ground = Some((ObjectId(1), 0.0));
        sim.bodies.insert(
            ObjectId(2),
            Body {
                position: Vec3::new(0.0, 0.6, 0.0),
                quaternion: Quat::IDENTITY,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                radius: 0.5,
                inverse_mass: 1.0,
            },
        );
        let mut touched = false;
        for _ in 0..60 {
            touched |= !sim.simulate(1.0 / 60.0, 1).is_empty();
        }
        assert!(touched);
        assert!(sim.bodies[&ObjectId(2)].position.y >= 0.5);
    }
}
