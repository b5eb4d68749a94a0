use physlink_common::ObjectId;
use physlink_kernel::{ReadyState, SyncWorld, Transport};

/// Sync-world inspector for developer tooling.
///
/// Provides read-only queries against the registry and channel state for
/// debugging and CLI output.
pub struct SyncInspector;

impl SyncInspector {
    /// Produce a summary of the world state.
    pub fn summary<T: Transport>(world: &SyncWorld<T>) -> SyncSummary {
        let registry = world.registry();
        SyncSummary {
            state: world.state().clone(),
            objects: registry.object_count(),
            constraints: registry.constraint_count(),
            vehicles: registry.vehicle_count(),
            materials: registry.material_count(),
            pending_commands: world.pending_commands(),
            step_in_flight: world.step_in_flight(),
            steps_completed: world.steps_completed(),
            transfer_supported: world.transfer_supported(),
        }
    }

    /// Pose, velocities and contacts of one object.
    pub fn inspect_object<T: Transport>(world: &SyncWorld<T>, id: ObjectId) -> Option<ObjectInfo> {
        world.object(id).map(|record| {
            let p = record.position();
            let q = record.quaternion();
            let v = record.linear_velocity();
            let w = record.angular_velocity();
            ObjectInfo {
                id,
                shape: record.shape().name(),
                position: p.to_array(),
                quaternion: q.to_array(),
                linear_velocity: v.to_array(),
                angular_velocity: w.to_array(),
                touches: record.touches().to_vec(),
                dirty: record.dirty_position() || record.dirty_rotation(),
            }
        })
    }

    /// List all object ids, ascending.
    pub fn list_objects<T: Transport>(world: &SyncWorld<T>) -> Vec<ObjectId> {
        world.registry().object_ids()
    }
}

/// Summary of sync state for the inspector.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub state: ReadyState,
    pub objects: usize,
    pub constraints: usize,
    pub vehicles: usize,
    pub materials: usize,
    pub pending_commands: usize,
    pub step_in_flight: bool,
    pub steps_completed: u64,
    pub transfer_supported: bool,
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            ReadyState::Initializing => "initializing".to_string(),
            ReadyState::Ready => "ready".to_string(),
            ReadyState::Failed(reason) => format!("failed ({reason})"),
        };
        write!(
            f,
            "Sync: state={} steps={} in_flight={} objects={} constraints={} vehicles={} materials={} pending={} transfer={}",
            state,
            self.steps_completed,
            self.step_in_flight,
            self.objects,
            self.constraints,
            self.vehicles,
            self.materials,
            self.pending_commands,
            self.transfer_supported,
        )
    }
}

/// Detailed info about a single object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub shape: &'static str,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub touches: Vec<ObjectId>,
    pub dirty: bool,
}

impl std::fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] pos=({:.2}, {:.2}, {:.2}) vel=({:.2}, {:.2}, {:.2}) touches={}",
            self.id,
            self.shape,
            self.position[0],
            self.position[1],
            self.position[2],
            self.linear_velocity[0],
            self.linear_velocity[1],
            self.linear_velocity[2],
            self.touches.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use physlink_kernel::{BodyDesc, RecordingTransport};
    use physlink_protocol::{Inbound, Shape, SimConfig};

    fn world() -> SyncWorld<RecordingTransport> {
        SyncWorld::new(SimConfig::default(), RecordingTransport::new())
    }

    #[test]
    fn summary_fresh_world() {
        let world = world();
        let summary = SyncInspector::summary(&world);
        assert_eq!(summary.state, ReadyState::Initializing);
        assert_eq!(summary.objects, 0);
        assert_eq!(summary.steps_completed, 0);
        assert!(summary.transfer_supported);
    }

    #[test]
    fn summary_counts_pending_commands() {
        let mut world = world();
        world.attach(BodyDesc::new(Shape::Sphere { radius: 1.0 }, 1.0)).unwrap();
        world.attach(BodyDesc::new(Shape::Sphere { radius: 1.0 }, 1.0)).unwrap();

        let summary = SyncInspector::summary(&world);
        assert_eq!(summary.objects, 2);
        assert_eq!(summary.pending_commands, 2);

        world.handle_message(Inbound::Named {
            cmd: "worldReady".into(),
            params: serde_json::Value::Null,
        });
        let summary = SyncInspector::summary(&world);
        assert_eq!(summary.state, ReadyState::Ready);
        assert_eq!(summary.pending_commands, 0);
    }

    #[test]
    fn inspect_object_found() {
        let mut world = world();
        let id = world
            .attach(
                BodyDesc::new(Shape::Box { half_extents: Vec3::ONE }, 2.0)
                    .with_position(Vec3::new(1.0, 2.0, 3.0)),
            )
            .unwrap();

        let info = SyncInspector::inspect_object(&world, id).unwrap();
        assert_eq!(info.position, [1.0, 2.0, 3.0]);
        assert_eq!(info.shape, "box");
        assert!(info.touches.is_empty());
        assert!(!info.dirty);
    }

    #[test]
    fn inspect_object_not_found() {
        let world = world();
        assert!(SyncInspector::inspect_object(&world, ObjectId(42)).is_none());
    }

    #[test]
    fn list_objects() {
        let mut world = world();
        let a = world.attach(BodyDesc::new(Shape::Sphere { radius: 1.0 }, 1.0)).unwrap();
        let b = world.attach(BodyDesc::new(Shape::Sphere { radius: 1.0 }, 1.0)).unwrap();
        assert_eq!(SyncInspector::list_objects(&world), vec![a, b]);
    }

    #[test]
    fn summary_display() {
        let world = world();
        let s = format!("{}", SyncInspector::summary(&world));
        assert!(s.contains("state=initializing"));
        assert!(s.contains("steps=0"));
    }
}
