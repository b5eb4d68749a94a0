//! Dirty-state reconciliation: turns external transform writes into
//! `updateTransform` commands ahead of each step.

use physlink_protocol::Command;

use crate::registry::Registry;

/// Emit one `updateTransform` per record with a dirty flag and clear the flags.
///
/// Must run before `simulate` is sent so external writes reach the simulation
/// before it advances. Compound children never become dirty: the simulation
/// only knows their root, and the setters refuse writes to them.
pub fn reconcile(registry: &mut Registry) -> Vec<Command> {
    let mut commands = Vec::new();
    for record in registry.objects_mut() {
        if record.parent().is_some() || !(record.dirty_position || record.dirty_rotation) {
            continue;
        }
        commands.push(Command::UpdateTransform {
            id: record.id(),
            pos: record.dirty_position.then(|| record.position()),
            quat: record.dirty_rotation.then(|| record.quaternion()),
        });
        record.dirty_position = false;
        record.dirty_rotation = false;
    }
    if !commands.is_empty() {
        tracing::trace!(updates = commands.len(), "dirty transforms flushed");
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BodyDesc;
    use glam::{Quat, Vec3};
    use physlink_protocol::Shape;

    fn registry_with(n: usize) -> (Registry, Vec<physlink_common::ObjectId>) {
        let mut reg = Registry::new();
        let ids = (0..n)
            .map(|_| reg.register(BodyDesc::new(Shape::Sphere { radius: 0.5 }, 1.0)).unwrap())
            .collect();
        reg.drain_commands();
        (reg, ids)
    }

    #[test]
    fn clean_records_produce_nothing() {
        let (mut reg, _) = registry_with(3);
        assert!(reconcile(&mut reg).is_empty());
    }

    #[test]
    fn only_dirty_fields_are_sent() {
        let (mut reg, ids) = registry_with(2);
        reg.get_mut(ids[0]).unwrap().set_position(Vec3::new(1.0, 2.0, 3.0));
        let q = Quat::from_rotation_y(0.5);
        reg.get_mut(ids[1]).unwrap().set_quaternion(q);

        let commands = reconcile(&mut reg);
        assert_eq!(
            commands,
            vec![
                Command::UpdateTransform {
                    id: ids[0],
                    pos: Some(Vec3::new(1.0, 2.0, 3.0)),
                    quat: None,
                },
                Command::UpdateTransform {
                    id: ids[1],
                    pos: None,
                    quat: Some(q),
                },
            ]
        );
    }

    #[test]
    fn compound_child_writes_are_refused() {
        let mut reg = Registry::new();
        let root = reg
            .register(
                BodyDesc::new(Shape::Compound, 1.0)
                    .with_child(BodyDesc::new(Shape::Sphere { radius: 0.5 }, 1.0).with_position(Vec3::Y)),
            )
            .unwrap();
        reg.drain_commands();
        let child = reg.get(root).unwrap().children()[0];

        let record = reg.get_mut(child).unwrap();
        assert!(!record.set_position(Vec3::X));
        assert!(!record.set_quaternion(Quat::from_rotation_z(1.0)));
        assert_eq!(record.position(), Vec3::Y);
        assert!(!record.dirty_position() && !record.dirty_rotation());
        assert!(reconcile(&mut reg).is_empty());

        assert!(reg.get_mut(root).unwrap().set_position(Vec3::X));
        assert_eq!(
            reconcile(&mut reg),
            vec![Command::UpdateTransform {
                id: root,
                pos: Some(Vec3::X),
                quat: None,
            }]
        );
    }

    #[test]
    fn flags_are_cleared_after_flush() {
        let (mut reg, ids) = registry_with(1);
        reg.get_mut(ids[0]).unwrap().set_position(Vec3::ONE);
        assert_eq!(reconcile(&mut reg).len(), 1);
        let r = reg.get(ids[0]).unwrap();
        assert!(!r.dirty_position() && !r.dirty_rotation());
        assert!(reconcile(&mut reg).is_empty());
    }
}
