use glam::Vec3;
use physlink_common::{MaterialId, ObjectId};
use physlink_kernel::{BodyDesc, Manifold, Material, Registry};
use physlink_protocol::{CollisionEntry, Command, Report, Shape};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
enum Op {
    Register { material: Option<u32> },
    Unregister { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::option::of(0u32..3).prop_map(|material| Op::Register { material }),
        (0usize..16).prop_map(|pick| Op::Unregister { pick }),
    ]
}

fn material(id: u32) -> Material {
    Material {
        id: MaterialId(id),
        friction: 0.5,
        restitution: 0.2,
    }
}

proptest! {
    #[test]
    fn material_refcount_tracks_live_users(ops in proptest::collection::vec(op(), 1..64)) {
        let mut reg = Registry::new();
        let mut live: Vec<(ObjectId, Option<u32>)> = Vec::new();
        let mut reached_zero: BTreeMap<u32, usize> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Register { material: m } => {
                    let mut desc = BodyDesc::new(Shape::Sphere { radius: 1.0 }, 1.0);
                    if let Some(m) = m {
                        desc = desc.with_material(material(m));
                    }
                    let id = reg.register(desc).unwrap();
                    live.push((id, m));
                }
                Op::Unregister { pick } => {
                    if live.is_empty() {
                        // Unknown ids are a no-op.
                        prop_assert!(!reg.unregister(ObjectId(10_000)));
                        continue;
                    }
                    let (id, m) = live.remove(pick % live.len());
                    prop_assert!(reg.unregister(id));
                    prop_assert!(!reg.unregister(id));
                    if let Some(m) = m {
                        if !live.iter().any(|(_, other)| *other == Some(m)) {
                            *reached_zero.entry(m).or_default() += 1;
                        }
                    }
                }
            }

            for m in 0..3 {
                let users = live.iter().filter(|(_, other)| *other == Some(m)).count();
                match reg.material(MaterialId(m)) {
                    Some(record) => prop_assert_eq!(record.refcount(), users),
                    None => prop_assert_eq!(users, 0),
                }
            }
        }

        let mut unregistered: BTreeMap<u32, usize> = BTreeMap::new();
        for command in reg.drain_commands() {
            if let Command::UnregisterMaterial(proxy) = command {
                *unregistered.entry(proxy.id.0).or_default() += 1;
            }
        }
        prop_assert_eq!(unregistered, reached_zero);
    }

    #[test]
    fn collision_events_fire_only_on_contact_enter(
        ticks in proptest::collection::vec(
            proptest::collection::vec((0usize..4, 0usize..4), 0..6),
            1..24,
        )
    ) {
        let mut reg = Registry::new();
        let ids: Vec<ObjectId> = (0..4)
            .map(|_| reg.register(BodyDesc::new(Shape::Sphere { radius: 1.0 }, 1.0)).unwrap())
            .collect();
        let mut previous: BTreeSet<(ObjectId, ObjectId)> = BTreeSet::new();

        for pairs in ticks {
            let entries: Vec<_> = pairs
                .iter()
                .map(|&(a, b)| CollisionEntry { a: ids[a], b: ids[b], normal: Vec3::Y })
                .collect();
            let current: BTreeSet<(ObjectId, ObjectId)> = pairs
                .iter()
                .filter(|(a, b)| a != b)
                .map(|&(a, b)| (ids[a.min(b)], ids[a.max(b)]))
                .collect();

            let report = Report::encode(&entries);
            let events = Manifold::build(&report).unwrap().apply(&mut reg);

            let entered = current.difference(&previous).count();
            prop_assert_eq!(events.len(), entered * 2);
            for &(a, b) in &current {
                prop_assert!(reg.get(a).unwrap().touches().contains(&b));
                prop_assert!(reg.get(b).unwrap().touches().contains(&a));
            }
            let touching: usize = ids.iter().map(|id| reg.get(*id).unwrap().touches().len()).sum();
            prop_assert_eq!(touching, current.len() * 2);
            previous = current;
        }
    }
}
