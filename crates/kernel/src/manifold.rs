//! Per-step collision manifold built from a collision report.

use glam::Vec3;
use physlink_common::ObjectId;
use physlink_protocol::{CollisionEntry, HEADER_LEN, ProtocolError, Report, ReportKind};
use std::collections::{BTreeMap, HashMap};

use crate::events::{CollisionEvent, ObjectEvent};
use crate::registry::Registry;

/// Symmetric contact adjacency for one step.
///
/// Normals are not copied: the manifold keeps a signed offset into the
/// report buffer per ordered pair. A negative offset means the pair was
/// reported the other way round and the normal must be negated.
#[derive(Debug)]
pub struct Manifold<'a> {
    data: &'a [f32],
    adjacency: BTreeMap<ObjectId, Vec<ObjectId>>,
    offsets: HashMap<(ObjectId, ObjectId), isize>,
}

impl<'a> Manifold<'a> {
    pub fn build(report: &'a Report) -> Result<Self, ProtocolError> {
        let mut manifold = Self {
            data: report.data(),
            adjacency: BTreeMap::new(),
            offsets: HashMap::new(),
        };
        if report.kind() != ReportKind::Collision {
            tracing::warn!(kind = ?report.kind(), "manifold built from non-collision report");
            return Ok(manifold);
        }
        let stride = ReportKind::Collision.stride().unwrap_or(5);
        for (i, entry) in report.entries::<CollisionEntry>()?.enumerate() {
            let Some(CollisionEntry { a, b, .. }) = entry else {
                continue;
            };
            if a == b {
                continue;
            }
            let offset = (HEADER_LEN + i * stride + CollisionEntry::NORMAL_OFFSET) as isize;
            if manifold.offsets.contains_key(&(a, b)) {
                continue;
            }
            manifold.offsets.insert((a, b), offset);
            manifold.offsets.insert((b, a), -offset);
            manifold.adjacency.entry(a).or_default().push(b);
            manifold.adjacency.entry(b).or_default().push(a);
        }
        Ok(manifold)
    }

    /// Objects in contact with `id` this step, in report order.
    pub fn partners(&self, id: ObjectId) -> &[ObjectId] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Contact normal as seen from `a`.
    pub fn normal(&self, a: ObjectId, b: ObjectId) -> Option<Vec3> {
        let offset = *self.offsets.get(&(a, b))?;
        let start = offset.unsigned_abs();
        let n = self.data.get(start..start + 3)?;
        let normal = Vec3::new(n[0], n[1], n[2]);
        Some(if offset < 0 { -normal } else { normal })
    }

    pub fn pair_count(&self) -> usize {
        self.offsets.len() / 2
    }

    /// Update every record's touch list and emit collision events for
    /// partners that were not already touching.
    ///
    /// Partners that are not registered are ignored. Records with no contacts
    /// this step have their touches cleared. Returns the emitted events.
    pub fn apply(&self, registry: &mut Registry) -> Vec<(ObjectId, CollisionEvent)> {
        let mut emitted = Vec::new();
        for id in registry.object_ids() {
            let current: Vec<ObjectId> = self
                .partners(id)
                .iter()
                .copied()
                .filter(|other| registry.contains(*other))
                .collect();

            let Some(record) = registry.get(id) else {
                continue;
            };
            let mut entered = Vec::new();
            for &other in &current {
                if record.touches().contains(&other) {
                    continue;
                }
                let Some(partner) = registry.get(other) else {
                    continue;
                };
                entered.push(CollisionEvent {
                    other,
                    relative_linear_velocity: record.linear_velocity() - partner.linear_velocity(),
                    relative_angular_velocity: record.angular_velocity() - partner.angular_velocity(),
                    normal: self.normal(id, other).unwrap_or(Vec3::ZERO),
                });
            }

            let Some(record) = registry.get_mut(id) else {
                continue;
            };
            record.touches.retain(|t| current.contains(t));
            for event in entered {
                record.touches.push(event.other);
                record.events.emit(&ObjectEvent::Collision(event));
                emitted.push((id, event));
            }
        }
        if !emitted.is_empty() {
            tracing::trace!(entered = emitted.len(), pairs = self.pair_count(), "contacts began");
        }
        emitted
    }
}
