//! Report decoding: applies binary reports to registry records.

use physlink_common::ObjectId;
use physlink_protocol::{
    ConstraintEntry, HEADER_LEN, ProtocolError, Report, ReportKind, WheelEntry, WorldEntry,
};

use crate::error::SyncError;
use crate::manifold::Manifold;
use crate::registry::Registry;

/// Per-report outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Records written into the registry (or, for collisions, contact-enter events).
    pub applied: usize,
    /// Records naming ids that are not (or no longer) registered.
    pub skipped: usize,
}

/// Decode one report into the registry, dispatching on its kind.
pub fn decode(registry: &mut Registry, report: &Report) -> Result<DecodeStats, SyncError> {
    let _span = tracing::trace_span!("decode", kind = ?report.kind()).entered();
    match report.kind() {
        ReportKind::World => apply_world(registry, report),
        ReportKind::Collision => {
            let events = Manifold::build(report)?.apply(registry);
            Ok(DecodeStats {
                applied: events.len(),
                skipped: 0,
            })
        }
        ReportKind::Vehicle => apply_vehicles(registry, report),
        ReportKind::Constraint => apply_constraints(registry, report),
        ReportKind::Soft => apply_soft(registry, report),
    }
}

/// Position/rotation only land when the matching dirty flag is clear;
/// velocities are simulation-owned and always overwritten.
pub fn apply_world(registry: &mut Registry, report: &Report) -> Result<DecodeStats, SyncError> {
    let mut stats = DecodeStats::default();
    for entry in report.entries::<WorldEntry>()? {
        let Some((record, e)) = entry.and_then(|e| Some((registry.get_mut(e.id)?, e))) else {
            stats.skipped += 1;
            continue;
        };
        record.apply_reported_pose(e.position, e.quaternion);
        record.linear_velocity = e.linear_velocity;
        record.angular_velocity = e.angular_velocity;
        stats.applied += 1;
    }
    log_skipped(ReportKind::World, stats);
    Ok(stats)
}

/// Wheels are simulation-only: no dirty-flag arbitration.
pub fn apply_vehicles(registry: &mut Registry, report: &Report) -> Result<DecodeStats, SyncError> {
    let mut stats = DecodeStats::default();
    for entry in report.entries::<WheelEntry>()? {
        let wheel = entry.and_then(|e| {
            let vehicle = registry.vehicle_mut(e.vehicle)?;
            let wheel = vehicle.wheels.get_mut(e.wheel as usize)?;
            Some((wheel, e))
        });
        match wheel {
            Some((wheel, e)) => {
                wheel.pose.position = e.position;
                wheel.pose.quaternion = e.quaternion;
                stats.applied += 1;
            }
            None => stats.skipped += 1,
        }
    }
    log_skipped(ReportKind::Vehicle, stats);
    Ok(stats)
}

/// The anchor arrives as an offset local to the reference object and is
/// moved into world space using that object's current pose.
pub fn apply_constraints(registry: &mut Registry, report: &Report) -> Result<DecodeStats, SyncError> {
    let mut stats = DecodeStats::default();
    for entry in report.entries::<ConstraintEntry>()? {
        let Some(e) = entry else {
            stats.skipped += 1;
            continue;
        };
        let Some(pose) = registry.get(e.object).map(|o| o.pose()) else {
            stats.skipped += 1;
            continue;
        };
        let Some(constraint) = registry.constraint_mut(e.constraint) else {
            stats.skipped += 1;
            continue;
        };
        constraint.anchor = pose.transform_point(e.anchor_offset);
        constraint.applied_impulse = e.impulse;
        stats.applied += 1;
    }
    log_skipped(ReportKind::Constraint, stats);
    Ok(stats)
}

/// Soft-body records carry `id, count` followed by `count` units whose
/// stride depends on the body's soft kind. Vertex data is deinterleaved into
/// the mesh's position and normal buffers.
///
/// A record for an unknown body makes the remaining stride unknowable, so
/// decoding stops there with [`SyncError::UnresolvedSoftBody`]; records
/// already applied stay applied.
pub fn apply_soft(registry: &mut Registry, report: &Report) -> Result<DecodeStats, SyncError> {
    let data = report.data();
    let mut stats = DecodeStats::default();
    let mut cursor = HEADER_LEN;

    for _ in 0..report.record_count() {
        let header = data.get(cursor..cursor + 2).ok_or(ProtocolError::Truncated {
            kind: ReportKind::Soft,
            needed: cursor + 2,
            len: data.len(),
        })?;
        let (raw_id, raw_count) = (header[0], header[1]);
        cursor += 2;

        let record = ObjectId::from_report(raw_id).and_then(|id| registry.get_mut(id));
        let Some(record) = record else {
            return Err(SyncError::UnresolvedSoftBody(raw_id));
        };
        let Some(kind) = record.shape().soft_kind() else {
            return Err(SyncError::NotSoftBody(record.id()));
        };
        // A unit is at least one float, so the count is bounded by what is left.
        let remaining = data.len() - cursor;
        if !raw_count.is_finite()
            || raw_count < 0.0
            || raw_count.fract() != 0.0
            || raw_count > remaining as f32
        {
            return Err(ProtocolError::BadHeader(raw_count).into());
        }
        let count = raw_count as usize;
        let layout = kind.layout();
        let end = count
            .checked_mul(layout.record_stride)
            .and_then(|n| n.checked_add(cursor))
            .unwrap_or(usize::MAX);
        let units = data.get(cursor..end).ok_or(ProtocolError::Truncated {
            kind: ReportKind::Soft,
            needed: end,
            len: data.len(),
        })?;
        cursor = end;

        let id = record.id();
        let Some(mesh) = record.mesh.as_mut() else {
            stats.skipped += 1;
            continue;
        };
        let floats = count * layout.position_stride;
        if mesh.positions.len() < floats || (layout.has_normals() && mesh.normals.len() < floats) {
            tracing::warn!(%id, units = count, "soft report larger than mesh buffers, record skipped");
            stats.skipped += 1;
            continue;
        }

        for (v, vertex) in units.chunks_exact(layout.vertex_stride()).enumerate() {
            let dst = v * 3;
            mesh.positions[dst..dst + 3].copy_from_slice(&vertex[..3]);
            if layout.has_normals() {
                mesh.normals[dst..dst + 3].copy_from_slice(&vertex[3..6]);
            }
        }
        mesh.positions_need_upload = true;
        mesh.normals_need_upload |= layout.has_normals();

        if !record.soft_transform_reset {
            record.reset_local_transform();
            record.soft_transform_reset = true;
        }
        stats.applied += 1;
    }
    Ok(stats)
}

fn log_skipped(kind: ReportKind, stats: DecodeStats) {
    if stats.skipped > 0 {
        tracing::trace!(?kind, skipped = stats.skipped, "records for unresolved ids skipped");
    }
}
