//! Wire protocol between the sync core and the simulation context.
//!
//! Commands flow core → simulation as a closed [`Command`] enum. Reports flow
//! back as flat `f32` buffers tagged by [`ReportKind`], alongside a handful of
//! named [`Notification`]s.
//!
//! # Invariants
//! - Every report record has a fixed stride except soft-body records, whose
//!   stride depends on the soft kind of the body they describe.
//! - Unknown tags and names surface as [`ProtocolError`], never as panics.

mod command;
mod config;
mod report;

pub use command::{
    BodyOp, BodyProxy, ChildProxy, Command, ConstraintDef, ConstraintKindTag, ConstraintOp,
    ConstraintProxy, MaterialProxy, Shape, SoftProxy, VehicleProxy, VehicleTuning, WheelDesc,
    WheelOp,
};
pub use config::{Broadphase, ConfigError, SimConfig};
pub use report::{
    CollisionEntry, ConstraintEntry, Entry, HEADER_LEN, Inbound, Notification, PROBE_LEN,
    Payload, ProtocolError, Report, ReportKind, SoftEntry, SoftKind, SoftLayout, WheelEntry,
    WorldEntry,
};

pub fn crate_info() -> &'static str {
    "physlink-protocol v0.1.0"
}
