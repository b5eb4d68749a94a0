use physlink_common::{ConstraintId, ObjectId, VehicleId};
use physlink_protocol::{ConstraintKindTag, ProtocolError};

use crate::channel::TransportError;

/// Errors from sync-core operations.
///
/// Operations that name an id return these to the caller. Decoding errors are
/// logged by [`SyncWorld::handle_message`](crate::SyncWorld::handle_message)
/// and never cross the message boundary.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{0} is not registered")]
    UnknownObject(ObjectId),
    #[error("{0} is not registered")]
    UnknownConstraint(ConstraintId),
    #[error("{0} is not registered")]
    UnknownVehicle(VehicleId),
    #[error("{vehicle} has {count} wheels, no wheel {wheel}")]
    WheelOutOfRange {
        vehicle: VehicleId,
        wheel: u32,
        count: usize,
    },
    #[error("{id} is a {kind:?} constraint, op targets {op:?}")]
    ConstraintKindMismatch {
        id: ConstraintId,
        kind: ConstraintKindTag,
        op: ConstraintKindTag,
    },
    #[error("{0} is not a soft body")]
    NotSoftBody(ObjectId),
    #[error("invalid body: {0}")]
    InvalidBody(String),
    #[error("simulation context is not ready yet")]
    NotReady,
    #[error("simulation context failed to start: {0}")]
    InitFailed(String),
    #[error("soft report names unknown body {0}; rest of report abandoned")]
    UnresolvedSoftBody(f32),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure to obtain the optional engine payload before `init`.
#[derive(Debug, thiserror::Error)]
pub enum EngineLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch failed: {0}")]
    Fetch(String),
}
