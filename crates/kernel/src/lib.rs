//! Sync core: keeps renderable state and an opaque simulation context in step.
//!
//! Commands go out through a [`CommandChannel`]; binary reports come back and
//! are decoded into the [`Registry`]. [`SyncWorld`] ties the pieces together.
//!
//! # Invariants
//! - Dirty transforms are flushed before every `simulate`, and a report never
//!   overwrites a position or rotation whose dirty flag is set.
//! - Velocities, touches and constraint impulses are written only by decoding.
//! - Commands issued before the simulation is ready are replayed in call order.
//! - Nothing decoded from a report panics or propagates past `handle_message`.

pub mod channel;
pub mod decode;
pub mod deferred;
pub mod error;
pub mod events;
pub mod manifold;
pub mod reconcile;
pub mod registry;
pub mod world;

pub use channel::{CommandChannel, RecordingTransport, Transport, TransportError};
pub use decode::DecodeStats;
pub use deferred::{DeferredQueue, ReadyState, Submit};
pub use error::{EngineLoadError, SyncError};
pub use events::{
    CollisionEvent, Emitter, Event, ListenerId, ObjectEvent, ObjectEventKind, WorldEvent,
    WorldEventKind,
};
pub use manifold::Manifold;
pub use registry::{
    BodyDesc, ConstraintRecord, Material, MaterialRecord, MeshBuffers, ObjectRecord, Registry,
    VehicleRecord, Wheel,
};
pub use world::SyncWorld;
