//! Observer component composed into the world and into every object record.

use glam::Vec3;
use physlink_common::ObjectId;
use std::fmt;

/// An event that can be subscribed to by kind.
pub trait Event {
    type Kind: Copy + Eq + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`Emitter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Box<dyn FnMut(&E)>;

/// Kind-filtered listener list. Listeners run in subscription order.
pub struct Emitter<E: Event> {
    next_id: u64,
    listeners: Vec<(ListenerId, E::Kind, Listener<E>)>,
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<E: Event> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E: Event> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: E::Kind, listener: impl FnMut(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kind, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener of its kind. Returns how many ran.
    pub fn emit(&mut self, event: &E) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for (_, k, listener) in &mut self.listeners {
            if *k == kind {
                listener(event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// World-level events.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// The simulation context signalled readiness; deferred commands were flushed.
    Ready,
    /// The optional engine payload finished loading on the simulation side.
    Loaded,
    /// One simulation step completed and its world report was applied.
    Update,
    /// Initialization failed. Deferred commands will not be flushed.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldEventKind {
    Ready,
    Loaded,
    Update,
    Failed,
}

impl Event for WorldEvent {
    type Kind = WorldEventKind;

    fn kind(&self) -> WorldEventKind {
        match self {
            Self::Ready => WorldEventKind::Ready,
            Self::Loaded => WorldEventKind::Loaded,
            Self::Update => WorldEventKind::Update,
            Self::Failed(_) => WorldEventKind::Failed,
        }
    }
}

/// Contact-enter data delivered to the object that gained a new partner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub other: ObjectId,
    /// Self minus other.
    pub relative_linear_velocity: Vec3,
    /// Self minus other.
    pub relative_angular_velocity: Vec3,
    /// Contact normal as seen from this object.
    pub normal: Vec3,
}

/// Per-object events.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent {
    Collision(CollisionEvent),
    /// The simulation context created the body (`physics:added`).
    Added,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectEventKind {
    Collision,
    Added,
}

impl Event for ObjectEvent {
    type Kind = ObjectEventKind;

    fn kind(&self) -> ObjectEventKind {
        match self {
            Self::Collision(_) => ObjectEventKind::Collision,
            Self::Added => ObjectEventKind::Added,
        }
    }
}
