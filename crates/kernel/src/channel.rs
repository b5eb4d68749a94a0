//! One-directional command path from the sync core to the simulation context.

use physlink_protocol::{Command, PROBE_LEN};

use crate::deferred::{DeferredQueue, ReadyState, Submit};

/// Errors raised by a [`Transport`]. Logged, never propagated to callers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("simulation context disconnected")]
    Disconnected,
    #[error("encode error: {0}")]
    Encode(String),
}

/// Message boundary to the simulation context.
pub trait Transport {
    /// Post one command.
    fn post(&mut self, command: &Command) -> Result<(), TransportError>;

    /// Post `probe` by ownership transfer and return what the sender can
    /// still see of it. An empty buffer means transfer is supported.
    fn probe_transfer(&mut self, probe: Vec<u8>) -> Vec<u8>;

    /// Hand a decoded report buffer back for reuse.
    fn recycle(&mut self, buffer: Vec<f32>) -> Result<(), TransportError>;
}

/// Transport that records everything it is given. Used for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<Command>,
    pub recycled: Vec<Vec<f32>>,
    /// Whether probes are consumed (transfer supported) or copied.
    pub transfer: bool,
    /// Makes every post fail with `Disconnected`.
    pub disconnected: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            transfer: true,
            ..Self::default()
        }
    }

    pub fn without_transfer() -> Self {
        Self::default()
    }

    /// Wire names of everything sent so far.
    pub fn names(&self) -> Vec<&'static str> {
        self.sent.iter().map(Command::name).collect()
    }

    pub fn take_sent(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn post(&mut self, command: &Command) -> Result<(), TransportError> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }
        self.sent.push(command.clone());
        Ok(())
    }

    fn probe_transfer(&mut self, probe: Vec<u8>) -> Vec<u8> {
        if self.transfer { Vec::new() } else { probe }
    }

    fn recycle(&mut self, buffer: Vec<f32>) -> Result<(), TransportError> {
        self.recycled.push(buffer);
        Ok(())
    }
}

/// Command encoder bound to a transport, gated by the deferred queue.
#[derive(Debug)]
pub struct CommandChannel<T: Transport> {
    transport: T,
    queue: DeferredQueue<Command>,
    transfer_supported: bool,
    posted: u64,
}

impl<T: Transport> CommandChannel<T> {
    /// Wrap a transport and detect transferable-buffer support once.
    pub fn new(mut transport: T) -> Self {
        let remaining = transport.probe_transfer(vec![0; PROBE_LEN]);
        let transfer_supported = remaining.is_empty();
        tracing::debug!(transfer_supported, "transfer probe complete");
        Self {
            transport,
            queue: DeferredQueue::new(),
            transfer_supported,
            posted: 0,
        }
    }

    /// Send a command, or queue it until the context is ready.
    ///
    /// Returns false when the command was lost: dropped after a failed
    /// start, or rejected by the transport.
    pub fn send(&mut self, command: Command) -> bool {
        match self.queue.submit(command) {
            Submit::Run(command) => self.post(&command),
            Submit::Deferred => {
                tracing::trace!(pending = self.queue.pending_len(), "command deferred");
                true
            }
            Submit::Dropped(command) => {
                tracing::warn!(cmd = command.name(), "simulation failed to start, command dropped");
                false
            }
        }
    }

    /// Send a command immediately, bypassing the readiness gate.
    pub fn send_now(&mut self, command: Command) -> bool {
        self.post(&command)
    }

    /// Mark the context ready and flush queued commands in call order.
    /// Returns how many were flushed.
    pub fn mark_ready(&mut self) -> usize {
        let flushed = self.queue.mark_ready();
        let n = flushed.len();
        for command in &flushed {
            self.post(command);
        }
        if n > 0 {
            tracing::debug!(flushed = n, "deferred commands flushed");
        }
        n
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.queue.fail(reason);
    }

    /// Return a report buffer to the simulation when transfer is supported.
    pub fn recycle(&mut self, buffer: Vec<f32>) {
        if !self.transfer_supported {
            return;
        }
        if let Err(err) = self.transport.recycle(buffer) {
            tracing::warn!(%err, "failed to recycle report buffer");
        }
    }

    pub fn state(&self) -> &ReadyState {
        self.queue.state()
    }

    pub fn is_ready(&self) -> bool {
        self.queue.is_ready()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.pending_len()
    }

    pub fn transfer_supported(&self) -> bool {
        self.transfer_supported
    }

    /// Commands actually handed to the transport.
    pub fn posted(&self) -> u64 {
        self.posted
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn post(&mut self, command: &Command) -> bool {
        match self.transport.post(command) {
            Ok(()) => {
                self.posted += 1;
                tracing::trace!(cmd = command.name(), "posted");
                true
            }
            Err(err) => {
                tracing::warn!(cmd = command.name(), %err, "post failed");
                false
            }
        }
    }
}
