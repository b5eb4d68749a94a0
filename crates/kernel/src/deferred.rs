use std::collections::VecDeque;

/// Readiness of the simulation context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadyState {
    #[default]
    Initializing,
    Ready,
    /// Initialization failed. Terminal: there is no retry.
    Failed(String),
}

/// What [`DeferredQueue::submit`] decided to do with an operation.
#[derive(Debug, PartialEq, Eq)]
pub enum Submit<T> {
    /// The context is ready: run the operation now.
    Run(T),
    /// Queued until the context becomes ready.
    Deferred,
    /// Initialization failed; the operation will never run.
    Dropped(T),
}

/// Buffers operations issued while the simulation context is initializing
/// and releases them, in call order, on the `Initializing → Ready` transition.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    state: ReadyState,
    pending: VecDeque<T>,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self {
            state: ReadyState::Initializing,
            pending: VecDeque::new(),
        }
    }
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ReadyState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ReadyState::Ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn submit(&mut self, op: T) -> Submit<T> {
        match self.state {
            ReadyState::Ready => Submit::Run(op),
            ReadyState::Initializing => {
                self.pending.push_back(op);
                Submit::Deferred
            }
            ReadyState::Failed(_) => Submit::Dropped(op),
        }
    }

    /// Transition to `Ready` and hand back everything queued, oldest first.
    ///
    /// Only the first transition out of `Initializing` releases operations;
    /// a failed queue stays failed.
    pub fn mark_ready(&mut self) -> Vec<T> {
        match self.state {
            ReadyState::Initializing => {
                self.state = ReadyState::Ready;
                self.pending.drain(..).collect()
            }
            ReadyState::Ready | ReadyState::Failed(_) => Vec::new(),
        }
    }

    /// Transition to `Failed`. Queued operations are retained but never released.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state == ReadyState::Initializing {
            self.state = ReadyState::Failed(reason.into());
        }
    }
}
