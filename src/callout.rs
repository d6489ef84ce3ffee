use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Push notification describing a state change of a computation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutEvent {
    /// The computation started
    Started,
    /// The computation finished
    Finished,
    /// The computation was canceled, possibly because it failed
    Canceled,
    /// A pause was requested
    Paused,
    /// A pause ended
    Resumed,
    /// The progress range changed
    ProgressRange {
        /// Lower bound
        minimum: i64,
        /// Upper bound
        maximum: i64,
    },
    /// The progress value changed
    Progress {
        /// Current value
        value: i64,
        /// Optional description of the current step
        text: Option<String>,
    },
    /// Results became ready at indices `[begin, end)`.
    ///
    /// Values are read through the future, not carried by the event.
    ResultsReady {
        /// First ready index
        begin: usize,
        /// One past the last ready index
        end: usize,
    },
}

/// Endpoint receiving the call-outs of a computation.
///
/// `deliver` runs on the producer's thread while the state's lock is held, so
/// it must not call back into the future it watches. Endpoints needing that
/// should queue the event instead, as [`ChannelObserver`] does.
pub trait Observer: Send + Sync {
    /// Handle one call-out
    fn deliver(&self, event: CallOutEvent);

    /// The endpoint was unregistered and won't receive further call-outs
    fn disconnected(&self) {}
}

/// Identifier of an observer registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/* Live observers of one computation, guarded by the state's lock */
#[derive(Default)]
pub(crate) struct CallOuts {
    endpoints: Vec<(ObserverId, Arc<dyn Observer>)>,
}

impl CallOuts {
    pub(crate) fn add(&mut self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId::next();
        self.endpoints.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> Option<Arc<dyn Observer>> {
        let pos = self.endpoints.iter().position(|(oid, _)| *oid == id)?;
        Some(self.endpoints.remove(pos).1)
    }

    pub(crate) fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub(crate) fn send_call_out(&self, event: CallOutEvent) {
        for (_, observer) in &self.endpoints {
            observer.deliver(event.clone());
        }
    }

    /* Both events reach each endpoint back to back */
    pub(crate) fn send_call_outs(&self, first: CallOutEvent, second: CallOutEvent) {
        for (_, observer) in &self.endpoints {
            observer.deliver(first.clone());
            observer.deliver(second.clone());
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<Arc<dyn Observer>> {
        self.endpoints.drain(..).map(|(_, observer)| observer).collect()
    }
}

/// Observer queueing call-outs into a channel for deferred handling.
///
/// The receiving side can be drained from any thread, typically the one that
/// owns the future, and may call back into the future freely.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: flume::Sender<CallOutEvent>,
}

/// Receiving side of a [`ChannelObserver`].
///
/// The channel disconnects once the observer is unregistered and dropped.
pub type CallOutReceiver = flume::Receiver<CallOutEvent>;

impl ChannelObserver {
    /// Create an observer and the receiver its call-outs are queued into
    pub fn new() -> (Arc<Self>, CallOutReceiver) {
        let (sender, receiver) = flume::unbounded();
        (Arc::new(Self { sender }), receiver)
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, event: CallOutEvent) {
        // A dropped receiver just means nobody listens anymore
        let _ = self.sender.send(event);
    }
}

/// Observer running a closure synchronously for every call-out
pub struct FnObserver<F>(F);

impl<F: Fn(CallOutEvent) + Send + Sync> FnObserver<F> {
    /// Wrap `f` as an observer
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self(f))
    }
}

impl<F: Fn(CallOutEvent) + Send + Sync> Observer for FnObserver<F> {
    fn deliver(&self, event: CallOutEvent) {
        (self.0)(event)
    }
}

impl<F> fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").finish()
    }
}
