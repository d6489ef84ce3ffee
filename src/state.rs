use crate::{
    callout::{CallOutEvent, CallOuts, Observer, ObserverId},
    config::FutureConfig,
    exception::{Exception, ExceptionStore, FutureError},
    executor::{Executor, Runnable, WeakRunnable},
    flags::{AtomicFlags, StateFlags},
    result_store::ResultStore,
};

use std::{
    any::Any,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Snapshot of the progress of a computation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    /// Current value, never decreases
    pub value: i64,
    /// Lower bound of the range
    pub minimum: i64,
    /// Upper bound of the range
    pub maximum: i64,
    /// Description of the current step
    pub text: Option<String>,
}

#[derive(Default)]
struct ProgressState {
    current: Progress,
    /* The producer set the range or a value itself */
    manual: bool,
    last_emitted: Option<Instant>,
    /* The current value was withheld by the rate limit */
    withheld: bool,
}

impl ProgressState {
    /* Record `value`, returning whether a call-out may be sent for it */
    fn update(&mut self, value: i64, interval: Option<Duration>) -> bool {
        self.current.value = value;
        if let (Some(interval), Some(last)) = (interval, self.last_emitted) {
            if value != self.current.maximum && last.elapsed() < interval {
                self.withheld = true;
                return false;
            }
        }
        self.last_emitted = Some(Instant::now());
        self.withheld = false;
        true
    }

    fn event(&self) -> CallOutEvent {
        CallOutEvent::Progress {
            value: self.current.value,
            text: self.current.text.clone(),
        }
    }

    fn range_event(&self) -> CallOutEvent {
        CallOutEvent::ProgressRange {
            minimum: self.current.minimum,
            maximum: self.current.maximum,
        }
    }
}

struct Inner<T> {
    results: ResultStore<T>,
    exception: ExceptionStore,
    progress: ProgressState,
    call_outs: CallOuts,
    runnable: WeakRunnable,
    executor: Arc<dyn Executor>,
}

/* State shared by the promise, the futures and the observer registrations
 * of one computation. Every mutation happens with `inner` locked; `flags`
 * may be read without it. */
pub(crate) struct SharedState<T> {
    flags: AtomicFlags,
    inner: Mutex<Inner<T>>,
    /* Signaled on results, finish, cancel and failure */
    wait_condition: Condvar,
    /* Signaled when a pause or throttling ends and on cancel */
    pause_condition: Condvar,
    /* Promise and Future<T> handles; the payload goes away with the last one */
    typed_refs: AtomicUsize,
    progress_interval: Option<Duration>,
}

impl<T: Send + 'static> SharedState<T> {
    pub(crate) fn new(config: &FutureConfig) -> Arc<Self> {
        Arc::new(Self {
            flags: AtomicFlags::default(),
            inner: Mutex::new(Inner {
                results: ResultStore::new(),
                exception: ExceptionStore::default(),
                progress: ProgressState::default(),
                call_outs: CallOuts::default(),
                runnable: WeakRunnable::default(),
                executor: config.executor_or_default(),
            }),
            wait_condition: Condvar::new(),
            pause_condition: Condvar::new(),
            typed_refs: AtomicUsize::new(0),
            progress_interval: config.progress_interval(),
        })
    }

    pub(crate) fn flags(&self) -> StateFlags {
        self.flags.load()
    }

    /* Typed handle accounting */

    pub(crate) fn acquire_typed(&self) {
        self.typed_refs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn release_typed(&self) {
        if self.typed_refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            let mut inner = self.inner.lock();
            inner.results.clear();
            inner.exception.clear();
            tracing::trace!("last typed handle released, payload dropped");
        }
    }

    /* Executor association */

    pub(crate) fn set_runnable(&self, runnable: &Runnable) {
        self.inner.lock().runnable = runnable.downgrade();
    }

    pub(crate) fn set_executor(&self, executor: Arc<dyn Executor>) {
        self.inner.lock().executor = executor;
    }

    pub(crate) fn executor(&self) -> Arc<dyn Executor> {
        self.inner.lock().executor.clone()
    }

    /* Producer side */

    pub(crate) fn report_started(&self) {
        let inner = self.inner.lock();
        if self
            .flags()
            .intersects(StateFlags::STARTED | StateFlags::CANCELED | StateFlags::FINISHED)
        {
            return;
        }
        self.flags.insert(StateFlags::STARTED | StateFlags::RUNNING);
        tracing::trace!("computation started");
        inner.call_outs.send_call_out(CallOutEvent::Started);
    }

    /* Store a batch at `begin`, or after the last stored index if `None`.
     * Returns the index of the first value, `None` if the batch was discarded. */
    pub(crate) fn report_results(&self, begin: Option<usize>, values: Vec<T>) -> Option<usize> {
        let mut inner = self.inner.lock();
        if self.flags().is_terminal() {
            tracing::debug!(count = values.len(), "discarding results reported after a terminal state");
            return None;
        }
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let begin = match begin {
            Some(begin) => {
                inner.results.insert(begin, values);
                begin
            }
            None => inner.results.append(values),
        };
        self.results_ready(&mut inner, begin, begin + count);
        Some(begin)
    }

    fn results_ready(&self, inner: &mut Inner<T>, begin: usize, end: usize) {
        if begin == end {
            return;
        }
        self.wait_condition.notify_all();
        let ready = CallOutEvent::ResultsReady { begin, end };
        if inner.progress.manual {
            inner.call_outs.send_call_out(ready);
            return;
        }
        let value = inner.results.count() as i64;
        if inner.progress.update(value, self.progress_interval) {
            inner.call_outs.send_call_outs(inner.progress.event(), ready);
        } else {
            inner.call_outs.send_call_out(ready);
        }
    }

    pub(crate) fn report_finished(&self) {
        let inner = self.inner.lock();
        if self.flags().is_terminal() {
            return;
        }
        if inner.progress.withheld {
            inner.call_outs.send_call_out(inner.progress.event());
        }
        self.flags.switch(StateFlags::RUNNING, StateFlags::FINISHED);
        self.wait_condition.notify_all();
        tracing::trace!(results = inner.results.count(), "computation finished");
        inner.call_outs.send_call_out(CallOutEvent::Finished);
    }

    pub(crate) fn cancel(&self) {
        let inner = self.inner.lock();
        if self.flags().is_terminal() {
            return;
        }
        self.cancel_locked(&inner);
    }

    fn cancel_locked(&self, inner: &Inner<T>) {
        self.flags.switch(
            StateFlags::RUNNING | StateFlags::PAUSED,
            StateFlags::CANCELED,
        );
        self.wait_condition.notify_all();
        self.pause_condition.notify_all();
        tracing::trace!(failed = inner.exception.has_exception(), "computation canceled");
        inner.call_outs.send_call_out(CallOutEvent::Canceled);
    }

    /* Store a failure through `store` then cancel */
    fn fail(&self, store: impl FnOnce(&mut ExceptionStore) -> bool) {
        let mut inner = self.inner.lock();
        if self.flags().is_terminal() {
            return;
        }
        store(&mut inner.exception);
        self.cancel_locked(&inner);
    }

    pub(crate) fn report_exception(&self, e: &dyn Exception) {
        self.fail(|store| store.set_exception(e));
    }

    pub(crate) fn report_unhandled(&self, message: String) {
        self.fail(|store| store.set_unhandled(message));
    }

    pub(crate) fn report_panic(&self, payload: &(dyn Any + Send)) {
        self.fail(|store| store.set_panic(payload));
    }

    pub(crate) fn set_progress_range(&self, minimum: i64, maximum: i64) {
        let mut inner = self.inner.lock();
        if self.flags().is_terminal() {
            return;
        }
        let (minimum, maximum) = (minimum.min(maximum), minimum.max(maximum));
        let progress = &mut inner.progress;
        progress.manual = true;
        progress.current.minimum = minimum;
        progress.current.maximum = maximum;
        progress.current.value = progress.current.value.max(minimum);
        let event = progress.range_event();
        inner.call_outs.send_call_out(event);
    }

    pub(crate) fn set_progress_value_and_text(&self, value: i64, text: Option<String>) {
        let mut inner = self.inner.lock();
        if self.flags().is_terminal() {
            return;
        }
        let progress = &mut inner.progress;
        progress.manual = true;
        if value <= progress.current.value {
            return;
        }
        let Progress {
            minimum, maximum, ..
        } = progress.current;
        if minimum != maximum && (value < minimum || value > maximum) {
            return;
        }
        if text.is_some() {
            progress.current.text = text;
        }
        if progress.update(value, self.progress_interval) {
            let event = progress.event();
            inner.call_outs.send_call_out(event);
        }
    }

    pub(crate) fn set_expected_result_count(&self, count: usize) {
        let mut inner = self.inner.lock();
        if inner.progress.manual || self.flags().is_terminal() {
            return;
        }
        inner.progress.current.minimum = 0;
        inner.progress.current.maximum = count as i64;
        let event = inner.progress.range_event();
        inner.call_outs.send_call_out(event);
    }

    /* Pause and throttling */

    pub(crate) fn set_paused(&self, paused: bool) {
        let inner = self.inner.lock();
        let flags = self.flags();
        if paused {
            if !flags.contains(StateFlags::RUNNING) || flags.contains(StateFlags::PAUSED) {
                return;
            }
            self.flags.insert(StateFlags::PAUSED);
            inner.call_outs.send_call_out(CallOutEvent::Paused);
        } else {
            if !flags.contains(StateFlags::PAUSED) {
                return;
            }
            self.flags.remove(StateFlags::PAUSED);
            self.pause_condition.notify_all();
            inner.call_outs.send_call_out(CallOutEvent::Resumed);
        }
    }

    pub(crate) fn set_throttled(&self, throttled: bool) {
        let _inner = self.inner.lock();
        if throttled {
            self.flags.insert(StateFlags::THROTTLED);
        } else {
            self.flags.remove(StateFlags::THROTTLED);
            self.pause_condition.notify_all();
        }
    }

    /* Block the producer while paused or throttled */
    pub(crate) fn wait_for_resume(&self) {
        let mut inner = self.inner.lock();
        loop {
            let flags = self.flags();
            if flags.is_terminal() || !flags.intersects(StateFlags::PAUSED | StateFlags::THROTTLED) {
                return;
            }
            self.pause_condition.wait(&mut inner);
        }
    }

    /* Consumer side */

    pub(crate) fn result_count(&self) -> usize {
        self.inner.lock().results.count()
    }

    pub(crate) fn is_result_ready_at(&self, index: usize) -> bool {
        self.inner.lock().results.contains(index)
    }

    pub(crate) fn next_stored_index(&self, from: usize) -> Option<usize> {
        self.inner.lock().results.next_stored(from)
    }

    pub(crate) fn progress(&self) -> Progress {
        self.inner.lock().progress.current.clone()
    }

    pub(crate) fn has_exception(&self) -> bool {
        self.inner.lock().exception.has_exception()
    }

    pub(crate) fn wait_for_result(&self, index: usize) -> Result<(), FutureError> {
        self.wait_until(|inner| inner.results.contains(index))
    }

    pub(crate) fn wait_for_finished(&self) -> Result<(), FutureError> {
        self.wait_until(|_| false)
    }

    /* Block until `ready` holds or the computation is over, then raise any
     * stored failure */
    fn wait_until(&self, ready: impl Fn(&Inner<T>) -> bool) -> Result<(), FutureError> {
        let (runnable, executor) = {
            let inner = self.inner.lock();
            if self.flags().is_terminal() || ready(&*inner) {
                return inner.exception.throw_if_present();
            }
            (inner.runnable.upgrade(), inner.executor.clone())
        };

        if let Some(runnable) = runnable {
            if executor.steal(&runnable) {
                tracing::trace!(task = runnable.id(), "ran pending task on the waiting thread");
            }
        }

        let released = executor.is_worker_thread();
        if released {
            executor.release_thread();
        }
        let res = {
            let mut inner = self.inner.lock();
            while !self.flags().is_terminal() && !ready(&*inner) {
                self.wait_condition.wait(&mut inner);
            }
            inner.exception.throw_if_present()
        };
        if released {
            executor.reserve_thread();
        }
        res
    }

    /* Observers */

    pub(crate) fn register(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let mut inner = self.inner.lock();
        Self::replay(&inner, self.flags(), &*observer);
        let id = inner.call_outs.add(observer);
        tracing::debug!(observers = inner.call_outs.len(), "observer registered");
        id
    }

    fn replay(inner: &Inner<T>, flags: StateFlags, observer: &dyn Observer) {
        if flags.contains(StateFlags::STARTED) {
            observer.deliver(CallOutEvent::Started);
            observer.deliver(inner.progress.range_event());
            observer.deliver(inner.progress.event());
        }
        for (begin, end) in inner.results.ranges() {
            observer.deliver(CallOutEvent::ResultsReady { begin, end });
        }
        if flags.contains(StateFlags::PAUSED) {
            observer.deliver(CallOutEvent::Paused);
        }
        if flags.contains(StateFlags::CANCELED) {
            observer.deliver(CallOutEvent::Canceled);
        }
        if flags.contains(StateFlags::FINISHED) {
            observer.deliver(CallOutEvent::Finished);
        }
    }

    pub(crate) fn unregister(&self, id: ObserverId) {
        let removed = self.inner.lock().call_outs.remove(id);
        if let Some(observer) = removed {
            tracing::debug!("observer unregistered");
            observer.disconnected();
        }
    }

    pub(crate) fn lock_results(&self) -> ResultsGuard<'_, T> {
        ResultsGuard(self.inner.lock())
    }
}

impl<T> Drop for SharedState<T> {
    fn drop(&mut self) {
        for observer in self.inner.get_mut().call_outs.take_all() {
            observer.disconnected();
        }
    }
}

/* Read access to the stored results */
pub(crate) struct ResultsGuard<'a, T>(MutexGuard<'a, Inner<T>>);

impl<T> std::ops::Deref for ResultsGuard<'_, T> {
    type Target = ResultStore<T>;

    fn deref(&self) -> &ResultStore<T> {
        &self.0.results
    }
}

/* Object-safe view of a state, independent of the result type */
pub(crate) trait UntypedState: Send + Sync {
    fn flags(&self) -> StateFlags;
    fn cancel(&self);
    fn set_paused(&self, paused: bool);
    fn set_throttled(&self, throttled: bool);
    fn result_count(&self) -> usize;
    fn is_result_ready_at(&self, index: usize) -> bool;
    fn progress(&self) -> Progress;
    fn has_exception(&self) -> bool;
    fn wait_for_result(&self, index: usize) -> Result<(), FutureError>;
    fn wait_for_finished(&self) -> Result<(), FutureError>;
    fn register(&self, observer: Arc<dyn Observer>) -> ObserverId;
    fn unregister(&self, id: ObserverId);
}

impl<T: Send + 'static> UntypedState for SharedState<T> {
    fn flags(&self) -> StateFlags {
        SharedState::flags(self)
    }

    fn cancel(&self) {
        SharedState::cancel(self)
    }

    fn set_paused(&self, paused: bool) {
        SharedState::set_paused(self, paused)
    }

    fn set_throttled(&self, throttled: bool) {
        SharedState::set_throttled(self, throttled)
    }

    fn result_count(&self) -> usize {
        SharedState::result_count(self)
    }

    fn is_result_ready_at(&self, index: usize) -> bool {
        SharedState::is_result_ready_at(self, index)
    }

    fn progress(&self) -> Progress {
        SharedState::progress(self)
    }

    fn has_exception(&self) -> bool {
        SharedState::has_exception(self)
    }

    fn wait_for_result(&self, index: usize) -> Result<(), FutureError> {
        SharedState::wait_for_result(self, index)
    }

    fn wait_for_finished(&self) -> Result<(), FutureError> {
        SharedState::wait_for_finished(self)
    }

    fn register(&self, observer: Arc<dyn Observer>) -> ObserverId {
        SharedState::register(self, observer)
    }

    fn unregister(&self, id: ObserverId) {
        SharedState::unregister(self, id)
    }
}
