use crate::{
    callout::{Observer, ObserverId},
    exception::FutureError,
    executor::Runnable,
    flags::StateFlags,
    state::{Progress, SharedState, UntypedState},
    watcher::Watch,
};

use std::{fmt, sync::Arc};

/// Read side of an asynchronous computation.
///
/// Futures are cheap to clone and can be sent to any thread. State queries
/// never block; `wait_*` and result accessors block until the requested
/// result is ready or the computation is over, and raise the producer's
/// failure if it reported one.
pub struct Future<T: Send + 'static> {
    state: Arc<SharedState<T>>,
}

impl<T: Send + 'static> Future<T> {
    pub(crate) fn from_state(state: Arc<SharedState<T>>) -> Self {
        state.acquire_typed();
        Self { state }
    }

    pub(crate) fn set_runnable(&self, runnable: &Runnable) {
        self.state.set_runnable(runnable);
    }

    /// Current state flags
    pub fn state(&self) -> StateFlags {
        self.state.flags()
    }

    /// Whether the producer reported the start of the computation
    pub fn is_started(&self) -> bool {
        self.state().contains(StateFlags::STARTED)
    }

    /// Whether the computation is in progress
    pub fn is_running(&self) -> bool {
        self.state().contains(StateFlags::RUNNING)
    }

    /// Whether the computation finished
    pub fn is_finished(&self) -> bool {
        self.state().contains(StateFlags::FINISHED)
    }

    /// Whether the computation was canceled or failed
    pub fn is_canceled(&self) -> bool {
        self.state().contains(StateFlags::CANCELED)
    }

    /// Whether a pause was requested
    pub fn is_paused(&self) -> bool {
        self.state().contains(StateFlags::PAUSED)
    }

    /// Whether throttling is active
    pub fn is_throttled(&self) -> bool {
        self.state().contains(StateFlags::THROTTLED)
    }

    /// Number of results stored so far
    pub fn result_count(&self) -> usize {
        self.state.result_count()
    }

    /// Snapshot of the progress
    pub fn progress(&self) -> Progress {
        self.state.progress()
    }

    /// Current progress value
    pub fn progress_value(&self) -> i64 {
        self.progress().value
    }

    /// Lower bound of the progress range
    pub fn progress_minimum(&self) -> i64 {
        self.progress().minimum
    }

    /// Upper bound of the progress range
    pub fn progress_maximum(&self) -> i64 {
        self.progress().maximum
    }

    /// Description of the current step
    pub fn progress_text(&self) -> Option<String> {
        self.progress().text
    }

    /// Whether the result at `index` is ready
    pub fn is_result_ready_at(&self, index: usize) -> bool {
        self.state.is_result_ready_at(index)
    }

    /// Block until the result at `index` is ready or the computation is over.
    ///
    /// A unit of work that did not start yet runs on the calling thread.
    pub fn wait_for_result(&self, index: usize) -> Result<(), FutureError> {
        self.state.wait_for_result(index)
    }

    /// Block until the computation finished, was canceled or failed
    pub fn wait_for_finished(&self) -> Result<(), FutureError> {
        self.state.wait_for_finished()
    }

    /// Request the cancellation of the computation.
    ///
    /// The producer stops at its own pace, but every later report is discarded.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Request or end a pause
    pub fn set_paused(&self, paused: bool) {
        self.state.set_paused(paused);
    }

    /// Request a pause
    pub fn pause(&self) {
        self.set_paused(true);
    }

    /// End a pause
    pub fn resume(&self) {
        self.set_paused(false);
    }

    /// Pause if running, resume if paused
    pub fn toggle_paused(&self) {
        self.set_paused(!self.is_paused());
    }

    /// Enable or disable throttling of the producer
    pub fn set_throttled(&self, throttled: bool) {
        self.state.set_throttled(throttled);
    }

    /// Register `observer`, replaying the call-outs that already happened
    pub fn register_observer(&self, observer: Arc<dyn Observer>) -> ObserverId {
        self.state.register(observer)
    }

    /// Unregister an observer, which gets notified of it
    pub fn unregister_observer(&self, id: ObserverId) {
        self.state.unregister(id);
    }

    /// Register `observer` for as long as the returned guard lives
    pub fn watch(&self, observer: Arc<dyn Observer>) -> Watch {
        self.to_any().watch(observer)
    }

    /// Untyped handle on the same computation.
    ///
    /// It does not keep the results alive: they are dropped along with the
    /// last promise or typed future.
    pub fn to_any(&self) -> AnyFuture {
        AnyFuture(self.state.clone())
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// The result at `index`, blocking until it is ready
    pub fn result_at(&self, index: usize) -> Result<T, FutureError> {
        self.wait_for_result(index)?;
        self.state
            .lock_results()
            .get(index)
            .cloned()
            .ok_or(FutureError::ResultUnavailable(index))
    }

    /// The first result, blocking until it is ready
    pub fn result(&self) -> Result<T, FutureError> {
        self.result_at(0)
    }

    /// Every result in index order, once the computation is over
    pub fn results(&self) -> Result<Vec<T>, FutureError> {
        self.wait_for_finished()?;
        let store = self.state.lock_results();
        Ok(store
            .ranges()
            .flat_map(|(begin, end)| begin..end)
            .filter_map(|index| store.get(index).cloned())
            .collect())
    }

    /// Blocking cursor over the results in index order
    pub fn iter(&self) -> ResultIter<'_, T> {
        ResultIter {
            future: self,
            index: 0,
            done: false,
        }
    }
}

impl<T: Send + 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self::from_state(self.state.clone())
    }
}

impl<T: Send + 'static> Drop for Future<T> {
    fn drop(&mut self) {
        self.state.release_typed();
    }
}

impl<T: Send + 'static> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("state", &self.state())
            .field("results", &self.result_count())
            .finish()
    }
}

impl<'a, T: Clone + Send + 'static> IntoIterator for &'a Future<T> {
    type Item = Result<T, FutureError>;
    type IntoIter = ResultIter<'a, T>;

    fn into_iter(self) -> ResultIter<'a, T> {
        self.iter()
    }
}

/// Forward cursor over the results of a [`Future`].
///
/// Advancing past the last ready result blocks while the computation runs.
/// The sequence ends once the computation is over and no further result is
/// stored. A failure is yielded once, then the sequence ends.
#[derive(Debug)]
pub struct ResultIter<'a, T: Send + 'static> {
    future: &'a Future<T>,
    index: usize,
    done: bool,
}

impl<T: Clone + Send + 'static> Iterator for ResultIter<'_, T> {
    type Item = Result<T, FutureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.future.result_at(self.index) {
            Ok(value) => {
                self.index += 1;
                Some(Ok(value))
            }
            Err(FutureError::ResultUnavailable(_)) => {
                // The computation is over, skip gaps left by the producer
                match self.future.state.next_stored_index(self.index) {
                    Some(index) => {
                        self.index = index;
                        self.next()
                    }
                    None => {
                        self.done = true;
                        None
                    }
                }
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Handle on a computation that does not know its result type.
///
/// It can poll, wait, cancel and watch, but not read results.
#[derive(Clone)]
pub struct AnyFuture(Arc<dyn UntypedState>);

impl AnyFuture {
    /// Current state flags
    pub fn state(&self) -> StateFlags {
        self.0.flags()
    }

    /// Whether the producer reported the start of the computation
    pub fn is_started(&self) -> bool {
        self.state().contains(StateFlags::STARTED)
    }

    /// Whether the computation is in progress
    pub fn is_running(&self) -> bool {
        self.state().contains(StateFlags::RUNNING)
    }

    /// Whether the computation finished
    pub fn is_finished(&self) -> bool {
        self.state().contains(StateFlags::FINISHED)
    }

    /// Whether the computation was canceled or failed
    pub fn is_canceled(&self) -> bool {
        self.state().contains(StateFlags::CANCELED)
    }

    /// Whether a pause was requested
    pub fn is_paused(&self) -> bool {
        self.state().contains(StateFlags::PAUSED)
    }

    /// Whether throttling is active
    pub fn is_throttled(&self) -> bool {
        self.state().contains(StateFlags::THROTTLED)
    }

    /// Whether a failure is stored and still reachable
    pub fn has_exception(&self) -> bool {
        self.0.has_exception()
    }

    /// Number of results stored so far
    pub fn result_count(&self) -> usize {
        self.0.result_count()
    }

    /// Snapshot of the progress
    pub fn progress(&self) -> Progress {
        self.0.progress()
    }

    /// Whether the result at `index` is ready
    pub fn is_result_ready_at(&self, index: usize) -> bool {
        self.0.is_result_ready_at(index)
    }

    /// See [`Future::wait_for_result`]
    pub fn wait_for_result(&self, index: usize) -> Result<(), FutureError> {
        self.0.wait_for_result(index)
    }

    /// See [`Future::wait_for_finished`]
    pub fn wait_for_finished(&self) -> Result<(), FutureError> {
        self.0.wait_for_finished()
    }

    /// Request the cancellation of the computation
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Request or end a pause
    pub fn set_paused(&self, paused: bool) {
        self.0.set_paused(paused);
    }

    /// Enable or disable throttling of the producer
    pub fn set_throttled(&self, throttled: bool) {
        self.0.set_throttled(throttled);
    }

    /// Register `observer`, replaying the call-outs that already happened
    pub fn register_observer(&self, observer: Arc<dyn Observer>) -> ObserverId {
        self.0.register(observer)
    }

    /// Unregister an observer, which gets notified of it
    pub fn unregister_observer(&self, id: ObserverId) {
        self.0.unregister(id);
    }

    /// Register `observer` for as long as the returned guard lives
    pub fn watch(&self, observer: Arc<dyn Observer>) -> Watch {
        let id = self.register_observer(observer);
        Watch::new(self.clone(), id)
    }
}

impl fmt::Debug for AnyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyFuture")
            .field("state", &self.state())
            .finish()
    }
}
