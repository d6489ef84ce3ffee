use crate::{
    config::FutureConfig,
    exception::Exception,
    executor::{Executor, Runnable},
    flags::StateFlags,
    future::Future,
    state::SharedState,
};

use std::{any::Any, fmt, sync::Arc};

/// Write side of an asynchronous computation.
///
/// The code computing the value reports its progress, results and outcome
/// through the promise; every [`Future`] obtained from it observes them.
/// Reports made after the computation was canceled, failed or finished are
/// discarded.
///
/// Dropping a promise that did not finish cancels the computation, so that
/// no consumer waits forever.
pub struct Promise<T: Send + 'static> {
    state: Arc<SharedState<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Create a promise running on the default executor
    pub fn new() -> Self {
        Self::with_config(FutureConfig::default())
    }

    /// Create a promise with custom settings
    pub fn with_config(config: FutureConfig) -> Self {
        let state = SharedState::new(&config);
        state.acquire_typed();
        Self { state }
    }

    /// A consumer handle on this computation
    pub fn future(&self) -> Future<T> {
        Future::from_state(self.state.clone())
    }

    /// Current state flags
    pub fn state(&self) -> StateFlags {
        self.state.flags()
    }

    /// Report the start of the computation
    pub fn report_started(&self) {
        self.state.report_started();
    }

    /// Store `value` after the last stored index, returning its index
    pub fn report_result(&self, value: T) -> Option<usize> {
        self.state.report_results(None, vec![value])
    }

    /// Store `value` at `index`, returning whether it was accepted.
    ///
    /// # Panics
    ///
    /// Panics if a result is already stored at `index`.
    pub fn report_result_at(&self, index: usize, value: T) -> bool {
        self.state.report_results(Some(index), vec![value]).is_some()
    }

    /// Store a batch of results starting at `begin`, returning whether it was accepted.
    ///
    /// # Panics
    ///
    /// Panics if the batch overlaps results already stored.
    pub fn report_results(&self, begin: usize, values: Vec<T>) -> bool {
        self.state.report_results(Some(begin), values).is_some()
    }

    /// Store a batch after the last stored index, returning the index of its first value
    pub fn report_batch(&self, values: Vec<T>) -> Option<usize> {
        self.state.report_results(None, values)
    }

    /// Report the successful end of the computation
    pub fn report_finished(&self) {
        self.state.report_finished();
    }

    /// Report a failure, canceling the computation.
    ///
    /// Consumers asking for results or waiting for completion get a clone of `e`.
    pub fn report_exception<E: Exception>(&self, e: E) {
        tracing::debug!(error = %e, "computation failed");
        self.state.report_exception(&e);
    }

    /// Report a failure that is not an [`Exception`]
    pub fn report_unhandled(&self, message: impl Into<String>) {
        self.state.report_unhandled(message.into());
    }

    /// Report a panic of the computation as an unhandled failure
    pub fn report_panic(&self, payload: &(dyn Any + Send)) {
        self.state.report_panic(payload);
    }

    /// Cancel the computation from the producer side
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Set the progress range, switching to manual progress reporting
    pub fn set_progress_range(&self, minimum: i64, maximum: i64) {
        self.state.set_progress_range(minimum, maximum);
    }

    /// Set the progress value, switching to manual progress reporting
    pub fn set_progress_value(&self, value: i64) {
        self.state.set_progress_value_and_text(value, None);
    }

    /// Set the progress value and describe the current step
    pub fn set_progress_value_and_text(&self, value: i64, text: impl Into<String>) {
        self.state
            .set_progress_value_and_text(value, Some(text.into()));
    }

    /// Size the progress range from the number of results to expect.
    ///
    /// Ignored once the progress is reported manually.
    pub fn set_expected_result_count(&self, count: usize) {
        self.state.set_expected_result_count(count);
    }

    /// Whether a consumer canceled the computation
    pub fn is_canceled(&self) -> bool {
        self.state.flags().contains(StateFlags::CANCELED)
    }

    /// Whether a consumer asked for a pause
    pub fn is_paused(&self) -> bool {
        self.state.flags().contains(StateFlags::PAUSED)
    }

    /// Whether a consumer asked to slow down
    pub fn is_throttled(&self) -> bool {
        self.state.flags().contains(StateFlags::THROTTLED)
    }

    /// Whether the producer should stop at its next safe point
    pub fn should_throttle(&self) -> bool {
        self.state
            .flags()
            .intersects(StateFlags::PAUSED | StateFlags::THROTTLED)
    }

    /// Enable or disable throttling
    pub fn set_throttled(&self, throttled: bool) {
        self.state.set_throttled(throttled);
    }

    /// Block while the computation is paused or throttled.
    ///
    /// Returns right away once it is canceled.
    pub fn wait_for_resume(&self) {
        self.state.wait_for_resume();
    }

    /// Associate the unit of work computing the value, so that a consumer
    /// about to block can run it itself if it has not started yet
    pub fn set_runnable(&self, runnable: &Runnable) {
        self.state.set_runnable(runnable);
    }

    /// Run on `executor` instead of the configured one
    pub fn set_executor(&self, executor: Arc<dyn Executor>) {
        self.state.set_executor(executor);
    }

    /// Executor associated with the computation
    pub fn executor(&self) -> Arc<dyn Executor> {
        self.state.executor()
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.state.flags().is_terminal() {
            tracing::warn!("promise dropped before the computation finished");
            self.state.cancel();
        }
        self.state.release_typed();
    }
}

impl<T: Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InlineExecutor;

    fn promise() -> Promise<&'static str> {
        Promise::with_config(FutureConfig::default().executor(InlineExecutor::new()))
    }

    #[test]
    fn report_result_appends() {
        let promise = promise();
        promise.report_started();
        assert_eq!(promise.report_result("a"), Some(0));
        assert!(promise.report_result_at(3, "d"));
        assert_eq!(promise.report_result("e"), Some(4));
        assert_eq!(promise.report_batch(vec!["f", "g"]), Some(5));
        assert_eq!(promise.future().result_count(), 5);
    }

    #[test]
    fn reports_after_cancel_are_discarded() {
        let promise = promise();
        let future = promise.future();
        promise.report_started();
        future.cancel();
        assert!(promise.is_canceled());
        assert_eq!(promise.report_result("late"), None);
        promise.set_progress_value(5);
        promise.report_finished();
        assert_eq!(future.result_count(), 0);
        assert_eq!(future.progress_value(), 0);
        assert!(!future.is_finished());
    }

    #[test]
    #[should_panic(expected = "overlaps")]
    fn reusing_an_index_is_fatal() {
        let promise = promise();
        promise.report_started();
        promise.report_result_at(1, "a");
        promise.report_results(0, vec!["b", "c"]);
    }

    #[test]
    fn dropping_unfinished_promise_cancels() {
        let promise = promise();
        let future = promise.future();
        promise.report_started();
        drop(promise);
        assert!(future.is_canceled());
        assert!(future.wait_for_finished().is_ok());
    }

    #[test]
    fn throttling_is_advisory() {
        let promise = promise();
        let future = promise.future();
        assert!(!promise.should_throttle());
        future.set_throttled(true);
        assert!(promise.is_throttled());
        assert!(promise.should_throttle());
        future.set_throttled(false);
        promise.wait_for_resume();
        assert!(!promise.should_throttle());
    }
}
