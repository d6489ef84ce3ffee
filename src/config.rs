use crate::executor::Executor;

use std::{fmt, sync::Arc, time::Duration};

/// Default budget of progress call-outs per second
pub const DEFAULT_PROGRESS_CALLOUTS_PER_SECOND: u32 = 25;

/// Settings of one computation, handed to [`Promise::with_config`](crate::Promise::with_config)
#[derive(Clone)]
pub struct FutureConfig {
    /// Executor running the computation, the process-wide default one if unset
    pub executor: Option<Arc<dyn Executor>>,
    /// Maximum number of progress call-outs per second, 0 for no limit
    pub progress_callouts_per_second: u32,
}

impl Default for FutureConfig {
    fn default() -> Self {
        Self {
            executor: None,
            progress_callouts_per_second: DEFAULT_PROGRESS_CALLOUTS_PER_SECOND,
        }
    }
}

impl FutureConfig {
    /// Run on `executor` instead of the default one
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Change the progress call-out budget
    pub fn progress_callouts_per_second(mut self, budget: u32) -> Self {
        self.progress_callouts_per_second = budget;
        self
    }

    pub(crate) fn progress_interval(&self) -> Option<Duration> {
        match self.progress_callouts_per_second {
            0 => None,
            n => Some(Duration::from_secs(1) / n),
        }
    }

    pub(crate) fn executor_or_default(&self) -> Arc<dyn Executor> {
        match &self.executor {
            Some(executor) => executor.clone(),
            None => crate::default_executor(),
        }
    }
}

impl fmt::Debug for FutureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureConfig")
            .field("executor", &self.executor.as_ref().map(|_| "<custom>"))
            .field(
                "progress_callouts_per_second",
                &self.progress_callouts_per_second,
            )
            .finish()
    }
}

/// Settings of a [`ThreadPool`](crate::ThreadPool)
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum number of threads running tasks at once
    pub max_threads: usize,
    /// How long an idle worker waits for work before exiting
    pub expiry_timeout: Duration,
    /// Name given to worker threads
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get().max(1),
            expiry_timeout: Duration::from_secs(30),
            thread_name: "ufuture-worker".to_owned(),
        }
    }
}

impl PoolConfig {
    /// Allow at most `max_threads` concurrent tasks
    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Let idle workers exit after `timeout`
    pub fn expiry_timeout(mut self, timeout: Duration) -> Self {
        self.expiry_timeout = timeout;
        self
    }

    /// Name worker threads `name`
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_interval_from_budget() {
        let config = FutureConfig::default();
        assert_eq!(config.progress_interval(), Some(Duration::from_millis(40)));
        assert_eq!(
            config.progress_callouts_per_second(0).progress_interval(),
            None
        );
    }

    #[test]
    fn pool_never_has_zero_threads() {
        assert_eq!(PoolConfig::default().max_threads(0).max_threads, 1);
        assert!(PoolConfig::default().max_threads >= 1);
    }
}
