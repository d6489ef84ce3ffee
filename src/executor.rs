use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;

/// Something that runs units of deferred work.
///
/// Beyond accepting work, an executor lets a thread that is about to block
/// steal a unit that did not start yet, and lets its own workers give their
/// slot back for the duration of a blocking wait.
pub trait Executor: Send + Sync {
    /// Accept a unit of work
    fn execute(&self, runnable: Runnable);

    /// Run `runnable` on the calling thread if it has not started yet.
    ///
    /// Returns whether it ran here.
    fn steal(&self, runnable: &Runnable) -> bool {
        runnable.run()
    }

    /// Whether the calling thread is one of this executor's workers
    fn is_worker_thread(&self) -> bool {
        false
    }

    /// Give the calling worker's slot back while it blocks
    fn release_thread(&self) {}

    /// Take back a slot given with [`Executor::release_thread`]
    fn reserve_thread(&self) {}
}

type Job = Box<dyn FnOnce() + Send>;

struct RunnableInner {
    /* Generated for each unit, for logging */
    id: u64,
    /* Taken by whichever thread runs it first */
    job: Mutex<Option<Job>>,
}

/// A unit of deferred work that runs at most once.
///
/// Clones share the same job: the first [`Runnable::run`] executes it and the
/// others return `false`.
#[derive(Clone)]
pub struct Runnable(Arc<RunnableInner>);

impl Runnable {
    /// Wrap `job` into a runnable
    pub fn new<F: FnOnce() + Send + 'static>(job: F) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(Arc::new(RunnableInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            job: Mutex::new(Some(Box::new(job))),
        }))
    }

    /// Identifier of the unit
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Run the job unless it already started somewhere, returning whether it ran
    pub fn run(&self) -> bool {
        let job = self.0.job.lock().take();
        match job {
            Some(job) => {
                tracing::trace!(task = self.0.id, "running task");
                job();
                true
            }
            None => false,
        }
    }

    /// Whether the job was already taken by some thread
    pub fn is_taken(&self) -> bool {
        self.0.job.lock().is_none()
    }

    pub(crate) fn downgrade(&self) -> WeakRunnable {
        WeakRunnable(Arc::downgrade(&self.0))
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable")
            .field("id", &self.0.id)
            .field("taken", &self.is_taken())
            .finish()
    }
}

/* Non-owning reference kept by the shared state, so that a queued job
 * holding a promise doesn't keep its own state alive */
#[derive(Clone, Default)]
pub(crate) struct WeakRunnable(Weak<RunnableInner>);

impl WeakRunnable {
    pub(crate) fn upgrade(&self) -> Option<Runnable> {
        self.0.upgrade().map(Runnable)
    }
}

/// Executor running every unit synchronously inside [`Executor::execute`]
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl InlineExecutor {
    /// Create a new inline executor
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Executor for InlineExecutor {
    fn execute(&self, runnable: Runnable) {
        runnable.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_only_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c_counter = counter.clone();
        let runnable = Runnable::new(move || {
            c_counter.fetch_add(1, Ordering::SeqCst);
        });
        let copy = runnable.clone();
        assert!(!runnable.is_taken());
        assert!(copy.run());
        assert!(!runnable.run());
        assert!(runnable.is_taken());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weak_reference_does_not_keep_job_alive() {
        let runnable = Runnable::new(|| {});
        let weak = runnable.downgrade();
        assert_eq!(weak.upgrade().map(|r| r.id()), Some(runnable.id()));
        drop(runnable);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn inline_executor_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c_counter = counter.clone();
        InlineExecutor::new().execute(Runnable::new(move || {
            c_counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
