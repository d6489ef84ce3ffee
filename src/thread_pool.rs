use crate::{
    config::PoolConfig,
    executor::{Executor, Runnable},
    exception::panic_message,
    threads::Threads,
};

use std::{
    collections::{HashMap, VecDeque},
    fmt, mem,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use crossbeam_utils::sync::Parker;
use parking_lot::{Condvar, Mutex, MutexGuard};

/// Pool of worker threads spawned on demand.
///
/// At most `max_threads` units run at once. A worker that blocks on a future
/// gives its slot back through [`Executor::release_thread`], letting another
/// worker pick up queued work meanwhile. Idle workers exit after the
/// configured expiry timeout.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /* Signaled when the pool runs out of work */
    done: Condvar,
    threads: Threads,
    /* Live workers; an expiring worker removes its own entry */
    handles: Mutex<HashMap<ThreadId, JoinHandle<()>>>,
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Runnable>,
    /* Parked workers, most recently parked last */
    idle: Vec<ThreadId>,
    /* Workers inside a unit of work */
    busy: usize,
    /* Live workers */
    alive: usize,
    /* Slots given back by blocked workers */
    released: usize,
    terminated: bool,
}

impl PoolState {
    fn has_capacity(&self, max_threads: usize) -> bool {
        self.busy < max_threads + self.released
    }

    fn is_done(&self) -> bool {
        self.busy == 0 && self.queue.is_empty()
    }
}

impl ThreadPool {
    /// Create a pool, no thread is spawned until work arrives
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState::default()),
                done: Condvar::new(),
                threads: Threads::default(),
                handles: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Maximum number of units running at once
    pub fn max_thread_count(&self) -> usize {
        self.inner.config.max_threads
    }

    /// Number of workers currently running a unit
    pub fn active_thread_count(&self) -> usize {
        self.inner.state.lock().busy
    }

    /// Number of units waiting for a worker
    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Block until no unit is queued or running, or until `timeout` elapses.
    ///
    /// Returns whether the pool ran out of work. Calling this from one of the
    /// pool's own workers never returns `true`.
    pub fn wait_for_done(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.inner.state.lock();
        while !state.is_done() {
            match deadline {
                Some(deadline) => {
                    if self.inner.done.wait_until(&mut state, deadline).timed_out() {
                        return state.is_done();
                    }
                }
                None => self.inner.done.wait(&mut state),
            }
        }
        true
    }

    /// Stop every worker, dropping the units still queued.
    ///
    /// Units already running are waited for.
    pub fn terminate(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            state.terminated = true;
            mem::take(&mut state.queue)
        };
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "dropping queued tasks");
        }
        drop(dropped);
        self.inner.threads.unpark_all();
        self.inner.done.notify_all();

        let handles = mem::take(&mut *self.inner.handles.lock());
        let current = thread::current().id();
        for (_, handle) in handles {
            if handle.thread().id() == current {
                continue;
            }
            if let Err(err) = handle.join() {
                panic::resume_unwind(err);
            }
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if !self.inner.threads.contains_current() {
            self.wait_for_done(None);
        }
        self.terminate();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ThreadPool")
            .field("max_threads", &self.inner.config.max_threads)
            .field("alive", &state.alive)
            .field("registered", &self.inner.threads.len())
            .field("busy", &state.busy)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl Executor for ThreadPool {
    fn execute(&self, runnable: Runnable) {
        let mut state = self.inner.state.lock();
        if state.terminated {
            tracing::warn!(task = runnable.id(), "thread pool terminated, dropping task");
            drop(state);
            return;
        }
        state.queue.push_back(runnable);
        self.inner.start_work(&mut state);
    }

    fn is_worker_thread(&self) -> bool {
        self.inner.threads.contains_current()
    }

    fn release_thread(&self) {
        let mut state = self.inner.state.lock();
        state.released += 1;
        self.inner.start_work(&mut state);
    }

    fn reserve_thread(&self) {
        let mut state = self.inner.state.lock();
        state.released = state.released.saturating_sub(1);
    }
}

impl PoolInner {
    /* Wake or spawn a worker if queued work may run now */
    fn start_work(self: &Arc<Self>, state: &mut MutexGuard<'_, PoolState>) {
        if state.queue.is_empty() || !state.has_capacity(self.config.max_threads) {
            return;
        }
        if let Some(thread) = state.idle.pop() {
            self.threads.unpark(thread);
            return;
        }
        // Workers that are neither idle nor busy will look at the queue anyway
        if state.alive > state.busy {
            return;
        }
        let inner = self.clone();
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || inner.work());
        match spawned {
            Ok(handle) => {
                state.alive += 1;
                tracing::debug!(alive = state.alive, "spawned worker");
                self.handles.lock().insert(handle.thread().id(), handle);
            }
            Err(err) => tracing::warn!(error = %err, "failed to spawn worker"),
        }
    }

    fn work(self: Arc<Self>) {
        let parker = Parker::new();
        let me = thread::current().id();
        self.threads.register_current(parker.unparker().clone());

        let mut state = self.state.lock();
        loop {
            if state.terminated {
                break;
            }
            if state.has_capacity(self.config.max_threads) {
                if let Some(runnable) = state.queue.pop_front() {
                    state.busy += 1;
                    MutexGuard::unlocked(&mut state, || {
                        let id = runnable.id();
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| runnable.run())) {
                            tracing::warn!(task = id, panic = %panic_message(&*payload), "task panicked");
                        }
                    });
                    state.busy -= 1;
                    if state.is_done() {
                        self.done.notify_all();
                    }
                    continue;
                }
            }

            state.idle.push(me);
            let parked_at = Instant::now();
            MutexGuard::unlocked(&mut state, || parker.park_timeout(self.config.expiry_timeout));
            if let Some(pos) = state.idle.iter().position(|id| *id == me) {
                state.idle.remove(pos);
                if parked_at.elapsed() >= self.config.expiry_timeout && state.queue.is_empty() {
                    tracing::debug!("worker expired");
                    self.handles.lock().remove(&me);
                    break;
                }
            }
        }
        state.alive -= 1;
        drop(state);
        self.threads.deregister_current();
    }
}
