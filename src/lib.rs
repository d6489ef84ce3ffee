//! ufuture - thread-safe futures and promises
//!
//! A [`Promise`] is the write side of an asynchronous computation: the code
//! computing the value reports results (possibly many, possibly out of order),
//! progress, and completion, cancellation or failure through it. Any number
//! of [`Future`]s read the same computation from other threads: they poll its
//! state, block until a given result is ready, or iterate over results as
//! they arrive. [`Observer`]s get pushed call-outs, including a replay of
//! what happened before they registered.
//!
//! Computations run on an [`Executor`]. The default one is a lazily
//! spawned [`ThreadPool`]; a thread that blocks on a future whose work was
//! queued but not started yet runs that work itself.
//!
//! # Examples
//!
//! ```
//! let future = ufuture::run_with_promise(|promise| {
//!     promise.set_expected_result_count(3);
//!     for i in 0..3 {
//!         promise.report_result(i * 2);
//!     }
//! });
//! assert_eq!(future.results().unwrap(), vec![0, 2, 4]);
//! assert!(future.is_finished());
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

mod callout;
mod config;
mod exception;
mod executor;
mod flags;
mod future;
mod promise;
mod result_store;
mod state;
mod thread_pool;
mod threads;
mod watcher;

pub use callout::{CallOutEvent, CallOutReceiver, ChannelObserver, FnObserver, Observer, ObserverId};
pub use config::{FutureConfig, PoolConfig, DEFAULT_PROGRESS_CALLOUTS_PER_SECOND};
pub use exception::{Exception, ExceptionStore, FutureError};
pub use executor::{Executor, InlineExecutor, Runnable};
pub use flags::StateFlags;
pub use future::{AnyFuture, Future, ResultIter};
pub use promise::Promise;
pub use result_store::ResultStore;
pub use state::Progress;
pub use thread_pool::ThreadPool;
pub use watcher::Watch;

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use once_cell::sync::Lazy;

/* Implicit process-wide executor */
static DEFAULT_EXECUTOR: Lazy<Arc<ThreadPool>> = Lazy::new(Default::default);

/// The process-wide executor, used by computations whose config names none
pub fn default_executor() -> Arc<dyn Executor> {
    DEFAULT_EXECUTOR.clone()
}

/// Run `f` on the default executor, its return value becoming the only result
///
/// # Examples
///
/// ```
/// let future = ufuture::run(|| 1 + 2);
/// assert_eq!(future.result().unwrap(), 3);
/// ```
pub fn run<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    run_with_promise(move |promise| {
        promise.report_result(f());
    })
}

/// Run a fallible `f` on the default executor.
///
/// An `Err` is reported as the computation's failure.
///
/// # Examples
///
/// ```
/// # #[derive(Clone, Debug)]
/// # struct DiskFull;
/// # impl std::fmt::Display for DiskFull {
/// #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
/// #         write!(f, "disk full")
/// #     }
/// # }
/// # impl std::error::Error for DiskFull {}
/// let future = ufuture::try_run(|| -> Result<u8, DiskFull> { Err(DiskFull) });
/// let err = future.wait_for_finished().unwrap_err();
/// assert!(err.downcast_ref::<DiskFull>().is_some());
/// assert!(future.is_canceled());
/// ```
pub fn try_run<T, E, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    E: Exception,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    run_with_promise(move |promise| match f() {
        Ok(value) => {
            promise.report_result(value);
        }
        Err(err) => promise.report_exception(err),
    })
}

/// Run `f` on the default executor, reporting through the given promise
pub fn run_with_promise<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce(&Promise<T>) + Send + 'static,
{
    run_with_config(FutureConfig::default(), f)
}

/// Run `f` with custom settings, reporting through the given promise.
///
/// The computation is reported started right away and finished when `f`
/// returns. A panic in `f` is reported as an unhandled failure.
pub fn run_with_config<T, F>(config: FutureConfig, f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce(&Promise<T>) + Send + 'static,
{
    let promise = Promise::with_config(config);
    let future = promise.future();
    let executor = promise.executor();
    promise.report_started();

    let runnable = Runnable::new(move || {
        if promise.is_canceled() {
            return;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| f(&promise))) {
            Ok(()) => promise.report_finished(),
            Err(payload) => {
                tracing::warn!(
                    panic = %exception::panic_message(&*payload),
                    "computation panicked"
                );
                promise.report_panic(&*payload);
            }
        }
    });
    future.set_runnable(&runnable);
    executor.execute(runnable);
    future
}
