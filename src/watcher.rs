use crate::{callout::ObserverId, future::AnyFuture};

/// Registration of an observer on a computation.
///
/// Keeps the computation's shared state alive, and unregisters the observer
/// when dropped. The observer's [`disconnected`](crate::Observer::disconnected)
/// hook runs on unregistration.
#[derive(Debug)]
#[must_use = "dropping a Watch unregisters its observer"]
pub struct Watch {
    future: AnyFuture,
    id: ObserverId,
    active: bool,
}

impl Watch {
    pub(crate) fn new(future: AnyFuture, id: ObserverId) -> Self {
        Self {
            future,
            id,
            active: true,
        }
    }

    /// Identifier of the registration
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// The watched computation
    pub fn future(&self) -> &AnyFuture {
        &self.future
    }

    /// Unregister the observer now
    pub fn unregister(mut self) {
        self.disconnect();
    }

    fn disconnect(&mut self) {
        if self.active {
            self.active = false;
            self.future.unregister_observer(self.id);
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        callout::{CallOutEvent, ChannelObserver, Observer},
        config::FutureConfig,
        executor::InlineExecutor,
        promise::Promise,
    };

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct CountingObserver {
        delivered: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl Observer for CountingObserver {
        fn deliver(&self, _event: CallOutEvent) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }

        fn disconnected(&self) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn drop_unregisters_once() {
        let promise: Promise<u8> =
            Promise::with_config(FutureConfig::default().executor(InlineExecutor::new()));
        let observer = Arc::new(CountingObserver {
            delivered: AtomicUsize::new(0),
            disconnected: AtomicUsize::new(0),
        });
        let watch = promise.future().watch(observer.clone());
        promise.report_started();
        assert_eq!(observer.delivered.load(Ordering::SeqCst), 1);

        drop(watch);
        assert_eq!(observer.disconnected.load(Ordering::SeqCst), 1);
        promise.report_finished();
        assert_eq!(observer.delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watch_outlives_typed_handles() {
        let (observer, receiver) = ChannelObserver::new();
        let watch = {
            let promise: Promise<u8> =
                Promise::with_config(FutureConfig::default().executor(InlineExecutor::new()));
            let watch = promise.future().watch(observer);
            promise.report_started();
            promise.report_result(1);
            promise.report_finished();
            watch
        };
        assert!(watch.future().is_finished());
        assert_eq!(watch.future().result_count(), 0);
        watch.unregister();
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![
                CallOutEvent::Started,
                CallOutEvent::Progress { value: 1, text: None },
                CallOutEvent::ResultsReady { begin: 0, end: 1 },
                CallOutEvent::Finished,
            ]
        );
    }
}
