use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use ufuture::{
    CallOutEvent, ChannelObserver, FutureConfig, InlineExecutor, Observer, Promise,
};

fn promise<T: Send + 'static>() -> Promise<T> {
    Promise::with_config(
        FutureConfig::default()
            .executor(InlineExecutor::new())
            .progress_callouts_per_second(0),
    )
}

#[test]
fn late_observer_gets_the_history_then_live_events() {
    let promise = promise::<u32>();
    let future = promise.future();
    promise.report_started();
    promise.report_results(0, vec![1, 2]);
    promise.report_result_at(4, 5);
    future.pause();

    let (observer, receiver) = ChannelObserver::new();
    let _watch = future.watch(observer);
    assert_eq!(
        receiver.try_iter().collect::<Vec<_>>(),
        vec![
            CallOutEvent::Started,
            CallOutEvent::ProgressRange { minimum: 0, maximum: 0 },
            CallOutEvent::Progress { value: 3, text: None },
            CallOutEvent::ResultsReady { begin: 0, end: 2 },
            CallOutEvent::ResultsReady { begin: 4, end: 5 },
            CallOutEvent::Paused,
        ]
    );

    future.resume();
    promise.report_result_at(2, 3);
    promise.report_finished();
    assert_eq!(
        receiver.try_iter().collect::<Vec<_>>(),
        vec![
            CallOutEvent::Resumed,
            CallOutEvent::Progress { value: 4, text: None },
            CallOutEvent::ResultsReady { begin: 2, end: 3 },
            CallOutEvent::Finished,
        ]
    );
}

#[test]
fn observer_of_a_finished_computation() {
    let promise = promise::<&'static str>();
    let future = promise.future();
    promise.report_started();
    promise.set_progress_range(0, 2);
    promise.set_progress_value_and_text(2, "done");
    promise.report_result("only");
    promise.report_finished();

    let (observer, receiver) = ChannelObserver::new();
    let watch = future.watch(observer);
    assert_eq!(
        receiver.try_iter().collect::<Vec<_>>(),
        vec![
            CallOutEvent::Started,
            CallOutEvent::ProgressRange { minimum: 0, maximum: 2 },
            CallOutEvent::Progress { value: 2, text: Some("done".into()) },
            CallOutEvent::ResultsReady { begin: 0, end: 1 },
            CallOutEvent::Finished,
        ]
    );
    drop(watch);
    // Dropping the watch disconnects the channel
    assert!(receiver.recv_timeout(Duration::from_millis(10)).is_err());
}

#[test]
fn unstarted_computation_replays_nothing() {
    let promise = promise::<u8>();
    let (observer, receiver) = ChannelObserver::new();
    let _watch = promise.future().watch(observer);
    assert!(receiver.try_recv().is_err());
    promise.report_started();
    assert_eq!(receiver.try_recv().unwrap(), CallOutEvent::Started);
}

#[test]
fn progress_never_goes_backwards() {
    let promise = promise::<u8>();
    let future = promise.future();
    let (observer, receiver) = ChannelObserver::new();
    let _watch = future.watch(observer);
    promise.report_started();
    promise.set_progress_range(10, 0);
    for value in [3, 1, 3, 8, 20, 9, 10].iter() {
        promise.set_progress_value(*value);
    }
    promise.report_finished();

    let values = receiver
        .try_iter()
        .filter_map(|event| match event {
            CallOutEvent::Progress { value, .. } => Some(value),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(values, vec![3, 8, 9, 10]);
    assert_eq!(future.progress_minimum(), 0);
    assert_eq!(future.progress_maximum(), 10);
    assert_eq!(future.progress_value(), 10);
}

#[test]
fn default_budget_keeps_first_and_last_values() {
    let promise = Promise::<u8>::with_config(FutureConfig::default().executor(InlineExecutor::new()));
    let future = promise.future();
    let (observer, receiver) = ChannelObserver::new();
    let _watch = future.watch(observer);
    promise.report_started();
    promise.set_progress_range(0, 1000);
    for value in 1..=1000 {
        promise.set_progress_value(value);
    }

    let values = receiver
        .try_iter()
        .filter_map(|event| match event {
            CallOutEvent::Progress { value, .. } => Some(value),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(values.first(), Some(&1));
    assert_eq!(values.last(), Some(&1000));
    assert!(values.len() < 1000);
}

struct Disconnects(AtomicUsize);

impl Observer for Disconnects {
    fn deliver(&self, _event: CallOutEvent) {}

    fn disconnected(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn observers_are_told_when_the_computation_goes_away() {
    let observer = Arc::new(Disconnects(AtomicUsize::new(0)));
    let future = {
        let promise = promise::<u8>();
        let future = promise.future();
        future.register_observer(observer.clone());
        promise.report_started();
        promise.report_finished();
        future
    };
    assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    drop(future);
    assert_eq!(observer.0.load(Ordering::SeqCst), 1);
}

#[test]
fn observers_on_many_threads() {
    let promise = Promise::<usize>::with_config(
        FutureConfig::default().progress_callouts_per_second(0),
    );
    let future = promise.future();
    promise.report_started();

    let producer = thread::spawn(move || {
        for i in 0..100 {
            promise.report_result(i);
        }
        promise.report_finished();
    });

    let receivers = (0..4)
        .map(|_| {
            let (observer, receiver) = ChannelObserver::new();
            let id = future.register_observer(observer);
            (id, receiver)
        })
        .collect::<Vec<_>>();
    producer.join().unwrap();

    for (id, receiver) in receivers {
        let covered = receiver
            .try_iter()
            .filter_map(|event| match event {
                CallOutEvent::ResultsReady { begin, end } => Some(end - begin),
                _ => None,
            })
            .sum::<usize>();
        assert_eq!(covered, 100);
        future.unregister_observer(id);
    }
}
