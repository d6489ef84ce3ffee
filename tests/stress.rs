const TASKS: usize = 100;
const STEPS: usize = 100;

#[test]
fn many_readers_many_producers() {
    let futures = (0..TASKS)
        .map(|task| {
            ufuture::run_with_promise(move |promise| {
                promise.set_expected_result_count(STEPS);
                for step in 0..STEPS {
                    promise.report_result(task * STEPS + step);
                }
            })
        })
        .collect::<Vec<_>>();

    let sums = easy_parallel::Parallel::new()
        .each(0..num_cpus::get(), |reader| {
            futures
                .iter()
                .skip(reader % TASKS)
                .map(|future| future.iter().map(|res| res.unwrap()).sum::<usize>())
                .sum::<usize>()
        })
        .run();

    for (reader, sum) in sums.into_iter().enumerate() {
        let expected = (reader % TASKS..TASKS)
            .map(|task| (0..STEPS).map(|step| task * STEPS + step).sum::<usize>())
            .sum::<usize>();
        assert_eq!(sum, expected);
    }
    assert!(futures.iter().all(|future| future.is_finished()));
}

#[test]
fn concurrent_cancel_and_wait() {
    let (s, r) = flume::bounded::<()>(0);
    let future = ufuture::run_with_promise(move |promise: &ufuture::Promise<()>| {
        while !promise.is_canceled() {
            let _ = r.recv_timeout(std::time::Duration::from_millis(1));
        }
    });

    let outcomes = easy_parallel::Parallel::new()
        .each(0..8, |_| future.wait_for_finished().is_ok())
        .finish(|| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            future.cancel();
            drop(s);
        });
    assert!(outcomes.0.iter().all(|ok| *ok));
    assert!(future.is_canceled());
}
