//! Stress tests designed to break the store and effect runtime.
//!
//! These tests exercise races, feedback storms, and teardown under load.

#[cfg(test)]
mod stress_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use crate::{
        CasePath, Effect, EffectId, Identifiable, IdentifiedArray, Reduce, Reducer, Store,
        StoreBuilder,
    };

    // ==========================================================================
    // Test Types
    // ==========================================================================

    #[derive(Clone, Default)]
    struct StressState {
        count: u64,
        log: Vec<(u32, u32)>,
        fired: u32,
        failures: u32,
    }

    #[derive(Clone, Debug)]
    enum StressAction {
        Add(u64),
        Fanout(u32),
        Restart,
        Fired,
        Begin(u32),
        Step(u32, u32),
        Fail,
        Failed,
    }

    fn stress_reducer() -> impl Reducer<State = StressState, Action = StressAction> {
        Reduce::new(|state: &mut StressState, action| match action {
            StressAction::Add(n) => {
                state.count += n;
                Effect::none()
            }
            StressAction::Fanout(n) => Effect::merge((0..n).map(|_| {
                Effect::run(|sender| async move {
                    sender.send(StressAction::Add(1));
                    Ok(())
                })
            })),
            StressAction::Restart => Effect::run(|sender| async move {
                sleep(Duration::from_millis(150)).await;
                sender.send(StressAction::Fired);
                Ok(())
            })
            .cancellable(EffectId::named("churn")),
            StressAction::Fired => {
                state.fired += 1;
                Effect::none()
            }
            StressAction::Begin(sequence) => {
                let delay = Duration::from_micros(fastrand::u64(0..5_000));
                Effect::concatenate([
                    Effect::run(move |sender| async move {
                        sleep(delay).await;
                        sender.send(StressAction::Step(sequence, 0));
                        Ok(())
                    }),
                    Effect::run(move |sender| async move {
                        sender.send(StressAction::Step(sequence, 1));
                        Ok(())
                    }),
                ])
            }
            StressAction::Step(sequence, phase) => {
                state.log.push((sequence, phase));
                Effect::none()
            }
            StressAction::Fail => Effect::run_catching(
                |_sender| async move { Err(anyhow::anyhow!("intentional failure")) },
                |_error, sender| async move {
                    sender.send(StressAction::Failed);
                },
            ),
            StressAction::Failed => {
                state.failures += 1;
                Effect::none()
            }
        })
    }

    fn stress_store() -> Store<StressState, StressAction> {
        StoreBuilder::new(StressState::default(), stress_reducer())
            .with_label("stress")
            .build()
    }

    async fn wait_until<S, A>(store: &mut Store<S, A>, predicate: impl Fn(&S) -> bool)
    where
        S: Clone + Send + Sync + 'static,
        A: Send + 'static,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                if predicate(&store.state()) {
                    return;
                }
                store
                    .changed()
                    .await
                    .expect("store closed while waiting for state");
            }
        })
        .await
        .expect("state predicate not reached in time");
    }

    async fn wait_for_counter(counter: &Arc<AtomicUsize>, at_least: usize) {
        timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::Relaxed) < at_least {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("counter never reached the target");
    }

    async fn assert_frozen(counter: &Arc<AtomicUsize>, message: &str) {
        sleep(Duration::from_millis(50)).await;
        let frozen = counter.load(Ordering::Relaxed);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::Relaxed), frozen, "{}", message);
    }

    // ==========================================================================
    // TEST: Serialized dispatch from raw threads
    // ==========================================================================
    //
    // Four OS threads hammer cloned handles without any coordination. Every
    // action must be reduced exactly once; a lost or doubled increment means
    // the single-writer path has a hole.

    #[tokio::test]
    async fn test_concurrent_sends_from_threads_all_reduce() {
        let mut store = stress_store();
        let threads = 4;
        let sends_per_thread = 500u64;

        let mut workers = Vec::new();
        for _ in 0..threads {
            let handle = store.clone();
            workers.push(std::thread::spawn(move || {
                for _ in 0..sends_per_thread {
                    handle.send(StressAction::Add(1));
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let expected = threads as u64 * sends_per_thread;
        wait_until(&mut store, |state| state.count == expected).await;

        // Settle and make sure nothing doubled up.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(
            store.state().count,
            expected,
            "expected exactly {} increments",
            expected
        );
    }

    // ==========================================================================
    // TEST: Fan-out feedback storm
    // ==========================================================================
    //
    // One action spawns hundreds of concurrent effects that all feed actions
    // back. Every feedback action must land.

    #[tokio::test]
    async fn test_fanout_feedback_all_lands() {
        let mut store = stress_store();

        store.send(StressAction::Fanout(200));
        wait_until(&mut store, |state| state.count == 200).await;

        store.send(StressAction::Fanout(200));
        wait_until(&mut store, |state| state.count == 400).await;
    }

    // ==========================================================================
    // TEST: Rapid re-registration churn
    // ==========================================================================
    //
    // 500 restarts under one id, back to back. Each registration must evict
    // its predecessor, so exactly one timer survives to fire.

    #[tokio::test]
    async fn test_reregistration_churn_leaves_one_survivor() {
        let mut store = stress_store();

        for _ in 0..500 {
            store.send(StressAction::Restart);
        }

        wait_until(&mut store, |state| state.fired >= 1).await;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(
            store.state().fired,
            1,
            "evicted timers fired: {} survivors out of 500 restarts",
            store.state().fired
        );
    }

    // ==========================================================================
    // TEST: Interleaved concatenation under jitter
    // ==========================================================================
    //
    // 100 concatenated sequences run concurrently, each with a random delay
    // on its first part. Sequences may interleave with each other, but the
    // parts of any one sequence must stay in declaration order.

    #[tokio::test]
    async fn test_concurrent_sequences_keep_internal_order() {
        let mut store = stress_store();
        let sequences = 100u32;

        for sequence in 0..sequences {
            store.send(StressAction::Begin(sequence));
        }
        wait_until(&mut store, |state| {
            state.log.len() == sequences as usize * 2
        })
        .await;

        let log = store.state().log;
        for sequence in 0..sequences {
            let first = log
                .iter()
                .position(|&entry| entry == (sequence, 0))
                .unwrap();
            let second = log
                .iter()
                .position(|&entry| entry == (sequence, 1))
                .unwrap();
            assert!(
                first < second,
                "sequence {} ran its parts out of order (phase 0 at {}, phase 1 at {})",
                sequence,
                first,
                second
            );
        }
    }

    // ==========================================================================
    // TEST: Failure storm does not wedge the store
    // ==========================================================================

    #[tokio::test]
    async fn test_failure_storm_is_contained() {
        let mut store = stress_store();

        for _ in 0..100 {
            store.send(StressAction::Fail);
        }
        wait_until(&mut store, |state| state.failures == 100).await;

        store.send(StressAction::Add(1));
        wait_until(&mut store, |state| state.count == 1).await;
    }

    // ==========================================================================
    // Row churn types
    // ==========================================================================

    #[derive(Clone, Default)]
    struct RowFarm {
        rows: IdentifiedArray<FarmRow>,
    }

    #[derive(Clone)]
    struct FarmRow {
        id: u32,
    }

    impl Identifiable for FarmRow {
        type Id = u32;
        fn id(&self) -> u32 {
            self.id
        }
    }

    #[derive(Clone, Debug)]
    enum FarmAction {
        Populate(u32),
        Clear,
        Row(u32, RowAction),
    }

    #[derive(Clone, Debug)]
    enum RowAction {
        Start,
    }

    fn farm_row_case() -> CasePath<FarmAction, (u32, RowAction)> {
        CasePath::new(
            |action: &FarmAction| match action {
                FarmAction::Row(id, inner) => Some((*id, inner.clone())),
                _ => None,
            },
            |(id, inner)| FarmAction::Row(id, inner),
        )
    }

    fn farm_store(ticks: Arc<AtomicUsize>) -> Store<RowFarm, FarmAction> {
        let row = Reduce::new(move |_state: &mut FarmRow, action| match action {
            RowAction::Start => {
                let ticks = ticks.clone();
                Effect::run(move |_sender| async move {
                    loop {
                        ticks.fetch_add(1, Ordering::Relaxed);
                        sleep(Duration::from_millis(5)).await;
                    }
                })
                .cancellable(EffectId::named("row-tick"))
            }
        });
        let reducer = Reduce::new(|state: &mut RowFarm, action| match action {
            FarmAction::Populate(n) => {
                for id in 0..n {
                    state.rows.push(FarmRow { id });
                }
                Effect::merge((0..n).map(|id| Effect::send(FarmAction::Row(id, RowAction::Start))))
            }
            FarmAction::Clear => {
                state.rows.clear();
                Effect::none()
            }
            FarmAction::Row(..) => Effect::none(),
        })
        .for_each(|state: &mut RowFarm| &mut state.rows, farm_row_case(), row);
        StoreBuilder::new(RowFarm::default(), reducer)
            .with_label("farm")
            .build()
    }

    // ==========================================================================
    // TEST: Clearing a large collection stops every row effect
    // ==========================================================================

    #[tokio::test]
    async fn test_clearing_rows_stops_every_timer() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut store = farm_store(ticks.clone());

        store.send(FarmAction::Populate(40));
        wait_until(&mut store, |state| state.rows.len() == 40).await;
        wait_for_counter(&ticks, 40).await;

        store.send(FarmAction::Clear);
        wait_until(&mut store, |state| state.rows.is_empty()).await;

        assert_frozen(&ticks, "a cleared collection must leave no timer running").await;
    }

    // ==========================================================================
    // TEST: Store teardown under load
    // ==========================================================================
    //
    // Dropping the last handle while dozens of effects are mid-flight must
    // stop all of them instead of leaking detached tasks.

    #[tokio::test]
    async fn test_dropping_the_store_stops_effects_mid_storm() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let store = farm_store(ticks.clone());

        store.send(FarmAction::Populate(20));
        wait_for_counter(&ticks, 20).await;

        drop(store);

        assert_frozen(&ticks, "teardown must cancel every running effect").await;
    }

    // ==========================================================================
    // TEST: Many observers wake on the same changes
    // ==========================================================================

    #[tokio::test]
    async fn test_many_observers_all_see_the_target() {
        let store = stress_store();

        let mut observers = Vec::new();
        for _ in 0..10 {
            let mut handle = store.clone();
            observers.push(tokio::spawn(async move {
                timeout(Duration::from_secs(5), async {
                    loop {
                        if handle.state().count >= 500 {
                            return;
                        }
                        handle
                            .changed()
                            .await
                            .expect("store closed under observers");
                    }
                })
                .await
                .expect("observer never saw the target count");
            }));
        }

        for _ in 0..500 {
            store.send(StressAction::Add(1));
        }
        for observer in observers {
            observer.await.unwrap();
        }
    }
}
