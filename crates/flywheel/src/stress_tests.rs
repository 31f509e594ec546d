//! Stress tests: concurrent first access, concurrent senders, random delays.

use crate::{mutations, Combiner, CombinerExt, Mutations, Pipeline};
use flywheel_testing::{take_states, wait_for_state, StateRecorder};
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

#[derive(Debug, Clone)]
enum Tick {
    Jittered,
}

#[derive(Debug, Clone)]
enum Step {
    Advance,
}

crate::distinct_mutation!(Step, Tick);

#[derive(Default)]
struct Probes {
    builds: AtomicUsize,
    mutate_calls: AtomicUsize,
    folding: AtomicBool,
    overlapping_folds: AtomicUsize,
}

struct Ticker {
    pipeline: Pipeline<Ticker>,
    probes: Arc<Probes>,
}

impl Ticker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pipeline: Pipeline::new(0),
            probes: Arc::new(Probes::default()),
        })
    }
}

impl Combiner for Ticker {
    type Action = Tick;
    type Mutation = Step;
    type State = u64;

    fn pipeline(&self) -> &Pipeline<Self> {
        &self.pipeline
    }

    fn transform_action(&self, action: BoxStream<'static, Tick>) -> BoxStream<'static, Tick> {
        self.probes.builds.fetch_add(1, Ordering::SeqCst);
        action
    }

    fn mutate(&self, action: Tick) -> Mutations<Step> {
        self.probes.mutate_calls.fetch_add(1, Ordering::SeqCst);
        match action {
            Tick::Jittered => {
                let delay = Duration::from_millis(fastrand::u64(0..15));
                mutations::future(async move {
                    tokio::time::sleep(delay).await;
                    Step::Advance
                })
            }
        }
    }

    fn reduce(&self, state: u64, mutation: Step) -> u64 {
        if self.probes.folding.swap(true, Ordering::SeqCst) {
            self.probes.overlapping_folds.fetch_add(1, Ordering::SeqCst);
        }
        let next = match mutation {
            Step::Advance => state + 1,
        };
        self.probes.folding.store(false, Ordering::SeqCst);
        next
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_first_access_builds_once() {
    const READERS: usize = 32;

    for _ in 0..20 {
        let ticker = Ticker::new();
        let barrier = Arc::new(Barrier::new(READERS));

        let mut handles = Vec::new();
        for n in 0..READERS {
            let ticker = ticker.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                if n % 2 == 0 {
                    let _ = ticker.state();
                } else {
                    let _ = ticker.action();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ticker.probes.builds.load(Ordering::SeqCst), 1);

        let mut states = ticker.state();
        ticker.send(Tick::Jittered);
        assert_eq!(take_states(&mut states, 2).await, vec![0, 1]);
        assert_eq!(ticker.probes.mutate_calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_senders_fold_serially() {
    const SENDERS: usize = 16;
    const PER_SENDER: usize = 25;
    const TOTAL: u64 = (SENDERS * PER_SENDER) as u64;

    let ticker = Ticker::new();
    let recorders: Vec<_> = (0..4)
        .map(|_| StateRecorder::start(ticker.state()))
        .collect();

    let mut handles = Vec::new();
    for _ in 0..SENDERS {
        let sender = ticker.action();
        handles.push(tokio::spawn(async move {
            for _ in 0..PER_SENDER {
                sender.send(Tick::Jittered);
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every subscriber saw the same strictly increasing run.
    let expected: Vec<u64> = (0..=TOTAL).collect();
    for recorder in &recorders {
        assert_eq!(recorder.wait_for_len(TOTAL as usize + 1).await, expected);
    }

    assert_eq!(ticker.current_state(), TOTAL);
    assert_eq!(ticker.probes.overlapping_folds.load(Ordering::SeqCst), 0);
    assert_eq!(ticker.probes.mutate_calls.load(Ordering::SeqCst), TOTAL as usize);

    // A late subscriber starts from the initial state, then follows live.
    let mut late = ticker.state();
    assert_eq!(take_states(&mut late, 1).await, vec![0]);
    ticker.send(Tick::Jittered);
    assert_eq!(wait_for_state(&mut late, |n| *n > TOTAL).await, TOTAL + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_drop_under_load_stops_delivery() {
    for _ in 0..20 {
        let ticker = Ticker::new();
        let recorder = StateRecorder::start(ticker.state());
        let sender = ticker.action();

        for _ in 0..50 {
            sender.send(Tick::Jittered);
        }
        tokio::time::sleep(Duration::from_millis(fastrand::u64(0..10))).await;
        drop(ticker);

        let mut waited = 0;
        while !recorder.is_finished() && waited < 200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
        }
        assert!(recorder.is_finished());

        let delivered = recorder.len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(recorder.len(), delivered);
        assert!(!sender.is_open() || sender.try_send(Tick::Jittered).is_err());
    }
}
