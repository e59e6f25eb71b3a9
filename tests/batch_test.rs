use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use huginn::{
    AiEndpoint, BatchOptions, CallOptions, Clock, HuginnError, Huginn, OptimizedAiService, Result,
    TokioClock,
};
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_stream::StreamExt;

/// Echoes `i` back, rejects the indices it was told to, hangs on `slow`.
struct ItemEndpoint {
    reject: Vec<u64>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ItemEndpoint {
    fn rejecting(reject: &[u64]) -> Self {
        Self {
            reject: reject.to_vec(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AiEndpoint for ItemEndpoint {
    fn name(&self) -> &str {
        "items"
    }

    async fn invoke(&self, _function: &str, params: &Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let i = params["i"].as_u64().unwrap_or_default();
        // Later items finish first, so ordering has to come from position.
        tokio::time::sleep(Duration::from_millis(100 - i)).await;
        if params["slow"].as_bool() == Some(true) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.reject.contains(&i) {
            return Err(HuginnError::InvalidInput(format!("item {i} rejected")));
        }
        Ok(json!({ "i": i, "score": i * 10 }))
    }
}

#[derive(Default)]
struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> Instant {
        TokioClock.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        TokioClock.sleep(duration).await;
    }
}

fn service(endpoint: Arc<ItemEndpoint>) -> (OptimizedAiService, Arc<RecordingClock>) {
    let clock = Arc::new(RecordingClock::default());
    let service = Huginn::builder()
        .endpoint(endpoint)
        .clock(clock.clone())
        .build()
        .unwrap();
    (service, clock)
}

fn items(n: u64) -> Vec<Value> {
    (0..n).map(|i| json!({ "i": i })).collect()
}

fn options(size: usize) -> BatchOptions {
    BatchOptions::default()
        .batch_size(size)
        .call_options(CallOptions::default().retries(0).use_cache(false))
}

#[tokio::test(start_paused = true)]
async fn failing_items_leave_holes_and_siblings_succeed() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[3, 7]));
    let (service, _) = service(endpoint);

    let report = service.run_batch("score", &items(10), &options(4)).await;

    assert_eq!(report.results.len(), 10);
    assert_eq!(report.successful(), 8);
    assert_eq!(report.failed(), 2);
    assert!(report.results[3].is_none());
    assert!(report.results[7].is_none());

    let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![3, 7]);
    assert!(matches!(report.failures[0].error, HuginnError::InvalidInput(_)));
}

#[tokio::test(start_paused = true)]
async fn results_follow_input_order() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, _) = service(endpoint);

    let report = service.run_batch("score", &items(7), &options(3)).await;

    for (i, slot) in report.results.iter().enumerate() {
        assert_eq!(slot.as_ref().unwrap()["i"], i as u64);
    }
}

#[tokio::test(start_paused = true)]
async fn progress_is_reported_after_each_chunk() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[3]));
    let (service, _) = service(endpoint);

    let mut progress = Vec::new();
    service
        .run_batch_with_progress("score", &items(10), &options(4), |done, total| {
            progress.push((done, total))
        })
        .await;

    assert_eq!(progress, vec![(4, 10), (8, 10), (10, 10)]);
}

#[tokio::test(start_paused = true)]
async fn chunks_run_concurrently_and_are_paced() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, clock) = service(endpoint.clone());

    let opts = options(4).delay(Duration::from_millis(250));
    service.run_batch("score", &items(10), &opts).await;

    assert_eq!(endpoint.max_in_flight.load(Ordering::SeqCst), 4);
    // Three chunks, so two pauses and none after the last one.
    assert_eq!(
        *clock.sleeps.lock().unwrap(),
        vec![Duration::from_millis(250), Duration::from_millis(250)]
    );
}

#[tokio::test(start_paused = true)]
async fn batch_items_share_the_cache() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, _) = service(endpoint.clone());
    let opts = BatchOptions::default().batch_size(2);

    service.run_batch("score", &items(4), &opts).await;
    let again = service.run_batch("score", &items(4), &opts).await;

    assert_eq!(again.successful(), 4);
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn progressive_steps_accumulate_results() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, _) = service(endpoint);

    let mut steps = Vec::new();
    let report = service
        .run_progressive("score", &items(5), &options(2), |step| steps.push(step.clone()))
        .await;

    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].progress.batch_index, 0);
    assert_eq!(steps[0].progress.total_batches, 3);
    assert_eq!(steps[0].progress.completed, 2);
    assert_eq!(steps[0].results.iter().filter(|r| r.is_some()).count(), 2);
    assert!(steps[0].results[2].is_none());
    assert_eq!(steps[2].results, report.results);
}

#[tokio::test(start_paused = true)]
async fn step_timeout_drops_unfinished_items_and_the_run_continues() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, _) = service(endpoint);

    let mut params = items(4);
    params[1]["slow"] = json!(true);
    let opts = options(2).step_timeout(Duration::from_secs(5));

    let report = service.run_batch("score", &params, &opts).await;

    // Item 0 finished before the deadline and keeps its value.
    assert!(report.results[0].is_some());
    assert!(report.results[1].is_none());
    assert!(report.results[2].is_some());
    assert!(report.results[3].is_some());
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert!(matches!(
        report.failures[0].error,
        HuginnError::Timeout(d) if d == Duration::from_secs(5)
    ));

    let snapshot = service.snapshot();
    assert_eq!(snapshot.total_requests, 4);
    assert_eq!(snapshot.error_count, 1);
    assert_eq!(snapshot.error_rate, 0.25);
}

#[tokio::test(start_paused = true)]
async fn timed_out_items_are_counted_as_errors() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, _) = service(endpoint);

    let params = vec![json!({"i": 0, "slow": true}), json!({"i": 1, "slow": true})];
    let opts = options(2).step_timeout(Duration::from_secs(1));

    let report = service.run_batch("score", &params, &opts).await;

    assert_eq!(report.failed(), 2);
    let snapshot = service.snapshot();
    assert_eq!(snapshot.total_requests, 2);
    assert_eq!(snapshot.error_count, report.failed() as u64);
    assert_eq!(snapshot.error_rate, 1.0);
}

#[tokio::test(start_paused = true)]
async fn progressive_stream_yields_every_step() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[4]));
    let (service, _) = service(endpoint);

    let steps: Vec<_> = service
        .progressive_stream("score", items(6), options(2))
        .collect()
        .await;

    let completed: Vec<usize> = steps.iter().map(|s| s.progress.completed).collect();
    assert_eq!(completed, vec![2, 4, 6]);
    let last = steps.last().unwrap();
    assert!(last.results[4].is_none());
    assert_eq!(last.results.iter().filter(|r| r.is_some()).count(), 5);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_stops_the_run() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, _) = service(endpoint.clone());

    let mut stream = service.progressive_stream("score", items(20), options(2));
    let first = stream.next().await.unwrap();
    assert_eq!(first.progress.completed, 2);
    drop(stream);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(endpoint.calls.load(Ordering::SeqCst) < 20);
}

#[tokio::test(start_paused = true)]
async fn empty_input_yields_empty_report() {
    let endpoint = Arc::new(ItemEndpoint::rejecting(&[]));
    let (service, clock) = service(endpoint.clone());

    let mut progress_calls = 0;
    let report = service
        .run_batch_with_progress("score", &[], &options(4), |_, _| progress_calls += 1)
        .await;

    assert!(report.results.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(progress_calls, 0);
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    assert!(clock.sleeps.lock().unwrap().is_empty());
}
