use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use huginn::{AiEndpoint, CallOptions, HuginnError, Huginn, OptimizedAiService, Priority, Result};
use serde_json::{Value, json};

/// Records the order in which calls reach the endpoint and the peak number
/// of concurrent invocations.
#[derive(Default)]
struct OrderRecorder {
    seen: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl OrderRecorder {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiEndpoint for OrderRecorder {
    fn name(&self) -> &str {
        "order-recorder"
    }

    async fn invoke(&self, _function: &str, params: &Value) -> Result<Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let tag = params["tag"].as_str().unwrap_or_default().to_string();
        self.seen.lock().unwrap().push(tag.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if params["fail"].as_bool() == Some(true) {
            return Err(HuginnError::InvalidInput(format!("{tag} rejected")));
        }
        Ok(json!({ "tag": tag }))
    }
}

fn service(endpoint: Arc<OrderRecorder>) -> OptimizedAiService {
    Huginn::builder().endpoint(endpoint).build().unwrap()
}

fn opts(priority: Priority) -> CallOptions {
    CallOptions::default()
        .priority(priority)
        .use_cache(false)
        .retries(0)
}

#[tokio::test(start_paused = true)]
async fn higher_priority_runs_first_and_ties_keep_arrival_order() {
    let endpoint = Arc::new(OrderRecorder::default());
    let service = service(endpoint.clone());

    // The worker does not run until this task yields, so all four are
    // queued before the first one is picked.
    let handles = vec![
        service.enqueue("x", json!({"tag": "low"}), opts(Priority::Low)),
        service.enqueue("x", json!({"tag": "high-1"}), opts(Priority::High)),
        service.enqueue("x", json!({"tag": "normal"}), opts(Priority::Normal)),
        service.enqueue("x", json!({"tag": "high-2"}), opts(Priority::High)),
    ];

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(endpoint.seen(), vec!["high-1", "high-2", "normal", "low"]);
}

#[tokio::test(start_paused = true)]
async fn never_more_than_one_call_in_flight() {
    let endpoint = Arc::new(OrderRecorder::default());
    let service = service(endpoint.clone());

    let handles: Vec<_> = (0..6)
        .map(|i| service.enqueue("x", json!({"tag": format!("c{i}")}), opts(Priority::Normal)))
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(endpoint.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(endpoint.seen().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn failure_rejects_only_its_own_handle() {
    let endpoint = Arc::new(OrderRecorder::default());
    let service = service(endpoint.clone());

    let first = service.enqueue("x", json!({"tag": "a"}), opts(Priority::Normal));
    let broken = service.enqueue("x", json!({"tag": "b", "fail": true}), opts(Priority::Normal));
    let last = service.enqueue("x", json!({"tag": "c"}), opts(Priority::Normal));

    assert_eq!(first.await.unwrap(), json!({"tag": "a"}));
    assert!(matches!(broken.await, Err(HuginnError::InvalidInput(_))));
    assert_eq!(last.await.unwrap(), json!({"tag": "c"}));
}

#[tokio::test(start_paused = true)]
async fn queue_length_is_observable_before_the_worker_runs() {
    let endpoint = Arc::new(OrderRecorder::default());
    let service = service(endpoint);

    let a = service.enqueue("x", json!({"tag": "a"}), opts(Priority::Normal));
    let b = service.enqueue("x", json!({"tag": "b"}), opts(Priority::Normal));
    let c = service.enqueue("x", json!({"tag": "c"}), opts(Priority::Normal));

    assert_eq!(service.snapshot().queue_length, 3);
    assert!(service.queue_running());

    a.await.unwrap();
    b.await.unwrap();
    c.await.unwrap();
    assert_eq!(service.snapshot().queue_length, 0);
}

#[tokio::test(start_paused = true)]
async fn worker_stops_when_empty_and_restarts_on_enqueue() {
    let endpoint = Arc::new(OrderRecorder::default());
    let service = service(endpoint.clone());

    assert!(!service.queue_running());
    service
        .enqueue("x", json!({"tag": "first"}), opts(Priority::Normal))
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert!(!service.queue_running());

    let second = service.enqueue("x", json!({"tag": "second"}), opts(Priority::Low));
    assert!(service.queue_running());
    second.await.unwrap();

    assert_eq!(endpoint.seen(), vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_does_not_stall_the_queue() {
    let endpoint = Arc::new(OrderRecorder::default());
    let service = service(endpoint.clone());

    let abandoned = service.enqueue("x", json!({"tag": "gone"}), opts(Priority::High));
    let kept = service.enqueue("x", json!({"tag": "kept"}), opts(Priority::Normal));
    drop(abandoned);

    assert_eq!(kept.await.unwrap(), json!({"tag": "kept"}));
    assert_eq!(endpoint.seen(), vec!["gone", "kept"]);
}

#[tokio::test(start_paused = true)]
async fn each_handle_carries_a_distinct_id() {
    let endpoint = Arc::new(OrderRecorder::default());
    let service = service(endpoint);

    let a = service.enqueue("x", json!({"tag": "a"}), opts(Priority::Normal));
    let b = service.enqueue("x", json!({"tag": "b"}), opts(Priority::Normal));
    assert_ne!(a.id(), b.id());

    a.await.unwrap();
    b.await.unwrap();
}
