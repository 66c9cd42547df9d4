//! Control loop behaviour tests.

use super::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LONG: Duration = Duration::from_secs(3600);

/// Records every batch the pool hands to its sink.
#[derive(Clone, Default)]
struct Recorder {
    batches: Arc<Mutex<Vec<Batch<String>>>>,
}

impl Recorder {
    fn options(&self) -> Options<String> {
        let batches = Arc::clone(&self.batches);
        Options::new().with_func(move |batch: &Batch<String>| {
            batches.lock().unwrap().push(batch.clone());
            Ok(())
        })
    }

    fn batches(&self) -> Vec<Batch<String>> {
        self.batches.lock().unwrap().clone()
    }

    fn keys(&self) -> Vec<Vec<String>> {
        self.batches().iter().map(sorted_keys).collect()
    }
}

fn sorted_keys(batch: &Batch<String>) -> Vec<String> {
    let mut keys: Vec<String> = batch.keys().cloned().collect();
    keys.sort();
    keys
}

async fn shutdown(pool: &Pool<String>) {
    pool.stop().await;
    pool.stopped().await;
}

#[tokio::test]
async fn test_size_trigger_scenario() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_max_entries(3).with_flush_interval(LONG)).unwrap();

    pool.add("a", "v".to_string()).await;
    pool.add("b", "v".to_string()).await;
    pool.add("c", "v".to_string()).await;
    // fresh mapping after the flush
    pool.add("a", "v".to_string()).await;
    shutdown(&pool).await;

    assert_eq!(rec.keys(), vec![vec!["a", "b", "c"], vec!["a"]]);
}

#[tokio::test]
async fn test_size_flush_happens_before_next_event() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_max_entries(2).with_flush_interval(LONG)).unwrap();

    pool.add("a", "v".to_string()).await;
    pool.add("b", "v".to_string()).await;
    // buffer is already empty, so this delete is a no-op
    pool.delete("a").await;
    pool.add("c", "v".to_string()).await;
    shutdown(&pool).await;

    assert_eq!(rec.keys(), vec![vec!["a", "b"], vec!["c"]]);
}

#[tokio::test]
async fn test_last_write_wins() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_max_entries(2).with_flush_interval(LONG)).unwrap();

    pool.add("a", "1".to_string()).await;
    pool.add("a", "2".to_string()).await;
    assert!(rec.batches().is_empty());

    pool.add("b", "3".to_string()).await;
    shutdown(&pool).await;

    let batches = rec.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].get("a").map(String::as_str), Some("2"));
    assert_eq!(batches[0].get("b").map(String::as_str), Some("3"));
}

#[tokio::test]
async fn test_delete_missing_key_still_decrements() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_max_entries(3).with_flush_interval(LONG)).unwrap();

    pool.add("a", "v".to_string()).await;
    pool.add("b", "v".to_string()).await;
    pool.delete("missing").await;
    // count is back to 1, so c brings it to 2 and d to 3
    pool.add("c", "v".to_string()).await;
    pool.add("d", "v".to_string()).await;
    shutdown(&pool).await;

    assert_eq!(rec.keys(), vec![vec!["a", "b", "c", "d"]]);
}

#[tokio::test]
async fn test_delete_on_empty_is_noop() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_max_entries(2).with_flush_interval(LONG)).unwrap();

    pool.delete("x").await;
    pool.delete("y").await;
    pool.add("a", "v".to_string()).await;
    pool.add("b", "v".to_string()).await;
    shutdown(&pool).await;

    assert_eq!(rec.keys(), vec![vec!["a", "b"]]);
}

#[tokio::test]
async fn test_delete_removes_entry() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_flush_interval(LONG)).unwrap();

    pool.add("a", "v".to_string()).await;
    pool.add("b", "v".to_string()).await;
    pool.delete("a").await;
    shutdown(&pool).await;

    assert_eq!(rec.keys(), vec![vec!["b"]]);
}

#[tokio::test(start_paused = true)]
async fn test_time_trigger_scenario() {
    let rec = Recorder::default();
    let pool = Pool::spawn(
        rec.options()
            .with_max_entries(20)
            .with_flush_interval(Duration::from_secs(1)),
    )
    .unwrap();

    pool.add("a", "v".to_string()).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(rec.keys(), vec![vec!["a"]]);

    // the next tick finds an empty buffer and does not call the sink
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rec.batches().len(), 1);

    shutdown(&pool).await;
    assert_eq!(rec.batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_time_trigger_every_interval() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_flush_interval(Duration::from_secs(1))).unwrap();

    pool.add("a", "v".to_string()).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    pool.add("b", "v".to_string()).await;
    pool.add("c", "v".to_string()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(rec.keys(), vec![vec!["a"], vec!["b", "c"]]);
    shutdown(&pool).await;
}

#[tokio::test]
async fn test_stop_flushes_once() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_flush_interval(LONG)).unwrap();

    pool.add("a", "v".to_string()).await;
    pool.add("b", "v".to_string()).await;
    shutdown(&pool).await;
    assert!(pool.is_stopped());
    assert_eq!(rec.keys(), vec![vec!["a", "b"]]);

    // dropped: the loop is gone
    pool.add("c", "v".to_string()).await;
    pool.delete("a").await;
    pool.stop().await;
    assert_eq!(rec.batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_ticker() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_flush_interval(Duration::from_secs(1))).unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!pool.ticker_cancelled());

    pool.add("a", "v".to_string()).await;
    shutdown(&pool).await;
    // the handle is still alive, so only the loop can have cancelled it
    assert!(pool.ticker_cancelled());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(rec.keys(), vec![vec!["a"]]);
}

#[tokio::test]
async fn test_stop_on_empty_pool_skips_sink() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_flush_interval(LONG)).unwrap();

    shutdown(&pool).await;
    assert!(rec.batches().is_empty());
}

#[tokio::test]
async fn test_empty_key_is_dropped() {
    let rec = Recorder::default();
    let pool = Pool::spawn(rec.options().with_max_entries(1).with_flush_interval(LONG)).unwrap();

    pool.add("", "v".to_string()).await;
    shutdown(&pool).await;
    assert!(rec.batches().is_empty());
}

#[tokio::test]
async fn test_sink_failure_drops_batch() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink_calls = Arc::clone(&calls);
    let pool = Pool::spawn(
        Options::new()
            .with_func(move |batch: &Batch<String>| {
                sink_calls.lock().unwrap().push(sorted_keys(batch));
                anyhow::bail!("upload failed")
            })
            .with_max_entries(2)
            .with_flush_interval(LONG),
    )
    .unwrap();

    pool.add("a", "v".to_string()).await;
    pool.add("b", "v".to_string()).await;
    pool.add("c", "v".to_string()).await;
    shutdown(&pool).await;

    // no retry, and the failed entries are not carried into the next batch
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls, vec![vec!["a", "b"], vec!["c"]]);
}

#[tokio::test]
async fn test_sink_panic_keeps_loop_running() {
    let rec = Recorder::default();
    let batches = Arc::clone(&rec.batches);
    let pool = Pool::spawn(
        Options::new()
            .with_func(move |batch: &Batch<String>| {
                if batch.contains_key("boom") {
                    panic!("sink exploded");
                }
                batches.lock().unwrap().push(batch.clone());
                Ok(())
            })
            .with_max_entries(1)
            .with_flush_interval(LONG),
    )
    .unwrap();

    pool.add("boom", "v".to_string()).await;
    pool.add("ok", "v".to_string()).await;
    shutdown(&pool).await;

    assert_eq!(rec.keys(), vec![vec!["ok"]]);
}

#[tokio::test]
async fn test_drop_flushes_remaining_entries() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pool = Pool::spawn(
        Options::new()
            .with_func(move |batch: &Batch<String>| {
                let _ = tx.send(sorted_keys(batch));
                Ok(())
            })
            .with_flush_interval(LONG),
    )
    .unwrap();

    pool.add("a", "v".to_string()).await;
    drop(pool);

    let keys = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(keys, vec!["a"]);
    // the sink (and its sender) is dropped once the loop exits
    assert!(rx.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers() {
    let rec = Recorder::default();
    let pool = Arc::new(
        Pool::spawn(rec.options().with_max_entries(10).with_flush_interval(LONG)).unwrap(),
    );

    let mut tasks = Vec::new();
    for p in 0..4 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                pool.add(format!("p{}-{}", p, i), "v".to_string()).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    shutdown(&pool).await;

    let batches = rec.batches();
    assert_eq!(batches.len(), 10);
    assert!(batches.iter().all(|b| b.len() == 10));
}

#[test]
fn test_spawn_requires_runtime() {
    let result = Pool::<String>::spawn(Options::new());
    assert!(matches!(result, Err(ShuttleError::NoRuntime)));
}

#[tokio::test]
async fn test_effective_options() {
    let pool = Pool::<String>::spawn(Options::new().with_max_entries(0)).unwrap();
    assert_eq!(pool.max_entries(), DEFAULT_MAX_ENTRIES);
    assert_eq!(pool.flush_interval(), DEFAULT_FLUSH_INTERVAL);
    shutdown(&pool).await;
}

#[test]
fn test_pool_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Pool<String>>();
    assert_send_sync::<Pool<serde_json::Value>>();
}
