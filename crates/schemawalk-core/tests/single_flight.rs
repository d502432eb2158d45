use futures::FutureExt;
use schemawalk_core::cache::{CacheError, CancellationToken, SingleFlightCache};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// A cache whose loads for `"slow"` block until `gate` is notified.
fn gated_cache(
    calls: Arc<AtomicUsize>,
    gate: Arc<Notify>,
) -> Arc<SingleFlightCache<&'static str, String, ()>> {
    Arc::new(SingleFlightCache::new(move |key: &'static str, (), _cancel| {
        calls.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::clone(&gate);
        async move {
            if key == "slow" {
                gate.notified().await;
            }
            Ok(format!("{key}-loaded"))
        }
        .boxed()
    }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let cache = gated_cache(Arc::clone(&calls), Arc::clone(&gate));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.get_by_key("slow", (), &CancellationToken::new()).await
        }));
    }

    // Let every task reach the shared wait before releasing the load.
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.notify_one();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "slow-loaded");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_key_does_not_block_other_keys() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let cache = gated_cache(Arc::clone(&calls), Arc::clone(&gate));

    let slow = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.get_by_key("slow", (), &CancellationToken::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fast = tokio::time::timeout(
        Duration::from_secs(2),
        cache.get_by_key("fast", (), &CancellationToken::new()),
    )
    .await
    .expect("fast key must not wait on slow key");
    assert_eq!(fast.unwrap(), "fast-loaded");
    assert!(!slow.is_finished());

    gate.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), "slow-loaded");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_one_waiter_leaves_the_load_running() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let cache = gated_cache(Arc::clone(&calls), Arc::clone(&gate));

    let patient = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.get_by_key("slow", (), &CancellationToken::new()).await }
    });

    let impatient_token = CancellationToken::new();
    let impatient = tokio::spawn({
        let cache = Arc::clone(&cache);
        let token = impatient_token.clone();
        async move { cache.get_by_key("slow", (), &token).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    impatient_token.cancel();
    assert!(matches!(impatient.await.unwrap(), Err(CacheError::Cancelled)));

    gate.notify_one();
    assert_eq!(patient.await.unwrap().unwrap(), "slow-loaded");

    // The finished outcome stays cached.
    let again = cache
        .get_by_key("slow", (), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again, "slow-loaded");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_failure_is_shared() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let cache: SingleFlightCache<u32, u32, ()> = SingleFlightCache::new(move |key, (), _| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::task::yield_now().await;
            Err(anyhow::anyhow!("catalog unavailable for {key}"))
        }
        .boxed()
    });
    let token = CancellationToken::new();

    let (a, b) = tokio::join!(cache.get_by_key(9, (), &token), cache.get_by_key(9, (), &token));
    let (a, b) = (a.unwrap_err(), b.unwrap_err());
    assert!(matches!(a, CacheError::Load(_)));
    assert_eq!(a.to_string(), b.to_string());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
