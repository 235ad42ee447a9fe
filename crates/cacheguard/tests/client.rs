//! Strategy tests against the in-memory store: negative caching,
//! exactly-once mutex rebuilds, and non-blocking logical expiration.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cacheguard::{CacheClient, CacheConfig, CacheError, Envelope, LoaderError};
use cacheguard_store::{DynKvStore, KvStore, MemoryStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    name: String,
}

impl Item {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

fn setup() -> (Arc<MemoryStore>, CacheClient) {
    setup_with(CacheConfig::default())
}

fn setup_with(config: CacheConfig) -> (Arc<MemoryStore>, CacheClient) {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: DynKvStore = store.clone();
    (store, CacheClient::new(dyn_store, config))
}

/// Write an envelope whose logical expiration is already in the past.
async fn write_expired(store: &Arc<MemoryStore>, key: &str, item: &Item) {
    let envelope = Envelope::expiring_at(
        item.clone(),
        time::OffsetDateTime::now_utc() - time::Duration::seconds(30),
    );
    let json = serde_json::to_string(&envelope).unwrap();
    store.set(key, &json, None).await.unwrap();
}

// ---------------------------------------------------------------------------
// pass-through
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pass_through_stores_and_returns_loaded_value() {
    let (store, client) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    let loader_calls = Arc::clone(&calls);
    let value = client
        .get_with_pass_through("p:", 1u32, Duration::from_secs(1800), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Item::named("x")))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, Some(Item::named("x")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Stored as plain JSON under the caller's TTL (~30 minutes).
    assert_eq!(
        store.get("p:1").await.unwrap(),
        Some(r#"{"name":"x"}"#.to_string())
    );
    let remaining = store.expires_in("p:1").expect("ttl tracked");
    assert!(remaining <= Duration::from_secs(1800));
    assert!(remaining > Duration::from_secs(1790));
}

#[tokio::test]
async fn pass_through_serves_cached_value_without_loader() {
    let (_store, client) = setup();
    client
        .set("p:1", &Item::named("cached"), Duration::from_secs(60))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = Arc::clone(&calls);
    let value = client
        .get_with_pass_through("p:", 1u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Item::named("loaded")))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, Some(Item::named("cached")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pass_through_tombstone_short_circuits_the_loader() {
    let (store, client) = setup();
    store
        .set("p:1", "", Some(Duration::from_secs(120)))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = Arc::clone(&calls);
    let value = client
        .get_with_pass_through("p:", 1u32, Duration::from_secs(1800), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Item::named("x")))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pass_through_tombstones_missing_ids_with_short_ttl() {
    let (store, client) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let loader_calls = Arc::clone(&calls);
        let value: Option<Item> = client
            .get_with_pass_through("p:", 404u32, Duration::from_secs(1800), move |_id| {
                let calls = loader_calls;
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    // Only the first lookup reached the store of record.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The tombstone carries the short null TTL, not the caller's TTL.
    assert_eq!(store.get("p:404").await.unwrap(), Some(String::new()));
    let remaining = store.expires_in("p:404").expect("ttl tracked");
    assert!(remaining <= Duration::from_secs(120));
    assert!(remaining > Duration::from_secs(110));
}

#[tokio::test]
async fn pass_through_propagates_loader_failure() {
    let (store, client) = setup();

    let err = client
        .get_with_pass_through("p:", 1u32, Duration::from_secs(60), |_id| async move {
            Err::<Option<Item>, LoaderError>("database exploded".into())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Loader(_)));
    // A failed load writes nothing.
    assert!(store.get("p:1").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// mutex
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mutex_loads_exactly_once_across_concurrent_readers() {
    let (_store, client) = setup();
    let client = Arc::new(client);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = Arc::clone(&client);
        let calls = Arc::clone(&calls);
        tasks.push(tokio::spawn(async move {
            client
                .get_with_mutex("hot:", 1u32, Duration::from_secs(60), move |_id| {
                    let calls = calls;
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        Ok(Some(Item::named("rebuilt")))
                    }
                })
                .await
        }));
    }

    for task in tasks {
        let value = task.await.unwrap().unwrap();
        assert_eq!(value, Some(Item::named("rebuilt")));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mutex_tombstones_missing_id_and_releases_lock() {
    let (store, client) = setup();

    let value: Option<Item> = client
        .get_with_mutex("p:", 5u32, Duration::from_secs(60), |_id| async move {
            Ok(None)
        })
        .await
        .unwrap();

    assert_eq!(value, None);
    assert_eq!(store.get("p:5").await.unwrap(), Some(String::new()));
    assert!(store.get("lock:p:5").await.unwrap().is_none());
}

#[tokio::test]
async fn mutex_surfaces_timeout_under_sustained_contention() {
    let (store, client) = setup_with(CacheConfig {
        lock_retry_delay_ms: 10,
        lock_retry_limit: 2,
        ..CacheConfig::default()
    });

    // Another process holds the rebuild lock and never lets go.
    assert!(
        store
            .set_if_absent("lock:p:9", "someone-else", Duration::from_secs(30))
            .await
            .unwrap()
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = Arc::clone(&calls);
    let err = client
        .get_with_mutex("p:", 9u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Item::named("never")))
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::LockContention { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mutex_propagates_loader_failure_and_recovers() {
    let (store, client) = setup();

    let err = client
        .get_with_mutex("p:", 7u32, Duration::from_secs(60), |_id| async move {
            Err::<Option<Item>, LoaderError>("database exploded".into())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Loader(_)));

    // The lock was released in the cleanup path, so the next caller
    // rebuilds immediately instead of waiting out the lock TTL.
    assert!(store.get("lock:p:7").await.unwrap().is_none());

    let value = client
        .get_with_mutex("p:", 7u32, Duration::from_secs(60), |_id| async move {
            Ok(Some(Item::named("second-try")))
        })
        .await
        .unwrap();
    assert_eq!(value, Some(Item::named("second-try")));
}

// ---------------------------------------------------------------------------
// logical expiration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logical_expire_cold_key_returns_none_without_loading() {
    let (_store, client) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    let loader_calls = Arc::clone(&calls);
    let value = client
        .get_with_logical_expire("shop:", 1u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Item::named("never")))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn logical_expire_blank_value_returns_none() {
    let (store, client) = setup();
    store.set("shop:1", "", None).await.unwrap();

    let value: Option<Item> = client
        .get_with_logical_expire("shop:", 1u32, Duration::from_secs(60), |_id| async move {
            Ok(Some(Item::named("never")))
        })
        .await
        .unwrap();

    assert_eq!(value, None);
}

#[tokio::test]
async fn logical_expire_serves_fresh_value_without_loading() {
    let (_store, client) = setup();
    client
        .set_with_logical_expire("shop:1", &Item::named("fresh"), Duration::from_secs(60))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = Arc::clone(&calls);
    let value = client
        .get_with_logical_expire("shop:", 1u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Item::named("never")))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, Some(Item::named("fresh")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn logical_expire_serves_stale_and_rebuilds_in_background() {
    let (store, client) = setup();
    write_expired(&store, "shop:1", &Item::named("stale")).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = Arc::clone(&calls);

    let started = Instant::now();
    let value = client
        .get_with_logical_expire("shop:", 1u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(Some(Item::named("fresh")))
            }
        })
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // The reader gets the stale value without waiting out the slow loader.
    assert_eq!(value, Some(Item::named("stale")));
    assert!(
        elapsed < Duration::from_millis(150),
        "reader blocked on rebuild: {elapsed:?}"
    );

    // The rebuild lands in the background with a fresh logical expiry.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(json) = store.get("shop:1").await.unwrap() {
            if json.contains("fresh") {
                break;
            }
        }
        assert!(Instant::now() < deadline, "rebuild never landed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // And the rebuilt value is now served as fresh.
    let value = client
        .get_with_logical_expire("shop:", 1u32, Duration::from_secs(60), |_id| async move {
            Ok(Some(Item::named("other")))
        })
        .await
        .unwrap();
    assert_eq!(value, Some(Item::named("fresh")));
}

#[tokio::test]
async fn logical_expire_schedules_single_rebuild_per_window() {
    let (store, client) = setup();
    write_expired(&store, "shop:2", &Item::named("stale")).await;

    let calls = Arc::new(AtomicUsize::new(0));

    // First reader triggers the rebuild and holds the lock for its duration.
    let loader_calls = Arc::clone(&calls);
    let first = client
        .get_with_logical_expire("shop:", 2u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(Some(Item::named("fresh")))
            }
        })
        .await
        .unwrap();

    // A second reader inside the rebuild window is served stale and
    // schedules nothing: the lock is already held.
    let loader_calls = Arc::clone(&calls);
    let second = client
        .get_with_logical_expire("shop:", 2u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Item::named("duplicate")))
            }
        })
        .await
        .unwrap();

    assert_eq!(first, Some(Item::named("stale")));
    assert_eq!(second, Some(Item::named("stale")));

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(json) = store.get("shop:2").await.unwrap() {
            if json.contains("fresh") {
                break;
            }
        }
        assert!(Instant::now() < deadline, "rebuild never landed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logical_expire_drops_key_when_id_vanishes() {
    let (store, client) = setup();
    write_expired(&store, "shop:3", &Item::named("stale")).await;

    let value = client
        .get_with_logical_expire("shop:", 3u32, Duration::from_secs(60), |_id| async move {
            Ok(None::<Item>)
        })
        .await
        .unwrap();
    assert_eq!(value, Some(Item::named("stale")));

    let deadline = Instant::now() + Duration::from_secs(2);
    while store.get("shop:3").await.unwrap().is_some() {
        assert!(Instant::now() < deadline, "entry never dropped");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(store.get("lock:shop:3").await.unwrap().is_none());
}

#[tokio::test]
async fn logical_expire_keeps_stale_value_when_rebuild_fails() {
    let (store, client) = setup();
    write_expired(&store, "shop:4", &Item::named("stale")).await;

    let value = client
        .get_with_logical_expire("shop:", 4u32, Duration::from_secs(60), |_id| async move {
            Err::<Option<Item>, LoaderError>("database exploded".into())
        })
        .await
        .unwrap();
    assert_eq!(value, Some(Item::named("stale")));

    // The failed rebuild releases the lock and leaves the stale entry.
    let deadline = Instant::now() + Duration::from_secs(2);
    while store.get("lock:shop:4").await.unwrap().is_some() {
        assert!(Instant::now() < deadline, "lock never released");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let value: Option<Item> = client
        .get_with_logical_expire("shop:", 4u32, Duration::from_secs(60), |_id| async move {
            Err::<Option<Item>, LoaderError>("still down".into())
        })
        .await
        .unwrap();
    assert_eq!(value, Some(Item::named("stale")));
}

#[tokio::test]
async fn logical_expire_skips_rebuild_when_queue_is_full() {
    let (store, client) = setup_with(CacheConfig {
        rebuild_workers: 1,
        rebuild_queue_depth: 1,
        ..CacheConfig::default()
    });
    write_expired(&store, "pa:1", &Item::named("a")).await;
    write_expired(&store, "pb:2", &Item::named("b")).await;
    write_expired(&store, "pc:3", &Item::named("c")).await;

    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    // Occupy the single worker.
    {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        client
            .get_with_logical_expire("pa:", 1u32, Duration::from_secs(60), move |_id| {
                async move {
                    started.notify_one();
                    release.notified().await;
                    Ok(None::<Item>)
                }
            })
            .await
            .unwrap();
    }
    started.notified().await;

    // Fill the queue slot.
    client
        .get_with_logical_expire("pb:", 2u32, Duration::from_secs(60), |_id| async move {
            Ok(None::<Item>)
        })
        .await
        .unwrap();
    assert!(store.get("lock:pb:2").await.unwrap().is_some());

    // Queue full: the reader is still served stale, the rebuild is skipped,
    // and the lock is released so the next reader can retrigger it.
    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = Arc::clone(&calls);
    let value = client
        .get_with_logical_expire("pc:", 3u32, Duration::from_secs(60), move |_id| {
            let calls = loader_calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None::<Item>)
            }
        })
        .await
        .unwrap();

    assert_eq!(value, Some(Item::named("c")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(store.get("lock:pc:3").await.unwrap().is_none());

    // Drain the pool.
    release.notify_one();
    let deadline = Instant::now() + Duration::from_secs(2);
    while store.get("pa:1").await.unwrap().is_some()
        || store.get("pb:2").await.unwrap().is_some()
    {
        assert!(Instant::now() < deadline, "queued rebuilds never ran");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---------------------------------------------------------------------------
// write-side primitives
// ---------------------------------------------------------------------------

#[tokio::test]
async fn warm_writes_an_envelope_the_logical_read_serves() {
    let (_store, client) = setup();

    client
        .warm("shop:", 10u32, Duration::from_secs(60), |_id| async move {
            Ok(Some(Item::named("warmed")))
        })
        .await
        .unwrap();

    let value = client
        .get_with_logical_expire("shop:", 10u32, Duration::from_secs(60), |_id| async move {
            Ok(Some(Item::named("never")))
        })
        .await
        .unwrap();
    assert_eq!(value, Some(Item::named("warmed")));
}

#[tokio::test]
async fn warm_errors_when_the_id_does_not_exist() {
    let (_store, client) = setup();

    let err = client
        .warm("shop:", 11u32, Duration::from_secs(60), |_id| async move {
            Ok(None::<Item>)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::WarmMissing { .. }));
}

#[tokio::test]
async fn invalidate_removes_the_data_key() {
    let (store, client) = setup();
    client
        .set("p:1", &Item::named("x"), Duration::from_secs(60))
        .await
        .unwrap();

    client.invalidate("p:", 1u32).await.unwrap();

    assert!(store.get("p:1").await.unwrap().is_none());
}
