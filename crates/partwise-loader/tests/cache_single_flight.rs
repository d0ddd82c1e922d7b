// SPDX-License-Identifier: Apache-2.0

use partwise_loader::{DatasetCache, DatasetLoader, FakeStore};
use partwise_model::{DatasetRequest, ValidationError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn raw_rows(
    _headers: &csv::StringRecord,
    row: &csv::StringRecord,
) -> Result<Vec<String>, ValidationError> {
    Ok(row.iter().map(str::to_string).collect())
}

fn request(path: &str) -> DatasetRequest {
    DatasetRequest::new(path).expect("request")
}

#[tokio::test]
async fn concurrent_requests_for_one_key_share_a_single_fetch_sequence() {
    let store = Arc::new(FakeStore::default());
    store.put("data.csv", "id\n1\n2\n").await;
    store.delay("data.csv", Duration::from_millis(60)).await;

    let cache = DatasetCache::new(DatasetLoader::new(store.clone()));
    let req = request("data.csv");
    let (first, second) = tokio::join!(
        cache.get_or_load(&req, &raw_rows),
        cache.get_or_load(&req, &raw_rows),
    );

    let first = first.expect("first");
    let second = second.expect("second");
    assert_eq!(first, second);
    assert_eq!(store.fetch_calls.load(Ordering::Relaxed), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn suffixed_requests_get_independent_entries_and_fetches() {
    let store = Arc::new(FakeStore::default());
    store.put("data.csv", "id,count\n1,10\n").await;

    let cache = DatasetCache::new(DatasetLoader::new(store.clone()));
    let plain = request("data.csv");
    let variant = request("data.csv").with_cache_key_suffix("counts");

    let ids = cache
        .get_or_load(&plain, &|_h: &csv::StringRecord,
                               r: &csv::StringRecord|
         -> Result<String, ValidationError> {
            Ok(r.get(0).unwrap_or_default().to_string())
        })
        .await
        .expect("ids");
    let counts = cache
        .get_or_load(&variant, &|_h: &csv::StringRecord,
                                 r: &csv::StringRecord|
         -> Result<String, ValidationError> {
            Ok(r.get(1).unwrap_or_default().to_string())
        })
        .await
        .expect("counts");

    assert_eq!(*ids, vec!["1".to_string()]);
    assert_eq!(*counts, vec!["10".to_string()]);
    assert_eq!(store.fetch_calls.load(Ordering::Relaxed), 2);
    assert_eq!(
        cache.cached_keys_debug(),
        vec!["data.csv".to_string(), "data.csv::counts".to_string()]
    );
}

#[tokio::test]
async fn resolved_keys_are_served_without_new_network_activity() {
    let store = Arc::new(FakeStore::default());
    store.put("data.csv", "id\n1\n").await;

    let cache = DatasetCache::new(DatasetLoader::new(store.clone()));
    let req = request("data.csv");

    let first = cache.get_or_load(&req, &raw_rows).await.expect("first");
    let calls_after_first = store.fetch_calls.load(Ordering::Relaxed);
    let second = cache.get_or_load(&req, &raw_rows).await.expect("second");

    assert_eq!(first, second);
    assert_eq!(store.fetch_calls.load(Ordering::Relaxed), calls_after_first);
}

#[tokio::test]
async fn failed_loads_stay_failed_until_invalidated() {
    let store = Arc::new(FakeStore::default());
    let cache = DatasetCache::new(DatasetLoader::new(store.clone()));
    let req = request("data.csv");

    cache
        .get_or_load(&req, &raw_rows)
        .await
        .expect_err("first load fails");
    let calls_after_failure = store.fetch_calls.load(Ordering::Relaxed);

    // The file appearing later does not heal the poisoned key.
    store.put("data.csv", "id\n1\n").await;
    cache
        .get_or_load(&req, &raw_rows)
        .await
        .expect_err("failure is cached");
    assert_eq!(store.fetch_calls.load(Ordering::Relaxed), calls_after_failure);

    assert!(cache.invalidate(&req.cache_key()));
    let rows = cache.get_or_load(&req, &raw_rows).await.expect("retry");
    assert_eq!(*rows, vec![vec!["1".to_string()]]);
}

#[tokio::test]
async fn invalidating_an_unknown_key_is_a_no_op() {
    let store = Arc::new(FakeStore::default());
    let cache: DatasetCache<Vec<String>> = DatasetCache::new(DatasetLoader::new(store));
    assert!(!cache.invalidate(&request("ghost.csv").cache_key()));
    assert!(cache.is_empty());
}
