//! Batch engine: fail-fast and tolerant fan-out.

mod common;

use kestrel_client::{HashKeyData, KestrelClient, KestrelError, SetItem};

use common::{MockCluster, TABLE_NAME};

fn set_items(n: usize) -> Vec<SetItem> {
    (0..n)
        .map(|i| SetItem {
            hash_key: format!("bh{i}").into_bytes(),
            sort_key: b"s".to_vec(),
            value: format!("bv{i}").into_bytes(),
            ttl_seconds: 0,
        })
        .collect()
}

#[tokio::test]
async fn test_batch_set_then_batch_get_positional() {
    let cluster = MockCluster::start(8, 3).await;
    let client = KestrelClient::new(cluster.config()).unwrap();
    let table = client.open_table(TABLE_NAME).await.unwrap();

    let items = set_items(10);
    table.batch_set(&items).await.unwrap();

    let keys: Vec<(Vec<u8>, Vec<u8>)> = items
        .iter()
        .map(|item| (item.hash_key.clone(), item.sort_key.clone()))
        .collect();
    let values = table.batch_get(&keys).await.unwrap();
    assert_eq!(values.len(), items.len());
    for (i, value) in values.iter().enumerate() {
        assert_eq!(value.as_deref(), Some(format!("bv{i}").as_bytes()));
    }

    table.batch_del(&keys).await.unwrap();
    let values = table.batch_get(&keys).await.unwrap();
    assert!(values.iter().all(|v| v.is_none()));
}

#[tokio::test]
async fn test_tolerant_batch_reports_positional_errors() {
    let cluster = MockCluster::start(8, 2).await;
    let client = KestrelClient::new(cluster.config()).unwrap();
    let table = client.open_table(TABLE_NAME).await.unwrap();

    table.set(b"ok1", b"s", b"v1").await.unwrap();
    table.set(b"ok3", b"s", b"v3").await.unwrap();

    // Middle key is invalid client-side: oversize hashKey.
    let keys = vec![
        (b"ok1".to_vec(), b"s".to_vec()),
        (vec![0u8; 0xFFFF], b"s".to_vec()),
        (b"ok3".to_vec(), b"s".to_vec()),
    ];
    let (results, failures) = table.try_batch_get(&keys).await;
    assert_eq!(failures, 1);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().as_deref(), Some(&b"v1"[..]));
    assert!(matches!(
        results[1].as_ref().unwrap_err(),
        KestrelError::InvalidArgument(_)
    ));
    assert_eq!(results[2].as_ref().unwrap().as_deref(), Some(&b"v3"[..]));
}

#[tokio::test]
async fn test_fail_fast_batch_propagates_first_error() {
    let cluster = MockCluster::start(4, 2).await;
    let client = KestrelClient::new(cluster.config()).unwrap();
    let table = client.open_table(TABLE_NAME).await.unwrap();

    let keys = vec![
        (b"a".to_vec(), b"s".to_vec()),
        (vec![0u8; 0xFFFF], b"s".to_vec()),
        (b"c".to_vec(), b"s".to_vec()),
    ];
    let err = table.batch_get(&keys).await.unwrap_err();
    assert!(matches!(err, KestrelError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_empty_batches_are_noops() {
    let cluster = MockCluster::start(4, 1).await;
    let client = KestrelClient::new(cluster.config()).unwrap();
    let table = client.open_table(TABLE_NAME).await.unwrap();

    assert!(table.batch_get(&[]).await.unwrap().is_empty());
    table.batch_set(&[]).await.unwrap();
    let (results, failures) = table.try_batch_del(&[]).await;
    assert!(results.is_empty());
    assert_eq!(failures, 0);
}

#[tokio::test]
async fn test_batch_multi_ops() {
    let cluster = MockCluster::start(8, 3).await;
    let client = KestrelClient::new(cluster.config()).unwrap();
    let table = client.open_table(TABLE_NAME).await.unwrap();

    let items = vec![
        HashKeyData {
            hash_key: b"m1".to_vec(),
            kvs: vec![
                (b"a".to_vec(), b"1a".to_vec()),
                (b"b".to_vec(), b"1b".to_vec()),
            ],
        },
        HashKeyData {
            hash_key: b"m2".to_vec(),
            kvs: vec![(b"a".to_vec(), b"2a".to_vec())],
        },
    ];
    table.batch_multi_set(&items, 0).await.unwrap();

    let fetched = table
        .batch_multi_get(&[
            (b"m1".to_vec(), vec![]),
            (b"m2".to_vec(), vec![b"a".to_vec()]),
        ])
        .await
        .unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].hash_key, b"m1".to_vec());
    assert_eq!(fetched[0].kvs.len(), 2);
    assert_eq!(fetched[1].kvs, vec![(b"a".to_vec(), b"2a".to_vec())]);

    // Tolerant siblings over the same data: rewrite, then re-read.
    let (set_results, set_failures) = table.try_batch_multi_set(&items, 0).await;
    assert_eq!(set_failures, 0);
    assert!(set_results.iter().all(|r| r.is_ok()));

    let (get_results, get_failures) = table
        .try_batch_multi_get(&[
            (b"m1".to_vec(), vec![b"b".to_vec()]),
            (b"m2".to_vec(), vec![]),
        ])
        .await;
    assert_eq!(get_failures, 0);
    let fetched: Vec<HashKeyData> = get_results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(fetched[0].kvs, vec![(b"b".to_vec(), b"1b".to_vec())]);
    assert_eq!(fetched[1].kvs, vec![(b"a".to_vec(), b"2a".to_vec())]);

    // Fail-fast delete clears m1; the tolerant flavor reports m2's count.
    table.batch_multi_del(&[(b"m1".to_vec(), vec![])]).await.unwrap();
    let (results, failures) = table.try_batch_multi_del(&[(b"m2".to_vec(), vec![])]).await;
    assert_eq!(failures, 0);
    let counts: Vec<i64> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(counts, vec![1]);

    assert_eq!(table.sortkey_count(b"m1").await.unwrap(), 0);
    assert_eq!(table.sortkey_count(b"m2").await.unwrap(), 0);
}

#[tokio::test]
async fn test_tolerant_batch_set_counts_failures() {
    let cluster = MockCluster::start(8, 2).await;
    let client = KestrelClient::new(cluster.config()).unwrap();
    let table = client.open_table(TABLE_NAME).await.unwrap();

    let items = vec![
        SetItem {
            hash_key: b"ts1".to_vec(),
            sort_key: b"s".to_vec(),
            value: b"v1".to_vec(),
            ttl_seconds: 0,
        },
        // Oversize hashKey fails client-side; the rest still land.
        SetItem {
            hash_key: vec![0u8; 0xFFFF],
            sort_key: b"s".to_vec(),
            value: b"v2".to_vec(),
            ttl_seconds: 0,
        },
        SetItem {
            hash_key: b"ts3".to_vec(),
            sort_key: b"s".to_vec(),
            value: b"v3".to_vec(),
            ttl_seconds: 0,
        },
    ];
    let (results, failures) = table.try_batch_set(&items).await;
    assert_eq!(failures, 1);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1].as_ref().unwrap_err(),
        KestrelError::InvalidArgument(_)
    ));
    assert!(results[2].is_ok());

    assert_eq!(table.get(b"ts1", b"s").await.unwrap(), Some(b"v1".to_vec()));
    assert_eq!(table.get(b"ts3", b"s").await.unwrap(), Some(b"v3".to_vec()));
}

#[tokio::test]
async fn test_batch_survives_injected_routing_error() {
    let cluster = MockCluster::start(8, 3).await;
    let client = KestrelClient::new(cluster.config()).unwrap();
    let table = client.open_table(TABLE_NAME).await.unwrap();

    let items = set_items(6);
    table.batch_set(&items).await.unwrap();

    // One item's partition answers a routing error once mid-batch; the
    // executor absorbs it and the whole batch still succeeds.
    cluster.inject_replica_error(
        cluster.partition_of(&items[2].hash_key, &items[2].sort_key),
        kestrel_proto::types::ERR_INVALID_STATE,
    );
    let keys: Vec<(Vec<u8>, Vec<u8>)> = items
        .iter()
        .map(|item| (item.hash_key.clone(), item.sort_key.clone()))
        .collect();
    let values = table.batch_get(&keys).await.unwrap();
    assert!(values.iter().all(|v| v.is_some()));
}
