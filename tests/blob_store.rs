//! Integration tests for the in-memory blob store
//!
//! Exercises the store through the `BlobStore` trait object the server uses.

use emogo::blob::{put_bytes, read_to_end, BlobId, BlobStore, ListOrder, MemoryBlobStore};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;

/// Deterministic, non-repeating-ish test content
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}

async fn roundtrip(store: &dyn BlobStore, data: &[u8]) -> Vec<u8> {
    let id = put_bytes(store, "roundtrip.bin", Some("application/x-test"), data, 64 * 1024)
        .await
        .unwrap();
    let mut reader = store.open(&id).await.unwrap();
    assert_eq!(reader.metadata().size, data.len() as u64);
    assert_eq!(reader.metadata().name, "roundtrip.bin");
    read_to_end(reader.as_mut(), 1024 * 1024).await.unwrap()
}

#[tokio::test]
async fn test_roundtrip_empty_small_and_large() {
    let store = MemoryBlobStore::new();

    assert!(roundtrip(&store, &[]).await.is_empty());

    let small = b"hello vlog".to_vec();
    assert_eq!(roundtrip(&store, &small).await, small);

    let large = pattern(5 * 1024 * 1024 + 17);
    assert_eq!(roundtrip(&store, &large).await, large);
}

#[tokio::test]
async fn test_identifiers_are_unique() {
    let store = MemoryBlobStore::new();
    let mut ids = HashSet::new();
    for _ in 0..200 {
        let id = put_bytes(&store, "same.mp4", None, b"x", 1).await.unwrap();
        assert!(ids.insert(id), "duplicate id {id}");
    }
    assert_eq!(store.len().await, 200);
}

#[tokio::test]
async fn test_not_found_for_every_unknown_id() {
    let store = MemoryBlobStore::new();
    put_bytes(&store, "a.mp4", None, b"a", 1).await.unwrap();

    let unassigned = BlobId::new().to_string();
    for raw in ["", "random text", "../../etc/passwd", unassigned.as_str()] {
        let err = store.open_str(raw).await.err().unwrap();
        assert!(err.is_not_found(), "{raw:?} gave {err:?}");
    }
    assert_eq!(store.open_readers(), 0);
}

#[tokio::test]
async fn test_listing_limit_and_order() {
    let store = MemoryBlobStore::new();
    for i in 0..150 {
        put_bytes(&store, &format!("v{i}.mp4"), None, b"x", 1)
            .await
            .unwrap();
    }

    let listed: Vec<_> = store
        .list(ListOrder::UploadedDesc, Some(100))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(listed.len(), 100);
    assert_eq!(listed[0].name, "v149.mp4");
    assert_eq!(listed[99].name, "v50.mp4");
    for pair in listed.windows(2) {
        assert!(pair[0].uploaded_at > pair[1].uploaded_at);
    }
}

#[tokio::test]
async fn test_scan_is_lazy_and_complete() {
    let store = MemoryBlobStore::new();
    for i in 0..10 {
        put_bytes(&store, &format!("s{i}"), None, b"x", 1).await.unwrap();
    }

    let names: HashSet<String> = store
        .scan()
        .await
        .unwrap()
        .map_ok(|m| m.name)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(names.len(), 10);

    // Taking one item and dropping the rest is fine
    let first = store.scan().await.unwrap().next().await;
    assert!(first.is_some());
}

#[tokio::test]
async fn test_concurrent_readers_and_writer() {
    let store = Arc::new(MemoryBlobStore::new());
    let data = pattern(256 * 1024);
    let id = put_bytes(store.as_ref(), "shared.mp4", None, &data, 4096)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let expected = data.clone();
        tasks.push(tokio::spawn(async move {
            let mut reader = store.open(&id).await.unwrap();
            let got = read_to_end(reader.as_mut(), 1000).await.unwrap();
            assert_eq!(got, expected);
        }));
    }
    let writer_store = Arc::clone(&store);
    tasks.push(tokio::spawn(async move {
        put_bytes(writer_store.as_ref(), "other.mp4", None, b"zz", 1)
            .await
            .unwrap();
    }));

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(store.len().await, 2);
    assert_eq!(store.open_readers(), 0);
}
