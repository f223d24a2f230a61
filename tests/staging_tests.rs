//! Integration tests for upload staging under concurrency

use image_classifier_node::TempArtifactStore;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_stages_never_collide() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(TempArtifactStore::new(dir.path()));

    let handles: Vec<_> = (0..200)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let payload = format!("image payload {}", i).into_bytes();
                // Every upload claims the same client filename
                store.stage(&payload, Some("upload.png")).await
            })
        })
        .collect();

    let mut staged = Vec::new();
    for handle in handles {
        staged.push(handle.await.unwrap().expect("stage should succeed"));
    }

    let paths: HashSet<_> = staged.iter().map(|s| s.path().to_path_buf()).collect();
    assert_eq!(paths.len(), 200);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 200);

    // Each file holds its own payload
    for s in &staged {
        let content = std::fs::read_to_string(s.path()).unwrap();
        assert!(content.starts_with("image payload "));
        assert_eq!(content.len() as u64, s.len());
    }

    drop(staged);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_release_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let store = TempArtifactStore::new(dir.path());

    for _ in 0..10 {
        let staged = store.stage(b"bytes", Some("x.jpeg")).await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        store.release(staged);
        assert!(!path.exists());
    }
}

#[tokio::test]
async fn test_release_after_external_removal_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let store = TempArtifactStore::new(dir.path());

    let staged = store.stage(b"bytes", Some("x.png")).await.unwrap();
    std::fs::remove_file(staged.path()).unwrap();

    // Logged and counted, never panics
    store.release(staged);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
