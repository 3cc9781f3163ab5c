use super::*;
use crate::adapter::memory::MemoryRegistry;
use crate::oci::media_types;
use crate::transfer::options::{with_copy_by_chunk, with_speed};
use crate::transfer::recording::{Level, RecordingLogger};
use std::sync::atomic::{AtomicBool, Ordering};

const MIB: u64 = 1024 * 1024;

fn payload(len: u64) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn tunables(chunk_size: u64) -> Tunables {
    Tunables {
        blob_retry_count: 3,
        chunk_retry_count: 3,
        chunk_size,
    }
}

struct Harness {
    src: MemoryRegistry,
    dst: MemoryRegistry,
    logger: Arc<RecordingLogger>,
    copier: BlobCopier,
}

fn harness(src: MemoryRegistry, dst: MemoryRegistry, tunables: Tunables, stop: StopSignal) -> Harness {
    let logger = Arc::new(RecordingLogger::new());
    let copier = BlobCopier::new(
        Arc::new(src.clone()),
        Arc::new(dst.clone()),
        tunables,
        logger.clone(),
        stop,
    );
    Harness {
        src,
        dst,
        logger,
        copier,
    }
}

fn layer(digest: &str, size: u64) -> Descriptor {
    Descriptor::new(media_types::DOCKER_LAYER, digest, size)
}

/// A stop signal raised by the destination's hook when an operation named
/// `op` starts.
fn stop_on(dst: MemoryRegistry, op: &'static str) -> (MemoryRegistry, StopSignal) {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = flag.clone();
    let dst = dst.with_hook(move |recorded| {
        if recorded.starts_with(op) {
            raised.store(true, Ordering::SeqCst);
        }
    });
    (dst, StopSignal::new(move || flag.load(Ordering::SeqCst)))
}

#[test]
fn test_cursor_starts_before_first_byte() {
    let cursor = ChunkCursor::new();
    assert_eq!(cursor.start, -1);
    assert_eq!(cursor.end, -1);
    assert!(cursor.location.is_empty());
}

#[tokio::test]
async fn test_existing_blob_is_skipped() {
    let src = MemoryRegistry::new();
    let dst = MemoryRegistry::new();
    let bytes = payload(64);
    let digest = src.put_blob("src", &bytes);
    dst.put_blob("dst", &bytes);
    let h = harness(src, dst, tunables(MIB), StopSignal::never());

    h.copier
        .copy_with_retry("src", "dst", &layer(&digest, 64), &Options::default())
        .await
        .unwrap();

    assert!(h.src.ops_named("pull_blob").is_empty());
    assert!(h.dst.ops_named("push_blob").is_empty());
    assert_eq!(h.logger.count(Level::Info, "already exists"), 1);
}

#[tokio::test]
async fn test_mountable_blob_is_mounted() {
    let src = MemoryRegistry::new();
    let dst = MemoryRegistry::new();
    let bytes = payload(64);
    let digest = src.put_blob("src", &bytes);
    dst.put_blob("library/base", &bytes);
    dst.mountable_from(&digest, "library/base");
    let h = harness(src, dst, tunables(MIB), StopSignal::never());

    h.copier
        .copy_with_retry("src", "dst", &layer(&digest, 64), &Options::default())
        .await
        .unwrap();

    assert_eq!(h.dst.ops_named("mount_blob").len(), 1);
    assert!(h.src.ops_named("pull_blob").is_empty());
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

#[tokio::test]
async fn test_monolithic_copy() {
    let src = MemoryRegistry::new();
    let bytes = payload(4096);
    let digest = src.put_blob("src", &bytes);
    let h = harness(src, MemoryRegistry::new(), tunables(MIB), StopSignal::never());

    h.copier
        .copy_with_retry("src", "dst", &layer(&digest, 4096), &Options::default())
        .await
        .unwrap();

    assert_eq!(h.dst.ops_named("push_blob"), vec![format!("push_blob dst@{digest}")]);
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

#[tokio::test]
async fn test_missing_source_blob_fails_after_retries() {
    let h = harness(
        MemoryRegistry::new(),
        MemoryRegistry::new(),
        Tunables {
            blob_retry_count: 1,
            ..tunables(MIB)
        },
        StopSignal::never(),
    );
    let digest = crate::digest::Digest::sha256_of(b"nope").to_string();

    let result = h
        .copier
        .copy_with_retry("src", "dst", &layer(&digest, 4), &Options::default())
        .await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(h.logger.count(Level::Error, "failed to pulling the blob"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_backs_off_and_recovers() {
    let src = MemoryRegistry::new();
    let dst = MemoryRegistry::new();
    let bytes = payload(128);
    let digest = src.put_blob("src", &bytes);
    dst.fail_blob_pushes(2);
    let h = harness(src, dst, tunables(MIB), StopSignal::never());

    let start = tokio::time::Instant::now();
    h.copier
        .copy_with_retry("src", "dst", &layer(&digest, 128), &Options::default())
        .await
        .unwrap();

    // 2s then 4s
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert!(start.elapsed() < Duration::from_secs(7));
    assert_eq!(h.dst.ops_named("push_blob").len(), 3);
    assert_eq!(h.logger.count(Level::Warning, "failed: Network error"), 2);
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

#[tokio::test(start_paused = true)]
async fn test_retry_returns_last_error() {
    let src = MemoryRegistry::new();
    let dst = MemoryRegistry::new();
    let digest = src.put_blob("src", &payload(128));
    dst.fail_blob_pushes(10);
    let h = harness(src, dst, tunables(MIB), StopSignal::never());

    let err = h
        .copier
        .copy_with_retry("src", "dst", &layer(&digest, 128), &Options::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ReplicaError::Network { .. }));
    assert_eq!(h.dst.ops_named("push_blob").len(), 3);
}

#[tokio::test]
async fn test_stopped_before_first_attempt() {
    let src = MemoryRegistry::new();
    let digest = src.put_blob("src", &payload(16));
    let h = harness(src, MemoryRegistry::new(), tunables(MIB), StopSignal::new(|| true));

    let err = h
        .copier
        .copy_with_retry("src", "dst", &layer(&digest, 16), &Options::default())
        .await
        .unwrap_err();

    assert!(err.is_stopped());
    assert!(h.dst.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_is_not_retried() {
    let src = MemoryRegistry::new();
    let digest = src.put_blob("src", &payload(16));
    let (dst, stop) = stop_on(MemoryRegistry::new(), "push_blob");
    dst.fail_blob_pushes(10);
    let h = harness(src, dst, tunables(MIB), stop);

    let start = tokio::time::Instant::now();
    let err = h
        .copier
        .copy_with_retry("src", "dst", &layer(&digest, 16), &Options::default())
        .await
        .unwrap_err();

    assert!(err.is_stopped());
    assert!(start.elapsed() < INITIAL_BACKOFF);
    assert_eq!(h.dst.ops_named("push_blob").len(), 1);
}

#[tokio::test]
async fn test_blob_of_exactly_chunk_size_is_monolithic() {
    let src = MemoryRegistry::new();
    let bytes = payload(1024);
    let digest = src.put_blob("src", &bytes);
    let h = harness(src, MemoryRegistry::new(), tunables(1024), StopSignal::never());

    let opts = Options::new([with_copy_by_chunk(true)]);
    h.copier
        .copy_with_retry("src", "dst", &layer(&digest, 1024), &opts)
        .await
        .unwrap();

    assert_eq!(h.dst.ops_named("push_blob").len(), 1);
    assert!(h.dst.ops_named("push_blob_chunk").is_empty());
}

#[tokio::test]
async fn test_blob_one_byte_over_chunk_size_is_chunked() {
    let src = MemoryRegistry::new();
    let bytes = payload(1025);
    let digest = src.put_blob("src", &bytes);
    let h = harness(src, MemoryRegistry::new(), tunables(1024), StopSignal::never());

    let opts = Options::new([with_copy_by_chunk(true)]);
    h.copier
        .copy_with_retry("src", "dst", &layer(&digest, 1025), &opts)
        .await
        .unwrap();

    assert!(h.dst.ops_named("push_blob").is_empty());
    assert_eq!(
        h.dst.ops_named("push_blob_chunk"),
        vec![
            format!("push_blob_chunk dst@{digest} 0-1023 "),
            format!("push_blob_chunk dst@{digest} 1024-1024 session-1"),
        ]
    );
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

fn chunk_ranges(dst: &MemoryRegistry) -> Vec<(u64, u64)> {
    dst.ops_named("push_blob_chunk")
        .iter()
        .map(|op| {
            let range = op.split(' ').nth(2).unwrap_or_default();
            let (start, end) = range.split_once('-').unwrap();
            (start.parse().unwrap(), end.parse().unwrap())
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_chunk_retry_without_progress_resends_chunk() {
    let src = MemoryRegistry::new();
    let dst = MemoryRegistry::new();
    let bytes = payload(25 * MIB);
    let digest = src.put_blob("src", &bytes);
    dst.fail_chunk_at(10 * MIB, 10 * MIB as i64 - 1);
    let h = harness(src, dst, tunables(10 * MIB), StopSignal::never());

    let mut cursor = ChunkCursor::new();
    let opts = Options::new([with_copy_by_chunk(true)]);
    h.copier
        .copy_with_cursor("src", "dst", &layer(&digest, 25 * MIB), &opts, &mut cursor)
        .await
        .unwrap();

    assert_eq!(
        chunk_ranges(&h.dst),
        vec![
            (0, 10485759),
            (10485760, 20971519),
            (10485760, 20971519),
            (20971520, 26214399),
        ]
    );
    assert_eq!(cursor.end, 25 * MIB as i64 - 1);
    assert_eq!(h.dst.blob("dst", &digest).map(|b| b.len()), Some(bytes.len()));
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

#[tokio::test(start_paused = true)]
async fn test_chunk_retry_resumes_after_accepted_bytes() {
    let src = MemoryRegistry::new();
    let dst = MemoryRegistry::new();
    let bytes = payload(25 * MIB);
    let digest = src.put_blob("src", &bytes);
    dst.fail_chunk_at(10 * MIB, (14 * MIB) as i64 - 1);
    let h = harness(src, dst, tunables(10 * MIB), StopSignal::never());

    let mut cursor = ChunkCursor::new();
    let opts = Options::new([with_copy_by_chunk(true)]);
    h.copier
        .copy_with_cursor("src", "dst", &layer(&digest, 25 * MIB), &opts, &mut cursor)
        .await
        .unwrap();

    assert_eq!(
        chunk_ranges(&h.dst),
        vec![
            (0, 10485759),
            (10485760, 20971519),
            (14680064, 25165823),
            (25165824, 26214399),
        ]
    );
    assert_eq!(cursor.end, 25 * MIB as i64 - 1);
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

#[tokio::test(start_paused = true)]
async fn test_first_chunk_partial_failure_resumes_in_same_session() {
    let src = MemoryRegistry::new();
    let dst = MemoryRegistry::new();
    let bytes = payload(25 * MIB);
    let digest = src.put_blob("src", &bytes);
    dst.fail_chunk_at(0, (4 * MIB) as i64 - 1);
    let tunables = Tunables {
        chunk_retry_count: 2,
        ..tunables(10 * MIB)
    };
    let h = harness(src, dst, tunables, StopSignal::never());

    let mut cursor = ChunkCursor::new();
    let opts = Options::new([with_copy_by_chunk(true)]);
    h.copier
        .copy_with_cursor("src", "dst", &layer(&digest, 25 * MIB), &opts, &mut cursor)
        .await
        .unwrap();

    assert_eq!(
        h.dst.ops_named("push_blob_chunk"),
        vec![
            format!("push_blob_chunk dst@{digest} 0-10485759 "),
            format!("push_blob_chunk dst@{digest} 4194304-14680063 session-1"),
            format!("push_blob_chunk dst@{digest} 14680064-25165823 session-1"),
            format!("push_blob_chunk dst@{digest} 25165824-26214399 session-1"),
        ]
    );
    assert_eq!(cursor.end, 25 * MIB as i64 - 1);
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

#[tokio::test(start_paused = true)]
async fn test_chunked_copy_with_speed_limit() {
    let src = MemoryRegistry::new();
    let bytes = payload(25 * MIB);
    let digest = src.put_blob("src", &bytes);
    let h = harness(src, MemoryRegistry::new(), tunables(10 * MIB), StopSignal::never());

    let start = tokio::time::Instant::now();
    let opts = Options::new([with_copy_by_chunk(true), with_speed(1024)]);
    h.copier
        .copy_with_retry("src", "dst", &layer(&digest, 25 * MIB), &opts)
        .await
        .unwrap();

    assert_eq!(
        chunk_ranges(&h.dst),
        vec![
            (0, 10485759),
            (10485760, 20971519),
            (20971520, 26214399),
        ]
    );
    // 25 MiB at 1 MiB/s, less one burst per chunk stream
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(22), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(23), "{elapsed:?}");
    assert_eq!(h.dst.blob("dst", &digest), Some(bytes));
}

#[tokio::test]
async fn test_stop_between_chunks_keeps_acknowledged_bytes() {
    let src = MemoryRegistry::new();
    let bytes = payload(3000);
    let digest = src.put_blob("src", &bytes);
    let (dst, stop) = stop_on(MemoryRegistry::new(), "push_blob_chunk");
    let h = harness(src, dst, tunables(1024), stop);

    let mut cursor = ChunkCursor::new();
    let opts = Options::new([with_copy_by_chunk(true)]);
    let err = h
        .copier
        .copy_with_cursor("src", "dst", &layer(&digest, 3000), &opts, &mut cursor)
        .await
        .unwrap_err();

    assert!(err.is_stopped());
    assert_eq!(chunk_ranges(&h.dst), vec![(0, 1023)]);
    assert_eq!(cursor.end, 1023);
    assert_eq!(cursor.location, "session-1");
    assert!(h.dst.blob("dst", &digest).is_none());
}
