use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use filetail_core::{
    stream_file, ChannelSink, ChannelWatcher, FileStreamer, SessionEnd, SessionNotice,
    StreamConfig, StreamError, WatchError,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

const MIB: u64 = 1024 * 1024;

fn append(path: &Path, bytes: &[u8]) {
    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for append");
    f.write_all(bytes).expect("append");
}

async fn next_frame(frames: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
    timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("frame within timeout")
        .expect("sink still open")
}

#[tokio::test]
async fn small_file_snapshot_then_delta() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("a.log");
    fs::write(&path, b"0123456789").expect("write");

    let (watcher, trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(16);
    let handle = FileStreamer::with_watcher(StreamConfig::default().with_threshold(1024), watcher)
        .start(&path, sink)
        .await
        .expect("start");

    assert_eq!(next_frame(&mut frames).await, b"0123456789");

    append(&path, b"XY");
    assert!(trigger.notify_write(&path));
    assert_eq!(next_frame(&mut frames).await, b"XY");

    drop(trigger);
    let report = handle.await.expect("report");
    assert_eq!(report.end, SessionEnd::WatchClosed);
    assert!(!report.large_file_mode);
    assert_eq!(report.viewed_offset, 12);
    assert_eq!(report.stats.frames_sent, 2);
    assert_eq!(report.stats.bytes_sent, 12);
}

#[tokio::test]
async fn sequential_appends_arrive_in_order_without_gaps() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("app.log");
    fs::write(&path, b"boot\n").expect("write");

    let (watcher, trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(16);
    let handle = FileStreamer::with_watcher(StreamConfig::default(), watcher)
        .start(&path, sink)
        .await
        .expect("start");
    assert_eq!(next_frame(&mut frames).await, b"boot\n");

    let appends: [&[u8]; 4] = [b"one\n", b"two two\n", b"3\n", b"the fourth line\n"];
    let mut delivered = Vec::new();
    for chunk in appends {
        append(&path, chunk);
        trigger.notify_write(&path);
        delivered.extend(next_frame(&mut frames).await);
    }

    assert_eq!(delivered, appends.concat());
    drop(trigger);
    let report = handle.await.expect("report");
    assert_eq!(report.viewed_offset, 5 + appends.concat().len() as u64);
}

#[tokio::test]
async fn eof_notification_sends_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("quiet.log");
    fs::write(&path, b"steady").expect("write");

    let (watcher, trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(16);
    let handle = FileStreamer::with_watcher(StreamConfig::default(), watcher)
        .start(&path, sink)
        .await
        .expect("start");
    next_frame(&mut frames).await;

    trigger.notify_write(&path);
    trigger.notify_write(&path);
    drop(trigger);

    let report = handle.await.expect("report");
    assert_eq!(report.viewed_offset, 6);
    assert_eq!(report.stats.frames_sent, 1);
    assert!(frames.recv().await.is_none(), "no delta frame after EOF reads");
}

#[tokio::test]
async fn large_append_needs_one_notification_per_chunk() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("burst.log");
    fs::write(&path, b"").expect("write");

    let (watcher, trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(16);
    let _handle = FileStreamer::with_watcher(StreamConfig::default().with_chunk_size(8), watcher)
        .start(&path, sink)
        .await
        .expect("start");
    assert!(next_frame(&mut frames).await.is_empty());

    append(&path, b"0123456789abcdefghij");
    trigger.notify_write(&path);
    assert_eq!(next_frame(&mut frames).await, b"01234567");
    trigger.notify_write(&path);
    assert_eq!(next_frame(&mut frames).await, b"89abcdef");
    trigger.notify_write(&path);
    assert_eq!(next_frame(&mut frames).await, b"ghij");
}

#[tokio::test]
async fn large_file_resends_original_window() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("big.log");
    let threshold = 5 * MIB;
    let content: Vec<u8> = (0..6 * MIB).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &content).expect("write");
    let window = content[(6 * MIB - threshold) as usize..].to_vec();

    let (watcher, trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(4);
    let handle = FileStreamer::with_watcher(StreamConfig::default().with_threshold(threshold), watcher)
        .start(&path, sink)
        .await
        .expect("start");

    let initial = next_frame(&mut frames).await;
    assert_eq!(initial.len() as u64, threshold);
    assert_eq!(initial, window);

    append(&path, &[b'z'; 100]);
    trigger.notify_write(&path);
    let first = next_frame(&mut frames).await;
    assert_eq!(first.len() as u64, threshold);
    assert_eq!(first, window, "window stays at size_at_open - threshold");

    trigger.notify_write(&path);
    assert_eq!(next_frame(&mut frames).await, window);

    drop(trigger);
    let report = handle.await.expect("report");
    assert!(report.large_file_mode);
    assert_eq!(report.stats.frames_sent, 3);
}

#[tokio::test]
async fn closing_either_channel_ends_session_quietly() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("a.log");
    fs::write(&path, b"abc").expect("write");

    for close_events in [true, false] {
        let (watcher, mut trigger) = ChannelWatcher::new();
        let (sink, mut frames) = ChannelSink::channel(4);
        let handle = FileStreamer::with_watcher(StreamConfig::default(), watcher)
            .start(&path, sink)
            .await
            .expect("start");
        next_frame(&mut frames).await;

        if close_events {
            trigger.close_events();
        } else {
            trigger.close_errors();
        }

        let report = timeout(Duration::from_secs(5), handle)
            .await
            .expect("session ends")
            .expect("report");
        assert_eq!(report.end, SessionEnd::WatchClosed);
        assert!(frames.recv().await.is_none());
    }
}

#[tokio::test]
async fn transient_read_failure_is_dropped_and_retried() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("rotating.log");
    fs::write(&path, b"12345").expect("write");
    let path_for_notice = path.clone();

    let (watcher, trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(8);
    let (notice_tx, mut notices) = mpsc::unbounded_channel();
    let handle = FileStreamer::with_watcher(StreamConfig::default(), watcher)
        .notices(notice_tx)
        .start(&path, sink)
        .await
        .expect("start");
    next_frame(&mut frames).await;

    fs::remove_file(&path).expect("remove");
    trigger.notify_write(&path);
    let notice = timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("notice")
        .expect("notice channel open");
    assert!(matches!(notice, SessionNotice::TransientIo { .. }));

    fs::write(&path, b"12345678").expect("recreate");
    trigger.notify_write(&path);
    assert_eq!(next_frame(&mut frames).await, b"678");
    let notice = timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("notice")
        .expect("notice channel open");
    assert!(
        matches!(notice, SessionNotice::DeltaSent { bytes: 3, ref path } if path == &path_for_notice),
        "unexpected notice: {notice:?}"
    );

    assert!(trigger.send_error(WatchError::Other("queue overflow".into())));
    loop {
        let notice = timeout(Duration::from_secs(5), notices.recv())
            .await
            .expect("notice")
            .expect("notice channel open");
        if matches!(notice, SessionNotice::WatcherError { .. }) {
            break;
        }
    }
    drop(trigger);
    let report = handle.await.expect("report");
    assert_eq!(report.stats.events_dropped, 1);
    assert_eq!(report.stats.watcher_errors, 1);
    assert_eq!(report.viewed_offset, 8);
}

#[tokio::test]
async fn oversized_chunk_setting_streams_appends() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("a.log");
    fs::write(&path, b"head").expect("write");

    let config = StreamConfig::default().with_chunk_size(1 << 46);
    config.validate().expect("large chunk size is accepted");

    let (watcher, trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(8);
    let handle = FileStreamer::with_watcher(config, watcher)
        .start(&path, sink)
        .await
        .expect("start");
    assert_eq!(next_frame(&mut frames).await, b"head");

    append(&path, b"-tail");
    trigger.notify_write(&path);
    assert_eq!(next_frame(&mut frames).await, b"-tail");

    drop(trigger);
    let report = handle.await.expect("report");
    assert_eq!(report.viewed_offset, 9);
    assert_eq!(report.stats.events_dropped, 0);
}

#[tokio::test]
async fn missing_file_fails_before_any_frame() {
    let dir = TempDir::new().expect("tempdir");
    let (watcher, _trigger) = ChannelWatcher::new();
    let (sink, mut frames) = ChannelSink::channel(4);

    let err = FileStreamer::with_watcher(StreamConfig::default(), watcher)
        .start(dir.path().join("absent.log"), sink)
        .await
        .expect_err("missing file");
    assert!(matches!(err, StreamError::NotFound { .. }));
    assert!(frames.recv().await.is_none());
}

#[tokio::test]
async fn initial_send_failure_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("a.log");
    fs::write(&path, b"abc").expect("write");

    let (watcher, _trigger) = ChannelWatcher::new();
    let (sink, frames) = ChannelSink::channel(4);
    drop(frames);

    let err = FileStreamer::with_watcher(StreamConfig::default(), watcher)
        .start(&path, sink)
        .await
        .expect_err("closed sink");
    assert!(matches!(err, StreamError::InitialSend(_)));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("a.log");
    fs::write(&path, b"abc").expect("write");

    let (sink, _frames) = ChannelSink::channel(4);
    let err = stream_file(&path, sink, StreamConfig::default().with_chunk_size(0))
        .await
        .expect_err("zero chunk size");
    assert!(matches!(err, StreamError::Config(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn native_watcher_streams_appends() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("native.log");
    fs::write(&path, b"start\n").expect("write");

    let (sink, mut frames) = ChannelSink::channel(16);
    let mut handle = stream_file(&path, sink, StreamConfig::default())
        .await
        .expect("start");
    assert_eq!(next_frame(&mut frames).await, b"start\n");

    append(&path, b"more\n");
    assert_eq!(next_frame(&mut frames).await, b"more\n");

    handle.cancel();
    let report = handle.await.expect("report");
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.viewed_offset, 11);
}
