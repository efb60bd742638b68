//! Integration tests for `HttpTransport` against a local HTTP server.

mod common;

use std::time::Duration;

use fetcher_core::{
    LeaseId, PayloadLocation, RequestId, TransportErrorKind, TransportEvent, TransportEventSender,
    TransportPort,
};
use fetcher_http::{HttpTransport, HttpTransportConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use common::{Route, TestServer};

const WAIT: Duration = Duration::from_secs(5);

fn transport(dir: &std::path::Path) -> HttpTransport {
    HttpTransport::new(
        HttpTransportConfig::foreground()
            .with_download_dir(dir)
            .with_progress_interval(Duration::ZERO),
    )
    .unwrap()
}

fn request(url: Url) -> RequestId {
    RequestId::new(url, LeaseId::new(1))
}

/// Collect events until a terminal one arrives.
async fn run_to_end(rx: &mut UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for transport events")
            .expect("event stream closed");
        let terminal = matches!(
            event,
            TransportEvent::Completed { .. } | TransportEvent::Failed { .. }
        );
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}

fn dir_is_empty(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_download_streams_to_temporary_file() {
    let body = vec![7u8; 64 * 1024];
    let server = TestServer::start(vec![(
        "/big.bin",
        Route::ok(body.clone()).slow(4, Duration::from_millis(10)),
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let transport = transport(dir.path());
    let (events, mut rx) = TransportEventSender::channel();

    transport
        .start_download(request(server.url("/big.bin")), events)
        .unwrap();
    let seen = run_to_end(&mut rx).await;

    let fractions: Vec<f64> = seen
        .iter()
        .filter_map(|e| match e {
            TransportEvent::BytesProgress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert!(!fractions.is_empty());
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert!((fractions[fractions.len() - 1] - 1.0).abs() < f64::EPSILON);

    match seen.last() {
        Some(TransportEvent::Completed {
            payload: PayloadLocation::File(path),
            ..
        }) => {
            assert!(path.starts_with(dir.path()));
            assert_eq!(std::fs::read(path).unwrap(), body);
        }
        other => panic!("unexpected terminal event: {other:?}"),
    }
    assert_eq!(transport.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_error_status_is_reported() {
    let server = TestServer::start(vec![("/gone", Route::status(404))]).await;
    let dir = tempfile::tempdir().unwrap();
    let transport = transport(dir.path());
    let (events, mut rx) = TransportEventSender::channel();

    transport
        .start_download(request(server.url("/gone")), events)
        .unwrap();
    let seen = run_to_end(&mut rx).await;

    match seen.last() {
        Some(TransportEvent::Failed { error, .. }) => {
            assert_eq!(error.kind, TransportErrorKind::Http { status: 404 });
        }
        other => panic!("unexpected terminal event: {other:?}"),
    }
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_connection_is_connectivity() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let transport = transport(dir.path());
    let (events, mut rx) = TransportEventSender::channel();

    let url = Url::parse(&format!("http://127.0.0.1:{port}/x")).unwrap();
    transport.start_download(request(url), events).unwrap();
    let seen = run_to_end(&mut rx).await;

    assert!(matches!(
        seen.last(),
        Some(TransportEvent::Failed { error, .. }) if error.kind == TransportErrorKind::Connectivity
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_download_and_removes_partial_file() {
    let server = TestServer::start(vec![(
        "/slow.bin",
        Route::ok(vec![1u8; 4096]).slow(50, Duration::from_millis(50)),
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let transport = transport(dir.path());
    let (events, mut rx) = TransportEventSender::channel();

    let handle = transport
        .start_download(request(server.url("/slow.bin")), events)
        .unwrap();
    // Wait for the first bytes so the partial file exists.
    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
    assert!(matches!(first, Some(TransportEvent::BytesProgress { .. })));

    transport.cancel(&handle);
    let seen = run_to_end(&mut rx).await;

    assert!(matches!(
        seen.last(),
        Some(TransportEvent::Failed { error, .. }) if error.kind == TransportErrorKind::Cancelled
    ));
    assert!(dir_is_empty(dir.path()));
    assert_eq!(transport.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_reports_fraction_so_far() {
    let server = TestServer::start(vec![(
        "/slow.bin",
        Route::ok(vec![1u8; 4000]).slow(4, Duration::from_millis(100)),
    )])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let transport = transport(dir.path());
    let (events, mut rx) = TransportEventSender::channel();

    let handle = transport
        .start_download(request(server.url("/slow.bin")), events)
        .unwrap();
    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
    let Some(TransportEvent::BytesProgress { fraction, .. }) = first else {
        panic!("expected progress, got {first:?}");
    };

    transport.pause(&handle);
    let resumed_at = transport.resume(&handle).unwrap();
    assert!(resumed_at >= fraction);

    let seen = run_to_end(&mut rx).await;
    assert!(matches!(seen.last(), Some(TransportEvent::Completed { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upload_sends_body_and_returns_response() {
    let server = TestServer::start(vec![("/upload", Route::ok(b"{\"id\":1}".to_vec()))]).await;
    let dir = tempfile::tempdir().unwrap();
    let transport = HttpTransport::new(
        HttpTransportConfig::foreground()
            .with_download_dir(dir.path())
            .with_progress_interval(Duration::ZERO)
            .with_upload_chunk_size(4),
    )
    .unwrap();
    let (events, mut rx) = TransportEventSender::channel();

    transport
        .start_upload(
            request(server.url("/upload")),
            bytes::Bytes::from_static(b"0123456789"),
            events,
        )
        .unwrap();
    let seen = run_to_end(&mut rx).await;

    assert!(seen.iter().any(|e| matches!(
        e,
        TransportEvent::UploadProgress { fraction, .. } if *fraction > 0.0
    )));
    match seen.last() {
        Some(TransportEvent::Completed {
            payload: PayloadLocation::Memory(body),
            ..
        }) => assert_eq!(&body[..], b"{\"id\":1}"),
        other => panic!("unexpected terminal event: {other:?}"),
    }

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].body, b"0123456789");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_session_reports_drain() {
    let server = TestServer::start(vec![("/a", Route::ok(b"a".to_vec()))]).await;
    let dir = tempfile::tempdir().unwrap();
    let transport = HttpTransport::new(
        HttpTransportConfig::background().with_download_dir(dir.path()),
    )
    .unwrap();
    let (events, mut rx) = TransportEventSender::channel();

    transport
        .start_download(request(server.url("/a")), events)
        .unwrap();

    let mut drained = false;
    while let Ok(Some(event)) = tokio::time::timeout(WAIT, rx.recv()).await {
        if event == TransportEvent::BackgroundDrainCompleted {
            drained = true;
            break;
        }
    }
    assert!(drained);
}
