//! Integration tests for batch downloads through the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bulkget_core::download::{
    BodyStream, DownloadEngine, DownloadError, DownloadRequest, FailurePolicy, FetchRequest,
    HttpClient, Transport,
};
use bulkget_core::{RequestOptions, Settings};
use bytes::Bytes;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Transport that serves a body after a delay and tracks peak concurrency.
struct GaugedTransport {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl GaugedTransport {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for GaugedTransport {
    async fn get(&self, request: FetchRequest<'_>) -> Result<BodyStream, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if request.url.contains("fail") {
            return Err(DownloadError::http_status(request.url, 500));
        }
        let chunk: Result<Bytes, DownloadError> = Ok(Bytes::from(request.url.to_string()));
        Ok(Box::pin(futures_util::stream::iter(vec![chunk])))
    }
}

fn requests_in(dir: &TempDir, urls: &[&str]) -> Vec<DownloadRequest> {
    let settings = Settings {
        output_dir: Some(dir.path().to_path_buf()),
        ..Settings::default()
    };
    settings.requests_for(urls.iter().copied(), &RequestOptions::default())
}

#[tokio::test]
async fn test_engine_joins_every_request() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(GaugedTransport::new(Duration::from_millis(5)));
    let engine = DownloadEngine::new(4, transport.clone()).unwrap();

    let urls: Vec<String> = (0..12).map(|i| format!("https://example.com/f{i}.bin")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let report = engine.run_all(requests_in(&temp_dir, &url_refs)).await;

    assert_eq!(report.total(), 12);
    assert_eq!(report.completed(), 12);
    assert!(report.is_success());
    for (outcome, url) in report.outcomes().iter().zip(&urls) {
        assert_eq!(&outcome.url, url);
    }
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 12);
}

#[tokio::test]
async fn test_engine_respects_concurrency_limit() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(GaugedTransport::new(Duration::from_millis(20)));
    let engine = DownloadEngine::new(2, transport.clone()).unwrap();

    let urls: Vec<String> = (0..8).map(|i| format!("https://example.com/c{i}.bin")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let report = engine.run_all(requests_in(&temp_dir, &url_refs)).await;

    assert!(report.is_success());
    assert!(transport.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_engine_collect_all_keeps_going_after_failure() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(GaugedTransport::new(Duration::from_millis(1)));
    let engine = DownloadEngine::new(1, transport.clone())
        .unwrap()
        .with_retry_delay(Duration::from_millis(1));

    let report = engine
        .run_all(requests_in(
            &temp_dir,
            &[
                "https://example.com/fail.bin",
                "https://example.com/ok1.bin",
                "https://example.com/ok2.bin",
            ],
        ))
        .await;

    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.cancelled(), 0);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert!(matches!(
        report.first_failure().unwrap().result,
        Err(DownloadError::HttpStatus { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_engine_fail_fast_cancels_waiting_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(GaugedTransport::new(Duration::from_millis(10)));
    let engine = DownloadEngine::new(1, transport.clone())
        .unwrap()
        .with_failure_policy(FailurePolicy::FailFast);

    let urls: Vec<String> = std::iter::once("https://example.com/fail.bin".to_string())
        .chain((0..6).map(|i| format!("https://example.com/w{i}.bin")))
        .collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let report = engine.run_all(requests_in(&temp_dir, &url_refs)).await;

    assert_eq!(report.total(), 7);
    assert_eq!(report.failed(), 1);
    assert!(report.cancelled() >= 1, "siblings should be cancelled");
    assert_eq!(
        report.completed() + report.failed() + report.cancelled(),
        7
    );
    assert!(matches!(
        report.into_result(),
        Err(DownloadError::HttpStatus { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_engine_zero_retries_single_attempt() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down.bin"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(2, Arc::new(HttpClient::new().unwrap())).unwrap();

    let url = format!("{}/down.bin", mock_server.uri());
    let report = engine.run_all(requests_in(&temp_dir, &[url.as_str()])).await;

    assert!(matches!(
        report.outcomes()[0].result,
        Err(DownloadError::HttpStatus { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_engine_same_last_segment_collides() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(1, Arc::new(HttpClient::new().unwrap())).unwrap();

    let first = format!("{}/a/data.bin", mock_server.uri());
    let second = format!("{}/b/data.bin", mock_server.uri());
    let report = engine
        .run_all(requests_in(&temp_dir, &[first.as_str(), second.as_str()]))
        .await;

    assert!(report.outcomes()[0].result.is_ok());
    assert!(matches!(
        report.outcomes()[1].result,
        Err(DownloadError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_engine_same_last_segment_with_always_new() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let engine = DownloadEngine::new(1, Arc::new(HttpClient::new().unwrap())).unwrap();

    let settings = Settings {
        output_dir: Some(temp_dir.path().to_path_buf()),
        always_create_new: true,
        ..Settings::default()
    };
    let requests = settings.requests_for(
        [
            format!("{}/a/data.bin", mock_server.uri()),
            format!("{}/b/data.bin", mock_server.uri()),
        ],
        &RequestOptions::default(),
    );
    let downloads = engine.run_all(requests).await.into_result().unwrap();

    assert_eq!(downloads[0].path, temp_dir.path().join("data.bin"));
    assert_eq!(downloads[1].path, temp_dir.path().join("data_2.bin"));
}

#[tokio::test]
async fn test_engine_concurrent_same_name_never_overwrites() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(GaugedTransport::new(Duration::from_millis(20)));
    let engine = DownloadEngine::new(10, transport.clone()).unwrap();

    let urls = ["https://a.example/x/data.bin", "https://b.example/y/data.bin"];
    let report = engine.run_all(requests_in(&temp_dir, &urls)).await;

    assert_eq!(transport.peak.load(Ordering::SeqCst), 2, "transfers should overlap");
    assert_eq!(report.completed(), 1);
    assert_eq!(report.failed(), 1);
    let winner = report
        .outcomes()
        .iter()
        .find_map(|outcome| outcome.result.as_ref().ok())
        .unwrap();
    assert!(report.outcomes().iter().any(|outcome| matches!(
        outcome.result,
        Err(DownloadError::AlreadyExists { .. })
    )));
    assert_eq!(winner.path, temp_dir.path().join("data.bin"));
    assert_eq!(
        std::fs::read_to_string(&winner.path).unwrap(),
        winner.url,
        "the file must hold the body of the request that reported it"
    );
}

#[tokio::test]
async fn test_engine_concurrent_same_name_with_always_new_keeps_both() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(GaugedTransport::new(Duration::from_millis(20)));
    let engine = DownloadEngine::new(10, transport.clone()).unwrap();

    let settings = Settings {
        output_dir: Some(temp_dir.path().to_path_buf()),
        always_create_new: true,
        ..Settings::default()
    };
    let requests = settings.requests_for(
        ["https://a.example/x/data.bin", "https://b.example/y/data.bin"],
        &RequestOptions::default(),
    );
    let downloads = engine.run_all(requests).await.into_result().unwrap();

    let mut paths: Vec<_> = downloads.iter().map(|d| d.path.clone()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            temp_dir.path().join("data.bin"),
            temp_dir.path().join("data_2.bin")
        ]
    );
    for download in &downloads {
        assert_eq!(std::fs::read_to_string(&download.path).unwrap(), download.url);
    }
}
