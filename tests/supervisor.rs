use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sitewatch::monitor::{
    CheckerOptions, FetchError, HttpFetcher, MetricsSink, ProbeResult, Shutdown, SinkError,
    Supervisor, SupervisorError, SupervisorState, Target, TargetSpec,
};

struct ChannelSink {
    tx: mpsc::UnboundedSender<ProbeResult>,
}

#[async_trait]
impl MetricsSink for ChannelSink {
    async fn append(&self, result: &ProbeResult, _shutdown: &Shutdown) -> Result<(), SinkError> {
        let _ = self.tx.send(result.clone());
        Ok(())
    }
}

fn channel_sink() -> (Arc<ChannelSink>, mpsc::UnboundedReceiver<ProbeResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSink { tx }), rx)
}

fn target(url: String, interval: u64, regex: Option<&str>) -> Target {
    TargetSpec {
        url,
        interval,
        regex: regex.map(str::to_string),
    }
    .validate()
    .unwrap()
}

fn options() -> CheckerOptions {
    CheckerOptions {
        fetch_timeout: Duration::from_secs(2),
        start_jitter: Duration::ZERO,
    }
}

async fn mock_site() -> MockServer {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("status: OK"))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("status: DOWN"))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("eventually")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&mock)
        .await;
    mock
}

#[tokio::test]
async fn test_fleet_probes_every_target_and_stops_as_a_whole() {
    let mock = mock_site().await;
    let (sink, mut results) = channel_sink();
    let mut supervisor = Supervisor::new(sink, options());

    let targets = vec![
        target(format!("{}/health", mock.uri()), 60, Some("OK")),
        target(format!("{}/broken", mock.uri()), 60, Some("OK")),
        target(format!("{}/health?plain", mock.uri()), 60, None),
    ];
    assert_eq!(supervisor.start(targets).unwrap(), 3);
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert_eq!(supervisor.running_loops(), 3);

    let mut seen = Vec::new();
    for _ in 0..3 {
        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("every target should report within the fetch timeout")
            .unwrap();
        seen.push(result);
    }
    let addresses: HashSet<_> = seen.iter().map(|r| r.target_address.clone()).collect();
    assert_eq!(addresses.len(), 3);

    let health = seen
        .iter()
        .find(|r| r.target_address.ends_with("/health"))
        .unwrap();
    assert_eq!(health.status_code, Some(200));
    assert_eq!(health.pattern_matched, Some(true));

    let broken = seen
        .iter()
        .find(|r| r.target_address.ends_with("/broken"))
        .unwrap();
    assert_eq!(broken.status_code, Some(500));
    assert_eq!(broken.pattern_matched, Some(false));

    let plain = seen
        .iter()
        .find(|r| r.target_address.ends_with("?plain"))
        .unwrap();
    assert_eq!(plain.pattern_matched, None);

    // Every loop is now sleeping out a 60s interval.
    let stopping = Instant::now();
    let ticks = supervisor.stop().await;
    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert_eq!(ticks, 3);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert_eq!(supervisor.running_loops(), 0);
}

#[tokio::test]
async fn test_stop_does_not_wait_for_a_hanging_fetch() {
    let mock = mock_site().await;
    let (sink, mut results) = channel_sink();
    let mut supervisor = Supervisor::new(
        sink,
        CheckerOptions {
            fetch_timeout: Duration::from_secs(20),
            start_jitter: Duration::ZERO,
        },
    );
    supervisor
        .start(vec![target(format!("{}/slow", mock.uri()), 60, None)])
        .unwrap();

    // Let the request reach the server.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopping = Instant::now();
    assert_eq!(supervisor.stop().await, 0);
    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert!(results.try_recv().is_err());
}

#[tokio::test]
async fn test_unreachable_target_is_recorded_without_status() {
    let (sink, mut results) = channel_sink();
    let mut supervisor = Supervisor::new(sink, options());
    supervisor
        .start(vec![target("http://127.0.0.1:1/health".to_string(), 5, Some("OK"))])
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.status_code, None);
    assert_eq!(result.pattern_matched, None);
    assert!(result.latency <= Duration::from_secs(2) + Duration::from_millis(500));

    supervisor.stop().await;
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn test_empty_target_list_is_a_no_op() {
    let (sink, _results) = channel_sink();
    let mut supervisor = Supervisor::new(sink, options());

    assert_eq!(supervisor.start(Vec::new()).unwrap(), 0);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert_eq!(supervisor.stop().await, 0);

    let (sink, _results) = channel_sink();
    let ticks = Supervisor::new(sink, options())
        .run_until(Vec::new(), std::future::pending())
        .await
        .unwrap();
    assert_eq!(ticks, 0);
}

#[tokio::test]
async fn test_programmatic_trigger_ends_the_wait() {
    let mock = mock_site().await;
    let (sink, mut results) = channel_sink();
    let mut supervisor = Supervisor::new(sink, options());
    supervisor
        .start(vec![target(format!("{}/health", mock.uri()), 60, None)])
        .unwrap();
    results.recv().await.unwrap();

    let trigger = supervisor.shutdown_trigger();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
        // Repeated requests are harmless.
        trigger.trigger();
    });

    tokio::time::timeout(
        Duration::from_secs(2),
        supervisor.wait_for_stop(std::future::pending()),
    )
    .await
    .expect("trigger should end the wait");
    supervisor.stop().await;
    assert_eq!(supervisor.running_loops(), 0);
}

#[tokio::test]
async fn test_run_until_stops_when_the_stop_future_resolves() {
    let mock = mock_site().await;
    let (sink, mut results) = channel_sink();
    let supervisor = Supervisor::new(sink, options());

    let run = tokio::spawn(supervisor.run_until(
        vec![target(format!("{}/health", mock.uri()), 60, Some("OK"))],
        async {
            tokio::time::sleep(Duration::from_millis(500)).await;
        },
    ));

    let first = results.recv().await.unwrap();
    assert_eq!(first.pattern_matched, Some(true));

    let ticks = tokio::time::timeout(Duration::from_secs(3), run)
        .await
        .expect("run_until should return after the stop future")
        .unwrap()
        .unwrap();
    assert_eq!(ticks, 1);
}

#[tokio::test]
async fn test_fetcher_setup_failure_starts_nothing() {
    let (sink, mut results) = channel_sink();
    let mut supervisor = Supervisor::new(sink, options());
    let attempts = AtomicUsize::new(0);

    let targets = vec![
        target("http://example.test/a".to_string(), 10, None),
        target("http://example.test/b".to_string(), 10, None),
    ];
    let err = supervisor
        .start_with(targets, |_| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                HttpFetcher::new()
            } else {
                Err(FetchError::TimedOut(Duration::ZERO))
            }
        })
        .unwrap_err();

    assert!(matches!(err, SupervisorError::FetcherSetup { ref url, .. } if url.ends_with("/b")));
    assert_eq!(supervisor.running_loops(), 0);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(results.try_recv().is_err());
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let mock = mock_site().await;
    let (sink, _results) = channel_sink();
    let mut supervisor = Supervisor::new(sink, options());
    let health = format!("{}/health", mock.uri());

    supervisor.start(vec![target(health.clone(), 60, None)]).unwrap();
    let err = supervisor.start(vec![target(health, 60, None)]).unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::InvalidState(SupervisorState::Running)
    ));
    assert_eq!(supervisor.running_loops(), 1);
    supervisor.stop().await;
}
