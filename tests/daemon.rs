use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolbox::daemon::{self, Daemon, DaemonRequest, DaemonResponse};
use toolbox::db;
use toolbox::nlp::TaskParser;
use toolbox::offline::{
    ControllerMessage, HttpNetwork, MemoryCacheStorage, MessageReply, Method, OfflineConfig,
    OfflineController, OfflineQueue, Request, ResponseSource, SchedulerConfig, WorkerState,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn wait_for(socket: &Path) {
    for _ in 0..200 {
        if daemon::is_daemon_running(socket).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("daemon did not come up at {}", socket.display());
}

async fn send(socket: &Path, request: DaemonRequest) -> DaemonResponse {
    daemon::send_to_daemon(socket, &request).await.unwrap()
}

#[tokio::test]
async fn test_daemon_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>shell</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let config = OfflineConfig {
        origin: server.uri(),
        shell_manifest: vec!["/".to_string()],
        ..OfflineConfig::default()
    };
    let queue = OfflineQueue::new(db::in_memory().await.unwrap(), config.queue_lease);
    let controller = OfflineController::new(
        config,
        Arc::new(MemoryCacheStorage::new()),
        Arc::new(HttpNetwork::default()),
        queue,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("toolbox.sock");
    let scheduler = SchedulerConfig {
        sync_enabled: false,
        periodic_sync_enabled: false,
        ..SchedulerConfig::default()
    };
    let handle = tokio::spawn(
        Daemon::new(
            socket.clone(),
            Arc::new(TaskParser::default()),
            Arc::new(controller),
            scheduler,
        )
        .run(),
    );
    wait_for(&socket).await;

    match send(&socket, DaemonRequest::Health).await {
        DaemonResponse::Health { state, version, queued } => {
            assert_eq!(state, WorkerState::Activated);
            assert_eq!(version, "v1");
            assert_eq!(queued, 0);
        }
        other => panic!("unexpected: {other:?}"),
    }

    match send(&socket, DaemonRequest::Parse { input: "Buy milk #shopping".to_string() }).await {
        DaemonResponse::Parsed(task) => {
            assert_eq!(task.title, "Buy milk");
            assert_eq!(task.tags, vec!["shopping"]);
        }
        other => panic!("unexpected: {other:?}"),
    }

    let request = Request::get(&format!("{}/api/todos", server.uri())).unwrap();
    match send(&socket, DaemonRequest::Fetch { request }).await {
        DaemonResponse::Fetched(response) => {
            assert_eq!(response.status, 200);
            assert_eq!(response.source, ResponseSource::Network);
        }
        other => panic!("unexpected: {other:?}"),
    }

    let enqueue = DaemonRequest::Enqueue {
        url: "/api/todos".to_string(),
        method: Method::Post,
        data: json!({"title": "later"}),
    };
    assert!(matches!(send(&socket, enqueue).await, DaemonResponse::Queued { .. }));
    match send(&socket, DaemonRequest::Queue).await {
        DaemonResponse::QueueEntries(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].data, json!({"title": "later"}));
        }
        other => panic!("unexpected: {other:?}"),
    }

    match send(&socket, DaemonRequest::Message(ControllerMessage::GetVersion)).await {
        DaemonResponse::Reply(reply) => assert_eq!(reply, MessageReply::Version("v1".to_string())),
        other => panic!("unexpected: {other:?}"),
    }

    daemon::stop_daemon(&socket).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("daemon should stop")
        .unwrap()
        .unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn test_client_reports_missing_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("absent.sock");

    assert!(!daemon::is_daemon_running(&socket).await);
    assert!(daemon::send_to_daemon(&socket, &DaemonRequest::Health).await.is_err());
}
