use serde_json::json;
use toolbox::offline::{Credentials, HttpNetwork, Method, Network, NetworkError, Request};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_forwards_credentials_only_when_included() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let network = HttpNetwork::default();
    let target = format!("{}/api/user", server.uri());

    let anonymous = Request::get(&target)
        .unwrap()
        .with_header("Cookie", "session=abc")
        .with_header("X-Trace", "1");
    network.fetch(&anonymous).await.unwrap();

    let authenticated = anonymous.clone().with_credentials(Credentials::Include);
    network.fetch(&authenticated).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    assert!(!received[0].headers.contains_key("cookie"));
    assert!(received[0].headers.contains_key("x-trace"));
    assert_eq!(
        received[1].headers.get("cookie").unwrap().to_str().unwrap(),
        "session=abc"
    );
}

#[tokio::test]
async fn test_sends_json_body_and_collects_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/todos"))
        .and(body_json(json!({"title": "Buy milk"})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Request-Id", "42")
                .set_body_string(r#"{"id":7}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::new(Method::Post, &format!("{}/api/todos", server.uri()))
        .unwrap()
        .with_json(&json!({"title": "Buy milk"}));
    let response = HttpNetwork::default().fetch(&request).await.unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.header("x-request-id"), Some("42"));
    assert_eq!(response.text(), r#"{"id":7}"#);
}

#[tokio::test]
async fn test_error_statuses_are_responses_not_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let request = Request::get(&format!("{}/api/notes", server.uri())).unwrap();
    let response = HttpNetwork::default().fetch(&request).await.unwrap();
    assert_eq!(response.status, 503);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_unreachable_host_is_a_network_error() {
    let server = MockServer::start().await;
    let target = format!("{}/api/notes", server.uri());
    drop(server);

    let err = HttpNetwork::default()
        .fetch(&Request::get(&target).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::Request(_)));
}
