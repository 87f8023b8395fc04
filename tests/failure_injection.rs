//! Failure injection tests: the resilient client against a misbehaving
//! HTTP backend on loopback.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use inbox_resilience::api::{ApiError, AuthToken, Credentials, HttpTransport};
use inbox_resilience::client::{DegradedCause, Origin, ResilienceClient};
use inbox_resilience::config::ClientConfig;

mod common;

use common::{message_json, RecordedRequest};

fn test_config(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.api.base_url = format!("http://{}", addr);
    config.api.request_timeout_secs = 5;
    // Keep backoff short; the schedule itself is covered by unit tests.
    config.retries.base_delay_ms = 10;
    config
}

fn client_for(config: &ClientConfig) -> ResilienceClient<HttpTransport> {
    ResilienceClient::new(HttpTransport::new(&config.api).unwrap(), config)
}

fn token() -> AuthToken {
    AuthToken::new("secret-token")
}

#[tokio::test]
async fn test_retry_until_backend_recovers() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move |_req| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, r#"{"message":"overloaded"}"#.to_string())
            } else {
                (200, format!("[{}]", message_json(1, "alice", "hello")))
            }
        }
    })
    .await;

    let client = client_for(&test_config(addr));
    let result = client.get_messages("alice", &token()).await.unwrap();

    assert!(!result.is_degraded());
    assert_eq!(result.data.len(), 1);
    assert_eq!(result.data[0].content, "hello");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_null_message_list_is_empty() {
    let addr = common::start_programmable_backend(|_req| async { (200, "null".to_string()) }).await;

    let client = client_for(&test_config(addr));
    let result = client.get_messages("alice", &token()).await.unwrap();

    assert!(result.data.is_empty());
    assert_eq!(result.origin, Origin::Live);
}

#[tokio::test]
async fn test_client_error_without_message_is_synthesized() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move |_req| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (404, String::new())
        }
    })
    .await;

    let client = client_for(&test_config(addr));
    let err = client.get_messages("ghost", &token()).await.unwrap_err();

    match err {
        ApiError::Client { status, ref message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "API error: 404");
        }
        other => panic!("expected client error, got {:?}", other),
    }
    assert_eq!(call_count.load(Ordering::SeqCst), 1, "4xx must not be retried");
}

#[tokio::test]
async fn test_server_error_surfaces_after_retries() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move |_req| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (500, r#"{"message":"database down"}"#.to_string())
        }
    })
    .await;

    let client = client_for(&test_config(addr));
    let err = client.mark_messages_as_read("alice", &[1], &token()).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().starts_with("Server error (500): database down."));
    assert_eq!(call_count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_cached_messages_served_when_backend_fails() {
    let healthy = Arc::new(AtomicU32::new(1));
    let h = healthy.clone();
    let addr = common::start_programmable_backend(move |_req| {
        let h = h.clone();
        async move {
            if h.load(Ordering::SeqCst) == 1 {
                (200, format!("[{}]", message_json(1, "alice", "cached")))
            } else {
                (503, String::new())
            }
        }
    })
    .await;

    let client = client_for(&test_config(addr));
    let live = client.get_messages("alice", &token()).await.unwrap();
    assert!(!live.is_degraded());

    healthy.store(0, Ordering::SeqCst);
    let degraded = client.get_messages("alice", &token()).await.unwrap();

    assert!(degraded.is_degraded());
    assert_eq!(degraded.cause(), Some(DegradedCause::RetriesExhausted));
    assert!(!degraded.is_stale());
    assert_eq!(degraded.data, live.data);
}

#[tokio::test]
async fn test_breaker_opening_mid_chain_short_circuits() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move |req| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            if req.path == "/messages/bob" {
                (200, format!("[{}]", message_json(5, "bob", "fine")))
            } else {
                (502, String::new())
            }
        }
    })
    .await;

    let mut config = test_config(addr);
    config.circuit_breaker.failure_threshold = 2;
    let client = client_for(&config);

    let err = client.get_messages("alice", &token()).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(call_count.load(Ordering::SeqCst), 2);

    // alice's open breaker does not short-circuit bob.
    let result = client.get_messages("bob", &token()).await.unwrap();
    assert!(!result.is_degraded());
    assert_eq!(result.data[0].content, "fine");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    let err = client.get_messages("alice", &token()).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unread_count_defaults_to_zero_when_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&test_config(addr));
    let result = client.get_unread_count("alice", &token()).await.unwrap();

    assert_eq!(result.data.count, 0);
    assert_eq!(
        result.origin,
        Origin::Default {
            cause: DegradedCause::RetriesExhausted
        }
    );
}

#[tokio::test]
async fn test_requests_carry_paths_bodies_and_token() {
    let seen: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let addr = common::start_programmable_backend(move |req| {
        let s = s.clone();
        async move {
            let response = match (req.method.as_str(), req.path.as_str()) {
                ("POST", "/register") => r#"{"id":1,"username":"alice"}"#.to_string(),
                ("POST", "/login") => r#"{"token":"jwt-123"}"#.to_string(),
                ("POST", "/messages/alice/read") => r#"{"success":true}"#.to_string(),
                ("GET", "/messages/alice/unread") => r#"{"count":4}"#.to_string(),
                ("POST", "/messages/alice") => message_json(9, "alice", "hey"),
                _ => return (404, String::new()),
            };
            s.lock().unwrap().push(req);
            (200, response)
        }
    })
    .await;

    let client = client_for(&test_config(addr));
    let credentials = Credentials::new("alice", "hunter2");

    let user = client.register(&credentials).await.unwrap();
    assert_eq!(user.username, "alice");

    let token = client.login(&credentials).await.unwrap();
    assert_eq!(token.as_str(), "jwt-123");

    let sent = client.send_message("alice", "hey").await.unwrap();
    assert_eq!(sent.id, 9);

    let marked = client.mark_messages_as_read("alice", &[1, 2], &token).await.unwrap();
    assert!(marked.success);

    let unread = client.get_unread_count("alice", &token).await.unwrap();
    assert_eq!(unread.data.count, 4);
    assert!(!unread.is_degraded());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert!(seen[0].body.contains(r#""password":"hunter2""#));
    assert_eq!(seen[2].body, r#"{"content":"hey"}"#);
    assert_eq!(seen[3].body, r#"{"message_ids":[1,2]}"#);
    assert_eq!(seen[3].authorization.as_deref(), Some("Bearer jwt-123"));
    assert_eq!(seen[4].authorization.as_deref(), Some("Bearer jwt-123"));
}
