use super::*;
use crate::config::NotifyConfig;
use mockito::{Matcher, Server};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn dispatcher_with(url: &str, settings: DispatchSettings, notifier: AdminNotifier) -> Dispatcher {
    Dispatcher::new(
        ModelRegistry::builtin(),
        RoleStore::new(["admin-1"], ["vip-1"]),
        UpstreamClient::new(url).unwrap(),
        notifier,
        settings,
    )
}

fn dispatcher_for(url: &str) -> Dispatcher {
    dispatcher_with(url, DispatchSettings::default(), AdminNotifier::disabled())
}

async fn upstream_returning(server: &mut Server, body: serde_json::Value) -> mockito::Mock {
    server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

/// Accepts connections and never answers.
async fn silent_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(UserId, String)>>,
}

impl ReplySink for RecordingSink {
    async fn send(&self, user: &UserId, text: String) {
        self.sent.lock().push((user.clone(), text));
    }
}

#[tokio::test]
async fn delivers_with_model_header_and_records_usage() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::Json(json!({
            "prompt": "Explain Rust lifetimes",
            "model_id": "anthropic/claude-3.5-sonnet"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "response": "Lifetimes describe how long references live."}"#)
        .create_async()
        .await;

    let dispatcher = dispatcher_for(&server.url());
    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", Some("claude"), "  Explain Rust lifetimes  "))
        .await;

    mock.assert_async().await;
    assert!(reply.is_delivered());
    assert_eq!(
        reply.text,
        "Claude 3.5 Sonnet:\nLifetimes describe how long references live."
    );
    assert_eq!(reply.model.as_deref(), Some("Claude 3.5 Sonnet"));
    assert_eq!(dispatcher.usage().total(), 1);

    let snapshot = dispatcher.usage().snapshot();
    assert_eq!(snapshot.per_model.get("anthropic/claude-3.5-sonnet"), Some(&1));
    assert_eq!(snapshot.per_user.get("u1"), Some(&1));
}

#[tokio::test]
async fn default_model_header_can_be_disabled() {
    let mut server = Server::new_async().await;
    let _mock = upstream_returning(&mut server, json!({"response": "4"})).await;

    let settings = DispatchSettings {
        reply_header: false,
        ..DispatchSettings::default()
    };
    let dispatcher = dispatcher_with(&server.url(), settings, AdminNotifier::disabled());

    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", None, "2+2?"))
        .await;
    assert_eq!(reply.text, "4");

    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", Some("gpt"), "2+2?"))
        .await;
    assert_eq!(reply.text, "GPT-4o:\n4");
}

#[tokio::test]
async fn empty_prompt_never_reaches_upstream() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .expect(0)
        .create_async()
        .await;

    let dispatcher = dispatcher_for(&server.url());
    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", None, "   \n\t "))
        .await;

    mock.assert_async().await;
    assert_eq!(reply.status, DispatchStatus::Rejected);
    assert!(matches!(reply.error, Some(RelayError::EmptyInput)));
    assert_eq!(
        reply.text,
        "Please provide a question. Usage: /ask <your question>"
    );
    assert_eq!(dispatcher.usage().total(), 0);
    assert_eq!(dispatcher.limiter().tracked_users(), 0);
}

#[tokio::test]
async fn unknown_model_is_rejected_without_spending_quota() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .expect(0)
        .create_async()
        .await;

    let dispatcher = dispatcher_for(&server.url());
    let now = Instant::now();
    let reply = dispatcher
        .dispatch_at(DispatchRequest::new("u1", Some("gpt-9"), "hello"), now)
        .await;

    mock.assert_async().await;
    assert_eq!(reply.status, DispatchStatus::Rejected);
    assert!(reply.text.contains("Unknown model 'gpt-9'"));
    assert_eq!(dispatcher.limiter().window_len(&UserId::from("u1"), now), 0);
}

#[tokio::test]
async fn standard_user_is_limited_after_five_and_recovers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response": "ok"}"#)
        .expect(6)
        .create_async()
        .await;

    let dispatcher = dispatcher_for(&server.url());
    let base = Instant::now();

    for i in 0..5u64 {
        let reply = dispatcher
            .dispatch_at(
                DispatchRequest::new("u1", None, "hi"),
                base + Duration::from_secs(i * 2),
            )
            .await;
        assert!(reply.is_delivered(), "request {} should pass", i + 1);
    }

    let sixth = dispatcher
        .dispatch_at(
            DispatchRequest::new("u1", None, "hi"),
            base + Duration::from_secs(10),
        )
        .await;
    assert_eq!(sixth.status, DispatchStatus::Rejected);
    assert!(sixth.text.contains("5 requests per minute"));
    match sixth.error {
        Some(RelayError::RateLimited { quota, retry_after }) => {
            assert_eq!(quota, 5);
            assert_eq!(retry_after, Duration::from_secs(50));
        }
        other => panic!("expected rate limit, got {:?}", other),
    }

    let later = dispatcher
        .dispatch_at(
            DispatchRequest::new("u1", None, "hi"),
            base + Duration::from_secs(61),
        )
        .await;
    assert!(later.is_delivered());

    mock.assert_async().await;
    assert_eq!(dispatcher.usage().total(), 6);
}

#[tokio::test]
async fn admin_gets_higher_quota() {
    let mut server = Server::new_async().await;
    let _mock = upstream_returning(&mut server, json!({"response": "ok"})).await;

    let dispatcher = dispatcher_for(&server.url());
    let now = Instant::now();

    for _ in 0..30 {
        let reply = dispatcher
            .dispatch_at(DispatchRequest::new("admin-1", None, "hi"), now)
            .await;
        assert!(reply.is_delivered());
    }
    let over = dispatcher
        .dispatch_at(DispatchRequest::new("admin-1", None, "hi"), now)
        .await;
    assert_eq!(over.status, DispatchStatus::Rejected);
    assert!(over.text.contains("30 requests per minute"));
}

#[tokio::test]
async fn timeout_replies_once_and_records_nothing() {
    let url = silent_upstream().await;
    let settings = DispatchSettings {
        ask_timeout: Duration::from_millis(200),
        ..DispatchSettings::default()
    };
    let dispatcher = dispatcher_with(&url, settings, AdminNotifier::disabled());
    let sink = RecordingSink::default();

    let reply = dispatcher
        .handle(DispatchRequest::new("u1", None, "slow question"), &sink)
        .await;

    assert_eq!(reply.status, DispatchStatus::Failed);
    assert!(matches!(reply.error, Some(RelayError::UpstreamTimeout(_))));
    assert_eq!(dispatcher.usage().total(), 0);

    let sent = sink.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, UserId::from("u1"));
    assert_eq!(sent[0].1, "The request timed out. Please try again later.");
}

#[tokio::test]
async fn server_error_is_transport_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(500)
        .create_async()
        .await;

    let dispatcher = dispatcher_for(&server.url());
    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", None, "hi"))
        .await;

    assert_eq!(reply.status, DispatchStatus::Failed);
    assert!(reply
        .text
        .starts_with("An error occurred while contacting the AI service:"));
    assert!(reply.text.contains("500"));
    assert_eq!(dispatcher.usage().total(), 0);
}

#[tokio::test]
async fn logical_error_is_recorded_and_surfaced() {
    let mut server = Server::new_async().await;
    let _mock = upstream_returning(
        &mut server,
        json!({"success": true, "error": "model overloaded"}),
    )
    .await;

    let dispatcher = dispatcher_for(&server.url());
    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", None, "hi"))
        .await;

    assert_eq!(reply.status, DispatchStatus::Failed);
    assert_eq!(reply.text, "API Error: model overloaded");
    assert_eq!(dispatcher.usage().total(), 1);
}

#[tokio::test]
async fn unrecognized_shape_shows_raw_payload() {
    let mut server = Server::new_async().await;
    let _mock = upstream_returning(&mut server, json!({"foo": "short", "n": 3})).await;

    let dispatcher = dispatcher_for(&server.url());
    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", None, "hi"))
        .await;

    assert_eq!(reply.status, DispatchStatus::Failed);
    assert!(matches!(reply.error, Some(RelayError::UnrecognizedShape(_))));
    assert!(reply.text.starts_with("Unexpected response format"));
    assert!(reply.text.contains(r#""foo":"short""#));
    assert_eq!(dispatcher.usage().total(), 1);
}

#[tokio::test]
async fn failed_flag_with_error_text_is_delivered_as_answer() {
    let mut server = Server::new_async().await;
    let _mock = upstream_returning(
        &mut server,
        json!({"success": false, "error": "I cannot answer that."}),
    )
    .await;

    let dispatcher = dispatcher_for(&server.url());
    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", None, "hi"))
        .await;

    assert!(reply.is_delivered());
    assert_eq!(reply.text, "GPT-4:\nI cannot answer that.");
}

#[tokio::test]
async fn handle_sends_rejections_too() {
    let server = Server::new_async().await;
    let dispatcher = dispatcher_for(&server.url());
    let sink = RecordingSink::default();

    dispatcher
        .handle(DispatchRequest::new("u1", None, ""), &sink)
        .await;

    assert_eq!(sink.sent.lock().len(), 1);
}

#[tokio::test]
async fn probe_bypasses_limiter_and_recorder() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::Json(json!({
            "prompt": PROBE_PROMPT,
            "model_id": "openai/gpt-4"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response": "pong"}"#)
        .expect(10)
        .create_async()
        .await;

    let dispatcher = dispatcher_for(&server.url());
    for _ in 0..10 {
        let report = dispatcher.probe().await;
        assert!(report.ok);
        assert_eq!(report.model, "GPT-4");
        assert!(report.to_message().starts_with("AI service is online."));
    }

    mock.assert_async().await;
    assert_eq!(dispatcher.usage().total(), 0);
    assert_eq!(dispatcher.limiter().tracked_users(), 0);
}

#[tokio::test]
async fn probe_reports_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .create_async()
        .await;

    let dispatcher = dispatcher_for(&server.url());
    let report = dispatcher.probe().await;

    assert!(!report.ok);
    assert!(report.detail.contains("503"));
    assert!(report
        .to_message()
        .starts_with("AI service is not responding correctly."));
}

#[tokio::test]
async fn probe_times_out_with_status_deadline() {
    let url = silent_upstream().await;
    let settings = DispatchSettings {
        status_timeout: Duration::from_millis(150),
        ..DispatchSettings::default()
    };
    let dispatcher = dispatcher_with(&url, settings, AdminNotifier::disabled());

    let report = dispatcher.probe().await;
    assert!(!report.ok);
    assert!(report.detail.contains("timed out"));
}

#[tokio::test]
async fn failures_are_forwarded_to_admin() {
    let mut upstream = Server::new_async().await;
    let _mock = upstream
        .mock("POST", "/")
        .with_status(502)
        .create_async()
        .await;

    let mut hook = Server::new_async().await;
    let hook_mock = hook
        .mock("POST", "/hook")
        .match_body(Matcher::PartialJson(json!({"chat_id": "ops"})))
        .with_status(200)
        .create_async()
        .await;

    let notifier = AdminNotifier::from_config(&NotifyConfig {
        webhook_url: Some(format!("{}/hook", hook.url())),
        admin_chat: Some("ops".to_string()),
    });
    let dispatcher = dispatcher_with(&upstream.url(), DispatchSettings::default(), notifier);

    let reply = dispatcher
        .dispatch(DispatchRequest::new("u1", None, "hi"))
        .await;
    assert_eq!(reply.status, DispatchStatus::Failed);

    // Delivery runs on a spawned task.
    for _ in 0..50 {
        if hook_mock.matched_async().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    hook_mock.assert_async().await;
}

#[tokio::test]
async fn rejections_are_not_forwarded_to_admin() {
    let upstream = Server::new_async().await;
    let mut hook = Server::new_async().await;
    let hook_mock = hook
        .mock("POST", "/hook")
        .expect(0)
        .create_async()
        .await;

    let notifier = AdminNotifier::from_config(&NotifyConfig {
        webhook_url: Some(format!("{}/hook", hook.url())),
        admin_chat: None,
    });
    let dispatcher = dispatcher_with(&upstream.url(), DispatchSettings::default(), notifier);

    dispatcher
        .dispatch(DispatchRequest::new("u1", None, " "))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    hook_mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_from_one_user_respect_quota() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response": "ok"}"#)
        .expect(5)
        .create_async()
        .await;

    let dispatcher = Arc::new(dispatcher_for(&server.url()));
    let now = Instant::now();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .dispatch_at(DispatchRequest::new("u1", None, "hi"), now)
                    .await
            })
        })
        .collect();

    let mut delivered = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap().status {
            DispatchStatus::Delivered => delivered += 1,
            DispatchStatus::Rejected => rejected += 1,
            DispatchStatus::Failed => panic!("no request should fail"),
        }
    }

    mock.assert_async().await;
    assert_eq!(delivered, 5);
    assert_eq!(rejected, 15);
    assert_eq!(dispatcher.usage().total(), 5);
}

#[test]
fn request_defaults_to_default_model() {
    assert_eq!(DispatchRequest::new("u1", None, "x").model_key, "default");
    assert_eq!(DispatchRequest::new("u1", Some("  "), "x").model_key, "default");
    assert_eq!(DispatchRequest::new("u1", Some("claude"), "x").model_key, "claude");
}

#[tokio::test]
async fn limiter_sweep_task_drops_idle_users() {
    let server = Server::new_async().await;
    let dispatcher = Arc::new(dispatcher_for(&server.url()));

    let past = Instant::now()
        .checked_sub(Duration::from_secs(61))
        .expect("monotonic clock is older than a minute");
    assert!(dispatcher.limiter().admit(&UserId::from("idle"), past));
    assert!(dispatcher.limiter().admit(&UserId::from("active"), Instant::now()));
    assert_eq!(dispatcher.limiter().tracked_users(), 2);

    let sweeper = dispatcher.spawn_limiter_sweep(Duration::from_millis(20));
    for _ in 0..50 {
        if dispatcher.limiter().tracked_users() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sweeper.abort();

    assert_eq!(dispatcher.limiter().tracked_users(), 1);
    assert_eq!(dispatcher.limiter().window_len(&UserId::from("active"), Instant::now()), 1);
}
