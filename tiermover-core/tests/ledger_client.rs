mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use support::{FakeJellyfin, played_items};
use tiermover_core::{
    EvictionError, JellyfinClient, LedgerError, MediaKind, PlaybackLedger,
    RetryPolicy,
};

const TOKEN: &str = "test-api-key";

fn client_for(server: &FakeJellyfin, token: &str) -> JellyfinClient {
    JellyfinClient::new(
        &server.base_url,
        token,
        Duration::from_secs(5),
        RetryPolicy::immediate(3),
    )
    .expect("client builds")
}

#[tokio::test]
async fn fetches_played_items_with_token_and_filters() {
    let server = FakeJellyfin::with_played(TOKEN, &["Heat", "Show S01E01"]).await;

    let items = client_for(&server, TOKEN)
        .fetch_consumed_items()
        .await
        .expect("ledger reachable");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "Heat");
    assert_eq!(items[1].kind, MediaKind::Episode);
    assert!(items.iter().all(|item| item.consumed));

    let seen = server.last_request().expect("request recorded");
    assert_eq!(seen.token.as_deref(), Some(TOKEN));
    assert_eq!(seen.query.get("IsPlayed").map(String::as_str), Some("true"));
    assert_eq!(seen.query.get("Recursive").map(String::as_str), Some("true"));
    assert_eq!(
        seen.query.get("IncludeItemTypes").map(String::as_str),
        Some("Movie,Episode")
    );
}

#[tokio::test]
async fn server_errors_are_retried_then_reported_unreachable() {
    let server = FakeJellyfin::start(
        TOKEN,
        Arc::new(|_| (StatusCode::SERVICE_UNAVAILABLE, json!({}))),
    )
    .await;

    let err = client_for(&server, TOKEN)
        .fetch_consumed_items()
        .await
        .expect_err("server keeps failing");

    assert_eq!(server.hits(), 3);
    match err {
        EvictionError::LedgerUnreachable { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(source.is_transient());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn recovers_when_a_retry_succeeds() {
    let body = played_items(&["Heat"]);
    let server = FakeJellyfin::start(
        TOKEN,
        Arc::new(move |hit| {
            if hit == 0 {
                (StatusCode::BAD_GATEWAY, json!({}))
            } else {
                (StatusCode::OK, body.clone())
            }
        }),
    )
    .await;

    let items = client_for(&server, TOKEN)
        .fetch_consumed_items()
        .await
        .expect("second attempt succeeds");

    assert_eq!(server.hits(), 2);
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn auth_failures_fail_fast() {
    let server = FakeJellyfin::start(
        TOKEN,
        Arc::new(|_| (StatusCode::UNAUTHORIZED, json!({}))),
    )
    .await;

    let err = client_for(&server, TOKEN)
        .fetch_consumed_items()
        .await
        .expect_err("token rejected");

    assert_eq!(server.hits(), 1);
    match err {
        EvictionError::Ledger(source) => assert!(source.is_unauthorized()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_body_is_not_retried() {
    let server = FakeJellyfin::start(
        TOKEN,
        Arc::new(|_| (StatusCode::OK, json!({ "Items": "nope" }))),
    )
    .await;

    let err = client_for(&server, TOKEN)
        .fetch_consumed_items()
        .await
        .expect_err("body does not decode");

    assert_eq!(server.hits(), 1);
    assert!(matches!(err, EvictionError::Ledger(LedgerError::Decode(_))));
}

#[tokio::test]
async fn body_without_items_is_an_error_not_an_empty_library() {
    let server = FakeJellyfin::start(
        TOKEN,
        Arc::new(|_| (StatusCode::OK, json!({ "items": [{ "Name": "Heat" }] }))),
    )
    .await;

    let err = client_for(&server, TOKEN)
        .fetch_consumed_items()
        .await
        .expect_err("missing Items must not read as nothing watched");

    assert_eq!(server.hits(), 1);
    assert!(matches!(err, EvictionError::Ledger(LedgerError::Decode(_))));
}

#[tokio::test]
async fn credential_check_distinguishes_bad_tokens() {
    let server = FakeJellyfin::with_played(TOKEN, &[]).await;

    client_for(&server, TOKEN)
        .verify_credentials()
        .await
        .expect("token accepted");

    let err = client_for(&server, "wrong")
        .verify_credentials()
        .await
        .expect_err("token rejected");
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn unreachable_server_is_transient() {
    let client = JellyfinClient::new(
        "http://127.0.0.1:9",
        TOKEN,
        Duration::from_secs(2),
        RetryPolicy::immediate(2),
    )
    .expect("client builds");

    let err = client
        .fetch_consumed_items()
        .await
        .expect_err("nothing listens on the discard port");

    assert!(matches!(
        err,
        EvictionError::LedgerUnreachable { attempts: 2, .. }
    ));
}
