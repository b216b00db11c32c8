//! In-process stand-in for a Jellyfin server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
};
use serde_json::{Value, json};
use tiermover_core::ledger::TOKEN_HEADER;
use tokio::net::TcpListener;

pub type Responder = Arc<dyn Fn(usize) -> (StatusCode, Value) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct SeenRequest {
    pub token: Option<String>,
    pub query: HashMap<String, String>,
}

#[derive(Clone)]
struct FakeState {
    hits: Arc<AtomicUsize>,
    responder: Responder,
    seen: Arc<Mutex<Option<SeenRequest>>>,
}

pub struct FakeJellyfin {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Option<SeenRequest>>>,
    server: tokio::task::JoinHandle<()>,
}

impl FakeJellyfin {
    /// Serves `/Items` and `/System/Info`, answering each `/Items` hit with
    /// `responder(hit_index)`. `/System/Info` accepts only `token`.
    pub async fn start(token: &'static str, responder: Responder) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let state = FakeState {
            hits: hits.clone(),
            responder,
            seen: seen.clone(),
        };

        let app = Router::new()
            .route("/Items", get(items))
            .route(
                "/System/Info",
                get(move |headers: HeaderMap| async move {
                    if header_token(&headers).as_deref() == Some(token) {
                        (StatusCode::OK, Json(json!({ "Version": "10.9.0" })))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({})))
                    }
                }),
            )
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake jellyfin");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake jellyfin serve");
        });

        Self {
            base_url: format!("http://{addr}"),
            hits,
            seen,
            server,
        }
    }

    /// Always answers with the given played item names.
    pub async fn with_played(token: &'static str, names: &[&str]) -> Self {
        let body = played_items(names);
        Self::start(token, Arc::new(move |_| (StatusCode::OK, body.clone())))
            .await
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl Drop for FakeJellyfin {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn played_items(names: &[&str]) -> Value {
    let items: Vec<Value> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "Id": format!("item-{i}"),
                "Name": name,
                "Type": "Episode",
                "UserData": { "Played": true }
            })
        })
        .collect();
    json!({ "Items": items, "TotalRecordCount": names.len() })
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

async fn items(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    *state.seen.lock().expect("seen lock") = Some(SeenRequest {
        token: header_token(&headers),
        query,
    });
    let (status, body) = (state.responder)(hit);
    (status, Json(body))
}
