//! Local HTTP server with scripted replies, for exercising the real API
//! clients end to end.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode, Uri},
    Router,
};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Decoded `application/x-www-form-urlencoded` body; empty otherwise.
    pub form: HashMap<String, String>,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct MockState {
    replies: Arc<HashMap<String, (StatusCode, String)>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_to(&self, path: &str) -> RecordedRequest {
        self.requests()
            .into_iter()
            .find(|r| r.path == path)
            .unwrap_or_else(|| panic!("no request to {path}"))
    }
}

fn decode_pairs(raw: &str) -> HashMap<String, String> {
    format!("/?{raw}")
        .parse::<Uri>()
        .ok()
        .and_then(|uri| Query::<HashMap<String, String>>::try_from_uri(&uri).ok())
        .map(|Query(pairs)| pairs)
        .unwrap_or_default()
}

async fn handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: path.clone(),
        query: decode_pairs(uri.query().unwrap_or_default()),
        form: decode_pairs(&String::from_utf8_lossy(&body)),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    match state.replies.get(&path) {
        Some(reply) => reply.clone(),
        None => (StatusCode::NOT_FOUND, format!("no reply scripted for {path}")),
    }
}

/// Serve `(path, status, body)` replies. Unscripted paths answer 404.
pub async fn spawn(replies: &[(&str, StatusCode, &str)]) -> MockServer {
    let state = MockState {
        replies: Arc::new(
            replies
                .iter()
                .map(|(path, status, body)| (path.to_string(), (*status, body.to_string())))
                .collect(),
        ),
        requests: Arc::default(),
    };
    let requests = state.requests.clone();

    let app = Router::new().fallback(handler).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockServer {
        base_url: format!("http://{addr}"),
        requests,
    }
}
