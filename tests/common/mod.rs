//! In-process fake of the Gemini endpoints used by the integration tests.
//!
//! Routing is done by hand in a fallback handler because the provider paths
//! put verbs after a colon (`models/x:generateContent`).

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const STORE: &str = "fileSearchStores/test-store";

/// One request as seen by the fake.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct FakeProvider {
    pub base: Mutex<String>,
    pub requests: Mutex<Vec<Recorded>>,
    /// Text of every generateContent reply.
    pub reply_text: Mutex<String>,
    /// When set, generateContent answers with this status and body.
    pub generate_error: Mutex<Option<(u16, String)>>,
    /// Status checks before an operation or file leaves the pending state.
    pub polls_until_done: u32,
    /// Display names whose indexing fails remotely.
    pub failing: Vec<String>,
    polls: Mutex<HashMap<String, u32>>,
}

impl FakeProvider {
    pub fn new(polls_until_done: u32, failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            base: Mutex::new(String::new()),
            requests: Mutex::new(Vec::new()),
            reply_text: Mutex::new("ANSWER: Vrai\nREASONING: l'actif égale le passif".into()),
            generate_error: Mutex::new(None),
            polls_until_done,
            failing: failing.iter().map(|s| s.to_string()).collect(),
            polls: Mutex::new(HashMap::new()),
        })
    }

    pub fn requests_to(&self, suffix: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path.ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn bump(&self, key: &str) -> u32 {
        let mut polls = self.polls.lock().unwrap();
        let n = polls.entry(key.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

/// Serve the fake on a free port; returns its base URL.
pub async fn start_fake_provider(fake: Arc<FakeProvider>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *fake.base.lock().unwrap() = base.clone();

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .fallback(dispatch)
        .with_state(fake);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

pub fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn dispatch(
    State(fake): State<Arc<FakeProvider>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    fake.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: path.clone(),
        headers: headers.clone(),
        body: body.clone(),
    });

    if headers.get("x-goog-api-key").is_none() && !path.starts_with("/upload-session/") {
        return (StatusCode::UNAUTHORIZED, "missing key").into_response();
    }

    let base = fake.base.lock().unwrap().clone();
    let store_upload = format!("/upload/v1beta/{}:uploadToFileSearchStore", STORE);
    let store_import = format!("/v1beta/{}:importFile", STORE);
    let store_ops = format!("/v1beta/{}/operations/", STORE);

    match (method.as_str(), path.as_str()) {
        ("POST", p) if p.starts_with("/v1beta/models/") && p.ends_with(":generateContent") => {
            if let Some((status, body)) = fake.generate_error.lock().unwrap().clone() {
                let status = StatusCode::from_u16(status).unwrap();
                return (status, body).into_response();
            }
            let text = fake.reply_text.lock().unwrap().clone();
            Json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
            }))
            .into_response()
        }
        ("POST", "/v1beta/fileSearchStores") => Json(json!({ "name": STORE })).into_response(),
        ("POST", p) if p == store_upload || p == "/upload/v1beta/files" => {
            if headers.get("x-goog-upload-protocol").and_then(|v| v.to_str().ok())
                != Some("resumable")
                || headers.get("x-goog-upload-command").and_then(|v| v.to_str().ok())
                    != Some("start")
            {
                return (StatusCode::BAD_REQUEST, "expected resumable start").into_response();
            }
            let meta: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let (kind, name) = if p == store_upload {
                ("store", meta["displayName"].as_str().unwrap_or("").to_string())
            } else {
                ("files", meta["file"]["displayName"].as_str().unwrap_or("").to_string())
            };
            let session = format!("{}/upload-session/{}/{}", base, kind, name);
            ([("x-goog-upload-url", session)], Json(json!({}))).into_response()
        }
        ("POST", p) if p.starts_with("/upload-session/") => {
            if headers.get("x-goog-upload-command").and_then(|v| v.to_str().ok())
                != Some("upload, finalize")
                || headers.get("x-goog-upload-offset").and_then(|v| v.to_str().ok()) != Some("0")
            {
                return (StatusCode::BAD_REQUEST, "expected finalize").into_response();
            }
            let rest = p.trim_start_matches("/upload-session/");
            match rest.split_once('/') {
                Some(("store", name)) => Json(json!({
                    "name": format!("{}/operations/{}", STORE, name),
                    "done": false
                }))
                .into_response(),
                Some(("files", name)) => Json(json!({
                    "file": {"name": format!("files/{}", name), "state": "PROCESSING"}
                }))
                .into_response(),
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }
        ("GET", p) if p.starts_with(&store_ops) => {
            let name = p.trim_start_matches(&store_ops).to_string();
            let n = fake.bump(&name);
            let op_name = p.trim_start_matches("/v1beta/");
            if n < fake.polls_until_done {
                return Json(json!({ "name": op_name })).into_response();
            }
            if fake.failing.contains(&name) {
                return Json(json!({
                    "name": op_name,
                    "done": true,
                    "error": {"code": 3, "message": "document could not be parsed"}
                }))
                .into_response();
            }
            Json(json!({
                "name": op_name,
                "done": true,
                "response": {"documentName": format!("{}/documents/{}", STORE, name)}
            }))
            .into_response()
        }
        ("GET", p) if p.starts_with("/v1beta/files/") => {
            let name = p.trim_start_matches("/v1beta/files/").to_string();
            let n = fake.bump(&name);
            let state = if n < fake.polls_until_done {
                "PROCESSING"
            } else if fake.failing.contains(&name) {
                "FAILED"
            } else {
                "ACTIVE"
            };
            Json(json!({ "name": format!("files/{}", name), "state": state })).into_response()
        }
        ("POST", p) if p == store_import => {
            let req: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let file = req["fileName"].as_str().unwrap_or("").to_string();
            Json(json!({
                "name": format!("{}/operations/import", STORE),
                "done": true,
                "response": {"documentName": format!("{}/documents/{}", STORE, file.trim_start_matches("files/"))}
            }))
            .into_response()
        }
        _ => (StatusCode::NOT_FOUND, format!("no route for {}", path)).into_response(),
    }
}
