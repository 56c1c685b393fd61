//! In-process mock of the file service and its signed storage.
//!
//! Routes mirror the default `ServiceConfig` paths. Signed addresses point at
//! `/storage/{object}` on the same server and need no credentials.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use tsfiler_core::config::ServiceConfig;
use tsfiler_crypto::{Algorithm, ChunkMaterial};
use tsfiler_transfer::{Credentials, ServiceClient};

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse";
pub const SESSION_TOKEN: &str = "session-token-1";
pub const UPLOAD_TOKEN: &str = "upload-token-1";

struct StoredFile {
    path: String,
    md5: String,
    object: String,
    key_b64: String,
    iv_b64: String,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    files: HashMap<u64, StoredFile>,
    known: HashSet<(String, String)>,
    objects: HashMap<String, Vec<u8>>,
    manifests: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
    metadata: Vec<Value>,
    direct: Vec<(String, Vec<u8>)>,
    confirm_override: Option<Value>,
    confirm_status: Option<StatusCode>,
    put_status: Option<StatusCode>,
    token_expired: bool,
    put_attempts: usize,
    puts: usize,
    confirms: usize,
    chunk_gets: usize,
    logins: usize,
}

#[derive(Clone)]
pub struct MockService {
    inner: Arc<Mutex<Inner>>,
    pub base_url: String,
}

impl MockService {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mock = MockService {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                ..Default::default()
            })),
            base_url: format!("http://{addr}"),
        };

        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/upload", post(negotiate))
            .route("/upload/confirm", post(confirm))
            .route("/upload/direct", post(direct_upload))
            .route("/download/{file_id}", get(manifest))
            .route("/storage/{object}", put(put_object).get(get_object))
            .route("/metadata", put(put_metadata))
            .route("/metadata/query", post(query_metadata))
            .with_state(mock.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        mock
    }

    pub fn client(&self) -> ServiceClient {
        let config = ServiceConfig {
            base_url: self.base_url.clone(),
            timeout_secs: 10,
            ..Default::default()
        };
        ServiceClient::new(&config).unwrap()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(EMAIL, PASSWORD.to_string().into())
    }

    pub fn storage_url(&self, object: &str) -> String {
        format!("{}/storage/{object}", self.base_url)
    }

    /// Place ciphertext at `/storage/{object}` directly.
    pub fn put_object(&self, object: &str, bytes: Vec<u8>) {
        self.inner.lock().unwrap().objects.insert(object.into(), bytes);
    }

    pub fn object(&self, object: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().objects.get(object).cloned()
    }

    /// Serve `body` verbatim for `GET /download/{file_id}`.
    pub fn set_manifest(&self, file_id: &str, body: Value) {
        self.inner.lock().unwrap().manifests.insert(file_id.into(), body);
    }

    pub fn delay_object(&self, object: &str, delay: Duration) {
        self.inner.lock().unwrap().delays.insert(object.into(), delay);
    }

    /// Answer every confirm with `body` instead of the real stored size.
    pub fn override_confirm(&self, body: Value) {
        self.inner.lock().unwrap().confirm_override = Some(body);
    }

    /// Reject every chunk PUT to signed storage with `status`.
    pub fn fail_puts(&self, status: StatusCode) {
        self.inner.lock().unwrap().put_status = Some(status);
    }

    /// Answer every confirm with `status` and an `{error}` body.
    pub fn fail_confirms(&self, status: StatusCode) {
        self.inner.lock().unwrap().confirm_status = Some(status);
    }

    /// Make every bearer-authenticated endpoint return 401.
    pub fn expire_tokens(&self) {
        self.inner.lock().unwrap().token_expired = true;
    }

    /// Object name backing a stored file id.
    pub fn object_for(&self, file_id: &str) -> Option<String> {
        let id: u64 = file_id.parse().ok()?;
        self.inner.lock().unwrap().files.get(&id).map(|f| f.object.clone())
    }

    pub fn stored_paths(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut paths: Vec<_> = inner.files.values().map(|f| f.path.clone()).collect();
        paths.sort();
        paths
    }

    pub fn puts(&self) -> usize {
        self.inner.lock().unwrap().puts
    }

    /// PUT requests received, including rejected ones.
    pub fn put_attempts(&self) -> usize {
        self.inner.lock().unwrap().put_attempts
    }

    pub fn confirms(&self) -> usize {
        self.inner.lock().unwrap().confirms
    }

    pub fn chunk_gets(&self) -> usize {
        self.inner.lock().unwrap().chunk_gets
    }

    pub fn logins(&self) -> usize {
        self.inner.lock().unwrap().logins
    }

    pub fn metadata(&self) -> Vec<Value> {
        self.inner.lock().unwrap().metadata.clone()
    }

    pub fn direct_uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().unwrap().direct.clone()
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn bearer_ok(mock: &MockService, headers: &HeaderMap, expected: &str) -> bool {
    if mock.inner.lock().unwrap().token_expired {
        return false;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {expected}"))
}

async fn login(State(mock): State<MockService>, Json(body): Json<Value>) -> Response {
    let mut inner = mock.inner.lock().unwrap();
    inner.logins += 1;
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        Json(json!({ "token": SESSION_TOKEN })).into_response()
    } else {
        error(StatusCode::UNAUTHORIZED, "invalid email or password")
    }
}

async fn negotiate(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !bearer_ok(&mock, &headers, SESSION_TOKEN) {
        return error(StatusCode::UNAUTHORIZED, "token expired");
    }
    let (Some(path), Some(md5)) = (body["originalPath"].as_str(), body["md5"].as_str()) else {
        return error(StatusCode::BAD_REQUEST, "originalPath and md5 required");
    };

    let mut inner = mock.inner.lock().unwrap();
    if inner.known.contains(&(path.to_string(), md5.to_string())) {
        return error(StatusCode::CONFLICT, "file already exists");
    }

    let id = inner.next_id;
    inner.next_id += 1;
    let object = format!("obj-{id}");
    let (key_b64, iv_b64) = ChunkMaterial::generate(Algorithm::Aes256Cbc).to_base64();
    inner.files.insert(
        id,
        StoredFile {
            path: path.into(),
            md5: md5.into(),
            object: object.clone(),
            key_b64: key_b64.clone(),
            iv_b64: iv_b64.clone(),
        },
    );

    Json(json!({
        "signedUrl": mock.storage_url(&object),
        "fileId": id,
        "aesKeyBase64": key_b64,
        "ivBase64": iv_b64,
        "algorithm": "aes-256-cbc",
    }))
    .into_response()
}

async fn put_object(
    State(mock): State<MockService>,
    UrlPath(object): UrlPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if content_type != Some("application/octet-stream") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }
    let mut inner = mock.inner.lock().unwrap();
    inner.put_attempts += 1;
    if let Some(status) = inner.put_status {
        return error(status, "storage unavailable");
    }
    inner.puts += 1;
    inner.objects.insert(object, body.to_vec());
    StatusCode::OK.into_response()
}

async fn get_object(State(mock): State<MockService>, UrlPath(object): UrlPath<String>) -> Response {
    let delay = {
        let mut inner = mock.inner.lock().unwrap();
        inner.chunk_gets += 1;
        inner.delays.get(&object).copied()
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    match mock.inner.lock().unwrap().objects.get(&object) {
        Some(bytes) => bytes.clone().into_response(),
        None => error(StatusCode::NOT_FOUND, "no such object"),
    }
}

async fn confirm(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.inner.lock().unwrap().confirms += 1;
    if !bearer_ok(&mock, &headers, SESSION_TOKEN) {
        return error(StatusCode::UNAUTHORIZED, "token expired");
    }
    if let Some(status) = mock.inner.lock().unwrap().confirm_status {
        return error(status, "confirm rejected");
    }
    let Some(id) = body["fileId"].as_u64() else {
        return error(StatusCode::BAD_REQUEST, "fileId must be a number");
    };

    let mut inner = mock.inner.lock().unwrap();
    if let Some(forced) = inner.confirm_override.clone() {
        return Json(forced).into_response();
    }
    let Some(file) = inner.files.get(&id) else {
        return error(StatusCode::NOT_FOUND, "unknown fileId");
    };
    let Some(size) = inner.objects.get(&file.object).map(|o| o.len()) else {
        return Json(json!({ "success": false, "error": "object not found" })).into_response();
    };
    let key = (file.path.clone(), file.md5.clone());
    inner.known.insert(key);
    Json(json!({ "filesize": size, "success": true })).into_response()
}

async fn manifest(
    State(mock): State<MockService>,
    UrlPath(file_id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    if !bearer_ok(&mock, &headers, SESSION_TOKEN) {
        return error(StatusCode::UNAUTHORIZED, "token expired");
    }
    let inner = mock.inner.lock().unwrap();
    if let Some(body) = inner.manifests.get(&file_id) {
        return Json(body.clone()).into_response();
    }
    let file = file_id.parse::<u64>().ok().and_then(|id| inner.files.get(&id));
    match file {
        Some(f) => Json(json!({
            "urls": [mock.storage_url(&f.object)],
            "keys": [f.key_b64],
            "ivs": [f.iv_b64],
            "algorithm": "aes-256-cbc",
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, "unknown fileId"),
    }
}

async fn direct_upload(
    State(mock): State<MockService>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !bearer_ok(&mock, &headers, UPLOAD_TOKEN) {
        return error(StatusCode::UNAUTHORIZED, "invalid upload token");
    }

    let mut file = None;
    let mut filename = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => file = field.bytes().await.ok().map(|b| b.to_vec()),
            "filename" => filename = field.text().await.ok(),
            _ => {}
        }
    }
    let (Some(file), Some(filename)) = (file, filename) else {
        return error(StatusCode::BAD_REQUEST, "file and filename required");
    };

    let mut inner = mock.inner.lock().unwrap();
    let id = inner.next_id;
    inner.next_id += 1;
    inner.direct.push((filename.clone(), file));
    Json(json!({ "fileId": id, "filename": filename, "status": "stored" })).into_response()
}

fn metadata_auth_ok(mock: &MockService, headers: &HeaderMap) -> bool {
    if mock.inner.lock().unwrap().token_expired {
        return false;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("a {SESSION_TOKEN}"))
}

async fn put_metadata(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !metadata_auth_ok(&mock, &headers) {
        return error(StatusCode::UNAUTHORIZED, "bad metadata authorization");
    }
    match body.get("metadata") {
        Some(m) => {
            mock.inner.lock().unwrap().metadata.push(m.clone());
            Json(json!({ "ok": true })).into_response()
        }
        None => error(StatusCode::BAD_REQUEST, "metadata required"),
    }
}

async fn query_metadata(
    State(mock): State<MockService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !metadata_auth_ok(&mock, &headers) {
        return error(StatusCode::UNAUTHORIZED, "bad metadata authorization");
    }
    let query = body["query"].as_object().cloned().unwrap_or_default();
    let inner = mock.inner.lock().unwrap();
    let results: Vec<Value> = inner
        .metadata
        .iter()
        .filter(|m| query.iter().all(|(k, v)| m.get(k) == Some(v)))
        .cloned()
        .collect();
    Json(json!({ "results": results, "select": body["select"] })).into_response()
}
