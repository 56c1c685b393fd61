//! HTTP client for the file service and its signed storage URLs
//!
//! One method per wire exchange. Methods return the loose wire types from
//! `tsfiler_core::types`; callers validate them into strict shapes. Nothing
//! here retries: a non-success status surfaces as an error immediately.

use bytes::Bytes;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use tsfiler_core::config::ServiceConfig;
use tsfiler_core::types::{
    ConfirmRequest, ConfirmResponse, DirectUploadResponse, ErrorBody, LoginRequest,
    LoginResponse, ManifestResponse, NegotiateRequest, NegotiateResponse, PutMetadataRequest,
    QueryMetadataRequest,
};
use tsfiler_core::{Exchange, FileId, TsfilerError, TsfilerResult};

/// Authorization scheme the metadata endpoints expect instead of `Bearer`.
const METADATA_AUTH_SCHEME: &str = "a";

/// Client for the service API and the storage addresses it hands out.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    config: ServiceConfig,
}

impl ServiceClient {
    /// Build a client from config.
    ///
    /// If `enforce_tls` is set and the base URL is plaintext HTTP this fails;
    /// otherwise a plaintext endpoint only logs a warning.
    pub fn new(config: &ServiceConfig) -> TsfilerResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| TsfilerError::Config(format!("invalid base_url {base_url:?}: {e}")))?;

        if parsed.scheme() == "http" {
            if config.enforce_tls {
                return Err(TsfilerError::Config(format!(
                    "service endpoint uses plaintext HTTP ({base_url}), but enforce_tls is enabled"
                )));
            }
            warn!(
                endpoint = %base_url,
                "service endpoint uses plaintext HTTP: bearer tokens and key material travel unencrypted"
            );
        }
        if config.accept_invalid_certs {
            warn!(endpoint = %base_url, "TLS certificate verification is disabled");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| TsfilerError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── Exchanges ────────────────────────────────────────────────────────────

    /// `POST {login_path}` with `{email, password}`.
    pub async fn authenticate(&self, email: &str, password: &str) -> TsfilerResult<LoginResponse> {
        let req = self
            .http
            .post(self.endpoint(&self.config.login_path))
            .json(&LoginRequest { email, password });
        send_json(Exchange::Authenticate, req).await
    }

    /// `POST {upload_path}` with `{originalPath, md5}`.
    ///
    /// HTTP 409 means the service already knows this digest under this path
    /// and maps to `AlreadyExists`.
    pub async fn negotiate_upload(
        &self,
        token: &SecretString,
        original_path: &str,
        md5: &str,
    ) -> TsfilerResult<NegotiateResponse> {
        let req = self
            .http
            .post(self.endpoint(&self.config.upload_path))
            .bearer_auth(token.expose_secret())
            .json(&NegotiateRequest { original_path, md5 });

        let resp = send(Exchange::NegotiateUpload, req).await?;
        if resp.status() == StatusCode::CONFLICT {
            let reason = error_message(resp).await;
            debug!(path = original_path, md5, reason = %reason, "negotiate: conflict");
            return Err(TsfilerError::AlreadyExists {
                path: original_path.to_string(),
                digest: md5.to_string(),
            });
        }
        decode_json(Exchange::NegotiateUpload, resp).await
    }

    /// `PUT` raw ciphertext to a signed storage address. No credentials are
    /// attached: the address itself grants access.
    pub async fn put_chunk(&self, address: &Url, ciphertext: Vec<u8>) -> TsfilerResult<()> {
        let req = self
            .http
            .put(address.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(ciphertext);
        send(Exchange::PutChunk, req).await?;
        Ok(())
    }

    /// `POST {confirm_path}` with `{fileId}`.
    pub async fn confirm_upload(
        &self,
        token: &SecretString,
        file_id: &FileId,
    ) -> TsfilerResult<ConfirmResponse> {
        let req = self
            .http
            .post(self.endpoint(&self.config.confirm_path))
            .bearer_auth(token.expose_secret())
            .json(&ConfirmRequest { file_id });
        send_json(Exchange::ConfirmUpload, req).await
    }

    /// `GET {download_path}/{fileId}`.
    pub async fn fetch_manifest(
        &self,
        token: &SecretString,
        file_id: &FileId,
    ) -> TsfilerResult<ManifestResponse> {
        let mut url = Url::parse(&self.endpoint(&self.config.download_path))
            .map_err(|e| TsfilerError::Config(format!("invalid download_path: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TsfilerError::Config("download URL cannot take path segments".into()))?
            .pop_if_empty()
            .push(file_id.as_str());

        let req = self.http.get(url).bearer_auth(token.expose_secret());
        send_json(Exchange::FetchManifest, req).await
    }

    /// `GET` one chunk's ciphertext from its signed address.
    pub async fn fetch_chunk(&self, address: &Url) -> TsfilerResult<Bytes> {
        let resp = send(Exchange::FetchChunk, self.http.get(address.clone())).await?;
        resp.bytes()
            .await
            .map_err(|e| TsfilerError::transport(Exchange::FetchChunk, None, e.without_url().to_string()))
    }

    /// `POST {direct_upload_path}` as multipart `{file, filename}` with an
    /// upload token in place of a session token.
    pub async fn direct_upload(
        &self,
        upload_token: &SecretString,
        file_name: &str,
        data: Vec<u8>,
    ) -> TsfilerResult<DirectUploadResponse> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| TsfilerError::transport(Exchange::DirectUpload, None, e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("filename", file_name.to_string());

        let req = self
            .http
            .post(self.endpoint(&self.config.direct_upload_path))
            .bearer_auth(upload_token.expose_secret())
            .multipart(form);
        send_json(Exchange::DirectUpload, req).await
    }

    /// `PUT {metadata_path}` with `{metadata}`.
    pub async fn put_metadata(
        &self,
        token: &SecretString,
        metadata: &serde_json::Value,
    ) -> TsfilerResult<()> {
        let req = self
            .http
            .put(self.endpoint(&self.config.metadata_path))
            .header(reqwest::header::AUTHORIZATION, metadata_auth(token))
            .json(&PutMetadataRequest { metadata });
        send(Exchange::Metadata, req).await?;
        Ok(())
    }

    /// `POST {metadata_path}/query` with `{query, select}`.
    pub async fn query_metadata(
        &self,
        token: &SecretString,
        query: &serde_json::Value,
        select: &serde_json::Value,
    ) -> TsfilerResult<serde_json::Value> {
        let req = self
            .http
            .post(self.endpoint(&format!("{}/query", self.config.metadata_path)))
            .header(reqwest::header::AUTHORIZATION, metadata_auth(token))
            .json(&QueryMetadataRequest { query, select });
        send_json(Exchange::Metadata, req).await
    }
}

fn metadata_auth(token: &SecretString) -> String {
    format!("{METADATA_AUTH_SCHEME} {}", token.expose_secret())
}

/// Send a request, mapping connection failures and error statuses.
///
/// A 409 is passed through untouched so `negotiate_upload` can classify it.
async fn send(exchange: Exchange, req: RequestBuilder) -> TsfilerResult<Response> {
    let resp = req.send().await.map_err(|e| {
        // Signed addresses are capabilities; keep them out of error text.
        let e = e.without_url();
        let reason = if e.is_timeout() {
            format!("timed out: {e}")
        } else {
            e.to_string()
        };
        TsfilerError::transport(exchange, None, reason)
    })?;

    let status = resp.status();
    if status.is_success() || (exchange == Exchange::NegotiateUpload && status == StatusCode::CONFLICT) {
        return Ok(resp);
    }

    let message = error_message(resp).await;
    Err(status_error(exchange, status, message))
}

async fn send_json<T: DeserializeOwned>(exchange: Exchange, req: RequestBuilder) -> TsfilerResult<T> {
    let resp = send(exchange, req).await?;
    decode_json(exchange, resp).await
}

async fn decode_json<T: DeserializeOwned>(exchange: Exchange, resp: Response) -> TsfilerResult<T> {
    let body = resp
        .bytes()
        .await
        .map_err(|e| TsfilerError::transport(exchange, None, e.to_string()))?;
    serde_json::from_slice(&body)
        .map_err(|e| TsfilerError::protocol(exchange, format!("malformed JSON response: {e}")))
}

/// Prefer the service's `{error}` field; fall back to the raw body.
async fn error_message(resp: Response) -> String {
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error: Some(msg) }) => msg,
        _ => body,
    }
}

fn status_error(exchange: Exchange, status: StatusCode, message: String) -> TsfilerError {
    // Signed storage addresses carry no credentials, so a 401/403 there is a
    // storage fault, not a login problem.
    let credentialed = !matches!(exchange, Exchange::PutChunk | Exchange::FetchChunk);
    let rejected_login = exchange == Exchange::Authenticate
        && matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        );

    if rejected_login || (credentialed && status == StatusCode::UNAUTHORIZED) {
        let message = if message.is_empty() {
            status.to_string()
        } else {
            message
        };
        return TsfilerError::Authentication(format!("{exchange}: {message}"));
    }
    TsfilerError::transport(exchange, Some(status.as_u16()), message)
}
