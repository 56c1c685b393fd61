//! Wire contract of the file service.
//!
//! Field names are the service's JSON keys and must not change. Responses
//! are loose here (`Option` everywhere the service may omit a
//! field); `tsfiler-transfer` validates them into strict shapes once, at
//! the boundary.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Network exchanges the client performs, used to label transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Authenticate,
    NegotiateUpload,
    PutChunk,
    ConfirmUpload,
    FetchManifest,
    FetchChunk,
    DirectUpload,
    Metadata,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Exchange::Authenticate => "authenticate",
            Exchange::NegotiateUpload => "negotiate upload",
            Exchange::PutChunk => "put chunk",
            Exchange::ConfirmUpload => "confirm upload",
            Exchange::FetchManifest => "fetch manifest",
            Exchange::FetchChunk => "fetch chunk",
            Exchange::DirectUpload => "direct upload",
            Exchange::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

/// Opaque file identifier issued by the service.
///
/// The service sends it either as a JSON number or a string. The JSON kind
/// is kept and echoed back unchanged, so `"0042"` never becomes `42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId {
    text: String,
    numeric: Option<u64>,
}

impl FileId {
    /// An id the service issued as a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            text: id.into(),
            numeric: None,
        }
    }

    /// An id the service issued as a JSON number.
    pub fn number(id: u64) -> Self {
        Self {
            text: id.to_string(),
            numeric: Some(id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric.is_some()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for FileId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => FileId::number(n),
            Raw::Text(s) => FileId::new(s),
        })
    }
}

impl Serialize for FileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.numeric {
            Some(n) => serializer.serialize_u64(n),
            None => serializer.serialize_str(&self.text),
        }
    }
}

/// The only durable reference a caller keeps for a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub file_id: FileId,
}

impl FileHandle {
    pub fn new(file_id: FileId) -> Self {
        Self { file_id }
    }
}

// ── Authenticate ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: Option<String>,
    pub error: Option<String>,
}

// ── Negotiate upload ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateRequest<'a> {
    pub original_path: &'a str,
    pub md5: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub signed_url: Option<String>,
    pub file_id: Option<FileId>,
    pub aes_key_base64: Option<String>,
    pub iv_base64: Option<String>,
    pub algorithm: Option<String>,
}

// ── Confirm upload ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest<'a> {
    pub file_id: &'a FileId,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmResponse {
    pub filesize: Option<u64>,
    pub success: Option<bool>,
    pub error: Option<String>,
}

// ── Fetch manifest ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ManifestResponse {
    pub urls: Option<Vec<String>>,
    pub keys: Option<Vec<String>>,
    pub ivs: Option<Vec<String>>,
    pub algorithm: Option<String>,
}

// ── Direct upload ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadResponse {
    pub file_id: Option<FileId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of an `{error}` response, shared by every JSON exchange.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
}

// ── Metadata ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PutMetadataRequest<'a> {
    pub metadata: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct QueryMetadataRequest<'a> {
    pub query: &'a serde_json::Value,
    pub select: &'a serde_json::Value,
}
