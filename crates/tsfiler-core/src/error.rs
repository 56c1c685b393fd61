use thiserror::Error;

use crate::types::Exchange;

pub type TsfilerResult<T> = Result<T, TsfilerError>;

#[derive(Debug, Error)]
pub enum TsfilerError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The service already holds this digest under this path. Expected;
    /// the caller can retry under a new logical path.
    #[error("{path} already exists on the service (md5 {digest})")]
    AlreadyExists { path: String, digest: String },

    #[error("manifest for file {file_id} is invalid: {reason}")]
    Manifest { file_id: String, reason: String },

    #[error("unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("invalid {kind} length for {algorithm}: expected {expected} bytes, got {actual}")]
    KeyMaterial {
        kind: &'static str,
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid base64 {kind}: {reason}")]
    Encoding { kind: &'static str, reason: String },

    #[error("integrity check failed{}: {reason}", fmt_chunk(.chunk))]
    Integrity { chunk: Option<usize>, reason: String },

    #[error("{exchange} failed{}: {message}", fmt_status(.status))]
    Transport {
        exchange: Exchange,
        status: Option<u16>,
        message: String,
    },

    /// Bytes reached storage but the service did not acknowledge them.
    #[error("upload of file {file_id} was not confirmed: {reason}")]
    UnconfirmedUpload { file_id: String, reason: String },

    #[error("protocol violation in {exchange}: {reason}")]
    Protocol { exchange: Exchange, reason: String },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TsfilerError {
    /// True for outcomes the service reports as part of normal operation.
    /// They still fail the session.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            TsfilerError::AlreadyExists { .. } | TsfilerError::UnconfirmedUpload { .. }
        )
    }

    /// Attach a chunk index to an integrity failure raised by the codec.
    pub fn at_chunk(self, index: usize) -> Self {
        match self {
            TsfilerError::Integrity { reason, .. } => TsfilerError::Integrity {
                chunk: Some(index),
                reason,
            },
            other => other,
        }
    }

    pub fn transport(exchange: Exchange, status: Option<u16>, message: impl Into<String>) -> Self {
        TsfilerError::Transport {
            exchange,
            status,
            message: message.into(),
        }
    }

    pub fn protocol(exchange: Exchange, reason: impl Into<String>) -> Self {
        TsfilerError::Protocol {
            exchange,
            reason: reason.into(),
        }
    }
}

fn fmt_chunk(chunk: &Option<usize>) -> String {
    chunk.map(|i| format!(" in chunk {i}")).unwrap_or_default()
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" with HTTP {s}")).unwrap_or_default()
}
