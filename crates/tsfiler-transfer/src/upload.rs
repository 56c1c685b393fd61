//! Chunked upload session
//!
//! ```text
//! Init → Negotiate → Encrypt → PutChunk → Confirm → Completed
//!            │           │          │          │
//!            └───────────┴──────────┴──────────┴──→ Failed
//! ```
//!
//! A session uploads the whole plaintext as one chunk under the material the
//! service issues during negotiation. Confirmation is always performed: bytes
//! that reached storage without an acknowledged confirm are not a completed
//! upload.

use std::path::Path;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tsfiler_core::types::ConfirmResponse;
use tsfiler_core::{FileId, TsfilerError, TsfilerResult};
use tsfiler_crypto::{digest_hex, encrypt_chunk};

use crate::cancel::cancellable;
use crate::client::ServiceClient;
use crate::manifest::UploadTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Init,
    Negotiate,
    Encrypt,
    PutChunk,
    Confirm,
    Completed,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

/// Plaintext plus the logical path it is stored under.
///
/// The digest is computed on construction, before any network call.
#[derive(Debug)]
pub struct UploadRequest {
    plaintext: Vec<u8>,
    logical_path: String,
    digest: String,
}

impl UploadRequest {
    pub fn new(plaintext: Vec<u8>, logical_path: impl Into<String>) -> Self {
        let digest = digest_hex(&plaintext);
        Self {
            plaintext,
            logical_path: logical_path.into(),
            digest,
        }
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    pub fn logical_path(&self) -> &str {
        &self.logical_path
    }

    /// Lowercase hex MD5 of the plaintext.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Result of a confirmed upload. Never built for a failed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub file_id: FileId,
    pub encrypted_byte_count: u64,
    pub confirmed_byte_count: u64,
    pub confirmed: bool,
}

/// One upload, driven through its states by [`UploadSession::run`].
pub struct UploadSession<'a> {
    client: &'a ServiceClient,
    token: &'a SecretString,
    cancel: Option<CancellationToken>,
    state: UploadState,
}

impl<'a> UploadSession<'a> {
    pub fn new(client: &'a ServiceClient, token: &'a SecretString) -> Self {
        Self {
            client,
            token,
            cancel: None,
            state: UploadState::Init,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Run the session to a terminal state.
    ///
    /// On any error the session is left in `Failed`; `AlreadyExists` and
    /// `UnconfirmedUpload` are failures too, tagged as expected.
    pub async fn run(&mut self, request: &UploadRequest) -> TsfilerResult<UploadOutcome> {
        if self.state != UploadState::Init {
            return Err(TsfilerError::Config(format!(
                "upload session already used (state {:?})",
                self.state
            )));
        }

        match self.drive(request).await {
            Ok(outcome) => {
                self.state = UploadState::Completed;
                info!(
                    path = request.logical_path(),
                    file_id = %outcome.file_id,
                    bytes = outcome.encrypted_byte_count,
                    "upload confirmed"
                );
                Ok(outcome)
            }
            Err(e) => {
                let failed_in = self.state;
                self.state = UploadState::Failed;
                if e.is_expected() {
                    info!(path = request.logical_path(), state = ?failed_in, "upload not completed: {e}");
                } else {
                    warn!(path = request.logical_path(), state = ?failed_in, "upload failed: {e}");
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, request: &UploadRequest) -> TsfilerResult<UploadOutcome> {
        let cancel = self.cancel.as_ref();

        self.state = UploadState::Negotiate;
        debug!(path = request.logical_path(), md5 = request.digest(), "negotiating upload");
        let resp = cancellable(
            cancel,
            self.client
                .negotiate_upload(self.token, request.logical_path(), request.digest()),
        )
        .await?;
        let ticket = UploadTicket::from_wire(resp)?;

        self.state = UploadState::Encrypt;
        let ciphertext = encrypt_chunk(&ticket.material, request.plaintext())?;
        let encrypted_byte_count = ciphertext.len() as u64;
        debug!(
            file_id = %ticket.file_id,
            plaintext = request.plaintext().len(),
            ciphertext = encrypted_byte_count,
            "chunk encrypted"
        );

        self.state = UploadState::PutChunk;
        cancellable(cancel, self.client.put_chunk(&ticket.signed_address, ciphertext)).await?;

        self.state = UploadState::Confirm;
        let file_id = ticket.file_id.clone();
        drop(ticket);
        let confirmed_byte_count =
            match cancellable(cancel, self.client.confirm_upload(self.token, &file_id)).await {
                Ok(resp) => check_confirmation(&file_id, encrypted_byte_count, resp)?,
                Err(e @ (TsfilerError::Cancelled | TsfilerError::Authentication(_))) => {
                    return Err(e)
                }
                Err(e) => {
                    return Err(TsfilerError::UnconfirmedUpload {
                        file_id: file_id.to_string(),
                        reason: e.to_string(),
                    })
                }
            };

        Ok(UploadOutcome {
            file_id,
            encrypted_byte_count,
            confirmed_byte_count,
            confirmed: true,
        })
    }
}

/// Accept a confirm response only if it explicitly reports success and the
/// byte count the client sent.
fn check_confirmation(
    file_id: &FileId,
    encrypted_byte_count: u64,
    resp: ConfirmResponse,
) -> TsfilerResult<u64> {
    let unconfirmed = |reason: String| TsfilerError::UnconfirmedUpload {
        file_id: file_id.to_string(),
        reason,
    };

    if let Some(error) = resp.error {
        return Err(unconfirmed(error));
    }
    if resp.success != Some(true) {
        return Err(unconfirmed(format!("service reported success={:?}", resp.success)));
    }
    let filesize = resp
        .filesize
        .ok_or_else(|| unconfirmed("confirmation carried no filesize".into()))?;
    if filesize != encrypted_byte_count {
        return Err(unconfirmed(format!(
            "service stored {filesize} bytes, client sent {encrypted_byte_count}"
        )));
    }
    Ok(filesize)
}

/// Upload in-memory bytes under `logical_path`.
pub async fn upload_bytes(
    client: &ServiceClient,
    token: &SecretString,
    plaintext: Vec<u8>,
    logical_path: &str,
    cancel: Option<CancellationToken>,
) -> TsfilerResult<UploadOutcome> {
    let request = UploadRequest::new(plaintext, logical_path);
    let mut session = UploadSession::new(client, token);
    if let Some(cancel) = cancel {
        session = session.with_cancellation(cancel);
    }
    session.run(&request).await
}

/// Read a local file and upload it under `logical_path`.
pub async fn upload_file(
    client: &ServiceClient,
    token: &SecretString,
    local_path: &Path,
    logical_path: &str,
    cancel: Option<CancellationToken>,
) -> TsfilerResult<UploadOutcome> {
    let plaintext = tokio::fs::read(local_path).await?;
    upload_bytes(client, token, plaintext, logical_path, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirm(filesize: Option<u64>, success: Option<bool>) -> ConfirmResponse {
        ConfirmResponse {
            filesize,
            success,
            error: None,
        }
    }

    #[test]
    fn test_request_digest_computed_up_front() {
        let req = UploadRequest::new(b"hello world".to_vec(), "docs/hello.txt");
        assert_eq!(req.digest(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(req.logical_path(), "docs/hello.txt");
        assert_eq!(req.plaintext(), b"hello world");
    }

    #[test]
    fn test_confirmation_accepts_matching_size() {
        let id = FileId::new("1");
        assert_eq!(check_confirmation(&id, 16, confirm(Some(16), Some(true))).unwrap(), 16);
    }

    #[test]
    fn test_confirmation_rejects_success_false() {
        let id = FileId::new("1");
        let err = check_confirmation(&id, 16, confirm(Some(16), Some(false))).unwrap_err();
        assert!(matches!(err, TsfilerError::UnconfirmedUpload { .. }));
        assert!(err.is_expected());
    }

    #[test]
    fn test_confirmation_rejects_missing_fields() {
        let id = FileId::new("1");
        assert!(check_confirmation(&id, 16, confirm(Some(16), None)).is_err());
        assert!(check_confirmation(&id, 16, confirm(None, Some(true))).is_err());
    }

    #[test]
    fn test_confirmation_rejects_size_mismatch() {
        let id = FileId::new("4");
        let err = check_confirmation(&id, 32, confirm(Some(16), Some(true))).unwrap_err();
        assert!(
            matches!(err, TsfilerError::UnconfirmedUpload { ref file_id, ref reason } if file_id == "4" && reason.contains("16"))
        );
    }

    #[test]
    fn test_confirmation_error_body_wins() {
        let id = FileId::new("1");
        let resp = ConfirmResponse {
            filesize: Some(16),
            success: Some(true),
            error: Some("object missing".into()),
        };
        let err = check_confirmation(&id, 16, resp).unwrap_err();
        assert!(matches!(err, TsfilerError::UnconfirmedUpload { ref reason, .. } if reason == "object missing"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(UploadState::Completed.is_terminal());
        assert!(UploadState::Failed.is_terminal());
        assert!(!UploadState::PutChunk.is_terminal());
    }
}
