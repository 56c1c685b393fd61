//! Direct-token upload: `Init → Send → Completed | Failed`
//!
//! A pre-authorized single-shot upload. The caller holds an upload token
//! rather than a session; the file goes out as an opaque multipart payload
//! and the service handles storage and encryption on its side.

use std::path::Path;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tsfiler_core::{Exchange, FileId, TsfilerError, TsfilerResult};

use crate::cancel::cancellable;
use crate::client::ServiceClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectUploadState {
    Init,
    Send,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DirectUploadOutcome {
    pub file_id: FileId,
    /// Any other fields the service returned alongside `fileId`.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub struct DirectUploadSession<'a> {
    client: &'a ServiceClient,
    upload_token: &'a SecretString,
    cancel: Option<CancellationToken>,
    state: DirectUploadState,
}

impl<'a> DirectUploadSession<'a> {
    pub fn new(client: &'a ServiceClient, upload_token: &'a SecretString) -> Self {
        Self {
            client,
            upload_token,
            cancel: None,
            state: DirectUploadState::Init,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> DirectUploadState {
        self.state
    }

    pub async fn run(&mut self, file_name: &str, data: Vec<u8>) -> TsfilerResult<DirectUploadOutcome> {
        if self.state != DirectUploadState::Init {
            return Err(TsfilerError::Config(format!(
                "direct upload session already used (state {:?})",
                self.state
            )));
        }

        self.state = DirectUploadState::Send;
        let size = data.len();
        let result = cancellable(
            self.cancel.as_ref(),
            self.client.direct_upload(self.upload_token, file_name, data),
        )
        .await
        .and_then(|resp| {
            let file_id = resp.file_id.ok_or_else(|| {
                TsfilerError::protocol(Exchange::DirectUpload, "missing 'fileId'")
            })?;
            Ok(DirectUploadOutcome {
                file_id,
                extra: resp.extra,
            })
        });

        match &result {
            Ok(outcome) => {
                self.state = DirectUploadState::Completed;
                info!(file = file_name, file_id = %outcome.file_id, bytes = size, "direct upload complete");
            }
            Err(e) => {
                self.state = DirectUploadState::Failed;
                warn!(file = file_name, "direct upload failed: {e}");
            }
        }
        result
    }
}

/// Upload a local file with an upload token. The multipart filename is the
/// file's base name.
pub async fn upload_file_direct(
    client: &ServiceClient,
    upload_token: &SecretString,
    local_path: &Path,
) -> TsfilerResult<DirectUploadOutcome> {
    let file_name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            TsfilerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", local_path.display()),
            ))
        })?;
    let data = tokio::fs::read(local_path).await?;
    DirectUploadSession::new(client, upload_token)
        .run(&file_name, data)
        .await
}
