//! Chunked download session
//!
//! ```text
//! Init → FetchManifest → FetchAndDecrypt (per chunk, manifest order) → Assemble → Completed
//! ```
//!
//! Chunk fetches may overlap when `concurrency > 1`, but results are always
//! consumed in manifest order and the first failing chunk aborts the whole
//! download. Nothing is returned or written unless every chunk decrypted.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tsfiler_core::{FileHandle, TsfilerError, TsfilerResult};
use tsfiler_crypto::decrypt_chunk;

use crate::cancel::cancellable;
use crate::client::ServiceClient;
use crate::manifest::{ChunkDescriptor, TransferManifest};
use crate::ProgressFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Init,
    FetchManifest,
    FetchAndDecrypt,
    Assemble,
    Completed,
    Failed,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadState::Completed | DownloadState::Failed)
    }
}

pub struct DownloadSession<'a> {
    client: &'a ServiceClient,
    token: &'a SecretString,
    concurrency: usize,
    cancel: Option<CancellationToken>,
    progress: Option<&'a ProgressFn>,
    state: DownloadState,
}

impl<'a> DownloadSession<'a> {
    pub fn new(client: &'a ServiceClient, token: &'a SecretString) -> Self {
        Self {
            client,
            token,
            concurrency: 1,
            cancel: None,
            progress: None,
            state: DownloadState::Init,
        }
    }

    /// Chunks fetched at once. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Called with `(chunks_done, chunks_total, message)` after each chunk.
    pub fn with_progress(mut self, progress: &'a ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Fetch, decrypt and assemble the file behind `handle`.
    pub async fn run(&mut self, handle: &FileHandle) -> TsfilerResult<Vec<u8>> {
        if self.state != DownloadState::Init {
            return Err(TsfilerError::Config(format!(
                "download session already used (state {:?})",
                self.state
            )));
        }

        match self.drive(handle).await {
            Ok(content) => {
                self.state = DownloadState::Completed;
                info!(file_id = %handle.file_id, bytes = content.len(), "download complete");
                Ok(content)
            }
            Err(e) => {
                let failed_in = self.state;
                self.state = DownloadState::Failed;
                warn!(file_id = %handle.file_id, state = ?failed_in, "download failed: {e}");
                Err(e)
            }
        }
    }

    async fn drive(&mut self, handle: &FileHandle) -> TsfilerResult<Vec<u8>> {
        let cancel = self.cancel.as_ref();

        self.state = DownloadState::FetchManifest;
        let resp = cancellable(cancel, self.client.fetch_manifest(self.token, &handle.file_id)).await?;
        let manifest = TransferManifest::from_wire(&handle.file_id, resp)?;
        let total = manifest.len();
        debug!(
            file_id = %handle.file_id,
            chunks = total,
            algorithm = %manifest.algorithm(),
            concurrency = self.concurrency,
            "manifest validated"
        );

        self.state = DownloadState::FetchAndDecrypt;
        let client = self.client;
        let mut chunks = stream::iter(manifest.into_chunks())
            .map(|chunk| fetch_and_decrypt(client, chunk))
            .buffered(self.concurrency);

        let mut parts = Vec::with_capacity(total);
        while let Some(part) = cancellable(cancel, async { Ok(chunks.next().await) }).await? {
            parts.push(part?);
            if let Some(cb) = self.progress {
                let done = parts.len();
                cb(done as u64, total as u64, &format!("chunk {done}/{total}"));
            }
        }

        self.state = DownloadState::Assemble;
        Ok(parts.concat())
    }
}

async fn fetch_and_decrypt(client: &ServiceClient, chunk: ChunkDescriptor) -> TsfilerResult<Vec<u8>> {
    let ciphertext = client
        .fetch_chunk(&chunk.address)
        .await
        .map_err(|e| in_chunk(e, chunk.index))?;
    let plaintext = decrypt_chunk(&chunk.material, &ciphertext).map_err(|e| e.at_chunk(chunk.index))?;
    debug!(chunk = chunk.index, bytes = plaintext.len(), "chunk decrypted");
    Ok(plaintext)
}

fn in_chunk(e: TsfilerError, index: usize) -> TsfilerError {
    match e {
        TsfilerError::Transport {
            exchange,
            status,
            message,
        } => TsfilerError::Transport {
            exchange,
            status,
            message: format!("chunk {index}: {message}"),
        },
        other => other.at_chunk(index),
    }
}

/// Download the file behind `handle` into memory.
pub async fn download(
    client: &ServiceClient,
    token: &SecretString,
    handle: &FileHandle,
    concurrency: usize,
) -> TsfilerResult<Vec<u8>> {
    DownloadSession::new(client, token)
        .with_concurrency(concurrency)
        .run(handle)
        .await
}

/// Write `content` to `path` atomically (temp file + rename).
///
/// Parent directories are created. A failure leaves no file at `path`
/// and no temp file behind.
pub async fn save_download(path: &Path, content: &[u8]) -> TsfilerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, content).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tsfiler_tmp");
    path.with_file_name(name)
}
