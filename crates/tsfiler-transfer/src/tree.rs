//! Directory tree upload
//!
//! Walks a local directory and uploads every regular file through the
//! chunked session, logging in afresh for each file. A failing file is
//! logged and counted; the walk continues.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tsfiler_core::config::TransferConfig;
use tsfiler_core::{TsfilerError, TsfilerResult};

use crate::auth::{login, Credentials};
use crate::cancel::cancellable;
use crate::client::ServiceClient;
use crate::upload::upload_file;
use crate::ProgressFn;

/// Which files a tree upload includes and what happens to them afterwards.
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Delete each local file once its upload is confirmed
    pub remove_after_upload: bool,
    /// Whether to include hidden directories (dotdirs)
    pub sync_hidden_dirs: bool,
    /// Glob patterns matched against file and directory names
    pub exclude_patterns: Vec<String>,
}

impl From<&TransferConfig> for TreeOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            remove_after_upload: config.remove_after_upload,
            sync_hidden_dirs: config.sync_hidden_dirs,
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeReport {
    pub uploaded: usize,
    /// Files the service already held under the same path and digest
    pub already_exists: usize,
    pub failed: usize,
    pub removed: usize,
    /// Ciphertext bytes confirmed by the service
    pub bytes: u64,
}

/// Upload every file under `root`.
///
/// A failed login or cancellation aborts the walk; per-file upload errors
/// are counted in the report. Files already uploaded stay uploaded.
pub async fn push_tree(
    client: &ServiceClient,
    creds: &Credentials,
    root: &Path,
    options: &TreeOptions,
    progress: Option<&ProgressFn>,
    cancel: Option<&CancellationToken>,
) -> TsfilerResult<TreeReport> {
    let files = collect_files(root, options)?;
    let total = files.len();
    let mut report = TreeReport::default();
    info!(root = %root.display(), files = total, "pushing tree");

    for (i, path) in files.iter().enumerate() {
        let logical_path = path.to_string_lossy().replace('\\', "/");
        if let Some(cb) = progress {
            cb(i as u64, total as u64, &logical_path);
        }

        let token = cancellable(cancel, login(client, creds)).await?;
        match upload_file(client, &token, path, &logical_path, cancel.cloned()).await {
            Ok(outcome) => {
                report.uploaded += 1;
                report.bytes += outcome.confirmed_byte_count;
                if options.remove_after_upload && outcome.confirmed {
                    match std::fs::remove_file(path) {
                        Ok(()) => {
                            debug!(path = %path.display(), "removed local copy");
                            report.removed += 1;
                        }
                        Err(e) => warn!(path = %path.display(), "failed to remove after upload: {e}"),
                    }
                }
            }
            Err(TsfilerError::AlreadyExists { .. }) => {
                debug!(path = %logical_path, "already on service");
                report.already_exists += 1;
            }
            Err(TsfilerError::Cancelled) => {
                info!(uploaded = report.uploaded, "tree push cancelled");
                return Err(TsfilerError::Cancelled);
            }
            Err(e) => {
                warn!(path = %logical_path, "upload failed: {e}");
                report.failed += 1;
            }
        }
    }

    if let Some(cb) = progress {
        cb(total as u64, total as u64, "done");
    }
    info!(
        uploaded = report.uploaded,
        already_exists = report.already_exists,
        failed = report.failed,
        removed = report.removed,
        "tree push finished"
    );
    Ok(report)
}

/// Collect all regular files under `root` recursively, sorted.
pub fn collect_files(root: &Path, options: &TreeOptions) -> TsfilerResult<Vec<PathBuf>> {
    let excludes: Vec<glob::Pattern> = options
        .exclude_patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = %p, "ignoring invalid exclude pattern: {e}");
                None
            }
        })
        .collect();

    let mut files = Vec::new();
    collect_files_inner(root, &mut files, options, &excludes)?;
    files.sort();
    Ok(files)
}

fn collect_files_inner(
    dir: &Path,
    out: &mut Vec<PathBuf>,
    options: &TreeOptions,
    excludes: &[glob::Pattern],
) -> TsfilerResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if excludes.iter().any(|p| p.matches(name)) {
            continue;
        }

        if meta.is_dir() {
            if name.starts_with('.') && !options.sync_hidden_dirs {
                continue;
            }
            collect_files_inner(&path, out, options, excludes)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
