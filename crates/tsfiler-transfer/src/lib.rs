//! tsfiler-transfer: upload/download sessions against the tsfiler service
//!
//! ```text
//! ServiceClient  (one method per wire exchange, reqwest)
//!      │
//!      ├── auth::login                 → session token
//!      ├── upload::UploadSession       negotiate → encrypt → PUT → confirm
//!      ├── download::DownloadSession   manifest → fetch+decrypt (ordered) → assemble
//!      ├── direct::DirectUploadSession multipart with an upload token
//!      └── tree::push_tree             one upload session per file
//! ```

mod cancel;

pub mod auth;
pub mod client;
pub mod direct;
pub mod download;
pub mod manifest;
pub mod tree;
pub mod upload;

/// Progress callback type (done, total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

pub use auth::{login, Credentials};
pub use client::ServiceClient;
pub use direct::{upload_file_direct, DirectUploadOutcome, DirectUploadSession, DirectUploadState};
pub use download::{download, save_download, DownloadSession, DownloadState};
pub use manifest::{ChunkDescriptor, TransferManifest, UploadTicket};
pub use tree::{push_tree, TreeOptions, TreeReport};
pub use upload::{upload_bytes, upload_file, UploadOutcome, UploadRequest, UploadSession, UploadState};
