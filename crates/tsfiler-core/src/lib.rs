pub mod config;
pub mod error;
pub mod types;

pub use error::{TsfilerError, TsfilerResult};
pub use types::{Exchange, FileHandle, FileId};
