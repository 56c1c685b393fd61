//! tsfiler-crypto: chunk cipher and plaintext digest for tsfiler transfers
//!
//! The service issues key material per chunk; this crate never derives or
//! stores keys, it only applies what it is handed.
//!
//! Pipeline:
//! ```text
//! upload:   plaintext → MD5 digest (dedup) → AES-256-CBC + PKCS#7 (issued key/IV) → PUT
//! download: GET chunk i → AES-256-CBC decrypt + unpad (key_i/IV_i) → append in manifest order
//! ```

pub mod chunk;
pub mod digest;
pub mod keys;

pub use chunk::{decrypt, decrypt_chunk, encrypt, encrypt_chunk};
pub use digest::{digest_hex, digest_reader};
pub use keys::{Algorithm, ChunkMaterial};
