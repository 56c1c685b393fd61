//! Plaintext content digest
//!
//! The service deduplicates and verifies uploads by MD5 of the plaintext,
//! computed before encryption so it is stable across re-encryption with
//! different keys.

use md5::{Digest, Md5};
use std::io::Read;
use tsfiler_core::TsfilerResult;

/// Lowercase hex MD5 of a byte slice (32 chars).
pub fn digest_hex(plaintext: &[u8]) -> String {
    hex::encode(Md5::digest(plaintext))
}

/// Streaming variant for inputs not held in memory.
pub fn digest_reader<R: Read>(mut reader: R) -> TsfilerResult<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
