//! Cipher identifiers and per-chunk key material

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use tsfiler_core::{TsfilerError, TsfilerResult};
use zeroize::Zeroize;

/// Closed set of chunk ciphers the service may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// AES-256 in CBC mode with PKCS#7 padding.
    Aes256Cbc,
}

impl Algorithm {
    pub fn key_len(self) -> usize {
        match self {
            Algorithm::Aes256Cbc => 32,
        }
    }

    pub fn iv_len(self) -> usize {
        match self {
            Algorithm::Aes256Cbc => 16,
        }
    }

    pub fn block_size(self) -> usize {
        match self {
            Algorithm::Aes256Cbc => 16,
        }
    }

    /// Wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Aes256Cbc => "aes-256-cbc",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = TsfilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("aes-256-cbc") {
            Ok(Algorithm::Aes256Cbc)
        } else {
            Err(TsfilerError::UnsupportedAlgorithm(s.to_string()))
        }
    }
}

/// Key and IV for exactly one chunk. Zeroized on drop.
///
/// Not `Clone`: material is issued per chunk and must not be
/// reused for another chunk or session.
pub struct ChunkMaterial {
    algorithm: Algorithm,
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl ChunkMaterial {
    /// Validate raw key/IV lengths against the algorithm.
    pub fn new(algorithm: Algorithm, key: Vec<u8>, iv: Vec<u8>) -> TsfilerResult<Self> {
        let material = Self { algorithm, key, iv };
        if material.key.len() != algorithm.key_len() {
            return Err(TsfilerError::KeyMaterial {
                kind: "key",
                algorithm: algorithm.as_str(),
                expected: algorithm.key_len(),
                actual: material.key.len(),
            });
        }
        if material.iv.len() != algorithm.iv_len() {
            return Err(TsfilerError::KeyMaterial {
                kind: "IV",
                algorithm: algorithm.as_str(),
                expected: algorithm.iv_len(),
                actual: material.iv.len(),
            });
        }
        Ok(material)
    }

    /// Decode base64 key/IV as sent on the wire.
    pub fn from_base64(algorithm: Algorithm, key_b64: &str, iv_b64: &str) -> TsfilerResult<Self> {
        let key = decode_field("key", key_b64)?;
        let iv = decode_field("IV", iv_b64)?;
        Self::new(algorithm, key, iv)
    }

    /// Fresh random material, as a key service would issue it.
    pub fn generate(algorithm: Algorithm) -> Self {
        let mut rng = rand::thread_rng();
        let mut key = vec![0u8; algorithm.key_len()];
        let mut iv = vec![0u8; algorithm.iv_len()];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut iv);
        Self { algorithm, key, iv }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Base64 `(key, iv)` pair in wire form.
    pub fn to_base64(&self) -> (String, String) {
        (STANDARD.encode(&self.key), STANDARD.encode(&self.iv))
    }
}

impl Drop for ChunkMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl fmt::Debug for ChunkMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkMaterial")
            .field("algorithm", &self.algorithm)
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

fn decode_field(kind: &'static str, b64: &str) -> TsfilerResult<Vec<u8>> {
    STANDARD
        .decode(b64.trim())
        .map_err(|e| TsfilerError::Encoding {
            kind,
            reason: e.to_string(),
        })
}
