//! Per-chunk encryption/decryption
//!
//! Each chunk is a self-contained unit: a fresh cipher is built from that
//! chunk's own key and IV on every call and padded on its own, so nothing
//! carries over from one chunk to the next.
//!
//! AES-256-CBC chunk format (binary):
//! ```text
//! [N * 16 bytes: ciphertext of plaintext || PKCS#7 padding (1..=16 bytes)]
//! ```

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tsfiler_core::{TsfilerError, TsfilerResult};

use crate::keys::{Algorithm, ChunkMaterial};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt a single chunk with its issued material.
///
/// Output length is always a non-zero multiple of the block size.
pub fn encrypt_chunk(material: &ChunkMaterial, plaintext: &[u8]) -> TsfilerResult<Vec<u8>> {
    match material.algorithm() {
        Algorithm::Aes256Cbc => {
            let cipher = Aes256CbcEnc::new_from_slices(material.key(), material.iv())
                .map_err(|e| key_length_error(material, e))?;
            Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
        }
    }
}

/// Decrypt a single chunk and strip its padding.
///
/// Fails with `Integrity` when the ciphertext is empty, not block-aligned,
/// or carries invalid padding: the signature of a wrong key/IV, a truncated
/// transfer, or tampering.
pub fn decrypt_chunk(material: &ChunkMaterial, ciphertext: &[u8]) -> TsfilerResult<Vec<u8>> {
    let block = material.algorithm().block_size();
    if ciphertext.is_empty() || ciphertext.len() % block != 0 {
        return Err(TsfilerError::Integrity {
            chunk: None,
            reason: format!(
                "ciphertext length {} is not a non-zero multiple of {block}",
                ciphertext.len()
            ),
        });
    }

    match material.algorithm() {
        Algorithm::Aes256Cbc => {
            let cipher = Aes256CbcDec::new_from_slices(material.key(), material.iv())
                .map_err(|e| key_length_error(material, e))?;
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| TsfilerError::Integrity {
                    chunk: None,
                    reason: "invalid PKCS#7 padding: wrong key/IV, truncated or tampered data"
                        .into(),
                })
        }
    }
}

/// Encrypt with a wire algorithm identifier and raw key/IV.
///
/// The identifier is checked before any key handling or cipher setup.
pub fn encrypt(plaintext: &[u8], key: &[u8], iv: &[u8], algorithm: &str) -> TsfilerResult<Vec<u8>> {
    let algorithm: Algorithm = algorithm.parse()?;
    let material = ChunkMaterial::new(algorithm, key.to_vec(), iv.to_vec())?;
    encrypt_chunk(&material, plaintext)
}

/// Decrypt with a wire algorithm identifier and raw key/IV.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8], algorithm: &str) -> TsfilerResult<Vec<u8>> {
    let algorithm: Algorithm = algorithm.parse()?;
    let material = ChunkMaterial::new(algorithm, key.to_vec(), iv.to_vec())?;
    decrypt_chunk(&material, ciphertext)
}

// Unreachable in practice: ChunkMaterial validates lengths on construction.
fn key_length_error(material: &ChunkMaterial, e: aes::cipher::InvalidLength) -> TsfilerError {
    tracing::error!(algorithm = %material.algorithm(), "cipher rejected key material: {e}");
    TsfilerError::KeyMaterial {
        kind: "key",
        algorithm: material.algorithm().as_str(),
        expected: material.algorithm().key_len(),
        actual: material.key().len(),
    }
}
