//! Validated transfer descriptors
//!
//! The service answers with loosely typed JSON. Everything the sessions
//! rely on (required fields, matching array lengths, decodable key
//! material, supported cipher) is checked here, once, right after
//! deserialization.

use reqwest::Url;
use tsfiler_core::types::{ManifestResponse, NegotiateResponse};
use tsfiler_core::{Exchange, FileId, TsfilerError, TsfilerResult};
use tsfiler_crypto::{Algorithm, ChunkMaterial};

/// Algorithm assumed when a download manifest omits it.
const DEFAULT_ALGORITHM: &str = "aes-256-cbc";

/// One chunk of a stored file: where its ciphertext lives and the material
/// that decrypts it.
#[derive(Debug)]
pub struct ChunkDescriptor {
    /// Position in the file (0-based). Transfer order.
    pub index: usize,
    /// Signed storage address; a credential-free capability.
    pub address: Url,
    pub material: ChunkMaterial,
}

/// Ordered, non-empty list of chunks describing how to rebuild a file.
#[derive(Debug)]
pub struct TransferManifest {
    file_id: FileId,
    algorithm: Algorithm,
    chunks: Vec<ChunkDescriptor>,
}

impl TransferManifest {
    /// Validate a `GET /download/{fileId}` response.
    pub fn from_wire(file_id: &FileId, resp: ManifestResponse) -> TsfilerResult<Self> {
        let invalid = |reason: String| TsfilerError::Manifest {
            file_id: file_id.to_string(),
            reason,
        };

        let urls = resp.urls.ok_or_else(|| invalid("missing 'urls'".into()))?;
        let keys = resp.keys.ok_or_else(|| invalid("missing 'keys'".into()))?;
        let ivs = resp.ivs.ok_or_else(|| invalid("missing 'ivs'".into()))?;

        if urls.is_empty() {
            return Err(invalid("'urls' is empty".into()));
        }
        if urls.len() != keys.len() || urls.len() != ivs.len() {
            return Err(invalid(format!(
                "length mismatch: {} urls, {} keys, {} ivs",
                urls.len(),
                keys.len(),
                ivs.len()
            )));
        }

        let algorithm: Algorithm = resp
            .algorithm
            .as_deref()
            .unwrap_or(DEFAULT_ALGORITHM)
            .parse()?;

        let chunks = urls
            .iter()
            .zip(keys.iter().zip(ivs.iter()))
            .enumerate()
            .map(|(index, (url, (key, iv)))| {
                let address = Url::parse(url)
                    .map_err(|e| invalid(format!("chunk {index}: invalid url: {e}")))?;
                let material = ChunkMaterial::from_base64(algorithm, key, iv)
                    .map_err(|e| invalid(format!("chunk {index}: {e}")))?;
                Ok(ChunkDescriptor {
                    index,
                    address,
                    material,
                })
            })
            .collect::<TsfilerResult<Vec<_>>>()?;

        Ok(Self {
            file_id: file_id.clone(),
            algorithm,
            chunks,
        })
    }

    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Always false for a validated manifest.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    /// Consume the manifest, yielding chunks in transfer order.
    pub fn into_chunks(self) -> Vec<ChunkDescriptor> {
        self.chunks
    }
}

/// Single-chunk upload grant returned by negotiation.
#[derive(Debug)]
pub struct UploadTicket {
    pub file_id: FileId,
    pub signed_address: Url,
    pub material: ChunkMaterial,
}

impl UploadTicket {
    /// Validate a negotiate-upload response.
    pub fn from_wire(resp: NegotiateResponse) -> TsfilerResult<Self> {
        let missing =
            |field: &str| TsfilerError::protocol(Exchange::NegotiateUpload, format!("missing '{field}'"));

        let signed_url = resp.signed_url.ok_or_else(|| missing("signedUrl"))?;
        let file_id = resp.file_id.ok_or_else(|| missing("fileId"))?;
        let key = resp.aes_key_base64.ok_or_else(|| missing("aesKeyBase64"))?;
        let iv = resp.iv_base64.ok_or_else(|| missing("ivBase64"))?;
        let algorithm: Algorithm = resp.algorithm.ok_or_else(|| missing("algorithm"))?.parse()?;

        let signed_address = Url::parse(&signed_url).map_err(|e| {
            TsfilerError::protocol(Exchange::NegotiateUpload, format!("invalid signedUrl: {e}"))
        })?;
        let material = ChunkMaterial::from_base64(algorithm, &key, &iv)?;

        Ok(Self {
            file_id,
            signed_address,
            material,
        })
    }
}
