//! Container wire format
//!
//! ```text
//! Header: [magic: 4B "XKEM"][version: u32 BE = 1][kem_ct_len: u32 BE][kem_ct: N bytes]
//! Chunk*: [plaintext_len: u32 BE][nonce: 12B][ciphertext + tag: plaintext_len + 16 bytes]
//! ```
//!
//! Every function here is stateless; the engine decides what a frame means.

use xkem_core::config::DEFAULT_MAX_CHUNK_SIZE;
use xkem_core::KemVariant;

use crate::error::{XkemError, XkemResult};
use crate::{NONCE_SIZE, TAG_SIZE};

pub const MAGIC: [u8; 4] = *b"XKEM";

/// The only container version this crate reads or writes.
pub const VERSION: u32 = 1;

/// magic + version + kem_ct_len
pub const HEADER_PREFIX_LEN: usize = 12;

/// plaintext_len + nonce
pub const CHUNK_PREFIX_LEN: usize = 4 + NONCE_SIZE;

/// Upper bound on the declared KEM ciphertext length (largest supported variant).
const MAX_KEM_CIPHERTEXT_LEN: usize = KemVariant::MlKem1024.ciphertext_len();

/// Limits applied while decoding untrusted containers.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    /// Largest accepted `plaintext_len` in a chunk frame.
    pub max_chunk_len: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_chunk_len: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

/// Parsed container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub kem_ciphertext: Vec<u8>,
}

impl Header {
    pub fn new(kem_ciphertext: Vec<u8>) -> Self {
        Self {
            version: VERSION,
            kem_ciphertext,
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_PREFIX_LEN + self.kem_ciphertext.len()
    }

    /// KEM variant implied by the ciphertext length, if any.
    pub fn kem_variant(&self) -> Option<KemVariant> {
        KemVariant::from_ciphertext_len(self.kem_ciphertext.len())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(self.kem_ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.kem_ciphertext);
        out
    }
}

/// Encode a version-1 header around `kem_ciphertext`.
pub fn encode_header(kem_ciphertext: &[u8]) -> Vec<u8> {
    Header::new(kem_ciphertext.to_vec()).encode()
}

/// Validate the fixed 12-byte header prefix and return the declared KEM
/// ciphertext length.
pub fn decode_header_prefix(prefix: &[u8; HEADER_PREFIX_LEN]) -> XkemResult<usize> {
    if prefix[..4] != MAGIC {
        return Err(XkemError::MagicMismatch);
    }
    let version = read_u32(&prefix[4..8]);
    if version != VERSION {
        return Err(XkemError::UnsupportedVersion(version));
    }
    let kem_len = read_u32(&prefix[8..12]) as usize;
    if kem_len > MAX_KEM_CIPHERTEXT_LEN {
        return Err(XkemError::MalformedHeader(
            "KEM ciphertext length exceeds every supported variant",
        ));
    }
    Ok(kem_len)
}

/// Decode a header from the front of `buf`.
///
/// Returns the header and the number of bytes consumed.
pub fn decode_header(buf: &[u8]) -> XkemResult<(Header, usize)> {
    let prefix: &[u8; HEADER_PREFIX_LEN] = buf
        .get(..HEADER_PREFIX_LEN)
        .and_then(|p| p.try_into().ok())
        .ok_or(XkemError::MalformedHeader("shorter than 12 bytes"))?;
    let kem_len = decode_header_prefix(prefix)?;

    let end = HEADER_PREFIX_LEN + kem_len;
    let kem_ciphertext = buf
        .get(HEADER_PREFIX_LEN..end)
        .ok_or(XkemError::MalformedHeader("KEM ciphertext truncated"))?
        .to_vec();

    Ok((Header::new(kem_ciphertext), end))
}

/// One framed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext_with_tag: Vec<u8>,
}

impl ChunkFrame {
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext_with_tag.len().saturating_sub(TAG_SIZE)
    }
}

/// Frame `ciphertext_with_tag` (the AEAD output for a chunk) for the wire.
pub fn encode_chunk(nonce: &[u8; NONCE_SIZE], ciphertext_with_tag: &[u8]) -> XkemResult<Vec<u8>> {
    let plaintext_len = ciphertext_with_tag
        .len()
        .checked_sub(TAG_SIZE)
        .ok_or(XkemError::EncryptionFailed)?;
    let declared = u32::try_from(plaintext_len).map_err(|_| XkemError::ChunkTooLarge {
        len: plaintext_len,
        max: u32::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(CHUNK_PREFIX_LEN + ciphertext_with_tag.len());
    out.extend_from_slice(&declared.to_be_bytes());
    out.extend_from_slice(nonce);
    out.extend_from_slice(ciphertext_with_tag);
    Ok(out)
}

/// Parse the 16-byte chunk prefix into `(ciphertext_with_tag length, nonce)`,
/// enforcing `limits`.
pub fn decode_chunk_prefix(
    prefix: &[u8; CHUNK_PREFIX_LEN],
    limits: &DecodeLimits,
) -> XkemResult<(usize, [u8; NONCE_SIZE])> {
    let plaintext_len = read_u32(&prefix[..4]) as usize;
    if plaintext_len > limits.max_chunk_len {
        return Err(XkemError::ChunkTooLarge {
            len: plaintext_len,
            max: limits.max_chunk_len,
        });
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&prefix[4..]);
    Ok((plaintext_len + TAG_SIZE, nonce))
}

/// Decode one chunk frame from the front of `buf`.
///
/// Returns the frame and the number of bytes consumed.
pub fn decode_chunk(buf: &[u8], limits: &DecodeLimits) -> XkemResult<(ChunkFrame, usize)> {
    let prefix: &[u8; CHUNK_PREFIX_LEN] = buf
        .get(..CHUNK_PREFIX_LEN)
        .and_then(|p| p.try_into().ok())
        .ok_or(XkemError::TruncatedChunk {
            needed: CHUNK_PREFIX_LEN,
            available: buf.len(),
        })?;
    let (body_len, nonce) = decode_chunk_prefix(prefix, limits)?;

    let end = CHUNK_PREFIX_LEN + body_len;
    let body = buf.get(CHUNK_PREFIX_LEN..end).ok_or(XkemError::TruncatedChunk {
        needed: body_len,
        available: buf.len() - CHUNK_PREFIX_LEN,
    })?;

    Ok((
        ChunkFrame {
            nonce,
            ciphertext_with_tag: body.to_vec(),
        },
        end,
    ))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut be = [0u8; 4];
    be.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(be)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let encoded = encode_header(&[0xEEu8; 1088]);

        assert_eq!(&encoded[..4], b"XKEM");
        assert_eq!(&encoded[4..8], &[0, 0, 0, 1]);
        assert_eq!(&encoded[8..12], &1088u32.to_be_bytes());
        assert_eq!(encoded.len(), 12 + 1088);

        let (header, consumed) = decode_header(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(header.version, VERSION);
        assert_eq!(header.kem_variant(), Some(KemVariant::MlKem768));
    }

    #[test]
    fn test_header_decode_ignores_trailing_bytes() {
        let mut encoded = encode_header(&[1u8; 1568]);
        encoded.extend_from_slice(b"chunk data follows");
        let (header, consumed) = decode_header(&encoded).unwrap();
        assert_eq!(consumed, 12 + 1568);
        assert_eq!(header.kem_variant(), Some(KemVariant::MlKem1024));
    }

    #[test]
    fn test_header_too_short() {
        let encoded = encode_header(&[0u8; 1088]);
        for len in [0, 1, 4, 11] {
            let err = decode_header(&encoded[..len]).unwrap_err();
            assert!(matches!(err, XkemError::MalformedHeader(_)), "len {len}: {err}");
        }
        let err = decode_header(&encoded[..12 + 1087]).unwrap_err();
        assert!(matches!(err, XkemError::MalformedHeader(_)));
    }

    #[test]
    fn test_header_bad_magic() {
        let mut encoded = encode_header(&[0u8; 1088]);
        encoded[0] = b'Y';
        assert!(matches!(
            decode_header(&encoded).unwrap_err(),
            XkemError::MagicMismatch
        ));
    }

    #[test]
    fn test_header_bad_version() {
        let mut encoded = encode_header(&[0u8; 1088]);
        encoded[4..8].copy_from_slice(&2u32.to_be_bytes());
        assert!(matches!(
            decode_header(&encoded).unwrap_err(),
            XkemError::UnsupportedVersion(2)
        ));
    }

    #[test]
    fn test_header_absurd_kem_length() {
        let mut encoded = encode_header(&[0u8; 1088]);
        encoded[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            decode_header(&encoded).unwrap_err(),
            XkemError::MalformedHeader(_)
        ));
    }

    #[test]
    fn test_chunk_layout() {
        let nonce = [7u8; NONCE_SIZE];
        let body = vec![0xCCu8; 100 + TAG_SIZE];
        let encoded = encode_chunk(&nonce, &body).unwrap();

        assert_eq!(&encoded[..4], &100u32.to_be_bytes());
        assert_eq!(&encoded[4..16], &nonce);
        assert_eq!(encoded.len(), 16 + 100 + 16);

        let (frame, consumed) = decode_chunk(&encoded, &DecodeLimits::default()).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.nonce, nonce);
        assert_eq!(frame.plaintext_len(), 100);
    }

    #[test]
    fn test_empty_chunk_is_tag_only() {
        let encoded = encode_chunk(&[0u8; NONCE_SIZE], &[9u8; TAG_SIZE]).unwrap();
        assert_eq!(encoded.len(), CHUNK_PREFIX_LEN + TAG_SIZE);
        let (frame, _) = decode_chunk(&encoded, &DecodeLimits::default()).unwrap();
        assert_eq!(frame.plaintext_len(), 0);
    }

    #[test]
    fn test_encode_chunk_rejects_tagless_body() {
        assert!(encode_chunk(&[0u8; NONCE_SIZE], &[0u8; TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_chunk_truncated() {
        let encoded = encode_chunk(&[1u8; NONCE_SIZE], &[2u8; 50 + TAG_SIZE]).unwrap();
        let limits = DecodeLimits::default();

        // Inside the prefix
        let err = decode_chunk(&encoded[..10], &limits).unwrap_err();
        assert!(matches!(err, XkemError::TruncatedChunk { needed: 16, available: 10 }));

        // Inside the body
        let err = decode_chunk(&encoded[..encoded.len() - 1], &limits).unwrap_err();
        assert!(matches!(err, XkemError::TruncatedChunk { needed: 66, available: 65 }));
    }

    #[test]
    fn test_chunk_limit_enforced() {
        let encoded = encode_chunk(&[1u8; NONCE_SIZE], &[2u8; 2048 + TAG_SIZE]).unwrap();
        let limits = DecodeLimits { max_chunk_len: 1024 };
        let err = decode_chunk(&encoded, &limits).unwrap_err();
        assert!(matches!(err, XkemError::ChunkTooLarge { len: 2048, max: 1024 }));
    }
}
