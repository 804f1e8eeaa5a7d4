//! Key derivation: KEM shared secret → content-encryption key

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{XkemError, XkemResult};
use crate::secret::{ContentKey, SharedSecret};
use crate::KEY_SIZE;

/// HKDF info string. Bound to the container version so a future format
/// never derives the same key from the same shared secret.
pub const CONTENT_KEY_INFO: &[u8] = b"XKEM-v1 content-encryption key";

/// Derive the 256-bit content key from a KEM shared secret via HKDF-SHA256.
///
/// No salt: the ML-KEM shared secret is already uniformly random. The
/// shared secret is consumed and wiped before this returns.
pub fn derive_content_key(mut shared: SharedSecret) -> XkemResult<ContentKey> {
    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    shared.wipe();

    let mut okm = [0u8; KEY_SIZE];
    let expanded = expand(&hkdf, &mut okm);
    let key = expanded.map(|()| ContentKey::from_bytes(okm));
    okm.zeroize();
    key
}

fn expand(hkdf: &Hkdf<Sha256>, okm: &mut [u8]) -> XkemResult<()> {
    hkdf.expand(CONTENT_KEY_INFO, okm)
        .map_err(XkemError::KeyDerivation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use std::collections::HashSet;

    fn secret(fill: u8) -> SharedSecret {
        SharedSecret::from_bytes([fill; KEY_SIZE])
    }

    #[test]
    fn test_derivation_deterministic() {
        let k1 = derive_content_key(secret(9)).unwrap();
        let k2 = derive_content_key(secret(9)).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes(), "HKDF must be deterministic");
    }

    #[test]
    fn test_derivation_not_passthrough() {
        let k = derive_content_key(secret(9)).unwrap();
        assert_ne!(k.as_bytes(), &[9u8; KEY_SIZE]);
    }

    #[test]
    fn test_distinct_secrets_distinct_keys() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let mut bytes = [0u8; KEY_SIZE];
            rand::thread_rng().fill_bytes(&mut bytes);
            let key = derive_content_key(SharedSecret::from_bytes(bytes)).unwrap();
            assert!(seen.insert(*key.as_bytes()), "derived key collision");
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_known_answer_stable() {
        // Pin the derivation so an accidental info-string change breaks loudly.
        let a = derive_content_key(secret(0)).unwrap();
        let b = {
            let hk = Hkdf::<Sha256>::new(None, &[0u8; KEY_SIZE]);
            let mut okm = [0u8; KEY_SIZE];
            hk.expand(b"XKEM-v1 content-encryption key", &mut okm).unwrap();
            okm
        };
        assert_eq!(a.as_bytes(), &b);
    }

    #[test]
    fn test_expand_error_propagates() {
        let hk = Hkdf::<Sha256>::new(None, &[1u8; KEY_SIZE]);
        // HKDF-SHA256 output is capped at 255 * 32 bytes
        let mut too_long = vec![0u8; 255 * 32 + 1];
        let err = expand(&hk, &mut too_long).unwrap_err();
        assert!(matches!(err, XkemError::KeyDerivation(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::ResourceFailure);
    }
}
