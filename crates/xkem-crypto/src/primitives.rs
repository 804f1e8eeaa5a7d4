//! Adapter over the ML-KEM and AES-256-GCM implementations
//!
//! The rest of the crate never touches `ml_kem` or `aes_gcm` types directly:
//! keys, ciphertexts and secrets cross this boundary as byte slices and the
//! zeroizing wrappers from [`crate::secret`].
//!
//! An adapter only exists once [`Primitives::init`] has confirmed the OS
//! entropy source works, so encapsulation can never run uninitialized.

use std::marker::PhantomData;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use secrecy::SecretSlice;
use tracing::debug;
use xkem_core::KemVariant;
use zeroize::Zeroize;

use crate::error::{XkemError, XkemResult};
use crate::secret::{ContentKey, SharedSecret};
use crate::NONCE_SIZE;

/// A KEM parameter set with fixed key and ciphertext sizes.
///
/// The engine and codec are generic over this trait and read every size from
/// its associated constants.
pub trait KemScheme: Send + Sync + 'static {
    const VARIANT: KemVariant;
    const PUBLIC_KEY_LEN: usize;
    const PRIVATE_KEY_LEN: usize;
    const CIPHERTEXT_LEN: usize;

    /// Returns `(public_key, private_key)`.
    fn keypair(rng: &mut StdRng) -> (Vec<u8>, SecretSlice<u8>);

    /// Returns `(shared_secret, kem_ciphertext)`. `public_key` length is
    /// already checked by the caller.
    fn encapsulate(rng: &mut StdRng, public_key: &[u8]) -> XkemResult<(SharedSecret, Vec<u8>)>;

    /// Lengths are already checked by the caller. A wrong key or altered
    /// ciphertext still "succeeds" (implicit rejection) with an unrelated
    /// secret.
    fn decapsulate(kem_ciphertext: &[u8], private_key: &[u8]) -> XkemResult<SharedSecret>;
}

macro_rules! ml_kem_scheme {
    ($(#[$meta:meta])* $name:ident, $params:ty, $variant:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl KemScheme for $name {
            const VARIANT: KemVariant = $variant;
            const PUBLIC_KEY_LEN: usize = $variant.public_key_len();
            const PRIVATE_KEY_LEN: usize = $variant.private_key_len();
            const CIPHERTEXT_LEN: usize = $variant.ciphertext_len();

            fn keypair(rng: &mut StdRng) -> (Vec<u8>, SecretSlice<u8>) {
                let (dk, ek) = <$params as KemCore>::generate(rng);
                let mut dk_bytes = dk.as_bytes();
                let private_key = SecretSlice::from(dk_bytes.as_slice().to_vec());
                dk_bytes.as_mut_slice().zeroize();
                (ek.as_bytes().as_slice().to_vec(), private_key)
            }

            fn encapsulate(
                rng: &mut StdRng,
                public_key: &[u8],
            ) -> XkemResult<(SharedSecret, Vec<u8>)> {
                let ek = <<$params as KemCore>::EncapsulationKey as EncodedSizeUser>::from_bytes(
                    &public_key
                        .try_into()
                        .map_err(|_| XkemError::InvalidPublicKeyLength {
                            expected: Self::PUBLIC_KEY_LEN,
                            actual: public_key.len(),
                        })?,
                );
                let (kem_ct, mut shared) = ek
                    .encapsulate(rng)
                    .map_err(|_| XkemError::EncryptionFailed)?;
                let secret = SharedSecret::from_slice(shared.as_slice());
                shared.as_mut_slice().zeroize();
                let secret = secret.ok_or(XkemError::EncryptionFailed)?;
                Ok((secret, kem_ct.as_slice().to_vec()))
            }

            fn decapsulate(kem_ciphertext: &[u8], private_key: &[u8]) -> XkemResult<SharedSecret> {
                let kem_ct: Ciphertext<$params> =
                    kem_ciphertext
                        .try_into()
                        .map_err(|_| XkemError::InvalidCiphertextLength {
                            expected: Self::CIPHERTEXT_LEN,
                            actual: kem_ciphertext.len(),
                        })?;
                let mut dk_bytes = private_key
                    .try_into()
                    .map_err(|_| XkemError::InvalidPrivateKeyLength {
                        expected: Self::PRIVATE_KEY_LEN,
                        actual: private_key.len(),
                    })?;
                let dk =
                    <<$params as KemCore>::DecapsulationKey as EncodedSizeUser>::from_bytes(&dk_bytes);
                dk_bytes.as_mut_slice().zeroize();

                let mut shared = dk
                    .decapsulate(&kem_ct)
                    .map_err(|_| XkemError::AuthenticationFailed)?;
                let secret = SharedSecret::from_slice(shared.as_slice());
                shared.as_mut_slice().zeroize();
                secret.ok_or(XkemError::AuthenticationFailed)
            }
        }
    };
}

ml_kem_scheme!(
    /// ML-KEM-768: 1184-byte public key, 2400-byte private key, 1088-byte ciphertext.
    MlKem768,
    ml_kem::MlKem768,
    KemVariant::MlKem768
);

ml_kem_scheme!(
    /// ML-KEM-1024: 1568-byte public key, 3168-byte private key, 1568-byte ciphertext.
    MlKem1024,
    ml_kem::MlKem1024,
    KemVariant::MlKem1024
);

/// A recipient keypair. The private key is zeroized when dropped.
#[derive(Debug)]
pub struct Keypair {
    pub variant: KemVariant,
    pub public_key: Vec<u8>,
    pub private_key: SecretSlice<u8>,
}

/// Output of one encapsulation: consumed immediately by key derivation.
#[derive(Debug)]
pub struct Encapsulation {
    pub shared_secret: SharedSecret,
    pub kem_ciphertext: Vec<u8>,
}

/// Initialized handle to the KEM and AEAD primitives for scheme `K`.
#[derive(Debug)]
pub struct Primitives<K: KemScheme> {
    _scheme: PhantomData<fn() -> K>,
}

impl<K: KemScheme> Primitives<K> {
    /// Probe the OS entropy source and return a usable adapter.
    pub fn init() -> XkemResult<Self> {
        let mut probe = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut probe)
            .map_err(|_| XkemError::RandomnessUnavailable)?;
        probe.zeroize();
        debug!(kem = %K::VARIANT, "primitives initialized");
        Ok(Self {
            _scheme: PhantomData,
        })
    }

    pub fn generate_keypair(&self) -> XkemResult<Keypair> {
        let mut rng = seeded_rng()?;
        let (public_key, private_key) = K::keypair(&mut rng);
        Ok(Keypair {
            variant: K::VARIANT,
            public_key,
            private_key,
        })
    }

    pub fn encapsulate(&self, public_key: &[u8]) -> XkemResult<Encapsulation> {
        if public_key.len() != K::PUBLIC_KEY_LEN {
            return Err(XkemError::InvalidPublicKeyLength {
                expected: K::PUBLIC_KEY_LEN,
                actual: public_key.len(),
            });
        }
        let mut rng = seeded_rng()?;
        let (shared_secret, kem_ciphertext) = K::encapsulate(&mut rng, public_key)?;
        Ok(Encapsulation {
            shared_secret,
            kem_ciphertext,
        })
    }

    pub fn decapsulate(&self, kem_ciphertext: &[u8], private_key: &[u8]) -> XkemResult<SharedSecret> {
        if kem_ciphertext.len() != K::CIPHERTEXT_LEN {
            return Err(XkemError::InvalidCiphertextLength {
                expected: K::CIPHERTEXT_LEN,
                actual: kem_ciphertext.len(),
            });
        }
        if private_key.len() != K::PRIVATE_KEY_LEN {
            return Err(XkemError::InvalidPrivateKeyLength {
                expected: K::PRIVATE_KEY_LEN,
                actual: private_key.len(),
            });
        }
        K::decapsulate(kem_ciphertext, private_key)
    }

    /// Draw a fresh 96-bit nonce from the OS CSPRNG.
    pub fn fresh_nonce(&self) -> XkemResult<[u8; NONCE_SIZE]> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| XkemError::RandomnessUnavailable)?;
        Ok(nonce)
    }

    /// AES-256-GCM encrypt. Returns `ciphertext || 16-byte tag`.
    pub fn aead_encrypt(
        &self,
        key: &ContentKey,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> XkemResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(key.as_bytes().into());
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| XkemError::EncryptionFailed)
    }

    /// AES-256-GCM decrypt. The tag is verified before any plaintext is
    /// produced; on mismatch nothing is returned.
    pub fn aead_decrypt(
        &self,
        key: &ContentKey,
        nonce: &[u8; NONCE_SIZE],
        ciphertext_with_tag: &[u8],
    ) -> XkemResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(key.as_bytes().into());
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext_with_tag)
            .map_err(|_| XkemError::AuthenticationFailed)
    }
}

/// Per-operation CSPRNG seeded from the OS, so entropy failure is reported
/// as an error instead of a panic inside the KEM.
fn seeded_rng() -> XkemResult<StdRng> {
    let mut seed = <StdRng as SeedableRng>::Seed::default();
    OsRng
        .try_fill_bytes(&mut seed)
        .map_err(|_| XkemError::RandomnessUnavailable)?;
    let rng = StdRng::from_seed(seed);
    seed.zeroize();
    Ok(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KEY_SIZE, TAG_SIZE};
    use secrecy::ExposeSecret;

    fn encap_decap_roundtrip<K: KemScheme>() {
        let prims = Primitives::<K>::init().unwrap();
        let kp = prims.generate_keypair().unwrap();
        assert_eq!(kp.public_key.len(), K::PUBLIC_KEY_LEN);
        assert_eq!(kp.private_key.expose_secret().len(), K::PRIVATE_KEY_LEN);

        let enc = prims.encapsulate(&kp.public_key).unwrap();
        assert_eq!(enc.kem_ciphertext.len(), K::CIPHERTEXT_LEN);

        let ss = prims
            .decapsulate(&enc.kem_ciphertext, kp.private_key.expose_secret())
            .unwrap();
        assert_eq!(ss.as_bytes(), enc.shared_secret.as_bytes());
    }

    #[test]
    fn test_mlkem768_roundtrip() {
        encap_decap_roundtrip::<MlKem768>();
    }

    #[test]
    fn test_mlkem1024_roundtrip() {
        encap_decap_roundtrip::<MlKem1024>();
    }

    #[test]
    fn test_encapsulate_rejects_wrong_public_key_length() {
        let prims = Primitives::<MlKem768>::init().unwrap();
        let err = prims.encapsulate(&[0u8; 1568]).unwrap_err();
        assert!(matches!(
            err,
            XkemError::InvalidPublicKeyLength { expected: 1184, actual: 1568 }
        ));
    }

    #[test]
    fn test_decapsulate_rejects_wrong_lengths() {
        let prims = Primitives::<MlKem1024>::init().unwrap();
        let kp = prims.generate_keypair().unwrap();
        let enc = prims.encapsulate(&kp.public_key).unwrap();

        let err = prims
            .decapsulate(&enc.kem_ciphertext[..100], kp.private_key.expose_secret())
            .unwrap_err();
        assert!(matches!(err, XkemError::InvalidCiphertextLength { .. }));

        let err = prims
            .decapsulate(&enc.kem_ciphertext, &kp.private_key.expose_secret()[..2400])
            .unwrap_err();
        assert!(matches!(err, XkemError::InvalidPrivateKeyLength { .. }));
    }

    #[test]
    fn test_wrong_private_key_gives_unrelated_secret() {
        let prims = Primitives::<MlKem768>::init().unwrap();
        let alice = prims.generate_keypair().unwrap();
        let mallory = prims.generate_keypair().unwrap();
        let enc = prims.encapsulate(&alice.public_key).unwrap();

        // Implicit rejection: no distinguishable error, just a different secret.
        let ss = prims
            .decapsulate(&enc.kem_ciphertext, mallory.private_key.expose_secret())
            .unwrap();
        assert_ne!(ss.as_bytes(), enc.shared_secret.as_bytes());
    }

    #[test]
    fn test_aead_roundtrip_and_size() {
        let prims = Primitives::<MlKem768>::init().unwrap();
        let key = ContentKey::from_bytes([3u8; KEY_SIZE]);
        let nonce = prims.fresh_nonce().unwrap();

        let ct = prims.aead_encrypt(&key, &nonce, b"attack at dawn").unwrap();
        assert_eq!(ct.len(), 14 + TAG_SIZE);
        let pt = prims.aead_decrypt(&key, &nonce, &ct).unwrap();
        assert_eq!(pt, b"attack at dawn");
    }

    #[test]
    fn test_aead_tamper_detected() {
        let prims = Primitives::<MlKem768>::init().unwrap();
        let key = ContentKey::from_bytes([3u8; KEY_SIZE]);
        let nonce = [1u8; NONCE_SIZE];

        let mut ct = prims.aead_encrypt(&key, &nonce, b"secret data").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        let err = prims.aead_decrypt(&key, &nonce, &ct).unwrap_err();
        assert!(matches!(err, XkemError::AuthenticationFailed));
    }

    #[test]
    fn test_fresh_nonces_differ() {
        let prims = Primitives::<MlKem768>::init().unwrap();
        let a = prims.fresh_nonce().unwrap();
        let b = prims.fresh_nonce().unwrap();
        assert_ne!(a, b);
    }
}
