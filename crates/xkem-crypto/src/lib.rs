//! xkem-crypto: hybrid post-quantum file encryption
//!
//! A recipient's ML-KEM public key wraps a per-file AES-256-GCM key; the file
//! is sealed in independently authenticated chunks.
//!
//! Pipeline: public key → ML-KEM encapsulate → HKDF-SHA256 → content key → chunk AEAD
//!
//! Container layout (all integers big-endian):
//! ```text
//! Header: [magic "XKEM"][version u32 = 1][kem_ct_len u32][kem_ct]
//! Chunk*: [plaintext_len u32][nonce 12B][ciphertext || tag 16B]
//! ```
//!
//! ```text
//! ML-KEM shared secret (32 B, wiped after derivation)
//!   └── Content key = HKDF-SHA256(salt=none, info="XKEM-v1 content-encryption key")
//!       └── Chunk AEAD: AES-256-GCM (key=content key, nonce=random 96-bit, AAD=none)
//! ```

pub mod async_stream;
pub mod codec;
pub mod engine;
pub mod error;
pub mod kdf;
pub mod primitives;
pub mod secret;
pub mod stream;

pub use async_stream::{decrypt_async, encrypt_async};
pub use codec::{DecodeLimits, Header, ChunkFrame, MAGIC, VERSION};
pub use engine::{Decryptor, EngineState, Encryptor, PassSummary};
pub use error::{ErrorKind, XkemError, XkemResult};
pub use kdf::derive_content_key;
pub use primitives::{Encapsulation, KemScheme, Keypair, MlKem1024, MlKem768, Primitives};
pub use secret::{ContentKey, SharedSecret};
pub use stream::{
    decrypt, decrypt_from_slice, encrypt, encrypt_to_vec, encrypt_with, inspect, ContainerInfo,
};
pub use xkem_core::KemVariant;

/// Size of a content key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
