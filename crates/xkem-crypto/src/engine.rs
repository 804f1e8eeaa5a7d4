//! Per-container encryption and decryption state machines
//!
//! ```text
//! Encryptor: Idle --begin--> HeaderEmitted --seal_chunk--> Streaming --finish--> Done
//! Decryptor: Idle --begin--> HeaderParsed  --open_chunk--> Streaming --finish--> Done
//!                         any error ----------------------------------------> Failed
//! ```
//!
//! `Done` and `Failed` are terminal. Entering either one wipes the content
//! key in place; dropping the engine wipes it as well. I/O lives in the
//! drivers in [`crate::stream`] and [`crate::async_stream`]; the engines only
//! ever see whole chunks.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::codec::{self, ChunkFrame, Header};
use crate::error::{XkemError, XkemResult};
use crate::kdf::derive_content_key;
use crate::primitives::{Encapsulation, KemScheme, Primitives};
use crate::secret::ContentKey;
use crate::NONCE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    HeaderEmitted,
    HeaderParsed,
    Streaming,
    Done,
    Failed,
}

/// Totals for one finished pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub chunks: u64,
    pub plaintext_bytes: u64,
}

/// State shared by both directions: content key, nonce ledger, counters.
#[derive(Debug)]
struct Pass {
    state: EngineState,
    key: Option<ContentKey>,
    nonces: HashSet<[u8; NONCE_SIZE]>,
    summary: PassSummary,
}

impl Pass {
    fn new() -> Self {
        Self {
            state: EngineState::Idle,
            key: None,
            nonces: HashSet::new(),
            summary: PassSummary::default(),
        }
    }

    fn require(&self, allowed: &[EngineState]) -> XkemResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(XkemError::InvalidState(self.state))
        }
    }

    fn key(&self) -> XkemResult<&ContentKey> {
        self.key.as_ref().ok_or(XkemError::InvalidState(self.state))
    }

    fn wipe(&mut self) {
        if let Some(key) = self.key.as_mut() {
            key.wipe();
        }
    }

    fn secrets_wiped(&self) -> bool {
        self.key.as_ref().map_or(true, ContentKey::is_wiped)
    }

    /// Move to `Failed` on error so no later call can reuse the key.
    fn track<T>(&mut self, result: XkemResult<T>) -> XkemResult<T> {
        if let Err(e) = &result {
            if self.state != EngineState::Failed {
                warn!(error = %e, state = ?self.state, "container pass failed");
            }
            self.state = EngineState::Failed;
            self.wipe();
        }
        result
    }

    fn finish(&mut self) -> XkemResult<PassSummary> {
        self.require(&[
            EngineState::HeaderEmitted,
            EngineState::HeaderParsed,
            EngineState::Streaming,
        ])?;
        self.state = EngineState::Done;
        self.wipe();
        Ok(self.summary)
    }
}

/// Encrypts one container for a recipient public key.
#[derive(Debug)]
pub struct Encryptor<'p, K: KemScheme> {
    primitives: &'p Primitives<K>,
    pass: Pass,
}

impl<'p, K: KemScheme> Encryptor<'p, K> {
    pub fn new(primitives: &'p Primitives<K>) -> Self {
        Self {
            primitives,
            pass: Pass::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.pass.state
    }

    pub fn summary(&self) -> PassSummary {
        self.pass.summary
    }

    /// True once the content key storage has been zeroed (or never existed).
    pub fn secrets_wiped(&self) -> bool {
        self.pass.secrets_wiped()
    }

    /// Run a driver-side result (sink or source I/O) through the same failure
    /// transition as the engine's own errors.
    pub fn settle<T>(&mut self, result: XkemResult<T>) -> XkemResult<T> {
        self.pass.track(result)
    }

    /// Encapsulate to `public_key`, derive the content key and return the
    /// encoded header.
    pub fn begin(&mut self, public_key: &[u8]) -> XkemResult<Vec<u8>> {
        let result = self.begin_inner(public_key);
        self.pass.track(result)
    }

    fn begin_inner(&mut self, public_key: &[u8]) -> XkemResult<Vec<u8>> {
        self.pass.require(&[EngineState::Idle])?;
        let Encapsulation {
            shared_secret,
            kem_ciphertext,
        } = self.primitives.encapsulate(public_key)?;
        self.pass.key = Some(derive_content_key(shared_secret)?);
        self.pass.state = EngineState::HeaderEmitted;
        debug!(kem = %K::VARIANT, "header emitted");
        Ok(codec::encode_header(&kem_ciphertext))
    }

    /// Encrypt the next plaintext chunk under a fresh nonce and return its
    /// wire frame.
    pub fn seal_chunk(&mut self, plaintext: &[u8]) -> XkemResult<Vec<u8>> {
        let result = self.seal_inner(plaintext);
        self.pass.track(result)
    }

    fn seal_inner(&mut self, plaintext: &[u8]) -> XkemResult<Vec<u8>> {
        self.pass
            .require(&[EngineState::HeaderEmitted, EngineState::Streaming])?;
        if u32::try_from(plaintext.len()).is_err() {
            return Err(XkemError::ChunkTooLarge {
                len: plaintext.len(),
                max: u32::MAX as usize,
            });
        }

        let nonce = self.primitives.fresh_nonce()?;
        // A repeat from a 96-bit CSPRNG means the entropy source is broken.
        if !self.pass.nonces.insert(nonce) {
            return Err(XkemError::DuplicateNonce);
        }

        let ciphertext = self
            .primitives
            .aead_encrypt(self.pass.key()?, &nonce, plaintext)?;
        let frame = codec::encode_chunk(&nonce, &ciphertext)?;

        self.pass.state = EngineState::Streaming;
        self.pass.summary.chunks += 1;
        self.pass.summary.plaintext_bytes += plaintext.len() as u64;
        Ok(frame)
    }

    /// Mark the container complete and wipe the content key.
    pub fn finish(&mut self) -> XkemResult<PassSummary> {
        let result = self.pass.finish();
        self.pass.track(result)
    }
}

/// Decrypts one container with a recipient private key.
#[derive(Debug)]
pub struct Decryptor<'p, K: KemScheme> {
    primitives: &'p Primitives<K>,
    pass: Pass,
}

impl<'p, K: KemScheme> Decryptor<'p, K> {
    pub fn new(primitives: &'p Primitives<K>) -> Self {
        Self {
            primitives,
            pass: Pass::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.pass.state
    }

    pub fn summary(&self) -> PassSummary {
        self.pass.summary
    }

    /// True once the content key storage has been zeroed (or never existed).
    pub fn secrets_wiped(&self) -> bool {
        self.pass.secrets_wiped()
    }

    /// Run a driver-side result (sink or source I/O) through the same failure
    /// transition as the engine's own errors.
    pub fn settle<T>(&mut self, result: XkemResult<T>) -> XkemResult<T> {
        self.pass.track(result)
    }

    /// Decapsulate the header's KEM ciphertext and derive the content key.
    pub fn begin(&mut self, header: &Header, private_key: &[u8]) -> XkemResult<()> {
        let result = self.begin_inner(header, private_key);
        self.pass.track(result)
    }

    fn begin_inner(&mut self, header: &Header, private_key: &[u8]) -> XkemResult<()> {
        self.pass.require(&[EngineState::Idle])?;
        if header.version != codec::VERSION {
            return Err(XkemError::UnsupportedVersion(header.version));
        }
        let shared = self
            .primitives
            .decapsulate(&header.kem_ciphertext, private_key)?;
        self.pass.key = Some(derive_content_key(shared)?);
        self.pass.state = EngineState::HeaderParsed;
        debug!(kem = %K::VARIANT, "header parsed");
        Ok(())
    }

    /// Authenticate and decrypt the next frame. Nothing is returned unless
    /// the tag verifies.
    pub fn open_chunk(&mut self, frame: &ChunkFrame) -> XkemResult<Vec<u8>> {
        let result = self.open_inner(frame);
        self.pass.track(result)
    }

    fn open_inner(&mut self, frame: &ChunkFrame) -> XkemResult<Vec<u8>> {
        self.pass
            .require(&[EngineState::HeaderParsed, EngineState::Streaming])?;
        if !self.pass.nonces.insert(frame.nonce) {
            return Err(XkemError::DuplicateNonce);
        }

        let plaintext = self.primitives.aead_decrypt(
            self.pass.key()?,
            &frame.nonce,
            &frame.ciphertext_with_tag,
        )?;

        self.pass.state = EngineState::Streaming;
        self.pass.summary.chunks += 1;
        self.pass.summary.plaintext_bytes += plaintext.len() as u64;
        Ok(plaintext)
    }

    /// Mark the container fully consumed and wipe the content key.
    pub fn finish(&mut self) -> XkemResult<PassSummary> {
        let result = self.pass.finish();
        self.pass.track(result)
    }
}
