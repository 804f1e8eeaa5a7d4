//! Blocking drivers: run the engines over `std::io::Read` / `Write`
//!
//! Encryption writes each frame as soon as it is sealed. Decryption stages
//! authenticated plaintext in zeroizing buffers and only writes to the sink
//! after every chunk has verified, so a tampered container never leaks a
//! prefix of its plaintext.

use std::io::{self, Read, Write};

use serde::Serialize;
use tracing::{debug, info};
use xkem_core::KemVariant;
use zeroize::Zeroizing;

use crate::codec::{
    self, ChunkFrame, DecodeLimits, Header, CHUNK_PREFIX_LEN, HEADER_PREFIX_LEN,
};
use crate::engine::{Decryptor, Encryptor, PassSummary};
use crate::error::{XkemError, XkemResult};
use crate::primitives::{KemScheme, Primitives};
use crate::TAG_SIZE;

/// Encrypt everything `reader` yields into a container written to `writer`.
///
/// `chunk_size` is the plaintext length of every chunk except possibly the
/// last. Empty input produces a header with no chunks.
pub fn encrypt<K, R, W>(
    primitives: &Primitives<K>,
    public_key: &[u8],
    reader: R,
    writer: W,
    chunk_size: usize,
) -> XkemResult<PassSummary>
where
    K: KemScheme,
    R: Read,
    W: Write,
{
    let mut engine = Encryptor::new(primitives);
    encrypt_with(&mut engine, public_key, reader, writer, chunk_size)
}

/// [`encrypt`] driving a caller-owned engine. Any failure, including one
/// from `reader` or `writer`, leaves `engine` in `Failed` with its key wiped.
pub fn encrypt_with<K, R, W>(
    engine: &mut Encryptor<'_, K>,
    public_key: &[u8],
    reader: R,
    writer: W,
    chunk_size: usize,
) -> XkemResult<PassSummary>
where
    K: KemScheme,
    R: Read,
    W: Write,
{
    let result = seal_all(engine, public_key, reader, writer, chunk_size);
    let summary = engine.settle(result)?;
    info!(
        kem = %K::VARIANT,
        chunks = summary.chunks,
        bytes = summary.plaintext_bytes,
        "container encrypted"
    );
    Ok(summary)
}

fn seal_all<K, R, W>(
    engine: &mut Encryptor<'_, K>,
    public_key: &[u8],
    mut reader: R,
    mut writer: W,
    chunk_size: usize,
) -> XkemResult<PassSummary>
where
    K: KemScheme,
    R: Read,
    W: Write,
{
    check_chunk_size(chunk_size)?;
    writer.write_all(&engine.begin(public_key)?)?;

    let mut buf = Zeroizing::new(vec![0u8; chunk_size]);
    loop {
        let n = read_full(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let frame = engine.seal_chunk(&buf[..n])?;
        writer.write_all(&frame)?;
        debug!(chunk = engine.summary().chunks, len = n, "chunk sealed");
        if n < chunk_size {
            break;
        }
    }
    writer.flush()?;
    engine.finish()
}

/// Decrypt a container from `reader`, writing the plaintext to `writer` only
/// once every chunk has authenticated.
pub fn decrypt<K, R, W>(
    primitives: &Primitives<K>,
    private_key: &[u8],
    mut reader: R,
    mut writer: W,
    limits: &DecodeLimits,
) -> XkemResult<PassSummary>
where
    K: KemScheme,
    R: Read,
    W: Write,
{
    let header = read_header(&mut reader)?;

    let mut engine = Decryptor::new(primitives);
    engine.begin(&header, private_key)?;

    let result = open_all(&mut engine, &mut reader, limits);
    let staged = engine.settle(result)?;
    let summary = engine.finish()?;

    for chunk in &staged {
        writer.write_all(chunk)?;
    }
    writer.flush()?;

    info!(
        kem = %K::VARIANT,
        chunks = summary.chunks,
        bytes = summary.plaintext_bytes,
        "container decrypted"
    );
    Ok(summary)
}

/// Encrypt an in-memory buffer.
pub fn encrypt_to_vec<K: KemScheme>(
    primitives: &Primitives<K>,
    public_key: &[u8],
    plaintext: &[u8],
    chunk_size: usize,
) -> XkemResult<Vec<u8>> {
    let mut out = Vec::with_capacity(container_len_hint::<K>(plaintext.len(), chunk_size));
    encrypt(primitives, public_key, plaintext, &mut out, chunk_size)?;
    Ok(out)
}

/// Decrypt an in-memory container.
pub fn decrypt_from_slice<K: KemScheme>(
    primitives: &Primitives<K>,
    private_key: &[u8],
    container: &[u8],
    limits: &DecodeLimits,
) -> XkemResult<Vec<u8>> {
    let mut out = Vec::new();
    decrypt(primitives, private_key, container, &mut out, limits)?;
    Ok(out)
}

/// Framing summary of a container, computed without any key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub version: u32,
    pub kem_variant: Option<KemVariant>,
    pub kem_ciphertext_len: usize,
    pub chunks: u64,
    pub plaintext_len: u64,
    pub container_len: u64,
}

/// Walk the header and chunk framing of a container, applying the same
/// structural checks as decryption. Chunk bodies are skipped, not stored.
pub fn inspect<R: Read>(mut reader: R, limits: &DecodeLimits) -> XkemResult<ContainerInfo> {
    let header = read_header(&mut reader)?;
    let mut info = ContainerInfo {
        version: header.version,
        kem_variant: header.kem_variant(),
        kem_ciphertext_len: header.kem_ciphertext.len(),
        chunks: 0,
        plaintext_len: 0,
        container_len: header.encoded_len() as u64,
    };

    let mut prefix = [0u8; CHUNK_PREFIX_LEN];
    loop {
        let n = read_full(&mut reader, &mut prefix)?;
        if n == 0 {
            break;
        }
        if n < CHUNK_PREFIX_LEN {
            return Err(XkemError::TruncatedChunk {
                needed: CHUNK_PREFIX_LEN,
                available: n,
            });
        }
        let (body_len, _) = codec::decode_chunk_prefix(&prefix, limits)?;
        let skipped = io::copy(&mut (&mut reader).take(body_len as u64), &mut io::sink())?;
        if skipped < body_len as u64 {
            return Err(XkemError::TruncatedChunk {
                needed: body_len,
                available: skipped as usize,
            });
        }
        info.chunks += 1;
        info.plaintext_len += (body_len - TAG_SIZE) as u64;
        info.container_len += (CHUNK_PREFIX_LEN + body_len) as u64;
    }
    Ok(info)
}

/// Exact container size for `plaintext_len` bytes split at `chunk_size`.
pub fn container_len_hint<K: KemScheme>(plaintext_len: usize, chunk_size: usize) -> usize {
    let chunks = if chunk_size == 0 {
        0
    } else {
        plaintext_len.div_ceil(chunk_size)
    };
    HEADER_PREFIX_LEN + K::CIPHERTEXT_LEN + plaintext_len + chunks * (CHUNK_PREFIX_LEN + TAG_SIZE)
}

pub(crate) fn check_chunk_size(chunk_size: usize) -> XkemResult<()> {
    if chunk_size == 0 || u32::try_from(chunk_size).is_err() {
        return Err(XkemError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

/// Authenticate every remaining frame, staging plaintext in zeroizing buffers.
fn open_all<K: KemScheme, R: Read>(
    engine: &mut Decryptor<'_, K>,
    reader: &mut R,
    limits: &DecodeLimits,
) -> XkemResult<Vec<Zeroizing<Vec<u8>>>> {
    let mut staged = Vec::new();
    while let Some(frame) = read_chunk(reader, limits)? {
        staged.push(Zeroizing::new(engine.open_chunk(&frame)?));
        debug!(
            chunk = engine.summary().chunks,
            len = frame.plaintext_len(),
            "chunk authenticated"
        );
    }
    Ok(staged)
}

fn read_header<R: Read>(reader: &mut R) -> XkemResult<Header> {
    let mut prefix = [0u8; HEADER_PREFIX_LEN];
    if read_full(reader, &mut prefix)? < HEADER_PREFIX_LEN {
        return Err(XkemError::MalformedHeader("shorter than 12 bytes"));
    }
    let kem_len = codec::decode_header_prefix(&prefix)?;

    let mut kem_ciphertext = vec![0u8; kem_len];
    if read_full(reader, &mut kem_ciphertext)? < kem_len {
        return Err(XkemError::MalformedHeader("KEM ciphertext truncated"));
    }
    Ok(Header::new(kem_ciphertext))
}

/// Read the next frame, or `None` at a clean end of input.
fn read_chunk<R: Read>(reader: &mut R, limits: &DecodeLimits) -> XkemResult<Option<ChunkFrame>> {
    let mut prefix = [0u8; CHUNK_PREFIX_LEN];
    let n = read_full(reader, &mut prefix)?;
    if n == 0 {
        return Ok(None);
    }
    if n < CHUNK_PREFIX_LEN {
        return Err(XkemError::TruncatedChunk {
            needed: CHUNK_PREFIX_LEN,
            available: n,
        });
    }
    let (body_len, nonce) = codec::decode_chunk_prefix(&prefix, limits)?;

    let mut ciphertext_with_tag = vec![0u8; body_len];
    let got = read_full(reader, &mut ciphertext_with_tag)?;
    if got < body_len {
        return Err(XkemError::TruncatedChunk {
            needed: body_len,
            available: got,
        });
    }
    Ok(Some(ChunkFrame {
        nonce,
        ciphertext_with_tag,
    }))
}

/// Fill `buf` unless the reader hits EOF first; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
