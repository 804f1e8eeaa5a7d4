//! Async drivers over `tokio::io`
//!
//! Same engines and framing as [`crate::stream`]; reads and writes are the
//! only await points. Dropping the returned future mid-pass drops the engine,
//! which zeroizes the content key.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::codec::{self, ChunkFrame, DecodeLimits, Header, CHUNK_PREFIX_LEN, HEADER_PREFIX_LEN};
use crate::engine::{Decryptor, Encryptor, PassSummary};
use crate::error::{XkemError, XkemResult};
use crate::primitives::{KemScheme, Primitives};
use crate::stream::check_chunk_size;

/// Async counterpart of [`crate::stream::encrypt`].
pub async fn encrypt_async<K, R, W>(
    primitives: &Primitives<K>,
    public_key: &[u8],
    reader: R,
    writer: W,
    chunk_size: usize,
) -> XkemResult<PassSummary>
where
    K: KemScheme,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut engine = Encryptor::new(primitives);
    let result = seal_all(&mut engine, public_key, reader, writer, chunk_size).await;
    let summary = engine.settle(result)?;
    info!(
        kem = %K::VARIANT,
        chunks = summary.chunks,
        bytes = summary.plaintext_bytes,
        "container encrypted"
    );
    Ok(summary)
}

async fn seal_all<K, R, W>(
    engine: &mut Encryptor<'_, K>,
    public_key: &[u8],
    mut reader: R,
    mut writer: W,
    chunk_size: usize,
) -> XkemResult<PassSummary>
where
    K: KemScheme,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    check_chunk_size(chunk_size)?;
    let header = engine.begin(public_key)?;
    writer.write_all(&header).await?;

    let mut buf = Zeroizing::new(vec![0u8; chunk_size]);
    loop {
        let n = read_full(&mut reader, &mut buf).await?;
        if n == 0 {
            break;
        }
        let frame = engine.seal_chunk(&buf[..n])?;
        writer.write_all(&frame).await?;
        debug!(chunk = engine.summary().chunks, len = n, "chunk sealed");
        if n < chunk_size {
            break;
        }
    }
    writer.flush().await?;
    engine.finish()
}

/// Async counterpart of [`crate::stream::decrypt`]. Plaintext reaches
/// `writer` only after every chunk has authenticated.
pub async fn decrypt_async<K, R, W>(
    primitives: &Primitives<K>,
    private_key: &[u8],
    mut reader: R,
    mut writer: W,
    limits: &DecodeLimits,
) -> XkemResult<PassSummary>
where
    K: KemScheme,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let header = read_header(&mut reader).await?;

    let mut engine = Decryptor::new(primitives);
    engine.begin(&header, private_key)?;

    let result = open_all(&mut engine, &mut reader, limits).await;
    let staged = engine.settle(result)?;
    let summary = engine.finish()?;

    for chunk in &staged {
        writer.write_all(chunk).await?;
    }
    writer.flush().await?;

    info!(
        kem = %K::VARIANT,
        chunks = summary.chunks,
        bytes = summary.plaintext_bytes,
        "container decrypted"
    );
    Ok(summary)
}

/// Authenticate every remaining frame, staging plaintext in zeroizing buffers.
async fn open_all<K: KemScheme, R: AsyncRead + Unpin>(
    engine: &mut Decryptor<'_, K>,
    reader: &mut R,
    limits: &DecodeLimits,
) -> XkemResult<Vec<Zeroizing<Vec<u8>>>> {
    let mut staged = Vec::new();
    while let Some(frame) = read_chunk(reader, limits).await? {
        staged.push(Zeroizing::new(engine.open_chunk(&frame)?));
        debug!(
            chunk = engine.summary().chunks,
            len = frame.plaintext_len(),
            "chunk authenticated"
        );
    }
    Ok(staged)
}

async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> XkemResult<Header> {
    let mut prefix = [0u8; HEADER_PREFIX_LEN];
    if read_full(reader, &mut prefix).await? < HEADER_PREFIX_LEN {
        return Err(XkemError::MalformedHeader("shorter than 12 bytes"));
    }
    let kem_len = codec::decode_header_prefix(&prefix)?;

    let mut kem_ciphertext = vec![0u8; kem_len];
    if read_full(reader, &mut kem_ciphertext).await? < kem_len {
        return Err(XkemError::MalformedHeader("KEM ciphertext truncated"));
    }
    Ok(Header::new(kem_ciphertext))
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &DecodeLimits,
) -> XkemResult<Option<ChunkFrame>> {
    let mut prefix = [0u8; CHUNK_PREFIX_LEN];
    let n = read_full(reader, &mut prefix).await?;
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
    let got = read_full(reader, &mut ciphertext_with_tag).await?;
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

async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
