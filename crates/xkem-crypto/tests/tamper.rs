//! Tamper detection and header robustness.

use proptest::prelude::*;
use secrecy::ExposeSecret;
use xkem_crypto::*;

const CHUNK: usize = 1000;

struct Fixture {
    prims: Primitives<MlKem768>,
    keypair: Keypair,
    plaintext: Vec<u8>,
    container: Vec<u8>,
}

fn fixture() -> Fixture {
    let prims = Primitives::<MlKem768>::init().unwrap();
    let keypair = prims.generate_keypair().unwrap();
    let plaintext: Vec<u8> = (0..2500u32).map(|i| (i % 200) as u8).collect();
    let container = encrypt_to_vec(&prims, &keypair.public_key, &plaintext, CHUNK).unwrap();
    Fixture {
        prims,
        keypair,
        plaintext,
        container,
    }
}

fn header_len() -> usize {
    12 + MlKem768::CIPHERTEXT_LEN
}

/// Decrypt into a sink and return the error plus whatever reached the sink.
fn decrypt_err(f: &Fixture, container: &[u8]) -> (XkemError, Vec<u8>) {
    let mut sink = Vec::new();
    let err = decrypt(
        &f.prims,
        f.keypair.private_key.expose_secret(),
        container,
        &mut sink,
        &DecodeLimits::default(),
    )
    .unwrap_err();
    (err, sink)
}

#[test]
fn untouched_container_decrypts() {
    let f = fixture();
    let out = decrypt_from_slice(
        &f.prims,
        f.keypair.private_key.expose_secret(),
        &f.container,
        &DecodeLimits::default(),
    )
    .unwrap();
    assert_eq!(out, f.plaintext);
}

#[test]
fn flipped_tag_fails_without_output() {
    let f = fixture();
    let mut tampered = f.container.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    let (err, sink) = decrypt_err(&f, &tampered);
    assert!(matches!(err, XkemError::AuthenticationFailed));
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    assert!(sink.is_empty(), "no plaintext may be released on failure");
}

#[test]
fn tampered_last_chunk_withholds_earlier_chunks() {
    let f = fixture();
    let mut tampered = f.container.clone();
    // Third chunk body starts after header + two full frames + its prefix
    let third_body = header_len() + 2 * (16 + CHUNK + 16) + 16;
    tampered[third_body] ^= 0x40;

    let (err, sink) = decrypt_err(&f, &tampered);
    assert!(matches!(err, XkemError::AuthenticationFailed));
    assert!(sink.is_empty());
}

#[test]
fn altered_length_field_fails() {
    let f = fixture();
    let mut tampered = f.container.clone();
    // Shrink the first chunk's declared length: framing desyncs and the tag
    // no longer covers the bytes read.
    let len_at = header_len();
    tampered[len_at + 3] ^= 0x01;

    let (err, sink) = decrypt_err(&f, &tampered);
    assert!(matches!(
        err,
        XkemError::AuthenticationFailed | XkemError::TruncatedChunk { .. }
    ));
    assert!(sink.is_empty());
}

#[test]
fn tampered_kem_ciphertext_looks_like_auth_failure() {
    let f = fixture();
    let mut tampered = f.container.clone();
    tampered[12 + 500] ^= 0x01;

    let (err, sink) = decrypt_err(&f, &tampered);
    assert!(matches!(err, XkemError::AuthenticationFailed));
    assert!(sink.is_empty());
}

#[test]
fn wrong_private_key_looks_like_auth_failure() {
    let f = fixture();
    let other = f.prims.generate_keypair().unwrap();
    let err = decrypt_from_slice(
        &f.prims,
        other.private_key.expose_secret(),
        &f.container,
        &DecodeLimits::default(),
    )
    .unwrap_err();
    assert!(matches!(err, XkemError::AuthenticationFailed));
}

#[test]
fn wrong_variant_private_key_rejected_by_length() {
    let f = fixture();
    let prims = Primitives::<MlKem1024>::init().unwrap();
    let other = prims.generate_keypair().unwrap();
    let err = decrypt_from_slice(
        &prims,
        other.private_key.expose_secret(),
        &f.container,
        &DecodeLimits::default(),
    )
    .unwrap_err();
    // 768 container read with the 1024 scheme: the KEM ciphertext is the wrong size
    assert!(matches!(err, XkemError::InvalidCiphertextLength { .. }));
    assert_eq!(err.kind(), ErrorKind::InputValidation);
}

#[test]
fn truncated_header_rejected() {
    let f = fixture();
    for len in [0, 3, 11] {
        let (err, _) = decrypt_err(&f, &f.container[..len]);
        assert!(matches!(err, XkemError::MalformedHeader(_)), "len {len}: {err}");
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }
    let (err, _) = decrypt_err(&f, &f.container[..header_len() - 1]);
    assert!(matches!(err, XkemError::MalformedHeader(_)));
}

#[test]
fn corrupted_magic_rejected() {
    let f = fixture();
    let mut tampered = f.container.clone();
    tampered[..4].copy_from_slice(b"ZKEM");
    let (err, _) = decrypt_err(&f, &tampered);
    assert!(matches!(err, XkemError::MagicMismatch));
}

#[test]
fn unsupported_version_rejected() {
    let f = fixture();
    let mut tampered = f.container.clone();
    tampered[4..8].copy_from_slice(&7u32.to_be_bytes());
    let (err, _) = decrypt_err(&f, &tampered);
    assert!(matches!(err, XkemError::UnsupportedVersion(7)));
}

#[test]
fn trailing_partial_chunk_rejected() {
    let f = fixture();
    let mut tampered = f.container.clone();
    tampered.extend_from_slice(&[0u8; 9]);
    let (err, sink) = decrypt_err(&f, &tampered);
    assert!(matches!(err, XkemError::TruncatedChunk { needed: 16, available: 9 }));
    assert!(sink.is_empty());
}

#[test]
fn cut_inside_chunk_body_rejected() {
    let f = fixture();
    let cut = f.container.len() - 5;
    let (err, sink) = decrypt_err(&f, &f.container[..cut]);
    assert!(matches!(err, XkemError::TruncatedChunk { .. }));
    assert!(sink.is_empty());
}

#[test]
fn duplicated_chunk_rejected() {
    let f = fixture();
    let frame_len = 16 + CHUNK + 16;
    let first = header_len()..header_len() + frame_len;
    let mut tampered = f.container.clone();
    tampered.extend_from_slice(&f.container[first]);

    let (err, sink) = decrypt_err(&f, &tampered);
    assert!(matches!(err, XkemError::DuplicateNonce));
    assert!(sink.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_ciphertext_bit_flip_detected(offset in 0usize..2500 + 3 * 16, bit in 0u8..8) {
        let f = fixture();
        // Map `offset` onto the ciphertext+tag bytes of the three chunks
        let sizes = [CHUNK + 16, CHUNK + 16, 500 + 16];
        let mut remaining = offset;
        let mut position = header_len();
        for size in sizes {
            if remaining < size {
                position += 16 + remaining;
                break;
            }
            remaining -= size;
            position += 16 + size;
        }

        let mut tampered = f.container.clone();
        tampered[position] ^= 1 << bit;

        let (err, sink) = decrypt_err(&f, &tampered);
        prop_assert!(matches!(err, XkemError::AuthenticationFailed));
        prop_assert!(sink.is_empty());
    }
}
