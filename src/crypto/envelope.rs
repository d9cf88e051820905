/// Binary envelope sealed to a single X25519 recipient.
///
/// Format:
/// [magic "LSEAL"(5B) | version(1B) | mode(1B) | compression(1B) | eph_x25519_pk(32B) | nonce(24B) | body]
///
/// The envelope key is derived from an ephemeral-static X25519 exchange:
///   key = BLAKE3-derive(KDF_CONTEXT, shared_secret || eph_pk || recipient_pk)
/// The whole header is bound into the body as AAD. The ephemeral secret is
/// consumed by the exchange, so the sealing side cannot reopen what it wrote.
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroize;

use crate::crypto::aead::{self, NONCE_LEN, TAG_LEN};
use crate::crypto::hash;
use crate::crypto::sensitive::SensitiveBytes32;
use crate::crypto::streaming;
use crate::error::{LogsealError, Result};

pub const MAGIC: &[u8; 5] = b"LSEAL";
pub const ENVELOPE_VERSION: u8 = 0x01;
pub const COMPRESSION_ZLIB: u8 = 0x01;
pub const EPH_PK_LEN: usize = 32;
pub const HEADER_LEN: usize = MAGIC.len() + 3 + EPH_PK_LEN + NONCE_LEN;

const KDF_CONTEXT: &str = "logseal envelope v1 x25519";

/// How the body is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealMode {
    /// One AEAD call over the whole body.
    Single,
    /// Length-prefixed 64 KiB AEAD chunks.
    Chunked,
}

impl SealMode {
    fn to_byte(self) -> u8 {
        match self {
            SealMode::Single => 0x01,
            SealMode::Chunked => 0x02,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(SealMode::Single),
            0x02 => Some(SealMode::Chunked),
            _ => None,
        }
    }

    /// Size of the sealed body for `body_len` bytes of compressed input.
    pub fn sealed_body_len(self, body_len: usize) -> usize {
        match self {
            SealMode::Single => body_len + TAG_LEN,
            SealMode::Chunked => streaming::sealed_len(body_len),
        }
    }
}

/// Parsed envelope header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub version: u8,
    pub mode: SealMode,
    pub compression: u8,
    pub eph_x25519_pk: [u8; EPH_PK_LEN],
    pub nonce: [u8; NONCE_LEN],
}

impl EnvelopeHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut offset = 0;
        out[..MAGIC.len()].copy_from_slice(MAGIC);
        offset += MAGIC.len();
        out[offset] = self.version;
        out[offset + 1] = self.mode.to_byte();
        out[offset + 2] = self.compression;
        offset += 3;
        out[offset..offset + EPH_PK_LEN].copy_from_slice(&self.eph_x25519_pk);
        offset += EPH_PK_LEN;
        out[offset..offset + NONCE_LEN].copy_from_slice(&self.nonce);
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(LogsealError::Encryption(format!(
                "Envelope too short: {} bytes (minimum {})",
                data.len(),
                HEADER_LEN
            )));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(LogsealError::Encryption("Envelope magic mismatch".into()));
        }

        let mut offset = MAGIC.len();
        let version = data[offset];
        if version != ENVELOPE_VERSION {
            return Err(LogsealError::Encryption(format!(
                "Unsupported envelope version: {version}"
            )));
        }
        let mode = SealMode::from_byte(data[offset + 1]).ok_or_else(|| {
            LogsealError::Encryption(format!("Unknown seal mode: {}", data[offset + 1]))
        })?;
        let compression = data[offset + 2];
        if compression != COMPRESSION_ZLIB {
            return Err(LogsealError::Encryption(format!(
                "Unknown compression: {compression}"
            )));
        }
        offset += 3;

        let mut eph_x25519_pk = [0u8; EPH_PK_LEN];
        eph_x25519_pk.copy_from_slice(&data[offset..offset + EPH_PK_LEN]);
        offset += EPH_PK_LEN;

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[offset..offset + NONCE_LEN]);

        Ok(Self {
            version,
            mode,
            compression,
            eph_x25519_pk,
            nonce,
        })
    }
}

fn envelope_key(shared: &[u8; 32], eph_pk: &[u8; 32], recipient_pk: &[u8; 32]) -> SensitiveBytes32 {
    let mut ikm = Vec::with_capacity(96);
    ikm.extend_from_slice(shared);
    ikm.extend_from_slice(eph_pk);
    ikm.extend_from_slice(recipient_pk);

    let key = hash::derive_key(KDF_CONTEXT, &ikm);
    ikm.zeroize();

    SensitiveBytes32::new(key)
}

/// Seal compressed bytes to `recipient`.
pub fn seal(recipient: &PublicKey, compressed: &[u8], mode: SealMode) -> Result<Vec<u8>> {
    let eph_secret = EphemeralSecret::random_from_rng(OsRng);
    let eph_public = PublicKey::from(&eph_secret);
    let shared = eph_secret.diffie_hellman(recipient);

    if !shared.was_contributory() {
        return Err(LogsealError::Encryption(
            "Recipient public key is a low-order point".into(),
        ));
    }

    let key = envelope_key(shared.as_bytes(), eph_public.as_bytes(), recipient.as_bytes());
    drop(shared);

    let header = EnvelopeHeader {
        version: ENVELOPE_VERSION,
        mode,
        compression: COMPRESSION_ZLIB,
        eph_x25519_pk: eph_public.to_bytes(),
        nonce: aead::generate_nonce(),
    };
    let header_bytes = header.to_bytes();

    let body = match mode {
        SealMode::Single => {
            aead::encrypt_with_nonce(&key, &header.nonce, compressed, &header_bytes)?
        }
        SealMode::Chunked => {
            streaming::encrypt_chunked(&key, &header.nonce, compressed, &header_bytes)?
        }
    };

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Check a freshly sealed envelope against what sealing `body_len` bytes in
/// `mode` must have produced.
pub fn check_sealed(envelope: &[u8], mode: SealMode, body_len: usize) -> Result<()> {
    let header = EnvelopeHeader::parse(envelope)?;
    if header.mode != mode {
        return Err(LogsealError::Encryption(format!(
            "Envelope mode {:?} does not match requested {:?}",
            header.mode, mode
        )));
    }

    let expected = HEADER_LEN + mode.sealed_body_len(body_len);
    if envelope.len() != expected {
        return Err(LogsealError::Encryption(format!(
            "Envelope is {} bytes, expected {expected}",
            envelope.len()
        )));
    }
    Ok(())
}

/// Open an envelope with the recipient's secret key, returning the compressed body.
#[cfg(test)]
pub fn open(secret: &x25519_dalek::StaticSecret, envelope: &[u8]) -> Result<Vec<u8>> {
    let header = EnvelopeHeader::parse(envelope)?;
    let recipient_pk = PublicKey::from(secret);
    let eph_pk = PublicKey::from(header.eph_x25519_pk);
    let shared = secret.diffie_hellman(&eph_pk);

    let key = envelope_key(shared.as_bytes(), eph_pk.as_bytes(), recipient_pk.as_bytes());
    let header_bytes = header.to_bytes();
    let body = &envelope[HEADER_LEN..];

    match header.mode {
        SealMode::Single => aead::decrypt(&key, &header.nonce, body, &header_bytes),
        SealMode::Chunked => streaming::decrypt_chunked(&key, &header.nonce, body, &header_bytes),
    }
}
