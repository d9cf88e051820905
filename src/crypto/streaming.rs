/// Chunked AEAD for large payloads.
///
/// Bodies above the configured threshold are split into 64 KiB chunks.
/// Each chunk is sealed with the envelope key and a unique nonce:
///   chunk_nonce = base_nonce XOR chunk_index
/// The last chunk carries a "final" flag in its AAD so a truncated body
/// cannot pass as a complete one.
use crate::crypto::aead::{self, NONCE_LEN, TAG_LEN};
use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::Result;

pub const CHUNK_SIZE: usize = 64 * 1024;

/// Length prefix in front of every sealed chunk.
const CHUNK_HEADER_LEN: usize = 4;

fn chunk_nonce(base: &[u8; NONCE_LEN], index: u64) -> [u8; NONCE_LEN] {
    let mut nonce = *base;
    for (n, b) in nonce.iter_mut().zip(index.to_le_bytes()) {
        *n ^= b;
    }
    nonce
}

fn chunk_aad(base_aad: &[u8], index: u64, is_final: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(base_aad.len() + 9);
    aad.extend_from_slice(base_aad);
    aad.extend_from_slice(&index.to_le_bytes());
    aad.push(u8::from(is_final));
    aad
}

fn chunk_count(plaintext_len: usize) -> usize {
    plaintext_len.div_ceil(CHUNK_SIZE).max(1)
}

/// Exact size of the chunked output for a plaintext of `plaintext_len` bytes.
pub fn sealed_len(plaintext_len: usize) -> usize {
    plaintext_len + chunk_count(plaintext_len) * (CHUNK_HEADER_LEN + TAG_LEN)
}

/// Encrypt data in chunks. Each chunk: [chunk_len(4 LE) | encrypted_chunk_with_tag]
pub fn encrypt_chunked(
    key: &SensitiveBytes32,
    base_nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    base_aad: &[u8],
) -> Result<Vec<u8>> {
    let total_chunks = chunk_count(plaintext.len());
    let mut output = Vec::with_capacity(sealed_len(plaintext.len()));

    for i in 0..total_chunks {
        let start = i * CHUNK_SIZE;
        let end = std::cmp::min(start + CHUNK_SIZE, plaintext.len());
        let is_final = i == total_chunks - 1;

        let aad = chunk_aad(base_aad, i as u64, is_final);
        let nonce = chunk_nonce(base_nonce, i as u64);
        let encrypted = aead::encrypt_with_nonce(key, &nonce, &plaintext[start..end], &aad)?;

        output.extend_from_slice(&(encrypted.len() as u32).to_le_bytes());
        output.extend_from_slice(&encrypted);
    }

    Ok(output)
}

#[cfg(test)]
pub fn decrypt_chunked(
    key: &SensitiveBytes32,
    base_nonce: &[u8; NONCE_LEN],
    data: &[u8],
    base_aad: &[u8],
) -> Result<Vec<u8>> {
    use crate::error::LogsealError;

    let mut plaintext = Vec::new();
    let mut offset = 0;
    let mut index: u64 = 0;

    while offset < data.len() {
        let header = data
            .get(offset..offset + CHUNK_HEADER_LEN)
            .ok_or_else(|| LogsealError::Encryption("truncated chunk header".into()))?;
        let chunk_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        offset += CHUNK_HEADER_LEN;

        let chunk = data
            .get(offset..offset + chunk_len)
            .ok_or_else(|| LogsealError::Encryption("truncated chunk data".into()))?;
        offset += chunk_len;

        let aad = chunk_aad(base_aad, index, offset >= data.len());
        let nonce = chunk_nonce(base_nonce, index);
        plaintext.extend_from_slice(&aead::decrypt(key, &nonce, chunk, &aad)?);
        index += 1;
    }

    Ok(plaintext)
}
