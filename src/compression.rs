/// zlib compression applied before sealing.
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::crypto::sensitive::SensitiveVec;
use crate::error::{LogsealError, Result};

/// Upper bound on zlib output for `len` input bytes, with room to spare.
///
/// Incompressible input falls back to stored blocks (5 bytes per 64 KiB)
/// plus a 6 byte zlib wrapper; this bound covers both comfortably.
pub fn compress_bound(len: usize) -> usize {
    len + len / 64 + 128
}

/// Compress `input` as a single zlib stream.
///
/// The output still reveals the payload to anyone who can inflate it, so it
/// is held in a zeroizing buffer until it has been sealed. The buffer is
/// sized up front so it never reallocates and leaves an unwiped copy behind.
/// The encoder's own 32 KiB staging buffer is not wiped.
pub fn compress(input: &[u8]) -> Result<SensitiveVec> {
    let mut enc = ZlibEncoder::new(
        Vec::with_capacity(compress_bound(input.len())),
        Compression::default(),
    );
    enc.write_all(input)
        .map_err(|e| LogsealError::Compression(e.to_string()))?;
    let compressed = enc
        .finish()
        .map_err(|e| LogsealError::Compression(e.to_string()))?;
    Ok(SensitiveVec::new(compressed))
}

#[cfg(test)]
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut dec = flate2::read::ZlibDecoder::new(input);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)
        .map_err(|e| LogsealError::Compression(e.to_string()))?;
    Ok(out)
}
