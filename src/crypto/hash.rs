/// BLAKE3 hashing utilities.
///
/// Used for envelope key derivation, recipient fingerprints, and the
/// content hash recorded next to each stored object.

/// Hash arbitrary data with BLAKE3.
pub fn hash(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Derive a key from input keying material using BLAKE3's key derivation mode.
/// Context should be a unique, hardcoded string identifying the usage.
pub fn derive_key(context: &str, ikm: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    let mut deriver = blake3::Hasher::new_derive_key(context);
    deriver.update(ikm);
    let mut reader = deriver.finalize_xof();
    reader.fill(&mut output);
    output
}
