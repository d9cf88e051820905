/// Sealing primitives.
///
/// Nothing in this module can decrypt outside of tests: envelopes are sealed
/// to a recipient public key with an ephemeral secret that is consumed by
/// the key exchange.
pub mod aead;
pub mod envelope;
pub mod hash;
pub mod sensitive;
pub mod streaming;
