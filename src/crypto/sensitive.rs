/// Buffers for secret material and plaintext that are wiped on drop.
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte sensitive value that is zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes32([u8; 32]);

impl SensitiveBytes32 {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for SensitiveBytes32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A variable-length sensitive buffer that is zeroized when dropped.
///
/// Deliberately not `Clone`: a payload has exactly one owner for its lifetime.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveVec(Vec<u8>);

impl SensitiveVec {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SensitiveVec {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl AsRef<[u8]> for SensitiveVec {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SensitiveVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SensitiveVec({} bytes)", self.0.len())
    }
}

/// Request payload as received from a log shipper.
pub type Plaintext = SensitiveVec;
