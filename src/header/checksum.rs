use crc::{Crc, CRC_64_XZ};

// Reflected ECMA-182 polynomial, matching Go's crc64.ECMA table.
const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// A CRC-64 over a byte range, held as 8 little-endian bytes
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Checksum {
    /// The checksum bytes as they appear in the header
    pub value: [u8; 8],
    /// Whether the value has been confirmed against the covered bytes
    pub is_valid: bool,
}

impl Checksum {
    /// Checksum a byte range; a freshly computed value is always valid
    pub fn compute(buffer: &[u8]) -> Self {
        Self {
            value: CRC64.checksum(buffer).to_le_bytes(),
            is_valid: true,
        }
    }

    /// Wrap the raw bytes read back from a header
    pub(crate) fn from_bytes(value: [u8; 8]) -> Self {
        Self {
            value,
            is_valid: false,
        }
    }

    /// Whether this stored value matches a byte range
    pub fn matches(&self, buffer: &[u8]) -> bool {
        self.value == CRC64.checksum(buffer).to_le_bytes()
    }
}
