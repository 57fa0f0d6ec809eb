/// CRC-64 checksums over the index and blocks buffers
mod checksum;
/// One-byte major/minor version
mod version;

pub use checksum::Checksum;
pub use version::Version;

use crate::error::EnvelopeError;
use std::io::Write;

/// Fixed size of the envelope preamble
pub const HEADER_SIZE: usize = 26;

/// The 8-byte magic preface identifying the format
pub const SIGNATURE: [u8; 8] = [0x89, 0x41, 0x50, 0x4F, 0x0D, 0x0A, 0x1A, 0x0A];

const IS_EXTENSION_FLAG: u8 = 0x8;
const ENABLE_MEMORY_OPTIMIZATION_FLAG: u8 = 0x4;

/// Envelope preamble
/// | 8-byte signature | 1-byte version | 1-byte flags | 8-byte index CRC | 8-byte blocks CRC |
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Header {
    /// Format version; decode rejects unknown majors
    pub version: Version,
    /// CRC-64 over the serialized index buffer
    pub index_checksum: Checksum,
    /// CRC-64 over the serialized blocks buffer
    pub blocks_checksum: Checksum,
    /// This envelope extends some outer envelope
    pub is_extension: bool,
    /// Reserved compact-encoding switch; recorded but without effect
    pub enable_memory_optimization: bool,
    /// Width in bytes of every serialized address, 1..=8
    pub address_bytes: usize,
}

impl Header {
    /// A header for an empty envelope
    pub fn new() -> Self {
        Self {
            version: Version::CURRENT,
            index_checksum: Checksum::default(),
            blocks_checksum: Checksum::default(),
            is_extension: false,
            enable_memory_optimization: false,
            address_bytes: 1,
        }
    }

    /// Write the 26 header bytes
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<usize, EnvelopeError> {
        if !(1..=8).contains(&self.address_bytes) {
            return Err(EnvelopeError::invalid_address_width(self.address_bytes));
        }

        let mut data = Vec::with_capacity(HEADER_SIZE);
        data.extend_from_slice(&SIGNATURE);
        data.push(self.version.to_byte());

        // Bits [7..4] hold AddressBytes - 1; bits [1..0] stay reserved
        let mut flags = ((self.address_bytes - 1) as u8) << 4;
        if self.is_extension {
            flags |= IS_EXTENSION_FLAG;
        }
        if self.enable_memory_optimization {
            flags |= ENABLE_MEMORY_OPTIMIZATION_FLAG;
        }
        data.push(flags);

        data.extend_from_slice(&self.index_checksum.value);
        data.extend_from_slice(&self.blocks_checksum.value);

        writer.write_all(&data)?;
        Ok(data.len())
    }

    /// Read a header back from the front of an envelope image
    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        if data.len() < HEADER_SIZE {
            return Err(EnvelopeError::short_header(data.len()));
        }

        if data[0..8] != SIGNATURE {
            return Err(EnvelopeError::bad_signature());
        }

        let version = Version::from_byte(data[8]);
        if version.major != Version::CURRENT.major {
            return Err(EnvelopeError::unsupported_version(version.major));
        }

        let flags = data[9];
        let address_bytes = ((flags >> 4) & 0x07) as usize + 1;

        let mut index_value = [0u8; 8];
        index_value.copy_from_slice(&data[10..18]);
        let mut blocks_value = [0u8; 8];
        blocks_value.copy_from_slice(&data[18..26]);

        Ok(Self {
            version,
            index_checksum: Checksum::from_bytes(index_value),
            blocks_checksum: Checksum::from_bytes(blocks_value),
            is_extension: (flags & IS_EXTENSION_FLAG) == IS_EXTENSION_FLAG,
            enable_memory_optimization: (flags & ENABLE_MEMORY_OPTIMIZATION_FLAG)
                == ENABLE_MEMORY_OPTIMIZATION_FLAG,
            address_bytes,
        })
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}
