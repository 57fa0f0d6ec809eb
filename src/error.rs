use crate::block::BlockAddress;
use std::fmt::Display;
use thiserror::Error;

/// Errors surfaced by envelope construction, encoding and decoding
#[derive(Error, Debug)]
#[non_exhaustive]
pub struct EnvelopeError {
    /// What kind of error occurred
    pub kind: EnvelopeErrorKind,
}

impl EnvelopeError {
    /// Fewer bytes available than the fixed header needs
    pub fn short_header(available: usize) -> Self {
        Self {
            kind: EnvelopeErrorKind::ShortHeader(available),
        }
    }

    /// The signature preface did not match
    pub fn bad_signature() -> Self {
        Self {
            kind: EnvelopeErrorKind::BadSignature,
        }
    }

    /// The header carries a major version this reader does not speak
    pub fn unsupported_version(major: u8) -> Self {
        Self {
            kind: EnvelopeErrorKind::UnsupportedVersion(major),
        }
    }

    /// A referenced address has no index record
    pub fn unknown_block_address(address: BlockAddress) -> Self {
        Self {
            kind: EnvelopeErrorKind::UnknownBlockAddress(address),
        }
    }

    /// The index declared a type tag outside the closed enumeration
    pub fn unknown_block_type(tag: u8) -> Self {
        Self {
            kind: EnvelopeErrorKind::UnknownBlockType(tag),
        }
    }

    /// An object body was not a whole number of child addresses
    pub fn invalid_object_body() -> Self {
        Self {
            kind: EnvelopeErrorKind::InvalidObjectBody,
        }
    }

    /// An address block body did not span exactly one address
    pub fn invalid_address_size() -> Self {
        Self {
            kind: EnvelopeErrorKind::InvalidAddressSize,
        }
    }

    /// An integer key slot had an unsupported width
    pub fn invalid_int_key_size(size: usize) -> Self {
        Self {
            kind: EnvelopeErrorKind::InvalidIntKeySize(size),
        }
    }

    /// A float body was not the 8-byte IEEE-754 image
    pub fn invalid_float_body() -> Self {
        Self {
            kind: EnvelopeErrorKind::InvalidFloatBody,
        }
    }

    /// The index region could not be walked
    pub fn corrupt_index() -> Self {
        Self {
            kind: EnvelopeErrorKind::CorruptIndex,
        }
    }

    /// The blocks region ended mid-block
    pub fn end_of_data() -> Self {
        Self {
            kind: EnvelopeErrorKind::EndOfData,
        }
    }

    /// The allocation count can no longer be addressed
    pub fn address_width_exceeded() -> Self {
        Self {
            kind: EnvelopeErrorKind::AddressWidthExceeded,
        }
    }

    /// An address codec call asked for a width outside 1..=8
    pub fn invalid_address_width(width: usize) -> Self {
        Self {
            kind: EnvelopeErrorKind::InvalidAddressWidth(width),
        }
    }

    /// A single block payload crossed the u32 size field
    pub fn block_too_large(size: u64) -> Self {
        Self {
            kind: EnvelopeErrorKind::BlockTooLarge(size),
        }
    }

    /// The serialized index crossed the u32 size field
    pub fn index_too_large(size: u64) -> Self {
        Self {
            kind: EnvelopeErrorKind::IndexTooLarge(size),
        }
    }

    /// A single index record crossed the u16 size field
    pub fn key_record_too_large(size: usize) -> Self {
        Self {
            kind: EnvelopeErrorKind::KeyRecordTooLarge(size),
        }
    }

    /// A key buffer could not be interpreted as a supported key
    pub fn invalid_key_type() -> Self {
        Self {
            kind: EnvelopeErrorKind::InvalidKeyType,
        }
    }

    /// An input value has no block representation
    pub fn unsupported_type(description: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeErrorKind::UnsupportedType(description.into()),
        }
    }

    /// A stored checksum disagrees with the covered bytes
    pub fn checksum_mismatch() -> Self {
        Self {
            kind: EnvelopeErrorKind::ChecksumMismatch,
        }
    }

    /// Error performing IO operations
    pub fn io_error(err: std::io::Error) -> Self {
        Self {
            kind: EnvelopeErrorKind::Io(err),
        }
    }
}

/// Envelope error kinds
#[derive(Debug)]
#[non_exhaustive]
pub enum EnvelopeErrorKind {
    /// Fewer bytes than the 26-byte preamble
    ShortHeader(usize),
    /// First eight bytes are not the APO signature
    BadSignature,
    /// Major version nibble this reader must reject
    UnsupportedVersion(u8),
    /// Address with no corresponding index record
    UnknownBlockAddress(BlockAddress),
    /// Type tag outside the closed enumeration
    UnknownBlockType(u8),
    /// Object body not a multiple of the address width
    InvalidObjectBody,
    /// Address block body of the wrong width
    InvalidAddressSize,
    /// Integer key slot of unsupported width
    InvalidIntKeySize(usize),
    /// Float body that is not 8 bytes
    InvalidFloatBody,
    /// Unwalkable index region
    CorruptIndex,
    /// Truncated blocks region
    EndOfData,
    /// Too many allocations for the widest address
    AddressWidthExceeded,
    /// Address width outside 1..=8
    InvalidAddressWidth(usize),
    /// Block payload at or above 4 GiB
    BlockTooLarge(u64),
    /// Index buffer at or above 4 GiB
    IndexTooLarge(u64),
    /// Index record at or above 64 KiB
    KeyRecordTooLarge(usize),
    /// Key bytes that fit neither supported key shape
    InvalidKeyType,
    /// Input value with no block representation
    UnsupportedType(String),
    /// Stored checksum disagrees with the covered bytes
    ChecksumMismatch,
    /// IO Operation Error
    Io(std::io::Error),
    /// JSON pre-decoding Error
    Json(serde_json::Error),
}

impl Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = match &self.kind {
            EnvelopeErrorKind::ShortHeader(available) => {
                format!("APO header is too short: {available} bytes")
            }
            EnvelopeErrorKind::BadSignature => "not an APO file".to_string(),
            EnvelopeErrorKind::UnsupportedVersion(major) => {
                format!("unsupported APO major version: {major}")
            }
            EnvelopeErrorKind::UnknownBlockAddress(address) => {
                format!("block index with address {} does not exist", address.value())
            }
            EnvelopeErrorKind::UnknownBlockType(tag) => format!("invalid block type: {tag}"),
            EnvelopeErrorKind::InvalidObjectBody => {
                "object body is not a multiple of the address width".to_string()
            }
            EnvelopeErrorKind::InvalidAddressSize => "invalid address size".to_string(),
            EnvelopeErrorKind::InvalidIntKeySize(size) => {
                format!("invalid int key size: {size}")
            }
            EnvelopeErrorKind::InvalidFloatBody => {
                "float body must be exactly 8 bytes".to_string()
            }
            EnvelopeErrorKind::CorruptIndex => "corrupt block index".to_string(),
            EnvelopeErrorKind::EndOfData => "unexpected end of blocks data".to_string(),
            EnvelopeErrorKind::AddressWidthExceeded => {
                "maximum address size exceeded".to_string()
            }
            EnvelopeErrorKind::InvalidAddressWidth(width) => {
                format!("invalid address width: {width}")
            }
            EnvelopeErrorKind::BlockTooLarge(size) => {
                format!("block of {size} bytes exceeded maximum size of 4 GiB")
            }
            EnvelopeErrorKind::IndexTooLarge(size) => {
                format!("index of {size} bytes exceeded maximum size of 4 GiB")
            }
            EnvelopeErrorKind::KeyRecordTooLarge(size) => {
                format!("index record of {size} bytes exceeded maximum size of 64 KiB")
            }
            EnvelopeErrorKind::InvalidKeyType => "invalid key type".to_string(),
            EnvelopeErrorKind::UnsupportedType(description) => {
                format!("unsupported input type: {description}")
            }
            EnvelopeErrorKind::ChecksumMismatch => "checksum mismatch".to_string(),
            EnvelopeErrorKind::Io(err) => format!("IO ERROR: {err}"),
            EnvelopeErrorKind::Json(err) => format!("JSON ERROR: {err}"),
        };

        f.write_str(&string)
    }
}

impl From<std::io::Error> for EnvelopeError {
    fn from(value: std::io::Error) -> Self {
        Self::io_error(value)
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(value: serde_json::Error) -> Self {
        Self {
            kind: EnvelopeErrorKind::Json(value),
        }
    }
}
