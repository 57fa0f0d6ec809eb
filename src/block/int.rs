use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
};
use std::io::Write;

impl Envelope {
    /// Allocate an Int block; the sign lands in the index `A` flag, the
    /// magnitude width follows the source type
    pub fn add_int<I: Into<IntInput>>(&mut self, input: I) -> Result<BlockAddress, EnvelopeError> {
        let (value, is_negative) = input.into().to_magnitude();
        let address = self.allocate_block(Block::Int(IntBlock::new(value)))?;
        self.set_is_negative(address, is_negative)?;
        Ok(address)
    }
}

/// An integer input of any supported source width
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IntInput {
    /// 8-bit signed
    I8(i8),
    /// 16-bit signed
    I16(i16),
    /// 32-bit signed
    I32(i32),
    /// 64-bit signed
    I64(i64),
    /// 8-bit unsigned
    U8(u8),
    /// 16-bit unsigned
    U16(u16),
    /// 32-bit unsigned
    U32(u32),
    /// 64-bit unsigned
    U64(u64),
}

impl IntInput {
    /// Split into little-endian magnitude bytes and a sign.
    ///
    /// Width table:
    /// | source | slot |
    /// |---|---|
    /// | i8 i16 u8 u16 | 2 bytes |
    /// | i32 u32 | 4 bytes |
    /// | i64 u64 | 8 bytes |
    fn to_magnitude(self) -> (Vec<u8>, bool) {
        match self {
            IntInput::I8(value) => (
                (value.unsigned_abs() as u16).to_le_bytes().to_vec(),
                value < 0,
            ),
            IntInput::I16(value) => (value.unsigned_abs().to_le_bytes().to_vec(), value < 0),
            IntInput::I32(value) => (value.unsigned_abs().to_le_bytes().to_vec(), value < 0),
            IntInput::I64(value) => (value.unsigned_abs().to_le_bytes().to_vec(), value < 0),
            IntInput::U8(value) => ((value as u16).to_le_bytes().to_vec(), false),
            IntInput::U16(value) => (value.to_le_bytes().to_vec(), false),
            IntInput::U32(value) => (value.to_le_bytes().to_vec(), false),
            IntInput::U64(value) => (value.to_le_bytes().to_vec(), false),
        }
    }
}

impl From<i8> for IntInput {
    fn from(value: i8) -> Self {
        Self::I8(value)
    }
}

impl From<i16> for IntInput {
    fn from(value: i16) -> Self {
        Self::I16(value)
    }
}

impl From<i32> for IntInput {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<i64> for IntInput {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<u8> for IntInput {
    fn from(value: u8) -> Self {
        Self::U8(value)
    }
}

impl From<u16> for IntInput {
    fn from(value: u16) -> Self {
        Self::U16(value)
    }
}

impl From<u32> for IntInput {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<u64> for IntInput {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

/// A raw little-endian unsigned magnitude, 2, 4 or 8 bytes wide; the sign
/// lives in the owning index record
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct IntBlock {
    address: BlockAddress,
    /// The magnitude bytes
    pub value: Vec<u8>,
}

impl IntBlock {
    pub(crate) fn new(value: Vec<u8>) -> Self {
        Self {
            address: BlockAddress::default(),
            value,
        }
    }

    pub(crate) fn decode(address: BlockAddress, body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(Self {
            address,
            value: body.to_vec(),
        })
    }

    /// Where this block lives in its envelope
    pub fn address(&self) -> BlockAddress {
        self.address
    }

    pub(crate) fn set_address(&mut self, address: BlockAddress) {
        self.address = address;
    }

    /// The zero-extended magnitude
    pub fn magnitude(&self) -> u64 {
        let mut bytes = [0u8; 8];
        let len = self.value.len().min(8);
        bytes[..len].copy_from_slice(&self.value[..len]);
        u64::from_le_bytes(bytes)
    }

    /// Reapply a sign to the magnitude
    pub fn to_i64(&self, is_negative: bool) -> i64 {
        if is_negative {
            0i64.wrapping_sub(self.magnitude() as i64)
        } else {
            self.magnitude() as i64
        }
    }

    /// Serialize the payload, returning the byte count written
    pub fn encode<W: Write>(
        &self,
        address_bytes: usize,
        writer: &mut W,
    ) -> Result<usize, EnvelopeError> {
        let mut data = self.address.to_bytes(address_bytes)?;
        data.extend_from_slice(&self.value);
        writer.write_all(&data)?;
        Ok(data.len())
    }
}
