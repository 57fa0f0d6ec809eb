use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
};
use std::io::Write;

impl Envelope {
    /// Allocate a Boolean block
    pub fn add_boolean(&mut self, value: bool) -> Result<BlockAddress, EnvelopeError> {
        self.allocate_block(Block::Boolean(BooleanBlock::new(value)))
    }
}

/// A single byte: 0x00 or 0x01
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct BooleanBlock {
    address: BlockAddress,
    /// The truth byte
    pub value: u8,
}

impl BooleanBlock {
    pub(crate) fn new(value: bool) -> Self {
        Self {
            address: BlockAddress::default(),
            value: if value { 0x1 } else { 0x0 },
        }
    }

    pub(crate) fn decode(address: BlockAddress, body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(Self {
            address,
            value: body.first().copied().unwrap_or(0x0),
        })
    }

    /// Where this block lives in its envelope
    pub fn address(&self) -> BlockAddress {
        self.address
    }

    pub(crate) fn set_address(&mut self, address: BlockAddress) {
        self.address = address;
    }

    /// The payload as a bool
    pub fn to_bool(&self) -> bool {
        self.value != 0x0
    }

    /// Serialize the payload, returning the byte count written
    pub fn encode<W: Write>(
        &self,
        address_bytes: usize,
        writer: &mut W,
    ) -> Result<usize, EnvelopeError> {
        let mut data = self.address.to_bytes(address_bytes)?;
        data.push(self.value);
        writer.write_all(&data)?;
        Ok(data.len())
    }
}
