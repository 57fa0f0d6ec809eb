use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
};
use std::io::Write;

impl Envelope {
    /// Allocate an Address block referencing another block
    pub fn add_address(&mut self, value: BlockAddress) -> Result<BlockAddress, EnvelopeError> {
        self.allocate_block(Block::Address(AddressBlock::new(value)))
    }
}

/// A first-class reference to another block. The payload is the target
/// address, so the full encoding spans two address widths.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct AddressBlock {
    address: BlockAddress,
    /// The referenced block
    pub value: BlockAddress,
}

impl AddressBlock {
    pub(crate) fn new(value: BlockAddress) -> Self {
        Self {
            address: BlockAddress::default(),
            value,
        }
    }

    pub(crate) fn decode(
        address: BlockAddress,
        body: &[u8],
        address_bytes: usize,
    ) -> Result<Self, EnvelopeError> {
        if body.len() != address_bytes {
            return Err(EnvelopeError::invalid_address_size());
        }

        Ok(Self {
            address,
            value: BlockAddress::from_bytes(body)?,
        })
    }

    /// Where this block lives in its envelope
    pub fn address(&self) -> BlockAddress {
        self.address
    }

    pub(crate) fn set_address(&mut self, address: BlockAddress) {
        self.address = address;
    }

    /// Serialize the payload, returning the byte count written
    pub fn encode<W: Write>(
        &self,
        address_bytes: usize,
        writer: &mut W,
    ) -> Result<usize, EnvelopeError> {
        let mut data = self.address.to_bytes(address_bytes)?;
        data.extend_from_slice(&self.value.to_bytes(address_bytes)?);
        writer.write_all(&data)?;
        Ok(data.len())
    }
}
