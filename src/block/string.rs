use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
};
use std::io::Write;

impl Envelope {
    /// Allocate a String block from text or raw bytes
    pub fn add_string<B: AsRef<[u8]>>(&mut self, value: B) -> Result<BlockAddress, EnvelopeError> {
        self.allocate_block(Block::String(StringBlock::new(value.as_ref().to_vec())))
    }
}

/// Raw UTF-8 / opaque string bytes; the length is framed by the index record
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct StringBlock {
    address: BlockAddress,
    /// The string bytes
    pub value: Vec<u8>,
}

impl StringBlock {
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

    /// The payload as text, when it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
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
