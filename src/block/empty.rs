use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
};
use std::io::Write;

impl Envelope {
    /// Allocate a block with no payload
    pub fn add_empty(&mut self) -> Result<BlockAddress, EnvelopeError> {
        self.allocate_block(Block::Empty(EmptyBlock::new()))
    }
}

/// The null payload: a single zero byte after the address prefix
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct EmptyBlock {
    address: BlockAddress,
}

impl EmptyBlock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn decode(address: BlockAddress, _body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(Self { address })
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
        data.push(0x0);
        writer.write_all(&data)?;
        Ok(data.len())
    }
}

#[cfg(test)]
mod test {
    use super::EmptyBlock;
    use crate::{block::BlockAddress, error::EnvelopeError};

    #[test]
    fn payload_is_one_zero_byte() -> Result<(), EnvelopeError> {
        let mut block = EmptyBlock::new();
        block.set_address(BlockAddress(7));

        let mut bytes = Vec::new();
        let written = block.encode(2, &mut bytes)?;
        assert_eq!(written, 3);
        assert_eq!(bytes, vec![0x07, 0x00, 0x00]);
        Ok(())
    }
}
