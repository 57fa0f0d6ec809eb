use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
};
use std::io::Write;

impl Envelope {
    /// Allocate a Float block
    pub fn add_float(&mut self, value: f64) -> Result<BlockAddress, EnvelopeError> {
        self.allocate_block(Block::Float(FloatBlock::new(value)))
    }
}

/// An IEEE-754 double, stored as its 8 little-endian bit-pattern bytes
#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct FloatBlock {
    address: BlockAddress,
    /// The numeric payload
    pub value: f64,
}

impl FloatBlock {
    pub(crate) fn new(value: f64) -> Self {
        Self {
            address: BlockAddress::default(),
            value,
        }
    }

    pub(crate) fn decode(address: BlockAddress, body: &[u8]) -> Result<Self, EnvelopeError> {
        if body.len() != 8 {
            return Err(EnvelopeError::invalid_float_body());
        }

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(body);
        Ok(Self {
            address,
            value: f64::from_le_bytes(bytes),
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
        data.extend_from_slice(&self.value.to_le_bytes());
        writer.write_all(&data)?;
        Ok(data.len())
    }
}

#[cfg(test)]
mod test {
    use super::FloatBlock;
    use crate::{
        block::BlockAddress,
        error::{EnvelopeError, EnvelopeErrorKind},
    };

    #[test]
    fn to_from_bytes() -> Result<(), EnvelopeError> {
        let mut block = FloatBlock::new(13.37);
        block.set_address(BlockAddress(2));

        let mut bytes = Vec::new();
        let written = block.encode(1, &mut bytes)?;
        assert_eq!(written, 9);

        let decoded = FloatBlock::decode(BlockAddress(2), &bytes[1..])?;
        assert_eq!(decoded.value, 13.37);
        Ok(())
    }

    #[test]
    fn nan_survives_bit_exact() -> Result<(), EnvelopeError> {
        let block = FloatBlock::new(f64::NAN);
        let mut bytes = Vec::new();
        block.encode(1, &mut bytes)?;

        let decoded = FloatBlock::decode(BlockAddress(1), &bytes[1..])?;
        assert_eq!(decoded.value.to_bits(), f64::NAN.to_bits());
        Ok(())
    }

    #[test]
    fn wrong_body_size() {
        let err = FloatBlock::decode(BlockAddress(1), &[0x0; 7]).unwrap_err();
        assert!(matches!(err.kind, EnvelopeErrorKind::InvalidFloatBody));
    }
}
