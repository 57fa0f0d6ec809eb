use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
};
use std::{io::Write, path::Path};
use tracing::debug;

impl Envelope {
    /// Allocate a Binary block from in-memory bytes
    pub fn add_binary(&mut self, data: Vec<u8>) -> Result<BlockAddress, EnvelopeError> {
        self.allocate_block(Block::Binary(BinaryBlock::new(data)))
    }

    /// Attach a file as a new Binary block. The file name and a sniffed MIME
    /// type are recorded on the block but never persisted on the wire.
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> Result<BlockAddress, EnvelopeError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        debug!("attaching {} ({} bytes)", path.display(), data.len());

        let mut block = BinaryBlock::new(data);
        block.mime = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        block.name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        self.allocate_block(Block::Binary(block))
    }
}

/// Arbitrary bytes with optional in-memory MIME and file name metadata
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct BinaryBlock {
    address: BlockAddress,
    /// Sniffed media type, if any
    pub mime: Option<String>,
    /// Original file name, if any
    pub name: Option<String>,
    /// The payload bytes
    pub data: Vec<u8>,
}

impl BinaryBlock {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            address: BlockAddress::default(),
            mime: None,
            name: None,
            data,
        }
    }

    pub(crate) fn decode(address: BlockAddress, body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(Self {
            address,
            mime: None,
            name: None,
            data: body.to_vec(),
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
        data.extend_from_slice(&self.data);
        writer.write_all(&data)?;
        Ok(data.len())
    }
}

#[cfg(test)]
mod test {
    use super::BinaryBlock;
    use crate::{block::BlockAddress, error::EnvelopeError};

    #[test]
    fn to_from_bytes() -> Result<(), EnvelopeError> {
        let mut block = BinaryBlock::new(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        block.set_address(BlockAddress(9));

        let mut bytes = Vec::new();
        let written = block.encode(1, &mut bytes)?;
        assert_eq!(written, 5);

        let decoded = BinaryBlock::decode(BlockAddress(9), &bytes[1..])?;
        assert_eq!(decoded.data, block.data);
        // Metadata never crosses the wire
        assert_eq!(decoded.mime, None);
        assert_eq!(decoded.name, None);
        Ok(())
    }
}
