use crate::{
    block::{Block, BlockAddress},
    envelope::Envelope,
    error::EnvelopeError,
    value::Value,
};
use std::io::Write;

impl Envelope {
    /// Allocate an Object block over already-allocated children
    pub fn add_object(
        &mut self,
        children: Vec<BlockAddress>,
    ) -> Result<BlockAddress, EnvelopeError> {
        self.allocate_block(Block::Object(ObjectBlock::new(children)))
    }

    /// String-keyed mapping: children carry their entry keys, `A` stays clear
    pub(crate) fn parse_map(
        &mut self,
        entries: Vec<(String, Value)>,
    ) -> Result<BlockAddress, EnvelopeError> {
        let mut children = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let child = self.parse_block(value)?;
            self.set_key(child, key)?;
            children.push(child);
        }

        self.add_object(children)
    }

    /// Introspected aggregate: fields become string-keyed children, like a map
    pub(crate) fn parse_record(
        &mut self,
        fields: Vec<(String, Value)>,
    ) -> Result<BlockAddress, EnvelopeError> {
        self.parse_map(fields)
    }

    /// Heterogeneous sequence: children keyed 0..n, `A` stays clear
    pub(crate) fn parse_sequence(
        &mut self,
        items: Vec<Value>,
    ) -> Result<BlockAddress, EnvelopeError> {
        let mut children = Vec::with_capacity(items.len());
        for (key, value) in items.into_iter().enumerate() {
            let child = self.parse_block(value)?;
            self.set_key(child, key as i64)?;
            children.push(child);
        }

        self.add_object(children)
    }

    /// Typed sequence: like `parse_sequence`, plus the `A` (array) flag
    pub(crate) fn parse_array(&mut self, items: Vec<Value>) -> Result<BlockAddress, EnvelopeError> {
        let address = self.parse_sequence(items)?;
        self.set_is_array(address, true)?;
        Ok(address)
    }
}

/// An ordered run of child addresses, each AddressBytes wide; a string-keyed
/// object, or an integer-keyed array when the index `A` flag is set
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct ObjectBlock {
    address: BlockAddress,
    /// Child block addresses in append order
    pub values: Vec<BlockAddress>,
}

impl ObjectBlock {
    pub(crate) fn new(values: Vec<BlockAddress>) -> Self {
        Self {
            address: BlockAddress::default(),
            values,
        }
    }

    pub(crate) fn decode(
        address: BlockAddress,
        body: &[u8],
        address_bytes: usize,
    ) -> Result<Self, EnvelopeError> {
        if body.len() % address_bytes != 0 {
            return Err(EnvelopeError::invalid_object_body());
        }

        let mut values = Vec::with_capacity(body.len() / address_bytes);
        for chunk in body.chunks_exact(address_bytes) {
            values.push(BlockAddress::from_bytes(chunk)?);
        }

        Ok(Self { address, values })
    }

    /// Where this block lives in its envelope
    pub fn address(&self) -> BlockAddress {
        self.address
    }

    pub(crate) fn set_address(&mut self, address: BlockAddress) {
        self.address = address;
    }

    /// The child addresses in order
    pub fn children(&self) -> &[BlockAddress] {
        &self.values
    }

    /// Append one more child reference
    pub fn append_child(&mut self, address: BlockAddress) {
        self.values.push(address);
    }

    /// Serialize the payload, returning the byte count written
    pub fn encode<W: Write>(
        &self,
        address_bytes: usize,
        writer: &mut W,
    ) -> Result<usize, EnvelopeError> {
        let mut data = self.address.to_bytes(address_bytes)?;
        for value in &self.values {
            data.extend_from_slice(&value.to_bytes(address_bytes)?);
        }

        writer.write_all(&data)?;
        Ok(data.len())
    }
}
