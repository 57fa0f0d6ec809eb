use crate::{
    block::{required_address_bytes, Block, BlockAddress, BlockType},
    error::EnvelopeError,
    header::{Checksum, Header, HEADER_SIZE},
    index::{BlockIndex, BlockKey, Flag, Index},
    utils::leu32,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::{Read, Write},
};
use tracing::warn;

/// Construction options recorded in the header
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Options {
    /// Mark this envelope as an extension of some outer envelope
    pub is_extension: bool,
    /// Reserved compact-encoding switch
    pub enable_memory_optimization: bool,
}

/// The top-level container: a header, the per-block index, and the typed
/// payloads, all addressed by dense 1-based ordinals
#[derive(Debug, PartialEq, Clone)]
pub struct Envelope {
    header: Header,
    index: Index,
    blocks: HashMap<BlockAddress, Block>,
}

impl Envelope {
    /// An empty envelope with the given options
    pub fn new(options: Options) -> Self {
        let mut header = Header::new();
        header.is_extension = options.is_extension;
        header.enable_memory_optimization = options.enable_memory_optimization;

        Self {
            header,
            index: Index::new(),
            blocks: HashMap::new(),
        }
    }

    /// The envelope preamble
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The per-block metadata index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// The payload stored at an address
    pub fn block(&self, address: BlockAddress) -> Option<&Block> {
        self.blocks.get(&address)
    }

    /// Mutable access to the payload stored at an address
    pub fn block_mut(&mut self, address: BlockAddress) -> Option<&mut Block> {
        self.blocks.get_mut(&address)
    }

    /// How many blocks have been allocated
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Whether nothing has been allocated yet
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Register a freshly built payload: assign the next address, index it,
    /// and widen the envelope's address width when the count crosses a
    /// 2^(8k) boundary
    pub(crate) fn allocate_block(&mut self, mut block: Block) -> Result<BlockAddress, EnvelopeError> {
        let address = self.index.allocate_address(block.block_type());
        block.set_address(address);
        self.blocks.insert(address, block);
        self.header.address_bytes = required_address_bytes(self.index.len() as u64)?;
        Ok(address)
    }

    /// Recursively materialize an input value as blocks, returning the
    /// address of the value's own block
    pub fn parse_block(&mut self, input: Value) -> Result<BlockAddress, EnvelopeError> {
        match input {
            Value::Null => self.add_empty(),
            Value::Address(address) => self.add_address(address),
            Value::Str(value) => self.add_string(value),
            Value::Bytes(value) => self.add_string(value),
            Value::Bool(value) => self.add_boolean(value),
            Value::I8(value) => self.add_int(value),
            Value::I16(value) => self.add_int(value),
            Value::I32(value) => self.add_int(value),
            Value::I64(value) => self.add_int(value),
            Value::U8(value) => self.add_int(value),
            Value::U16(value) => self.add_int(value),
            Value::U32(value) => self.add_int(value),
            Value::U64(value) => self.add_int(value),
            Value::F32(value) => self.add_float(f64::from(value)),
            Value::F64(value) => self.add_float(value),
            Value::Decimal(value) => {
                // JSON numbers collapse to an Int when integer-valued
                let as_int = value as i64;
                if as_int as f64 == value {
                    self.add_int(as_int)
                } else {
                    self.add_float(value)
                }
            }
            Value::Map(entries) => self.parse_map(entries),
            Value::Record(fields) => self.parse_record(fields),
            Value::Sequence(items) => self.parse_sequence(items),
            Value::Array(items) => self.parse_array(items),
            Value::Reference(None) => self.add_empty(),
            Value::Reference(Some(value)) => self.parse_block(*value),
            // The DateTime payload is reserved
            Value::DateTime(_) => self.add_empty(),
        }
    }

    /// The key registered for an address
    pub fn key(&self, address: BlockAddress) -> Option<&BlockKey> {
        self.index.key(address)
    }

    /// Set the key identifying a block within its parent object
    pub fn set_key<K: Into<BlockKey>>(
        &mut self,
        address: BlockAddress,
        key: K,
    ) -> Result<(), EnvelopeError> {
        self.index.set_key(address, key.into())
    }

    /// Whether the request marker is set on a block
    pub fn is_request(&self, address: BlockAddress) -> bool {
        self.index.has_flag(address, Flag::Request)
    }

    /// Toggle the request marker on a block
    pub fn set_is_request(
        &mut self,
        address: BlockAddress,
        is_request: bool,
    ) -> Result<(), EnvelopeError> {
        self.set_flag(address, Flag::Request, is_request)
    }

    /// Whether the response marker is set on a block
    pub fn is_response(&self, address: BlockAddress) -> bool {
        self.index.has_flag(address, Flag::Response)
    }

    /// Toggle the response marker on a block
    pub fn set_is_response(
        &mut self,
        address: BlockAddress,
        is_response: bool,
    ) -> Result<(), EnvelopeError> {
        self.set_flag(address, Flag::Response, is_response)
    }

    /// Whether an Object block is an integer-keyed array
    pub fn is_array(&self, address: BlockAddress) -> bool {
        self.index.has_flag(address, Flag::A)
    }

    /// Toggle the array bit on an Object block
    pub fn set_is_array(
        &mut self,
        address: BlockAddress,
        is_array: bool,
    ) -> Result<(), EnvelopeError> {
        self.set_flag(address, Flag::A, is_array)
    }

    /// Whether an Int block holds a negative value
    pub fn is_negative(&self, address: BlockAddress) -> bool {
        self.index.has_flag(address, Flag::A)
    }

    /// Toggle the sign of an Int block
    pub fn set_is_negative(
        &mut self,
        address: BlockAddress,
        is_negative: bool,
    ) -> Result<(), EnvelopeError> {
        self.set_flag(address, Flag::A, is_negative)
    }

    fn set_flag(
        &mut self,
        address: BlockAddress,
        flag: Flag,
        enabled: bool,
    ) -> Result<(), EnvelopeError> {
        if enabled {
            self.index.enable_flag(address, flag)
        } else {
            self.index.disable_flag(address, flag)
        }
    }

    /// Walk all blocks in allocation order, yielding those the condition
    /// accepts
    pub fn traverse<'a, F>(
        &'a self,
        condition: F,
    ) -> impl Iterator<Item = (&'a Block, &'a BlockIndex)> + 'a
    where
        F: Fn(&Block, &BlockIndex) -> bool + 'a,
    {
        self.index.allocated().iter().filter_map(move |address| {
            let block_index = self.index.lookup(*address)?;
            let block = self.blocks.get(address)?;
            condition(block, block_index).then_some((block, block_index))
        })
    }

    /// Every block in allocation order
    pub fn traverse_all(&self) -> impl Iterator<Item = (&Block, &BlockIndex)> + '_ {
        self.traverse(|_, _| true)
    }

    /// Blocks of one type, in allocation order
    pub fn traverse_block_type(
        &self,
        block_type: BlockType,
    ) -> impl Iterator<Item = (&Block, &BlockIndex)> + '_ {
        self.traverse(move |_, block_index| block_index.block_type() == block_type)
    }

    /// Object blocks in allocation order
    pub fn traverse_objects(&self) -> impl Iterator<Item = (&Block, &BlockIndex)> + '_ {
        self.traverse_block_type(BlockType::Object)
    }

    /// Binary blocks in allocation order
    pub fn traverse_binaries(&self) -> impl Iterator<Item = (&Block, &BlockIndex)> + '_ {
        self.traverse_block_type(BlockType::Binary)
    }

    /// Blocks carrying the request marker
    pub fn traverse_requests(&self) -> impl Iterator<Item = (&Block, &BlockIndex)> + '_ {
        self.traverse(|_, block_index| block_index.has_flag(Flag::Request))
    }

    /// Blocks carrying the response marker
    pub fn traverse_responses(&self) -> impl Iterator<Item = (&Block, &BlockIndex)> + '_ {
        self.traverse(|_, block_index| block_index.has_flag(Flag::Response))
    }

    // Outgoing references must resolve before they hit the wire.
    fn check_references(&self, block: &Block) -> Result<(), EnvelopeError> {
        match block {
            Block::Object(object) => {
                for child in object.children() {
                    if self.index.lookup(*child).is_none() {
                        return Err(EnvelopeError::unknown_block_address(*child));
                    }
                }
            }
            Block::Address(reference) => {
                if self.index.lookup(reference.value).is_none() {
                    return Err(EnvelopeError::unknown_block_address(reference.value));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Serialize the whole envelope:
    /// header ∥ index size ∥ index buffer ∥ blocks buffer
    pub fn encode<W: Write>(&mut self, writer: &mut W) -> Result<(), EnvelopeError> {
        let mut index_buffer: Vec<u8> = Vec::new();
        let mut blocks_buffer: Vec<u8> = Vec::new();

        for address in self.index.allocated().to_vec() {
            let Some(block) = self.blocks.get(&address) else {
                continue;
            };

            self.check_references(block)?;

            let block_size = block.encode(self.header.address_bytes, &mut blocks_buffer)?;
            if block_size as u64 >= 1 << 32 {
                return Err(EnvelopeError::block_too_large(block_size as u64));
            }

            let Some(block_index) = self.index.lookup_mut(address) else {
                continue;
            };
            block_index.set_block_size(block_size as u32);
            index_buffer.extend_from_slice(&block_index.to_bytes(&self.header)?);
        }

        if index_buffer.len() as u64 >= 1 << 32 {
            return Err(EnvelopeError::index_too_large(index_buffer.len() as u64));
        }

        self.header.index_checksum = Checksum::compute(&index_buffer);
        self.header.blocks_checksum = Checksum::compute(&blocks_buffer);

        self.header.encode(writer)?;
        writer.write_all(&(index_buffer.len() as u32).to_le_bytes())?;
        writer.write_all(&index_buffer)?;
        writer.write_all(&blocks_buffer)?;
        writer.flush()?;
        Ok(())
    }

    /// Reconstruct an envelope from a byte reader. The whole input is
    /// consumed up front; this core is not streamable.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, EnvelopeError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut header = Header::decode(&data)?;

        if data.len() < HEADER_SIZE + 4 {
            return Err(EnvelopeError::corrupt_index());
        }
        let index_size = leu32(&data[HEADER_SIZE..HEADER_SIZE + 4]) as usize;
        let index_start = HEADER_SIZE + 4;
        let index_end = index_start
            .checked_add(index_size)
            .ok_or_else(EnvelopeError::corrupt_index)?;
        if index_end > data.len() {
            return Err(EnvelopeError::corrupt_index());
        }

        let index_buffer = &data[index_start..index_end];
        let index = Index::decode(&header, index_buffer)?;

        let blocks_buffer = &data[index_end..];
        let address_bytes = header.address_bytes;
        let mut blocks = HashMap::new();
        let mut cursor = 0usize;

        while cursor < blocks_buffer.len() {
            if cursor + address_bytes > blocks_buffer.len() {
                return Err(EnvelopeError::end_of_data());
            }

            let address =
                BlockAddress::from_bytes(&blocks_buffer[cursor..cursor + address_bytes])?;
            let block_index = index
                .lookup(address)
                .ok_or_else(|| EnvelopeError::unknown_block_address(address))?;

            // BlockSize counts the address prefix the payload repeats
            let block_size = block_index.block_size() as usize;
            if block_size < address_bytes {
                return Err(EnvelopeError::corrupt_index());
            }
            let end = cursor
                .checked_add(block_size)
                .ok_or_else(EnvelopeError::end_of_data)?;
            if end > blocks_buffer.len() {
                return Err(EnvelopeError::end_of_data());
            }

            let body = &blocks_buffer[cursor + address_bytes..end];
            let block = Block::decode(block_index.block_type(), address, body, address_bytes)?;

            // Incoming references must resolve too
            match &block {
                Block::Object(object) => {
                    for child in object.children() {
                        if index.lookup(*child).is_none() {
                            return Err(EnvelopeError::unknown_block_address(*child));
                        }
                    }
                }
                Block::Address(reference) => {
                    if index.lookup(reference.value).is_none() {
                        return Err(EnvelopeError::unknown_block_address(reference.value));
                    }
                }
                _ => {}
            }

            blocks.insert(address, block);
            cursor = end;
        }

        header.index_checksum.is_valid = header.index_checksum.matches(index_buffer);
        header.blocks_checksum.is_valid = header.blocks_checksum.matches(blocks_buffer);
        if !header.index_checksum.is_valid || !header.blocks_checksum.is_valid {
            warn!("envelope checksum mismatch; content is structurally usable but unverified");
        }

        Ok(Self {
            header,
            index,
            blocks,
        })
    }

    /// Surface a decode-time checksum mismatch as an error
    pub fn verify(&self) -> Result<(), EnvelopeError> {
        if self.header.index_checksum.is_valid && self.header.blocks_checksum.is_valid {
            Ok(())
        } else {
            Err(EnvelopeError::checksum_mismatch())
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut bytes = Vec::new();
        self.clone()
            .encode(&mut bytes)
            .map_err(serde::ser::Error::custom)?;
        bytes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Self::decode(&mut bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::{Envelope, Options};
    use crate::{
        block::{Block, BlockAddress, BlockType},
        error::{EnvelopeError, EnvelopeErrorKind},
        header::{HEADER_SIZE, SIGNATURE},
        index::BlockKey,
        value::Value,
    };

    fn encode_to_vec(envelope: &mut Envelope) -> Result<Vec<u8>, EnvelopeError> {
        let mut bytes = Vec::new();
        envelope.encode(&mut bytes)?;
        Ok(bytes)
    }

    /// Same allocations, types, sizes, keys and flag bits on both sides
    fn assert_same_shape(left: &Envelope, right: &Envelope) {
        assert_eq!(left.index().allocated(), right.index().allocated());
        for address in left.index().allocated() {
            let original = left.index().lookup(*address).expect("missing block index");
            let decoded = right.index().lookup(*address).expect("missing block index");
            assert_eq!(original.block_type(), decoded.block_type());
            assert_eq!(original.block_size(), decoded.block_size());
            assert_eq!(original.bitmask(), decoded.bitmask());
            assert_eq!(original.key(), decoded.key());
        }
    }

    #[test]
    fn boolean_scenario() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let address = envelope.parse_block(Value::Bool(true))?;

        assert_eq!(address, BlockAddress(1));
        assert_eq!(envelope.block_count(), 1);
        assert_eq!(envelope.header().address_bytes, 1);
        assert_eq!(envelope.key(address), None);
        assert!(!envelope.is_array(address));

        let bytes = encode_to_vec(&mut envelope)?;
        // Blocks region is the 2-byte payload at the tail: address, then 0x01
        assert_eq!(&bytes[bytes.len() - 2..], &[0x01, 0x01]);
        Ok(())
    }

    #[test]
    fn map_scenario() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let root = envelope.parse_block(Value::Map(vec![
            ("a".to_string(), Value::I64(1)),
            ("b".to_string(), Value::Str("x".to_string())),
        ]))?;

        assert_eq!(envelope.block_count(), 3);
        assert_eq!(root, BlockAddress(3));
        assert_eq!(envelope.header().address_bytes, 1);
        assert!(!envelope.is_array(root));

        assert_eq!(envelope.key(BlockAddress(1)), Some(&BlockKey::from("a")));
        assert_eq!(envelope.key(BlockAddress(2)), Some(&BlockKey::from("b")));

        let Some(Block::Object(object)) = envelope.block(root) else {
            panic!("expected an object at the root");
        };
        assert_eq!(object.children(), &[BlockAddress(1), BlockAddress(2)]);

        let Some(Block::Int(int)) = envelope.block(BlockAddress(1)) else {
            panic!("expected an int");
        };
        assert_eq!(int.magnitude(), 1);

        let Some(Block::String(string)) = envelope.block(BlockAddress(2)) else {
            panic!("expected a string");
        };
        assert_eq!(string.as_str(), Some("x"));
        Ok(())
    }

    #[test]
    fn array_scenario() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let root = envelope.parse_block(Value::Array(vec![
            Value::I64(10),
            Value::I64(20),
            Value::I64(30),
        ]))?;

        assert_eq!(envelope.block_count(), 4);
        assert!(envelope.is_array(root));
        for (position, address) in [1u64, 2, 3].into_iter().enumerate() {
            assert_eq!(
                envelope.key(BlockAddress(address)),
                Some(&BlockKey::Int(position as i64))
            );
        }

        // Order survives a full round trip
        let bytes = encode_to_vec(&mut envelope)?;
        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert_same_shape(&envelope, &decoded);

        let Some(Block::Object(object)) = decoded.block(root) else {
            panic!("expected an object at the root");
        };
        let magnitudes: Vec<u64> = object
            .children()
            .iter()
            .map(|child| match decoded.block(*child) {
                Some(Block::Int(int)) => int.magnitude(),
                _ => panic!("expected an int child"),
            })
            .collect();
        assert_eq!(magnitudes, vec![10, 20, 30]);
        Ok(())
    }

    #[test]
    fn sequence_keeps_array_flag_clear() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let root = envelope.parse_block(Value::Sequence(vec![Value::Bool(true), Value::Null]))?;
        assert!(!envelope.is_array(root));
        assert_eq!(envelope.key(BlockAddress(1)), Some(&BlockKey::Int(0)));
        Ok(())
    }

    #[test]
    fn negative_int_scenario() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let address = envelope.parse_block(Value::I64(-42))?;

        assert!(envelope.is_negative(address));
        let Some(Block::Int(int)) = envelope.block(address) else {
            panic!("expected an int");
        };
        assert_eq!(int.value, 42u64.to_le_bytes().to_vec());
        assert_eq!(int.to_i64(envelope.is_negative(address)), -42);
        Ok(())
    }

    #[test]
    fn signature_leads_every_encoding() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        envelope.parse_block(Value::Str("anything".to_string()))?;
        let bytes = encode_to_vec(&mut envelope)?;
        assert_eq!(&bytes[0..8], &SIGNATURE);
        assert_eq!(hex::encode(&bytes[0..8]), "8941504f0d0a1a0a");
        Ok(())
    }

    #[test]
    fn empty_envelope_round_trip() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let bytes = encode_to_vec(&mut envelope)?;
        assert_eq!(bytes.len(), HEADER_SIZE + 4);

        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert!(decoded.is_empty());
        assert_eq!(decoded.header().address_bytes, 1);
        Ok(())
    }

    #[test]
    fn options_land_in_the_header() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::new(Options {
            is_extension: true,
            enable_memory_optimization: true,
        });
        let bytes = encode_to_vec(&mut envelope)?;

        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert!(decoded.header().is_extension);
        assert!(decoded.header().enable_memory_optimization);
        Ok(())
    }

    #[test]
    fn single_block_of_each_type() -> Result<(), EnvelopeError> {
        let cases: Vec<Box<dyn Fn(&mut Envelope) -> Result<BlockAddress, EnvelopeError>>> = vec![
            Box::new(|e| e.add_empty()),
            Box::new(|e| e.add_boolean(false)),
            Box::new(|e| e.add_int(7u16)),
            Box::new(|e| e.add_float(0.5)),
            Box::new(|e| e.add_string("s")),
            Box::new(|e| e.add_binary(vec![0xAB])),
            Box::new(|e| e.add_object(vec![])),
        ];

        for add in cases {
            let mut envelope = Envelope::default();
            let address = add(&mut envelope)?;
            assert_eq!(address, BlockAddress(1));

            let bytes = encode_to_vec(&mut envelope)?;
            let decoded = Envelope::decode(&mut bytes.as_slice())?;
            assert_eq!(decoded.block_count(), 1);
            assert_same_shape(&envelope, &decoded);
        }
        Ok(())
    }

    #[test]
    fn address_block_round_trip() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let target = envelope.add_boolean(true)?;
        let reference = envelope.add_address(target)?;

        // The reference reports its own type, not its target's
        assert_eq!(
            envelope.index().lookup(reference).map(|i| i.block_type()),
            Some(BlockType::Address)
        );

        let bytes = encode_to_vec(&mut envelope)?;
        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        let Some(Block::Address(block)) = decoded.block(reference) else {
            panic!("expected an address block");
        };
        assert_eq!(block.value, target);

        // Self-address prefix plus target: two address widths
        assert_eq!(
            decoded.index().lookup(reference).map(|i| i.block_size()),
            Some(2)
        );
        Ok(())
    }

    #[test]
    fn address_width_widens_at_256() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        for _ in 0..255 {
            envelope.add_empty()?;
        }
        assert_eq!(envelope.header().address_bytes, 1);

        envelope.add_empty()?;
        assert_eq!(envelope.header().address_bytes, 2);

        let bytes = encode_to_vec(&mut envelope)?;
        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert_eq!(decoded.block_count(), 256);
        assert_eq!(decoded.header().address_bytes, 2);
        assert_same_shape(&envelope, &decoded);
        Ok(())
    }

    #[test]
    fn address_width_widens_at_65536() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        for _ in 0..65535 {
            envelope.add_empty()?;
        }
        assert_eq!(envelope.header().address_bytes, 2);

        envelope.add_empty()?;
        assert_eq!(envelope.header().address_bytes, 3);
        Ok(())
    }

    #[test]
    fn allocation_order_is_dense() {
        let mut envelope = Envelope::default();
        for _ in 0..100 {
            envelope.add_boolean(true).expect("allocation failed");
        }

        let allocated: Vec<u64> = envelope
            .index()
            .allocated()
            .iter()
            .map(|address| address.value())
            .collect();
        assert_eq!(allocated, (1..=100).collect::<Vec<u64>>());
    }

    #[test]
    fn nested_value_round_trip() -> Result<(), EnvelopeError> {
        let value = Value::Map(vec![
            ("title".to_string(), Value::Str("envelope".to_string())),
            ("count".to_string(), Value::U32(3)),
            ("ratio".to_string(), Value::F64(0.25)),
            (
                "tags".to_string(),
                Value::Sequence(vec![Value::Str("a".to_string()), Value::Null]),
            ),
            (
                "nested".to_string(),
                Value::Map(vec![("deep".to_string(), Value::Bool(false))]),
            ),
        ]);

        let mut envelope = Envelope::default();
        envelope.parse_block(value)?;

        let bytes = encode_to_vec(&mut envelope)?;
        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert_same_shape(&envelope, &decoded);

        // Every block's declared size matches its payload exactly, so the
        // regions re-encode byte-identically
        let reencoded = encode_to_vec(&mut decoded.clone())?;
        assert_eq!(bytes, reencoded);
        Ok(())
    }

    #[test]
    fn deterministic_encoding() -> Result<(), EnvelopeError> {
        let value = Value::Map(vec![
            ("b".to_string(), Value::I64(2)),
            ("a".to_string(), Value::I64(1)),
        ]);

        let mut first = Envelope::default();
        first.parse_block(value.clone())?;
        let mut second = Envelope::default();
        second.parse_block(value)?;

        assert_eq!(encode_to_vec(&mut first)?, encode_to_vec(&mut second)?);
        Ok(())
    }

    #[test]
    fn deeply_nested_objects() -> Result<(), EnvelopeError> {
        let mut value = Value::Bool(true);
        for _ in 0..1000 {
            value = Value::Map(vec![("inner".to_string(), value)]);
        }

        let mut envelope = Envelope::default();
        envelope.parse_block(value)?;
        assert_eq!(envelope.block_count(), 1001);

        let bytes = encode_to_vec(&mut envelope)?;
        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert_same_shape(&envelope, &decoded);
        Ok(())
    }

    #[test]
    fn long_string_block() -> Result<(), EnvelopeError> {
        let payload = "y".repeat(70_000);
        let mut envelope = Envelope::default();
        let address = envelope.add_string(&payload)?;

        let bytes = encode_to_vec(&mut envelope)?;
        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert_eq!(
            decoded.index().lookup(address).map(|i| i.block_size()),
            Some(70_001)
        );

        let Some(Block::String(string)) = decoded.block(address) else {
            panic!("expected a string");
        };
        assert_eq!(string.value.len(), 70_000);
        Ok(())
    }

    #[test]
    fn request_response_traversal() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let first = envelope.add_string("request payload")?;
        let second = envelope.add_string("response payload")?;
        envelope.add_string("unmarked")?;

        envelope.set_is_request(first, true)?;
        envelope.set_is_response(second, true)?;

        let requests: Vec<BlockAddress> = envelope
            .traverse_requests()
            .map(|(block, _)| block.address())
            .collect();
        assert_eq!(requests, vec![first]);

        let responses: Vec<BlockAddress> = envelope
            .traverse_responses()
            .map(|(block, _)| block.address())
            .collect();
        assert_eq!(responses, vec![second]);

        // Markers survive the wire
        let bytes = encode_to_vec(&mut envelope)?;
        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert!(decoded.is_request(first));
        assert!(!decoded.is_request(second));
        assert!(decoded.is_response(second));
        Ok(())
    }

    #[test]
    fn typed_traversal() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        envelope.add_boolean(true)?;
        let object = envelope.add_object(vec![BlockAddress(1)])?;
        let binary = envelope.add_binary(vec![1, 2, 3])?;

        assert_eq!(envelope.traverse_all().count(), 3);

        let objects: Vec<BlockAddress> = envelope
            .traverse_objects()
            .map(|(block, _)| block.address())
            .collect();
        assert_eq!(objects, vec![object]);

        let binaries: Vec<BlockAddress> = envelope
            .traverse_binaries()
            .map(|(block, _)| block.address())
            .collect();
        assert_eq!(binaries, vec![binary]);
        Ok(())
    }

    #[test]
    fn checksum_mismatch_is_recoverable() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        envelope.parse_block(Value::Str("checksummed".to_string()))?;
        let mut bytes = encode_to_vec(&mut envelope)?;

        // Flip one payload byte in the blocks region
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let decoded = Envelope::decode(&mut bytes.as_slice())?;
        assert!(decoded.header().index_checksum.is_valid);
        assert!(!decoded.header().blocks_checksum.is_valid);

        let err = decoded.verify().unwrap_err();
        assert!(matches!(err.kind, EnvelopeErrorKind::ChecksumMismatch));
        Ok(())
    }

    #[test]
    fn intact_envelope_verifies() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        envelope.parse_block(Value::Bool(true))?;
        let bytes = encode_to_vec(&mut envelope)?;

        Envelope::decode(&mut bytes.as_slice())?.verify()
    }

    #[test]
    fn encode_rejects_dangling_references() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        envelope.add_address(BlockAddress(42))?;

        let err = encode_to_vec(&mut envelope).unwrap_err();
        assert!(matches!(
            err.kind,
            EnvelopeErrorKind::UnknownBlockAddress(BlockAddress(42))
        ));
        Ok(())
    }

    #[test]
    fn decode_rejects_dangling_references() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let target = envelope.add_empty()?;
        envelope.add_address(target)?;
        let mut bytes = encode_to_vec(&mut envelope)?;

        // Redirect the reference at the tail of the blocks region
        let last = bytes.len() - 1;
        bytes[last] = 0x7F;

        let err = Envelope::decode(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err.kind,
            EnvelopeErrorKind::UnknownBlockAddress(BlockAddress(0x7F))
        ));
        Ok(())
    }

    #[test]
    fn truncated_blocks_region() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        envelope.parse_block(Value::Str("truncate me".to_string()))?;
        let bytes = encode_to_vec(&mut envelope)?;

        let mut truncated = &bytes[..bytes.len() - 4];
        let err = Envelope::decode(&mut truncated).unwrap_err();
        assert!(matches!(err.kind, EnvelopeErrorKind::EndOfData));
        Ok(())
    }

    #[test]
    fn serde_round_trip() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        envelope.parse_block(Value::Map(vec![(
            "k".to_string(),
            Value::Sequence(vec![Value::I64(1), Value::Bool(false)]),
        )]))?;
        // Settle block sizes before comparing
        encode_to_vec(&mut envelope)?;

        let serialized = serde_json::to_vec(&envelope).expect("serialize failed");
        let deserialized: Envelope =
            serde_json::from_slice(&serialized).expect("deserialize failed");
        assert_same_shape(&envelope, &deserialized);
        Ok(())
    }

    #[test]
    fn reference_input_parses_like_its_referent() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let absent = envelope.parse_block(Value::Reference(None))?;
        let present =
            envelope.parse_block(Value::Reference(Some(Box::new(Value::Bool(true)))))?;

        assert_eq!(
            envelope.index().lookup(absent).map(|i| i.block_type()),
            Some(BlockType::Empty)
        );
        assert_eq!(
            envelope.index().lookup(present).map(|i| i.block_type()),
            Some(BlockType::Boolean)
        );
        Ok(())
    }

    #[test]
    fn decimal_collapses_to_int_when_integer_valued() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let int = envelope.parse_block(Value::Decimal(3.0))?;
        let float = envelope.parse_block(Value::Decimal(3.5))?;

        assert_eq!(
            envelope.index().lookup(int).map(|i| i.block_type()),
            Some(BlockType::Int)
        );
        assert_eq!(
            envelope.index().lookup(float).map(|i| i.block_type()),
            Some(BlockType::Float)
        );
        Ok(())
    }

    #[test]
    fn datetime_parses_as_empty_for_now() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::default();
        let address = envelope.parse_block(Value::DateTime(chrono::Utc::now()))?;
        assert_eq!(
            envelope.index().lookup(address).map(|i| i.block_type()),
            Some(BlockType::Empty)
        );
        Ok(())
    }
}
