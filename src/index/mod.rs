use crate::{
    block::{BlockAddress, BlockType},
    error::EnvelopeError,
    header::Header,
    utils::{leu16, leu32},
};
use std::{collections::HashMap, fmt::Display, mem};

/// Single-bit markers in the low nibble of each index record's leading byte
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Flag {
    /// Application-level request marker
    Request = 0x8,
    /// Application-level response marker
    Response = 0x4,
    /// The block's key is an integer rather than a string
    IntKey = 0x2,
    /// Type-specific auxiliary bit: negative on Int, array on Object
    A = 0x1,
}

// Sign bit of a serialized integer key: the MSB of its last byte.
const NEGATIVE_KEY_BITMASK: u8 = 0x80;

/// A block's key within its parent object
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BlockKey {
    /// A string key, stored verbatim
    Str(String),
    /// A signed integer key, stored sign-and-magnitude
    Int(i64),
}

impl From<&str> for BlockKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for BlockKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for BlockKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKey::Str(key) => f.write_str(key),
            BlockKey::Int(key) => write!(f, "{key}"),
        }
    }
}

/// Per-block metadata record
/// | 2-byte record size | 1-byte type/flags | address | 4-byte block size | key |
#[derive(Debug, PartialEq, Clone)]
pub struct BlockIndex {
    address: BlockAddress,
    bitmask: u8,
    block_size: u32,
    block_type: BlockType,
    key: Option<BlockKey>,
}

impl BlockIndex {
    pub(crate) fn new(address: BlockAddress, block_type: BlockType) -> Self {
        Self {
            address,
            bitmask: block_type.bitmask(),
            block_size: 0,
            block_type,
            key: None,
        }
    }

    /// The owning block's address
    pub fn address(&self) -> BlockAddress {
        self.address
    }

    /// The owning block's type tag
    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    /// Exact byte count of the owning block's payload, address prefix included
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub(crate) fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size;
    }

    /// The record's leading byte: type tag in the high nibble, flags low
    pub fn bitmask(&self) -> u8 {
        self.bitmask
    }

    /// Whether a flag bit is set
    pub fn has_flag(&self, flag: Flag) -> bool {
        let flag = flag as u8;
        flag == flag & self.bitmask
    }

    // The type tag owns the high nibble no matter what the flag bits do.
    fn set_bitmask(&mut self, bitmask: u8) {
        self.bitmask = self.block_type.bitmask() | (bitmask & 0x0F);
    }

    /// Set a flag bit
    pub fn enable_flag(&mut self, flag: Flag) {
        self.set_bitmask(self.bitmask | flag as u8);
    }

    /// Clear a flag bit
    pub fn disable_flag(&mut self, flag: Flag) {
        self.set_bitmask(self.bitmask & !(flag as u8));
    }

    /// The block's key, if one was set
    pub fn key(&self) -> Option<&BlockKey> {
        self.key.as_ref()
    }

    /// Set the block's key, adjusting the IntKey flag to match
    pub fn set_key(&mut self, key: BlockKey) {
        match key {
            BlockKey::Str(_) => self.disable_flag(Flag::IntKey),
            BlockKey::Int(_) => self.enable_flag(Flag::IntKey),
        }

        self.key = Some(key);
    }

    /// Serialize the record, size prefix included
    pub fn to_bytes(&self, header: &Header) -> Result<Vec<u8>, EnvelopeError> {
        let mut data = vec![self.bitmask];
        data.extend_from_slice(&self.address.to_bytes(header.address_bytes)?);
        data.extend_from_slice(&self.block_size.to_le_bytes());

        match &self.key {
            Some(BlockKey::Int(key)) => {
                let magnitude = key.unsigned_abs();
                let mut buffer = match mem::size_of::<usize>() {
                    4 => (magnitude as u32).to_le_bytes().to_vec(),
                    8 => magnitude.to_le_bytes().to_vec(),
                    size => return Err(EnvelopeError::invalid_int_key_size(size)),
                };

                if *key < 0 {
                    let last = buffer.len() - 1;
                    buffer[last] |= NEGATIVE_KEY_BITMASK;
                }

                data.extend_from_slice(&buffer);
            }
            Some(BlockKey::Str(key)) => data.extend_from_slice(key.as_bytes()),
            None => {}
        }

        let record_size = data.len();
        if record_size >= 65536 {
            return Err(EnvelopeError::key_record_too_large(record_size));
        }

        let mut record = (record_size as u16).to_le_bytes().to_vec();
        record.append(&mut data);
        Ok(record)
    }

    /// Decode a record body (everything after the two size bytes)
    pub fn decode(header: &Header, data: &[u8]) -> Result<Self, EnvelopeError> {
        let address_bytes = header.address_bytes;
        if data.len() < 5 + address_bytes {
            return Err(EnvelopeError::corrupt_index());
        }

        let bitmask = data[0];
        let block_type = BlockType::parse_bitmask(bitmask)?;
        let address = BlockAddress::from_bytes(&data[1..1 + address_bytes])?;
        let block_size = leu32(&data[1 + address_bytes..5 + address_bytes]);

        let mut block_index = Self {
            address,
            bitmask,
            block_size,
            block_type,
            key: None,
        };

        if data.len() > 5 + address_bytes {
            let key_buffer = &data[5 + address_bytes..];

            if block_index.has_flag(Flag::IntKey) {
                if key_buffer.len() != 4 && key_buffer.len() != 8 {
                    return Err(EnvelopeError::invalid_int_key_size(key_buffer.len()));
                }

                let mut magnitude_bytes = [0u8; 8];
                magnitude_bytes[..key_buffer.len()].copy_from_slice(key_buffer);
                let last = &mut magnitude_bytes[key_buffer.len() - 1];
                let is_negative = (*last & NEGATIVE_KEY_BITMASK) == NEGATIVE_KEY_BITMASK;
                *last &= !NEGATIVE_KEY_BITMASK;

                let magnitude = u64::from_le_bytes(magnitude_bytes) as i64;
                block_index.key = Some(BlockKey::Int(if is_negative {
                    -magnitude
                } else {
                    magnitude
                }));
            } else {
                let key = String::from_utf8(key_buffer.to_vec())
                    .map_err(|_| EnvelopeError::invalid_key_type())?;
                block_index.key = Some(BlockKey::Str(key));
            }
        }

        Ok(block_index)
    }
}

/// Every allocated block's metadata, plus the allocation order
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Index {
    allocated_addresses: Vec<BlockAddress>,
    blocks: HashMap<BlockAddress, BlockIndex>,
}

impl Index {
    /// An index with no allocations
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses in allocation order; always exactly 1..=len
    pub fn allocated(&self) -> &[BlockAddress] {
        &self.allocated_addresses
    }

    /// How many blocks have been allocated
    pub fn len(&self) -> usize {
        self.allocated_addresses.len()
    }

    /// Whether nothing has been allocated yet
    pub fn is_empty(&self) -> bool {
        self.allocated_addresses.is_empty()
    }

    /// Hand out the next address and register a record for it
    pub(crate) fn allocate_address(&mut self, block_type: BlockType) -> BlockAddress {
        let address = BlockAddress(self.allocated_addresses.len() as u64 + 1);
        self.allocated_addresses.push(address);
        self.blocks
            .insert(address, BlockIndex::new(address, block_type));
        address
    }

    /// The record registered for an address
    pub fn lookup(&self, address: BlockAddress) -> Option<&BlockIndex> {
        self.blocks.get(&address)
    }

    pub(crate) fn lookup_mut(&mut self, address: BlockAddress) -> Option<&mut BlockIndex> {
        self.blocks.get_mut(&address)
    }

    /// The key registered for an address
    pub fn key(&self, address: BlockAddress) -> Option<&BlockKey> {
        self.lookup(address).and_then(BlockIndex::key)
    }

    /// Set the key registered for an address
    pub fn set_key(&mut self, address: BlockAddress, key: BlockKey) -> Result<(), EnvelopeError> {
        let block_index = self
            .lookup_mut(address)
            .ok_or_else(|| EnvelopeError::unknown_block_address(address))?;
        block_index.set_key(key);
        Ok(())
    }

    /// Whether a flag is set on an address
    pub fn has_flag(&self, address: BlockAddress, flag: Flag) -> bool {
        self.lookup(address)
            .map(|block_index| block_index.has_flag(flag))
            .unwrap_or(false)
    }

    /// Set a flag on an address
    pub fn enable_flag(&mut self, address: BlockAddress, flag: Flag) -> Result<(), EnvelopeError> {
        let block_index = self
            .lookup_mut(address)
            .ok_or_else(|| EnvelopeError::unknown_block_address(address))?;
        block_index.enable_flag(flag);
        Ok(())
    }

    /// Clear a flag on an address
    pub fn disable_flag(&mut self, address: BlockAddress, flag: Flag) -> Result<(), EnvelopeError> {
        let block_index = self
            .lookup_mut(address)
            .ok_or_else(|| EnvelopeError::unknown_block_address(address))?;
        block_index.disable_flag(flag);
        Ok(())
    }

    /// Walk a serialized index buffer record by record
    pub fn decode(header: &Header, buffer: &[u8]) -> Result<Self, EnvelopeError> {
        let mut index = Self::new();
        let mut cursor = 0usize;

        while cursor < buffer.len() {
            if cursor + 2 > buffer.len() {
                return Err(EnvelopeError::corrupt_index());
            }

            let record_size = leu16(&buffer[cursor..cursor + 2]) as usize;
            if record_size == 0 || record_size < 5 + header.address_bytes {
                return Err(EnvelopeError::corrupt_index());
            }

            let end = cursor + 2 + record_size;
            if end > buffer.len() {
                return Err(EnvelopeError::corrupt_index());
            }

            let block_index = BlockIndex::decode(header, &buffer[cursor + 2..end])?;
            index.allocated_addresses.push(block_index.address());
            index.blocks.insert(block_index.address(), block_index);
            cursor = end;
        }

        Ok(index)
    }
}
