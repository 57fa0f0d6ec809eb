//! Encoder and decoder for the APO envelope format: a self-describing binary
//! container that materializes dynamically-typed value trees as uniquely
//! addressed blocks behind a checksummed index/blocks split layout.
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]

/// Typed block payloads and the address codec
pub mod block;
/// The envelope container: allocation, parse dispatch, encode, decode
pub mod envelope;
/// Error taxonomy
pub mod error;
/// Preamble: signature, version, flags, checksums
pub mod header;
/// Per-block metadata records and the allocation index
pub mod index;
/// The discriminated input model
pub mod value;

mod utils;

pub use crate::{
    block::{Block, BlockAddress, BlockType},
    envelope::{Envelope, Options},
    error::{EnvelopeError, EnvelopeErrorKind},
    index::{BlockKey, Flag},
    value::Value,
};

use std::{fs::File, io::Read, path::Path};

/// Build an envelope from an in-memory value tree
pub fn parse(input: Value, options: Options) -> Result<Envelope, EnvelopeError> {
    let mut envelope = Envelope::new(options);
    envelope.parse_block(input)?;
    Ok(envelope)
}

/// Pre-decode JSON bytes, then build an envelope from the resulting tree.
/// Numbers keep enough fidelity to collapse to Int blocks when integer-valued.
pub fn parse_json(input: &[u8], options: Options) -> Result<Envelope, EnvelopeError> {
    let decoded: serde_json::Value = serde_json::from_slice(input)?;
    parse(Value::from_json(decoded)?, options)
}

/// Build an envelope from a value tree and serialize it in one step
pub fn marshal(input: Value, options: Options) -> Result<Vec<u8>, EnvelopeError> {
    let mut envelope = parse(input, options)?;
    let mut bytes = Vec::new();
    envelope.encode(&mut bytes)?;
    Ok(bytes)
}

/// Decode an envelope from a byte reader
pub fn read<R: Read>(reader: &mut R) -> Result<Envelope, EnvelopeError> {
    Envelope::decode(reader)
}

/// Open and decode an envelope file
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Envelope, EnvelopeError> {
    let mut file = File::open(path)?;
    Envelope::decode(&mut file)
}
