//! Concrete sequence formats.
//!
//! Each format provides a `TrackDecoder` and a loader that turns a dump plus
//! its configuration into a `SequenceDocument`.
use crate::binutil::ParseError;

pub mod nspc;
pub mod table;

pub use nspc::{NspcConfig, NspcDecoder};
pub use table::{OpKind, OpcodeTable, TableDecoder, TableFormat};

/// Byte order of multi-byte pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Map an address in the sequence's own address space to a dump offset.
pub(crate) fn translate_address(
    address: usize,
    base_address: usize,
    len: usize,
    what: &str,
) -> Result<usize, ParseError> {
    match address.checked_sub(base_address) {
        Some(offset) if offset < len => Ok(offset),
        _ => Err(ParseError::OffsetOutOfRange {
            offset: address,
            needed: 1,
            available: len,
            context: Some(what.to_string()),
        }),
    }
}
