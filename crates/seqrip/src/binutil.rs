//! Utilities shared by the readers and writers: the crate error type,
//! bounds-checked integer readers over byte slices and the MIDI
//! variable-length quantity (VLQ) codec.
use thiserror::Error;

/// Largest value a four-byte MIDI variable-length quantity can hold.
pub const VLQ_MAX: u32 = 0x0FFF_FFFF;

/// Error type returned by the byte source, the decoders and the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input ended unexpectedly while the parser was expecting more bytes.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// An attempted read was outside the available buffer range.
    ///
    /// - `offset` is the index that was attempted to be accessed.
    /// - `needed` is the number of bytes required for the operation.
    /// - `available` is the total size of the source.
    /// - `context` optionally names the logical location of the access
    ///   (for example `"pattern"` or `"call target"`).
    #[error(
        "offset out of range{}: 0x{offset:X} (needed {needed} bytes, available {available})",
        .context.as_ref().map(|c| format!(" at {c}")).unwrap_or_default()
    )]
    OffsetOutOfRange {
        offset: usize,
        needed: usize,
        available: usize,
        context: Option<String>,
    },

    /// An opcode byte was not recognized by the decoder.
    ///
    /// - `opcode` is the raw opcode byte.
    /// - `offset` is the position in the source where the opcode was found.
    #[error("unknown opcode 0x{opcode:02X} at offset 0x{offset:X}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// A call or repeat would exceed the track's fixed stack capacity.
    #[error("call stack overflow at offset 0x{offset:X} (capacity {capacity})")]
    StackOverflow { offset: usize, capacity: usize },

    /// A return or repeat-end was decoded with no matching frame.
    #[error("call stack underflow at offset 0x{offset:X}")]
    StackUnderflow { offset: usize },

    /// Header fields or pointers contradict each other.
    #[error("structural inconsistency: {0}")]
    Structural(String),

    /// The backing store could not be read.
    #[error("i/o error: {0}")]
    Io(String),

    /// A generic error with a human-readable message.
    #[error("{0}")]
    Other(String),
}

impl ParseError {
    /// Whether the error aborts the whole document rather than a single track.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParseError::StackOverflow { .. } | ParseError::Structural(_) | ParseError::Io(_)
        )
    }

    /// Byte offset the error refers to, when it has one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            ParseError::OffsetOutOfRange { offset, .. }
            | ParseError::UnknownOpcode { offset, .. }
            | ParseError::StackOverflow { offset, .. }
            | ParseError::StackUnderflow { offset } => Some(*offset),
            _ => None,
        }
    }

    /// Attach a context label to an `OffsetOutOfRange` error.
    pub fn with_context(self, label: &str) -> Self {
        match self {
            ParseError::OffsetOutOfRange {
                offset,
                needed,
                available,
                ..
            } => ParseError::OffsetOutOfRange {
                offset,
                needed,
                available,
                context: Some(label.to_string()),
            },
            other => other,
        }
    }
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::Io(e.to_string())
    }
}

fn check_range(bytes: &[u8], off: usize, needed: usize) -> Result<(), ParseError> {
    match off.checked_add(needed) {
        Some(end) if end <= bytes.len() => Ok(()),
        _ => Err(ParseError::OffsetOutOfRange {
            offset: off,
            needed,
            available: bytes.len(),
            context: None,
        }),
    }
}

/// Read a single byte from `bytes` at `off`.
pub fn read_u8_at(bytes: &[u8], off: usize) -> Result<u8, ParseError> {
    check_range(bytes, off, 1)?;
    Ok(bytes[off])
}

/// Read a 16-bit big-endian unsigned integer from `bytes` at `off`.
pub fn read_u16_be_at(bytes: &[u8], off: usize) -> Result<u16, ParseError> {
    check_range(bytes, off, 2)?;
    Ok(u16::from_be_bytes([bytes[off], bytes[off + 1]]))
}

/// Read a 32-bit big-endian unsigned integer from `bytes` at `off`.
pub fn read_u32_be_at(bytes: &[u8], off: usize) -> Result<u32, ParseError> {
    check_range(bytes, off, 4)?;
    let mut tmp: [u8; 4] = [0; 4];
    tmp.copy_from_slice(&bytes[off..off + 4]);
    Ok(u32::from_be_bytes(tmp))
}

/// Return a borrowed slice of length `len` starting at `off` from `bytes`.
///
/// Returns `Err(ParseError::OffsetOutOfRange)` when the requested range
/// exceeds the available buffer.
pub fn read_slice(bytes: &[u8], off: usize, len: usize) -> Result<&[u8], ParseError> {
    check_range(bytes, off, len).map_err(|e| e.with_context("read_slice"))?;
    Ok(&bytes[off..off + len])
}

/// Write a 32-bit big-endian unsigned integer `v` into `buf` at `off`.
///
/// This function does not perform bounds checking; callers must ensure the
/// destination range is valid.
pub fn write_u32_be(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_be_bytes());
}

/// Append `value` to `out` as a MIDI variable-length quantity.
///
/// Seven bits are stored per byte, most significant group first, and every
/// byte except the last carries the continuation bit (0x80). Values above
/// `VLQ_MAX` are clamped.
pub fn write_vlq(out: &mut Vec<u8>, value: u32) {
    let value = value.min(VLQ_MAX);
    let mut groups = [0u8; 4];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let cont = if i > 0 { 0x80 } else { 0x00 };
        out.push(groups[i] | cont);
    }
}

/// Decode a MIDI variable-length quantity from `bytes` at `off`.
///
/// Returns the value and the number of bytes consumed. At most four bytes
/// are read; a fourth byte that still carries the continuation bit is
/// reported as `ParseError::Other`.
pub fn read_vlq(bytes: &[u8], off: usize) -> Result<(u32, usize), ParseError> {
    let mut value: u32 = 0;
    for i in 0..4 {
        let b = read_u8_at(bytes, off + i)?;
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ParseError::Other(format!(
        "variable-length quantity at 0x{:X} exceeds four bytes",
        off
    )))
}

/// Number of bytes `write_vlq` produces for `value`.
pub fn vlq_len(value: u32) -> usize {
    match value.min(VLQ_MAX) {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlq_known_encodings() {
        let cases: [(u32, &[u8]); 8] = [
            (0x00, &[0x00]),
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (480, &[0x83, 0x60]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x20_0000, &[0x81, 0x80, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            write_vlq(&mut out, value);
            assert_eq!(out, expected, "encoding of {value:#X}");
            assert_eq!(vlq_len(value), expected.len());
        }
    }

    #[test]
    fn vlq_rejects_five_byte_quantity() {
        let bytes = [0x81, 0x80, 0x80, 0x80, 0x00];
        assert!(read_vlq(&bytes, 0).is_err());
    }

    #[test]
    fn readers_report_out_of_range() {
        let bytes = [0x01, 0x02, 0x03];
        assert_eq!(read_u16_be_at(&bytes, 1).unwrap(), 0x0203);
        match read_u32_be_at(&bytes, 0) {
            Err(ParseError::OffsetOutOfRange {
                offset, needed, ..
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(needed, 4);
            }
            other => panic!("expected OffsetOutOfRange, got {:?}", other),
        }
        assert!(read_u8_at(&bytes, usize::MAX).is_err());
    }
}
