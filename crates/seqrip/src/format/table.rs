//! Data-driven decoder for simple byte-code sequence formats.
//!
//! Many drivers share the same shape: one opcode byte followed by a fixed
//! operand layout. An `OpcodeTable` describes such a driver as plain data,
//! so a new format only needs a table, not code.
//!
//! Operand layouts (all operands follow the opcode byte):
//!
//! | kind              | operands                              |
//! |-------------------|---------------------------------------|
//! | `Note { key }`    | duration u8                           |
//! | `Rest`, `Tie`     | duration u8                           |
//! | `Slur`            | -                                     |
//! | `Velocity`        | velocity u8                           |
//! | `Volume`          | u8                                    |
//! | `Expression`      | u8                                    |
//! | `Pan`             | u8                                    |
//! | `Program`         | u8                                    |
//! | `Tempo`           | BPM u8                                |
//! | `TimeSignature`   | numerator u8, denominator power u8    |
//! | `Transpose`       | i8                                    |
//! | `GlobalTranspose` | i8                                    |
//! | `Channel`         | u8                                    |
//! | `RepeatStart`     | count u8 (0 = forever)                |
//! | `RepeatEnd`       | -                                     |
//! | `Jump`, `Call`    | pointer u16 in the table's byte order |
//! | `Return`, `End`   | -                                     |
//! | `Marker`          | length u8, ASCII text                 |
//! | `Skip(n)`         | n ignored bytes                       |
use std::ops::RangeInclusive;

use crate::binutil::ParseError;
use crate::format::{Endian, translate_address};
use crate::region::{RegionKind, RegionNode};
use crate::seq::{SequenceDocument, Track, TrackContext, TrackDecoder};
use crate::source::ByteSource;

/// Meaning of one opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Note { key: u8 },
    Rest,
    Tie,
    Slur,
    Velocity,
    Volume,
    Expression,
    Pan,
    Program,
    Tempo,
    TimeSignature,
    Transpose,
    GlobalTranspose,
    Channel,
    RepeatStart,
    RepeatEnd,
    Jump,
    Call,
    Return,
    Marker,
    Skip(u8),
    End,
}

/// Opcode byte to `OpKind` map; unmapped bytes are unknown opcodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeTable {
    entries: [Option<OpKind>; 256],
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OpcodeTable {
    /// An empty table; every byte is unknown.
    pub fn new() -> Self {
        OpcodeTable {
            entries: [None; 256],
        }
    }

    pub fn get(&self, opcode: u8) -> Option<OpKind> {
        self.entries[opcode as usize]
    }

    pub fn set(&mut self, opcode: u8, kind: OpKind) -> &mut Self {
        self.entries[opcode as usize] = Some(kind);
        self
    }

    pub fn clear(&mut self, opcode: u8) -> &mut Self {
        self.entries[opcode as usize] = None;
        self
    }

    /// Map `opcodes` to consecutive notes, the first one playing `first_key`.
    pub fn set_notes(&mut self, opcodes: RangeInclusive<u8>, first_key: u8) -> &mut Self {
        let start = *opcodes.start();
        for opcode in opcodes {
            let key = first_key.saturating_add(opcode - start).min(127);
            self.entries[opcode as usize] = Some(OpKind::Note { key });
        }
        self
    }

    /// The reference layout:
    ///
    /// | opcode  | kind                                 |
    /// |---------|--------------------------------------|
    /// | `00`    | `End`                                |
    /// | `01-7F` | `Note`, key = opcode                 |
    /// | `80`    | `Rest`                               |
    /// | `81`    | `Tie`                                |
    /// | `82`    | `Slur`                               |
    /// | `83`    | `Velocity`                           |
    /// | `84`    | `Volume`                             |
    /// | `85`    | `Expression`                         |
    /// | `86`    | `Pan`                                |
    /// | `87`    | `Program`                            |
    /// | `88`    | `Tempo`                              |
    /// | `89`    | `TimeSignature`                      |
    /// | `8A`    | `Transpose`                          |
    /// | `8B`    | `GlobalTranspose`                    |
    /// | `8C`    | `Channel`                            |
    /// | `8D`    | `RepeatStart`                        |
    /// | `8E`    | `RepeatEnd`                          |
    /// | `8F`    | `Jump`                               |
    /// | `90`    | `Call`                               |
    /// | `91`    | `Return`                             |
    /// | `92`    | `Marker`                             |
    /// | `93`    | `Skip(1)`                            |
    /// | `94-FF` | unknown                              |
    pub fn reference() -> Self {
        let mut t = OpcodeTable::new();
        t.set(0x00, OpKind::End)
            .set_notes(0x01..=0x7F, 0x01)
            .set(0x80, OpKind::Rest)
            .set(0x81, OpKind::Tie)
            .set(0x82, OpKind::Slur)
            .set(0x83, OpKind::Velocity)
            .set(0x84, OpKind::Volume)
            .set(0x85, OpKind::Expression)
            .set(0x86, OpKind::Pan)
            .set(0x87, OpKind::Program)
            .set(0x88, OpKind::Tempo)
            .set(0x89, OpKind::TimeSignature)
            .set(0x8A, OpKind::Transpose)
            .set(0x8B, OpKind::GlobalTranspose)
            .set(0x8C, OpKind::Channel)
            .set(0x8D, OpKind::RepeatStart)
            .set(0x8E, OpKind::RepeatEnd)
            .set(0x8F, OpKind::Jump)
            .set(0x90, OpKind::Call)
            .set(0x91, OpKind::Return)
            .set(0x92, OpKind::Marker)
            .set(0x93, OpKind::Skip(1));
        t
    }
}

const DEFAULT_VELOCITY: u8 = 100;

/// `TrackDecoder` driven by an `OpcodeTable`.
#[derive(Debug, Clone)]
pub struct TableDecoder {
    table: OpcodeTable,
    endian: Endian,
    base_address: usize,
    velocity: u8,
}

impl TableDecoder {
    pub fn new(table: OpcodeTable, endian: Endian, base_address: usize) -> Self {
        TableDecoder {
            table,
            endian,
            base_address,
            velocity: DEFAULT_VELOCITY,
        }
    }

    fn read_pointer(&self, ctx: &mut TrackContext<'_>, what: &str) -> Result<usize, ParseError> {
        let raw = match self.endian {
            Endian::Little => ctx.read_u16_le()?,
            Endian::Big => ctx.read_u16_be()?,
        };
        let len = ctx.source().len();
        translate_address(raw as usize, self.base_address, len, what)
    }
}

impl TrackDecoder for TableDecoder {
    fn reset(&mut self) {
        self.velocity = DEFAULT_VELOCITY;
    }

    fn read_event(&mut self, ctx: &mut TrackContext<'_>) -> Result<bool, ParseError> {
        let offset = ctx.offset();
        let opcode = ctx.read_u8()?;
        let Some(kind) = self.table.get(opcode) else {
            return Err(ParseError::UnknownOpcode { opcode, offset });
        };

        match kind {
            OpKind::Note { key } => {
                let duration = ctx.read_u8()? as u32;
                ctx.add_note_by_dur(key, self.velocity, duration);
                ctx.add_time(duration);
            }
            OpKind::Rest => {
                let duration = ctx.read_u8()? as u32;
                ctx.add_rest(duration);
            }
            OpKind::Tie => {
                let duration = ctx.read_u8()? as u32;
                ctx.add_tie(duration);
                ctx.add_time(duration);
            }
            OpKind::Slur => ctx.add_slur(),
            OpKind::Velocity => {
                self.velocity = ctx.read_u8()? & 0x7F;
                ctx.add_note_params(0, 0, self.velocity);
            }
            OpKind::Volume => {
                let v = ctx.read_u8()?;
                ctx.add_volume(v);
            }
            OpKind::Expression => {
                let v = ctx.read_u8()?;
                ctx.add_expression(v);
            }
            OpKind::Pan => {
                let v = ctx.read_u8()?;
                ctx.add_pan(v);
            }
            OpKind::Program => {
                let v = ctx.read_u8()?;
                ctx.add_program_change(v);
            }
            OpKind::Tempo => {
                let bpm = ctx.read_u8()?;
                ctx.add_tempo_bpm(bpm as f64);
            }
            OpKind::TimeSignature => {
                let numerator = ctx.read_u8()?;
                let power = ctx.read_u8()?.min(7);
                ctx.add_time_signature(numerator, 1 << power);
            }
            OpKind::Transpose => {
                let t = ctx.read_i8()?;
                ctx.add_transpose(t);
            }
            OpKind::GlobalTranspose => {
                let t = ctx.read_i8()?;
                ctx.add_global_transpose(t);
            }
            OpKind::Channel => {
                let ch = ctx.read_u8()?;
                ctx.add_channel(ch);
            }
            OpKind::RepeatStart => {
                let count = ctx.read_u8()?;
                ctx.repeat_start(count)?;
            }
            OpKind::RepeatEnd => return ctx.repeat_end(),
            OpKind::Jump => {
                let target = self.read_pointer(ctx, "jump target")?;
                return ctx.jump(target);
            }
            OpKind::Call => {
                let target = self.read_pointer(ctx, "call target")?;
                ctx.call(target, 1)?;
            }
            OpKind::Return => ctx.ret()?,
            OpKind::Marker => {
                let len = ctx.read_u8()? as usize;
                let at = ctx.offset();
                let text = ctx.source().read(at, len)?;
                ctx.skip(len);
                ctx.add_marker(String::from_utf8_lossy(&text).into_owned());
            }
            OpKind::Skip(n) => {
                ctx.skip(n as usize);
                ctx.add_unhandled("Skip");
            }
            OpKind::End => return Ok(ctx.add_end_of_track()),
        }
        Ok(true)
    }
}

/// Configuration of a table-driven format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFormat {
    pub table: OpcodeTable,
    /// Byte order of jump, call and pointer-table entries.
    pub pointer_endian: Endian,
    /// Address that dump offset 0 is loaded at.
    pub base_address: usize,
    pub ppqn: u16,
}

impl Default for TableFormat {
    fn default() -> Self {
        TableFormat {
            table: OpcodeTable::reference(),
            pointer_endian: Endian::Little,
            base_address: 0,
            ppqn: 48,
        }
    }
}

impl TableFormat {
    /// Build a document whose tracks start at the given addresses. Track `i`
    /// plays on MIDI channel `i % 16`.
    pub fn load(
        &self,
        name: impl Into<String>,
        source: ByteSource,
        track_addresses: &[usize],
    ) -> Result<SequenceDocument, ParseError> {
        let len = source.len();
        let mut document = SequenceDocument::new(name, source, self.ppqn);
        for (i, &address) in track_addresses.iter().enumerate() {
            let start = translate_address(address, self.base_address, len, "track pointer")
                .map_err(|e| ParseError::Structural(format!("track {}: {}", i, e)))?;
            let track = Track::new(format!("Track {}", i), start, (i % 16) as u8);
            document.add_track(
                track,
                TableDecoder::new(self.table.clone(), self.pointer_endian, self.base_address),
            );
        }
        tracing::debug!(tracks = track_addresses.len(), "table format loaded");
        Ok(document)
    }

    /// Like `load`, reading `count` track pointers from a table at dump
    /// offset `table_offset`.
    pub fn load_with_pointer_table(
        &self,
        name: impl Into<String>,
        mut source: ByteSource,
        table_offset: usize,
        count: usize,
    ) -> Result<SequenceDocument, ParseError> {
        let mut addresses = Vec::with_capacity(count);
        for i in 0..count {
            let at = table_offset + i * 2;
            let raw = match self.pointer_endian {
                Endian::Little => source.read_u16_le(at),
                Endian::Big => source.read_u16_be(at),
            }
            .map_err(|e| e.with_context("pointer table"))?;
            addresses.push(raw as usize);
        }

        let mut document = self.load(name, source, &addresses)?;
        let mut header = RegionNode::new(
            table_offset,
            count * 2,
            "Track Pointers",
            RegionKind::Header,
        );
        for (i, address) in addresses.iter().enumerate() {
            header.add_child(
                table_offset + i * 2,
                2,
                format!("Track {} -> 0x{:X}", i, address),
                RegionKind::Pointer,
            );
        }
        document.add_header_region(header);
        Ok(document)
    }
}
