#![doc = include_str!("../README.md")]
//! seqrip: opcode interpreter and Standard MIDI File converter for
//! game-audio sequence dumps
//!
//! Game music drivers store their songs as small byte-code programs: notes,
//! rests, volume and tempo changes, loops and subroutine calls. `seqrip`
//! walks those programs and turns them into a Standard MIDI File.
//!
//! Building blocks:
//! - `ByteSource`: windowed random-access reader over an in-memory or
//!   file-backed dump, with masked byte-pattern search.
//! - `RegionTree`: hierarchical annotation of which bytes mean what.
//! - `seq`: the three-pass interpreter. A format implements
//!   `TrackDecoder::read_event` for one opcode; the interpreter handles
//!   loops, calls, ties and the per-pass bookkeeping.
//! - `midi`: the priority-ordered event buffer and the byte-exact SMF
//!   writer.
//! - `format`: a table-driven decoder and an SNES N-SPC decoder.
//!
//! Example: converting a table-format track
//!
//! ```rust
//! use seqrip::ByteSource;
//! use seqrip::format::TableFormat;
//!
//! // reference table: tempo 120, note C4 for 0x30 ticks, end of track
//! let dump = vec![0x88, 120, 0x3C, 0x30, 0x00];
//! let mut document = TableFormat::default()
//!     .load("demo", ByteSource::new(dump), &[0])
//!     .expect("track pointer inside the dump");
//!
//! // which bytes mean what
//! let regions = document.annotate().expect("annotation");
//! let note = regions.find_at_offset(2).expect("note region");
//! assert_eq!(note.length, 2);
//!
//! // MIDI
//! let music = document.convert().expect("conversion");
//! assert_eq!(music.duration(), 0x30);
//! let smf: Vec<u8> = music.into();
//! assert_eq!(&smf[..4], b"MThd");
//! ```
//!
//! Example: a custom decoder
//!
//! ```rust
//! use seqrip::{ByteSource, ParseError, SequenceDocument, Track, TrackContext, TrackDecoder};
//!
//! // one byte per event: 0 ends the track, anything else is a quarter note
//! struct OneByte;
//!
//! impl TrackDecoder for OneByte {
//!     fn read_event(&mut self, ctx: &mut TrackContext<'_>) -> Result<bool, ParseError> {
//!         match ctx.read_u8()? {
//!             0 => Ok(ctx.add_end_of_track()),
//!             key => {
//!                 ctx.add_note_by_dur(key, 100, 24);
//!                 ctx.add_time(24);
//!                 Ok(true)
//!             }
//!         }
//!     }
//! }
//!
//! let mut document = SequenceDocument::new("one-byte", ByteSource::new(vec![60, 62, 0]), 24);
//! document.add_track(Track::new("Lead", 0, 0), OneByte);
//! let music = document.convert().unwrap();
//! assert_eq!(music.duration(), 48);
//! ```
mod binutil;
pub mod format;
pub mod midi;
pub mod region;
pub mod seq;
pub mod source;

pub use binutil::{ParseError, VLQ_MAX, read_vlq, vlq_len, write_vlq};
pub use midi::{MidiEvent, MidiMessage, MidiTrack, MusicDocument, Priority};
pub use region::{RegionKind, RegionNode, RegionTree};
pub use seq::{
    ConversionOptions, LoadStatus, Pass, SeqEvent, SeqEventKind, SequenceDocument, Track,
    TrackContext, TrackDecoder,
};
pub use source::{BackingStore, BytePattern, ByteSource, FileStore, WindowConfig};
