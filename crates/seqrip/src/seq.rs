//! Sequence interpretation: events, tracks, decoders and the document that
//! drives the annotation, measuring and emit passes.
pub mod decoder;
mod document;
pub mod event;
pub mod log;
mod track;

pub use decoder::{Pass, TrackDecoder};
pub use document::{ConversionOptions, LoadStatus, SequenceDocument};
pub use event::{SeqEvent, SeqEventKind, key_name};
pub use log::{ConversionLog, LogEntry, LogLevel, LogSink};
pub use track::{Track, TrackContext, TrackEnd};
