//! `SequenceDocument`: the tracks of one sequence and the passes over them.
//!
//! A format loader builds a document from a `ByteSource`, adds one `Track`
//! and one `TrackDecoder` per track, and hands it to the caller. The caller
//! then runs:
//!
//! - `annotate()` to obtain a `RegionTree` and per-track `SeqEvent` lists,
//! - `measure()` to obtain the per-track tick totals and the stop time,
//! - `convert()` to obtain a `MusicDocument` (this measures first).
//!
//! Problems confined to one track are written to the document's
//! `ConversionLog` and mark the document `LoadStatus::Partial`; structural
//! problems abort the pass and are returned as errors.
use std::fmt;

use crate::binutil::ParseError;
use crate::midi::{MidiTrack, MusicDocument};
use crate::midi::event::MidiMessage;
use crate::region::{RegionNode, RegionTree};
use crate::seq::decoder::{Pass, TrackDecoder};
use crate::seq::log::{ConversionLog, LogEntry, LogLevel, LogSink};
use crate::seq::track::{self, EmitTarget, SharedState, Track, TrackContext, TrackEnd};
use crate::source::ByteSource;

/// Tunables of the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    /// How many times `MeasureLength` follows a jump back into decoded bytes
    /// before the track stops. 1 plays a looped section twice.
    pub loop_count: u32,
    /// Depth of the per-track call/repeat stack.
    pub stack_capacity: usize,
    /// Opcodes a track may decode in one pass before it is stopped.
    pub max_events_per_track: usize,
    /// MIDI channel of `add_percussion_note`.
    pub percussion_channel: u8,
    /// Write each track's name as a track-name meta event at time 0.
    pub write_track_names: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        ConversionOptions {
            loop_count: 1,
            stack_capacity: 16,
            max_events_per_track: 200_000,
            percussion_channel: 9,
            write_track_names: true,
        }
    }
}

/// Whether every track decoded cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    Complete,
    /// At least one track stopped on an error; see the log.
    Partial,
}

struct TrackSlot {
    track: Track,
    decoder: Box<dyn TrackDecoder>,
}

/// One sequence: its byte source, tracks and conversion state.
pub struct SequenceDocument {
    name: String,
    source: ByteSource,
    ppqn: u16,
    offset: usize,
    length: usize,
    options: ConversionOptions,
    tracks: Vec<TrackSlot>,
    header_regions: Vec<RegionNode>,
    regions: Option<RegionTree>,
    shared: SharedState,
    log: ConversionLog,
    status: LoadStatus,
}

impl fmt::Debug for SequenceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceDocument")
            .field("name", &self.name)
            .field("ppqn", &self.ppqn)
            .field("tracks", &self.tracks.len())
            .field("status", &self.status)
            .finish()
    }
}

impl SequenceDocument {
    /// Create an empty document reading from `source`.
    ///
    /// # Arguments
    /// * `name` - Label of the document, used as the region tree root label
    /// * `source` - The dump the tracks are decoded from
    /// * `ppqn` - Pulses per quarter note of the sequence's tick unit
    pub fn new(name: impl Into<String>, source: ByteSource, ppqn: u16) -> Self {
        SequenceDocument {
            name: name.into(),
            source,
            ppqn,
            offset: 0,
            length: 0,
            options: ConversionOptions::default(),
            tracks: Vec::new(),
            header_regions: Vec::new(),
            regions: None,
            shared: SharedState::default(),
            log: ConversionLog::new(),
            status: LoadStatus::Complete,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut ByteSource {
        &mut self.source
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ConversionOptions) {
        self.options = options;
    }

    /// Sets how many times a looped section is repeated when measuring.
    pub fn set_loop_count(&mut self, count: u32) {
        self.options.loop_count = count;
    }

    /// Byte span of the whole sequence. With `length == 0` the span is
    /// fitted to the annotated tracks.
    pub fn set_span(&mut self, offset: usize, length: usize) {
        self.offset = offset;
        self.length = length;
    }

    /// Forward log entries to `sink` in addition to keeping them.
    pub fn set_log_sink(&mut self, sink: Box<dyn LogSink>) {
        self.log.set_sink(sink);
    }

    /// Append a track decoded by `decoder` and return its index.
    pub fn add_track<D>(&mut self, track: Track, decoder: D) -> usize
    where
        D: TrackDecoder + 'static,
    {
        self.tracks.push(TrackSlot {
            track,
            decoder: Box::new(decoder),
        });
        self.tracks.len() - 1
    }

    /// Add a region describing header bytes (pointer tables and the like).
    pub fn add_header_region(&mut self, node: RegionNode) {
        self.header_regions.push(node);
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index).map(|s| &s.track)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().map(|s| &s.track)
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn log(&self) -> &ConversionLog {
        &self.log
    }

    /// Tree built by the last successful `annotate()`.
    pub fn regions(&self) -> Option<&RegionTree> {
        self.regions.as_ref()
    }

    /// Longest track length of the last successful `measure()`.
    pub fn stop_time(&self) -> Option<u32> {
        self.shared.stop_time
    }

    /// Per-track tick totals of the last `measure()`.
    pub fn measured_lengths(&self) -> Vec<u32> {
        self.tracks
            .iter()
            .map(|s| s.track.measured_length())
            .collect()
    }

    /// Walk every track once, recording events and byte regions.
    ///
    /// Running it again rebuilds the same tree.
    pub fn annotate(&mut self) -> Result<&RegionTree, ParseError> {
        self.regions = None;
        self.run_pass(Pass::Annotate, None)?;

        let mut tree = RegionTree::new(self.offset, self.length, self.name.clone());
        let mut nodes: Vec<RegionNode> = self.header_regions.clone();
        nodes.extend(self.tracks.iter().map(|s| s.track.region().clone()));
        nodes.sort_by_key(|n| n.offset);
        for node in nodes {
            tree.root.push(node);
        }
        tree.guess_length();
        tracing::debug!(
            document = %self.name,
            nodes = tree.node_count(),
            "annotation finished"
        );
        Ok(self.regions.insert(tree))
    }

    /// Measure every track and return the stop time, the longest total.
    pub fn measure(&mut self) -> Result<u32, ParseError> {
        self.shared.stop_time = None;
        self.run_pass(Pass::MeasureLength, None)?;
        let stop = self
            .tracks
            .iter()
            .map(|s| s.track.measured_length())
            .max()
            .unwrap_or(0);
        self.shared.stop_time = Some(stop);
        tracing::debug!(document = %self.name, stop, "measured");
        Ok(stop)
    }

    /// Measure, then emit every track into a new `MusicDocument`.
    pub fn convert(&mut self) -> Result<MusicDocument, ParseError> {
        self.measure()?;
        let mut music = MusicDocument::new(self.ppqn);
        for slot in &self.tracks {
            let name = slot.track.name();
            let mut midi = MidiTrack::named(name);
            if self.options.write_track_names {
                midi.add(0, MidiMessage::TrackName(name.to_string()));
            }
            music.add_track(midi);
        }
        self.run_pass(Pass::Emit, Some(&mut music))?;
        Ok(music)
    }

    fn run_pass(
        &mut self,
        pass: Pass,
        mut music: Option<&mut MusicDocument>,
    ) -> Result<(), ParseError> {
        tracing::debug!(document = %self.name, ?pass, "pass started");

        let mut fatal = None;
        for (index, slot) in self.tracks.iter_mut().enumerate() {
            slot.track.reset(pass);
            slot.decoder.reset();

            let emit = music.as_deref_mut().and_then(|m| {
                let global = &mut m.global;
                m.tracks
                    .get_mut(index)
                    .map(|track| EmitTarget { track, global })
            });
            let mut ctx = TrackContext::new(
                pass,
                &mut slot.track,
                &mut self.source,
                &mut self.shared,
                &self.options,
                emit,
            );
            let outcome = track::run(slot.decoder.as_mut(), &mut ctx);

            let name = slot.track.name();
            match outcome {
                Ok(TrackEnd::Runaway) => {
                    let (offset, _) = slot.track.position();
                    self.log.record_unique(
                        LogEntry::new(
                            LogLevel::Warn,
                            name,
                            format!(
                                "stopped after {} events",
                                self.options.max_events_per_track
                            ),
                        )
                        .at(offset),
                    );
                }
                Ok(end) => {
                    tracing::trace!(track = name, ?pass, ?end, "track finished");
                }
                Err(err) if err.is_fatal() => {
                    let mut entry = LogEntry::new(LogLevel::Error, name, err.to_string());
                    entry.offset = err.offset();
                    self.log.record_unique(entry);
                    fatal = Some(err);
                    break;
                }
                Err(err) => {
                    let mut entry = LogEntry::new(LogLevel::Warn, name, err.to_string());
                    entry.offset = err.offset();
                    self.log.record_unique(entry);
                    self.status = LoadStatus::Partial;
                }
            }
        }

        match fatal {
            Some(err) => {
                self.discard();
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Drop everything the passes produced after a structural failure. The
    /// log is kept.
    fn discard(&mut self) {
        for slot in &mut self.tracks {
            slot.track.clear();
        }
        self.regions = None;
        self.shared = SharedState::default();
        self.status = LoadStatus::Complete;
        tracing::debug!(document = %self.name, "conversion state discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn document_is_send() {
        assert_send::<SequenceDocument>();
    }

    #[test]
    fn defaults() {
        let o = ConversionOptions::default();
        assert_eq!(o.loop_count, 1);
        assert_eq!(o.stack_capacity, 16);
        assert_eq!(o.percussion_channel, 9);
    }
}
