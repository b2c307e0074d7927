//! Format-agnostic MIDI event buffer.
//!
//! `MusicDocument` is filled by the emit pass: one `MidiTrack` per decoded
//! track plus a `global` stream whose events are merged into every track
//! when the document is serialized. Once the emit pass has finished the
//! document is not mutated again and can be handed to another consumer.
use crate::midi::event::{MidiEvent, MidiMessage};
use crate::midi::writer;

/// Events of one output track.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MidiTrack {
    pub name: Option<String>,
    pub events: Vec<MidiEvent>,
}

impl MidiTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        MidiTrack {
            name: Some(name.into()),
            events: Vec::new(),
        }
    }

    /// Append a message with its default priority.
    pub fn add(&mut self, time: u32, message: MidiMessage) {
        self.events.push(MidiEvent::new(time, message));
    }

    pub fn push(&mut self, event: MidiEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A complete multi-track MIDI document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicDocument {
    /// Pulses per quarter note.
    pub ppqn: u16,
    pub tracks: Vec<MidiTrack>,
    /// Broadcast events merged into every track at serialization time.
    pub global: MidiTrack,
}

impl MusicDocument {
    pub fn new(ppqn: u16) -> Self {
        MusicDocument {
            ppqn,
            tracks: Vec::new(),
            global: MidiTrack::new(),
        }
    }

    /// Append an empty track and return its index.
    pub fn add_track(&mut self, track: MidiTrack) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// Events of track `index` as they will be written: merged with the
    /// global stream, ordered, with exactly one trailing end-of-track.
    pub fn sorted_events(&self, index: usize) -> Vec<MidiEvent> {
        match self.tracks.get(index) {
            Some(track) => writer::merge_and_sort(track, &self.global),
            None => Vec::new(),
        }
    }

    /// Musical length in ticks: the latest end-of-track over all tracks.
    pub fn duration(&self) -> u32 {
        (0..self.tracks.len())
            .filter_map(|i| self.sorted_events(i).last().map(|e| e.time))
            .max()
            .unwrap_or(0)
    }

    /// Serialize into Standard MIDI File (format 1) bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        writer::write_smf(self)
    }
}

impl From<MusicDocument> for Vec<u8> {
    fn from(document: MusicDocument) -> Vec<u8> {
        document.to_bytes()
    }
}

impl From<&MusicDocument> for Vec<u8> {
    fn from(document: &MusicDocument) -> Vec<u8> {
        document.to_bytes()
    }
}
