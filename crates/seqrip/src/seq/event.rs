//! Decoded sequence events.
//!
//! A `SeqEvent` is what the annotation pass records for every opcode it
//! walks: the semantic meaning of the bytes, the span they occupy and the
//! absolute tick at which they take effect. Events are immutable once
//! created.
use std::fmt;

use crate::region::RegionKind;

/// Semantic meaning of one decoded opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum SeqEventKind {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    /// A note with a known gate length in ticks.
    NoteWithDuration { key: u8, velocity: u8, duration: u32 },
    /// Extends the sounding note by `duration` ticks.
    Tie { duration: u32 },
    Rest { duration: u32 },
    /// Marks the next note as slurred into its successor.
    Slur,
    /// Changes default note parameters (length, gate, velocity) without
    /// sounding anything.
    NoteParams { length: u32, gate: u8, velocity: u8 },
    Volume(u8),
    Expression(u8),
    MasterVolume(u8),
    Pan(u8),
    Tempo { bpm: f64 },
    TimeSignature { numerator: u8, denominator: u8 },
    ProgramChange(u8),
    Controller { controller: u8, value: u8 },
    PitchBend(i16),
    /// Start of a counted repeat; 0 repeats forever.
    RepeatStart { count: u8 },
    RepeatEnd,
    Jump { target: usize },
    Call { target: usize, times: u8 },
    Return,
    /// Synthetic event standing for an unconditional jump back to an
    /// already decoded offset.
    LoopForever { target: usize },
    Transpose(i8),
    GlobalTranspose(i8),
    Channel(u8),
    Marker(String),
    /// A recognised opcode that has no MIDI counterpart (vibrato, echo...).
    Unhandled(&'static str),
    EndOfTrack,
}

impl SeqEventKind {
    /// Region category for this event.
    pub fn region_kind(&self) -> RegionKind {
        use SeqEventKind::*;
        match self {
            NoteOn { .. } | NoteOff { .. } | NoteWithDuration { .. } => RegionKind::Note,
            Tie { .. } | Slur => RegionKind::Tie,
            Rest { .. } => RegionKind::Rest,
            NoteParams { .. } => RegionKind::Misc,
            Volume(_) | Expression(_) | MasterVolume(_) => RegionKind::Volume,
            Pan(_) => RegionKind::Pan,
            Tempo { .. } => RegionKind::Tempo,
            TimeSignature { .. } => RegionKind::TimeSignature,
            ProgramChange(_) => RegionKind::Program,
            Controller { .. } => RegionKind::Controller,
            PitchBend(_) => RegionKind::PitchBend,
            RepeatStart { .. } | RepeatEnd | LoopForever { .. } => RegionKind::Loop,
            Jump { .. } => RegionKind::Jump,
            Call { .. } | Return => RegionKind::Call,
            Transpose(_) | GlobalTranspose(_) => RegionKind::Transpose,
            Channel(_) => RegionKind::Channel,
            Marker(_) => RegionKind::Marker,
            Unhandled(_) => RegionKind::Misc,
            EndOfTrack => RegionKind::EndOfTrack,
        }
    }
}

impl fmt::Display for SeqEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SeqEventKind::*;
        match self {
            NoteOn { key, velocity } => write!(f, "Note On {} vel {}", key_name(*key), velocity),
            NoteOff { key } => write!(f, "Note Off {}", key_name(*key)),
            NoteWithDuration {
                key,
                velocity,
                duration,
            } => write!(
                f,
                "Note {} vel {} dur {}",
                key_name(*key),
                velocity,
                duration
            ),
            Tie { duration } => write!(f, "Tie {}", duration),
            Rest { duration } => write!(f, "Rest {}", duration),
            Slur => write!(f, "Slur"),
            NoteParams {
                length,
                gate,
                velocity,
            } => write!(f, "Note Params len {} gate {} vel {}", length, gate, velocity),
            Volume(v) => write!(f, "Volume {}", v),
            Expression(v) => write!(f, "Expression {}", v),
            MasterVolume(v) => write!(f, "Master Volume {}", v),
            Pan(v) => write!(f, "Pan {}", v),
            Tempo { bpm } => write!(f, "Tempo {:.2} BPM", bpm),
            TimeSignature {
                numerator,
                denominator,
            } => write!(f, "Time Signature {}/{}", numerator, denominator),
            ProgramChange(p) => write!(f, "Program Change {}", p),
            Controller { controller, value } => write!(f, "Controller {} = {}", controller, value),
            PitchBend(v) => write!(f, "Pitch Bend {}", v),
            RepeatStart { count: 0 } => write!(f, "Repeat Start (forever)"),
            RepeatStart { count } => write!(f, "Repeat Start x{}", count),
            RepeatEnd => write!(f, "Repeat End"),
            Jump { target } => write!(f, "Jump 0x{:X}", target),
            Call { target, times } => write!(f, "Call 0x{:X} x{}", target, times),
            Return => write!(f, "Return"),
            LoopForever { target } => write!(f, "Loop Forever -> 0x{:X}", target),
            Transpose(t) => write!(f, "Transpose {:+}", t),
            GlobalTranspose(t) => write!(f, "Global Transpose {:+}", t),
            Channel(c) => write!(f, "Channel {}", c),
            Marker(s) => write!(f, "Marker \"{}\"", s),
            Unhandled(name) => write!(f, "{}", name),
            EndOfTrack => write!(f, "End of Track"),
        }
    }
}

/// One decoded opcode with its byte span and absolute time.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqEvent {
    pub offset: usize,
    pub length: usize,
    /// Absolute time in ticks.
    pub time: u32,
    pub kind: SeqEventKind,
}

impl SeqEvent {
    pub fn new(offset: usize, length: usize, time: u32, kind: SeqEventKind) -> Self {
        SeqEvent {
            offset,
            length,
            time,
            kind,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Note name such as `C4` or `F#2` (MIDI key 60 = C4).
pub fn key_name(key: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = (key / 12) as i32 - 1;
    format!("{}{}", NAMES[(key % 12) as usize], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names() {
        assert_eq!(key_name(60), "C4");
        assert_eq!(key_name(61), "C#4");
        assert_eq!(key_name(0), "C-1");
        assert_eq!(key_name(127), "G9");
    }

    #[test]
    fn loop_events_share_region_kind() {
        assert_eq!(
            SeqEventKind::LoopForever { target: 0 }.region_kind(),
            RegionKind::Loop
        );
        assert_eq!(SeqEventKind::RepeatEnd.region_kind(), RegionKind::Loop);
    }
}
