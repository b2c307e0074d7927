//! MIDI events produced by the emit pass.
//!
//! Every `MidiEvent` carries an absolute tick and a `Priority`. The priority
//! is only used to order events sharing the same tick when a track is
//! serialized.
use crate::binutil::write_vlq;

/// Same-tick ordering class; lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Tempo, time signature and other meta data.
    Highest = 0,
    /// Note-off, so a re-struck key is released before it sounds again.
    Higher = 1,
    /// Program, controller and system-exclusive messages.
    High = 2,
    /// Note-on and pitch bend.
    Middle = 3,
    /// End of track.
    Lowest = 4,
}

/// One MIDI channel, meta or system-exclusive message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOff { channel: u8, key: u8, velocity: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Signed bend around the centre, `-8192..=8191`.
    PitchBend { channel: u8, value: i16 },
    /// Microseconds per quarter note.
    Tempo(u32),
    TimeSignature {
        numerator: u8,
        /// Denominator as a power of two (2 = quarter note).
        denominator_pow2: u8,
        clocks_per_click: u8,
        notated_32nds: u8,
    },
    TrackName(String),
    Marker(String),
    Text(String),
    /// System-exclusive payload following the `F0` status, including the
    /// terminating `F7`.
    SysEx(Vec<u8>),
    /// Transposition applied to every note encoded after it. Produces no
    /// bytes.
    GlobalTranspose(i8),
    EndOfTrack,
}

impl MidiMessage {
    /// Default same-tick priority for this message.
    pub fn default_priority(&self) -> Priority {
        match self {
            MidiMessage::Tempo(_)
            | MidiMessage::TimeSignature { .. }
            | MidiMessage::TrackName(_)
            | MidiMessage::Marker(_)
            | MidiMessage::Text(_)
            | MidiMessage::GlobalTranspose(_) => Priority::Highest,
            MidiMessage::NoteOff { .. } => Priority::Higher,
            MidiMessage::Controller { .. }
            | MidiMessage::ProgramChange { .. }
            | MidiMessage::SysEx(_) => Priority::High,
            MidiMessage::NoteOn { .. } | MidiMessage::PitchBend { .. } => Priority::Middle,
            MidiMessage::EndOfTrack => Priority::Lowest,
        }
    }

    /// Whether this message writes bytes into the track chunk.
    pub fn is_encoded(&self) -> bool {
        !matches!(self, MidiMessage::GlobalTranspose(_))
    }

    /// Append the wire encoding (without delta time) to `out`.
    ///
    /// Note keys are written as stored; key transposition is applied by the
    /// writer before calling this.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            MidiMessage::NoteOff {
                channel,
                key,
                velocity,
            } => out.extend_from_slice(&[0x80 | (channel & 0x0F), key & 0x7F, velocity & 0x7F]),
            MidiMessage::NoteOn {
                channel,
                key,
                velocity,
            } => out.extend_from_slice(&[0x90 | (channel & 0x0F), key & 0x7F, velocity & 0x7F]),
            MidiMessage::Controller {
                channel,
                controller,
                value,
            } => out.extend_from_slice(&[
                0xB0 | (channel & 0x0F),
                controller & 0x7F,
                value & 0x7F,
            ]),
            MidiMessage::ProgramChange { channel, program } => {
                out.extend_from_slice(&[0xC0 | (channel & 0x0F), program & 0x7F])
            }
            MidiMessage::PitchBend { channel, value } => {
                let raw = (*value as i32 + 0x2000).clamp(0, 0x3FFF) as u16;
                out.extend_from_slice(&[
                    0xE0 | (channel & 0x0F),
                    (raw & 0x7F) as u8,
                    (raw >> 7) as u8,
                ]);
            }
            MidiMessage::Tempo(micros) => {
                let m = (*micros).min(0xFF_FFFF);
                out.extend_from_slice(&[0xFF, 0x51, 0x03]);
                out.extend_from_slice(&m.to_be_bytes()[1..]);
            }
            MidiMessage::TimeSignature {
                numerator,
                denominator_pow2,
                clocks_per_click,
                notated_32nds,
            } => out.extend_from_slice(&[
                0xFF,
                0x58,
                0x04,
                *numerator,
                *denominator_pow2,
                *clocks_per_click,
                *notated_32nds,
            ]),
            MidiMessage::TrackName(s) => encode_meta(out, 0x03, s.as_bytes()),
            MidiMessage::Marker(s) => encode_meta(out, 0x06, s.as_bytes()),
            MidiMessage::Text(s) => encode_meta(out, 0x01, s.as_bytes()),
            MidiMessage::SysEx(data) => {
                out.push(0xF0);
                write_vlq(out, data.len() as u32);
                out.extend_from_slice(data);
            }
            MidiMessage::GlobalTranspose(_) => {}
            MidiMessage::EndOfTrack => out.extend_from_slice(&[0xFF, 0x2F, 0x00]),
        }
    }
}

fn encode_meta(out: &mut Vec<u8>, kind: u8, payload: &[u8]) {
    out.push(0xFF);
    out.push(kind);
    write_vlq(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

/// A message stamped with its absolute tick and same-tick priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    pub time: u32,
    pub priority: Priority,
    pub message: MidiMessage,
}

impl MidiEvent {
    /// Event with the message's default priority.
    pub fn new(time: u32, message: MidiMessage) -> Self {
        MidiEvent {
            time,
            priority: message.default_priority(),
            message,
        }
    }

    pub fn with_priority(time: u32, priority: Priority, message: MidiMessage) -> Self {
        MidiEvent {
            time,
            priority,
            message,
        }
    }
}

/// Beats per minute to microseconds per quarter note.
pub fn bpm_to_micros(bpm: f64) -> u32 {
    if bpm <= 0.0 {
        return 0xFF_FFFF;
    }
    ((60_000_000.0 / bpm).round() as u64).min(0xFF_FFFF) as u32
}

/// Universal real-time master volume SysEx payload (14-bit volume from a
/// 7-bit value), terminator included.
pub fn master_volume_sysex(volume: u8) -> Vec<u8> {
    let v = (volume & 0x7F) as u16;
    let wide = (v << 7) | v;
    vec![
        0x7F,
        0x7F,
        0x04,
        0x01,
        (wide & 0x7F) as u8,
        (wide >> 7) as u8,
        0xF7,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(m: MidiMessage) -> Vec<u8> {
        let mut out = Vec::new();
        m.encode(&mut out);
        out
    }

    #[test]
    fn channel_messages() {
        assert_eq!(
            bytes(MidiMessage::NoteOn {
                channel: 1,
                key: 60,
                velocity: 100
            }),
            vec![0x91, 0x3C, 0x64]
        );
        assert_eq!(
            bytes(MidiMessage::ProgramChange {
                channel: 15,
                program: 5
            }),
            vec![0xCF, 0x05]
        );
        assert_eq!(
            bytes(MidiMessage::PitchBend {
                channel: 0,
                value: 0
            }),
            vec![0xE0, 0x00, 0x40]
        );
        assert_eq!(
            bytes(MidiMessage::PitchBend {
                channel: 0,
                value: -8192
            }),
            vec![0xE0, 0x00, 0x00]
        );
    }

    #[test]
    fn meta_messages() {
        assert_eq!(
            bytes(MidiMessage::Tempo(500_000)),
            vec![0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]
        );
        // three payload bytes
        assert_eq!(
            bytes(MidiMessage::Tempo(0x0100_0000)),
            vec![0xFF, 0x51, 0x03, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            bytes(MidiMessage::TrackName("Lead".into())),
            vec![0xFF, 0x03, 0x04, b'L', b'e', b'a', b'd']
        );
        assert!(bytes(MidiMessage::GlobalTranspose(3)).is_empty());
    }

    #[test]
    fn sysex_carries_length() {
        assert_eq!(
            bytes(MidiMessage::SysEx(master_volume_sysex(0x7F))),
            vec![0xF0, 0x07, 0x7F, 0x7F, 0x04, 0x01, 0x7F, 0x7F, 0xF7]
        );
    }

    #[test]
    fn tempo_from_bpm() {
        assert_eq!(bpm_to_micros(120.0), 500_000);
        assert_eq!(bpm_to_micros(0.0), 0xFF_FFFF);
    }
}
