//! Standard MIDI File serialization.
//!
//! Layout written by `write_smf`:
//!
//! | bytes            | meaning                                   |
//! |------------------|-------------------------------------------|
//! | `"MThd"`         | header chunk id                           |
//! | `00 00 00 06`    | header length                             |
//! | `00 01`          | format 1                                  |
//! | `nn nn`          | track count, big-endian                   |
//! | `pp pp`          | pulses per quarter note, big-endian       |
//! | `"MTrk"` + len   | per track, big-endian 32-bit byte count   |
//! | delta + event... | VLQ delta time followed by the event      |
//!
//! Running status is never used; every channel message carries its status
//! byte. Delta times above `VLQ_MAX` (about 268 million ticks) are clamped,
//! which moves every later event of that track earlier by the excess.
use crate::binutil::{VLQ_MAX, write_u32_be, write_vlq};
use crate::midi::document::{MidiTrack, MusicDocument};
use crate::midi::event::{MidiEvent, MidiMessage, Priority};

/// Merge `track` with `global`, order the result and normalize its
/// end-of-track.
///
/// Ordering is a stable sort by priority followed by a stable sort by time,
/// so events sharing a tick keep priority order and, within one priority,
/// insertion order (track events before global ones). Any end-of-track
/// markers are replaced by a single one at the later of the declared end and
/// the last event that writes bytes. A global transpose after the track has
/// ended does not extend it.
pub(crate) fn merge_and_sort(track: &MidiTrack, global: &MidiTrack) -> Vec<MidiEvent> {
    let mut events: Vec<MidiEvent> = track
        .events
        .iter()
        .chain(global.events.iter())
        .cloned()
        .collect();

    let declared_end = events
        .iter()
        .filter(|e| e.message == MidiMessage::EndOfTrack)
        .map(|e| e.time)
        .max();
    events.retain(|e| e.message != MidiMessage::EndOfTrack);

    events.sort_by_key(|e| e.priority);
    events.sort_by_key(|e| e.time);

    let last_real = events
        .iter()
        .rev()
        .find(|e| e.message.is_encoded())
        .map(|e| e.time)
        .unwrap_or(0);
    let end = declared_end.map_or(last_real, |t| t.max(last_real));
    events.retain(|e| e.message.is_encoded() || e.time <= end);
    events.push(MidiEvent::with_priority(
        end,
        Priority::Lowest,
        MidiMessage::EndOfTrack,
    ));
    events
}

/// Tracks which encoded key each sounding note received so its note-off
/// matches even if the transposition changed in between.
struct KeyMap {
    sounding: [[Option<u8>; 128]; 16],
    transpose: i8,
}

impl KeyMap {
    fn new() -> Self {
        KeyMap {
            sounding: [[None; 128]; 16],
            transpose: 0,
        }
    }

    fn shifted(&self, key: u8) -> u8 {
        (key as i16 + self.transpose as i16).clamp(0, 127) as u8
    }

    fn note_on(&mut self, channel: u8, key: u8) -> u8 {
        let encoded = self.shifted(key);
        self.sounding[(channel & 0x0F) as usize][(key & 0x7F) as usize] = Some(encoded);
        encoded
    }

    fn note_off(&mut self, channel: u8, key: u8) -> u8 {
        self.sounding[(channel & 0x0F) as usize][(key & 0x7F) as usize]
            .take()
            .unwrap_or_else(|| self.shifted(key))
    }
}

/// Encode one ordered event list as an `MTrk` chunk appended to `out`.
pub(crate) fn write_track(events: &[MidiEvent], out: &mut Vec<u8>) {
    out.extend_from_slice(b"MTrk");
    let len_pos = out.len();
    out.extend_from_slice(&[0, 0, 0, 0]);
    let body_start = out.len();

    let mut keys = KeyMap::new();
    let mut running_time: u32 = 0;
    for event in events {
        let message = match &event.message {
            MidiMessage::GlobalTranspose(t) => {
                keys.transpose = *t;
                continue;
            }
            MidiMessage::NoteOn {
                channel,
                key,
                velocity,
            } => MidiMessage::NoteOn {
                channel: *channel,
                key: keys.note_on(*channel, *key),
                velocity: *velocity,
            },
            MidiMessage::NoteOff {
                channel,
                key,
                velocity,
            } => MidiMessage::NoteOff {
                channel: *channel,
                key: keys.note_off(*channel, *key),
                velocity: *velocity,
            },
            other => other.clone(),
        };
        let delta = event.time.saturating_sub(running_time);
        if delta > VLQ_MAX {
            tracing::warn!(
                time = event.time,
                delta,
                "delta time above the VLQ limit, clamped to {}",
                VLQ_MAX
            );
        }
        write_vlq(out, delta);
        running_time = running_time.max(event.time);
        message.encode(out);
    }

    let body_len = (out.len() - body_start) as u32;
    write_u32_be(out, len_pos, body_len);
}

/// Serialize a whole document as a format-1 Standard MIDI File.
///
/// The header counts tracks in 16 bits; tracks past the 65535th are not
/// written.
pub fn write_smf(document: &MusicDocument) -> Vec<u8> {
    let count = u16::try_from(document.tracks.len()).unwrap_or(u16::MAX);
    if usize::from(count) < document.tracks.len() {
        tracing::warn!(
            tracks = document.tracks.len(),
            written = count,
            "too many tracks for a Standard MIDI File"
        );
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&document.ppqn.to_be_bytes());

    for track in document.tracks.iter().take(usize::from(count)) {
        let events = merge_and_sort(track, &document.global);
        write_track(&events, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_track_moves_past_last_event() {
        let mut track = MidiTrack::new();
        track.add(10, MidiMessage::EndOfTrack);
        track.add(
            20,
            MidiMessage::NoteOff {
                channel: 0,
                key: 60,
                velocity: 0,
            },
        );
        let events = merge_and_sort(&track, &MidiTrack::new());
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].message, MidiMessage::EndOfTrack);
        assert_eq!(events[1].time, 20);
    }

    #[test]
    fn note_off_keeps_key_of_note_on() {
        let mut track = MidiTrack::new();
        track.add(
            0,
            MidiMessage::NoteOn {
                channel: 0,
                key: 60,
                velocity: 90,
            },
        );
        track.add(
            10,
            MidiMessage::NoteOff {
                channel: 0,
                key: 60,
                velocity: 0,
            },
        );
        let mut global = MidiTrack::new();
        global.add(5, MidiMessage::GlobalTranspose(12));
        global.add(0, MidiMessage::GlobalTranspose(2));

        let events = merge_and_sort(&track, &global);
        let mut out = Vec::new();
        write_track(&events, &mut out);
        // transpose +2 applies to the note-on, the later +12 must not
        // change the key of its note-off
        assert_eq!(
            &out[8..],
            &[0x00, 0x90, 62, 90, 0x0A, 0x80, 62, 0x00, 0x00, 0xFF, 0x2F, 0x00]
        );
    }
}
