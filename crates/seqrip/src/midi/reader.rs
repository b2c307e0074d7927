//! Minimal Standard MIDI File reader.
//!
//! Decodes the subset `write_smf` produces (no running status is assumed,
//! but running status is accepted) back into absolute-time messages, so
//! converted output can be checked message by message.
use crate::binutil::{ParseError, read_slice, read_u16_be_at, read_u32_be_at, read_vlq};
use crate::midi::event::MidiMessage;

/// Header fields and decoded tracks of an SMF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmfFile {
    pub format: u16,
    pub ppqn: u16,
    /// Per track: `(absolute time, message)` in file order.
    pub tracks: Vec<Vec<(u32, MidiMessage)>>,
}

impl SmfFile {
    /// Latest event time over all tracks.
    pub fn duration(&self) -> u32 {
        self.tracks
            .iter()
            .filter_map(|t| t.last().map(|(time, _)| *time))
            .max()
            .unwrap_or(0)
    }
}

/// Parse an SMF from `bytes`.
pub fn read_smf(bytes: &[u8]) -> Result<SmfFile, ParseError> {
    let ident = read_slice(bytes, 0, 4)?;
    if ident != b"MThd" {
        return Err(ParseError::Structural(format!(
            "expected MThd, found {:02X?}",
            ident
        )));
    }
    let header_len = read_u32_be_at(bytes, 4)? as usize;
    if header_len < 6 {
        return Err(ParseError::Structural(format!(
            "header length {} shorter than 6",
            header_len
        )));
    }
    let format = read_u16_be_at(bytes, 8)?;
    let ntracks = read_u16_be_at(bytes, 10)?;
    let ppqn = read_u16_be_at(bytes, 12)?;

    let mut off = 8 + header_len;
    let mut tracks = Vec::with_capacity(ntracks as usize);
    for _ in 0..ntracks {
        let ident = read_slice(bytes, off, 4)?;
        if ident != b"MTrk" {
            return Err(ParseError::Structural(format!(
                "expected MTrk at 0x{:X}",
                off
            )));
        }
        let len = read_u32_be_at(bytes, off + 4)? as usize;
        let body = read_slice(bytes, off + 8, len)?;
        tracks.push(read_track(body)?);
        off += 8 + len;
    }

    Ok(SmfFile {
        format,
        ppqn,
        tracks,
    })
}

fn read_track(body: &[u8]) -> Result<Vec<(u32, MidiMessage)>, ParseError> {
    let mut events = Vec::new();
    let mut off = 0;
    let mut time: u32 = 0;
    let mut running: Option<u8> = None;

    while off < body.len() {
        let (delta, n) = read_vlq(body, off)?;
        off += n;
        time = time.saturating_add(delta);

        let mut status = *body.get(off).ok_or(ParseError::UnexpectedEof)?;
        if status < 0x80 {
            status = running.ok_or_else(|| {
                ParseError::Other(format!("data byte without running status at 0x{:X}", off))
            })?;
        } else {
            off += 1;
        }

        let message = match status {
            0x80..=0xEF => {
                running = Some(status);
                let channel = status & 0x0F;
                let a = *body.get(off).ok_or(ParseError::UnexpectedEof)?;
                let two = !matches!(status & 0xF0, 0xC0 | 0xD0);
                let b = if two {
                    *body.get(off + 1).ok_or(ParseError::UnexpectedEof)?
                } else {
                    0
                };
                off += if two { 2 } else { 1 };
                match status & 0xF0 {
                    0x80 => MidiMessage::NoteOff {
                        channel,
                        key: a,
                        velocity: b,
                    },
                    0x90 if b == 0 => MidiMessage::NoteOff {
                        channel,
                        key: a,
                        velocity: 0,
                    },
                    0x90 => MidiMessage::NoteOn {
                        channel,
                        key: a,
                        velocity: b,
                    },
                    0xB0 => MidiMessage::Controller {
                        channel,
                        controller: a,
                        value: b,
                    },
                    0xC0 => MidiMessage::ProgramChange {
                        channel,
                        program: a,
                    },
                    0xE0 => MidiMessage::PitchBend {
                        channel,
                        value: (((b as i32) << 7 | a as i32) - 0x2000) as i16,
                    },
                    _ => MidiMessage::Text(format!("status {:02X}", status)),
                }
            }
            0xFF => {
                let kind = *body.get(off).ok_or(ParseError::UnexpectedEof)?;
                let (len, n) = read_vlq(body, off + 1)?;
                let data = read_slice(body, off + 1 + n, len as usize)?;
                off += 1 + n + len as usize;
                match kind {
                    0x2F => MidiMessage::EndOfTrack,
                    0x51 if data.len() == 3 => MidiMessage::Tempo(
                        (data[0] as u32) << 16 | (data[1] as u32) << 8 | data[2] as u32,
                    ),
                    0x58 if data.len() == 4 => MidiMessage::TimeSignature {
                        numerator: data[0],
                        denominator_pow2: data[1],
                        clocks_per_click: data[2],
                        notated_32nds: data[3],
                    },
                    0x03 => MidiMessage::TrackName(String::from_utf8_lossy(data).into_owned()),
                    0x06 => MidiMessage::Marker(String::from_utf8_lossy(data).into_owned()),
                    _ => MidiMessage::Text(String::from_utf8_lossy(data).into_owned()),
                }
            }
            0xF0 | 0xF7 => {
                let (len, n) = read_vlq(body, off)?;
                let data = read_slice(body, off + n, len as usize)?;
                off += n + len as usize;
                MidiMessage::SysEx(data.to_vec())
            }
            other => {
                return Err(ParseError::UnknownOpcode {
                    opcode: other,
                    offset: off,
                });
            }
        };
        events.push((time, message));
    }
    Ok(events)
}
