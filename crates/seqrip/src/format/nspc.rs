//! Nintendo SNES "N-SPC" sequence driver.
//!
//! The driver lives in the SPC700's 64 KiB audio RAM. A song is a list of
//! patterns; a pattern is eight little-endian 16-bit pointers, one per
//! voice, each pointing at that voice's track bytecode (0 = voice unused).
//!
//! Track bytecode:
//!
//! | byte    | meaning                                                   |
//! |---------|-----------------------------------------------------------|
//! | `00`    | end of track, or return from a subroutine                 |
//! | `01-7F` | note length; may be followed by a quantize/velocity byte  |
//! | `80-C7` | note, key = byte - `80` + 24                              |
//! | `C8`    | tie                                                       |
//! | `C9`    | rest                                                      |
//! | `CA-DF` | percussion note                                           |
//! | `E0-FA` | commands with fixed operand lengths (`VCMD_LENGTHS`)      |
//!
//! The quantize/velocity byte packs a gate rate index in bits 4-6 and a
//! velocity index in bits 0-3.
use crate::binutil::ParseError;
use crate::format::translate_address;
use crate::region::{RegionKind, RegionNode};
use crate::seq::{SequenceDocument, Track, TrackContext, TrackDecoder};
use crate::source::ByteSource;

/// Ticks per quarter note.
pub const NSPC_PPQN: u16 = 48;

const VOICE_COUNT: usize = 8;
const NOTE_KEY_BASE: u8 = 24;
/// General MIDI acoustic bass drum; percussion notes count up from here.
const PERCUSSION_KEY_BASE: u8 = 36;

/// Gate rate (out of 256) by quantize index.
const GATE_RATES: [u8; 8] = [0x33, 0x66, 0x80, 0x99, 0xB3, 0xCC, 0xE6, 0xFF];

/// Driver velocity by velocity index.
const VELOCITIES: [u8; 16] = [
    0x19, 0x32, 0x4C, 0x65, 0x72, 0x7F, 0x8C, 0x98, 0xA5, 0xB2, 0xBF, 0xCB, 0xD8, 0xE5, 0xF2, 0xFC,
];

/// Operand byte count of commands `E0..=FA`.
const VCMD_LENGTHS: [u8; 27] = [
    1, 1, 2, 3, 0, 1, 2, 1, 2, 1, 1, 3, 0, 1, 2, 3, 1, 3, 3, 0, 1, 3, 0, 3, 3, 3, 1,
];

/// Tempo byte to beats per minute at `NSPC_PPQN`.
pub fn tempo_to_bpm(tempo: u8) -> f64 {
    tempo as f64 * 625.0 / 256.0
}

/// Driver pan (0..=20, 10 = centre, 20 = full left) to MIDI pan.
pub fn pan_to_midi(pan: u8) -> u8 {
    let p = (pan & 0x1F).min(20) as u32;
    (127 - p * 127 / 20) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NspcDecoder {
    base_address: usize,
    duration: u8,
    gate_rate: u8,
    velocity: u8,
}

impl NspcDecoder {
    pub fn new(base_address: usize) -> Self {
        let mut d = NspcDecoder {
            base_address,
            duration: 0,
            gate_rate: 0,
            velocity: 0,
        };
        d.reset();
        d
    }

    fn gate(&self) -> u32 {
        (self.duration as u32 * self.gate_rate as u32 / 256).max(1)
    }
}

impl TrackDecoder for NspcDecoder {
    fn reset(&mut self) {
        self.duration = NSPC_PPQN as u8;
        self.gate_rate = GATE_RATES[7];
        self.velocity = VELOCITIES[15] >> 1;
    }

    fn read_event(&mut self, ctx: &mut TrackContext<'_>) -> Result<bool, ParseError> {
        let offset = ctx.offset();
        let status = ctx.read_u8()?;
        match status {
            0x00 => {
                if ctx.in_subroutine() {
                    ctx.ret()?;
                    Ok(true)
                } else {
                    Ok(ctx.add_end_of_track())
                }
            }
            0x01..=0x7F => {
                self.duration = status;
                let next = ctx.peek_u8()?;
                if next < 0x80 {
                    ctx.skip(1);
                    self.gate_rate = GATE_RATES[((next >> 4) & 0x07) as usize];
                    self.velocity = VELOCITIES[(next & 0x0F) as usize] >> 1;
                }
                ctx.add_note_params(self.duration as u32, self.gate_rate, self.velocity);
                Ok(true)
            }
            0x80..=0xC7 => {
                let key = status - 0x80 + NOTE_KEY_BASE;
                ctx.add_note_by_dur(key, self.velocity, self.gate());
                ctx.add_time(self.duration as u32);
                Ok(true)
            }
            0xC8 => {
                ctx.add_tie(self.gate());
                ctx.add_time(self.duration as u32);
                Ok(true)
            }
            0xC9 => {
                ctx.add_rest(self.duration as u32);
                Ok(true)
            }
            0xCA..=0xDF => {
                let index = status - 0xCA;
                let key = PERCUSSION_KEY_BASE.saturating_add(index).min(127);
                ctx.add_percussion_note(key, self.velocity, self.gate());
                ctx.add_time(self.duration as u32);
                Ok(true)
            }
            0xE0..=0xFA => self.read_command(ctx, status),
            _ => Err(ParseError::UnknownOpcode {
                opcode: status,
                offset,
            }),
        }
    }
}

impl NspcDecoder {
    fn read_command(&self, ctx: &mut TrackContext<'_>, status: u8) -> Result<bool, ParseError> {
        let len = VCMD_LENGTHS[(status - 0xE0) as usize] as usize;
        let mut args = [0u8; 3];
        for arg in args.iter_mut().take(len) {
            *arg = ctx.read_u8()?;
        }

        match status {
            0xE0 => ctx.add_program_change(args[0]),
            0xE1 => ctx.add_pan(pan_to_midi(args[0])),
            0xE2 => ctx.add_unhandled("Pan Fade"),
            0xE3 => ctx.add_unhandled("Vibrato On"),
            0xE4 => ctx.add_unhandled("Vibrato Off"),
            0xE5 => ctx.add_master_volume(args[0] >> 1),
            0xE6 => ctx.add_unhandled("Master Volume Fade"),
            0xE7 => ctx.add_tempo_bpm(tempo_to_bpm(args[0])),
            0xE8 => ctx.add_unhandled("Tempo Fade"),
            0xE9 => ctx.add_global_transpose(args[0] as i8),
            0xEA => ctx.add_transpose(args[0] as i8),
            0xEB => ctx.add_unhandled("Tremolo On"),
            0xEC => ctx.add_unhandled("Tremolo Off"),
            0xED => ctx.add_volume(args[0] >> 1),
            0xEE => ctx.add_unhandled("Volume Fade"),
            0xEF => {
                let address = u16::from_le_bytes([args[0], args[1]]) as usize;
                let len = ctx.source().len();
                let target = translate_address(address, self.base_address, len, "subroutine")?;
                ctx.call(target, args[2])?;
            }
            0xF0 => ctx.add_unhandled("Vibrato Fade"),
            0xF1 => ctx.add_unhandled("Pitch Envelope To"),
            0xF2 => ctx.add_unhandled("Pitch Envelope From"),
            0xF3 => ctx.add_unhandled("Pitch Envelope Off"),
            0xF4 => ctx.add_unhandled("Tuning"),
            0xF5 => ctx.add_unhandled("Echo On"),
            0xF6 => ctx.add_unhandled("Echo Off"),
            0xF7 => ctx.add_unhandled("Echo Parameters"),
            0xF8 => ctx.add_unhandled("Echo Volume Fade"),
            0xF9 => ctx.add_unhandled("Pitch Slide"),
            _ => ctx.add_unhandled("Percussion Base"),
        }
        Ok(true)
    }
}

/// Where the song lives in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NspcConfig {
    /// ARAM address of dump offset 0 (0 for a full 64 KiB ARAM image).
    pub base_address: usize,
    /// ARAM address of the pattern to convert.
    pub pattern_address: u16,
}

impl NspcConfig {
    pub fn new(base_address: usize, pattern_address: u16) -> Self {
        NspcConfig {
            base_address,
            pattern_address,
        }
    }

    /// Read the pattern's voice pointers and build a document with one track
    /// per used voice. Voice `i` plays on MIDI channel `i`.
    pub fn load(
        &self,
        name: impl Into<String>,
        mut source: ByteSource,
    ) -> Result<SequenceDocument, ParseError> {
        let len = source.len();
        let pattern = translate_address(
            self.pattern_address as usize,
            self.base_address,
            len,
            "pattern",
        )?;

        let mut header = RegionNode::new(pattern, VOICE_COUNT * 2, "Pattern", RegionKind::Header);
        let mut voices = Vec::new();
        for voice in 0..VOICE_COUNT {
            let at = pattern + voice * 2;
            let address = source
                .read_u16_le(at)
                .map_err(|e| e.with_context("pattern"))? as usize;
            header.add_child(
                at,
                2,
                format!("Voice {} -> ${:04X}", voice, address),
                RegionKind::Pointer,
            );
            if address == 0 {
                continue;
            }
            let start = translate_address(address, self.base_address, len, "voice pointer")
                .map_err(|e| ParseError::Structural(format!("voice {}: {}", voice, e)))?;
            voices.push((voice, start));
        }

        let mut document = SequenceDocument::new(name, source, NSPC_PPQN);
        document.add_header_region(header);
        for (voice, start) in voices {
            document.add_track(
                Track::new(format!("Voice {}", voice), start, voice as u8),
                NspcDecoder::new(self.base_address),
            );
        }
        tracing::debug!(
            pattern = self.pattern_address,
            tracks = document.track_count(),
            "N-SPC pattern loaded"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_centre_and_extremes() {
        assert_eq!(pan_to_midi(10), 64);
        assert_eq!(pan_to_midi(0), 127);
        assert_eq!(pan_to_midi(20), 0);
        assert_eq!(pan_to_midi(0x1F), 0);
    }

    #[test]
    fn tempo_conversion() {
        assert!((tempo_to_bpm(0x20) - 78.125).abs() < 1e-9);
    }

    #[test]
    fn command_lengths_cover_range() {
        assert_eq!(VCMD_LENGTHS.len(), (0xFA - 0xE0 + 1) as usize);
        assert_eq!(VCMD_LENGTHS[(0xEF - 0xE0) as usize], 3);
    }
}
