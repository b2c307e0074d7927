//! Per-track interpreter state and the context handed to decoders.
//!
//! A `Track` owns everything one walk over a track's bytes mutates: cursor,
//! absolute time, call/repeat stack, visited offsets and the note that is
//! currently sounding. `TrackContext` borrows a track together with the
//! byte source and the document-wide state for the duration of one pass and
//! exposes the read, control-flow and `add_*` helpers decoders call.
use std::collections::HashSet;

use crate::binutil::ParseError;
use crate::midi::MidiTrack;
use crate::midi::event::{MidiMessage, bpm_to_micros, master_volume_sysex};
use crate::region::{RegionKind, RegionNode};
use crate::seq::decoder::{Pass, TrackDecoder};
use crate::seq::document::ConversionOptions;
use crate::seq::event::{SeqEvent, SeqEventKind};
use crate::source::ByteSource;

/// Velocity of the note-off messages written by the emit pass.
const NOTE_OFF_VELOCITY: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Call {
        return_to: usize,
        target: usize,
        remaining: u8,
    },
    /// `remaining == 0` repeats forever.
    Repeat { start: usize, remaining: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNote {
    channel: u8,
    key: u8,
    on_time: u32,
    off_time: u32,
    slurred: bool,
}

/// How a track walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackEnd {
    /// An end-of-track opcode.
    End,
    /// A jump back into already decoded bytes stopped the walk.
    Loop,
    /// Emission reached the document's stop time.
    StopTime,
    /// The per-track event limit was reached.
    Runaway,
}

/// Document-wide state shared by all tracks during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SharedState {
    /// Longest measured track; set after `MeasureLength`.
    pub stop_time: Option<u32>,
}

/// Output streams of the emit pass.
pub(crate) struct EmitTarget<'a> {
    pub track: &'a mut MidiTrack,
    pub global: &'a mut MidiTrack,
}

/// One sequence track inside a `SequenceDocument`.
#[derive(Debug, Clone)]
pub struct Track {
    name: String,
    start: usize,
    initial_channel: u8,

    cursor: usize,
    time: u32,
    measured: u32,
    channel: u8,
    transpose: i8,
    stack: Vec<Frame>,
    visited: HashSet<usize>,
    /// Offsets decoded since each frame on `stack` was entered (or its
    /// current repeat began), with the track body first. Always one longer
    /// than `stack`.
    scopes: Vec<HashSet<usize>>,
    first_visit: bool,
    loops_taken: u32,
    last_loop_time: Option<u32>,
    looped: bool,
    open_note: Option<OpenNote>,
    /// Explicit note-ons still waiting for their note-off: (channel, raw
    /// key, sounded key).
    held: Vec<(u8, u8, u8)>,
    slur_pending: bool,
    event_count: usize,

    events: Vec<SeqEvent>,
    region: RegionNode,
}

impl Track {
    /// A track whose bytes start at `start` and that plays on `channel`
    /// until the data selects another one.
    pub fn new(name: impl Into<String>, start: usize, channel: u8) -> Self {
        let name = name.into();
        let region = RegionNode::new(start, 0, name.clone(), RegionKind::Track);
        Track {
            name,
            start,
            initial_channel: channel & 0x0F,
            cursor: start,
            time: 0,
            measured: 0,
            channel: channel & 0x0F,
            transpose: 0,
            stack: Vec::new(),
            visited: HashSet::new(),
            scopes: vec![HashSet::new()],
            first_visit: false,
            loops_taken: 0,
            last_loop_time: None,
            looped: false,
            open_note: None,
            held: Vec::new(),
            slur_pending: false,
            event_count: 0,
            events: Vec::new(),
            region,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Channel the track starts on.
    pub fn channel(&self) -> u8 {
        self.initial_channel
    }

    /// Tick total of the last `MeasureLength` pass.
    pub fn measured_length(&self) -> u32 {
        self.measured
    }

    /// Events recorded by the last `Annotate` pass, in decode order.
    pub fn events(&self) -> &[SeqEvent] {
        &self.events
    }

    /// Region container built by the last `Annotate` pass.
    pub fn region(&self) -> &RegionNode {
        &self.region
    }

    /// Cursor and time where the last pass stopped.
    pub fn position(&self) -> (usize, u32) {
        (self.cursor, self.time)
    }

    fn scope_contains(&self, offset: usize) -> bool {
        self.scopes.iter().any(|scope| scope.contains(&offset))
    }

    fn mark_decoded(&mut self, offset: usize) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(offset);
        }
    }

    fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.stack.pop()?;
        self.scopes.pop();
        Some(frame)
    }

    /// Forget the results of every pass.
    pub(crate) fn clear(&mut self) {
        self.reset(Pass::Annotate);
        self.measured = 0;
    }

    pub(crate) fn reset(&mut self, pass: Pass) {
        self.cursor = self.start;
        self.time = 0;
        self.channel = self.initial_channel;
        self.transpose = 0;
        self.stack.clear();
        self.visited.clear();
        self.scopes = vec![HashSet::new()];
        self.first_visit = false;
        self.loops_taken = 0;
        self.last_loop_time = None;
        self.looped = false;
        self.open_note = None;
        self.held.clear();
        self.slur_pending = false;
        self.event_count = 0;
        if pass == Pass::Annotate {
            self.events.clear();
            self.region = RegionNode::new(self.start, 0, self.name.clone(), RegionKind::Track);
        }
    }
}

/// Everything a decoder may touch while decoding one opcode.
pub struct TrackContext<'a> {
    track: &'a mut Track,
    source: &'a mut ByteSource,
    shared: &'a mut SharedState,
    options: &'a ConversionOptions,
    emit: Option<EmitTarget<'a>>,
    pass: Pass,
    event_start: usize,
}

impl<'a> TrackContext<'a> {
    pub(crate) fn new(
        pass: Pass,
        track: &'a mut Track,
        source: &'a mut ByteSource,
        shared: &'a mut SharedState,
        options: &'a ConversionOptions,
        emit: Option<EmitTarget<'a>>,
    ) -> Self {
        let event_start = track.cursor;
        TrackContext {
            track,
            source,
            shared,
            options,
            emit,
            pass,
            event_start,
        }
    }

    pub fn pass(&self) -> Pass {
        self.pass
    }

    /// Current read position.
    pub fn offset(&self) -> usize {
        self.track.cursor
    }

    /// Offset of the first byte of the opcode being decoded.
    pub fn event_start(&self) -> usize {
        self.event_start
    }

    /// Absolute time in ticks.
    pub fn time(&self) -> u32 {
        self.track.time
    }

    pub fn channel(&self) -> u8 {
        self.track.channel
    }

    pub fn transpose(&self) -> i8 {
        self.track.transpose
    }

    pub fn track_name(&self) -> &str {
        &self.track.name
    }

    pub fn options(&self) -> &ConversionOptions {
        self.options
    }

    /// Random access to the whole dump, for pointer tables and the like.
    pub fn source(&mut self) -> &mut ByteSource {
        self.source
    }

    /// Whether a subroutine call is active.
    pub fn in_subroutine(&self) -> bool {
        self.track
            .stack
            .iter()
            .any(|f| matches!(f, Frame::Call { .. }))
    }

    pub fn seek(&mut self, offset: usize) {
        self.track.cursor = offset;
    }

    pub fn skip(&mut self, count: usize) {
        self.track.cursor = self.track.cursor.saturating_add(count);
    }

    pub fn peek_u8(&mut self) -> Result<u8, ParseError> {
        self.source.read_u8(self.track.cursor)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        let v = self.source.read_u8(self.track.cursor)?;
        self.track.cursor += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8, ParseError> {
        self.read_u8().map(|v| v as i8)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ParseError> {
        let v = self.source.read_u16_le(self.track.cursor)?;
        self.track.cursor += 2;
        Ok(v)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, ParseError> {
        let v = self.source.read_u16_be(self.track.cursor)?;
        self.track.cursor += 2;
        Ok(v)
    }

    // ---- time ----

    /// Advance absolute time by `ticks`.
    pub fn add_time(&mut self, ticks: u32) {
        self.track.time = self.track.time.saturating_add(ticks);
    }

    // ---- notes ----

    /// A note of `duration` ticks on the current channel, shifted by the
    /// track transpose. Does not advance time.
    ///
    /// If the sounding note was slurred and has the same key, the new note
    /// becomes a tie extending it.
    pub fn add_note_by_dur(&mut self, key: u8, velocity: u8, duration: u32) {
        let key = self.shifted(key);
        let channel = self.track.channel;
        self.note(channel, key, velocity, duration);
    }

    /// Like `add_note_by_dur` but on the percussion channel and without the
    /// track transpose.
    pub fn add_percussion_note(&mut self, key: u8, velocity: u8, duration: u32) {
        let channel = self.options.percussion_channel & 0x0F;
        self.note(channel, key.min(127), velocity, duration);
    }

    /// Explicit note-on, released by a later `add_note_off` with the same
    /// key.
    pub fn add_note_on(&mut self, key: u8, velocity: u8) {
        let sounded = self.shifted(key);
        self.record(SeqEventKind::NoteOn {
            key: sounded,
            velocity,
        });
        let channel = self.track.channel;
        self.release_open_note(Some(self.track.time));
        self.track.held.push((channel, key, sounded));
        self.emit_now(MidiMessage::NoteOn {
            channel,
            key: sounded,
            velocity,
        });
    }

    pub fn add_note_off(&mut self, key: u8) {
        let channel = self.track.channel;
        let pos = self
            .track
            .held
            .iter()
            .position(|&(ch, raw, _)| ch == channel && raw == key);
        let sounded = match pos {
            Some(i) => self.track.held.remove(i).2,
            None => self.shifted(key),
        };
        self.record(SeqEventKind::NoteOff { key: sounded });
        self.emit_now(MidiMessage::NoteOff {
            channel,
            key: sounded,
            velocity: NOTE_OFF_VELOCITY,
        });
    }

    /// Extend the sounding note so it releases `duration` ticks from now.
    /// Without a sounding note this only marks the bytes. Does not advance
    /// time.
    pub fn add_tie(&mut self, duration: u32) {
        self.record(SeqEventKind::Tie { duration });
        let now = self.track.time;
        if let Some(note) = self.track.open_note.as_mut() {
            note.off_time = note.off_time.max(now.saturating_add(duration));
        }
    }

    /// Silence for `duration` ticks; releases the sounding note and
    /// advances time.
    pub fn add_rest(&mut self, duration: u32) {
        self.record(SeqEventKind::Rest { duration });
        self.release_open_note(None);
        self.track.slur_pending = false;
        self.add_time(duration);
    }

    /// Slur the next note into its successor.
    pub fn add_slur(&mut self) {
        self.record(SeqEventKind::Slur);
        self.track.slur_pending = true;
    }

    /// Default note parameters changed; nothing is emitted.
    pub fn add_note_params(&mut self, length: u32, gate: u8, velocity: u8) {
        self.record(SeqEventKind::NoteParams {
            length,
            gate,
            velocity,
        });
    }

    // ---- channel messages ----

    pub fn add_volume(&mut self, volume: u8) {
        self.record(SeqEventKind::Volume(volume));
        self.emit_controller(7, volume);
    }

    pub fn add_expression(&mut self, value: u8) {
        self.record(SeqEventKind::Expression(value));
        self.emit_controller(11, value);
    }

    pub fn add_pan(&mut self, pan: u8) {
        self.record(SeqEventKind::Pan(pan));
        self.emit_controller(10, pan);
    }

    pub fn add_program_change(&mut self, program: u8) {
        self.record(SeqEventKind::ProgramChange(program));
        let channel = self.track.channel;
        self.emit_now(MidiMessage::ProgramChange {
            channel,
            program: program & 0x7F,
        });
    }

    pub fn add_controller(&mut self, controller: u8, value: u8) {
        self.record(SeqEventKind::Controller { controller, value });
        self.emit_controller(controller, value);
    }

    /// Signed bend, `-8192..=8191`.
    pub fn add_pitch_bend(&mut self, value: i16) {
        self.record(SeqEventKind::PitchBend(value));
        let channel = self.track.channel;
        self.emit_now(MidiMessage::PitchBend {
            channel,
            value: value.clamp(-8192, 8191),
        });
    }

    /// Pitch-bend sensitivity in semitones, written as RPN 0.
    pub fn add_pitch_bend_range(&mut self, semitones: u8) {
        self.record(SeqEventKind::Controller {
            controller: 6,
            value: semitones,
        });
        self.emit_controller(101, 0);
        self.emit_controller(100, 0);
        self.emit_controller(6, semitones);
        self.emit_controller(38, 0);
    }

    // ---- meta / global ----

    pub fn add_master_volume(&mut self, volume: u8) {
        self.record(SeqEventKind::MasterVolume(volume));
        self.emit_now(MidiMessage::SysEx(master_volume_sysex(volume)));
    }

    pub fn add_tempo_bpm(&mut self, bpm: f64) {
        self.record(SeqEventKind::Tempo { bpm });
        self.emit_now(MidiMessage::Tempo(bpm_to_micros(bpm)));
    }

    /// `denominator` is the plain note value (4 = quarter).
    pub fn add_time_signature(&mut self, numerator: u8, denominator: u8) {
        self.record(SeqEventKind::TimeSignature {
            numerator,
            denominator,
        });
        self.emit_now(MidiMessage::TimeSignature {
            numerator,
            denominator_pow2: denominator.max(1).trailing_zeros() as u8,
            clocks_per_click: 24,
            notated_32nds: 8,
        });
    }

    pub fn add_marker(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.record(SeqEventKind::Marker(text.clone()));
        self.emit_now(MidiMessage::Marker(text));
    }

    /// Track transposition in semitones, absolute.
    pub fn add_transpose(&mut self, semitones: i8) {
        self.record(SeqEventKind::Transpose(semitones));
        self.track.transpose = semitones;
    }

    /// Transposition applied to every track from now on.
    pub fn add_global_transpose(&mut self, semitones: i8) {
        self.record(SeqEventKind::GlobalTranspose(semitones));
        let time = self.track.time;
        if let Some(target) = self.emit.as_mut() {
            target
                .global
                .add(time, MidiMessage::GlobalTranspose(semitones));
        }
    }

    pub fn add_channel(&mut self, channel: u8) {
        self.record(SeqEventKind::Channel(channel));
        self.track.channel = channel & 0x0F;
    }

    /// A recognised opcode without a MIDI counterpart.
    pub fn add_unhandled(&mut self, label: &'static str) {
        self.record(SeqEventKind::Unhandled(label));
    }

    /// Terminal opcode; returns `false` so a decoder can
    /// `return Ok(ctx.add_end_of_track())`.
    pub fn add_end_of_track(&mut self) -> bool {
        self.record(SeqEventKind::EndOfTrack);
        false
    }

    // ---- control flow ----

    /// Unconditional jump. Returns `false` when the jump loops back into
    /// bytes already decoded by an active call, repeat or the track body,
    /// and the current pass stops here. Bytes decoded by an earlier call of
    /// the same subroutine, or an earlier repeat of the same body, do not
    /// count.
    pub fn jump(&mut self, target: usize) -> Result<bool, ParseError> {
        self.check_target(target, "jump target")?;
        if self.track.scope_contains(target) {
            return Ok(self.loop_back(target));
        }
        self.record(SeqEventKind::Jump { target });
        self.track.cursor = target;
        Ok(true)
    }

    /// Call the subroutine at `target`, playing it `times` times (0 is
    /// treated as 1) before returning after the call.
    pub fn call(&mut self, target: usize, times: u8) -> Result<(), ParseError> {
        self.check_target(target, "call target")?;
        self.push_frame(Frame::Call {
            return_to: self.track.cursor,
            target,
            remaining: times.max(1),
        })?;
        self.record(SeqEventKind::Call { target, times });
        self.track.cursor = target;
        Ok(())
    }

    /// Return from the innermost subroutine, replaying it while repeats
    /// remain. Repeats left open inside the subroutine are dropped.
    pub fn ret(&mut self) -> Result<(), ParseError> {
        while let Some(Frame::Repeat { .. }) = self.track.stack.last() {
            self.track.pop_frame();
        }
        let Some(Frame::Call {
            return_to,
            target,
            remaining,
        }) = self.track.pop_frame()
        else {
            return Err(ParseError::StackUnderflow {
                offset: self.event_start,
            });
        };
        self.record(SeqEventKind::Return);
        if remaining > 1 {
            self.push_frame(Frame::Call {
                return_to,
                target,
                remaining: remaining - 1,
            })?;
            self.track.cursor = target;
        } else {
            self.track.cursor = return_to;
        }
        Ok(())
    }

    /// Open a repeat whose body starts at the current cursor. The body is
    /// played `count` times; 0 repeats forever.
    pub fn repeat_start(&mut self, count: u8) -> Result<(), ParseError> {
        self.push_frame(Frame::Repeat {
            start: self.track.cursor,
            remaining: count,
        })?;
        self.record(SeqEventKind::RepeatStart { count });
        Ok(())
    }

    /// Close the innermost repeat. Returns `false` when an endless repeat
    /// stops the current pass.
    pub fn repeat_end(&mut self) -> Result<bool, ParseError> {
        let Some(Frame::Repeat { start, remaining }) = self.track.stack.last().copied() else {
            return Err(ParseError::StackUnderflow {
                offset: self.event_start,
            });
        };
        if remaining == 0 {
            return Ok(self.loop_back(start));
        }
        self.record(SeqEventKind::RepeatEnd);
        if remaining > 1 {
            if let Some(Frame::Repeat { remaining, .. }) = self.track.stack.last_mut() {
                *remaining -= 1;
            }
            if let Some(scope) = self.track.scopes.last_mut() {
                scope.clear();
            }
            self.track.cursor = start;
        } else {
            self.track.pop_frame();
        }
        Ok(true)
    }

    // ---- internals ----

    fn check_target(&self, target: usize, what: &str) -> Result<(), ParseError> {
        if target >= self.source.len() {
            return Err(ParseError::OffsetOutOfRange {
                offset: target,
                needed: 1,
                available: self.source.len(),
                context: Some(what.to_string()),
            });
        }
        Ok(())
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), ParseError> {
        if self.track.stack.len() >= self.options.stack_capacity {
            return Err(ParseError::StackOverflow {
                offset: self.event_start,
                capacity: self.options.stack_capacity,
            });
        }
        self.track.stack.push(frame);
        self.track.scopes.push(HashSet::new());
        Ok(())
    }

    /// A backward edge into already decoded bytes.
    fn loop_back(&mut self, target: usize) -> bool {
        let follow = match self.pass {
            Pass::Annotate => {
                // the loop opcode may have been decoded before, by an
                // earlier call of the same subroutine
                self.record_always(SeqEventKind::LoopForever { target });
                false
            }
            Pass::MeasureLength => {
                if self.track.loops_taken < self.options.loop_count {
                    self.track.loops_taken += 1;
                    true
                } else {
                    false
                }
            }
            Pass::Emit => {
                let stop = self.shared.stop_time.unwrap_or(0);
                let now = self.track.time;
                if now >= stop || self.track.last_loop_time == Some(now) {
                    false
                } else {
                    self.track.last_loop_time = Some(now);
                    true
                }
            }
        };
        if follow {
            self.track.cursor = target;
        } else {
            self.track.looped = true;
        }
        follow
    }

    fn shifted(&self, key: u8) -> u8 {
        (key as i16 + self.track.transpose as i16).clamp(0, 127) as u8
    }

    fn note(&mut self, channel: u8, key: u8, velocity: u8, duration: u32) {
        let now = self.track.time;
        let slurred = std::mem::take(&mut self.track.slur_pending);
        let tie = matches!(
            self.track.open_note,
            Some(n) if n.slurred && n.key == key && n.channel == channel
        );
        if tie {
            self.record(SeqEventKind::Tie { duration });
            if let Some(n) = self.track.open_note.as_mut() {
                n.off_time = now.saturating_add(duration);
                n.slurred = slurred;
            }
            return;
        }

        self.record(SeqEventKind::NoteWithDuration {
            key,
            velocity,
            duration,
        });
        let same_key = matches!(
            self.track.open_note,
            Some(n) if n.key == key && n.channel == channel
        );
        self.release_open_note(same_key.then_some(now));
        self.emit_now(MidiMessage::NoteOn {
            channel,
            key,
            velocity: velocity & 0x7F,
        });
        self.track.open_note = Some(OpenNote {
            channel,
            key,
            on_time: now,
            off_time: now.saturating_add(duration),
            slurred,
        });
    }

    /// Write the note-off of the sounding note, no later than `cut_at` and
    /// the stop time.
    fn release_open_note(&mut self, cut_at: Option<u32>) {
        let Some(note) = self.track.open_note.take() else {
            return;
        };
        let mut off = note.off_time;
        if let Some(cut) = cut_at {
            off = off.min(cut);
        }
        off = self.clamp_to_stop(off).max(note.on_time);
        self.emit_at(
            off,
            MidiMessage::NoteOff {
                channel: note.channel,
                key: note.key,
                velocity: NOTE_OFF_VELOCITY,
            },
        );
    }

    fn clamp_to_stop(&self, time: u32) -> u32 {
        match (self.pass, self.shared.stop_time) {
            (Pass::Emit, Some(stop)) if stop > 0 => time.min(stop),
            _ => time,
        }
    }

    fn emit_controller(&mut self, controller: u8, value: u8) {
        let channel = self.track.channel;
        self.emit_now(MidiMessage::Controller {
            channel,
            controller: controller & 0x7F,
            value: value & 0x7F,
        });
    }

    fn emit_now(&mut self, message: MidiMessage) {
        let time = self.track.time;
        self.emit_at(time, message);
    }

    fn emit_at(&mut self, time: u32, message: MidiMessage) {
        if let Some(target) = self.emit.as_mut() {
            target.track.add(time, message);
        }
    }

    /// Record the opcode at `event_start..cursor` as an event and a region
    /// node. Only the annotation pass records, and only the first time an
    /// offset is decoded.
    fn record(&mut self, kind: SeqEventKind) {
        if self.pass != Pass::Annotate || !self.track.first_visit {
            return;
        }
        self.record_always(kind);
    }

    /// Record regardless of earlier visits. The region node is still added
    /// once per offset.
    fn record_always(&mut self, kind: SeqEventKind) {
        if self.pass != Pass::Annotate {
            return;
        }
        let length = self.track.cursor.saturating_sub(self.event_start).max(1);
        if self.track.first_visit {
            self.track.region.push(RegionNode::new(
                self.event_start,
                length,
                kind.to_string(),
                kind.region_kind(),
            ));
        }
        self.track
            .events
            .push(SeqEvent::new(self.event_start, length, self.track.time, kind));
    }

    fn begin_event(&mut self) {
        self.event_start = self.track.cursor;
        self.track.mark_decoded(self.track.cursor);
        self.track.first_visit = self.track.visited.insert(self.track.cursor);
        self.track.event_count += 1;
    }

    fn reached_stop(&self) -> bool {
        self.pass == Pass::Emit
            && self
                .shared
                .stop_time
                .is_some_and(|stop| stop > 0 && self.track.time >= stop)
    }

    fn walk(&mut self, decoder: &mut dyn TrackDecoder) -> Result<TrackEnd, ParseError> {
        loop {
            if self.reached_stop() {
                return Ok(TrackEnd::StopTime);
            }
            if self.track.event_count >= self.options.max_events_per_track {
                return Ok(TrackEnd::Runaway);
            }
            self.begin_event();
            if !decoder.read_event(self)? {
                return Ok(if self.track.looped {
                    TrackEnd::Loop
                } else {
                    TrackEnd::End
                });
            }
        }
    }

    /// Release everything still sounding and close the pass.
    fn finish(&mut self) {
        let end = self.clamp_to_stop(self.track.time);
        self.release_open_note(None);
        for (channel, _, key) in std::mem::take(&mut self.track.held) {
            self.emit_at(
                end,
                MidiMessage::NoteOff {
                    channel,
                    key,
                    velocity: NOTE_OFF_VELOCITY,
                },
            );
        }
        self.emit_at(end, MidiMessage::EndOfTrack);
        match self.pass {
            Pass::Annotate => {
                self.track.region.children.sort_by_key(|n| n.offset);
                self.track.region.fit_to_children();
            }
            Pass::MeasureLength => self.track.measured = self.track.time,
            Pass::Emit => {}
        }
    }
}

/// Walk one track from its start until it ends, loops, reaches the stop time
/// or fails.
pub(crate) fn run(
    decoder: &mut dyn TrackDecoder,
    ctx: &mut TrackContext<'_>,
) -> Result<TrackEnd, ParseError> {
    let result = ctx.walk(decoder);
    if ctx.pass == Pass::Annotate {
        if let Err(ParseError::UnknownOpcode { opcode, offset }) = &result {
            ctx.track.region.push(RegionNode::new(
                *offset,
                1,
                format!("Unknown 0x{:02X}", opcode),
                RegionKind::Unknown,
            ));
        }
    }
    ctx.finish();
    result
}
