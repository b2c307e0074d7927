//! The contract between the interpreter and a concrete sequence format.
use crate::binutil::ParseError;
use crate::seq::track::TrackContext;

/// Which walk over the track bytes is running.
///
/// Every conversion walks each track three times with the same decoder:
/// `Annotate` records events and regions, `MeasureLength` only accumulates
/// ticks and `Emit` produces MIDI. A decoder normally does not need to know
/// which pass is running; the `add_*` helpers on `TrackContext` do the right
/// thing for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Annotate,
    MeasureLength,
    Emit,
}

/// Per-format opcode decoder, one instance per track.
///
/// `read_event` is called with the cursor on the first byte of an opcode. It
/// must consume at least one byte, decode the operands, call at most one
/// `add_*` helper and advance time with `TrackContext::add_time` by the
/// event's duration. Returning `Ok(false)` ends the track.
///
/// Unknown opcodes should return `ParseError::UnknownOpcode`; the interpreter
/// logs it and ends only the current track.
pub trait TrackDecoder: Send {
    fn read_event(&mut self, ctx: &mut TrackContext<'_>) -> Result<bool, ParseError>;

    /// Called before every pass so decoder-private state (current duration,
    /// octave, velocity...) starts from the same point each time.
    fn reset(&mut self) {}
}

impl<F> TrackDecoder for F
where
    F: FnMut(&mut TrackContext<'_>) -> Result<bool, ParseError> + Send,
{
    fn read_event(&mut self, ctx: &mut TrackContext<'_>) -> Result<bool, ParseError> {
        self(ctx)
    }
}
