//! MIDI side: the event buffer filled by the emit pass, the Standard MIDI
//! File writer and a small reader for checking written files.
mod document;
pub mod event;
pub mod reader;
mod writer;

pub use document::{MidiTrack, MusicDocument};
pub use event::{MidiEvent, MidiMessage, Priority, bpm_to_micros, master_volume_sysex};
pub use reader::{SmfFile, read_smf};
pub use writer::write_smf;
