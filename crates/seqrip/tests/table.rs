use seqrip::format::{Endian, OpKind, OpcodeTable, TableFormat};
use seqrip::midi::{MidiMessage, read_smf};
use seqrip::{ByteSource, LoadStatus, ParseError, RegionKind, SeqEventKind};

/// Dump loaded at $8000 with a big-endian pointer table of two tracks.
fn tune() -> Vec<u8> {
    vec![
        0x80, 0x04, 0x80, 0x0A, // pointer table
        0x3C, 0x30, 0x40, 0x30, 0x00, // track 0: C4, E4, end
        0x00, // padding
        0x43, 0x18, 0x8F, 0x80, 0x0A, // track 1: G4, jump back
    ]
}

fn banked() -> TableFormat {
    TableFormat {
        pointer_endian: Endian::Big,
        base_address: 0x8000,
        ..TableFormat::default()
    }
}

fn note_ons(messages: &[(u32, MidiMessage)]) -> Vec<(u32, u8)> {
    messages
        .iter()
        .filter_map(|(t, m)| match m {
            MidiMessage::NoteOn { key, .. } => Some((*t, *key)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_pointer_table_regions() {
    let mut doc = banked()
        .load_with_pointer_table("tune", ByteSource::new(tune()), 0, 2)
        .expect("load");
    assert_eq!(doc.track(1).map(|t| t.start()), Some(0x0A));

    let tree = doc.annotate().expect("annotate").clone();
    let header = &tree.root.children[0];
    assert_eq!(
        (header.offset, header.length, header.kind),
        (0, 4, RegionKind::Header)
    );
    assert_eq!(
        tree.find_at_offset(3).map(|n| n.label.as_str()),
        Some("Track 1 -> 0x800A")
    );
    // the padding byte belongs to no track
    assert!(tree.find_at_offset(9).is_none());
    assert_eq!(
        tree.find_container_at_offset(9).map(|n| n.label.as_str()),
        Some("tune")
    );
    let jump = tree.find_at_offset(0x0D).expect("loop region");
    assert_eq!((jump.offset, jump.length, jump.kind), (0x0C, 3, RegionKind::Loop));
}

#[test]
fn test_pointer_table_convert() {
    let mut doc = banked()
        .load_with_pointer_table("tune", ByteSource::new(tune()), 0, 2)
        .expect("load");
    let music = doc.convert().expect("convert");
    assert_eq!(doc.measured_lengths(), vec![96, 48]);
    assert_eq!(doc.stop_time(), Some(96));

    let smf = read_smf(&music.to_bytes()).expect("parse");
    assert_eq!(note_ons(&smf.tracks[0]), vec![(0, 60), (48, 64)]);
    // the looping track keeps playing until the longest track ends
    assert_eq!(
        note_ons(&smf.tracks[1]),
        vec![(0, 67), (24, 67), (48, 67), (72, 67)]
    );
    assert_eq!(smf.tracks[1].last(), Some(&(96, MidiMessage::EndOfTrack)));
}

#[test]
fn test_track_pointer_outside_dump() {
    let err = banked()
        .load("tune", ByteSource::new(tune()), &[0x7000])
        .expect_err("pointer below base");
    assert!(matches!(err, ParseError::Structural(_)));

    let err = banked()
        .load_with_pointer_table("tune", ByteSource::new(tune()), 14, 2)
        .expect_err("table runs past the dump");
    assert!(matches!(err, ParseError::OffsetOutOfRange { .. }));
}

#[test]
fn test_jump_outside_dump_is_partial() {
    let bytes = vec![0x3C, 0x10, 0x8F, 0x90, 0x00];
    let mut doc = banked()
        .load("tune", ByteSource::new(bytes), &[0x8000])
        .expect("load");
    let music = doc.convert().expect("convert");
    assert_eq!(doc.status(), LoadStatus::Partial);
    assert_eq!(music.duration(), 16);
    assert_eq!(doc.log().entries().len(), 1);
}

#[test]
fn test_custom_table() {
    let mut table = OpcodeTable::new();
    table
        .set_notes(0x10..=0x1F, 48)
        .set(0x20, OpKind::Skip(2))
        .set(0xFF, OpKind::End);
    let format = TableFormat {
        table,
        ..TableFormat::default()
    };

    let bytes = vec![0x20, 0xAA, 0xBB, 0x12, 0x10, 0x3C, 0x10];
    let mut doc = format
        .load("custom", ByteSource::new(bytes), &[0])
        .expect("load");
    doc.annotate().expect("annotate");
    let events: Vec<(usize, usize, SeqEventKind)> = doc
        .track(0)
        .map(|t| {
            t.events()
                .iter()
                .map(|e| (e.offset, e.length, e.kind.clone()))
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(
        events,
        vec![
            (0, 3, SeqEventKind::Unhandled("Skip")),
            (
                3,
                2,
                SeqEventKind::NoteWithDuration {
                    key: 50,
                    velocity: 100,
                    duration: 16
                }
            ),
        ]
    );
    // 0x3C is not a note in this table
    assert_eq!(doc.status(), LoadStatus::Partial);
    assert_eq!(doc.log().entries()[0].offset, Some(5));
}
