use seqrip::midi::{MidiEvent, MidiMessage, MidiTrack, MusicDocument, Priority, read_smf};
use seqrip::{VLQ_MAX, read_vlq, write_vlq};

fn note_on(key: u8, velocity: u8) -> MidiMessage {
    MidiMessage::NoteOn {
        channel: 0,
        key,
        velocity,
    }
}

fn note_off(key: u8) -> MidiMessage {
    MidiMessage::NoteOff {
        channel: 0,
        key,
        velocity: 0,
    }
}

#[test]
fn test_single_note_file_is_byte_exact() {
    let mut doc = MusicDocument::new(480);
    let mut track = MidiTrack::new();
    track.add(0, note_on(60, 100));
    track.add(480, note_off(60));
    track.add(480, MidiMessage::EndOfTrack);
    doc.add_track(track);

    let bytes = doc.to_bytes();
    let expected: Vec<u8> = [
        b"MThd".as_slice(),
        &[0, 0, 0, 6, 0, 1, 0, 1, 0x01, 0xE0],
        b"MTrk",
        &[0, 0, 0, 13],
        &[
            0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, 0x80, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00,
        ],
    ]
    .concat();
    assert_eq!(bytes, expected);
}

#[test]
fn test_same_tick_events_follow_priority() {
    let mut doc = MusicDocument::new(96);
    let mut track = MidiTrack::new();
    // inserted in reverse priority order
    track.add(10, note_on(64, 90));
    track.add(
        10,
        MidiMessage::ProgramChange {
            channel: 0,
            program: 3,
        },
    );
    track.add(10, note_off(60));
    track.add(10, MidiMessage::Tempo(500_000));
    track.add(0, note_on(60, 90));
    doc.add_track(track);

    let events = doc.sorted_events(0);
    let kinds: Vec<Priority> = events.iter().map(|e| e.priority).collect();
    assert_eq!(
        kinds,
        vec![
            Priority::Middle,  // note-on at 0
            Priority::Highest, // tempo
            Priority::Higher,  // note-off
            Priority::High,    // program
            Priority::Middle,  // note-on
            Priority::Lowest,  // end of track
        ]
    );
    assert_eq!(events.last().map(|e| e.time), Some(10));
}

#[test]
fn test_explicit_priority_overrides_default() {
    let mut track = MidiTrack::new();
    track.add(5, MidiMessage::Tempo(400_000));
    track.push(MidiEvent::with_priority(
        5,
        Priority::Highest,
        MidiMessage::Controller {
            channel: 0,
            controller: 7,
            value: 100,
        },
    ));
    let mut doc = MusicDocument::new(48);
    doc.add_track(track);
    let events = doc.sorted_events(0);
    // same priority keeps insertion order
    assert_eq!(events[0].message, MidiMessage::Tempo(400_000));
    assert!(matches!(
        events[1].message,
        MidiMessage::Controller { controller: 7, .. }
    ));
}

#[test]
fn test_missing_end_of_track_is_synthesized() {
    let mut doc = MusicDocument::new(48);
    let mut track = MidiTrack::named("Bass");
    track.add(0, note_on(40, 80));
    track.add(96, note_off(40));
    doc.add_track(track);
    doc.add_track(MidiTrack::new());

    assert_eq!(doc.duration(), 96);
    let smf = read_smf(&doc.to_bytes()).expect("written file parses");
    assert_eq!(smf.tracks.len(), 2);
    assert_eq!(smf.tracks[0].last(), Some(&(96, MidiMessage::EndOfTrack)));
    assert_eq!(smf.tracks[1], vec![(0, MidiMessage::EndOfTrack)]);
}

#[test]
fn test_global_stream_is_merged_into_every_track() {
    let mut doc = MusicDocument::new(48);
    for key in [60u8, 67] {
        let mut track = MidiTrack::new();
        track.add(0, note_on(key, 100));
        track.add(48, note_off(key));
        doc.add_track(track);
    }
    doc.global.add(0, MidiMessage::GlobalTranspose(-12));
    doc.global.add(24, MidiMessage::Marker("B".into()));

    let smf = read_smf(&doc.to_bytes()).expect("parse");
    for (track, key) in smf.tracks.iter().zip([48u8, 55]) {
        assert_eq!(
            track,
            &vec![
                (0, note_on(key, 100)),
                (24, MidiMessage::Marker("B".into())),
                (48, note_off(key)),
                (48, MidiMessage::EndOfTrack),
            ]
        );
    }
}

#[test]
fn test_vlq_round_trip() {
    let values = [
        0u32,
        1,
        0x7F,
        0x80,
        0x2000,
        0x3FFF,
        0x4000,
        0x1F_FFFF,
        0x20_0000,
        0x0765_4321,
        VLQ_MAX,
    ];
    for value in values {
        let mut buf = Vec::new();
        write_vlq(&mut buf, value);
        let (decoded, used) = read_vlq(&buf, 0).expect("decode");
        assert_eq!(decoded, value);
        assert_eq!(used, buf.len());
    }
    let mut buf = Vec::new();
    write_vlq(&mut buf, u32::MAX);
    assert_eq!(read_vlq(&buf, 0).unwrap().0, VLQ_MAX);
}

#[test]
fn test_late_global_transpose_does_not_extend_finished_track() {
    let mut doc = MusicDocument::new(48);
    let mut short = MidiTrack::new();
    short.add(0, note_on(60, 100));
    short.add(48, note_off(60));
    short.add(48, MidiMessage::EndOfTrack);
    doc.add_track(short);

    let mut long = MidiTrack::new();
    long.add(96, note_on(64, 100));
    long.add(144, note_off(64));
    long.add(144, MidiMessage::EndOfTrack);
    doc.add_track(long);
    doc.global.add(96, MidiMessage::GlobalTranspose(5));

    let smf = read_smf(&doc.to_bytes()).expect("parse");
    assert_eq!(
        smf.tracks[0],
        vec![
            (0, note_on(60, 100)),
            (48, note_off(60)),
            (48, MidiMessage::EndOfTrack),
        ]
    );
    assert_eq!(
        smf.tracks[1],
        vec![
            (96, note_on(69, 100)),
            (144, note_off(69)),
            (144, MidiMessage::EndOfTrack),
        ]
    );
    assert_eq!(doc.sorted_events(0).last().map(|e| e.time), Some(48));
}

#[test]
fn test_oversized_delta_is_clamped() {
    let mut doc = MusicDocument::new(48);
    let mut track = MidiTrack::new();
    track.add(VLQ_MAX + 10, note_on(60, 100));
    doc.add_track(track);

    let bytes = doc.to_bytes();
    // the delta is written as the largest four-byte VLQ
    assert_eq!(&bytes[22..26], &[0xFF, 0xFF, 0xFF, 0x7F]);
    let smf = read_smf(&bytes).expect("parse");
    assert_eq!(
        smf.tracks[0],
        vec![
            (VLQ_MAX, note_on(60, 100)),
            (VLQ_MAX, MidiMessage::EndOfTrack),
        ]
    );
}

#[test]
fn test_track_count_is_capped_at_header_limit() {
    let mut doc = MusicDocument::new(48);
    for _ in 0..=u16::MAX as usize {
        doc.add_track(MidiTrack::new());
    }
    assert_eq!(doc.tracks.len(), 65536);

    let bytes = doc.to_bytes();
    assert_eq!(&bytes[10..12], &[0xFF, 0xFF]);
    let smf = read_smf(&bytes).expect("parse");
    assert_eq!(smf.tracks.len(), 65535);
}
