use seqrip::source::FileStore;
use seqrip::{BackingStore, BytePattern, ByteSource, ParseError, WindowConfig};

fn ramp(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 256) as u8).collect()
}

fn small_window(bytes: Vec<u8>, max_window: usize, post_ratio: f32) -> ByteSource {
    ByteSource::with_config(
        Box::new(bytes),
        WindowConfig {
            max_window,
            post_ratio,
        },
    )
}

#[test]
fn test_read_is_canonical_across_refills() {
    let data = ramp(5000);
    for ratio in [0.0, 0.25, 0.5, 0.75, 1.0] {
        let mut src = small_window(data.clone(), 64, ratio);
        // forward, backward and scattered reads
        let offsets = [0usize, 63, 64, 1000, 999, 10, 4990, 2500, 2440, 4936];
        for &off in &offsets {
            let len = 60.min(data.len() - off);
            let got = src.read(off, len).expect("read inside source");
            assert_eq!(got, &data[off..off + len], "ratio {ratio} offset {off}");
            assert!(src.window().end - src.window().start <= 64);
        }
    }
}

#[test]
fn test_read_larger_than_window() {
    let data = ramp(1000);
    let mut src = small_window(data.clone(), 16, 0.5);
    let got = src.read(100, 500).expect("large read");
    assert_eq!(got, &data[100..600]);
}

#[test]
fn test_integer_readers() {
    let mut src = ByteSource::new(vec![0x12, 0x34, 0x56, 0x78, 0x9A]);
    assert_eq!(src.read_u8(0).unwrap(), 0x12);
    assert_eq!(src.read_i8(4).unwrap(), 0x9Au8 as i8);
    assert_eq!(src.read_u16_le(0).unwrap(), 0x3412);
    assert_eq!(src.read_u16_be(0).unwrap(), 0x1234);
    assert_eq!(src.read_u32_le(1).unwrap(), 0x9A78_5634);
    assert_eq!(src.read_u32_be(1).unwrap(), 0x3456_789A);
}

#[test]
fn test_out_of_range() {
    let mut src = ByteSource::new(vec![1, 2, 3]);
    match src.read(2, 2) {
        Err(ParseError::OffsetOutOfRange {
            offset,
            needed,
            available,
            ..
        }) => {
            assert_eq!(offset, 2);
            assert_eq!(needed, 2);
            assert_eq!(available, 3);
        }
        other => panic!("expected OffsetOutOfRange, got {:?}", other),
    }
    assert!(src.read_u16_le(2).is_err());
    assert_eq!(src.read_clipped(1, 10).unwrap(), vec![2, 3]);
    assert!(src.read_clipped(7, 10).unwrap().is_empty());
}

#[test]
fn test_empty_source() {
    let mut src = ByteSource::new(Vec::new());
    assert!(src.is_empty());
    assert_eq!(src.read(0, 0).unwrap(), Vec::<u8>::new());
    assert!(src.read_u8(0).is_err());
    assert_eq!(src.search(&BytePattern::exact(&[0]), 0, 10), None);
}

#[test]
fn test_search_with_wildcards() {
    let mut data = vec![0u8; 300];
    data[200..203].copy_from_slice(&[0xE0, 0x05, 0x12]);
    data[250..253].copy_from_slice(&[0xE0, 0x77, 0x12]);
    let mut src = small_window(data, 128, 0.5);

    let pattern = BytePattern::parse("E0 ?? 12").expect("pattern");
    assert_eq!(pattern.len(), 3);
    assert_eq!(src.search(&pattern, 150, 150), Some(200));
    assert_eq!(src.search(&pattern, 201, 99), Some(250));
    assert_eq!(src.search(&BytePattern::exact(&[0xE0, 0x77]), 0, 300), None);
    assert_eq!(src.search(&BytePattern::exact(&[0xE0, 0x77]), 200, 100), Some(250));
    assert!(BytePattern::parse("E0 XY").is_err());
}

#[test]
fn test_file_backed_source() {
    let data = ramp(4096);
    let path = std::env::temp_dir().join(format!("seqrip-source-{}.bin", std::process::id()));
    std::fs::write(&path, &data).expect("write temp file");

    let store = FileStore::open(&path).expect("open temp file");
    assert_eq!(store.len(), 4096);
    let mut src = ByteSource::with_config(
        Box::new(store),
        WindowConfig {
            max_window: 256,
            post_ratio: 0.5,
        },
    );
    assert_eq!(src.read(3000, 100).unwrap(), &data[3000..3100]);
    assert_eq!(src.read(10, 4).unwrap(), &data[10..14]);
    assert_eq!(src.read_u16_be(4094).unwrap(), u16::from_be_bytes([data[4094], data[4095]]));

    let _ = std::fs::remove_file(&path);
}
