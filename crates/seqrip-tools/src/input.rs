use std::fs::File;
use std::io::{Read, stdin};
use std::path::Path;

use anyhow::Context;
use flate2::read::GzDecoder;
use seqrip::{ByteSource, WindowConfig};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

fn gunzip(bytes: &[u8], what: &str) -> anyhow::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .with_context(|| format!("failed to decompress gzip data from {}", what))?;
    Ok(out)
}

/// Read a dump from a path or stdin ('-') into memory, decompressing it
/// when it starts with the gzip magic bytes.
pub fn read_dump_as_vec(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut inbuf = Vec::new();
    if path == Path::new("-") {
        stdin()
            .read_to_end(&mut inbuf)
            .context("failed to read from stdin")?;
    } else {
        File::open(path)
            .with_context(|| format!("failed to open input file: {}", path.display()))?
            .read_to_end(&mut inbuf)
            .with_context(|| format!("failed to read input file: {}", path.display()))?;
    }

    if is_gzip(&inbuf) {
        gunzip(&inbuf, &path.display().to_string())
    } else {
        Ok(inbuf)
    }
}

/// Open a dump as a `ByteSource`.
///
/// Plain files are read through a window so large dumps are never loaded
/// whole; stdin and gzip input are decompressed into memory.
pub fn load_source(path: &Path) -> anyhow::Result<ByteSource> {
    if path != Path::new("-") {
        let mut magic = [0u8; 2];
        let n = File::open(path)
            .with_context(|| format!("failed to open input file: {}", path.display()))?
            .read(&mut magic)
            .with_context(|| format!("failed to read input file: {}", path.display()))?;
        if !is_gzip(&magic[..n]) {
            return ByteSource::open(path, WindowConfig::default())
                .with_context(|| format!("failed to open input file: {}", path.display()));
        }
    }
    Ok(ByteSource::new(read_dump_as_vec(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_gzip_is_detected() {
        let data = vec![0xE7, 0x20, 0xA4, 0x00];
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&data).expect("compress");
        let packed = enc.finish().expect("finish");

        assert!(is_gzip(&packed));
        assert!(!is_gzip(&data));
        assert_eq!(gunzip(&packed, "test").expect("decompress"), data);
    }

    #[test]
    fn test_load_plain_and_gzip_files() {
        let data: Vec<u8> = (0..=255u8).collect();
        let dir = std::env::temp_dir();
        let plain = dir.join(format!("seqrip-input-{}.bin", std::process::id()));
        let packed = dir.join(format!("seqrip-input-{}.bin.gz", std::process::id()));

        std::fs::write(&plain, &data).expect("write plain");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&data).expect("compress");
        std::fs::write(&packed, enc.finish().expect("finish")).expect("write gzip");

        for path in [&plain, &packed] {
            let mut source = load_source(path).expect("load source");
            assert_eq!(source.len(), 256);
            assert_eq!(source.read(250, 6).expect("read"), &data[250..]);
        }

        let _ = std::fs::remove_file(&plain);
        let _ = std::fs::remove_file(&packed);
    }
}
