//! Windowed random-access byte source.
//!
//! `ByteSource` wraps a backing store (an in-memory buffer or a seekable
//! file) and keeps a bounded window of it resident. Integer readers refill
//! the window transparently when the requested offset falls outside of it,
//! so decoders can address the whole dump with absolute offsets while only
//! `WindowConfig::max_window` bytes are held at any time.
//!
//! Refill policy: on a miss the new window is anchored at the requested
//! offset with `pre = W * (1 - r)` bytes before it and `post = W * r` bytes
//! after it (`W` = maximum window, `r` = post ratio), clamped to the bounds
//! of the source. Bytes shared with the previous window are copied over and
//! only the non-overlapping part is read from the backing store.
//!
//! Callers must not rely on when a refill happens; only read correctness is
//! guaranteed.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use crate::binutil::ParseError;

/// Default maximum window size (1 MiB).
pub const DEFAULT_MAX_WINDOW: usize = 0x10_0000;

/// Storage a `ByteSource` reads from.
pub trait BackingStore: Send {
    /// Total number of bytes in the store.
    fn len(&self) -> usize;

    /// Whether the store holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Callers guarantee `offset + buf.len() <= self.len()`.
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), ParseError>;
}

impl BackingStore for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), ParseError> {
        buf.copy_from_slice(&self[offset..offset + buf.len()]);
        Ok(())
    }
}

/// A seekable file used as backing store.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    len: usize,
}

impl FileStore {
    /// Open `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        Ok(FileStore { file, len })
    }
}

impl BackingStore for FileStore {
    fn len(&self) -> usize {
        self.len
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), ParseError> {
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}

/// Window sizing parameters for a `ByteSource`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    /// Maximum number of resident bytes. Must be at least 1.
    pub max_window: usize,
    /// Fraction of the window placed after the anchor offset, in `[0, 1]`.
    pub post_ratio: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            max_window: DEFAULT_MAX_WINDOW,
            post_ratio: 0.5,
        }
    }
}

impl WindowConfig {
    fn split(&self) -> (usize, usize) {
        let w = self.max_window.max(1);
        let r = self.post_ratio.clamp(0.0, 1.0);
        // at least the anchor byte itself lives after the split point
        let post = ((w as f64 * r as f64).round() as usize).clamp(1, w);
        (w - post, post)
    }
}

/// A byte pattern with per-byte wildcards, used by `ByteSource::search`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<u8>,
    /// `true` where the byte must match, `false` for a wildcard.
    mask: Vec<bool>,
}

impl BytePattern {
    /// Pattern where every byte must match.
    pub fn exact(bytes: &[u8]) -> Self {
        BytePattern {
            bytes: bytes.to_vec(),
            mask: vec![true; bytes.len()],
        }
    }

    /// Pattern from explicit bytes and mask. The shorter of the two decides
    /// the pattern length.
    pub fn with_mask(bytes: &[u8], mask: &[bool]) -> Self {
        let n = bytes.len().min(mask.len());
        BytePattern {
            bytes: bytes[..n].to_vec(),
            mask: mask[..n].to_vec(),
        }
    }

    /// Parse a whitespace separated hex pattern such as `"E0 ?? 12"`.
    ///
    /// `??` (or `?`) marks a wildcard byte.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();
        for tok in text.split_whitespace() {
            if tok == "??" || tok == "?" {
                bytes.push(0);
                mask.push(false);
                continue;
            }
            let v = u8::from_str_radix(tok, 16)
                .map_err(|_| ParseError::Other(format!("invalid pattern byte '{}'", tok)))?;
            bytes.push(v);
            mask.push(true);
        }
        if bytes.is_empty() {
            return Err(ParseError::Other("empty search pattern".into()));
        }
        Ok(BytePattern { bytes, mask })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn matches(&self, hay: &[u8]) -> bool {
        self.bytes
            .iter()
            .zip(self.mask.iter())
            .zip(hay.iter())
            .all(|((b, m), h)| !*m || b == h)
    }
}

/// Windowed random-access view over a backing store.
pub struct ByteSource {
    store: Box<dyn BackingStore>,
    total: usize,
    config: WindowConfig,
    window_start: usize,
    window: Vec<u8>,
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("total", &self.total)
            .field("config", &self.config)
            .field("window", &self.window())
            .finish()
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        ByteSource::new(bytes)
    }
}

impl ByteSource {
    /// Wrap an in-memory buffer using the default window configuration.
    pub fn new(bytes: Vec<u8>) -> Self {
        ByteSource::with_config(Box::new(bytes), WindowConfig::default())
    }

    /// Wrap an arbitrary backing store.
    pub fn with_config(store: Box<dyn BackingStore>, config: WindowConfig) -> Self {
        let total = store.len();
        ByteSource {
            store,
            total,
            config,
            window_start: 0,
            window: Vec::new(),
        }
    }

    /// Open a file as a lazily-read source.
    pub fn open<P: AsRef<Path>>(path: P, config: WindowConfig) -> Result<Self, ParseError> {
        Ok(ByteSource::with_config(
            Box::new(FileStore::open(path)?),
            config,
        ))
    }

    /// Total size of the source in bytes.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Change the window configuration. The resident window is kept; the new
    /// parameters apply from the next refill.
    pub fn set_config(&mut self, config: WindowConfig) {
        self.config = config;
        let max = config.max_window.max(1);
        if self.window.len() > max {
            self.window.truncate(max);
        }
    }

    /// Byte range currently resident. Exposed for inspection only.
    pub fn window(&self) -> Range<usize> {
        self.window_start..self.window_start + self.window.len()
    }

    fn out_of_range(&self, offset: usize, needed: usize) -> ParseError {
        ParseError::OffsetOutOfRange {
            offset,
            needed,
            available: self.total,
            context: None,
        }
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), ParseError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.total => Ok(()),
            _ => Err(self.out_of_range(offset, len)),
        }
    }

    fn in_window(&self, offset: usize, len: usize) -> bool {
        offset >= self.window_start && offset + len <= self.window_start + self.window.len()
    }

    /// Re-anchor the window at `offset`, reusing overlapping bytes.
    fn refill(&mut self, offset: usize) -> Result<(), ParseError> {
        let (pre, post) = self.config.split();
        let new_start = offset.saturating_sub(pre);
        let new_end = offset.saturating_add(post).min(self.total);
        if new_end <= new_start {
            self.window_start = new_start.min(self.total);
            self.window.clear();
            return Ok(());
        }

        let old_start = self.window_start;
        let old_end = self.window_start + self.window.len();
        let mut fresh = vec![0u8; new_end - new_start];

        let keep_start = new_start.max(old_start);
        let keep_end = new_end.min(old_end);
        if keep_start < keep_end {
            // overlapping span comes from the old window
            fresh[keep_start - new_start..keep_end - new_start]
                .copy_from_slice(&self.window[keep_start - old_start..keep_end - old_start]);
            if new_start < keep_start {
                self.store
                    .read_at(new_start, &mut fresh[..keep_start - new_start])?;
            }
            if keep_end < new_end {
                self.store
                    .read_at(keep_end, &mut fresh[keep_end - new_start..])?;
            }
        } else {
            self.store.read_at(new_start, &mut fresh)?;
        }

        self.window_start = new_start;
        self.window = fresh;
        Ok(())
    }

    /// Make `[offset, offset + len)` resident, refilling if required.
    fn ensure(&mut self, offset: usize, len: usize) -> Result<(), ParseError> {
        self.check(offset, len)?;
        if !self.in_window(offset, len) {
            self.refill(offset)?;
            if !self.in_window(offset, len) {
                // the anchor split left too little room after the offset
                let saved = self.config;
                self.config.post_ratio = 1.0;
                let r = self.refill(offset);
                self.config = saved;
                r?;
            }
        }
        Ok(())
    }

    /// Copy `buf.len()` canonical bytes starting at `offset` into `buf`.
    ///
    /// Fails with `OffsetOutOfRange` if the range exceeds the source. Ranges
    /// larger than the window are read straight from the backing store.
    pub fn read_into(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), ParseError> {
        let len = buf.len();
        self.check(offset, len)?;
        if len == 0 {
            return Ok(());
        }
        if self.in_window(offset, len) {
            let s = offset - self.window_start;
            buf.copy_from_slice(&self.window[s..s + len]);
            return Ok(());
        }
        if len > self.config.max_window.max(1) {
            return self.store.read_at(offset, buf);
        }
        self.ensure(offset, len)?;
        if !self.in_window(offset, len) {
            return self.store.read_at(offset, buf);
        }
        let s = offset - self.window_start;
        buf.copy_from_slice(&self.window[s..s + len]);
        Ok(())
    }

    /// Return exactly `length` bytes starting at `offset`.
    pub fn read(&mut self, offset: usize, length: usize) -> Result<Vec<u8>, ParseError> {
        let mut out = vec![0u8; length];
        self.read_into(offset, &mut out)?;
        Ok(out)
    }

    /// Like `read`, but clips `length` to the end of the source instead of
    /// failing. Returns an empty vector when `offset` is past the end.
    pub fn read_clipped(&mut self, offset: usize, length: usize) -> Result<Vec<u8>, ParseError> {
        let available = self.total.saturating_sub(offset);
        self.read(offset.min(self.total), length.min(available))
    }

    fn window_slice<const N: usize>(&mut self, offset: usize) -> Result<[u8; N], ParseError> {
        let mut tmp = [0u8; N];
        self.read_into(offset, &mut tmp)?;
        Ok(tmp)
    }

    pub fn read_u8(&mut self, offset: usize) -> Result<u8, ParseError> {
        Ok(self.window_slice::<1>(offset)?[0])
    }

    pub fn read_i8(&mut self, offset: usize) -> Result<i8, ParseError> {
        Ok(self.read_u8(offset)? as i8)
    }

    pub fn read_u16_le(&mut self, offset: usize) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.window_slice::<2>(offset)?))
    }

    pub fn read_u16_be(&mut self, offset: usize) -> Result<u16, ParseError> {
        Ok(u16::from_be_bytes(self.window_slice::<2>(offset)?))
    }

    pub fn read_u32_le(&mut self, offset: usize) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.window_slice::<4>(offset)?))
    }

    pub fn read_u32_be(&mut self, offset: usize) -> Result<u32, ParseError> {
        Ok(u32::from_be_bytes(self.window_slice::<4>(offset)?))
    }

    /// Search for `pattern` in `[from, from + size)`.
    ///
    /// The scan is limited to one window's worth of data starting at `from`:
    /// a match that would need bytes beyond the window loaded for the search
    /// is not reported. Callers scanning larger ranges step `from` forward by
    /// less than `WindowConfig::max_window - pattern.len()`.
    pub fn search(&mut self, pattern: &BytePattern, from: usize, size: usize) -> Option<usize> {
        if pattern.is_empty() || from >= self.total {
            return None;
        }
        let end = from.saturating_add(size).min(self.total);
        let need = (end - from).min(self.config.max_window.max(1));
        if !self.in_window(from, need) {
            let saved = self.config;
            self.config.post_ratio = 1.0;
            let r = self.refill(from);
            self.config = saved;
            if r.is_err() {
                return None;
            }
        }
        let win_end = (self.window_start + self.window.len()).min(end);
        let plen = pattern.len();
        let mut pos = from;
        while pos + plen <= win_end {
            let s = pos - self.window_start;
            if pattern.matches(&self.window[s..s + plen]) {
                return Some(pos);
            }
            pos += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_split_respects_ratio() {
        let c = WindowConfig {
            max_window: 100,
            post_ratio: 0.25,
        };
        assert_eq!(c.split(), (75, 25));
        let c = WindowConfig {
            max_window: 100,
            post_ratio: 0.0,
        };
        // the anchor byte is always kept after the split
        assert_eq!(c.split(), (99, 1));
    }

    #[test]
    fn refill_reuses_overlap() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut src = ByteSource::with_config(
            Box::new(data),
            WindowConfig {
                max_window: 16,
                post_ratio: 0.5,
            },
        );
        assert_eq!(src.read_u8(100).unwrap(), 100);
        assert!(src.window().len() <= 16);
        assert_eq!(src.read_u8(105).unwrap(), 105);
        assert_eq!(src.read_u8(95).unwrap(), 95);
        assert!(src.window().contains(&95));
    }
}
