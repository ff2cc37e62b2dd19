//! External merge sort over a spill file.
//!
//! Packets arrive interleaved from many files without global time order;
//! downstream storage requires strict order by a composite key. The engine
//! is a two-phase external merge: the write phase appends every accepted
//! frame to a single anonymous spill file while recording a sortable
//! [`Offset`] in memory, the read phase replays the spill file in index
//! order. One linear spill and replay is simpler than a multi-way heap
//! merge and the working set is bounded by disk, not memory.
//!
//! ```text
//! push(frame)  ──►  spill file ◄── Offset{key, position, size} index
//!                        │
//! reset()  (sort index, rewind; hard phase barrier)
//!                        │
//! next_frame()  ◄── seek + exact read, in key order
//! ```

use crate::error::{ArchiveError, Result};
use crate::frame::reader::FrameReader;
use crate::frame::DEFAULT_FRAME_CAPACITY;
use crate::report::Coze;
use crate::source::{MultiFileSource, SourceConfig};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::env;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Index entry for one spilled frame: composite sort key plus the frame's
/// physical location in the spill file.
///
/// Entries exist only between the write phase that creates them and the
/// read phase that consumes them; they are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    /// Primary stream id.
    pub pid: u32,
    /// Packet timestamp.
    pub when: DateTime<Utc>,
    /// Packet sequence number.
    pub sequence: u32,
    position: u64,
    size: u32,
}

impl Offset {
    /// Creates a key-only entry; the merger fills in the location.
    pub fn new(pid: u32, when: DateTime<Utc>, sequence: u32) -> Self {
        Self {
            pid,
            when,
            sequence,
            position: 0,
            size: 0,
        }
    }

    /// Byte offset of the frame in the spill file.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Frame size in bytes, header included.
    pub fn size(&self) -> u32 {
        self.size
    }

    fn key(&self) -> (DateTime<Utc>, u32, u32) {
        (self.when, self.pid, self.sequence)
    }
}

/// Outcome of key extraction for one frame.
pub enum Outcome {
    /// Frame accepted with its sort key.
    Accept(Offset),
    /// Frame intentionally discarded; not an error.
    Skip,
}

/// Strategy that turns raw frame bytes into a sort key.
///
/// Keeps the merge engine decoupled from payload semantics. Returning
/// [`Outcome::Skip`] silently drops the frame; returning an error aborts
/// the whole merge.
pub trait Extract {
    /// Computes the sort key for one frame, header included.
    fn extract(&mut self, frame: &[u8]) -> Result<Outcome>;
}

impl<F> Extract for F
where
    F: FnMut(&[u8]) -> Result<Outcome>,
{
    fn extract(&mut self, frame: &[u8]) -> Result<Outcome> {
        self(frame)
    }
}

/// Comparator override for the index ordering.
pub type CompareFn = Box<dyn Fn(&Offset, &Offset) -> Ordering + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Writing,
    Reading,
}

/// Two-phase external merge engine.
///
/// Default ordering is timestamp ascending, ties broken by primary id,
/// then by sequence number. The spill file is an anonymous temp file and
/// is deleted unconditionally on drop; it is never a durable artifact.
/// Instances exclusively own their spill file and index; they are not
/// safe for concurrent mutation.
pub struct Merger<E> {
    extract: E,
    spill: File,
    index: Vec<Offset>,
    cursor: usize,
    write_pos: u64,
    phase: Phase,
    compare: Option<CompareFn>,
}

impl<E: Extract> Merger<E> {
    /// Creates a merger spilling to the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the spill file cannot be created.
    pub fn new(extract: E) -> Result<Self> {
        Self::in_dir(extract, env::temp_dir())
    }

    /// Creates a merger spilling into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the spill file cannot be created.
    pub fn in_dir(extract: E, dir: impl AsRef<Path>) -> Result<Self> {
        let spill = tempfile::tempfile_in(dir)?;
        Ok(Self {
            extract,
            spill,
            index: Vec::new(),
            cursor: 0,
            write_pos: 0,
            phase: Phase::Writing,
            compare: None,
        })
    }

    /// Installs a comparator overriding the default key ordering.
    pub fn with_compare(mut self, compare: CompareFn) -> Self {
        self.compare = Some(compare);
        self
    }

    /// Write phase: offers one frame to the merger.
    ///
    /// Returns the recorded index entry, or `None` when the extractor
    /// skipped the frame.
    ///
    /// # Errors
    ///
    /// Extractor errors and spill I/O errors abort the merge. Pushing
    /// after [`reset`](Self::reset) fails with `OutOfPhase`.
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Offset>> {
        if self.phase == Phase::Reading {
            return Err(ArchiveError::OutOfPhase("push after reset"));
        }
        let mut offset = match self.extract.extract(frame)? {
            Outcome::Accept(offset) => offset,
            Outcome::Skip => return Ok(None),
        };
        self.spill.write_all(frame)?;
        offset.position = self.write_pos;
        offset.size = frame.len() as u32;
        self.write_pos += frame.len() as u64;
        self.index.push(offset);
        Ok(Some(offset))
    }

    /// Phase barrier: sorts the index and rewinds the spill file.
    ///
    /// After reset the merger only serves reads; further pushes fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the spill file cannot be rewound.
    pub fn reset(&mut self) -> Result<()> {
        match self.compare.as_ref() {
            Some(compare) => self.index.sort_by(|a, b| compare(a, b)),
            None => self.index.sort_by(|a, b| a.key().cmp(&b.key())),
        }
        self.spill.seek(SeekFrom::Start(0))?;
        self.cursor = 0;
        self.phase = Phase::Reading;
        debug!("merge index sealed with {} entries", self.index.len());
        Ok(())
    }

    /// Read phase: delivers the next frame in key order.
    ///
    /// Returns the frame size, or `Ok(None)` once the index is exhausted.
    ///
    /// # Errors
    ///
    /// Fails with `ShortBuffer` when `buf` is smaller than the next
    /// entry, and with `OutOfPhase` before [`reset`](Self::reset).
    pub fn next_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.phase == Phase::Writing {
            return Err(ArchiveError::OutOfPhase("read before reset"));
        }
        let entry = match self.index.get(self.cursor) {
            Some(entry) => *entry,
            None => return Ok(None),
        };
        let size = entry.size as usize;
        if buf.len() < size {
            return Err(ArchiveError::ShortBuffer {
                needed: size,
                capacity: buf.len(),
            });
        }
        self.spill.seek(SeekFrom::Start(entry.position))?;
        self.spill.read_exact(&mut buf[..size])?;
        self.cursor += 1;
        Ok(Some(size))
    }

    /// Number of accepted frames in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true when no frames have been accepted.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Reconciles N unordered fragment files into one ordered stream.
///
/// Opens every matching file under `inputs`, frames them through one
/// reader, pushes everything into a merger, resets it, and copies the
/// sorted output to `dest`. Per-frame stream errors are counted in the
/// returned [`Coze`] and the scan continues; extractor errors and
/// destination write errors abort.
///
/// # Errors
///
/// Returns an error if the spill file cannot be created, the extractor
/// rejects a frame, or the destination fails.
pub fn merge_files<E: Extract, W: Write>(
    inputs: &[PathBuf],
    extract: E,
    dest: &mut W,
) -> Result<Coze> {
    let config = SourceConfig {
        recursive: true,
        ..SourceConfig::default()
    };
    let source = MultiFileSource::new(inputs, &config);
    let mut reader = FrameReader::new(source);
    let mut merger = Merger::new(extract)?;
    let mut buf = vec![0u8; DEFAULT_FRAME_CAPACITY];
    let mut coze = Coze::default();

    loop {
        match reader.read_frame(&mut buf) {
            Ok(Some(n)) => {
                if let Some(offset) = merger.push(&buf[..n])? {
                    coze.observe(n as u64, offset.sequence, offset.when);
                }
            }
            Ok(None) => break,
            Err(err @ (ArchiveError::Truncated(_) | ArchiveError::Invalid { .. })) => {
                // The remainder of the stream is unreadable.
                warn!("merge input ended early: {}", err);
                coze.error += 1;
                break;
            }
            Err(err) => return Err(err),
        }
    }

    merger.reset()?;
    while let Some(n) = merger.next_frame(&mut buf)? {
        dest.write_all(&buf[..n])?;
    }
    Ok(coze)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Extractor for test frames laid out as [pid, seq, secs].
    fn extract_triplet(frame: &[u8]) -> Result<Outcome> {
        let p = &frame[4..];
        Ok(Outcome::Accept(Offset::new(
            p[0] as u32,
            at(p[2] as i64),
            p[1] as u32,
        )))
    }

    #[test]
    fn test_push_records_location() {
        let mut merger = Merger::new(extract_triplet).unwrap();
        let first = encode_frame(&[1, 1, 10]);
        let second = encode_frame(&[1, 2, 20]);
        let a = merger.push(&first).unwrap().unwrap();
        let b = merger.push(&second).unwrap().unwrap();
        assert_eq!(a.position(), 0);
        assert_eq!(a.size(), 7);
        assert_eq!(b.position(), 7);
        assert_eq!(merger.len(), 2);
    }

    #[test]
    fn test_read_before_reset_fails() {
        let mut merger = Merger::new(extract_triplet).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            merger.next_frame(&mut buf),
            Err(ArchiveError::OutOfPhase(_))
        ));
    }

    #[test]
    fn test_push_after_reset_fails() {
        let mut merger = Merger::new(extract_triplet).unwrap();
        merger.reset().unwrap();
        assert!(matches!(
            merger.push(&encode_frame(&[1, 1, 1])),
            Err(ArchiveError::OutOfPhase(_))
        ));
    }

    #[test]
    fn test_short_buffer_reports_sizes() {
        let mut merger = Merger::new(extract_triplet).unwrap();
        merger.push(&encode_frame(&[1, 1, 1])).unwrap();
        merger.reset().unwrap();
        let mut buf = [0u8; 3];
        match merger.next_frame(&mut buf) {
            Err(ArchiveError::ShortBuffer { needed, capacity }) => {
                assert_eq!(needed, 7);
                assert_eq!(capacity, 3);
            }
            other => panic!("expected ShortBuffer, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_compare_reverses() {
        let mut merger =
            Merger::new(extract_triplet)
                .unwrap()
                .with_compare(Box::new(|a: &Offset, b: &Offset| {
                    b.when.cmp(&a.when)
                }));
        merger.push(&encode_frame(&[1, 1, 10])).unwrap();
        merger.push(&encode_frame(&[1, 2, 30])).unwrap();
        merger.push(&encode_frame(&[1, 3, 20])).unwrap();
        merger.reset().unwrap();

        let mut buf = [0u8; 16];
        let mut stamps = Vec::new();
        while let Some(n) = merger.next_frame(&mut buf).unwrap() {
            stamps.push(buf[n - 1]);
        }
        assert_eq!(stamps, vec![30, 20, 10]);
    }
}
