//! Length-prefixed frame codec.
//!
//! Every packet file in the archive is a plain concatenation of frames with
//! no file header, footer, or checksum:
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  Payload length L: u32 little-endian       │
//! ├────────────────────────────────────────────┤
//! │  Payload: L bytes                          │
//! ├────────────────────────────────────────────┤
//! │  ... next frame ...                        │
//! └────────────────────────────────────────────┘
//! ```
//!
//! The frame is the unit of I/O everywhere in this crate; nothing below
//! frame granularity is addressable. Decoding lives in [`reader`], which
//! also implements the corruption-recovery policy for multi-file streams.

pub mod reader;

use crate::error::Result;
use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default scratch-buffer capacity for frame reads (8 MiB).
///
/// Callers must supply a buffer at least as large as the largest frame they
/// expect; a single large buffer reused across reads is the intended shape.
pub const DEFAULT_FRAME_CAPACITY: usize = 8 << 20;

/// Encodes one payload as a frame, prepending the little-endian length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Writes payloads as length-prefixed frames to an underlying writer.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a frame writer over `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes one payload as a frame.
    ///
    /// Returns the number of bytes written, header included.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<usize> {
        self.inner
            .write_all(&(payload.len() as u32).to_le_bytes())?;
        self.inner.write_all(payload)?;
        Ok(FRAME_HEADER_SIZE + payload.len())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Consumes the frame writer, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Fan-out writer that scatters frames over N destination files.
///
/// Each outgoing frame is re-framed whole to one uniformly-randomly chosen
/// destination. Destinations are named `rt_0001.dat` .. `rt_NNNN.dat` under
/// the given directory.
pub struct ShardWriter {
    shards: Vec<FrameWriter<BufWriter<File>>>,
    rng: rand::rngs::ThreadRng,
}

impl ShardWriter {
    /// Creates `n` destination files under `dir` (at least 2).
    ///
    /// # Errors
    ///
    /// Returns an error if any destination file cannot be created.
    pub fn create(dir: impl AsRef<Path>, n: usize) -> Result<Self> {
        let n = n.max(2);
        let mut shards = Vec::with_capacity(n);
        for i in 0..n {
            let path = dir.as_ref().join(format!("rt_{:04}.dat", i + 1));
            let file = File::create(&path)?;
            shards.push(FrameWriter::new(BufWriter::new(file)));
        }
        Ok(Self {
            shards,
            rng: rand::thread_rng(),
        })
    }

    /// Writes one payload as a frame to a randomly chosen destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen destination fails.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<usize> {
        let i = self.rng.gen_range(0..self.shards.len());
        self.shards[i].write_frame(payload)
    }

    /// Flushes and closes every destination, regardless of individual
    /// failures, surfacing the last error encountered.
    pub fn close(self) -> Result<()> {
        let mut last = None;
        for (i, shard) in self.shards.into_iter().enumerate() {
            if let Err(err) = shard.into_inner().flush() {
                warn!("failed to flush shard {}: {}", i + 1, err);
                last = Some(err);
            }
        }
        match last {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Returns the number of destinations.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Returns true if there are no destinations (never the case after
    /// `create`).
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prepends_length() {
        let frame = encode_frame(b"abc");
        assert_eq!(frame, vec![3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_empty_payload() {
        let frame = encode_frame(b"");
        assert_eq!(frame, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_frame_writer_concatenates() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(b"one").unwrap();
        writer.write_frame(b"four").unwrap();
        let out = writer.into_inner();
        assert_eq!(&out[..7], &[3, 0, 0, 0, b'o', b'n', b'e']);
        assert_eq!(&out[7..11], &[4, 0, 0, 0]);
        assert_eq!(&out[11..], b"four");
    }

    #[test]
    fn test_shard_writer_minimum_two() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = ShardWriter::create(dir.path(), 0).unwrap();
        assert_eq!(writer.len(), 2);
        writer.close().unwrap();
        assert!(dir.path().join("rt_0001.dat").is_file());
        assert!(dir.path().join("rt_0002.dat").is_file());
    }
}
