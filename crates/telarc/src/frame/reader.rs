//! Frame decoding with corruption recovery.
//!
//! [`FrameReader`] pulls exactly one whole frame per call from a
//! [`FrameSource`]. Sources that are made of multiple physical segments
//! (see [`MultiFileSource`](crate::source::MultiFileSource)) expose their
//! boundaries here, which is what makes the recovery policy possible: an
//! unreadable tail is abandoned and reading resumes at the next segment,
//! instead of failing the whole stream. A frame is never assembled across
//! a segment boundary.

use crate::error::{ArchiveError, Result};
use crate::frame::FRAME_HEADER_SIZE;
use std::io::{self, Read};
use tracing::debug;

/// Number of payload bytes a match predicate may inspect.
///
/// Predicates always see `&payload[..min(MATCH_PREFIX_LEN, len)]`, so short
/// payloads are presented whole rather than padded or over-read.
pub const MATCH_PREFIX_LEN: usize = 256;

/// A byte source that may be split into multiple physical segments.
///
/// `read_segment` returning `Ok(0)` means the *current* segment is
/// exhausted; `advance_segment` moves to the next one and returns false
/// once no segments remain. Plain, single-segment streams never advance.
pub trait FrameSource {
    /// Reads up to `buf.len()` bytes from the current segment only.
    fn read_segment(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Advances to the next segment, abandoning whatever remains of the
    /// current one. Returns false when the source is exhausted.
    fn advance_segment(&mut self) -> io::Result<bool> {
        Ok(false)
    }
}

/// Adapts any plain byte stream into a single-segment [`FrameSource`].
pub struct ByteSource<R>(R);

impl<R: Read> ByteSource<R> {
    /// Wraps `inner` as a single-segment source.
    pub fn new(inner: R) -> Self {
        Self(inner)
    }

    /// Consumes the adapter, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Read> FrameSource for ByteSource<R> {
    fn read_segment(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// Match predicate over a bounded payload prefix.
type MatchFn = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// Reads length-prefixed frames from a [`FrameSource`], one whole frame
/// per call.
///
/// # Corruption policy
///
/// - A clean end of stream at a frame boundary is `Ok(None)`.
/// - A segment that ends mid-frame is a corrupt tail: reading resumes at
///   the next segment when the source has one, otherwise the read fails
///   with [`ArchiveError::Truncated`] carrying the exact missing count.
/// - A header declaring a frame larger than the caller's buffer skips to
///   the next segment when possible, otherwise fails with
///   [`ArchiveError::Invalid`].
///
/// Recovery is driven by an explicit loop, never recursion; every
/// iteration consumes either one frame or one segment, so a read call
/// always terminates.
pub struct FrameReader<S> {
    source: S,
    filter: Option<MatchFn>,
}

impl<S: FrameSource> FrameReader<S> {
    /// Creates a frame reader over `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            filter: None,
        }
    }

    /// Creates a frame reader with a match predicate installed.
    ///
    /// Frames whose payload prefix fails the predicate are skipped
    /// silently and the next frame is read instead; this is filtering,
    /// not an error.
    pub fn with_filter(
        source: S,
        filter: impl FnMut(&[u8]) -> bool + Send + 'static,
    ) -> Self {
        Self {
            source,
            filter: Some(Box::new(filter)),
        }
    }

    /// Installs or replaces the match predicate.
    pub fn set_filter(&mut self, filter: impl FnMut(&[u8]) -> bool + Send + 'static) {
        self.filter = Some(Box::new(filter));
    }

    /// Reads the next frame into `buf`, header included.
    ///
    /// Returns the total frame size (`4 + payload length`), or `Ok(None)`
    /// at end of stream.
    ///
    /// # Errors
    ///
    /// See the corruption policy on [`FrameReader`].
    pub fn read_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        'frame: loop {
            // Header: 4 bytes from the current segment.
            let mut header = [0u8; FRAME_HEADER_SIZE];
            let mut got = 0;
            while got < FRAME_HEADER_SIZE {
                match self.source.read_segment(&mut header[got..])? {
                    0 if got == 0 => {
                        // Frame boundary: either the next segment begins
                        // or the stream is done.
                        if self.source.advance_segment()? {
                            continue;
                        }
                        return Ok(None);
                    }
                    0 => {
                        debug!("segment ended mid-header, {} of 4 bytes", got);
                        if self.source.advance_segment()? {
                            continue 'frame;
                        }
                        return Err(ArchiveError::Truncated(FRAME_HEADER_SIZE - got));
                    }
                    n => got += n,
                }
            }

            let payload = u32::from_le_bytes(header) as usize;
            let total = FRAME_HEADER_SIZE + payload;
            if total > buf.len() {
                debug!("frame of {} bytes exceeds buffer, skipping segment", total);
                if self.source.advance_segment()? {
                    continue;
                }
                return Err(ArchiveError::Invalid {
                    size: total,
                    capacity: buf.len(),
                });
            }

            buf[..FRAME_HEADER_SIZE].copy_from_slice(&header);
            let body = &mut buf[FRAME_HEADER_SIZE..total];
            let mut read = 0;
            while read < payload {
                match self.source.read_segment(&mut body[read..])? {
                    0 => {
                        debug!("segment ended mid-payload, {} of {} bytes", read, payload);
                        if self.source.advance_segment()? {
                            continue 'frame;
                        }
                        return Err(ArchiveError::Truncated(payload - read));
                    }
                    n => read += n,
                }
            }

            if let Some(filter) = self.filter.as_mut() {
                let window = payload.min(MATCH_PREFIX_LEN);
                if !filter(&buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + window]) {
                    continue;
                }
            }

            return Ok(Some(total));
        }
    }

    /// Returns a mutable reference to the underlying source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Consumes the reader, returning the underlying source.
    pub fn into_source(self) -> S {
        self.source
    }
}

impl<R: Read> FrameReader<ByteSource<R>> {
    /// Creates a frame reader over a plain byte stream.
    pub fn from_reader(inner: R) -> Self {
        Self::new(ByteSource::new(inner))
    }
}
