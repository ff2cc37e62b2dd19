//! Time-bucketed rotating writer.
//!
//! Frames accumulate in one anonymous scratch file per time bucket. When
//! a frame's timestamp crosses the bucket boundary the scratch file is
//! copied whole into its final templated location and a fresh scratch
//! begins:
//!
//! ```text
//! OPEN ──(timestamp crosses bucket)──► ROTATING ──► OPEN
//!   │                                     │
//!   └──(end of input)── final flush ◄─────┘
//! ```
//!
//! Because the scratch file is anonymous and the final file is written in
//! one complete copy, visible archive state is always either absent or
//! one complete flush; an aborted run leaves nothing half-written.

use crate::error::Result;
use crate::layout::builder::PathBuilder;
use crate::layout::PacketInfo;
use chrono::{DateTime, Utc};
use std::env;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Smallest allowed bucket interval. Shorter configured intervals are
/// clamped up to this.
pub const MIN_BUCKET_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for the rotating writer.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Bucket duration; clamped up to [`MIN_BUCKET_INTERVAL`].
    pub interval: Duration,
    /// Whether repeated renders of the same final path get a numeric
    /// suffix instead of overwriting.
    pub versioned: bool,
    /// Directory holding the anonymous scratch files.
    pub scratch_dir: PathBuf,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            interval: MIN_BUCKET_INTERVAL,
            versioned: false,
            scratch_dir: env::temp_dir(),
        }
    }
}

/// Accumulated totals for one writer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    /// Frames written to scratch.
    pub count: u64,
    /// Frames dropped by per-frame write failures.
    pub skipped: u64,
    /// Frame bytes written.
    pub size: u64,
    /// Buckets flushed into the final tree.
    pub buckets: u64,
}

/// Routes framed packets into time-bucketed archive files.
///
/// Per-frame write failures increment `skipped` and do not abort the run;
/// failures while creating scratch files or flushing a bucket are fatal.
pub struct BucketWriter {
    builder: PathBuilder,
    pid: u32,
    sid: u32,
    tag: String,
    interval: chrono::Duration,
    scratch_dir: PathBuf,
    scratch: File,
    written: u64,
    stamp: Option<DateTime<Utc>>,
    stats: BucketStats,
}

impl BucketWriter {
    /// Creates a writer routing to `pattern` for one stream identity.
    ///
    /// # Arguments
    ///
    /// * `pattern` - path template for flushed buckets
    /// * `pid`, `sid`, `tag` - identity rendered into the template
    /// * `config` - interval, versioning, and scratch placement
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile or the first
    /// scratch file cannot be created.
    pub fn create(
        pattern: &str,
        pid: u32,
        sid: u32,
        tag: impl Into<String>,
        config: BucketConfig,
    ) -> Result<Self> {
        let interval = config.interval.max(MIN_BUCKET_INTERVAL);
        let builder = PathBuilder::new(pattern, config.versioned)?;
        let scratch = tempfile::tempfile_in(&config.scratch_dir)?;
        Ok(Self {
            builder,
            pid,
            sid,
            tag: tag.into(),
            interval: chrono::Duration::seconds(interval.as_secs() as i64),
            scratch_dir: config.scratch_dir,
            scratch,
            written: 0,
            stamp: None,
            stats: BucketStats::default(),
        })
    }

    /// Writes one frame, rotating the bucket first when `when` crosses
    /// the boundary.
    ///
    /// # Errors
    ///
    /// Rotation and scratch-creation failures are fatal; a plain write
    /// failure only increments the skipped count.
    pub fn write(&mut self, when: DateTime<Utc>, frame: &[u8]) -> Result<()> {
        self.rotate(when)?;
        match self.scratch.write_all(frame) {
            Ok(()) => {
                self.written += frame.len() as u64;
                self.stats.size += frame.len() as u64;
                self.stats.count += 1;
            }
            Err(err) => {
                warn!("dropping frame: {}", err);
                self.stats.skipped += 1;
            }
        }
        Ok(())
    }

    /// Flushes the current bucket, even if it has not logically closed,
    /// and returns the accumulated totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> Result<BucketStats> {
        if let Some(stamp) = self.stamp {
            self.flush(stamp)?;
        }
        Ok(self.stats)
    }

    /// Returns the totals accumulated so far.
    pub fn stats(&self) -> BucketStats {
        self.stats
    }

    /// Rotates when `when` is a full interval past the truncation of the
    /// current bucket's first timestamp.
    fn rotate(&mut self, when: DateTime<Utc>) -> Result<()> {
        match self.stamp {
            None => self.stamp = Some(when),
            Some(stamp) => {
                let bucket_start = truncate(stamp, self.interval);
                if when - bucket_start >= self.interval {
                    self.flush(stamp)?;
                    self.scratch = tempfile::tempfile_in(&self.scratch_dir)?;
                    self.stamp = Some(when);
                }
            }
        }
        Ok(())
    }

    /// Copies the scratch file to its final location; a scratch that
    /// never received bytes produces no artifact.
    fn flush(&mut self, stamp: DateTime<Utc>) -> Result<()> {
        if self.written == 0 {
            return Ok(());
        }
        self.scratch.seek(SeekFrom::Start(0))?;
        let info = PacketInfo::new(self.pid, self.sid, stamp).with_tag(self.tag.clone());
        let copied = self.builder.copy(&mut self.scratch, &info)?;
        debug!("flushed bucket of {} bytes at {}", copied, stamp);
        self.written = 0;
        self.stats.buckets += 1;
        Ok(())
    }
}

/// Truncates a timestamp down to a multiple of `interval` since the
/// epoch.
fn truncate(when: DateTime<Utc>, interval: chrono::Duration) -> DateTime<Utc> {
    let secs = interval.num_seconds();
    if secs <= 0 {
        return when;
    }
    let aligned = when.timestamp().div_euclid(secs) * secs;
    DateTime::from_timestamp(aligned, 0).unwrap_or(when)
}
