//! telarc - telemetry archive storage and transport core.
//!
//! This crate reconstructs a time-ordered packet stream out of many
//! length-prefixed telemetry files and re-files the packets into a
//! canonical, time-bucketed archive tree.
//!
//! # Components
//!
//! - [`FrameReader`] / [`FrameWriter`]: length-prefixed frame codec with
//!   corruption recovery
//! - [`MultiFileSource`]: many files exposed as one continuous packet stream
//! - [`Merger`]: external merge sort over a spill file and in-memory index
//! - [`Template`] / [`PathBuilder`]: path-templating mini-language for the
//!   archive layout
//! - [`BucketWriter`]: time-bucketed rotating writer feeding the final tree
//!
//! # Example
//!
//! ```rust,ignore
//! use telarc::{BucketConfig, BucketWriter, FrameReader, MultiFileSource, SourceConfig};
//!
//! // Browse every packet file under the incoming roots.
//! let source = MultiFileSource::new(&roots, &SourceConfig::default());
//! let mut reader = FrameReader::new(source);
//!
//! // Re-file frames into five-minute buckets.
//! let mut writer = BucketWriter::create(
//!     "/archive/%P/%Y/%J/%04h/rt_%05m_%05m+4.dat",
//!     451,
//!     0,
//!     "",
//!     BucketConfig::default(),
//! )?;
//! let mut buf = vec![0u8; telarc::DEFAULT_FRAME_CAPACITY];
//! while let Some(n) = reader.read_frame(&mut buf)? {
//!     writer.write(stamp_of(&buf[..n]), &buf[..n])?;
//! }
//! writer.finish()?;
//! ```

#![deny(missing_docs)]

pub mod bucket;
pub mod digest;
pub mod error;
pub mod frame;
pub mod layout;
pub mod merge;
pub mod report;
pub mod source;

pub use bucket::{BucketConfig, BucketStats, BucketWriter, MIN_BUCKET_INTERVAL};
pub use digest::DigestReader;
pub use error::{ArchiveError, Result};
pub use frame::reader::{ByteSource, FrameReader, FrameSource, MATCH_PREFIX_LEN};
pub use frame::{
    encode_frame, FrameWriter, ShardWriter, DEFAULT_FRAME_CAPACITY, FRAME_HEADER_SIZE,
};
pub use layout::builder::PathBuilder;
pub use layout::{PacketInfo, Template};
pub use merge::{merge_files, Extract, Merger, Offset, Outcome};
pub use report::{Coze, Gap};
pub use source::{FileWalker, MultiFileSource, SourceConfig, DEFAULT_EXTENSION};
