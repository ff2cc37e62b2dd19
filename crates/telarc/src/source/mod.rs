//! Multi-file packet source.
//!
//! File discovery runs as an independent producer thread feeding a bounded
//! channel of paths, so enumeration overlaps with consumption: the source
//! is never blocked discovering the next file while the caller is still
//! reading the current one. Consumers see the discovered files as one
//! continuous byte stream with no observable seam at file boundaries --
//! except that a frame is never assembled across one (see
//! [`FrameReader`](crate::frame::reader::FrameReader)).

use crate::frame::reader::FrameSource;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Default archive packet-file extension, without the dot.
pub const DEFAULT_EXTENSION: &str = "dat";

/// Default bound of the discovery channel, in paths.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Configuration for file discovery.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// File extension to match, without the dot.
    pub extension: String,
    /// Whether to descend into directories beneath the roots.
    ///
    /// When disabled, files directly under a root directory are still
    /// listed; its subdirectories are skipped entirely.
    pub recursive: bool,
    /// Bound of the discovery channel, in paths.
    pub queue_depth: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            recursive: false,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Background file discovery over a set of root paths.
///
/// Paths are produced in discovery order: roots in the order given, then
/// lexical order within each directory, depth-first when recursion is
/// enabled. The sequence is lazy and non-restartable. Unreadable
/// directories are logged and skipped; discovery of the remaining roots
/// continues.
pub struct FileWalker {
    rx: Option<Receiver<PathBuf>>,
    handle: Option<JoinHandle<()>>,
}

impl FileWalker {
    /// Spawns the discovery thread over `roots`.
    pub fn spawn(roots: &[PathBuf], config: &SourceConfig) -> Self {
        let (tx, rx) = sync_channel(config.queue_depth.max(1));
        let roots = roots.to_vec();
        let extension = config.extension.clone();
        let recursive = config.recursive;
        let handle = thread::spawn(move || {
            for root in &roots {
                // A send error means the consumer hung up; stop quietly.
                if walk(&tx, root, &extension, recursive).is_err() {
                    return;
                }
            }
        });
        Self {
            rx: Some(rx),
            handle: Some(handle),
        }
    }

    /// Stops discovery and waits for the producer thread to exit.
    pub fn shutdown(&mut self) {
        // Dropping the receiver unblocks any pending send.
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Iterator for FileWalker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for FileWalker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Visits `path`, sending matching files into the channel.
///
/// Returns Err only when the receiving side has hung up.
fn walk(
    tx: &SyncSender<PathBuf>,
    path: &Path,
    extension: &str,
    recursive: bool,
) -> std::result::Result<(), std::sync::mpsc::SendError<PathBuf>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            warn!("skipping unreadable path {}: {}", path.display(), err);
            return Ok(());
        }
    };
    if meta.is_file() {
        if matches_extension(path, extension) {
            tx.send(path.to_path_buf())?;
        }
        return Ok(());
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("skipping unreadable directory {}: {}", path.display(), err);
            return Ok(());
        }
    };
    let mut children: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    children.sort();

    for child in children {
        if child.is_dir() {
            if recursive {
                walk(tx, &child, extension, recursive)?;
            }
        } else if matches_extension(&child, extension) {
            tx.send(child)?;
        }
    }
    Ok(())
}

fn matches_extension(path: &Path, extension: &str) -> bool {
    path.extension().map_or(false, |ext| ext == extension)
}

/// Exposes many discovered files as one continuous packet stream.
///
/// The [`Read`] implementation advances transparently from one file to the
/// next, only reporting end-of-stream once discovery itself is exhausted.
/// The [`FrameSource`] implementation instead stops at each file boundary,
/// which lets the frame reader guarantee that no frame straddles two
/// files and skip unreadable tails.
pub struct MultiFileSource {
    walker: FileWalker,
    current: Option<BufReader<File>>,
}

impl MultiFileSource {
    /// Creates a source over every matching file under `roots`.
    ///
    /// Discovery starts immediately in the background; the first file is
    /// opened lazily on first read.
    pub fn new(roots: &[PathBuf], config: &SourceConfig) -> Self {
        Self {
            walker: FileWalker::spawn(roots, config),
            current: None,
        }
    }

    /// Releases the open file handle and stops discovery.
    ///
    /// Synchronous: the discovery thread has exited when this returns.
    pub fn close(&mut self) {
        self.current = None;
        self.walker.shutdown();
    }

    /// Closes the current file and opens the next discovered one.
    ///
    /// Returns false once the discovery sequence is exhausted.
    fn open_next(&mut self) -> io::Result<bool> {
        self.current = None;
        match self.walker.next() {
            Some(path) => {
                debug!("reading {}", path.display());
                let file = File::open(&path)?;
                self.current = Some(BufReader::new(file));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Read for MultiFileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                let n = current.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            if !self.open_next()? {
                return Ok(0);
            }
        }
    }
}

impl FrameSource for MultiFileSource {
    fn read_segment(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.current.as_mut() {
            Some(current) => current.read(buf),
            None => Ok(0),
        }
    }

    fn advance_segment(&mut self) -> io::Result<bool> {
        self.open_next()
    }
}
