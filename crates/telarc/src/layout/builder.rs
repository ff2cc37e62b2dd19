//! Creates final archive files at templated paths.

use crate::error::Result;
use crate::layout::{PacketInfo, Template};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::debug;

/// Renders packet metadata into archive paths and creates the files,
/// including any missing parent directories.
///
/// With versioning enabled a numeric suffix (`.1`, `.2`, ...) is appended
/// per repeated render of the same base path, so a rerun disambiguates
/// instead of overwriting.
///
/// # Examples
/// ```rust,ignore
/// use telarc::layout::builder::PathBuilder;
///
/// let mut builder = PathBuilder::new("/archive/%P/%Y/%J/%04h/rt_%05m.dat", false)?;
/// builder.copy(&mut scratch, &info)?;
/// ```
pub struct PathBuilder {
    template: Template,
    versioned: bool,
    versions: HashMap<String, u32>,
}

impl PathBuilder {
    /// Compiles `pattern` once for many renders.
    ///
    /// # Errors
    ///
    /// Fails when the pattern does not compile (see
    /// [`Template::parse`]).
    pub fn new(pattern: &str, versioned: bool) -> Result<Self> {
        Ok(Self {
            template: Template::parse(pattern)?,
            versioned,
            versions: HashMap::new(),
        })
    }

    /// Renders the path for one packet without touching the filesystem.
    pub fn render(&self, info: &PacketInfo) -> String {
        self.template.render(info)
    }

    /// Returns the source pattern.
    pub fn pattern(&self) -> &str {
        self.template.pattern()
    }

    /// Renders the final path, creates parent directories, and creates
    /// the file.
    ///
    /// # Errors
    ///
    /// Returns an error if directory or file creation fails.
    pub fn open(&mut self, info: &PacketInfo) -> Result<File> {
        let rendered = self.render(info);
        let path = self.versioned_path(rendered);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("creating {}", path.display());
        Ok(File::create(path)?)
    }

    /// Copies a whole stream into a freshly created archive file.
    ///
    /// Returns the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the copy fails.
    pub fn copy<R: Read>(&mut self, reader: &mut R, info: &PacketInfo) -> Result<u64> {
        let mut file = self.open(info)?;
        Ok(io::copy(reader, &mut file)?)
    }

    fn versioned_path(&mut self, rendered: String) -> PathBuf {
        if !self.versioned {
            return PathBuf::from(rendered);
        }
        let version = self.versions.entry(rendered.clone()).or_insert(0);
        *version += 1;
        PathBuf::from(format!("{}.{}", rendered, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn info() -> PacketInfo {
        PacketInfo::new(
            451,
            0,
            Utc.with_ymd_and_hms(2019, 7, 18, 10, 41, 23).unwrap(),
        )
    }

    #[test]
    fn test_open_creates_parent_tree() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/%P/%Y/rt_%05m.dat", dir.path().display());
        let mut builder = PathBuilder::new(&pattern, false).unwrap();
        builder.open(&info()).unwrap();
        assert!(dir.path().join("451/2019/rt_40.dat").is_file());
    }

    #[test]
    fn test_versioned_paths_do_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/%P.dat", dir.path().display());
        let mut builder = PathBuilder::new(&pattern, true).unwrap();
        builder.open(&info()).unwrap();
        builder.open(&info()).unwrap();
        assert!(dir.path().join("451.dat.1").is_file());
        assert!(dir.path().join("451.dat.2").is_file());
    }

    #[test]
    fn test_copy_writes_stream() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/%P.dat", dir.path().display());
        let mut builder = PathBuilder::new(&pattern, false).unwrap();
        let copied = builder.copy(&mut &b"payload"[..], &info()).unwrap();
        assert_eq!(copied, 7);
        assert_eq!(
            std::fs::read(dir.path().join("451.dat")).unwrap(),
            b"payload"
        );
    }
}
