//! Filesystem abstraction.
//!
//! The analysis engine never touches `std::fs` directly. A disc may be a plain
//! folder, a mounted image or a virtual tree handed over by a browser host, and
//! all three look the same through these traits.

mod memory;
mod native;
mod wildcard;

pub use memory::{MemoryDirectory, MemoryFile, MemoryTree};
pub use native::{NativeDirectory, NativeFile};
pub use wildcard::WildcardPattern;

use std::fmt::Debug;
use std::io::{self, Read, Seek};
use std::sync::Arc;

/// Seekable byte stream returned by [`FileInfo::open_read`].
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

pub type DirRef = Arc<dyn DirectoryInfo>;
pub type FileRef = Arc<dyn FileInfo>;

pub trait FileInfo: Debug + Send + Sync {
    fn name(&self) -> String;

    fn full_name(&self) -> String;

    fn len(&self) -> u64;

    fn is_dir(&self) -> bool {
        false
    }

    fn open_read(&self) -> io::Result<Box<dyn ReadSeek>>;

    /// Upper-cased extension including the dot, e.g. `.M2TS`.
    fn extension(&self) -> String {
        let name = self.name();
        match name.rfind('.') {
            Some(idx) => name[idx..].to_ascii_uppercase(),
            None => String::new(),
        }
    }

    fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut stream = self.open_read()?;
        let mut buf = Vec::with_capacity(self.len() as usize);
        stream.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

pub trait DirectoryInfo: Debug + Send + Sync {
    fn name(&self) -> String;

    fn full_name(&self) -> String;

    fn parent(&self) -> Option<DirRef>;

    fn directories(&self) -> io::Result<Vec<DirRef>>;

    fn files(&self) -> io::Result<Vec<FileRef>>;

    fn volume_label(&self) -> String {
        self.name()
    }

    /// Files whose names match a `*`/`?` wildcard, optionally descending into
    /// every subdirectory.
    fn files_matching(&self, pattern: &str, recursive: bool) -> io::Result<Vec<FileRef>> {
        let pattern = WildcardPattern::new(pattern)?;
        let mut out: Vec<FileRef> = self
            .files()?
            .into_iter()
            .filter(|f| pattern.is_match(&f.name()))
            .collect();
        if recursive {
            for dir in self.directories()? {
                out.extend(dir.files_matching(pattern.as_str(), true)?);
            }
        }
        Ok(out)
    }

    /// Case-insensitive lookup of a direct child directory.
    fn directory(&self, name: &str) -> io::Result<Option<DirRef>> {
        Ok(self
            .directories()?
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name)))
    }

    /// Case-insensitive lookup of a direct child file.
    fn file(&self, name: &str) -> io::Result<Option<FileRef>> {
        Ok(self
            .files()?
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name)))
    }

    /// Recursive sum of every file length below this directory.
    fn total_size(&self) -> io::Result<u64> {
        let mut size: u64 = self.files()?.iter().map(|f| f.len()).sum();
        for dir in self.directories()? {
            size += dir.total_size()?;
        }
        Ok(size)
    }
}
