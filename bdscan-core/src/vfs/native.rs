//! `std::fs` backed directory tree.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{DirRef, DirectoryInfo, FileInfo, FileRef, ReadSeek};

#[derive(Debug, Clone)]
pub struct NativeDirectory {
    path: PathBuf,
}

impl NativeDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(path: impl AsRef<Path>) -> io::Result<DirRef> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(Arc::new(Self::new(path)))
    }

    fn entries(&self) -> io::Result<Vec<fs::DirEntry>> {
        let mut entries: Vec<fs::DirEntry> = fs::read_dir(&self.path)?.collect::<io::Result<_>>()?;
        entries.sort_by_key(|e| e.file_name());
        Ok(entries)
    }
}

impl DirectoryInfo for NativeDirectory {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    fn full_name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn parent(&self) -> Option<DirRef> {
        self.path
            .parent()
            .map(|p| Arc::new(NativeDirectory::new(p)) as DirRef)
    }

    fn directories(&self) -> io::Result<Vec<DirRef>> {
        let mut out: Vec<DirRef> = Vec::new();
        for entry in self.entries()? {
            if entry.file_type()?.is_dir() {
                out.push(Arc::new(NativeDirectory::new(entry.path())));
            }
        }
        Ok(out)
    }

    fn files(&self) -> io::Result<Vec<FileRef>> {
        let mut out: Vec<FileRef> = Vec::new();
        for entry in self.entries()? {
            let meta = entry.metadata()?;
            if meta.is_file() {
                out.push(Arc::new(NativeFile {
                    path: entry.path(),
                    len: meta.len(),
                }));
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct NativeFile {
    path: PathBuf,
    len: u64,
}

impl NativeFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<FileRef> {
        let path = path.as_ref();
        let meta = fs::metadata(path)?;
        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            len: meta.len(),
        }))
    }
}

impl FileInfo for NativeFile {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn full_name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn open_read(&self) -> io::Result<Box<dyn ReadSeek>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}
