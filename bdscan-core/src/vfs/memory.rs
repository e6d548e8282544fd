//! In-memory directory tree.
//!
//! Hosts without a real filesystem (a browser handing over a file tree) build
//! the disc here; the test suite does the same with synthetic fixtures.

use bytes::Bytes;
use std::io::{self, Cursor};
use std::sync::{Arc, Weak};

use super::{DirRef, DirectoryInfo, FileInfo, FileRef, ReadSeek};

#[derive(Debug)]
pub struct MemoryDirectory {
    name: String,
    path: String,
    parent: Option<Weak<MemoryDirectory>>,
    children: Vec<Arc<MemoryDirectory>>,
    files: Vec<Arc<MemoryFile>>,
}

#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    path: String,
    data: Bytes,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            data: data.into(),
        }
    }
}

impl FileInfo for MemoryFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn full_name(&self) -> String {
        self.path.clone()
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn open_read(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
}

/// Builder for a [`MemoryDirectory`] tree, keyed by `/`-separated paths.
#[derive(Debug, Default)]
pub struct MemoryTree {
    name: String,
    dirs: Vec<MemoryTree>,
    files: Vec<(String, Bytes)>,
}

impl MemoryTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn dir_mut(&mut self, name: &str) -> &mut MemoryTree {
        let idx = match self.dirs.iter().position(|d| d.name == name) {
            Some(idx) => idx,
            None => {
                self.dirs.push(MemoryTree::new(name));
                self.dirs.len() - 1
            }
        };
        &mut self.dirs[idx]
    }

    /// Create every directory along `path`.
    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        let mut node = &mut *self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            node = node.dir_mut(part);
        }
        self
    }

    pub fn add_file(&mut self, path: &str, data: impl Into<Bytes>) -> &mut Self {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some(file_name) = parts.pop() else {
            return self;
        };
        let mut node = &mut *self;
        for part in parts {
            node = node.dir_mut(part);
        }
        node.files.push((file_name.to_string(), data.into()));
        self
    }

    pub fn build(self) -> Arc<MemoryDirectory> {
        let path = self.name.clone();
        build_node(self, path, None)
    }
}

fn build_node(tree: MemoryTree, path: String, parent: Option<Weak<MemoryDirectory>>) -> Arc<MemoryDirectory> {
    Arc::new_cyclic(|me: &Weak<MemoryDirectory>| {
        let children = tree
            .dirs
            .into_iter()
            .map(|child| {
                let child_path = format!("{}/{}", path, child.name);
                build_node(child, child_path, Some(me.clone()))
            })
            .collect();
        let files = tree
            .files
            .into_iter()
            .map(|(name, data)| {
                Arc::new(MemoryFile {
                    path: format!("{}/{}", path, name),
                    name,
                    data,
                })
            })
            .collect();
        MemoryDirectory {
            name: tree.name,
            path: path.clone(),
            parent,
            children,
            files,
        }
    })
}

impl MemoryDirectory {
    pub fn builder(name: impl Into<String>) -> MemoryTree {
        MemoryTree::new(name)
    }
}

impl DirectoryInfo for MemoryDirectory {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn full_name(&self) -> String {
        self.path.clone()
    }

    fn parent(&self) -> Option<DirRef> {
        self.parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|p| p as DirRef)
    }

    fn directories(&self) -> io::Result<Vec<DirRef>> {
        Ok(self.children.iter().map(|c| c.clone() as DirRef).collect())
    }

    fn files(&self) -> io::Result<Vec<FileRef>> {
        Ok(self.files.iter().map(|f| f.clone() as FileRef).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn builds_nested_tree_with_parents() {
        let mut tree = MemoryDirectory::builder("DISC");
        tree.add_file("BDMV/STREAM/00001.M2TS", vec![1u8, 2, 3])
            .add_file("BDMV/index.bdmv", b"INDX0200".to_vec())
            .add_dir("BDMV/BDJO");
        let root = tree.build();

        let bdmv = root.directory("bdmv").unwrap().expect("bdmv");
        assert_eq!(bdmv.full_name(), "DISC/BDMV");
        assert_eq!(bdmv.parent().expect("parent").name(), "DISC");
        assert_eq!(bdmv.directories().unwrap().len(), 2);

        let stream = bdmv.directory("STREAM").unwrap().expect("stream");
        let file = stream.file("00001.m2ts").unwrap().expect("file");
        let mut buf = Vec::new();
        file.open_read().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3]);

        assert_eq!(root.total_size().unwrap(), 11);
        assert_eq!(root.files_matching("*.m2ts", true).unwrap().len(), 1);
        assert_eq!(root.files_matching("*.m2ts", false).unwrap().len(), 0);
    }
}
