//! In-memory file tree for rendered infrastructure

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Files keyed by path relative to the tree root, in path order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFs {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.read(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[u8])> {
        self.files
            .iter()
            .map(|(path, contents)| (path.as_path(), contents.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Move every file under `prefix`
    pub fn prefixed(self, prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref();
        Self {
            files: self
                .files
                .into_iter()
                .map(|(path, contents)| (prefix.join(path), contents))
                .collect(),
        }
    }

    /// Add every file of `other`, replacing files at the same path
    pub fn merge(&mut self, other: MemoryFs) {
        self.files.extend(other.files);
    }

    /// Write the tree below `dir`, creating folders as needed
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        for (path, contents) in &self.files {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, contents)?;
        }
        Ok(())
    }
}
