//! Filesystem-backed store rooted at a per-replica private prefix.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// A replica's private slice of the host filesystem.
///
/// All distributed-filesystem paths are resolved under `<root>/replica<id>`.
/// Construction wipes any leftover tree from a previous run and starts from
/// an empty root, so every replica begins in the same (empty) state.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create the store for `replica_id` under `storage_root`.
    ///
    /// An existing directory for this id is deleted together with its
    /// contents before the empty root is recreated.
    pub fn new(storage_root: &Path, replica_id: u32) -> io::Result<Self> {
        let root = storage_root.join(format!("replica{}", replica_id));
        if root.exists() {
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        Ok(LocalStore { root })
    }

    /// The on-disk root of this replica's tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a normalized distributed path onto this replica's root.
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Create a new empty file. Fails if it already exists.
    pub fn create_file(&self, path: &str) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.resolve(path))
            .map(|_| ())
    }

    /// Write `content` to a file, creating it if missing, truncating otherwise.
    pub fn write_file(&self, path: &str, content: &[u8]) -> io::Result<()> {
        fs::write(self.resolve(path), content)
    }

    /// Read the entire file into memory.
    pub fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    /// Remove a file or an empty directory.
    pub fn remove(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path);
        if target.is_dir() {
            fs::remove_dir(target)
        } else {
            fs::remove_file(target)
        }
    }

    /// Rename `source` to `target` within this replica's tree.
    pub fn rename(&self, source: &str, target: &str) -> io::Result<()> {
        fs::rename(self.resolve(source), self.resolve(target))
    }

    /// Create a single directory. The parent must already exist.
    pub fn create_directory(&self, path: &str) -> io::Result<()> {
        fs::create_dir(self.resolve(path))
    }

    /// Names of the entries directly inside a directory, sorted.
    pub fn list_directory(&self, path: &str) -> io::Result<Vec<String>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            entries.push(entry?.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(entries)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }
}
