//! Per-path reader/writer lock table.
//!
//! One entry per path currently in use: either a single writer or any
//! number of readers, never both. Acquisition never blocks and never
//! queues; a refused caller retries later, on its own schedule. Releases
//! check no ownership token (any caller may release a lock it believes it
//! holds) and an entry is removed the instant it goes idle, so the table
//! only ever holds paths that are being touched right now.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct LockEntry {
    readers: u32,
    write_held: bool,
}

impl LockEntry {
    fn is_idle(&self) -> bool {
        self.readers == 0 && !self.write_held
    }
}

/// The coordinator's lock registry. All four operations take the same
/// mutex, so each is atomic with respect to every other call on the table.
#[derive(Debug)]
pub struct LockTable {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl LockTable {
    pub fn new() -> Self {
        LockTable {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Take the write lock on `path`. Fails if anyone is writing or reading.
    pub fn acquire_write(&self, path: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(path.to_string()).or_default();
        if entry.write_held || entry.readers > 0 {
            return false;
        }
        entry.write_held = true;
        true
    }

    /// Drop the write lock on `path`. Fails if the path is not tracked.
    pub fn release_write(&self, path: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(path) else {
            return false;
        };
        entry.write_held = false;
        if entry.is_idle() {
            entries.remove(path);
        }
        true
    }

    /// Add a reader on `path`. Fails while the write lock is held.
    pub fn acquire_read(&self, path: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(path.to_string()).or_default();
        if entry.write_held {
            return false;
        }
        entry.readers += 1;
        true
    }

    /// Drop a reader on `path`. Fails if the path is not tracked.
    pub fn release_read(&self, path: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(path) else {
            return false;
        };
        entry.readers = entry.readers.saturating_sub(1);
        if entry.is_idle() {
            entries.remove(path);
        }
        true
    }

    /// Number of paths currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for LockTable {
    fn default() -> Self {
        LockTable::new()
    }
}
