//! RAM-backed [`Volume`] used by tests and by the simulator's in-memory mode.
//!
//! Behaves like a removable card: it can be pulled ([`MemoryVolume::set_removed`]),
//! handles opened before a detach go stale, writes sit in a per-handle buffer
//! until flushed, and an optional capacity makes writes come up short.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use thiserror_no_std::Error;

use super::{OpenMode, Volume};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryVolumeError {
    #[error("medium removed")]
    Removed,
    #[error("volume not attached")]
    NotAttached,
    #[error("file not found")]
    NotFound,
    #[error("file opened for reading only")]
    ReadOnly,
    #[error("file opened for writing only")]
    WriteOnly,
}

#[derive(Debug)]
pub struct MemoryFile {
    name: String,
    mode: OpenMode,
    position: usize,
    pending: Vec<u8>,
    generation: u32,
}

#[derive(Debug, Default)]
pub struct MemoryVolume {
    files: BTreeMap<String, Vec<u8>>,
    attached: bool,
    removed: bool,
    /// Bumped on every detach so stale handles are rejected
    generation: u32,
    capacity: Option<usize>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file on the medium, replacing any previous contents.
    pub fn insert(&mut self, name: &str, contents: &[u8]) {
        self.files.insert(String::from(name), contents.to_vec());
    }

    /// Flushed contents of a file.
    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Simulate pulling (`true`) or reinserting (`false`) the medium.
    pub fn set_removed(&mut self, removed: bool) {
        self.removed = removed;
        if removed {
            self.detach();
        }
    }

    /// Limit the total number of flushed bytes the medium holds.
    pub fn set_capacity(&mut self, bytes: Option<usize>) {
        self.capacity = bytes;
    }

    fn used(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    fn check(&self, file: &MemoryFile) -> Result<(), MemoryVolumeError> {
        if self.removed {
            return Err(MemoryVolumeError::Removed);
        }
        if !self.attached || file.generation != self.generation {
            return Err(MemoryVolumeError::NotAttached);
        }
        Ok(())
    }
}

impl Volume for MemoryVolume {
    type File = MemoryFile;
    type Error = MemoryVolumeError;

    fn attach(&mut self) -> Result<(), Self::Error> {
        if self.removed {
            return Err(MemoryVolumeError::Removed);
        }
        self.attached = true;
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached && !self.removed
    }

    fn detach(&mut self) {
        self.attached = false;
        self.generation = self.generation.wrapping_add(1);
    }

    fn open(&mut self, name: &str, mode: OpenMode) -> Result<Self::File, Self::Error> {
        if self.removed {
            return Err(MemoryVolumeError::Removed);
        }
        if !self.attached {
            return Err(MemoryVolumeError::NotAttached);
        }

        match mode {
            OpenMode::Read if !self.files.contains_key(name) => {
                return Err(MemoryVolumeError::NotFound);
            }
            OpenMode::Read => {}
            OpenMode::Append => {
                self.files.entry(String::from(name)).or_default();
            }
            OpenMode::Truncate => {
                self.files.insert(String::from(name), Vec::new());
            }
        }

        Ok(MemoryFile {
            name: String::from(name),
            mode,
            position: 0,
            pending: Vec::new(),
            generation: self.generation,
        })
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.check(file)?;
        if file.mode != OpenMode::Read {
            return Err(MemoryVolumeError::WriteOnly);
        }

        let data = self
            .files
            .get(&file.name)
            .ok_or(MemoryVolumeError::NotFound)?;
        let available = data.len().saturating_sub(file.position);
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&data[file.position..file.position + count]);
        file.position += count;
        Ok(count)
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, Self::Error> {
        self.check(file)?;
        if file.mode == OpenMode::Read {
            return Err(MemoryVolumeError::ReadOnly);
        }

        let accepted = match self.capacity {
            Some(capacity) => {
                let free = capacity.saturating_sub(self.used() + file.pending.len());
                data.len().min(free)
            }
            None => data.len(),
        };
        file.pending.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self, file: &mut Self::File) -> Result<(), Self::Error> {
        self.check(file)?;
        let pending = core::mem::take(&mut file.pending);
        self.files
            .entry(file.name.clone())
            .or_default()
            .extend_from_slice(&pending);
        Ok(())
    }

    fn close(&mut self, mut file: Self::File) -> Result<(), Self::Error> {
        self.flush(&mut file)
    }

    fn for_each_file(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), Self::Error> {
        if self.removed {
            return Err(MemoryVolumeError::Removed);
        }
        if !self.attached {
            return Err(MemoryVolumeError::NotAttached);
        }
        for name in self.files.keys() {
            visit(name);
        }
        Ok(())
    }
}
