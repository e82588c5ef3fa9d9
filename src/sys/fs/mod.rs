//! fs — the read-only filesystem seen by the process core
//!
//!   flat — reader for the flat boot-module image

pub mod flat;

pub use flat::FlatFs;

use crate::sys::config::NAME_MAX;
use crate::sys::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Device,
    Directory,
    Regular,
}

impl FileKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FileKind::Device),
            1 => Some(FileKind::Directory),
            2 => Some(FileKind::Regular),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    name:      [u8; NAME_MAX],
    pub kind:  FileKind,
    pub inode: u32,
}

impl DirEntry {
    pub fn new(name: &[u8], kind: FileKind, inode: u32) -> Self {
        let mut bytes = [0; NAME_MAX];
        let len = name.len().min(NAME_MAX);
        bytes[..len].copy_from_slice(&name[..len]);
        Self { name: bytes, kind, inode }
    }

    /// Name without its NUL padding
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        &self.name[..len]
    }
}

pub trait FileSystem: Sync {
    fn resolve(&self, name: &[u8]) -> Result<DirEntry, Error>;

    /// Directory entry by position, `None` past the end
    fn entry(&self, index: usize) -> Option<DirEntry>;

    fn length(&self, inode: u32) -> Result<u32, Error>;

    /// Copy from `offset` into `buf`; returns 0 at end of file
    fn read_data(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, Error>;
}
