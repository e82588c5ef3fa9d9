//! Flat filesystem — read-only image loaded as a boot module
//!
//! Layout (all fields little-endian u32, blocks of 4 KB):
//!
//!   block 0        boot block: dir_count, inode_count, data_count,
//!                  52 reserved bytes, then 63 dentries of 64 bytes
//!                  (name[32], type, inode, 24 reserved)
//!   1..=N          inodes: length, then up to 1023 data block numbers
//!   N+1..          data blocks

use super::{DirEntry, FileKind, FileSystem};
use crate::sys::config::NAME_MAX;
use crate::sys::error::Error;
use spin::Once;

pub const BLOCK_SIZE:  usize = 4096;
pub const MAX_DENTRIES: usize = 63;
const DENTRY_BASE:  usize = 64;
const DENTRY_SIZE:  usize = 64;
const MAX_BLOCKS:   usize = BLOCK_SIZE / 4 - 1;

#[derive(Debug, Clone, Copy)]
struct BootBlock {
    dir_count:   usize,
    inode_count: usize,
    data_count:  usize,
}

pub struct FlatFs {
    image: Once<&'static [u8]>,
}

impl FlatFs {
    pub const fn new() -> Self {
        Self { image: Once::new() }
    }

    /// Attach the image after checking its counts against its size
    pub fn mount(&self, image: &'static [u8]) -> Result<(), Error> {
        if self.image.is_completed() {
            return Err(Error::BadImage);
        }
        let boot = boot_block(image)?;
        let blocks = 1 + boot.inode_count + boot.data_count;
        if boot.dir_count > MAX_DENTRIES || image.len() < blocks * BLOCK_SIZE {
            kerror!("fs: image of {} bytes does not hold {} blocks", image.len(), blocks);
            return Err(Error::BadImage);
        }
        self.image.call_once(|| image);
        klog!("fs: {} entries, {} inodes, {} data blocks",
            boot.dir_count, boot.inode_count, boot.data_count);
        Ok(())
    }

    fn image(&self) -> Result<&'static [u8], Error> {
        self.image.get().copied().ok_or(Error::Io)
    }

    fn dentry(image: &[u8], index: usize) -> Option<DirEntry> {
        let base = DENTRY_BASE + index * DENTRY_SIZE;
        let name = image.get(base..base + NAME_MAX)?;
        let kind = FileKind::from_raw(read_u32(image, base + NAME_MAX).ok()?)?;
        let inode = read_u32(image, base + NAME_MAX + 4).ok()?;
        Some(DirEntry::new(name, kind, inode))
    }

    fn inode_base(boot: &BootBlock, inode: u32) -> Result<usize, Error> {
        let inode = inode as usize;
        if inode >= boot.inode_count {
            return Err(Error::NotFound);
        }
        Ok((1 + inode) * BLOCK_SIZE)
    }
}

impl Default for FlatFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for FlatFs {
    fn resolve(&self, name: &[u8]) -> Result<DirEntry, Error> {
        if name.is_empty() || name.len() > NAME_MAX {
            return Err(Error::NotFound);
        }
        let image = self.image()?;
        let boot = boot_block(image)?;
        (0..boot.dir_count)
            .filter_map(|i| Self::dentry(image, i))
            .find(|entry| entry.name() == name)
            .ok_or(Error::NotFound)
    }

    fn entry(&self, index: usize) -> Option<DirEntry> {
        let image = self.image().ok()?;
        let boot = boot_block(image).ok()?;
        if index >= boot.dir_count {
            return None;
        }
        Self::dentry(image, index)
    }

    fn length(&self, inode: u32) -> Result<u32, Error> {
        let image = self.image()?;
        let boot = boot_block(image)?;
        read_u32(image, Self::inode_base(&boot, inode)?)
    }

    fn read_data(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, Error> {
        let image = self.image()?;
        let boot = boot_block(image)?;
        let base = Self::inode_base(&boot, inode)?;
        let length = read_u32(image, base)? as usize;
        let offset = offset as usize;
        if offset >= length {
            return Ok(0);
        }

        let total = buf.len().min(length - offset);
        let data_base = (1 + boot.inode_count) * BLOCK_SIZE;
        let mut done = 0;
        while done < total {
            let pos = offset + done;
            let slot = pos / BLOCK_SIZE;
            if slot >= MAX_BLOCKS {
                return Err(Error::Io);
            }
            let block = read_u32(image, base + 4 + slot * 4)? as usize;
            if block >= boot.data_count {
                kwarn!("fs: inode {} names bad data block {}", inode, block);
                return Err(Error::Io);
            }
            let within = pos % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - within).min(total - done);
            let start = data_base + block * BLOCK_SIZE + within;
            let src = image.get(start..start + chunk).ok_or(Error::Io)?;
            buf[done..done + chunk].copy_from_slice(src);
            done += chunk;
        }
        Ok(done)
    }
}

fn read_u32(image: &[u8], offset: usize) -> Result<u32, Error> {
    let bytes = image.get(offset..offset + 4).ok_or(Error::Io)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn boot_block(image: &[u8]) -> Result<BootBlock, Error> {
    if image.len() < BLOCK_SIZE {
        return Err(Error::BadImage);
    }
    Ok(BootBlock {
        dir_count:   read_u32(image, 0)? as usize,
        inode_count: read_u32(image, 4)? as usize,
        data_count:  read_u32(image, 8)? as usize,
    })
}
