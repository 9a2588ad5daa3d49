//! Open files: the global file table and byte-level reads and writes over inodes.

use alloc::boxed::Box;

use bitflags::bitflags;
use log::{debug, warn};

use crate::chain::BlockChain;
use crate::config::*;
use crate::directory::sync_dir_entry;
use crate::error::FsError;
use crate::inode::{cached, inode_close, inode_open, inode_sync, update_cached};
use crate::partition::Partition;
use crate::structs::{DirEntry, FileType, Inode, WriteState};
use crate::Result;

bitflags! {
    pub struct OpenFlags: u8 {
        const RDONLY = 0;
        const WRONLY = 1 << 0;
        const RDWR = 1 << 1;
        const CREATE = 1 << 2;
    }
}

impl OpenFlags {
    pub fn writable(&self) -> bool {
        self.intersects(OpenFlags::WRONLY | OpenFlags::RDWR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// One slot of the global file table.
#[derive(Debug, Clone, Copy)]
pub struct OpenFile {
    pub pos: u32,
    pub flags: OpenFlags,
    pub ino: u32,
}

pub struct FileTable {
    slots: [Option<OpenFile>; MAX_FILES_OPEN],
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_FILES_OPEN],
        }
    }

    fn alloc(&mut self, file: OpenFile) -> Result<usize> {
        let Some(idx) = self.slots.iter().position(|s| s.is_none()) else {
            warn!("file table full");
            return Err(FsError::TooManyOpenFiles);
        };
        self.slots[idx] = Some(file);
        Ok(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(idx)
            .and_then(|s| s.as_mut())
            .ok_or(FsError::BadDescriptor)
    }

    fn take(&mut self, idx: usize) -> Result<OpenFile> {
        self.slots
            .get_mut(idx)
            .and_then(|s| s.take())
            .ok_or(FsError::BadDescriptor)
    }

    /// Whether any open file refers to `ino`.
    pub fn is_open(&self, ino: u32) -> bool {
        self.slots.iter().flatten().any(|f| f.ino == ino)
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates the regular file `name` in an open parent directory and opens it.
/// Returns the file table slot. Every step already taken is undone on failure.
pub fn file_create(
    part: &mut Partition,
    files: &mut FileTable,
    parent_ino: u32,
    name: &str,
    flags: OpenFlags,
) -> Result<usize> {
    let ino = part.alloc_inode_no()?;
    let inode = Inode::new(ino);
    let entry = match DirEntry::new(name, ino, FileType::Regular) {
        Ok(entry) => entry,
        Err(e) => {
            part.free_inode_no(ino)?;
            return Err(e);
        }
    };
    let slot = match files.alloc(OpenFile { pos: 0, flags, ino }) {
        Ok(slot) => slot,
        Err(e) => {
            warn!("create {}: rolling back inode {}", name, ino);
            part.free_inode_no(ino)?;
            return Err(e);
        }
    };
    if let Err(e) = sync_dir_entry(part, parent_ino, &entry) {
        warn!("create {}: rolling back inode {} and slot {}", name, ino, slot);
        files.take(slot)?;
        part.free_inode_no(ino)?;
        return Err(e);
    }

    inode_sync(part, &cached(part, parent_ino)?)?;
    inode_sync(part, &inode)?;
    inode_open(part, ino)?;
    if flags.writable() {
        lock_writer(part, ino)?;
    }
    debug!("{}: create {} -> inode {}", part.name, name, ino);
    Ok(slot)
}

fn lock_writer(part: &mut Partition, ino: u32) -> Result<()> {
    let inode = part.open_inodes.get_mut(&ino).ok_or(FsError::NotOpen)?;
    if inode.write_state == WriteState::WriteLocked {
        return Err(FsError::Busy);
    }
    inode.write_state = WriteState::WriteLocked;
    Ok(())
}

fn unlock_writer(part: &mut Partition, ino: u32) -> Result<()> {
    let inode = part.open_inodes.get_mut(&ino).ok_or(FsError::NotOpen)?;
    inode.write_state = WriteState::Idle;
    Ok(())
}

/// Opens an existing file. A second writer on the same inode is refused with `Busy`.
pub fn file_open(part: &mut Partition, files: &mut FileTable, ino: u32, flags: OpenFlags) -> Result<usize> {
    inode_open(part, ino)?;
    if flags.writable() {
        if let Err(e) = lock_writer(part, ino) {
            warn!("open inode {}: already being written", ino);
            inode_close(part, ino)?;
            return Err(e);
        }
    }
    match files.alloc(OpenFile { pos: 0, flags, ino }) {
        Ok(slot) => Ok(slot),
        Err(e) => {
            if flags.writable() {
                unlock_writer(part, ino)?;
            }
            inode_close(part, ino)?;
            Err(e)
        }
    }
}

pub fn file_close(part: &mut Partition, files: &mut FileTable, slot: usize) -> Result<()> {
    let file = files.take(slot)?;
    if file.flags.writable() {
        unlock_writer(part, file.ino)?;
    }
    inode_close(part, file.ino)
}

/// Appends `buf` to the file and returns the number of bytes written.
/// Fails with `FileTooLarge` before allocating anything if the file would outgrow
/// its block chain. Blocks allocated before an exhaustion error are not returned.
pub fn file_write(part: &mut Partition, file: &mut OpenFile, buf: &[u8]) -> Result<usize> {
    let mut inode = cached(part, file.ino)?;
    let size = inode.size as usize;
    if size + buf.len() > MAX_FILE_SIZE {
        warn!("write inode {}: {} + {} bytes exceeds the size limit", inode.ino, size, buf.len());
        return Err(FsError::FileTooLarge);
    }
    if buf.is_empty() {
        return Ok(0);
    }

    let used = Inode::blocks_for(size);
    let needed = Inode::blocks_for(size + buf.len());
    let mut chain = BlockChain::load_upto(part, &inode, needed)?;
    if needed > used {
        chain.grow(part, &mut inode, used, needed)?;
    }

    let mut block = Box::new([0u8; BLOCK_SIZE]);
    let mut pos = size;
    let mut written = 0;
    while written < buf.len() {
        let idx = pos / BLOCK_SIZE;
        let off = pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - off).min(buf.len() - written);
        let lba = chain.get(idx).ok_or(FsError::InvalidBlockId)?;
        // Only a sector holding earlier data needs to be read first.
        if off != 0 {
            part.read_block(lba, &mut block)?;
        } else {
            block.fill(0);
        }
        block[off..off + chunk].copy_from_slice(&buf[written..written + chunk]);
        part.write_block(lba, &block)?;

        written += chunk;
        pos += chunk;
        inode.size = pos as u32;
    }
    file.pos = pos as u32;

    update_cached(part, &inode)?;
    inode_sync(part, &inode)?;
    Ok(written)
}

/// Reads from the current position, returning the number of bytes copied.
/// Reading with nothing left in the file is `EndOfFile`, not a zero-length read.
pub fn file_read(part: &Partition, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize> {
    let inode = cached(part, file.ino)?;
    if buf.is_empty() {
        return Ok(0);
    }
    let pos = file.pos as usize;
    let remaining = (inode.size as usize).saturating_sub(pos);
    if remaining == 0 {
        return Err(FsError::EndOfFile);
    }
    let len = buf.len().min(remaining);
    let end_block = (pos + len - 1) / BLOCK_SIZE;
    let chain = BlockChain::load_upto(part, &inode, end_block + 1)?;

    let mut block = Box::new([0u8; BLOCK_SIZE]);
    let mut read = 0;
    while read < len {
        let cur = pos + read;
        let off = cur % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - off).min(len - read);
        let lba = chain.get(cur / BLOCK_SIZE).ok_or(FsError::InvalidBlockId)?;
        part.read_block(lba, &mut block)?;
        buf[read..read + chunk].copy_from_slice(&block[off..off + chunk]);
        read += chunk;
    }
    file.pos += len as u32;
    Ok(len)
}

/// Moves the file position. The result must lie within `0..=size`.
pub fn file_seek(part: &Partition, file: &mut OpenFile, offset: i64, whence: Whence) -> Result<u32> {
    let size = cached(part, file.ino)?.size as i64;
    let base = match whence {
        Whence::Set => 0,
        Whence::Cur => file.pos as i64,
        Whence::End => size,
    };
    let target = base.checked_add(offset).ok_or(FsError::InvalidSeek)?;
    if target < 0 || target > size {
        return Err(FsError::InvalidSeek);
    }
    file.pos = target as u32;
    Ok(file.pos)
}
