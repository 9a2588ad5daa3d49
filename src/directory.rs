//! Directory engine: entry lookup, insertion, deletion and sequential reads.
//!
//! A directory's size counts its live entries, not the blocks it spans, so
//! entries may sit anywhere in any block of the chain.

use alloc::boxed::Box;
use alloc::string::String;

use log::{debug, warn};

use crate::chain::BlockChain;
use crate::config::*;
use crate::error::FsError;
use crate::inode::{cached, inode_close, inode_open, inode_release, inode_sync, update_cached};
use crate::partition::Partition;
use crate::structs::{DirEntry, FileType, Inode};
use crate::Result;

/// An open directory with its read cursor.
/// Must be handed back to `dir_close`; dropping it leaks the inode reference.
#[derive(Debug)]
pub struct Dir {
    pub(crate) ino: u32,
    /// Byte offset into the stream of live entries.
    pub(crate) pos: u32,
    /// (pos, block index, slot) where the walk for `pos` resumes.
    pub(crate) resume: Option<(u32, usize, usize)>,
}

impl Dir {
    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
        self.resume = None;
    }
}

pub fn dir_open(part: &mut Partition, ino: u32) -> Result<Dir> {
    inode_open(part, ino)?;
    Ok(Dir { ino, pos: 0, resume: None })
}

pub fn dir_close(part: &mut Partition, dir: Dir) -> Result<()> {
    inode_close(part, dir.ino)
}

/// Visits every slot of every present block, in chain order.
/// `visit` gets (logical block index, slot, entry) and stops the walk by returning `Some`.
fn scan_entries<T>(
    part: &Partition,
    dir: &Inode,
    visit: impl FnMut(usize, usize, &DirEntry) -> Option<T>,
) -> Result<Option<T>> {
    scan_entries_from(part, dir, (0, 0), visit)
}

/// Same walk, starting at slot `from.1` of logical block `from.0`.
fn scan_entries_from<T>(
    part: &Partition,
    dir: &Inode,
    from: (usize, usize),
    mut visit: impl FnMut(usize, usize, &DirEntry) -> Option<T>,
) -> Result<Option<T>> {
    let chain = BlockChain::load(part, dir)?;
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    for (idx, lba) in chain.iter().filter(|(idx, _)| *idx >= from.0) {
        part.read_block(lba, &mut buf)?;
        let first = if idx == from.0 { from.1 } else { 0 };
        for slot in first..NUM_ENTRY_PER_BLOCK {
            let entry = DirEntry::read_slot(&buf, slot);
            if let Some(found) = visit(idx, slot, &entry) {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// Looks `name` up among the live entries of an open directory.
pub fn search_dir_entry(part: &Partition, dir_ino: u32, name: &str) -> Result<Option<DirEntry>> {
    let dir = cached(part, dir_ino)?;
    scan_entries(part, &dir, |_, _, entry| {
        (!entry.is_free() && entry.name_eq(name)).then_some(*entry)
    })
}

/// Writes `entry` into the first free slot of an open directory, growing it by
/// one block when every present block is full.
/// The parent's new size lands in the inode cache; the caller syncs it.
pub fn sync_dir_entry(part: &mut Partition, parent_ino: u32, entry: &DirEntry) -> Result<()> {
    let mut parent = cached(part, parent_ino)?;
    let free = scan_entries(part, &parent, |idx, slot, e| e.is_free().then_some((idx, slot)))?;

    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    let mut chain = BlockChain::load(part, &parent)?;
    match free {
        Some((idx, slot)) => {
            let lba = chain.get(idx).ok_or(FsError::InvalidBlockId)?;
            part.read_block(lba, &mut buf)?;
            entry.write_slot(&mut buf, slot);
            part.write_block(lba, &buf)?;
        }
        None => {
            let Some(idx) = chain.first_vacant() else {
                warn!("dir {}: no room for {}", parent_ino, entry.name());
                return Err(FsError::DirectoryFull);
            };
            // The new block comes zeroed, so every other slot is free.
            let lba = chain.attach(part, &mut parent, idx)?;
            entry.write_slot(&mut buf, 0);
            part.write_block(lba, &buf)?;
            debug!("dir {}: grew block {} @ {:#x}", parent_ino, idx, lba);
        }
    }
    parent.size += DIR_ENTRY_SIZE as u32;
    update_cached(part, &parent)
}

/// Removes the entry naming `ino` from an open directory and syncs the parent.
/// A block left holding nothing but this entry is given back, except the
/// first block, which anchors "." and "..".
pub fn delete_dir_entry(part: &mut Partition, parent_ino: u32, ino: u32) -> Result<()> {
    let mut parent = cached(part, parent_ino)?;
    let mut chain = BlockChain::load(part, &parent)?;
    let mut buf = Box::new([0u8; BLOCK_SIZE]);

    let mut target = None;
    for (idx, lba) in chain.iter() {
        part.read_block(lba, &mut buf)?;
        let mut is_first = false;
        let mut live = 0;
        let mut found = None;
        for slot in 0..NUM_ENTRY_PER_BLOCK {
            let entry = DirEntry::read_slot(&buf, slot);
            if entry.is_free() {
                continue;
            }
            if entry.name_eq(DOT_NAME) {
                is_first = true;
            } else if !entry.name_eq(DOTDOT_NAME) {
                live += 1;
                if entry.ino == ino {
                    found = Some(slot);
                }
            }
        }
        if let Some(slot) = found {
            target = Some((idx, lba, slot, live == 1 && !is_first));
            break;
        }
    }
    let Some((idx, lba, slot, reclaim)) = target else {
        return Err(FsError::NotFound);
    };

    if reclaim {
        chain.detach(part, &mut parent, idx)?;
    } else {
        DirEntry::NULL.write_slot(&mut buf, slot);
        part.write_block(lba, &buf)?;
    }
    parent.size -= DIR_ENTRY_SIZE as u32;
    update_cached(part, &parent)?;
    inode_sync(part, &parent)
}

/// Next live entry at or after the cursor, or `None` at the end of the directory.
/// Sequential reads pick up where the previous one stopped; a cursor without a
/// matching resume point counts live entries from the start.
pub fn dir_read(part: &Partition, dir: &mut Dir) -> Result<Option<DirEntry>> {
    let inode = cached(part, dir.ino)?;
    if dir.pos >= inode.size {
        return Ok(None);
    }
    let target = dir.pos;
    let (mut seen, from) = match dir.resume {
        Some((pos, idx, slot)) if pos == target => (target, (idx, slot)),
        _ => (0, (0, 0)),
    };
    let found = scan_entries_from(part, &inode, from, |idx, slot, entry| {
        if entry.is_free() {
            return None;
        }
        if seen == target {
            return Some((idx, slot, *entry));
        }
        seen += DIR_ENTRY_SIZE as u32;
        None
    })?;
    let Some((idx, slot, entry)) = found else {
        dir.resume = None;
        return Ok(None);
    };
    dir.pos += DIR_ENTRY_SIZE as u32;
    dir.resume = Some((dir.pos, idx, slot + 1));
    Ok(Some(entry))
}

/// Whether the directory holds nothing but "." and "..".
pub fn dir_is_empty(part: &mut Partition, ino: u32) -> Result<bool> {
    let inode = inode_open(part, ino)?;
    inode_close(part, ino)?;
    Ok(inode.size == 2 * DIR_ENTRY_SIZE as u32)
}

/// Creates an empty directory `name` inside an open parent.
/// On failure nothing stays allocated.
pub fn dir_create(part: &mut Partition, parent_ino: u32, name: &str) -> Result<u32> {
    let ino = part.alloc_inode_no()?;
    let result = init_dir(part, parent_ino, ino, name);
    if result.is_err() {
        warn!("mkdir {}: rolling back inode {}", name, ino);
        part.free_inode_no(ino)?;
    }
    result.map(|_| ino)
}

fn init_dir(part: &mut Partition, parent_ino: u32, ino: u32, name: &str) -> Result<()> {
    let entry = DirEntry::new(name, ino, FileType::Directory)?;
    let lba = part.alloc_block()?;
    let linked = write_dot_entries(part, lba, ino, parent_ino)
        .and_then(|_| sync_dir_entry(part, parent_ino, &entry));
    if let Err(e) = linked {
        part.free_block(lba)?;
        return Err(e);
    }

    let mut inode = Inode::new(ino);
    inode.sectors[0] = lba;
    inode.size = 2 * DIR_ENTRY_SIZE as u32;
    inode_sync(part, &cached(part, parent_ino)?)?;
    inode_sync(part, &inode)?;
    debug!("{}: mkdir {} -> inode {}", part.name, name, ino);
    Ok(())
}

fn write_dot_entries(part: &Partition, lba: u32, ino: u32, parent_ino: u32) -> Result<()> {
    let mut buf = Box::new([0u8; BLOCK_SIZE]);
    DirEntry::new(DOT_NAME, ino, FileType::Directory)?.write_slot(&mut buf, 0);
    DirEntry::new(DOTDOT_NAME, parent_ino, FileType::Directory)?.write_slot(&mut buf, 1);
    part.write_block(lba, &buf)
}

/// Removes the empty directory `ino` from an open parent and reclaims it.
pub fn dir_remove(part: &mut Partition, parent_ino: u32, ino: u32) -> Result<()> {
    delete_dir_entry(part, parent_ino, ino)?;
    inode_release(part, ino)
}

/// Inode of the directory's parent, read from its ".." entry.
pub fn dir_parent(part: &mut Partition, ino: u32) -> Result<u32> {
    let dir = dir_open(part, ino)?;
    let found = search_dir_entry(part, ino, DOTDOT_NAME);
    dir_close(part, dir)?;
    found?.map(|e| e.ino).ok_or(FsError::NotFound)
}

/// Name under which `child` is listed in `parent`.
pub fn dir_child_name(part: &mut Partition, parent: u32, child: u32) -> Result<String> {
    let dir = dir_open(part, parent)?;
    let inode = cached(part, parent);
    let found = inode.and_then(|inode| {
        scan_entries(part, &inode, |_, _, e| {
            (!e.is_free() && !e.is_dot() && e.ino == child).then(|| String::from(e.name()))
        })
    });
    dir_close(part, dir)?;
    found?.ok_or(FsError::NotFound)
}
