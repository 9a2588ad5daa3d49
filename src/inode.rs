//! Management of reading and writing to inodes, and the open-inode cache.
//!
//! Cached inodes are handed out by value. A caller that changes one writes it back
//! with `update_cached` and persists it with `inode_sync`.

use alloc::boxed::Box;

use log::debug;

use crate::chain::BlockChain;
use crate::config::*;
use crate::error::FsError;
use crate::partition::Partition;
use crate::structs::Inode;
use crate::{Result, SuperBlock};

/// Whether an inode record fits in one sector or runs into the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorSpan {
    SingleSector,
    TwoSectors,
}

impl SectorSpan {
    pub fn sectors(&self) -> usize {
        match self {
            SectorSpan::SingleSector => 1,
            SectorSpan::TwoSectors => 2,
        }
    }
}

/// Where an inode record lives in the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodePos {
    pub lba: u32,
    /// Byte offset of the record inside the first sector.
    pub offset: usize,
    pub span: SectorSpan,
}

pub fn locate(sb: &SuperBlock, ino: u32) -> Result<InodePos> {
    if ino >= sb.inode_cnt {
        return Err(FsError::InvalidBlockId);
    }
    let byte_off = ino as usize * INODE_SIZE;
    let offset = byte_off % SECTOR_SIZE;
    let span = if SECTOR_SIZE - offset < INODE_SIZE {
        SectorSpan::TwoSectors
    } else {
        SectorSpan::SingleSector
    };
    Ok(InodePos {
        lba: sb.inode_table_lba + (byte_off / SECTOR_SIZE) as u32,
        offset,
        span,
    })
}

fn read_record(part: &Partition, ino: u32) -> Result<Inode> {
    let pos = locate(&part.sb, ino)?;
    let mut buf = Box::new([0u8; SECTOR_SIZE * 2]);
    let len = pos.span.sectors() * SECTOR_SIZE;
    part.device.read_sectors(pos.lba, &mut buf[..len])?;
    Ok(Inode::decode(&buf[pos.offset..pos.offset + INODE_SIZE]))
}

/// Replaces the on-disk record at `ino` with `raw`, preserving neighbouring records.
fn write_record(part: &Partition, ino: u32, raw: &[u8; INODE_SIZE]) -> Result<()> {
    let pos = locate(&part.sb, ino)?;
    let mut buf = Box::new([0u8; SECTOR_SIZE * 2]);
    let len = pos.span.sectors() * SECTOR_SIZE;
    part.device.read_sectors(pos.lba, &mut buf[..len])?;
    buf[pos.offset..pos.offset + INODE_SIZE].copy_from_slice(raw);
    part.device.write_sectors(pos.lba, &buf[..len])
}

/// Opens an inode, bumping its reference count if already cached.
pub fn inode_open(part: &mut Partition, ino: u32) -> Result<Inode> {
    if let Some(inode) = part.open_inodes.get_mut(&ino) {
        inode.open_cnt += 1;
        return Ok(*inode);
    }
    let mut inode = read_record(part, ino)?;
    inode.open_cnt = 1;
    part.open_inodes.insert(ino, inode);
    Ok(inode)
}

/// Drops one reference; the inode leaves the cache when none remain.
pub fn inode_close(part: &mut Partition, ino: u32) -> Result<()> {
    let inode = part.open_inodes.get_mut(&ino).ok_or(FsError::NotOpen)?;
    inode.open_cnt -= 1;
    if inode.open_cnt == 0 {
        part.open_inodes.remove(&ino);
    }
    Ok(())
}

/// Current cached copy of an open inode.
pub fn cached(part: &Partition, ino: u32) -> Result<Inode> {
    part.open_inodes.get(&ino).copied().ok_or(FsError::NotOpen)
}

/// Stores a modified copy back into the cache, keeping the cache's own reference
/// count and write state.
pub fn update_cached(part: &mut Partition, inode: &Inode) -> Result<()> {
    let slot = part.open_inodes.get_mut(&inode.ino).ok_or(FsError::NotOpen)?;
    let (open_cnt, write_state) = (slot.open_cnt, slot.write_state);
    *slot = *inode;
    slot.open_cnt = open_cnt;
    slot.write_state = write_state;
    Ok(())
}

/// Persists the on-disk part of `inode`.
pub fn inode_sync(part: &Partition, inode: &Inode) -> Result<()> {
    let mut raw = [0u8; INODE_SIZE];
    inode.encode(&mut raw);
    write_record(part, inode.ino, &raw)
}

/// Reclaims everything an inode owns: data blocks, its indirect table,
/// its on-disk record and finally its inode number.
pub fn inode_release(part: &mut Partition, ino: u32) -> Result<()> {
    let mut inode = inode_open(part, ino)?;
    let result = release_blocks(part, &mut inode);
    inode_close(part, ino)?;
    result?;

    write_record(part, ino, &[0u8; INODE_SIZE])?;
    part.free_inode_no(ino)?;
    debug!("{}: released inode {}", part.name, ino);
    Ok(())
}

fn release_blocks(part: &mut Partition, inode: &mut Inode) -> Result<()> {
    let chain = BlockChain::load(part, inode)?;
    for (_, lba) in chain.iter() {
        part.free_block(lba)?;
    }
    if inode.sectors[INDIRECT_SLOT] != 0 {
        part.free_block(inode.sectors[INDIRECT_SLOT])?;
    }
    inode.sectors = [0; NUM_INODE_SLOTS];
    Ok(())
}
