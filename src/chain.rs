//! Block-chain resolver: the logical blocks of an inode, direct and indirect alike.
//!
//! Slots 0..12 mirror the inode's direct pointers, slots 12..140 mirror the
//! indirect table. The chain is rebuilt on every access and never persisted.

use alloc::boxed::Box;

use log::{debug, warn};

use crate::config::*;
use crate::error::FsError;
use crate::partition::Partition;
use crate::structs::Inode;
use crate::Result;

pub struct BlockChain {
    slots: [u32; MAX_FILE_BLOCKS],
}

fn decode_table(buf: &[u8; BLOCK_SIZE], slots: &mut [u32]) {
    for (i, slot) in slots.iter_mut().enumerate() {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[i * 4..i * 4 + 4]);
        *slot = u32::from_le_bytes(raw);
    }
}

fn encode_table(slots: &[u32], buf: &mut [u8; BLOCK_SIZE]) {
    for (i, slot) in slots.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&slot.to_le_bytes());
    }
}

impl BlockChain {
    /// Resolves every block of the inode.
    pub fn load(part: &Partition, inode: &Inode) -> Result<Self> {
        Self::load_upto(part, inode, MAX_FILE_BLOCKS)
    }

    /// Resolves at least the first `blocks` blocks; the indirect table is only
    /// read when the range reaches past the direct pointers.
    pub fn load_upto(part: &Partition, inode: &Inode, blocks: usize) -> Result<Self> {
        let mut slots = [0u32; MAX_FILE_BLOCKS];
        slots[..NUM_DIRECT_PTRS].copy_from_slice(&inode.sectors[..NUM_DIRECT_PTRS]);

        let indirect = inode.sectors[INDIRECT_SLOT];
        if blocks > NUM_DIRECT_PTRS && indirect != 0 {
            let mut buf = Box::new([0u8; BLOCK_SIZE]);
            part.read_block(indirect, &mut buf)?;
            decode_table(&buf, &mut slots[NUM_DIRECT_PTRS..]);
        }
        Ok(Self { slots })
    }

    pub fn get(&self, idx: usize) -> Option<u32> {
        match self.slots.get(idx) {
            Some(&lba) if lba != 0 => Some(lba),
            _ => None,
        }
    }

    /// (logical index, lba) of every present block, in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, lba)| **lba != 0)
            .map(|(idx, lba)| (idx, *lba))
    }

    /// First logical index without a block.
    pub fn first_vacant(&self) -> Option<usize> {
        self.slots.iter().position(|&lba| lba == 0)
    }

    fn write_table(&self, part: &Partition, inode: &Inode) -> Result<()> {
        let mut buf = Box::new([0u8; BLOCK_SIZE]);
        encode_table(&self.slots[NUM_DIRECT_PTRS..], &mut buf);
        part.write_block(inode.sectors[INDIRECT_SLOT], &buf)
    }

    fn set_slot(&mut self, inode: &mut Inode, idx: usize, lba: u32) {
        self.slots[idx] = lba;
        if idx < NUM_DIRECT_PTRS {
            inode.sectors[idx] = lba;
        }
    }

    /// Allocates blocks for logical indices `from..to`.
    /// The indirect table is allocated once, when the range first crosses the
    /// direct pointers, and written once after all new entries are in place.
    /// Blocks allocated before an exhaustion error are not given back.
    pub fn grow(&mut self, part: &mut Partition, inode: &mut Inode, from: usize, to: usize) -> Result<()> {
        if to > MAX_FILE_BLOCKS {
            return Err(FsError::FileTooLarge);
        }
        let mut table_dirty = false;
        let mut result = Ok(());
        for idx in from..to {
            if idx >= NUM_DIRECT_PTRS && inode.sectors[INDIRECT_SLOT] == 0 {
                match part.alloc_block() {
                    Ok(lba) => {
                        inode.sectors[INDIRECT_SLOT] = lba;
                        debug!("inode {}: indirect table @ {:#x}", inode.ino, lba);
                    }
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            match part.alloc_block() {
                Ok(lba) => {
                    self.set_slot(inode, idx, lba);
                    table_dirty |= idx >= NUM_DIRECT_PTRS;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if table_dirty {
            self.write_table(part, inode)?;
        }
        result
    }

    /// Gives the block at logical index `idx` to the inode and returns its LBA.
    /// When the indirect table has to be created for it and the block itself
    /// cannot be allocated, the table is released again.
    pub fn attach(&mut self, part: &mut Partition, inode: &mut Inode, idx: usize) -> Result<u32> {
        if idx >= MAX_FILE_BLOCKS {
            return Err(FsError::FileTooLarge);
        }
        let mut new_table = false;
        if idx >= NUM_DIRECT_PTRS && inode.sectors[INDIRECT_SLOT] == 0 {
            inode.sectors[INDIRECT_SLOT] = part.alloc_block()?;
            new_table = true;
        }
        let lba = match part.alloc_block() {
            Ok(lba) => lba,
            Err(e) => {
                if new_table {
                    warn!("inode {}: rolling back indirect table", inode.ino);
                    part.free_block(inode.sectors[INDIRECT_SLOT])?;
                    inode.sectors[INDIRECT_SLOT] = 0;
                }
                return Err(e);
            }
        };
        self.set_slot(inode, idx, lba);
        if idx >= NUM_DIRECT_PTRS {
            self.write_table(part, inode)?;
        }
        Ok(lba)
    }

    /// Frees the block at logical index `idx` and clears its slot.
    /// An indirect table left without entries is freed as well.
    pub fn detach(&mut self, part: &mut Partition, inode: &mut Inode, idx: usize) -> Result<()> {
        let lba = self.get(idx).ok_or(FsError::InvalidBlockId)?;
        part.free_block(lba)?;
        self.set_slot(inode, idx, 0);
        debug!("inode {}: reclaimed block {} @ {:#x}", inode.ino, idx, lba);

        if idx < NUM_DIRECT_PTRS {
            return Ok(());
        }
        if self.slots[NUM_DIRECT_PTRS..].iter().all(|&lba| lba == 0) {
            part.free_block(inode.sectors[INDIRECT_SLOT])?;
            inode.sectors[INDIRECT_SLOT] = 0;
            debug!("inode {}: reclaimed indirect table", inode.ino);
            Ok(())
        } else {
            self.write_table(part, inode)
        }
    }
}
