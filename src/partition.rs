//! The mounted partition: superblock copy, in-memory bitmaps and the open-inode cache.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use log::{info, warn};

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::error::FsError;
use crate::structs::Inode;
use crate::superblock::read_superblock;
use crate::{BlockDevice, Result, SuperBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapKind {
    Block,
    Inode,
}

pub struct Partition {
    pub(crate) name: String,
    pub(crate) device: Arc<dyn BlockDevice>,
    pub(crate) sb: SuperBlock,
    pub(crate) block_bitmap: Bitmap,
    pub(crate) inode_bitmap: Bitmap,
    /// Open-inode cache keyed by inode number.
    pub(crate) open_inodes: BTreeMap<u32, Inode>,
}

impl Partition {
    /// Reads the superblock and both bitmaps of the partition at `start_lba`.
    pub fn mount(name: &str, device: Arc<dyn BlockDevice>, start_lba: u32) -> Result<Self> {
        let sb = read_superblock(device.as_ref(), start_lba)?;

        let mut block_bits = vec![0u8; sb.block_bitmap_sects as usize * SECTOR_SIZE];
        device.read_sectors(sb.block_bitmap_lba, &mut block_bits)?;
        let mut inode_bits = vec![0u8; sb.inode_bitmap_sects as usize * SECTOR_SIZE];
        device.read_sectors(sb.inode_bitmap_lba, &mut inode_bits)?;

        info!("mount {}: data @ {:#x}, {} data blocks", name, sb.data_start_lba, sb.data_block_count());
        Ok(Self {
            name: String::from(name),
            device,
            sb,
            block_bitmap: Bitmap::from_bytes(block_bits),
            inode_bitmap: Bitmap::from_bytes(inode_bits),
            open_inodes: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    /// Reserves a free inode number and persists the bit.
    pub fn alloc_inode_no(&mut self) -> Result<u32> {
        let ino = match self.inode_bitmap.scan(1) {
            Some(ino) if (ino as u32) < self.sb.inode_cnt => ino,
            _ => {
                warn!("{}: out of inodes", self.name);
                return Err(FsError::OutOfInodes);
            }
        };
        self.inode_bitmap.set(ino, true);
        self.bitmap_sync(BitmapKind::Inode, ino)?;
        Ok(ino as u32)
    }

    pub fn free_inode_no(&mut self, ino: u32) -> Result<()> {
        if ino >= self.sb.inode_cnt {
            return Err(FsError::InvalidBlockId);
        }
        self.inode_bitmap.set(ino as usize, false);
        self.bitmap_sync(BitmapKind::Inode, ino as usize)
    }

    /// Allocates a zeroed data block and returns its LBA.
    pub fn alloc_block(&mut self) -> Result<u32> {
        let bit = match self.block_bitmap.scan(1) {
            Some(bit) if (bit as u32) < self.sb.data_block_count() => bit,
            _ => {
                warn!("{}: out of data blocks", self.name);
                return Err(FsError::OutOfSpace);
            }
        };
        self.block_bitmap.set(bit, true);
        self.bitmap_sync(BitmapKind::Block, bit)?;

        let lba = self.sb.block_addr(bit as u32);
        let zero = Box::new([0u8; BLOCK_SIZE]);
        if let Err(err) = self.write_block(lba, zero.as_ref()) {
            self.block_bitmap.set(bit, false);
            self.bitmap_sync(BitmapKind::Block, bit)?;
            return Err(err);
        }
        Ok(lba)
    }

    pub fn free_block(&mut self, lba: u32) -> Result<()> {
        let bit = self.sb.lba_to_bit(lba)? as usize;
        self.block_bitmap.set(bit, false);
        self.bitmap_sync(BitmapKind::Block, bit)
    }

    /// Writes back the single bitmap sector holding `bit`.
    pub fn bitmap_sync(&self, kind: BitmapKind, bit: usize) -> Result<()> {
        let (bitmap, base) = match kind {
            BitmapKind::Block => (&self.block_bitmap, self.sb.block_bitmap_lba),
            BitmapKind::Inode => (&self.inode_bitmap, self.sb.inode_bitmap_lba),
        };
        let lba = base + Bitmap::sector_of(bit) as u32;
        self.device.write_sectors(lba, bitmap.sector_bytes(bit))
    }

    pub fn read_block(&self, lba: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        self.device.read_sectors(lba, buf.as_mut_slice())
    }

    pub fn write_block(&self, lba: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.device.write_sectors(lba, buf.as_slice())
    }

    /// Whether any inode of this partition is still open.
    pub fn is_busy(&self) -> bool {
        !self.open_inodes.is_empty()
    }

    /// (free data blocks, free inodes)
    pub fn usage(&self) -> (u32, u32) {
        let blocks = self.block_bitmap.count_free(self.sb.data_block_count() as usize);
        let inodes = self.inode_bitmap.count_free(self.sb.inode_cnt as usize);
        (blocks as u32, inodes as u32)
    }
}
