//! Reading, writing and laying out the superblock, and formatting a fresh partition.

use alloc::boxed::Box;
use alloc::vec;

use log::info;

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::error::FsError;
use crate::structs::{DirEntry, FileType, Inode};
use crate::{BlockDevice, Result, SuperBlock};

/// Reads the superblock of the partition starting at `part_lba_base`.
pub fn read_superblock(device: &dyn BlockDevice, part_lba_base: u32) -> Result<SuperBlock> {
    let mut buf = Box::new([0u8; SECTOR_SIZE]);
    device.read_sectors(part_lba_base + SUPERBLOCK_OFFSET, buf.as_mut_slice())?;
    let superblock = SuperBlock::decode(&buf);

    if !superblock.is_valid() {
        return Err(FsError::CorruptFormat);
    }
    Ok(superblock)
}

pub fn write_superblock(device: &dyn BlockDevice, superblock: &SuperBlock) -> Result<()> {
    let mut buf = Box::new([0u8; SECTOR_SIZE]);
    superblock.encode(&mut buf);
    device.write_sectors(superblock.superblock_lba(), buf.as_ref())?;
    device.flush()?;
    Ok(())
}

/// Whether the partition already carries a file system.
pub fn is_formatted(device: &dyn BlockDevice, part_lba_base: u32) -> Result<bool> {
    match read_superblock(device, part_lba_base) {
        Ok(_) => Ok(true),
        Err(FsError::CorruptFormat) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Lays down an empty file system holding only the root directory.
/// Everything previously stored in the partition is lost.
pub fn format(device: &dyn BlockDevice, part_lba_base: u32, sec_cnt: u32) -> Result<SuperBlock> {
    if (part_lba_base as usize + sec_cnt as usize) > device.num_sectors() {
        return Err(FsError::InvalidBlockId);
    }
    let sb = SuperBlock::new(part_lba_base, sec_cnt)?;

    info!(
        "format: base {:#x}, {} sectors, {} inodes, block bitmap {} sectors @ {:#x}, \
         inode bitmap {} sectors @ {:#x}, inode table {} sectors @ {:#x}, data @ {:#x}",
        sb.part_lba_base,
        sb.sec_cnt,
        sb.inode_cnt,
        sb.block_bitmap_sects,
        sb.block_bitmap_lba,
        sb.inode_bitmap_sects,
        sb.inode_bitmap_lba,
        sb.inode_table_sects,
        sb.inode_table_lba,
        sb.data_start_lba,
    );

    write_superblock(device, &sb)?;

    // Block bitmap. Bit 0 is the root directory's block. Bits past the last
    // real data block are padding and marked used so they are never handed out.
    let mut block_bitmap = Bitmap::new(sb.block_bitmap_sects as usize * SECTOR_SIZE);
    block_bitmap.set(0, true);
    for bit in sb.data_block_count() as usize..block_bitmap.len_bits() {
        block_bitmap.set(bit, true);
    }
    device.write_sectors(sb.block_bitmap_lba, block_bitmap.as_bytes())?;

    // Inode bitmap. Inode 0 is the root.
    let mut inode_bitmap = Bitmap::new(sb.inode_bitmap_sects as usize * SECTOR_SIZE);
    inode_bitmap.set(ROOT_INODE_ID as usize, true);
    device.write_sectors(sb.inode_bitmap_lba, inode_bitmap.as_bytes())?;

    // Inode table, with only the root record filled in.
    let mut table = vec![0u8; sb.inode_table_sects as usize * SECTOR_SIZE];
    let mut root = Inode::new(ROOT_INODE_ID);
    root.size = 2 * DIR_ENTRY_SIZE as u32;
    root.sectors[0] = sb.data_start_lba;
    let off = ROOT_INODE_ID as usize * INODE_SIZE;
    root.encode(&mut table[off..off + INODE_SIZE]);
    device.write_sectors(sb.inode_table_lba, &table)?;

    // Root directory block: "." and ".." both name the root itself.
    let mut block = Box::new([0u8; BLOCK_SIZE]);
    DirEntry::new(DOT_NAME, ROOT_INODE_ID, FileType::Directory)?.write_slot(&mut block, 0);
    DirEntry::new(DOTDOT_NAME, ROOT_INODE_ID, FileType::Directory)?.write_slot(&mut block, 1);
    device.write_sectors(sb.data_start_lba, block.as_ref())?;

    device.flush()?;
    Ok(sb)
}
