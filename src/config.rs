pub const MAGIC: u32 = 0x19590318;

pub const SECTOR_SIZE: usize = 512;
pub const BLOCK_SIZE: usize = SECTOR_SIZE; // One block is exactly one sector
pub const BITS_PER_SECTOR: usize = SECTOR_SIZE * 8;

pub const BOOT_SECTORS: u32 = 1;
pub const SUPERBLOCK_SECTORS: u32 = 1;
pub const SUPERBLOCK_OFFSET: u32 = BOOT_SECTORS; // Relative to the partition's first sector

pub const MAX_FILES_PER_PART: u32 = 4096; // Inode slots per partition
pub const ROOT_INODE_ID: u32 = 0;
pub const INODE_SIZE: usize = 60; // ino + size + 13 block addresses

pub const NUM_DIRECT_PTRS: usize = 12;
pub const INDIRECT_SLOT: usize = NUM_DIRECT_PTRS; // Inode slot holding the indirect table
pub const NUM_INODE_SLOTS: usize = NUM_DIRECT_PTRS + 1;
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;
pub const MAX_FILE_BLOCKS: usize = NUM_DIRECT_PTRS + PTRS_PER_BLOCK;
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

pub const DIR_ENTRY_SIZE: usize = 64;
pub const MAX_FILE_NAME_LEN: usize = DIR_ENTRY_SIZE - 5; // Name bytes left after inode ID and type
pub const NUM_ENTRY_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;
pub const DOT_NAME: &str = ".";
pub const DOTDOT_NAME: &str = "..";

pub const MAX_PATH_LEN: usize = 512;
pub const MAX_FILES_OPEN: usize = 32; // Global open file table
pub const MAX_FILES_OPEN_PER_PROC: usize = 8;

const _: () = assert!(BLOCK_SIZE % DIR_ENTRY_SIZE == 0);
