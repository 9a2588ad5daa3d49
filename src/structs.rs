//! On-disk records and their byte-level encoding.
//! Every multi-byte field is little-endian; records never rely on Rust layout.

use crate::config::*;
use crate::error::FsError;
use crate::Result;

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn div_round_up(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

/// Persisted partition descriptor, one zero-padded sector right after the boot sector.
/// All LBAs are absolute device addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub sec_cnt: u32,
    pub inode_cnt: u32,
    pub part_lba_base: u32,

    pub block_bitmap_lba: u32,
    pub block_bitmap_sects: u32,
    pub inode_bitmap_lba: u32,
    pub inode_bitmap_sects: u32,
    pub inode_table_lba: u32,
    pub inode_table_sects: u32,

    pub data_start_lba: u32,
    pub root_inode: u32,
    pub dir_entry_size: u32,
}

impl SuperBlock {
    const NUM_FIELDS: usize = 13;

    /// Lays out a fresh partition of `sec_cnt` sectors starting at `part_lba_base`.
    pub fn new(part_lba_base: u32, sec_cnt: u32) -> Result<Self> {
        let inode_bitmap_sects = div_round_up(MAX_FILES_PER_PART, BITS_PER_SECTOR as u32);
        let inode_table_sects =
            div_round_up(MAX_FILES_PER_PART * INODE_SIZE as u32, SECTOR_SIZE as u32);
        let (block_bitmap_sects, data_bits) =
            Self::block_bitmap_geometry(sec_cnt, inode_bitmap_sects, inode_table_sects)?;
        // At least the root directory's block must fit.
        if data_bits == 0 {
            return Err(FsError::PartitionTooSmall);
        }

        let block_bitmap_lba = part_lba_base + BOOT_SECTORS + SUPERBLOCK_SECTORS;
        let inode_bitmap_lba = block_bitmap_lba + block_bitmap_sects;
        let inode_table_lba = inode_bitmap_lba + inode_bitmap_sects;
        Ok(Self {
            magic: MAGIC,
            sec_cnt,
            inode_cnt: MAX_FILES_PER_PART,
            part_lba_base,
            block_bitmap_lba,
            block_bitmap_sects,
            inode_bitmap_lba,
            inode_bitmap_sects,
            inode_table_lba,
            inode_table_sects,
            data_start_lba: inode_table_lba + inode_table_sects,
            root_inode: ROOT_INODE_ID,
            dir_entry_size: DIR_ENTRY_SIZE as u32,
        })
    }

    /// Sizes the block bitmap against the sectors left after fixed metadata.
    /// Returns (bitmap sectors, number of data blocks the bitmap tracks).
    fn block_bitmap_geometry(
        sec_cnt: u32,
        inode_bitmap_sects: u32,
        inode_table_sects: u32,
    ) -> Result<(u32, u32)> {
        let used = BOOT_SECTORS + SUPERBLOCK_SECTORS + inode_bitmap_sects + inode_table_sects;
        if sec_cnt <= used + 1 {
            return Err(FsError::PartitionTooSmall);
        }
        let free = sec_cnt - used;
        // The bitmap eats into the sectors it tracks, so size it twice.
        let first_guess = div_round_up(free, BITS_PER_SECTOR as u32);
        let data_bits = free - first_guess;
        Ok((div_round_up(data_bits, BITS_PER_SECTOR as u32), data_bits))
    }

    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// Number of data blocks tracked by the block bitmap.
    /// Bits beyond this count are padding and stay marked as used.
    pub fn data_block_count(&self) -> u32 {
        Self::block_bitmap_geometry(self.sec_cnt, self.inode_bitmap_sects, self.inode_table_sects)
            .map(|(_, bits)| bits)
            .unwrap_or(0)
    }

    /// LBA of the data block tracked by bit `bit` of the block bitmap.
    pub fn block_addr(&self, bit: u32) -> u32 {
        self.data_start_lba + bit
    }

    /// Block bitmap bit tracking the data block at `lba`.
    pub fn lba_to_bit(&self, lba: u32) -> Result<u32> {
        if lba < self.data_start_lba || lba - self.data_start_lba >= self.data_block_count() {
            return Err(FsError::InvalidBlockId);
        }
        Ok(lba - self.data_start_lba)
    }

    pub fn superblock_lba(&self) -> u32 {
        self.part_lba_base + SUPERBLOCK_OFFSET
    }

    pub fn decode(buf: &[u8; SECTOR_SIZE]) -> Self {
        let f = |i: usize| get_u32(buf, i * 4);
        Self {
            magic: f(0),
            sec_cnt: f(1),
            inode_cnt: f(2),
            part_lba_base: f(3),
            block_bitmap_lba: f(4),
            block_bitmap_sects: f(5),
            inode_bitmap_lba: f(6),
            inode_bitmap_sects: f(7),
            inode_table_lba: f(8),
            inode_table_sects: f(9),
            data_start_lba: f(10),
            root_inode: f(11),
            dir_entry_size: f(12),
        }
    }

    pub fn encode(&self, buf: &mut [u8; SECTOR_SIZE]) {
        let fields: [u32; Self::NUM_FIELDS] = [
            self.magic,
            self.sec_cnt,
            self.inode_cnt,
            self.part_lba_base,
            self.block_bitmap_lba,
            self.block_bitmap_sects,
            self.inode_bitmap_lba,
            self.inode_bitmap_sects,
            self.inode_table_lba,
            self.inode_table_sects,
            self.data_start_lba,
            self.root_inode,
            self.dir_entry_size,
        ];
        buf.fill(0);
        for (i, value) in fields.iter().enumerate() {
            put_u32(buf, i * 4, *value);
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown = 0, // Also marks a free directory slot
    Regular = 1,
    Directory = 2,
}

impl From<u8> for FileType {
    fn from(raw: u8) -> Self {
        match raw {
            1 => FileType::Regular,
            2 => FileType::Directory,
            _ => FileType::Unknown,
        }
    }
}

/// Exclusive-writer state of an open inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteState {
    #[default]
    Idle,
    WriteLocked,
}

/// An inode as held in memory.
/// Only `ino`, `size` and `sectors` reach the disk; the rest lives in the open-inode cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub ino: u32,
    /// File length in bytes, or the sum of live entry sizes for a directory.
    pub size: u32,
    /// 0..12 are direct block LBAs, 12 is the LBA of the indirect table.
    pub sectors: [u32; NUM_INODE_SLOTS],
    pub(crate) open_cnt: u32,
    pub(crate) write_state: WriteState,
}

impl Inode {
    pub fn new(ino: u32) -> Self {
        Self {
            ino,
            size: 0,
            sectors: [0; NUM_INODE_SLOTS],
            open_cnt: 0,
            write_state: WriteState::Idle,
        }
    }

    /// Number of blocks needed to hold `size` bytes.
    pub fn blocks_for(size: usize) -> usize {
        (size + BLOCK_SIZE - 1) / BLOCK_SIZE
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut inode = Self::new(get_u32(buf, 0));
        inode.size = get_u32(buf, 4);
        for (i, slot) in inode.sectors.iter_mut().enumerate() {
            *slot = get_u32(buf, 8 + i * 4);
        }
        inode
    }

    /// Writes the persisted part of the inode into `buf[..INODE_SIZE]`.
    /// The open count and write state never reach the disk.
    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.ino);
        put_u32(buf, 4, self.size);
        for (i, slot) in self.sectors.iter().enumerate() {
            put_u32(buf, 8 + i * 4, *slot);
        }
    }
}

/// Fixed-size directory record. Never straddles a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; MAX_FILE_NAME_LEN],
    pub ino: u32,
    pub ftype: FileType,
}

impl DirEntry {
    pub const NULL: Self = Self {
        name: [0; MAX_FILE_NAME_LEN],
        ino: 0,
        ftype: FileType::Unknown,
    };

    pub fn new(name: &str, ino: u32, ftype: FileType) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_FILE_NAME_LEN || bytes.contains(&b'/') || bytes.contains(&0) {
            return Err(FsError::InvalidFileName);
        }
        let mut entry = Self::NULL;
        entry.name[..bytes.len()].copy_from_slice(bytes);
        entry.ino = ino;
        entry.ftype = ftype;
        Ok(entry)
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(MAX_FILE_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn name_eq(&self, name: &str) -> bool {
        self.name() == name
    }

    /// A slot whose type is unknown is free for reuse.
    pub fn is_free(&self) -> bool {
        self.ftype == FileType::Unknown
    }

    pub fn is_dot(&self) -> bool {
        self.name_eq(DOT_NAME) || self.name_eq(DOTDOT_NAME)
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut entry = Self::NULL;
        entry.name.copy_from_slice(&buf[..MAX_FILE_NAME_LEN]);
        entry.ino = get_u32(buf, MAX_FILE_NAME_LEN);
        entry.ftype = FileType::from(buf[MAX_FILE_NAME_LEN + 4]);
        entry
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..MAX_FILE_NAME_LEN].copy_from_slice(&self.name);
        put_u32(buf, MAX_FILE_NAME_LEN, self.ino);
        buf[MAX_FILE_NAME_LEN + 4] = self.ftype as u8;
    }

    /// Decodes the `slot`-th entry of a directory block.
    pub fn read_slot(block: &[u8; BLOCK_SIZE], slot: usize) -> Self {
        let off = slot * DIR_ENTRY_SIZE;
        Self::decode(&block[off..off + DIR_ENTRY_SIZE])
    }

    pub fn write_slot(&self, block: &mut [u8; BLOCK_SIZE], slot: usize) {
        let off = slot * DIR_ENTRY_SIZE;
        self.encode(&mut block[off..off + DIR_ENTRY_SIZE]);
    }
}

/// Result of `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub ino: u32,
    pub size: u32,
    pub ftype: FileType,
}
