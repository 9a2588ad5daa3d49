//! Pion is a small inode file system for a teaching kernel.
//! No permissions, timestamps or links; files are plain byte streams of at most 140 blocks.
//!
//! Pion's on-disk layout, per partition:
//! - Boot sector (not ours)
//! - Superblock
//! - Block Bitmap
//! - Inode Bitmap
//! - Inode Table
//! - Data Blocks
//!
//! Pion's layers (from bottom to top):
//! 1. Block Device: sector reads and writes.                   User implemented (hardware-specific)
//! 2. Partition: superblock, bitmaps, open-inode cache.         Bitmap sectors synced on every change
//! 3. Inode / Block chain: inode records and their blocks.      Inode synchronization
//! 4. Directory / Path: entries, lookups and path walks.        Inode synchronization
//! 5. File: open file table, reads, writes and seeks.           Inode synchronization
//! 6. FileSystem: the locked context handed to callers.         One lock for all state

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod config;
mod block_dev;
mod structs;
mod bitmap;
mod superblock;
mod partition;
mod inode;
mod chain;
mod directory;
mod path;
mod file;
mod task;
mod fs;
mod error;

pub use block_dev::BlockDevice;
pub use config::*;
pub use structs::{DirEntry, FileType, Inode, Stat, SuperBlock, WriteState};
pub use superblock::{format, is_formatted, read_superblock, write_superblock};
pub use inode::{locate, InodePos, SectorSpan};
pub use bitmap::Bitmap;
pub use path::{absolute, components, normalize, path_depth, SearchRecord};
pub use directory::Dir;
pub use file::{OpenFlags, Whence};
pub use task::Task;
pub use fs::{DiskPartition, FileSystem, Usage};
pub use error::FsError as Error;
pub use error::Result;
