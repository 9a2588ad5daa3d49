//! Common utilities for tests

#![allow(unused)]

use std::sync::{Arc, Mutex};

use pion::{BlockDevice, DiskPartition, Error, FileSystem, Task, SECTOR_SIZE};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// 10 MiB worth of sectors.
pub const DISK_SECTORS: usize = 20480;
/// Sector 0 stands in for the MBR.
pub const PART_START: u32 = 1;

pub struct RamDisk {
    inner: Mutex<Vec<u8>>,
    num_sectors: usize,
    /// Writes starting at or past this LBA fail with `IoError`.
    fail_from: Mutex<Option<u32>>,
}

impl RamDisk {
    /// Creates a zeroed RamDisk of `num_sectors` sectors.
    pub fn new(num_sectors: usize) -> Self {
        RamDisk {
            inner: Mutex::new(vec![0u8; num_sectors * SECTOR_SIZE]),
            num_sectors,
            fail_from: Mutex::new(None),
        }
    }

    /// Makes every write at or past `lba` fail until cleared with `None`.
    pub fn fail_writes_from(&self, lba: Option<u32>) {
        *self.fail_from.lock().unwrap() = lba;
    }

    fn range(&self, lba: u32, len: usize) -> Result<std::ops::Range<usize>, Error> {
        if len == 0 || len % SECTOR_SIZE != 0 {
            return Err(Error::IoError);
        }
        let start = lba as usize * SECTOR_SIZE;
        let end = start + len;
        if end > self.num_sectors * SECTOR_SIZE {
            return Err(Error::InvalidBlockId);
        }
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk {
    fn num_sectors(&self) -> usize {
        self.num_sectors
    }

    fn read_sectors(&self, lba: u32, buf: &mut [u8]) -> Result<(), Error> {
        let range = self.range(lba, buf.len())?;
        let data = self.inner.lock().unwrap();
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_sectors(&self, lba: u32, buf: &[u8]) -> Result<(), Error> {
        let range = self.range(lba, buf.len())?;
        if self.fail_from.lock().unwrap().is_some_and(|from| lba >= from) {
            return Err(Error::IoError);
        }
        let mut data = self.inner.lock().unwrap();
        data[range].copy_from_slice(buf);
        Ok(())
    }
}

pub fn partition(disk: &Arc<RamDisk>) -> DiskPartition {
    DiskPartition::new("sdb1", disk.clone(), PART_START, DISK_SECTORS as u32 - PART_START)
}

/// A fresh 10 MiB disk with one partition, formatted and mounted.
pub fn setup() -> (Arc<RamDisk>, FileSystem, Task) {
    let disk = Arc::new(RamDisk::new(DISK_SECTORS));
    let fs = FileSystem::new(vec![partition(&disk)]);
    fs.init("sdb1").unwrap();
    (disk, fs, Task::new())
}

/// Deterministic test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}
