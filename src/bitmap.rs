//! In-memory bitmaps backing block and inode allocation.
//! A set bit means "in use". Each bitmap mirrors its on-disk sectors byte for byte,
//! so a changed bit is persisted by writing back only the sector that holds it.

use alloc::vec;
use alloc::vec::Vec;

use crate::config::*;

#[derive(Debug, Clone)]
pub struct Bitmap {
    bits: Vec<u8>,
}

impl Bitmap {
    /// A zeroed bitmap of `bytes` bytes.
    pub fn new(bytes: usize) -> Self {
        Self { bits: vec![0; bytes] }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bits: bytes }
    }

    /// Clears every bit.
    pub fn init(&mut self) {
        self.bits.fill(0);
    }

    pub fn len_bits(&self) -> usize {
        self.bits.len() * 8
    }

    pub fn test(&self, idx: usize) -> bool {
        self.bits[idx / 8] & (1 << (idx % 8)) != 0
    }

    pub fn set(&mut self, idx: usize, used: bool) {
        let mask = 1u8 << (idx % 8);
        if used {
            self.bits[idx / 8] |= mask;
        } else {
            self.bits[idx / 8] &= !mask;
        }
    }

    /// Finds the first run of `count` consecutive free bits.
    /// Returns the index of the run's first bit without modifying the bitmap.
    pub fn scan(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        // Fully used bytes can be skipped wholesale.
        let first_byte = self.bits.iter().position(|&b| b != 0xff)?;
        let total = self.len_bits();

        let mut run_start = first_byte * 8;
        let mut run_len = 0;
        for idx in first_byte * 8..total {
            if self.test(idx) {
                run_len = 0;
                run_start = idx + 1;
                continue;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        }
        None
    }

    /// Number of clear bits in `0..limit`.
    pub fn count_free(&self, limit: usize) -> usize {
        (0..limit.min(self.len_bits())).filter(|&i| !self.test(i)).count()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Index of the bitmap sector containing bit `idx`.
    pub fn sector_of(idx: usize) -> usize {
        idx / BITS_PER_SECTOR
    }

    /// The sector-sized slice holding bit `idx`, ready to be written back.
    pub fn sector_bytes(&self, idx: usize) -> &[u8] {
        let start = Self::sector_of(idx) * SECTOR_SIZE;
        &self.bits[start..start + SECTOR_SIZE]
    }
}
