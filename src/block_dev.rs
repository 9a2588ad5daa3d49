use crate::config::SECTOR_SIZE;
use crate::error::FsError;

/// Sector-addressed storage the file system sits on.
/// LBAs are absolute on the device; partitions are carved out by the caller.
pub trait BlockDevice: Send + Sync {
    /// Returns the number of sectors on the device.
    fn num_sectors(&self) -> usize;

    /// Reads `buf.len() / SECTOR_SIZE` consecutive sectors starting at `lba`.
    /// buf.len() must be a non-zero multiple of SECTOR_SIZE.
    fn read_sectors(&self, lba: u32, buf: &mut [u8]) -> Result<(), FsError>;

    /// Writes `buf.len() / SECTOR_SIZE` consecutive sectors starting at `lba`.
    /// buf.len() must be a non-zero multiple of SECTOR_SIZE.
    fn write_sectors(&self, lba: u32, buf: &[u8]) -> Result<(), FsError>;

    /// Flushes any cached data to the device.
    fn flush(&self) -> Result<(), FsError> {
        Ok(())
    }

    /// Returns the size of each sector in bytes.
    fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }
}
