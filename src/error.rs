use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    IoError,
    InvalidBlockId,
    CorruptFormat,
    PartitionTooSmall,
    NoSuchPartition,
    NotMounted,
    OutOfInodes,
    OutOfSpace,
    TooManyOpenFiles,
    DirectoryFull,
    FileTooLarge,
    NotFound,
    PathNotTraversable,
    AlreadyExists,
    NotDirectory,
    IsDirectory,
    NotEmpty,
    Busy,
    InvalidPath,
    InvalidFileName,
    BadDescriptor,
    NotWritable,
    NotOpen,
    EndOfFile,
    InvalidSeek,
}

impl FsError {
    /// Whether the error means some fixed-size resource ran dry.
    /// Callers treat these as ordinary conditions, not as corruption.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            FsError::OutOfInodes
                | FsError::OutOfSpace
                | FsError::TooManyOpenFiles
                | FsError::DirectoryFull
        )
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::IoError => "block device I/O failed",
            FsError::InvalidBlockId => "sector address out of device range",
            FsError::CorruptFormat => "superblock magic mismatch",
            FsError::PartitionTooSmall => "partition too small to hold the metadata",
            FsError::NoSuchPartition => "no partition with that name",
            FsError::NotMounted => "no partition mounted",
            FsError::OutOfInodes => "no free inode",
            FsError::OutOfSpace => "no free data block",
            FsError::TooManyOpenFiles => "open file table is full",
            FsError::DirectoryFull => "directory cannot grow any further",
            FsError::FileTooLarge => "file would exceed the maximum size",
            FsError::NotFound => "no such file or directory",
            FsError::PathNotTraversable => "path prefix is not traversable",
            FsError::AlreadyExists => "file exists",
            FsError::NotDirectory => "not a directory",
            FsError::IsDirectory => "is a directory",
            FsError::NotEmpty => "directory not empty",
            FsError::Busy => "file is busy",
            FsError::InvalidPath => "invalid path",
            FsError::InvalidFileName => "invalid file name",
            FsError::BadDescriptor => "bad file descriptor",
            FsError::NotWritable => "file not opened for writing",
            FsError::NotOpen => "inode is not open",
            FsError::EndOfFile => "end of file",
            FsError::InvalidSeek => "seek position out of range",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
