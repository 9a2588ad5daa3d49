//! Per-task file state: working directory and the descriptor table that points
//! into the global file table.

use crate::config::*;
use crate::error::FsError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct Task {
    pub cwd_inode: u32,
    fd_table: [Option<usize>; MAX_FILES_OPEN_PER_PROC],
}

impl Task {
    pub fn new() -> Self {
        Self {
            cwd_inode: ROOT_INODE_ID,
            fd_table: [None; MAX_FILES_OPEN_PER_PROC],
        }
    }

    /// Binds a global file table slot to the lowest free descriptor.
    pub(crate) fn install(&mut self, global: usize) -> Result<usize> {
        let fd = self
            .fd_table
            .iter()
            .position(|s| s.is_none())
            .ok_or(FsError::TooManyOpenFiles)?;
        self.fd_table[fd] = Some(global);
        Ok(fd)
    }

    /// Global file table slot behind `fd`.
    pub(crate) fn global(&self, fd: usize) -> Result<usize> {
        self.fd_table
            .get(fd)
            .copied()
            .flatten()
            .ok_or(FsError::BadDescriptor)
    }

    pub(crate) fn release(&mut self, fd: usize) -> Result<usize> {
        self.fd_table
            .get_mut(fd)
            .and_then(|s| s.take())
            .ok_or(FsError::BadDescriptor)
    }

    pub(crate) fn has_free_fd(&self) -> bool {
        self.fd_table.iter().any(|s| s.is_none())
    }

    pub fn open_fds(&self) -> usize {
        self.fd_table.iter().flatten().count()
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}
