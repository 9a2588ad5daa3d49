//! The file system context: registered partitions, the mounted one and the
//! global file table, all behind one lock.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, info, warn};
use spin::Mutex;

use crate::config::MAX_PATH_LEN;
use crate::directory::*;
use crate::error::FsError;
use crate::file::*;
use crate::inode::{inode_close, inode_open, inode_release};
use crate::partition::Partition;
use crate::path::{absolute, file_name, inode_path, search_file, SearchRecord};
use crate::structs::{DirEntry, FileType, Stat};
use crate::superblock::{format, is_formatted};
use crate::task::Task;
use crate::{BlockDevice, Result, SuperBlock};

/// A partition as found in the partition table.
#[derive(Clone)]
pub struct DiskPartition {
    pub name: String,
    pub start_lba: u32,
    pub sec_cnt: u32,
    pub device: Arc<dyn BlockDevice>,
}

impl DiskPartition {
    pub fn new(name: &str, device: Arc<dyn BlockDevice>, start_lba: u32, sec_cnt: u32) -> Self {
        Self {
            name: String::from(name),
            start_lba,
            sec_cnt,
            device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub free_blocks: u32,
    pub free_inodes: u32,
}

struct FsInner {
    cur: Option<Partition>,
    files: FileTable,
}

pub struct FileSystem {
    partitions: Vec<DiskPartition>,
    inner: Mutex<FsInner>,
}

impl FileSystem {
    pub fn new(partitions: Vec<DiskPartition>) -> Self {
        Self {
            partitions,
            inner: Mutex::new(FsInner {
                cur: None,
                files: FileTable::new(),
            }),
        }
    }

    /// Formats every partition that carries no file system yet, then mounts `default`.
    pub fn init(&self, default: &str) -> Result<()> {
        for p in &self.partitions {
            if is_formatted(p.device.as_ref(), p.start_lba)? {
                info!("{}: file system found", p.name);
            } else {
                info!("{}: no file system, formatting", p.name);
                format(p.device.as_ref(), p.start_lba, p.sec_cnt)?;
            }
        }
        self.mount(default)
    }

    fn find(&self, name: &str) -> Result<&DiskPartition> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .ok_or(FsError::NoSuchPartition)
    }

    /// Wipes a partition. A mounted partition is remounted afterwards.
    pub fn format(&self, name: &str) -> Result<SuperBlock> {
        let p = self.find(name)?;
        let mut inner = self.inner.lock();
        let mounted = inner.cur.as_ref().is_some_and(|cur| cur.name == name);
        if mounted && inner.cur.as_ref().is_some_and(Partition::is_busy) {
            warn!("format {}: partition is in use", name);
            return Err(FsError::Busy);
        }
        let sb = format(p.device.as_ref(), p.start_lba, p.sec_cnt)?;
        if mounted {
            inner.cur = Some(Partition::mount(&p.name, p.device.clone(), p.start_lba)?);
        }
        Ok(sb)
    }

    /// Makes `name` the current partition. An unformatted partition is formatted first.
    /// Switching is refused while files or directories are open.
    pub fn mount(&self, name: &str) -> Result<()> {
        let p = self.find(name)?;
        let mut inner = self.inner.lock();
        if inner.files.open_count() > 0 || inner.cur.as_ref().is_some_and(Partition::is_busy) {
            warn!("mount {}: files still open", name);
            return Err(FsError::Busy);
        }
        if !is_formatted(p.device.as_ref(), p.start_lba)? {
            warn!("{}: bad magic, formatting in place", name);
            format(p.device.as_ref(), p.start_lba, p.sec_cnt)?;
        }
        inner.cur = Some(Partition::mount(&p.name, p.device.clone(), p.start_lba)?);
        info!("{} mounted", name);
        Ok(())
    }

    pub fn mounted(&self) -> Option<String> {
        self.inner.lock().cur.as_ref().map(|p| String::from(p.name()))
    }

    pub fn superblock(&self) -> Result<SuperBlock> {
        let inner = self.inner.lock();
        let part = inner.cur.as_ref().ok_or(FsError::NotMounted)?;
        Ok(*part.superblock())
    }

    pub fn usage(&self) -> Result<Usage> {
        let inner = self.inner.lock();
        let part = inner.cur.as_ref().ok_or(FsError::NotMounted)?;
        let (free_blocks, free_inodes) = part.usage();
        Ok(Usage { free_blocks, free_inodes })
    }

    /// Runs `f` on the mounted partition and the file table under the lock.
    fn with<T>(&self, f: impl FnOnce(&mut Partition, &mut FileTable) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock();
        let FsInner { cur, files } = &mut *inner;
        let part = cur.as_mut().ok_or(FsError::NotMounted)?;
        f(part, files)
    }

    /// `path` as an absolute, normalized path seen from `task`.
    fn abs_path(part: &mut Partition, task: &Task, path: &str) -> Result<String> {
        if path.is_empty() || path.len() > MAX_PATH_LEN {
            return Err(FsError::InvalidPath);
        }
        if path.starts_with('/') {
            Ok(absolute("/", path))
        } else {
            Ok(absolute(&inode_path(part, task.cwd_inode)?, path))
        }
    }

    /// Walks `path` and rejects walks that stopped short of its last component.
    fn lookup(part: &mut Partition, task: &Task, path: &str) -> Result<(String, SearchRecord)> {
        let abs = Self::abs_path(part, task, path)?;
        let record = search_file(part, &abs)?;
        record.check_depth(&abs)?;
        Ok((abs, record))
    }

    /// Walks `path` and reports how far it got, without judging the result.
    pub fn resolve(&self, task: &Task, path: &str) -> Result<SearchRecord> {
        self.with(|part, _| {
            let abs = Self::abs_path(part, task, path)?;
            search_file(part, &abs)
        })
    }

    /// Opens (or with `CREATE`, creates) a regular file and returns a task descriptor.
    pub fn open(&self, task: &mut Task, path: &str, flags: OpenFlags) -> Result<usize> {
        if !task.has_free_fd() {
            return Err(FsError::TooManyOpenFiles);
        }
        let global = self.with(|part, files| {
            let (abs, record) = Self::lookup(part, task, path)?;
            match record.ino {
                Some(_) if record.ftype == FileType::Directory => Err(FsError::IsDirectory),
                Some(_) if flags.contains(OpenFlags::CREATE) => Err(FsError::AlreadyExists),
                Some(ino) => file_open(part, files, ino, flags),
                None if flags.contains(OpenFlags::CREATE) => {
                    let name = file_name(&abs).ok_or(FsError::InvalidPath)?;
                    let parent = dir_open(part, record.parent)?;
                    let created = file_create(part, files, record.parent, name, flags);
                    dir_close(part, parent)?;
                    created
                }
                None => Err(FsError::NotFound),
            }
        })?;
        task.install(global)
    }

    pub fn close(&self, task: &mut Task, fd: usize) -> Result<()> {
        let global = task.global(fd)?;
        self.with(|part, files| file_close(part, files, global))?;
        task.release(fd)?;
        Ok(())
    }

    pub fn read(&self, task: &Task, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let global = task.global(fd)?;
        self.with(|part, files| file_read(part, files.get_mut(global)?, buf))
    }

    pub fn write(&self, task: &Task, fd: usize, buf: &[u8]) -> Result<usize> {
        let global = task.global(fd)?;
        self.with(|part, files| {
            let file = files.get_mut(global)?;
            if !file.flags.writable() {
                return Err(FsError::NotWritable);
            }
            file_write(part, file, buf)
        })
    }

    pub fn lseek(&self, task: &Task, fd: usize, offset: i64, whence: Whence) -> Result<u32> {
        let global = task.global(fd)?;
        self.with(|part, files| file_seek(part, files.get_mut(global)?, offset, whence))
    }

    /// Removes a regular file. Fails with `Busy` while anything holds it open.
    pub fn unlink(&self, task: &Task, path: &str) -> Result<()> {
        self.with(|part, files| {
            let (abs, record) = Self::lookup(part, task, path)?;
            let ino = record.ino.ok_or(FsError::NotFound)?;
            if record.ftype == FileType::Directory {
                return Err(FsError::IsDirectory);
            }
            if files.is_open(ino) || part.open_inodes.contains_key(&ino) {
                warn!("unlink {}: file is open", abs);
                return Err(FsError::Busy);
            }
            let parent = dir_open(part, record.parent)?;
            let removed = delete_dir_entry(part, record.parent, ino).and_then(|_| inode_release(part, ino));
            dir_close(part, parent)?;
            removed?;
            debug!("unlink {} (inode {})", abs, ino);
            Ok(())
        })
    }

    pub fn mkdir(&self, task: &Task, path: &str) -> Result<()> {
        self.with(|part, _| {
            let (abs, record) = Self::lookup(part, task, path)?;
            if record.ino.is_some() {
                return Err(FsError::AlreadyExists);
            }
            let name = file_name(&abs).ok_or(FsError::InvalidPath)?;
            let parent = dir_open(part, record.parent)?;
            let created = dir_create(part, record.parent, name);
            dir_close(part, parent)?;
            created.map(|_| ())
        })
    }

    /// Removes an empty directory other than the root.
    pub fn rmdir(&self, task: &Task, path: &str) -> Result<()> {
        self.with(|part, _| {
            let (abs, record) = Self::lookup(part, task, path)?;
            let ino = record.ino.ok_or(FsError::NotFound)?;
            if record.ftype != FileType::Directory {
                return Err(FsError::NotDirectory);
            }
            if ino == part.sb.root_inode {
                return Err(FsError::InvalidPath);
            }
            if part.open_inodes.contains_key(&ino) {
                warn!("rmdir {}: directory is open", abs);
                return Err(FsError::Busy);
            }
            if !dir_is_empty(part, ino)? {
                return Err(FsError::NotEmpty);
            }
            let parent = dir_open(part, record.parent)?;
            let removed = dir_remove(part, record.parent, ino);
            dir_close(part, parent)?;
            removed?;
            debug!("rmdir {} (inode {})", abs, ino);
            Ok(())
        })
    }

    /// Opens a directory for enumeration. The handle goes back through `closedir`.
    pub fn opendir(&self, task: &Task, path: &str) -> Result<Dir> {
        self.with(|part, _| {
            let (_, record) = Self::lookup(part, task, path)?;
            let ino = record.ino.ok_or(FsError::NotFound)?;
            if record.ftype != FileType::Directory {
                return Err(FsError::NotDirectory);
            }
            dir_open(part, ino)
        })
    }

    pub fn closedir(&self, dir: Dir) -> Result<()> {
        self.with(|part, _| dir_close(part, dir))
    }

    /// Next entry of the directory, "." and ".." included.
    pub fn readdir(&self, dir: &mut Dir) -> Result<Option<DirEntry>> {
        self.with(|part, _| dir_read(part, dir))
    }

    pub fn rewinddir(&self, dir: &mut Dir) {
        dir.rewind();
    }

    pub fn chdir(&self, task: &mut Task, path: &str) -> Result<()> {
        let ino = self.with(|part, _| {
            let (_, record) = Self::lookup(part, task, path)?;
            let ino = record.ino.ok_or(FsError::NotFound)?;
            if record.ftype != FileType::Directory {
                return Err(FsError::NotDirectory);
            }
            Ok(ino)
        })?;
        task.cwd_inode = ino;
        Ok(())
    }

    pub fn getcwd(&self, task: &Task) -> Result<String> {
        self.with(|part, _| inode_path(part, task.cwd_inode))
    }

    pub fn stat(&self, task: &Task, path: &str) -> Result<Stat> {
        self.with(|part, _| {
            let (_, record) = Self::lookup(part, task, path)?;
            let ino = record.ino.ok_or(FsError::NotFound)?;
            let inode = inode_open(part, ino)?;
            inode_close(part, ino)?;
            Ok(Stat {
                ino,
                size: inode.size,
                ftype: record.ftype,
            })
        })
    }
}
