//! Path parsing and resolution.
//! All resolution starts at the root; relative paths are joined onto a working
//! directory with `absolute` before they reach the resolver.

use alloc::string::String;
use alloc::vec::Vec;

use crate::config::*;
use crate::directory::{dir_child_name, dir_close, dir_open, dir_parent, search_dir_entry};
use crate::error::FsError;
use crate::partition::Partition;
use crate::structs::FileType;
use crate::Result;

/// Non-empty components of `path`, skipping repeated separators.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

pub fn path_depth(path: &str) -> usize {
    components(path).count()
}

/// Last component of `path`, if any.
pub fn file_name(path: &str) -> Option<&str> {
    components(path).last()
}

/// Lexically collapses "." and ".." in an absolute path. ".." at the root stays at the root.
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for comp in components(path) {
        match comp {
            "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(comp),
        }
    }
    join(&stack)
}

/// Resolves `path` against the working directory `cwd` and normalizes it.
pub fn absolute(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        return normalize(path);
    }
    let mut joined = String::from(cwd);
    joined.push('/');
    joined.push_str(path);
    normalize(&joined)
}

fn join(parts: &[&str]) -> String {
    if parts.is_empty() {
        return String::from("/");
    }
    let mut out = String::new();
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// What a path walk reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    /// The components that were matched, as an absolute path.
    pub path: String,
    /// Directory in which the last component was looked up.
    pub parent: u32,
    pub ftype: FileType,
    /// Inode of the final component when the whole walk succeeded or stopped at a file.
    pub ino: Option<u32>,
}

impl SearchRecord {
    pub fn depth(&self) -> usize {
        path_depth(&self.path)
    }

    /// Checks the walk against the depth of the requested path.
    /// A missing final component is fine here; anything that stopped earlier means
    /// the prefix could not be walked.
    pub fn check_depth(&self, requested: &str) -> Result<()> {
        let want = path_depth(requested);
        let reached = match self.ino {
            Some(_) => self.depth(),
            None => self.depth() + 1,
        };
        if want == reached {
            Ok(())
        } else {
            Err(FsError::PathNotTraversable)
        }
    }
}

/// Walks an absolute path from the root directory.
/// Stops at the first regular file or missing component; the returned record says where.
pub fn search_file(part: &mut Partition, path: &str) -> Result<SearchRecord> {
    if !path.starts_with('/') || path.len() > MAX_PATH_LEN {
        return Err(FsError::InvalidPath);
    }
    let root = part.sb.root_inode;
    let mut record = SearchRecord {
        path: String::new(),
        parent: root,
        ftype: FileType::Directory,
        ino: Some(root),
    };
    if matches!(path, "/" | "/." | "/..") {
        record.path.push('/');
        return Ok(record);
    }

    let mut dir = dir_open(part, root)?;
    for name in components(path) {
        let found = match search_dir_entry(part, dir.ino(), name) {
            Ok(found) => found,
            Err(e) => {
                dir_close(part, dir)?;
                return Err(e);
            }
        };
        let Some(entry) = found else {
            break;
        };
        record.path.push('/');
        record.path.push_str(name);
        record.parent = dir.ino();
        match entry.ftype {
            FileType::Directory => {
                dir_close(part, dir)?;
                dir = dir_open(part, entry.ino)?;
                record.ftype = FileType::Directory;
                record.ino = Some(entry.ino);
            }
            _ => {
                record.ftype = FileType::Regular;
                record.ino = Some(entry.ino);
                break;
            }
        }
    }
    // A miss after a successful descent looked the name up in `dir`.
    if record.depth() < path_depth(path) && record.ftype != FileType::Regular {
        record.parent = dir.ino();
        record.ino = None;
        record.ftype = FileType::Unknown;
    }
    dir_close(part, dir)?;
    if record.path.is_empty() {
        record.path.push('/');
    }
    Ok(record)
}

/// Absolute path of the directory `ino`, rebuilt by climbing ".." entries.
pub fn inode_path(part: &mut Partition, ino: u32) -> Result<String> {
    let root = part.sb.root_inode;
    let mut names: Vec<String> = Vec::new();
    let mut cur = ino;
    while cur != root {
        let parent = dir_parent(part, cur)?;
        names.push(dir_child_name(part, parent, cur)?);
        cur = parent;
    }
    let parts: Vec<&str> = names.iter().rev().map(|n| n.as_str()).collect();
    let path = join(&parts);
    if path.len() > MAX_PATH_LEN {
        return Err(FsError::InvalidPath);
    }
    Ok(path)
}
