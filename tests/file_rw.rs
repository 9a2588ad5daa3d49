mod common;

use common::{pattern, setup};
use pion::{Error, FileSystem, OpenFlags, Task, Whence, BLOCK_SIZE, MAX_FILES_OPEN_PER_PROC, MAX_FILE_SIZE, NUM_DIRECT_PTRS};

fn round_trip(fs: &FileSystem, task: &mut Task, path: &str, len: usize) {
    let data = pattern(len);
    let fd = fs.open(task, path, OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    assert_eq!(fs.write(task, fd, &data).unwrap(), len);
    assert_eq!(fs.lseek(task, fd, 0, Whence::Set).unwrap(), 0);
    let mut buf = vec![0u8; len];
    assert_eq!(fs.read(task, fd, &mut buf).unwrap(), len);
    assert_eq!(buf, data, "round trip of {} bytes", len);
    fs.close(task, fd).unwrap();
    assert_eq!(fs.stat(task, path).unwrap().size, len as u32);
}

#[test]
fn test_round_trips() {
    let (_disk, fs, mut task) = setup();
    let boundary = NUM_DIRECT_PTRS * BLOCK_SIZE;
    for (i, len) in [100, BLOCK_SIZE, 2000, boundary, boundary + 1, 20000].into_iter().enumerate() {
        round_trip(&fs, &mut task, &format!("/rt{}", i), len);
    }
}

#[test]
fn test_indirect_block_accounting() {
    let (_disk, fs, mut task) = setup();
    let before = fs.usage().unwrap();

    let fd = fs.open(&mut task, "/f", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    fs.write(&task, fd, &pattern(NUM_DIRECT_PTRS * BLOCK_SIZE)).unwrap();
    assert_eq!(fs.usage().unwrap().free_blocks, before.free_blocks - 12);
    // Crossing into the 13th block also takes the indirect table.
    fs.write(&task, fd, &[1]).unwrap();
    assert_eq!(fs.usage().unwrap().free_blocks, before.free_blocks - 14);
    fs.write(&task, fd, &pattern(BLOCK_SIZE)).unwrap();
    assert_eq!(fs.usage().unwrap().free_blocks, before.free_blocks - 15);
    fs.close(&mut task, fd).unwrap();

    fs.unlink(&task, "/f").unwrap();
    assert_eq!(fs.usage().unwrap(), before);
}

#[test]
fn test_writes_append() {
    let (_disk, fs, mut task) = setup();
    let fd = fs.open(&mut task, "/log", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    fs.write(&task, fd, b"hello").unwrap();
    fs.lseek(&task, fd, 0, Whence::Set).unwrap();
    fs.write(&task, fd, b", world").unwrap();
    // Partial sectors are read back before being extended.
    let tail = pattern(BLOCK_SIZE);
    fs.write(&task, fd, &tail).unwrap();

    fs.lseek(&task, fd, 0, Whence::Set).unwrap();
    let mut buf = vec![0u8; 12 + BLOCK_SIZE];
    assert_eq!(fs.read(&task, fd, &mut buf).unwrap(), 12 + BLOCK_SIZE);
    assert_eq!(&buf[..12], b"hello, world");
    assert_eq!(&buf[12..], &tail[..]);
    fs.close(&mut task, fd).unwrap();
}

#[test]
fn test_size_limit() {
    let (_disk, fs, mut task) = setup();
    let fd = fs.open(&mut task, "/huge", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    let before = fs.usage().unwrap();

    assert_eq!(fs.write(&task, fd, &vec![7u8; MAX_FILE_SIZE + 1]), Err(Error::FileTooLarge));
    assert_eq!(fs.usage().unwrap(), before);

    assert_eq!(fs.write(&task, fd, &vec![7u8; MAX_FILE_SIZE]), Ok(MAX_FILE_SIZE));
    let full = fs.usage().unwrap();
    assert_eq!(fs.write(&task, fd, &[0]), Err(Error::FileTooLarge));
    assert_eq!(fs.usage().unwrap(), full);
    fs.close(&mut task, fd).unwrap();
    assert_eq!(fs.stat(&task, "/huge").unwrap().size, MAX_FILE_SIZE as u32);
}

#[test]
fn test_unlink_busy_then_reuse() {
    let (_disk, fs, mut task) = setup();
    let fd = fs.open(&mut task, "/busy", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    fs.write(&task, fd, b"data").unwrap();
    let ino = fs.stat(&task, "/busy").unwrap().ino;

    assert_eq!(fs.unlink(&task, "/busy"), Err(Error::Busy));
    fs.close(&mut task, fd).unwrap();
    fs.unlink(&task, "/busy").unwrap();
    assert_eq!(fs.stat(&task, "/busy").err(), Some(Error::NotFound));
    assert_eq!(fs.unlink(&task, "/busy"), Err(Error::NotFound));

    let fd = fs.open(&mut task, "/fresh", OpenFlags::CREATE).unwrap();
    fs.close(&mut task, fd).unwrap();
    let st = fs.stat(&task, "/fresh").unwrap();
    assert_eq!(st.ino, ino);
    assert_eq!(st.size, 0);
}

#[test]
fn test_single_writer() {
    let (_disk, fs, mut task) = setup();
    let w = fs.open(&mut task, "/w", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    assert_eq!(fs.open(&mut task, "/w", OpenFlags::RDWR), Err(Error::Busy));
    let r = fs.open(&mut task, "/w", OpenFlags::RDONLY).unwrap();
    assert_eq!(fs.write(&task, r, b"x"), Err(Error::NotWritable));

    // Closing the reader leaves the writer's lock alone.
    fs.close(&mut task, r).unwrap();
    assert_eq!(fs.open(&mut task, "/w", OpenFlags::WRONLY), Err(Error::Busy));

    fs.close(&mut task, w).unwrap();
    let w2 = fs.open(&mut task, "/w", OpenFlags::WRONLY).unwrap();
    fs.close(&mut task, w2).unwrap();
}

#[test]
fn test_double_close() {
    let (_disk, fs, mut task) = setup();
    let fd = fs.open(&mut task, "/c", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    let other = fs.open(&mut task, "/c", OpenFlags::RDONLY).unwrap();
    fs.close(&mut task, fd).unwrap();
    assert_eq!(fs.close(&mut task, fd), Err(Error::BadDescriptor));

    // The remaining reader still pins the inode.
    assert_eq!(fs.unlink(&task, "/c"), Err(Error::Busy));
    fs.close(&mut task, other).unwrap();
    assert_eq!(fs.close(&mut task, other), Err(Error::BadDescriptor));
    fs.unlink(&task, "/c").unwrap();
}

#[test]
fn test_open_errors() {
    let (_disk, fs, mut task) = setup();
    assert_eq!(fs.open(&mut task, "/nope", OpenFlags::RDONLY), Err(Error::NotFound));
    assert_eq!(fs.open(&mut task, "", OpenFlags::RDONLY), Err(Error::InvalidPath));

    let long = "n".repeat(60);
    assert_eq!(fs.open(&mut task, &format!("/{}", long), OpenFlags::CREATE), Err(Error::InvalidFileName));
    let before = fs.usage().unwrap();

    let fd = fs.open(&mut task, "/once", OpenFlags::CREATE).unwrap();
    assert_eq!(fs.open(&mut task, "/once", OpenFlags::CREATE), Err(Error::AlreadyExists));
    fs.close(&mut task, fd).unwrap();
    assert_eq!(fs.usage().unwrap().free_inodes, before.free_inodes - 1);

    let mut buf = [0u8; 4];
    let fd = fs.open(&mut task, "/once", OpenFlags::RDONLY).unwrap();
    assert_eq!(fs.read(&task, fd, &mut buf), Err(Error::EndOfFile));
    fs.close(&mut task, fd).unwrap();
    assert_eq!(fs.read(&task, fd, &mut buf), Err(Error::BadDescriptor));
}

#[test]
fn test_descriptor_exhaustion() {
    let (_disk, fs, mut task) = setup();
    let fd = fs.open(&mut task, "/many", OpenFlags::CREATE).unwrap();
    let mut fds = vec![fd];
    for _ in 1..MAX_FILES_OPEN_PER_PROC {
        fds.push(fs.open(&mut task, "/many", OpenFlags::RDONLY).unwrap());
    }
    assert_eq!(fs.open(&mut task, "/many", OpenFlags::RDONLY), Err(Error::TooManyOpenFiles));
    for fd in fds {
        fs.close(&mut task, fd).unwrap();
    }
    fs.unlink(&task, "/many").unwrap();
}
