use std::sync::Arc;

mod common;

use common::{partition, pattern, setup, RamDisk, DISK_SECTORS, PART_START};
use pion::{
    read_superblock, DiskPartition, Error, FileSystem, FileType, OpenFlags, Task, Whence,
    DIR_ENTRY_SIZE, MAGIC, ROOT_INODE_ID,
};

#[test]
fn test_init_formats_blank_partitions() {
    let disk = Arc::new(RamDisk::new(DISK_SECTORS));
    let half = (DISK_SECTORS as u32 - PART_START) / 2;
    let fs = FileSystem::new(vec![
        DiskPartition::new("sdb1", disk.clone(), PART_START, half),
        DiskPartition::new("sdb2", disk.clone(), PART_START + half, half),
    ]);
    fs.init("sdb1").unwrap();
    assert_eq!(fs.mounted().as_deref(), Some("sdb1"));

    let sb1 = read_superblock(&*disk, PART_START).unwrap();
    let sb2 = read_superblock(&*disk, PART_START + half).unwrap();
    assert_eq!(sb1.magic, MAGIC);
    assert_eq!(sb2.magic, MAGIC);
    assert_eq!(sb2.part_lba_base, PART_START + half);
    assert!(sb1.block_bitmap_lba < sb1.inode_bitmap_lba);
    assert!(sb1.inode_bitmap_lba < sb1.inode_table_lba);
    assert!(sb1.inode_table_lba < sb1.data_start_lba);
    assert_eq!(sb1.root_inode, ROOT_INODE_ID);
    assert_eq!(sb1.dir_entry_size, DIR_ENTRY_SIZE as u32);

    fs.mount("sdb2").unwrap();
    assert_eq!(fs.mounted().as_deref(), Some("sdb2"));
    assert_eq!(fs.mount("sdc9"), Err(Error::NoSuchPartition));
}

#[test]
fn test_fresh_root() {
    let (_disk, fs, task) = setup();
    let st = fs.stat(&task, "/").unwrap();
    assert_eq!(st.ino, ROOT_INODE_ID);
    assert_eq!(st.ftype, FileType::Directory);
    assert_eq!(st.size, 2 * DIR_ENTRY_SIZE as u32);

    let mut dir = fs.opendir(&task, "/").unwrap();
    let dot = fs.readdir(&mut dir).unwrap().unwrap();
    let dotdot = fs.readdir(&mut dir).unwrap().unwrap();
    assert_eq!((dot.name(), dot.ino), (".", ROOT_INODE_ID));
    assert_eq!((dotdot.name(), dotdot.ino), ("..", ROOT_INODE_ID));
    assert!(fs.readdir(&mut dir).unwrap().is_none());
    fs.closedir(dir).unwrap();

    let sb = fs.superblock().unwrap();
    let usage = fs.usage().unwrap();
    assert_eq!(usage.free_blocks, sb.data_block_count() - 1);
    assert_eq!(usage.free_inodes, sb.inode_cnt - 1);
}

#[test]
fn test_ten_megabyte_scenario() {
    let (_disk, fs, mut task) = setup();
    fs.mkdir(&task, "/a").unwrap();

    let data = pattern(2000);
    let fd = fs.open(&mut task, "/a/b.txt", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    assert_eq!(fs.write(&task, fd, &data).unwrap(), 2000);
    fs.close(&mut task, fd).unwrap();

    let fd = fs.open(&mut task, "/a/b.txt", OpenFlags::RDONLY).unwrap();
    let mut buf = vec![0u8; 2000];
    assert_eq!(fs.read(&task, fd, &mut buf).unwrap(), 2000);
    assert_eq!(buf, data);
    fs.close(&mut task, fd).unwrap();

    let st = fs.stat(&task, "/a/b.txt").unwrap();
    assert_eq!(st.ftype, FileType::Regular);
    assert_eq!(st.size, 2000);
    log!("stat /a/b.txt: {:?}", st);
}

#[test]
fn test_remount_persistence() {
    let disk = Arc::new(RamDisk::new(DISK_SECTORS));
    let data = pattern(7000);
    let usage = {
        let fs = FileSystem::new(vec![partition(&disk)]);
        let mut task = Task::new();
        fs.init("sdb1").unwrap();
        fs.mkdir(&task, "/docs").unwrap();
        let fd = fs.open(&mut task, "/docs/big", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
        fs.write(&task, fd, &data).unwrap();
        fs.close(&mut task, fd).unwrap();
        fs.usage().unwrap()
    };

    let fs = FileSystem::new(vec![partition(&disk)]);
    let mut task = Task::new();
    fs.init("sdb1").unwrap();
    assert_eq!(fs.usage().unwrap(), usage);

    let fd = fs.open(&mut task, "/docs/big", OpenFlags::RDONLY).unwrap();
    let mut buf = vec![0u8; data.len()];
    assert_eq!(fs.read(&task, fd, &mut buf).unwrap(), data.len());
    assert_eq!(buf, data);
    assert_eq!(fs.read(&task, fd, &mut buf), Err(Error::EndOfFile));
    fs.close(&mut task, fd).unwrap();
}

#[test]
fn test_mount_formats_bad_magic() {
    let disk = Arc::new(RamDisk::new(DISK_SECTORS));
    let fs = FileSystem::new(vec![partition(&disk)]);
    assert_eq!(fs.superblock(), Err(Error::NotMounted));
    fs.mount("sdb1").unwrap();
    assert_eq!(fs.superblock().unwrap().magic, MAGIC);
}

#[test]
fn test_format_wipes_and_refuses_with_open_files() {
    let (_disk, fs, mut task) = setup();
    fs.mkdir(&task, "/tmp").unwrap();
    let fd = fs.open(&mut task, "/keep", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    assert_eq!(fs.format("sdb1").err(), Some(Error::Busy));
    assert_eq!(fs.mount("sdb1"), Err(Error::Busy));
    fs.close(&mut task, fd).unwrap();

    fs.format("sdb1").unwrap();
    assert_eq!(fs.stat(&task, "/tmp").err(), Some(Error::NotFound));
    assert_eq!(fs.stat(&task, "/keep").err(), Some(Error::NotFound));
}

#[test]
fn test_format_and_mount_refuse_with_open_directory() {
    let (_disk, fs, task) = setup();
    fs.mkdir(&task, "/x").unwrap();
    let dir = fs.opendir(&task, "/x").unwrap();
    assert_eq!(fs.format("sdb1").err(), Some(Error::Busy));
    assert_eq!(fs.mount("sdb1"), Err(Error::Busy));
    assert!(fs.stat(&task, "/x").is_ok());
    fs.closedir(dir).unwrap();

    fs.format("sdb1").unwrap();
    assert_eq!(fs.stat(&task, "/x").err(), Some(Error::NotFound));
}

#[test]
fn test_failed_block_write_keeps_bitmaps() {
    let (disk, fs, task) = setup();
    let data_start = fs.superblock().unwrap().data_start_lba;
    let before = fs.usage().unwrap();

    disk.fail_writes_from(Some(data_start));
    assert_eq!(fs.mkdir(&task, "/d"), Err(Error::IoError));
    disk.fail_writes_from(None);
    assert_eq!(fs.usage().unwrap(), before);
    assert_eq!(fs.stat(&task, "/d").err(), Some(Error::NotFound));

    // The bitmap sectors on disk agree with memory.
    fs.mount("sdb1").unwrap();
    assert_eq!(fs.usage().unwrap(), before);

    fs.mkdir(&task, "/d").unwrap();
    let after = fs.usage().unwrap();
    assert_eq!(after.free_blocks, before.free_blocks - 1);
    assert_eq!(after.free_inodes, before.free_inodes - 1);
}

#[test]
fn test_seek() {
    let (_disk, fs, mut task) = setup();
    let fd = fs.open(&mut task, "/s", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    fs.write(&task, fd, b"0123456789").unwrap();

    assert_eq!(fs.lseek(&task, fd, 4, Whence::Set), Ok(4));
    let mut buf = [0u8; 3];
    fs.read(&task, fd, &mut buf).unwrap();
    assert_eq!(&buf, b"456");
    assert_eq!(fs.lseek(&task, fd, -2, Whence::Cur), Ok(5));
    assert_eq!(fs.lseek(&task, fd, -1, Whence::End), Ok(9));
    let mut buf = [0u8; 8];
    assert_eq!(fs.read(&task, fd, &mut buf), Ok(1));
    assert_eq!(buf[0], b'9');

    assert_eq!(fs.lseek(&task, fd, 0, Whence::End), Ok(10));
    assert_eq!(fs.lseek(&task, fd, 1, Whence::End), Err(Error::InvalidSeek));
    assert_eq!(fs.lseek(&task, fd, -1, Whence::Set), Err(Error::InvalidSeek));
    assert_eq!(fs.lseek(&task, fd, 10, Whence::Cur), Err(Error::InvalidSeek));
    fs.close(&mut task, fd).unwrap();
}
