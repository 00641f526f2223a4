//! Open-inode table and byte-level inode I/O.
//!
//! 教程阅读建议：
//!
//! - 先看 `InodeTable::open`：同一个扇区在内存中只有一个 `Inode`，
//!   再次打开只增加引用计数；
//! - 再看 `InodeTable::close`：最后一个持有者关闭时才真正回收被删除的 inode；
//! - 最后看 `InodeHandle::read_at` / `write_at`：按扇区切分读写，写越过文件尾时先扩容。

use super::{
    BlockDevice, DiskInode, FsError, FsResult, InodeFlags, SECTOR_SIZE, SectorAllocator,
    allocated_sectors, bytes_to_sectors,
};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt;
use log::{debug, trace, warn};
use spin::Mutex;

/// The shared in-memory inode behind every handle on one sector
struct Inode {
    sector: u32,
    inner: Mutex<InodeInner>,
}

/// Everything guarded by the per-inode lock.
///
/// The lock is held for the whole of a read or write, so growth of one file
/// is serialized with every other access to it.
struct InodeInner {
    open_cnt: usize,
    removed: bool,
    deny_write_cnt: usize,
    disk_inode: DiskInode,
}

/// Registry of open inodes, at most one per sector
pub struct InodeTable {
    device: Arc<dyn BlockDevice>,
    allocator: Arc<dyn SectorAllocator>,
    open_inodes: Mutex<BTreeMap<u32, Arc<Inode>>>,
}

impl InodeTable {
    /// Create an empty table over `device`, growing files with `allocator`
    pub fn new(device: Arc<dyn BlockDevice>, allocator: Arc<dyn SectorAllocator>) -> Arc<Self> {
        Arc::new(Self {
            device,
            allocator,
            open_inodes: Mutex::new(BTreeMap::new()),
        })
    }

    /// Write a new inode of `length` zero bytes to `sector`.
    ///
    /// At least one data sector is reserved even for an empty file. Nothing
    /// is registered; open the sector to use it.
    pub fn create(&self, sector: u32, length: usize) -> FsResult<()> {
        let mut disk_inode = DiskInode::new(length, InodeFlags::empty());
        disk_inode.extend(
            sector,
            0,
            allocated_sectors(length),
            &*self.device,
            &*self.allocator,
        )
    }

    /// Handle on the inode stored at `sector`.
    ///
    /// Returns the already registered inode with its open count raised when
    /// the sector is open, otherwise reads the record and registers it.
    pub fn open(self: &Arc<Self>, sector: u32) -> FsResult<InodeHandle> {
        let mut open_inodes = self.open_inodes.lock();
        if let Some(inode) = open_inodes.get(&sector) {
            inode.inner.lock().open_cnt += 1;
            return Ok(InodeHandle {
                table: self.clone(),
                inode: inode.clone(),
            });
        }
        let mut disk_inode = DiskInode::zeroed();
        self.device
            .read_block(sector as usize, disk_inode.as_bytes_mut());
        if !disk_inode.is_valid() {
            warn!("inode {sector}: bad magic");
            return Err(FsError::Corrupted);
        }
        let inode = Arc::new(Inode {
            sector,
            inner: Mutex::new(InodeInner {
                open_cnt: 1,
                removed: false,
                deny_write_cnt: 0,
                disk_inode,
            }),
        });
        open_inodes.insert(sector, inode.clone());
        trace!("inode {sector}: opened");
        Ok(InodeHandle {
            table: self.clone(),
            inode,
        })
    }

    /// Number of distinct inodes currently open
    pub fn open_count(&self) -> usize {
        self.open_inodes.lock().len()
    }

    /// Drop one reference; the last one unregisters the inode and, if it was
    /// removed, frees its sectors
    fn close(&self, inode: &Inode) {
        let mut open_inodes = self.open_inodes.lock();
        let mut inner = inode.inner.lock();
        inner.open_cnt -= 1;
        if inner.open_cnt > 0 {
            return;
        }
        open_inodes.remove(&inode.sector);
        drop(open_inodes);
        trace!("inode {}: closed", inode.sector);
        if inner.removed {
            let released = inner
                .disk_inode
                .release_all(&*self.device, &*self.allocator);
            self.allocator.release(inode.sector, 1);
            debug!("inode {}: reclaimed {} sectors", inode.sector, released + 1);
        }
    }
}

/// A counted reference to an open inode.
///
/// Cloning reopens the inode, dropping closes it. Two handles on the same
/// sector compare equal.
pub struct InodeHandle {
    table: Arc<InodeTable>,
    inode: Arc<Inode>,
}

impl InodeHandle {
    /// Sector number of the inode, which is also its inode number
    pub fn inumber(&self) -> u32 {
        self.inode.sector
    }

    /// Another reference to the same inode
    pub fn reopen(&self) -> Self {
        self.clone()
    }

    /// Give this reference up
    pub fn close(self) {}

    /// Number of live handles on this inode
    pub fn open_count(&self) -> usize {
        self.inode.inner.lock().open_cnt
    }

    /// Mark the inode for deletion once its last handle is closed
    pub fn remove(&self) {
        self.inode.inner.lock().removed = true;
    }

    /// Whether [`InodeHandle::remove`] was called on the inode
    pub fn is_removed(&self) -> bool {
        self.inode.inner.lock().removed
    }

    /// Whether the inode is a directory
    pub fn is_dir(&self) -> bool {
        self.inode.inner.lock().disk_inode.is_dir()
    }

    /// Mark the inode as a directory and write the record back
    pub fn set_dir(&self) {
        let mut inner = self.inode.inner.lock();
        inner.disk_inode.set_dir(true);
        self.table
            .device
            .write_block(self.inode.sector as usize, inner.disk_inode.as_bytes());
    }

    /// File size in bytes
    pub fn length(&self) -> usize {
        self.inode.inner.lock().disk_inode.len()
    }

    /// Suppress writes until a matching [`InodeHandle::allow_write`]
    pub fn deny_write(&self) {
        let mut inner = self.inode.inner.lock();
        inner.deny_write_cnt += 1;
        assert!(inner.deny_write_cnt <= inner.open_cnt);
    }

    /// Undo one [`InodeHandle::deny_write`]
    pub fn allow_write(&self) {
        let mut inner = self.inode.inner.lock();
        assert!(inner.deny_write_cnt > 0);
        assert!(inner.deny_write_cnt <= inner.open_cnt);
        inner.deny_write_cnt -= 1;
    }

    /// Number of outstanding write denials
    pub fn deny_write_count(&self) -> usize {
        self.inode.inner.lock().deny_write_cnt
    }

    pub(crate) fn table(&self) -> &Arc<InodeTable> {
        &self.table
    }

    /// Read data from current inode
    ///
    /// Returns the number of bytes read, short at end of file.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let inner = self.inode.inner.lock();
        let device = &*self.table.device;
        let length = inner.disk_inode.len();
        let mut bounce = [0u8; SECTOR_SIZE];
        let mut offset = offset;
        let mut read_size = 0usize;
        while read_size < buf.len() && offset < length {
            let sector = inner.disk_inode.sector_for(offset / SECTOR_SIZE, device);
            let sector_ofs = offset % SECTOR_SIZE;
            let chunk = (buf.len() - read_size)
                .min(length - offset)
                .min(SECTOR_SIZE - sector_ofs);
            let dst = &mut buf[read_size..read_size + chunk];
            if sector_ofs == 0 && chunk == SECTOR_SIZE {
                // 整扇区直接读入调用者缓冲区
                device.read_block(sector as usize, dst);
            } else {
                device.read_block(sector as usize, &mut bounce);
                dst.copy_from_slice(&bounce[sector_ofs..sector_ofs + chunk]);
            }
            offset += chunk;
            read_size += chunk;
        }
        read_size
    }

    /// Write data to current inode
    ///
    /// Grows the file first when the write ends past the sectors it owns,
    /// and records the new length before copying any byte. Returns the number
    /// of bytes written: 0 while writes are denied or when growth fails.
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut inner = self.inode.inner.lock();
        if inner.deny_write_cnt > 0 || buf.is_empty() {
            return 0;
        }
        let device = &*self.table.device;
        let sector = self.inode.sector;
        let Some(end) = offset.checked_add(buf.len()) else {
            return 0;
        };
        let needed = bytes_to_sectors(end);
        let owned = allocated_sectors(inner.disk_inode.len());
        if needed > owned {
            if let Err(err) = inner.disk_inode.extend(
                sector,
                owned,
                needed - owned,
                device,
                &*self.table.allocator,
            ) {
                warn!("inode {sector}: cannot grow to {end} bytes: {err}; sectors taken so far are not returned");
                return 0;
            }
        }
        if end > inner.disk_inode.len() {
            inner.disk_inode.length = end as i32;
            device.write_block(sector as usize, inner.disk_inode.as_bytes());
        }
        let mut bounce = [0u8; SECTOR_SIZE];
        let mut offset = offset;
        let mut write_size = 0usize;
        while write_size < buf.len() {
            let target = inner.disk_inode.sector_for(offset / SECTOR_SIZE, device);
            let sector_ofs = offset % SECTOR_SIZE;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let chunk = (buf.len() - write_size).min(sector_left);
            let src = &buf[write_size..write_size + chunk];
            if sector_ofs == 0 && chunk == SECTOR_SIZE {
                device.write_block(target as usize, src);
            } else {
                // 部分扇区：先读出原内容再覆盖其中一段
                device.read_block(target as usize, &mut bounce);
                bounce[sector_ofs..sector_ofs + chunk].copy_from_slice(src);
                device.write_block(target as usize, &bounce);
            }
            offset += chunk;
            write_size += chunk;
        }
        write_size
    }
}

impl Clone for InodeHandle {
    fn clone(&self) -> Self {
        self.inode.inner.lock().open_cnt += 1;
        Self {
            table: self.table.clone(),
            inode: self.inode.clone(),
        }
    }
}

impl Drop for InodeHandle {
    fn drop(&mut self) {
        self.table.close(&self.inode);
    }
}

impl PartialEq for InodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inode, &other.inode)
    }
}

impl Eq for InodeHandle {}

impl fmt::Debug for InodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inode.inner.lock();
        f.debug_struct("InodeHandle")
            .field("sector", &self.inode.sector)
            .field("open_cnt", &inner.open_cnt)
            .field("removed", &inner.removed)
            .field("length", &inner.disk_inode.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FreeMap;
    use crate::test_util::RamDisk;
    use alloc::vec;
    use alloc::vec::Vec;

    fn setup(sectors: usize) -> (Arc<RamDisk>, Arc<FreeMap>, Arc<InodeTable>) {
        let device = RamDisk::new(sectors);
        let free_map = Arc::new(FreeMap::new(sectors));
        let table = InodeTable::new(device.clone(), free_map.clone());
        (device, free_map, table)
    }

    fn new_file(free_map: &FreeMap, table: &Arc<InodeTable>, length: usize) -> InodeHandle {
        let sector = free_map.allocate(1).unwrap();
        table.create(sector, length).unwrap();
        table.open(sector).unwrap()
    }

    #[test]
    fn opening_twice_shares_one_inode() {
        let (_, free_map, table) = setup(128);
        let sector = free_map.allocate(1).unwrap();
        table.create(sector, 1000).unwrap();
        let first = table.open(sector).unwrap();
        assert_eq!(first.open_count(), 1);
        let second = table.open(sector).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.open_count(), 2);
        assert_eq!(table.open_count(), 1);
        first.close();
        assert_eq!(second.open_count(), 1);
        assert_eq!(table.open_count(), 1);
        second.close();
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn clone_is_reopen() {
        let (_, free_map, table) = setup(64);
        let handle = new_file(&free_map, &table, 0);
        let again = handle.reopen();
        assert_eq!(handle.open_count(), 2);
        drop(again);
        assert_eq!(handle.open_count(), 1);
    }

    #[test]
    fn empty_file_reserves_one_sector() {
        let (_, free_map, table) = setup(64);
        let free = free_map.free_count();
        let handle = new_file(&free_map, &table, 0);
        assert_eq!(handle.length(), 0);
        // the record plus one data sector
        assert_eq!(free_map.free_count(), free - 2);
        // a small write lands in the reserved sector without growing
        assert_eq!(handle.write_at(0, b"hi"), 2);
        assert_eq!(free_map.free_count(), free - 2);
    }

    #[test]
    fn write_past_end_grows_and_zero_fills() {
        let (_, free_map, table) = setup(256);
        let handle = new_file(&free_map, &table, 0);
        let data: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8 + 1).collect();
        assert_eq!(handle.write_at(1000, &data), 300);
        assert_eq!(handle.length(), 1300);

        let mut gap = vec![0xFFu8; 1000];
        assert_eq!(handle.read_at(0, &mut gap), 1000);
        assert!(gap.iter().all(|&b| b == 0));
        let mut back = vec![0u8; 300];
        assert_eq!(handle.read_at(1000, &mut back), 300);
        assert_eq!(back, data);
    }

    #[test]
    fn reads_stop_at_end_of_file() {
        let (device, free_map, table) = setup(64);
        let handle = new_file(&free_map, &table, 10);
        let writes = device.writes();
        let mut buf = [0u8; 64];
        assert_eq!(handle.read_at(4, &mut buf), 6);
        assert_eq!(handle.read_at(10, &mut buf), 0);
        assert_eq!(handle.read_at(500, &mut buf), 0);
        assert_eq!(device.writes(), writes);
    }

    #[test]
    fn aligned_sectors_round_trip() {
        let (_, free_map, table) = setup(256);
        let handle = new_file(&free_map, &table, 0);
        let data: Vec<u8> = (0..SECTOR_SIZE * 3).map(|i| (i * 7) as u8).collect();
        assert_eq!(handle.write_at(0, &data), data.len());
        let mut back = vec![0u8; data.len()];
        assert_eq!(handle.read_at(0, &mut back), data.len());
        assert_eq!(back, data);
        // overwrite the middle of the second sector only
        assert_eq!(handle.write_at(SECTOR_SIZE + 10, &[0xEE; 4]), 4);
        handle.read_at(0, &mut back);
        assert_eq!(&back[SECTOR_SIZE + 10..SECTOR_SIZE + 14], &[0xEE; 4]);
        assert_eq!(back[SECTOR_SIZE + 9], data[SECTOR_SIZE + 9]);
        assert_eq!(back[SECTOR_SIZE + 14], data[SECTOR_SIZE + 14]);
        assert_eq!(handle.length(), data.len());
    }

    #[test]
    fn removal_waits_for_last_close() {
        let (_, free_map, table) = setup(128);
        let free = free_map.free_count();
        let first = new_file(&free_map, &table, 1000);
        let second = first.reopen();
        let in_use = free_map.free_count();
        assert_eq!(in_use, free - 3);

        first.remove();
        assert!(second.is_removed());
        drop(first);
        assert_eq!(free_map.free_count(), in_use);
        drop(second);
        assert_eq!(free_map.free_count(), free);
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn closing_without_removal_keeps_the_data() {
        let (_, free_map, table) = setup(64);
        let handle = new_file(&free_map, &table, 0);
        let sector = handle.inumber();
        handle.write_at(0, b"persistent");
        let free = free_map.free_count();
        drop(handle);
        assert_eq!(free_map.free_count(), free);
        let handle = table.open(sector).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(handle.read_at(0, &mut buf), 10);
        assert_eq!(&buf, b"persistent");
    }

    #[test]
    fn denied_writes_write_nothing() {
        let (_, free_map, table) = setup(64);
        let handle = new_file(&free_map, &table, 4);
        handle.deny_write();
        assert_eq!(handle.write_at(0, b"abcd"), 0);
        assert_eq!(handle.write_at(100, b"abcd"), 0);
        assert_eq!(handle.length(), 4);
        handle.allow_write();
        assert_eq!(handle.write_at(0, b"abcd"), 4);
    }

    #[test]
    #[should_panic]
    fn deny_write_bounded_by_openers() {
        let (_, free_map, table) = setup(64);
        let handle = new_file(&free_map, &table, 4);
        handle.deny_write();
        handle.deny_write();
    }

    #[test]
    fn directory_flag_is_persisted() {
        let (_, free_map, table) = setup(64);
        let handle = new_file(&free_map, &table, 0);
        let sector = handle.inumber();
        assert!(!handle.is_dir());
        handle.set_dir();
        drop(handle);
        assert!(table.open(sector).unwrap().is_dir());
    }

    #[test]
    fn garbage_sector_is_not_an_inode() {
        let (_, free_map, table) = setup(64);
        let sector = free_map.allocate(1).unwrap();
        assert_eq!(table.open(sector).unwrap_err(), FsError::Corrupted);
        assert_eq!(table.open_count(), 0);
    }

    #[test]
    fn failed_growth_writes_nothing() {
        let (_, free_map, table) = setup(8);
        let handle = new_file(&free_map, &table, 0);
        let free = free_map.free_count();
        assert_eq!(handle.write_at(0, &[1u8; SECTOR_SIZE * 16]), 0);
        assert_eq!(handle.length(), 0);
        // the blocks taken before the allocator ran dry leak
        assert!(free_map.free_count() < free);
    }
}
