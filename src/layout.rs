use super::{DIRECT_COUNT, INDIRECT_COUNT, INODE_MAGIC, NAME_MAX, SECTOR_SIZE};
use bitflags::*;
use core::mem::size_of;

// 教程阅读建议：
// - 先看 `DiskInode`：一个 inode 恰好占一个扇区，字段顺序即磁盘格式；
// - 再看 `IndirectBlock`：间接表就是一个扇区大小的扇区号数组；
// - 最后看 `DirEntry`：目录就是由定长目录项组成的普通文件。

bitflags! {
    /// Flag word stored in every disk inode
    pub struct InodeFlags: u32 {
        /// The inode holds directory entries
        const DIR = 1 << 0;
    }
}

/// A disk inode, exactly one sector in size
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DiskInode {
    /// File size in bytes
    pub length: i32,
    flags: u32,
    /// Sectors of logical blocks `0..123`
    pub direct: [u32; DIRECT_COUNT],
    /// Table covering logical blocks `123..251`
    pub indirect: u32,
    /// Table of tables covering logical blocks `251..16635`
    pub doubly_indirect: u32,
    magic: u32,
}

const _: () = assert!(size_of::<DiskInode>() == SECTOR_SIZE);

impl DiskInode {
    /// A record with every field cleared, magic included
    pub const fn zeroed() -> Self {
        Self {
            length: 0,
            flags: 0,
            direct: [0; DIRECT_COUNT],
            indirect: 0,
            doubly_indirect: 0,
            magic: 0,
        }
    }

    /// A fresh record of `length` bytes with no sectors attached yet
    pub fn new(length: usize, flags: InodeFlags) -> Self {
        let mut disk_inode = Self::zeroed();
        disk_inode.length = length as i32;
        disk_inode.flags = flags.bits();
        disk_inode.magic = INODE_MAGIC;
        disk_inode
    }

    /// Whether the magic matches
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    /// File size in bytes
    pub fn len(&self) -> usize {
        self.length.max(0) as usize
    }

    /// Whether the file holds no bytes
    pub fn is_empty(&self) -> bool {
        self.length <= 0
    }

    /// Flag word
    pub fn flags(&self) -> InodeFlags {
        InodeFlags::from_bits_truncate(self.flags)
    }

    /// Whether this is a directory
    pub fn is_dir(&self) -> bool {
        self.flags().contains(InodeFlags::DIR)
    }

    /// Mark or unmark as a directory
    pub fn set_dir(&mut self, is_dir: bool) {
        let mut flags = self.flags();
        flags.set(InodeFlags::DIR, is_dir);
        self.flags = flags.bits();
    }

    /// Serialize into a slice of u8
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const _ as usize as *const u8, SECTOR_SIZE) }
    }

    /// Serialize into a mutable slice of u8
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut _ as usize as *mut u8, SECTOR_SIZE) }
    }
}

/// One sector worth of sector numbers
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IndirectBlock {
    /// Sector numbers, zero where nothing is allocated
    pub entries: [u32; INDIRECT_COUNT],
}

const _: () = assert!(size_of::<IndirectBlock>() == SECTOR_SIZE);

impl IndirectBlock {
    /// A table with no pointers
    pub const fn zeroed() -> Self {
        Self {
            entries: [0; INDIRECT_COUNT],
        }
    }

    /// Serialize into a slice of u8
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const _ as usize as *const u8, SECTOR_SIZE) }
    }

    /// Serialize into a mutable slice of u8
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut _ as usize as *mut u8, SECTOR_SIZE) }
    }
}

/// Number of sectors needed to hold `length` bytes
pub fn bytes_to_sectors(length: usize) -> usize {
    length.div_ceil(SECTOR_SIZE)
}

/// Number of sectors a file of `length` bytes owns.
///
/// Creation always reserves one sector, so an empty file still owns one.
pub fn allocated_sectors(length: usize) -> usize {
    bytes_to_sectors(length).max(1)
}

/// A directory entry
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DirEntry {
    inode_sector: u32,
    name: [u8; NAME_MAX + 1],
    in_use: u8,
}

/// Size of a directory entry
pub const DIRENT_SZ: usize = size_of::<DirEntry>();

const _: () = assert!(DIRENT_SZ == 20);

impl DirEntry {
    /// Create an empty directory entry
    pub fn empty() -> Self {
        Self {
            inode_sector: 0,
            name: [0u8; NAME_MAX + 1],
            in_use: 0,
        }
    }

    /// Create an in-use entry from name and inode sector.
    /// The name must already be checked against `NAME_MAX`.
    pub fn new(name: &str, inode_sector: u32) -> Self {
        let mut bytes = [0u8; NAME_MAX + 1];
        let len = name.len().min(NAME_MAX);
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            inode_sector,
            name: bytes,
            in_use: 1,
        }
    }

    /// Serialize into bytes
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const _ as usize as *const u8, DIRENT_SZ) }
    }

    /// Serialize into mutable bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut _ as usize as *mut u8, DIRENT_SZ) }
    }

    /// Get name of the entry
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Get inode sector of the entry
    pub fn inode_sector(&self) -> u32 {
        self.inode_sector
    }

    /// Whether the slot holds a live entry
    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }

    /// Free the slot
    pub fn clear(&mut self) {
        *self = Self::empty();
    }
}
