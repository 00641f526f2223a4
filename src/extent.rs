//! Logical block to sector translation and file growth.
//!
//! 教程阅读建议：
//!
//! - 先看 `sector_for`：逻辑块号 -> 直接指针 / 一级间接表 / 二级间接表；
//! - 再看 `extend`：按需分配数据扇区和间接表，每个新扇区先写零再挂入索引；
//! - 最后看 `release_all`：删除文件时沿同一棵索引树把扇区还给空闲表。

use super::{
    BlockDevice, DIRECT_COUNT, DOUBLY_START, DiskInode, FsError, FsResult, INDIRECT_COUNT,
    IndirectBlock, MAX_FILE_SECTORS, SECTOR_SIZE, SectorAllocator, allocated_sectors,
};
use alloc::collections::BTreeMap;
use alloc::collections::btree_map::Entry;

static ZEROS: [u8; SECTOR_SIZE] = [0; SECTOR_SIZE];

impl IndirectBlock {
    /// Read the table stored at `sector`
    pub(crate) fn load(sector: u32, device: &dyn BlockDevice) -> Self {
        let mut table = Self::zeroed();
        device.read_block(sector as usize, table.as_bytes_mut());
        table
    }

    /// Read the table `pointer` refers to, or allocate a fresh one and store
    /// its sector in `pointer`
    fn load_or_allocate(
        pointer: &mut u32,
        device: &dyn BlockDevice,
        allocator: &dyn SectorAllocator,
    ) -> FsResult<Self> {
        if *pointer != 0 {
            Ok(Self::load(*pointer, device))
        } else {
            *pointer = allocate_zeroed(device, allocator)?;
            Ok(Self::zeroed())
        }
    }
}

/// Take one sector from the allocator and clear it on disk
fn allocate_zeroed(device: &dyn BlockDevice, allocator: &dyn SectorAllocator) -> FsResult<u32> {
    let sector = allocator.allocate(1).ok_or(FsError::NoSpace)?;
    device.write_block(sector as usize, &ZEROS);
    Ok(sector)
}

/// The in-memory copy of a table, loading it on first use
fn cached<'a>(
    cache: &'a mut Option<IndirectBlock>,
    pointer: &mut u32,
    device: &dyn BlockDevice,
    allocator: &dyn SectorAllocator,
) -> FsResult<&'a mut IndirectBlock> {
    if cache.is_none() {
        *cache = Some(IndirectBlock::load_or_allocate(pointer, device, allocator)?);
    }
    Ok(cache.get_or_insert_with(IndirectBlock::zeroed))
}

impl DiskInode {
    /// Sector holding logical block `index`, or 0 where nothing is allocated.
    ///
    /// Blocks past the direct range cost one (indirect) or two (doubly
    /// indirect) extra sector reads; tables are never cached.
    pub fn sector_for(&self, index: usize, device: &dyn BlockDevice) -> u32 {
        assert!(index < MAX_FILE_SECTORS, "logical block {index} out of range");
        if index < DIRECT_COUNT {
            return self.direct[index];
        }
        if index < DOUBLY_START {
            if self.indirect == 0 {
                return 0;
            }
            return IndirectBlock::load(self.indirect, device).entries[index - DIRECT_COUNT];
        }
        if self.doubly_indirect == 0 {
            return 0;
        }
        let index = index - DOUBLY_START;
        let doubly = IndirectBlock::load(self.doubly_indirect, device);
        let child = doubly.entries[index / INDIRECT_COUNT];
        if child == 0 {
            return 0;
        }
        IndirectBlock::load(child, device).entries[index % INDIRECT_COUNT]
    }

    /// Allocate `count` zero-filled blocks starting at logical block `start`,
    /// then write the touched tables and this record (at `sector`) to disk.
    ///
    /// If the allocator runs dry part way, the sectors already taken by this
    /// call are not given back and the record is not written.
    pub fn extend(
        &mut self,
        sector: u32,
        start: usize,
        count: usize,
        device: &dyn BlockDevice,
        allocator: &dyn SectorAllocator,
    ) -> FsResult<()> {
        if count == 0 {
            return Ok(());
        }
        let end = start.checked_add(count).ok_or(FsError::FileTooLarge)?;
        if end > MAX_FILE_SECTORS {
            return Err(FsError::FileTooLarge);
        }
        let mut indirect: Option<IndirectBlock> = None;
        let mut doubly: Option<IndirectBlock> = None;
        // 只加载本次扩容真正触及的二级子表
        let mut children: BTreeMap<usize, IndirectBlock> = BTreeMap::new();
        for index in start..end {
            let slot = if index < DIRECT_COUNT {
                &mut self.direct[index]
            } else if index < DOUBLY_START {
                let table = cached(&mut indirect, &mut self.indirect, device, allocator)?;
                &mut table.entries[index - DIRECT_COUNT]
            } else {
                let index = index - DOUBLY_START;
                let top = cached(&mut doubly, &mut self.doubly_indirect, device, allocator)?;
                let child = match children.entry(index / INDIRECT_COUNT) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(IndirectBlock::load_or_allocate(
                        &mut top.entries[index / INDIRECT_COUNT],
                        device,
                        allocator,
                    )?),
                };
                &mut child.entries[index % INDIRECT_COUNT]
            };
            *slot = allocate_zeroed(device, allocator)?;
        }
        if let Some(table) = &indirect {
            device.write_block(self.indirect as usize, table.as_bytes());
        }
        if let Some(top) = &doubly {
            device.write_block(self.doubly_indirect as usize, top.as_bytes());
            for (&slot, child) in children.iter() {
                device.write_block(top.entries[slot] as usize, child.as_bytes());
            }
        }
        device.write_block(sector as usize, self.as_bytes());
        Ok(())
    }

    /// Give every sector of the index tree back to `allocator`: the data
    /// sectors of all owned blocks and the tables that map them.
    ///
    /// Returns the number of sectors released. The record's own sector is
    /// left to the caller.
    pub fn release_all(&self, device: &dyn BlockDevice, allocator: &dyn SectorAllocator) -> usize {
        let count = allocated_sectors(self.len());
        let mut released = 0;
        let mut release = |sector: u32| {
            if sector != 0 {
                allocator.release(sector, 1);
                released += 1;
            }
        };
        for &sector in self.direct.iter().take(count.min(DIRECT_COUNT)) {
            release(sector);
        }
        if count > DIRECT_COUNT && self.indirect != 0 {
            let table = IndirectBlock::load(self.indirect, device);
            let used = (count - DIRECT_COUNT).min(INDIRECT_COUNT);
            for &sector in table.entries.iter().take(used) {
                release(sector);
            }
            release(self.indirect);
        }
        if count > DOUBLY_START && self.doubly_indirect != 0 {
            let remaining = count - DOUBLY_START;
            let doubly = IndirectBlock::load(self.doubly_indirect, device);
            for (slot, &child) in doubly
                .entries
                .iter()
                .enumerate()
                .take(remaining.div_ceil(INDIRECT_COUNT))
            {
                if child == 0 {
                    continue;
                }
                let table = IndirectBlock::load(child, device);
                let used = (remaining - slot * INDIRECT_COUNT).min(INDIRECT_COUNT);
                for &sector in table.entries.iter().take(used) {
                    release(sector);
                }
                release(child);
            }
            release(self.doubly_indirect);
        }
        released
    }
}
