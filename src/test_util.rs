//! RAM-backed devices and allocators for unit tests.

use crate::{BlockDevice, FreeMap, SECTOR_SIZE, SectorAllocator};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(count: usize) -> Arc<Self> {
        Self::filled(count, 0)
    }

    pub fn filled(count: usize, byte: u8) -> Arc<Self> {
        Arc::new(Self {
            sectors: Mutex::new(vec![[byte; SECTOR_SIZE]; count]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        buf.copy_from_slice(&self.sectors.lock()[block_id]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.sectors.lock()[block_id].copy_from_slice(buf);
    }

    fn block_count(&self) -> usize {
        self.sectors.lock().len()
    }
}

/// A free map that refuses to hand out more than `limit` sectors.
pub struct LimitedAllocator {
    free_map: FreeMap,
    left: AtomicUsize,
}

impl LimitedAllocator {
    pub fn new(sectors: usize, limit: usize) -> Self {
        Self {
            free_map: FreeMap::new(sectors),
            left: AtomicUsize::new(limit),
        }
    }

    pub fn free_count(&self) -> usize {
        self.free_map.free_count()
    }
}

impl SectorAllocator for LimitedAllocator {
    fn allocate(&self, count: usize) -> Option<u32> {
        let left = self.left.load(Ordering::Relaxed);
        if left < count {
            return None;
        }
        self.left.store(left - count, Ordering::Relaxed);
        self.free_map.allocate(count)
    }

    fn release(&self, sector: u32, count: usize) {
        self.free_map.release(sector, count)
    }
}
