use super::{FREE_MAP_SECTOR, FsError, FsResult, InodeHandle, InodeTable, ROOT_DIR_SECTOR};
use crate::bitmap::Bitmap;
use alloc::sync::Arc;
use log::{debug, warn};
use spin::Mutex;

/// Source of free sectors
pub trait SectorAllocator: Send + Sync {
    /// Take `count` consecutive free sectors, returning the first one
    fn allocate(&self, count: usize) -> Option<u32>;
    /// Give back `count` sectors starting at `sector`
    fn release(&self, sector: u32, count: usize);
}

/// Free-space bitmap of the volume.
///
/// The bitmap lives in memory; while a backing inode is attached (between
/// [`FreeMap::create`]/[`FreeMap::open`] and [`FreeMap::close`]) every change
/// is written through to it at once.
pub struct FreeMap {
    bitmap: Mutex<Bitmap>,
    file: Mutex<Option<InodeHandle>>,
}

impl FreeMap {
    /// A free map for a device of `sector_count` sectors, with the free-map
    /// and root directory sectors already taken
    pub fn new(sector_count: usize) -> Self {
        let mut bitmap = Bitmap::new(sector_count);
        bitmap.set_multiple(FREE_MAP_SECTOR as usize, 1, true);
        bitmap.set_multiple(ROOT_DIR_SECTOR as usize, 1, true);
        Self {
            bitmap: Mutex::new(bitmap),
            file: Mutex::new(None),
        }
    }

    /// Create the backing inode at `FREE_MAP_SECTOR`, attach it and write the
    /// whole bitmap out
    pub fn create(&self, table: &Arc<InodeTable>) -> FsResult<()> {
        let size = self.bitmap.lock().as_bytes().len();
        table.create(FREE_MAP_SECTOR, size)?;
        let file = table.open(FREE_MAP_SECTOR)?;
        let bitmap = self.bitmap.lock();
        if file.write_at(0, bitmap.as_bytes()) != size {
            return Err(FsError::NoSpace);
        }
        *self.file.lock() = Some(file);
        Ok(())
    }

    /// Attach the backing inode of a formatted volume and load the bitmap
    pub fn open(&self, table: &Arc<InodeTable>) -> FsResult<()> {
        let file = table.open(FREE_MAP_SECTOR)?;
        let mut bitmap = self.bitmap.lock();
        let size = bitmap.as_bytes().len();
        if file.read_at(0, bitmap.as_bytes_mut()) != size {
            return Err(FsError::Corrupted);
        }
        debug!("free map: {} of {} sectors free", bitmap.count_clear(), bitmap.len());
        *self.file.lock() = Some(file);
        Ok(())
    }

    /// Detach the backing inode
    pub fn close(&self) {
        let file = self.file.lock().take();
        drop(file);
    }

    /// Number of free sectors
    pub fn free_count(&self) -> usize {
        self.bitmap.lock().count_clear()
    }

    /// Write the bytes covering bits `start..start + count` to the backing inode
    fn persist(&self, bitmap: &Bitmap, start: usize, count: usize) {
        let file = self.file.lock();
        let Some(file) = file.as_ref() else {
            return;
        };
        if count == 0 {
            return;
        }
        let first = start / 8;
        let last = (start + count - 1) / 8 + 1;
        let bytes = &bitmap.as_bytes()[first..last];
        if file.write_at(first, bytes) != bytes.len() {
            warn!("free map: short write at byte {first}");
        }
    }
}

impl SectorAllocator for FreeMap {
    fn allocate(&self, count: usize) -> Option<u32> {
        let mut bitmap = self.bitmap.lock();
        let Some(start) = bitmap.scan_and_flip(count) else {
            warn!("free map: no run of {count} free sectors");
            return None;
        };
        self.persist(&bitmap, start, count);
        Some(start as u32)
    }

    fn release(&self, sector: u32, count: usize) {
        let mut bitmap = self.bitmap.lock();
        let start = sector as usize;
        assert!(
            (start..start + count).all(|index| bitmap.test(index)),
            "releasing free sectors {start}..{}",
            start + count
        );
        bitmap.set_multiple(start, count, false);
        self.persist(&bitmap, start, count);
    }
}
