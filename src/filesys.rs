use super::{
    BlockDevice, Dir, File, FreeMap, FsError, FsResult, InodeTable, ROOT_DIR_ENTRIES,
    ROOT_DIR_SECTOR, SectorAllocator, path,
};
use alloc::sync::Arc;
use log::{info, warn};
use spin::Mutex;

// 教程阅读建议：
// - `init` 负责格式化（可选）和挂载：空闲位图本身也存放在一个 inode 中；
// - 所有按路径的操作都在 `namespace_lock` 下进行，与系统调用层的全局文件系统锁对应；
// - 创建失败时要把已经拿到的扇区还回去。

/// A mounted volume
pub struct FileSystem {
    table: Arc<InodeTable>,
    free_map: Arc<FreeMap>,
    namespace_lock: Mutex<()>,
}

impl FileSystem {
    /// Mount the volume on `device`, formatting it first if `format` is set
    pub fn init(device: Arc<dyn BlockDevice>, format: bool) -> FsResult<Self> {
        let sectors = device.block_count();
        if sectors <= ROOT_DIR_SECTOR as usize {
            warn!("device of {sectors} sectors cannot hold a file system");
            return Err(FsError::NoSpace);
        }
        let free_map = Arc::new(FreeMap::new(sectors));
        let table = InodeTable::new(device, free_map.clone());
        if format {
            Self::format(&table, &free_map).inspect_err(|_| free_map.close())?;
        }
        free_map.open(&table)?;
        info!(
            "file system mounted: {} of {} sectors free",
            free_map.free_count(),
            sectors
        );
        Ok(Self {
            table,
            free_map,
            namespace_lock: Mutex::new(()),
        })
    }

    fn format(table: &Arc<InodeTable>, free_map: &FreeMap) -> FsResult<()> {
        info!("formatting file system");
        free_map.create(table)?;
        Dir::create(table, ROOT_DIR_SECTOR, ROOT_DIR_ENTRIES, ROOT_DIR_SECTOR)?;
        free_map.close();
        info!("formatting done");
        Ok(())
    }

    /// Unmount; equivalent to dropping the file system
    pub fn shutdown(self) {}

    /// Create a regular file of `initial_size` zero bytes at `path`
    pub fn create(&self, cwd: Option<&Dir>, path: &str, initial_size: usize) -> FsResult<()> {
        self.create_inode(cwd, path, initial_size, false)
    }

    /// Create an empty directory at `path`
    pub fn mkdir(&self, cwd: Option<&Dir>, path: &str) -> FsResult<()> {
        self.create_inode(cwd, path, 0, true)
    }

    fn create_inode(
        &self,
        cwd: Option<&Dir>,
        path: &str,
        length: usize,
        is_dir: bool,
    ) -> FsResult<()> {
        if path.is_empty() {
            return Err(FsError::InvalidPath);
        }
        let _guard = self.namespace_lock.lock();
        let (parent, name) = path::resolve_parent(&self.table, cwd, path)?;
        if parent.inode().is_removed() {
            return Err(FsError::Removed);
        }
        if parent.lookup(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let sector = self.free_map.allocate(1).ok_or(FsError::NoSpace)?;
        let inode = match self
            .table
            .create(sector, length)
            .and_then(|()| self.table.open(sector))
        {
            Ok(inode) => inode,
            Err(err) => {
                self.free_map.release(sector, 1);
                return Err(err);
            }
        };
        let linked = if is_dir {
            Dir::init(inode.reopen(), parent.inode().inumber()).map(drop)
        } else {
            Ok(())
        }
        .and_then(|()| parent.add(name, sector));
        if let Err(err) = linked {
            // 最后一次 close 时回收
            inode.remove();
            return Err(err);
        }
        Ok(())
    }

    /// Open the file or directory at `path`
    pub fn open(&self, cwd: Option<&Dir>, path: &str) -> FsResult<File> {
        let _guard = self.namespace_lock.lock();
        path::resolve_full(&self.table, cwd, path).map(File::open)
    }

    /// Open the directory at `path`, e.g. to make it the working directory
    pub fn open_dir(&self, cwd: Option<&Dir>, path: &str) -> FsResult<Dir> {
        let _guard = self.namespace_lock.lock();
        Dir::open(path::resolve_full(&self.table, cwd, path)?)
    }

    /// Unlink `path`; its sectors are freed when the last opener closes it
    pub fn remove(&self, cwd: Option<&Dir>, path: &str) -> FsResult<()> {
        let _guard = self.namespace_lock.lock();
        let (parent, name) = path::resolve_parent(&self.table, cwd, path)?;
        parent.remove(name)
    }

    /// The root directory
    pub fn root(&self) -> FsResult<Dir> {
        Dir::open_root(&self.table)
    }

    /// Number of free sectors on the volume
    pub fn free_sectors(&self) -> usize {
        self.free_map.free_count()
    }

    /// The open-inode table of this volume
    pub fn inode_table(&self) -> &Arc<InodeTable> {
        &self.table
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.free_map.close();
        info!("file system unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RamDisk;

    #[test]
    fn taken_names_cost_nothing() {
        let fs = FileSystem::init(RamDisk::new(128), true).unwrap();
        fs.create(None, "/f", 100).unwrap();
        let free = fs.free_sectors();
        assert_eq!(fs.create(None, "/f", 100), Err(FsError::AlreadyExists));
        assert_eq!(fs.mkdir(None, "f"), Err(FsError::AlreadyExists));
        assert_eq!(fs.create(None, "", 0), Err(FsError::InvalidPath));
        assert_eq!(fs.create(None, "/", 0), Err(FsError::InvalidPath));
        assert_eq!(fs.free_sectors(), free);
    }

    #[test]
    fn failed_create_returns_the_inode_sector() {
        let fs = FileSystem::init(RamDisk::new(64), true).unwrap();
        // sectors 0..4 hold the free map and the root directory
        assert_eq!(fs.free_sectors(), 60);
        assert_eq!(fs.create(None, "big", 64 * 512), Err(FsError::NoSpace));
        assert_eq!(fs.open(None, "big").err(), Some(FsError::NotFound));
        // the inode sector came back, the partial extension did not
        assert_eq!(fs.free_sectors(), 1);
    }

    #[test]
    fn no_room_for_the_entry() {
        let fs = FileSystem::init(RamDisk::new(52), true).unwrap();
        // `.`, `..` and 23 entries fill the root's only sector
        for i in 0..23 {
            fs.create(None, &alloc::format!("f{i}"), 0).unwrap();
        }
        assert_eq!(fs.free_sectors(), 2);
        assert_eq!(fs.create(None, "last", 0), Err(FsError::NoSpace));
        assert_eq!(fs.free_sectors(), 2);
        assert_eq!(fs.open(None, "last").err(), Some(FsError::NotFound));
        // only the free map is still open
        assert_eq!(fs.inode_table().open_count(), 1);
    }

    #[test]
    fn tiny_devices_are_refused() {
        for sectors in 0..2 {
            assert_eq!(
                FileSystem::init(RamDisk::new(sectors), true).err(),
                Some(FsError::NoSpace)
            );
            assert_eq!(
                FileSystem::init(RamDisk::new(sectors), false).err(),
                Some(FsError::NoSpace)
            );
        }
        // room for the reserved sectors but not for the free map's data
        assert_eq!(
            FileSystem::init(RamDisk::new(2), true).err(),
            Some(FsError::NoSpace)
        );
    }

    #[test]
    fn removed_parent_refuses_new_entries() {
        let fs = FileSystem::init(RamDisk::new(128), true).unwrap();
        fs.mkdir(None, "/d").unwrap();
        let cwd = fs.open_dir(None, "/d").unwrap();
        fs.remove(None, "/d").unwrap();
        assert_eq!(fs.create(Some(&cwd), "x", 0), Err(FsError::Removed));
        assert_eq!(fs.open(Some(&cwd), "x").err(), Some(FsError::Removed));
    }
}
