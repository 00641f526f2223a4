use super::{
    DirEntry, FsError, FsResult, InodeHandle, InodeTable, NAME_MAX, ROOT_DIR_SECTOR,
};
use crate::layout::DIRENT_SZ;
use alloc::string::String;
use alloc::sync::Arc;
use log::{debug, warn};

// 教程阅读建议：
// - 目录就是一个普通 inode，内容是定长 `DirEntry` 数组；
// - `add` 优先复用空槽位，没有空槽位才在末尾追加（可能触发文件扩容）；
// - `remove` 只清除目录项并标记 inode，真正回收发生在最后一次 close。

/// An open directory: an inode handle plus a `readdir` cursor
pub struct Dir {
    inode: InodeHandle,
    pos: usize,
}

impl Dir {
    /// Create a directory inode at `sector` with room for `entry_cnt`
    /// entries; its `..` points at `parent`
    pub fn create(
        table: &Arc<InodeTable>,
        sector: u32,
        entry_cnt: usize,
        parent: u32,
    ) -> FsResult<()> {
        table.create(sector, entry_cnt * DIRENT_SZ)?;
        Self::init(table.open(sector)?, parent).map(|_| ())
    }

    /// Turn a freshly created inode into a directory holding `.` and `..`
    pub(crate) fn init(inode: InodeHandle, parent: u32) -> FsResult<Self> {
        inode.set_dir();
        let sector = inode.inumber();
        let dir = Self { inode, pos: 0 };
        dir.add(".", sector)?;
        dir.add("..", parent)?;
        Ok(dir)
    }

    /// Open the directory behind `inode`
    pub fn open(inode: InodeHandle) -> FsResult<Self> {
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(Self { inode, pos: 0 })
    }

    /// Open the root directory
    pub fn open_root(table: &Arc<InodeTable>) -> FsResult<Self> {
        Self::open(table.open(ROOT_DIR_SECTOR)?)
    }

    /// Another handle on the same directory, with its own cursor
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.reopen(),
            pos: 0,
        }
    }

    /// The directory's inode
    pub fn inode(&self) -> &InodeHandle {
        &self.inode
    }

    fn entry_at(&self, offset: usize) -> Option<DirEntry> {
        let mut entry = DirEntry::empty();
        if self.inode.read_at(offset, entry.as_bytes_mut()) == DIRENT_SZ {
            Some(entry)
        } else {
            None
        }
    }

    /// Find inode entry by name, with its byte offset
    fn find(&self, name: &str) -> Option<(DirEntry, usize)> {
        (0..)
            .step_by(DIRENT_SZ)
            .map_while(|offset| self.entry_at(offset).map(|entry| (entry, offset)))
            .find(|(entry, _)| entry.is_in_use() && entry.name() == name)
    }

    /// Open the inode named `name` in this directory
    pub fn lookup(&self, name: &str) -> Option<InodeHandle> {
        let (entry, _) = self.find(name)?;
        match self.inode.table().open(entry.inode_sector()) {
            Ok(inode) => Some(inode),
            Err(err) => {
                warn!("{name}: entry points at sector {}: {err}", entry.inode_sector());
                None
            }
        }
    }

    /// Link `name` to the inode at `sector`
    pub fn add(&self, name: &str, sector: u32) -> FsResult<()> {
        if name.is_empty() {
            return Err(FsError::InvalidPath);
        }
        if name.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        if self.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        // 先找空槽位，找不到就写到文件末尾
        let mut offset = 0;
        while let Some(entry) = self.entry_at(offset) {
            if !entry.is_in_use() {
                break;
            }
            offset += DIRENT_SZ;
        }
        let entry = DirEntry::new(name, sector);
        if self.inode.write_at(offset, entry.as_bytes()) != DIRENT_SZ {
            return Err(FsError::NoSpace);
        }
        debug!("dir {}: add {name} -> {sector}", self.inode.inumber());
        Ok(())
    }

    /// Unlink `name` and mark its inode removed.
    ///
    /// Directories must be empty; `.` and `..` cannot be removed.
    pub fn remove(&self, name: &str) -> FsResult<()> {
        if name == "." || name == ".." {
            return Err(FsError::InvalidPath);
        }
        let (mut entry, offset) = self.find(name).ok_or(FsError::NotFound)?;
        let inode = self.inode.table().open(entry.inode_sector())?;
        if inode.is_dir() && !Self::open(inode.reopen())?.is_empty() {
            return Err(FsError::DirectoryNotEmpty);
        }
        entry.clear();
        if self.inode.write_at(offset, entry.as_bytes()) != DIRENT_SZ {
            return Err(FsError::NoSpace);
        }
        inode.remove();
        debug!("dir {}: remove {name} ({})", self.inode.inumber(), inode.inumber());
        Ok(())
    }

    /// Whether only `.` and `..` are left
    pub fn is_empty(&self) -> bool {
        (0..)
            .step_by(DIRENT_SZ)
            .map_while(|offset| self.entry_at(offset))
            .all(|entry| !entry.is_in_use() || is_dot(entry.name()))
    }

    /// Next name in the directory, skipping `.` and `..`
    pub fn readdir(&mut self) -> Option<String> {
        while let Some(entry) = self.entry_at(self.pos) {
            self.pos += DIRENT_SZ;
            if entry.is_in_use() && !is_dot(entry.name()) {
                return Some(String::from(entry.name()));
            }
        }
        None
    }
}

fn is_dot(name: &str) -> bool {
    name == "." || name == ".."
}
