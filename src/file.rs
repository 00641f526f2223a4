use super::InodeHandle;

// 教程阅读建议：
// - `File` = inode 句柄 + 文件偏移 + 是否拒绝写入，对应一个打开文件描述；
// - 多个 `File` 可以指向同一个 inode，各自维护自己的偏移。

/// An open file: an inode handle and a position
pub struct File {
    inode: InodeHandle,
    pos: usize,
    deny_write: bool,
}

impl File {
    /// Wrap an open inode, positioned at the start
    pub fn open(inode: InodeHandle) -> Self {
        Self {
            inode,
            pos: 0,
            deny_write: false,
        }
    }

    /// A second file on the same inode, with its own position
    pub fn reopen(&self) -> Self {
        Self::open(self.inode.reopen())
    }

    /// The underlying inode
    pub fn inode(&self) -> &InodeHandle {
        &self.inode
    }

    /// 从当前偏移读取数据，偏移随读取量前移。
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let read_size = self.inode.read_at(self.pos, buf);
        self.pos += read_size;
        read_size
    }

    /// Read at `offset` without moving the position
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        self.inode.read_at(offset, buf)
    }

    /// 从当前偏移写入数据，必要时扩展文件。
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let write_size = self.inode.write_at(self.pos, buf);
        self.pos += write_size;
        write_size
    }

    /// Write at `offset` without moving the position
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        self.inode.write_at(offset, buf)
    }

    /// Move the position; past the end is allowed
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Current position
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// File size in bytes
    pub fn length(&self) -> usize {
        self.inode.length()
    }

    /// Block writes to the inode while this file is open
    pub fn deny_write(&mut self) {
        if !self.deny_write {
            self.deny_write = true;
            self.inode.deny_write();
        }
    }

    /// Lift the block set by [`File::deny_write`]
    pub fn allow_write(&mut self) {
        if self.deny_write {
            self.deny_write = false;
            self.inode.allow_write();
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.allow_write();
    }
}
