//! An inode file system with multi-level sector indexing.
//!
//! 本模块提供了一个独立于内核的索引式文件系统，
//! 用于 rCore 教学操作系统。每个文件由一个恰好占一个扇区的磁盘 inode 描述，
//! 文件内容通过直接指针、一级间接表和二级间接表定位。
//!
//! 教程阅读建议：
//!
//! - 先看 `layout.rs`：理解磁盘 inode、间接表和目录项的布局；
//! - 再看 `extent.rs`：理解逻辑块号到物理扇区的映射与按需扩容；
//! - 然后看 `inode.rs`：理解打开 inode 表、引用计数与延迟删除；
//! - 最后看 `path.rs` 和 `filesys.rs`：理解路径解析与文件系统入口。
//!
//! Every read or write goes straight to the [`BlockDevice`]; the only thing
//! kept in memory is the table of open inodes.

#![cfg_attr(not(test), no_std)]
#![deny(warnings, missing_docs)]
extern crate alloc;

mod bitmap;
mod block_dev;
pub mod config;
mod dir;
mod error;
mod extent;
mod file;
mod filesys;
mod free_map;
mod inode;
mod layout;
pub mod path;

#[cfg(test)]
mod test_util;

pub use block_dev::BlockDevice;
pub use config::*;
pub use dir::Dir;
pub use error::{FsError, FsResult};
pub use file::File;
pub use filesys::FileSystem;
pub use free_map::{FreeMap, SectorAllocator};
pub use inode::{InodeHandle, InodeTable};
pub use layout::{DirEntry, DiskInode, IndirectBlock, InodeFlags, allocated_sectors, bytes_to_sectors};
