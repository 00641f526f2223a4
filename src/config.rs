//! Volume geometry and on-disk constants.

/// Size of one device sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Longest file name component, in bytes.
pub const NAME_MAX: usize = 14;

/// Sector holding the free-map inode.
pub const FREE_MAP_SECTOR: u32 = 0;

/// Sector holding the root directory inode.
pub const ROOT_DIR_SECTOR: u32 = 1;

/// Entry capacity the root directory is created with.
pub const ROOT_DIR_ENTRIES: usize = 16;

/// Number of direct sector pointers in a disk inode.
pub const DIRECT_COUNT: usize = 123;

/// Number of sector pointers held by one indirection table.
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / core::mem::size_of::<u32>();

/// First logical block served by the doubly-indirect table.
pub const DOUBLY_START: usize = DIRECT_COUNT + INDIRECT_COUNT;

/// Largest number of logical blocks one file can address.
pub const MAX_FILE_SECTORS: usize = DOUBLY_START + INDIRECT_COUNT * INDIRECT_COUNT;

/// Sentinel identifying a genuine disk inode ("INOD").
pub const INODE_MAGIC: u32 = 0x494e_4f44;
