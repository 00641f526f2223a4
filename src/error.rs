use strum::{Display, FromRepr, IntoStaticStr};

/// Result type of every fallible file system operation.
pub type FsResult<T> = Result<T, FsError>;

/// Reasons a file system operation can fail.
///
/// The discriminants are the matching Linux errno values, so a syscall layer
/// can hand [`FsError::errno`] straight back to user space.
#[derive(Display, FromRepr, IntoStaticStr, Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum FsError {
    /// A path component is absent from its directory
    #[strum(serialize = "no such file or directory")]
    NotFound = 2,
    /// The record read from disk is not an inode
    #[strum(serialize = "corrupted inode")]
    Corrupted = 5,
    /// The name is already taken in the target directory
    #[strum(serialize = "file exists")]
    AlreadyExists = 17,
    /// A non-final path component names a regular file
    #[strum(serialize = "not a directory")]
    NotADirectory = 20,
    /// Empty name, or a path without the component the operation needs
    #[strum(serialize = "invalid path")]
    InvalidPath = 22,
    /// The file would need more sectors than the index can address
    #[strum(serialize = "file too large")]
    FileTooLarge = 27,
    /// The free map has no sector left
    #[strum(serialize = "no space left on device")]
    NoSpace = 28,
    /// A path component is longer than `NAME_MAX`
    #[strum(serialize = "file name too long")]
    NameTooLong = 36,
    /// Only empty directories can be removed
    #[strum(serialize = "directory not empty")]
    DirectoryNotEmpty = 39,
    /// The directory or file was removed through another handle
    #[strum(serialize = "removed while open")]
    Removed = 116,
}

impl FsError {
    /// Negative errno, as returned by the syscall layer.
    pub fn errno(self) -> isize {
        -(self as i32 as isize)
    }
}
