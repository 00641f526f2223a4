//! Path resolution over directory inodes.
//!
//! A path is a `/`-separated list of components. Absolute paths start at the
//! root directory; relative ones start at the caller's working directory, or
//! at the root when there is none. Repeated separators are ignored, and every
//! component must fit in a directory entry (`NAME_MAX` bytes).

use super::{Dir, FsError, FsResult, InodeHandle, InodeTable, NAME_MAX};
use alloc::sync::Arc;
use log::debug;

/// Whether `path` is resolved from the working directory
pub fn is_relative(path: &str) -> bool {
    !path.starts_with('/')
}

/// Cursor over the components of a path
pub struct Components<'a> {
    rest: &'a str,
}

impl<'a> Components<'a> {
    /// Start at the beginning of `path`
    pub fn new(path: &'a str) -> Self {
        Self { rest: path }
    }

    /// The next component, or `None` once only separators are left.
    ///
    /// A component longer than `NAME_MAX` is an error, never truncated.
    pub fn next_component(&mut self) -> FsResult<Option<&'a str>> {
        let trimmed = self.rest.trim_start_matches('/');
        if trimmed.is_empty() {
            self.rest = trimmed;
            return Ok(None);
        }
        let end = trimmed.find('/').unwrap_or(trimmed.len());
        let (name, rest) = trimmed.split_at(end);
        if name.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        self.rest = rest;
        Ok(Some(name))
    }

    /// Whether another component follows
    pub fn has_more(&self) -> bool {
        !self.rest.trim_start_matches('/').is_empty()
    }

    /// The part of the path not consumed yet
    pub fn remaining(&self) -> &'a str {
        self.rest
    }
}

fn start_dir(table: &Arc<InodeTable>, cwd: Option<&Dir>, path: &str) -> FsResult<Dir> {
    match cwd {
        Some(cwd) if is_relative(path) => Ok(cwd.reopen()),
        _ => Dir::open_root(table),
    }
}

/// Step from `dir` into its subdirectory `name`
fn descend(dir: &Dir, name: &str) -> FsResult<Dir> {
    let inode = dir.lookup(name).ok_or(FsError::NotFound)?;
    Dir::open(inode)
}

/// Open the directory that should hold the last component of `path`, and
/// return it with that component.
///
/// Fails with `InvalidPath` when the path has no component at all. The
/// returned name is not checked for existence.
pub fn resolve_parent<'a>(
    table: &Arc<InodeTable>,
    cwd: Option<&Dir>,
    path: &'a str,
) -> FsResult<(Dir, &'a str)> {
    let mut components = Components::new(path);
    let mut current = start_dir(table, cwd, path)?;
    let Some(mut name) = components.next_component()? else {
        return Err(FsError::InvalidPath);
    };
    while components.has_more() {
        current = descend(&current, name).inspect_err(|err| debug!("{path}: {name}: {err}"))?;
        let Some(next) = components.next_component()? else {
            break;
        };
        name = next;
    }
    Ok((current, name))
}

/// Open the inode `path` names, file or directory.
///
/// A path without components names the starting directory itself.
pub fn resolve_full(
    table: &Arc<InodeTable>,
    cwd: Option<&Dir>,
    path: &str,
) -> FsResult<InodeHandle> {
    let mut components = Components::new(path);
    let mut current = start_dir(table, cwd, path)?;
    let mut next = components.next_component()?;
    loop {
        if current.inode().is_removed() {
            debug!("{path}: directory {} was removed", current.inode().inumber());
            return Err(FsError::Removed);
        }
        let Some(name) = next else {
            return Ok(current.inode().reopen());
        };
        let inode = current
            .lookup(name)
            .ok_or(FsError::NotFound)
            .inspect_err(|err| debug!("{path}: {name}: {err}"))?;
        if !components.has_more() {
            return Ok(inode);
        }
        current = Dir::open(inode).inspect_err(|err| debug!("{path}: {name}: {err}"))?;
        next = components.next_component()?;
    }
}
