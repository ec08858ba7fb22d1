//! Reconciliation engine: idempotent "ensure" primitives for one path.
//!
//! Each primitive compares the entity at a path with the declared state and
//! only acts on mismatch. Anything in the way is moved aside to a numbered
//! backup (`path~`, `path~1~`, ...) unless the caller opts out.
//!
//! Classification never follows symlinks: a symlink to a directory is a
//! symlink, not a directory. Backups do look through the link, so a symlink
//! to a file or directory is moved aside like the entry it points at.

pub mod directory;
pub mod file;
pub mod permissions;
pub mod symlink;
pub mod template;
pub mod text;

pub use file::FileMode;
pub use permissions::{PermissionSpec, Setting};
pub use template::Template;

use crate::core::error::{fs_err, FsOp, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Span};

/// Result of an ensure operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The path already matched; nothing was touched.
    Unchanged,
    /// The path was modified.
    Changed,
}

impl Outcome {
    /// Combine two outcomes; changed wins.
    pub fn or(self, other: Outcome) -> Outcome {
        if self == Outcome::Changed || other == Outcome::Changed {
            Outcome::Changed
        } else {
            Outcome::Unchanged
        }
    }
}

/// What currently sits at a path, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

pub(crate) fn entry_kind(path: &Path) -> Option<EntryKind> {
    let meta = fs::symlink_metadata(path).ok()?;
    let ft = meta.file_type();
    Some(if ft.is_symlink() {
        EntryKind::Symlink
    } else if ft.is_dir() {
        EntryKind::Dir
    } else if ft.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    })
}

/// Like [`entry_kind`], but through symlinks. Dangling links yield `None`.
pub(crate) fn resolved_kind(path: &Path) -> Option<EntryKind> {
    let ft = fs::metadata(path).ok()?.file_type();
    Some(if ft.is_dir() {
        EntryKind::Dir
    } else if ft.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    })
}

/// Filesystem reconciliation engine.
///
/// Carries the tracing span every operation logs under; there is no other
/// state, so one instance can serve a whole plugin run.
#[derive(Debug, Clone)]
pub struct Fs {
    span: Span,
}

impl Default for Fs {
    fn default() -> Self {
        Self::new(tracing::info_span!("fs"))
    }
}

impl Fs {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// Move a regular file or directory to the first unused backup name.
    ///
    /// A symlink resolving to a file or directory is renamed itself; its
    /// target is left alone. Returns the backup path, or `None` if there was
    /// nothing to back up (missing path, dangling link, socket, ...). Never
    /// overwrites an existing backup.
    pub fn backup(&self, path: &Path) -> Result<Option<PathBuf>> {
        let _enter = self.span.enter();
        if !matches!(resolved_kind(path), Some(EntryKind::File | EntryKind::Dir)) {
            return Ok(None);
        }

        let mut number = 0usize;
        let backup_path = loop {
            let candidate = backup_candidate(path, number);
            if fs::symlink_metadata(&candidate).is_err() {
                break candidate;
            }
            number += 1;
        };

        info!(path = %path.display(), backup = %backup_path.display(), "creating backup");
        fs::rename(path, &backup_path).map_err(|e| fs_err(FsOp::Backup, path, e))?;
        Ok(Some(backup_path))
    }

    /// Remove whatever is at `path`, backing it up first if requested.
    ///
    /// A missing path is success. Symlinks are unlinked, never followed.
    /// Directories must be empty.
    pub fn remove(&self, path: &Path, backup: bool) -> Result<Outcome> {
        let _enter = self.span.enter();
        let backed_up = backup && self.backup(path)?.is_some();

        // the backup may have moved it away already
        let Some(kind) = entry_kind(path) else {
            debug!(path = %path.display(), "nothing to remove");
            return Ok(if backed_up {
                Outcome::Changed
            } else {
                Outcome::Unchanged
            });
        };

        info!(path = %path.display(), "removing path");
        let removed = match kind {
            EntryKind::Dir => fs::remove_dir(path),
            EntryKind::File | EntryKind::Symlink | EntryKind::Other => fs::remove_file(path),
        };
        removed.map_err(|e| fs_err(FsOp::Remove, path, e))?;
        Ok(Outcome::Changed)
    }
}

fn backup_candidate(path: &Path, number: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    if number == 0 {
        name.push("~");
    } else {
        name.push(format!("~{}~", number));
    }
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fs() -> Fs {
        Fs::new(Span::none())
    }

    #[test]
    fn test_backup_simple() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::write(&a, "x").unwrap();
        let b = fs().backup(&a).unwrap();
        assert_eq!(b, Some(dir.path().join("a~")));
        assert!(dir.path().join("a~").exists());
        assert!(!a.exists());
    }

    #[test]
    fn test_backup_count_up() {
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b");
        std::fs::write(&b, "1").unwrap();
        fs().backup(&b).unwrap();
        std::fs::write(&b, "2").unwrap();
        fs().backup(&b).unwrap();
        std::fs::write(&b, "3").unwrap();
        fs().backup(&b).unwrap();
        assert!(!b.exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("b~")).unwrap(), "1");
        assert_eq!(std::fs::read_to_string(dir.path().join("b~1~")).unwrap(), "2");
        assert_eq!(std::fs::read_to_string(dir.path().join("b~2~")).unwrap(), "3");
    }

    #[test]
    fn test_backup_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let c = dir.path().join("c");
        assert_eq!(fs().backup(&c).unwrap(), None);
        assert!(!dir.path().join("c~").exists());
    }

    #[test]
    fn test_backup_directory() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().join("d");
        std::fs::create_dir(&d).unwrap();
        std::fs::write(d.join("inner"), "x").unwrap();
        fs().backup(&d).unwrap();
        assert!(dir.path().join("d~").is_dir());
        assert!(dir.path().join("d~/inner").exists());
    }

    #[test]
    fn test_backup_symlink_moves_link() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::write(&target, "x").unwrap();
        let e = dir.path().join("e");
        std::os::unix::fs::symlink(&target, &e).unwrap();
        assert_eq!(fs().backup(&e).unwrap(), Some(dir.path().join("e~")));
        assert!(e.symlink_metadata().is_err());
        assert_eq!(std::fs::read_link(dir.path().join("e~")).unwrap(), target);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "x");
    }

    #[test]
    fn test_backup_dangling_symlink_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let e = dir.path().join("e");
        std::os::unix::fs::symlink(dir.path().join("gone"), &e).unwrap();
        assert_eq!(fs().backup(&e).unwrap(), None);
        assert!(dir.path().join("e~").symlink_metadata().is_err());
        assert!(e.symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_remove_backup() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::write(&a, "x").unwrap();
        assert_eq!(fs().remove(&a, true).unwrap(), Outcome::Changed);
        assert!(dir.path().join("a~").exists());
        assert!(!a.exists());
    }

    #[test]
    fn test_remove_simple() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::write(&a, "x").unwrap();
        fs().remove(&a, false).unwrap();
        assert!(!a.exists());
        assert!(!dir.path().join("a~").exists());
    }

    #[test]
    fn test_remove_missing_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b");
        assert_eq!(fs().remove(&b, true).unwrap(), Outcome::Unchanged);
        assert!(!dir.path().join("b~").exists());
    }

    #[test]
    fn test_remove_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::create_dir(&a).unwrap();
        fs().remove(&a, false).unwrap();
        assert!(!a.exists());
        assert!(!dir.path().join("a~").exists());
    }

    #[test]
    fn test_remove_non_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::create_dir(&a).unwrap();
        std::fs::write(a.join("keep"), "x").unwrap();
        let err = fs().remove(&a, false).unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::Error::Filesystem {
                op: FsOp::Remove,
                ..
            }
        ));
        assert!(a.join("keep").exists());
    }

    #[test]
    fn test_remove_symlink_unlinks_only() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let a = dir.path().join("a");
        std::os::unix::fs::symlink(&target, &a).unwrap();
        fs().remove(&a, false).unwrap();
        assert!(a.symlink_metadata().is_err());
        assert!(target.is_dir());
    }

    #[test]
    fn test_remove_symlink_with_backup_keeps_link() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let a = dir.path().join("a");
        std::os::unix::fs::symlink(&target, &a).unwrap();
        assert_eq!(fs().remove(&a, true).unwrap(), Outcome::Changed);
        assert!(a.symlink_metadata().is_err());
        assert!(dir.path().join("a~").symlink_metadata().unwrap().file_type().is_symlink());
        assert!(target.is_dir());
    }

    #[test]
    fn test_outcome_or() {
        assert_eq!(Outcome::Unchanged.or(Outcome::Unchanged), Outcome::Unchanged);
        assert_eq!(Outcome::Unchanged.or(Outcome::Changed), Outcome::Changed);
        assert_eq!(Outcome::Changed.or(Outcome::Unchanged), Outcome::Changed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_backup_never_overwrites(calls in 1usize..8) {
            let dir = tempfile::tempdir().unwrap();
            let p = dir.path().join("p");
            for i in 0..calls {
                std::fs::write(&p, i.to_string()).unwrap();
                let before = std::fs::read_dir(dir.path()).unwrap().count();
                let made = fs().backup(&p).unwrap().unwrap();
                let after = std::fs::read_dir(dir.path()).unwrap().count();
                // p moved to exactly one new name
                prop_assert_eq!(before, after);
                prop_assert_eq!(std::fs::read_to_string(&made).unwrap(), i.to_string());
            }
            for i in 0..calls {
                let name = if i == 0 { "p~".to_string() } else { format!("p~{}~", i) };
                prop_assert_eq!(
                    std::fs::read_to_string(dir.path().join(name)).unwrap(),
                    i.to_string()
                );
            }
        }
    }
}
