//! Symbolic links.

use super::{entry_kind, EntryKind, Fs, Outcome};
use crate::core::error::{fs_err, FsOp, Result};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::{debug, info};

impl Fs {
    /// Make sure `path` is a symlink resolving to the same file as `target`.
    ///
    /// A wrong symlink is unlinked without a backup; anything else in the way
    /// goes through [`Fs::remove`].
    pub fn ensure_symlink(&self, path: &Path, target: &Path, backup: bool) -> Result<Outcome> {
        let _enter = self.span.enter();
        info!(path = %path.display(), target = %target.display(), "ensuring symlink");

        match entry_kind(path) {
            Some(EntryKind::Symlink) => {
                if same_file(path, target) {
                    debug!(path = %path.display(), "symlink already present");
                    return Ok(Outcome::Unchanged);
                }
                fs::remove_file(path).map_err(|e| fs_err(FsOp::Remove, path, e))?;
            }
            Some(_) => {
                self.remove(path, backup)?;
            }
            None => {}
        }

        info!(path = %path.display(), "creating symlink");
        std::os::unix::fs::symlink(target, path).map_err(|e| fs_err(FsOp::Symlink, path, e))?;
        Ok(Outcome::Changed)
    }
}

/// The link at `link` and `target` resolve to the same inode. A relative
/// `target` is taken from the link's directory, as the kernel would.
fn same_file(link: &Path, target: &Path) -> bool {
    let target = match link.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target.to_path_buf(),
    };
    match (fs::metadata(link), fs::metadata(&target)) {
        (Ok(x), Ok(y)) => x.dev() == y.dev() && x.ino() == y.ino(),
        _ => false,
    }
}
