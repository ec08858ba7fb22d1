//! In-place text insertion.

use super::{entry_kind, Fs, Outcome};
use crate::core::error::{fs_err, Error, FsOp, Result};
use regex::{NoExpand, Regex};
use std::fs::{self, Metadata, OpenOptions};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::{debug, info, warn};

/// Default insertion anchor: the very end of the text.
pub const END_OF_TEXT: &str = r"\z";

impl Fs {
    /// Make sure `text` occurs in the file at `path`, creating the file if
    /// needed.
    ///
    /// `needle` (default: `text` matched literally) decides whether the text
    /// is already there. Otherwise every match of `insert_at` (default: end
    /// of text) is replaced by `text`, inserted literally. A rewritten file
    /// keeps the mode and ownership of its backup.
    pub fn ensure_text_in_file(
        &self,
        path: &Path,
        text: &str,
        insert_at: Option<&str>,
        needle: Option<&str>,
        backup: bool,
    ) -> Result<Outcome> {
        let _enter = self.span.enter();
        let headline = text.lines().next().unwrap_or_default();

        let needle = match needle {
            Some(n) if !n.is_empty() => compile(n)?,
            _ => compile(&regex::escape(text))?,
        };
        let anchor = compile(insert_at.unwrap_or(END_OF_TEXT))?;

        let created = if entry_kind(path).is_none() {
            Outcome::Changed
        } else {
            Outcome::Unchanged
        };
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| fs_err(FsOp::CreateFile, path, e))?;
        let haystack = fs::read_to_string(path).map_err(|e| fs_err(FsOp::Read, path, e))?;

        info!(path = %path.display(), text = headline, "ensuring text in file");

        if needle.is_match(&haystack) {
            debug!(path = %path.display(), "text is already in the file");
            return Ok(created);
        }
        if !anchor.is_match(&haystack) {
            warn!(path = %path.display(), anchor = anchor.as_str(), "insertion point not found");
            return Ok(created);
        }

        let original = if backup {
            match self.backup(path)? {
                Some(moved) => {
                    Some(fs::metadata(&moved).map_err(|e| fs_err(FsOp::Stat, &moved, e))?)
                }
                None => None,
            }
        } else {
            None
        };

        info!(path = %path.display(), text = headline, "inserting text");
        let updated = anchor.replace_all(&haystack, NoExpand(text));
        fs::write(path, updated.as_bytes()).map_err(|e| fs_err(FsOp::Write, path, e))?;
        if let Some(original) = original {
            restore_attributes(path, &original)?;
        }
        Ok(Outcome::Changed)
    }
}

/// Give a freshly written `path` the mode and ownership of `original`.
fn restore_attributes(path: &Path, original: &Metadata) -> Result<()> {
    let current = fs::metadata(path).map_err(|e| fs_err(FsOp::Stat, path, e))?;
    if current.mode() & 0o7777 != original.mode() & 0o7777 {
        fs::set_permissions(path, fs::Permissions::from_mode(original.mode() & 0o7777))
            .map_err(|e| fs_err(FsOp::Chmod, path, e))?;
    }
    if current.uid() != original.uid() || current.gid() != original.gid() {
        debug!(path = %path.display(), uid = original.uid(), gid = original.gid(), "restoring owner");
        std::os::unix::fs::chown(path, Some(original.uid()), Some(original.gid()))
            .map_err(|e| fs_err(FsOp::Chown, path, e))?;
    }
    Ok(())
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Contract(format!("invalid pattern \"{}\": {}", pattern, e)))
}
