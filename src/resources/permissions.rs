//! Ownership and mode model.
//!
//! A [`PermissionSpec`] is an owner/group/mode triple where every field is
//! either left as is, inherited from the parent directory, or set to an
//! explicit value. The textual grammar is `"owner,group,mode"`, each field
//! being `-` (as is), `.` (inherit) or a value; `-` alone means `-,-,-` and
//! `.` alone means `.,.,.`. Modes are octal.

use super::{entry_kind, EntryKind, Fs, Outcome};
use crate::core::error::{fs_err, Error, FsOp, Result};
use nix::unistd::{Group, User};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

const MODE_MASK: u32 = 0o7777;

/// One field of a permission spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Setting<T> {
    /// Leave the current value unchanged.
    #[default]
    AsIs,
    /// Copy the parent directory's current value.
    Inherit,
    Value(T),
}

impl<T> Setting<T> {
    pub fn is_as_is(&self) -> bool {
        matches!(self, Setting::AsIs)
    }

    pub fn is_inherit(&self) -> bool {
        matches!(self, Setting::Inherit)
    }
}

/// Owner, group and mode to enforce on a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionSpec {
    pub owner: Setting<String>,
    pub group: Setting<String>,
    pub mode: Setting<u32>,
}

impl PermissionSpec {
    /// Leave everything as is.
    pub fn as_is() -> Self {
        Self::default()
    }

    /// Inherit everything from the parent directory.
    pub fn inherit() -> Self {
        Self {
            owner: Setting::Inherit,
            group: Setting::Inherit,
            mode: Setting::Inherit,
        }
    }

    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode: Setting::Value(mode),
            ..Self::default()
        }
    }

    fn is_noop(&self) -> bool {
        self.owner.is_as_is() && self.group.is_as_is() && self.mode.is_as_is()
    }

    fn needs_parent(&self) -> bool {
        self.owner.is_inherit() || self.group.is_inherit() || self.mode.is_inherit()
    }

    /// Parse the per-segment form `"/<spec>/<spec>/..."` used by
    /// [`Fs::ensure_path`]. The leading empty element stands for `/` and is
    /// dropped.
    ///
    /// ```
    /// use upset::resources::PermissionSpec;
    /// let specs = PermissionSpec::parse_path("/-/root,root,755/.").unwrap();
    /// assert_eq!(specs.len(), 3);
    /// ```
    pub fn parse_path(s: &str) -> Result<Vec<PermissionSpec>> {
        let rest = s.strip_prefix('/').ok_or_else(|| {
            Error::Contract(format!("permission path \"{}\" must start with '/'", s))
        })?;
        if rest.is_empty() {
            return Ok(Vec::new());
        }
        rest.split('/').map(PermissionSpec::from_str).collect()
    }
}

impl FromStr for PermissionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "-" => return Ok(Self::as_is()),
            "." => return Ok(Self::inherit()),
            _ => {}
        }

        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        let [owner, group, mode] = fields.as_slice() else {
            return Err(Error::Contract(format!(
                "permission \"{}\" must have the form owner,group,mode",
                s
            )));
        };

        let mode = match *mode {
            "-" => Setting::AsIs,
            "." => Setting::Inherit,
            m => {
                let bits = u32::from_str_radix(m, 8).map_err(|_| {
                    Error::Contract(format!("invalid octal mode \"{}\" in \"{}\"", m, s))
                })?;
                if bits > MODE_MASK {
                    return Err(Error::Contract(format!("mode {:o} out of range", bits)));
                }
                Setting::Value(bits)
            }
        };

        Ok(Self {
            owner: name_setting(owner),
            group: name_setting(group),
            mode,
        })
    }
}

fn name_setting(field: &str) -> Setting<String> {
    match field {
        "-" | "" => Setting::AsIs,
        "." => Setting::Inherit,
        name => Setting::Value(name.to_string()),
    }
}

impl fmt::Display for PermissionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |s: &Setting<String>| match s {
            Setting::AsIs => "-".to_string(),
            Setting::Inherit => ".".to_string(),
            Setting::Value(v) => v.clone(),
        };
        let mode = match self.mode {
            Setting::AsIs => "-".to_string(),
            Setting::Inherit => ".".to_string(),
            Setting::Value(m) => format!("{:o}", m),
        };
        write!(f, "{},{},{}", name(&self.owner), name(&self.group), mode)
    }
}

impl TryFrom<String> for PermissionSpec {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PermissionSpec> for String {
    fn from(spec: PermissionSpec) -> Self {
        spec.to_string()
    }
}

impl Fs {
    /// Enforce `spec` on `path`.
    ///
    /// Symlinks are never touched. Inherited fields are read from the
    /// resolved parent directory at call time. Mode is applied before
    /// ownership; owner and group are changed independently and only when
    /// they differ. Unknown user or group names fail before anything changes.
    pub fn ensure_permissions(&self, path: &Path, spec: &PermissionSpec) -> Result<Outcome> {
        let _enter = self.span.enter();
        if spec.is_noop() {
            return Ok(Outcome::Unchanged);
        }
        if entry_kind(path) == Some(EntryKind::Symlink) {
            warn!(path = %path.display(), "not changing permissions of a symlink");
            return Ok(Outcome::Unchanged);
        }

        let meta = fs::metadata(path).map_err(|e| fs_err(FsOp::Stat, path, e))?;
        let parent = if spec.needs_parent() {
            let resolved = fs::canonicalize(path).map_err(|e| fs_err(FsOp::Canonicalize, path, e))?;
            let parent = resolved.parent().ok_or_else(|| {
                Error::Contract(format!(
                    "cannot inherit permissions for \"{}\": it has no parent",
                    path.display()
                ))
            })?;
            Some(fs::metadata(parent).map_err(|e| fs_err(FsOp::Stat, parent, e))?)
        } else {
            None
        };

        let uid = match &spec.owner {
            Setting::AsIs => None,
            Setting::Inherit => parent.as_ref().map(|p| p.uid()),
            Setting::Value(name) => Some(lookup_user(name)?),
        };
        let gid = match &spec.group {
            Setting::AsIs => None,
            Setting::Inherit => parent.as_ref().map(|p| p.gid()),
            Setting::Value(name) => Some(lookup_group(name)?),
        };
        let mode = match spec.mode {
            Setting::AsIs => None,
            Setting::Inherit => parent.as_ref().map(|p| p.mode() & MODE_MASK),
            Setting::Value(m) => Some(m),
        };

        let mut outcome = Outcome::Unchanged;

        if let Some(mode) = mode {
            if meta.mode() & MODE_MASK != mode {
                info!(path = %path.display(), mode = %format!("{:o}", mode), "changing mode");
                fs::set_permissions(path, fs::Permissions::from_mode(mode))
                    .map_err(|e| fs_err(FsOp::Chmod, path, e))?;
                outcome = Outcome::Changed;
            }
        }

        if let Some(uid) = uid {
            if meta.uid() != uid {
                info!(path = %path.display(), uid, "changing owner");
                std::os::unix::fs::lchown(path, Some(uid), None)
                    .map_err(|e| fs_err(FsOp::Chown, path, e))?;
                outcome = Outcome::Changed;
            }
        }

        if let Some(gid) = gid {
            if meta.gid() != gid {
                info!(path = %path.display(), gid, "changing group");
                std::os::unix::fs::lchown(path, None, Some(gid))
                    .map_err(|e| fs_err(FsOp::Chown, path, e))?;
                outcome = Outcome::Changed;
            }
        }

        Ok(outcome)
    }
}

fn lookup_user(name: &str) -> Result<u32> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user.uid.as_raw()),
        _ => Err(Error::UnknownOwner(name.to_string())),
    }
}

fn lookup_group(name: &str) -> Result<u32> {
    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group.gid.as_raw()),
        _ => Err(Error::UnknownGroup(name.to_string())),
    }
}
