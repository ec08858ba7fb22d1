//! `$name` templates.
//!
//! Supports `$name`, `${name}` and `$$` (a literal dollar). Names not present
//! in the substitution map, and any `$` that does not start a placeholder,
//! are left verbatim; substitution never fails.

use crate::core::error::{fs_err, FsOp, Result};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::path::PathBuf;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(?P<escaped>\$)|(?P<named>[_A-Za-z][_A-Za-z0-9]*)|\{(?P<braced>[_A-Za-z][_A-Za-z0-9]*)\})")
        .expect("placeholder pattern is valid")
});

/// A template file and the values substituted into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub source: PathBuf,
    pub substitutions: IndexMap<String, String>,
}

impl Template {
    pub fn new(source: impl Into<PathBuf>, substitutions: IndexMap<String, String>) -> Self {
        Self {
            source: source.into(),
            substitutions,
        }
    }

    /// Read the source and substitute every known placeholder.
    pub fn render(&self) -> Result<String> {
        let text = std::fs::read_to_string(&self.source)
            .map_err(|e| fs_err(FsOp::ReadTemplate, &self.source, e))?;
        Ok(substitute(&text, &self.substitutions))
    }
}

/// Substitute `$name` placeholders, leaving unknown ones untouched.
pub fn substitute(text: &str, substitutions: &IndexMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            if caps.name("escaped").is_some() {
                return "$".to_string();
            }
            let name = caps
                .name("named")
                .or_else(|| caps.name("braced"))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match substitutions.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
