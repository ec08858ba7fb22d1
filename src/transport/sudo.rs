//! Non-interactive privilege escalation.
//!
//! The line `echo "<secret>" | sudo [-u USER] -S --prompt= -- <command>` is
//! base64-encoded and shipped as `echo <blob> | base64 -d | sh`. Only the
//! blob appears in argv; the target shell decodes and evaluates it. The
//! command itself must be trusted.

use crate::core::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Build and encode the `sudo` line for `parts`.
pub fn encode_privileged_line(parts: &[String], secret: &str, run_as: Option<&str>) -> String {
    let user = match run_as {
        Some(u) if !u.is_empty() && u != "root" => format!("-u {} ", u),
        _ => String::new(),
    };
    let line = format!(
        "echo \"{}\" | sudo {}-S --prompt= -- {}\n",
        double_quote_escape(secret),
        user,
        parts.join(" ")
    );
    STANDARD.encode(line)
}

/// Parts that decode `encoded` and evaluate it with `sh`.
pub fn decode_and_eval(encoded: &str) -> Vec<String> {
    ["echo", encoded, "|", "base64", "-d", "|", "sh"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Decode a blob produced by [`encode_privileged_line`].
pub fn decode_line(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Payload(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Payload(format!("invalid UTF-8: {}", e)))
}

/// Escape the characters that stay special inside double quotes.
fn double_quote_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
