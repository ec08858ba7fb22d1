//! Plan, task and payload types.
//!
//! A plan is an ordered list of tasks. Each task names a plugin, carries a
//! free-form `variables` tree and a map of named file references, and is
//! invoked once per `foreach` binding. All types derive Serialize/Deserialize
//! so plans and plugin payloads roundtrip through JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One iteration's substitution values.
pub type Binding = IndexMap<String, String>;

// ============================================================================
// Plan
// ============================================================================

/// Ordered sequence of tasks executed against one target.
pub type Plan = Vec<Task>;

/// One declarative unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Human-readable task name
    pub name: String,

    /// Plugin executable to invoke on the target
    pub plugin: String,

    /// Per-iteration bindings; the task runs once per entry
    #[serde(default, deserialize_with = "deserialize_bindings")]
    pub foreach: Vec<Binding>,

    /// Arbitrary nested tree handed to the plugin
    #[serde(default = "empty_tree")]
    pub variables: Value,

    /// Logical name -> local path of files shipped with the task
    #[serde(default)]
    pub files: IndexMap<String, String>,
}

fn empty_tree() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Task {
    /// Bindings to iterate over. A task without `foreach` runs exactly once
    /// with an empty binding.
    pub fn iterations(&self) -> Vec<Binding> {
        if self.foreach.is_empty() {
            vec![Binding::new()]
        } else {
            self.foreach.clone()
        }
    }
}

/// Accept scalar binding values (`"id": 4201`) and store them as strings.
fn deserialize_bindings<'de, D>(deserializer: D) -> Result<Vec<Binding>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<IndexMap<String, Value>> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|entry| {
            entry
                .into_iter()
                .map(|(k, v)| match scalar_to_string(&v) {
                    Some(s) => Ok((k, s)),
                    None => Err(serde::de::Error::custom(format!(
                        "foreach value for '{}' must be a scalar",
                        k
                    ))),
                })
                .collect()
        })
        .collect()
}

/// Convert a scalar JSON value to its string form. Returns `None` for
/// sequences and mappings.
pub fn scalar_to_string(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

// ============================================================================
// Expanded task
// ============================================================================

/// A task with one iteration's binding substituted into every string leaf.
/// Created right before an invocation, discarded after it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedTask {
    pub name: String,
    pub plugin: String,
    pub variables: Value,
    pub files: IndexMap<String, String>,
}

// ============================================================================
// Plugin payload
// ============================================================================

/// The single argument a plugin receives, base64-encoded JSON on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub name: String,
    pub plugin: String,
    #[serde(default = "empty_tree")]
    pub variables: Value,

    /// Logical name -> file name inside the remote workspace
    #[serde(default)]
    pub files: IndexMap<String, String>,

    /// The binding of the current iteration
    #[serde(rename = "for", default)]
    pub binding: Binding,
}

// ============================================================================
// Run summary
// ============================================================================

/// Counts reported after a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tasks: usize,
    pub invocations: usize,
    pub plugins_sent: usize,
    pub files_sent: usize,
}
