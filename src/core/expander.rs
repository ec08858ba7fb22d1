//! Variable expansion: substitutes one iteration's binding into a task.
//!
//! Every string leaf (and every mapping key) of the `variables` and `files`
//! trees is formatted against the binding: `{name}` is replaced by the bound
//! value, `{{` and `}}` produce literal braces. A placeholder naming an
//! unbound variable fails the whole expansion; nothing is partially applied.

use super::error::ExpansionError;
use super::types::{Binding, ExpandedTask, Task};
use serde_json::{Map, Value};

/// Expand a task for one iteration. The source task is left untouched.
pub fn expand_task(task: &Task, binding: &Binding) -> Result<ExpandedTask, ExpansionError> {
    let variables = expand_value(&task.variables, binding)?;
    let mut files = indexmap::IndexMap::with_capacity(task.files.len());
    for (name, path) in &task.files {
        files.insert(expand_str(name, binding)?, expand_str(path, binding)?);
    }
    Ok(ExpandedTask {
        name: task.name.clone(),
        plugin: task.plugin.clone(),
        variables,
        files,
    })
}

/// Recursively expand every string leaf and mapping key of a tree.
pub fn expand_value(value: &Value, binding: &Binding) -> Result<Value, ExpansionError> {
    match value {
        Value::String(s) => Ok(Value::String(expand_str(s, binding)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| expand_value(item, binding))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(expand_str(k, binding)?, expand_value(v, binding)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Format a single string against the binding.
pub fn expand_str(template: &str, binding: &Binding) -> Result<String, ExpansionError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let rest = &template[pos + 1..];
                let close = rest.find('}').ok_or_else(|| malformed(template, "unclosed '{'"))?;
                let name = &rest[..close];
                if name.is_empty() {
                    return Err(malformed(template, "empty placeholder"));
                }
                if name.contains('{') {
                    return Err(malformed(template, "nested '{'"));
                }
                let value = binding.get(name).ok_or_else(|| ExpansionError::Unresolved {
                    name: name.to_string(),
                    template: template.to_string(),
                    binding: describe(binding),
                })?;
                out.push_str(value);
                // skip past the placeholder and its closing brace
                for _ in 0..name.chars().count() + 1 {
                    chars.next();
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(malformed(template, "single '}'"));
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn malformed(template: &str, reason: &str) -> ExpansionError {
    ExpansionError::Malformed {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

fn describe(binding: &Binding) -> String {
    serde_json::to_string(binding).unwrap_or_else(|_| format!("{:?}", binding))
}
