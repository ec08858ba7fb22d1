//! Plan loading and validation.
//!
//! A plan file holds an ordered sequence of task descriptors. `.json` files
//! are read with serde_json, anything else with serde_yaml_ng. Loading
//! distinguishes three failures:
//! - the file cannot be read
//! - the content is not a sequence of well-typed task mappings
//! - a task lacks `name` or `plugin`

use super::error::{PlanError, Result};
use super::types::{Plan, Task};
use serde_json::Value;
use std::path::Path;

const REQUIRED_FIELDS: [&str; 2] = ["name", "plugin"];

/// Read and validate a plan file from disk.
pub fn read_plan(path: &Path) -> Result<Plan> {
    let content = std::fs::read_to_string(path).map_err(|source| PlanError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    parse_plan(&content, path, is_json)
}

/// Parse a plan from a string. `origin` is only used in error messages.
pub fn parse_plan(content: &str, origin: &Path, is_json: bool) -> Result<Plan> {
    let malformed = |reason: String| PlanError::Malformed {
        path: origin.to_path_buf(),
        reason,
    };

    let raw: Value = if is_json {
        serde_json::from_str(content).map_err(|e| malformed(format!("JSON parse error: {}", e)))?
    } else {
        serde_yaml_ng::from_str(content)
            .map_err(|e| malformed(format!("YAML parse error: {}", e)))?
    };

    let items = match raw {
        Value::Array(items) => items,
        other => {
            return Err(malformed(format!(
                "expected a sequence of tasks, got {}",
                kind_of(&other)
            ))
            .into())
        }
    };

    let mut plan = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(ref map) = item else {
            return Err(malformed(format!("task #{} is {}, not a mapping", index, kind_of(&item))).into());
        };
        for field in REQUIRED_FIELDS {
            if !map.contains_key(field) {
                return Err(PlanError::MissingField { index, field }.into());
            }
        }
        let task: Task = serde_json::from_value(item)
            .map_err(|e| malformed(format!("task #{}: {}", index, e)))?;
        plan.push(task);
    }

    Ok(plan)
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    fn parse_json(s: &str) -> Result<Plan> {
        parse_plan(s, Path::new("plan.json"), true)
    }

    #[test]
    fn test_parse_valid_json() {
        let plan = parse_json(
            r#"[
  {"name": "ensure paths", "plugin": "paths",
   "foreach": [{"user": "a"}, {"user": "b"}],
   "variables": {"paths": []},
   "files": {"t": "/tmp/template"}},
  {"name": "second", "plugin": "users"}
]"#,
        )
        .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].foreach.len(), 2);
        assert_eq!(plan[0].files["t"], "/tmp/template");
        assert_eq!(plan[1].plugin, "users");
    }

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = r#"
- name: motd
  plugin: paths
  foreach:
    - user: alice
  variables:
    paths:
      - path: /etc/motd
        ensure: file
        template: motd
  files:
    motd: ./templates/motd
"#;
        let plan = parse_plan(yaml, Path::new("plan.yaml"), false).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].foreach[0]["user"], "alice");
        assert_eq!(plan[0].variables["paths"][0]["ensure"], "file");
    }

    #[test]
    fn test_parse_missing_plugin() {
        let err = parse_json(r#"[{"name": "x"}]"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Plan(PlanError::MissingField {
                index: 0,
                field: "plugin"
            })
        ));
    }

    #[test]
    fn test_parse_missing_name_second_task() {
        let err = parse_json(r#"[{"name": "x", "plugin": "p"}, {"plugin": "p"}]"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Plan(PlanError::MissingField {
                index: 1,
                field: "name"
            })
        ));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_json("[{").unwrap_err();
        assert!(matches!(err, Error::Plan(PlanError::Malformed { .. })));
    }

    #[test]
    fn test_parse_not_a_sequence() {
        let err = parse_json(r#"{"name": "x", "plugin": "p"}"#).unwrap_err();
        assert!(err.to_string().contains("expected a sequence"));
    }

    #[test]
    fn test_parse_wrong_field_type() {
        let err = parse_json(r#"[{"name": "x", "plugin": "p", "files": ["a"]}]"#).unwrap_err();
        assert!(matches!(err, Error::Plan(PlanError::Malformed { .. })));
    }

    #[test]
    fn test_read_plan_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_plan(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Plan(PlanError::Unreadable { .. })));
    }

    #[test]
    fn test_read_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"[{"name": "t", "plugin": "paths"}]"#).unwrap();
        let plan = read_plan(&path).unwrap();
        assert_eq!(plan[0].name, "t");
    }
}
