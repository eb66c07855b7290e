use std::path::Path;

use crate::conditions::is_known_condition_type;
use crate::error::{Error, Result};
use crate::types::TaskSpec;

/// Loads a task spec from YAML or JSON, dispatched by file extension.
/// Every condition type referenced by a node is checked against the
/// checker registry at load time so unknown types fail before
/// verification starts, per the error-handling design.
pub fn load_task(path: &Path) -> Result<TaskSpec> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::trace_load(format!("cannot read task file {}: {e}", path.display())))?;

    let task: TaskSpec = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
        _ => serde_json::from_str(&raw)?,
    };

    validate(&task)?;
    Ok(task)
}

pub fn load_task_str(raw: &str, is_yaml: bool) -> Result<TaskSpec> {
    let task: TaskSpec = if is_yaml {
        serde_yaml::from_str(raw)?
    } else {
        serde_json::from_str(raw)?
    };
    validate(&task)?;
    Ok(task)
}

fn validate(task: &TaskSpec) -> Result<()> {
    if task.nodes.is_empty() {
        return Err(Error::task_load("task has no nodes"));
    }
    let mut seen = std::collections::HashSet::new();
    for node in &task.nodes {
        if node.id.is_empty() {
            return Err(Error::task_load("node id must be non-empty"));
        }
        if !seen.insert(node.id.clone()) {
            return Err(Error::task_load(format!("duplicate node id '{}'", node.id)));
        }
        if let Some(condition) = &node.condition {
            if !is_known_condition_type(&condition.condition_type) {
                return Err(Error::UnknownConditionType(condition.condition_type.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_condition_type() {
        let yaml = r#"
task_id: t1
nodes:
  - id: a
    condition:
      type: not_a_real_checker
      params: {}
"#;
        let err = load_task_str(yaml, true).unwrap_err();
        assert!(matches!(err, Error::UnknownConditionType(_)));
    }

    #[test]
    fn loads_minimal_yaml_task() {
        let yaml = r#"
task_id: login_flow
nodes:
  - id: a
    condition:
      type: text
      params:
        any: ["login"]
success:
  any_of: [a]
"#;
        let task = load_task_str(yaml, true).unwrap();
        assert_eq!(task.task_id, "login_flow");
        assert_eq!(task.nodes.len(), 1);
    }
}
