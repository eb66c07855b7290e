use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{Action, Frame};

#[derive(Debug, Default, Deserialize)]
struct ActionsFile {
    task_description: Option<String>,
    #[serde(default)]
    old_task_description: Option<String>,
    app_name: Option<String>,
    #[serde(default)]
    actions: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ReactEntry {
    reasoning: Option<String>,
    action: Option<Value>,
    #[serde(default)]
    parameters: HashMap<String, Value>,
}

/// Builds a frame sequence from a trace directory. Frame 0 is a synthetic
/// blank prelude; real frames start at 1 and are ordered by the integer
/// index embedded in their `<i>.jpg`/`<i>.xml` filenames.
pub fn load_frames_from_dir(folder: &Path) -> Result<Vec<Frame>> {
    if !folder.is_dir() {
        return Err(Error::trace_load(format!("no such directory: {}", folder.display())));
    }

    let actions_file = read_json::<ActionsFile>(&folder.join("actions.json"))?.unwrap_or_default();
    let react_entries = read_json::<Vec<ReactEntry>>(&folder.join("react.json"))?.unwrap_or_default();

    let mut indices: Vec<u64> = Vec::new();
    for entry in WalkDir::new(folder).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(ext) = entry.path().extension().and_then(|s| s.to_str()) else {
            continue;
        };
        if ext == "jpg" || ext == "xml" {
            if let Ok(idx) = stem.parse::<u64>() {
                indices.push(idx);
            }
        }
    }
    indices.sort_unstable();
    indices.dedup();

    let package_re = Regex::new(r#"package="([^"]+)""#).unwrap();
    let task_description = actions_file
        .task_description
        .clone()
        .or(actions_file.old_task_description.clone())
        .unwrap_or_default();
    let app_name = actions_file.app_name.clone().unwrap_or_default();

    let mut frames = vec![Frame {
        task_description: task_description.clone(),
        app_name: app_name.clone(),
        ..Frame::blank()
    }];

    for i in indices {
        let idx = i as usize;
        let jpg = folder.join(format!("{i}.jpg"));
        let xml = folder.join(format!("{i}.xml"));

        let image = jpg.exists().then_some(jpg);
        let xml_text = if xml.exists() {
            std::fs::read_to_string(&xml).unwrap_or_default()
        } else {
            String::new()
        };

        let mut ui = HashMap::new();
        if let Some(caps) = package_re.captures(&xml_text) {
            ui.insert("package".to_string(), Value::String(caps[1].to_string()));
        }

        let react = react_entries.get(idx.saturating_sub(1));
        let reasoning = react.and_then(|r| r.reasoning.clone());
        let action: Option<Action> = react
            .and_then(|r| r.action.clone())
            .and_then(|v| serde_json::from_value(v).ok());
        let raw_action = actions_file.actions.get(idx.saturating_sub(1)).cloned();
        let action = action.or_else(|| raw_action.clone().and_then(|v| serde_json::from_value(v).ok()));

        let mut pieces: Vec<String> = Vec::new();
        if let Some(r) = &reasoning {
            pieces.push(r.clone());
        }
        if let Some(a) = &action {
            pieces.push(a.type_name().to_string());
            if let Some(t) = a.text() {
                pieces.push(t);
            }
        }
        if let Some(r) = react {
            for v in r.parameters.values() {
                if let Some(s) = v.as_str() {
                    pieces.push(s.to_string());
                } else {
                    pieces.push(v.to_string());
                }
            }
        }

        frames.push(Frame {
            index: idx,
            image,
            xml_text,
            reasoning,
            action,
            text: pieces.join(" \n"),
            ui,
            task_description: task_description.clone(),
            app_name: app_name.clone(),
            prev: None,
            next: None,
        });
    }

    let len = frames.len();
    for (i, frame) in frames.iter_mut().enumerate() {
        frame.index = i;
        frame.prev = if i > 0 { Some(i - 1) } else { None };
        frame.next = if i + 1 < len { Some(i + 1) } else { None };
    }

    Ok(frames)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn prepends_synthetic_blank_frame() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("actions.json"),
            r#"{"task_description":"log in","app_name":"demo","actions":[{"type":"click","target":"login"}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("react.json"),
            r#"[{"reasoning":"tap login button","action":{"type":"click","target":"login"}}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("1.xml"), r#"<node package="com.example.app" />"#).unwrap();
        fs::write(dir.path().join("1.jpg"), [0u8]).unwrap();

        let frames = load_frames_from_dir(dir.path()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].index, 0);
        assert!(frames[0].image.is_none());
        assert_eq!(frames[1].ui.get("package").unwrap(), "com.example.app");
        assert!(frames[1].reasoning.as_deref() == Some("tap login button"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = load_frames_from_dir(Path::new("/nonexistent/trace/dir")).unwrap_err();
        assert!(matches!(err, Error::TraceLoad(_)));
    }
}
