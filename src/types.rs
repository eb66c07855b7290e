use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded step of a trace: a screenshot, an accessibility-tree dump,
/// a recorded action, and the agent's reasoning for taking it.
///
/// Frame 0 is a synthetic blank prelude inserted by the trace loader; real
/// frames start at index 1. `prev`/`next` are indices into the owning
/// `Vec<Frame>`, not references, so the sequence has no internal cycles.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub index: usize,
    pub image: Option<std::path::PathBuf>,
    pub xml_text: String,
    pub reasoning: Option<String>,
    pub action: Option<Action>,
    pub text: String,
    pub ui: HashMap<String, Value>,
    pub task_description: String,
    pub app_name: String,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl Frame {
    pub fn blank() -> Self {
        Frame {
            index: 0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
    },
    Input {
        #[serde(default)]
        text: Option<String>,
    },
    Swipe {
        #[serde(default)]
        direction: Option<String>,
    },
    LongPress {
        #[serde(default)]
        target: Option<String>,
    },
    Done,
    OpenApp {
        #[serde(default)]
        app_name: Option<String>,
    },
    Wait {
        #[serde(default)]
        duration_ms: Option<u64>,
    },
}

impl Action {
    /// `type` discriminant as the original schema spells it, used by the
    /// `action` checker's `type` parameter match.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Input { .. } => "input",
            Action::Swipe { .. } => "swipe",
            Action::LongPress { .. } => "long_press",
            Action::Done => "done",
            Action::OpenApp { .. } => "open_app",
            Action::Wait { .. } => "wait",
        }
    }

    /// Best-effort text representation, used to build `Frame::text`.
    pub fn text(&self) -> Option<String> {
        match self {
            Action::Input { text } => text.clone(),
            Action::Click { target, .. } => target.clone(),
            Action::Swipe { direction } => direction.clone(),
            Action::LongPress { target } => target.clone(),
            Action::OpenApp { app_name } => app_name.clone(),
            _ => None,
        }
    }
}

/// A discriminated `{type, params}` condition. `params` is kept as raw
/// JSON since legal keys depend on `condition_type` and combinators nest
/// an entire sub-checker config map inside their own params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default)]
    pub condition: Option<ConditionSpec>,
    #[serde(default = "default_score")]
    pub score: i64,
}

fn default_score() -> i64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SuccessSpec {
    #[serde(default)]
    pub any_of: Vec<String>,
    #[serde(default)]
    pub all_of: Vec<String>,
}

impl SuccessSpec {
    pub fn is_empty(&self) -> bool {
        self.any_of.is_empty() && self.all_of.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default = "default_task_id")]
    pub task_id: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub success: Option<SuccessSpec>,
}

fn default_task_id() -> String {
    "task".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMatch {
    pub node_id: String,
    pub frame_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Hit,
    Miss,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionLog {
    pub frame_index: usize,
    pub node_id: String,
    pub strategy: String,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checker_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checker_result: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub matched_keywords: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unmatched_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    pub ok: bool,
    pub matched: Vec<NodeMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub logs: Vec<DecisionLog>,
    pub manual_review_needed: bool,
    pub total_score: i64,
}
