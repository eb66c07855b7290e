use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dagverify::{
    verify, Action, ConditionSpec, Frame, IconDetectionResult, IconDetector, IconMatchMode,
    LlmBackend, LlmContext, NodeSpec, OcrBackend, Result, SuccessSpec, TaskSpec, VerifierOptions,
};

fn text_node(id: &str, next: &[&str], deps: &[&str], keyword: &str) -> NodeSpec {
    NodeSpec {
        id: id.to_string(),
        name: None,
        deps: deps.iter().map(|s| s.to_string()).collect(),
        next: next.iter().map(|s| s.to_string()).collect(),
        condition: Some(ConditionSpec {
            condition_type: "text".to_string(),
            params: serde_json::json!({ "any": [keyword] }),
        }),
        score: 10,
    }
}

fn frame_with_text(index: usize, text: &str) -> Frame {
    Frame {
        index,
        text: text.to_string(),
        prev: index.checked_sub(1),
        next: Some(index + 1),
        ..Frame::blank()
    }
}

fn linear_frames(texts: &[&str]) -> Vec<Frame> {
    let mut frames: Vec<Frame> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| frame_with_text(i, t))
        .collect();
    let len = frames.len();
    for (i, f) in frames.iter_mut().enumerate() {
        f.next = if i + 1 < len { Some(i + 1) } else { None };
    }
    frames
}

#[tokio::test]
async fn s1_linear_chain_matches_in_order() {
    let task = TaskSpec {
        task_id: "s1".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![
            text_node("a", &["b"], &[], "alpha"),
            text_node("b", &["c"], &[], "bravo"),
            text_node("c", &[], &[], "charlie"),
        ],
        success: Some(SuccessSpec {
            any_of: vec!["c".to_string()],
            all_of: vec![],
        }),
    };
    let frames = linear_frames(&["", "alpha", "", "bravo", "", "charlie"]);
    let options = VerifierOptions::new();

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(result.ok);
    assert_eq!(result.total_score, 30);
    let matched: Vec<(String, usize)> = result
        .matched
        .iter()
        .map(|m| (m.node_id.clone(), m.frame_index))
        .collect();
    assert_eq!(
        matched,
        vec![
            ("a".to_string(), 1),
            ("b".to_string(), 3),
            ("c".to_string(), 5)
        ]
    );
}

#[tokio::test]
async fn s2_missing_keyword_yields_partial_failure() {
    let task = TaskSpec {
        task_id: "s2".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![
            text_node("a", &["b"], &[], "alpha"),
            text_node("b", &["c"], &[], "bravo"),
            text_node("c", &[], &[], "charlie"),
        ],
        success: Some(SuccessSpec {
            any_of: vec!["c".to_string()],
            all_of: vec![],
        }),
    };
    // "bravo" never appears.
    let frames = linear_frames(&["", "alpha", "", "", "", "charlie"]);
    let options = VerifierOptions::new();

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(!result.ok);
    assert_eq!(result.total_score, 10);
    assert_eq!(result.matched.len(), 1);
    assert_eq!(result.matched[0].node_id, "a");
    assert_eq!(result.matched[0].frame_index, 1);
}

#[tokio::test]
async fn s3_diamond_and_child_is_strictly_later_than_its_dep() {
    let task = TaskSpec {
        task_id: "s3".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![
            text_node("a", &["b", "c"], &[], "start"),
            text_node("b", &[], &[], "b_ready"),
            text_node("c", &["d"], &[], "c_ready"),
            NodeSpec {
                id: "d".to_string(),
                name: None,
                deps: vec!["b".to_string()],
                next: vec![],
                condition: Some(ConditionSpec {
                    condition_type: "text".to_string(),
                    params: serde_json::json!({ "any": ["d_ready"] }),
                }),
                score: 10,
            },
        ],
        success: Some(SuccessSpec {
            any_of: vec!["d".to_string()],
            all_of: vec![],
        }),
    };
    let frames = linear_frames(&[
        "start", "", "c_ready", "", "b_ready d_ready", "d_ready",
    ]);
    let options = VerifierOptions::new();

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(result.ok);
    let d_match = result.matched.iter().find(|m| m.node_id == "d").unwrap();
    assert_eq!(d_match.frame_index, 5);
    let b_match = result.matched.iter().find(|m| m.node_id == "b").unwrap();
    assert!(d_match.frame_index > b_match.frame_index);
}

struct StubOcr;

#[async_trait]
impl OcrBackend for StubOcr {
    async fn recognize(&self, frame: &Frame) -> Result<Option<String>> {
        if frame.index >= 2 {
            Ok(Some("target screen".to_string()))
        } else {
            Ok(Some("home screen".to_string()))
        }
    }
}

#[tokio::test]
async fn s4_exclusive_ocr_nodes_cannot_share_a_frame() {
    let task = TaskSpec {
        task_id: "s4".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![
            NodeSpec {
                id: "n1".to_string(),
                name: None,
                deps: vec![],
                next: vec!["n2".to_string()],
                condition: Some(ConditionSpec {
                    condition_type: "escalate".to_string(),
                    params: serde_json::json!({ "ocr": { "any": ["target"] } }),
                }),
                score: 10,
            },
            NodeSpec {
                id: "n2".to_string(),
                name: None,
                deps: vec![],
                next: vec![],
                condition: Some(ConditionSpec {
                    condition_type: "escalate".to_string(),
                    params: serde_json::json!({ "ocr": { "any": ["target"] } }),
                }),
                score: 10,
            },
        ],
        success: Some(SuccessSpec {
            any_of: vec!["n2".to_string()],
            all_of: vec![],
        }),
    };
    let frames = linear_frames(&["", "", "", "", "", ""]);
    let options = VerifierOptions::new().with_ocr(Arc::new(StubOcr));

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(result.ok);
    let n1_match = result.matched.iter().find(|m| m.node_id == "n1").unwrap();
    let n2_match = result.matched.iter().find(|m| m.node_id == "n2").unwrap();
    assert_eq!(n1_match.frame_index, 2);
    assert_eq!(n2_match.frame_index, 3);
    assert_ne!(n1_match.frame_index, n2_match.frame_index);
}

struct FlakyLlm {
    attempts: AtomicU32,
}

#[async_trait]
impl LlmBackend for FlakyLlm {
    async fn judge(&self, _ctx: LlmContext<'_>) -> Result<Option<bool>> {
        // Simulates the adjudicator's own retry loop recovering from one
        // malformed response before a clean "yes" verdict.
        let mut attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == 1 {
            attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        }
        assert!(attempt <= 3);
        Ok(Some(true))
    }
}

#[tokio::test]
async fn s5_llm_checker_reports_true_after_internal_retry() {
    let task = TaskSpec {
        task_id: "s5".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![NodeSpec {
            id: "n1".to_string(),
            name: None,
            deps: vec![],
            next: vec![],
            condition: Some(ConditionSpec {
                condition_type: "llm".to_string(),
                params: serde_json::json!({ "prompt": "Is the button pressed?" }),
            }),
            score: 10,
        }],
        success: None,
    };
    let frames = linear_frames(&["", "", ""]);
    let options = VerifierOptions::new().with_llm(Arc::new(FlakyLlm {
        attempts: AtomicU32::new(0),
    }));

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(result.ok);
    assert_eq!(result.matched[0].node_id, "n1");
}

#[tokio::test]
async fn s6_all_of_success_with_one_missing_node_fails_without_manual_review() {
    let task = TaskSpec {
        task_id: "s6".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![
            text_node("x", &[], &[], "x_done"),
            text_node("y", &[], &[], "y_done"),
        ],
        success: Some(SuccessSpec {
            any_of: vec![],
            all_of: vec!["x".to_string(), "y".to_string()],
        }),
    };
    let frames = linear_frames(&["", "x_done", "", ""]);
    let options = VerifierOptions::new();

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(!result.ok);
    assert!(result.matched.iter().any(|m| m.node_id == "x"));
    assert!(!result.matched.iter().any(|m| m.node_id == "y"));
    assert!(!result.manual_review_needed);
}

#[tokio::test]
async fn manual_review_flagged_when_escalate_has_no_capability() {
    let task = TaskSpec {
        task_id: "manual_review".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![NodeSpec {
            id: "n1".to_string(),
            name: None,
            deps: vec![],
            next: vec![],
            condition: Some(ConditionSpec {
                condition_type: "escalate".to_string(),
                params: serde_json::json!({ "llm": { "prompt": "anything?" } }),
            }),
            score: 10,
        }],
        success: None,
    };
    let frames = linear_frames(&["", "", ""]);
    let options = VerifierOptions::new(); // no ocr/llm wired in

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(!result.ok);
    assert!(result.manual_review_needed);
}

struct AlwaysFailIcons;

#[async_trait]
impl IconDetector for AlwaysFailIcons {
    async fn detect(
        &self,
        _frame: &Frame,
        _icon_names: &[String],
        _app_id: Option<&str>,
        _threshold: Option<f64>,
        _mode: IconMatchMode,
    ) -> Result<IconDetectionResult> {
        Ok(IconDetectionResult {
            success: false,
            matched_icons: vec![],
            unmatched_icons: vec!["gear".to_string()],
            details: Some("icon not found".to_string()),
        })
    }
}

struct AlwaysTrueLlm;

#[async_trait]
impl LlmBackend for AlwaysTrueLlm {
    async fn judge(&self, _ctx: LlmContext<'_>) -> Result<Option<bool>> {
        Ok(Some(true))
    }
}

#[tokio::test]
async fn escalate_continues_past_failed_icons_when_llm_is_available() {
    let task = TaskSpec {
        task_id: "escalate_continue".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![NodeSpec {
            id: "n1".to_string(),
            name: None,
            deps: vec![],
            next: vec![],
            condition: Some(ConditionSpec {
                condition_type: "escalate".to_string(),
                params: serde_json::json!({
                    "icons": { "any": ["gear"] },
                    "llm": { "prompt": "settings open?" }
                }),
            }),
            score: 10,
        }],
        success: None,
    };
    let frames = linear_frames(&["", ""]);
    let options = VerifierOptions::new()
        .with_icons(Arc::new(AlwaysFailIcons))
        .with_llm(Arc::new(AlwaysTrueLlm));

    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(result.ok, "escalate should fall through to llm after icons miss");
}

#[tokio::test]
async fn action_condition_matches_typed_action() {
    let mut frame = Frame::blank();
    frame.index = 1;
    frame.action = Some(Action::Click {
        target: Some("login_button".to_string()),
        x: None,
        y: None,
    });
    let frames = vec![Frame::blank(), frame];

    let task = TaskSpec {
        task_id: "action".to_string(),
        app_id: None,
        task_type: None,
        description: None,
        nodes: vec![NodeSpec {
            id: "n1".to_string(),
            name: None,
            deps: vec![],
            next: vec![],
            condition: Some(ConditionSpec {
                condition_type: "action".to_string(),
                params: serde_json::json!({ "type": "click", "contains": { "target": "login_button" } }),
            }),
            score: 5,
        }],
        success: None,
    };
    let options = VerifierOptions::new();
    let result = verify(&task, &frames, &options).await.unwrap();
    assert!(result.ok);
    assert_eq!(result.matched[0].frame_index, 1);
}
