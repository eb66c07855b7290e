use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::types::Frame;

/// Result of a sub-checker invocation, propagated up the call chain
/// instead of being stashed on the frame. The collector attaches `detail`
/// directly to the `DecisionLog` entry it writes for this attempt.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub matched: bool,
    pub checker_type: Option<String>,
    pub detail: Option<CheckDetail>,
}

impl CheckOutcome {
    pub fn miss() -> Self {
        CheckOutcome::default()
    }

    pub fn hit() -> Self {
        CheckOutcome {
            matched: true,
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: CheckDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_checker_type(mut self, checker_type: impl Into<String>) -> Self {
        self.checker_type = Some(checker_type.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckDetail {
    pub checker_result: Option<String>,
    pub matched_keywords: Vec<String>,
    pub unmatched_keywords: Vec<String>,
}

/// `options.ocr(frame) -> string | null` from the external interfaces
/// section. Returns the text the backend recognized (possibly merged
/// with accessibility-tree text); `Ok(None)` means recognition produced
/// nothing usable, which the ocr checker treats as a miss.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn recognize(&self, frame: &Frame) -> Result<Option<String>>;
}

/// `options.llm(ctx) -> true | false | null`.
pub struct LlmContext<'a> {
    pub frame: &'a Frame,
    pub prev_frame: Option<&'a Frame>,
    pub next_frame: Option<&'a Frame>,
    pub prompt: String,
    pub expected_true: bool,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn judge(&self, ctx: LlmContext<'_>) -> Result<Option<bool>>;
}

/// `detect(image, icon_names, app_id?, threshold?, mode) -> {success, matched_icons, unmatched_icons, details}`.
#[derive(Debug, Clone, Default)]
pub struct IconDetectionResult {
    pub success: bool,
    pub matched_icons: Vec<String>,
    pub unmatched_icons: Vec<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconMatchMode {
    Any,
    All,
}

#[async_trait]
pub trait IconDetector: Send + Sync {
    async fn detect(
        &self,
        frame: &Frame,
        icon_names: &[String],
        app_id: Option<&str>,
        threshold: Option<f64>,
        mode: IconMatchMode,
    ) -> Result<IconDetectionResult>;
}

/// Verification options. Construct with `VerifierOptions::new()` and the
/// builder methods below; defaults mirror the original system's.
#[derive(Clone)]
pub struct VerifierOptions {
    pub ocr: Option<Arc<dyn OcrBackend>>,
    pub llm: Option<Arc<dyn LlmBackend>>,
    pub icons: Option<Arc<dyn IconDetector>>,
    pub escalation_order: Vec<String>,
    pub log_decisions: bool,
    pub force_llm_verification: bool,
    /// Kept for interface compatibility with the original options struct;
    /// its behavior is always folded into the single frame-exclusivity
    /// invariant implemented by the candidate collector (see DESIGN.md).
    pub prevent_frame_backtrack: bool,
    pub ocr_frame_exclusive: bool,
    pub llm_frame_exclusive: bool,
    pub max_llm_retries: u32,
    pub llm_retry_delay: Duration,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        VerifierOptions {
            ocr: None,
            llm: None,
            icons: None,
            escalation_order: default_escalation_order(),
            log_decisions: true,
            force_llm_verification: false,
            prevent_frame_backtrack: true,
            ocr_frame_exclusive: true,
            llm_frame_exclusive: true,
            max_llm_retries: 3,
            llm_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Default order per the stated default in the requirements document:
/// `text, regex, ui, action, dynamic_match, icons, ocr, llm`.
pub fn default_escalation_order() -> Vec<String> {
    vec![
        "text".to_string(),
        "regex".to_string(),
        "ui".to_string(),
        "action".to_string(),
        "dynamic_match".to_string(),
        "icons".to_string(),
        "ocr".to_string(),
        "llm".to_string(),
    ]
}

impl VerifierOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrBackend>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmBackend>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_icons(mut self, icons: Arc<dyn IconDetector>) -> Self {
        self.icons = Some(icons);
        self
    }

    pub fn with_escalation_order(mut self, order: Vec<String>) -> Self {
        self.escalation_order = order;
        self
    }

    pub fn with_force_llm_verification(mut self, force: bool) -> Self {
        self.force_llm_verification = force;
        self
    }

    pub fn with_max_llm_retries(mut self, retries: u32) -> Self {
        self.max_llm_retries = retries;
        self
    }

    pub fn with_llm_retry_delay(mut self, delay: Duration) -> Self {
        self.llm_retry_delay = delay;
        self
    }

    pub fn has_escalation_capability(&self) -> bool {
        self.ocr.is_some() || self.llm.is_some()
    }
}

/// A condition evaluation request, threaded through checkers and
/// combinators alike.
pub struct CheckCtx<'a> {
    pub node_id: &'a str,
    pub frame: &'a Frame,
    pub frames: &'a [Frame],
    pub options: &'a VerifierOptions,
}
