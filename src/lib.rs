//! Verification engine for recorded mobile-app interaction traces.
//!
//! Given a task spec (a DAG of milestone nodes with pluggable conditions)
//! and a trace directory (an ordered sequence of screenshots, XML dumps,
//! actions, and reasoning strings), [`verifier::verify_task`] decides
//! whether a topologically valid matching of nodes to frames exists,
//! returning the matched path, a per-node score, and a decision log.

pub mod candidates;
pub mod conditions;
pub mod dag;
pub mod error;
pub mod llm;
pub mod loader;
pub mod ocr;
pub mod options;
pub mod solver;
pub mod trace_loader;
pub mod types;
pub mod verifier;

pub use error::{Error, Result};
pub use options::{
    CheckCtx, CheckDetail, CheckOutcome, IconDetectionResult, IconDetector, IconMatchMode,
    LlmBackend, LlmContext, OcrBackend, VerifierOptions,
};
pub use types::{
    Action, ConditionSpec, Decision, DecisionLog, Frame, NodeMatch, NodeSpec, SuccessSpec,
    TaskSpec, VerifyResult,
};
pub use verifier::{verify, verify_task};
