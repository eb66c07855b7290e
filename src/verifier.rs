use std::path::Path;

use tracing::instrument;

use crate::candidates::collect_candidates;
use crate::conditions::is_known_condition_type;
use crate::dag::Dag;
use crate::error::Result;
use crate::loader::load_task;
use crate::options::VerifierOptions;
use crate::solver::{evaluate, solve};
use crate::trace_loader::load_frames_from_dir;
use crate::types::{TaskSpec, VerifyResult};

/// Verifies a trace directory against a task spec file. Fatal spec-load
/// or trace-load errors return `Err`; everything else (partial success,
/// checker misses) is reported inside `VerifyResult`.
#[instrument(skip(options))]
pub async fn verify_task(
    task_path: &Path,
    trace_dir: &Path,
    options: &VerifierOptions,
) -> Result<VerifyResult> {
    let task = load_task(task_path)?;
    let frames = load_frames_from_dir(trace_dir)?;
    verify(&task, &frames, options).await
}

/// Same as [`verify_task`] but with an already-loaded task and frame
/// sequence, useful for callers that assemble traces in-process (and for
/// tests).
#[instrument(skip(task, frames, options))]
pub async fn verify(task: &TaskSpec, frames: &[crate::types::Frame], options: &VerifierOptions) -> Result<VerifyResult> {
    let dag = Dag::build(task.nodes.clone())?;

    let success = task.success.clone().unwrap_or_default();
    let default_sinks = dag.sinks();
    let success_nodes: Vec<String> = if success.is_empty() {
        default_sinks.clone()
    } else {
        let mut all: Vec<String> = success.any_of.iter().chain(success.all_of.iter()).cloned().collect();
        all.sort();
        all.dedup();
        all
    };
    dag.log_possible_paths(&success_nodes);

    let collected = collect_candidates(&dag, frames, options).await?;
    let (min_idx, prev) = solve(&dag, &collected.candidates);
    let outcome = evaluate(&dag, &success, &default_sinks, &min_idx, &prev, &collected.logs);

    let manual_review_needed = !outcome.ok && task_has_escalate(task) && !options.has_escalation_capability();

    Ok(VerifyResult {
        ok: outcome.ok,
        matched: outcome.matched,
        reason: outcome.reason,
        logs: collected.logs,
        manual_review_needed,
        total_score: outcome.total_score,
    })
}

fn task_has_escalate(task: &TaskSpec) -> bool {
    task.nodes
        .iter()
        .any(|n| n.condition.as_ref().map(|c| c.condition_type == "escalate").unwrap_or(false))
}

/// Validates that every condition type used by `task` is known and, for
/// escalate/juxtaposition combinators, that their sub-configs resolve to
/// known checker names too. Exposed separately from `load_task`'s own
/// validation so callers building a `TaskSpec` in-process (bypassing the
/// file loader) can still get the same guarantee.
pub fn validate_condition_types(task: &TaskSpec) -> Result<()> {
    for node in &task.nodes {
        if let Some(condition) = &node.condition {
            if !is_known_condition_type(&condition.condition_type) {
                return Err(crate::error::Error::UnknownConditionType(condition.condition_type.clone()));
            }
            if matches!(condition.condition_type.as_str(), "escalate" | "juxtaposition") {
                if let Some(map) = condition.params.as_object() {
                    for key in map.keys() {
                        if !is_known_condition_type(key) {
                            return Err(crate::error::Error::UnknownConditionType(key.clone()));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
