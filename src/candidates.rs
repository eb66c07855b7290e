use std::collections::{HashMap, HashSet};

use crate::conditions::{condition_needs_exclusive_frame, get_checker};
use crate::dag::Dag;
use crate::error::Result;
use crate::options::{CheckCtx, CheckDetail, VerifierOptions};
use crate::types::{Decision, DecisionLog, Frame};

/// Per-node candidate frame lists, respecting path-level frame
/// exclusivity for OCR/LLM-backed checkers. See SPEC_FULL.md §4.3.
pub struct CandidateResult {
    pub candidates: HashMap<String, Vec<usize>>,
    pub logs: Vec<DecisionLog>,
}

pub async fn collect_candidates(
    dag: &Dag,
    frames: &[Frame],
    options: &VerifierOptions,
) -> Result<CandidateResult> {
    let mut reachable: HashMap<String, bool> = HashMap::new();
    let mut min_start: HashMap<String, usize> = HashMap::new();
    let mut matched_frame: HashMap<String, Option<usize>> = HashMap::new();
    let mut exclusive: HashMap<String, bool> = HashMap::new();
    let mut candidates: HashMap<String, Vec<usize>> = HashMap::new();
    let mut logs = Vec::new();

    for id in dag.topo_order() {
        let is_root = dag.parents.get(id).map(|p| p.is_empty()).unwrap_or(true);
        reachable.insert(id.clone(), is_root);
        min_start.insert(id.clone(), 0);
        matched_frame.insert(id.clone(), None);
        exclusive.insert(id.clone(), false);
    }

    let order: Vec<String> = dag.topo_order().to_vec();
    for id in order {
        if !*reachable.get(&id).unwrap_or(&false) {
            candidates.insert(id.clone(), vec![]);
            continue;
        }

        let node = dag.nodes[&id].clone();
        let Some(condition) = node.condition else {
            candidates.insert(id.clone(), vec![]);
            matched_frame.insert(id.clone(), Some(0));
            propagate(dag, &id, 0, &mut reachable, &mut min_start, &matched_frame);
            continue;
        };

        let is_exclusive = condition_needs_exclusive_frame(&condition.condition_type, &condition.params);
        exclusive.insert(id.clone(), is_exclusive);

        let used = path_used_frames(dag, &id, &exclusive, &matched_frame);
        let start = *min_start.get(&id).unwrap_or(&0);
        let checker = get_checker(&condition.condition_type)?;

        let mut hits = Vec::new();
        let mut first_hit = None;

        for i in start..frames.len() {
            if used.contains(&i) {
                continue;
            }
            let ctx = CheckCtx {
                node_id: &id,
                frame: &frames[i],
                frames,
                options,
            };

            let (decision, detail, checker_type) = match checker.check(&ctx, &condition.params).await {
                Ok(outcome) => {
                    let decision = if outcome.matched { Decision::Hit } else { Decision::Miss };
                    (decision, outcome.detail, outcome.checker_type)
                }
                Err(e) => (
                    Decision::Inconclusive,
                    Some(CheckDetail {
                        checker_result: Some(e.to_string()),
                        ..Default::default()
                    }),
                    Some(condition.condition_type.clone()),
                ),
            };

            if options.log_decisions {
                logs.push(DecisionLog {
                    frame_index: i,
                    node_id: id.clone(),
                    strategy: condition.condition_type.clone(),
                    decision,
                    details: None,
                    checker_type,
                    checker_result: detail.as_ref().and_then(|d| d.checker_result.clone()),
                    matched_keywords: detail
                        .as_ref()
                        .map(|d| d.matched_keywords.clone())
                        .unwrap_or_default(),
                    unmatched_keywords: detail
                        .as_ref()
                        .map(|d| d.unmatched_keywords.clone())
                        .unwrap_or_default(),
                });
            }

            if decision == Decision::Hit {
                hits.push(i);
                if first_hit.is_none() {
                    first_hit = Some(i);
                }
                if is_exclusive {
                    break;
                }
            }
        }

        candidates.insert(id.clone(), hits);
        matched_frame.insert(id.clone(), first_hit);

        if let Some(i) = first_hit {
            propagate(dag, &id, i, &mut reachable, &mut min_start, &matched_frame);
        }
    }

    Ok(CandidateResult { candidates, logs })
}

/// Union, over every ancestor of `id` whose own condition was
/// frame-exclusive and has a matched frame `k`, of `{0..=k}`. Enforces
/// strictly linear resource usage on an exclusive ancestor chain.
fn path_used_frames(
    dag: &Dag,
    id: &str,
    exclusive: &HashMap<String, bool>,
    matched_frame: &HashMap<String, Option<usize>>,
) -> HashSet<usize> {
    let mut used = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = dag.parents.get(id).cloned().unwrap_or_default();
    while let Some(p) = stack.pop() {
        if !visited.insert(p.clone()) {
            continue;
        }
        if *exclusive.get(&p).unwrap_or(&false) {
            if let Some(Some(k)) = matched_frame.get(&p) {
                for f in 0..=*k {
                    used.insert(f);
                }
            }
        }
        if let Some(grandparents) = dag.parents.get(&p) {
            stack.extend(grandparents.clone());
        }
    }
    used
}

/// AND-children become reachable once every AND-parent has a matched
/// frame; their `min_start` becomes `max(parent frames) + 1`. OR-children
/// become reachable as soon as any OR-parent matches, at `frame_idx + 1`.
fn propagate(
    dag: &Dag,
    id: &str,
    frame_idx: usize,
    reachable: &mut HashMap<String, bool>,
    min_start: &mut HashMap<String, usize>,
    matched_frame: &HashMap<String, Option<usize>>,
) {
    let Some(children) = dag.children.get(id).cloned() else {
        return;
    };
    for child in children {
        let child_deps = dag.nodes[&child].deps.clone();
        if !child_deps.is_empty() {
            if !child_deps.iter().any(|d| d == id) {
                continue;
            }
            let all_matched = child_deps
                .iter()
                .all(|d| matches!(matched_frame.get(d), Some(Some(_))));
            if !all_matched {
                continue;
            }
            let max_idx = child_deps
                .iter()
                .filter_map(|d| matched_frame.get(d).and_then(|m| *m))
                .max()
                .unwrap_or(0);
            let new_start = max_idx + 1;
            let was_reachable = *reachable.get(&child).unwrap_or(&false);
            if let Some(slot) = min_start.get_mut(&child) {
                if !was_reachable || new_start < *slot {
                    *slot = new_start;
                }
            }
            reachable.insert(child.clone(), true);
        } else {
            let is_or_parent = dag
                .parents_from_next
                .get(&child)
                .map(|ps| ps.iter().any(|p| p == id))
                .unwrap_or(false);
            if !is_or_parent {
                continue;
            }
            let new_start = frame_idx + 1;
            let was_reachable = *reachable.get(&child).unwrap_or(&false);
            if let Some(slot) = min_start.get_mut(&child) {
                if !was_reachable || new_start < *slot {
                    *slot = new_start;
                }
            }
            reachable.insert(child.clone(), true);
        }
    }
}
