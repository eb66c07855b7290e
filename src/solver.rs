use std::collections::{HashMap, HashSet};

use crate::dag::Dag;
use crate::types::{Decision, DecisionLog, NodeMatch, SuccessSpec};

/// Topological dynamic-programming solve over the candidate sets produced
/// by the path-aware collector. `min_idx[n]` is the earliest frame index
/// at which `n` can be satisfied given its parents; `prev[n]` records the
/// parent chosen for backtracking.
///
/// Strict-later unification (DESIGN.md decision D4): a non-root node must
/// be satisfied at a frame strictly later than the parent frame that
/// feeds it, matching the collector's own `parent_frame + 1` propagation.
pub fn solve(
    dag: &Dag,
    candidates: &HashMap<String, Vec<usize>>,
) -> (HashMap<String, Option<usize>>, HashMap<String, Option<String>>) {
    let mut min_idx: HashMap<String, Option<usize>> = HashMap::new();
    let mut prev: HashMap<String, Option<String>> = HashMap::new();

    for id in dag.topo_order() {
        let node = &dag.nodes[id];
        let empty = Vec::new();
        let cand = candidates.get(id).unwrap_or(&empty);

        let (dep_idx, chosen_parent, is_root): (Option<usize>, Option<String>, bool) =
            if !node.deps.is_empty() {
                let mut all_defined = true;
                let mut max_idx = 0usize;
                let mut chosen = None;
                for d in &node.deps {
                    match min_idx.get(d).copied().flatten() {
                        Some(v) => {
                            if chosen.is_none() || v >= max_idx {
                                max_idx = v;
                                chosen = Some(d.clone());
                            }
                        }
                        None => {
                            all_defined = false;
                            break;
                        }
                    }
                }
                if all_defined {
                    (Some(max_idx), chosen, false)
                } else {
                    (None, None, false)
                }
            } else if let Some(or_parents) = dag.parents_from_next.get(id) {
                if or_parents.is_empty() {
                    (Some(0), None, true)
                } else {
                    let mut best: Option<(usize, String)> = None;
                    for p in or_parents {
                        if let Some(v) = min_idx.get(p).copied().flatten() {
                            if best.as_ref().map(|(b, _)| v < *b).unwrap_or(true) {
                                best = Some((v, p.clone()));
                            }
                        }
                    }
                    match best {
                        Some((v, p)) => (Some(v), Some(p), false),
                        None => (None, None, false),
                    }
                }
            } else {
                (Some(0), None, true)
            };

        let min_idx_n = match dep_idx {
            None => None,
            Some(d) => {
                if is_root {
                    cand.iter().find(|&&x| x >= d).copied()
                } else {
                    cand.iter().find(|&&x| x > d).copied()
                }
            }
        };

        min_idx.insert(id.clone(), min_idx_n);
        prev.insert(id.clone(), if min_idx_n.is_some() { chosen_parent } else { None });
    }

    (min_idx, prev)
}

pub struct SolveOutcome {
    pub ok: bool,
    pub matched: Vec<NodeMatch>,
    pub total_score: i64,
    pub reason: Option<String>,
}

pub fn evaluate(
    dag: &Dag,
    success: &SuccessSpec,
    default_sinks: &[String],
    min_idx: &HashMap<String, Option<usize>>,
    prev: &HashMap<String, Option<String>>,
    logs: &[DecisionLog],
) -> SolveOutcome {
    let (any_of, all_of) = if success.is_empty() {
        (default_sinks.to_vec(), Vec::new())
    } else {
        (success.any_of.clone(), success.all_of.clone())
    };

    let any_ok = any_of.is_empty() || any_of.iter().any(|n| min_idx.get(n).copied().flatten().is_some());
    let all_ok = all_of.is_empty() || all_of.iter().all(|n| min_idx.get(n).copied().flatten().is_some());
    let ok = any_ok && all_ok;

    let matched_ids: Vec<String> = if ok {
        if !all_of.is_empty() {
            let mut seen = HashSet::new();
            let mut nodes = Vec::new();
            for n in &all_of {
                for id in backtrack_chain(n, prev) {
                    if seen.insert(id.clone()) {
                        nodes.push(id);
                    }
                }
            }
            nodes
        } else {
            let best = any_of
                .iter()
                .filter_map(|n| min_idx.get(n).copied().flatten().map(|v| (v, n.clone())))
                .min_by_key(|(v, _)| *v);
            match best {
                Some((_, n)) => backtrack_chain(&n, prev),
                None => Vec::new(),
            }
        }
    } else {
        // On failure, report everything that was matched anyway so
        // partial progress remains visible.
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for id in dag.topo_order() {
            if min_idx.get(id).copied().flatten().is_some() && seen.insert(id.clone()) {
                nodes.push(id.clone());
            }
        }
        nodes
    };

    let mut matched: Vec<NodeMatch> = matched_ids
        .iter()
        .filter_map(|id| {
            min_idx
                .get(id)
                .copied()
                .flatten()
                .map(|frame_index| NodeMatch {
                    node_id: id.clone(),
                    frame_index,
                })
        })
        .collect();
    matched.sort_by_key(|m| m.frame_index);

    let total_score: i64 = matched
        .iter()
        .map(|m| dag.nodes.get(&m.node_id).map(|n| n.score).unwrap_or(0))
        .sum();

    let reason = build_reason(ok, &matched, logs);

    SolveOutcome {
        ok,
        matched,
        total_score,
        reason,
    }
}

fn backtrack_chain(node: &str, prev: &HashMap<String, Option<String>>) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = Some(node.to_string());
    let mut guard = 0usize;
    while let Some(id) = current {
        chain.push(id.clone());
        current = prev.get(&id).cloned().flatten();
        guard += 1;
        if guard > prev.len() + 1 {
            break; // defensive: should be unreachable on an acyclic DAG
        }
    }
    chain.reverse();
    chain
}

fn build_reason(ok: bool, matched: &[NodeMatch], logs: &[DecisionLog]) -> Option<String> {
    if ok {
        let last = matched.last()?;
        logs.iter()
            .rev()
            .find(|l| l.node_id == last.node_id && l.decision == Decision::Hit)
            .and_then(|l| l.checker_result.clone())
            .or_else(|| Some(format!("node '{}' matched", last.node_id)))
    } else if let Some(last) = matched.last() {
        Some(format!(
            "partial progress: last matched node '{}' at frame {}",
            last.node_id, last.frame_index
        ))
    } else {
        logs.iter()
            .rev()
            .find(|l| l.decision != Decision::Hit)
            .map(|l| {
                if !l.unmatched_keywords.is_empty() {
                    format!(
                        "node '{}': unmatched keywords {:?}",
                        l.node_id, l.unmatched_keywords
                    )
                } else {
                    format!(
                        "node '{}': {}",
                        l.node_id,
                        l.checker_result.clone().unwrap_or_else(|| "no match".to_string())
                    )
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeSpec;

    fn node(id: &str, deps: &[&str], next: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            name: None,
            deps: deps.iter().map(|s| s.to_string()).collect(),
            next: next.iter().map(|s| s.to_string()).collect(),
            condition: None,
            score: 10,
        }
    }

    #[test]
    fn diamond_and_child_strictly_later_than_dep() {
        // A -> B (next, OR), A -> C (next, OR), B -> D (deps, AND)
        let dag = Dag::build(vec![
            node("a", &[], &["b", "c"]),
            node("b", &[], &[]),
            node("c", &[], &[]),
            node("d", &["b"], &[]),
        ])
        .unwrap();

        let mut candidates: HashMap<String, Vec<usize>> = HashMap::new();
        candidates.insert("a".into(), vec![0]);
        candidates.insert("b".into(), vec![4]);
        candidates.insert("c".into(), vec![2]);
        candidates.insert("d".into(), vec![4, 5]);

        let success = SuccessSpec {
            any_of: vec!["d".into()],
            all_of: vec![],
        };
        let (min_idx, _) = solve(&dag, &candidates);
        assert_eq!(min_idx["d"], Some(5));
    }

    #[test]
    fn linear_chain_scores_sum_matched_nodes() {
        let dag = Dag::build(vec![
            node("a", &[], &["b"]),
            node("b", &["a"], &["c"]),
            node("c", &["b"], &[]),
        ])
        .unwrap();
        let mut candidates: HashMap<String, Vec<usize>> = HashMap::new();
        candidates.insert("a".into(), vec![1]);
        candidates.insert("b".into(), vec![3]);
        candidates.insert("c".into(), vec![5]);

        let success = SuccessSpec {
            any_of: vec!["c".into()],
            all_of: vec![],
        };
        let (min_idx, prev) = solve(&dag, &candidates);
        let outcome = evaluate(&dag, &success, &dag.sinks(), &min_idx, &prev, &[]);
        assert!(outcome.ok);
        assert_eq!(outcome.total_score, 30);
        assert_eq!(
            outcome.matched.iter().map(|m| m.frame_index).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
    }
}
