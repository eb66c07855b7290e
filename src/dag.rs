use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::NodeSpec;

/// Adjacency built from a node list's `deps` (AND edges) and `next` (OR
/// edges). `parents_from_deps` and `parents_from_next` are kept separate
/// so the solver and collector can apply AND/OR semantics independently;
/// `children`/`parents` are the unified view used for topo sort and cycle
/// detection.
#[derive(Debug)]
pub struct Dag {
    pub nodes: HashMap<String, NodeSpec>,
    pub order: Vec<String>,
    pub children: HashMap<String, Vec<String>>,
    pub parents: HashMap<String, Vec<String>>,
    pub parents_from_deps: HashMap<String, Vec<String>>,
    pub parents_from_next: HashMap<String, Vec<String>>,
}

impl Dag {
    pub fn build(nodes: Vec<NodeSpec>) -> Result<Self> {
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        for n in &nodes {
            for dep in &n.deps {
                if !ids.contains(dep.as_str()) {
                    return Err(Error::unresolved_node_ref(n.id.clone(), dep.clone()));
                }
            }
            for succ in &n.next {
                if !ids.contains(succ.as_str()) {
                    return Err(Error::unresolved_node_ref(n.id.clone(), succ.clone()));
                }
            }
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();
        let mut parents_from_deps: HashMap<String, Vec<String>> = HashMap::new();
        let mut parents_from_next: HashMap<String, Vec<String>> = HashMap::new();

        for n in &nodes {
            for dep in &n.deps {
                children.entry(dep.clone()).or_default().push(n.id.clone());
                parents.entry(n.id.clone()).or_default().push(dep.clone());
                parents_from_deps
                    .entry(n.id.clone())
                    .or_default()
                    .push(dep.clone());
            }
            for succ in &n.next {
                children.entry(n.id.clone()).or_default().push(succ.clone());
                parents.entry(succ.clone()).or_default().push(n.id.clone());
                parents_from_next
                    .entry(succ.clone())
                    .or_default()
                    .push(n.id.clone());
            }
        }

        Self::warn_on_redundant_edges(&nodes, &parents_from_deps, &parents_from_next);

        let node_map: HashMap<String, NodeSpec> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let order = Self::topo_order_checked(&node_map, &parents, &children)?;

        Ok(Dag {
            nodes: node_map,
            order,
            children,
            parents,
            parents_from_deps,
            parents_from_next,
        })
    }

    /// `deps` takes precedence over `next`-derived OR-parents when both
    /// name the same node; this is legal but usually a configuration
    /// mistake, so it's surfaced as a warning rather than rejected.
    fn warn_on_redundant_edges(
        nodes: &[NodeSpec],
        parents_from_deps: &HashMap<String, Vec<String>>,
        parents_from_next: &HashMap<String, Vec<String>>,
    ) {
        for n in nodes {
            let deps: HashSet<&str> = parents_from_deps
                .get(&n.id)
                .map(|v| v.iter().map(|s| s.as_str()).collect())
                .unwrap_or_default();
            let next_parents: HashSet<&str> = parents_from_next
                .get(&n.id)
                .map(|v| v.iter().map(|s| s.as_str()).collect())
                .unwrap_or_default();
            if !deps.is_empty() && !next_parents.is_empty() {
                let overlap: Vec<&str> = deps.intersection(&next_parents).copied().collect();
                if !overlap.is_empty() {
                    debug!(
                        target: "dagverify::dag",
                        node = %n.id,
                        overlap = ?overlap,
                        "deps and next-derived parents overlap; deps (AND) takes precedence"
                    );
                }
            }
        }
    }

    fn topo_order_checked(
        nodes: &HashMap<String, NodeSpec>,
        parents: &HashMap<String, Vec<String>>,
        children: &HashMap<String, Vec<String>>,
    ) -> Result<Vec<String>> {
        let mut indeg: HashMap<String, usize> =
            nodes.keys().map(|id| (id.clone(), 0)).collect();
        for (id, ps) in parents {
            indeg.insert(id.clone(), ps.len());
        }
        let mut queue: VecDeque<String> = indeg
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(cur) = queue.pop_front() {
            order.push(cur.clone());
            if let Some(ch) = children.get(&cur) {
                for c in ch {
                    let d = indeg.get_mut(c).expect("child present in indeg map");
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(c.clone());
                    }
                }
            }
        }
        if order.len() != nodes.len() {
            return Err(Error::CycleDetected);
        }
        Ok(order)
    }

    pub fn topo_order(&self) -> &[String] {
        &self.order
    }

    pub fn sinks(&self) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|id| self.children.get(*id).map(|c| c.is_empty()).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn roots(&self) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|id| self.parents.get(*id).map(|p| p.is_empty()).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Enumerates every root-to-target path for diagnostic logging. Each
    /// branch carries its own visited set so siblings don't contaminate
    /// each other's traversal.
    pub fn all_paths_to_targets(&self, targets: &[String]) -> Vec<Vec<String>> {
        let target_set: HashSet<&str> = targets.iter().map(|s| s.as_str()).collect();
        let mut paths = Vec::new();
        for root in self.roots() {
            let mut path = Vec::new();
            let visited = HashSet::new();
            self.dfs_paths(&root, &mut path, visited, &target_set, &mut paths);
        }
        paths
    }

    fn dfs_paths(
        &self,
        current: &str,
        path: &mut Vec<String>,
        mut visited: HashSet<String>,
        targets: &HashSet<&str>,
        out: &mut Vec<Vec<String>>,
    ) {
        if visited.contains(current) {
            return;
        }
        visited.insert(current.to_string());
        path.push(current.to_string());

        if targets.contains(current) {
            out.push(path.clone());
        }

        if let Some(children) = self.children.get(current) {
            for child in children {
                self.dfs_paths(child, path, visited.clone(), targets, out);
            }
        }
        path.pop();
    }

    pub fn log_possible_paths(&self, success_nodes: &[String]) {
        debug!(target: "dagverify::dag", "node dependency overview:");
        for id in self.topo_order() {
            let node = &self.nodes[id];
            debug!(
                target: "dagverify::dag",
                node = %id,
                deps = ?node.deps,
                next = ?node.next,
                "node edges"
            );
        }
        let paths = self.all_paths_to_targets(success_nodes);
        if paths.is_empty() {
            debug!(target: "dagverify::dag", "no possible success paths found");
        } else {
            debug!(target: "dagverify::dag", count = paths.len(), "possible success paths");
            for (i, path) in paths.iter().enumerate() {
                debug!(target: "dagverify::dag", path_no = i + 1, path = %path.join(" -> "), "path");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConditionSpec;

    fn node(id: &str, deps: &[&str], next: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            name: None,
            deps: deps.iter().map(|s| s.to_string()).collect(),
            next: next.iter().map(|s| s.to_string()).collect(),
            condition: None::<ConditionSpec>,
            score: 10,
        }
    }

    #[test]
    fn linear_topo_order_is_stable() {
        let dag = Dag::build(vec![
            node("a", &[], &["b"]),
            node("b", &[], &["c"]),
            node("c", &[], &[]),
        ])
        .unwrap();
        assert_eq!(dag.topo_order(), &["a", "b", "c"]);
        assert_eq!(dag.sinks(), vec!["c".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = Dag::build(vec![node("a", &["b"], &[]), node("b", &["a"], &[])]).unwrap_err();
        assert!(matches!(err, Error::CycleDetected));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let err = Dag::build(vec![node("a", &["missing"], &[])]).unwrap_err();
        assert!(matches!(err, Error::UnresolvedNodeRef { .. }));
    }

    #[test]
    fn diamond_all_paths() {
        let dag = Dag::build(vec![
            node("a", &[], &["b", "c"]),
            node("b", &[], &[]),
            node("c", &[], &[]),
            node("d", &["b"], &[]),
        ])
        .unwrap();
        let paths = dag.all_paths_to_targets(&["d".to_string()]);
        assert_eq!(paths, vec![vec!["a".to_string(), "b".to_string(), "d".to_string()]]);
    }
}
