//! Dependency resolution for unit ordering
//!
//! Builds a directed graph from unit dependencies and performs
//! topological sort to determine start order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::units::Unit;

/// Dependency graph for ordering unit startup
#[derive(Debug, Default)]
pub struct DepGraph {
    /// Edges: node -> nodes that must start BEFORE this node
    /// (i.e., this node is After= those nodes)
    edges: HashMap<String, HashSet<String>>,
    /// All known nodes
    nodes: HashSet<String>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a node (unit that was loaded)
    pub fn add_node(&mut self, name: &str) {
        self.nodes.insert(name.to_string());
    }

    /// Add a unit to the graph, extracting its dependencies
    pub fn add_unit(&mut self, unit: &Unit) {
        let name = unit.name();
        self.nodes.insert(name.to_string());

        let section = unit.unit_section();

        // After=X means X must start before us
        for dep in &section.after {
            self.add_edge(name, dep);
        }

        // Before=X means we must start before X
        // Only add edge if X is a loaded unit
        for dep in &section.before {
            if self.nodes.contains(dep) {
                self.edges
                    .entry(dep.clone())
                    .or_default()
                    .insert(name.to_string());
            }
        }

        // Requires=X and Wants=X imply ordering dependency
        for dep in &section.requires {
            self.add_edge(name, dep);
        }

        for dep in &section.wants {
            self.add_edge(name, dep);
        }

        // For targets, .wants directory entries are also dependencies
        for dep in unit.wants_dir() {
            self.add_edge(name, dep);
        }
    }

    /// Add a directed edge: `from` depends on `to` (to must start first)
    /// Only creates edge if `to` is already a known node (loaded unit)
    fn add_edge(&mut self, from: &str, to: &str) {
        // Ordering against missing units is ignored
        if !self.nodes.contains(to) {
            return;
        }
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// Get direct dependencies of a node (nodes that must start before it)
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &String> {
        self.edges.get(name).into_iter().flat_map(|s| s.iter())
    }

    /// Topological sort using Kahn's algorithm
    /// Returns nodes in order they should be started, or an error if cycle detected
    pub fn toposort(&self) -> Result<Vec<String>, CycleError> {
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        for node in &self.nodes {
            in_degree.insert(node.clone(), 0);
        }

        for (from, deps) in &self.edges {
            *in_degree.entry(from.clone()).or_default() = deps.len();
        }

        // Start with nodes that have no dependencies
        let mut queue: VecDeque<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(n, _)| n.clone())
            .collect();

        let mut result = Vec::new();

        while let Some(node) = queue.pop_front() {
            result.push(node.clone());

            for (dependent, deps) in &self.edges {
                if deps.contains(&node) {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            queue.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let remaining: Vec<String> = self
                .nodes
                .iter()
                .filter(|n| !result.contains(n))
                .cloned()
                .collect();
            return Err(CycleError { nodes: remaining });
        }

        Ok(result)
    }

    /// Get the start order for a specific unit and its dependencies
    /// Returns only the subset of nodes reachable from the unit
    pub fn start_order_for(&self, target: &str) -> Result<Vec<String>, CycleError> {
        // First collect all transitive dependencies (following graph edges)
        let mut needed: HashSet<String> = HashSet::new();
        let mut to_visit: VecDeque<String> = VecDeque::new();

        if self.nodes.contains(target) {
            to_visit.push_back(target.to_string());
            needed.insert(target.to_string());
        }

        while let Some(node) = to_visit.pop_front() {
            if let Some(deps) = self.edges.get(&node) {
                for dep in deps {
                    if self.nodes.contains(dep) && needed.insert(dep.clone()) {
                        to_visit.push_back(dep.clone());
                    }
                }
            }
        }

        self.toposort_subset(&needed)
    }

    /// Toposort a subset of the graph, ignoring nodes outside the subset
    /// If cycles exist, break them by adding cycle members in arbitrary order
    fn toposort_subset(&self, subset: &HashSet<String>) -> Result<Vec<String>, CycleError> {
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        for node in subset {
            in_degree.insert(node.clone(), 0);
        }

        // Count only edges within the subset
        for (from, deps) in &self.edges {
            if subset.contains(from) {
                let subset_deps = deps.iter().filter(|d| subset.contains(*d)).count();
                *in_degree.entry(from.clone()).or_default() = subset_deps;
            }
        }

        let mut queue: VecDeque<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(n, _)| n.clone())
            .collect();

        let mut result = Vec::new();
        let mut added: HashSet<String> = HashSet::new();

        while result.len() < subset.len() {
            if let Some(node) = queue.pop_front() {
                if added.insert(node.clone()) {
                    result.push(node.clone());
                } else {
                    continue; // Skip duplicates
                }

                for (dependent, deps) in &self.edges {
                    if subset.contains(dependent) && deps.contains(&node) {
                        if let Some(deg) = in_degree.get_mut(dependent) {
                            *deg = deg.saturating_sub(1);
                            if *deg == 0 {
                                queue.push_back(dependent.clone());
                            }
                        }
                    }
                }
            } else {
                // No nodes with zero in-degree - we have a cycle
                let remaining: Vec<_> = in_degree
                    .iter()
                    .filter(|(n, &deg)| deg > 0 && !result.contains(n))
                    .collect();

                if remaining.is_empty() {
                    break;
                }

                // Pick node with minimum in-degree to break cycle
                let (cycle_node, _) = remaining
                    .iter()
                    .min_by_key(|(_, &deg)| deg)
                    .unwrap();

                let cycle_units: Vec<_> = remaining.iter().map(|(n, _)| n.as_str()).collect();
                log::warn!(
                    "Breaking ordering cycle: starting {} early (cycle involves: {})",
                    cycle_node,
                    cycle_units.join(", ")
                );

                queue.push_back(cycle_node.to_string());
                in_degree.insert(cycle_node.to_string(), 0);
            }
        }

        Ok(result)
    }
}

/// Error when a dependency cycle is detected
#[derive(Debug, Clone)]
pub struct CycleError {
    pub nodes: Vec<String>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dependency cycle detected involving: {}",
            self.nodes.join(", ")
        )
    }
}

impl std::error::Error for CycleError {}
