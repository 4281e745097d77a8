//! Graph - Dependency analysis between resources
//!
//! Edges come from attribute references (`alb.load_balancer_arn`) and from
//! explicit `depends_on` lists. Creation follows a topological order of the
//! graph; teardown walks the same order backwards.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::resource::{Resource, Value};

/// Dependency graph error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Resource '{resource}' depends on unknown binding '{target}'")]
    UnknownDependency { resource: String, target: String },
}

/// Dependency between resources
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Target resource binding name
    pub target: String,
    /// Referenced attribute (None for explicit `depends_on`)
    pub attribute: Option<String>,
    /// Where this reference is used (e.g., "listener_arn")
    pub used_in: String,
}

/// Graph node key for a resource: its binding name, or `type.name` for
/// anonymous resources.
pub fn node_key(resource: &Resource) -> String {
    resource
        .binding()
        .map(str::to_string)
        .unwrap_or_else(|| resource.id.to_string())
}

/// Dependency graph for the resources of one descriptor
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in declaration order
    nodes: Vec<String>,
    /// Resource node -> list of dependencies
    edges: HashMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> list of resources that depend on it
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from declared resources
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut graph = Self::new();
        for resource in resources {
            let from = node_key(resource);
            graph.add_node(from.clone());

            let mut keys: Vec<_> = resource.attributes.keys().collect();
            keys.sort();
            for key in keys {
                let value = &resource.attributes[key];
                if key == "_depends_on" {
                    for target in value.as_list().unwrap_or_default() {
                        if let Some(target) = target.as_str() {
                            graph.add_edge(
                                from.clone(),
                                Dependency {
                                    target: target.to_string(),
                                    attribute: None,
                                    used_in: "depends_on".to_string(),
                                },
                            );
                        }
                    }
                } else if !key.starts_with('_') {
                    let mut refs = Vec::new();
                    collect_refs(value, &mut refs);
                    for (target, attribute) in refs {
                        graph.add_edge(
                            from.clone(),
                            Dependency {
                                target,
                                attribute: Some(attribute),
                                used_in: key.clone(),
                            },
                        );
                    }
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, node: String) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    /// Add a dependency edge
    pub fn add_edge(&mut self, from: String, dependency: Dependency) {
        let target = dependency.target.clone();
        self.edges.entry(from.clone()).or_default().push(dependency);
        let dependents = self.reverse_edges.entry(target).or_default();
        if !dependents.contains(&from) {
            dependents.push(from);
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Get direct dependencies of a resource
    pub fn dependencies_of(&self, node: &str) -> &[Dependency] {
        self.edges.get(node).map_or(&[], |v| v.as_slice())
    }

    /// Get resources that depend on this resource
    pub fn dependents_of(&self, node: &str) -> &[String] {
        self.reverse_edges.get(node).map_or(&[], |v| v.as_slice())
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Find one cycle, returned as the path of nodes that closes it
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        for node in &self.nodes {
            let mut stack = Vec::new();
            if let Some(cycle) = self.find_cycle_from(node, &mut visited, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    fn find_cycle_from(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| n == node) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if visited.contains(node) {
            return None;
        }
        visited.insert(node.to_string());
        stack.push(node.to_string());
        for dep in self.dependencies_of(node) {
            if let Some(cycle) = self.find_cycle_from(&dep.target, visited, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        None
    }

    /// Topological order of nodes; ties keep declaration order
    pub fn creation_order(&self) -> Result<Vec<String>, GraphError> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut indegree = vec![0usize; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            let targets: HashSet<&str> = self
                .dependencies_of(node)
                .iter()
                .map(|d| d.target.as_str())
                .collect();
            for target in &targets {
                if !index.contains_key(target) {
                    return Err(GraphError::UnknownDependency {
                        resource: node.clone(),
                        target: target.to_string(),
                    });
                }
            }
            indegree[i] = targets.len();
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_first() {
            let node = &self.nodes[i];
            order.push(node.clone());
            for dependent in self.dependents_of(node) {
                if let Some(&j) = index.get(dependent.as_str()) {
                    indegree[j] -= 1;
                    if indegree[j] == 0 {
                        ready.insert(j);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let cycle = self.find_cycle().unwrap_or_default();
            return Err(GraphError::Cycle(cycle));
        }
        Ok(order)
    }

    /// Sort resources so that every resource follows its dependencies
    pub fn sort_resources(&self, resources: &[Resource]) -> Result<Vec<Resource>, GraphError> {
        let by_key: HashMap<String, &Resource> =
            resources.iter().map(|r| (node_key(r), r)).collect();
        Ok(self
            .creation_order()?
            .iter()
            .filter_map(|key| by_key.get(key).map(|r| (*r).clone()))
            .collect())
    }

    /// Reverse topological order: dependents before their dependencies
    pub fn destroy_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }
}

fn collect_refs(value: &Value, refs: &mut Vec<(String, String)>) {
    match value {
        Value::ResourceRef(binding, attr) => refs.push((binding.clone(), attr.clone())),
        Value::List(items) => items.iter().for_each(|v| collect_refs(v, refs)),
        Value::Map(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            for key in keys {
                collect_refs(&map[key], refs);
            }
        }
        _ => {}
    }
}
