//! Directed acyclic graph of functions.
//!
//! Built from a [`DependencyMap`]; construction fails with a
//! [`CycledPipelineError`] listing every edge that takes part in a cycle.

use super::DependencyMap;
use crate::errors::CycledPipelineError;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// A validated dependency graph with a deterministic topological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDag {
    /// Node names; registration order first.
    nodes: Vec<String>,
    /// Dependent -> dependencies.
    dependencies: DependencyMap,
    /// Topological order (dependencies first).
    order: Vec<String>,
}

impl PipelineDag {
    /// Builds the graph.
    ///
    /// `nodes` fixes the tie-breaking order; names only mentioned in
    /// `dependencies` are appended in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`CycledPipelineError`] if the graph has a cycle.
    pub fn build(nodes: &[String], dependencies: DependencyMap) -> Result<Self, CycledPipelineError> {
        let mut all_nodes: Vec<String> = nodes.to_vec();
        let mut known: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();
        let mut extra: BTreeSet<&str> = BTreeSet::new();
        for (dependent, deps) in &dependencies {
            for name in std::iter::once(dependent).chain(deps) {
                if !known.contains(name.as_str()) {
                    extra.insert(name);
                }
            }
        }
        for name in extra {
            known.insert(name);
            all_nodes.push(name.to_string());
        }

        let index: HashMap<&str, usize> = all_nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        // Adjacency from dependency to dependents, by node index.
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); all_nodes.len()];
        let mut in_degree: Vec<usize> = vec![0; all_nodes.len()];
        for (dependent, deps) in &dependencies {
            let to = index[dependent.as_str()];
            for dep in deps {
                dependents[index[dep.as_str()]].push(to);
                in_degree[to] += 1;
            }
        }
        for list in &mut dependents {
            list.sort_unstable();
        }

        let mut ready: VecDeque<usize> = (0..all_nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(all_nodes.len());
        let mut remaining = in_degree.clone();

        while let Some(node) = ready.pop_front() {
            order.push(all_nodes[node].clone());
            for &child in &dependents[node] {
                remaining[child] -= 1;
                if remaining[child] == 0 {
                    ready.push_back(child);
                }
            }
        }

        if order.len() < all_nodes.len() {
            let stuck: Vec<usize> = (0..all_nodes.len()).filter(|&i| remaining[i] > 0).collect();
            return Err(CycledPipelineError::new(cycle_edges(
                &all_nodes,
                &dependents,
                &stuck,
            )));
        }

        Ok(Self {
            nodes: all_nodes,
            dependencies,
            order,
        })
    }

    /// Returns the node names.
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Returns the dependency map the graph was built from.
    #[must_use]
    pub fn dependency_map(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// Returns the topological order.
    #[must_use]
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Returns the dependencies of a node.
    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Returns the nodes depending on `name`, in node order.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| {
                self.dependencies
                    .get(node.as_str())
                    .is_some_and(|deps| deps.contains(name))
            })
            .map(String::as_str)
            .collect()
    }

    /// Returns every edge as `(dependency, dependent)`.
    #[must_use]
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.dependencies
            .iter()
            .flat_map(|(dependent, deps)| deps.iter().map(move |dep| (dep.as_str(), dependent.as_str())))
            .collect()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Collects the `(dependent, dependency)` edges lying on a cycle among the
/// nodes left over by elimination.
fn cycle_edges(nodes: &[String], dependents: &[Vec<usize>], stuck: &[usize]) -> Vec<(String, String)> {
    let components = strongly_connected(dependents, stuck);

    let mut component_of: HashMap<usize, usize> = HashMap::new();
    for (c, members) in components.iter().enumerate() {
        for &m in members {
            component_of.insert(m, c);
        }
    }

    let mut edges = BTreeSet::new();
    for &from in stuck {
        for &to in &dependents[from] {
            let same = match (component_of.get(&from), component_of.get(&to)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if !same {
                continue;
            }
            let cyclic = from == to || components[component_of[&from]].len() > 1;
            if cyclic {
                // `to` depends on `from`.
                edges.insert((nodes[to].clone(), nodes[from].clone()));
            }
        }
    }
    edges.into_iter().collect()
}

/// Tarjan's algorithm restricted to `subset`.
fn strongly_connected(adjacency: &[Vec<usize>], subset: &[usize]) -> Vec<Vec<usize>> {
    struct State<'a> {
        adjacency: &'a [Vec<usize>],
        allowed: Vec<bool>,
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next: usize,
        components: Vec<Vec<usize>>,
    }

    fn visit(state: &mut State<'_>, v: usize) {
        state.index[v] = Some(state.next);
        state.low[v] = state.next;
        state.next += 1;
        state.stack.push(v);
        state.on_stack[v] = true;

        let adjacency = state.adjacency;
        for &w in &adjacency[v] {
            if !state.allowed[w] {
                continue;
            }
            match state.index[w] {
                None => {
                    visit(state, w);
                    state.low[v] = state.low[v].min(state.low[w]);
                }
                Some(w_index) if state.on_stack[w] => {
                    state.low[v] = state.low[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        if Some(state.low[v]) == state.index[v] {
            let mut component = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let n = adjacency.len();
    let mut allowed = vec![false; n];
    for &s in subset {
        allowed[s] = true;
    }
    let mut state = State {
        adjacency,
        allowed,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };

    for &s in subset {
        if state.index[s].is_none() {
            visit(&mut state, s);
        }
    }
    state.components
}
