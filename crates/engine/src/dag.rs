//! Step graph construction and ordering, run before executing a run.
//!
//! Rules enforced:
//! 1. Step IDs must be unique within the run.
//! 2. Every edge must reference valid step IDs (both `from` and `to`).
//! 3. The directed graph must be acyclic.
//!
//! Ordering is a depth-first postorder over a three-state marking, reversed.
//! Roots and successors are visited back to front so that, once reversed,
//! steps with no edge between them keep their declared relative order.
//! A run without any edge falls back to "triggers first, then by service".

use std::collections::{HashMap, HashSet};

use crate::{
    models::{Edge, Step},
    EngineError,
};

// ---------------------------------------------------------------------------
// Graph builder
// ---------------------------------------------------------------------------

/// Adjacency view of a run's steps and edges.
#[derive(Debug, Clone)]
pub struct StepGraph<'a> {
    /// Step ids in declared order.
    steps: Vec<&'a str>,
    /// step id → successors, in edge declaration order.
    adjacency: HashMap<&'a str, Vec<&'a str>>,
    edge_count: usize,
}

impl<'a> StepGraph<'a> {
    /// Build the adjacency mapping.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateStepId`] if two steps share an ID.
    /// - [`EngineError::UnknownStepReference`] if an edge references a missing step.
    /// - [`EngineError::CycleDetected`] for a self-edge.
    pub fn build(steps: &'a [Step], edges: &'a [Edge]) -> Result<Self, EngineError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(steps.len());
        for step in steps {
            if !seen.insert(step.id.as_str()) {
                return Err(EngineError::DuplicateStepId(step.id.clone()));
            }
        }

        let mut adjacency: HashMap<&str, Vec<&str>> = steps
            .iter()
            .map(|s| (s.id.as_str(), Vec::new()))
            .collect();

        for edge in edges {
            if !seen.contains(edge.from.as_str()) {
                return Err(EngineError::UnknownStepReference {
                    step_id: edge.from.clone(),
                    side: "from",
                });
            }
            if !seen.contains(edge.to.as_str()) {
                return Err(EngineError::UnknownStepReference {
                    step_id: edge.to.clone(),
                    side: "to",
                });
            }
            if edge.from == edge.to {
                return Err(EngineError::CycleDetected {
                    steps: vec![edge.from.clone()],
                });
            }

            adjacency
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
        }

        Ok(Self {
            steps: steps.iter().map(|s| s.id.as_str()).collect(),
            adjacency,
            edge_count: edges.len(),
        })
    }

    /// Step ids in declared order.
    pub fn steps(&self) -> &[&'a str] {
        &self.steps
    }

    /// Direct successors of `step_id`.
    pub fn successors(&self, step_id: &str) -> &[&'a str] {
        self.adjacency
            .get(step_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_edges(&self) -> bool {
        self.edge_count > 0
    }
}

// ---------------------------------------------------------------------------
// Topological orderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Dfs<'g, 'a> {
    graph: &'g StepGraph<'a>,
    marks: HashMap<&'a str, Mark>,
    /// Current recursion path, used to report the cycle.
    path: Vec<&'a str>,
    postorder: Vec<&'a str>,
}

impl<'g, 'a> Dfs<'g, 'a> {
    fn visit(&mut self, node: &'a str) -> Result<(), EngineError> {
        match self.marks.get(node).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = self.path.iter().position(|&n| n == node).unwrap_or(0);
                return Err(EngineError::CycleDetected {
                    steps: self.path[start..].iter().map(|s| s.to_string()).collect(),
                });
            }
            Mark::Unvisited => {}
        }

        self.marks.insert(node, Mark::InProgress);
        self.path.push(node);

        let graph = self.graph;
        for &next in graph.successors(node).iter().rev() {
            self.visit(next)?;
        }

        self.path.pop();
        self.marks.insert(node, Mark::Done);
        self.postorder.push(node);
        Ok(())
    }
}

/// Order the graph so every edge's source precedes its target.
///
/// # Errors
/// [`EngineError::CycleDetected`] naming the steps on the cycle.
pub fn topological_order(graph: &StepGraph<'_>) -> Result<Vec<String>, EngineError> {
    let mut dfs = Dfs {
        graph,
        marks: HashMap::with_capacity(graph.steps().len()),
        path: Vec::new(),
        postorder: Vec::with_capacity(graph.steps().len()),
    };

    for &root in graph.steps().iter().rev() {
        dfs.visit(root)?;
    }

    Ok(dfs.postorder.iter().rev().map(|s| s.to_string()).collect())
}

/// Order used for runs authored without edges: triggers first, then by
/// service name. Stable over the declared order.
pub fn fallback_order(steps: &[Step]) -> Vec<String> {
    let mut sorted: Vec<&Step> = steps.iter().collect();
    sorted.sort_by(|a, b| {
        (!a.is_trigger(), a.service.as_str()).cmp(&(!b.is_trigger(), b.service.as_str()))
    });
    sorted.into_iter().map(|s| s.id.clone()).collect()
}

/// Validate the run's graph and return the step ids in execution order.
pub fn execution_order(steps: &[Step], edges: &[Edge]) -> Result<Vec<String>, EngineError> {
    let graph = StepGraph::build(steps, edges)?;
    if graph.has_edges() {
        topological_order(&graph)
    } else {
        Ok(fallback_order(steps))
    }
}
