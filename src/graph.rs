//! Modulation Graph
//!
//! This module resolves the operator routing of an FM synth. It validates the
//! edge list once, computes a topological evaluation order with Kahn's
//! algorithm, and caches everything a render call needs: per-operator
//! modulation sources, the evaluation order, dependency depths and the
//! carrier (terminal) operators.

use crate::error::{Result, SynthError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Operator index within a synth
pub type OperatorId = usize;

/// Directed routing: `source`'s contribution is added to `destination`'s
/// phase-modulation input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModulationEdge {
    pub source: OperatorId,
    pub destination: OperatorId,
}

impl ModulationEdge {
    pub fn new(source: OperatorId, destination: OperatorId) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl From<(OperatorId, OperatorId)> for ModulationEdge {
    fn from((source, destination): (OperatorId, OperatorId)) -> Self {
        Self::new(source, destination)
    }
}

/// Validated, acyclic routing over `N` operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulationGraph {
    operators: usize,
    edges: Vec<ModulationEdge>,
    sources: Vec<Vec<OperatorId>>,
    order: Vec<OperatorId>,
    levels: Vec<Vec<OperatorId>>,
    carriers: Vec<OperatorId>,
}

impl ModulationGraph {
    /// Build and validate a graph. Fails on out-of-range indices
    /// (`InvalidRouting`) and on any cycle, self-loops included
    /// (`CyclicRouting`).
    pub fn new<I, E>(operators: usize, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<ModulationEdge>,
    {
        let edges: Vec<ModulationEdge> = edges.into_iter().map(Into::into).collect();

        for edge in &edges {
            if edge.source >= operators || edge.destination >= operators {
                return Err(SynthError::InvalidRouting {
                    source: edge.source,
                    destination: edge.destination,
                    operators,
                });
            }
            if edge.source == edge.destination {
                return Err(SynthError::CyclicRouting {
                    operators: vec![edge.source],
                });
            }
        }

        let mut sources = vec![Vec::new(); operators];
        for edge in &edges {
            sources[edge.destination].push(edge.source);
        }

        let order = topological_sort(operators, &edges)?;
        let levels = dependency_levels(&order, &sources);

        let carriers: Vec<OperatorId> = (0..operators)
            .filter(|&n| edges.iter().all(|e| e.source != n))
            .collect();

        debug!(
            operators,
            edges = edges.len(),
            ?order,
            ?carriers,
            "compiled modulation graph"
        );

        Ok(Self {
            operators,
            edges,
            sources,
            order,
            levels,
            carriers,
        })
    }

    /// Number of operators the graph was built for
    pub fn operator_count(&self) -> usize {
        self.operators
    }

    /// Edges in the order they were supplied
    pub fn edges(&self) -> &[ModulationEdge] {
        &self.edges
    }

    /// Operators whose contributions feed `operator`'s phase modulation.
    /// Duplicate edges appear once per occurrence.
    pub fn sources(&self, operator: OperatorId) -> &[OperatorId] {
        self.sources.get(operator).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Evaluation order: every operator appears after all of its sources
    pub fn order(&self) -> &[OperatorId] {
        &self.order
    }

    /// Operators grouped by dependency depth. Operators in one group have
    /// no path between them.
    pub fn levels(&self) -> &[Vec<OperatorId>] {
        &self.levels
    }

    /// Operators that modulate nothing
    pub fn carriers(&self) -> &[OperatorId] {
        &self.carriers
    }

    pub fn is_carrier(&self, operator: OperatorId) -> bool {
        self.carriers.contains(&operator)
    }
}

/// Kahn's algorithm, visiting ready operators in index order
fn topological_sort(operators: usize, edges: &[ModulationEdge]) -> Result<Vec<OperatorId>> {
    let mut in_degree = vec![0usize; operators];
    let mut successors: Vec<Vec<OperatorId>> = vec![Vec::new(); operators];

    for edge in edges {
        in_degree[edge.destination] += 1;
        successors[edge.source].push(edge.destination);
    }

    let mut queue: VecDeque<OperatorId> = (0..operators).filter(|&n| in_degree[n] == 0).collect();
    let mut result = Vec::with_capacity(operators);

    while let Some(node) = queue.pop_front() {
        result.push(node);
        for &succ in &successors[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push_back(succ);
            }
        }
    }

    if result.len() != operators {
        let in_cycle: Vec<OperatorId> = (0..operators).filter(|&n| in_degree[n] > 0).collect();
        return Err(SynthError::CyclicRouting {
            operators: in_cycle,
        });
    }

    Ok(result)
}

/// Depth of each operator is one more than its deepest source
fn dependency_levels(order: &[OperatorId], sources: &[Vec<OperatorId>]) -> Vec<Vec<OperatorId>> {
    let mut depth = vec![0usize; sources.len()];
    let mut levels: Vec<Vec<OperatorId>> = Vec::new();

    for &node in order {
        depth[node] = sources[node]
            .iter()
            .map(|&s| depth[s] + 1)
            .max()
            .unwrap_or(0);
        if levels.len() <= depth[node] {
            levels.resize_with(depth[node] + 1, Vec::new);
        }
        levels[depth[node]].push(node);
    }

    levels
}
