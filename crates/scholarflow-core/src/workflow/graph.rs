//! Pipeline transition table with startup validation.
//!
//! The research pipeline is a fixed table `node -> static successor | router +
//! branch map | end`. [`WorkflowGraph::new`] checks the table against the node
//! registry before any workflow runs:
//!
//! 1. Every table entry and every target names a registered node.
//! 2. Every branch a router can return has a target.
//! 3. Every node is reachable from the entry node.
//! 4. Every node can reach a terminal transition.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use scholarflow_types::state::{NodeId, WorkflowState};

use super::node::NodeDyn;
use super::nodes;
use super::router::{Branch, Router};

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(NodeId),
    Route {
        router: Router,
        branches: &'static [(Branch, NodeId)],
    },
    End,
}

impl Transition {
    fn targets(&self) -> Vec<NodeId> {
        match self {
            Self::Next(to) => vec![*to],
            Self::Route { branches, .. } => branches.iter().map(|(_, to)| *to).collect(),
            Self::End => Vec::new(),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next(to) => write!(f, "-> {to}"),
            Self::Route { router, branches } => {
                write!(f, "{}?", router.name())?;
                for (branch, to) in branches.iter() {
                    write!(f, " {branch} -> {to}")?;
                }
                Ok(())
            }
            Self::End => f.write_str("end"),
        }
    }
}

pub const ENTRY_NODE: NodeId = NodeId::Init;

/// The research assistant pipeline.
pub const RESEARCH_PIPELINE: &[(NodeId, Transition)] = &[
    (NodeId::Init, Transition::Next(NodeId::FormulateQueries)),
    (NodeId::FormulateQueries, Transition::Next(NodeId::Search)),
    (NodeId::Search, Transition::Next(NodeId::ScoreRelevance)),
    (NodeId::ScoreRelevance, Transition::Next(NodeId::BuildShortlist)),
    (NodeId::BuildShortlist, Transition::Next(NodeId::ReviewShortlist)),
    (NodeId::ReviewShortlist, Transition::Next(NodeId::Ingest)),
    (NodeId::Ingest, Transition::Next(NodeId::AnalyzeLiterature)),
    (
        NodeId::AnalyzeLiterature,
        Transition::Route {
            router: Router::CheckForConflict,
            branches: &[
                (Branch::ConflictFound, NodeId::ResolveConflict),
                (Branch::NoConflict, NodeId::IdentifyGaps),
            ],
        },
    ),
    (NodeId::ResolveConflict, Transition::Next(NodeId::IdentifyGaps)),
    (NodeId::IdentifyGaps, Transition::Next(NodeId::GenerateDirections)),
    (NodeId::GenerateDirections, Transition::Next(NodeId::Evaluate)),
    (
        NodeId::Evaluate,
        Transition::Route {
            router: Router::ShouldRefineFurther,
            branches: &[
                (Branch::Finalize, NodeId::Finalize),
                (Branch::Refine, NodeId::Refine),
            ],
        },
    ),
    (NodeId::Refine, Transition::Next(NodeId::Evaluate)),
    (NodeId::Finalize, Transition::End),
];

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Validated node registry plus transition table.
pub struct WorkflowGraph {
    entry: NodeId,
    nodes: HashMap<NodeId, Box<dyn NodeDyn>>,
    transitions: HashMap<NodeId, Transition>,
    order: Vec<NodeId>,
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("entry", &self.entry)
            .field("order", &self.order)
            .finish()
    }
}

impl WorkflowGraph {
    /// Build and validate a graph from a transition table and node registry.
    pub fn new(
        entry: NodeId,
        table: &[(NodeId, Transition)],
        registry: Vec<Box<dyn NodeDyn>>,
    ) -> Result<Self, GraphError> {
        let mut nodes = HashMap::with_capacity(registry.len());
        for node in registry {
            let id = node.id();
            if nodes.insert(id, node).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }

        let mut transitions = HashMap::with_capacity(table.len());
        let mut order = Vec::with_capacity(table.len());
        for (from, transition) in table {
            if !nodes.contains_key(from) {
                return Err(GraphError::MissingNode(*from));
            }
            if transitions.insert(*from, *transition).is_some() {
                return Err(GraphError::DuplicateTransition(*from));
            }
            order.push(*from);
        }

        let graph = Self {
            entry,
            nodes,
            transitions,
            order,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// The research pipeline with its standard node set.
    pub fn research_pipeline() -> Result<Self, GraphError> {
        Self::new(ENTRY_NODE, RESEARCH_PIPELINE, nodes::research_nodes())
    }

    fn validate(&self) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&self.entry) {
            return Err(GraphError::MissingNode(self.entry));
        }

        let mut graph = DiGraph::<Option<NodeId>, ()>::new();
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();
        for id in &self.order {
            index.insert(*id, graph.add_node(Some(*id)));
        }
        let end = graph.add_node(None);

        for id in self.nodes.keys() {
            if !self.transitions.contains_key(id) {
                return Err(GraphError::MissingTransition(*id));
            }
        }

        for (from, transition) in &self.transitions {
            if let Transition::Route { router, branches } = transition {
                for branch in router.branches() {
                    if !branches.iter().any(|(b, _)| b == branch) {
                        return Err(GraphError::MissingBranch {
                            from: *from,
                            router: router.name(),
                            branch: *branch,
                        });
                    }
                }
            }

            for to in transition.targets() {
                let target = index
                    .get(&to)
                    .ok_or(GraphError::UnknownTarget { from: *from, to })?;
                graph.add_edge(index[from], *target, ());
            }
            if matches!(transition, Transition::End) {
                graph.add_edge(index[from], end, ());
            }
        }

        // Reachability from entry.
        let mut reached = Vec::new();
        let mut dfs = Dfs::new(&graph, index[&self.entry]);
        while let Some(ix) = dfs.next(&graph) {
            reached.push(ix);
        }
        for id in &self.order {
            if !reached.contains(&index[id]) {
                return Err(GraphError::Unreachable(*id));
            }
        }

        // Every node must be able to terminate.
        for id in &self.order {
            if !has_path_connecting(&graph, index[id], end, None) {
                return Err(GraphError::NoTerminalPath(*id));
            }
        }

        Ok(())
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn NodeDyn> {
        self.nodes.get(&id).map(|n| n.as_ref())
    }

    /// Resolve the successor of `from` for the given state; `None` at a terminal.
    pub fn next(&self, from: NodeId, state: &WorkflowState) -> Result<Option<NodeId>, GraphError> {
        let transition = self
            .transitions
            .get(&from)
            .ok_or(GraphError::MissingTransition(from))?;

        match transition {
            Transition::Next(to) => Ok(Some(*to)),
            Transition::End => Ok(None),
            Transition::Route { router, branches } => {
                let branch = router.route(state);
                tracing::debug!(
                    workflow_id = %state.workflow_id,
                    from = %from,
                    router = router.name(),
                    branch = %branch,
                    "routed"
                );
                branches
                    .iter()
                    .find(|(b, _)| *b == branch)
                    .map(|(_, to)| Some(*to))
                    .ok_or(GraphError::MissingBranch {
                        from,
                        router: router.name(),
                        branch,
                    })
            }
        }
    }

    /// Transitions in table order.
    pub fn transitions(&self) -> impl Iterator<Item = (NodeId, &Transition)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.transitions.get(id).map(|t| (*id, t)))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("node '{0}' registered twice")]
    DuplicateNode(NodeId),

    #[error("node '{0}' has more than one transition")]
    DuplicateTransition(NodeId),

    #[error("node '{0}' is not registered")]
    MissingNode(NodeId),

    #[error("node '{0}' has no transition")]
    MissingTransition(NodeId),

    #[error("transition from '{from}' targets unknown node '{to}'")]
    UnknownTarget { from: NodeId, to: NodeId },

    #[error("router '{router}' after '{from}' has no target for branch '{branch}'")]
    MissingBranch {
        from: NodeId,
        router: &'static str,
        branch: Branch,
    },

    #[error("node '{0}' is unreachable from the entry node")]
    Unreachable(NodeId),

    #[error("node '{0}' cannot reach a terminal node")]
    NoTerminalPath(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::nodes::research_nodes;
    use crate::workflow::testing::state_with;

    #[test]
    fn research_pipeline_is_valid() {
        let graph = WorkflowGraph::research_pipeline().unwrap();
        assert_eq!(graph.entry(), NodeId::Init);
        assert_eq!(graph.transitions().count(), NodeId::ALL.len());
        for id in NodeId::ALL {
            assert!(graph.node(id).is_some(), "missing node {id}");
        }
    }

    #[test]
    fn missing_branch_target_is_rejected() {
        let table: Vec<(NodeId, Transition)> = RESEARCH_PIPELINE
            .iter()
            .map(|(id, t)| match (id, t) {
                (NodeId::Evaluate, _) => (
                    *id,
                    Transition::Route {
                        router: Router::ShouldRefineFurther,
                        branches: &[(Branch::Finalize, NodeId::Finalize)],
                    },
                ),
                _ => (*id, *t),
            })
            .collect();

        let err = WorkflowGraph::new(ENTRY_NODE, &table, research_nodes()).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingBranch {
                from: NodeId::Evaluate,
                router: "should_refine_further",
                branch: Branch::Refine,
            }
        );
    }

    #[test]
    fn unreachable_node_is_rejected() {
        // Bypass resolve_conflict entirely.
        let table: Vec<(NodeId, Transition)> = RESEARCH_PIPELINE
            .iter()
            .map(|(id, t)| match id {
                NodeId::AnalyzeLiterature => (*id, Transition::Next(NodeId::IdentifyGaps)),
                _ => (*id, *t),
            })
            .collect();

        let err = WorkflowGraph::new(ENTRY_NODE, &table, research_nodes()).unwrap_err();
        assert_eq!(err, GraphError::Unreachable(NodeId::ResolveConflict));
    }

    #[test]
    fn node_without_transition_is_rejected() {
        let table: Vec<(NodeId, Transition)> = RESEARCH_PIPELINE
            .iter()
            .filter(|(id, _)| *id != NodeId::Refine)
            .copied()
            .collect();

        let err = WorkflowGraph::new(ENTRY_NODE, &table, research_nodes()).unwrap_err();
        assert_eq!(err, GraphError::MissingTransition(NodeId::Refine));
    }

    #[test]
    fn loop_without_exit_is_rejected() {
        let table: Vec<(NodeId, Transition)> = RESEARCH_PIPELINE
            .iter()
            .map(|(id, t)| match id {
                NodeId::Evaluate => (
                    *id,
                    Transition::Route {
                        router: Router::ShouldRefineFurther,
                        branches: &[
                            (Branch::Finalize, NodeId::Refine),
                            (Branch::Refine, NodeId::Refine),
                        ],
                    },
                ),
                _ => (*id, *t),
            })
            .collect();

        let err = WorkflowGraph::new(ENTRY_NODE, &table, research_nodes()).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Unreachable(NodeId::Finalize) | GraphError::NoTerminalPath(_)
        ));
    }

    #[test]
    fn next_follows_routers() {
        let graph = WorkflowGraph::research_pipeline().unwrap();

        let mut state = state_with(|_| {});
        assert_eq!(
            graph.next(NodeId::AnalyzeLiterature, &state).unwrap(),
            Some(NodeId::IdentifyGaps)
        );

        state.conflict_detected = true;
        assert_eq!(
            graph.next(NodeId::AnalyzeLiterature, &state).unwrap(),
            Some(NodeId::ResolveConflict)
        );

        assert_eq!(graph.next(NodeId::Finalize, &state).unwrap(), None);
        assert_eq!(graph.next(NodeId::Refine, &state).unwrap(), Some(NodeId::Evaluate));
    }

    #[test]
    fn transition_display() {
        assert_eq!(Transition::Next(NodeId::Search).to_string(), "-> search");
        assert_eq!(Transition::End.to_string(), "end");
        let (_, route) = RESEARCH_PIPELINE
            .iter()
            .find(|(id, _)| *id == NodeId::Evaluate)
            .unwrap();
        assert_eq!(
            route.to_string(),
            "should_refine_further? finalize -> finalize refine -> refine"
        );
    }
}
