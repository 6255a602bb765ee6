//! Structural checks between passes: scheduler output invariants before
//! state assignment, and transition-graph sanity after generation.

use petgraph::graph::DiGraph;

use crate::context::Named;
use crate::ctree::{CKind, CNode, CTree};
use weft_utils::{Error, WeftResult};

pub struct Validator;

impl Named for Validator {
    fn name() -> &'static str {
        "validate"
    }

    fn description() -> &'static str {
        "check control-tree and transition-graph invariants"
    }
}

/// Invariants the scheduler must have established.
pub fn tree(tree: &CTree) -> WeftResult<()> {
    for (id, block) in tree.iter() {
        if let CNode::Cond { .. } = block.node {
            if block.children.len() != 2 {
                return Err(Error::internal(format!(
                    "{}: conditional with {} arms",
                    Validator::name(),
                    block.children.len()
                )));
            }
        }
        // A state-sharing region exists to anchor suspensions; a mutex
        // block nothing ever suspends in should have stayed inline.
        if block.kind == CKind::Mutex && !tree.suspends(id) {
            return Err(Error::internal(format!(
                "{}: mutex region without a suspension",
                Validator::name()
            )));
        }
    }
    Ok(())
}

/// Every state must be reachable in the transition graph.
pub fn transitions(
    count: u64,
    transitions: &[weft_ir::Transition],
) -> WeftResult<()> {
    for t in transitions {
        if t.from >= count || t.to >= count {
            return Err(Error::internal(format!(
                "{}: transition ({}, {}) outside the {}-state machine",
                Validator::name(),
                t.from,
                t.to,
                count
            )));
        }
    }
    if count == 1 {
        return Ok(());
    }
    let mut graph = DiGraph::<(), ()>::new();
    let nodes: Vec<_> = (0..count).map(|_| graph.add_node(())).collect();
    for t in transitions {
        graph.add_edge(nodes[t.from as usize], nodes[t.to as usize], ());
    }
    if petgraph::algo::connected_components(&graph) != 1 {
        return Err(Error::internal(format!(
            "{}: transition graph has unreachable states",
            Validator::name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_ir::Transition;

    fn edge(from: u64, to: u64) -> Transition {
        Transition {
            from,
            to,
            cond: weft_ir::CondPool::new().tru(),
        }
    }

    #[test]
    fn connected_graph_passes() {
        let edges = vec![edge(0, 1), edge(1, 2), edge(2, 0)];
        assert!(transitions(3, &edges).is_ok());
    }

    #[test]
    fn stranded_state_is_reported() {
        let edges = vec![edge(0, 1), edge(1, 0)];
        let err = transitions(3, &edges).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn out_of_range_transition_is_reported() {
        let edges = vec![edge(0, 5)];
        assert!(transitions(2, &edges).is_err());
    }
}
