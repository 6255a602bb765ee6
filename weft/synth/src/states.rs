//! The state assigner: numbers the control-block tree with machine
//! states and records loop-back edges.
//!
//! Sequential scopes hand consecutive state ranges to their children;
//! mutex scopes and handshake bodies share a single state. A second walk
//! plants register holds in conditional arms that span multiple states.

use std::collections::HashSet;

use smallvec::{smallvec, SmallVec};

use crate::context::Named;
use crate::ctree::{CId, CKind, CNode, CTree};
use weft_ir::{Block, Stmt, Target};
use weft_utils::{Error, Id, WeftResult};

pub struct StateAssigner;

impl Named for StateAssigner {
    fn name() -> &'static str {
        "assign-states"
    }

    fn description() -> &'static str {
        "number control blocks with machine states"
    }
}

/// Assign states to every block of the tree. Returns the state count;
/// states are contiguous and state zero is the reset state.
///
/// When the body opens with a multi-state conditional, state zero stays
/// empty and only dispatches into a branch: branch choice lives on
/// transitions, and the machine has no predecessor edge at startup that
/// could carry it.
pub fn assign(tree: &mut CTree) -> WeftResult<u64> {
    let root = tree.root();
    let start = u64::from(branch_entered(tree, root));
    let last = assign_block(tree, root, start)?;
    hold_registers(tree, root);
    log::debug!("{}: {} states", StateAssigner::name(), last + 1);
    Ok(last + 1)
}

/// Is the first suspension the machine reaches a conditional with
/// per-branch states?
fn branch_entered(tree: &CTree, id: CId) -> bool {
    match tree[id].node {
        CNode::Cond { .. } => tree[id].kind == CKind::Sequential,
        CNode::Root | CNode::Seq | CNode::Arm { .. } | CNode::Loop { .. } => {
            tree[id]
                .children
                .iter()
                .find(|&&c| tree.suspends(c))
                .is_some_and(|&c| branch_entered(tree, c))
        }
        _ => false,
    }
}

/// Number one block's subtree starting at `cur`; returns the last state
/// the subtree occupies.
fn assign_block(tree: &mut CTree, id: CId, cur: u64) -> WeftResult<u64> {
    let shared = match &tree[id].node {
        CNode::Leaf | CNode::Emit { .. } => {
            tree[id].state_ids = smallvec![cur];
            return Ok(cur);
        }
        // A handshake body executes in the completion cycle.
        CNode::Wait { .. } | CNode::IfaceLoop { .. } => true,
        CNode::Mutex => true,
        CNode::Cond { .. } => tree[id].kind == CKind::Mutex,
        _ => false,
    };

    if shared {
        for child in tree.children(id) {
            assign_shared(tree, child, cur)?;
        }
        tree[id].state_ids = smallvec![cur];
        return Ok(cur);
    }

    // A multi-state conditional gives its arms disjoint ranges: the state
    // alone then identifies the taken branch, so the resolver never has
    // to re-test the condition mid-branch. An arm that never suspends
    // still gets one state of its own (with an immediate exit).
    if matches!(tree[id].node, CNode::Cond { .. }) {
        let arms = tree.children(id);
        debug_assert_eq!(arms.len(), 2, "a conditional has exactly two arms");
        let split = assign_block(tree, arms[0], cur)?;
        let last = assign_block(tree, arms[1], split + 1)?;
        let mut states: SmallVec<[u64; 4]> = SmallVec::new();
        for &arm in &arms {
            states.extend_from_slice(&tree[arm].state_ids);
        }
        states.sort_unstable();
        tree[id].state_ids = states;
        return Ok(last);
    }

    // Sequential scope: children occupy consecutive ranges. A child that
    // never suspends shares its state with the next child.
    let kids = tree.children(id);
    if kids.is_empty() {
        return match tree[id].node {
            // An empty body and an empty conditional arm still occupy a
            // state of their own.
            CNode::Root | CNode::Arm { .. } => {
                tree[id].state_ids = smallvec![cur];
                Ok(cur)
            }
            _ => Err(Error::internal(format!(
                "{}: sequential block without children",
                StateAssigner::name()
            ))),
        };
    }

    let mut next = cur;
    let mut prev: Option<CId> = None;
    for child in kids {
        if let Some(p) = prev {
            next = if tree.suspends(p) {
                tree[p].last_state() + 1
            } else {
                tree[p].last_state()
            };
        }
        assign_block(tree, child, next)?;
        prev = Some(child);
    }

    let mut states: SmallVec<[u64; 4]> = SmallVec::new();
    for child in tree.children(id) {
        states.extend_from_slice(&tree[child].state_ids);
    }
    states.sort_unstable();
    states.dedup();
    tree[id].state_ids = states;

    if matches!(tree[id].node, CNode::Loop { .. }) {
        let back = (tree[id].last_state(), tree[id].first_state());
        tree[id].loop_back = Some(back);
    }
    Ok(tree[id].last_state())
}

/// Force an entire subtree into the single state `cur`. Fails on
/// structures that cannot fit in one cycle.
fn assign_shared(tree: &mut CTree, id: CId, cur: u64) -> WeftResult<()> {
    match &tree[id].node {
        CNode::Loop { test } => {
            return Err(Error::unsupported(
                "loop cannot complete within a single handshake cycle",
            )
            .with_pos(test.pos));
        }
        CNode::Cond { test } if tree[id].kind == CKind::Sequential => {
            return Err(Error::unsupported(
                "conditional spanning multiple states cannot complete \
                 within a single handshake cycle",
            )
            .with_pos(test.pos));
        }
        CNode::Root => unreachable!("root is never inside a shared region"),
        _ => {}
    }
    // The alternatives of a mutex region are mutually exclusive, so each
    // may carry a suspension of its own; everywhere else the children
    // chain within the one completion cycle.
    let exclusive = matches!(tree[id].node, CNode::Mutex | CNode::Cond { .. });
    if !exclusive {
        let suspending = tree
            .children(id)
            .into_iter()
            .filter(|&c| tree.suspends(c))
            .count();
        if suspending > 1 {
            return Err(Error::internal(format!(
                "{}: multiple suspensions inside a single-state region",
                StateAssigner::name()
            )));
        }
    }
    for child in tree.children(id) {
        assign_shared(tree, child, cur)?;
    }
    tree[id].state_ids = smallvec![cur];
    Ok(())
}

/// Registers written under a statement list, nested free blocks included.
fn reg_writes_in_stmts(stmts: &[Stmt], out: &mut HashSet<Id>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign(a) => {
                if let Target::Reg(name) = a.target {
                    out.insert(name);
                }
            }
            Stmt::Block(b) => reg_writes_in_block(b, out),
        }
    }
}

fn reg_writes_in_block(block: &Block, out: &mut HashSet<Id>) {
    match block {
        Block::Sequential(s) => reg_writes_in_stmts(&s.stmts, out),
        Block::Conditional(c) => {
            reg_writes_in_stmts(&c.body, out);
            if let Some(alt) = &c.alt {
                reg_writes_in_stmts(alt, out);
            }
        }
        Block::Loop(l) => reg_writes_in_stmts(&l.body, out),
        Block::InterfaceWait(w) => reg_writes_in_stmts(&w.body, out),
        Block::InterfaceLoop(l) => reg_writes_in_stmts(&l.body, out),
        Block::Emit(_) => {}
        Block::Container(c) => {
            c.alts.iter().for_each(|b| reg_writes_in_block(b, out))
        }
    }
}

fn reg_writes_in_subtree(tree: &CTree, id: CId) -> HashSet<Id> {
    let mut out = HashSet::new();
    let mut stack = vec![id];
    while let Some(next) = stack.pop() {
        let block = &tree[next];
        reg_writes_in_stmts(&block.prolog, &mut out);
        reg_writes_in_stmts(&block.stmts, &mut out);
        reg_writes_in_stmts(&block.epilog, &mut out);
        stack.extend(block.children.iter().copied());
    }
    out
}

/// For every conditional spanning more than one state, registers written
/// by one arm only must hold their value while the other arm runs.
fn hold_registers(tree: &mut CTree, id: CId) {
    let is_multi_cond = matches!(tree[id].node, CNode::Cond { .. })
        && tree[id].is_multi_state();
    if is_multi_cond {
        let kids = tree.children(id);
        debug_assert_eq!(kids.len(), 2, "a conditional has exactly two arms");
        let writes: Vec<HashSet<Id>> = kids
            .iter()
            .map(|&arm| reg_writes_in_subtree(tree, arm))
            .collect();
        for (i, &arm) in kids.iter().enumerate() {
            let other = &writes[1 - i];
            let mut holds: Vec<Id> =
                other.difference(&writes[i]).copied().collect();
            holds.sort_unstable();
            tree[arm].reg_holds = holds;
        }
    }
    for child in tree.children(id) {
        hold_registers(tree, child);
    }
}
