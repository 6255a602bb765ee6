//! The condition resolver: annotates every control block with its
//! activation, stay and exit conditions, all interned in the shared pool.
//!
//! Three walks. Local gates first (branch tests for state-sharing
//! conditionals), then a post-order walk for exit and stay conditions,
//! then a pre-order walk that threads activation down from the root,
//! dropping inherited terms once the machine has moved past the state
//! they were sampled in.

use crate::context::Named;
use crate::ctree::{ArmGate, CId, CKind, CNode, CTree};
use weft_ir::{CondId, CondPool};
use weft_utils::{Error, WeftResult};

pub struct CondResolver;

impl Named for CondResolver {
    fn name() -> &'static str {
        "resolve-conditions"
    }

    fn description() -> &'static str {
        "compute activation, stay and exit conditions per control block"
    }
}

pub fn resolve(tree: &mut CTree, pool: &mut CondPool) -> WeftResult<()> {
    let root = tree.root();
    resolve_gates(tree, pool, root);
    resolve_exits(tree, pool, root)?;
    let tru = pool.tru();
    let est = tree[root].first_state();
    resolve_in(tree, pool, root, tru, est);
    log::debug!(
        "{}: {} interned conditions",
        CondResolver::name(),
        pool.len()
    );
    Ok(())
}

/// Local gates. Only the arms of a state-sharing conditional test their
/// branch condition directly; everywhere else the machine state already
/// identifies the active block, and the test only guards transitions.
fn resolve_gates(tree: &mut CTree, pool: &mut CondPool, id: CId) {
    let arm = match &tree[id].node {
        CNode::Arm { gate } => {
            let parent = tree[id].parent.expect("arms have a parent");
            (tree[parent].kind == CKind::Mutex).then(|| gate.clone())
        }
        _ => None,
    };
    let gate = match arm {
        Some(ArmGate::When(test)) => pool.expr(test.name),
        Some(ArmGate::Unless(test)) => {
            let t = pool.expr(test.name);
            pool.not(t)
        }
        None => pool.tru(),
    };
    tree[id].gate = Some(gate);
    for child in tree.children(id) {
        resolve_gates(tree, pool, child);
    }
}

/// Conjunction of the exit conditions of a handshake body: the handshake
/// completes only in a cycle where everything sharing its state can
/// finish too.
pub(crate) fn chain_exit(
    tree: &CTree,
    pool: &mut CondPool,
    id: CId,
) -> CondId {
    let exits: Vec<CondId> = tree[id]
        .children
        .iter()
        .filter_map(|&c| tree[c].exit_cond)
        .collect();
    pool.and_all(exits)
}

/// Exit of a sequential scope: its last suspending child's exit, pinned
/// to that child's final state when the scope spans several.
fn scope_exit(tree: &CTree, pool: &mut CondPool, id: CId) -> Option<CondId> {
    let multi = tree[id].is_multi_state();
    for &child in tree[id].children.iter().rev() {
        if let Some(exit) = tree[child].exit_cond {
            let exit = if multi && !tree[child].is_multi_state() {
                let pin = pool.state_eq(tree[child].last_state());
                pool.and(pin, exit)
            } else {
                exit
            };
            return Some(exit);
        }
    }
    None
}

/// One arm's exit, pinned to the arm's final state. Multi-state arms come
/// pre-pinned by [`scope_exit`]; an arm with no suspension of its own
/// exits its skip state unconditionally.
fn pinned_arm_exit(tree: &CTree, pool: &mut CondPool, arm: CId) -> CondId {
    match tree[arm].exit_cond {
        Some(exit) if tree[arm].is_multi_state() => exit,
        other => {
            let pin = pool.state_eq(tree[arm].last_state());
            let exit = other.unwrap_or_else(|| pool.tru());
            pool.and(pin, exit)
        }
    }
}

/// Stay condition of a scope: any child, selected by its states, wants to
/// stay.
fn scope_cycle(tree: &CTree, pool: &mut CondPool, id: CId) -> Option<CondId> {
    let multi = tree[id].is_multi_state();
    let mut terms = Vec::new();
    for &child in &tree[id].children {
        if let Some(cycle) = tree[child].cycle_cond {
            let sel = if multi {
                let eqs: Vec<CondId> = tree[child]
                    .state_ids
                    .iter()
                    .map(|&s| pool.state_eq(s))
                    .collect();
                pool.or_all(eqs)
            } else {
                pool.tru()
            };
            terms.push(pool.and(sel, cycle));
        }
    }
    (!terms.is_empty()).then(|| pool.or_all(terms))
}

/// Post-order: exit and stay conditions, and for loops the per-pass exit.
fn resolve_exits(
    tree: &mut CTree,
    pool: &mut CondPool,
    id: CId,
) -> WeftResult<()> {
    for child in tree.children(id) {
        resolve_exits(tree, pool, child)?;
    }

    let node = tree[id].node.clone();
    let (exit, cycle) = match node {
        CNode::Leaf => (None, None),
        CNode::Emit { iface } => {
            let exit = pool.ready(iface.name);
            (Some(exit), Some(pool.not(exit)))
        }
        CNode::Wait { iface } => {
            let chain = chain_exit(tree, pool, id);
            let valid = pool.valid(iface.name);
            let exit = pool.and(valid, chain);
            (Some(exit), Some(pool.not(exit)))
        }
        CNode::IfaceLoop { iface, end } => {
            let chain = chain_exit(tree, pool, id);
            let valid = pool.valid(iface.name);
            let end = pool.expr(end.name);
            let done = pool.and(valid, end);
            let exit = pool.and(done, chain);
            (Some(exit), Some(pool.not(exit)))
        }
        CNode::Cond { .. } => {
            let arms = tree.children(id);
            let mutex = tree[id].kind == CKind::Mutex;
            let mut exits = Vec::new();
            let mut cycles = Vec::new();
            for &arm in &arms {
                if mutex {
                    let gate = tree[arm].gate.expect("gates resolved first");
                    let exit = tree[arm]
                        .exit_cond
                        .unwrap_or_else(|| pool.tru());
                    exits.push(pool.and(gate, exit));
                    if let Some(cycle) = tree[arm].cycle_cond {
                        cycles.push(pool.and(gate, cycle));
                    }
                } else {
                    exits.push(pinned_arm_exit(tree, pool, arm));
                    if let Some(cycle) = tree[arm].cycle_cond {
                        let eqs: Vec<CondId> = tree[arm]
                            .state_ids
                            .iter()
                            .map(|&s| pool.state_eq(s))
                            .collect();
                        let sel = pool.or_all(eqs);
                        cycles.push(pool.and(sel, cycle));
                    }
                }
            }
            let exit = pool.or_all(exits);
            let cycle = (!cycles.is_empty()).then(|| pool.or_all(cycles));
            (Some(exit), cycle)
        }
        CNode::Mutex => {
            let exits: Vec<CondId> = tree[id]
                .children
                .iter()
                .filter_map(|&c| tree[c].exit_cond)
                .collect();
            if exits.is_empty() {
                return Err(Error::internal(format!(
                    "{}: mutex container without a suspension",
                    CondResolver::name()
                )));
            }
            let cycles: Vec<CondId> = tree[id]
                .children
                .iter()
                .filter_map(|&c| tree[c].cycle_cond)
                .collect();
            let exit = pool.or_all(exits);
            let cycle = (!cycles.is_empty()).then(|| pool.or_all(cycles));
            (Some(exit), cycle)
        }
        CNode::Loop { test } => {
            let iter = scope_exit(tree, pool, id).ok_or_else(|| {
                Error::internal(format!(
                    "{}: loop body without a suspension",
                    CondResolver::name()
                ))
            })?;
            tree[id].iter_exit = Some(iter);
            let t = pool.expr(test.name);
            let again = pool.not(t);
            let exit = pool.and(iter, again);
            // Staying in the loop includes taking the back edge.
            let back_pin = pool.state_eq(tree[id].last_state());
            let pass = pool.and(iter, t);
            let back = pool.and(back_pin, pass);
            let cycle = match scope_cycle(tree, pool, id) {
                Some(c) => pool.or(c, back),
                None => back,
            };
            (Some(exit), Some(cycle))
        }
        CNode::Root | CNode::Seq | CNode::Arm { .. } => {
            let exit = scope_exit(tree, pool, id);
            let mut cycle = scope_cycle(tree, pool, id);
            if matches!(tree[id].node, CNode::Root) && cycle.is_none() {
                // A module with no suspension parks in its single state.
                cycle = Some(pool.tru());
            }
            (exit, cycle)
        }
    };

    tree[id].exit_cond = exit;
    tree[id].cycle_cond = cycle;
    Ok(())
}

/// Pre-order: absolute activation conditions. `est` is the state the
/// inherited condition was sampled in; once a block starts in a different
/// state, the machine can only have arrived by honoring the inherited
/// condition on a transition, so it is dropped rather than re-tested.
fn resolve_in(
    tree: &mut CTree,
    pool: &mut CondPool,
    id: CId,
    inherited: CondId,
    est: u64,
) {
    let first = tree[id].first_state();
    let inherited = if first == est { inherited } else { pool.tru() };

    let state_guard = match tree[id].parent {
        Some(p) if tree[id].state_ids.len() < tree[p].state_ids.len() => {
            let eqs: Vec<CondId> = tree[id]
                .state_ids
                .iter()
                .map(|&s| pool.state_eq(s))
                .collect();
            pool.or_all(eqs)
        }
        _ => pool.tru(),
    };
    let local = tree[id].gate.expect("gates resolved first");
    let gate = pool.and(state_guard, local);
    tree[id].gate = Some(gate);
    let in_cond = pool.and(inherited, gate);
    tree[id].in_cond = Some(in_cond);

    for child in tree.children(id) {
        resolve_in(tree, pool, child, in_cond, first);
    }
}
