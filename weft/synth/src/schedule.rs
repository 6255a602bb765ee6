//! The scheduler: groups a flat statement sequence into a control-block
//! tree whose nodes expose the state boundaries of the eventual machine.
//!
//! Statements are classified as *blocking* (containing a suspension point,
//! directly or nested) or *free*. Runs of free statements accumulate into
//! leaves or attach to a neighboring blocking block as its prolog or
//! epilog; blocking blocks become children of the enclosing scope.

use crate::context::Named;
use crate::ctree::{ArmGate, CId, CKind, CNode, CTree};
use weft_ir::{Block, SequentialBlock, Stmt, Target};
use weft_utils::{Error, WeftResult};

pub struct Scheduler;

impl Named for Scheduler {
    fn name() -> &'static str {
        "schedule"
    }

    fn description() -> &'static str {
        "group a statement sequence into a control-block tree"
    }
}

/// Minimum number of distinct states a block demands. Zero for free
/// blocks. A conditional is a mutex (state-sharing) region only when
/// every branch demands at most one state.
fn needed_states(block: &Block) -> u64 {
    fn stmts_demand(stmts: &[Stmt]) -> u64 {
        stmts
            .iter()
            .map(|s| match s {
                Stmt::Assign(_) => 0,
                Stmt::Block(b) => needed_states(b),
            })
            .sum()
    }
    match block {
        Block::InterfaceWait(_) | Block::InterfaceLoop(_) | Block::Emit(_) => 1,
        Block::Sequential(s) => stmts_demand(&s.stmts),
        Block::Conditional(c) => {
            let body = stmts_demand(&c.body);
            let alt = c.alt.as_ref().map(|a| stmts_demand(a)).unwrap_or(0);
            body.max(alt)
        }
        Block::Loop(l) => stmts_demand(&l.body),
        Block::Container(c) => {
            c.alts.iter().map(needed_states).max().unwrap_or(0)
        }
    }
}

/// Reject free statements the machine cannot realize combinationally: a
/// loop without a suspension point would have to unroll, a container's
/// alternative selection is carried in-band by its handshakes, and port
/// writes only make sense against an emit's handshake.
fn check_free_stmt(stmt: &Stmt) -> WeftResult<()> {
    let block = match stmt {
        Stmt::Assign(a) => {
            if matches!(a.target, Target::Port(_)) {
                return Err(Error::ambiguous_interface(format!(
                    "port `{}` written outside an emit block",
                    a.target.name()
                ))
                .with_pos(a.pos));
            }
            return Ok(());
        }
        Stmt::Block(b) => b,
    };
    match block {
        Block::Loop(l) => Err(Error::unsupported(
            "loop with no suspension point in its body cannot be synthesized",
        )
        .with_pos(l.test.pos)),
        Block::Container(_) => Err(Error::unsupported(
            "container with no suspension points has no way to select an \
             alternative",
        )),
        Block::Sequential(s) => s.stmts.iter().try_for_each(check_free_stmt),
        Block::Conditional(c) => {
            c.body.iter().try_for_each(check_free_stmt)?;
            if let Some(alt) = &c.alt {
                alt.iter().try_for_each(check_free_stmt)?;
            }
            Ok(())
        }
        Block::InterfaceWait(_) | Block::InterfaceLoop(_) | Block::Emit(_) => {
            unreachable!("suspending block classified as free")
        }
    }
}

/// Build the control-block tree for a module body.
pub fn schedule(body: &SequentialBlock) -> WeftResult<CTree> {
    let mut tree = CTree::new();
    let root = tree.root();
    schedule_stmts(&mut tree, root, &body.stmts)?;
    log::debug!(
        "{}: scheduled {} control blocks",
        Scheduler::name(),
        tree.len()
    );
    Ok(tree)
}

/// Walk one scope's statements, accumulating free runs and recursing into
/// blocking blocks.
fn schedule_stmts(
    tree: &mut CTree,
    parent: CId,
    stmts: &[Stmt],
) -> WeftResult<()> {
    let mut pending: Vec<Stmt> = Vec::new();
    let mut last_blocking: Option<CId> = None;

    for stmt in stmts {
        if !stmt.suspends() {
            check_free_stmt(stmt)?;
            pending.push(stmt.clone());
            continue;
        }
        let Stmt::Block(block) = stmt else {
            unreachable!("plain assignments never suspend")
        };
        // A run of free statements rides along as the prolog of the
        // blocking block it precedes.
        let pre = std::mem::take(&mut pending);
        let child = schedule_block(tree, parent, block)?;
        tree[child].prolog = pre;
        last_blocking = Some(child);
    }

    if !pending.is_empty() {
        match last_blocking {
            Some(child) => tree[child].epilog.extend(pending),
            None => {
                let leaf =
                    tree.add_child(parent, CKind::Sequential, CNode::Leaf);
                tree[leaf].stmts = pending;
            }
        }
    }
    Ok(())
}

/// Build the control block for one blocking block and return its id.
fn schedule_block(
    tree: &mut CTree,
    parent: CId,
    block: &Block,
) -> WeftResult<CId> {
    match block {
        Block::Sequential(s) => {
            let id = tree.add_child(parent, CKind::Sequential, CNode::Seq);
            schedule_stmts(tree, id, &s.stmts)?;
            Ok(id)
        }
        Block::Conditional(c) => {
            let kind = if needed_states(block) <= 1 {
                CKind::Mutex
            } else {
                CKind::Sequential
            };
            let id = tree.add_child(
                parent,
                kind,
                CNode::Cond {
                    test: c.test.clone(),
                },
            );
            let then_arm = tree.add_child(
                id,
                CKind::Sequential,
                CNode::Arm {
                    gate: ArmGate::When(c.test.clone()),
                },
            );
            schedule_stmts(tree, then_arm, &c.body)?;
            let else_arm = tree.add_child(
                id,
                CKind::Sequential,
                CNode::Arm {
                    gate: ArmGate::Unless(c.test.clone()),
                },
            );
            if let Some(alt) = &c.alt {
                schedule_stmts(tree, else_arm, alt)?;
            }
            Ok(id)
        }
        Block::Loop(l) => {
            let id = tree.add_child(
                parent,
                CKind::Sequential,
                CNode::Loop {
                    test: l.test.clone(),
                },
            );
            schedule_stmts(tree, id, &l.body)?;
            Ok(id)
        }
        Block::InterfaceWait(w) => {
            check_handshake_body(&w.body, w.pos)?;
            let id = tree.add_child(
                parent,
                CKind::Mutex,
                CNode::Wait {
                    iface: w.iface.clone(),
                },
            );
            schedule_stmts(tree, id, &w.body)?;
            Ok(id)
        }
        Block::InterfaceLoop(l) => {
            check_handshake_body(&l.body, l.pos)?;
            let id = tree.add_child(
                parent,
                CKind::Mutex,
                CNode::IfaceLoop {
                    iface: l.iface.clone(),
                    end: l.end.clone(),
                },
            );
            schedule_stmts(tree, id, &l.body)?;
            Ok(id)
        }
        Block::Emit(e) => {
            for out in &e.outputs {
                if !matches!(out.target, Target::Port(_)) {
                    return Err(Error::ambiguous_interface(format!(
                        "emit on `{}` assigns non-port target `{}`",
                        e.iface.name,
                        out.target.name()
                    ))
                    .with_pos(out.pos));
                }
            }
            let id = tree.add_child(
                parent,
                CKind::Sequential,
                CNode::Emit {
                    iface: e.iface.clone(),
                },
            );
            tree[id].stmts =
                e.outputs.iter().cloned().map(Stmt::Assign).collect();
            Ok(id)
        }
        Block::Container(c) => {
            let id = tree.add_child(parent, CKind::Mutex, CNode::Mutex);
            for alt in &c.alts {
                if alt.suspends() {
                    schedule_block(tree, id, alt)?;
                } else {
                    // Free alternatives stay inline, the mutex wrapper
                    // only ever carries state-introducing children.
                    let leaf =
                        tree.add_child(id, CKind::Sequential, CNode::Leaf);
                    tree[leaf].stmts = vec![Stmt::Block(alt.clone())];
                }
            }
            Ok(id)
        }
    }
}

/// A handshake body anchors to a single completion cycle: more than one
/// suspension point of its own leaves no cycle to anchor the transfer to.
fn check_handshake_body(
    body: &[Stmt],
    pos: weft_utils::GPosIdx,
) -> WeftResult<()> {
    let blocking = body.iter().filter(|s| s.suspends()).count();
    if blocking > 1 {
        return Err(Error::ambiguous_interface(
            "handshake body contains more than one suspension point",
        )
        .with_pos(pos));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctree::CNode;
    use weft_ir::{Assign, DType, Expr, Iface};

    fn reg(name: &str, val: &str) -> Stmt {
        Stmt::Assign(Assign::new(
            Target::Reg(name.into()),
            Expr::new(val, DType::uint(8)),
        ))
    }

    #[test]
    fn empty_body_yields_no_children() {
        let tree = schedule(&SequentialBlock { stmts: vec![] }).unwrap();
        assert!(tree[tree.root()].children.is_empty());
    }

    #[test]
    fn all_free_body_is_one_leaf() {
        let tree = schedule(&SequentialBlock {
            stmts: vec![reg("a", "x"), reg("b", "y")],
        })
        .unwrap();
        let kids = tree.children(tree.root());
        assert_eq!(kids.len(), 1);
        assert!(matches!(tree[kids[0]].node, CNode::Leaf));
        assert_eq!(tree[kids[0]].stmts.len(), 2);
    }

    #[test]
    fn frees_before_first_blocking_become_its_prolog() {
        let input = Iface::consumer("in", DType::uint(8));
        let tree = schedule(&SequentialBlock {
            stmts: vec![
                reg("a", "x"),
                Stmt::Block(Block::wait(input, vec![])),
            ],
        })
        .unwrap();
        let kids = tree.children(tree.root());
        assert_eq!(kids.len(), 1);
        assert!(matches!(tree[kids[0]].node, CNode::Wait { .. }));
        assert_eq!(tree[kids[0]].prolog.len(), 1);
    }

    #[test]
    fn frees_between_blocking_children_become_prolog() {
        let input = Iface::consumer("in", DType::uint(8));
        let output = Iface::producer("out", DType::uint(8));
        let tree = schedule(&SequentialBlock {
            stmts: vec![
                Stmt::Block(Block::wait(input, vec![])),
                reg("a", "x"),
                Stmt::Block(Block::emit(output, vec![])),
                reg("b", "y"),
            ],
        })
        .unwrap();
        let kids = tree.children(tree.root());
        assert_eq!(kids.len(), 2);
        assert_eq!(tree[kids[1]].prolog.len(), 1);
        assert_eq!(tree[kids[1]].epilog.len(), 1);
    }

    #[test]
    fn free_conditional_stays_inline() {
        let cond = Block::cond(
            Expr::new("c", DType::bit()),
            vec![reg("a", "x")],
            None,
        );
        let tree = schedule(&SequentialBlock {
            stmts: vec![Stmt::Block(cond)],
        })
        .unwrap();
        let kids = tree.children(tree.root());
        assert_eq!(kids.len(), 1);
        assert!(matches!(tree[kids[0]].node, CNode::Leaf));
    }

    #[test]
    fn branch_demand_selects_mutex_or_sequential() {
        let output = Iface::producer("out", DType::uint(8));
        // One emit per branch: a mutex region.
        let mutex = Block::cond(
            Expr::new("c", DType::bit()),
            vec![Stmt::Block(Block::emit(output.clone(), vec![]))],
            Some(vec![Stmt::Block(Block::emit(output.clone(), vec![]))]),
        );
        let tree = schedule(&SequentialBlock {
            stmts: vec![Stmt::Block(mutex)],
        })
        .unwrap();
        let kids = tree.children(tree.root());
        assert_eq!(tree[kids[0]].kind, CKind::Mutex);

        // Two emits in one branch: needs its own state ordering.
        let seq = Block::cond(
            Expr::new("c", DType::bit()),
            vec![
                Stmt::Block(Block::emit(output.clone(), vec![])),
                Stmt::Block(Block::emit(output, vec![])),
            ],
            None,
        );
        let tree = schedule(&SequentialBlock {
            stmts: vec![Stmt::Block(seq)],
        })
        .unwrap();
        let kids = tree.children(tree.root());
        assert_eq!(tree[kids[0]].kind, CKind::Sequential);
    }

    #[test]
    fn combinational_loop_is_rejected() {
        let free_loop = Block::repeat(
            Expr::new("c", DType::bit()),
            vec![reg("a", "x")],
        );
        let err = schedule(&SequentialBlock {
            stmts: vec![Stmt::Block(free_loop)],
        })
        .unwrap_err();
        assert!(!err.is_internal());
    }

    #[test]
    fn overfull_handshake_body_is_rejected() {
        let input = Iface::consumer("in", DType::uint(8));
        let output = Iface::producer("out", DType::uint(8));
        let wait = Block::wait(
            input,
            vec![
                Stmt::Block(Block::emit(output.clone(), vec![])),
                Stmt::Block(Block::emit(output, vec![])),
            ],
        );
        let err = schedule(&SequentialBlock {
            stmts: vec![Stmt::Block(wait)],
        })
        .unwrap_err();
        assert!(!err.is_internal());
    }
}
