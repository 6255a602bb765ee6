//! Tidies generated concern blocks: merges assignments that both branches
//! of a conditional agree on, promotes lone unconditional assignments
//! into the default table, and drops conditionals left empty. Idempotent.

use linked_hash_map::LinkedHashMap;

use crate::context::Named;
use weft_ir::{HdlAssign, HdlBlock, HdlModule, HdlStmt, HdlValue};
use weft_utils::Id;

pub struct Cleaner;

impl Named for Cleaner {
    fn name() -> &'static str {
        "cleanup"
    }

    fn description() -> &'static str {
        "merge branch-independent assignments and drop empty conditionals"
    }
}

pub fn clean(module: &mut HdlModule) {
    for (concern, block) in module.concerns.iter_mut() {
        let before = count_stmts(block);
        tidy(block);
        let after = count_stmts(block);
        if after < before {
            log::trace!(
                "{}: {} block shrank from {} to {} statements",
                Cleaner::name(),
                concern.name(),
                before,
                after
            );
        }
    }
}

fn count_stmts(block: &HdlBlock) -> usize {
    block
        .stmts
        .iter()
        .map(|s| match s {
            HdlStmt::Assign(_) => 1,
            HdlStmt::If(i) => {
                1 + count_stmts(&i.body)
                    + i.alt.as_ref().map_or(0, count_stmts)
            }
        })
        .sum()
}

fn tidy(block: &mut HdlBlock) {
    for stmt in &mut block.stmts {
        if let HdlStmt::If(i) = stmt {
            tidy(&mut i.body);
            if let Some(alt) = &mut i.alt {
                tidy(alt);
            }
        }
    }

    let mut kept = Vec::with_capacity(block.stmts.len());
    for stmt in std::mem::take(&mut block.stmts) {
        match stmt {
            HdlStmt::If(mut i) => {
                if i.alt.is_some() {
                    for a in lift_agreed(&mut i) {
                        kept.push(HdlStmt::Assign(a));
                    }
                }
                let alt_empty =
                    i.alt.as_ref().map_or(true, HdlBlock::is_empty);
                if alt_empty {
                    i.alt = None;
                }
                if !i.body.is_empty() || i.alt.is_some() {
                    kept.push(HdlStmt::If(i));
                }
            }
            a => kept.push(a),
        }
    }
    block.stmts = kept;

    // Only the top block of a concern carries a default table.
    if !block.defaults.is_empty() {
        promote(block);
    }
}

/// Count every assignment to each target in a block, nested conditionals
/// included.
fn assign_counts(block: &HdlBlock, counts: &mut LinkedHashMap<Id, usize>) {
    for stmt in &block.stmts {
        match stmt {
            HdlStmt::Assign(a) => *counts.entry(a.target).or_insert(0) += 1,
            HdlStmt::If(i) => {
                assign_counts(&i.body, counts);
                if let Some(alt) = &i.alt {
                    assign_counts(alt, counts);
                }
            }
        }
    }
}

/// Pull assignments made identically and unconditionally by both branches
/// out in front of the conditional. Safe only for targets each branch
/// touches exactly once and nowhere else, so ordering cannot change the
/// winner.
fn lift_agreed(cond: &mut weft_ir::HdlIf) -> Vec<HdlAssign> {
    let alt = cond.alt.as_mut().expect("caller checked for an alternative");

    let mut body_counts = LinkedHashMap::new();
    assign_counts(&cond.body, &mut body_counts);
    let mut alt_counts = LinkedHashMap::new();
    assign_counts(alt, &mut alt_counts);

    let direct = |block: &HdlBlock, target: Id| -> Option<HdlValue> {
        block.stmts.iter().find_map(|s| match s {
            HdlStmt::Assign(a) if a.target == target => {
                Some(a.value.clone())
            }
            _ => None,
        })
    };

    let mut lifted = Vec::new();
    for (&target, &n) in &body_counts {
        if n != 1 || alt_counts.get(&target) != Some(&1) {
            continue;
        }
        let (Some(b), Some(a)) =
            (direct(&cond.body, target), direct(alt, target))
        else {
            continue;
        };
        if b == a {
            lifted.push(HdlAssign { target, value: b });
        }
    }

    let drop_lifted = |block: &mut HdlBlock| {
        block.stmts.retain(|s| match s {
            HdlStmt::Assign(a) => {
                !lifted.iter().any(|l| l.target == a.target)
            }
            HdlStmt::If(_) => true,
        });
    };
    drop_lifted(&mut cond.body);
    drop_lifted(alt);
    lifted
}

/// Fold a top-level unconditional assignment into the default table when
/// it is the only writer of its target.
fn promote(block: &mut HdlBlock) {
    let mut counts = LinkedHashMap::new();
    assign_counts(block, &mut counts);

    let mut kept = Vec::with_capacity(block.stmts.len());
    for stmt in std::mem::take(&mut block.stmts) {
        match stmt {
            HdlStmt::Assign(a) if counts.get(&a.target) == Some(&1) => {
                block.defaults.insert(a.target, a.value);
            }
            other => kept.push(other),
        }
    }
    block.stmts = kept;
}
