//! Optional boolean simplification of resolved conditions through binary
//! decision diagrams. *Not part of the default pipeline.*
//!
//! Each annotation is pushed through a BDD to a sum-of-products form,
//! common factors are pulled out of the disjuncts, and the result is
//! re-interned; logically equivalent conditions collapse onto shared pool
//! entries along the way.

use std::collections::HashMap;

use boolean_expression::Expr;

use crate::context::Named;
use crate::ctree::CTree;
use weft_ir::{Cond, CondId, CondPool};

#[derive(Default)]
pub struct CondSimplifier;

impl Named for CondSimplifier {
    fn name() -> &'static str {
        "simplify-conditions"
    }

    fn description() -> &'static str {
        "aggressively simplify control conditions using binary decision \
         diagrams"
    }
}

/// Rewrite every condition annotation on the tree to a simplified
/// equivalent.
pub fn simplify(tree: &mut CTree, pool: &mut CondPool) {
    let mut memo: HashMap<CondId, CondId> = HashMap::new();
    let mut update = |pool: &mut CondPool, slot: &mut Option<CondId>| {
        if let Some(c) = *slot {
            *slot = Some(simplify_cond(pool, &mut memo, c));
        }
    };
    let ids: Vec<_> = tree.iter().map(|(id, _)| id).collect();
    for id in ids {
        let block = &mut tree[id];
        update(pool, &mut block.gate);
        update(pool, &mut block.in_cond);
        update(pool, &mut block.cycle_cond);
        update(pool, &mut block.exit_cond);
        update(pool, &mut block.iter_exit);
    }
    log::debug!(
        "{}: pool grew to {} conditions",
        CondSimplifier::name(),
        pool.len()
    );
}

fn simplify_cond(
    pool: &mut CondPool,
    memo: &mut HashMap<CondId, CondId>,
    id: CondId,
) -> CondId {
    if let Some(&done) = memo.get(&id) {
        return done;
    }
    let sop = to_expr(pool, id).simplify_via_bdd();
    let result = rebuild(pool, sop);
    memo.insert(id, result);
    result
}

/// Connectives become expression nodes; everything else is a terminal
/// keyed by its own pool id.
fn to_expr(pool: &CondPool, id: CondId) -> Expr<CondId> {
    match *pool.get(id) {
        Cond::And(l, r) => {
            Expr::and(to_expr(pool, l), to_expr(pool, r))
        }
        Cond::Or(l, r) => Expr::or(to_expr(pool, l), to_expr(pool, r)),
        Cond::Not(c) => Expr::not(to_expr(pool, c)),
        Cond::True => Expr::Const(true),
        _ => Expr::Terminal(id),
    }
}

fn intern(pool: &mut CondPool, expr: Expr<CondId>) -> CondId {
    match expr {
        Expr::Terminal(id) => id,
        Expr::And(l, r) => {
            let l = intern(pool, *l);
            let r = intern(pool, *r);
            pool.and(l, r)
        }
        Expr::Or(l, r) => {
            let l = intern(pool, *l);
            let r = intern(pool, *r);
            pool.or(l, r)
        }
        Expr::Not(e) => {
            let c = intern(pool, *e);
            pool.not(c)
        }
        Expr::Const(true) => pool.tru(),
        Expr::Const(false) => pool.fals(),
    }
}

fn extract_dnf(expr: Expr<CondId>, acc: &mut Vec<Expr<CondId>>) {
    match expr {
        Expr::Or(l, r) => {
            extract_dnf(*l, acc);
            extract_dnf(*r, acc);
        }
        _ => acc.push(expr),
    }
}

fn extract_cnf(expr: Expr<CondId>, acc: &mut Vec<Expr<CondId>>) {
    match expr {
        Expr::And(l, r) => {
            extract_cnf(*l, acc);
            extract_cnf(*r, acc);
        }
        _ => acc.push(expr),
    }
}

/// Re-intern a sum-of-products expression, factoring terms common to all
/// disjuncts out front.
fn rebuild(pool: &mut CondPool, sop: Expr<CondId>) -> CondId {
    let mut disjuncts = Vec::new();
    extract_dnf(sop, &mut disjuncts);

    if disjuncts.len() == 1 {
        return intern(pool, disjuncts.pop().unwrap());
    }

    let sets = disjuncts
        .into_iter()
        .map(|d| {
            let mut conjuncts = Vec::new();
            extract_cnf(d, &mut conjuncts);
            conjuncts
        })
        .collect::<Vec<_>>();

    let mut common = sets[0].clone();
    common.retain(|e| sets.iter().all(|s| s.contains(e)));

    let mut rest = Vec::with_capacity(sets.len());
    for s in sets {
        let conjs = s
            .into_iter()
            .filter(|e| !common.contains(e))
            .map(|e| intern(pool, e))
            .collect::<Vec<_>>();
        rest.push(pool.and_all(conjs));
    }
    let rest = pool.or_all(rest);

    let common = common
        .into_iter()
        .map(|e| intern(pool, e))
        .collect::<Vec<_>>();
    let common = pool.and_all(common);

    pool.and(common, rest)
}
