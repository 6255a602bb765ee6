//! Boolean control conditions, hash-consed into a per-compilation pool.
//!
//! Every condition computed during resolution is registered here exactly
//! once: structurally identical conditions collapse to one [`CondId`], so
//! the resolved module is a DAG of shared conditions rather than a
//! duplicated tree, and the simplifier can rewrite ids wholesale.

use std::collections::HashMap;

use weft_utils::Id;

/// Reference to a condition in a [`CondPool`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CondId(u32);

impl CondId {
    /// Whether this refers to `Cond::True`. (The first condition in the
    /// pool is always `True`.)
    pub fn is_true(&self) -> bool {
        self.0 == 0
    }

    /// The underlying number. Clients should only rely on this being
    /// unique for non-equal conditions in a single pool.
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// A boolean control condition. Connectives reference other pool entries
/// by id; the leaves are handshake signals, boolean operands, and state
/// register comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cond {
    Or(CondId, CondId),
    And(CondId, CondId),
    Not(CondId),
    True,
    /// A boolean-typed operand read as a condition.
    Expr(Id),
    /// The producer behind this interface has data for us this cycle.
    Valid(Id),
    /// The consumer of this interface will accept data this cycle.
    Ready(Id),
    /// The state register holds the given state.
    StateEq(u64),
}

/// Arena storage for [`Cond`]s with hash-consing.
///
/// Invariants:
/// * `CondId`s only go "backward": connectives refer to smaller indices.
/// * The first condition is always `Cond::True`.
/// * Interning the same structure twice yields the same id.
#[derive(Debug)]
pub struct CondPool {
    nodes: Vec<Cond>,
    dedup: HashMap<Cond, CondId>,
}

impl CondPool {
    pub fn new() -> Self {
        let mut pool = CondPool {
            nodes: Vec::with_capacity(64),
            dedup: HashMap::new(),
        };
        let t = pool.intern(Cond::True);
        debug_assert!(t.is_true());
        pool
    }

    fn intern(&mut self, cond: Cond) -> CondId {
        if let Some(&id) = self.dedup.get(&cond) {
            return id;
        }
        let id = CondId(
            self.nodes
                .len()
                .try_into()
                .expect("too many conditions in the pool"),
        );
        self.nodes.push(cond.clone());
        self.dedup.insert(cond, id);
        id
    }

    /// The constant true condition.
    pub fn tru(&self) -> CondId {
        CondId(0)
    }

    /// The constant false condition.
    pub fn fals(&mut self) -> CondId {
        self.intern(Cond::Not(CondId(0)))
    }

    pub fn expr(&mut self, name: Id) -> CondId {
        self.intern(Cond::Expr(name))
    }

    pub fn valid(&mut self, iface: Id) -> CondId {
        self.intern(Cond::Valid(iface))
    }

    pub fn ready(&mut self, iface: Id) -> CondId {
        self.intern(Cond::Ready(iface))
    }

    pub fn state_eq(&mut self, state: u64) -> CondId {
        self.intern(Cond::StateEq(state))
    }

    /// `l && r` with the usual identities applied before interning.
    /// Operands are ordered by id so commuted conjunctions share one entry.
    pub fn and(&mut self, l: CondId, r: CondId) -> CondId {
        if l.is_true() || l == r {
            return r;
        }
        if r.is_true() {
            return l;
        }
        let (a, b) = if l <= r { (l, r) } else { (r, l) };
        self.intern(Cond::And(a, b))
    }

    /// `l || r` with the usual identities applied before interning.
    pub fn or(&mut self, l: CondId, r: CondId) -> CondId {
        if l.is_true() || r.is_true() {
            return self.tru();
        }
        if l == r {
            return l;
        }
        let (a, b) = if l <= r { (l, r) } else { (r, l) };
        self.intern(Cond::Or(a, b))
    }

    /// `!c`. Double negation resolves to the inner condition.
    pub fn not(&mut self, c: CondId) -> CondId {
        if let Cond::Not(inner) = self.nodes[c.0 as usize] {
            return inner;
        }
        self.intern(Cond::Not(c))
    }

    /// Conjunction over an iterator, `True` when empty.
    pub fn and_all<I: IntoIterator<Item = CondId>>(&mut self, it: I) -> CondId {
        it.into_iter().fold(self.tru(), |acc, c| self.and(acc, c))
    }

    /// Disjunction over an iterator, `False` when empty.
    pub fn or_all<I: IntoIterator<Item = CondId>>(&mut self, it: I) -> CondId {
        let mut it = it.into_iter();
        let Some(first) = it.next() else {
            return self.fals();
        };
        it.fold(first, |acc, c| self.or(acc, c))
    }

    pub fn get(&self, id: CondId) -> &Cond {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all conditions in the pool in id order.
    pub fn iter(&self) -> impl Iterator<Item = (CondId, &Cond)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, c)| (CondId(i.try_into().unwrap()), c))
    }

    /// Render a condition as a string, expanding shared subterms.
    pub fn display(&self, id: CondId) -> String {
        match self.get(id) {
            Cond::Or(l, r) => {
                format!("({} | {})", self.display(*l), self.display(*r))
            }
            Cond::And(l, r) => {
                format!("({} & {})", self.display(*l), self.display(*r))
            }
            Cond::Not(c) => format!("!{}", self.display(*c)),
            Cond::True => "1".to_string(),
            Cond::Expr(e) => e.to_string(),
            Cond::Valid(i) => format!("{}_valid", i),
            Cond::Ready(i) => format!("{}_ready", i),
            Cond::StateEq(s) => format!("state == {}", s),
        }
    }
}

impl Default for CondPool {
    fn default() -> Self {
        Self::new()
    }
}
