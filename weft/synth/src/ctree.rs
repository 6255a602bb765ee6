//! The control-block tree: the scheduler's grouping of a module body into
//! state-introducing fragments, annotated in place by the state assigner
//! and the condition resolver, consumed once by the generator.
//!
//! Nodes live in an arena addressed by [`CId`]; parent links are plain
//! indices, so the graph has single ownership and no reference cycles.

use smallvec::SmallVec;

use weft_ir::{CondId, Expr, Iface, Stmt};
use weft_utils::Id;

/// Index of a control block in its [`CTree`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CId(u32);

impl CId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How the children of a control block relate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CKind {
    /// Children are mutually exclusive alternatives sharing one state.
    Mutex,
    /// Children occupy temporally ordered, distinct states.
    Sequential,
}

/// Which side of a conditional an arm implements.
#[derive(Debug, Clone)]
pub enum ArmGate {
    /// Active when the test holds.
    When(Expr),
    /// Active when the test does not hold.
    Unless(Expr),
}

/// What a control block wraps.
#[derive(Debug, Clone)]
pub enum CNode {
    /// The module body.
    Root,
    /// A nested sequential scope.
    Seq,
    /// A flat run of non-blocking statements in one state.
    Leaf,
    /// A suspending conditional; children are its two arms.
    Cond { test: Expr },
    /// One branch of a conditional.
    Arm { gate: ArmGate },
    /// A suspending loop; the continuation test is evaluated at the end
    /// of every pass over the body.
    Loop { test: Expr },
    /// A single blocking handshake; the body executes in the completion
    /// cycle.
    Wait { iface: Iface },
    /// A repeated handshake, re-armed until the end-of-transfer signal.
    IfaceLoop { iface: Iface, end: Expr },
    /// One set of outputs, held until the consumer accepts.
    Emit { iface: Iface },
    /// Ordered mutually exclusive alternatives.
    Mutex,
}

/// One node of the control-block tree.
#[derive(Debug)]
pub struct CBlock {
    pub parent: Option<CId>,
    pub children: Vec<CId>,
    pub kind: CKind,
    pub node: CNode,
    /// Payload statements: the run of a Leaf, or the outputs of an Emit.
    pub stmts: Vec<Stmt>,
    /// Free statements executing in this block's first state.
    pub prolog: Vec<Stmt>,
    /// Free statements executing in the cycle this block exits.
    pub epilog: Vec<Stmt>,
    /// All states this subtree occupies, ascending.
    pub state_ids: SmallVec<[u64; 4]>,
    /// Registers that must hold their value while this arm is not
    /// selected (written by a sibling arm of a multi-state conditional).
    pub reg_holds: Vec<Id>,

    // Filled in by the condition resolver.
    /// Activation condition relative to the parent (own test plus state
    /// gating). The generator's conditional wrappers use this.
    pub gate: Option<CondId>,
    /// Absolute activation condition, ancestors included.
    pub in_cond: Option<CondId>,
    /// Holds while the machine must remain in the current state.
    pub cycle_cond: Option<CondId>,
    /// Holds when this block finishes in the current cycle.
    pub exit_cond: Option<CondId>,
    /// For loops: the exit of one pass over the body, before the
    /// continuation test is applied.
    pub iter_exit: Option<CondId>,

    // Filled in by the state assigner.
    /// For loops: the (from, to) states of the declared loop-back edge.
    pub loop_back: Option<(u64, u64)>,
}

impl CBlock {
    fn new(parent: Option<CId>, kind: CKind, node: CNode) -> Self {
        CBlock {
            parent,
            children: Vec::new(),
            kind,
            node,
            stmts: Vec::new(),
            prolog: Vec::new(),
            epilog: Vec::new(),
            state_ids: SmallVec::new(),
            reg_holds: Vec::new(),
            gate: None,
            in_cond: None,
            cycle_cond: None,
            exit_cond: None,
            iter_exit: None,
            loop_back: None,
        }
    }

    /// First state this subtree occupies. Only valid after assignment.
    pub fn first_state(&self) -> u64 {
        *self
            .state_ids
            .first()
            .expect("state assignment has not run")
    }

    /// Last state this subtree occupies. Only valid after assignment.
    pub fn last_state(&self) -> u64 {
        *self.state_ids.last().expect("state assignment has not run")
    }

    pub fn is_multi_state(&self) -> bool {
        self.state_ids.len() > 1
    }
}

/// Arena of control blocks with a designated root.
#[derive(Debug)]
pub struct CTree {
    nodes: Vec<CBlock>,
    root: CId,
}

impl CTree {
    pub fn new() -> Self {
        let root = CBlock::new(None, CKind::Sequential, CNode::Root);
        CTree {
            nodes: vec![root],
            root: CId(0),
        }
    }

    pub fn root(&self) -> CId {
        self.root
    }

    /// Append a child block under `parent` and return its id.
    pub fn add_child(&mut self, parent: CId, kind: CKind, node: CNode) -> CId {
        let id = CId(
            self.nodes
                .len()
                .try_into()
                .expect("too many control blocks"),
        );
        self.nodes.push(CBlock::new(Some(parent), kind, node));
        self[parent].children.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of `id`'s children, copied out to avoid holding a borrow.
    pub fn children(&self, id: CId) -> Vec<CId> {
        self[id].children.clone()
    }

    /// Does this subtree contain a suspension point (and therefore
    /// introduce at least one state boundary)?
    pub fn suspends(&self, id: CId) -> bool {
        match self[id].node {
            CNode::Wait { .. }
            | CNode::IfaceLoop { .. }
            | CNode::Emit { .. } => true,
            CNode::Leaf => false,
            _ => self[id].children.iter().any(|&c| self.suspends(c)),
        }
    }

    /// Iterate over all blocks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (CId, &CBlock)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, b)| (CId(i as u32), b))
    }
}

impl Default for CTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Index<CId> for CTree {
    type Output = CBlock;

    fn index(&self, id: CId) -> &CBlock {
        &self.nodes[id.index()]
    }
}

impl std::ops::IndexMut<CId> for CTree {
    fn index_mut(&mut self, id: CId) -> &mut CBlock {
        &mut self.nodes[id.index()]
    }
}
