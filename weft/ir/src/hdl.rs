//! Output tree handed to the HDL text emitter: guarded conditional
//! assignments grouped by functional concern, plus the state transition
//! graph of the synthesized machine.

use linked_hash_map::LinkedHashMap;

use crate::CondId;
use weft_utils::Id;

/// The functional concerns the generator emits separately. Each concern
/// gets its own block of conditional assignments with explicit defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    /// Register next-value and write-enable signals.
    RegWrite,
    /// Combinational local-variable updates.
    VarWrite,
    /// Output port values driven by emit blocks.
    Output,
    /// Consumer-side `ready` handshake outputs.
    Ready,
    /// Producer-side `valid` handshake outputs.
    Valid,
    /// State register next-value and write-enable.
    StateNext,
}

impl Concern {
    pub const ALL: [Concern; 6] = [
        Concern::RegWrite,
        Concern::VarWrite,
        Concern::Output,
        Concern::Ready,
        Concern::Valid,
        Concern::StateNext,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Concern::RegWrite => "reg-write",
            Concern::VarWrite => "var-write",
            Concern::Output => "output",
            Concern::Ready => "ready",
            Concern::Valid => "valid",
            Concern::StateNext => "state-next",
        }
    }
}

/// Right-hand side of an emitted assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HdlValue {
    /// An operand expression, by name.
    Expr(Id),
    /// A literal of the given width.
    Const { value: u64, width: u64 },
    /// A state constant, sized to the module's state register.
    State(u64),
    /// The named signal's current value (a register hold).
    Current(Id),
}

/// One assignment. The guard is implicit in the enclosing nesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlAssign {
    pub target: Id,
    pub value: HdlValue,
}

/// A statement in an emitted block.
#[derive(Debug, Clone)]
pub enum HdlStmt {
    Assign(HdlAssign),
    If(HdlIf),
}

/// A conditional wrapper. The body applies when `cond` holds (conjoined
/// with all enclosing wrappers); the alternative, when present, applies
/// when it does not.
#[derive(Debug, Clone)]
pub struct HdlIf {
    pub cond: CondId,
    pub body: HdlBlock,
    pub alt: Option<HdlBlock>,
}

impl HdlIf {
    pub fn new(cond: CondId, body: HdlBlock) -> Self {
        HdlIf { cond, body, alt: None }
    }

    pub fn with_alt(cond: CondId, body: HdlBlock, alt: HdlBlock) -> Self {
        HdlIf {
            cond,
            body,
            alt: Some(alt),
        }
    }
}

/// A block of assignments with a default table. Defaults apply whenever no
/// enclosed conditional assignment overrides them; insertion order is
/// preserved so emission is deterministic.
#[derive(Debug, Clone, Default)]
pub struct HdlBlock {
    pub defaults: LinkedHashMap<Id, HdlValue>,
    pub stmts: Vec<HdlStmt>,
}

impl HdlBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.stmts.is_empty()
    }

    pub fn push(&mut self, stmt: HdlStmt) {
        self.stmts.push(stmt);
    }

    pub fn assign(&mut self, target: Id, value: HdlValue) {
        self.stmts.push(HdlStmt::Assign(HdlAssign { target, value }));
    }
}

/// One edge of the synthesized state machine: taken when the machine is in
/// `from` and `cond` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: u64,
    pub to: u64,
    pub cond: CondId,
}

/// The synthesized module, ready for textual emission.
#[derive(Debug)]
pub struct HdlModule {
    pub name: Id,
    /// Number of distinct states in the machine.
    pub state_count: u64,
    /// Width of the state register.
    pub state_bits: u64,
    /// Conditional assignment blocks, one per concern, in [`Concern::ALL`]
    /// order.
    pub concerns: Vec<(Concern, HdlBlock)>,
    /// Every state transition the machine can take, including loop-back
    /// edges and the final return to state 0.
    pub transitions: Vec<Transition>,
}

impl HdlModule {
    pub fn concern(&self, c: Concern) -> &HdlBlock {
        &self
            .concerns
            .iter()
            .find(|(k, _)| *k == c)
            .expect("all concerns are materialized")
            .1
    }
}
