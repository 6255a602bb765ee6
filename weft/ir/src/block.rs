//! Source-level IR: a module body as a tree of statements and blocks.

use crate::{DType, Expr};
use weft_utils::{GPosIdx, Id};

/// Which side of a streaming handshake this interface is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We read from it; the producer signals `valid`.
    Consumer,
    /// We write to it; the consumer signals `ready`.
    Producer,
}

/// A streaming interface endpoint of the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iface {
    pub name: Id,
    pub dtype: DType,
    pub role: Role,
}

impl Iface {
    pub fn consumer<S: Into<Id>>(name: S, dtype: DType) -> Self {
        Iface {
            name: name.into(),
            dtype,
            role: Role::Consumer,
        }
    }

    pub fn producer<S: Into<Id>>(name: S, dtype: DType) -> Self {
        Iface {
            name: name.into(),
            dtype,
            role: Role::Producer,
        }
    }
}

/// Where a non-blocking statement writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// A clocked register.
    Reg(Id),
    /// A combinational local.
    Var(Id),
    /// An output port of an interface (only legal inside an emit block).
    Port(Id),
}

impl Target {
    pub fn name(&self) -> Id {
        match *self {
            Target::Reg(n) | Target::Var(n) | Target::Port(n) => n,
        }
    }
}

/// A non-blocking assignment. Takes effect in the cycle its enclosing
/// fragment is active.
#[derive(Debug, Clone)]
pub struct Assign {
    pub target: Target,
    pub value: Expr,
    pub pos: GPosIdx,
}

impl Assign {
    pub fn new(target: Target, value: Expr) -> Self {
        Assign {
            target,
            value,
            pos: GPosIdx::UNKNOWN,
        }
    }
}

/// One statement in a block body.
#[derive(Debug, Clone)]
pub enum Stmt {
    Assign(Assign),
    Block(Block),
}

impl Stmt {
    /// Does executing this statement ever take more than zero cycles?
    pub fn suspends(&self) -> bool {
        match self {
            Stmt::Assign(_) => false,
            Stmt::Block(b) => b.suspends(),
        }
    }
}

impl From<Assign> for Stmt {
    fn from(a: Assign) -> Self {
        Stmt::Assign(a)
    }
}

impl From<Block> for Stmt {
    fn from(b: Block) -> Self {
        Stmt::Block(b)
    }
}

/// Data for the module (or function) body.
#[derive(Debug, Clone)]
pub struct SequentialBlock {
    pub stmts: Vec<Stmt>,
}

/// Data for a two-way branch.
#[derive(Debug, Clone)]
pub struct ConditionalBlock {
    /// Boolean test selecting the body.
    pub test: Expr,
    pub body: Vec<Stmt>,
    /// Alternative branch, taken when the test is false.
    pub alt: Option<Vec<Stmt>>,
}

/// Data for a loop. The body repeats while the continuation test holds.
#[derive(Debug, Clone)]
pub struct LoopBlock {
    pub test: Expr,
    pub body: Vec<Stmt>,
}

/// A single blocking handshake. The body executes in the cycle the
/// handshake completes.
#[derive(Debug, Clone)]
pub struct InterfaceWaitBlock {
    pub iface: Iface,
    pub body: Vec<Stmt>,
    pub pos: GPosIdx,
}

/// A repeated blocking handshake, re-armed every cycle until the
/// end-of-transfer signal accompanies a completed handshake.
#[derive(Debug, Clone)]
pub struct InterfaceLoopBlock {
    pub iface: Iface,
    /// End-of-transfer signal sampled on each completed handshake.
    pub end: Expr,
    pub body: Vec<Stmt>,
    pub pos: GPosIdx,
}

/// Produces one set of outputs; suspends until the consumer accepts them.
#[derive(Debug, Clone)]
pub struct EmitBlock {
    pub iface: Iface,
    pub outputs: Vec<Assign>,
    pub pos: GPosIdx,
}

/// An ordered set of mutually exclusive alternatives. The frontend
/// guarantees at most one alternative is active per cycle.
#[derive(Debug, Clone)]
pub struct ContainerBlock {
    pub alts: Vec<Block>,
}

/// A block in the source IR.
#[derive(Debug, Clone)]
pub enum Block {
    Sequential(SequentialBlock),
    Conditional(ConditionalBlock),
    Loop(LoopBlock),
    InterfaceWait(InterfaceWaitBlock),
    InterfaceLoop(InterfaceLoopBlock),
    Emit(EmitBlock),
    Container(ContainerBlock),
}

impl Block {
    /// Does this block contain a suspension point, directly or nested?
    pub fn suspends(&self) -> bool {
        match self {
            Block::InterfaceWait(_)
            | Block::InterfaceLoop(_)
            | Block::Emit(_) => true,
            Block::Sequential(s) => s.stmts.iter().any(Stmt::suspends),
            Block::Conditional(c) => {
                c.body.iter().any(Stmt::suspends)
                    || c.alt
                        .as_ref()
                        .is_some_and(|a| a.iter().any(Stmt::suspends))
            }
            Block::Loop(l) => l.body.iter().any(Stmt::suspends),
            Block::Container(c) => c.alts.iter().any(Block::suspends),
        }
    }

    pub fn seq(stmts: Vec<Stmt>) -> Self {
        Block::Sequential(SequentialBlock { stmts })
    }

    pub fn cond(test: Expr, body: Vec<Stmt>, alt: Option<Vec<Stmt>>) -> Self {
        Block::Conditional(ConditionalBlock { test, body, alt })
    }

    pub fn repeat(test: Expr, body: Vec<Stmt>) -> Self {
        Block::Loop(LoopBlock { test, body })
    }

    pub fn wait(iface: Iface, body: Vec<Stmt>) -> Self {
        Block::InterfaceWait(InterfaceWaitBlock {
            iface,
            body,
            pos: GPosIdx::UNKNOWN,
        })
    }

    pub fn wait_loop(iface: Iface, end: Expr, body: Vec<Stmt>) -> Self {
        Block::InterfaceLoop(InterfaceLoopBlock {
            iface,
            end,
            body,
            pos: GPosIdx::UNKNOWN,
        })
    }

    pub fn emit(iface: Iface, outputs: Vec<Assign>) -> Self {
        Block::Emit(EmitBlock {
            iface,
            outputs,
            pos: GPosIdx::UNKNOWN,
        })
    }

    pub fn container(alts: Vec<Block>) -> Self {
        Block::Container(ContainerBlock { alts })
    }
}
