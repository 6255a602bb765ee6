//! Intermediate representation for the Weft synthesis backend.
//!
//! The frontend hands us a [`Block`] tree describing a module body as a
//! sequential, blocking procedure over streaming interfaces. Synthesis
//! annotates and lowers it into an [`HdlModule`]: guarded conditional
//! assignments plus an explicit state register, ready for textual emission.

mod block;
mod cond;
mod expr;
mod hdl;
mod printer;
mod types;

pub use block::{
    Assign, Block, ConditionalBlock, ContainerBlock, EmitBlock, Iface,
    InterfaceLoopBlock, InterfaceWaitBlock, LoopBlock, Role, SequentialBlock,
    Stmt, Target,
};
pub use cond::{Cond, CondId, CondPool};
pub use expr::Expr;
pub use hdl::{
    Concern, HdlAssign, HdlBlock, HdlIf, HdlModule, HdlStmt, HdlValue,
    Transition,
};
pub use printer::Printer;
pub use types::DType;

// Re-export the identifier type at the IR level.
pub use weft_utils::Id;
