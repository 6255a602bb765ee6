use crate::DType;
use weft_utils::{GPosIdx, Id};

/// An opaque typed operand. Expression composition, casts and arithmetic
/// resolution happen in the external type-system module before synthesis
/// runs; from this side an expression is a name with a [`DType`] and a
/// source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub name: Id,
    pub dtype: DType,
    pub pos: GPosIdx,
}

impl Expr {
    pub fn new<S: Into<Id>>(name: S, dtype: DType) -> Self {
        Expr {
            name: name.into(),
            dtype,
            pos: GPosIdx::UNKNOWN,
        }
    }

    pub fn with_pos(mut self, pos: GPosIdx) -> Self {
        self.pos = pos;
        self
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
