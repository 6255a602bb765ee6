//! Error type for the synthesis backend.

use crate::position::GPosIdx;

/// Convenience alias for a `Result` with a Weft [Error].
pub type WeftResult<T> = Result<T, Error>;

/// Things that can go wrong while lowering a module body to a state machine.
///
/// The first two kinds are user-facing: the source construct cannot be turned
/// into hardware and the message carries a span into the original program.
/// The remaining kinds are compiler bugs surfaced by internal invariant
/// checks; they abort the whole run and are never caused by valid input.
#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    /// The input uses a construct we cannot translate to hardware.
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    /// An interface is driven in a way with no single handshake cycle.
    #[error("ambiguous interface use: {0}")]
    AmbiguousInterface(String),
    /// The input IR violates a structural precondition.
    #[error("malformed structure: {0}")]
    MalformedStructure(String),
    /// An internal invariant did not hold. Compiler bug.
    #[error("internal compiler error: {0}")]
    Internal(String),
    /// Catch-all.
    #[error("{0}")]
    Misc(String),
}

/// An error during synthesis, carrying a message and an optional source span.
#[derive(Debug)]
pub struct Error {
    kind: Box<ErrorKind>,
    pos: GPosIdx,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = self.kind.to_string();
        write!(f, "{}", self.pos.format(msg))
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn unsupported<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Unsupported(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
        }
    }

    pub fn ambiguous_interface<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::AmbiguousInterface(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
        }
    }

    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::MalformedStructure(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
        }
    }

    pub fn internal<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Internal(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
        }
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Misc(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
        }
    }

    /// Attach a source span to this error.
    pub fn with_pos(mut self, pos: GPosIdx) -> Self {
        self.pos = pos;
        self
    }

    pub fn pos(&self) -> GPosIdx {
        self.pos
    }

    /// True when this error indicates a compiler bug rather than a problem
    /// with the user's input.
    pub fn is_internal(&self) -> bool {
        matches!(
            &*self.kind,
            ErrorKind::Internal(_) | ErrorKind::MalformedStructure(_)
        )
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}
