//! Shared utilities for the Weft synthesis backend.
mod errors;
mod id;
mod math;
mod position;

pub use errors::{Error, WeftResult};
pub use id::Id;
pub use math::bits_needed_for;
pub use position::{FileIdx, GPosIdx, GlobalPositionTable, PosIdx, PositionTable};
