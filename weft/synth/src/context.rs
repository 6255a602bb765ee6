//! Per-compilation state shared by the synthesis passes.

use weft_ir::CondPool;

/// Options controlling a synthesis run. One value per compiled module.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthOptions {
    /// Merge logically-equivalent conditions through a BDD before
    /// generation. Not part of the default pipeline.
    pub simplify_conditions: bool,
    /// Log the computed schedule (states and transitions) after
    /// generation.
    pub dump_schedule: bool,
}

/// Everything a synthesis run accumulates. Created fresh per module so
/// independent compilations can run on a worker pool without sharing any
/// mutable state.
pub struct Context {
    /// The condition pool for this compilation.
    pub pool: CondPool,
    pub opts: SynthOptions,
}

impl Context {
    pub fn new(opts: SynthOptions) -> Self {
        Context {
            pool: CondPool::new(),
            opts,
        }
    }
}

/// Trait that describes named passes, for logging and diagnostics.
pub trait Named {
    /// The name of the pass.
    fn name() -> &'static str;
    /// A short description of what the pass does.
    fn description() -> &'static str;
}
