//! Synthesis backend: turns a sequential module body over streaming
//! interfaces into a cycle-accurate state machine of guarded
//! assignments.
//!
//! The pipeline runs four passes over a control-block tree:
//!
//! 1. **schedule** groups statements into state-introducing blocks;
//! 2. **assign-states** numbers the blocks and records loop-back edges;
//! 3. **resolve-conditions** computes activation, stay and exit
//!    conditions into a hash-consed pool;
//! 4. **generate** lowers the tree into per-concern assignment blocks
//!    and the transition list.
//!
//! An optional BDD-backed simplifier can run between resolution and
//! generation, and a cleanup pass tidies the generated blocks.

mod cleanup;
mod context;
mod ctree;
mod generate;
mod resolve;
mod schedule;
mod simplify;
mod states;
mod validate;

pub use context::{Context, Named, SynthOptions};

use weft_ir::{CondPool, HdlModule, SequentialBlock};
use weft_utils::{Id, WeftResult};

/// Synthesize one module. Returns the lowered module together with the
/// condition pool its guards reference.
pub fn synthesize(
    name: impl Into<Id>,
    body: &SequentialBlock,
    opts: SynthOptions,
) -> WeftResult<(HdlModule, CondPool)> {
    let name = name.into();
    let mut ctx = Context::new(opts);
    log::info!("synthesizing `{}`", name);

    let mut tree = schedule::schedule(body)?;
    validate::tree(&tree)?;
    let state_count = states::assign(&mut tree)?;
    resolve::resolve(&mut tree, &mut ctx.pool)?;
    if ctx.opts.simplify_conditions {
        simplify::simplify(&mut tree, &mut ctx.pool);
    }

    let module = {
        let mut module =
            generate::generate(name, &tree, &mut ctx.pool, state_count);
        cleanup::clean(&mut module);
        module
    };
    validate::transitions(module.state_count, &module.transitions)?;

    if ctx.opts.dump_schedule {
        log::info!(
            "`{}`: {} states, {} transitions",
            name,
            module.state_count,
            module.transitions.len()
        );
        for t in &module.transitions {
            log::info!(
                "  ({} -> {}): {}",
                t.from,
                t.to,
                ctx.pool.display(t.cond)
            );
        }
    }

    Ok((module, ctx.pool))
}
