//! Textual rendering of the synthesized module. Used for debugging and for
//! byte-level determinism checks; the real HDL emitter lives downstream.

use itertools::Itertools;
use std::io;

use crate::{CondPool, HdlBlock, HdlModule, HdlStmt, HdlValue};

/// Printer for [`HdlModule`]s.
pub struct Printer;

impl Printer {
    fn value_str(value: &HdlValue) -> String {
        match value {
            HdlValue::Expr(e) => e.to_string(),
            HdlValue::Const { value, width } => {
                format!("{}'d{}", width, value)
            }
            HdlValue::State(s) => format!("S{}", s),
            HdlValue::Current(sig) => sig.to_string(),
        }
    }

    fn write_block<W: io::Write>(
        block: &HdlBlock,
        pool: &CondPool,
        indent: usize,
        out: &mut W,
    ) -> io::Result<()> {
        let pad = " ".repeat(indent);
        for (target, value) in &block.defaults {
            writeln!(
                out,
                "{}default {} = {};",
                pad,
                target,
                Self::value_str(value)
            )?;
        }
        for stmt in &block.stmts {
            match stmt {
                HdlStmt::Assign(a) => writeln!(
                    out,
                    "{}{} = {};",
                    pad,
                    a.target,
                    Self::value_str(&a.value)
                )?,
                HdlStmt::If(i) => {
                    writeln!(out, "{}if {} {{", pad, pool.display(i.cond))?;
                    Self::write_block(&i.body, pool, indent + 2, out)?;
                    if let Some(alt) = &i.alt {
                        writeln!(out, "{}}} else {{", pad)?;
                        Self::write_block(alt, pool, indent + 2, out)?;
                    }
                    writeln!(out, "{}}}", pad)?;
                }
            }
        }
        Ok(())
    }

    /// Write the whole module: each concern block, then the transition
    /// graph in (from, to) order.
    pub fn write_module<W: io::Write>(
        module: &HdlModule,
        pool: &CondPool,
        out: &mut W,
    ) -> io::Result<()> {
        writeln!(
            out,
            "module {} // {} states, {}-bit state register",
            module.name, module.state_count, module.state_bits
        )?;
        for (concern, block) in &module.concerns {
            writeln!(out, "{}:", concern.name())?;
            Self::write_block(block, pool, 2, out)?;
        }
        writeln!(out, "transitions:")?;
        for t in module
            .transitions
            .iter()
            .sorted_by_key(|t| (t.from, t.to))
        {
            writeln!(
                out,
                "  ({}, {}): {}",
                t.from,
                t.to,
                pool.display(t.cond)
            )?;
        }
        Ok(())
    }

    /// Render the module to a string.
    pub fn module_str(module: &HdlModule, pool: &CondPool) -> String {
        let mut buf = Vec::new();
        Self::write_module(module, pool, &mut buf)
            .expect("write to Vec cannot fail");
        String::from_utf8(buf).expect("printer emits valid utf-8")
    }
}
