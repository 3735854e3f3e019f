//! PEG bytecode compiler.
//!
//! Turns the rules of a [`peg_ir::Grammar`] into one linked instruction
//! graph ([`Program`]) for a backtracking parsing machine.
//!
//! # Pipeline
//!
//! 1. **Encode**: each rule body is compiled in continuation-passing style,
//!    specialized where [`CompileOptions::SPECIALIZE`] allows, with packrat
//!    memo slots planned along the way.
//! 2. **Place**: the instructions reachable from each rule head get dense
//!    indices in depth-first order, so fallthrough is usually `i + 1`.
//! 3. **Link**: calls are resolved to the head of the callee's block.
//!
//! # Tracing
//!
//! Rewrites and memo decisions log at `trace`, per-rule results at `debug`.
//! Enable with `RUST_LOG=peg_bytecode=trace` after [`init_tracing`].

mod builder;
mod compiler;
mod error;
mod factor;
mod instr;
mod memo;
mod options;
mod program;

#[cfg(test)]
mod test_helpers;

pub use compiler::{compile, Compiler};
pub use error::CompileError;
pub use factor::factor_common_prefix;
pub use instr::{InstrId, Instruction, InstructionDisplay, MemoId, MemoKey, Opcode};
pub use memo::{is_context_sensitive, MemoPoint};
pub use options::CompileOptions;
pub use program::{CodeBlock, Program};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=peg_bytecode=debug` or `RUST_LOG=peg_bytecode=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
