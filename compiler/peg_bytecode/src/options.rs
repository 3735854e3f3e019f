//! Compile feature switches.

use bitflags::bitflags;

bitflags! {
    /// Independent compiler features.
    ///
    /// Every combination accepts the same language and stops at the same
    /// input position; the flags only change the shape of the emitted code.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct CompileOptions: u8 {
        /// Memoize rule results per input position.
        const PACKRAT = 1 << 0;
        /// Emit node-building instructions; without it AST operators
        /// compile to nothing.
        const AST = 1 << 1;
        /// Replace general backtracking code with single byte-test
        /// instructions where the operand allows it.
        const SPECIALIZE = 1 << 2;
        /// Factor shared leading elements out of choice alternatives.
        const COMMON_PREFIX = 1 << 3;
        /// Route memo lookups through a monitored switch.
        const TRACING = 1 << 4;
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions::all().difference(CompileOptions::TRACING)
    }
}
