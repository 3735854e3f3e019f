//! The finished, linked instruction graph.

use std::fmt::Write as _;
use std::ops::Index;

use peg_ir::{Grammar, RuleId};

use crate::{InstrId, Instruction, MemoPoint};

/// Placement range of one compiled rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodeBlock {
    pub rule: RuleId,
    /// Where calls to the rule jump.
    pub head: InstrId,
    /// First placed instruction of the rule.
    pub start: usize,
    /// One past the last.
    pub end: usize,
}

/// Instructions numbered by placement, the rule blocks that partition them,
/// and the memo slots they use.
///
/// Immutable once built; executors share it read-only.
#[derive(Clone, Debug)]
pub struct Program {
    code: Vec<Instruction>,
    blocks: Vec<CodeBlock>,
    memo_points: Vec<MemoPoint>,
}

impl Program {
    pub(crate) fn new(code: Vec<Instruction>, blocks: Vec<CodeBlock>, memo_points: Vec<MemoPoint>) -> Self {
        Program {
            code,
            blocks,
            memo_points,
        }
    }

    /// First instruction of the first compiled rule.
    pub fn entry(&self) -> InstrId {
        self.blocks.first().map_or(InstrId::new(0), |block| block.head)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn code_blocks(&self) -> &[CodeBlock] {
        &self.blocks
    }

    pub fn code_block(&self, rule: RuleId) -> Option<&CodeBlock> {
        self.blocks.iter().find(|block| block.rule == rule)
    }

    pub fn memo_points(&self) -> &[MemoPoint] {
        &self.memo_points
    }

    /// Per-rule listing.
    ///
    /// ```text
    /// Name:
    /// 0*	byte 'a'
    /// 1	fail_push L3
    /// 	jump L5
    /// ```
    ///
    /// `*` marks jump targets; a `jump` line follows any instruction whose
    /// fallthrough is not the next index.
    pub fn dump(&self, grammar: &Grammar) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let _ = writeln!(out, "{}:", grammar.rule(block.rule).name);
            for i in block.start..block.end {
                let instr = &self.code[i];
                let mark = if instr.label { "*" } else { "" };
                let _ = writeln!(out, "{i}{mark}\t{}", instr.display(grammar));
                if let Some(next) = instr.next {
                    if next.index() != i + 1 {
                        let _ = writeln!(out, "\tjump {next}");
                    }
                }
            }
        }
        out
    }
}

impl Index<InstrId> for Program {
    type Output = Instruction;

    #[inline]
    fn index(&self, id: InstrId) -> &Instruction {
        &self.code[id.index()]
    }
}
