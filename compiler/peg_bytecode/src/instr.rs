//! Instruction graph nodes.
//!
//! Instructions live in an arena and link to each other by [`InstrId`].
//! `next` is the fallthrough successor; opcodes that branch carry their
//! other targets as operands. Several instructions may share one successor,
//! and calls may close cycles, so the graph is a general directed graph.

use std::fmt;

use peg_ir::{ByteSet, ExprId, Grammar, RuleId};
use smallvec::SmallVec;

/// Index of an instruction.
///
/// While compiling this is an arena slot; in a finished
/// [`Program`](crate::Program) it is the placement index.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InstrId(u32);

impl InstrId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        InstrId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Dense memo slot number, in issue order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MemoId(u32);

impl MemoId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        MemoId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for MemoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// What a memo entry is keyed on besides the slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoKey {
    /// Input position only.
    Position,
    /// Input position plus the symbol table and indent stack.
    State,
}

/// Operation and operands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Fail,
    /// Return to the caller, or accept when the call stack is empty.
    Ret,
    AnyByte,
    /// With `optional`, a mismatch falls through without consuming.
    Byte {
        byte: u8,
        optional: bool,
    },
    ByteClass {
        set: ByteSet,
        optional: bool,
    },
    /// Consume bytes while they are in `set`. Never fails.
    RepeatedByteClass {
        set: ByteSet,
    },
    /// Fail if the next byte is in `set`, consume nothing.
    NotByteClass {
        set: ByteSet,
    },
    /// Fail if `bytes` occur next, consume nothing.
    NotLiteral {
        bytes: Box<[u8]>,
    },

    /// Save position and state; a later failure resumes at `on_fail`.
    FailPush {
        on_fail: InstrId,
    },
    /// Drop the most recent failure frame.
    FailPop,
    /// Move the most recent failure frame up to the current position and
    /// loop. When `guarded` and the position has not advanced since the
    /// frame was saved, leave the loop through the frame instead.
    FailSkip {
        guarded: bool,
    },
    PosPush,
    /// Restore the position saved by the matching `PosPush`.
    PosBack,
    /// Jump by the next byte: 256 byte slots and one end-of-input slot.
    Dispatch {
        table: Box<[InstrId]>,
    },

    /// Call a rule; `next` is the return address. `target` is filled in by
    /// linking.
    Call {
        rule: RuleId,
        target: Option<InstrId>,
    },
    /// Either take the memoized path (`activated`) or fall through to a
    /// plain call.
    MonitoredSwitch {
        activated: InstrId,
    },
    /// Memo hit: jump to `on_hit` (or fail, for a recorded failure).
    /// Miss: save a failure frame resuming at `on_memo_fail` and fall
    /// through to compute the result.
    Lookup {
        memo: MemoId,
        key: MemoKey,
        on_hit: InstrId,
        on_memo_fail: InstrId,
        monitor: Option<InstrId>,
    },
    /// Record success for the frame `Lookup` saved, and drop that frame.
    Memoize {
        memo: MemoId,
        key: MemoKey,
        monitor: Option<InstrId>,
    },
    /// Record failure at the current position, then fail.
    MemoizeFail {
        memo: MemoId,
        key: MemoKey,
        monitor: Option<InstrId>,
    },
    /// `Lookup` that also restores the memoized node into child `index`.
    LookupNode {
        memo: MemoId,
        key: MemoKey,
        on_hit: InstrId,
        on_memo_fail: InstrId,
        monitor: Option<InstrId>,
        index: i32,
    },
    MemoizeNode {
        memo: MemoId,
        key: MemoKey,
        monitor: Option<InstrId>,
        index: i32,
    },

    // AST construction
    NodePush,
    NodeStore {
        index: i32,
    },
    New {
        left: bool,
    },
    Capture,
    Tag(Box<str>),
    Replace(Box<str>),

    // Scoped parse state
    TablePush,
    TablePop,
    /// Define the text since the saved position as a symbol of `table`.
    DefSymbol {
        table: Box<str>,
    },
    /// Require the text since the saved position to be a symbol of `table`.
    IsSymbol {
        table: Box<str>,
        last_only: bool,
    },
    DefIndent,
    IsIndent,
}

impl Opcode {
    /// Jump targets other than the fallthrough, in placement order.
    pub fn branches(&self) -> SmallVec<[InstrId; 2]> {
        match self {
            Opcode::FailPush { on_fail } => smallvec::smallvec![*on_fail],
            Opcode::Call {
                target: Some(target),
                ..
            } => smallvec::smallvec![*target],
            Opcode::MonitoredSwitch { activated } => smallvec::smallvec![*activated],
            Opcode::Lookup {
                on_hit,
                on_memo_fail,
                ..
            }
            | Opcode::LookupNode {
                on_hit,
                on_memo_fail,
                ..
            } => smallvec::smallvec![*on_hit, *on_memo_fail],
            Opcode::Dispatch { table } => table.iter().copied().collect(),
            _ => SmallVec::new(),
        }
    }

    /// Visit every instruction reference in the operands, including monitor
    /// back-references.
    pub(crate) fn for_each_target_mut(&mut self, mut f: impl FnMut(&mut InstrId)) {
        match self {
            Opcode::FailPush { on_fail } => f(on_fail),
            Opcode::Call { target, .. } => {
                if let Some(target) = target {
                    f(target);
                }
            }
            Opcode::MonitoredSwitch { activated } => f(activated),
            Opcode::Lookup {
                on_hit,
                on_memo_fail,
                monitor,
                ..
            }
            | Opcode::LookupNode {
                on_hit,
                on_memo_fail,
                monitor,
                ..
            } => {
                f(on_hit);
                f(on_memo_fail);
                if let Some(monitor) = monitor {
                    f(monitor);
                }
            }
            Opcode::Memoize { monitor, .. }
            | Opcode::MemoizeFail { monitor, .. }
            | Opcode::MemoizeNode { monitor, .. } => {
                if let Some(monitor) = monitor {
                    f(monitor);
                }
            }
            Opcode::Dispatch { table } => table.iter_mut().for_each(f),
            _ => {}
        }
    }
}

/// One node of the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    /// Fallthrough successor. `None` for instructions that always jump,
    /// fail, or return.
    pub next: Option<InstrId>,
    /// Expression this instruction was compiled from.
    pub origin: ExprId,
    /// Whether something other than the previous instruction's fallthrough
    /// jumps here.
    pub label: bool,
}

impl Instruction {
    /// Fallthrough first, then branch targets.
    pub fn successors(&self) -> SmallVec<[InstrId; 2]> {
        let mut out: SmallVec<[InstrId; 2]> = self.next.into_iter().collect();
        out.extend(self.op.branches());
        out
    }

    #[inline]
    pub fn is_label(&self) -> bool {
        self.label
    }

    /// Render with rule names resolved against `grammar`.
    pub fn display<'a>(&'a self, grammar: &'a Grammar) -> InstructionDisplay<'a> {
        InstructionDisplay {
            instr: self,
            grammar,
        }
    }
}

/// Helper for displaying an instruction with resolved rule names.
pub struct InstructionDisplay<'a> {
    instr: &'a Instruction,
    grammar: &'a Grammar,
}

impl fmt::Display for InstructionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = |key: &MemoKey| match key {
            MemoKey::Position => "",
            MemoKey::State => "state_",
        };
        match &self.instr.op {
            Opcode::Fail => f.write_str("fail"),
            Opcode::Ret => f.write_str("ret"),
            Opcode::AnyByte => f.write_str("any"),
            Opcode::Byte { byte, optional } => {
                let op = if *optional { "byte?" } else { "byte" };
                write!(f, "{op} '{}'", byte.escape_ascii())
            }
            Opcode::ByteClass { set, optional } => {
                let op = if *optional { "class?" } else { "class" };
                write!(f, "{op} {set:?}")
            }
            Opcode::RepeatedByteClass { set } => write!(f, "class* {set:?}"),
            Opcode::NotByteClass { set } => write!(f, "not_class {set:?}"),
            Opcode::NotLiteral { bytes } => {
                write!(f, "not_literal \"{}\"", bytes.escape_ascii())
            }
            Opcode::FailPush { on_fail } => write!(f, "fail_push {on_fail}"),
            Opcode::FailPop => f.write_str("fail_pop"),
            Opcode::FailSkip { guarded: false } => f.write_str("fail_skip"),
            Opcode::FailSkip { guarded: true } => f.write_str("fail_check_skip"),
            Opcode::PosPush => f.write_str("pos_push"),
            Opcode::PosBack => f.write_str("pos_back"),
            Opcode::Dispatch { table } => write_dispatch(f, table),
            Opcode::Call { rule, target } => {
                write!(f, "call {}", self.grammar.rule(*rule).name)?;
                match target {
                    Some(target) => write!(f, " {target}"),
                    None => Ok(()),
                }
            }
            Opcode::MonitoredSwitch { activated } => write!(f, "monitored_switch {activated}"),
            Opcode::Lookup {
                memo,
                key: k,
                on_hit,
                on_memo_fail,
                ..
            } => write!(f, "{}lookup {memo:?} {on_hit} {on_memo_fail}", key(k)),
            Opcode::Memoize { memo, key: k, .. } => write!(f, "{}memoize {memo:?}", key(k)),
            Opcode::MemoizeFail { memo, key: k, .. } => {
                write!(f, "{}memoize_fail {memo:?}", key(k))
            }
            Opcode::LookupNode {
                memo,
                key: k,
                on_hit,
                on_memo_fail,
                index,
                ..
            } => write!(
                f,
                "{}lookup_node {memo:?} [{index}] {on_hit} {on_memo_fail}",
                key(k)
            ),
            Opcode::MemoizeNode {
                memo, key: k, index, ..
            } => write!(f, "{}memoize_node {memo:?} [{index}]", key(k)),
            Opcode::NodePush => f.write_str("node_push"),
            Opcode::NodeStore { index } => write!(f, "node_store [{index}]"),
            Opcode::New { left: false } => f.write_str("new"),
            Opcode::New { left: true } => f.write_str("left_new"),
            Opcode::Capture => f.write_str("capture"),
            Opcode::Tag(tag) => write!(f, "tag #{tag}"),
            Opcode::Replace(text) => write!(f, "replace `{text}`"),
            Opcode::TablePush => f.write_str("table_push"),
            Opcode::TablePop => f.write_str("table_pop"),
            Opcode::DefSymbol { table } => write!(f, "def_symbol {table}"),
            Opcode::IsSymbol {
                table,
                last_only: true,
            } => write!(f, "is_symbol {table}"),
            Opcode::IsSymbol {
                table,
                last_only: false,
            } => write!(f, "isa_symbol {table}"),
            Opcode::DefIndent => f.write_str("def_indent"),
            Opcode::IsIndent => f.write_str("is_indent"),
        }
    }
}

/// `dispatch` followed by `slots=target` runs, e.g. `[a-c]=L4 eof=L9`.
fn write_dispatch(f: &mut fmt::Formatter<'_>, table: &[InstrId]) -> fmt::Result {
    f.write_str("dispatch")?;
    let mut targets: SmallVec<[InstrId; 8]> = SmallVec::new();
    for &target in table.iter().take(256) {
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    for target in targets {
        let set: ByteSet = (0..=u8::MAX)
            .filter(|&b| table[usize::from(b)] == target)
            .collect();
        write!(f, " {set:?}={target}")?;
    }
    if let Some(eof) = table.get(256) {
        write!(f, " eof={eof}")?;
    }
    Ok(())
}
