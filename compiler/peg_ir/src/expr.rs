//! Expression nodes and their handles.

use std::fmt;

use smallvec::SmallVec;

use crate::{ByteSet, RuleId, Span};

/// Index into the expression arena.
///
/// The id *is* the node's identity: the compiler shares code, detects common
/// prefixes, and keys memo slots by `ExprId`, never by structure.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        ExprId(index)
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

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

/// Children of a sequence, choice, or node construction.
pub type ExprList = SmallVec<[ExprId; 4]>;

/// Grammar operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// Always succeeds, consumes nothing.
    Empty,
    /// Always fails.
    Fail,
    /// Any single byte; fails only at end of input.
    AnyByte,
    Byte(u8),
    ByteClass(ByteSet),
    Sequence(ExprList),
    /// Ordered choice: first alternative that succeeds wins.
    Choice(ExprList),
    /// Zero or more. `nullable` is raised by the grammar checker when the
    /// body may succeed without consuming input.
    Repeat {
        inner: ExprId,
        nullable: bool,
    },
    /// One or more.
    Repeat1 {
        inner: ExprId,
        nullable: bool,
    },
    Optional(ExprId),
    /// `&e`: succeeds iff `e` does, never consumes.
    And(ExprId),
    /// `!e`: succeeds iff `e` fails, never consumes.
    Not(ExprId),
    NonTerminal(RuleId),

    // AST construction
    /// `{ body }` / `{@ body }`: start a node, match the body, capture it.
    Construct {
        body: ExprList,
        left: bool,
    },
    /// Bare node start. `left` folds the current node in as first child.
    New {
        left: bool,
    },
    Capture,
    Tag(Box<str>),
    Replace(Box<str>),
    /// `@e` / `@[index] e`: attach the node built by `inner` to the parent.
    Link {
        inner: ExprId,
        index: i32,
    },

    // Scoped parse state
    /// Symbol definitions inside are dropped when the block exits.
    Block(ExprId),
    DefSymbol {
        table: Box<str>,
        inner: ExprId,
    },
    /// Match `inner`, then require the matched text to be a symbol in
    /// `table` (only the most recent one when `last_only`).
    IsSymbol {
        table: Box<str>,
        inner: ExprId,
        last_only: bool,
    },
    DefIndent,
    IsIndent,
}

impl ExprKind {
    /// Direct children in matching order.
    pub fn children(&self) -> &[ExprId] {
        match self {
            ExprKind::Sequence(list)
            | ExprKind::Choice(list)
            | ExprKind::Construct { body: list, .. } => list,
            ExprKind::Repeat { inner, .. }
            | ExprKind::Repeat1 { inner, .. }
            | ExprKind::Optional(inner)
            | ExprKind::And(inner)
            | ExprKind::Not(inner)
            | ExprKind::Link { inner, .. }
            | ExprKind::Block(inner)
            | ExprKind::DefSymbol { inner, .. }
            | ExprKind::IsSymbol { inner, .. } => std::slice::from_ref(inner),
            ExprKind::Empty
            | ExprKind::Fail
            | ExprKind::AnyByte
            | ExprKind::Byte(_)
            | ExprKind::ByteClass(_)
            | ExprKind::NonTerminal(_)
            | ExprKind::New { .. }
            | ExprKind::Capture
            | ExprKind::Tag(_)
            | ExprKind::Replace(_)
            | ExprKind::DefIndent
            | ExprKind::IsIndent => &[],
        }
    }

    /// Single-step byte matchers.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExprKind::AnyByte | ExprKind::Byte(_) | ExprKind::ByteClass(_)
        )
    }

    /// Operators that only touch the AST under construction.
    pub fn is_ast_operator(&self) -> bool {
        matches!(
            self,
            ExprKind::Construct { .. }
                | ExprKind::New { .. }
                | ExprKind::Capture
                | ExprKind::Tag(_)
                | ExprKind::Replace(_)
                | ExprKind::Link { .. }
        )
    }

    /// Operators whose outcome depends on the symbol table or indent stack.
    pub fn is_state_query(&self) -> bool {
        matches!(self, ExprKind::IsSymbol { .. } | ExprKind::IsIndent)
    }

    /// The byte set this terminal tests, if it tests a single byte or class.
    pub fn as_byte_set(&self) -> Option<ByteSet> {
        match self {
            ExprKind::Byte(b) => Some(ByteSet::from_byte(*b)),
            ExprKind::ByteClass(set) => Some(*set),
            _ => None,
        }
    }
}

/// One arena slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}
