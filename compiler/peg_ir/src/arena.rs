//! Expression arena.

use rustc_hash::FxHashMap;

use crate::{ByteSet, CapacityError, Expr, ExprId, ExprKind, ExprList, RuleId, Span, DISPATCH_SLOTS};

/// Backing store for expression nodes.
///
/// Append-only: an id handed out stays valid and its node never changes.
/// Side tables hold the per-node data that passes attach later (the
/// memoized rewrite and the first-byte partition of choices).
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    exprs: Vec<Expr>,
    optimized: Vec<Option<ExprId>>,
    partitions: FxHashMap<ExprId, Box<[ExprId]>>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node at a grammar position, or report a full arena.
    pub fn try_alloc_at(&mut self, kind: ExprKind, span: Span) -> Result<ExprId, CapacityError> {
        let index = u32::try_from(self.exprs.len()).map_err(|_| CapacityError::ExprOverflow {
            count: self.exprs.len(),
        })?;
        self.exprs.push(Expr { kind, span });
        self.optimized.push(None);
        Ok(ExprId::new(index))
    }

    /// Allocate a node at a grammar position.
    ///
    /// # Panics
    /// Panics if the arena already holds `u32::MAX` nodes.
    /// Use `try_alloc_at` for fallible allocation.
    #[inline]
    pub fn alloc_at(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.try_alloc_at(kind, span).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Allocate a synthesized node.
    pub fn alloc(&mut self, kind: ExprKind) -> ExprId {
        self.alloc_at(kind, Span::DUMMY)
    }

    #[inline]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.exprs[id.index()].kind
    }

    #[inline]
    pub fn span(&self, id: ExprId) -> Span {
        self.exprs[id.index()].span
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// The memoized rewrite of `id`, if the rewrite pass has visited it.
    #[inline]
    pub fn cached_rewrite(&self, id: ExprId) -> Option<ExprId> {
        self.optimized[id.index()]
    }

    pub(crate) fn set_rewrite(&mut self, id: ExprId, rewritten: ExprId) {
        self.optimized[id.index()] = Some(rewritten);
    }

    /// Attach a first-byte partition to a choice node.
    ///
    /// Slot `b` holds the expression to run when the next byte is `b`;
    /// slot 256 is end of input.
    ///
    /// # Panics
    /// Panics if `table` does not have exactly 257 slots.
    pub fn set_partition(&mut self, choice: ExprId, table: Box<[ExprId]>) {
        assert_eq!(table.len(), DISPATCH_SLOTS, "partition must have 257 slots");
        self.partitions.insert(choice, table);
    }

    pub fn partition(&self, choice: ExprId) -> Option<&[ExprId]> {
        self.partitions.get(&choice).map(AsRef::as_ref)
    }

    // Builders. Every call allocates a fresh node.

    pub fn empty(&mut self) -> ExprId {
        self.alloc(ExprKind::Empty)
    }

    pub fn fail(&mut self) -> ExprId {
        self.alloc(ExprKind::Fail)
    }

    pub fn any_byte(&mut self) -> ExprId {
        self.alloc(ExprKind::AnyByte)
    }

    pub fn byte(&mut self, byte: u8) -> ExprId {
        self.alloc(ExprKind::Byte(byte))
    }

    pub fn byte_class(&mut self, set: ByteSet) -> ExprId {
        self.alloc(ExprKind::ByteClass(set))
    }

    /// A byte string: one `Byte` node per byte, sequenced.
    pub fn literal(&mut self, text: &[u8]) -> ExprId {
        let bytes: ExprList = text.iter().map(|&b| self.byte(b)).collect();
        self.sequence(bytes)
    }

    /// Sequence of `items`; zero items is `Empty`, one item is the item
    /// itself.
    pub fn sequence(&mut self, items: impl IntoIterator<Item = ExprId>) -> ExprId {
        let items: ExprList = items.into_iter().collect();
        match items.len() {
            0 => self.empty(),
            1 => items[0],
            _ => self.alloc(ExprKind::Sequence(items)),
        }
    }

    /// Ordered choice of `alts`; one alternative is the alternative itself.
    pub fn choice(&mut self, alts: impl IntoIterator<Item = ExprId>) -> ExprId {
        let alts: ExprList = alts.into_iter().collect();
        match alts.len() {
            0 => self.fail(),
            1 => alts[0],
            _ => self.alloc(ExprKind::Choice(alts)),
        }
    }

    pub fn repeat(&mut self, inner: ExprId) -> ExprId {
        self.alloc(ExprKind::Repeat {
            inner,
            nullable: false,
        })
    }

    pub fn repeat1(&mut self, inner: ExprId) -> ExprId {
        self.alloc(ExprKind::Repeat1 {
            inner,
            nullable: false,
        })
    }

    pub fn optional(&mut self, inner: ExprId) -> ExprId {
        self.alloc(ExprKind::Optional(inner))
    }

    pub fn and(&mut self, inner: ExprId) -> ExprId {
        self.alloc(ExprKind::And(inner))
    }

    pub fn not(&mut self, inner: ExprId) -> ExprId {
        self.alloc(ExprKind::Not(inner))
    }

    pub fn nonterminal(&mut self, rule: RuleId) -> ExprId {
        self.alloc(ExprKind::NonTerminal(rule))
    }
}
