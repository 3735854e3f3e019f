//! Rules and the grammar that owns them.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{ensure_sufficient_stack, CapacityError, ExprArena, ExprId, ExprKind, Span};

/// Index into the grammar's rule table.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleId(u32);

impl RuleId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        RuleId(index)
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

impl fmt::Debug for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleId({})", self.0)
    }
}

/// A named production.
///
/// `body` is `None` between [`Grammar::declare_rule`] and
/// [`Grammar::define_rule`]; references to the rule may be built in between.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub name: Box<str>,
    pub body: Option<ExprId>,
    pub span: Span,
}

/// Expression arena plus the rule table that names parts of it.
#[derive(Clone, Debug, Default)]
pub struct Grammar {
    arena: ExprArena,
    rules: Vec<Rule>,
    by_name: FxHashMap<Box<str>, RuleId>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    #[inline]
    pub fn arena_mut(&mut self) -> &mut ExprArena {
        &mut self.arena
    }

    #[inline]
    pub fn kind(&self, id: ExprId) -> &ExprKind {
        self.arena.kind(id)
    }

    /// Get or create the rule named `name`, without a body, or report a
    /// full rule table.
    pub fn try_declare_rule(&mut self, name: &str) -> Result<RuleId, CapacityError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let index = u32::try_from(self.rules.len()).map_err(|_| CapacityError::RuleOverflow {
            count: self.rules.len(),
        })?;
        let id = RuleId::new(index);
        self.rules.push(Rule {
            name: name.into(),
            body: None,
            span: Span::DUMMY,
        });
        self.by_name.insert(name.into(), id);
        Ok(id)
    }

    /// Get or create the rule named `name`, without a body.
    ///
    /// # Panics
    /// Panics if the table already holds `u32::MAX` rules.
    /// Use `try_declare_rule` for fallible declaration.
    pub fn declare_rule(&mut self, name: &str) -> RuleId {
        self.try_declare_rule(name).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Set (or replace) the body of a declared rule.
    pub fn define_rule(&mut self, rule: RuleId, body: ExprId) {
        let span = self.arena.span(body);
        let entry = &mut self.rules[rule.index()];
        entry.body = Some(body);
        entry.span = span;
    }

    /// Declare and define in one step.
    pub fn add_rule(&mut self, name: &str, body: ExprId) -> RuleId {
        let id = self.declare_rule(name);
        self.define_rule(id, body);
        id
    }

    #[inline]
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn rule_by_name(&self, name: &str) -> Option<RuleId> {
        self.by_name.get(name).copied()
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, r)| (RuleId::new(i as u32), r))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Follow references until reaching a node that is not a reference to a
    /// defined rule.
    ///
    /// `A = B; B = "x"` resolves a reference to `A` to the `"x"` node. A
    /// cycle of pure references (`A = B; B = A`) stops at the first
    /// reference seen twice.
    pub fn resolve_nonterminal(&self, mut expr: ExprId) -> ExprId {
        let mut seen = FxHashSet::default();
        while let ExprKind::NonTerminal(rule) = self.kind(expr) {
            if !seen.insert(*rule) {
                break;
            }
            match self.rule(*rule).body {
                Some(body) => expr = body,
                None => break,
            }
        }
        expr
    }

    /// Whether matching `rule` can never touch the AST under construction,
    /// following references to other rules.
    pub fn is_ast_free(&self, rule: RuleId) -> bool {
        let mut visited = FxHashSet::default();
        visited.insert(rule);
        match self.rule(rule).body {
            Some(body) => !self.reaches_ast_operator(body, &mut visited),
            None => true,
        }
    }

    fn reaches_ast_operator(&self, expr: ExprId, visited: &mut FxHashSet<RuleId>) -> bool {
        ensure_sufficient_stack(|| {
            let kind = self.kind(expr);
            if kind.is_ast_operator() {
                return true;
            }
            if let ExprKind::NonTerminal(rule) = kind {
                if !visited.insert(*rule) {
                    return false;
                }
                return self
                    .rule(*rule)
                    .body
                    .is_some_and(|body| self.reaches_ast_operator(body, visited));
            }
            kind.children()
                .iter()
                .any(|&child| self.reaches_ast_operator(child, visited))
        })
    }
}
