//! Packrat memo slot planning.
//!
//! A memo slot belongs to one expression node and is shared by every
//! reference that resolves to that node. Links get their own slot per node,
//! separate from plain references, because their entries carry a built AST
//! node. Slots whose result can depend on the symbol table or indent stack
//! are context sensitive and get state-keyed instructions.

use peg_ir::{ensure_sufficient_stack, ExprId, ExprKind, Grammar, RuleId};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::{MemoId, MemoKey};

/// One memoization slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoPoint {
    pub id: MemoId,
    /// Debug label: the rule name, or the linked expression.
    pub label: Box<str>,
    /// Expression whose result is cached.
    pub expr: ExprId,
    /// Entries carry the AST node built by a link.
    pub node: bool,
    pub context_sensitive: bool,
}

impl MemoPoint {
    pub fn key(&self) -> MemoKey {
        if self.context_sensitive {
            MemoKey::State
        } else {
            MemoKey::Position
        }
    }
}

#[derive(Default)]
pub(crate) struct MemoPlanner {
    points: Vec<MemoPoint>,
    by_expr: FxHashMap<(ExprId, bool), MemoId>,
}

impl MemoPlanner {
    /// The slot for `expr`, created on first request. Node slots and plain
    /// slots for the same expression are distinct.
    pub(crate) fn issue(
        &mut self,
        grammar: &Grammar,
        label: &str,
        expr: ExprId,
        node: bool,
    ) -> &MemoPoint {
        let id = match self.by_expr.get(&(expr, node)) {
            Some(&id) => id,
            None => {
                let id = MemoId::new(self.points.len() as u32);
                let context_sensitive = is_context_sensitive(grammar, expr);
                trace!(memo = ?id, label, node, context_sensitive, "memo point issued");
                self.points.push(MemoPoint {
                    id,
                    label: label.into(),
                    expr,
                    node,
                    context_sensitive,
                });
                self.by_expr.insert((expr, node), id);
                id
            }
        };
        &self.points[id.index()]
    }

    pub(crate) fn into_points(self) -> Vec<MemoPoint> {
        self.points
    }
}

/// Whether a state query is reachable from `expr`.
///
/// Each rule is entered at most once per search. A reference to a rule
/// already entered answers `false`, so the answer for that path comes from
/// the first visit alone.
pub fn is_context_sensitive(grammar: &Grammar, expr: ExprId) -> bool {
    let mut visited = FxHashSet::default();
    search(grammar, expr, &mut visited)
}

fn search(grammar: &Grammar, expr: ExprId, visited: &mut FxHashSet<RuleId>) -> bool {
    ensure_sufficient_stack(|| {
        let kind = grammar.kind(expr);
        if let ExprKind::NonTerminal(rule) = kind {
            if !visited.insert(*rule) {
                return false;
            }
            return grammar
                .rule(*rule)
                .body
                .is_some_and(|body| search(grammar, body, visited));
        }
        kind.children()
            .iter()
            .any(|&child| search(grammar, child, visited))
            || kind.is_state_query()
    })
}

#[cfg(test)]
mod tests;
