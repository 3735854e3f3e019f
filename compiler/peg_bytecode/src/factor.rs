//! Common-prefix factoring for ordered choices.
//!
//! `p s1 / p s2` becomes `p (s1 / s2)` when the two alternatives start with
//! the same nodes. Nodes are compared by id. A reference to a rule is looked
//! through for the comparison, so `A / "x" B` with `A = "x" C` shares `"x"`.
//! The grammar's rules are left as they are; only new nodes are built.

use peg_ir::{ExprId, ExprKind, ExprList, Grammar};
use tracing::trace;

/// Factor `choice` in one greedy left-to-right pass.
///
/// Finds the first adjacent pair of alternatives with the same leading
/// node, merges them, and keeps merging the result into following
/// alternatives while their leading node matches. Alternatives that never
/// match a neighbour pass through unchanged. Returns `None` when no
/// adjacent pair shares a leading node.
pub fn factor_common_prefix(grammar: &mut Grammar, choice: ExprId) -> Option<ExprId> {
    let ExprKind::Choice(alts) = grammar.kind(choice).clone() else {
        return None;
    };
    let start = alts
        .windows(2)
        .position(|pair| same_head(grammar, pair[0], pair[1]))?;
    let mut common = trim_common_prefix(grammar, alts[start], alts[start + 1])?;

    let mut out: ExprList = alts[..start].iter().copied().collect();
    for &alt in &alts[start + 2..] {
        if same_head(grammar, common, alt) {
            if let Some(merged) = trim_common_prefix(grammar, common, alt) {
                common = merged;
                continue;
            }
        }
        out.push(common);
        common = alt;
    }
    out.push(common);

    let factored = grammar.arena_mut().choice(out);
    trace!(choice = ?choice, factored = %grammar.display(factored), "common prefix factored");
    Some(factored)
}

/// The alternative as a list of sequence elements, looking through rule
/// references.
fn elements(grammar: &Grammar, expr: ExprId) -> ExprList {
    let expr = grammar.resolve_nonterminal(expr);
    match grammar.kind(expr) {
        ExprKind::Sequence(items) => items.clone(),
        _ => std::iter::once(expr).collect(),
    }
}

fn same_head(grammar: &Grammar, a: ExprId, b: ExprId) -> bool {
    let a = elements(grammar, a);
    let b = elements(grammar, b);
    matches!((a.first(), b.first()), (Some(x), Some(y)) if x == y)
}

/// `prefix (rest_a / rest_b)` for the longest shared prefix of `a` and `b`.
fn trim_common_prefix(grammar: &mut Grammar, a: ExprId, b: ExprId) -> Option<ExprId> {
    let a = elements(grammar, a);
    let b = elements(grammar, b);
    let shared = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    if shared == 0 {
        return None;
    }

    let rest_a = new_sequence(grammar, &a[shared..]);
    let rest_b = new_sequence(grammar, &b[shared..]);
    let mut alts = ExprList::new();
    add_choice(grammar, &mut alts, rest_a);
    add_choice(grammar, &mut alts, rest_b);
    let suffix = grammar.arena_mut().choice(alts);

    let mut items: ExprList = a[..shared].iter().copied().collect();
    add_sequence(grammar, &mut items, suffix);
    Some(new_sequence(grammar, &items))
}

fn new_sequence(grammar: &mut Grammar, items: &[ExprId]) -> ExprId {
    let mut flat = ExprList::new();
    for &item in items {
        add_sequence(grammar, &mut flat, item);
    }
    grammar.arena_mut().sequence(flat)
}

fn add_sequence(grammar: &Grammar, list: &mut ExprList, expr: ExprId) {
    match grammar.kind(expr) {
        ExprKind::Sequence(items) => list.extend_from_slice(items),
        ExprKind::Empty => {}
        _ => list.push(expr),
    }
}

fn add_choice(grammar: &Grammar, list: &mut ExprList, expr: ExprId) {
    match grammar.kind(expr) {
        ExprKind::Choice(alts) => list.extend_from_slice(alts),
        _ => list.push(expr),
    }
}

#[cfg(test)]
mod tests;
