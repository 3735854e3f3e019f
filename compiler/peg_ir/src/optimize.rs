//! Memoized expression rewrites.
//!
//! [`optimize`] returns a node that the compiler may encode in place of the
//! original. Results are cached in the arena, so each node is rewritten at
//! most once and repeated requests return the same id.
//!
//! # Rewrites
//!
//! - Choice of bytes and byte classes: one byte class (the union).
//! - `!c1 … !ck .` where every `ci` is a byte or byte class: the complement
//!   class of their union.
//! - The same shape with at least one multi-byte literal `ci`: the dispatch
//!   form `Choice[ByteClass(fast), AnyByte]`, where `fast` holds the bytes
//!   that start none of the negated operands. This form is a hint for the
//!   sequence encoder and is *not* equivalent to the sequence; it is only
//!   ever produced for sequences and never folded into a parent rewrite.
//! - Reference to a rule whose body rewrites to a terminal: that terminal.
//!
//! Anything else rewrites to itself.

use tracing::trace;

use crate::{ensure_sufficient_stack, ByteSet, ExprId, ExprKind, Grammar};

/// Rewrite `id`, reusing the cached result when there is one.
pub fn optimize(grammar: &mut Grammar, id: ExprId) -> ExprId {
    if let Some(done) = grammar.arena().cached_rewrite(id) {
        return done;
    }
    // Mark in progress: a recursive rule reaching itself sees the identity.
    grammar.arena_mut().set_rewrite(id, id);
    let rewritten = ensure_sufficient_stack(|| rewrite(grammar, id));
    grammar.arena_mut().set_rewrite(id, rewritten);
    rewritten
}

fn rewrite(grammar: &mut Grammar, id: ExprId) -> ExprId {
    match grammar.kind(id).clone() {
        ExprKind::Choice(alts) => {
            let mut set = ByteSet::EMPTY;
            for alt in alts {
                let alt = optimize(grammar, alt);
                match grammar.kind(alt).as_byte_set() {
                    Some(s) => set = set.union(&s),
                    None => return id,
                }
            }
            trace!(expr = ?id, class = ?set, "choice collapsed to byte class");
            let span = grammar.arena().span(id);
            grammar.arena_mut().alloc_at(ExprKind::ByteClass(set), span)
        }
        ExprKind::Sequence(items) => {
            if let [only] = items.as_slice() {
                let inner = optimize(grammar, *only);
                if grammar.kind(inner).is_terminal() {
                    return inner;
                }
                return id;
            }
            negated_lookahead(grammar, id, &items).unwrap_or(id)
        }
        ExprKind::NonTerminal(rule) => {
            let Some(body) = grammar.rule(rule).body else {
                return id;
            };
            let inner = optimize(grammar, body);
            if grammar.kind(inner).is_terminal() {
                trace!(expr = ?id, rule = %grammar.rule(rule).name, "reference inlined");
                inner
            } else {
                id
            }
        }
        _ => id,
    }
}

/// `!c1 … !ck .` → complement class or dispatch form.
fn negated_lookahead(grammar: &mut Grammar, id: ExprId, items: &[ExprId]) -> Option<ExprId> {
    let (&last, nots) = items.split_last()?;
    if nots.is_empty() {
        return None;
    }
    let last = optimize(grammar, last);
    if !matches!(grammar.kind(last), ExprKind::AnyByte) {
        return None;
    }

    let mut starts = ByteSet::EMPTY;
    let mut has_literal = false;
    for &item in nots {
        let ExprKind::Not(inner) = *grammar.kind(item) else {
            return None;
        };
        let inner = optimize(grammar, inner);
        if let Some(set) = grammar.kind(inner).as_byte_set() {
            starts = starts.union(&set);
        } else if let Some(bytes) = literal_bytes(grammar, inner) {
            starts.insert(bytes[0]);
            has_literal = true;
        } else {
            return None;
        }
    }

    let fast = starts.complement();
    let span = grammar.arena().span(id);
    let arena = grammar.arena_mut();
    if has_literal {
        trace!(expr = ?id, fast = ?fast, "negated lookahead has dispatch form");
        let class = arena.alloc_at(ExprKind::ByteClass(fast), span);
        let any = arena.alloc_at(ExprKind::AnyByte, span);
        Some(arena.alloc_at(ExprKind::Choice([class, any].into_iter().collect()), span))
    } else {
        trace!(expr = ?id, class = ?fast, "negated lookahead collapsed to byte class");
        Some(arena.alloc_at(ExprKind::ByteClass(fast), span))
    }
}

/// The bytes of a multi-byte literal: a sequence of two or more `Byte`s.
pub fn literal_bytes(grammar: &Grammar, id: ExprId) -> Option<Box<[u8]>> {
    let ExprKind::Sequence(items) = grammar.kind(id) else {
        return None;
    };
    if items.len() < 2 {
        return None;
    }
    items
        .iter()
        .map(|&item| match grammar.kind(item) {
            ExprKind::Byte(b) => Some(*b),
            _ => None,
        })
        .collect()
}

/// Whether the rewrite of `id` is the dispatch form for negated lookahead.
///
/// Returns the fast-path class when it is.
pub fn dispatch_form(grammar: &Grammar, rewritten: ExprId) -> Option<ByteSet> {
    let ExprKind::Choice(alts) = grammar.kind(rewritten) else {
        return None;
    };
    match alts.as_slice() {
        [class, any] => match (grammar.kind(*class), grammar.kind(*any)) {
            (ExprKind::ByteClass(set), ExprKind::AnyByte) => Some(*set),
            _ => None,
        },
        _ => None,
    }
}
