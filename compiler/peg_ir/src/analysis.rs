//! First-byte analysis for predictive dispatch.
//!
//! [`accept_byte`] asks whether an expression can succeed when the next
//! input byte is `b`. [`first_byte_partition`] turns the answers for each
//! alternative of a choice into a 257-slot table that the compiler encodes
//! as an O(1) jump.
//!
//! The analysis is conservative in one direction only: [`Acceptance::Reject`]
//! is returned only when the expression definitely fails on that byte.
//! Anything uncertain answers `Accept`.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::{ensure_sufficient_stack, ExprId, ExprKind, ExprList, Grammar, RuleId, DISPATCH_SLOTS};

/// Dispatch slot for end of input.
pub const EOF_SLOT: usize = 256;

/// Outcome of looking at one input byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// May succeed by consuming this byte (or is not known to fail).
    Accept,
    /// Definitely fails.
    Reject,
    /// If it succeeds, it does so without consuming this byte.
    Unconsumed,
}

/// Can `expr` succeed when the next input is `slot` (a byte, or
/// [`EOF_SLOT`])?
pub fn accept_byte(grammar: &Grammar, expr: ExprId, slot: usize) -> Acceptance {
    let mut visiting = FxHashSet::default();
    accept(grammar, expr, slot, &mut visiting)
}

fn accept(
    grammar: &Grammar,
    expr: ExprId,
    slot: usize,
    visiting: &mut FxHashSet<RuleId>,
) -> Acceptance {
    ensure_sufficient_stack(|| match grammar.kind(expr) {
        ExprKind::Empty
        | ExprKind::New { .. }
        | ExprKind::Capture
        | ExprKind::Tag(_)
        | ExprKind::Replace(_)
        | ExprKind::DefIndent => Acceptance::Unconsumed,
        ExprKind::Fail => Acceptance::Reject,
        ExprKind::AnyByte => {
            if slot == EOF_SLOT {
                Acceptance::Reject
            } else {
                Acceptance::Accept
            }
        }
        ExprKind::Byte(b) => {
            if slot == usize::from(*b) {
                Acceptance::Accept
            } else {
                Acceptance::Reject
            }
        }
        ExprKind::ByteClass(set) => {
            if slot < EOF_SLOT && set.contains(slot as u8) {
                Acceptance::Accept
            } else {
                Acceptance::Reject
            }
        }
        ExprKind::Sequence(items) | ExprKind::Construct { body: items, .. } => {
            for &item in items {
                match accept(grammar, item, slot, visiting) {
                    Acceptance::Unconsumed => {}
                    decided => return decided,
                }
            }
            Acceptance::Unconsumed
        }
        ExprKind::Choice(alts) => {
            let mut result = Acceptance::Reject;
            for &alt in alts {
                match accept(grammar, alt, slot, visiting) {
                    Acceptance::Accept => return Acceptance::Accept,
                    Acceptance::Unconsumed => result = Acceptance::Unconsumed,
                    Acceptance::Reject => {}
                }
            }
            result
        }
        ExprKind::Repeat { inner, .. } | ExprKind::Optional(inner) => {
            match accept(grammar, *inner, slot, visiting) {
                Acceptance::Accept => Acceptance::Accept,
                _ => Acceptance::Unconsumed,
            }
        }
        ExprKind::Repeat1 { inner, .. }
        | ExprKind::Link { inner, .. }
        | ExprKind::Block(inner)
        | ExprKind::DefSymbol { inner, .. }
        | ExprKind::IsSymbol { inner, .. } => accept(grammar, *inner, slot, visiting),
        ExprKind::And(inner) => match accept(grammar, *inner, slot, visiting) {
            Acceptance::Reject => Acceptance::Reject,
            _ => Acceptance::Unconsumed,
        },
        ExprKind::Not(inner) => {
            if grammar.kind(*inner).is_terminal()
                && accept(grammar, *inner, slot, visiting) == Acceptance::Accept
            {
                Acceptance::Reject
            } else {
                Acceptance::Unconsumed
            }
        }
        ExprKind::NonTerminal(rule) => {
            let Some(body) = grammar.rule(*rule).body else {
                return Acceptance::Accept;
            };
            if !visiting.insert(*rule) {
                return Acceptance::Accept;
            }
            let result = accept(grammar, body, slot, visiting);
            visiting.remove(rule);
            result
        }
        ExprKind::IsIndent => Acceptance::Accept,
    })
}

/// Build the 257-slot dispatch table for `choice`.
///
/// Each slot selects what to run for that next byte:
/// - the choice itself when every alternative stays viable,
/// - the single viable alternative,
/// - a `Fail` node when none is viable,
/// - otherwise a new choice of the viable alternatives in their original
///   order, shared by every slot with the same viable subset.
///
/// Returns `None` when `choice` is not a choice or when no slot narrows.
pub fn first_byte_partition(grammar: &mut Grammar, choice: ExprId) -> Option<Box<[ExprId]>> {
    let ExprKind::Choice(alts) = grammar.kind(choice).clone() else {
        return None;
    };

    let mut fail = None;
    let mut subsets: FxHashMap<SmallVec<[u32; 8]>, ExprId> = FxHashMap::default();
    let mut table = Vec::with_capacity(DISPATCH_SLOTS);
    let mut narrowed = false;

    for slot in 0..DISPATCH_SLOTS {
        let viable: SmallVec<[u32; 8]> = alts
            .iter()
            .enumerate()
            .filter(|&(_, &alt)| accept_byte(grammar, alt, slot) != Acceptance::Reject)
            .map(|(i, _)| i as u32)
            .collect();

        let target = if viable.len() == alts.len() {
            choice
        } else if viable.is_empty() {
            narrowed = true;
            *fail.get_or_insert_with(|| grammar.arena_mut().fail())
        } else if viable.len() == 1 {
            narrowed = true;
            alts[viable[0] as usize]
        } else {
            narrowed = true;
            *subsets.entry(viable).or_insert_with_key(|viable| {
                let sub: ExprList = viable.iter().map(|&i| alts[i as usize]).collect();
                grammar.arena_mut().alloc(ExprKind::Choice(sub))
            })
        };
        table.push(target);
    }

    narrowed.then(|| table.into_boxed_slice())
}

/// Attach partitions to every choice reachable from the grammar's rules.
///
/// Choices that already carry a partition are left alone. Returns the
/// number of choices annotated.
pub fn annotate_partitions(grammar: &mut Grammar) -> usize {
    let mut choices = Vec::new();
    let mut seen = FxHashSet::default();
    let mut stack: Vec<ExprId> = grammar.rules().filter_map(|(_, r)| r.body).collect();
    while let Some(expr) = stack.pop() {
        if !seen.insert(expr) {
            continue;
        }
        let kind = grammar.kind(expr);
        if matches!(kind, ExprKind::Choice(_)) {
            choices.push(expr);
        }
        stack.extend_from_slice(kind.children());
    }
    choices.sort_unstable();

    let mut annotated = 0;
    for choice in choices {
        if grammar.arena().partition(choice).is_some() {
            continue;
        }
        if let Some(table) = first_byte_partition(grammar, choice) {
            grammar.arena_mut().set_partition(choice, table);
            annotated += 1;
        }
    }
    debug!(annotated, "first-byte partitions attached");
    annotated
}
