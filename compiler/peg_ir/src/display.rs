//! PEG notation for expressions, for logs and listings.

use std::fmt;

use crate::{ensure_sufficient_stack, ExprId, ExprKind, Grammar};

impl Grammar {
    /// Render `expr` in PEG notation, naming rules instead of expanding them.
    pub fn display(&self, expr: ExprId) -> ExprDisplay<'_> {
        ExprDisplay {
            grammar: self,
            expr,
        }
    }
}

/// Helper for displaying an expression with resolved rule names.
pub struct ExprDisplay<'a> {
    grammar: &'a Grammar,
    expr: ExprId,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(self.grammar, f, self.expr, Prec::Choice)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Choice,
    Sequence,
    Unary,
    Atom,
}

fn prec(grammar: &Grammar, expr: ExprId) -> Prec {
    match grammar.kind(expr) {
        ExprKind::Choice(_) => Prec::Choice,
        ExprKind::Sequence(_) if literal(grammar, expr).is_none() => Prec::Sequence,
        ExprKind::Repeat { .. }
        | ExprKind::Repeat1 { .. }
        | ExprKind::Optional(_)
        | ExprKind::And(_)
        | ExprKind::Not(_)
        | ExprKind::Link { .. } => Prec::Unary,
        _ => Prec::Atom,
    }
}

fn literal(grammar: &Grammar, expr: ExprId) -> Option<Vec<u8>> {
    let ExprKind::Sequence(items) = grammar.kind(expr) else {
        return None;
    };
    items
        .iter()
        .map(|&item| match grammar.kind(item) {
            ExprKind::Byte(b) => Some(*b),
            _ => None,
        })
        .collect()
}

fn write_expr(grammar: &Grammar, f: &mut fmt::Formatter<'_>, expr: ExprId, min: Prec) -> fmt::Result {
    if prec(grammar, expr) < min {
        f.write_str("(")?;
        write_expr(grammar, f, expr, Prec::Choice)?;
        return f.write_str(")");
    }
    ensure_sufficient_stack(|| match grammar.kind(expr) {
        ExprKind::Empty => f.write_str("''"),
        ExprKind::Fail => f.write_str("<fail>"),
        ExprKind::AnyByte => f.write_str("."),
        ExprKind::Byte(b) => {
            f.write_str("'")?;
            write_escaped(f, *b)?;
            f.write_str("'")
        }
        ExprKind::ByteClass(set) => write!(f, "{set:?}"),
        ExprKind::Sequence(items) => {
            if let Some(bytes) = literal(grammar, expr) {
                f.write_str("\"")?;
                for b in bytes {
                    write_escaped(f, b)?;
                }
                return f.write_str("\"");
            }
            write_list(grammar, f, items, " ", Prec::Unary)
        }
        ExprKind::Choice(alts) => write_list(grammar, f, alts, " / ", Prec::Sequence),
        ExprKind::Repeat { inner, .. } => postfix(grammar, f, *inner, "*"),
        ExprKind::Repeat1 { inner, .. } => postfix(grammar, f, *inner, "+"),
        ExprKind::Optional(inner) => postfix(grammar, f, *inner, "?"),
        ExprKind::And(inner) => prefix(grammar, f, "&", *inner),
        ExprKind::Not(inner) => prefix(grammar, f, "!", *inner),
        ExprKind::NonTerminal(rule) => f.write_str(&grammar.rule(*rule).name),
        ExprKind::Construct { body, left } => {
            f.write_str(if *left { "{@ " } else { "{ " })?;
            write_list(grammar, f, body, " ", Prec::Unary)?;
            f.write_str(" }")
        }
        ExprKind::New { left } => f.write_str(if *left { "<new@>" } else { "<new>" }),
        ExprKind::Capture => f.write_str("<capture>"),
        ExprKind::Tag(tag) => write!(f, "#{tag}"),
        ExprKind::Replace(text) => write!(f, "`{text}`"),
        ExprKind::Link { inner, index } => {
            if *index < 0 {
                prefix(grammar, f, "@", *inner)
            } else {
                write!(f, "@[{index}] ")?;
                write_expr(grammar, f, *inner, Prec::Unary)
            }
        }
        ExprKind::Block(inner) => {
            f.write_str("<block ")?;
            write_expr(grammar, f, *inner, Prec::Choice)?;
            f.write_str(">")
        }
        ExprKind::DefSymbol { table, inner } => {
            write!(f, "<def {table} ")?;
            write_expr(grammar, f, *inner, Prec::Choice)?;
            f.write_str(">")
        }
        ExprKind::IsSymbol {
            table,
            inner,
            last_only,
        } => {
            let op = if *last_only { "is" } else { "isa" };
            write!(f, "<{op} {table} ")?;
            write_expr(grammar, f, *inner, Prec::Choice)?;
            f.write_str(">")
        }
        ExprKind::DefIndent => f.write_str("<defindent>"),
        ExprKind::IsIndent => f.write_str("<indent>"),
    })
}

fn write_list(
    grammar: &Grammar,
    f: &mut fmt::Formatter<'_>,
    items: &[ExprId],
    sep: &str,
    min: Prec,
) -> fmt::Result {
    for (i, &item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write_expr(grammar, f, item, min)?;
    }
    Ok(())
}

fn prefix(grammar: &Grammar, f: &mut fmt::Formatter<'_>, op: &str, inner: ExprId) -> fmt::Result {
    f.write_str(op)?;
    write_expr(grammar, f, inner, Prec::Unary)
}

fn postfix(grammar: &Grammar, f: &mut fmt::Formatter<'_>, inner: ExprId, op: &str) -> fmt::Result {
    write_expr(grammar, f, inner, Prec::Atom)?;
    f.write_str(op)
}

fn write_escaped(f: &mut fmt::Formatter<'_>, byte: u8) -> fmt::Result {
    match byte {
        b'\n' => f.write_str("\\n"),
        b'\t' => f.write_str("\\t"),
        b'\r' => f.write_str("\\r"),
        b'\\' | b'\'' | b'"' => write!(f, "\\{}", byte as char),
        0x20..=0x7e => write!(f, "{}", byte as char),
        _ => write!(f, "\\x{byte:02x}"),
    }
}
