//! PEG IR - Parsing Expression Intermediate Representation
//!
//! This crate holds the grammar-side data the bytecode compiler reads:
//! - [`ByteSet`] bitmaps for byte-class terminals
//! - [`ExprArena`] and [`ExprId`] handles for expression nodes
//! - [`Grammar`] and [`Rule`] for named productions
//! - The memoized rewrite pass ([`optimize`])
//! - First-byte analysis for predictive dispatch ([`analysis`])
//!
//! # Identity
//!
//! Expressions are compared by [`ExprId`], never by structure. Two nodes
//! built separately from the same text are different nodes. Sharing a
//! subexpression means reusing its id.
//!
//! # Design Philosophy
//!
//! - **Flatten Everything**: no `Box<Expr>`, children are `ExprId` indices
//! - **Append Only**: rewrites allocate new nodes, existing nodes never change

mod arena;
pub mod analysis;
mod byte_set;
mod display;
mod error;
mod expr;
mod grammar;
pub mod optimize;
mod span;
mod stack;

pub use analysis::{accept_byte, annotate_partitions, first_byte_partition, Acceptance, EOF_SLOT};
pub use arena::ExprArena;
pub use byte_set::ByteSet;
pub use display::ExprDisplay;
pub use error::CapacityError;
pub use expr::{Expr, ExprId, ExprKind, ExprList};
pub use grammar::{Grammar, Rule, RuleId};
pub use optimize::optimize;
pub use span::Span;
pub use stack::ensure_sufficient_stack;

/// Number of dispatch slots: one per byte value plus one end-of-input slot.
pub const DISPATCH_SLOTS: usize = 257;
