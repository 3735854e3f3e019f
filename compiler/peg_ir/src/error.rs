//! Capacity errors for the id spaces.

use std::fmt;

/// An id space ran out of `u32` indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityError {
    /// The expression arena is full.
    ExprOverflow { count: usize },
    /// The rule table is full.
    RuleOverflow { count: usize },
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityError::ExprOverflow { count } => write!(
                f,
                "expression arena exceeded capacity: {count} nodes, max is {}",
                u32::MAX
            ),
            CapacityError::RuleOverflow { count } => write!(
                f,
                "rule table exceeded capacity: {count} rules, max is {}",
                u32::MAX
            ),
        }
    }
}

impl std::error::Error for CapacityError {}
