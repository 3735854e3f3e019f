//! Linking errors.

use thiserror::Error;

/// Why a rule list could not be turned into a program.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("no rules to compile")]
    EmptyRuleList,
    /// A compiled or referenced rule was declared but never given a body.
    #[error("rule `{name}` is not defined")]
    UndefinedRule { name: Box<str> },
    /// A call targets a defined rule that was not in the compiled rule list.
    #[error("call to rule `{name}` cannot be linked: the rule was not compiled")]
    UnlinkedCall { name: Box<str> },
}
