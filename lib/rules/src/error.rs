//! Error types for the rules crate.

use std::fmt;

/// Errors raised while evaluating a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The script could not be parsed.
    InvalidScript { script: String, reason: String },
    /// A result script assigned something other than a `result` field.
    InvalidAssignment { statement: String },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScript { script, reason } => {
                write!(f, "invalid script '{script}': {reason}")
            }
            Self::InvalidAssignment { statement } => {
                write!(f, "statement '{statement}' does not assign a result field")
            }
        }
    }
}

impl std::error::Error for RuleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_script_display() {
        let err = RuleError::InvalidScript {
            script: "a >".to_string(),
            reason: "comparison is missing an operand".to_string(),
        };
        assert!(err.to_string().contains("invalid script 'a >'"));
    }
}
