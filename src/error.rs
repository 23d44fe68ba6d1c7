//! Error types for pathwarden
//!
//! Every error in this module is raised while building the rule set. Request
//! evaluation itself never fails: it always ends in a decision.

use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Access denied: {0}")]
    AccessDenied(#[from] AccessDeniedError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Invalid pattern in rule #{rule}: {source}")]
    Pattern {
        rule: usize,
        #[source]
        source: PatternError,
    },

    #[error("Invalid access expression in rule #{rule}: {source}")]
    Expression {
        rule: usize,
        #[source]
        source: ExpressionError,
    },

    #[error("Invalid role hierarchy: {0}")]
    Hierarchy(#[from] HierarchyError),
}

/// Malformed path pattern
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("unbalanced braces in '{pattern}'")]
    UnbalancedBraces { pattern: String },

    #[error("empty variable name in '{pattern}'")]
    EmptyVariable { pattern: String },

    #[error("variable '{name}' declared more than once in '{pattern}'")]
    DuplicateVariable { pattern: String, name: String },

    #[error("'**' must be the last segment of '{pattern}'")]
    MisplacedMultiWildcard { pattern: String },

    #[error("invalid constraint for variable '{name}': {reason}")]
    InvalidConstraint { name: String, reason: String },
}

/// Malformed access expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: &'static str,
        actual: usize,
    },

    #[error("expression too long ({length} bytes, max {max})")]
    TooLong { max: usize, length: usize },

    #[error("expression nested deeper than {max} levels")]
    TooDeep { max: usize },
}

/// Invalid role hierarchy definition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("cycle in role hierarchy involving '{0}'")]
    Cycle(String),

    #[error("malformed hierarchy line '{0}'")]
    Malformed(String),
}

/// Raised by [`crate::access_control::AccessResolver::require`] on a DENY verdict
#[derive(Error, Debug)]
#[error("Access denied for {method} {path}: {reason}")]
pub struct AccessDeniedError {
    pub method: String,
    pub path: String,
    pub reason: String,
}

impl AccessDeniedError {
    pub fn new(method: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn denied_by_rule(method: impl Into<String>, path: impl Into<String>, rule: usize) -> Self {
        Self::new(method, path, format!("denied by rule #{}", rule))
    }

    pub fn no_matching_rule(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(method, path, "no rule matched and the default decision is deny")
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_constructors() {
        let err = AccessDeniedError::denied_by_rule("GET", "/admin", 2);
        assert!(err.reason.contains("#2"));
        assert!(err.to_string().contains("GET /admin"));

        let err = AccessDeniedError::no_matching_rule("POST", "/x");
        assert!(err.reason.contains("default"));
    }

    #[test]
    fn test_rule_index_in_message() {
        let err = ConfigError::Pattern {
            rule: 3,
            source: PatternError::UnbalancedBraces {
                pattern: "/a/{b".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("#3"));
        assert!(msg.contains("/a/{b"));
    }

    #[test]
    fn test_hierarchy_error_converts() {
        let err: ConfigError = HierarchyError::Cycle("ROLE_A".to_string()).into();
        assert!(matches!(err, ConfigError::Hierarchy(HierarchyError::Cycle(_))));

        let app: AppError = err.into();
        assert!(matches!(app, AppError::Config(_)));
    }
}
