//! Error types for convgen.
//!
//! This module provides a unified error type (`ConvgenError`) that bridges
//! domain-specific errors from the pipeline stages (parsing, loading, rule
//! compilation, resolution, output) into a single type suitable for CLI
//! reporting.
//!
//! ## Fatality
//!
//! Only a subset of the user-visible taxonomy is fatal:
//! - `MalformedDirective` and `PackageLoadFailed` for required inputs abort
//!   the pipeline at the stage that detects them.
//! - `TypeNotFound` is fatal when the type was explicitly named in a
//!   directive. During automatic pair expansion a missing name is simply not
//!   paired.
//! - Unresolvable remaps and ambiguous field matches are never errors; they
//!   surface as `Unhandled` plan entries and log warnings.
//!
//! The CLI contract is exit code 0 on success and 1 on any failure.

use std::fmt;

use thiserror::Error;

use crate::syntax::Pos;

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// All stage errors are converted into this type before being reported.
#[derive(Debug, Error)]
pub enum ConvgenError {
    /// A directive failed to parse. Fatal; reported during rule compilation.
    #[error("malformed directive at {position}: {raw:?}: {reason}")]
    MalformedDirective {
        raw: String,
        position: Pos,
        reason: String,
    },

    /// A required package failed to load.
    #[error("failed to load package {path}: {cause}")]
    PackageLoadFailed { path: String, cause: String },

    /// A type explicitly named in a directive does not exist.
    #[error("type not found: {fqn}")]
    TypeNotFound { fqn: String },

    /// Output file could not be written.
    #[error("failed to write {path}: {cause}")]
    WriteFailed { path: String, cause: String },

    /// Invalid invocation (bad source directory, unusable output path).
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ConvgenError>;

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit code for an outcome.
///
/// The CLI contract is deliberately coarse: 0 for success, 1 for any failure
/// (directive parse, load, analysis, emission, write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    Failure = 1,
}

impl ExitStatus {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<&ConvgenError> for ExitStatus {
    fn from(_: &ConvgenError) -> Self {
        ExitStatus::Failure
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<crate::loader::LoadError> for ConvgenError {
    fn from(err: crate::loader::LoadError) -> Self {
        ConvgenError::PackageLoadFailed {
            path: err.path().to_string(),
            cause: err.cause_text(),
        }
    }
}

impl From<crate::rules::RuleError> for ConvgenError {
    fn from(err: crate::rules::RuleError) -> Self {
        match err {
            crate::rules::RuleError::Malformed {
                raw,
                position,
                reason,
            } => ConvgenError::MalformedDirective {
                raw,
                position,
                reason,
            },
        }
    }
}

impl From<crate::resolve::ResolveError> for ConvgenError {
    fn from(err: crate::resolve::ResolveError) -> Self {
        match err {
            crate::resolve::ResolveError::TypeNotFound { fqn } => {
                ConvgenError::TypeNotFound { fqn }
            }
            crate::resolve::ResolveError::Load(load) => load.into(),
        }
    }
}

impl From<crate::output::WriteError> for ConvgenError {
    fn from(err: crate::output::WriteError) -> Self {
        ConvgenError::WriteFailed {
            path: err.path,
            cause: err.cause.to_string(),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl ConvgenError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        ConvgenError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConvgenError::Internal {
            message: message.into(),
        }
    }

    /// Get the exit status for this error.
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod exit_status {
        use super::*;

        #[test]
        fn every_error_maps_to_failure() {
            let errs = [
                ConvgenError::invalid_args("bad dir"),
                ConvgenError::internal("oops"),
                ConvgenError::TypeNotFound {
                    fqn: "example.com/a.User".to_string(),
                },
            ];
            for err in &errs {
                assert_eq!(err.exit_status(), ExitStatus::Failure);
                assert_eq!(err.exit_status().code(), 1);
            }
        }

        #[test]
        fn display_shows_code() {
            assert_eq!(format!("{}", ExitStatus::Success), "0");
            assert_eq!(format!("{}", ExitStatus::Failure), "1");
        }
    }

    mod error_display {
        use super::*;

        #[test]
        fn type_not_found_display() {
            let err = ConvgenError::TypeNotFound {
                fqn: "example.com/a.User".to_string(),
            };
            assert_eq!(err.to_string(), "type not found: example.com/a.User");
        }

        #[test]
        fn malformed_directive_display_carries_position() {
            let err = ConvgenError::MalformedDirective {
                raw: "convert=".to_string(),
                position: Pos::new("gen.go", 3, 1),
                reason: "missing target type".to_string(),
            };
            let text = err.to_string();
            assert!(text.contains("gen.go:3:1"));
            assert!(text.contains("missing target type"));
        }
    }
}
