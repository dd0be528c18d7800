//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - BIND-010-019: Malformed source (unreadable or unparsable payload)
//! - BIND-020-029: Type mismatch (text cannot coerce to the target kind)
//! - BIND-030-039: Arity mismatch (fixed-size targets)
//! - BIND-040-049: Unsupported target kinds
//! - BIND-050-059: Post-binding validation
//! - BIND-060-069: Configuration and schema errors

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Coarse classification of a [`BindError`].
///
/// Every kind is fatal to the binding call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedSource,
    TypeMismatch,
    ArityMismatch,
    UnsupportedTarget,
    ValidationFailed,
    Configuration,
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum BindError {
    // ═══════════════════════════════════════════
    // MALFORMED SOURCE (010-019)
    // ═══════════════════════════════════════════
    #[error("[BIND-010] Malformed request body: {reason}")]
    MalformedBody { reason: String },

    #[error("[BIND-011] Malformed multipart body: {reason}")]
    Multipart { reason: String },

    #[error("[BIND-012] Failed to decode {format} payload: {reason}")]
    Payload { format: &'static str, reason: String },

    #[error("[BIND-013] Missing request body")]
    MissingBody,

    // ═══════════════════════════════════════════
    // TYPE MISMATCH (020-029)
    // ═══════════════════════════════════════════
    #[error("[BIND-020] {value:?} is not a valid {target}: {reason}")]
    InvalidValue {
        value: String,
        target: &'static str,
        reason: String,
    },

    #[error("[BIND-021] {value:?} is not a valid timestamp: {reason}")]
    InvalidTime { value: String, reason: String },

    #[error("[BIND-022] {value:?} is not a valid duration: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("[BIND-023] Unknown time location '{name}'")]
    UnknownLocation { name: String },

    // ═══════════════════════════════════════════
    // ARITY MISMATCH (030-039)
    // ═══════════════════════════════════════════
    #[error("[BIND-030] {actual} values supplied for '{key}' but {target} holds exactly {expected}")]
    ArrayLength {
        key: String,
        target: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("[BIND-031] {actual} files uploaded for '{key}' but the target holds exactly {expected}")]
    FileCount {
        key: String,
        expected: usize,
        actual: usize,
    },

    // ═══════════════════════════════════════════
    // UNSUPPORTED TARGET (040-049)
    // ═══════════════════════════════════════════
    #[error("[BIND-040] Cannot bind into {target}: {reason}")]
    UnsupportedTarget { target: &'static str, reason: String },

    #[error("[BIND-041] Unsupported field type for uploaded file '{key}': {target}")]
    UnsupportedFileTarget { key: String, target: &'static str },

    // ═══════════════════════════════════════════
    // VALIDATION (050-059)
    // ═══════════════════════════════════════════
    #[error("[BIND-050] {0}")]
    Validation(ValidationError),

    #[error("[BIND-051] Rule set '{rule}' rejected the record: {reason}")]
    RuleFailed { rule: String, reason: String },

    // ═══════════════════════════════════════════
    // CONFIGURATION (060-069)
    // ═══════════════════════════════════════════
    #[error("[BIND-060] Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("[BIND-061] Invalid record schema: {reason}")]
    Schema { reason: String },

    #[error("[BIND-062] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BindError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedBody { .. }
            | Self::Multipart { .. }
            | Self::Payload { .. }
            | Self::MissingBody
            | Self::Io(_) => ErrorKind::MalformedSource,
            Self::InvalidValue { .. }
            | Self::InvalidTime { .. }
            | Self::InvalidDuration { .. }
            | Self::UnknownLocation { .. } => ErrorKind::TypeMismatch,
            Self::ArrayLength { .. } | Self::FileCount { .. } => ErrorKind::ArityMismatch,
            Self::UnsupportedTarget { .. } | Self::UnsupportedFileTarget { .. } => {
                ErrorKind::UnsupportedTarget
            }
            Self::Validation(_) | Self::RuleFailed { .. } => ErrorKind::ValidationFailed,
            Self::Config { .. } | Self::Schema { .. } => ErrorKind::Configuration,
        }
    }

    pub(crate) fn invalid_value(
        value: &str,
        target: &'static str,
        reason: impl fmt::Display,
    ) -> Self {
        Self::InvalidValue {
            value: value.to_string(),
            target,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(target: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedTarget {
            target,
            reason: reason.into(),
        }
    }
}

impl FixSuggestion for BindError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BindError::MalformedBody { .. } => {
                Some("Check the body matches the declared Content-Type")
            }
            BindError::Multipart { .. } => {
                Some("Send multipart/form-data with a boundary parameter and well-formed parts")
            }
            BindError::Payload { .. } => Some("Check the payload syntax and the record's field types"),
            BindError::MissingBody => Some("Send a request body or use a query/form binding"),
            BindError::InvalidValue { .. } => {
                Some("Send a value the field type can parse (base-10 numbers, true/false)")
            }
            BindError::InvalidTime { .. } => {
                Some("Match the field's time_format tag (RFC 3339 by default, or unix/unixnano)")
            }
            BindError::InvalidDuration { .. } => {
                Some("Use duration literals such as 300ms, 1.5h or 1h30m")
            }
            BindError::UnknownLocation { .. } => {
                Some("Use an IANA zone name such as Europe/Berlin in time_location")
            }
            BindError::ArrayLength { .. } => {
                Some("Send exactly as many values as the fixed-size array holds, or use a Vec")
            }
            BindError::FileCount { .. } => {
                Some("Upload exactly as many files as the array holds, or use a Vec<FileHeader>")
            }
            BindError::UnsupportedTarget { .. } => {
                Some("Bind into scalars, strings, time values, sequences, maps or records")
            }
            BindError::UnsupportedFileTarget { .. } => Some(
                "Declare the field as FileHeader, Option<FileHeader>, Vec<FileHeader> or [FileHeader; N]",
            ),
            BindError::Validation(_) => Some("Fix the listed fields and resend the request"),
            BindError::RuleFailed { .. } => Some("Check the custom rule set applied to this record"),
            BindError::Config { .. } => Some("Check reqbind.toml and REQBIND_* environment variables"),
            BindError::Schema { .. } => Some("Check the record schema YAML: field names, types and tags"),
            BindError::Io(_) => Some("Check file path and permissions"),
        }
    }
}

/// One rejected field in a [`ValidationError`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationField {
    pub path: String,
    pub code: String,
    pub message: String,
}

/// Structured result of a failed validation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    pub fields: Vec<ValidationField>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Add a rejected field, builder style
    pub fn field(
        mut self,
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.fields.push(ValidationField {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        });
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for (i, field) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} ({})", field.path, field.message)?;
        }
        Ok(())
    }
}

impl From<ValidationError> for BindError {
    fn from(err: ValidationError) -> Self {
        BindError::Validation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_appear_in_messages() {
        let err = BindError::invalid_value("abc", "i32", "invalid digit found in string");
        assert!(err.to_string().starts_with("[BIND-020]"));
        assert!(err.to_string().contains("\"abc\""));

        let err = BindError::ArrayLength {
            key: "ids".into(),
            target: "[i32; 3]",
            expected: 3,
            actual: 2,
        };
        assert!(err.to_string().contains("BIND-030"));
    }

    #[test]
    fn kinds_follow_code_ranges() {
        assert_eq!(BindError::MissingBody.kind(), ErrorKind::MalformedSource);
        assert_eq!(
            BindError::InvalidDuration {
                value: "x".into(),
                reason: "bad".into()
            }
            .kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            BindError::FileCount {
                key: "docs".into(),
                expected: 2,
                actual: 1
            }
            .kind(),
            ErrorKind::ArityMismatch
        );
        assert_eq!(
            BindError::unsupported("fn()", "no rule").kind(),
            ErrorKind::UnsupportedTarget
        );
        assert_eq!(
            BindError::from(ValidationError::new("validation failed")).kind(),
            ErrorKind::ValidationFailed
        );
    }

    #[test]
    fn every_variant_has_a_suggestion() {
        let errors = [
            BindError::MalformedBody { reason: "x".into() },
            BindError::Multipart { reason: "x".into() },
            BindError::Config { reason: "x".into() },
            BindError::UnknownLocation { name: "Mars/Base".into() },
        ];
        for err in errors {
            assert!(err.fix_suggestion().is_some(), "{err}");
        }
    }

    #[test]
    fn validation_error_display_lists_fields() {
        let err = ValidationError::new("validation failed")
            .field("page", "range", "must be positive")
            .field("size", "required", "missing");
        assert_eq!(
            err.to_string(),
            "validation failed: page (must be positive); size (missing)"
        );
    }
}
