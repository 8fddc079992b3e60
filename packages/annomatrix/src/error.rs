//! Error taxonomy for the matrix layer.

use smol_str::SmolStr;
use thiserror::Error;

use crate::types::Field;

pub type Result<T, E = AnnoError> = std::result::Result<T, E>;

/// Errors raised by the column store, the where-cache, the view chain and the
/// crossfilter.
///
/// `Clone` so that one coalesced fetch failure can be handed to every caller
/// waiting on it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnnoError {
    /// The field name is not one of `obs`, `var`, `X`.
    #[error("unknown field: {0}")]
    UnknownField(SmolStr),

    /// The column label is not known to the schema or store.
    #[error("unknown column '{column}'{}", field.map(|f| format!(" in {f}")).unwrap_or_default())]
    UnknownColumn {
        field: Option<Field>,
        column: SmolStr,
    },

    /// A categorical column does not carry the named category.
    #[error("unknown category '{category}' in column '{column}'")]
    UnknownCategory { column: SmolStr, category: SmolStr },

    /// An add or rename would produce two columns (or categories) with the same label.
    #[error("duplicate label: {0}")]
    DuplicateLabel(SmolStr),

    /// Mutation attempted on a column the schema marks read-only.
    #[error("column '{0}' is read-only")]
    ReadOnlyColumn(SmolStr),

    /// A value or column does not match the expected data type.
    #[error("type mismatch for '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: SmolStr,
        expected: String,
        got: String,
    },

    /// The remote source failed or returned a malformed response. Nothing
    /// was merged; the same fetch may be retried.
    #[error("remote fetch failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RemoteFetch { status: Option<u16>, message: String },

    /// A structural rule was broken, such as stacking two clip views.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl AnnoError {
    pub fn unknown_column(field: Field, column: impl Into<SmolStr>) -> Self {
        AnnoError::UnknownColumn {
            field: Some(field),
            column: column.into(),
        }
    }

    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        AnnoError::RemoteFetch {
            status,
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        AnnoError::InvariantViolation(message.into())
    }

    /// Whether the failure came from the network and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnnoError::RemoteFetch { .. })
    }
}
