use thiserror::Error;

/// Why a single field of a source row could not be converted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("missing value for '{column}'")]
    Missing { column: &'static str },

    #[error("invalid DateTime format for '{column}': '{value}'")]
    InvalidTimestamp { column: &'static str, value: String },

    #[error("'{column}' value '{value}' does not exist in US Eastern time (daylight-saving gap)")]
    NonexistentLocalTime { column: &'static str, value: String },

    #[error("'{column}' value '{value}' is not a valid {expected}")]
    InvalidNumber {
        column: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("'{column}' value '{value}' must not be negative")]
    Negative { column: &'static str, value: String },
}

/// A source row that was discarded, with enough context for a diagnostic
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {cause} (row: {raw})")]
pub struct RowError {
    pub line: u64,
    pub raw: String,
    pub cause: RowErrorCause,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowErrorCause {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("malformed CSV row: {0}")]
    Malformed(String),
}
