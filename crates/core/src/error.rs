use crate::models::RecordId;
use crate::rules::RuleId;
use thiserror::Error;

/// Rejection of an admin rule edit. Nothing is persisted when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("whitespace is not allowed in the rule name '{0}'")]
    WhitespaceInName(String),
    #[error("the name '{0}' is already used")]
    DuplicateName(String),
    #[error("the {field} value '{value}' is already configured")]
    DuplicateValue { field: &'static str, value: String },
    #[error("the user '{0}' does not exist")]
    UnknownUser(String),
    #[error("the filename pattern '{pattern}' is invalid: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField(field) => field,
            ValidationError::WhitespaceInName(_) | ValidationError::DuplicateName(_) => "name",
            ValidationError::DuplicateValue { field, .. } => field,
            ValidationError::UnknownUser(_) => "cc",
            ValidationError::InvalidPattern { .. } => "filename",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            ValidationError::MissingField(_) => None,
            ValidationError::WhitespaceInName(v)
            | ValidationError::DuplicateName(v)
            | ValidationError::UnknownUser(v) => Some(v),
            ValidationError::DuplicateValue { value, .. } => Some(value),
            ValidationError::InvalidPattern { pattern, .. } => Some(pattern),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record #{0} not found")]
    RecordNotFound(RecordId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unknown rule id: {0}")]
    UnknownRule(RuleId),
    #[error(transparent)]
    Store(#[from] StoreError),
}
