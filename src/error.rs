//! Error types for the agrovalidate workflow engine
//!
//! Every operation returns a typed [`AgroError`] that names the rule that was
//! violated, so a caller can correct its input and retry. None of these errors
//! is fatal to the engine: a failing request leaves every other validation and
//! field test untouched.

use crate::types::Capability;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum AgroError {
    /// Unknown identifier
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Operation is illegal for the record's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Reviewer is not assigned to the validation it tried to review
    #[error("Reviewer {reviewer} is not assigned to validation {validation}")]
    NotAssigned { reviewer: String, validation: String },

    /// Value out of contract range or missing required key
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// Matcher could not fill one or more capability slots
    #[error("No available reviewer for: {}", format_capabilities(.capabilities))]
    NoCandidate { capabilities: Vec<Capability> },

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl AgroError {
    /// Shorthand for an [`AgroError::InvalidInput`] naming the offending field
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AgroError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`AgroError::NotFound`]
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        AgroError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for the error category
    pub fn code(&self) -> &'static str {
        match self {
            AgroError::NotFound { .. } => "not_found",
            AgroError::InvalidState(_) => "invalid_state",
            AgroError::NotAssigned { .. } => "not_assigned",
            AgroError::InvalidInput { .. } => "invalid_input",
            AgroError::NoCandidate { .. } => "no_candidate",
            AgroError::AlreadyExists(_) => "already_exists",
            AgroError::Database(_) => "database",
            AgroError::Config(_) => "config",
            AgroError::Io(_) => "io",
            AgroError::Serialization(_) => "serialization",
            AgroError::Other(_) => "other",
        }
    }
}

fn format_capabilities(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AgroError>;

/// Convert anyhow::Error to AgroError
impl From<anyhow::Error> for AgroError {
    fn from(err: anyhow::Error) -> Self {
        AgroError::Other(err.to_string())
    }
}

impl From<config::ConfigError> for AgroError {
    fn from(err: config::ConfigError) -> Self {
        AgroError::Config(err.to_string())
    }
}

impl From<rusqlite::Error> for AgroError {
    fn from(err: rusqlite::Error) -> Self {
        AgroError::Database(err.to_string())
    }
}
