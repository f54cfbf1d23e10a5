//! Error types for the offsite library
//!
//! This module defines all error types that can occur during backup and
//! retrieval operations. Errors are designed to be informative and actionable,
//! carrying the offending location and stage so a failed run can be remediated
//! by hand.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the offsite library
pub type Result<T> = std::result::Result<T, OffsiteError>;

/// Main error type for all offsite operations
#[derive(Debug, Error)]
pub enum OffsiteError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// Missing credentials, missing input files or invalid flag combinations
    #[error("Configuration error: {0}")]
    Config(String),

    /// Compression, restore or artifact-cleanup failures
    #[error("Archive error for {path:?}: {message}")]
    Archive {
        /// Location or artifact the stage was working on
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Key derivation, sealing or unsealing failures
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Remote store upload/download failures
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Manifest schema violations or persistence failures
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// A cancellation signal was observed between locations
    #[error("Operation cancelled")]
    Cancelled,
}

// The csv and reqwest error types surface through the stages that own them.
impl From<csv::Error> for OffsiteError {
    fn from(err: csv::Error) -> Self {
        OffsiteError::Manifest(err.to_string())
    }
}

impl From<reqwest::Error> for OffsiteError {
    fn from(err: reqwest::Error) -> Self {
        OffsiteError::Transfer(err.to_string())
    }
}

impl OffsiteError {
    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        OffsiteError::Config(msg.into())
    }

    /// Create an archive error for a specific path
    pub fn archive(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        OffsiteError::Archive {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an encryption error with a custom message
    pub fn encryption(msg: impl Into<String>) -> Self {
        OffsiteError::Encryption(msg.into())
    }

    /// Create a transfer error with a custom message
    pub fn transfer(msg: impl Into<String>) -> Self {
        OffsiteError::Transfer(msg.into())
    }

    /// Create a manifest error with a custom message
    pub fn manifest(msg: impl Into<String>) -> Self {
        OffsiteError::Manifest(msg.into())
    }

    /// Name of the pipeline stage this error belongs to, for log context
    pub fn stage(&self) -> &'static str {
        match self {
            OffsiteError::Config(_) => "config",
            OffsiteError::Archive { .. } => "archive",
            OffsiteError::Encryption(_) => "encryption",
            OffsiteError::Transfer(_) => "transfer",
            OffsiteError::Manifest(_) => "manifest",
            OffsiteError::Cancelled => "cancelled",
            OffsiteError::Io(_) | OffsiteError::WalkDir(_) => "io",
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            OffsiteError::Config(msg) => {
                format!("{}. Check the environment file and command-line flags.", msg)
            }
            OffsiteError::Transfer(msg) => {
                format!(
                    "{}. Local artifacts were kept on disk so the upload can be retried by hand.",
                    msg
                )
            }
            OffsiteError::Encryption(msg) if msg.contains("password") => {
                format!("{}. Verify the PASSWORD environment variable.", msg)
            }
            _ => self.to_string(),
        }
    }
}
