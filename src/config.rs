//! Credential loading for offsite
//!
//! Credentials are resolved once at startup from the process environment,
//! which is itself populated from a simple `KEY=VALUE` file. They are
//! read-only for the remainder of the process lifetime and threaded through
//! the pipeline explicitly, never read from globals mid-run.

use std::env;
use std::path::Path;

use tracing::debug;

use crate::error::{OffsiteError, Result};

/// Environment variable naming the remote store account.
pub const ENV_CLOUD_NAME: &str = "CLOUD_NAME";
/// Environment variable naming the remote store API key.
pub const ENV_API_KEY: &str = "API_KEY";
/// Environment variable naming the remote store API secret.
pub const ENV_API_SECRET: &str = "API_SECRET";
/// Environment variable naming the encryption password.
pub const ENV_PASSWORD: &str = "PASSWORD";

/// Process-wide configuration resolved once at startup
///
/// Holds the remote-store identity and the encryption password. All four
/// values are required before any pipeline stage runs, even for runs that
/// do not encrypt, so a misconfigured environment fails up front rather
/// than mid-pipeline.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Remote store account name
    pub cloud_name: String,
    /// Remote store API key
    pub api_key: String,
    /// Remote store API secret
    pub api_secret: String,
    /// Password the encryption key is derived from
    pub password: String,
}

impl Credentials {
    /// Resolve credentials from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`OffsiteError::Config`] naming the first missing variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            cloud_name: require_var(ENV_CLOUD_NAME)?,
            api_key: require_var(ENV_API_KEY)?,
            api_secret: require_var(ENV_API_SECRET)?,
            password: require_var(ENV_PASSWORD)?,
        })
    }
}

fn require_var(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| OffsiteError::config(format!("missing environment variable {}", name)))
}

/// Populate the process environment from a `KEY=VALUE` file
///
/// Variables already present in the environment are left untouched, so the
/// file only fills gaps. A missing or unreadable file is a fatal
/// [`OffsiteError::Config`]; callers that treat the default `.env` as
/// optional should check for the file first.
pub fn load_env_file(path: &Path) -> Result<()> {
    dotenvy::from_path(path).map_err(|e| {
        OffsiteError::config(format!("cannot read environment file {:?}: {}", path, e))
    })?;
    debug!("Populated environment from {:?}", path);
    Ok(())
}
