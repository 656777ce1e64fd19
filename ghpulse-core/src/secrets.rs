//! Secrets management for ghpulse
//!
//! The GitHub token is kept out of the main config file. It is read from
//! `~/.config/ghpulse/secrets.toml`, which must have restrictive permissions
//! (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variables (GITHUB_TOKEN, then GH_TOKEN)
//! 2. Secrets file (~/.config/ghpulse/secrets.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Environment variables checked for a token, in order
const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Secrets structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// GitHub configuration
    pub github: GitHubSecrets,
}

/// GitHub-related secrets
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// GitHub Personal Access Token
    pub token: Option<String>,
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns default (empty) secrets if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_secrets_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load secrets from a specific file with permission checking
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        if let Some(ref mut token) = secrets.github.token {
            *token = token.trim().to_string();
        }

        Ok(secrets)
    }

    /// Get the default secrets file path
    ///
    /// Returns `~/.config/ghpulse/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ghpulse").join("secrets.toml"))
    }

    /// Get GitHub token with environment variable override
    pub fn github_token(&self) -> Option<String> {
        for var in TOKEN_ENV_VARS {
            if let Ok(token) = std::env::var(var) {
                let token = token.trim().to_string();
                if !token.is_empty() {
                    debug!(var, "Using GitHub token from environment");
                    return Some(token);
                }
            }
        }

        self.github
            .token
            .as_ref()
            .filter(|token| !token.is_empty())
            .map(|token| {
                debug!("Using GitHub token from secrets file");
                token.clone()
            })
    }
}
