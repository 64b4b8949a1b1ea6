//! Bearer credential for the metrics backend

use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Environment variable holding the bearer token
pub const TOKEN_ENV_VAR: &str = "TOKEN";

/// Service account token mounted into the pod
pub const TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Bearer token sent on every metrics query.
///
/// Read once at startup. `Debug` never prints the secret.
#[derive(Clone, Default)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// Resolve the credential: the environment value wins over the file.
    ///
    /// Neither being available yields an empty token; the backend will then
    /// reject queries and passes report the metrics source as unavailable.
    pub fn discover(env_value: Option<String>, token_file: &Path) -> Self {
        if let Some(token) = env_value {
            debug!("Using bearer token from environment");
            return Self::new(token);
        }

        match std::fs::read_to_string(token_file) {
            Ok(content) => {
                debug!(path = %token_file.display(), "Using bearer token from file");
                Self::new(content)
            }
            Err(e) => {
                warn!(
                    path = %token_file.display(),
                    error = %e,
                    "Unable to read bearer token, querying without credentials"
                );
                Self::default()
            }
        }
    }

    /// Resolve from the `TOKEN` variable and the given file
    pub fn from_env(token_file: &Path) -> Self {
        Self::discover(std::env::var(TOKEN_ENV_VAR).ok(), token_file)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("BearerToken(<empty>)")
        } else {
            f.write_str("BearerToken(<redacted>)")
        }
    }
}
