use std::fmt;
use std::io::Error;

/// Name of the environment variable which contains the deployment environment name.
pub const ENVIRONMENT_ENV_NAME: &str = "ENVIRONMENT";

/// Marker which identifies production deployments.
const PROD_MARKER: &str = "prod";

/// Deployment environment the function runs in.
///
/// The name is free-form (`test`, `staging`, `prod-eu`, ...). It is forwarded verbatim in
/// completion notifications and Sentry events, and any name containing `prod` is treated as
/// a production deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    name: String,
}

impl Environment {
    /// Loads the environment from the `ENVIRONMENT` env variable.
    pub fn load() -> Result<Environment, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the environment through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Environment, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(ENVIRONMENT_ENV_NAME)
            .ok_or_else(|| {
                Error::other(format!(
                    "the `{ENVIRONMENT_ENV_NAME}` environment variable is not set"
                ))
            })?
            .try_into()
    }

    /// Returns the environment name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Returns `true` for production deployments.
    pub fn is_production(&self) -> bool {
        self.name.to_lowercase().contains(PROD_MARKER)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    /// Creates an [`Environment`] from a non-blank name.
    fn try_from(name: String) -> Result<Self, Self::Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::other(format!(
                "the `{ENVIRONMENT_ENV_NAME}` environment variable must not be empty"
            )));
        }

        Ok(Self {
            name: name.to_string(),
        })
    }
}
