use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use secrecy::SecretString;

use crate::bail;
use crate::error::{BqGcsResult, ErrorKind};
use crate::secrets::SecretStore;

#[derive(Debug, Default)]
struct Inner {
    secrets: HashMap<(String, String), String>,
    access_count: usize,
}

/// [`SecretStore`] holding secrets in memory and counting accesses.
///
/// Every version of a secret resolves to its current value.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, project: &str, name: &str, value: &str) -> Self {
        self.set_secret(project, name, value);
        self
    }

    pub fn set_secret(&self, project: &str, name: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .secrets
            .insert((project.to_string(), name.to_string()), value.to_string());
    }

    /// Returns the number of accesses, including failed ones.
    pub fn access_count(&self) -> usize {
        self.inner.lock().unwrap().access_count
    }
}

impl SecretStore for MemorySecretStore {
    async fn access_secret(
        &self,
        name: &str,
        project: &str,
        version: &str,
    ) -> BqGcsResult<SecretString> {
        let value = {
            let mut inner = self.inner.lock().unwrap();
            inner.access_count += 1;
            inner
                .secrets
                .get(&(project.to_string(), name.to_string()))
                .cloned()
        };

        match value {
            Some(value) => Ok(SecretString::new(value)),
            None => bail!(
                ErrorKind::SecretAccessFailed,
                "Secret could not be accessed",
                format!("projects/{project}/secrets/{name}/versions/{version}")
            ),
        }
    }
}
