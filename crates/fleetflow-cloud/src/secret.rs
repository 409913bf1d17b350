//! Secret lookup for provider credentials
//!
//! Cluster specs may reference credentials kept outside the record. A
//! [`SecretKeySelector`] resolves one named field of such a reference.
//! Resolved values are never logged.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reference to a secret holding credential fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretReference {
    pub namespace: String,
    pub name: String,
}

impl SecretReference {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for SecretReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Resolves a single key of a referenced secret
#[async_trait]
pub trait SecretKeySelector: Send + Sync {
    async fn get(&self, reference: &SecretReference, key: &str) -> Result<String>;
}

/// In-memory secret selector
#[derive(Debug, Clone, Default)]
pub struct MemorySecretSelector {
    secrets: HashMap<SecretReference, HashMap<String, String>>,
}

impl MemorySecretSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(
        mut self,
        reference: &SecretReference,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(reference, key, value);
        self
    }

    pub fn insert(
        &mut self,
        reference: &SecretReference,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.secrets
            .entry(reference.clone())
            .or_default()
            .insert(key.into(), value.into());
    }
}

#[async_trait]
impl SecretKeySelector for MemorySecretSelector {
    async fn get(&self, reference: &SecretReference, key: &str) -> Result<String> {
        self.secrets
            .get(reference)
            .and_then(|fields| fields.get(key))
            .cloned()
            .ok_or_else(|| CloudError::SecretNotFound(format!("{} key {}", reference, key)))
    }
}

/// Secret selector backed by environment variables
///
/// `namespace/name` key `clientSecret` with prefix `FLEETFLOW_SECRET` is read
/// from `FLEETFLOW_SECRET_NAMESPACE_NAME_CLIENTSECRET`.
#[derive(Debug, Clone)]
pub struct EnvSecretSelector {
    prefix: String,
}

impl EnvSecretSelector {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, reference: &SecretReference, key: &str) -> String {
        [
            self.prefix.as_str(),
            reference.namespace.as_str(),
            reference.name.as_str(),
            key,
        ]
        .iter()
        .map(|part| env_segment(part))
        .collect::<Vec<_>>()
        .join("_")
    }
}

impl Default for EnvSecretSelector {
    fn default() -> Self {
        Self::new("FLEETFLOW_SECRET")
    }
}

fn env_segment(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl SecretKeySelector for EnvSecretSelector {
    async fn get(&self, reference: &SecretReference, key: &str) -> Result<String> {
        let var = self.var_name(reference, key);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(CloudError::SecretNotFound(format!(
                "{} key {} ({} is not set)",
                reference, key, var
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_selector() {
        let reference = SecretReference::new("kube-system", "azure-creds");
        let selector = MemorySecretSelector::new().with_value(&reference, "clientID", "abc");

        assert_eq!(selector.get(&reference, "clientID").await.unwrap(), "abc");
        assert!(matches!(
            selector.get(&reference, "clientSecret").await,
            Err(CloudError::SecretNotFound(_))
        ));
    }

    #[test]
    fn test_env_var_name() {
        let selector = EnvSecretSelector::default();
        let reference = SecretReference::new("kube-system", "azure-creds");
        assert_eq!(
            selector.var_name(&reference, "tenantID"),
            "FLEETFLOW_SECRET_KUBE_SYSTEM_AZURE_CREDS_TENANTID"
        );
    }

    #[test]
    fn test_env_selector_reads_variable() {
        let selector = EnvSecretSelector::default();
        let reference = SecretReference::new("ns", "creds");

        temp_env::with_vars(
            [
                ("FLEETFLOW_SECRET_NS_CREDS_TENANTID", Some("tenant-1")),
                ("FLEETFLOW_SECRET_NS_CREDS_CLIENTID", None),
            ],
            || {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    assert_eq!(
                        selector.get(&reference, "tenantID").await.unwrap(),
                        "tenant-1"
                    );
                    assert!(selector.get(&reference, "clientID").await.is_err());
                });
            },
        );
    }
}
