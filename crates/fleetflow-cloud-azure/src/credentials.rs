//! Credential resolution for the Azure provider
//!
//! Each credential field comes either from the cloud spec itself or, when the
//! spec leaves it empty, from the referenced secret. Fields are resolved
//! independently so a spec may inline some and reference the rest.

use crate::cluster::AzureCloudSpec;
use crate::error::{AzureError, Result};
use fleetflow_cloud::{SecretKeySelector, SecretReference};

pub const TENANT_ID_KEY: &str = "tenantID";
pub const SUBSCRIPTION_ID_KEY: &str = "subscriptionID";
pub const CLIENT_ID_KEY: &str = "clientID";
pub const CLIENT_SECRET_KEY: &str = "clientSecret";

/// Service principal credentials, resolved per operation and never persisted
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub tenant_id: String,
    pub subscription_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Resolve the credentials for `spec`
pub async fn resolve_credentials(
    spec: &AzureCloudSpec,
    selector: &dyn SecretKeySelector,
) -> Result<Credentials> {
    let reference = spec.credentials_reference.as_ref();

    Ok(Credentials {
        tenant_id: resolve_field(&spec.tenant_id, reference, selector, TENANT_ID_KEY).await?,
        subscription_id: resolve_field(
            &spec.subscription_id,
            reference,
            selector,
            SUBSCRIPTION_ID_KEY,
        )
        .await?,
        client_id: resolve_field(&spec.client_id, reference, selector, CLIENT_ID_KEY).await?,
        client_secret: resolve_field(
            &spec.client_secret,
            reference,
            selector,
            CLIENT_SECRET_KEY,
        )
        .await?,
    })
}

async fn resolve_field(
    inline: &str,
    reference: Option<&SecretReference>,
    selector: &dyn SecretKeySelector,
    key: &str,
) -> Result<String> {
    if !inline.is_empty() {
        return Ok(inline.to_string());
    }

    let reference = reference.ok_or(AzureError::NoCredentials)?;
    tracing::debug!(reference = %reference, key, "Resolving credential from secret");
    Ok(selector.get(reference, key).await?)
}
