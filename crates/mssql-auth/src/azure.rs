//! Azure Entra ID token providers.
//!
//! Builds [`TokenProvider`] closures on top of `azure_identity`, so the
//! rest of the stack only ever sees the provider abstraction.

use std::sync::Arc;

use azure_core::credentials::TokenCredential;
use azure_identity::{ClientSecretCredential, ManagedIdentityCredential};
use chrono::{TimeZone, Utc};

use crate::error::AuthError;
use crate::strategy::TokenProvider;
use crate::token::AccessToken;

/// Token audience for Azure SQL Database.
const AZURE_SQL_SCOPE: &str = "https://database.windows.net/.default";

fn provider_from_credential(
    credential: Arc<dyn TokenCredential>,
) -> TokenProvider {
    Arc::new(move || {
        let credential = Arc::clone(&credential);
        Box::pin(async move {
            let token = credential
                .get_token(&[AZURE_SQL_SCOPE], None)
                .await
                .map_err(|e| AuthError::Provider(e.to_string()))?;

            let expires_at = Utc
                .timestamp_opt(token.expires_on.unix_timestamp(), 0)
                .single()
                .ok_or_else(|| AuthError::Provider("invalid token expiry".into()))?;

            Ok(AccessToken::issued(
                token.token.secret().to_string(),
                expires_at,
                AZURE_SQL_SCOPE,
            ))
        })
    })
}

/// Provider backed by an Entra ID service principal (client secret flow).
pub fn service_principal_provider(
    tenant_id: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenProvider, AuthError> {
    let credential = ClientSecretCredential::new(
        tenant_id,
        client_id.to_string(),
        client_secret.to_string().into(),
        None,
    )
    .map_err(|e| AuthError::Configuration(e.to_string()))?;

    Ok(provider_from_credential(credential))
}

/// Provider backed by the ambient managed identity.
pub fn managed_identity_provider() -> Result<TokenProvider, AuthError> {
    let credential = ManagedIdentityCredential::new(None)
        .map_err(|e| AuthError::Configuration(e.to_string()))?;

    Ok(provider_from_credential(credential))
}

/// Provider from the conventional environment variables
/// (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`).
pub fn environment_provider() -> Result<TokenProvider, AuthError> {
    let fetch = |name: &str| {
        std::env::var(name)
            .map_err(|_| AuthError::MissingCredentials(format!("{name} is not set")))
    };

    let tenant = fetch("AZURE_TENANT_ID")?;
    let client = fetch("AZURE_CLIENT_ID")?;
    let secret = fetch("AZURE_CLIENT_SECRET")?;
    service_principal_provider(&tenant, &client, &secret)
}
