//! Snowflake connection credentials stored in AWS Secrets Manager

use crate::error::ProvisioningError;
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::config::Region;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, info, instrument};

/// Raw secret as returned by the store.
#[derive(Debug)]
pub enum SecretValue {
    /// The `SecretString` value, redacted from `Debug`.
    Text(SecretString),
    /// The secret only has a `SecretBinary` value.
    Binary,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret_value(
        &self,
        region: &str,
        secret_id: &str,
    ) -> Result<SecretValue, ProvisioningError>;
}

/// Snowflake login material. Read once per invocation and never logged.
#[derive(Debug)]
pub struct CredentialSecret {
    pub account_id: String,
    pub username: String,
    pub password: SecretString,
}

#[derive(Deserialize)]
struct SecretPayload {
    accountid: String,
    username: String,
    password: String,
}

/// Fetch the secret and decode it into Snowflake credentials.
#[instrument(skip(store))]
pub async fn resolve_secret(
    store: &dyn SecretStore,
    region: &str,
    secret_id: &str,
) -> Result<CredentialSecret, ProvisioningError> {
    info!("Getting secret information");

    let format_error = |reason: String| ProvisioningError::SecretFormat {
        secret_id: secret_id.to_string(),
        reason,
    };

    let text = match store.get_secret_value(region, secret_id).await? {
        SecretValue::Text(text) => text,
        SecretValue::Binary => {
            error!("The secret is not in string mode");
            return Err(format_error("secret has no SecretString".to_string()));
        }
    };

    // serde_json messages can quote the offending value, so keep only its position.
    let payload: SecretPayload = serde_json::from_str(text.expose_secret()).map_err(|e| {
        format_error(format!(
            "{:?} error at line {} column {}",
            e.classify(),
            e.line(),
            e.column()
        ))
    })?;

    Ok(CredentialSecret {
        account_id: payload.accountid,
        username: payload.username,
        password: SecretString::from(payload.password),
    })
}

/// [`SecretStore`] backed by AWS Secrets Manager.
pub struct SecretsManagerStore {
    config: aws_sdk_secretsmanager::Config,
}

impl SecretsManagerStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::from_conf(aws_sdk_secretsmanager::Config::new(sdk_config))
    }

    pub fn from_conf(config: aws_sdk_secretsmanager::Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn get_secret_value(
        &self,
        region: &str,
        secret_id: &str,
    ) -> Result<SecretValue, ProvisioningError> {
        let config = self
            .config
            .to_builder()
            .region(Region::new(region.to_string()))
            .build();
        let client = Client::from_conf(config);

        match client.get_secret_value().secret_id(secret_id).send().await {
            Ok(output) => Ok(match output.secret_string() {
                Some(text) => SecretValue::Text(SecretString::from(text)),
                None => SecretValue::Binary,
            }),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());

                if not_found {
                    error!(secret_id = %secret_id, "The requested secret was not found");
                    Err(ProvisioningError::SecretNotFound {
                        secret_id: secret_id.to_string(),
                    })
                } else {
                    Err(ProvisioningError::SecretStore {
                        secret_id: secret_id.to_string(),
                        source: anyhow::Error::new(err),
                    })
                }
            }
        }
    }
}
