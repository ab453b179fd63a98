//! Assume-role trust policies for the Snowflake-generated identities

use crate::config::ProvisioningConfig;
use crate::error::ProvisioningError;
use crate::introspect::IntegrationDescriptor;
use crate::provision::ProvisionedIntegrations;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub const POLICY_VERSION: &str = "2012-10-17";
const ASSUME_ROLE: &str = "sts:AssumeRole";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPolicyDocument {
    pub version: &'static str,
    pub statement: Vec<TrustStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustStatement {
    pub effect: &'static str,
    pub principal: Principal,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<BTreeMap<String, BTreeMap<String, String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Principal {
    Service(Vec<String>),
    #[serde(rename = "AWS")]
    Aws(Vec<String>),
}

impl TrustPolicyDocument {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize trust policy")
    }
}

/// Trust the integration's service principal outright, and its Snowflake IAM
/// user only when it presents the integration's external id.
pub fn build_policy(descriptor: &IntegrationDescriptor) -> TrustPolicyDocument {
    let condition = BTreeMap::from([(
        "StringEquals".to_string(),
        BTreeMap::from([("sts:ExternalId".to_string(), descriptor.external_id.clone())]),
    )]);

    TrustPolicyDocument {
        version: POLICY_VERSION,
        statement: vec![
            TrustStatement {
                effect: "Allow",
                principal: Principal::Service(vec![descriptor.service.clone()]),
                action: ASSUME_ROLE,
                condition: None,
            },
            TrustStatement {
                effect: "Allow",
                principal: Principal::Aws(vec![descriptor.user_arn.clone()]),
                action: ASSUME_ROLE,
                condition: Some(condition),
            },
        ],
    }
}

#[async_trait]
pub trait RoleTrustStore: Send + Sync {
    /// Replace the role's whole assume-role policy with `document`.
    async fn replace_trust_policy(&self, role_name: &str, document: &str) -> Result<()>;
}

/// [`RoleTrustStore`] backed by IAM `UpdateAssumeRolePolicy`.
pub struct IamRoleTrustStore {
    client: aws_sdk_iam::Client,
}

impl IamRoleTrustStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::from_client(aws_sdk_iam::Client::new(sdk_config))
    }

    pub fn from_client(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleTrustStore for IamRoleTrustStore {
    async fn replace_trust_policy(&self, role_name: &str, document: &str) -> Result<()> {
        self.client
            .update_assume_role_policy()
            .role_name(role_name)
            .policy_document(document)
            .send()
            .await
            .with_context(|| format!("UpdateAssumeRolePolicy failed for role {role_name}"))?;
        Ok(())
    }
}

#[instrument(skip(store, document))]
pub async fn apply_policy(
    store: &dyn RoleTrustStore,
    document: &TrustPolicyDocument,
    role_name: &str,
) -> Result<(), ProvisioningError> {
    let policy_error = |source: anyhow::Error| ProvisioningError::PolicyUpdate {
        role: role_name.to_string(),
        source,
    };

    let json = document.to_json().map_err(policy_error)?;
    info!(policy = %json, "Updating assume role policy");

    store
        .replace_trust_policy(role_name, &json)
        .await
        .map_err(policy_error)
}

/// Point the Autopilot role at the storage integration and the API Gateway
/// role at the API integration, in that order.
pub async fn update_trust_policies(
    store: &dyn RoleTrustStore,
    config: &ProvisioningConfig,
    integrations: &ProvisionedIntegrations,
) -> Result<(), ProvisioningError> {
    info!("Updating IAM roles");

    apply_policy(store, &build_policy(&integrations.storage), &config.auto_ml_role_name).await?;
    apply_policy(store, &build_policy(&integrations.api), &config.api_gateway_role_name).await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records `(role, document)` pairs; fails for `fail_role`.
    #[derive(Clone, Default)]
    pub struct FakeRoles {
        pub updates: Arc<Mutex<Vec<(String, String)>>>,
        pub fail_role: Option<String>,
    }

    impl FakeRoles {
        pub fn updates(&self) -> Vec<(String, String)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RoleTrustStore for FakeRoles {
        async fn replace_trust_policy(&self, role_name: &str, document: &str) -> Result<()> {
            if self.fail_role.as_deref() == Some(role_name) {
                anyhow::bail!("AccessDenied: not authorized to perform iam:UpdateAssumeRolePolicy");
            }
            self.updates
                .lock()
                .unwrap()
                .push((role_name.to_string(), document.to_string()));
            Ok(())
        }
    }
}
