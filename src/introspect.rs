//! Reads the Snowflake-generated IAM identity back out of an integration

use crate::error::ProvisioningError;
use crate::warehouse::{Row, WarehouseSession};
use anyhow::Result;
use tracing::{info, instrument};

pub const SAGEMAKER_SERVICE_PRINCIPAL: &str = "sagemaker.amazonaws.com";
pub const API_GATEWAY_SERVICE_PRINCIPAL: &str = "apigateway.amazonaws.com";

const PROPERTY_COLUMN: usize = 0;
const VALUE_COLUMN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationKind {
    Storage,
    Api,
}

impl IntegrationKind {
    pub fn user_arn_property(&self) -> &'static str {
        match self {
            Self::Storage => "STORAGE_AWS_IAM_USER_ARN",
            Self::Api => "API_AWS_IAM_USER_ARN",
        }
    }

    pub fn external_id_property(&self) -> &'static str {
        match self {
            Self::Storage => "STORAGE_AWS_EXTERNAL_ID",
            Self::Api => "API_AWS_EXTERNAL_ID",
        }
    }

    /// The AWS service that assumes the role on the integration's behalf.
    pub fn service_principal(&self) -> &'static str {
        match self {
            Self::Storage => SAGEMAKER_SERVICE_PRINCIPAL,
            Self::Api => API_GATEWAY_SERVICE_PRINCIPAL,
        }
    }
}

/// Who may assume a role for one integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationDescriptor {
    pub service: String,
    pub user_arn: String,
    pub external_id: String,
}

impl IntegrationDescriptor {
    /// Extract the descriptor from `describe integration` output.
    ///
    /// The property name is in the first column and its value in the third.
    /// The first row carrying a property wins. A property that is missing or
    /// blank is an error.
    pub fn from_rows(
        integration: &str,
        kind: IntegrationKind,
        rows: &[Row],
    ) -> Result<Self, ProvisioningError> {
        let find = |property: &'static str| {
            rows.iter()
                .find(|row| {
                    row.get(PROPERTY_COLUMN)
                        .and_then(|cell| cell.as_deref())
                        == Some(property)
                })
                .and_then(|row| row.get(VALUE_COLUMN).cloned().flatten())
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ProvisioningError::MissingIntegrationAttribute {
                    integration: integration.to_string(),
                    attribute: property,
                })
        };

        Ok(Self {
            service: kind.service_principal().to_string(),
            user_arn: find(kind.user_arn_property())?,
            external_id: find(kind.external_id_property())?,
        })
    }
}

pub async fn describe_integration(
    session: &mut dyn WarehouseSession,
    name: &str,
) -> Result<Vec<Row>> {
    session.query(&format!("describe integration \"{name}\"")).await
}

/// Describe an integration and extract its descriptor.
#[instrument(skip(session))]
pub async fn introspect(
    session: &mut dyn WarehouseSession,
    name: &str,
    kind: IntegrationKind,
) -> Result<IntegrationDescriptor> {
    info!("Describing integration");
    let rows = describe_integration(session, name).await?;
    let descriptor = IntegrationDescriptor::from_rows(name, kind, &rows)?;
    info!(user_arn = %descriptor.user_arn, "Found integration identity");
    Ok(descriptor)
}
