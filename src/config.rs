//! Handler configuration read from the Lambda environment

use crate::error::ProvisioningError;
use crate::functions::FunctionCatalog;
use std::str::FromStr;
use tracing::info;
use url::Url;

pub const API_GATEWAY_URL: &str = "ApiGatewayURL";
pub const API_GATEWAY_ROLE_ARN: &str = "ApiGatewayRoleARN";
pub const API_GATEWAY_ROLE_NAME: &str = "ApiGatewayRoleName";
pub const AUTO_ML_ROLE_ARN: &str = "AutoMLRoleARN";
pub const AUTO_ML_ROLE_NAME: &str = "AutoMLRoleName";
pub const REGION: &str = "Region";
pub const S3_BUCKET_NAME: &str = "S3BucketName";
pub const SECRET_ARN: &str = "SecretArn";
pub const KMS_KEY_ARN: &str = "KmsKeyArn";
pub const SNOWFLAKE_ROLE: &str = "SnowflakeRole";
pub const STACK_NAME: &str = "StackName";
pub const DATABASE_NAME: &str = "DatabaseName";
pub const SCHEMA_NAME: &str = "SchemaName";
pub const INTEGRATION_NAMING: &str = "IntegrationNaming";
pub const EXTERNAL_FUNCTION_CATALOG: &str = "ExternalFunctionCatalog";

const STORAGE_INTEGRATION_PREFIX: &str = "AWS_AUTOPILOT_STORAGE_INTEGRATION";
const API_INTEGRATION_PREFIX: &str = "AWS_AUTOPILOT_API_INTEGRATION";

/// How integration object names are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationNaming {
    /// Suffix with the stack name, one pair of integrations per stack.
    #[default]
    Stack,
    /// Suffix with the region, one pair of integrations per region.
    Region,
}

impl FromStr for IntegrationNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stack" => Ok(Self::Stack),
            "region" => Ok(Self::Region),
            other => Err(format!("expected `stack` or `region`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub api_gateway_url: String,
    pub api_gateway_role_arn: String,
    pub api_gateway_role_name: String,
    pub auto_ml_role_arn: String,
    pub auto_ml_role_name: String,
    pub region: String,
    pub s3_bucket_name: String,
    pub secret_id: String,
    pub kms_key_arn: Option<String>,
    pub snowflake_role: String,
    pub stack_name: String,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub naming: IntegrationNaming,
    pub catalog: FunctionCatalog,
}

impl ProvisioningConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ProvisioningError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvisioningError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &'static str| {
            optional(key).ok_or(ProvisioningError::ConfigMissing { key })
        };

        let api_gateway_url = validate_gateway_url(&required(API_GATEWAY_URL)?)?;

        let naming = match optional(INTEGRATION_NAMING) {
            Some(value) => value
                .parse()
                .map_err(|reason| ProvisioningError::ConfigInvalid {
                    key: INTEGRATION_NAMING,
                    reason,
                })?,
            None => IntegrationNaming::default(),
        };

        let catalog = match optional(EXTERNAL_FUNCTION_CATALOG) {
            Some(value) => value
                .parse()
                .map_err(|reason| ProvisioningError::ConfigInvalid {
                    key: EXTERNAL_FUNCTION_CATALOG,
                    reason,
                })?,
            None => FunctionCatalog::default(),
        };

        // External functions are created in the session's schema, so the
        // database and schema must be known whenever any are registered.
        let (database_name, schema_name) = if catalog.functions().is_empty() {
            (optional(DATABASE_NAME), optional(SCHEMA_NAME))
        } else {
            (Some(required(DATABASE_NAME)?), Some(required(SCHEMA_NAME)?))
        };

        Ok(Self {
            api_gateway_url,
            api_gateway_role_arn: required(API_GATEWAY_ROLE_ARN)?,
            api_gateway_role_name: required(API_GATEWAY_ROLE_NAME)?,
            auto_ml_role_arn: required(AUTO_ML_ROLE_ARN)?,
            auto_ml_role_name: required(AUTO_ML_ROLE_NAME)?,
            region: required(REGION)?,
            s3_bucket_name: required(S3_BUCKET_NAME)?,
            secret_id: required(SECRET_ARN)?,
            kms_key_arn: optional(KMS_KEY_ARN),
            snowflake_role: required(SNOWFLAKE_ROLE)?,
            stack_name: required(STACK_NAME)?,
            database_name,
            schema_name,
            naming,
            catalog,
        })
    }

    pub fn storage_integration_name(&self) -> String {
        self.integration_name(STORAGE_INTEGRATION_PREFIX)
    }

    pub fn api_integration_name(&self) -> String {
        self.integration_name(API_INTEGRATION_PREFIX)
    }

    fn integration_name(&self, prefix: &str) -> String {
        match self.naming {
            IntegrationNaming::Stack => format!("{}_{}", prefix, self.stack_name),
            IntegrationNaming::Region => format!(
                "{}_{}",
                prefix,
                self.region.to_ascii_uppercase().replace('-', "_")
            ),
        }
    }

    /// Emit the resolved configuration as one structured log line.
    pub fn log_summary(&self) {
        info!(
            api_gateway_url = %self.api_gateway_url,
            api_gateway_role_arn = %self.api_gateway_role_arn,
            api_gateway_role_name = %self.api_gateway_role_name,
            auto_ml_role_arn = %self.auto_ml_role_arn,
            auto_ml_role_name = %self.auto_ml_role_name,
            region = %self.region,
            s3_bucket_name = %self.s3_bucket_name,
            secret_id = %self.secret_id,
            kms_key_arn = self.kms_key_arn.as_deref().unwrap_or(""),
            snowflake_role = %self.snowflake_role,
            stack_name = %self.stack_name,
            database_name = self.database_name.as_deref().unwrap_or(""),
            schema_name = self.schema_name.as_deref().unwrap_or(""),
            naming = ?self.naming,
            catalog = ?self.catalog,
            "Loaded provisioning configuration"
        );
    }
}

fn validate_gateway_url(raw: &str) -> Result<String, ProvisioningError> {
    let invalid = |reason: String| ProvisioningError::ConfigInvalid {
        key: API_GATEWAY_URL,
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }

    Ok(raw.to_string())
}
