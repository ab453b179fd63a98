//! Creates the Snowflake integrations and external functions
//!
//! Every statement uses `create or replace`, so replaying an invocation with
//! the same configuration converges on the same objects.

use crate::config::ProvisioningConfig;
use crate::error::ProvisioningError;
use crate::functions::TemplateValues;
use crate::introspect::{IntegrationDescriptor, IntegrationKind, introspect};
use crate::secrets::CredentialSecret;
use crate::warehouse::{WarehouseConnector, WarehouseSession, with_session};
use anyhow::Result;
use tracing::{info, instrument};

/// Identities Snowflake generated for the two integrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedIntegrations {
    pub storage: IntegrationDescriptor,
    pub api: IntegrationDescriptor,
}

pub fn storage_integration_sql(name: &str, role_arn: &str, bucket: &str) -> String {
    format!(
        "create or replace storage integration \"{name}\"\n\
         type = external_stage\n\
         storage_provider = s3\n\
         enabled = true\n\
         storage_aws_role_arn = '{role_arn}'\n\
         storage_allowed_locations = ('s3://{bucket}')"
    )
}

pub fn api_integration_sql(name: &str, role_arn: &str, base_url: &str) -> String {
    format!(
        "create or replace api integration \"{name}\"\n\
         api_provider = aws_api_gateway\n\
         api_aws_role_arn = '{role_arn}'\n\
         api_allowed_prefixes = ('{base_url}')\n\
         enabled = true"
    )
}

/// The full ordered statement list for one configuration.
pub fn provisioning_statements(config: &ProvisioningConfig) -> Vec<String> {
    let storage_integration = config.storage_integration_name();
    let api_integration = config.api_integration_name();

    let mut statements = Vec::new();

    if let Some(database) = &config.database_name {
        statements.push(format!("use database {database}"));
    }
    if let Some(schema) = &config.schema_name {
        statements.push(format!("use schema {schema}"));
    }

    statements.push(storage_integration_sql(
        &storage_integration,
        &config.auto_ml_role_arn,
        &config.s3_bucket_name,
    ));
    statements.push(api_integration_sql(
        &api_integration,
        &config.api_gateway_role_arn,
        &config.api_gateway_url,
    ));

    let values = TemplateValues {
        output_bucket: &config.s3_bucket_name,
        kms_key_arn: config.kms_key_arn.as_deref().unwrap_or_default(),
        snowflake_role: &config.snowflake_role,
        secret_arn: &config.secret_id,
        storage_integration: &storage_integration,
        role_arn: &config.auto_ml_role_arn,
    };

    for function in config.catalog.functions() {
        statements.extend(function.statements(
            &api_integration,
            &config.api_gateway_url,
            &values,
        ));
    }

    statements
}

/// Run the statements, then describe both integrations, in one session.
#[instrument(skip_all)]
pub async fn provision_in_session(
    session: &mut dyn WarehouseSession,
    config: &ProvisioningConfig,
) -> Result<ProvisionedIntegrations> {
    let statements = provisioning_statements(config);
    info!(
        storage_integration = %config.storage_integration_name(),
        api_integration = %config.api_integration_name(),
        external_functions = config.catalog.functions().len(),
        statements = statements.len(),
        "Creating Snowflake resources"
    );

    for statement in &statements {
        session.execute(statement).await?;
    }

    let storage = introspect(
        session,
        &config.storage_integration_name(),
        IntegrationKind::Storage,
    )
    .await?;
    let api = introspect(session, &config.api_integration_name(), IntegrationKind::Api).await?;

    Ok(ProvisionedIntegrations { storage, api })
}

/// The whole Snowflake phase: connect, provision, describe, disconnect.
///
/// The session is closed before this returns, whatever the outcome.
pub async fn provision_integrations(
    connector: &dyn WarehouseConnector,
    credential: &CredentialSecret,
    config: &ProvisioningConfig,
) -> Result<ProvisionedIntegrations, ProvisioningError> {
    with_session(connector, credential, &config.snowflake_role, async |session| {
        provision_in_session(session, config).await
    })
    .await
    .map_err(|err| match err.downcast::<ProvisioningError>() {
        Ok(err) => err,
        Err(err) => ProvisioningError::Warehouse(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{complete_env, load};
    use crate::config::{EXTERNAL_FUNCTION_CATALOG, INTEGRATION_NAMING};
    use crate::warehouse::testing::{FakeWarehouse, credential, row};

    const STORAGE: &str = "AWS_AUTOPILOT_STORAGE_INTEGRATION_autopilot";
    const API: &str = "AWS_AUTOPILOT_API_INTEGRATION_autopilot";

    fn reachable_warehouse() -> FakeWarehouse {
        FakeWarehouse::default()
            .with_integration(
                STORAGE,
                vec![
                    row(&["STORAGE_AWS_IAM_USER_ARN", "String", "arn:aws:iam::111:user/x", ""]),
                    row(&["STORAGE_AWS_EXTERNAL_ID", "String", "ext-123", ""]),
                ],
            )
            .with_integration(
                API,
                vec![
                    row(&["API_AWS_IAM_USER_ARN", "String", "arn:aws:iam::111:user/x", ""]),
                    row(&["API_AWS_EXTERNAL_ID", "String", "ext-456", ""]),
                ],
            )
    }

    #[test]
    fn test_storage_integration_sql() {
        assert_eq!(
            storage_integration_sql("S", "arn:aws:iam::1:role/ml", "bucket"),
            "create or replace storage integration \"S\"\n\
             type = external_stage\n\
             storage_provider = s3\n\
             enabled = true\n\
             storage_aws_role_arn = 'arn:aws:iam::1:role/ml'\n\
             storage_allowed_locations = ('s3://bucket')"
        );
    }

    #[test]
    fn test_api_integration_sql() {
        assert_eq!(
            api_integration_sql("A", "arn:aws:iam::1:role/gw", "https://gw/prod"),
            "create or replace api integration \"A\"\n\
             api_provider = aws_api_gateway\n\
             api_aws_role_arn = 'arn:aws:iam::1:role/gw'\n\
             api_allowed_prefixes = ('https://gw/prod')\n\
             enabled = true"
        );
    }

    #[test]
    fn test_statement_order() -> Result<()> {
        let config = load(&complete_env())?;
        let statements = provisioning_statements(&config);

        assert_eq!(statements[0], "use database ANALYTICS");
        assert_eq!(statements[1], "use schema PUBLIC");
        assert!(statements[2].starts_with(&format!("create or replace storage integration \"{STORAGE}\"")));
        assert!(statements[3].starts_with(&format!("create or replace api integration \"{API}\"")));
        assert!(statements[4].starts_with(
            "create or replace function AWS_AUTOPILOT_DESCRIBE_MODEL_SERIALIZER"
        ));
        assert!(statements.last().unwrap().starts_with(
            "create or replace external function AWS_AUTOPILOT_DESCRIBE_ENDPOINT_CONFIG("
        ));
        // 9 functions x (serializer + deserializer + 1 binding) + 1 extra create-model overload
        assert_eq!(statements.len(), 4 + 9 * 3 + 1);

        assert!(statements[3].contains(
            "api_allowed_prefixes = ('https://abc123.execute-api.us-east-1.amazonaws.com/prod/')"
        ));

        for statement in &statements[4..] {
            assert!(!statement.contains("/prod//"));
            if statement.starts_with("create or replace external function") {
                assert!(statement.contains(&format!("api_integration = \"{API}\"")));
                assert!(statement.contains("'https://abc123.execute-api.us-east-1.amazonaws.com/prod/"));
            }
        }

        Ok(())
    }

    #[test]
    fn test_statements_without_functions() -> Result<()> {
        let mut env = complete_env();
        env.insert(EXTERNAL_FUNCTION_CATALOG, "none".to_string());
        env.insert(INTEGRATION_NAMING, "region".to_string());
        env.remove(crate::config::DATABASE_NAME);
        env.remove(crate::config::SCHEMA_NAME);
        let config = load(&env)?;

        let statements = provisioning_statements(&config);

        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("\"AWS_AUTOPILOT_STORAGE_INTEGRATION_US_EAST_1\""));
        assert!(statements[1].contains("\"AWS_AUTOPILOT_API_INTEGRATION_US_EAST_1\""));

        Ok(())
    }

    #[tokio::test]
    async fn test_provision_integrations() -> Result<()> {
        let config = load(&complete_env())?;
        let warehouse = reachable_warehouse();

        let provisioned = provision_integrations(&warehouse, &credential(), &config).await?;

        assert_eq!(provisioned.storage.service, "sagemaker.amazonaws.com");
        assert_eq!(provisioned.storage.external_id, "ext-123");
        assert_eq!(provisioned.api.service, "apigateway.amazonaws.com");
        assert_eq!(provisioned.api.external_id, "ext-456");

        let statements = warehouse.statements();
        let n = statements.len();
        assert_eq!(statements[n - 2], format!("describe integration \"{STORAGE}\""));
        assert_eq!(statements[n - 1], format!("describe integration \"{API}\""));

        let log = warehouse.log.lock().unwrap();
        assert_eq!(log.opened, 1);
        assert_eq!(log.closed, 1);
        assert_eq!(log.role.as_deref(), Some("AUTOPILOT_ROLE"));

        Ok(())
    }

    #[tokio::test]
    async fn test_replay_issues_identical_statements() -> Result<()> {
        let config = load(&complete_env())?;

        let first = reachable_warehouse();
        provision_integrations(&first, &credential(), &config).await?;
        let second = reachable_warehouse();
        provision_integrations(&second, &credential(), &config).await?;

        assert_eq!(first.statements(), second.statements());
        assert!(
            first
                .statements()
                .iter()
                .filter(|s| !s.starts_with("use ") && !s.starts_with("describe "))
                .all(|s| s.starts_with("create or replace "))
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_failure_stops_sequence_and_closes_session() -> Result<()> {
        let config = load(&complete_env())?;
        let warehouse = reachable_warehouse().failing_on("create or replace api integration");

        let result = provision_integrations(&warehouse, &credential(), &config).await;

        assert!(matches!(result, Err(ProvisioningError::Warehouse(_))));
        let statements = warehouse.statements();
        assert_eq!(statements.len(), 4);
        assert!(statements[2].starts_with("create or replace storage integration"));
        assert_eq!(warehouse.log.lock().unwrap().closed, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_describe_attribute_closes_session() -> Result<()> {
        let config = load(&complete_env())?;
        let warehouse = FakeWarehouse::default().with_integration(
            STORAGE,
            vec![row(&["STORAGE_AWS_IAM_USER_ARN", "String", "arn:aws:iam::111:user/x"])],
        );

        let result = provision_integrations(&warehouse, &credential(), &config).await;

        assert!(matches!(
            result,
            Err(ProvisioningError::MissingIntegrationAttribute { attribute: "STORAGE_AWS_EXTERNAL_ID", .. })
        ));
        assert_eq!(warehouse.log.lock().unwrap().closed, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_connect_failure_is_warehouse_error() -> Result<()> {
        let config = load(&complete_env())?;
        let warehouse = FakeWarehouse {
            fail_connect: true,
            ..Default::default()
        };

        let result = provision_integrations(&warehouse, &credential(), &config).await;

        assert!(matches!(result, Err(ProvisioningError::Warehouse(_))));
        assert!(warehouse.statements().is_empty());

        Ok(())
    }
}
