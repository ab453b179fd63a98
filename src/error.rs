use std::collections::BTreeMap;
use thiserror::Error;

/// Message placed in the callback `Data` when the Snowflake phase fails.
pub const WAREHOUSE_FAILURE_MESSAGE: &str = "Unable to execute SQL statements in Snowflake";

/// Message placed in the callback `Data` when a trust policy update fails.
pub const POLICY_FAILURE_MESSAGE: &str = "There was a problem updating the assume role policies";

/// Every way an invocation can stop early.
///
/// All variants except [`ProvisioningError::CallbackDelivery`] end in a
/// `FAILED` report. A delivery failure means no report reached CloudFormation
/// at all, so it is returned to the Lambda runtime instead.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("required environment variable {key} is not set")]
    ConfigMissing { key: &'static str },

    #[error("environment variable {key} is invalid: {reason}")]
    ConfigInvalid { key: &'static str, reason: String },

    #[error("secret {secret_id} was not found")]
    SecretNotFound { secret_id: String },

    #[error("secret {secret_id} is not in the expected format: {reason}")]
    SecretFormat { secret_id: String, reason: String },

    #[error("failed to read secret {secret_id}")]
    SecretStore {
        secret_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("problem running SQL statements in Snowflake")]
    Warehouse(#[source] anyhow::Error),

    #[error("integration {integration} did not report {attribute}")]
    MissingIntegrationAttribute {
        integration: String,
        attribute: &'static str,
    },

    #[error("failed to update assume role policy for role {role}")]
    PolicyUpdate {
        role: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to deliver response to CloudFormation")]
    CallbackDelivery(#[source] anyhow::Error),
}

impl ProvisioningError {
    /// The `Data` map reported alongside a `FAILED` status.
    ///
    /// Only fixed strings go here; the details of the error stay in the log.
    pub fn response_data(&self) -> BTreeMap<String, String> {
        let message = match self {
            Self::Warehouse(_) | Self::MissingIntegrationAttribute { .. } => {
                Some(WAREHOUSE_FAILURE_MESSAGE)
            }
            Self::PolicyUpdate { .. } => Some(POLICY_FAILURE_MESSAGE),
            _ => None,
        };

        message
            .map(|m| BTreeMap::from([("Failed".to_string(), m.to_string())]))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_data_is_generic() {
        let err = ProvisioningError::Warehouse(anyhow::anyhow!(
            "SQL compilation error: integration AWS_AUTOPILOT_API_INTEGRATION_prod"
        ));
        let data = err.response_data();

        assert_eq!(data.len(), 1);
        assert_eq!(data["Failed"], WAREHOUSE_FAILURE_MESSAGE);
    }

    #[test]
    fn test_missing_attribute_reports_as_warehouse_failure() {
        let err = ProvisioningError::MissingIntegrationAttribute {
            integration: "AWS_AUTOPILOT_STORAGE_INTEGRATION_prod".to_string(),
            attribute: "STORAGE_AWS_EXTERNAL_ID",
        };

        assert_eq!(err.response_data()["Failed"], WAREHOUSE_FAILURE_MESSAGE);
    }

    #[test]
    fn test_policy_failure_data() {
        let err = ProvisioningError::PolicyUpdate {
            role: "autopilot-role".to_string(),
            source: anyhow::anyhow!("AccessDenied"),
        };

        assert_eq!(err.response_data()["Failed"], POLICY_FAILURE_MESSAGE);
    }

    #[test]
    fn test_secret_failures_report_empty_data() {
        let err = ProvisioningError::SecretNotFound {
            secret_id: "arn:aws:secretsmanager:us-east-1:111:secret:sf".to_string(),
        };
        assert!(err.response_data().is_empty());

        let err = ProvisioningError::ConfigMissing { key: "StackName" };
        assert!(err.response_data().is_empty());
    }
}
