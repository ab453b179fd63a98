//! The custom resource lifecycle: one invocation, one report

use crate::config::ProvisioningConfig;
use crate::error::ProvisioningError;
use crate::event::{InvocationContext, InvocationRequest, RequestType};
use crate::policy::{RoleTrustStore, update_trust_policies};
use crate::provision::provision_integrations;
use crate::response::{CallbackResponse, ResponseSender, ResponseStatus};
use crate::secrets::{SecretStore, resolve_secret};
use crate::warehouse::WarehouseConnector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Everything an invocation talks to.
#[derive(Clone)]
pub struct Provisioner {
    pub env: EnvLookup,
    pub secrets: Arc<dyn SecretStore>,
    pub warehouse: Arc<dyn WarehouseConnector>,
    pub roles: Arc<dyn RoleTrustStore>,
    pub responder: Arc<dyn ResponseSender>,
}

impl Provisioner {
    /// Run one invocation to its single report.
    ///
    /// Returns the status that was delivered. The only error returned is
    /// [`ProvisioningError::CallbackDelivery`]; every other failure has been
    /// reported to CloudFormation as `FAILED`.
    pub async fn handle(
        &self,
        request: &InvocationRequest,
        context: &InvocationContext,
    ) -> Result<ResponseStatus, ProvisioningError> {
        let span = info_span!(
            "invocation",
            request_type = ?request.request_type,
            request_id = %request.request_id,
            stack_id = %request.stack_id,
            log_stream = %context.log_stream_name,
        );

        async move {
            let (status, data) = match self.run(request).await {
                Ok(data) => (ResponseStatus::Success, data),
                Err(err) => {
                    error!(error = %err, details = ?err, "Invocation failed");
                    (ResponseStatus::Failed, err.response_data())
                }
            };

            let response = CallbackResponse::new(status, request, context, data);
            self.responder.send(&request.response_url, &response).await?;

            info!(status = ?status, "Invocation complete");
            Ok(status)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &InvocationRequest,
    ) -> Result<BTreeMap<String, String>, ProvisioningError> {
        let config = ProvisioningConfig::from_lookup(|key| (self.env)(key))?;
        config.log_summary();

        if request.request_type == RequestType::Delete {
            info!("No action for Delete. Exiting.");
            return Ok(BTreeMap::new());
        }

        let credential =
            resolve_secret(self.secrets.as_ref(), &config.region, &config.secret_id).await?;

        let integrations =
            provision_integrations(self.warehouse.as_ref(), &credential, &config).await?;
        drop(credential);

        update_trust_policies(self.roles.as_ref(), &config, &integrations).await?;

        info!("Success");
        Ok(BTreeMap::from([(
            "Success".to_string(),
            "Snowflake resources created.".to_string(),
        )]))
    }
}
