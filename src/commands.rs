use crate::aws::get_aws_config;
use crate::event::{InvocationContext, InvocationRequest};
use crate::handler::Provisioner;
use crate::policy::IamRoleTrustStore;
use crate::response::{HttpResponseSender, ResponseStatus};
use crate::secrets::SecretsManagerStore;
use crate::warehouse::SnowflakeConnector;
use anyhow::{Context, Result};
use lambda_runtime::{LambdaEvent, service_fn};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Wire the provisioner to the real AWS, Snowflake and HTTP backends,
/// reading configuration from the process environment.
pub async fn default_provisioner() -> Provisioner {
    let sdk_config = get_aws_config().await;

    Provisioner {
        env: Arc::new(|key: &str| std::env::var(key).ok()),
        secrets: Arc::new(SecretsManagerStore::new(sdk_config)),
        warehouse: Arc::new(SnowflakeConnector),
        roles: Arc::new(IamRoleTrustStore::new(sdk_config)),
        responder: Arc::new(HttpResponseSender::default()),
    }
}

/// Serve invocations until the runtime shuts the function down.
pub async fn serve(provisioner: Provisioner) -> Result<()> {
    lambda_runtime::run(service_fn(move |event: LambdaEvent<InvocationRequest>| {
        let provisioner = provisioner.clone();
        async move {
            let context = InvocationContext::from(&event.context);
            let status = provisioner.handle(&event.payload, &context).await?;
            Ok::<ResponseStatus, lambda_runtime::Error>(status)
        }
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

/// Handle one event from disk, delivering the response to its `ResponseURL`.
#[instrument(skip(provisioner))]
pub async fn invoke(provisioner: &Provisioner, event: &Path, log_stream: &str) -> Result<ResponseStatus> {
    let request = read_event(event)?;
    let context = InvocationContext {
        log_stream_name: log_stream.to_string(),
    };

    Ok(provisioner.handle(&request, &context).await?)
}

fn read_event(path: &Path) -> Result<InvocationRequest> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read event file {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse custom resource event in {}", path.display()))
}
