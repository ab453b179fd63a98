//! CloudFormation custom resource invocation payloads

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// The custom resource request as delivered by CloudFormation.
///
/// Only the fields the handler echoes back or branches on are kept. Every
/// other key, including `ResourceProperties` and `PhysicalResourceId`, is
/// ignored: all inputs come from the function's environment and the physical
/// id reported back is always the current log stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationRequest {
    pub request_type: RequestType,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
}

/// Per-invocation facts taken from the Lambda context.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub log_stream_name: String,
}

impl From<&lambda_runtime::Context> for InvocationContext {
    fn from(context: &lambda_runtime::Context) -> Self {
        Self {
            log_stream_name: context.env_config.log_stream.clone(),
        }
    }
}
