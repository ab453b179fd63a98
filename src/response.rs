//! Reporting the outcome back to CloudFormation

use crate::error::ProvisioningError;
use crate::event::{InvocationContext, InvocationRequest};
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Body PUT to the pre-signed `ResponseURL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub data: BTreeMap<String, String>,
}

impl CallbackResponse {
    pub fn new(
        status: ResponseStatus,
        request: &InvocationRequest,
        context: &InvocationContext,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            status,
            reason: format!(
                "See the details in CloudWatch Log Stream: {}",
                context.log_stream_name
            ),
            physical_resource_id: context.log_stream_name.clone(),
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data,
        }
    }
}

#[async_trait]
pub trait ResponseSender: Send + Sync {
    async fn send(&self, url: &str, response: &CallbackResponse) -> Result<(), ProvisioningError>;
}

/// Delivers the response with a single HTTP PUT and no retry.
#[derive(Debug, Clone, Default)]
pub struct HttpResponseSender {
    client: reqwest::Client,
}

impl HttpResponseSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseSender for HttpResponseSender {
    #[instrument(skip_all, fields(status = ?response.status))]
    async fn send(&self, url: &str, response: &CallbackResponse) -> Result<(), ProvisioningError> {
        let body = serde_json::to_string(response)
            .context("Failed to serialize response")
            .map_err(ProvisioningError::CallbackDelivery)?;

        // The pre-signed S3 URL is signed without a content type, so none is sent.
        let reply = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .context("Failed to send response to CloudFormation")
            .map_err(ProvisioningError::CallbackDelivery)?;

        let status = reply.status();
        if status != reqwest::StatusCode::OK {
            return Err(ProvisioningError::CallbackDelivery(anyhow::anyhow!(
                "Received a non-200 HTTP response ({status}) while sending response to CloudFormation"
            )));
        }

        info!("Response delivered to CloudFormation");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Captures responses instead of sending them.
    #[derive(Clone, Default)]
    pub struct RecordingSender {
        pub sent: Arc<Mutex<Vec<(String, CallbackResponse)>>>,
        pub reject: bool,
    }

    impl RecordingSender {
        pub fn sent(&self) -> Vec<(String, CallbackResponse)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResponseSender for RecordingSender {
        async fn send(&self, url: &str, response: &CallbackResponse) -> Result<(), ProvisioningError> {
            self.sent
                .lock()
                .unwrap()
                .push((url.to_string(), response.clone()));

            if self.reject {
                return Err(ProvisioningError::CallbackDelivery(anyhow::anyhow!(
                    "Received a non-200 HTTP response (403 Forbidden)"
                )));
            }
            Ok(())
        }
    }
}
