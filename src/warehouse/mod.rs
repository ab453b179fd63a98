//! Snowflake session handling
//!
//! The provisioner talks to Snowflake through [`WarehouseConnector`] and
//! [`WarehouseSession`] so the statement sequence can run against an
//! in-memory fake in tests.

mod snowflake;

pub use snowflake::SnowflakeConnector;

use crate::secrets::CredentialSecret;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// One result row; `None` is SQL `NULL`.
pub type Row = Vec<Option<String>>;

#[async_trait]
pub trait WarehouseSession: Send {
    /// Run a statement, discarding any result set.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run a statement and return its rows with every cell rendered as text.
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// End the session. Called exactly once.
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    async fn open(
        &self,
        credential: &CredentialSecret,
        role: &str,
    ) -> Result<Box<dyn WarehouseSession>>;
}

/// Open one session, run `work` in it, and close it on every exit path.
///
/// A failure to close is logged and does not replace the result of `work`.
pub async fn with_session<T, F>(
    connector: &dyn WarehouseConnector,
    credential: &CredentialSecret,
    role: &str,
    work: F,
) -> Result<T>
where
    F: AsyncFnOnce(&mut dyn WarehouseSession) -> Result<T>,
{
    info!("Connecting to Snowflake");
    let mut session = connector.open(credential, role).await?;

    let result = work(session.as_mut()).await;

    match session.close().await {
        Ok(()) => info!("Closed Snowflake session"),
        Err(e) => warn!(error = %e, "Failed to close Snowflake session"),
    }

    result
}
