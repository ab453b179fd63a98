use super::{Row, WarehouseConnector, WarehouseSession};
use crate::secrets::CredentialSecret;
use anyhow::{Context, Result};
use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use snowflake_api::{QueryResult, SnowflakeApi};
use tracing::debug;

/// Opens password-authenticated Snowflake sessions with a fixed session role.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnowflakeConnector;

#[async_trait]
impl WarehouseConnector for SnowflakeConnector {
    async fn open(
        &self,
        credential: &CredentialSecret,
        role: &str,
    ) -> Result<Box<dyn WarehouseSession>> {
        let api = SnowflakeApi::with_password_auth(
            &credential.account_id,
            None,
            None,
            None,
            &credential.username,
            Some(role),
            credential.password.expose_secret(),
        )
        .with_context(|| format!("Failed to connect to Snowflake account {}", credential.account_id))?;

        Ok(Box::new(SnowflakeSession { api }))
    }
}

struct SnowflakeSession {
    api: SnowflakeApi,
}

#[async_trait]
impl WarehouseSession for SnowflakeSession {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(statement = %first_line(sql), "Executing statement");
        self.api
            .exec(sql)
            .await
            .with_context(|| format!("Statement failed: {}", first_line(sql)))?;
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        debug!(statement = %first_line(sql), "Running query");
        let result = self
            .api
            .exec(sql)
            .await
            .with_context(|| format!("Query failed: {}", first_line(sql)))?;

        match result {
            QueryResult::Json(json) => json_rows(&json.value),
            QueryResult::Arrow(batches) => arrow_rows(&batches),
            QueryResult::Empty => Ok(Vec::new()),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.api
            .close_session()
            .await
            .context("Failed to close Snowflake session")
    }
}

/// Statements can embed whole function bodies; log only the head.
fn first_line(sql: &str) -> &str {
    sql.trim_start().lines().next().unwrap_or_default()
}

fn json_rows(value: &serde_json::Value) -> Result<Vec<Row>> {
    let rows = value
        .as_array()
        .context("Expected a JSON array of rows")?;

    rows.iter()
        .map(|row| {
            let cells = row.as_array().context("Expected each row to be an array")?;
            Ok(cells
                .iter()
                .map(|cell| match cell {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect())
        })
        .collect()
}

fn arrow_rows(batches: &[RecordBatch]) -> Result<Vec<Row>> {
    let mut rows = Vec::new();

    for batch in batches {
        for index in 0..batch.num_rows() {
            let row = batch
                .columns()
                .iter()
                .map(|column| {
                    if column.is_null(index) {
                        Ok(None)
                    } else {
                        array_value_to_string(column, index).map(Some)
                    }
                })
                .collect::<std::result::Result<Row, _>>()?;
            rows.push(row);
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::StringArray;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_json_rows() -> Result<()> {
        let value = serde_json::json!([
            ["ENABLED", "Boolean", "true", "false"],
            ["STORAGE_AWS_EXTERNAL_ID", "String", "ext-123", null]
        ]);

        let rows = json_rows(&value)?;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0].as_deref(), Some("STORAGE_AWS_EXTERNAL_ID"));
        assert_eq!(rows[1][2].as_deref(), Some("ext-123"));
        assert_eq!(rows[1][3], None);

        Ok(())
    }

    #[test]
    fn test_json_rows_rejects_non_array() {
        assert!(json_rows(&serde_json::json!({"rows": []})).is_err());
        assert!(json_rows(&serde_json::json!(["not a row"])).is_err());
    }

    #[test]
    fn test_arrow_rows() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("property", DataType::Utf8, false),
            Field::new("property_value", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["API_AWS_IAM_USER_ARN", "COMMENT"])),
                Arc::new(StringArray::from(vec![Some("arn:aws:iam::111:user/x"), None])),
            ],
        )?;

        let rows = arrow_rows(&[batch])?;

        assert_eq!(
            rows,
            vec![
                vec![
                    Some("API_AWS_IAM_USER_ARN".to_string()),
                    Some("arn:aws:iam::111:user/x".to_string())
                ],
                vec![Some("COMMENT".to_string()), None],
            ]
        );

        Ok(())
    }

    #[test]
    fn test_first_line() {
        assert_eq!(
            first_line("\n  create or replace function F(EVENT OBJECT)\n returns OBJECT"),
            "create or replace function F(EVENT OBJECT)"
        );
        assert_eq!(first_line(""), "");
    }
}
