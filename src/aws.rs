//! Shared AWS SDK configuration

use aws_config::BehaviorVersion;
use tokio::sync::OnceCell;

static AWS_CONFIG: OnceCell<aws_config::SdkConfig> = OnceCell::const_new();

/// Load the default credential chain once per process. Warm Lambda
/// invocations reuse it.
pub async fn get_aws_config() -> &'static aws_config::SdkConfig {
    AWS_CONFIG
        .get_or_init(|| async { aws_config::load_defaults(BehaviorVersion::latest()).await })
        .await
}
