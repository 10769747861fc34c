//! Shared AWS SDK configuration loading.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use tracing::debug;

use crate::config::AwsConfig;

/// Load an [`SdkConfig`] for the configured region.
///
/// Static credentials from config win; otherwise the default provider chain
/// (env, profile, container role, IMDS) is used.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(aws.region.clone()));

    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        let creds = Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            "craft-static",
        );
        loader = loader.credentials_provider(creds);
    }

    if let Some(endpoint) = aws.endpoint() {
        debug!(endpoint = %endpoint, "Using AWS endpoint override");
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}
