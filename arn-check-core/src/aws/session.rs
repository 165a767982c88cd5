use crate::aws::{
    iam_client::AwsIamClient, s3_client::AwsS3Client, sts::caller_account_id, IdentityApi,
    StorageApi,
};
use crate::errors::{AuditError, Result};
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_sts::Client as StsClient;
use derive_new::new;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Clients scoped to one account, as resolved from a profile
#[derive(Clone, new)]
pub struct AccountClients {
    /// account ID of the resolved credentials, when known
    pub account_id: Option<String>,
    /// IAM operations
    pub identity: Arc<dyn IdentityApi>,
    /// S3 operations
    pub storage: Arc<dyn StorageApi>,
}

/// Resolves a profile selector into account-scoped clients.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Build clients for `profile`, failing when its credentials are unusable.
    async fn resolve(&self, profile: &str) -> Result<AccountClients>;
}

/// Resolves named profiles from the shared AWS config and credentials files.
#[derive(Debug, Clone, Default)]
pub struct AwsSessionProvider {
    region: Option<String>,
    timeout: Option<Duration>,
}

impl AwsSessionProvider {
    /// Provider with an optional region override and credential-check timeout.
    pub fn new(region: Option<String>, timeout: Option<Duration>) -> Self {
        Self { region, timeout }
    }
}

#[async_trait]
impl SessionProvider for AwsSessionProvider {
    async fn resolve(&self, profile: &str) -> Result<AccountClients> {
        // Load AWS configuration for the named profile.
        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).profile_name(profile);
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let config = loader.load().await;

        let sts_client = StsClient::new(&config);
        let lookup = caller_account_id(&sts_client);
        let account_id = match self.timeout {
            Some(timeout) => crate::aws::timed(timeout, "GetCallerIdentity", profile, lookup).await,
            None => lookup.await,
        }
        .map_err(|e| AuditError::session_with_source(profile, "credentials check failed", e))?;

        debug!(
            "Resolved profile '{}' to account {} (region {:?})",
            profile,
            account_id,
            config.region()
        );

        Ok(AccountClients::new(
            Some(account_id),
            Arc::new(AwsIamClient::new(IamClient::new(&config))),
            Arc::new(AwsS3Client::new(&config)),
        ))
    }
}
