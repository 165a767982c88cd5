//! AWS SDK integration: client traits, typed error classification, per-profile sessions.

/// IAM client wrapper
pub mod iam_client;

/// S3 client wrapper
pub mod s3_client;

/// per-profile client resolution
pub mod session;

/// sts calls
pub mod sts;

use async_trait::async_trait;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata};
use derive_new::new;
use std::{fmt, future::Future, time::Duration};
use thiserror::Error;

/// Closed set of provider error kinds the pipeline branches on.
///
/// Provider error codes are mapped here once, so nothing downstream ever
/// inspects a raw code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The named resource does not exist (`NoSuchEntity`, `NoSuchBucketPolicy`)
    NotFound,
    /// IAM rejected a policy because a principal could not be resolved
    MalformedPrincipal,
    /// The resource being created already exists
    AlreadyExists,
    /// Anything else: authorization, throttling, timeouts, service faults
    Other,
}

impl ApiErrorKind {
    /// Map a provider error code to a kind.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("NoSuchEntity" | "NoSuchBucketPolicy") => Self::NotFound,
            Some("MalformedPolicyDocument") => Self::MalformedPrincipal,
            Some("EntityAlreadyExists") => Self::AlreadyExists,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::MalformedPrincipal => "malformed principal",
            Self::AlreadyExists => "already exists",
            Self::Other => "unexpected",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone)]
/// AWS Errors from AWS SDK calls
pub enum AwsError {
    #[error("AWS configuration error: {0}")]
    /// config error
    ConfigError(String),
    #[error("{operation} on '{resource}' failed ({kind}): {message}")]
    /// classified error returned by an API call
    Api {
        /// classified kind
        kind: ApiErrorKind,
        /// API operation name, e.g. `GetRole`
        operation: &'static str,
        /// resource the call targeted
        resource: String,
        /// provider message with context
        message: String,
    },
    #[error("{operation} on '{resource}' timed out after {timeout:?}")]
    /// call exceeded the configured timeout
    Timeout {
        /// API operation name
        operation: &'static str,
        /// resource the call targeted
        resource: String,
        /// timeout that elapsed
        timeout: Duration,
    },
}

impl AwsError {
    /// Build a classified API error.
    pub fn api(
        kind: ApiErrorKind,
        operation: &'static str,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            kind,
            operation,
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Classify an SDK error by its provider error code.
    pub(crate) fn from_sdk<E>(operation: &'static str, resource: &str, err: &E) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        Self::api(
            ApiErrorKind::from_code(err.code()),
            operation,
            resource,
            DisplayErrorContext(err).to_string(),
        )
    }

    /// Kind used for branching. Timeouts and config errors are `Other`.
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Api { kind, .. } => *kind,
            Self::ConfigError(_) | Self::Timeout { .. } => ApiErrorKind::Other,
        }
    }
}

/// Type of AWS Result extending Result
pub type AwsResult<T> = Result<T, AwsError>;

/// Bound a single API call by `timeout`, turning elapsed time into [`AwsError::Timeout`].
pub(crate) async fn timed<T, F>(
    timeout: Duration,
    operation: &'static str,
    resource: &str,
    call: F,
) -> AwsResult<T>
where
    F: Future<Output = AwsResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AwsError::Timeout {
            operation,
            resource: resource.to_string(),
            timeout,
        }),
    }
}

/// A bucket as listed by the account
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct BucketRef {
    /// bucket name
    pub name: String,
    /// region the bucket lives in, when the listing reported it
    pub region: Option<String>,
}

/// Object storage operations the policy collector needs.
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// List every bucket visible to the account.
    async fn list_buckets(&self) -> AwsResult<Vec<BucketRef>>;

    /// Fetch the raw JSON policy text of a bucket from its own region.
    async fn get_bucket_policy(&self, bucket: &BucketRef) -> AwsResult<String>;
}

/// Identity operations used by the policy collector and the probe validator.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// List every role name in the account.
    async fn list_roles(&self) -> AwsResult<Vec<String>>;

    /// Fetch the decoded JSON trust policy of a role.
    async fn get_role_trust_policy(&self, role: &str) -> AwsResult<String>;

    /// Look up a role by name. `NotFound` when it does not exist.
    async fn get_role(&self, role: &str) -> AwsResult<()>;

    /// Create a role with the given trust policy.
    async fn create_role(&self, role: &str, trust_policy: &str, description: &str) -> AwsResult<()>;

    /// Replace the trust policy of an existing role.
    async fn update_role_trust_policy(&self, role: &str, trust_policy: &str) -> AwsResult<()>;

    /// Delete a role.
    async fn delete_role(&self, role: &str) -> AwsResult<()>;
}
