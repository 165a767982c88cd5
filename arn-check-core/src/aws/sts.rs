//! STS helpers for caller identity

use crate::aws::{AwsError, AwsResult};
use aws_sdk_sts::Client as StsClient;

/// Return the current caller account ID using STS GetCallerIdentity.
///
/// Doubles as the credential check for a freshly resolved profile: a profile
/// whose credentials cannot sign requests fails here, before any scan starts.
///
/// # Arguments
///
/// * `client` - STS client to use for the API call
pub async fn caller_account_id(client: &StsClient) -> AwsResult<String> {
    let out = client
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| AwsError::from_sdk("GetCallerIdentity", "caller", &e))?;
    let acct = out
        .account()
        .map(std::string::ToString::to_string)
        .ok_or_else(|| AwsError::ConfigError("STS GetCallerIdentity missing Account".to_string()))?;
    Ok(acct)
}
