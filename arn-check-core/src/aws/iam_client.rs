use async_trait::async_trait;
use aws_sdk_iam::Client as IamClient;

use crate::aws::{ApiErrorKind, AwsError, AwsResult, IdentityApi};
use crate::policy::decode_policy_text;

/// Client to call AWS IAM
pub struct AwsIamClient {
    pub(crate) client: IamClient,
}

/// Impl for AWS IAM client wrapper
impl AwsIamClient {
    /// New construct
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityApi for AwsIamClient {
    /// List all roles, following the `Marker` until the listing is no longer truncated
    async fn list_roles(&self) -> AwsResult<Vec<String>> {
        let mut names = Vec::<String>::new();
        let mut marker: Option<String> = None;

        loop {
            let out = self
                .client
                .list_roles()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| AwsError::from_sdk("ListRoles", "account", &e))?;

            names.extend(out.roles().iter().map(|r| r.role_name().to_string()));

            match out.marker() {
                Some(next) if out.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn get_role_trust_policy(&self, role: &str) -> AwsResult<String> {
        let out = self
            .client
            .get_role()
            .role_name(role)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("GetRole", role, &e))?;

        // IAM returns the document URL-encoded
        out.role()
            .and_then(|r| r.assume_role_policy_document())
            .map(decode_policy_text)
            .ok_or_else(|| {
                AwsError::api(
                    ApiErrorKind::Other,
                    "GetRole",
                    role,
                    "response has no AssumeRolePolicyDocument",
                )
            })
    }

    async fn get_role(&self, role: &str) -> AwsResult<()> {
        self.client
            .get_role()
            .role_name(role)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AwsError::from_sdk("GetRole", role, &e))
    }

    async fn create_role(&self, role: &str, trust_policy: &str, description: &str) -> AwsResult<()> {
        self.client
            .create_role()
            .role_name(role)
            .assume_role_policy_document(trust_policy)
            .description(description)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("CreateRole", role, &e))?;
        Ok(())
    }

    async fn update_role_trust_policy(&self, role: &str, trust_policy: &str) -> AwsResult<()> {
        self.client
            .update_assume_role_policy()
            .role_name(role)
            .policy_document(trust_policy)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("UpdateAssumeRolePolicy", role, &e))?;
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> AwsResult<()> {
        self.client
            .delete_role()
            .role_name(role)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("DeleteRole", role, &e))?;
        Ok(())
    }
}
