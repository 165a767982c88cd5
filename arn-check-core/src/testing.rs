//! In-memory fakes of the AWS collaborators for unit tests.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::aws::session::{AccountClients, SessionProvider};
use crate::aws::{ApiErrorKind, AwsError, AwsResult, BucketRef, IdentityApi, StorageApi};
use crate::errors::{AuditError, Result};
use crate::policy::extract_principals;

pub(crate) fn trust_policy(principals: &[&str]) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"AWS": principals},
            "Action": "sts:AssumeRole"
        }]
    })
    .to_string()
}

pub(crate) fn bucket_policy(principal: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"AWS": principal},
            "Action": "s3:GetObject",
            "Resource": "arn:aws:s3:::bucket/*"
        }]
    })
    .to_string()
}

#[derive(Default)]
pub(crate) struct FakeStorage {
    buckets: Vec<BucketRef>,
    policies: HashMap<String, AwsResult<String>>,
    regions: HashMap<String, String>,
    listing_error: Option<AwsError>,
}

impl FakeStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_policy(mut self, bucket: &str, policy: String) -> Self {
        self.buckets.push(BucketRef::new(bucket.to_string(), None));
        self.policies.insert(bucket.to_string(), Ok(policy));
        self
    }

    /// Bucket outside the profile's region: its policy is only served
    /// when requested from `region`
    pub(crate) fn with_regional_policy(mut self, bucket: &str, region: &str, policy: String) -> Self {
        self.buckets
            .push(BucketRef::new(bucket.to_string(), Some(region.to_string())));
        self.regions.insert(bucket.to_string(), region.to_string());
        self.policies.insert(bucket.to_string(), Ok(policy));
        self
    }

    pub(crate) fn with_error(mut self, bucket: &str, kind: ApiErrorKind) -> Self {
        self.buckets.push(BucketRef::new(bucket.to_string(), None));
        self.policies.insert(
            bucket.to_string(),
            Err(AwsError::api(kind, "GetBucketPolicy", bucket, "injected")),
        );
        self
    }

    pub(crate) fn failing_listing(mut self) -> Self {
        self.listing_error = Some(AwsError::api(
            ApiErrorKind::Other,
            "ListBuckets",
            "account",
            "AccessDenied",
        ));
        self
    }
}

#[async_trait]
impl StorageApi for FakeStorage {
    async fn list_buckets(&self) -> AwsResult<Vec<BucketRef>> {
        match &self.listing_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.buckets.clone()),
        }
    }

    async fn get_bucket_policy(&self, bucket: &BucketRef) -> AwsResult<String> {
        if let Some(region) = self.regions.get(&bucket.name) {
            if bucket.region.as_ref() != Some(region) {
                return Err(AwsError::api(
                    ApiErrorKind::Other,
                    "GetBucketPolicy",
                    &bucket.name,
                    "PermanentRedirect",
                ));
            }
        }
        let bucket = bucket.name.as_str();
        self.policies.get(bucket).cloned().unwrap_or_else(|| {
            Err(AwsError::api(
                ApiErrorKind::NotFound,
                "GetBucketPolicy",
                bucket,
                "NoSuchBucket",
            ))
        })
    }
}

#[derive(Default)]
struct IamState {
    roles: BTreeMap<String, String>,
    rejected: HashMap<String, ApiErrorKind>,
    broken_trust_policies: HashSet<String>,
    lookup_errors: usize,
    create_races: usize,
    create_delay: Option<Duration>,
    fail_delete: bool,
    calls: Vec<String>,
}

/// IAM fake. Create/update reject any document naming a principal registered
/// with [`FakeIdentity::reject`].
#[derive(Default)]
pub(crate) struct FakeIdentity {
    state: Mutex<IamState>,
}

impl FakeIdentity {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_role(self, name: &str, trust_policy: String) -> Self {
        self.lock().roles.insert(name.to_string(), trust_policy);
        self
    }

    pub(crate) fn reject(self, principal: &str, kind: ApiErrorKind) -> Self {
        self.lock().rejected.insert(principal.to_string(), kind);
        self
    }

    pub(crate) fn with_broken_trust_policy(self, role: &str) -> Self {
        self.lock().broken_trust_policies.insert(role.to_string());
        self
    }

    /// The next `count` lookups fail with an unexpected error
    pub(crate) fn failing_lookups(self, count: usize) -> Self {
        self.lock().lookup_errors = count;
        self
    }

    /// The next `count` creates report `EntityAlreadyExists` after another
    /// writer created the role
    pub(crate) fn racing_creates(self, count: usize) -> Self {
        self.lock().create_races = count;
        self
    }

    /// Creates commit the role, then stall for `delay` before answering
    pub(crate) fn slow_creates(self, delay: Duration) -> Self {
        self.lock().create_delay = Some(delay);
        self
    }

    pub(crate) fn failing_delete(self) -> Self {
        self.lock().fail_delete = true;
        self
    }

    pub(crate) fn has_role(&self, name: &str) -> bool {
        self.lock().roles.contains_key(name)
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn calls_to(&self, role: &str) -> Vec<String> {
        let suffix = format!(":{role}");
        self.calls()
            .into_iter()
            .filter(|c| c.ends_with(&suffix))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IamState> {
        self.state.lock().unwrap()
    }

    fn check_document(
        state: &IamState,
        operation: &'static str,
        role: &str,
        document: &str,
    ) -> AwsResult<()> {
        let doc: JsonValue = serde_json::from_str(document).unwrap();
        for principal in extract_principals(&doc) {
            if let Some(kind) = state.rejected.get(principal.as_str()) {
                return Err(AwsError::api(
                    *kind,
                    operation,
                    role,
                    format!("Invalid principal in policy: \"AWS\":\"{principal}\""),
                ));
            }
        }
        Ok(())
    }

    fn create_locked(state: &mut IamState, role: &str, trust_policy: &str) -> AwsResult<()> {
        state.calls.push(format!("CreateRole:{role}"));
        if state.create_races > 0 {
            state.create_races -= 1;
            state
                .roles
                .insert(role.to_string(), trust_policy_placeholder());
            return Err(AwsError::api(
                ApiErrorKind::AlreadyExists,
                "CreateRole",
                role,
                "EntityAlreadyExists",
            ));
        }
        if state.roles.contains_key(role) {
            return Err(AwsError::api(
                ApiErrorKind::AlreadyExists,
                "CreateRole",
                role,
                "EntityAlreadyExists",
            ));
        }
        Self::check_document(state, "CreateRole", role, trust_policy)?;
        state
            .roles
            .insert(role.to_string(), trust_policy.to_string());
        Ok(())
    }
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn list_roles(&self) -> AwsResult<Vec<String>> {
        let mut state = self.lock();
        state.calls.push("ListRoles:account".to_string());
        Ok(state.roles.keys().cloned().collect())
    }

    async fn get_role_trust_policy(&self, role: &str) -> AwsResult<String> {
        let mut state = self.lock();
        state.calls.push(format!("GetRoleTrustPolicy:{role}"));
        if state.broken_trust_policies.contains(role) {
            return Err(AwsError::api(
                ApiErrorKind::Other,
                "GetRole",
                role,
                "AccessDenied",
            ));
        }
        state
            .roles
            .get(role)
            .cloned()
            .ok_or_else(|| AwsError::api(ApiErrorKind::NotFound, "GetRole", role, "NoSuchEntity"))
    }

    async fn get_role(&self, role: &str) -> AwsResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("GetRole:{role}"));
        if state.lookup_errors > 0 {
            state.lookup_errors -= 1;
            return Err(AwsError::api(
                ApiErrorKind::Other,
                "GetRole",
                role,
                "Throttling",
            ));
        }
        if state.roles.contains_key(role) {
            Ok(())
        } else {
            Err(AwsError::api(
                ApiErrorKind::NotFound,
                "GetRole",
                role,
                "NoSuchEntity",
            ))
        }
    }

    async fn create_role(&self, role: &str, trust_policy: &str, _description: &str) -> AwsResult<()> {
        let (result, delay) = {
            let mut state = self.lock();
            (Self::create_locked(&mut state, role, trust_policy), state.create_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn update_role_trust_policy(&self, role: &str, trust_policy: &str) -> AwsResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("UpdateAssumeRolePolicy:{role}"));
        if !state.roles.contains_key(role) {
            return Err(AwsError::api(
                ApiErrorKind::NotFound,
                "UpdateAssumeRolePolicy",
                role,
                "NoSuchEntity",
            ));
        }
        Self::check_document(&state, "UpdateAssumeRolePolicy", role, trust_policy)?;
        state
            .roles
            .insert(role.to_string(), trust_policy.to_string());
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> AwsResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("DeleteRole:{role}"));
        if state.fail_delete {
            return Err(AwsError::api(
                ApiErrorKind::Other,
                "DeleteRole",
                role,
                "DeleteConflict",
            ));
        }
        state
            .roles
            .remove(role)
            .map(|_| ())
            .ok_or_else(|| AwsError::api(ApiErrorKind::NotFound, "DeleteRole", role, "NoSuchEntity"))
    }
}

fn trust_policy_placeholder() -> String {
    trust_policy(&["arn:aws:iam::999999999999:root"])
}

/// Session fake keyed by profile; unknown profiles fail like bad credentials
#[derive(Default)]
pub(crate) struct FakeSessions {
    accounts: HashMap<String, AccountClients>,
}

impl FakeSessions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_account(
        self,
        profile: &str,
        storage: Arc<FakeStorage>,
        identity: Arc<FakeIdentity>,
    ) -> Self {
        let account_id = format!("{profile}-account");
        self.with_account_id(profile, &account_id, storage, identity)
    }

    pub(crate) fn with_account_id(
        mut self,
        profile: &str,
        account_id: &str,
        storage: Arc<FakeStorage>,
        identity: Arc<FakeIdentity>,
    ) -> Self {
        self.accounts.insert(
            profile.to_string(),
            AccountClients::new(Some(account_id.to_string()), identity, storage),
        );
        self
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn resolve(&self, profile: &str) -> Result<AccountClients> {
        self.accounts
            .get(profile)
            .cloned()
            .ok_or_else(|| AuditError::session(profile, "The config profile could not be found"))
    }
}
