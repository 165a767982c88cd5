//! Policy collection: every bucket policy and role trust policy in an account,
//! reduced to the principals they reference.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::aws::{timed, ApiErrorKind, IdentityApi, StorageApi};
use crate::errors::Result;
use crate::policy::{extract_principals, parse_policy_document, Principal};

/// Where a principal was found
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PolicySource {
    /// bucket policy of the named bucket
    Bucket(String),
    /// trust policy of the named role
    Role(String),
}

impl std::fmt::Display for PolicySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bucket(name) => write!(f, "bucket:{name}"),
            Self::Role(name) => write!(f, "role:{name}"),
        }
    }
}

/// A resource whose policy could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_new::new)]
#[serde(rename_all = "PascalCase")]
pub struct SkippedResource {
    /// resource that was skipped, e.g. `bucket:logs`
    pub resource: String,
    /// why
    pub reason: String,
}

/// Principals visible in one account
#[derive(Debug, Clone, Default)]
pub struct CollectedPrincipals {
    /// Deduplicated candidate set with the sources each principal came from
    pub sources: BTreeMap<Principal, BTreeSet<PolicySource>>,
    /// Buckets listed
    pub buckets_scanned: usize,
    /// Roles listed
    pub roles_scanned: usize,
    /// Buckets whose policy fetch failed unexpectedly
    pub skipped: Vec<SkippedResource>,
}

impl CollectedPrincipals {
    /// The candidate set
    pub fn candidates(&self) -> BTreeSet<Principal> {
        self.sources.keys().cloned().collect()
    }

    /// True when no policy named any principal
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn add(&mut self, principals: BTreeSet<Principal>, source: &PolicySource) {
        for principal in principals {
            self.sources
                .entry(principal)
                .or_default()
                .insert(source.clone());
        }
    }
}

/// Gathers principals from S3 bucket policies and IAM role trust policies.
pub struct PolicyCollector {
    timeout: Duration,
    ignored_role: Option<String>,
}

impl PolicyCollector {
    /// Collector bounding each API call by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ignored_role: None,
        }
    }

    /// Leave `role` out of the scan. Used for the probe role, which a crashed
    /// earlier run may have left behind.
    #[must_use]
    pub fn ignoring_role(mut self, role: impl Into<String>) -> Self {
        self.ignored_role = Some(role.into());
        self
    }

    /// Scan buckets then roles.
    ///
    /// A bucket without a policy is skipped quietly and any other bucket
    /// failure is recorded and skipped. Failures to list buckets, list roles
    /// or read a listed role's trust policy are returned.
    pub async fn collect(
        &self,
        storage: &dyn StorageApi,
        identity: &dyn IdentityApi,
    ) -> Result<CollectedPrincipals> {
        let mut collected = CollectedPrincipals::default();
        self.collect_buckets(storage, &mut collected).await?;
        self.collect_roles(identity, &mut collected).await?;

        info!(
            "Collected {} distinct principals from {} buckets and {} roles ({} buckets skipped)",
            collected.sources.len(),
            collected.buckets_scanned,
            collected.roles_scanned,
            collected.skipped.len()
        );
        Ok(collected)
    }

    async fn collect_buckets(
        &self,
        storage: &dyn StorageApi,
        collected: &mut CollectedPrincipals,
    ) -> Result<()> {
        let buckets = timed(self.timeout, "ListBuckets", "account", storage.list_buckets()).await?;
        collected.buckets_scanned = buckets.len();

        for bucket_ref in buckets {
            let bucket = bucket_ref.name.as_str();
            let source = PolicySource::Bucket(bucket.to_string());
            let policy = match timed(
                self.timeout,
                "GetBucketPolicy",
                bucket,
                storage.get_bucket_policy(&bucket_ref),
            )
            .await
            {
                Ok(policy) => policy,
                Err(e) if e.kind() == ApiErrorKind::NotFound => {
                    info!("No bucket policy exists for {bucket}, skipping");
                    continue;
                }
                Err(e) => {
                    warn!("Error getting bucket policy for {bucket}: {e}");
                    collected
                        .skipped
                        .push(SkippedResource::new(source.to_string(), e.to_string()));
                    continue;
                }
            };

            match parse_policy_document(&policy, &format!("bucket policy of {bucket}")) {
                Ok(document) => {
                    let principals = extract_principals(&document);
                    debug!("Bucket {bucket} names {} principals", principals.len());
                    collected.add(principals, &source);
                }
                Err(e) => {
                    warn!("{e}");
                    collected
                        .skipped
                        .push(SkippedResource::new(source.to_string(), e.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn collect_roles(
        &self,
        identity: &dyn IdentityApi,
        collected: &mut CollectedPrincipals,
    ) -> Result<()> {
        let mut roles = timed(self.timeout, "ListRoles", "account", identity.list_roles()).await?;
        if let Some(ignored) = &self.ignored_role {
            if roles.iter().any(|r| r == ignored) {
                info!("Not scanning leftover probe role '{ignored}'");
                roles.retain(|r| r != ignored);
            }
        }
        collected.roles_scanned = roles.len();

        for role in roles {
            let policy = timed(
                self.timeout,
                "GetRole",
                &role,
                identity.get_role_trust_policy(&role),
            )
            .await?;
            let document = parse_policy_document(&policy, &format!("trust policy of {role}"))?;
            let principals = extract_principals(&document);
            debug!("Role {role} trusts {} principals", principals.len());
            collected.add(principals, &PolicySource::Role(role));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AuditError;
    use crate::testing::{bucket_policy, trust_policy, FakeIdentity, FakeStorage};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn p(id: &str) -> Principal {
        Principal::from(id)
    }

    #[tokio::test]
    async fn test_union_of_buckets_and_roles() {
        let storage = FakeStorage::new()
            .with_policy("ghost-bucket", bucket_policy("arn:aws:iam::111111111111:role/Ghost"));
        let identity = FakeIdentity::new().with_role(
            "CrossAccount",
            trust_policy(&["arn:aws:iam::222222222222:role/Real"]),
        );

        let collected = PolicyCollector::new(TIMEOUT)
            .collect(&storage, &identity)
            .await
            .unwrap();

        assert_eq!(
            collected.candidates(),
            [
                p("arn:aws:iam::111111111111:role/Ghost"),
                p("arn:aws:iam::222222222222:role/Real")
            ]
            .into_iter()
            .collect()
        );
        assert_eq!(collected.buckets_scanned, 1);
        assert_eq!(collected.roles_scanned, 1);
        assert!(collected.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_across_documents_are_probed_once() {
        let shared = "arn:aws:iam::333333333333:root";
        let storage = FakeStorage::new()
            .with_policy("a", bucket_policy(shared))
            .with_policy("b", bucket_policy(shared));
        let identity = FakeIdentity::new().with_role("R", trust_policy(&[shared, shared]));

        let collected = PolicyCollector::new(TIMEOUT)
            .collect(&storage, &identity)
            .await
            .unwrap();

        assert_eq!(collected.candidates().len(), 1);
        let sources: Vec<String> = collected.sources[&p(shared)]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(sources, vec!["bucket:a", "bucket:b", "role:R"]);
    }

    #[tokio::test]
    async fn test_missing_bucket_policy_does_not_stop_scan() {
        let storage = FakeStorage::new()
            .with_error("no-policy", ApiErrorKind::NotFound)
            .with_policy("later", bucket_policy("arn:aws:iam::111111111111:user/alice"));
        let identity =
            FakeIdentity::new().with_role("R", trust_policy(&["arn:aws:iam::222222222222:root"]));

        let collected = PolicyCollector::new(TIMEOUT)
            .collect(&storage, &identity)
            .await
            .unwrap();

        assert_eq!(collected.candidates().len(), 2);
        // an absent policy is expected, not a skipped resource
        assert!(collected.skipped.is_empty());
        assert_eq!(collected.buckets_scanned, 2);
    }

    #[tokio::test]
    async fn test_unexpected_bucket_errors_are_recorded_and_skipped() {
        let storage = FakeStorage::new()
            .with_error("denied", ApiErrorKind::Other)
            .with_policy("garbled", "{not json".to_string())
            .with_policy("ok", bucket_policy("arn:aws:iam::111111111111:root"));
        let identity = FakeIdentity::new();

        let collected = PolicyCollector::new(TIMEOUT)
            .collect(&storage, &identity)
            .await
            .unwrap();

        assert_eq!(collected.candidates().len(), 1);
        let skipped: Vec<&str> = collected
            .skipped
            .iter()
            .map(|s| s.resource.as_str())
            .collect();
        assert_eq!(skipped, vec!["bucket:denied", "bucket:garbled"]);
    }

    #[tokio::test]
    async fn test_bucket_in_another_region_is_read_from_that_region() {
        let storage = FakeStorage::new()
            .with_policy("home", bucket_policy("arn:aws:iam::111111111111:root"))
            .with_regional_policy(
                "dublin",
                "eu-west-1",
                bucket_policy("arn:aws:iam::222222222222:role/Ghost"),
            );

        let collected = PolicyCollector::new(TIMEOUT)
            .collect(&storage, &FakeIdentity::new())
            .await
            .unwrap();

        assert!(collected.skipped.is_empty());
        assert_eq!(
            collected.sources[&p("arn:aws:iam::222222222222:role/Ghost")]
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["bucket:dublin"]
        );
    }

    #[tokio::test]
    async fn test_leftover_probe_role_is_not_scanned() {
        let identity = FakeIdentity::new()
            .with_role(
                "ArnCheckProbeRole",
                trust_policy(&["arn:aws:iam::999999999999:role/LastProbed"]),
            )
            .with_role("R", trust_policy(&["arn:aws:iam::222222222222:root"]));

        let collected = PolicyCollector::new(TIMEOUT)
            .ignoring_role("ArnCheckProbeRole")
            .collect(&FakeStorage::new(), &identity)
            .await
            .unwrap();

        assert_eq!(
            collected.candidates(),
            [p("arn:aws:iam::222222222222:root")].into_iter().collect()
        );
        assert_eq!(collected.roles_scanned, 1);
        assert!(identity.calls_to("ArnCheckProbeRole").is_empty());
    }

    #[tokio::test]
    async fn test_trust_policy_errors_propagate() {
        let storage = FakeStorage::new();
        let identity = FakeIdentity::new()
            .with_role("R", trust_policy(&["arn:aws:iam::222222222222:root"]))
            .with_broken_trust_policy("R");

        let err = PolicyCollector::new(TIMEOUT)
            .collect(&storage, &identity)
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::Aws(_)));
    }

    #[tokio::test]
    async fn test_bucket_listing_failure_propagates() {
        let storage = FakeStorage::new().failing_listing();
        let identity = FakeIdentity::new();

        let result = PolicyCollector::new(TIMEOUT)
            .collect(&storage, &identity)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_account() {
        let collected = PolicyCollector::new(TIMEOUT)
            .collect(&FakeStorage::new(), &FakeIdentity::new())
            .await
            .unwrap();

        assert!(collected.is_empty());
        assert_eq!(collected.buckets_scanned, 0);
        assert_eq!(collected.roles_scanned, 0);
    }
}
