//! Probe-role validation.
//!
//! IAM has no "does this foreign principal exist" call, but it refuses to save
//! a trust policy naming a principal it cannot resolve. Each candidate is
//! installed, one at a time, into the trust policy of a disposable probe role:
//! a `MalformedPolicyDocument` rejection proves the principal is gone, while
//! acceptance proves nothing beyond "not proven missing".

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::aws::{timed, ApiErrorKind, AwsResult, IdentityApi};
use crate::config::AuditConfig;
use crate::policy::{Principal, TrustPolicy};

/// Description set on the probe role when it is created
pub const PROBE_ROLE_DESCRIPTION: &str =
    "Disposable role used by arn-check to validate principal ARNs.";

/// Result of probing one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// IAM accepted the trust policy. Not proof that the principal exists.
    Accepted,
    /// IAM rejected the principal as malformed: it does not exist
    ConfirmedNonExistent,
    /// The probe hit an unexpected error; no conclusion
    Skipped {
        /// error or abort reason
        reason: String,
    },
}

/// What happened to the probe role at the end of a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "Status")]
pub enum CleanupStatus {
    /// The pass never created or claimed the role
    NotNeeded,
    /// The role was deleted
    Deleted,
    /// Deletion failed; the role may still exist
    Failed {
        /// delete error
        #[serde(rename = "Error")]
        error: String,
    },
}

/// Verdicts for one account pass
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Verdict per probed principal
    pub verdicts: BTreeMap<Principal, Verdict>,
    /// Candidates outside the eligible prefix; never probed
    pub excluded: BTreeSet<Principal>,
    /// Probe role cleanup
    pub cleanup: CleanupStatus,
    /// Set when the pass stopped probing early
    pub aborted: Option<String>,
}

impl ValidationOutcome {
    fn untouched(excluded: BTreeSet<Principal>) -> Self {
        Self {
            verdicts: BTreeMap::new(),
            excluded,
            cleanup: CleanupStatus::NotNeeded,
            aborted: None,
        }
    }

    fn with_verdict<'a>(&'a self, wanted: &'a Verdict) -> impl Iterator<Item = &'a Principal> {
        self.verdicts
            .iter()
            .filter(move |(_, v)| *v == wanted)
            .map(|(p, _)| p)
    }

    /// Principals proven not to exist
    pub fn non_existent(&self) -> BTreeSet<Principal> {
        self.with_verdict(&Verdict::ConfirmedNonExistent)
            .cloned()
            .collect()
    }

    /// Principals IAM accepted
    pub fn accepted(&self) -> BTreeSet<Principal> {
        self.with_verdict(&Verdict::Accepted).cloned().collect()
    }

    /// Principals with no conclusion, and why
    pub fn skipped(&self) -> Vec<(Principal, String)> {
        self.verdicts
            .iter()
            .filter_map(|(p, v)| match v {
                Verdict::Skipped { reason } => Some((p.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Absent,
    /// A create attempt ended without a definite answer; the role may exist
    Unknown,
    Ensured,
}

/// The probe role held by one pass.
///
/// Becomes `Ensured` once the pass has created the role, updated it, or
/// observed that it exists, and `Unknown` after a create attempt that may
/// have been committed. [`ProbeRole::release`] must run before drop.
struct ProbeRole<'a> {
    name: &'a str,
    state: ProbeState,
}

impl<'a> ProbeRole<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            name,
            state: ProbeState::Absent,
        }
    }

    fn ensure(&mut self) {
        self.state = ProbeState::Ensured;
    }

    fn suspect(&mut self) {
        if self.state == ProbeState::Absent {
            self.state = ProbeState::Unknown;
        }
    }

    async fn release(mut self, identity: &dyn IdentityApi, timeout: Duration) -> CleanupStatus {
        if self.state == ProbeState::Absent {
            return CleanupStatus::NotNeeded;
        }
        let result = timed(timeout, "DeleteRole", self.name, identity.delete_role(self.name)).await;
        self.state = ProbeState::Absent;
        match result {
            Ok(()) => {
                info!("Deleted role '{}' as part of cleanup", self.name);
                CleanupStatus::Deleted
            }
            Err(e) if e.kind() == ApiErrorKind::NotFound => {
                info!("Role '{}' was already gone at cleanup", self.name);
                CleanupStatus::Deleted
            }
            Err(e) => {
                warn!("Error deleting role '{}': {e}", self.name);
                CleanupStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

impl Drop for ProbeRole<'_> {
    fn drop(&mut self) {
        if self.state != ProbeState::Absent {
            warn!(
                "Probe role '{}' was not released and may still exist; delete it manually",
                self.name
            );
        }
    }
}

/// Drives the probe protocol for one account.
#[derive(Debug, Clone)]
pub struct ProbeRoleValidator {
    role_name: String,
    eligible_prefix: String,
    timeout: Duration,
    max_consecutive_failures: usize,
}

impl ProbeRoleValidator {
    /// Validator using the probe role, prefix, timeout and abort threshold from `config`
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            role_name: config.probe_role_name.clone(),
            eligible_prefix: config.eligible_prefix.clone(),
            timeout: config.api_timeout(),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }

    /// Probe every eligible candidate and clean up the probe role.
    ///
    /// Never fails: unexpected errors become [`Verdict::Skipped`] and a failed
    /// cleanup is reported in [`ValidationOutcome::cleanup`].
    pub async fn validate(
        &self,
        identity: &dyn IdentityApi,
        candidates: &BTreeSet<Principal>,
    ) -> ValidationOutcome {
        let (eligible, excluded): (BTreeSet<Principal>, BTreeSet<Principal>) = candidates
            .iter()
            .cloned()
            .partition(|p| p.is_eligible(&self.eligible_prefix));
        let eligible: Vec<Principal> = eligible.into_iter().collect();

        if eligible.is_empty() {
            info!("No principals matching '{}' to probe", self.eligible_prefix);
            return ValidationOutcome::untouched(excluded);
        }

        let mut probe = ProbeRole::new(&self.role_name);
        let mut verdicts = BTreeMap::new();
        let aborted = self
            .probe_all(identity, &mut probe, &eligible, &mut verdicts)
            .await;
        let cleanup = probe.release(identity, self.timeout).await;

        ValidationOutcome {
            verdicts,
            excluded,
            cleanup,
            aborted,
        }
    }

    async fn probe_all(
        &self,
        identity: &dyn IdentityApi,
        probe: &mut ProbeRole<'_>,
        eligible: &[Principal],
        verdicts: &mut BTreeMap<Principal, Verdict>,
    ) -> Option<String> {
        let mut consecutive_failures = 0;

        for (index, principal) in eligible.iter().enumerate() {
            let verdict = self.probe_one(identity, probe, principal).await;
            consecutive_failures = match verdict {
                Verdict::Skipped { .. } => consecutive_failures + 1,
                _ => 0,
            };
            verdicts.insert(principal.clone(), verdict);

            if self.max_consecutive_failures > 0
                && consecutive_failures >= self.max_consecutive_failures
            {
                let reason = format!(
                    "probe pass aborted after {consecutive_failures} consecutive unexpected errors"
                );
                warn!("{reason}");
                for rest in &eligible[index + 1..] {
                    verdicts.insert(
                        rest.clone(),
                        Verdict::Skipped {
                            reason: reason.clone(),
                        },
                    );
                }
                return Some(reason);
            }
        }
        None
    }

    async fn probe_one(
        &self,
        identity: &dyn IdentityApi,
        probe: &mut ProbeRole<'_>,
        principal: &Principal,
    ) -> Verdict {
        let document = match TrustPolicy::assume_role_for(principal).to_json() {
            Ok(document) => document,
            Err(e) => {
                return Verdict::Skipped {
                    reason: e.to_string(),
                }
            }
        };
        debug!("Probing {principal} with trust policy {document}");

        match self.install(identity, probe, &document).await {
            Ok(()) => {
                probe.ensure();
                debug!("{principal} accepted");
                Verdict::Accepted
            }
            Err(e) if e.kind() == ApiErrorKind::MalformedPrincipal => {
                info!("{principal} rejected as malformed: principal does not exist");
                Verdict::ConfirmedNonExistent
            }
            Err(e) => {
                warn!("Unexpected error while probing {principal}: {e}");
                Verdict::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Put `document` on the probe role: update in place when the role
    /// exists, create it otherwise.
    async fn install(
        &self,
        identity: &dyn IdentityApi,
        probe: &mut ProbeRole<'_>,
        document: &str,
    ) -> AwsResult<()> {
        let name = probe.name;
        match timed(self.timeout, "GetRole", name, identity.get_role(name)).await {
            Ok(()) => {
                probe.ensure();
                self.update(identity, name, document).await
            }
            Err(e) if e.kind() == ApiErrorKind::NotFound => {
                let created = timed(
                    self.timeout,
                    "CreateRole",
                    name,
                    identity.create_role(name, document, PROBE_ROLE_DESCRIPTION),
                )
                .await;
                match created {
                    Ok(()) => {
                        info!("Created probe role '{name}'");
                        Ok(())
                    }
                    Err(e) if e.kind() == ApiErrorKind::AlreadyExists => {
                        info!("Probe role '{name}' appeared concurrently, reusing it");
                        probe.ensure();
                        self.update(identity, name, document).await
                    }
                    Err(e) if e.kind() == ApiErrorKind::MalformedPrincipal => Err(e),
                    Err(e) => {
                        probe.suspect();
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, identity: &dyn IdentityApi, name: &str, document: &str) -> AwsResult<()> {
        timed(
            self.timeout,
            "UpdateAssumeRolePolicy",
            name,
            identity.update_role_trust_policy(name, document),
        )
        .await
    }
}
