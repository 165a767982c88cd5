//! Report model serialized by the CLI.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collector::{CollectedPrincipals, SkippedResource};
use crate::policy::Principal;
use crate::validator::{CleanupStatus, ValidationOutcome};

/// Caveat attached to every report
pub const ACCEPTED_NOTE: &str = "IAM rejecting a principal proves it no longer exists. \
Principals listed as Accepted were merely not rejected: service principals, other \
partitions and accounts IAM cannot inspect are accepted too, so Accepted is not proof of existence.";

/// A principal proven not to exist, with the policies that still name it
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct MissingPrincipal {
    /// the dead principal
    pub principal: Principal,
    /// `bucket:<name>` / `role:<name>` entries referencing it
    pub referenced_by: Vec<String>,
}

/// A principal that was never probed
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExcludedPrincipal {
    /// the principal
    pub principal: Principal,
    /// lexical kind, e.g. `Wildcard` or `UniqueId`
    pub kind: &'static str,
    /// `bucket:<name>` / `role:<name>` entries referencing it
    pub referenced_by: Vec<String>,
}

/// A principal whose probe ended in an unexpected error
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SkippedPrincipal {
    /// the principal
    pub principal: Principal,
    /// error or abort reason
    pub reason: String,
}

/// How far validation got for an account
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum ValidationStatus {
    /// no policy named any principal; nothing was probed
    NoCandidates,
    /// every eligible candidate was probed
    Completed,
    /// probing stopped early
    Aborted(String),
}

/// Findings for one account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountReport {
    /// account ID behind the profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// validation progress
    pub validation: ValidationStatus,
    /// buckets listed
    pub buckets_scanned: usize,
    /// roles listed
    pub roles_scanned: usize,
    /// distinct principals found
    pub candidates: usize,
    /// principals proven not to exist
    pub non_existent: Vec<MissingPrincipal>,
    /// principals IAM accepted
    pub accepted: Vec<Principal>,
    /// principals with no conclusion
    pub skipped_principals: Vec<SkippedPrincipal>,
    /// principals outside the eligible prefix
    pub excluded: Vec<ExcludedPrincipal>,
    /// buckets whose policy could not be read
    pub skipped_resources: Vec<SkippedResource>,
    /// what happened to the probe role
    pub probe_role_cleanup: CleanupStatus,
}

impl AccountReport {
    /// Combine scan results with the validation outcome, if validation ran
    pub fn from_scan(
        account_id: Option<String>,
        collected: &CollectedPrincipals,
        outcome: Option<&ValidationOutcome>,
    ) -> Self {
        let referenced_by = |principal: &Principal| -> Vec<String> {
            collected
                .sources
                .get(principal)
                .map(|sources| sources.iter().map(ToString::to_string).collect())
                .unwrap_or_default()
        };

        let mut report = Self {
            account_id,
            validation: ValidationStatus::NoCandidates,
            buckets_scanned: collected.buckets_scanned,
            roles_scanned: collected.roles_scanned,
            candidates: collected.sources.len(),
            non_existent: Vec::new(),
            accepted: Vec::new(),
            skipped_principals: Vec::new(),
            excluded: Vec::new(),
            skipped_resources: collected.skipped.clone(),
            probe_role_cleanup: CleanupStatus::NotNeeded,
        };

        let Some(outcome) = outcome else {
            return report;
        };

        report.validation = outcome
            .aborted
            .clone()
            .map_or(ValidationStatus::Completed, ValidationStatus::Aborted);
        report.non_existent = outcome
            .non_existent()
            .into_iter()
            .map(|principal| MissingPrincipal {
                referenced_by: referenced_by(&principal),
                principal,
            })
            .collect();
        report.accepted = outcome.accepted().into_iter().collect();
        report.skipped_principals = outcome
            .skipped()
            .into_iter()
            .map(|(principal, reason)| SkippedPrincipal { principal, reason })
            .collect();
        report.excluded = outcome
            .excluded
            .iter()
            .map(|principal| ExcludedPrincipal {
                principal: principal.clone(),
                kind: principal.kind().label(),
                referenced_by: referenced_by(principal),
            })
            .collect();
        report.probe_role_cleanup = outcome.cleanup.clone();
        report
    }
}

/// Per-profile result
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "Outcome")]
pub enum AccountResult {
    /// the account was scanned
    Audited(AccountReport),
    /// session resolution or a required listing failed
    Failed {
        /// error with its causes
        #[serde(rename = "Error")]
        error: String,
    },
}

/// One entry of the multi-account report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountEntry {
    /// profile the entry was produced for
    pub profile: String,
    /// result for that profile
    #[serde(flatten)]
    pub result: AccountResult,
}

/// Result of one invocation across all profiles
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditReport {
    /// when the report was produced
    pub generated_at: DateTime<Utc>,
    /// caveat about accepted principals
    pub note: &'static str,
    /// entries in profile order
    pub accounts: Vec<AccountEntry>,
}

impl AuditReport {
    /// Report stamped with the current time
    pub fn new(accounts: Vec<AccountEntry>) -> Self {
        Self {
            generated_at: Utc::now(),
            note: ACCEPTED_NOTE,
            accounts,
        }
    }

    /// Profiles that could not be audited
    pub fn failed_profiles(&self) -> Vec<&str> {
        self.accounts
            .iter()
            .filter(|a| matches!(a.result, AccountResult::Failed { .. }))
            .map(|a| a.profile.as_str())
            .collect()
    }

    /// Confirmed non-existent principals across all accounts
    pub fn non_existent_count(&self) -> usize {
        self.accounts
            .iter()
            .map(|a| match &a.result {
                AccountResult::Audited(report) => report.non_existent.len(),
                AccountResult::Failed { .. } => 0,
            })
            .sum()
    }
}
