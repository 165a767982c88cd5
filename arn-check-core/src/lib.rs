//! This crate provides the core logic of arn-check:
//! - principal extraction from S3 bucket policies and IAM trust policies
//! - probe-role validation of cross-account principal ARNs
//! - per-account and multi-account audit drivers
//!
//! A principal is only ever reported as non-existent when IAM rejected it.

pub mod api;
pub mod auditor;
pub mod aws;
pub mod collector;
pub mod config;
pub mod errors;
pub mod policy;
pub mod runner;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for a small, focused public API
pub use api::model::{AccountReport, AccountResult, AuditReport};
pub use api::{run_audit, run_audit_with};
pub use auditor::AccountAuditor;
pub use aws::{ApiErrorKind, AwsError};
pub use collector::{CollectedPrincipals, PolicyCollector};
pub use config::{AuditConfig, ConfigOverrides};
pub use errors::{AuditError, Result};
pub use policy::{extract_principals, Principal, PrincipalKind};
pub use runner::MultiAccountRunner;
pub use validator::{CleanupStatus, ProbeRoleValidator, ValidationOutcome, Verdict};
