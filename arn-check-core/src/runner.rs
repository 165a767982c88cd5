//! Runs the account auditor over every configured profile.

use futures::stream::{self, StreamExt};
use log::error;
use std::collections::HashSet;

use crate::api::model::{AccountEntry, AccountResult, AuditReport};
use crate::auditor::AccountAuditor;

/// Audits a list of profiles, isolating failures per profile
pub struct MultiAccountRunner {
    auditor: AccountAuditor,
    concurrency: usize,
}

impl MultiAccountRunner {
    /// Runner with at most `concurrency` accounts in flight
    pub fn new(auditor: AccountAuditor, concurrency: usize) -> Self {
        Self {
            auditor,
            concurrency: concurrency.max(1),
        }
    }

    /// Audit every profile. Entries keep the input order; duplicate and blank
    /// profile names are dropped.
    pub async fn run(&self, profiles: &[String]) -> AuditReport {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = profiles
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty() && seen.insert(*p))
            .collect();

        let accounts = stream::iter(unique)
            .map(|profile| self.audit_one(profile))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        AuditReport::new(accounts)
    }

    async fn audit_one(&self, profile: &str) -> AccountEntry {
        let result = match self.auditor.audit(profile).await {
            Ok(report) => AccountResult::Audited(report),
            Err(e) => {
                let error = error_chain(&e);
                error!("Profile {profile} failed: {error}");
                AccountResult::Failed { error }
            }
        };
        AccountEntry {
            profile: profile.to_string(),
            result,
        }
    }
}

/// Render an error followed by its sources
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
