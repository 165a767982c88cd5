//! arn-check Core API Interface

pub mod model;

use log::debug;
use std::sync::Arc;

use crate::auditor::AccountAuditor;
use crate::aws::session::{AwsSessionProvider, SessionProvider};
use crate::config::AuditConfig;
use crate::errors::Result;
use crate::runner::MultiAccountRunner;
use model::AuditReport;

/// Audit every profile in `config` against AWS
pub async fn run_audit(config: &AuditConfig) -> Result<AuditReport> {
    let sessions = AwsSessionProvider::new(config.region.clone(), Some(config.api_timeout()));
    run_audit_with(config, Arc::new(sessions)).await
}

/// Audit every profile in `config`, resolving clients through `sessions`
pub async fn run_audit_with(
    config: &AuditConfig,
    sessions: Arc<dyn SessionProvider>,
) -> Result<AuditReport> {
    config.validate()?;
    debug!(
        "Auditing {} profiles with probe role '{}' (concurrency {})",
        config.profiles.len(),
        config.probe_role_name,
        config.concurrency
    );

    let runner = MultiAccountRunner::new(AccountAuditor::new(sessions, config), config.concurrency);
    Ok(runner.run(&config.profiles).await)
}
