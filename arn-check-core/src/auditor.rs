//! Per-account driver: resolve clients, collect principals, probe them.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::api::model::AccountReport;
use crate::aws::session::SessionProvider;
use crate::collector::PolicyCollector;
use crate::config::AuditConfig;
use crate::errors::Result;
use crate::validator::ProbeRoleValidator;

/// Audits one account at a time
pub struct AccountAuditor {
    sessions: Arc<dyn SessionProvider>,
    collector: PolicyCollector,
    validator: ProbeRoleValidator,
    // one probe role per account: passes on the same account run one at a time
    account_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AccountAuditor {
    /// Auditor resolving profiles through `sessions`
    pub fn new(sessions: Arc<dyn SessionProvider>, config: &AuditConfig) -> Self {
        Self {
            sessions,
            collector: PolicyCollector::new(config.api_timeout())
                .ignoring_role(config.probe_role_name.clone()),
            validator: ProbeRoleValidator::from_config(config),
            account_locks: Mutex::new(HashMap::new()),
        }
    }

    fn account_lock(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.account_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(account_id.to_string()).or_default())
    }

    /// Run collection then validation for `profile`.
    ///
    /// Fails only when the session cannot be resolved or when a listing the
    /// scan depends on fails.
    pub async fn audit(&self, profile: &str) -> Result<AccountReport> {
        info!("Checking ARNs for profile: {profile}");
        let clients = self.sessions.resolve(profile).await?;

        let lock = clients.account_id.as_deref().map(|id| self.account_lock(id));
        let _pass = match &lock {
            Some(lock) => match lock.try_lock() {
                Ok(guard) => Some(guard),
                Err(_) => {
                    debug!("Profile {profile} waits for another pass on the same account");
                    Some(lock.lock().await)
                }
            },
            None => None,
        };

        let collected = self
            .collector
            .collect(clients.storage.as_ref(), clients.identity.as_ref())
            .await?;

        if collected.is_empty() {
            info!("No ARNs found for profile {profile}");
            return Ok(AccountReport::from_scan(clients.account_id, &collected, None));
        }

        let outcome = self
            .validator
            .validate(clients.identity.as_ref(), &collected.candidates())
            .await;
        info!(
            "Profile {profile}: {} of {} principals confirmed non-existent",
            outcome.non_existent().len(),
            collected.sources.len()
        );

        Ok(AccountReport::from_scan(
            clients.account_id,
            &collected,
            Some(&outcome),
        ))
    }
}
