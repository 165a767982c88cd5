//! Audit configuration.
//!
//! Settings come from an optional JSON file and are then overridden by
//! command-line values. Validation runs once, before any AWS call.

use crate::errors::{AuditError, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Default name of the disposable probe role
pub const DEFAULT_PROBE_ROLE_NAME: &str = "ArnCheckProbeRole";

/// Default prefix of principals eligible for probing
pub const DEFAULT_ELIGIBLE_PREFIX: &str = "arn:aws:";

const MAX_ROLE_NAME_LEN: usize = 64;

/// Settings for one invocation
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Ordered list of AWS profiles to audit
    pub profiles: Vec<String>,
    /// Name of the disposable probe role
    pub probe_role_name: String,
    /// Principals starting with this prefix are probed
    pub eligible_prefix: String,
    /// Region override for every profile
    pub region: Option<String>,
    /// Per-call timeout in seconds
    pub api_timeout_secs: u64,
    /// Accounts audited at the same time
    pub concurrency: usize,
    /// Consecutive unexpected probe errors before a pass is aborted; 0 never aborts
    pub max_consecutive_failures: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            probe_role_name: DEFAULT_PROBE_ROLE_NAME.to_string(),
            eligible_prefix: DEFAULT_ELIGIBLE_PREFIX.to_string(),
            region: None,
            api_timeout_secs: 30,
            concurrency: 1,
            max_consecutive_failures: 5,
        }
    }
}

/// Values supplied on the command line; `None` keeps the file/default value
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Replaces the configured profile list when non-empty
    pub profiles: Vec<String>,
    /// probe role name
    pub probe_role_name: Option<String>,
    /// region
    pub region: Option<String>,
    /// per-call timeout
    pub api_timeout_secs: Option<u64>,
    /// concurrency
    pub concurrency: Option<usize>,
    /// abort threshold
    pub max_consecutive_failures: Option<usize>,
}

impl AuditConfig {
    /// Read a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuditError::file_system("read", path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            AuditError::json_parsing(format!("config file '{}'", path.display()), e)
        })
    }

    /// Apply command-line overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if !overrides.profiles.is_empty() {
            self.profiles = overrides.profiles;
        }
        if let Some(name) = overrides.probe_role_name {
            self.probe_role_name = name;
        }
        if overrides.region.is_some() {
            self.region = overrides.region;
        }
        if let Some(secs) = overrides.api_timeout_secs {
            self.api_timeout_secs = secs;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(max) = overrides.max_consecutive_failures {
            self.max_consecutive_failures = max;
        }
        self
    }

    /// Reject settings that cannot produce a meaningful pass
    pub fn validate(&self) -> Result<()> {
        if self.profiles.iter().all(|p| p.trim().is_empty()) {
            return Err(AuditError::configuration(
                "Profiles",
                "no account profiles configured; pass --profile or set Profiles in the config file",
            ));
        }
        if self.probe_role_name.is_empty() || self.probe_role_name.len() > MAX_ROLE_NAME_LEN {
            return Err(AuditError::configuration(
                "ProbeRoleName",
                format!("probe role name must be 1 to {MAX_ROLE_NAME_LEN} characters"),
            ));
        }
        if !self
            .probe_role_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c))
        {
            return Err(AuditError::configuration(
                "ProbeRoleName",
                format!(
                    "probe role name '{}' contains characters IAM does not allow",
                    self.probe_role_name
                ),
            ));
        }
        if self.eligible_prefix.is_empty() {
            return Err(AuditError::configuration(
                "EligiblePrefix",
                "eligible prefix must not be empty",
            ));
        }
        if self.api_timeout_secs == 0 {
            return Err(AuditError::configuration(
                "ApiTimeoutSecs",
                "timeout must be at least one second",
            ));
        }
        if self.concurrency == 0 {
            return Err(AuditError::configuration(
                "Concurrency",
                "concurrency must be at least 1",
            ));
        }
        Ok(())
    }

    /// Per-call timeout
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}
