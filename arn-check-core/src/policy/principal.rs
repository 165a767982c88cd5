use serde::{Deserialize, Serialize};
use std::fmt;

/// Principal identifier found under `Principal.AWS` in a policy statement.
///
/// Opaque and immutable once extracted. Ordering is lexical, which gives the
/// probe loop a deterministic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap an identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is a fully-qualified ARN that can be probed
    pub fn is_eligible(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Classify the identifier by its lexical form
    pub fn kind(&self) -> PrincipalKind {
        PrincipalKind::classify(&self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lexical form of a principal identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalKind {
    /// `arn:<partition>:<service>:<region>:<account>:<resource>`
    Arn {
        /// partition, e.g. `aws` or `aws-cn`
        partition: String,
        /// service, e.g. `iam` or `sts`
        service: String,
        /// twelve-digit account ID, empty for account-less ARNs
        account: String,
        /// resource part, e.g. `role/Deploy` or `root`
        resource: String,
    },
    /// bare twelve-digit account ID
    AccountId,
    /// `*`
    Wildcard,
    /// IAM unique ID (`AROA...`, `AIDA...`). IAM writes these in place of
    /// principals that were deleted after the policy was saved.
    UniqueId,
    /// anything else
    Other,
}

const UNIQUE_ID_PREFIXES: [&str; 4] = ["AIDA", "AROA", "AGPA", "AIPA"];

impl PrincipalKind {
    fn classify(id: &str) -> Self {
        if id == "*" {
            return Self::Wildcard;
        }
        if id.len() == 12 && id.bytes().all(|b| b.is_ascii_digit()) {
            return Self::AccountId;
        }
        if let Some(arn) = Self::parse_arn(id) {
            return arn;
        }
        if id.len() >= 16
            && UNIQUE_ID_PREFIXES.iter().any(|p| id.starts_with(p))
            && id
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Self::UniqueId;
        }
        Self::Other
    }

    fn parse_arn(id: &str) -> Option<Self> {
        let mut parts = id.splitn(6, ':');
        if parts.next()? != "arn" {
            return None;
        }
        let partition = parts.next()?;
        let service = parts.next()?;
        let _region = parts.next()?;
        let account = parts.next()?;
        let resource = parts.next()?;
        if partition.is_empty() || service.is_empty() {
            return None;
        }
        Some(Self::Arn {
            partition: partition.to_string(),
            service: service.to_string(),
            account: account.to_string(),
            resource: resource.to_string(),
        })
    }

    /// Short label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Arn { .. } => "Arn",
            Self::AccountId => "AccountId",
            Self::Wildcard => "Wildcard",
            Self::UniqueId => "UniqueId",
            Self::Other => "Other",
        }
    }
}
