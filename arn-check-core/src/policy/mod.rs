//! Policy documents: parsing raw policy text, principal extraction and the
//! single-principal trust policy installed on the probe role.

mod extract;
mod principal;

pub use extract::extract_principals;
pub use principal::{Principal, PrincipalKind};

use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::errors::{AuditError, Result};

/// IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// Decode policy text as returned by IAM.
///
/// IAM hands back trust policies URL-encoded; bucket policies and already
/// decoded text pass through unchanged.
pub fn decode_policy_text(raw: &str) -> String {
    if raw.trim_start().starts_with('{') {
        return raw.to_string();
    }
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Parse policy text into a JSON value for extraction
pub fn parse_policy_document(raw: &str, context: &str) -> Result<JsonValue> {
    serde_json::from_str(&decode_policy_text(raw)).map_err(|e| AuditError::json_parsing(context, e))
}

/// Trust policy document
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPolicy {
    /// policy language version
    pub version: &'static str,
    /// statements
    #[serde(rename = "Statement")]
    pub statements: Vec<TrustStatement>,
}

/// One trust statement
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TrustStatement {
    /// always `Allow`
    pub effect: &'static str,
    /// principal block
    pub principal: AwsPrincipal,
    /// always `sts:AssumeRole`
    pub action: &'static str,
}

/// `{"AWS": "<arn>"}`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AwsPrincipal {
    /// trusted principal
    #[serde(rename = "AWS")]
    pub aws: Principal,
}

impl TrustPolicy {
    /// Trust policy letting exactly one principal assume the role.
    ///
    /// One principal per document so a rejection names a single identifier.
    pub fn assume_role_for(principal: &Principal) -> Self {
        Self {
            version: POLICY_VERSION,
            statements: vec![TrustStatement {
                effect: "Allow",
                principal: AwsPrincipal {
                    aws: principal.clone(),
                },
                action: "sts:AssumeRole",
            }],
        }
    }

    /// Serialized form sent to IAM
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AuditError::json_parsing("trust policy", e))
    }
}
