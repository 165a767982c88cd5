use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

use super::Principal;

/// Collect every identifier under `Principal.AWS` in a policy document.
///
/// `Statement` may be a single object or a list, and `AWS` may be a string or
/// a list of strings. Anything else contributes nothing; there is no error
/// case.
pub fn extract_principals(document: &JsonValue) -> BTreeSet<Principal> {
    let mut principals = BTreeSet::new();

    let statements: &[JsonValue] = match document.get("Statement") {
        Some(JsonValue::Array(list)) => list,
        Some(single @ JsonValue::Object(_)) => std::slice::from_ref(single),
        _ => &[],
    };

    for statement in statements {
        let Some(aws) = statement.get("Principal").and_then(|p| p.get("AWS")) else {
            continue;
        };

        match aws {
            JsonValue::String(id) => {
                principals.insert(Principal::from(id.as_str()));
            }
            JsonValue::Array(ids) => {
                principals.extend(ids.iter().filter_map(JsonValue::as_str).map(Principal::from));
            }
            _ => {}
        }
    }

    principals
}
