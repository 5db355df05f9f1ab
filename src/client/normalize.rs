//! Decoding and shape-normalization of governed responses.
//!
//! The server sometimes wraps a downstream failure inside `data`:
//!
//! ```json
//! {"success": true, "data": {"success": false, "error": "db timeout"}}
//! ```
//!
//! The typed decode happens first; only the `data` field is then inspected as
//! a generic map, and each hoisted field is type-checked before use.

use super::types::GovernedResponse;
use crate::Result;
use serde_json::Value;

pub fn decode_governed_response(body: &[u8]) -> Result<GovernedResponse> {
    let mut resp: GovernedResponse = serde_json::from_slice(body)?;
    hoist_nested_failure(&mut resp);
    Ok(resp)
}

/// If `data` is a map with `success == false`, copy its `error`, `result`,
/// `plan_id` and `metadata` onto the top level and mark the response failed.
///
/// Fields of the wrong type are ignored rather than coerced.
pub fn hoist_nested_failure(resp: &mut GovernedResponse) {
    let Some(Value::Object(inner)) = resp.data.as_ref() else {
        return;
    };
    if inner.get("success") != Some(&Value::Bool(false)) {
        return;
    }

    let error = inner.get("error").and_then(Value::as_str).map(String::from);
    let result = inner.get("result").and_then(Value::as_str).map(String::from);
    let plan_id = inner.get("plan_id").and_then(Value::as_str).map(String::from);
    let metadata = inner.get("metadata").and_then(Value::as_object).map(|m| {
        m.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<std::collections::HashMap<_, _>>()
    });

    resp.success = false;
    if error.is_some() {
        resp.error = error;
    }
    if result.is_some() {
        resp.result = result;
    }
    if plan_id.is_some() {
        resp.plan_id = plan_id;
    }
    if metadata.is_some() {
        resp.metadata = metadata;
    }
}
