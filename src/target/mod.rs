pub mod http;

use anyhow::{Result, anyhow};
use serde_json::Value;

/// Outcome of an accepted batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    pub resource_ids: Vec<Value>,
}

impl SubmitResponse {
    pub fn created(&self) -> usize {
        self.resource_ids.len()
    }

    /// Reads the `resourceId` array out of a success body. Any other shape is
    /// rejected.
    pub fn from_body(body: &Value) -> Result<Self> {
        let ids = body
            .get("resourceId")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("response has no `resourceId` array: {body}"))?;
        Ok(Self {
            resource_ids: ids.clone(),
        })
    }
}

/// Downstream event-management API.
pub trait EventSink {
    /// Submits one batch as a single request. `Err` covers transport failures,
    /// non-success statuses and unexpected response shapes alike.
    fn submit(&self, bearer_token: &str, batch: &[Value]) -> Result<SubmitResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_created_resources() {
        let resp = SubmitResponse::from_body(&json!({"resourceId": ["r1", "r2"]})).unwrap();
        assert_eq!(resp.created(), 2);
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(SubmitResponse::from_body(&json!({"resourceId": "r1"})).is_err());
        assert!(SubmitResponse::from_body(&json!({"ids": []})).is_err());
        assert!(SubmitResponse::from_body(&json!([])).is_err());
    }
}
