use crate::target::{EventSink, SubmitResponse};
use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::time::Duration;

const ERROR_BODY_LIMIT: usize = 512;

pub struct HttpEventSink {
    agent: ureq::Agent,
    url: String,
}

impl HttpEventSink {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.to_string(),
        }
    }
}

impl EventSink for HttpEventSink {
    fn submit(&self, bearer_token: &str, batch: &[Value]) -> Result<SubmitResponse> {
        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("Bearer {bearer_token}"))
            .set("Content-Type", "application/json")
            .send_json(batch)
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => {
                    let mut body = resp.into_string().unwrap_or_default();
                    body.truncate(floor_char_boundary(&body, ERROR_BODY_LIMIT));
                    anyhow!("target API {} returned status {code}: {body}", self.url)
                }
                ureq::Error::Transport(t) => anyhow!("target API {} unreachable: {t}", self.url),
            })?;
        let body: Value = response
            .into_json()
            .with_context(|| format!("decode submit response from {}", self.url))?;
        SubmitResponse::from_body(&body)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}
