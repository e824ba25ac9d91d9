use crate::auth::TokenRefresher;
use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::time::Duration;

pub struct HttpTokenRefresher {
    agent: ureq::Agent,
    url: String,
    access_key: String,
    access_secret_key: String,
}

impl HttpTokenRefresher {
    pub fn new(url: &str, access_key: &str, access_secret_key: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.to_string(),
            access_key: access_key.to_string(),
            access_secret_key: access_secret_key.to_string(),
        }
    }
}

pub(crate) fn token_from_body(body: &Value) -> Result<String> {
    body.get("json_web_token")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("no `json_web_token` in refresh response"))
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh(&self) -> Result<String> {
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_json(json!({
                "access_key": self.access_key,
                "access_secret_key": self.access_secret_key,
            }))
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    anyhow!("refresh API {} returned status {code}", self.url)
                }
                ureq::Error::Transport(t) => anyhow!("refresh API {} unreachable: {t}", self.url),
            })?;
        let body: Value = response
            .into_json()
            .with_context(|| format!("decode refresh response from {}", self.url))?;
        token_from_body(&body)
    }
}
