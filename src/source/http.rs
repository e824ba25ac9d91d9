use crate::source::{AlertSource, TimeWindow};
use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::time::Duration;

pub struct HttpAlertSource {
    agent: ureq::Agent,
    url: String,
    api_token: String,
}

impl HttpAlertSource {
    pub fn new(url: &str, api_token: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.to_string(),
            api_token: api_token.to_string(),
        }
    }
}

pub(crate) fn request_body(window: &TimeWindow) -> Value {
    json!({
        "timeFrame": {
            "windowSize": window.window_size_ms,
            "to": window.to_epoch_ms()
        }
    })
}

impl AlertSource for HttpAlertSource {
    fn fetch_events(&self, window: &TimeWindow) -> Result<Vec<Value>> {
        let response = self
            .agent
            .get(&self.url)
            .set("Authorization", &format!("apiToken {}", self.api_token))
            .set("Accept", "application/json")
            .send_json(request_body(window))
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    anyhow!("source API {} returned status {code}", self.url)
                }
                ureq::Error::Transport(t) => anyhow!("source API {} unreachable: {t}", self.url),
            })?;
        response
            .into_json::<Vec<Value>>()
            .with_context(|| format!("decode event list from {}", self.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedServer, silent_listener};
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow {
            to: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            window_size_ms: 600_000,
        }
    }

    #[test]
    fn request_body_carries_window_in_milliseconds() {
        let window = TimeWindow {
            to: Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap(),
            window_size_ms: 600_000,
        };
        assert_eq!(
            request_body(&window),
            json!({"timeFrame": {"windowSize": 600_000, "to": 1_700_000_000_000i64}})
        );
    }

    #[test]
    fn fetches_event_list_with_api_token() {
        let server = CannedServer::respond("200 OK", r#"[{"eventId": "e1", "state": "open"}]"#);
        let events = HttpAlertSource::new(&server.url, "src-token", Duration::from_secs(5))
            .fetch_events(&window())
            .unwrap();
        assert_eq!(events, vec![json!({"eventId": "e1", "state": "open"})]);

        let request = server.request();
        assert!(request.starts_with("GET /api "));
        assert!(request.contains("apiToken src-token"));
        assert!(request.contains(r#""windowSize":600000"#));
    }

    #[test]
    fn error_status_carries_code_and_url() {
        let server = CannedServer::respond("503 Service Unavailable", "");
        let err = HttpAlertSource::new(&server.url, "src-token", Duration::from_secs(5))
            .fetch_events(&window())
            .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("status 503"), "{msg}");
        assert!(msg.contains(&server.url), "{msg}");
    }

    #[test]
    fn non_list_body_is_an_error() {
        let server = CannedServer::respond("200 OK", r#"{"events": []}"#);
        let err = HttpAlertSource::new(&server.url, "src-token", Duration::from_secs(5))
            .fetch_events(&window())
            .unwrap_err();
        assert!(format!("{err:#}").contains("decode event list"));
    }

    #[test]
    fn unanswered_request_times_out_as_transport_failure() {
        let (_listener, url) = silent_listener();
        let err = HttpAlertSource::new(&url, "src-token", Duration::from_secs(1))
            .fetch_events(&window())
            .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("unreachable"), "{msg}");
        assert!(msg.contains(&url), "{msg}");
    }
}
