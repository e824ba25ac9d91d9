pub mod http;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TOKEN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TOKEN_MAX_AGE_MINUTES: i64 = 10;

/// Issues fresh bearer tokens for the target API.
pub trait TokenRefresher {
    fn refresh(&self) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenRecord {
    time: String,
    #[serde(alias = "refresh_token")]
    json_web_token: String,
}

/// Hands out a bearer token, replacing the persisted one when it is missing,
/// unreadable or older than the freshness threshold.
pub struct CredentialGuard {
    token_file: PathBuf,
    refresher: Box<dyn TokenRefresher>,
    max_age: TimeDelta,
}

impl CredentialGuard {
    pub fn new(token_file: impl Into<PathBuf>, refresher: Box<dyn TokenRefresher>) -> Self {
        Self {
            token_file: token_file.into(),
            refresher,
            max_age: TimeDelta::minutes(TOKEN_MAX_AGE_MINUTES),
        }
    }

    pub fn get_valid_token(&self) -> Result<String> {
        self.get_valid_token_at(Local::now().naive_local())
    }

    pub fn get_valid_token_at(&self, now: NaiveDateTime) -> Result<String> {
        match read_token(&self.token_file) {
            Some((issued_at, token)) => {
                let age = now.signed_duration_since(issued_at);
                if age >= TimeDelta::zero() && age < self.max_age {
                    return Ok(token);
                }
                debug!(
                    age_secs = age.num_seconds(),
                    "persisted token is stale; refreshing"
                );
            }
            None => debug!(
                path = %self.token_file.display(),
                "no usable persisted token; refreshing"
            ),
        }
        self.issue_new(now)
    }

    fn issue_new(&self, now: NaiveDateTime) -> Result<String> {
        let token = self.refresher.refresh().context("refresh bearer token")?;
        if token.trim().is_empty() {
            bail!("refresh endpoint returned an empty token");
        }
        write_token(
            &self.token_file,
            &TokenRecord {
                time: now.format(TOKEN_TIME_FORMAT).to_string(),
                json_web_token: token.clone(),
            },
        )?;
        info!(path = %self.token_file.display(), "stored refreshed bearer token");
        Ok(token)
    }
}

/// `None` for an absent, empty or malformed file.
fn read_token(path: &Path) -> Option<(NaiveDateTime, String)> {
    let raw = fs::read_to_string(path).ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    let record: TokenRecord = serde_json::from_str(&raw).ok()?;
    let issued_at = NaiveDateTime::parse_from_str(&record.time, TOKEN_TIME_FORMAT).ok()?;
    if record.json_web_token.trim().is_empty() {
        return None;
    }
    Some((issued_at, record.json_web_token))
}

fn write_token(path: &Path, record: &TokenRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create token dir {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(record)?;
    fs::write(path, body).with_context(|| format!("write token file {}", path.display()))
}
