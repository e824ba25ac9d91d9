use crate::mapping::{MappingSpec, ReverseFieldMap};
use crate::sync::pipeline::DEFAULT_BATCH_SIZE;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "cfg/config.toml";

const DEFAULT_DB_PATH: &str = "state/alertsync.db";
const DEFAULT_TOKEN_FILE: &str = "target_token.json";
const DEFAULT_WINDOW_SIZE_MS: u64 = 10 * 60 * 1000;
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TARGET_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub logging: LoggingConfig,
    pub mapping: MappingSpec,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub api_token: String,
    pub window_size_ms: u64,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub url: String,
    pub refresh_url: String,
    pub access_key: String,
    pub access_secret_key: String,
    pub token_file: PathBuf,
    pub batch_size: usize,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    database: Option<RawDatabaseConfig>,
    source: Option<RawSourceConfig>,
    target: Option<RawTargetConfig>,
    logging: Option<RawLoggingConfig>,
    mapping: Option<RawMappingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDatabaseConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSourceConfig {
    url: Option<String>,
    api_token: Option<String>,
    window_size_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTargetConfig {
    url: Option<String>,
    refresh_url: Option<String>,
    access_key: Option<String>,
    access_secret_key: Option<String>,
    token_file: Option<String>,
    batch_size: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLoggingConfig {
    level: Option<String>,
    json: Option<bool>,
    file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMappingConfig {
    strict: Option<bool>,
    fields: Option<toml::Table>,
    reverse_fields: Option<BTreeMap<String, String>>,
}

/// A parsed config file whose mapping is not built yet.
///
/// Building the mapping logs lenient-mode rule problems, so callers install
/// logging from [`ConfigFile::logging`] before [`ConfigFile::into_app_config`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    raw: RawConfig,
    path: PathBuf,
    logging: LoggingConfig,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut parsed: RawConfig =
            toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        let logging = validate_logging(parsed.logging.take(), base_dir(path));
        Ok(Self {
            raw: parsed,
            path: path.to_path_buf(),
            logging,
        })
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    pub fn into_app_config(self) -> Result<AppConfig> {
        validate_config(self.raw, &self.path, self.logging)
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    ConfigFile::read(path)?.into_app_config()
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

fn validate_logging(raw: Option<RawLoggingConfig>, base_dir: &Path) -> LoggingConfig {
    raw.map(|logging| LoggingConfig {
        level: sanitize_optional(logging.level).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        json: logging.json.unwrap_or(false),
        file: sanitize_optional(logging.file).map(|f| resolve_path(base_dir, &f)),
    })
    .unwrap_or_default()
}

fn validate_config(raw: RawConfig, path: &Path, logging: LoggingConfig) -> Result<AppConfig> {
    let base_dir = base_dir(path);
    let database = DatabaseConfig {
        path: resolve_path(
            base_dir,
            raw.database
                .and_then(|db| sanitize_optional(db.path))
                .as_deref()
                .unwrap_or(DEFAULT_DB_PATH),
        ),
    };

    let source = raw
        .source
        .ok_or_else(|| anyhow!("{} missing `[source]` section", path.display()))?;
    let source = SourceConfig {
        url: required(source.url, "source.url", path)?,
        api_token: required(source.api_token, "source.api_token", path)?,
        window_size_ms: positive(
            source.window_size_ms.unwrap_or(DEFAULT_WINDOW_SIZE_MS),
            "source.window_size_ms",
            path,
        )?,
        timeout: Duration::from_secs(positive(
            source.timeout_secs.unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS),
            "source.timeout_secs",
            path,
        )?),
    };

    let target = raw
        .target
        .ok_or_else(|| anyhow!("{} missing `[target]` section", path.display()))?;
    let target = TargetConfig {
        url: required(target.url, "target.url", path)?,
        refresh_url: required(target.refresh_url, "target.refresh_url", path)?,
        access_key: required(target.access_key, "target.access_key", path)?,
        access_secret_key: required(target.access_secret_key, "target.access_secret_key", path)?,
        token_file: resolve_path(
            base_dir,
            sanitize_optional(target.token_file)
                .as_deref()
                .unwrap_or(DEFAULT_TOKEN_FILE),
        ),
        batch_size: positive(
            target.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            "target.batch_size",
            path,
        )?,
        timeout: Duration::from_secs(positive(
            target.timeout_secs.unwrap_or(DEFAULT_TARGET_TIMEOUT_SECS),
            "target.timeout_secs",
            path,
        )?),
    };

    let mapping = validate_mapping(
        raw.mapping
            .ok_or_else(|| anyhow!("{} missing `[mapping]` section", path.display()))?,
        path,
    )?;

    Ok(AppConfig {
        database,
        source,
        target,
        logging,
        mapping,
    })
}

fn validate_mapping(raw: RawMappingConfig, path: &Path) -> Result<MappingSpec> {
    let fields = raw
        .fields
        .ok_or_else(|| anyhow!("{} missing `[mapping.fields]`", path.display()))?;
    if fields.is_empty() {
        bail!("{} has empty `[mapping.fields]`", path.display());
    }
    let mut pairs = Vec::with_capacity(fields.len());
    for (target, rule) in &fields {
        let rule = rule.as_str().ok_or_else(|| {
            anyhow!(
                "{}: rule for `{target}` must be a string",
                path.display()
            )
        })?;
        pairs.push((target.as_str(), rule));
    }
    let reverse = raw
        .reverse_fields
        .map(|fields| ReverseFieldMap::from_pairs(fields))
        .unwrap_or_default();
    MappingSpec::parse(pairs, &reverse, raw.strict.unwrap_or(false))
        .with_context(|| format!("invalid mapping in {}", path.display()))
}

fn required(value: Option<String>, key: &str, path: &Path) -> Result<String> {
    sanitize_optional(value)
        .ok_or_else(|| anyhow!("{} missing required `{key}`", path.display()))
}

fn positive<T: Copy + Default + PartialEq>(value: T, key: &str, path: &Path) -> Result<T> {
    if value == T::default() {
        bail!("{} has invalid `{key}`; expected a positive value", path.display());
    }
    Ok(value)
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_path(base_dir: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() { p } else { base_dir.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Rule;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    const MINIMAL: &str = r#"
[source]
url = "https://monitor.example/api/events"
api_token = "src-token"

[target]
url = "https://events.example/api/v1/events"
refresh_url = "https://events.example/api/v1/token"
access_key = "key"
access_secret_key = "secret"

[mapping.fields]
"class_slots.pn_severity" = "func:severity_level"
"msg" = "event_data:problem|text"
"source_identifier" = "static:monitor"
"#;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("cfg").join("config.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn applies_defaults_and_resolves_paths_against_config_dir() {
        let (tmp, path) = write_config(MINIMAL);
        let cfg = load_config(&path).unwrap();
        let cfg_dir = tmp.path().join("cfg");

        assert_eq!(cfg.database.path, cfg_dir.join("state/alertsync.db"));
        assert_eq!(cfg.target.token_file, cfg_dir.join("target_token.json"));
        assert_eq!(cfg.target.batch_size, 8500);
        assert_eq!(cfg.source.window_size_ms, 600_000);
        assert_eq!(cfg.source.timeout, Duration::from_secs(30));
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.file.is_none());
    }

    #[test]
    fn keeps_mapping_declaration_order() {
        let (_tmp, path) = write_config(MINIMAL);
        let cfg = load_config(&path).unwrap();
        let targets = cfg
            .mapping
            .entries()
            .iter()
            .map(|e| e.target.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            targets,
            vec!["class_slots.pn_severity", "msg", "source_identifier"]
        );
    }

    #[test]
    fn reverse_fields_override_builtin_table() {
        let body = format!(
            "{MINIMAL}\n[mapping.reverse_fields]\n\"class_slots.pn_severity\" = \"details.sev\"\n"
        );
        let (_tmp, path) = write_config(&body);
        let cfg = load_config(&path).unwrap();
        match &cfg.mapping.entries()[0].rule {
            Rule::Transform { source, .. } => {
                assert_eq!(source.as_ref().unwrap().as_str(), "details.sev")
            }
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_required_value() {
        let body = MINIMAL.replace("api_token = \"src-token\"", "api_token = \"  \"");
        let (_tmp, path) = write_config(&body);
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err}").contains("missing required `source.api_token`"));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let body = MINIMAL.replace("access_key = \"key\"", "access_key = \"key\"\nbatch_size = 0");
        let (_tmp, path) = write_config(&body);
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err}").contains("invalid `target.batch_size`"));
    }

    #[test]
    fn rejects_non_string_rule() {
        let body = format!("{MINIMAL}\"count\" = 3\n");
        let (_tmp, path) = write_config(&body);
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err}").contains("rule for `count` must be a string"));
    }

    #[test]
    fn strict_mapping_surfaces_unknown_transform() {
        let body = MINIMAL
            .replace("[mapping.fields]", "[mapping]\nstrict = true\n\n[mapping.fields]")
            .replace("func:severity_level", "func:doesnotexist");
        let (_tmp, path) = write_config(&body);
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("unknown transform 'doesnotexist'"));
    }

    #[test]
    #[traced_test]
    fn logging_is_available_before_mapping_is_built() {
        let logging = "[logging]\nlevel = \"debug\"\nfile = \"logs/alertsync.log\"\n\n";
        let body = MINIMAL
            .replace("[mapping.fields]", &format!("{logging}[mapping.fields]"))
            .replace("func:severity_level", "func:doesnotexist");
        let (tmp, path) = write_config(&body);

        let file = ConfigFile::read(&path).unwrap();
        assert_eq!(file.logging().level, "debug");
        assert_eq!(
            file.logging().file.as_deref(),
            Some(tmp.path().join("cfg/logs/alertsync.log").as_path())
        );
        assert!(!logs_contain("unknown transform"));

        let cfg = file.into_app_config().unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert!(logs_contain("unknown transform 'doesnotexist'"));
    }

    #[test]
    fn missing_file_names_path() {
        let tmp = tempdir().unwrap();
        let err = load_config(&tmp.path().join("nope.toml")).unwrap_err();
        assert!(format!("{err}").contains("read config"));
    }
}
