//! Declarative field mapping from source alert documents to target payloads.
//!
//! A mapping is an ordered table of `target.path = "rule"` entries. Rules are
//! parsed once into [`Rule`] values; resolution against a document never fails.

pub mod path;
pub mod resolver;
pub mod transform;

use crate::mapping::path::SourcePath;
use crate::mapping::transform::Transform;
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use tracing::warn;

pub use resolver::resolve;

const STATIC_PREFIX: &str = "static:";
const LOOKUP_PREFIX: &str = "event_data:";
const FUNC_PREFIX: &str = "func:";

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Static(String),
    /// Fallback chain; the first present, non-null value wins.
    Lookup(Vec<SourcePath>),
    Transform {
        name: String,
        func: Option<Transform>,
        source: Option<SourcePath>,
    },
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub target: String,
    pub rule: Rule,
}

/// Target field path to canonical source field name, used by `func:` rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseFieldMap {
    fields: BTreeMap<String, String>,
}

impl Default for ReverseFieldMap {
    fn default() -> Self {
        Self::from_pairs([
            ("severity", "severity"),
            ("status", "state"),
            ("priority", "severity"),
            ("class_slots.pn_severity", "severity"),
        ])
    }
}

impl ReverseFieldMap {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Unlisted targets map to themselves.
    pub fn source_field<'a>(&'a self, target: &'a str) -> &'a str {
        self.fields.get(target).map(String::as_str).unwrap_or(target)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingSpec {
    entries: Vec<MappingEntry>,
}

impl MappingSpec {
    /// Parses `(target, rule)` pairs in order.
    ///
    /// In lenient mode unknown transforms, malformed paths and unrecognized
    /// rules are logged and later resolve to `""`. In strict mode they are errors.
    pub fn parse<'a>(
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
        reverse: &ReverseFieldMap,
        strict: bool,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for (target, raw_rule) in fields {
            let target = target.trim();
            if target.is_empty() {
                bail!("mapping has an empty target field");
            }
            let (rule, problems) = parse_rule(target, raw_rule, reverse);
            for problem in &problems {
                if strict {
                    bail!("mapping for '{target}': {problem}");
                }
                warn!(target_field = target, rule = raw_rule, "{problem}; value will be empty");
            }
            entries.push(MappingEntry {
                target: target.to_string(),
                rule,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_rule(target: &str, raw: &str, reverse: &ReverseFieldMap) -> (Rule, Vec<String>) {
    let mut problems = Vec::new();
    let trimmed = raw.trim_start();

    if let Some(literal) = trimmed.strip_prefix(STATIC_PREFIX) {
        return (Rule::Static(literal.to_string()), problems);
    }

    if let Some(chain) = trimmed.strip_prefix(LOOKUP_PREFIX) {
        let mut paths = Vec::new();
        for candidate in chain.split('|') {
            match SourcePath::parse(candidate) {
                Ok(path) => paths.push(path),
                Err(e) => problems.push(format!("skipping lookup candidate: {e}")),
            }
        }
        return (Rule::Lookup(paths), problems);
    }

    if let Some(name) = trimmed.strip_prefix(FUNC_PREFIX) {
        let name = name.trim().to_string();
        let func = Transform::from_name(&name);
        if func.is_none() {
            problems.push(format!("unknown transform '{name}'"));
        }
        let source_field = reverse.source_field(target);
        let source = match SourcePath::parse(source_field) {
            Ok(path) => Some(path),
            Err(e) => {
                problems.push(format!("transform input: {e}"));
                None
            }
        };
        return (Rule::Transform { name, func, source }, problems);
    }

    problems.push(format!("unrecognized rule '{raw}'"));
    (Rule::Unrecognized(raw.to_string()), problems)
}
