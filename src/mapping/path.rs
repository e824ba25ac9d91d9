use anyhow::{Result, bail};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// A parsed source lookup path such as `tags[0].name`.
///
/// Segments are separated by `.`; each segment is an optional key followed by
/// zero or more bracketed non-negative indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    raw: String,
    steps: Vec<Step>,
}

impl SourcePath {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("empty source path");
        }
        let mut steps = Vec::new();
        for segment in raw.split('.') {
            let (key, mut rest) = match segment.find('[') {
                Some(pos) => (&segment[..pos], &segment[pos..]),
                None => (segment, ""),
            };
            if !key.is_empty() {
                steps.push(Step::Key(key.to_string()));
            } else if rest.is_empty() {
                bail!("source path '{raw}' has an empty segment");
            }
            while !rest.is_empty() {
                let Some(body) = rest.strip_prefix('[') else {
                    bail!("source path '{raw}' has text after an index in '{segment}'");
                };
                let Some((idx, tail)) = body.split_once(']') else {
                    bail!("source path '{raw}' has an unclosed index in '{segment}'");
                };
                let idx = idx
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("source path '{raw}' has invalid index '{idx}'"))?;
                steps.push(Step::Index(idx));
                rest = tail;
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Walks `doc` along the path. Missing keys, out-of-range indices and
    /// type mismatches all yield `None`.
    pub fn lookup<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.steps.iter().try_fold(doc, |cur, step| match step {
            Step::Key(key) => cur.as_object()?.get(key),
            Step::Index(idx) => cur.as_array()?.get(*idx),
        })
    }

    /// Like [`SourcePath::lookup`] but treats an explicit `null` as absent.
    pub fn lookup_present<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.lookup(doc).filter(|v| !v.is_null())
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
