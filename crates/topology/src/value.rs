//! Reference and binding values
//!
//! String values in a topology may carry `${node.output}` references to
//! outputs of other nodes. At plan time references are validated and kept as
//! deferred tokens; during apply they are substituted with the concrete
//! outputs of already-synthesized producers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

fn reference_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z0-9][A-Za-z0-9_-]*)\.([a-z][a-z0-9_]*)\}")
            .unwrap_or_else(|e| unreachable!("invalid reference pattern: {e}"))
    })
}

/// Check an id against the grammar a `${node.output}` token can name:
/// alphanumeric first, then alphanumerics, `-` or `_`.
pub(crate) fn is_valid_node_id(id: &str) -> bool {
    let mut chars = id.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A forward pointer to an output of another node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Target node id
    pub node: String,
    /// Output name on the target (e.g. `endpoint_address`)
    pub output: String,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.node, self.output)
    }
}

/// One piece of an interpolated string value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Ref(Reference),
}

/// A string value that may interleave literal text and references
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    /// Parse a raw string, extracting `${node.output}` references
    pub fn parse(raw: &str) -> Self {
        let re = reference_pattern();
        let mut segments = Vec::new();
        let mut last = 0;
        for captures in re.captures_iter(raw) {
            let whole = captures.get(0).map_or(0..0, |m| m.range());
            if whole.start > last {
                segments.push(Segment::Text(raw[last..whole.start].to_string()));
            }
            segments.push(Segment::Ref(Reference {
                node: captures[1].to_string(),
                output: captures[2].to_string(),
            }));
            last = whole.end;
        }
        if last < raw.len() {
            segments.push(Segment::Text(raw[last..].to_string()));
        }
        Self { segments }
    }

    /// Iterate over the references this template carries
    pub fn refs(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Ref(r) => Some(r),
            Segment::Text(_) => None,
        })
    }

    /// Check if the template is plain text with no references
    pub fn is_literal(&self) -> bool {
        self.refs().next().is_none()
    }

    /// Render with references kept as `${node.output}` tokens
    pub fn to_token_string(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Ref(r) => out.push_str(&r.to_string()),
            }
        }
        out
    }
}

/// Substitute every `${node.output}` token in `raw` with concrete outputs
///
/// Returns the first reference that cannot be satisfied, so the caller can
/// report which producer is missing.
pub fn substitute_tokens(
    raw: &str,
    outputs: &BTreeMap<String, BTreeMap<String, String>>,
) -> Result<String, Reference> {
    let template = Template::parse(raw);
    let mut out = String::new();
    for segment in &template.segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Ref(r) => match outputs.get(&r.node).and_then(|o| o.get(&r.output)) {
                Some(value) => out.push_str(value),
                None => return Err(r.clone()),
            },
        }
    }
    Ok(out)
}

/// An environment binding value: literal text (possibly with references) or
/// a remote-parameter lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// Key looked up in the parameter store at plan time
    Lookup { parameter: String },
    /// Literal string, scanned for `${node.output}` references
    Literal(String),
}

impl EnvValue {
    /// References carried by this binding, if any
    pub fn refs(&self) -> Vec<Reference> {
        match self {
            Self::Lookup { .. } => Vec::new(),
            Self::Literal(raw) => Template::parse(raw).refs().cloned().collect(),
        }
    }
}

/// A container secret binding: the value never appears at plan time, only a
/// reference to a key inside a secret node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    /// Secret node id
    pub secret: String,
    /// JSON key inside the secret (e.g. `password`)
    pub key: String,
}
