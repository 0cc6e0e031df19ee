//! Name pattern configuration
//!
//! ```yaml
//! name-patterns:
//!   - pattern: '^spark\.(\w+)\.(\w+)\.executor\.(\w+)$'
//!     name: 3
//!     tags:
//!       appId: 1
//!       executorId: 2
//! ```
//!
//! Pattern order and tag order are both kept as written.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

/// Key of the pattern list in a pattern file.
pub const DEFAULT_PATTERNS_KEY: &str = "name-patterns";

/// One name pattern as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePattern {
    /// Regular expression matched against the whole flat name.
    pub pattern: String,

    /// Capture group holding the base metric name.
    pub name: usize,

    /// Tag key to capture group, in output order.
    #[serde(
        default,
        deserialize_with = "ordered_tags",
        serialize_with = "serialize_tags"
    )]
    pub tags: Vec<(String, usize)>,
}

impl NamePattern {
    pub fn new(pattern: impl Into<String>, name: usize) -> Self {
        Self {
            pattern: pattern.into(),
            name,
            tags: Vec::new(),
        }
    }

    /// Add a tag read from capture group `group`.
    pub fn tag(mut self, key: impl Into<String>, group: usize) -> Self {
        self.tags.push((key.into(), group));
        self
    }
}

/// Top-level layout of a pattern file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFile {
    #[serde(rename = "name-patterns", default)]
    pub name_patterns: Vec<NamePattern>,
}

impl PatternFile {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

fn ordered_tags<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, usize)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TagsVisitor;

    impl<'de> Visitor<'de> for TagsVisitor {
        type Value = Vec<(String, usize)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from tag key to capture group index")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut tags: Vec<(String, usize)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, group)) = map.next_entry::<String, usize>()? {
                if tags.iter().any(|(k, _)| *k == key) {
                    return Err(de::Error::custom(format!("duplicate tag key {:?}", key)));
                }
                tags.push((key, group));
            }
            Ok(tags)
        }
    }

    deserializer.deserialize_map(TagsVisitor)
}

fn serialize_tags<S>(
    tags: &[(String, usize)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(tags.iter().map(|(k, g)| (k, g)))
}
