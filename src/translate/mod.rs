//! Name Translation
//!
//! Maps flat hierarchical metric names (`spark.<app>.<executor>.jvm.heap`)
//! onto tagged identifiers using an ordered list of regular expressions.
//! The first pattern that matches the whole name wins; a name no pattern
//! matches is dropped.

mod config;

pub use config::{NamePattern, PatternFile, DEFAULT_PATTERNS_KEY};

use std::fmt;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::api::Id;
use crate::error::{Error, Result};

/// Prefix put in front of every translated name unless configured otherwise.
pub const DEFAULT_PREFIX: &str = "spark.";

/// Outcome of translating a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// A pattern matched and produced this identifier.
    Mapped(Id),
    /// No pattern matched; the metric should not be reported.
    Dropped,
}

impl Translation {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Translation::Dropped)
    }

    pub fn id(&self) -> Option<&Id> {
        match self {
            Translation::Mapped(id) => Some(id),
            Translation::Dropped => None,
        }
    }

    pub fn into_id(self) -> Option<Id> {
        match self {
            Translation::Mapped(id) => Some(id),
            Translation::Dropped => None,
        }
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Translation::Mapped(id) => write!(f, "{}", id),
            Translation::Dropped => write!(f, "DROPPED"),
        }
    }
}

/// One compiled pattern.
struct NameMatcher {
    source: String,
    regex: Regex,
    name: usize,
    tags: Vec<(String, usize)>,
}

impl NameMatcher {
    /// Compile a pattern, checking every referenced group exists.
    fn compile(pattern: NamePattern) -> Result<Self> {
        // anchor so only whole-name matches count
        let anchored = format!("^(?:{})$", pattern.pattern);
        let regex = Regex::new(&anchored).map_err(|source| Error::InvalidPattern {
            pattern: pattern.pattern.clone(),
            source,
        })?;

        let available = regex.captures_len();
        let tag_groups = pattern.tags.iter().map(|(_, g)| *g);
        for group in std::iter::once(pattern.name).chain(tag_groups) {
            if group >= available {
                return Err(Error::MissingCaptureGroup {
                    pattern: pattern.pattern,
                    group,
                    available: available - 1,
                });
            }
        }

        Ok(Self {
            source: pattern.pattern,
            regex,
            name: pattern.name,
            tags: pattern.tags,
        })
    }

    /// `None` when the name does not match or a referenced group is empty
    /// because it did not take part in the match.
    fn apply(&self, prefix: &str, metric: &str) -> Option<Id> {
        let caps = self.regex.captures(metric)?;
        let name = caps.get(self.name)?;
        let mut id = Id::new(format!("{}{}", prefix, name.as_str()));
        for (key, group) in &self.tags {
            let value = caps.get(*group)?;
            id = id.with_tag(key.clone(), value.as_str());
        }
        Some(id)
    }
}

impl fmt::Debug for NameMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameMatcher")
            .field("pattern", &self.source)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Ordered, first-match-wins name translator.
#[derive(Debug)]
pub struct NameTranslator {
    prefix: String,
    matchers: Vec<NameMatcher>,
}

impl NameTranslator {
    pub fn builder() -> NameTranslatorBuilder {
        NameTranslatorBuilder::default()
    }

    /// Build from patterns in order, with the default prefix.
    pub fn from_patterns(patterns: Vec<NamePattern>) -> Result<Self> {
        Self::builder().patterns(patterns).build()
    }

    /// Build from a YAML document holding a `name-patterns` list.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file = PatternFile::from_yaml_str(yaml)?;
        Self::from_patterns(file.name_patterns)
    }

    /// Build from a YAML file holding a `name-patterns` list.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let translator = Self::from_yaml_str(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            patterns = translator.len(),
            "Loaded name patterns"
        );
        Ok(translator)
    }

    /// Translate a flat name.
    pub fn apply(&self, name: &str) -> Translation {
        for matcher in &self.matchers {
            if let Some(id) = matcher.apply(&self.prefix, name) {
                return Translation::Mapped(id);
            }
        }
        debug!(name, "No name pattern matched, dropping metric");
        Translation::Dropped
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// Builder for [`NameTranslator`]. Patterns keep the order they are added in.
#[derive(Debug, Clone)]
pub struct NameTranslatorBuilder {
    prefix: String,
    patterns: Vec<NamePattern>,
}

impl Default for NameTranslatorBuilder {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            patterns: Vec::new(),
        }
    }
}

impl NameTranslatorBuilder {
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn pattern(mut self, pattern: NamePattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn patterns(mut self, patterns: impl IntoIterator<Item = NamePattern>) -> Self {
        self.patterns.extend(patterns);
        self
    }

    /// Compile every pattern. Any bad pattern fails the whole build.
    pub fn build(self) -> Result<NameTranslator> {
        let matchers = self
            .patterns
            .into_iter()
            .map(NameMatcher::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(NameTranslator {
            prefix: self.prefix,
            matchers,
        })
    }
}
