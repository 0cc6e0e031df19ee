//! Identifier model
//!
//! An [`Id`] is a metric name plus a set of [`Tag`]s. Identity ignores tag
//! order, but the insertion order is kept so payloads render tags the way the
//! call site declared them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

/// Immutable key/value pair attached to an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Create a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Immutable metric identifier.
///
/// `with_tag` returns a new identifier and never touches the receiver. The
/// name and tag list are shared, so cloning an `Id` is cheap.
#[derive(Clone)]
pub struct Id {
    name: Arc<str>,
    tags: Arc<[Tag]>,
}

impl Id {
    /// Create an identifier without tags.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            tags: Arc::from(Vec::new()),
        }
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in insertion order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Value of the tag with the given key, if any.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.key == key).map(|t| t.value())
    }

    /// Return a copy of this identifier with the tag set.
    ///
    /// An existing key keeps its position and takes the new value.
    pub fn with_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let tag = Tag::new(key, value);
        let mut tags = self.tags.to_vec();
        match tags.iter_mut().find(|t| t.key == tag.key) {
            Some(existing) => existing.value = tag.value,
            None => tags.push(tag),
        }
        Self {
            name: Arc::clone(&self.name),
            tags: Arc::from(tags),
        }
    }

    /// Return a copy of this identifier with all the given tags set, in order.
    pub fn with_tags<I, K, V>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        tags.into_iter()
            .fold(self.clone(), |id, (k, v)| id.with_tag(k, v))
    }

    fn sorted_tags(&self) -> Vec<&Tag> {
        let mut tags: Vec<&Tag> = self.tags.iter().collect();
        tags.sort();
        tags
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.tags.len() == other.tags.len()
            && self.sorted_tags() == other.sorted_tags()
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for tag in self.sorted_tags() {
            tag.hash(state);
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Id")
            .field("name", &self.name())
            .field("tags", &self.tags())
            .finish()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for tag in self.tags.iter() {
            write!(f, ":{}={}", tag.key, tag.value)?;
        }
        Ok(())
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Id::new(name)
    }
}
