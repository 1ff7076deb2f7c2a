//! Memory entry types and their document encoding.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Error, ErrorContext, Result};
use crate::store::{Document, Metadata};

/// Document metadata keys used to persist an entry.
pub(crate) mod keys {
    pub const THREAD_ID: &str = "thread_id";
    pub const MEMORY_TYPE: &str = "memory_type";
    pub const SOURCE: &str = "source";
    pub const TAGS: &str = "tags";
    pub const IMPORTANCE: &str = "importance";
    pub const PERSISTENT: &str = "persistent";
    pub const USER_ID: &str = "user_id";
    pub const CREATED_AT: &str = "created_at";
    pub const LAST_ACCESSED_AT: &str = "last_accessed_at";
    pub const ACCESS_COUNT: &str = "access_count";
    pub const EXTRA: &str = "extra";
}

/// Default importance for entries that don't specify one.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Unique identifier for a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::storage(format!("invalid memory id {:?}: {}", s, e)))
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of information an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Conversation,
    Fact,
    Preference,
    Summary,
    Context,
    Custom,
}

impl MemoryType {
    pub const ALL: [MemoryType; 6] = [
        MemoryType::Conversation,
        MemoryType::Fact,
        MemoryType::Preference,
        MemoryType::Summary,
        MemoryType::Context,
        MemoryType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Summary => "summary",
            Self::Context => "context",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamp an importance score into [0, 1]; non-finite values fall back to the default.
pub fn clamp_importance(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        DEFAULT_IMPORTANCE
    }
}

fn deserialize_importance<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(clamp_importance(f64::deserialize(deserializer)?))
}

fn default_importance() -> f64 {
    DEFAULT_IMPORTANCE
}

/// Caller-supplied description of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    #[serde(default, rename = "type")]
    pub memory_type: MemoryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance in [0, 1]
    #[serde(
        default = "default_importance",
        deserialize_with = "deserialize_importance"
    )]
    pub importance: f64,
    /// Persistent entries survive retention sweeps
    #[serde(default)]
    pub persistent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub extra: Metadata,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            memory_type: MemoryType::default(),
            source: None,
            tags: Vec::new(),
            importance: DEFAULT_IMPORTANCE,
            persistent: false,
            user_id: None,
            extra: Metadata::new(),
        }
    }
}

impl MemoryMetadata {
    pub fn new(memory_type: MemoryType) -> Self {
        Self {
            memory_type,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_importance(importance);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Drop empty and duplicate tags, keeping first-seen order.
    fn normalize(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.tags.len());
        for tag in self.tags.drain(..) {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !seen.contains(&tag) {
                seen.push(tag);
            }
        }
        self.tags = seen;
        self.importance = clamp_importance(self.importance);
        self
    }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub thread_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: MemoryMetadata,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    /// Set on search results only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl MemoryEntry {
    /// Create an entry with a fresh id and timestamps.
    pub fn new(
        thread_id: impl Into<String>,
        content: impl Into<String>,
        metadata: MemoryMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            thread_id: thread_id.into(),
            content: content.into(),
            embedding: None,
            metadata: metadata.normalize(),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            relevance_score: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }

    pub(crate) fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.last_accessed_at = created_at;
        self
    }

    pub fn memory_type(&self) -> MemoryType {
        self.metadata.memory_type
    }

    pub fn importance(&self) -> f64 {
        self.metadata.importance
    }

    /// Access bookkeeping; the only mutation an entry sees after creation.
    pub fn record_access(&mut self, at: DateTime<Utc>) {
        self.access_count += 1;
        if at > self.last_accessed_at {
            self.last_accessed_at = at;
        }
    }

    /// Number of tags shared with another entry.
    pub fn shared_tags(&self, other: &MemoryEntry) -> usize {
        self.metadata
            .tags
            .iter()
            .filter(|t| other.metadata.tags.contains(t))
            .count()
    }

    /// Encode as a vector-store document.
    pub fn to_document(&self) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert(keys::THREAD_ID.into(), json!(self.thread_id));
        metadata.insert(keys::MEMORY_TYPE.into(), json!(self.metadata.memory_type.as_str()));
        if let Some(ref source) = self.metadata.source {
            metadata.insert(keys::SOURCE.into(), json!(source));
        }
        metadata.insert(keys::TAGS.into(), json!(self.metadata.tags));
        metadata.insert(keys::IMPORTANCE.into(), json!(self.metadata.importance));
        metadata.insert(keys::PERSISTENT.into(), json!(self.metadata.persistent));
        if let Some(ref user) = self.metadata.user_id {
            metadata.insert(keys::USER_ID.into(), json!(user));
        }
        metadata.insert(keys::CREATED_AT.into(), json!(self.created_at.to_rfc3339()));
        metadata.insert(
            keys::LAST_ACCESSED_AT.into(),
            json!(self.last_accessed_at.to_rfc3339()),
        );
        metadata.insert(keys::ACCESS_COUNT.into(), json!(self.access_count));
        metadata.insert(keys::EXTRA.into(), Value::Object(self.metadata.extra.clone()));

        Document {
            id: self.id.to_string(),
            content: self.content.clone(),
            embedding: self.embedding.clone(),
            metadata,
        }
    }

    /// Decode a vector-store document.
    pub fn from_document(doc: Document) -> Result<Self> {
        let context = || ErrorContext::operation("decode_document").with_memory(&doc.id);
        let meta = &doc.metadata;

        let id = MemoryId::parse(&doc.id).map_err(|e| e.with_context(context()))?;
        let thread_id = str_field(meta, keys::THREAD_ID)
            .ok_or_else(|| Error::storage("document missing thread_id").with_context(context()))?
            .to_string();
        let memory_type = str_field(meta, keys::MEMORY_TYPE)
            .and_then(MemoryType::parse)
            .ok_or_else(|| {
                Error::storage("document missing or unknown memory_type").with_context(context())
            })?;
        let created_at = str_field(meta, keys::CREATED_AT)
            .and_then(parse_datetime)
            .ok_or_else(|| {
                Error::storage("document missing or invalid created_at").with_context(context())
            })?;
        let last_accessed_at = str_field(meta, keys::LAST_ACCESSED_AT)
            .and_then(parse_datetime)
            .unwrap_or(created_at);

        let tags = meta
            .get(keys::TAGS)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let metadata = MemoryMetadata {
            memory_type,
            source: str_field(meta, keys::SOURCE).map(String::from),
            tags,
            importance: meta
                .get(keys::IMPORTANCE)
                .and_then(|v| v.as_f64())
                .map(clamp_importance)
                .unwrap_or(DEFAULT_IMPORTANCE),
            persistent: meta
                .get(keys::PERSISTENT)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            user_id: str_field(meta, keys::USER_ID).map(String::from),
            extra: meta
                .get(keys::EXTRA)
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default(),
        };

        Ok(Self {
            id,
            thread_id,
            content: doc.content,
            embedding: doc.embedding,
            metadata,
            created_at,
            last_accessed_at,
            access_count: meta
                .get(keys::ACCESS_COUNT)
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            relevance_score: None,
        })
    }
}

fn str_field<'a>(meta: &'a Metadata, key: &str) -> Option<&'a str> {
    meta.get(key).and_then(|v| v.as_str())
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Input for a batch write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewMemory {
    pub content: String,
    pub metadata: MemoryMetadata,
    pub embedding: Option<Vec<f32>>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: MemoryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_entry_normalizes_metadata() {
        let entry = MemoryEntry::new(
            "t1",
            "hello",
            MemoryMetadata::new(MemoryType::Fact)
                .with_tags(["rust", " rust ", "", "async"])
                .with_importance(3.0),
        );
        assert_eq!(entry.metadata.tags, vec!["rust".to_string(), "async".to_string()]);
        assert_eq!(entry.importance(), 1.0);
        assert_eq!(entry.created_at, entry.last_accessed_at);
        assert_eq!(entry.access_count, 0);
    }

    #[test]
    fn test_document_round_trip_preserves_fields() {
        let mut entry = MemoryEntry::new(
            "t1",
            "prefers dark mode",
            MemoryMetadata::new(MemoryType::Preference)
                .with_source("chat")
                .with_tags(["ui"])
                .with_importance(0.7)
                .with_user("u1")
                .with_extra("channel", "web")
                .persistent(),
        );
        entry.record_access(Utc::now());

        let decoded = MemoryEntry::from_document(entry.to_document()).unwrap();
        assert_eq!(decoded.id, entry.id);
        assert_eq!(decoded.thread_id, "t1");
        assert_eq!(decoded.metadata, entry.metadata);
        assert_eq!(decoded.access_count, 1);
        assert_eq!(decoded.created_at, entry.created_at);
    }

    #[test]
    fn test_from_document_requires_core_fields() {
        let doc = Document::new(MemoryId::new().to_string(), "x");
        let err = MemoryEntry::from_document(doc).unwrap_err();
        assert!(err.to_string().contains("thread_id"));

        let bad_id = Document::new("not-a-uuid", "x");
        assert!(MemoryEntry::from_document(bad_id).is_err());
    }

    #[test]
    fn test_metadata_deserialize_clamps_importance() {
        let meta: MemoryMetadata =
            serde_json::from_str(r#"{"type":"summary","importance":-2.5}"#).unwrap();
        assert_eq!(meta.memory_type, MemoryType::Summary);
        assert_eq!(meta.importance, 0.0);

        let defaulted: MemoryMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(defaulted, MemoryMetadata::default());
    }

    #[test]
    fn test_shared_tags() {
        let a = MemoryEntry::new("t", "a", MemoryMetadata::default().with_tags(["x", "y"]));
        let b = MemoryEntry::new("t", "b", MemoryMetadata::default().with_tags(["y", "z"]));
        assert_eq!(a.shared_tags(&b), 1);
    }
}
