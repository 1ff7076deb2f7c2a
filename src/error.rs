//! Error types for recall-core.
//!
//! Errors are grouped into families that mirror where they originate. Storage
//! errors come from the vector path and always reach the caller. Relationship
//! errors come from the graph path and are caught at the orchestrator boundary.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::store::ProviderType;

/// Result type alias using recall-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured context attached to every error family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub thread_id: Option<String>,
    pub user_id: Option<String>,
    pub provider: Option<ProviderType>,
    pub memory_id: Option<String>,
    pub batch_size: Option<usize>,
    pub metadata: HashMap<String, Value>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Self::default()
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderType) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_memory(mut self, memory_id: impl ToString) -> Self {
        self.memory_id = Some(memory_id.to_string());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Fill fields that are unset here from `other`.
    fn merge(&mut self, other: ErrorContext) {
        self.operation = self.operation.take().or(other.operation);
        self.thread_id = self.thread_id.take().or(other.thread_id);
        self.user_id = self.user_id.take().or(other.user_id);
        self.provider = self.provider.take().or(other.provider);
        self.memory_id = self.memory_id.take().or(other.memory_id);
        self.batch_size = self.batch_size.take().or(other.batch_size);
        for (key, value) in other.metadata {
            self.metadata.entry(key).or_insert(value);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref thread) = self.thread_id {
            parts.push(format!("thread={}", thread));
        }
        if let Some(ref user) = self.user_id {
            parts.push(format!("user={}", user));
        }
        if let Some(provider) = self.provider {
            parts.push(format!("provider={}", provider));
        }
        if let Some(ref memory) = self.memory_id {
            parts.push(format!("memory={}", memory));
        }
        if let Some(size) = self.batch_size {
            parts.push(format!("batch_size={}", size));
        }
        if parts.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// The family an [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Memory,
    Storage,
    Relationship,
    Embedding,
    Summarization,
    Configuration,
    Timeout,
    Serialization,
}

/// Errors that can occur during memory operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Base memory error
    #[error("Memory error: {message} [{context}]")]
    Memory {
        message: String,
        context: ErrorContext,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Document storage, retrieval or search failed (vector path)
    #[error("Storage error: {message} [{context}]")]
    Storage {
        message: String,
        context: ErrorContext,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Graph storage, query or relationship creation failed
    #[error("Relationship error: {message} [{context}]")]
    Relationship {
        message: String,
        context: ErrorContext,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Embedding generation failed
    #[error("Embedding error: {message} [{context}]")]
    Embedding { message: String, context: ErrorContext },

    /// Summarization failed
    #[error("Summarization error: {message} [{context}]")]
    Summarization { message: String, context: ErrorContext },

    /// Invalid or missing configuration
    #[error("Configuration error: {message} [{context}]")]
    Configuration { message: String, context: ErrorContext },

    /// Operation timed out
    #[error("Operation timed out after {duration_ms}ms [{context}]")]
    Timeout {
        duration_ms: u64,
        context: ErrorContext,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a base memory error.
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Create a storage error with source.
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            context: ErrorContext::default(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a relationship error.
    pub fn relationship(message: impl Into<String>) -> Self {
        Self::Relationship {
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Create a relationship error with source.
    pub fn relationship_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Relationship {
            message: message.into(),
            context: ErrorContext::default(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a summarization error.
    pub fn summarization(message: impl Into<String>) -> Self {
        Self::Summarization {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout {
            duration_ms,
            context: ErrorContext::default(),
        }
    }

    /// The error a backend adapter returns when no engine is bound.
    ///
    /// Vector backends report in the storage family, graph backends in the
    /// relationship family.
    pub fn unavailable(provider: ProviderType) -> Self {
        let message = format!("{} backend not available", provider);
        let context = ErrorContext::default().with_provider(provider);
        match provider {
            ProviderType::Vector => Self::Storage {
                message,
                context,
                source: None,
            },
            ProviderType::Graph => Self::Relationship {
                message,
                context,
                source: None,
            },
        }
    }

    /// Normalize any error into the base memory family, keeping its message.
    pub fn wrap(err: impl fmt::Display, context: ErrorContext) -> Self {
        Self::Memory {
            message: err.to_string(),
            context,
            source: None,
        }
    }

    /// Attach context, keeping any fields that are already set.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        if let Some(existing) = self.context_mut() {
            existing.merge(context);
        }
        self
    }

    /// The family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Memory { .. } => ErrorKind::Memory,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Relationship { .. } => ErrorKind::Relationship,
            Self::Embedding { .. } => ErrorKind::Embedding,
            Self::Summarization { .. } => ErrorKind::Summarization,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Structured context, if this family carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Memory { context, .. }
            | Self::Storage { context, .. }
            | Self::Relationship { context, .. }
            | Self::Embedding { context, .. }
            | Self::Summarization { context, .. }
            | Self::Configuration { context, .. }
            | Self::Timeout { context, .. } => Some(context),
            Self::Serialization(_) => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Self::Memory { context, .. }
            | Self::Storage { context, .. }
            | Self::Relationship { context, .. }
            | Self::Embedding { context, .. }
            | Self::Summarization { context, .. }
            | Self::Configuration { context, .. }
            | Self::Timeout { context, .. } => Some(context),
            Self::Serialization(_) => None,
        }
    }

    /// Whether this error came from an adapter with no bound engine.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Storage { message, .. } | Self::Relationship { message, .. } => {
                message.ends_with("backend not available")
            }
            _ => false,
        }
    }
}
