//! Memory record - the persisted unit of learning
//!
//! Each record is one learned fact: a pattern description, a batch summary,
//! a piece of user feedback. Ids are assigned monotonically by the backing
//! store; `(namespace, id)` is unique.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted memory record
///
/// `vector_id` is non-null exactly when an embedding was computed and
/// indexed at insert time. Readers hold these by value; only the pruner
/// deletes or replaces them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Monotonically assigned id (SQLite rowid)
    pub id: i64,
    /// Partition the record belongs to
    pub namespace: String,
    /// The learned content
    pub content: String,
    /// Free-form key/value metadata
    pub metadata: Value,
    /// Seconds since the Unix epoch at insert time
    pub timestamp: f64,
    /// Key into the vector index, when an embedding exists
    pub vector_id: Option<i64>,
    /// Insert time as recorded by the database
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Metadata lookup with a string result
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Metadata lookup with a float result (accepts ints too)
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }

    /// Metadata lookup with a boolean result
    pub fn meta_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(Value::as_bool)
    }

    /// Confidence stored in metadata, defaulting to 0.5 like unrated patterns
    pub fn confidence(&self) -> f64 {
        self.meta_f64("confidence").unwrap_or(0.5)
    }

    /// The issue type this record describes, falling back to its memory type
    pub fn issue_type(&self) -> &str {
        self.meta_str("issue_type")
            .or_else(|| self.meta_str("memory_type"))
            .unwrap_or("unknown")
    }
}

/// Input to [`crate::storage::MemoryStore::store`]
#[derive(Debug, Clone, Default)]
pub struct StoreInput {
    pub namespace: String,
    pub content: String,
    pub metadata: Option<Value>,
}

impl StoreInput {
    pub fn new(namespace: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(metadata: Value) -> MemoryRecord {
        MemoryRecord {
            id: 1,
            namespace: "test".to_string(),
            content: "content".to_string(),
            metadata,
            timestamp: 0.0,
            vector_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_meta_accessors() {
        let r = record(json!({
            "confidence": 0.9,
            "issue_type": "bare_except",
            "user_validated": true
        }));
        assert_eq!(r.confidence(), 0.9);
        assert_eq!(r.issue_type(), "bare_except");
        assert_eq!(r.meta_bool("user_validated"), Some(true));
    }

    #[test]
    fn test_defaults_when_metadata_missing() {
        let r = record(json!({}));
        assert_eq!(r.confidence(), 0.5);
        assert_eq!(r.issue_type(), "unknown");
    }

    #[test]
    fn test_issue_type_falls_back_to_memory_type() {
        let r = record(json!({"memory_type": "consolidated_pattern"}));
        assert_eq!(r.issue_type(), "consolidated_pattern");
    }
}
