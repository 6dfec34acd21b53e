//! Core domain types shared by the store and the normalization stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a document, object or section row.
///
/// The same id space is used by the vector index, so ids are never renumbered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    /// Integer id, caller provided or auto assigned.
    Int(i64),
    /// Text key.
    Text(String),
}

impl DocumentId {
    /// Convert a JSON id field. Null means unset.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Text(n.to_string()),
            }),
            other => Some(Self::Text(other.to_string())),
        }
    }

    /// Parse the stored text form. Canonical decimal integers map back to `Int`.
    pub fn parse(text: &str) -> Self {
        match text.parse::<i64>() {
            Ok(i) if i.to_string() == text => Self::Int(i),
            _ => Self::Text(text.to_string()),
        }
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

/// Index action driving id assignment in the normalization stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Full index build. Ids restart at 0 and are not persisted.
    Index,
    /// Incremental insert-or-replace. Ids continue from the persisted counter.
    Upsert,
}

/// Canonical `(id, data, tags)` form of an input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    /// Document id, `None` when neither provided nor assigned.
    pub id: Option<DocumentId>,

    /// Opaque payload.
    pub data: Value,

    /// Optional tag string.
    pub tags: Option<String>,
}

impl Triple {
    /// Create a triple.
    pub fn new(id: Option<DocumentId>, data: Value, tags: Option<String>) -> Self {
        Self { id, data, tags }
    }

    /// Text indexed for this document: a string payload or its `text` field.
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Derived text unit written alongside a document or object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Vector index id.
    pub indexid: i64,

    /// Section text.
    pub text: Option<String>,

    /// Section tags.
    pub tags: Option<String>,
}

/// Extra payload carried by every write: timestamp and derived sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Write timestamp (Unix millis).
    pub timestamp: i64,

    /// Sections to (re)build for the written id.
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Entry {
    /// Entry stamped with the current time and no sections.
    pub fn now() -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Self {
            timestamp,
            sections: Vec::new(),
        }
    }

    /// Add a section.
    pub fn with_section(mut self, indexid: i64, text: Option<&str>, tags: Option<&str>) -> Self {
        self.sections.push(Section {
            indexid,
            text: text.map(String::from),
            tags: tags.map(String::from),
        });
        self
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::now()
    }
}

/// A document row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub data: Value,
    pub tags: Option<String>,
    pub entry: Option<i64>,
}

/// An object row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: DocumentId,
    pub object: Vec<u8>,
    pub tags: Option<String>,
    pub entry: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_from_value() {
        assert_eq!(DocumentId::from_value(&json!(5)), Some(DocumentId::Int(5)));
        assert_eq!(
            DocumentId::from_value(&json!("a")),
            Some(DocumentId::Text("a".to_string()))
        );
        assert_eq!(DocumentId::from_value(&Value::Null), None);
        assert_eq!(
            DocumentId::from_value(&json!(1.5)),
            Some(DocumentId::Text("1.5".to_string()))
        );
    }

    #[test]
    fn test_id_parse() {
        assert_eq!(DocumentId::parse("42"), DocumentId::Int(42));
        assert_eq!(DocumentId::parse("-3"), DocumentId::Int(-3));
        assert_eq!(DocumentId::parse("007"), DocumentId::Text("007".to_string()));
        assert_eq!(DocumentId::parse("doc"), DocumentId::Text("doc".to_string()));
    }

    #[test]
    fn test_triple_text() {
        let plain = Triple::new(None, json!("hello"), None);
        assert_eq!(plain.text(), Some("hello"));

        let object = Triple::new(None, json!({"text": "body", "id": 1}), None);
        assert_eq!(object.text(), Some("body"));

        let number = Triple::new(None, json!(3), None);
        assert_eq!(number.text(), None);
    }

    #[test]
    fn test_entry_sections() {
        let entry = Entry::now().with_section(0, Some("a"), None);
        assert!(entry.timestamp > 0);
        assert_eq!(entry.sections.len(), 1);
        assert_eq!(entry.sections[0].text.as_deref(), Some("a"));
    }
}
