use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]").expect("valid regex"));

/// Field names the index reserves on every record.
const RESERVED_FIELDS: [&str; 3] = ["_id", "content", "type"];

/// Metadata filter in the index query language, e.g. `{"type": {"$eq": "product"}}`.
pub type MetadataFilter = Map<String, Value>;

/// Replace every non-alphanumeric character with `_`.
pub fn sanitize_id(raw: &str) -> String {
    NON_ALPHANUMERIC.replace_all(raw, "_").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Product,
    Collection,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Product => "product",
            RecordType::Collection => "collection",
        }
    }

    /// Prefix shared by every record id of this type.
    pub fn id_prefix(&self) -> String {
        format!("{}_", self.as_str())
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flat metadata value. The index rejects nested objects, so the type
/// system does too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Flag(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

/// One record as stored in the index: an id, the text the index embeds, the
/// record type and flat metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl IndexRecord {
    /// Builds a record whose id is `<type>_<sanitized source id>` and whose
    /// content is the non-empty `parts` joined by single spaces.
    pub fn new<'a, I>(record_type: RecordType, source_id: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let content = parts
            .into_iter()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            id: format!("{}{}", record_type.id_prefix(), sanitize_id(source_id)),
            content,
            record_type,
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata field. Empty strings and lists are dropped, as are
    /// reserved field names.
    pub fn with_field(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        if RESERVED_FIELDS.contains(&key) {
            return self;
        }
        let value = value.into();
        let empty = match &value {
            MetadataValue::Text(text) => text.trim().is_empty(),
            MetadataValue::List(items) => items.is_empty(),
            _ => false,
        };
        if !empty {
            self.metadata.insert(key.to_string(), value);
        }
        self
    }

    pub fn with_optional_field(self, key: &str, value: Option<impl Into<MetadataValue>>) -> Self {
        match value {
            Some(value) => self.with_field(key, value),
            None => self,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSummary {
    #[serde(rename = "vectorCount", alias = "recordCount", default)]
    pub record_count: u64,
}

/// Index statistics as reported by the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceSummary>,
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(rename = "totalVectorCount", alias = "totalRecordCount", default)]
    pub total_record_count: u64,
}

impl IndexStats {
    /// Record count of a namespace; a namespace the index has not created
    /// yet counts as empty.
    pub fn record_count(&self, namespace: &str) -> u64 {
        self.namespaces
            .get(namespace)
            .map(|ns| ns.record_count)
            .unwrap_or(0)
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: f32,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Hits in descending relevance order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A search hit shaped for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedResult {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl FormattedResult {
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}
