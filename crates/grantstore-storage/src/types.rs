//! Request, response and schema types of the document-store contract.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document: attribute name to attribute value.
pub type Item = Map<String, Value>;

/// Returns the string value of an attribute, if present and a string.
#[must_use]
pub fn string_attribute<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name).and_then(Value::as_str)
}

/// Two-part primary key of a single-table design.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Groups all records of one entity kind.
    pub partition_key: String,
    /// Distinguishes individual records within the partition.
    pub sort_key: String,
}

impl PrimaryKey {
    /// Creates a new primary key.
    #[must_use]
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

/// Opaque position from which a query resumes on its next page.
///
/// It is the key of the last evaluated item, plus that item's index range
/// value when the query ran against a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    key: PrimaryKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_position: Option<String>,
}

impl ContinuationToken {
    /// Creates a token resuming right after `key`.
    #[must_use]
    pub fn after(key: PrimaryKey) -> Self {
        Self {
            key,
            index_position: None,
        }
    }

    /// Attaches the index range value of the last evaluated item.
    #[must_use]
    pub fn with_index_position(mut self, position: impl Into<String>) -> Self {
        self.index_position = Some(position.into());
        self
    }

    /// Key of the last evaluated item.
    #[must_use]
    pub fn key(&self) -> &PrimaryKey {
        &self.key
    }

    /// Index range value of the last evaluated item, for index queries.
    #[must_use]
    pub fn index_position(&self) -> Option<&str> {
        self.index_position.as_deref()
    }
}

/// Condition on the range (sort) attribute of a key or index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeCondition {
    /// The range attribute equals the value.
    Equals(String),
    /// The range attribute starts with the value.
    BeginsWith(String),
}

impl RangeCondition {
    /// Returns `true` if `value` satisfies the condition.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::BeginsWith(prefix) => value.starts_with(prefix.as_str()),
        }
    }
}

/// Key condition of a query: hash attribute equality plus an optional range condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    /// Value the hash attribute must equal.
    pub hash_value: String,
    /// Optional condition on the range attribute.
    pub range: Option<RangeCondition>,
}

impl KeyCondition {
    /// Matches every item whose hash attribute equals `value`.
    #[must_use]
    pub fn hash(value: impl Into<String>) -> Self {
        Self {
            hash_value: value.into(),
            range: None,
        }
    }

    /// Restricts the range attribute to values starting with `prefix`.
    #[must_use]
    pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.range = Some(RangeCondition::BeginsWith(prefix.into()));
        self
    }

    /// Restricts the range attribute to exactly `value`.
    #[must_use]
    pub fn range_equals(mut self, value: impl Into<String>) -> Self {
        self.range = Some(RangeCondition::Equals(value.into()));
        self
    }
}

/// Server-side filter applied after the key condition.
///
/// Filters narrow what a page returns but not what it evaluates, so a page
/// may come back empty while more pages remain.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Attribute equals the value.
    Equals(String, Value),
    /// Attribute is strictly less than the value.
    LessThan(String, Value),
    /// Attribute is strictly greater than the value.
    GreaterThan(String, Value),
    /// Every inner filter holds.
    And(Vec<Filter>),
}

impl Filter {
    /// `attribute = value`
    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals(attribute.into(), value.into())
    }

    /// `attribute < value`
    #[must_use]
    pub fn less_than(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::LessThan(attribute.into(), value.into())
    }

    /// `attribute > value`
    #[must_use]
    pub fn greater_than(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::GreaterThan(attribute.into(), value.into())
    }

    /// Conjunction of `self` and `other`.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Evaluates the filter against an item.
    ///
    /// Comparisons against a missing attribute, or between values of
    /// different types, are false.
    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::Equals(name, expected) => item.get(name).is_some_and(|v| v == expected),
            Self::LessThan(name, bound) => {
                compare(item.get(name), bound).is_some_and(Ordering::is_lt)
            }
            Self::GreaterThan(name, bound) => {
                compare(item.get(name), bound).is_some_and(Ordering::is_gt)
            }
            Self::And(filters) => filters.iter().all(|f| f.matches(item)),
        }
    }
}

fn compare(actual: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (actual?, bound) {
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// Condition guarding a put.
#[derive(Debug, Clone, PartialEq)]
pub enum PutCondition {
    /// The stored item exists and its attribute equals the value.
    AttributeEquals(String, Value),
    /// No item with the same key exists.
    NotExists,
}

/// A query against the table or one of its secondary indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Secondary index to query; `None` queries the primary key.
    pub index: Option<String>,
    /// Key condition.
    pub key: KeyCondition,
    /// Optional server-side filter.
    pub filter: Option<Filter>,
    /// Maximum number of items evaluated for this page.
    pub limit: Option<usize>,
    /// Position to resume from.
    pub start: Option<ContinuationToken>,
}

impl QueryRequest {
    /// Query of the table's primary key.
    #[must_use]
    pub fn table(key: KeyCondition) -> Self {
        Self {
            index: None,
            key,
            filter: None,
            limit: None,
            start: None,
        }
    }

    /// Query of a named secondary index.
    #[must_use]
    pub fn index(name: impl Into<String>, key: KeyCondition) -> Self {
        Self {
            index: Some(name.into()),
            ..Self::table(key)
        }
    }

    /// Adds a server-side filter, combined with any existing one.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Caps the number of items evaluated per page.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the position to resume from.
    #[must_use]
    pub fn starting_after(mut self, start: Option<ContinuationToken>) -> Self {
        self.start = start;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Items that passed the key condition and filter.
    pub items: Vec<Item>,
    /// Where the next page starts; `None` when the query is exhausted.
    pub next: Option<ContinuationToken>,
}

impl QueryPage {
    /// Whether more pages are available.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

/// Declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name, e.g. `Subject-index`.
    pub name: String,
    /// Attribute the index is keyed by.
    pub hash_attribute: String,
    /// Optional attribute range conditions apply to.
    pub range_attribute: Option<String>,
}

impl IndexSchema {
    /// Creates an index keyed by `hash_attribute` alone.
    #[must_use]
    pub fn new(name: impl Into<String>, hash_attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_attribute: hash_attribute.into(),
            range_attribute: None,
        }
    }

    /// Adds a range attribute.
    #[must_use]
    pub fn with_range(mut self, range_attribute: impl Into<String>) -> Self {
        self.range_attribute = Some(range_attribute.into());
        self
    }
}

/// Physical layout of a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Name of the partition key attribute.
    pub partition_key_attribute: String,
    /// Name of the sort key attribute.
    pub sort_key_attribute: String,
    /// Declared secondary indexes.
    pub indexes: Vec<IndexSchema>,
    /// Attribute holding an epoch-seconds expiry, if TTL is enabled.
    pub ttl_attribute: Option<String>,
}

impl TableSchema {
    /// Creates a schema with the conventional `PartitionKey`/`SortKey` attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key_attribute: "PartitionKey".to_string(),
            sort_key_attribute: "SortKey".to_string(),
            indexes: Vec::new(),
            ttl_attribute: None,
        }
    }

    /// Declares a secondary index.
    #[must_use]
    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Enables TTL on the given attribute.
    #[must_use]
    pub fn with_ttl_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.ttl_attribute = Some(attribute.into());
        self
    }

    /// Looks up a declared index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Extracts the primary key of an item.
    #[must_use]
    pub fn key_of(&self, item: &Item) -> Option<PrimaryKey> {
        Some(PrimaryKey::new(
            string_attribute(item, &self.partition_key_attribute)?,
            string_attribute(item, &self.sort_key_attribute)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_range_condition() {
        let prefix = RangeCondition::BeginsWith("APPLICATION#app1".into());
        assert!(prefix.matches("APPLICATION#app1#STATUS#valid#TYPE#ad-hoc"));
        assert!(!prefix.matches("APPLICATION#app2#STATUS#valid"));
        assert!(RangeCondition::Equals("a".into()).matches("a"));
        assert!(!RangeCondition::Equals("a".into()).matches("ab"));
    }

    #[test]
    fn test_filter_string_comparison() {
        let doc = item(json!({ "CreationDate": "2024-01-01T00:00:00.000Z" }));
        assert!(Filter::less_than("CreationDate", "2024-06-01T00:00:00.000Z").matches(&doc));
        assert!(!Filter::less_than("CreationDate", "2023-06-01T00:00:00.000Z").matches(&doc));
        assert!(Filter::greater_than("CreationDate", "2023-06-01T00:00:00.000Z").matches(&doc));
    }

    #[test]
    fn test_filter_missing_attribute_is_false() {
        let doc = item(json!({ "Status": "valid" }));
        assert!(!Filter::less_than("CreationDate", "9999").matches(&doc));
        assert!(!Filter::greater_than("CreationDate", "0000").matches(&doc));
    }

    #[test]
    fn test_filter_mixed_types_is_false() {
        let doc = item(json!({ "TTL": 100 }));
        assert!(!Filter::less_than("TTL", "200").matches(&doc));
        assert!(Filter::less_than("TTL", 200).matches(&doc));
    }

    #[test]
    fn test_filter_and() {
        let doc = item(json!({ "PartitionKey": "TOKEN", "Status": "valid" }));
        let filter = Filter::equals("PartitionKey", "TOKEN").and(Filter::equals("Status", "valid"));
        assert!(filter.matches(&doc));
        let filter = filter.and(Filter::equals("Status", "revoked"));
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn test_query_request_combines_filters() {
        let request = QueryRequest::index("Subject-index", KeyCondition::hash("alice"))
            .with_filter(Filter::equals("PartitionKey", "AUTHORIZATION"))
            .with_filter(Filter::equals("Status", "valid"));
        assert!(matches!(request.filter, Some(Filter::And(ref inner)) if inner.len() == 2));
        assert_eq!(request.index.as_deref(), Some("Subject-index"));
    }

    #[test]
    fn test_schema_key_of() {
        let schema = TableSchema::new("grants");
        let doc = item(json!({ "PartitionKey": "TOKEN", "SortKey": "#TOKEN#1" }));
        assert_eq!(schema.key_of(&doc), Some(PrimaryKey::new("TOKEN", "#TOKEN#1")));
        assert_eq!(schema.key_of(&item(json!({ "PartitionKey": "TOKEN" }))), None);
    }

    #[test]
    fn test_continuation_token_serde() {
        let token = ContinuationToken::after(PrimaryKey::new("TOKEN", "#TOKEN#1"))
            .with_index_position("APPLICATION#a");
        let json = serde_json::to_string(&token).unwrap();
        let parsed: ContinuationToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);
        assert_eq!(parsed.index_position(), Some("APPLICATION#a"));
    }
}
