//! Document paths, field maps and the server timestamp sentinel.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{HistoryKind, UserId};
use std::fmt;

/// Top-level fields of a stored document
pub type Fields = serde_json::Map<String, Value>;

const SERVER_VALUE_KEY: &str = ".sv";
const SERVER_TIMESTAMP: &str = "timestamp";

/// Path of a collection: an odd number of segments (`users`, `users/u1/journal`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(Vec<String>);

impl CollectionPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Path of the document `id` inside this collection
    pub fn doc(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Path of a single document: its parent collection plus its id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    /// Rebuild a path from `collection/id/collection/id...` segments
    pub fn from_segments(mut segments: Vec<String>) -> Option<Self> {
        if segments.len() < 2 || segments.len() % 2 != 0 {
            return None;
        }
        let id = segments.pop()?;
        Some(Self {
            collection: CollectionPath(segments),
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    /// Path of a subcollection below this document
    pub fn collection(&self, name: impl Into<String>) -> CollectionPath {
        let mut segments = self.collection.0.clone();
        segments.push(self.id.clone());
        segments.push(name.into());
        CollectionPath(segments)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.collection
            .0
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.id.as_str()))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Resolves the per-user paths every service works with
#[derive(Debug, Clone)]
pub struct UserPaths {
    users: CollectionPath,
}

impl UserPaths {
    pub fn new(users_collection: impl Into<String>) -> Self {
        Self {
            users: CollectionPath::root(users_collection),
        }
    }

    /// The user's root document holding streak and badge fields
    pub fn root(&self, user: &UserId) -> DocumentPath {
        self.users.doc(user.as_str())
    }

    pub fn history(&self, user: &UserId, kind: HistoryKind) -> CollectionPath {
        self.root(user).collection(kind.collection_name())
    }

    pub fn record(&self, user: &UserId, kind: HistoryKind, id: &str) -> DocumentPath {
        self.history(user, kind).doc(id)
    }
}

impl Default for UserPaths {
    fn default() -> Self {
        Self::new("users")
    }
}

/// A document as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// A live query over one collection ordered by a single field
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedQuery {
    pub collection: CollectionPath,
    pub order_field: String,
    pub descending: bool,
}

impl OrderedQuery {
    pub fn newest_first(collection: CollectionPath, order_field: impl Into<String>) -> Self {
        Self {
            collection,
            order_field: order_field.into(),
            descending: true,
        }
    }
}

/// Sentinel asking the store to stamp the field with its own clock on write
pub fn server_timestamp() -> Value {
    json!({ SERVER_VALUE_KEY: SERVER_TIMESTAMP })
}

pub fn is_server_timestamp(value: &Value) -> bool {
    match value.as_object() {
        Some(object) => {
            object.len() == 1
                && object.get(SERVER_VALUE_KEY).and_then(Value::as_str) == Some(SERVER_TIMESTAMP)
        }
        None => false,
    }
}

/// Replace every top-level server timestamp sentinel with `stamp`
pub fn resolve_server_timestamps(fields: &mut Fields, stamp: &str) {
    for value in fields.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::String(stamp.to_string());
        }
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
