//! Cache key derivation.
//!
//! A key is `<table>:<canonical json>` where the JSON encodes the filter set with
//! object keys sorted at every depth and arrays kept in caller order.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Normalized query dimensions that select a cached result.
///
/// Absent fields are omitted from the key, so `None` and `Some(vec![])` differ.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    pub geo: Option<String>,
    pub rank: Option<String>,
    pub technology: Option<Vec<String>>,
    pub version: Option<Vec<String>>,
    pub category: Option<Vec<String>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Per-endpoint dimensions that do not fit the named fields.
    pub extra: BTreeMap<String, Value>,
}

impl QueryFilters {
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Key material for this filter set; `extra` entries override named fields.
    fn to_key_material(&self) -> Map<String, Value> {
        let mut map = Map::new();
        insert_string(&mut map, "geo", self.geo.as_deref());
        insert_string(&mut map, "rank", self.rank.as_deref());
        insert_list(&mut map, "technology", self.technology.as_deref());
        insert_list(&mut map, "version", self.version.as_deref());
        insert_list(&mut map, "category", self.category.as_deref());
        insert_string(&mut map, "startDate", self.start_date.as_deref());
        insert_string(&mut map, "endDate", self.end_date.as_deref());
        for (name, value) in &self.extra {
            map.insert(name.clone(), value.clone());
        }
        map
    }
}

fn insert_string(map: &mut Map<String, Value>, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(name.to_string(), Value::String(value.to_string()));
    }
}

fn insert_list(map: &mut Map<String, Value>, name: &str, values: Option<&[String]>) {
    if let Some(values) = values {
        let items = values.iter().cloned().map(Value::String).collect();
        map.insert(name.to_string(), Value::Array(items));
    }
}

/// Build the cache key for `filters` in the `table` namespace.
pub fn cache_key(table: &str, filters: &QueryFilters) -> String {
    let material = canonicalize(Value::Object(filters.to_key_material()));
    format!("{table}:{material}")
}

/// Rebuild `value` so every object inserts its keys in sorted order.
///
/// Insertion order is what serde_json prints when `preserve_order` is enabled anywhere
/// in the dependency graph, so sorting on insert keeps the encoding stable either way.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
