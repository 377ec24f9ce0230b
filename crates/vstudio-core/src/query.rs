//! Query filters and projections
//!
//! A small Mongo-compatible subset, enough for the generic CRUD layer:
//!
//! - [`Filter`]: equality conditions over dotted paths. A path that crosses an
//!   array matches if any element matches, an array-valued field matches a
//!   scalar it contains, and `null` matches a missing field.
//! - [`Projection`]: inclusion (`1`) or exclusion (`0`) of dotted paths. Any
//!   truthy entry other than `_id` selects inclusion mode; `_id` is then kept
//!   unless excluded explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::object_id::{ObjectId, ID_FIELD};

/// A semi-structured record
pub type Document = Map<String, Value>;

/// Equality filter over dotted field paths
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Document);

impl Filter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self(Document::new())
    }

    /// Filter on `_id`
    pub fn by_id(id: &ObjectId) -> Self {
        Self::new().with(ID_FIELD, id.to_value())
    }

    pub fn from_document(doc: Document) -> Self {
        Self(doc)
    }

    /// Add an equality condition (builder style)
    pub fn with(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(path.into(), value.into());
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(path.into(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    /// Prefix every path with `prefix.` unless it already carries it
    pub fn prefixed(&self, prefix: &str) -> Filter {
        Filter(prefix_keys(&self.0, prefix))
    }

    /// Combine two filters; conditions in `other` win on conflict
    pub fn merge(mut self, other: Filter) -> Filter {
        self.0.extend(other.0);
        self
    }

    /// Whether `doc` satisfies every condition
    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(path, expected)| {
            let segments: Vec<&str> = path.split('.').collect();
            match_in_map(doc, &segments, expected)
        })
    }
}

impl From<Document> for Filter {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

fn match_in_map(map: &Document, segments: &[&str], expected: &Value) -> bool {
    match map.get(segments[0]) {
        Some(value) => match_value(value, &segments[1..], expected),
        None => expected.is_null(),
    }
}

fn match_value(current: &Value, segments: &[&str], expected: &Value) -> bool {
    if segments.is_empty() {
        return current == expected
            || matches!(current, Value::Array(items) if items.contains(expected));
    }

    match current {
        Value::Object(map) => match_in_map(map, segments, expected),
        Value::Array(items) => {
            let by_index = segments[0]
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .is_some_and(|item| match_value(item, &segments[1..], expected));

            by_index
                || items
                    .iter()
                    .any(|item| item.is_object() && match_value(item, segments, expected))
        }
        _ => expected.is_null(),
    }
}

/// Field selection applied to query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection(Document);

enum Node {
    Leaf,
    Branch(BTreeMap<String, Node>),
}

impl Projection {
    /// Empty projection (returns documents unchanged)
    pub fn new() -> Self {
        Self(Document::new())
    }

    pub fn from_document(doc: Document) -> Self {
        Self(doc)
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.0.insert(path.into(), Value::from(1));
        self
    }

    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.0.insert(path.into(), Value::from(0));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prefix every path with `prefix.` unless it already carries it
    pub fn prefixed(&self, prefix: &str) -> Projection {
        Projection(prefix_keys(&self.0, prefix))
    }

    /// Inclusion mode: some field other than `_id` is selected
    pub fn is_inclusion(&self) -> bool {
        self.0
            .iter()
            .any(|(path, flag)| path != ID_FIELD && is_truthy(flag))
    }

    /// Apply this projection to a document
    pub fn apply(&self, doc: &Document) -> Document {
        if self.0.is_empty() {
            return doc.clone();
        }

        if self.is_inclusion() {
            let mut paths: Vec<&str> = self
                .0
                .iter()
                .filter(|(path, flag)| path.as_str() != ID_FIELD && is_truthy(flag))
                .map(|(path, _)| path.as_str())
                .collect();
            let keep_id = self.0.get(ID_FIELD).map_or(true, is_truthy);
            if keep_id {
                paths.push(ID_FIELD);
            }
            include(doc, &build_tree(paths))
        } else {
            let paths = self
                .0
                .iter()
                .filter(|(_, flag)| !is_truthy(flag))
                .map(|(path, _)| path.as_str());
            exclude(doc, &build_tree(paths))
        }
    }
}

impl From<Document> for Projection {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

fn is_truthy(flag: &Value) -> bool {
    match flag {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

fn build_tree<'a>(paths: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, Node> {
    let mut root = BTreeMap::new();
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        insert_path(&mut root, &segments);
    }
    root
}

fn insert_path(level: &mut BTreeMap<String, Node>, segments: &[&str]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        level.insert(first.to_string(), Node::Leaf);
        return;
    }
    let node = level
        .entry(first.to_string())
        .or_insert_with(|| Node::Branch(BTreeMap::new()));
    // A leaf already selects the whole subtree
    if let Node::Branch(children) = node {
        insert_path(children, rest);
    }
}

fn include(map: &Document, tree: &BTreeMap<String, Node>) -> Document {
    let mut out = Document::new();
    for (key, value) in map {
        match tree.get(key) {
            None => {}
            Some(Node::Leaf) => {
                out.insert(key.clone(), value.clone());
            }
            Some(Node::Branch(children)) => match value {
                Value::Object(inner) => {
                    out.insert(key.clone(), Value::Object(include(inner, children)));
                }
                Value::Array(items) => {
                    let projected = items
                        .iter()
                        .filter_map(|item| item.as_object())
                        .map(|inner| Value::Object(include(inner, children)))
                        .collect();
                    out.insert(key.clone(), Value::Array(projected));
                }
                _ => {}
            },
        }
    }
    out
}

fn exclude(map: &Document, tree: &BTreeMap<String, Node>) -> Document {
    let mut out = Document::new();
    for (key, value) in map {
        match tree.get(key) {
            None => {
                out.insert(key.clone(), value.clone());
            }
            Some(Node::Leaf) => {}
            Some(Node::Branch(children)) => {
                let kept = match value {
                    Value::Object(inner) => Value::Object(exclude(inner, children)),
                    Value::Array(items) => Value::Array(
                        items
                            .iter()
                            .map(|item| match item {
                                Value::Object(inner) => Value::Object(exclude(inner, children)),
                                other => other.clone(),
                            })
                            .collect(),
                    ),
                    other => other.clone(),
                };
                out.insert(key.clone(), kept);
            }
        }
    }
    out
}

fn prefix_keys(map: &Document, prefix: &str) -> Document {
    let dotted = format!("{}.", prefix);
    map.iter()
        .map(|(key, value)| {
            let key = if key.starts_with(&dotted) {
                key.clone()
            } else {
                format!("{}{}", dotted, key)
            };
            (key, value.clone())
        })
        .collect()
}

/// Read the value at a dotted path, walking objects and array indexes
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at a dotted path, creating intermediate objects.
///
/// Returns `true` when the document changed.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return false,
    };

    let mut current = doc;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        if !entry.is_object() {
            *entry = Value::Object(Document::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just made an object"),
        };
    }

    if current.get(*last) == Some(&value) {
        return false;
    }
    current.insert(last.to_string(), value);
    true
}
