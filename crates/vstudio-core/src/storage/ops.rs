//! Document-level semantics shared by every backend
//!
//! Backends only decide where documents live; how a `$set`, an array
//! mutation or a pipeline changes them is defined once here.

use serde_json::Value;

use super::{ArrayUpdate, Stage, StoreError, StoreResult};
use crate::model::DELETED_FIELD;
use crate::object_id::ID_FIELD;
use crate::query::{get_path, set_path, Document};

/// Whether a document counts as live (not soft-deleted)
pub fn is_live(doc: &Document) -> bool {
    !matches!(doc.get(DELETED_FIELD), Some(Value::Bool(true)))
}

/// Apply `$set` semantics. `_id` is never rewritten.
///
/// Returns `true` when the document changed.
pub fn apply_set(doc: &mut Document, set: &Document) -> bool {
    let mut changed = false;
    for (path, value) in set {
        if path == ID_FIELD {
            continue;
        }
        changed |= set_path(doc, path, value.clone());
    }
    changed
}

/// Apply an array mutation to one document.
///
/// Returns `true` when the document changed.
pub fn apply_array_update(doc: &mut Document, update: &ArrayUpdate) -> StoreResult<bool> {
    match update {
        ArrayUpdate::Push {
            field,
            items,
            position,
        } => {
            if items.is_empty() {
                return Ok(false);
            }
            if get_path(doc, field).is_none() {
                set_path(doc, field, Value::Array(Vec::new()));
            }
            let array = array_at(doc, field)?;
            let at = match position {
                Some(p) if *p >= 0 => (*p as usize).min(array.len()),
                _ => array.len(),
            };
            for (offset, item) in items.iter().enumerate() {
                array.insert(at + offset, item.clone());
            }
            Ok(true)
        }
        ArrayUpdate::Pull { field, condition } => {
            if get_path(doc, field).is_none() {
                return Ok(false);
            }
            let array = array_at(doc, field)?;
            let before = array.len();
            array.retain(|item| match item {
                Value::Object(element) => !condition.matches(element),
                _ => true,
            });
            Ok(array.len() != before)
        }
        ArrayUpdate::SetPositional {
            field,
            element_filter,
            values,
        } => {
            if get_path(doc, field).is_none() {
                return Ok(false);
            }
            let array = array_at(doc, field)?;
            let element = array.iter_mut().find_map(|item| match item {
                Value::Object(element) if element_filter.matches(element) => Some(element),
                _ => None,
            });
            Ok(match element {
                Some(element) => apply_set(element, values),
                None => false,
            })
        }
    }
}

fn array_at<'a>(doc: &'a mut Document, path: &str) -> StoreResult<&'a mut Vec<Value>> {
    let mut segments = path.split('.');
    let first = segments.next().unwrap_or(path);
    let mut current = doc.get_mut(first);
    for segment in segments {
        current = match current {
            Some(Value::Object(map)) => map.get_mut(segment),
            _ => None,
        };
    }
    match current {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(StoreError::InvalidFieldType {
            field: path.to_string(),
        }),
    }
}

/// Run a pipeline over `docs`
pub fn run_pipeline(docs: Vec<Document>, pipeline: &[Stage]) -> Vec<Document> {
    pipeline.iter().fold(docs, |docs, stage| match stage {
        Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
        Stage::Project(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
        Stage::Unwind(path) => docs.iter().flat_map(|d| unwind(d, path)).collect(),
    })
}

/// One copy of `doc` per element of the array at `path`.
///
/// Missing, null and empty arrays produce nothing; any other scalar is
/// treated as a one-element array.
pub fn unwind(doc: &Document, path: &str) -> Vec<Document> {
    let elements = match get_path(doc, path) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };

    elements
        .into_iter()
        .map(|element| {
            let mut copy = doc.clone();
            set_path(&mut copy, path, element);
            copy
        })
        .collect()
}

/// Values of `fields` in `doc`, or `None` if any is missing or null
pub fn index_key(doc: &Document, fields: &[String]) -> Option<Vec<Value>> {
    fields
        .iter()
        .map(|field| match get_path(doc, field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, Projection};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn names(doc: &Document) -> Vec<String> {
        doc["steps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_is_live() {
        assert!(is_live(&doc(json!({"name": "a"}))));
        assert!(is_live(&doc(json!({"is_deleted": false}))));
        assert!(!is_live(&doc(json!({"is_deleted": true}))));
    }

    #[test]
    fn test_apply_set_reports_changes() {
        let mut d = doc(json!({"_id": "1", "name": "a"}));
        assert!(!apply_set(&mut d, &doc(json!({"name": "a"}))));
        assert!(apply_set(&mut d, &doc(json!({"name": "b", "_id": "2"}))));
        assert_eq!(d["name"], "b");
        assert_eq!(d["_id"], "1");
    }

    #[test]
    fn test_push_at_position() {
        let mut d = doc(json!({"steps": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}));
        let update = ArrayUpdate::Push {
            field: "steps".to_string(),
            items: vec![json!({"name": "x"})],
            position: Some(1),
        };
        assert!(apply_array_update(&mut d, &update).unwrap());
        assert_eq!(names(&d), vec!["a", "x", "b", "c"]);

        let append = ArrayUpdate::Push {
            field: "steps".to_string(),
            items: vec![json!({"name": "z"})],
            position: Some(-1),
        };
        apply_array_update(&mut d, &append).unwrap();
        assert_eq!(names(&d), vec!["a", "x", "b", "c", "z"]);
    }

    #[test]
    fn test_push_creates_missing_array() {
        let mut d = doc(json!({"_id": "1"}));
        let update = ArrayUpdate::Push {
            field: "steps".to_string(),
            items: vec![json!({"name": "a"})],
            position: None,
        };
        assert!(apply_array_update(&mut d, &update).unwrap());
        assert_eq!(names(&d), vec!["a"]);
    }

    #[test]
    fn test_push_into_scalar_fails() {
        let mut d = doc(json!({"steps": 3}));
        let update = ArrayUpdate::Push {
            field: "steps".to_string(),
            items: vec![json!(1)],
            position: None,
        };
        assert!(matches!(
            apply_array_update(&mut d, &update),
            Err(StoreError::InvalidFieldType { .. })
        ));
    }

    #[test]
    fn test_pull_and_set_positional() {
        let mut d = doc(json!({"steps": [{"_id": "1", "name": "a"}, {"_id": "2", "name": "b"}]}));

        let set = ArrayUpdate::SetPositional {
            field: "steps".to_string(),
            element_filter: Filter::new().with("_id", "2"),
            values: doc(json!({"name": "renamed"})),
        };
        assert!(apply_array_update(&mut d, &set).unwrap());
        assert!(!apply_array_update(&mut d, &set).unwrap());
        assert_eq!(names(&d), vec!["a", "renamed"]);

        let pull = ArrayUpdate::Pull {
            field: "steps".to_string(),
            condition: Filter::new().with("_id", "1"),
        };
        assert!(apply_array_update(&mut d, &pull).unwrap());
        assert!(!apply_array_update(&mut d, &pull).unwrap());
        assert_eq!(names(&d), vec!["renamed"]);
    }

    #[test]
    fn test_unwind_pipeline() {
        let docs = vec![
            doc(json!({"_id": "p1", "steps": [{"name": "a"}, {"name": "b"}], "other": 1})),
            doc(json!({"_id": "p2", "steps": []})),
        ];
        let out = run_pipeline(
            docs,
            &[
                Stage::Project(Projection::new().include("steps")),
                Stage::Unwind("steps".to_string()),
                Stage::Match(Filter::new().with("steps.name", "b")),
            ],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(
            Value::Object(out[0].clone()),
            json!({"_id": "p1", "steps": {"name": "b"}})
        );
    }

    #[test]
    fn test_index_key() {
        let fields = vec!["name".to_string(), "owner.email".to_string()];
        let d = doc(json!({"name": "a", "owner": {"email": "x"}}));
        assert_eq!(index_key(&d, &fields), Some(vec![json!("a"), json!("x")]));
        assert_eq!(index_key(&doc(json!({"name": "a"})), &fields), None);
    }
}
