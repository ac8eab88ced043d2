//! Evaluation of Mongo-style filters, sorts and projections on documents
//!
//! Supports the subset of the Mongo query language that resource services
//! actually send:
//! - implicit equality (`{"name": "Ada"}`), matching array elements too
//! - `$eq $ne $gt $gte $lt $lte $in $nin $exists $regex $options $not`
//! - logical `$and $or $nor`
//! - dotted paths (`{"address.city": "Lyon"}`)
//!
//! Values of different kinds order as null < number < string < object <
//! array < boolean, and range operators only match values of the same kind.

use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

use crate::core::entity::{Document, PRIMARY_KEY};
use crate::core::error::StorageError;
use crate::core::query::{bare_field, is_exclusion};

const BACKEND: &str = "memory";

fn invalid(message: impl ToString) -> StorageError {
    StorageError::query(BACKEND, message)
}

/// Value at a dotted path, `None` when any segment is missing
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
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

/// Whether `doc` satisfies `filter`
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, StorageError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => logical(doc, condition)?.iter().all(|m| *m),
            "$or" => logical(doc, condition)?.iter().any(|m| *m),
            "$nor" => !logical(doc, condition)?.iter().any(|m| *m),
            op if op.starts_with('$') => {
                return Err(invalid(format!("unknown top-level operator {}", op)));
            }
            path => matches_condition(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical(doc: &Document, clauses: &Value) -> Result<Vec<bool>, StorageError> {
    let Value::Array(clauses) = clauses else {
        return Err(invalid("$and/$or/$nor expect an array"));
    };
    clauses
        .iter()
        .map(|clause| match clause {
            Value::Object(sub) => matches(doc, sub),
            _ => Err(invalid("$and/$or/$nor clauses must be objects")),
        })
        .collect()
}

fn is_operator_object(value: &Value) -> Option<&Document> {
    match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

fn matches_condition(field: Option<&Value>, condition: &Value) -> Result<bool, StorageError> {
    let Some(ops) = is_operator_object(condition) else {
        return Ok(equals(field, condition));
    };

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(field, operand),
            "$ne" => !equals(field, operand),
            "$gt" => compares(field, operand, |o| o == Ordering::Greater),
            "$gte" => compares(field, operand, |o| o != Ordering::Less),
            "$lt" => compares(field, operand, |o| o == Ordering::Less),
            "$lte" => compares(field, operand, |o| o != Ordering::Greater),
            "$in" => in_list(field, operand)?,
            "$nin" => !in_list(field, operand)?,
            "$exists" => field.is_some() == truthy(operand),
            "$regex" => regex_match(field, operand, ops.get("$options"))?,
            "$options" => true,
            "$not" => !matches_condition(field, operand)?,
            other => return Err(invalid(format!("unsupported operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The field value itself, then each element when it is an array
fn candidates(field: &Value) -> Vec<&Value> {
    let mut out = vec![field];
    if let Value::Array(items) = field {
        out.extend(items.iter());
    }
    out
}

fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(value) => candidates(value)
            .into_iter()
            .any(|c| compare_values(c, expected) == Ordering::Equal),
    }
}

fn compares(field: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let null = Value::Null;
    let value = field.unwrap_or(&null);
    candidates(value)
        .into_iter()
        .any(|c| kind_rank(c) == kind_rank(operand) && accept(compare_values(c, operand)))
}

fn in_list(field: Option<&Value>, operand: &Value) -> Result<bool, StorageError> {
    let Value::Array(options) = operand else {
        return Err(invalid("$in/$nin expect an array"));
    };
    Ok(options.iter().any(|option| equals(field, option)))
}

fn regex_match(
    field: Option<&Value>,
    pattern: &Value,
    options: Option<&Value>,
) -> Result<bool, StorageError> {
    let Value::String(pattern) = pattern else {
        return Err(invalid("$regex expects a string"));
    };
    let flags = options.and_then(Value::as_str).unwrap_or_default();
    let re = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| invalid(e))?;

    Ok(field.is_some_and(|value| {
        candidates(value)
            .into_iter()
            .any(|c| c.as_str().is_some_and(|s| re.is_match(s)))
    }))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y.iter())
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Parsed sort keys: field path and whether it is descending
pub fn sort_keys(sort: &Document) -> Result<Vec<(String, bool)>, StorageError> {
    sort.iter()
        .map(|(field, direction)| {
            let descending = match direction {
                Value::Number(n) if n.as_f64() == Some(1.0) => false,
                Value::Number(n) if n.as_f64() == Some(-1.0) => true,
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "asc" | "ascending" => false,
                    "desc" | "descending" => true,
                    _ => return Err(invalid(format!("invalid sort direction '{}'", s))),
                },
                other => return Err(invalid(format!("invalid sort direction {}", other))),
            };
            Ok((field.clone(), descending))
        })
        .collect()
}

/// Sort documents in place; missing fields sort like `null`
pub fn sort_documents(docs: &mut [Document], keys: &[(String, bool)]) {
    let null = Value::Null;
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|(path, descending)| {
                let ordering = compare_values(
                    lookup(a, path).unwrap_or(&null),
                    lookup(b, path).unwrap_or(&null),
                );
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Apply a projection list to a document.
///
/// Inclusion entries keep only the named top-level fields plus `_id`;
/// `-field` entries drop fields. An empty list keeps everything.
pub fn project(doc: &Document, projection: &[String]) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }

    let excluded: Vec<&str> = projection
        .iter()
        .filter(|p| is_exclusion(p))
        .map(|p| bare_field(p))
        .collect();
    let included: Vec<&str> = projection
        .iter()
        .filter(|p| !is_exclusion(p))
        .map(|p| bare_field(p))
        .collect();

    doc.iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            let kept = included.is_empty() || key == PRIMARY_KEY || included.contains(&key);
            kept && !excluded.contains(&key)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
