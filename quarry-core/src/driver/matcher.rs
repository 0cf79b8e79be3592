//! Matcher - In-process evaluation of document filters
//!
//! Follows document-store semantics: a field holding an array matches a
//! scalar condition if any element does, and a missing field equals `null`.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use crate::storage::{StorageError, StorageResult};
use crate::Record;

/// True if `document` satisfies `filter`.
///
/// # Errors
/// Returns `Unsupported` for operators this evaluator does not implement
/// (geo operators) and `Internal` for malformed filters.
pub fn matches(document: &Record, filter: &Value) -> StorageResult<bool> {
    let Value::Object(filter) = filter else {
        return Err(StorageError::internal(format!(
            "filter must be a document, got {filter}"
        )));
    };

    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$or" => any_branch(document, condition)?,
            "$and" => all_branches(document, condition)?,
            "$nor" => !any_branch(document, condition)?,
            _ => match_field(lookup(document, key), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn branches(condition: &Value) -> StorageResult<&Vec<Value>> {
    condition
        .as_array()
        .ok_or_else(|| StorageError::internal("logical operator expects an array of filters"))
}

fn any_branch(document: &Record, condition: &Value) -> StorageResult<bool> {
    for branch in branches(condition)? {
        if matches(document, branch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_branches(document: &Record, condition: &Value) -> StorageResult<bool> {
    for branch in branches(condition)? {
        if !matches(document, branch)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolve a dotted path.
fn lookup<'a>(document: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// `Some(ops)` if `condition` is a non-empty document of `$` operators.
fn operator_document(condition: &Value) -> Option<&Map<String, Value>> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

fn match_field(field: Option<&Value>, condition: &Value) -> StorageResult<bool> {
    let Some(ops) = operator_document(condition) else {
        return Ok(equals(field, condition));
    };

    for (op, argument) in ops {
        if !match_operator(field, op, argument, ops)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_operator(
    field: Option<&Value>,
    op: &str,
    argument: &Value,
    siblings: &Map<String, Value>,
) -> StorageResult<bool> {
    let matched = match op {
        "$eq" => equals(field, argument),
        "$ne" => !equals(field, argument),
        "$gt" => ordered(field, argument, |o| o == Ordering::Greater),
        "$gte" => ordered(field, argument, |o| o != Ordering::Less),
        "$lt" => ordered(field, argument, |o| o == Ordering::Less),
        "$lte" => ordered(field, argument, |o| o != Ordering::Greater),
        "$in" => in_list(field, argument)?,
        "$nin" => !in_list(field, argument)?,
        "$mod" => modulo(field, argument)?,
        "$all" => {
            let wanted = argument
                .as_array()
                .ok_or_else(|| StorageError::internal("$all expects an array"))?;
            matches!(field, Some(Value::Array(_))) && wanted.iter().all(|w| equals(field, w))
        }
        "$size" => match (field, argument.as_u64()) {
            (Some(Value::Array(items)), Some(n)) => items.len() as u64 == n,
            _ => false,
        },
        "$exists" => field.is_some() == argument.as_bool().unwrap_or(true),
        "$not" => match argument {
            Value::Object(_) => !match_field(field, argument)?,
            _ => return Err(StorageError::internal("$not expects an operator document")),
        },
        "$regex" => {
            let options = siblings.get("$options").and_then(Value::as_str).unwrap_or("");
            regex_match(field, argument, options)?
        }
        // Consumed by $regex
        "$options" => true,
        "$elemMatch" => elem_match(field, argument)?,
        other => {
            return Err(StorageError::unsupported(format!(
                "operator {other} cannot be evaluated in memory"
            )))
        }
    };
    Ok(matched)
}

/// Equality, with array-contains semantics and missing-equals-null.
fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(value) => {
            values_equal(value, expected)
                || matches!(value, Value::Array(items) if items.iter().any(|i| values_equal(i, expected)))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Range comparison; only values of the same kind are comparable.
fn ordered(field: Option<&Value>, argument: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| type_rank(value) == type_rank(argument) && accept(compare_values(value, argument));
    match field {
        None => false,
        Some(Value::Array(items)) if !argument.is_array() => items.iter().any(check),
        Some(value) => check(value),
    }
}

fn in_list(field: Option<&Value>, argument: &Value) -> StorageResult<bool> {
    let candidates = argument
        .as_array()
        .ok_or_else(|| StorageError::internal("$in/$nin expects an array"))?;
    Ok(candidates.iter().any(|c| equals(field, c)))
}

fn modulo(field: Option<&Value>, argument: &Value) -> StorageResult<bool> {
    let (divisor, remainder) = crate::translate::mod_argument(argument)
        .filter(|(d, _)| *d != 0)
        .ok_or_else(|| StorageError::internal("$mod expects [divisor, remainder]"))?;
    let check = |value: &Value| {
        value
            .as_f64()
            .is_some_and(|n| {
                // i64::MIN % -1 overflows; the true remainder is 0
                (n.trunc() as i64).checked_rem(divisor).unwrap_or(0) == remainder
            })
    };
    Ok(match field {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
        None => false,
    })
}

fn regex_match(field: Option<&Value>, pattern: &Value, options: &str) -> StorageResult<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StorageError::internal("$regex expects a string pattern"))?;
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .build()
        .map_err(|e| StorageError::internal(format!("invalid pattern {pattern:?}: {e}")))?;

    let check = |value: &Value| value.as_str().is_some_and(|s| regex.is_match(s));
    Ok(match field {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
        None => false,
    })
}

fn elem_match(field: Option<&Value>, condition: &Value) -> StorageResult<bool> {
    let Some(Value::Array(items)) = field else {
        return Ok(false);
    };
    for item in items {
        let matched = match (item, operator_document(condition)) {
            (_, Some(_)) => match_field(Some(item), condition)?,
            (Value::Object(doc), None) => matches(doc, condition)?,
            (_, None) => false,
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

// =============================================================================
// Ordering
// =============================================================================

/// Cross-type ordering rank: null, numbers, strings, objects, arrays, booleans.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over values, used for sorting.
#[must_use]
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
            .zip(y)
            .map(|(a, b)| compare_values(a, b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => Value::Object(x.clone())
            .to_string()
            .cmp(&Value::Object(y.clone()).to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// =============================================================================
// Tests
// =============================================================================
