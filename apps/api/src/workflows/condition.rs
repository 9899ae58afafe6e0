use serde_json::{Number, Value};

use crate::models::lead::Lead;
use crate::workflows::steps::ConditionOperator;

/// Evaluates a CONDITION step against the live lead record.
/// Missing fields and unparseable numbers never match.
pub fn evaluate(lead: &Lead, field: &str, operator: &ConditionOperator, expected: &Value) -> bool {
    let record = match serde_json::to_value(lead) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let actual = lookup(&record, field);

    match operator {
        ConditionOperator::Equals => match actual {
            // numeric fields compare by value, so 1000.0 equals "1000"
            Some(Value::Number(n)) => match (n.as_f64(), as_number(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            _ => match (actual.and_then(as_text), as_text(expected)) {
                (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
                _ => false,
            },
        },
        ConditionOperator::GreaterThan => {
            match (actual.and_then(as_number), as_number(expected)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            }
        }
        ConditionOperator::Contains => match (actual.and_then(as_text), as_text(expected)) {
            (Some(a), Some(b)) => a.to_lowercase().contains(&b.to_lowercase()),
            _ => false,
        },
        ConditionOperator::NotEmpty => actual.is_some_and(is_truthy),
        ConditionOperator::Unsupported(_) => false,
    }
}

/// Resolves a dotted path (`preferences.city`). Segments may be camelCase or snake_case.
fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(record, |node, segment| {
            let object = node.as_object()?;
            object
                .get(segment)
                .or_else(|| object.get(&snake_to_camel(segment)))
        })
}

fn snake_to_camel(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper = false;
    for c in segment.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(as_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Whole floats print without a fraction: 1000.0 reads as "1000".
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
