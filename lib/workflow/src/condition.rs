//! Condition evaluation for `condition` nodes.
//!
//! A condition reads `config.field`, `config.operator` and `config.value`
//! and compares `context[field]` against `value`. Evaluation never fails: a
//! malformed config or unknown operator evaluates to `false`.
//!
//! Casts follow the loose scripting semantics workflow authors expect for
//! `contains` and the ordering operators, while `equals` is strict.

use crate::model::Context;
use serde_json::Value as JsonValue;

/// Comparison operators understood by condition nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    /// Parses an operator name, returning `None` for anything unknown.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "equals" => Self::Equals,
            "not_equals" => Self::NotEquals,
            "contains" => Self::Contains,
            "greater_than" => Self::GreaterThan,
            "less_than" => Self::LessThan,
            "is_empty" => Self::IsEmpty,
            "is_not_empty" => Self::IsNotEmpty,
            _ => return None,
        })
    }

    /// Applies the operator. `None` stands for a missing value.
    #[must_use]
    pub fn apply(self, actual: Option<&JsonValue>, target: Option<&JsonValue>) -> bool {
        match self {
            Self::Equals => strict_equals(actual, target),
            Self::NotEquals => !strict_equals(actual, target),
            Self::Contains => to_display_string(actual).contains(&to_display_string(target)),
            Self::GreaterThan => to_number(actual) > to_number(target),
            Self::LessThan => to_number(actual) < to_number(target),
            Self::IsEmpty => is_empty(actual),
            Self::IsNotEmpty => !is_empty(actual),
        }
    }
}

/// Evaluates a condition node's config against the current context.
#[must_use]
pub fn evaluate(config: &Context, context: &Context) -> bool {
    let Some(operator) = config
        .get("operator")
        .and_then(JsonValue::as_str)
        .and_then(Operator::parse)
    else {
        return false;
    };
    let actual = config
        .get("field")
        .and_then(JsonValue::as_str)
        .and_then(|field| context.get(field));

    operator.apply(actual, config.get("value"))
}

// Arrays and objects compare structurally, not by identity, so two equal
// literals match. A missing field only equals a missing target.
fn strict_equals(actual: Option<&JsonValue>, target: Option<&JsonValue>) -> bool {
    match (actual, target) {
        (None, None) => true,
        (Some(JsonValue::Number(a)), Some(JsonValue::Number(b))) => a.as_f64() == b.as_f64(),
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn is_empty(value: Option<&JsonValue>) -> bool {
    !is_truthy(value)
}

pub(crate) fn is_truthy(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(_) | JsonValue::Object(_)) => true,
    }
}

fn to_display_string(value: Option<&JsonValue>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(JsonValue::Null) => "null".to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| match item {
                JsonValue::Null => String::new(),
                other => to_display_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(JsonValue::Object(_)) => "[object Object]".to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// Numeric cast; `NaN` for values without a numeric reading, which makes
/// every ordering comparison false.
fn to_number(value: Option<&JsonValue>) -> f64 {
    match value {
        None => f64::NAN,
        Some(JsonValue::Null) => 0.0,
        Some(JsonValue::Bool(b)) => f64::from(u8::from(*b)),
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(JsonValue::String(s)) => parse_numeric_string(s),
        Some(JsonValue::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => to_number(Some(single)),
            _ => f64::NAN,
        },
        Some(JsonValue::Object(_)) => f64::NAN,
    }
}

fn parse_numeric_string(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.trim_start_matches(['+', '-']) {
        "Infinity" => {
            return if trimmed.starts_with('-') {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
        rest if rest.chars().any(|c| c.is_alphabetic() && c != 'e' && c != 'E') => {
            return f64::NAN;
        }
        _ => {}
    }
    trimmed.parse().unwrap_or(f64::NAN)
}
