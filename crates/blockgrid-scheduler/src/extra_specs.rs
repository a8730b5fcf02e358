//! Operator matching of extra-spec requirements against capability values.
//!
//! A requirement is either a plain value (string equality) or an operator
//! followed by operands:
//!
//! | operator | meaning |
//! |---|---|
//! | `=` | numeric, value >= operand |
//! | `==` `!=` `>=` `<=` | numeric comparison |
//! | `s==` `s!=` `s<` `s<=` `s>` `s>=` | string comparison |
//! | `<in>` | operand is a substring of the value |
//! | `<all-in>` | every operand is a substring of the value |
//! | `<is>` | boolean equality |
//! | `<or>` | value equals any of the alternatives |

use std::cmp::Ordering;

use serde_json::Value;

use crate::collab::SpecMatcher;

#[derive(Debug, Default, Clone, Copy)]
pub struct ExtraSpecsMatcher;

impl SpecMatcher for ExtraSpecsMatcher {
    fn matches(&self, value: &Value, requirement: &str) -> bool {
        if value.is_null() {
            return false;
        }
        let words: Vec<&str> = requirement.split_whitespace().collect();
        let Some((&op, operands)) = words.split_first() else {
            return plain_equals(value, requirement);
        };

        match op {
            "=" | ">=" => numeric(value, operands, |o| o != Ordering::Less),
            "==" => numeric(value, operands, |o| o == Ordering::Equal),
            "!=" => numeric(value, operands, |o| o != Ordering::Equal),
            "<=" => numeric(value, operands, |o| o != Ordering::Greater),
            "s==" => string(value, operands, |o| o == Ordering::Equal),
            "s!=" => string(value, operands, |o| o != Ordering::Equal),
            "s<" => string(value, operands, |o| o == Ordering::Less),
            "s<=" => string(value, operands, |o| o != Ordering::Greater),
            "s>" => string(value, operands, |o| o == Ordering::Greater),
            "s>=" => string(value, operands, |o| o != Ordering::Less),
            "<in>" => match (value_text(value), operands.first()) {
                (Some(text), Some(needle)) => text.contains(needle),
                _ => false,
            },
            "<all-in>" => match value_text(value) {
                Some(text) if !operands.is_empty() => operands.iter().all(|n| text.contains(n)),
                _ => false,
            },
            "<is>" => match (value_bool(value), operands.first().and_then(|o| parse_bool(o))) {
                (Some(have), Some(want)) => have == want,
                _ => false,
            },
            "<or>" => {
                let text = value_text(value);
                operands
                    .iter()
                    .filter(|w| **w != "<or>")
                    .any(|alt| text.as_deref() == Some(*alt))
            }
            _ => plain_equals(value, requirement),
        }
    }
}

fn numeric(value: &Value, operands: &[&str], accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(have) = value_number(value) else {
        return false;
    };
    let Some(want) = operands.first().and_then(|o| o.parse::<f64>().ok()) else {
        return false;
    };
    have.partial_cmp(&want).is_some_and(accept)
}

fn string(value: &Value, operands: &[&str], accept: impl Fn(Ordering) -> bool) -> bool {
    match (value_text(value), operands.first()) {
        (Some(have), Some(want)) => accept(have.as_str().cmp(want)),
        _ => false,
    }
}

fn plain_equals(value: &Value, requirement: &str) -> bool {
    if let Value::Bool(b) = value {
        return parse_bool(requirement.trim()) == Some(*b);
    }
    value_text(value).is_some_and(|text| text == requirement)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        _ => None,
    }
}

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
