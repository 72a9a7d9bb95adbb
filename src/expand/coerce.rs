//! Conversion between token text and typed script values
//!
//! Coercion is strict on the way in (every argument must match its declared
//! type exactly) and best-effort on the way out (a result whose runtime type
//! disagrees with the manifest is rendered in its generic form).

use std::fmt;

use crate::error::{MacroError, Result};
use crate::plugins::manifest::TypeTag;

/// A value that may be passed into a plugin function.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

/// A value returned by a plugin function.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    Value(TypedValue),
    Nil,
    /// Tables, functions and other values that only have a `tostring` form
    Opaque(String),
}

impl fmt::Display for ReturnValue {
    /// Generic string form, used when the declared type does not match
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(TypedValue::String(s)) => f.write_str(s),
            Self::Value(TypedValue::Number(n)) => write!(f, "{}", format_generic_number(*n)),
            Self::Value(TypedValue::Boolean(b)) => write!(f, "{b}"),
            Self::Nil => f.write_str("nil"),
            Self::Opaque(s) => f.write_str(s),
        }
    }
}

fn format_generic_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Convert raw argument text into typed values according to `params`.
///
/// # Errors
/// Returns [`MacroError::Type`] on an arity mismatch, an argument that does
/// not match its declared type, or a declared type that cannot be passed.
pub fn coerce_args(raw_args: &[String], params: &[TypeTag]) -> Result<Vec<TypedValue>> {
    if raw_args.len() != params.len() {
        return Err(MacroError::Type(format!(
            "expected {} args, got {}",
            params.len(),
            raw_args.len()
        )));
    }

    raw_args
        .iter()
        .zip(params)
        .map(|(raw, tag)| coerce_arg(raw.trim(), tag))
        .collect()
}

fn coerce_arg(raw: &str, tag: &TypeTag) -> Result<TypedValue> {
    match tag {
        TypeTag::String => {
            if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
                Ok(TypedValue::String(raw[1..raw.len() - 1].to_string()))
            } else {
                Err(MacroError::Type("string args must be in quotes".to_string()))
            }
        }
        // The whole argument must be a finite number; `3abc`, `inf` and `NaN` fail
        TypeTag::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(TypedValue::Number)
            .ok_or_else(|| MacroError::Type(format!("failed to parse number arg: {raw}"))),
        TypeTag::Boolean => match raw {
            "true" => Ok(TypedValue::Boolean(true)),
            "false" => Ok(TypedValue::Boolean(false)),
            _ => Err(MacroError::Type(
                "boolean args must be true or false".to_string(),
            )),
        },
        TypeTag::Other(other) => Err(MacroError::Type(format!(
            "unsupported param type: {other}"
        ))),
    }
}

/// Render returned values as text, pairing them with `returns` in order.
#[must_use]
pub fn decode_returns(values: &[ReturnValue], returns: &[TypeTag]) -> Vec<String> {
    values
        .iter()
        .zip(returns)
        .map(|(value, tag)| match (tag, value) {
            (TypeTag::String, ReturnValue::Value(TypedValue::String(s))) => s.clone(),
            (TypeTag::Number, ReturnValue::Value(TypedValue::Number(n))) => format!("{n:.6}"),
            (TypeTag::Boolean, ReturnValue::Value(TypedValue::Boolean(b))) => b.to_string(),
            _ => value.to_string(),
        })
        .collect()
}
