//! Reusable field validators
//!
//! Each validator receives the field name and its value, and returns the
//! failure message on rejection. Validators ignore values of a type they do
//! not understand, so `string_length` passes numbers through and leaves the
//! type question to another rule.

use regex::Regex;
use serde_json::Value;

/// Validator: field is required (present and not null)
pub fn required() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| {
        if value.is_null() {
            Err(format!("'{}' is required", field))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must be positive
pub fn positive() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num <= 0.0 => Err(format!("'{}' must be positive (got {})", field, num)),
        _ => Ok(()),
    }
}

/// Validator: string length must be within range (in characters)
pub fn string_length(
    min: usize,
    max: usize,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        if len < min {
            Err(format!(
                "'{}' must be at least {} characters (got {})",
                field, min, len
            ))
        } else if len > max {
            Err(format!(
                "'{}' must be at most {} characters (got {})",
                field, max, len
            ))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must not exceed maximum
pub fn max_value(max: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(format!(
            "'{}' must not exceed {} (got {})",
            field, max, num
        )),
        _ => Ok(()),
    }
}

/// Validator: value must be in allowed list
pub fn in_list(
    allowed: Vec<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_str() {
        Some(s) if !allowed.iter().any(|a| a == s) => Err(format!(
            "'{}' must be one of {:?} (got {})",
            field, allowed, s
        )),
        _ => Ok(()),
    }
}

/// Validator: string must match the regular expression
pub fn pattern(re: Regex) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_str() {
        Some(s) if !re.is_match(s) => Err(format!(
            "'{}' does not match pattern {} (got {})",
            field,
            re.as_str(),
            s
        )),
        _ => Ok(()),
    }
}

/// Validator: string must look like an email address
pub fn email() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid");
    pattern(re)
}
