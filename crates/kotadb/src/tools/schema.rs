//! Minimal JSON-Schema validation for tool inputs.
//!
//! Supports the subset the tool catalog uses: `type`, `properties`,
//! `required`, `enum`, `minimum`/`maximum`, and array `items`. Unknown
//! argument keys are rejected to fail closed.

use kota_core::ToolError;
use serde_json::Value;

/// Validate `args` against `schema`, returning an InvalidParams error with a
/// pointer to the offending field.
pub fn validate(schema: &Value, args: &Value) -> Result<(), ToolError> {
    validate_value(schema, args, "arguments")
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), ToolError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(ToolError::invalid(format!(
                "{path} must be one of [{}]",
                options.join(", ")
            )));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if number < min {
                return Err(ToolError::invalid(format!("{path} must be >= {min}")));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if number > max {
                return Err(ToolError::invalid(format!("{path} must be <= {max}")));
            }
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(field) {
                    return Err(ToolError::invalid(format!(
                        "missing required parameter: {field}"
                    )));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, field_value) in object {
                let Some(field_schema) = properties.get(key) else {
                    return Err(ToolError::invalid(format!("unknown parameter: {key}")));
                };
                validate_value(field_schema, field_value, &format!("{path}.{key}"))?;
            }
        }
    }

    if let Some(items) = schema.get("items") {
        if let Some(array) = value.as_array() {
            for (i, item) in array.iter().enumerate() {
                validate_value(items, item, &format!("{path}[{i}]"))?;
            }
        }
    }

    Ok(())
}

fn check_type(expected: &str, value: &Value, path: &str) -> Result<(), ToolError> {
    let ok = match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ToolError::invalid(format!("{path} must be a {expected}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "number", "minimum": 1, "maximum": 100},
                "output": {"type": "string", "enum": ["full", "paths", "compact", "snippet"]},
                "scope": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["query"]
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        let args = json!({"query": "foo", "limit": 20, "scope": ["code"]});
        assert!(validate(&schema(), &args).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        let err = validate(&schema(), &json!({"limit": 5})).unwrap_err();
        assert!(err.to_string().contains("query"));
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn rejects_wrong_type() {
        let err = validate(&schema(), &json!({"query": 7})).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn rejects_out_of_range() {
        let err = validate(&schema(), &json!({"query": "x", "limit": 0})).unwrap_err();
        assert!(err.to_string().contains(">= 1"));
    }

    #[test]
    fn rejects_unknown_enum_value() {
        let err = validate(&schema(), &json!({"query": "x", "output": "xml"})).unwrap_err();
        assert!(err.to_string().contains("one of"));
    }

    #[test]
    fn rejects_unknown_parameter() {
        let err = validate(&schema(), &json!({"query": "x", "bogus": 1})).unwrap_err();
        assert!(err.to_string().contains("unknown parameter"));
    }
}
