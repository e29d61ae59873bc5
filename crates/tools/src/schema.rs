//! Tool input-schema normalization.
//!
//! Every adapter derives its tool shape from the same normalized schema:
//! an object schema with a `properties` object and, when present, a
//! `required` list of strings.

use serde_json::{Map, Value, json};

pub fn normalize_schema(schema: &Value) -> Value {
    let Value::Object(source) = schema else {
        return json!({ "type": "object", "properties": {} });
    };

    let mut out: Map<String, Value> = source.clone();
    out.insert("type".into(), json!("object"));

    if !matches!(out.get("properties"), Some(Value::Object(_))) {
        out.insert("properties".into(), json!({}));
    }

    match out.get("required") {
        Some(Value::Array(items)) => {
            let required: Vec<Value> = items.iter().filter(|v| v.is_string()).cloned().collect();
            if required.is_empty() {
                out.remove("required");
            } else {
                out.insert("required".into(), Value::Array(required));
            }
        }
        Some(_) => {
            out.remove("required");
        }
        None => {}
    }

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_object_becomes_empty_object_schema() {
        assert_eq!(normalize_schema(&json!(null)), json!({"type": "object", "properties": {}}));
        assert_eq!(normalize_schema(&json!("string")), json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn missing_properties_added_and_type_forced() {
        let schema = normalize_schema(&json!({"description": "x"}));
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"], json!({}));
        assert_eq!(schema["description"], "x");
    }

    #[test]
    fn required_filtered_to_strings() {
        let schema = normalize_schema(&json!({
            "type": "object",
            "properties": {"q": {"type": "string"}},
            "required": ["q", 3, null]
        }));
        assert_eq!(schema["required"], json!(["q"]));

        let schema = normalize_schema(&json!({"required": "q"}));
        assert!(schema.get("required").is_none());
    }
}
