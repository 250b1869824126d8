use serde_json::Value;

/// Masks payer-identifying fields in callback and request payloads before
/// they are logged.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "msisdn" | "phone" | "firstname" | "middlename" | "lastname" | "password" | "authorization"
    )
}

/// Keeps the last three characters of phone-like values; names are fully masked.
pub fn mask_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => mask_string(&n.to_string()),
        Value::String(s) => mask_string(s),
        _ => Value::String("****".to_string()),
    }
}

fn mask_string(s: &str) -> Value {
    if s.len() > 8 && s.chars().all(|c| c.is_ascii_digit() || c == '+') {
        Value::String(format!("*****{}", &s[s.len() - 3..]))
    } else {
        Value::String("****".to_string())
    }
}
