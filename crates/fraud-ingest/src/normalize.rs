//! Path: crates/fraud-ingest/src/normalize.rs
//! §4.1 step 1: accept a single transaction object, `{transactions: [...]}`,
//! or a bare list, and normalise all three shapes into one flat list.
use crate::AppError;

pub fn normalize(body: serde_json::Value) -> Result<Vec<serde_json::Value>, AppError> {
    match body {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut map) => {
            if let Some(serde_json::Value::Array(items)) = map.remove("transactions") {
                Ok(items)
            } else if map.is_empty() {
                Err(AppError::BadRequest("empty request body".to_string()))
            } else {
                Ok(vec![serde_json::Value::Object(map)])
            }
        }
        _ => Err(AppError::BadRequest(
            "body must be a transaction object, a {transactions: [...]} wrapper, or a list".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_a_bare_list() {
        let out = normalize(json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn normalizes_a_wrapped_object() {
        let out = normalize(json!({"transactions": [{"a": 1}]})).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn normalizes_a_single_object() {
        let out = normalize(json!({"a": 1})).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn rejects_a_scalar_body() {
        assert!(normalize(json!(42)).is_err());
    }
}
