use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
struct BalanceJsonResponse {
    #[serde(default)]
    balance: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagesJsonResponse {
    #[serde(default)]
    total: Option<Value>,
}

/// Amount reported by the gateway as either a JSON number or a numeric string.
fn amount_from_value(value: Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn count_from_value(value: Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Response structs also accept JSON arrays; only objects count as the expected shape.
fn object_only(value: Value) -> Option<Value> {
    value.is_object().then_some(value)
}

/// Decode `GET /api/balance`.
///
/// Only malformed JSON is an error; a missing or mis-typed `balance` yields `None`.
pub fn decode_balance_json_response(json: &str) -> Result<Option<f64>, TransportError> {
    let value: Value = serde_json::from_str(json)?;
    let parsed = object_only(value)
        .and_then(|it| serde_json::from_value::<BalanceJsonResponse>(it).ok());
    Ok(parsed
        .and_then(|it| it.balance)
        .and_then(amount_from_value))
}

/// Decode `GET /v2/messages`.
///
/// Only malformed JSON is an error; a missing or mis-typed `total` yields `None`.
pub fn decode_total_messages_json_response(json: &str) -> Result<Option<u64>, TransportError> {
    let value: Value = serde_json::from_str(json)?;
    let parsed = object_only(value)
        .and_then(|it| serde_json::from_value::<MessagesJsonResponse>(it).ok());
    Ok(parsed.and_then(|it| it.total).and_then(count_from_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_balance_supports_numeric_and_string_amounts() {
        let parsed = decode_balance_json_response(r#"{"balance": 12.345}"#).unwrap();
        assert_eq!(parsed, Some(12.345));

        let parsed = decode_balance_json_response(r#"{"balance": "10.50"}"#).unwrap();
        assert_eq!(parsed, Some(10.5));
    }

    #[test]
    fn decode_balance_treats_shape_mismatch_as_absent() {
        assert_eq!(decode_balance_json_response("{}").unwrap(), None);
        assert_eq!(
            decode_balance_json_response(r#"{"balance": {"eur": 1}}"#).unwrap(),
            None
        );
        assert_eq!(decode_balance_json_response("[1, 2]").unwrap(), None);
    }

    #[test]
    fn decode_balance_rejects_malformed_json() {
        assert!(matches!(
            decode_balance_json_response("{ not json }"),
            Err(TransportError::Json(_))
        ));
    }

    #[test]
    fn decode_total_messages_reads_total() {
        let json = r#"
        {
          "total": 1532,
          "data": []
        }
        "#;
        assert_eq!(
            decode_total_messages_json_response(json).unwrap(),
            Some(1532)
        );
        assert_eq!(
            decode_total_messages_json_response(r#"{"total": "7"}"#).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn decode_total_messages_treats_shape_mismatch_as_absent() {
        assert_eq!(decode_total_messages_json_response("{}").unwrap(), None);
        assert_eq!(
            decode_total_messages_json_response(r#"{"total": -3}"#).unwrap(),
            None
        );
        assert_eq!(decode_total_messages_json_response("null").unwrap(), None);
    }
}
