//! Request and response messages exchanged with management clients.
//!
//! Values travel as plain JSON. Binary values are sent as arrays of
//! integers; parameters declared as `bytes` turn them back into bytes when
//! the arguments are coerced.

use serde::{Deserialize, Serialize};
use simplemx_core::{Error, MetadataRecord, StructuredName, Value, ValueType};

/// A client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Names of every published object.
    List,

    /// Metadata record of one object.
    Describe { name: StructuredName },

    /// Read an attribute.
    Get {
        name: StructuredName,
        attribute: String,
    },

    /// Write an attribute.
    Set {
        name: StructuredName,
        attribute: String,
        value: serde_json::Value,
    },

    /// Invoke an operation, optionally pinning the overload by signature.
    Invoke {
        name: StructuredName,
        operation: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<Vec<ValueType>>,
    },
}

/// The answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Names { names: Vec<StructuredName> },
    Metadata { metadata: MetadataRecord },
    Value { value: serde_json::Value },
    Ok,
    /// `kind` is the stable identifier of the failure, e.g. `not_found`.
    Error { kind: String, message: String },
}

impl Response {
    pub fn value(value: Value) -> Self {
        Response::Value {
            value: value_to_json(value),
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&Error> for Response {
    fn from(err: &Error) -> Self {
        Response::error(err.kind(), err.to_string())
    }
}

/// Convert a [`Value`] to JSON.
///
/// Non-finite floats have no JSON form and become `null`.
pub fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Integer(i) => serde_json::Value::Number(i.into()),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s),
        Value::Bytes(b) => serde_json::Value::Array(
            b.into_iter()
                .map(|byte| serde_json::Value::Number(byte.into()))
                .collect(),
        ),
        Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
    }
}

/// Convert JSON to a [`Value`].
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name() -> StructuredName {
        "j256:00=FolderName,name=testObject".parse().unwrap()
    }

    #[test]
    fn requests_are_tagged() {
        let req = Request::Get {
            name: name(),
            attribute: "foo".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "type": "get",
                "name": "j256:00=FolderName,name=testObject",
                "attribute": "foo",
            })
        );

        let parsed: Request = serde_json::from_value(json!({"type": "list"})).unwrap();
        assert_eq!(parsed, Request::List);
    }

    #[test]
    fn invoke_defaults() {
        let parsed: Request = serde_json::from_value(json!({
            "type": "invoke",
            "name": "j256:name=testObject",
            "operation": "resetFoo",
        }))
        .unwrap();
        match parsed {
            Request::Invoke {
                args, signature, ..
            } => {
                assert!(args.is_empty());
                assert!(signature.is_none());
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let pinned = Request::Invoke {
            name: name(),
            operation: "scale".into(),
            args: vec![json!("3")],
            signature: Some(vec![ValueType::Float]),
        };
        let wire = serde_json::to_value(&pinned).unwrap();
        assert_eq!(wire["signature"], json!(["float"]));
    }

    #[test]
    fn malformed_names_rejected() {
        let parsed = serde_json::from_value::<Request>(json!({
            "type": "describe",
            "name": "no-domain-here",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn errors_carry_kind() {
        let err = Error::NotFound(name());
        let resp = Response::from(&err);
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({
                "type": "error",
                "kind": "not_found",
                "message": "no managed object registered as j256:00=FolderName,name=testObject",
            })
        );
    }

    #[test]
    fn bytes_travel_as_integer_arrays() {
        assert_eq!(value_to_json(Value::Bytes(vec![0, 7, 255])), json!([0, 7, 255]));
        assert_eq!(
            json_to_value(json!([0, 7, 255])),
            Value::Array(vec![Value::Integer(0), Value::Integer(7), Value::Integer(255)])
        );
    }

    #[test]
    fn json_numbers() {
        assert_eq!(json_to_value(json!(42)), Value::Integer(42));
        assert_eq!(json_to_value(json!(1.5)), Value::Float(1.5));
        assert_eq!(value_to_json(Value::Float(f64::NAN)), json!(null));
        assert_eq!(
            json_to_value(json!({"a": [true, null]})),
            Value::Map(
                [(
                    "a".to_string(),
                    Value::Array(vec![Value::Bool(true), Value::Null])
                )]
                .into_iter()
                .collect()
            )
        );
    }
}
