//! Value codec
//!
//! Converts application values to and from the tagged-union wire form.
//! `wrap`/`unwrap` are inverses for every value this module can build.

use crate::proto::{
    number_proto, value_proto, DocumentProto, NumberProto, Special, TupleProto, ValueProto,
};
use prost::Message;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Nesting limit for tuples and documents. Deeper input is treated as
/// something the codec cannot represent.
pub const MAX_VALUE_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("unsupported value: {0}")]
    UnsupportedType(String),
    #[error("document keys must be strings or numbers, got {0}")]
    InvalidKeyType(&'static str),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("unknown behavior code {0}")]
    UnknownBehavior(i32),
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// An immutable application value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    Bytes(Vec<u8>),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    Tuple(Vec<Value>),
    /// Ordered key/value pairs; keys must be strings or numbers.
    Document(Vec<(Value, Value)>),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Tuple(_) => "tuple",
            Value::Document(_) => "document",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Wall-clock time for a `Timestamp` value.
    pub fn as_system_time(&self) -> Option<SystemTime> {
        match self {
            Value::Timestamp(micros) if *micros >= 0 => {
                Some(UNIX_EPOCH + Duration::from_micros(*micros as u64))
            }
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<SystemTime> for Value {
    fn from(time: SystemTime) -> Self {
        let micros = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_micros() as i64,
            Err(e) => -(e.duration().as_micros() as i64),
        };
        Value::Timestamp(micros)
    }
}

/// Serialize a value to its wire bytes.
pub fn wrap(value: &Value) -> Result<Vec<u8>, CodecError> {
    Ok(to_proto(value)?.encode_to_vec())
}

/// Parse wire bytes produced by [`wrap`].
pub fn unwrap(bytes: &[u8]) -> Result<Value, CodecError> {
    from_proto(&ValueProto::decode(bytes)?)
}

pub fn to_proto(value: &Value) -> Result<ValueProto, CodecError> {
    to_proto_at(value, 0)
}

pub fn from_proto(proto: &ValueProto) -> Result<Value, CodecError> {
    from_proto_at(proto, 0)
}

fn to_proto_at(value: &Value, depth: usize) -> Result<ValueProto, CodecError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(CodecError::UnsupportedType(format!(
            "nesting deeper than {}",
            MAX_VALUE_DEPTH
        )));
    }
    let kind = match value {
        Value::String(s) => value_proto::Kind::Characters(s.clone()),
        Value::Number(n) => value_proto::Kind::Number(NumberProto {
            encoding: Some(number_proto::Encoding::Doubled(*n)),
        }),
        Value::Boolean(true) => value_proto::Kind::Special(Special::True as i32),
        Value::Boolean(false) => value_proto::Kind::Special(Special::False as i32),
        Value::Null => value_proto::Kind::Special(Special::Null as i32),
        Value::Bytes(b) => value_proto::Kind::Octets(b.clone()),
        Value::Timestamp(t) => value_proto::Kind::Timestamp(*t),
        Value::Tuple(items) => value_proto::Kind::Tuple(TupleProto {
            values: items
                .iter()
                .map(|v| to_proto_at(v, depth + 1))
                .collect::<Result<_, _>>()?,
        }),
        Value::Document(pairs) => {
            let mut doc = DocumentProto::default();
            for (key, val) in pairs {
                check_document_key(key)?;
                doc.keys.push(to_proto_at(key, depth + 1)?);
                doc.values.push(to_proto_at(val, depth + 1)?);
            }
            value_proto::Kind::Document(doc)
        }
    };
    Ok(ValueProto { kind: Some(kind) })
}

fn from_proto_at(proto: &ValueProto, depth: usize) -> Result<Value, CodecError> {
    if depth > MAX_VALUE_DEPTH {
        return Err(CodecError::UnsupportedType(format!(
            "nesting deeper than {}",
            MAX_VALUE_DEPTH
        )));
    }
    let kind = proto
        .kind
        .as_ref()
        .ok_or_else(|| CodecError::UnsupportedType("empty value".into()))?;
    Ok(match kind {
        value_proto::Kind::Characters(s) => Value::String(s.clone()),
        value_proto::Kind::Number(n) => match n.encoding {
            Some(number_proto::Encoding::Doubled(d)) => Value::Number(d),
            Some(number_proto::Encoding::Integer(i)) => Value::Number(i as f64),
            None => return Err(CodecError::UnsupportedType("empty number".into())),
        },
        value_proto::Kind::Special(code) => match Special::try_from(*code) {
            Ok(Special::Null) => Value::Null,
            Ok(Special::True) => Value::Boolean(true),
            Ok(Special::False) => Value::Boolean(false),
            _ => return Err(CodecError::UnsupportedType(format!("special {}", code))),
        },
        value_proto::Kind::Octets(b) => Value::Bytes(b.clone()),
        value_proto::Kind::Timestamp(t) => Value::Timestamp(*t),
        value_proto::Kind::Tuple(tuple) => Value::Tuple(
            tuple
                .values
                .iter()
                .map(|v| from_proto_at(v, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        value_proto::Kind::Document(doc) => {
            if doc.keys.len() != doc.values.len() {
                return Err(CodecError::UnsupportedType(
                    "document with unequal keys and values".into(),
                ));
            }
            let mut pairs = Vec::with_capacity(doc.keys.len());
            for (k, v) in doc.keys.iter().zip(&doc.values) {
                let key = from_proto_at(k, depth + 1)?;
                check_document_key(&key)?;
                pairs.push((key, from_proto_at(v, depth + 1)?));
            }
            Value::Document(pairs)
        }
    })
}

fn check_document_key(key: &Value) -> Result<(), CodecError> {
    match key {
        Value::String(_) | Value::Number(_) => Ok(()),
        other => Err(CodecError::InvalidKeyType(other.kind_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_survive_wrapping() {
        let values = vec![
            Value::from("hello"),
            Value::Number(3.25),
            Value::Number(f64::NEG_INFINITY),
            Value::Boolean(true),
            Value::Boolean(false),
            Value::Null,
            Value::Bytes(vec![0, 1, 255]),
            Value::Timestamp(1_643_351_021_040_000),
        ];
        for value in values {
            let bytes = wrap(&value).unwrap();
            assert_eq!(unwrap(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn test_nested_document() {
        let value = Value::Document(vec![
            (Value::from("name"), Value::from("strand")),
            (
                Value::Number(2.0),
                Value::Tuple(vec![Value::Null, Value::from(true)]),
            ),
        ]);
        let bytes = wrap(&value).unwrap();
        assert_eq!(unwrap(&bytes).unwrap(), value);
    }

    #[test]
    fn test_document_rejects_tuple_key() {
        let value = Value::Document(vec![(Value::Tuple(vec![]), Value::Null)]);
        assert_eq!(wrap(&value), Err(CodecError::InvalidKeyType("tuple")));
    }

    #[test]
    fn test_excessive_nesting_is_unsupported() {
        let mut value = Value::Null;
        for _ in 0..(MAX_VALUE_DEPTH + 2) {
            value = Value::Tuple(vec![value]);
        }
        assert!(matches!(wrap(&value), Err(CodecError::UnsupportedType(_))));
    }

    #[test]
    fn test_empty_value_is_unsupported() {
        let bytes = ValueProto { kind: None }.encode_to_vec();
        assert!(matches!(unwrap(&bytes), Err(CodecError::UnsupportedType(_))));
    }

    #[test]
    fn test_integer_encoding_decodes_as_number() {
        let proto = ValueProto {
            kind: Some(value_proto::Kind::Number(NumberProto {
                encoding: Some(number_proto::Encoding::Integer(-7)),
            })),
        };
        assert_eq!(from_proto(&proto).unwrap(), Value::Number(-7.0));
    }

    #[test]
    fn test_system_time_conversion() {
        let time = UNIX_EPOCH + Duration::from_micros(1_500);
        let value = Value::from(time);
        assert_eq!(value, Value::Timestamp(1_500));
        assert_eq!(value.as_system_time(), Some(time));
    }
}
