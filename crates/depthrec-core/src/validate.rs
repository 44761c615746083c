//! Envelope validation for depth deltas.
//!
//! Two envelopes are checked here:
//!
//! - the exchange `depthUpdate` message, before it enters the capture
//!   pipeline ([`validate_depth_update`]);
//! - the persisted raw log record, before the normalizer touches it
//!   ([`validate_raw_record`]).
//!
//! Both are pure functions. Fields are checked in a fixed order and the first
//! missing or mistyped one is reported, so the same bad message always
//! produces the same error.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Primitive shape expected for an envelope field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    UInt,
    Array,
}

impl FieldKind {
    fn matches(self, v: &Value) -> bool {
        match self {
            FieldKind::Str => v.is_string(),
            FieldKind::UInt => v.is_u64(),
            FieldKind::Array => v.is_array(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Str => f.write_str("a string"),
            FieldKind::UInt => f.write_str("a non-negative integer"),
            FieldKind::Array => f.write_str("an array"),
        }
    }
}

/// Why a message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing field `{field}`")]
    Missing { field: &'static str },

    #[error("field `{field}` must be {expected}")]
    WrongType { field: &'static str, expected: FieldKind },

    #[error("field `{field}` has unexpected value {found}")]
    UnexpectedValue { field: &'static str, found: String },

    #[error("update range inverted: U={first} > u={last}")]
    InvertedRange { first: u64, last: u64 },
}

/// Event-type tag carried by Binance depth deltas.
pub const DEPTH_UPDATE_EVENT: &str = "depthUpdate";

const DEPTH_UPDATE_FIELDS: &[(&str, FieldKind)] = &[
    ("e", FieldKind::Str),
    ("E", FieldKind::UInt),
    ("s", FieldKind::Str),
    ("U", FieldKind::UInt),
    ("u", FieldKind::UInt),
    ("b", FieldKind::Array),
    ("a", FieldKind::Array),
];

const RAW_RECORD_FIELDS: &[(&str, FieldKind)] = &[
    ("exchange", FieldKind::Str),
    ("symbol", FieldKind::Str),
    ("conn_id", FieldKind::UInt),
    ("recv_ts_ns", FieldKind::UInt),
    ("event_ts_ms", FieldKind::UInt),
    ("U", FieldKind::UInt),
    ("u", FieldKind::UInt),
    ("b", FieldKind::Array),
    ("a", FieldKind::Array),
];

fn check_fields(msg: &Value, fields: &[(&'static str, FieldKind)]) -> Result<(), SchemaError> {
    let obj = msg.as_object().ok_or(SchemaError::NotAnObject)?;
    for &(field, kind) in fields {
        match obj.get(field) {
            None => return Err(SchemaError::Missing { field }),
            Some(v) if !kind.matches(v) => {
                return Err(SchemaError::WrongType { field, expected: kind });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Validate an exchange `depthUpdate` message.
///
/// Besides field presence and shape, requires `e == "depthUpdate"` and
/// `U <= u`.
pub fn validate_depth_update(msg: &Value) -> Result<(), SchemaError> {
    check_fields(msg, DEPTH_UPDATE_FIELDS)?;

    let event = msg["e"].as_str().unwrap_or_default();
    if event != DEPTH_UPDATE_EVENT {
        return Err(SchemaError::UnexpectedValue { field: "e", found: format!("{event:?}") });
    }

    let first = msg["U"].as_u64().unwrap_or_default();
    let last = msg["u"].as_u64().unwrap_or_default();
    if first > last {
        return Err(SchemaError::InvertedRange { first, last });
    }
    Ok(())
}

/// Validate a persisted raw log record (shape only; ranges are checked by the
/// normalizer).
pub fn validate_raw_record(record: &Value) -> Result<(), SchemaError> {
    check_fields(record, RAW_RECORD_FIELDS)
}
