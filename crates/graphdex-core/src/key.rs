//! Module: key
//! Responsibility: canonical, order-preserving encoding of index keys.
//! Does not own: bucket kind policy or unique-guard decisions.
//! Boundary: engines key their ordered maps by these bytes; planners never
//! inspect them.

use crate::value::Value;
use thiserror::Error as ThisError;
use xxhash_rust::xxh3::xxh3_128;

///
/// CONSTANTS
///

/// Text components longer than this are fingerprinted instead of inlined.
///
/// Exact and fulltext buckets only ever compare keys for equality, so a
/// stable 128-bit fingerprint preserves lookup semantics while bounding key
/// size. Collisions are caught by the row-verification step of the unique
/// guard, never silently accepted.
pub(crate) const MAX_TEXT_COMPONENT_BYTES: usize = 64;

const FIELD_LEN_BYTES: usize = 2;

// Value component tags. Stable; part of the encoded-key contract.
const TAG_TEXT: u8 = 0x01;
const TAG_TEXT_FINGERPRINT: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;

///
/// KeyEncodeError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub(crate) enum KeyEncodeError {
    #[error("null values own no index entry")]
    NullComponent,

    #[error("value is not indexable: {reason}")]
    NotIndexable { reason: &'static str },

    #[error("field name exceeds encodable length: {len}")]
    FieldTooLong { len: usize },
}

/// Encode a `(field, value)` pair into canonical index-key bytes.
///
/// Keys for one field form a contiguous, order-preserving span: integer and
/// float payloads sort by numeric value, short text sorts lexicographically.
pub(crate) fn encode_index_key(field: &str, value: &Value) -> Result<Vec<u8>, KeyEncodeError> {
    let mut out = encode_field_prefix(field)?;
    encode_value_component(&mut out, value)?;

    Ok(out)
}

/// Encode inclusive range bounds for `field` over `[lo, hi]`.
pub(crate) fn encode_range_bounds(
    field: &str,
    lo: &Value,
    hi: &Value,
) -> Result<(Vec<u8>, Vec<u8>), KeyEncodeError> {
    Ok((encode_index_key(field, lo)?, encode_index_key(field, hi)?))
}

fn encode_field_prefix(field: &str) -> Result<Vec<u8>, KeyEncodeError> {
    let len = u16::try_from(field.len())
        .map_err(|_| KeyEncodeError::FieldTooLong { len: field.len() })?;

    let mut out = Vec::with_capacity(FIELD_LEN_BYTES + field.len() + 1 + 16);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(field.as_bytes());

    Ok(out)
}

fn encode_value_component(out: &mut Vec<u8>, value: &Value) -> Result<(), KeyEncodeError> {
    match value {
        Value::Null => return Err(KeyEncodeError::NullComponent),

        Value::Text(text) => {
            if text.len() > MAX_TEXT_COMPONENT_BYTES {
                out.push(TAG_TEXT_FINGERPRINT);
                out.extend_from_slice(&xxh3_128(text.as_bytes()).to_be_bytes());
            } else {
                out.push(TAG_TEXT);
                out.extend_from_slice(text.as_bytes());
            }
        }

        Value::Int(v) => {
            out.push(TAG_INT);
            // sign-flip so two's-complement order matches unsigned byte order
            out.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
        }

        Value::Float(v) => {
            if v.is_nan() {
                return Err(KeyEncodeError::NotIndexable {
                    reason: "NaN float",
                });
            }
            out.push(TAG_FLOAT);
            out.extend_from_slice(&total_order_bits(*v).to_be_bytes());
        }
    }

    Ok(())
}

// IEEE-754 total-order transform: negative floats flip every bit, positive
// floats flip the sign bit, so byte order equals numeric order.
const fn total_order_bits(v: f64) -> u64 {
    let bits = v.to_bits();

    if bits & (1 << 63) != 0 { !bits } else { bits ^ (1 << 63) }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(field: &str, value: &Value) -> Vec<u8> {
        encode_index_key(field, value).expect("encode index key")
    }

    #[test]
    fn null_component_is_rejected() {
        assert_eq!(
            encode_index_key("name", &Value::Null),
            Err(KeyEncodeError::NullComponent)
        );
    }

    #[test]
    fn nan_is_rejected() {
        assert!(matches!(
            encode_index_key("score", &Value::Float(f64::NAN)),
            Err(KeyEncodeError::NotIndexable { .. })
        ));
    }

    #[test]
    fn int_encoding_preserves_order_across_sign() {
        let lo = key("age", &Value::Int(-5));
        let mid = key("age", &Value::Int(0));
        let hi = key("age", &Value::Int(5));

        assert!(lo < mid);
        assert!(mid < hi);
    }

    #[test]
    fn float_encoding_preserves_order_across_sign() {
        let lo = key("score", &Value::Float(-1.5));
        let mid = key("score", &Value::Float(0.0));
        let hi = key("score", &Value::Float(2.25));

        assert!(lo < mid);
        assert!(mid < hi);
    }

    #[test]
    fn long_text_is_fingerprinted_and_stable() {
        let text = "x".repeat(MAX_TEXT_COMPONENT_BYTES + 1);
        let a = key("name", &Value::Text(text.clone()));
        let b = key("name", &Value::Text(text));

        assert_eq!(a, b);
        // tag byte sits right after the field prefix
        assert_eq!(a[FIELD_LEN_BYTES + "name".len()], TAG_TEXT_FINGERPRINT);
    }

    #[test]
    fn distinct_fields_never_collide() {
        let a = key("name", &Value::from("mark"));
        let b = key("nick", &Value::from("mark"));

        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn int_order_matches_key_order(a in any::<i64>(), b in any::<i64>()) {
            let ka = key("n", &Value::Int(a));
            let kb = key("n", &Value::Int(b));

            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }

        #[test]
        fn float_order_matches_key_order(a in any::<f64>(), b in any::<f64>()) {
            prop_assume!(!a.is_nan() && !b.is_nan());

            let ka = key("n", &Value::Float(a));
            let kb = key("n", &Value::Float(b));

            prop_assert_eq!(a.total_cmp(&b), ka.cmp(&kb));
        }
    }
}
