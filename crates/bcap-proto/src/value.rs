//! VARIANT value encoding and decoding.
//!
//! A [`Value`] is a tagged union over the subset of COM's VARTYPE system
//! that b-CAP puts on the wire (see [`crate::tag::ElementType`]). Every
//! value, scalar or array, is framed on the wire as `tag: u16, count: u32,
//! payload`; [`encode_value`] and [`decode_value`] are the total functions
//! over that framing.

use bytes::BufMut;
use chrono::{DateTime, Utc};

use crate::cursor::Cursor;
use crate::date::{datetime_to_vnt_date, vnt_date_to_datetime};
use crate::error::{hresult, Error, Result};
use crate::tag::{ElementType, Tag};

/// A decoded or to-be-encoded b-CAP argument value.
///
/// `Empty` is also what both `VT_EMPTY` and `VT_NULL` decode to — the wire
/// format distinguishes them, the value model does not.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value (`VT_EMPTY` or `VT_NULL` on the wire).
    Empty,
    /// `VT_I1`
    I1(i8),
    /// `VT_I2`
    I2(i16),
    /// `VT_I4`
    I4(i32),
    /// `VT_I8`
    I8(i64),
    /// `VT_UI1`
    Ui1(u8),
    /// `VT_UI2`
    Ui2(u16),
    /// `VT_UI4`
    Ui4(u32),
    /// `VT_UI8`
    Ui8(u64),
    /// `VT_R4`
    R4(f32),
    /// `VT_R8`
    R8(f64),
    /// `VT_CY`, carried as a raw 64-bit integer (no implied decimal scaling)
    Currency(i64),
    /// `VT_BOOL`. Encodes as exactly `-1`/`0`; decodes any nonzero as true.
    Bool(bool),
    /// `VT_BSTR`
    Bstr(String),
    /// `VT_DATE`
    Date(DateTime<Utc>),
    /// `VT_ERROR`
    Error(i32),
    /// `VT_UI1 | VT_ARRAY`, stored as a raw byte run rather than
    /// per-element framed `Ui1` values.
    ByteArray(Vec<u8>),
    /// A homogeneous array: `element | VT_ARRAY` with `element` repeated
    /// for every item. Every item of `values` must encode under `element`;
    /// mismatches fail at encode time.
    Array(ElementType, Vec<Value>),
    /// `VT_VARIANT | VT_ARRAY`: a heterogeneous array whose elements are
    /// themselves full tag+count+payload triples.
    VariantArray(Vec<Value>),
}

impl Value {
    /// Build a list value, sniffing homogeneity the way the reference
    /// client does: if every element shares the same scalar element type,
    /// emit a homogeneous [`Value::Array`]; otherwise emit a
    /// [`Value::VariantArray`]. This is a convenience constructor, not part
    /// of the wire contract — callers that want one shape or the other
    /// should construct `Array`/`VariantArray` directly.
    #[must_use]
    pub fn list(values: Vec<Value>) -> Value {
        let Some(first) = values.first() else {
            return Value::Empty;
        };
        let Some(element) = first.scalar_element_type() else {
            return Value::VariantArray(values);
        };
        let homogeneous =
            values.iter().all(|v| v.scalar_element_type() == Some(element));
        if !homogeneous {
            return Value::VariantArray(values);
        }
        if element == ElementType::Ui1 {
            // `VT_UI1 | VT_ARRAY` is always the byte-run form on the wire
            // (see `Value::ByteArray`) — a decoded packet never produces
            // `Value::Array(ElementType::Ui1, ..)`. Route a homogeneous
            // `Ui1` list through `ByteArray` so this constructor and
            // `decode_value` agree on a single canonical `Value`.
            let bytes = values
                .iter()
                .filter_map(|v| if let Value::Ui1(b) = v { Some(*b) } else { None })
                .collect();
            return Value::ByteArray(bytes);
        }
        Value::Array(element, values)
    }

    /// The element type this value would encode as in scalar position, or
    /// `None` for values that have no single scalar tag (`ByteArray`,
    /// `Array`, `VariantArray`).
    #[must_use]
    fn scalar_element_type(&self) -> Option<ElementType> {
        Some(match self {
            Value::Empty => ElementType::Empty,
            Value::I1(_) => ElementType::I1,
            Value::I2(_) => ElementType::I2,
            Value::I4(_) => ElementType::I4,
            Value::I8(_) => ElementType::I8,
            Value::Ui1(_) => ElementType::Ui1,
            Value::Ui2(_) => ElementType::Ui2,
            Value::Ui4(_) => ElementType::Ui4,
            Value::Ui8(_) => ElementType::Ui8,
            Value::R4(_) => ElementType::R4,
            Value::R8(_) => ElementType::R8,
            Value::Currency(_) => ElementType::Currency,
            Value::Bool(_) => ElementType::Bool,
            Value::Bstr(_) => ElementType::Bstr,
            Value::Date(_) => ElementType::Date,
            Value::Error(_) => ElementType::Error,
            Value::ByteArray(_) | Value::Array(..) | Value::VariantArray(_) => return None,
        })
    }
}

/// Encode one value (tag + count + payload) to `dst`.
pub fn encode_value(value: &Value, dst: &mut impl BufMut) -> Result<()> {
    match value {
        Value::Empty => {
            dst.put_u16_le(Tag::scalar(ElementType::Empty).to_u16());
            dst.put_u32_le(1);
        },
        Value::ByteArray(bytes) => {
            dst.put_u16_le(Tag::array(ElementType::Ui1).to_u16());
            dst.put_u32_le(u32::try_from(bytes.len()).map_err(|_| {
                Error::invalid_packet("byte array too large to encode")
            })?);
            dst.put_slice(bytes);
        },
        Value::Array(element, items) => {
            if *element == ElementType::Ui1 {
                // `VT_UI1 | VT_ARRAY` only ever decodes to `Value::ByteArray`
                // (see `decode_array_body`); accepting it here too would let
                // two distinct `Value`s encode to the same wire tag.
                return Err(Error::variant_type_not_supported(
                    "VT_UI1|VT_ARRAY is always the byte-run form; use Value::ByteArray instead of Value::Array(ElementType::Ui1, ..)",
                ));
            }
            dst.put_u16_le(Tag::array(*element).to_u16());
            dst.put_u32_le(u32::try_from(items.len()).map_err(|_| {
                Error::invalid_packet("array too large to encode")
            })?);
            for item in items {
                if item.scalar_element_type() != Some(*element) {
                    return Err(Error::variant_type_not_supported(format!(
                        "homogeneous array declared as {element:?} contains a mismatched element"
                    )));
                }
                encode_scalar_payload(item, dst)?;
            }
        },
        Value::VariantArray(items) => {
            dst.put_u16_le(Tag::array(ElementType::Variant).to_u16());
            dst.put_u32_le(u32::try_from(items.len()).map_err(|_| {
                Error::invalid_packet("variant array too large to encode")
            })?);
            for item in items {
                encode_value(item, dst)?;
            }
        },
        scalar => {
            let element = scalar.scalar_element_type().ok_or_else(|| {
                Error::variant_type_not_supported("value has no scalar VARIANT encoding")
            })?;
            dst.put_u16_le(Tag::scalar(element).to_u16());
            dst.put_u32_le(1);
            encode_scalar_payload(scalar, dst)?;
        },
    }
    Ok(())
}

/// Encode just the payload bytes of a single scalar element (no tag, no
/// count) — the shared body used both for a lone scalar `Value` and for
/// each element of a homogeneous array.
fn encode_scalar_payload(value: &Value, dst: &mut impl BufMut) -> Result<()> {
    match value {
        Value::Empty => {},
        Value::I1(v) => dst.put_i8(*v),
        Value::I2(v) => dst.put_i16_le(*v),
        Value::I4(v) => dst.put_i32_le(*v),
        Value::I8(v) => dst.put_i64_le(*v),
        Value::Ui1(v) => dst.put_u8(*v),
        Value::Ui2(v) => dst.put_u16_le(*v),
        Value::Ui4(v) => dst.put_u32_le(*v),
        Value::Ui8(v) => dst.put_u64_le(*v),
        Value::R4(v) => dst.put_f32_le(*v),
        Value::R8(v) => dst.put_f64_le(*v),
        Value::Currency(v) => dst.put_i64_le(*v),
        Value::Bool(v) => dst.put_i16_le(if *v { -1 } else { 0 }),
        Value::Bstr(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            let byte_len = units.len() * 2;
            dst.put_u32_le(u32::try_from(byte_len).map_err(|_| {
                Error::invalid_packet("BSTR too large to encode")
            })?);
            for unit in units {
                dst.put_u16_le(unit);
            }
        },
        Value::Date(dt) => dst.put_f64_le(datetime_to_vnt_date(*dt)),
        Value::Error(hr) => dst.put_i32_le(*hr),
        Value::ByteArray(_) | Value::Array(..) | Value::VariantArray(_) => {
            return Err(Error::variant_type_not_supported(
                "array value cannot appear as a scalar array element",
            ));
        },
    }
    Ok(())
}

/// Decode a single value (tag + count + payload) from a standalone byte
/// slice, ignoring any trailing bytes. This is the entry point used by the
/// `value_decode` fuzz target and by callers outside this crate that hold a
/// raw argument buffer rather than a cursor into a larger packet.
pub fn decode_value_bytes(bytes: &[u8]) -> Result<Value> {
    let mut cursor = Cursor::new(bytes);
    decode_value(&mut cursor)
}

/// Decode one value (tag + count + payload) from `cursor`.
pub(crate) fn decode_value(cursor: &mut Cursor<'_>) -> Result<Value> {
    let tag = Tag::from_u16(cursor.u16_le()?)?;
    let count = cursor.u32_le()?;

    // A scalar VT_EMPTY/VT_NULL has no payload and decodes to `Value::Empty`
    // directly. An *array* of VT_EMPTY|ARRAY still carries a real element
    // count and must go through `decode_array_body` like any other array —
    // otherwise `Value::Array(ElementType::Empty, ..)` would silently lose
    // its length on decode.
    if !tag.is_array && matches!(tag.element, ElementType::Empty | ElementType::Null) {
        return Ok(Value::Empty);
    }

    if tag.is_array {
        decode_array_body(tag.element, count, cursor)
    } else {
        // The on-wire count for a scalar is conventionally 1, but per spec
        // it MUST NOT be used as a loop bound: decode exactly one element.
        decode_scalar_payload(tag.element, cursor)
    }
}

/// The minimum number of wire bytes one element of `element` could possibly
/// occupy — `fixed_size()` for fixed-width types, or the smallest possible
/// variable-length encoding otherwise (an empty `BSTR`'s 4-byte length
/// prefix; a nested `VT_VARIANT` element's 6-byte tag-plus-count header for
/// `VT_EMPTY`). Used only to cap speculative preallocation against a
/// `count` that comes straight off the wire — an attacker cannot make us
/// allocate more than the bytes actually available could ever decode into.
fn min_element_wire_size(element: ElementType) -> usize {
    match element.fixed_size() {
        Some(size) => size,
        None if element == ElementType::Bstr => 4,
        None => 6,
    }
}

fn decode_array_body(
    element: ElementType,
    count: u32,
    cursor: &mut Cursor<'_>,
) -> Result<Value> {
    // `count` is attacker-controlled; never preallocate more than the
    // remaining bytes could possibly supply, or a truncated packet claiming
    // billions of elements could blow up the allocator before any bytes are
    // even read.
    let safe_capacity =
        (cursor.remaining() / min_element_wire_size(element).max(1)).min(count as usize);

    match element {
        ElementType::Variant => {
            let mut items = Vec::with_capacity(safe_capacity);
            for _ in 0..count {
                items.push(decode_value(cursor)?);
            }
            Ok(Value::VariantArray(items))
        },
        ElementType::Ui1 => {
            let bytes = cursor.take(count as usize)?;
            Ok(Value::ByteArray(bytes.to_vec()))
        },
        _ => {
            let mut items = Vec::with_capacity(safe_capacity);
            for _ in 0..count {
                items.push(decode_scalar_payload(element, cursor)?);
            }
            Ok(Value::Array(element, items))
        },
    }
}

/// Decode just the payload bytes of a single scalar element (no tag, no
/// count was read here — the caller already consumed those).
fn decode_scalar_payload(element: ElementType, cursor: &mut Cursor<'_>) -> Result<Value> {
    Ok(match element {
        ElementType::Empty | ElementType::Null => Value::Empty,
        ElementType::I1 => Value::I1(cursor.i8()?),
        ElementType::I2 => Value::I2(cursor.i16_le()?),
        ElementType::I4 => Value::I4(cursor.i32_le()?),
        ElementType::I8 => Value::I8(cursor.i64_le()?),
        ElementType::Ui1 => Value::Ui1(cursor.u8()?),
        ElementType::Ui2 => Value::Ui2(cursor.u16_le()?),
        ElementType::Ui4 => Value::Ui4(cursor.u32_le()?),
        ElementType::Ui8 => Value::Ui8(cursor.u64_le()?),
        ElementType::R4 => Value::R4(cursor.f32_le()?),
        ElementType::R8 => Value::R8(cursor.f64_le()?),
        ElementType::Currency => Value::Currency(cursor.i64_le()?),
        ElementType::Bool => Value::Bool(cursor.i16_le()? != 0),
        ElementType::Error => Value::Error(cursor.i32_le()?),
        ElementType::Date => Value::Date(vnt_date_to_datetime(cursor.f64_le()?)),
        ElementType::Bstr => {
            let byte_len = cursor.u32_le()? as usize;
            let bytes = cursor.take(byte_len)?;
            if bytes.len() % 2 != 0 {
                return Err(Error::invalid_packet("BSTR byte length is not even"));
            }
            let units: Vec<u16> =
                bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
            let s = String::from_utf16(&units).map_err(|_| {
                Error::invalid_packet("BSTR is not valid UTF-16")
            })?;
            Value::Bstr(s)
        },
        ElementType::Variant => {
            return Err(Error::new(
                hresult::E_CAO_VARIANT_TYPE_NO_SUPPORT,
                "VT_VARIANT cannot appear as a non-array element",
            ));
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn roundtrip(value: &Value) -> Value {
        let mut buf = BytesMut::new();
        encode_value(value, &mut buf).expect("encode");
        let mut cursor = Cursor::new(&buf);
        decode_value(&mut cursor).expect("decode")
    }

    #[test]
    fn bool_encodes_as_minus_one_or_zero() {
        let mut buf = BytesMut::new();
        encode_value(&Value::Bool(true), &mut buf).unwrap();
        assert_eq!(&buf[..2], &(ElementType::Bool.to_u16()).to_le_bytes());
        assert_eq!(&buf[6..8], &0xFFFFu16.to_le_bytes());

        let mut buf = BytesMut::new();
        encode_value(&Value::Bool(false), &mut buf).unwrap();
        assert_eq!(&buf[6..8], &0x0000u16.to_le_bytes());
    }

    #[test]
    fn bool_decode_any_nonzero_is_true() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(ElementType::Bool.to_u16());
        buf.put_u32_le(1);
        buf.put_i16_le(1);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(decode_value(&mut cursor).unwrap(), Value::Bool(true));
    }

    #[test]
    fn string_encodes_with_byte_length_prefix() {
        let mut buf = BytesMut::new();
        encode_value(&Value::Bstr("AB".to_string()), &mut buf).unwrap();
        // tag (2) + count (4) + byte-length (4) + "A\0B\0"
        assert_eq!(&buf[6..10], &4u32.to_le_bytes());
        assert_eq!(&buf[10..14], &[0x41, 0x00, 0x42, 0x00]);
    }

    #[test]
    fn empty_string_is_legal() {
        let value = Value::Bstr(String::new());
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn heterogeneous_list_becomes_variant_array() {
        let value =
            Value::list(vec![Value::I4(1), Value::Bstr("x".into()), Value::Bool(true)]);
        assert!(matches!(value, Value::VariantArray(_)));
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn homogeneous_list_becomes_typed_array() {
        let value = Value::list(vec![Value::I4(1), Value::I4(2), Value::I4(3)]);
        assert_eq!(value, Value::Array(ElementType::I4, vec![Value::I4(1), Value::I4(2), Value::I4(3)]));
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn byte_array_round_trips_without_per_element_framing() {
        let value = Value::ByteArray(vec![1, 2, 3, 4, 5]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn homogeneous_ui1_list_becomes_a_byte_array_not_a_typed_array() {
        // VT_UI1|VT_ARRAY is always the byte-run form on the wire; sniffing
        // a list of `Ui1` must route to `ByteArray`, not `Array(Ui1, ..)`,
        // or the two would collide on the same wire tag.
        let value = Value::list(vec![Value::Ui1(5), Value::Ui1(6), Value::Ui1(7)]);
        assert_eq!(value, Value::ByteArray(vec![5, 6, 7]));
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn encoding_array_of_ui1_directly_is_rejected() {
        let value = Value::Array(ElementType::Ui1, vec![Value::Ui1(1)]);
        let mut buf = BytesMut::new();
        let err = encode_value(&value, &mut buf).unwrap_err();
        assert_eq!(err.hr, hresult::E_CAO_VARIANT_TYPE_NO_SUPPORT);
    }

    #[test]
    fn empty_list_round_trips_as_an_array_of_empties() {
        let value = Value::Array(ElementType::Empty, vec![Value::Empty, Value::Empty]);
        let decoded = roundtrip(&value);
        assert_eq!(decoded, value);
        assert!(matches!(decoded, Value::Array(ElementType::Empty, ref items) if items.len() == 2));
    }

    #[test]
    fn huge_declared_array_count_on_a_short_buffer_errors_without_huge_allocation() {
        // Claims a VT_I4|VT_ARRAY of u32::MAX elements but supplies none.
        // Must fail cleanly (underrun), never attempt to preallocate
        // gigabytes based on the attacker-controlled count.
        let mut buf = BytesMut::new();
        buf.put_u16_le(Tag::array(ElementType::I4).to_u16());
        buf.put_u32_le(u32::MAX);
        let mut cursor = Cursor::new(&buf);
        let err = decode_value(&mut cursor).unwrap_err();
        assert_eq!(err.hr, hresult::E_INVALID_PACKET);
    }

    #[test]
    fn unsupported_tag_is_rejected_on_decode() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(9); // VT_DISPATCH
        buf.put_u32_le(1);
        let mut cursor = Cursor::new(&buf);
        let err = decode_value(&mut cursor).unwrap_err();
        assert_eq!(err.hr, hresult::E_CAO_VARIANT_TYPE_NO_SUPPORT);
    }

    #[test]
    fn date_round_trips_through_ole_epoch() {
        let dt = Utc.timestamp_opt(0, 0).unwrap();
        let value = Value::Date(dt);
        assert_eq!(roundtrip(&value), value);
    }

    proptest! {
        #[test]
        fn scalar_values_round_trip(
            i1 in any::<i8>(), i2 in any::<i16>(), i4 in any::<i32>(), i8v in any::<i64>(),
            u1 in any::<u8>(), u2 in any::<u16>(), u4 in any::<u32>(), u8v in any::<u64>(),
            r4 in any::<f32>(), r8 in any::<f64>(), b in any::<bool>(), s in ".*"
        ) {
            prop_assert_eq!(roundtrip(&Value::I1(i1)), Value::I1(i1));
            prop_assert_eq!(roundtrip(&Value::I2(i2)), Value::I2(i2));
            prop_assert_eq!(roundtrip(&Value::I4(i4)), Value::I4(i4));
            prop_assert_eq!(roundtrip(&Value::I8(i8v)), Value::I8(i8v));
            prop_assert_eq!(roundtrip(&Value::Ui1(u1)), Value::Ui1(u1));
            prop_assert_eq!(roundtrip(&Value::Ui2(u2)), Value::Ui2(u2));
            prop_assert_eq!(roundtrip(&Value::Ui4(u4)), Value::Ui4(u4));
            prop_assert_eq!(roundtrip(&Value::Ui8(u8v)), Value::Ui8(u8v));
            if !r4.is_nan() {
                prop_assert_eq!(roundtrip(&Value::R4(r4)), Value::R4(r4));
            }
            if !r8.is_nan() {
                prop_assert_eq!(roundtrip(&Value::R8(r8)), Value::R8(r8));
            }
            prop_assert_eq!(roundtrip(&Value::Bool(b)), Value::Bool(b));
            prop_assert_eq!(roundtrip(&Value::Bstr(s.clone())), Value::Bstr(s));
        }

        #[test]
        fn byte_array_round_trips_arbitrary(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let value = Value::ByteArray(bytes);
            prop_assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn decode_never_panics_on_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut cursor = Cursor::new(&bytes);
            let _ = decode_value(&mut cursor);
        }
    }
}
