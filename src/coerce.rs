//! Type coercer: one raw string into one typed slot
//!
//! Empty input means the zero value for integers, floats and booleans.
//! Durations and timestamps have their own grammars (see [`crate::timefmt`]).
//! Records and maps that are reached as leaves decode the raw text as JSON.

use std::str::FromStr;

use crate::error::{BindError, Result};
use crate::schema::{FieldMeta, FloatRef, IntRef, SeqTarget, Slot, UintRef};
use crate::timefmt::{parse_duration, parse_time, TimeOptions};

/// Parse a boolean literal (`1 t T TRUE true True` and their false forms)
pub fn parse_bool(val: &str) -> Result<bool> {
    match val {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(BindError::invalid_value(val, "bool", "expected a boolean literal")),
    }
}

fn parse_number<T>(val: &str, target: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let val = if val.is_empty() { "0" } else { val };
    val.parse::<T>()
        .map_err(|e| BindError::invalid_value(val, target, e))
}

fn parse_float<T>(val: &str, target: &'static str, finite: impl Fn(&T) -> bool) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let val = if val.is_empty() { "0.0" } else { val };
    let parsed = val
        .parse::<T>()
        .map_err(|e| BindError::invalid_value(val, target, e))?;

    // "1e40" parses to infinity for f32; only explicit infinities may
    let literal_inf = val
        .trim_start_matches(['+', '-'])
        .to_ascii_lowercase()
        .starts_with("inf");
    if !finite(&parsed) && !literal_inf && !val.to_ascii_lowercase().contains("nan") {
        return Err(BindError::invalid_value(val, target, "value out of range"));
    }
    Ok(parsed)
}

fn set_int(val: &str, target: IntRef<'_>) -> Result<()> {
    match target {
        IntRef::I8(v) => *v = parse_number(val, "i8")?,
        IntRef::I16(v) => *v = parse_number(val, "i16")?,
        IntRef::I32(v) => *v = parse_number(val, "i32")?,
        IntRef::I64(v) => *v = parse_number(val, "i64")?,
        IntRef::Isize(v) => *v = parse_number(val, "isize")?,
    }
    Ok(())
}

/// Unsigned text carries no sign, not even `+`
fn parse_unsigned<T>(val: &str, target: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if val.starts_with('+') {
        return Err(BindError::invalid_value(val, target, "unexpected sign"));
    }
    parse_number(val, target)
}

fn set_uint(val: &str, target: UintRef<'_>) -> Result<()> {
    match target {
        UintRef::U8(v) => *v = parse_unsigned(val, "u8")?,
        UintRef::U16(v) => *v = parse_unsigned(val, "u16")?,
        UintRef::U32(v) => *v = parse_unsigned(val, "u32")?,
        UintRef::U64(v) => *v = parse_unsigned(val, "u64")?,
        UintRef::Usize(v) => *v = parse_unsigned(val, "usize")?,
    }
    Ok(())
}

fn set_float(val: &str, target: FloatRef<'_>) -> Result<()> {
    match target {
        FloatRef::F32(v) => *v = parse_float(val, "f32", |f: &f32| f.is_finite())?,
        FloatRef::F64(v) => *v = parse_float(val, "f64", |f: &f64| f.is_finite())?,
    }
    Ok(())
}

/// Coerce a single raw value into `slot`.
///
/// `field` supplies the timestamp tags; it is `None` for sequence elements
/// reached without a declaring field.
pub fn set_with_type(val: &str, slot: Slot<'_>, field: Option<&FieldMeta>) -> Result<()> {
    match slot {
        Slot::Int(target) => set_int(val, target),
        Slot::Uint(target) => set_uint(val, target),
        Slot::Float(target) => set_float(val, target),
        Slot::Bool(target) => {
            *target = if val.is_empty() { false } else { parse_bool(val)? };
            Ok(())
        }
        Slot::Str(target) => {
            val.clone_into(target);
            Ok(())
        }
        Slot::Duration(target) => {
            *target = parse_duration(val)?;
            Ok(())
        }
        Slot::Time(target) => {
            *target = parse_time(val, &TimeOptions::from_field(field))?;
            Ok(())
        }
        Slot::Json(target) => target.decode_json(val),
        Slot::Record(record) => record.decode_json(val.as_bytes()),
        Slot::Optional(target) => {
            target.with_inner(&mut |inner| set_with_type(val, inner, field).map(|()| true))?;
            Ok(())
        }
        Slot::File(_) => Err(BindError::unsupported(
            "FileHeader",
            "a text value cannot populate an uploaded file",
        )),
        Slot::Seq(target) => Err(BindError::unsupported(
            target.type_name(),
            "nested sequences have no coercion rule",
        )),
        Slot::Unsupported(name) => Err(BindError::unsupported(name, "no coercion rule for this kind")),
    }
}

/// Coerce several raw values into a sequence, element by element.
///
/// Fixed-size targets require exactly as many values as they hold. A
/// resizable target is only replaced when every element coerced.
pub fn set_multi(
    key: &str,
    vals: &[&str],
    target: &mut dyn SeqTarget,
    field: Option<&FieldMeta>,
) -> Result<()> {
    if let Some(expected) = target.fixed_len() {
        if vals.len() != expected {
            return Err(BindError::ArrayLength {
                key: key.to_string(),
                target: target.type_name(),
                expected,
                actual: vals.len(),
            });
        }
    }

    target.fill(vals.len(), &mut |i, slot| {
        set_with_type(vals[i], slot, field).map(|()| true)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, FixedOffset, TimeDelta};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::Field;

    fn coerce<T: Field + Default>(val: &str) -> Result<T> {
        let mut out = T::default();
        set_with_type(val, out.slot(), None)?;
        Ok(out)
    }

    // ═══════════════════════════════════════════════════════════════
    // Scalars
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn integers_parse_at_declared_width() {
        assert_eq!(coerce::<i8>("-128").unwrap(), -128);
        assert_eq!(coerce::<i32>("+42").unwrap(), 42);
        assert_eq!(coerce::<u16>("65535").unwrap(), 65535);
        assert!(coerce::<i8>("128").is_err());
        assert!(coerce::<u8>("-1").is_err());
        assert!(coerce::<u32>("+5").is_err());
        assert!(coerce::<u64>("+0").is_err());
    }

    #[test]
    fn non_numeric_text_is_a_type_mismatch() {
        let err = coerce::<i64>("twelve").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("i64"));
    }

    #[test]
    fn floats_reject_out_of_range_f32() {
        assert_eq!(coerce::<f32>("1.5").unwrap(), 1.5);
        assert!(coerce::<f32>("1e40").is_err());
        assert!(coerce::<f64>("inf").unwrap().is_infinite());
    }

    #[test]
    fn booleans_accept_literal_forms() {
        for t in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(coerce::<bool>(t).unwrap(), "{t}");
        }
        for f in ["0", "f", "F", "FALSE", "false", "False"] {
            assert!(!coerce::<bool>(f).unwrap(), "{f}");
        }
        assert!(coerce::<bool>("yes").is_err());
    }

    #[test]
    fn strings_are_copied_verbatim() {
        assert_eq!(coerce::<String>(" a b ").unwrap(), " a b ");
    }

    #[test]
    fn duration_uses_literal_grammar() {
        assert_eq!(coerce::<TimeDelta>("1h30m").unwrap(), TimeDelta::minutes(90));
        let err = coerce::<TimeDelta>("90").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn timestamp_reads_field_tags() {
        let field = FieldMeta::new("at")
            .tag("time_format", "unix")
            .tag("time_utc", "true");
        let mut at = DateTime::<FixedOffset>::default();
        set_with_type("1700000000", at.slot(), Some(&field)).unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn json_leaf_decodes_maps() {
        let map = coerce::<HashMap<String, i32>>(r#"{"a":1}"#).unwrap();
        assert_eq!(map.get("a"), Some(&1));
        assert_eq!(coerce::<HashMap<String, i32>>("{").unwrap_err().kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn optional_is_allocated_on_write() {
        assert_eq!(coerce::<Option<u8>>("7").unwrap(), Some(7));
        assert_eq!(coerce::<Option<u8>>("x").unwrap_err().kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn kinds_without_rules_are_unsupported() {
        let err = set_with_type("x", Slot::Unsupported("fn()"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTarget);

        let err = coerce::<Vec<Vec<i32>>>("1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTarget);
    }

    // ═══════════════════════════════════════════════════════════════
    // Sequences
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn vec_is_sized_to_input() {
        let mut ids: Vec<u32> = vec![9];
        set_multi("ids", &["1", "2", "3"], &mut ids, None).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn vec_failure_discards_partial_work() {
        let mut ids: Vec<u32> = vec![9];
        assert!(set_multi("ids", &["1", "x"], &mut ids, None).is_err());
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn array_requires_exact_count() {
        let mut pair = [0i32; 2];
        let err = set_multi("pair", &["1"], &mut pair, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);

        set_multi("pair", &["1", "2"], &mut pair, None).unwrap();
        assert_eq!(pair, [1, 2]);
    }

    // ═══════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════

    proptest! {
        #[test]
        fn i64_round_trips(n in any::<i64>()) {
            prop_assert_eq!(coerce::<i64>(&n.to_string()).unwrap(), n);
        }

        #[test]
        fn i16_round_trips(n in any::<i16>()) {
            prop_assert_eq!(coerce::<i16>(&n.to_string()).unwrap(), n);
        }

        #[test]
        fn u32_round_trips(n in any::<u32>()) {
            prop_assert_eq!(coerce::<u32>(&n.to_string()).unwrap(), n);
        }

        #[test]
        fn f64_round_trips(n in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
            prop_assert_eq!(coerce::<f64>(&n.to_string()).unwrap(), n);
        }

        #[test]
        fn f32_round_trips(n in any::<f32>().prop_filter("finite", |f| f.is_finite())) {
            prop_assert_eq!(coerce::<f32>(&n.to_string()).unwrap(), n);
        }

        #[test]
        fn bool_round_trips(b in any::<bool>()) {
            prop_assert_eq!(coerce::<bool>(&b.to_string()).unwrap(), b);
        }

        #[test]
        fn duration_round_trips(nanos in -1_000_000_000_000_000i64..1_000_000_000_000_000) {
            let delta = TimeDelta::nanoseconds(nanos);
            let text = crate::timefmt::format_duration(delta);
            prop_assert_eq!(coerce::<TimeDelta>(&text).unwrap(), delta);
        }
    }

    #[test]
    fn empty_input_is_zero_value() {
        assert_eq!(coerce::<i8>("").unwrap(), 0);
        assert_eq!(coerce::<i64>("").unwrap(), 0);
        assert_eq!(coerce::<u64>("").unwrap(), 0);
        assert_eq!(coerce::<usize>("").unwrap(), 0);
        assert_eq!(coerce::<f32>("").unwrap(), 0.0);
        assert_eq!(coerce::<f64>("").unwrap(), 0.0);
        assert!(!coerce::<bool>("").unwrap());
    }
}
