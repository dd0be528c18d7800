//! Records described at runtime by a YAML schema
//!
//! ```yaml
//! name: Search
//! fields:
//!   - name: page
//!     type: int
//!     tags: { form: "page,default=1" }
//!   - name: ids
//!     type: "[]uint32"
//!   - name: since
//!     type: "?time"
//!     tags: { form: since, time_format: unix, time_utc: "true" }
//!   - name: audit
//!     type: record
//!     embed: true
//!     fields:
//!       - { name: actor, type: string, required: true }
//! ```
//!
//! Type grammar: a scalar name (`int`, `int8`..`int64`, `uint`..`uint64`,
//! `float32`, `float64`, `bool`, `string`, `duration`, `time`, `json`,
//! `file`, `record`) under any number of `?` (optional), `[]` (sequence)
//! and `[N]` (fixed array) prefixes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::coerce::set_with_type;
use crate::error::{BindError, Result, ValidationError};
use crate::multipart::FileHeader;
use crate::schema::{Field, FieldMeta, OptionalTarget, Record, Schema, SeqTarget, Slot};
use crate::tag;
use crate::timefmt::format_duration;
use crate::validate::Validate;

// ═══════════════════════════════════════════════════════════════
// YAML description
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecordSpec {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Raw tags by namespace (`form`, `uri`, `header`, `json`, `time_format`, ...)
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub embed: bool,
    #[serde(default)]
    pub private: bool,
    /// Rejected by validation when left empty
    #[serde(default)]
    pub required: bool,
    /// Members, for `record` types
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl RecordSpec {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| BindError::Schema {
            reason: e.to_string(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}

// ═══════════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bool,
    String,
    Duration,
    Time,
    Json,
    File,
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int" => Self::Int,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint" => Self::Uint,
            "uint8" => Self::Uint8,
            "uint16" => Self::Uint16,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "duration" => Self::Duration,
            "time" => Self::Time,
            "json" => Self::Json,
            "file" => Self::File,
            _ => return None,
        })
    }

    fn zero(self) -> DynValue {
        match self {
            Self::Int => DynValue::Int(0),
            Self::Int8 => DynValue::Int8(0),
            Self::Int16 => DynValue::Int16(0),
            Self::Int32 => DynValue::Int32(0),
            Self::Int64 => DynValue::Int64(0),
            Self::Uint => DynValue::Uint(0),
            Self::Uint8 => DynValue::Uint8(0),
            Self::Uint16 => DynValue::Uint16(0),
            Self::Uint32 => DynValue::Uint32(0),
            Self::Uint64 => DynValue::Uint64(0),
            Self::Float32 => DynValue::Float32(0.0),
            Self::Float64 => DynValue::Float64(0.0),
            Self::Bool => DynValue::Bool(false),
            Self::String => DynValue::Str(String::new()),
            Self::Duration => DynValue::Duration(TimeDelta::zero()),
            Self::Time => DynValue::Time(DateTime::default()),
            Self::Json => DynValue::Json(Value::Null),
            Self::File => DynValue::File(FileHeader::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DynType {
    Scalar(ScalarKind),
    Record(Arc<RecordType>),
    Optional(Box<DynType>),
    List(Box<DynType>),
    Array(Box<DynType>, usize),
}

impl DynType {
    /// Parse a field's type expression
    fn parse(expr: &str, spec: &FieldSpec) -> Result<Self> {
        if let Some(rest) = expr.strip_prefix('?') {
            return Ok(DynType::Optional(Box::new(Self::parse(rest, spec)?)));
        }
        if let Some(rest) = expr.strip_prefix("[]") {
            return Ok(DynType::List(Box::new(Self::parse(rest, spec)?)));
        }
        if let Some(rest) = expr.strip_prefix('[') {
            let (len, elem) = tag::head(rest, "]");
            let len: usize = len.parse().map_err(|_| BindError::Schema {
                reason: format!("field '{}': bad array length in '{}'", spec.name, spec.ty),
            })?;
            return Ok(DynType::Array(Box::new(Self::parse(elem, spec)?), len));
        }
        if expr == "record" {
            return Ok(DynType::Record(Arc::new(RecordType::build(
                &spec.name,
                &spec.fields,
            )?)));
        }

        ScalarKind::from_name(expr)
            .map(DynType::Scalar)
            .ok_or_else(|| BindError::Schema {
                reason: format!("field '{}': unknown type '{}'", spec.name, spec.ty),
            })
    }

    fn zero(&self) -> DynValue {
        match self {
            DynType::Scalar(kind) => kind.zero(),
            DynType::Record(ty) => DynValue::Record(DynRecord::zero(Arc::clone(ty))),
            DynType::Optional(inner) => DynValue::Optional(DynOptional {
                ty: (**inner).clone(),
                value: None,
            }),
            DynType::List(elem) => DynValue::List(DynList {
                elem: (**elem).clone(),
                fixed: None,
                items: Vec::new(),
            }),
            DynType::Array(elem, len) => DynValue::List(DynList {
                elem: (**elem).clone(),
                fixed: Some(*len),
                items: (0..*len).map(|_| elem.zero()).collect(),
            }),
        }
    }
}

/// Field table plus the value type of every field
#[derive(Debug)]
pub struct RecordType {
    schema: Schema,
    types: Vec<DynType>,
    required: Vec<bool>,
}

impl RecordType {
    fn build(name: &str, fields: &[FieldSpec]) -> Result<Self> {
        let mut schema = Schema::new(name.to_string());
        let mut types = Vec::with_capacity(fields.len());
        let mut required = Vec::with_capacity(fields.len());

        for spec in fields {
            if spec.name.is_empty() {
                return Err(BindError::Schema {
                    reason: format!("record '{}': field without a name", name),
                });
            }

            let mut meta = FieldMeta::new(spec.name.clone());
            for (ns, raw) in &spec.tags {
                meta = meta.tag(ns.clone(), raw.clone());
            }
            if spec.embed {
                meta = meta.embed();
            }
            if spec.private {
                meta = meta.private();
            }

            schema = schema.field(meta);
            types.push(DynType::parse(&spec.ty, spec)?);
            required.push(spec.required);
        }

        Ok(Self {
            schema,
            types,
            required,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
// Values
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum DynValue {
    Int(isize),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint(usize),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Str(String),
    Duration(TimeDelta),
    Time(DateTime<FixedOffset>),
    Json(Value),
    File(FileHeader),
    Record(DynRecord),
    Optional(DynOptional),
    List(DynList),
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

impl DynValue {
    pub fn to_json(&self) -> Value {
        match self {
            DynValue::Int(v) => json!(v),
            DynValue::Int8(v) => json!(v),
            DynValue::Int16(v) => json!(v),
            DynValue::Int32(v) => json!(v),
            DynValue::Int64(v) => json!(v),
            DynValue::Uint(v) => json!(v),
            DynValue::Uint8(v) => json!(v),
            DynValue::Uint16(v) => json!(v),
            DynValue::Uint32(v) => json!(v),
            DynValue::Uint64(v) => json!(v),
            DynValue::Float32(v) => number(f64::from(*v)),
            DynValue::Float64(v) => number(*v),
            DynValue::Bool(v) => json!(v),
            DynValue::Str(v) => json!(v),
            DynValue::Duration(v) => json!(format_duration(*v)),
            DynValue::Time(v) => json!(v.to_rfc3339()),
            DynValue::Json(v) => v.clone(),
            DynValue::File(f) => json!({
                "filename": f.filename,
                "content_type": f.content_type,
                "size": f.size,
            }),
            DynValue::Record(r) => r.to_json(),
            DynValue::Optional(o) => o.value.as_ref().map_or(Value::Null, |v| v.to_json()),
            DynValue::List(l) => Value::Array(l.items.iter().map(DynValue::to_json).collect()),
        }
    }

    /// True for values a `required` field must not keep
    fn is_empty(&self) -> bool {
        match self {
            DynValue::Str(s) => s.is_empty(),
            DynValue::Json(v) => v.is_null(),
            DynValue::File(f) => f.filename.is_empty(),
            DynValue::Optional(o) => o.value.is_none(),
            DynValue::List(l) => l.fixed.is_none() && l.items.is_empty(),
            _ => false,
        }
    }

    /// Assign from a decoded JSON value, coercing scalars like source text
    fn assign_json(&mut self, meta: &FieldMeta, value: &Value) -> Result<()> {
        match (self, value) {
            (_, Value::Null) => Ok(()),
            (DynValue::Json(target), value) => {
                *target = value.clone();
                Ok(())
            }
            (DynValue::Record(record), Value::Object(object)) => record.assign_object(object),
            (DynValue::List(list), Value::Array(items)) => list.assign_array(meta, items),
            (DynValue::Optional(opt), value) => match opt.value.as_mut() {
                Some(inner) => inner.assign_json(meta, value),
                None => {
                    let mut fresh = opt.ty.zero();
                    fresh.assign_json(meta, value)?;
                    opt.value = Some(Box::new(fresh));
                    Ok(())
                }
            },
            (target, Value::String(text)) => set_with_type(text, target.slot(), Some(meta)),
            (target, Value::Number(_) | Value::Bool(_)) => {
                set_with_type(&value.to_string(), target.slot(), Some(meta))
            }
            (_, _) => Err(BindError::Payload {
                format: "JSON",
                reason: format!(
                    "field '{}' cannot hold a JSON {}",
                    meta.ident,
                    if value.is_array() { "array" } else { "object" },
                ),
            }),
        }
    }
}

impl Field for DynValue {
    fn slot(&mut self) -> Slot<'_> {
        match self {
            DynValue::Int(v) => v.slot(),
            DynValue::Int8(v) => v.slot(),
            DynValue::Int16(v) => v.slot(),
            DynValue::Int32(v) => v.slot(),
            DynValue::Int64(v) => v.slot(),
            DynValue::Uint(v) => v.slot(),
            DynValue::Uint8(v) => v.slot(),
            DynValue::Uint16(v) => v.slot(),
            DynValue::Uint32(v) => v.slot(),
            DynValue::Uint64(v) => v.slot(),
            DynValue::Float32(v) => v.slot(),
            DynValue::Float64(v) => v.slot(),
            DynValue::Bool(v) => v.slot(),
            DynValue::Str(v) => v.slot(),
            DynValue::Duration(v) => v.slot(),
            DynValue::Time(v) => v.slot(),
            DynValue::Json(v) => v.slot(),
            DynValue::File(v) => v.slot(),
            DynValue::Record(v) => Slot::Record(v),
            DynValue::Optional(v) => Slot::Optional(v),
            DynValue::List(v) => Slot::Seq(v),
        }
    }
}

/// Optional value, allocated from its type on first write
#[derive(Debug, Clone)]
pub struct DynOptional {
    ty: DynType,
    value: Option<Box<DynValue>>,
}

impl DynOptional {
    pub fn get(&self) -> Option<&DynValue> {
        self.value.as_deref()
    }
}

impl OptionalTarget for DynOptional {
    fn type_name(&self) -> &'static str {
        "optional"
    }

    fn with_inner(&mut self, f: &mut dyn FnMut(Slot<'_>) -> Result<bool>) -> Result<bool> {
        match self.value.as_mut() {
            Some(inner) => f(inner.slot()),
            None => {
                let mut fresh = self.ty.zero();
                let set = f(fresh.slot())?;
                if set {
                    self.value = Some(Box::new(fresh));
                }
                Ok(set)
            }
        }
    }
}

/// Sequence or fixed array of one element type
#[derive(Debug, Clone)]
pub struct DynList {
    elem: DynType,
    fixed: Option<usize>,
    items: Vec<DynValue>,
}

impl DynList {
    pub fn items(&self) -> &[DynValue] {
        &self.items
    }

    fn assign_array(&mut self, meta: &FieldMeta, values: &[Value]) -> Result<()> {
        if let Some(expected) = self.fixed {
            if expected != values.len() {
                return Err(BindError::ArrayLength {
                    key: meta.ident.to_string(),
                    target: "array",
                    expected,
                    actual: values.len(),
                });
            }
        }

        let mut items: Vec<DynValue> = values.iter().map(|_| self.elem.zero()).collect();
        for (item, value) in items.iter_mut().zip(values) {
            item.assign_json(meta, value)?;
        }
        self.items = items;
        Ok(())
    }
}

impl SeqTarget for DynList {
    fn type_name(&self) -> &'static str {
        if self.fixed.is_some() {
            "array"
        } else {
            "sequence"
        }
    }

    fn fixed_len(&self) -> Option<usize> {
        self.fixed
    }

    fn fill(
        &mut self,
        count: usize,
        f: &mut dyn FnMut(usize, Slot<'_>) -> Result<bool>,
    ) -> Result<bool> {
        if self.fixed.is_some() {
            for (i, item) in self.items.iter_mut().enumerate().take(count) {
                if !f(i, item.slot())? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }

        let mut items: Vec<DynValue> = (0..count).map(|_| self.elem.zero()).collect();
        for (i, item) in items.iter_mut().enumerate() {
            if !f(i, item.slot())? {
                return Ok(false);
            }
        }
        self.items = items;
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════

/// A record whose fields are described by a [`RecordSpec`]
#[derive(Debug, Clone)]
pub struct DynRecord {
    ty: Arc<RecordType>,
    values: Vec<DynValue>,
}

impl DynRecord {
    pub fn from_spec(spec: &RecordSpec) -> Result<Self> {
        let ty = RecordType::build(&spec.name, &spec.fields)?;
        Ok(Self::zero(Arc::new(ty)))
    }

    fn zero(ty: Arc<RecordType>) -> Self {
        let values = ty.types.iter().map(DynType::zero).collect();
        Self { ty, values }
    }

    /// Current value of a field by identifier
    pub fn get(&self, ident: &str) -> Option<&DynValue> {
        self.ty
            .schema
            .fields()
            .iter()
            .position(|f| f.ident == ident)
            .map(|i| &self.values[i])
    }

    /// Fields keyed by identifier, embedded records flattened
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        self.write_json(&mut object);
        Value::Object(object)
    }

    fn write_json(&self, object: &mut Map<String, Value>) {
        for (meta, value) in self.ty.schema.fields().iter().zip(&self.values) {
            match value {
                DynValue::Record(inner) if meta.embedded => inner.write_json(object),
                _ => {
                    object.insert(meta.ident.to_string(), value.to_json());
                }
            }
        }
    }

    fn assign_object(&mut self, object: &Map<String, Value>) -> Result<()> {
        let ty = Arc::clone(&self.ty);
        for (meta, value) in ty.schema.fields().iter().zip(self.values.iter_mut()) {
            let json_name = tag::head(meta.get("json"), ",").0;
            if json_name == tag::SKIP {
                continue;
            }
            if let (DynValue::Record(inner), true, "") = (&mut *value, meta.embedded, json_name) {
                inner.assign_object(object)?;
                continue;
            }

            let key = if json_name.is_empty() {
                meta.ident.as_ref()
            } else {
                json_name
            };
            if let Some(found) = object.get(key) {
                value.assign_json(meta, found)?;
            }
        }
        Ok(())
    }

    fn collect_missing(&self, prefix: &str, err: &mut ValidationError) {
        let fields = self.ty.schema.fields();
        for (i, (meta, value)) in fields.iter().zip(&self.values).enumerate() {
            let path = format!("{prefix}{}", meta.ident);
            if self.ty.required[i] && value.is_empty() {
                err.fields.push(crate::error::ValidationField {
                    path: path.clone(),
                    code: "required".to_string(),
                    message: "is required".to_string(),
                });
            }

            let nested = match value {
                DynValue::Record(r) => Some(r),
                DynValue::Optional(o) => match o.get() {
                    Some(DynValue::Record(r)) => Some(r),
                    _ => None,
                },
                _ => None,
            };
            if let Some(r) = nested {
                let prefix = if meta.embedded {
                    prefix.to_string()
                } else {
                    format!("{path}.")
                };
                r.collect_missing(&prefix, err);
            }
        }
    }
}

impl Record for DynRecord {
    fn schema(&self) -> &Schema {
        &self.ty.schema
    }

    fn field_slot(&mut self, index: usize) -> Slot<'_> {
        match self.values.get_mut(index) {
            Some(value) => value.slot(),
            None => Slot::Unsupported("field index out of range"),
        }
    }

    fn type_name(&self) -> &'static str {
        "record"
    }

    fn decode_json(&mut self, raw: &[u8]) -> Result<()> {
        let value: Value = serde_json::from_slice(raw).map_err(|e| BindError::Payload {
            format: "JSON",
            reason: e.to_string(),
        })?;
        match value {
            Value::Object(object) => self.assign_object(&object),
            _ => Err(BindError::Payload {
                format: "JSON",
                reason: format!("expected an object for record '{}'", self.ty.schema.name()),
            }),
        }
    }
}

impl Field for DynRecord {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Record(self)
    }
}

impl Validate for DynRecord {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut err = ValidationError::new("validation failed");
        self.collect_missing("", &mut err);
        if err.fields.is_empty() {
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Source, Values};
    use crate::walk::map_slot;
    use pretty_assertions::assert_eq;

    const SEARCH: &str = r#"
name: Search
fields:
  - name: page
    type: int
    tags: { form: "page" }
  - name: size
    type: int
    tags: { form: "size,default=10" }
  - name: ids
    type: "[]uint32"
  - name: pair
    type: "[2]string"
  - name: since
    type: "?time"
    tags: { time_format: unix, time_utc: "true" }
  - name: wait
    type: duration
    tags: { form: "wait,default=1s" }
  - name: audit
    type: record
    embed: true
    fields:
      - { name: actor, type: string, required: true }
  - name: home
    type: "?record"
    fields:
      - { name: city, type: string }
"#;

    fn search() -> DynRecord {
        DynRecord::from_spec(&RecordSpec::from_yaml(SEARCH).unwrap()).unwrap()
    }

    #[test]
    fn parses_type_expressions() {
        let spec = FieldSpec {
            name: "x".into(),
            ty: "?[3][]int8".into(),
            ..FieldSpec::default()
        };
        let ty = DynType::parse(&spec.ty, &spec).unwrap();
        assert!(matches!(
            ty,
            DynType::Optional(ref inner) if matches!(**inner, DynType::Array(_, 3))
        ));
    }

    #[test]
    fn rejects_unknown_types() {
        let err = RecordSpec::from_yaml("name: X\nfields:\n  - { name: a, type: complex128 }")
            .and_then(|spec| DynRecord::from_spec(&spec))
            .unwrap_err();
        assert!(err.to_string().contains("unknown type 'complex128'"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(RecordSpec::from_yaml("name: X\nfeilds: []").is_err());
    }

    #[test]
    fn binds_from_form_values() {
        let values: Values = [
            ("page", "2"),
            ("ids", "1"),
            ("ids", "2"),
            ("pair", "a"),
            ("pair", "b"),
            ("since", "1700000000"),
            ("actor", "ops"),
            ("home.city", "Oslo"),
        ]
        .into_iter()
        .collect();

        let mut record = search();
        assert!(map_slot(record.slot(), Source::Form(&values), "form").unwrap());

        assert_eq!(
            record.to_json(),
            json!({
                "page": 2,
                "size": 10,
                "ids": [1, 2],
                "pair": ["a", "b"],
                "since": "2023-11-14T22:13:20+00:00",
                "wait": "1s",
                "actor": "ops",
                "home": { "city": "Oslo" },
            })
        );
        record.validate().unwrap();
    }

    #[test]
    fn unmatched_optional_stays_null() {
        let values = Values::new();
        let mut record = search();
        map_slot(record.slot(), Source::Form(&values), "form").unwrap();
        assert_eq!(record.to_json()["home"], Value::Null);
        assert_eq!(record.to_json()["since"], Value::Null);
    }

    #[test]
    fn required_fields_are_validated() {
        let err = search().validate().unwrap_err();
        assert_eq!(err.fields.len(), 1);
        assert_eq!(err.fields[0].path, "actor");
    }

    #[test]
    fn decodes_json_documents() {
        let mut record = search();
        record
            .decode_json(br#"{"page": 3, "ids": [4], "wait": "2m", "actor": "api", "home": {"city": "Rome"}}"#)
            .unwrap();
        let out = record.to_json();
        assert_eq!(out["page"], 3);
        assert_eq!(out["ids"], json!([4]));
        assert_eq!(out["wait"], "2m0s");
        assert_eq!(out["actor"], "api");
        assert_eq!(out["home"]["city"], "Rome");
    }

    #[test]
    fn json_array_length_is_checked() {
        let mut record = search();
        let err = record.decode_json(br#"{"pair": ["only"]}"#).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ArityMismatch);
    }
}
