//! Target record description
//!
//! A bindable record exposes two things to the walker:
//! - a [`Schema`]: its fields in declaration order with their tags, built once
//!   per type and memoized
//! - [`Record::field_slot`]: a [`Slot`] for each field, a tagged union of
//!   mutable references the coercer knows how to write
//!
//! Most records are declared with the [`record!`](crate::record) macro:
//!
//! ```
//! use reqbind::record;
//!
//! #[derive(Debug, Default)]
//! struct Paging {
//!     page: i64,
//!     size: i64,
//! }
//!
//! record!(Paging {
//!     page => [form = "page"],
//!     size => [form = "size,default=10"],
//! });
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::de::DeserializeOwned;

use crate::error::{BindError, Result};
use crate::multipart::FileHeader;
use crate::source::Values;

/// Static description of one record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Field identifier, the default binding name
    pub ident: Cow<'static, str>,
    tags: Vec<(Cow<'static, str>, Cow<'static, str>)>,
    /// Members are exposed as if declared on the containing record
    pub embedded: bool,
    /// Visible to the walker; private fields are skipped unless embedded
    pub exported: bool,
}

impl FieldMeta {
    pub fn new(ident: impl Into<Cow<'static, str>>) -> Self {
        Self {
            ident: ident.into(),
            tags: Vec::new(),
            embedded: false,
            exported: true,
        }
    }

    /// Attach a raw tag value under a namespace (`form`, `uri`, `time_format`, ...)
    pub fn tag(
        mut self,
        namespace: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.tags.push((namespace.into(), value.into()));
        self
    }

    pub fn embed(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.exported = false;
        self
    }

    /// Raw tag value for a namespace, if the field declares one
    pub fn lookup(&self, namespace: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, value)| value.as_ref())
    }

    /// Raw tag value for a namespace, empty when absent
    pub fn get(&self, namespace: &str) -> &str {
        self.lookup(namespace).unwrap_or("")
    }
}

/// Field table for one record type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    name: Cow<'static, str>,
    fields: Arc<Vec<FieldMeta>>,
}

impl Schema {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            fields: Arc::new(Vec::new()),
        }
    }

    /// Append a field, builder style (declaration order matters)
    pub fn field(mut self, meta: FieldMeta) -> Self {
        Arc::make_mut(&mut self.fields).push(meta);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// The field table as a cheap shared handle, detached from `self`
    pub fn shared_fields(&self) -> Arc<Vec<FieldMeta>> {
        Arc::clone(&self.fields)
    }
}

/// Signed integer targets, by width
#[derive(Debug)]
pub enum IntRef<'a> {
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    Isize(&'a mut isize),
}

/// Unsigned integer targets, by width
#[derive(Debug)]
pub enum UintRef<'a> {
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    Usize(&'a mut usize),
}

/// Floating point targets, by width
#[derive(Debug)]
pub enum FloatRef<'a> {
    F32(&'a mut f32),
    F64(&'a mut f64),
}

/// A writable view of one field, tagged by kind
pub enum Slot<'a> {
    Int(IntRef<'a>),
    Uint(UintRef<'a>),
    Float(FloatRef<'a>),
    Bool(&'a mut bool),
    Str(&'a mut String),
    Duration(&'a mut TimeDelta),
    Time(&'a mut DateTime<FixedOffset>),
    /// Leaf decoded from a JSON text value (maps, `serde_json::Value`)
    Json(&'a mut dyn JsonTarget),
    File(&'a mut FileHeader),
    /// Lazily allocated value (`Option<T>`)
    Optional(&'a mut dyn OptionalTarget),
    /// Resizable or fixed-size sequence
    Seq(&'a mut dyn SeqTarget),
    Record(&'a mut dyn Record),
    /// Kind with no coercion rule; writing to it is an error
    Unsupported(&'static str),
}

impl Slot<'_> {
    /// Human readable name of the target type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Slot::Int(IntRef::I8(_)) => "i8",
            Slot::Int(IntRef::I16(_)) => "i16",
            Slot::Int(IntRef::I32(_)) => "i32",
            Slot::Int(IntRef::I64(_)) => "i64",
            Slot::Int(IntRef::Isize(_)) => "isize",
            Slot::Uint(UintRef::U8(_)) => "u8",
            Slot::Uint(UintRef::U16(_)) => "u16",
            Slot::Uint(UintRef::U32(_)) => "u32",
            Slot::Uint(UintRef::U64(_)) => "u64",
            Slot::Uint(UintRef::Usize(_)) => "usize",
            Slot::Float(FloatRef::F32(_)) => "f32",
            Slot::Float(FloatRef::F64(_)) => "f64",
            Slot::Bool(_) => "bool",
            Slot::Str(_) => "String",
            Slot::Duration(_) => "duration",
            Slot::Time(_) => "timestamp",
            Slot::Json(target) => target.type_name(),
            Slot::File(_) => "FileHeader",
            Slot::Optional(target) => target.type_name(),
            Slot::Seq(target) => target.type_name(),
            Slot::Record(record) => record.type_name(),
            Slot::Unsupported(name) => *name,
        }
    }
}

/// A record the walker can descend into
pub trait Record {
    fn schema(&self) -> &Schema;

    /// Slot for the field at `index` in [`Schema::fields`]
    fn field_slot(&mut self, index: usize) -> Slot<'_>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Replace the record from a JSON document
    fn decode_json(&mut self, _raw: &[u8]) -> Result<()> {
        Err(BindError::unsupported(
            self.type_name(),
            "record has no JSON decoder",
        ))
    }

    /// Replace the record from an XML document
    fn decode_xml(&mut self, _raw: &[u8]) -> Result<()> {
        Err(BindError::unsupported(
            self.type_name(),
            "record has no XML decoder",
        ))
    }
}

/// Entry point from a concrete field type to its [`Slot`]
pub trait Field {
    fn slot(&mut self) -> Slot<'_>;
}

/// Leaf decoded from JSON text
pub trait JsonTarget {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn decode_json(&mut self, raw: &str) -> Result<()>;

    /// Receive every key of a source (string maps at the root of a binding)
    fn fill_values(&mut self, _values: &Values) -> Result<()> {
        Err(BindError::unsupported(
            self.type_name(),
            "only string-keyed maps can receive a whole source",
        ))
    }
}

/// One map entry from a multi-value key: the last value if `V` reads from
/// a string, else every value if `V` reads from a list
fn map_entry<V: DeserializeOwned>(key: &str, vs: &[String]) -> Result<Option<V>> {
    let Some(last) = vs.last() else {
        return Ok(None);
    };
    if let Ok(v) = serde_json::from_value(serde_json::Value::String(last.clone())) {
        return Ok(Some(v));
    }
    let all = vs.iter().cloned().map(serde_json::Value::String).collect();
    serde_json::from_value(serde_json::Value::Array(all))
        .map(Some)
        .map_err(|e| BindError::invalid_value(key, "map value", e))
}

/// Optional value that is only committed when something was written to it
pub trait OptionalTarget {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Run `f` against the inner value, allocating a default one if unset.
    /// A fresh allocation is kept only when `f` reports a write.
    fn with_inner(&mut self, f: &mut dyn FnMut(Slot<'_>) -> Result<bool>) -> Result<bool>;
}

/// Ordered sequence target
pub trait SeqTarget {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// `Some(n)` for fixed-size arrays, `None` for resizable sequences
    fn fixed_len(&self) -> Option<usize>;

    /// Write `count` elements through `f`. Resizable sequences build a new
    /// backing store and swap it in only if every element was written.
    fn fill(
        &mut self,
        count: usize,
        f: &mut dyn FnMut(usize, Slot<'_>) -> Result<bool>,
    ) -> Result<bool>;
}

macro_rules! int_field {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Field for $ty {
                fn slot(&mut self) -> Slot<'_> {
                    Slot::Int(IntRef::$variant(self))
                }
            }
        )*
    };
}

macro_rules! uint_field {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Field for $ty {
                fn slot(&mut self) -> Slot<'_> {
                    Slot::Uint(UintRef::$variant(self))
                }
            }
        )*
    };
}

int_field!(i8 => I8, i16 => I16, i32 => I32, i64 => I64, isize => Isize);
uint_field!(u8 => U8, u16 => U16, u32 => U32, u64 => U64, usize => Usize);

impl Field for f32 {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Float(FloatRef::F32(self))
    }
}

impl Field for f64 {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Float(FloatRef::F64(self))
    }
}

impl Field for bool {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Bool(self)
    }
}

impl Field for String {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Str(self)
    }
}

impl Field for TimeDelta {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Duration(self)
    }
}

impl Field for DateTime<FixedOffset> {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Time(self)
    }
}

impl Field for FileHeader {
    fn slot(&mut self) -> Slot<'_> {
        Slot::File(self)
    }
}

impl Field for serde_json::Value {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Json(self)
    }
}

impl JsonTarget for serde_json::Value {
    fn decode_json(&mut self, raw: &str) -> Result<()> {
        *self = serde_json::from_str(raw).map_err(|e| BindError::invalid_value(raw, "JSON", e))?;
        Ok(())
    }
}

impl<V, S> Field for HashMap<String, V, S>
where
    V: DeserializeOwned,
    S: BuildHasher + Default,
{
    fn slot(&mut self) -> Slot<'_> {
        Slot::Json(self)
    }
}

impl<V, S> JsonTarget for HashMap<String, V, S>
where
    V: DeserializeOwned,
    S: BuildHasher + Default,
{
    fn decode_json(&mut self, raw: &str) -> Result<()> {
        let decoded: HashMap<String, V, S> = serde_json::from_str(raw)
            .map_err(|e| BindError::invalid_value(raw, "JSON object", e))?;
        self.extend(decoded);
        Ok(())
    }

    fn fill_values(&mut self, values: &Values) -> Result<()> {
        for (key, vs) in values.iter() {
            if let Some(v) = map_entry(key, vs)? {
                self.insert(key.to_string(), v);
            }
        }
        Ok(())
    }
}

impl<V: DeserializeOwned> Field for BTreeMap<String, V> {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Json(self)
    }
}

impl<V: DeserializeOwned> JsonTarget for BTreeMap<String, V> {
    fn decode_json(&mut self, raw: &str) -> Result<()> {
        let decoded: BTreeMap<String, V> = serde_json::from_str(raw)
            .map_err(|e| BindError::invalid_value(raw, "JSON object", e))?;
        self.extend(decoded);
        Ok(())
    }

    fn fill_values(&mut self, values: &Values) -> Result<()> {
        for (key, vs) in values.iter() {
            if let Some(v) = map_entry(key, vs)? {
                self.insert(key.to_string(), v);
            }
        }
        Ok(())
    }
}

impl<T: Field + Default> Field for Option<T> {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Optional(self)
    }
}

impl<T: Field + Default> OptionalTarget for Option<T> {
    fn with_inner(&mut self, f: &mut dyn FnMut(Slot<'_>) -> Result<bool>) -> Result<bool> {
        match self {
            Some(inner) => f(inner.slot()),
            None => {
                let mut fresh = T::default();
                let set = f(fresh.slot())?;
                if set {
                    *self = Some(fresh);
                }
                Ok(set)
            }
        }
    }
}

impl<T: Field + Default> Field for Vec<T> {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Seq(self)
    }
}

impl<T: Field + Default> SeqTarget for Vec<T> {
    fn fixed_len(&self) -> Option<usize> {
        None
    }

    fn fill(
        &mut self,
        count: usize,
        f: &mut dyn FnMut(usize, Slot<'_>) -> Result<bool>,
    ) -> Result<bool> {
        let mut items: Vec<T> = (0..count).map(|_| T::default()).collect();
        for (i, item) in items.iter_mut().enumerate() {
            if !f(i, item.slot())? {
                return Ok(false);
            }
        }
        *self = items;
        Ok(true)
    }
}

impl<T: Field, const N: usize> Field for [T; N] {
    fn slot(&mut self) -> Slot<'_> {
        Slot::Seq(self)
    }
}

impl<T: Field, const N: usize> SeqTarget for [T; N] {
    fn fixed_len(&self) -> Option<usize> {
        Some(N)
    }

    fn fill(
        &mut self,
        count: usize,
        f: &mut dyn FnMut(usize, Slot<'_>) -> Result<bool>,
    ) -> Result<bool> {
        for (i, item) in self.iter_mut().enumerate().take(count) {
            if !f(i, item.slot())? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Declare a bindable record.
///
/// ```text
/// record!(Name {
///     field [@embed] [@private] => [namespace = "tag", ...],
///     ...
/// });
/// record!(serde Name { ... });   // also decodes JSON/XML payloads via serde
/// ```
///
/// Fields are listed in declaration order. `@embed` flattens a nested
/// record into its parent, `@private` hides a field from the walker.
#[macro_export]
macro_rules! record {
    (@impl $name:ident [$($extra:tt)*] {
        $( $field:ident $(@$flag:ident)* => [ $( $ns:ident = $tag:literal ),* $(,)? ] ),* $(,)?
    }) => {
        impl $crate::schema::Record for $name {
            fn schema(&self) -> &$crate::schema::Schema {
                static SCHEMA: $crate::__private::Lazy<$crate::schema::Schema> =
                    $crate::__private::Lazy::new(|| {
                        $crate::schema::Schema::new(stringify!($name))
                            $(
                                .field(
                                    $crate::schema::FieldMeta::new(stringify!($field))
                                        $( .$flag() )*
                                        $( .tag(stringify!($ns), $tag) )*
                                )
                            )*
                    });
                &SCHEMA
            }

            #[allow(unused_assignments, unused_mut)]
            fn field_slot(&mut self, index: usize) -> $crate::schema::Slot<'_> {
                let mut position = 0usize;
                $(
                    if index == position {
                        return $crate::schema::Field::slot(&mut self.$field);
                    }
                    position += 1;
                )*
                $crate::schema::Slot::Unsupported("field index out of range")
            }

            $($extra)*
        }

        impl $crate::schema::Field for $name {
            fn slot(&mut self) -> $crate::schema::Slot<'_> {
                $crate::schema::Slot::Record(self)
            }
        }
    };
    (serde $name:ident { $($body:tt)* }) => {
        $crate::record!(@impl $name [
            fn decode_json(&mut self, raw: &[u8]) -> $crate::error::Result<()> {
                $crate::payload::json_into(self, raw)
            }

            fn decode_xml(&mut self, raw: &[u8]) -> $crate::error::Result<()> {
                $crate::payload::xml_into(self, raw)
            }
        ] { $($body)* });
    };
    ($name:ident { $($body:tt)* }) => {
        $crate::record!(@impl $name [] { $($body)* });
    };
}
