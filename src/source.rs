//! Source adapters: read-only key → values views over one request
//!
//! Three variants, selected by the binding:
//! - [`Source::Form`]: query strings, url-encoded bodies, path parameters
//! - [`Source::Header`]: like `Form`, but keys are looked up in canonical
//!   header casing (`x-request-id` → `X-Request-Id`)
//! - [`Source::Multipart`]: uploaded file parts first, then plain values

use rustc_hash::FxHashMap;

use crate::coerce::{set_multi, set_with_type};
use crate::error::{BindError, Result};
use crate::multipart::{FileHeader, MultipartForm};
use crate::schema::{FieldMeta, SeqTarget, Slot};
use crate::tag::SetOptions;

/// Ordered multi-values per key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    inner: FxHashMap<String, Vec<String>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Register `key` with no values (a present-but-empty key)
    pub fn touch(&mut self, key: impl Into<String>) {
        self.inner.entry(key.into()).or_default();
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.inner.get(key).map(Vec::as_slice)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|vs| vs.first()).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Append every value of `other`, after the values already held
    pub fn merge(&mut self, other: &Values) {
        for (key, vs) in other.iter() {
            self.inner
                .entry(key.to_string())
                .or_default()
                .extend(vs.iter().cloned());
        }
    }

    /// Parse `a=1&a=2&b=x` (percent and `+` decoding applied)
    pub fn from_urlencoded(raw: &[u8]) -> Self {
        url::form_urlencoded::parse(raw)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Build from header pairs, folding names into canonical casing
    pub fn from_headers(headers: &http::HeaderMap) -> Self {
        let mut values = Self::new();
        for (name, value) in headers {
            values.add(
                canonical_header_key(name.as_str()),
                String::from_utf8_lossy(value.as_bytes()),
            );
        }
        values
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (k, v) in iter {
            values.add(k, v);
        }
        values
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Canonical header casing: first letter and letters after `-` upper case,
/// the rest lower case. Keys with non-token bytes are returned unchanged.
pub fn canonical_header_key(key: &str) -> String {
    if !key.bytes().all(is_token_byte) {
        return key.to_string();
    }

    let mut upper = true;
    key.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// A source view over one transport payload
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Form(&'a Values),
    /// Keys match case-insensitively; canonical keys are found directly
    Header(&'a Values),
    Multipart(&'a MultipartForm),
}

impl<'a> Source<'a> {
    /// Plain values behind the source
    pub fn values(&self) -> &'a Values {
        match self {
            Source::Form(values) | Source::Header(values) => values,
            Source::Multipart(form) => &form.values,
        }
    }

    /// Try to write the value(s) under `key` into `slot`.
    ///
    /// Returns `Ok(false)` when the key is absent and no default exists.
    pub fn try_set(
        &self,
        slot: Slot<'_>,
        field: Option<&FieldMeta>,
        key: &str,
        opts: &SetOptions,
    ) -> Result<bool> {
        match self {
            Source::Form(values) => set_by_form(slot, field, key, values.get(key), opts),
            Source::Header(values) => {
                let key = canonical_header_key(key);
                let found = values.get(&key).or_else(|| {
                    values
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(&key))
                        .map(|(_, vs)| vs)
                });
                set_by_form(slot, field, &key, found, opts)
            }
            Source::Multipart(form) => match form.files.get(key) {
                Some(files) if !files.is_empty() => set_by_files(slot, key, files),
                _ => set_by_form(slot, field, key, form.values.get(key), opts),
            },
        }
    }
}

/// Write looked-up values into a slot.
///
/// A key that is absent or present without values falls back to the
/// default when one exists. Scalars take the first value.
pub fn set_by_form(
    slot: Slot<'_>,
    field: Option<&FieldMeta>,
    key: &str,
    found: Option<&[String]>,
    opts: &SetOptions,
) -> Result<bool> {
    if found.is_none() && !opts.has_default() {
        return Ok(false);
    }

    let vals: Vec<&str> = match found {
        Some(vs) if !vs.is_empty() => vs.iter().map(String::as_str).collect(),
        _ if opts.has_default() => vec![opts.default_value()],
        _ => Vec::new(),
    };

    match slot {
        Slot::Seq(target) => set_multi(key, &vals, target, field)?,
        // the walker unwraps options itself; this serves direct callers
        Slot::Optional(target) => {
            // Option<Vec<_>> still takes every value
            target.with_inner(&mut |inner| match inner {
                Slot::Seq(seq) => set_multi(key, &vals, seq, field).map(|()| true),
                other => set_with_type(vals.first().copied().unwrap_or(""), other, field)
                    .map(|()| true),
            })?;
        }
        other => set_with_type(vals.first().copied().unwrap_or(""), other, field)?,
    }
    Ok(true)
}

/// Assign uploaded file parts to a file-typed slot
pub fn set_by_files(slot: Slot<'_>, key: &str, files: &[FileHeader]) -> Result<bool> {
    match slot {
        Slot::File(target) => {
            *target = files[0].clone();
            Ok(true)
        }
        Slot::Optional(target) => {
            target.with_inner(&mut |inner| set_by_files(inner, key, files))
        }
        Slot::Seq(target) => set_file_seq(target, key, files),
        other => Err(BindError::UnsupportedFileTarget {
            key: key.to_string(),
            target: other.type_name(),
        }),
    }
}

fn set_file_seq(target: &mut dyn SeqTarget, key: &str, files: &[FileHeader]) -> Result<bool> {
    if let Some(expected) = target.fixed_len() {
        if expected != files.len() {
            return Err(BindError::FileCount {
                key: key.to_string(),
                expected,
                actual: files.len(),
            });
        }
    }

    target.fill(files.len(), &mut |i, slot| {
        set_by_files(slot, key, &files[i..=i])
    })
}
