//! Binding tag parser with caching
//!
//! Tag grammar (same for the `form`, `uri` and `header` namespaces):
//!
//! ```text
//! name,opt1,opt2=value
//! ```
//!
//! - `name` may be empty, in which case the field identifier is used
//! - `-` on its own disables the field entirely
//! - only the `default=value` option is recognized; anything else is ignored
//!
//! Parsing is a pure function of the raw text, so parsed tags are cached by
//! that text in a process-wide [`DashMap`] shared by every record type.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Raw tag value that disables a field
pub const SKIP: &str = "-";

/// Per-field transient state handed from the tag parser to the coercer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Default used when the source has no value for the field
    pub default: Option<String>,
}

impl SetOptions {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> &str {
        self.default.as_deref().unwrap_or("")
    }
}

/// A parsed binding tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTag {
    /// Binding name; empty means "use the field identifier"
    pub name: String,
    /// Explicit opt-out (`-`)
    pub skip: bool,
    pub options: SetOptions,
}

impl BindingTag {
    /// True when the tag names the field explicitly
    pub fn is_named(&self) -> bool {
        !self.skip && !self.name.is_empty()
    }
}

/// Split `s` at the first `sep`, returning the head and the remaining tail
pub fn head<'a>(s: &'a str, sep: &str) -> (&'a str, &'a str) {
    match s.find(sep) {
        Some(idx) => (&s[..idx], &s[idx + sep.len()..]),
        None => (s, ""),
    }
}

/// Parse a raw tag value into a [`BindingTag`]
pub fn parse(raw: &str) -> BindingTag {
    if raw == SKIP {
        return BindingTag {
            skip: true,
            ..BindingTag::default()
        };
    }

    let (name, mut rest) = head(raw, ",");
    let mut options = SetOptions::default();

    while !rest.is_empty() {
        let (opt, tail) = head(rest, ",");
        rest = tail;

        let (key, value) = head(opt, "=");
        if key == "default" {
            options.default = Some(value.to_string());
        }
    }

    BindingTag {
        name: name.to_string(),
        skip: false,
        options,
    }
}

static TAG_CACHE: Lazy<DashMap<String, Arc<BindingTag>>> = Lazy::new(DashMap::new);

/// Parse a raw tag value, reusing a previous parse of the same text
pub fn cached(raw: &str) -> Arc<BindingTag> {
    if let Some(hit) = TAG_CACHE.get(raw) {
        return Arc::clone(&hit);
    }

    let parsed = Arc::new(parse(raw));
    TAG_CACHE.insert(raw.to_string(), Arc::clone(&parsed));
    parsed
}
