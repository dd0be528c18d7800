//! Struct walker
//!
//! Recursively visits a record's fields in declaration order and hands each
//! leaf to the source adapter. Nested record naming:
//! - embedded records without their own binding name are flattened
//! - named records are first tried as a leaf (JSON text under their key),
//!   then their fields resolve as `key.field`
//!
//! The first error aborts the walk; fields written before it keep their value.

use tracing::trace;

use crate::error::Result;
use crate::schema::{FieldMeta, Record, Slot};
use crate::source::Source;
use crate::tag::{self, BindingTag};

/// Bind a whole target from a source, using tags from namespace `ns`.
///
/// A map at the root receives every key of the source. Anything else is
/// walked as a record.
pub fn map_slot(slot: Slot<'_>, source: Source<'_>, ns: &str) -> Result<bool> {
    match slot {
        Slot::Json(target) => {
            target.fill_values(source.values())?;
            Ok(true)
        }
        other => walk(other, None, "", source, ns),
    }
}

/// Walk one value. `field` is `None` at the root.
pub fn walk(
    slot: Slot<'_>,
    field: Option<&FieldMeta>,
    prefix: &str,
    source: Source<'_>,
    ns: &str,
) -> Result<bool> {
    let tag = field.map(|f| tag::cached(f.get(ns)));
    if tag.as_ref().is_some_and(|t| t.skip) {
        return Ok(false);
    }

    match slot {
        Slot::Optional(target) => {
            target.with_inner(&mut |inner| walk(inner, field, prefix, source, ns))
        }
        Slot::Record(record) => {
            let Some(field) = field else {
                return walk_fields(record, prefix, source, ns);
            };
            let tag = tag.unwrap_or_default();

            if field.embedded && !tag.is_named() {
                return walk_fields(record, prefix, source, ns);
            }

            let Some(key) = resolve_key(field, &tag, prefix) else {
                return Ok(false);
            };
            if source.try_set(Slot::Record(&mut *record), Some(field), &key, &tag.options)? {
                trace!(key = %key, "record set from a single value");
                return Ok(true);
            }
            walk_fields(record, &format!("{key}."), source, ns)
        }
        leaf => {
            let Some(field) = field else {
                return Ok(false);
            };
            let tag = tag.unwrap_or_default();
            let Some(key) = resolve_key(field, &tag, prefix) else {
                return Ok(false);
            };

            let set = source.try_set(leaf, Some(field), &key, &tag.options)?;
            if set {
                trace!(key = %key, field = %field.ident, "field set");
            }
            Ok(set)
        }
    }
}

fn walk_fields(record: &mut dyn Record, prefix: &str, source: Source<'_>, ns: &str) -> Result<bool> {
    // detach the field table so field slots can borrow the record mutably
    let fields = record.schema().shared_fields();

    let mut any_set = false;
    for (index, meta) in fields.iter().enumerate() {
        if !meta.exported && !meta.embedded {
            continue;
        }
        let set = walk(record.field_slot(index), Some(meta), prefix, source, ns)?;
        any_set |= set;
    }
    Ok(any_set)
}

/// Binding name for a field: the tag name, else the identifier. Qualified
/// by the enclosing record's prefix.
fn resolve_key(field: &FieldMeta, tag: &BindingTag, prefix: &str) -> Option<String> {
    let name = if tag.name.is_empty() {
        field.ident.as_ref()
    } else {
        tag.name.as_str()
    };
    if name.is_empty() {
        return None;
    }
    Some(format!("{prefix}{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use crate::source::Values;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, PartialEq)]
    struct Audit {
        actor: String,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Address {
        city: String,
        zip: String,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Profile {
        audit: Audit,
        name: String,
        home: Address,
        work: Option<Address>,
        internal: String,
        ignored: i32,
    }

    crate::record!(Audit {
        actor => [form = "actor"],
    });

    crate::record!(Address {
        city => [form = "city"],
        zip => [],
    });

    crate::record!(Profile {
        audit @embed => [],
        name => [form = "name"],
        home => [form = "home"],
        work => [form = "work"],
        internal @private => [],
        ignored => [form = "-"],
    });

    fn bind(pairs: &[(&str, &str)]) -> Result<(bool, Profile)> {
        let values: Values = pairs.iter().copied().collect();
        let mut profile = Profile::default();
        let set = map_slot(profile.slot(), Source::Form(&values), "form")?;
        Ok((set, profile))
    }

    #[test]
    fn embedded_fields_are_flattened() {
        let (_, p) = bind(&[("actor", "ops"), ("name", "ada")]).unwrap();
        assert_eq!(p.audit.actor, "ops");
        assert_eq!(p.name, "ada");
    }

    #[derive(Debug, Default)]
    struct Mixed {
        named: Audit,
        hidden: Audit,
    }

    crate::record!(Mixed {
        named @embed => [form = "named"],
        hidden @embed @private => [],
    });

    #[test]
    fn named_embed_is_qualified_and_private_embed_is_walked() {
        let values: Values = [("actor", "flat"), ("named.actor", "qual")].into_iter().collect();
        let mut mixed = Mixed::default();
        let set = map_slot(mixed.slot(), Source::Form(&values), "form").unwrap();

        assert!(set);
        assert_eq!(mixed.named.actor, "qual");
        assert_eq!(mixed.hidden.actor, "flat");
    }

    #[test]
    fn named_records_are_qualified() {
        let (_, p) = bind(&[("city", "flat"), ("home.city", "Paris"), ("home.zip", "75001")]).unwrap();
        assert_eq!(
            p.home,
            Address {
                city: "Paris".into(),
                zip: "75001".into()
            }
        );
    }

    #[test]
    fn optional_record_stays_unset_without_matches() {
        let (set, p) = bind(&[("name", "ada")]).unwrap();
        assert!(set);
        assert_eq!(p.work, None);
    }

    #[test]
    fn optional_record_allocated_on_match() {
        let (_, p) = bind(&[("work.city", "Berlin")]).unwrap();
        assert_eq!(p.work.unwrap().city, "Berlin");
    }

    #[test]
    fn skipped_and_private_fields_are_untouched() {
        let (set, p) = bind(&[("ignored", "not a number"), ("internal", "x")]).unwrap();
        assert!(!set);
        assert_eq!(p.ignored, 0);
        assert_eq!(p.internal, "");
    }

    #[test]
    fn named_record_without_json_decoder_rejects_leaf_value() {
        let err = bind(&[("home", "{\"city\":\"Rome\"}")]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedTarget);
    }

    #[test]
    fn nothing_matched_reports_unset() {
        let (set, p) = bind(&[]).unwrap();
        assert!(!set);
        assert_eq!(p, Profile::default());
    }
}
