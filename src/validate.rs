//! Post-binding validation
//!
//! Every binding ends with [`Validator::check_struct`]: the record's own
//! structural check ([`Validate`]) always runs, and a caller-supplied rule
//! function runs after it when one is registered.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{BindError, Result, ValidationError};

/// Structural check a record applies to itself.
///
/// The default accepts everything.
pub trait Validate {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }
}

impl<V, S> Validate for HashMap<String, V, S> {}
impl<V> Validate for BTreeMap<String, V> {}
impl Validate for serde_json::Value {}
impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self {
            Some(inner) => inner.validate(),
            None => Ok(()),
        }
    }
}

/// Custom rule function: `Err(reason)` rejects the record
pub type RuleFn<T> = dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync;

/// Runs the structural check plus an optional named rule set
pub struct Validator<'a, T: ?Sized> {
    rule: Option<(&'a str, &'a RuleFn<T>)>,
}

impl<T: ?Sized> Default for Validator<'_, T> {
    fn default() -> Self {
        Self { rule: None }
    }
}

impl<T: ?Sized> fmt::Debug for Validator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("rule", &self.rule.map(|(name, _)| name))
            .finish()
    }
}

impl<'a, T: Validate + ?Sized> Validator<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named custom rule function
    pub fn rule_func(mut self, rule: &'a str, func: &'a RuleFn<T>) -> Self {
        self.rule = Some((rule, func));
        self
    }

    pub fn check_struct(&self, record: &T) -> Result<()> {
        record.validate()?;

        if let Some((rule, func)) = self.rule {
            func(record).map_err(|reason| BindError::RuleFailed {
                rule: rule.to_string(),
                reason,
            })?;
        }
        Ok(())
    }
}
