//! Recompute triggers.
//!
//! A [`TriggerSpec`] is what callers configure; [`Triggers`] is the resolved
//! form stored on a field after registration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::schema::TableSchema;

const ALWAYS: &str = "always";

/// Configured trigger rule for one denormalized field.
///
/// In config files this is written as `"always"`, a single trigger name,
/// or a list of trigger names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TriggerRepr", into = "TriggerRepr")]
pub enum TriggerSpec {
    /// The field is stale on every evaluation.
    Always,
    /// Own attribute or association names. Empty means any own attribute.
    On(Vec<String>),
}

impl TriggerSpec {
    pub fn on<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TriggerSpec::On(names.into_iter().map(Into::into).collect())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TriggerRepr {
    One(String),
    Many(Vec<String>),
}

impl From<TriggerRepr> for TriggerSpec {
    fn from(repr: TriggerRepr) -> Self {
        match repr {
            TriggerRepr::One(name) if name == ALWAYS => TriggerSpec::Always,
            TriggerRepr::One(name) => TriggerSpec::On(vec![name]),
            TriggerRepr::Many(names) if names.len() == 1 && names[0] == ALWAYS => TriggerSpec::Always,
            TriggerRepr::Many(names) => TriggerSpec::On(names),
        }
    }
}

impl From<TriggerSpec> for TriggerRepr {
    fn from(spec: TriggerSpec) -> Self {
        match spec {
            TriggerSpec::Always => TriggerRepr::One(ALWAYS.to_string()),
            TriggerSpec::On(names) => TriggerRepr::Many(names),
        }
    }
}

/// Resolved triggers of a registered field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triggers {
    Always,
    /// Any change to the record's own attributes; associations are ignored.
    AnyChange,
    /// Named attributes and associations, plus the foreign key of every
    /// named many-to-one association.
    Names(BTreeSet<String>),
}

impl Triggers {
    pub(crate) fn resolve(spec: Option<&TriggerSpec>, schema: &TableSchema) -> Self {
        let names = match spec {
            None => return Triggers::AnyChange,
            Some(TriggerSpec::Always) => return Triggers::Always,
            Some(TriggerSpec::On(names)) => names,
        };
        if names.is_empty() {
            return Triggers::AnyChange;
        }

        let mut resolved: BTreeSet<String> = names.iter().cloned().collect();
        for name in names {
            if let Some(assoc) = schema.find_belongs_to(name) {
                resolved.insert(assoc.foreign_key.clone());
            }
        }
        Triggers::Names(resolved)
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Triggers::Always)
    }

    /// Named triggers, empty for `Always` and `AnyChange`.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let names = match self {
            Triggers::Names(names) => Some(names),
            _ => None,
        };
        names.into_iter().flatten().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(self, Triggers::Names(names) if names.contains(name))
    }
}
