//! Instance-data facts for the planner.
//!
//! The planner never talks to a database. Whatever it needs to know about
//! existing data comes through a [`DataProbe`], and every answer may be
//! unknown.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answer to a data compatibility question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Existing data satisfies the new rule.
    Compatible,
    /// Existing data violates the new rule.
    Incompatible {
        /// Size of the violation (highest multiplicity, or duplicate groups).
        count: u64,
    },
    /// Nothing is known.
    Unknown,
}

/// Source of facts about instance data. Names are those of the old schema.
pub trait DataProbe {
    /// Number of instances of exactly this type, if known.
    fn instance_count(&self, type_name: &str) -> Option<u64>;

    /// Whether every instance holds at most one value for `pointer`.
    fn check_single(&self, type_name: &str, pointer: &str) -> Compatibility;

    /// Whether the combined values of `pointers` are unique across instances.
    fn check_exclusive(&self, type_name: &str, pointers: &[String]) -> Compatibility;
}

/// A database known to hold no instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyDatabase;

impl DataProbe for EmptyDatabase {
    fn instance_count(&self, _type_name: &str) -> Option<u64> {
        Some(0)
    }

    fn check_single(&self, _type_name: &str, _pointer: &str) -> Compatibility {
        Compatibility::Compatible
    }

    fn check_exclusive(&self, _type_name: &str, _pointers: &[String]) -> Compatibility {
        Compatibility::Compatible
    }
}

/// A probe that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unprobed;

impl DataProbe for Unprobed {
    fn instance_count(&self, _type_name: &str) -> Option<u64> {
        None
    }

    fn check_single(&self, _type_name: &str, _pointer: &str) -> Compatibility {
        Compatibility::Unknown
    }

    fn check_exclusive(&self, _type_name: &str, _pointers: &[String]) -> Compatibility {
        Compatibility::Unknown
    }
}

/// Precomputed statistics, usually loaded from a JSON file.
///
/// ```json
/// {
///   "instances": {"User": 120},
///   "max_multiplicity": {"User.tags": 1},
///   "duplicates": {"User(first, last)": 0}
/// }
/// ```
///
/// Missing entries are unknown, except that a type with zero instances is
/// compatible with everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticProbe {
    /// Type -> instance count.
    #[serde(default)]
    pub instances: BTreeMap<String, u64>,
    /// `Type.pointer` -> highest number of values held by one instance.
    #[serde(default)]
    pub max_multiplicity: BTreeMap<String, u64>,
    /// `Type(a, b)` -> number of duplicate value groups.
    #[serde(default)]
    pub duplicates: BTreeMap<String, u64>,
}

impl StaticProbe {
    /// Create an empty set of statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse statistics from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Record an instance count.
    pub fn with_instances(mut self, type_name: impl Into<String>, count: u64) -> Self {
        self.instances.insert(type_name.into(), count);
        self
    }

    /// Record the highest multiplicity of a pointer.
    pub fn with_multiplicity(mut self, type_name: &str, pointer: &str, max: u64) -> Self {
        self.max_multiplicity
            .insert(format!("{}.{}", type_name, pointer), max);
        self
    }

    /// Record the duplicate groups for a set of pointers.
    pub fn with_duplicates(mut self, type_name: &str, pointers: &[&str], count: u64) -> Self {
        self.duplicates
            .insert(format!("{}({})", type_name, pointers.join(", ")), count);
        self
    }

    fn is_empty_type(&self, type_name: &str) -> bool {
        self.instances.get(type_name) == Some(&0)
    }
}

impl DataProbe for StaticProbe {
    fn instance_count(&self, type_name: &str) -> Option<u64> {
        self.instances.get(type_name).copied()
    }

    fn check_single(&self, type_name: &str, pointer: &str) -> Compatibility {
        if self.is_empty_type(type_name) {
            return Compatibility::Compatible;
        }
        match self
            .max_multiplicity
            .get(&format!("{}.{}", type_name, pointer))
            .copied()
        {
            Some(max) if max <= 1 => Compatibility::Compatible,
            Some(max) => Compatibility::Incompatible { count: max },
            None => Compatibility::Unknown,
        }
    }

    fn check_exclusive(&self, type_name: &str, pointers: &[String]) -> Compatibility {
        if self.is_empty_type(type_name) {
            return Compatibility::Compatible;
        }
        match self
            .duplicates
            .get(&format!("{}({})", type_name, pointers.join(", ")))
            .copied()
        {
            Some(0) => Compatibility::Compatible,
            Some(count) => Compatibility::Incompatible { count },
            None => Compatibility::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_probe_from_json() {
        let probe = StaticProbe::from_json(
            r#"{
                "instances": {"User": 10, "Ghost": 0},
                "max_multiplicity": {"User.tags": 3, "User.nick": 1},
                "duplicates": {"User(first, last)": 2}
            }"#,
        )
        .unwrap();

        assert_eq!(probe.instance_count("User"), Some(10));
        assert_eq!(probe.instance_count("Post"), None);
        assert_eq!(
            probe.check_single("User", "tags"),
            Compatibility::Incompatible { count: 3 }
        );
        assert_eq!(probe.check_single("User", "nick"), Compatibility::Compatible);
        assert_eq!(probe.check_single("User", "other"), Compatibility::Unknown);
        assert_eq!(
            probe.check_exclusive("User", &["first".into(), "last".into()]),
            Compatibility::Incompatible { count: 2 }
        );
        assert_eq!(probe.check_single("Ghost", "x"), Compatibility::Compatible);
    }

    #[test]
    fn test_builder_keys() {
        let probe = StaticProbe::new()
            .with_instances("User", 5)
            .with_multiplicity("User", "tags", 1)
            .with_duplicates("User", &["email"], 0);

        assert_eq!(probe.check_single("User", "tags"), Compatibility::Compatible);
        assert_eq!(
            probe.check_exclusive("User", &["email".into()]),
            Compatibility::Compatible
        );
    }

    #[test]
    fn test_fixed_probes() {
        assert_eq!(EmptyDatabase.instance_count("X"), Some(0));
        assert_eq!(Unprobed.instance_count("X"), None);
        assert_eq!(Unprobed.check_single("X", "y"), Compatibility::Unknown);
    }
}
