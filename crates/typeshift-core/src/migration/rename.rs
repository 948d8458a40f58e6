//! Rename detection.
//!
//! A dropped item and a created item that look alike form a rename
//! candidate. Hints resolve candidates explicitly; everything else goes
//! through the [`AutoRename`] policy.

use super::error::MigrationError;
use crate::catalog::TypeDef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default minimum similarity for a type rename candidate.
pub const RENAME_THRESHOLD: f64 = 0.6;

/// What to do with rename candidates no hint resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRename {
    /// Fail with an ambiguity error.
    #[default]
    Reject,
    /// Take the unique best match; fail on ties.
    Accept,
    /// Treat every candidate as drop plus create.
    Never,
}

impl std::fmt::Display for AutoRename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutoRename::Reject => write!(f, "reject"),
            AutoRename::Accept => write!(f, "accept"),
            AutoRename::Never => write!(f, "never"),
        }
    }
}

impl std::str::FromStr for AutoRename {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(AutoRename::Reject),
            "accept" => Ok(AutoRename::Accept),
            "never" => Ok(AutoRename::Never),
            other => Err(format!("unknown rename policy '{}'", other)),
        }
    }
}

/// Explicit renames supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameHints {
    /// Old type name -> new type name.
    pub types: BTreeMap<String, String>,
    /// (type, old pointer) -> new pointer. The type may be given by its old
    /// or its new name.
    pub pointers: BTreeMap<(String, String), String>,
}

impl RenameHints {
    /// Create an empty set of hints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint a type rename.
    pub fn with_type(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.types.insert(from.into(), to.into());
        self
    }

    /// Hint a pointer rename on `type_name`.
    pub fn with_pointer(
        mut self,
        type_name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.pointers
            .insert((type_name.into(), from.into()), to.into());
        self
    }

    /// Parse `Old=New` (type) or `Type.old=new` (pointer) and record it.
    pub fn add(&mut self, hint: &str) -> Result<(), MigrationError> {
        let invalid = |reason: &str| MigrationError::InvalidHint {
            hint: hint.to_string(),
            reason: reason.to_string(),
        };

        let (from, to) = hint
            .split_once('=')
            .ok_or_else(|| invalid("expected OLD=NEW"))?;
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return Err(invalid("expected OLD=NEW"));
        }

        match from.split_once('.') {
            Some((type_name, pointer)) if !type_name.is_empty() && !pointer.is_empty() => {
                if to.contains('.') {
                    return Err(invalid("the new pointer name takes no type prefix"));
                }
                self.pointers
                    .insert((type_name.to_string(), pointer.to_string()), to.to_string());
            }
            Some(_) => return Err(invalid("expected Type.old=new")),
            None => {
                self.types.insert(from.to_string(), to.to_string());
            }
        }
        Ok(())
    }

    /// Check if no hints are present.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.pointers.is_empty()
    }
}

/// A possible rename of `old` to `new`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub old: String,
    pub new: String,
    pub score: f64,
}

/// Similarity of two type declarations, or `None` when they are not a
/// candidate. `map` rewrites old type names to new ones.
pub(crate) fn type_similarity(
    old: &TypeDef,
    new: &TypeDef,
    map: impl Fn(&str) -> String,
    threshold: f64,
) -> Option<f64> {
    if old.kind != new.kind {
        return None;
    }

    let bases: Vec<String> = old.bases.iter().map(|b| map(b)).collect();
    let same_header = bases == new.bases && old.is_abstract == new.is_abstract;

    let same_body = old.pointers.len() == new.pointers.len()
        && old.pointers.iter().zip(&new.pointers).all(|(a, b)| {
            let mut mapped = a.clone();
            mapped.target = map(&a.target);
            mapped == *b
        })
        && old.constraints == new.constraints;
    if same_header && same_body {
        return Some(2.0);
    }

    let old_names: BTreeSet<&str> = old.pointers.iter().map(|p| p.name.as_str()).collect();
    let new_names: BTreeSet<&str> = new.pointers.iter().map(|p| p.name.as_str()).collect();
    let score = jaccard(&old_names, &new_names);

    (same_header && score >= threshold).then_some(score)
}

/// Jaccard index of two name sets; two empty sets are identical.
pub(crate) fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Apply the policy to a set of candidates, returning accepted (old, new) pairs.
pub(crate) fn resolve_candidates(
    subject: &str,
    mut candidates: Vec<Candidate>,
    policy: AutoRename,
) -> Result<Vec<(String, String)>, MigrationError> {
    if candidates.is_empty() || policy == AutoRename::Never {
        return Ok(Vec::new());
    }

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.old.cmp(&b.old))
            .then_with(|| a.new.cmp(&b.new))
    });

    if policy == AutoRename::Reject {
        let first = &candidates[0].old;
        return Err(ambiguous(subject, first, &candidates));
    }

    let mut used_old = BTreeSet::new();
    let mut used_new = BTreeSet::new();
    let mut accepted = Vec::new();

    for candidate in &candidates {
        if used_old.contains(&candidate.old) || used_new.contains(&candidate.new) {
            continue;
        }

        let tied = candidates.iter().any(|other| {
            other != candidate
                && other.score == candidate.score
                && (other.old == candidate.old || other.new == candidate.new)
                && !used_old.contains(&other.old)
                && !used_new.contains(&other.new)
        });
        if tied {
            return Err(ambiguous(subject, &candidate.old, &candidates));
        }

        used_old.insert(candidate.old.clone());
        used_new.insert(candidate.new.clone());
        accepted.push((candidate.old.clone(), candidate.new.clone()));
    }

    Ok(accepted)
}

fn ambiguous(subject: &str, old: &str, candidates: &[Candidate]) -> MigrationError {
    MigrationError::AmbiguousDiff {
        subject: format!("{} {}", subject, old),
        candidates: candidates
            .iter()
            .filter(|c| c.old == old)
            .map(|c| format!("{} -> {}", c.old, c.new))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PointerDef;

    fn candidate(old: &str, new: &str, score: f64) -> Candidate {
        Candidate {
            old: old.into(),
            new: new.into(),
            score,
        }
    }

    #[test]
    fn test_parse_hints() {
        let mut hints = RenameHints::new();
        hints.add("User=Account").unwrap();
        hints.add("Account.mail=email").unwrap();

        assert_eq!(hints.types["User"], "Account");
        assert_eq!(
            hints.pointers[&("Account".to_string(), "mail".to_string())],
            "email"
        );
    }

    #[test]
    fn test_parse_bad_hints() {
        let mut hints = RenameHints::new();

        assert!(matches!(
            hints.add("User"),
            Err(MigrationError::InvalidHint { .. })
        ));
        assert!(matches!(
            hints.add(".x=y"),
            Err(MigrationError::InvalidHint { .. })
        ));
        assert!(matches!(
            hints.add("A.x=B.y"),
            Err(MigrationError::InvalidHint { .. })
        ));
        assert!(hints.is_empty());
    }

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<&str> = ["a", "b", "c"].into_iter().collect();
        let b: BTreeSet<&str> = ["a", "b", "d"].into_iter().collect();
        let empty = BTreeSet::new();

        assert!((jaccard(&a, &b) - 0.5).abs() < f64::EPSILON);
        assert_eq!(jaccard(&empty, &empty), 1.0);
    }

    #[test]
    fn test_type_similarity() {
        let old = TypeDef::object("User")
            .with_pointer(PointerDef::property("name", "str"))
            .with_pointer(PointerDef::property("email", "str"))
            .with_pointer(PointerDef::property("age", "int32"));
        let identical = TypeDef {
            name: "Account".into(),
            ..old.clone()
        };
        let similar = TypeDef::object("Account")
            .with_pointer(PointerDef::property("name", "str"))
            .with_pointer(PointerDef::property("email", "str"))
            .with_pointer(PointerDef::property("age", "int64"));
        let different = TypeDef::object("Invoice")
            .with_pointer(PointerDef::property("total", "decimal"));

        let id = |s: &str| s.to_string();
        assert_eq!(type_similarity(&old, &identical, id, RENAME_THRESHOLD), Some(2.0));
        assert_eq!(type_similarity(&old, &similar, id, RENAME_THRESHOLD), Some(1.0));
        assert_eq!(type_similarity(&old, &different, id, RENAME_THRESHOLD), None);
    }

    #[test]
    fn test_policy_never_and_reject() {
        let cands = vec![candidate("A", "B", 1.0)];

        assert!(resolve_candidates("type", cands.clone(), AutoRename::Never)
            .unwrap()
            .is_empty());
        assert!(matches!(
            resolve_candidates("type", cands, AutoRename::Reject),
            Err(MigrationError::AmbiguousDiff { .. })
        ));
    }

    #[test]
    fn test_policy_accept_best_match() {
        let cands = vec![candidate("A", "B", 0.7), candidate("A", "C", 0.9)];

        let accepted = resolve_candidates("type", cands, AutoRename::Accept).unwrap();
        assert_eq!(accepted, vec![("A".to_string(), "C".to_string())]);
    }

    #[test]
    fn test_policy_accept_tie_is_ambiguous() {
        let cands = vec![candidate("A", "B", 1.0), candidate("A", "C", 1.0)];

        match resolve_candidates("type", cands, AutoRename::Accept) {
            Err(MigrationError::AmbiguousDiff { subject, candidates }) => {
                assert_eq!(subject, "type A");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }
}
