//! Schema diffing algorithm.
//!
//! Compares two snapshots and produces the set of atomic operations that
//! turns the old schema into the new one. Attributes are compared by their
//! effective value, but a change is reported only on a type that declares
//! the pointer in one of the two snapshots; everything else follows from an
//! operation on an ancestor.

use super::error::MigrationError;
use super::operation::{Operation, PointerPath};
use super::rename::{
    resolve_candidates, type_similarity, AutoRename, Candidate, RenameHints, RENAME_THRESHOLD,
};
use crate::catalog::{ConstraintDef, PointerDef, SchemaSnapshot, TypeDef, TypeKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

/// Options controlling rename detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOptions {
    /// Explicit renames.
    pub hints: RenameHints,
    /// Policy for candidates no hint resolves.
    pub auto_rename: AutoRename,
    /// Minimum pointer-name similarity for a type rename candidate.
    pub rename_threshold: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            hints: RenameHints::default(),
            auto_rename: AutoRename::default(),
            rename_threshold: RENAME_THRESHOLD,
        }
    }
}

impl DiffOptions {
    /// Set the rename hints.
    pub fn with_hints(mut self, hints: RenameHints) -> Self {
        self.hints = hints;
        self
    }

    /// Set the rename policy.
    pub fn with_auto_rename(mut self, policy: AutoRename) -> Self {
        self.auto_rename = policy;
        self
    }

    /// Set the similarity threshold.
    pub fn with_rename_threshold(mut self, threshold: f64) -> Self {
        self.rename_threshold = threshold;
        self
    }
}

/// Complete diff between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDiff {
    /// Source schema revision.
    pub from_revision: u64,
    /// Target schema revision.
    pub to_revision: u64,
    /// Old type name -> new type name, for renamed types only.
    pub type_renames: BTreeMap<String, String>,
    /// New type name -> old pointer name -> new pointer name, on declaring types.
    pub pointer_renames: BTreeMap<String, BTreeMap<String, String>>,
    /// Operations in canonical order.
    pub operations: Vec<Operation>,
}

impl SchemaDiff {
    /// Compute the diff with default options.
    pub fn compute(from: &SchemaSnapshot, to: &SchemaSnapshot) -> Result<Self, MigrationError> {
        Self::compute_with(from, to, &DiffOptions::default())
    }

    /// Compute the diff between two snapshots.
    #[instrument(skip_all, fields(from = from.revision(), to = to.revision()))]
    pub fn compute_with(
        from: &SchemaSnapshot,
        to: &SchemaSnapshot,
        options: &DiffOptions,
    ) -> Result<Self, MigrationError> {
        let mut differ = Differ::new(from, to, options);
        differ.match_types()?;
        differ.match_pointers()?;
        let operations = differ.operations();

        debug!(operations = operations.len(), "diff computed");

        Ok(SchemaDiff {
            from_revision: from.revision(),
            to_revision: to.revision(),
            type_renames: differ
                .type_map
                .iter()
                .filter(|(old, new)| old != new)
                .map(|(old, new)| (old.clone(), new.clone()))
                .collect(),
            pointer_renames: differ.pointer_renames,
            operations,
        })
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.operations.len()
    }

    /// Old name of a type given its new name.
    pub fn old_name_of<'a>(&'a self, new_name: &'a str) -> &'a str {
        self.type_renames
            .iter()
            .find(|(_, new)| new.as_str() == new_name)
            .map(|(old, _)| old.as_str())
            .unwrap_or(new_name)
    }

    /// New name of a type given its old name.
    pub fn new_name_of<'a>(&'a self, old_name: &'a str) -> &'a str {
        self.type_renames
            .get(old_name)
            .map(String::as_str)
            .unwrap_or(old_name)
    }

    /// Old name of a pointer, looking at renames declared on any of `owners`.
    pub fn old_pointer_name<'a>(&'a self, owners: &[String], pointer: &'a str) -> &'a str {
        owners
            .iter()
            .filter_map(|owner| self.pointer_renames.get(owner))
            .find_map(|renames| {
                renames
                    .iter()
                    .find(|(_, new)| new.as_str() == pointer)
                    .map(|(old, _)| old.as_str())
            })
            .unwrap_or(pointer)
    }
}

struct Differ<'a> {
    old: &'a SchemaSnapshot,
    new: &'a SchemaSnapshot,
    options: &'a DiffOptions,
    /// Old name -> new name for every type present in both snapshots.
    type_map: BTreeMap<String, String>,
    /// New name -> old name.
    reverse: BTreeMap<String, String>,
    pointer_renames: BTreeMap<String, BTreeMap<String, String>>,
}

impl<'a> Differ<'a> {
    fn new(old: &'a SchemaSnapshot, new: &'a SchemaSnapshot, options: &'a DiffOptions) -> Self {
        Self {
            old,
            new,
            options,
            type_map: BTreeMap::new(),
            reverse: BTreeMap::new(),
            pointer_renames: BTreeMap::new(),
        }
    }

    fn map_type(&self, name: &str) -> String {
        self.type_map
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn pair(&mut self, old: &str, new: &str) {
        self.type_map.insert(old.to_string(), new.to_string());
        self.reverse.insert(new.to_string(), old.to_string());
    }

    fn match_types(&mut self) -> Result<(), MigrationError> {
        for (from, to) in &self.options.hints.types {
            let hint = format!("{}={}", from, to);
            let old_def = self.old.get_type(from).ok_or_else(|| MigrationError::InvalidHint {
                hint: hint.clone(),
                reason: format!("type {} does not exist in the old schema", from),
            })?;
            let new_def = self.new.get_type(to).ok_or_else(|| MigrationError::InvalidHint {
                hint: hint.clone(),
                reason: format!("type {} does not exist in the new schema", to),
            })?;
            if old_def.kind != new_def.kind {
                return Err(MigrationError::InvalidHint {
                    hint,
                    reason: format!("cannot rename a {} type into a {} type", old_def.kind, new_def.kind),
                });
            }
            if self.reverse.contains_key(to) {
                return Err(MigrationError::InvalidHint {
                    hint,
                    reason: format!("type {} is the target of another hint", to),
                });
            }
            self.pair(from, to);
        }

        let hinted_new: BTreeSet<String> = self.options.hints.types.values().cloned().collect();
        for def in self.old.types() {
            if self.type_map.contains_key(&def.name) || hinted_new.contains(&def.name) {
                continue;
            }
            if let Some(new_def) = self.new.get_type(&def.name) {
                if new_def.kind == def.kind {
                    let name = def.name.clone();
                    self.pair(&name, &name);
                }
            }
        }

        let dropped: Vec<&TypeDef> = self
            .old
            .types()
            .filter(|d| !self.type_map.contains_key(&d.name))
            .collect();
        let created: Vec<&TypeDef> = self
            .new
            .types()
            .filter(|d| !self.reverse.contains_key(&d.name))
            .collect();

        let mut candidates = Vec::new();
        for old_def in &dropped {
            for new_def in &created {
                let score = type_similarity(
                    old_def,
                    new_def,
                    |n| self.map_type(n),
                    self.options.rename_threshold,
                );
                if let Some(score) = score {
                    candidates.push(Candidate {
                        old: old_def.name.clone(),
                        new: new_def.name.clone(),
                        score,
                    });
                }
            }
        }

        for (old, new) in resolve_candidates("type", candidates, self.options.auto_rename)? {
            debug!(%old, %new, "type rename detected");
            self.pair(&old, &new);
        }
        Ok(())
    }

    /// Validated pointer hints keyed by new type name.
    fn pointer_hints(&self) -> Result<BTreeMap<String, BTreeMap<String, String>>, MigrationError> {
        let mut hints: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

        for ((type_name, from), to) in &self.options.hints.pointers {
            let hint = format!("{}.{}={}", type_name, from, to);
            let invalid = |reason: String| MigrationError::InvalidHint {
                hint: hint.clone(),
                reason,
            };

            let new_name = if self.reverse.contains_key(type_name) {
                type_name.clone()
            } else if let Some(mapped) = self.type_map.get(type_name) {
                mapped.clone()
            } else {
                return Err(invalid(format!(
                    "type {} does not exist in both schemas",
                    type_name
                )));
            };
            let old_name = &self.reverse[&new_name];

            let declared_old = self
                .old
                .get_type(old_name)
                .is_some_and(|d| d.declares(from));
            if !declared_old {
                return Err(invalid(format!("{} does not declare {}", old_name, from)));
            }
            let declared_new = self
                .new
                .get_type(&new_name)
                .is_some_and(|d| d.declares(to));
            if !declared_new {
                return Err(invalid(format!("{} does not declare {}", new_name, to)));
            }

            hints
                .entry(new_name)
                .or_default()
                .insert(from.clone(), to.clone());
        }
        Ok(hints)
    }

    fn match_pointers(&mut self) -> Result<(), MigrationError> {
        let mut hints = self.pointer_hints()?;

        // Ancestors first, so inherited renames are known for descendants.
        let mut order: Vec<(String, String)> = self
            .type_map
            .iter()
            .map(|(o, n)| (o.clone(), n.clone()))
            .collect();
        order.sort_by_key(|(o, _)| (self.old.mro(o).len(), o.clone()));

        for (old_name, new_name) in order {
            let mut own = hints.remove(&new_name).unwrap_or_default();
            let inherited = self.inherited_renames(&old_name);
            let map = |p: &str, own: &BTreeMap<String, String>| -> String {
                own.get(p)
                    .or_else(|| inherited.get(p))
                    .cloned()
                    .unwrap_or_else(|| p.to_string())
            };

            let (Some(old_def), Some(new_def)) =
                (self.old.get_type(&old_name), self.new.get_type(&new_name))
            else {
                continue;
            };

            let old_effective: BTreeSet<String> = self
                .old
                .pointers_of(&old_name)
                .map(|ps| ps.keys().map(|p| map(p, &own)).collect())
                .unwrap_or_default();
            let new_effective = self.new.pointers_of(&new_name);

            let dropped: Vec<&PointerDef> = old_def
                .pointers
                .iter()
                .filter(|p| !own.contains_key(&p.name))
                .filter(|p| new_effective.map_or(true, |ps| !ps.contains_key(&map(&p.name, &own))))
                .collect();
            let hinted_new: BTreeSet<&String> = own.values().collect();
            let added: Vec<&PointerDef> = new_def
                .pointers
                .iter()
                .filter(|p| !hinted_new.contains(&p.name) && !old_effective.contains(&p.name))
                .collect();

            let mut candidates = Vec::new();
            for old_ptr in &dropped {
                let mut mapped = (*old_ptr).clone();
                mapped.target = self.map_type(&old_ptr.target);
                for new_ptr in &added {
                    if mapped.same_shape(new_ptr) {
                        candidates.push(Candidate {
                            old: old_ptr.name.clone(),
                            new: new_ptr.name.clone(),
                            score: 1.0,
                        });
                    }
                }
            }

            let subject = format!("pointer of {}:", new_name);
            for (old, new) in resolve_candidates(&subject, candidates, self.options.auto_rename)? {
                debug!(type_name = %new_name, %old, %new, "pointer rename detected");
                own.insert(old, new);
            }

            if !own.is_empty() {
                self.pointer_renames.insert(new_name, own);
            }
        }
        Ok(())
    }

    /// Pointer renames declared on ancestors of an old type, keyed by old name.
    fn inherited_renames(&self, old_name: &str) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for ancestor in self.old.mro(old_name).iter().skip(1) {
            if let Some(renames) = self.pointer_renames.get(&self.map_type(ancestor)) {
                for (from, to) in renames {
                    merged.entry(from.clone()).or_insert_with(|| to.clone());
                }
            }
        }
        merged
    }

    /// Full pointer rename map (own and inherited) for a type, keyed by old name.
    fn pointer_map(&self, old_name: &str, new_name: &str) -> BTreeMap<String, String> {
        let mut map = self.inherited_renames(old_name);
        if let Some(own) = self.pointer_renames.get(new_name) {
            map.extend(own.iter().map(|(a, b)| (a.clone(), b.clone())));
        }
        map
    }

    fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();

        for (old_name, new_name) in &self.type_map {
            if old_name != new_name {
                if let Some(def) = self.new.get_type(new_name) {
                    ops.push(Operation::RenameType {
                        kind: def.kind,
                        from: old_name.clone(),
                        to: new_name.clone(),
                    });
                }
            }
            self.diff_type(old_name, new_name, &mut ops);
        }

        let created: BTreeSet<&str> = self
            .new
            .types()
            .map(|d| d.name.as_str())
            .filter(|n| !self.reverse.contains_key(*n))
            .collect();
        for name in &created {
            if let Some(def) = self.new.get_type(name) {
                self.create_type(def, &created, &mut ops);
            }
        }

        let dropped: BTreeSet<&str> = self
            .old
            .types()
            .map(|d| d.name.as_str())
            .filter(|n| !self.type_map.contains_key(*n))
            .collect();
        for name in &dropped {
            if let Some(def) = self.old.get_type(name) {
                self.drop_type(def, &dropped, &mut ops);
            }
        }

        ops.sort_by_cached_key(Operation::sort_key);
        ops
    }

    fn diff_type(&self, old_name: &str, new_name: &str, ops: &mut Vec<Operation>) {
        let (Some(old_def), Some(new_def)) =
            (self.old.get_type(old_name), self.new.get_type(new_name))
        else {
            return;
        };

        if old_def.is_abstract != new_def.is_abstract {
            ops.push(Operation::AlterAbstract {
                type_name: new_name.to_string(),
                to: new_def.is_abstract,
            });
        }

        let old_bases: Vec<String> = old_def.bases.iter().map(|b| self.map_type(b)).collect();
        if old_bases != new_def.bases {
            ops.push(Operation::AlterBase {
                type_name: new_name.to_string(),
                kind: new_def.kind,
                from: old_bases,
                to: new_def.bases.clone(),
            });
        }

        if new_def.kind == TypeKind::Scalar {
            return;
        }

        let ptr_map = self.pointer_map(old_name, new_name);
        let rename_ptr = |p: &str| ptr_map.get(p).cloned().unwrap_or_else(|| p.to_string());

        if let Some(own) = self.pointer_renames.get(new_name) {
            for (from, to) in own {
                if let Some(ptr) = old_def.get_pointer(from) {
                    ops.push(Operation::RenameProperty {
                        path: PointerPath::new(new_name, from.clone(), ptr.kind),
                        to: to.clone(),
                    });
                }
            }
        }

        let old_decls: BTreeMap<String, PointerDef> = old_def
            .pointers
            .iter()
            .map(|p| {
                let mut mapped = p.clone();
                mapped.name = rename_ptr(&p.name);
                mapped.target = self.map_type(&p.target);
                (mapped.name.clone(), mapped)
            })
            .collect();
        let new_decls: BTreeMap<&str, &PointerDef> = new_def
            .pointers
            .iter()
            .map(|p| (p.name.as_str(), p))
            .collect();

        let names: BTreeSet<&str> = old_decls
            .keys()
            .map(String::as_str)
            .chain(new_decls.keys().copied())
            .collect();

        for name in names {
            let old_decl = old_decls.get(name);
            let new_decl = new_decls.get(name).copied();
            let inherited = self.new.inherited_pointer(new_name, name);

            // What the type would see once ancestors are migrated.
            let baseline = old_decl.or(inherited);
            let target = new_decl.or(inherited);

            match (baseline, target) {
                (None, Some(t)) => ops.push(Operation::AddProperty {
                    type_name: new_name.to_string(),
                    pointer: t.clone(),
                }),
                (Some(b), None) => ops.push(Operation::DropProperty {
                    type_name: new_name.to_string(),
                    pointer: b.clone(),
                }),
                (Some(b), Some(t)) if b.kind != t.kind => {
                    if let Some(b) = old_decl {
                        ops.push(Operation::DropProperty {
                            type_name: new_name.to_string(),
                            pointer: b.clone(),
                        });
                    }
                    if let Some(t) = new_decl {
                        ops.push(Operation::AddProperty {
                            type_name: new_name.to_string(),
                            pointer: t.clone(),
                        });
                    }
                }
                (Some(b), Some(t)) => alter_pointer(new_name, b, t, ops),
                (None, None) => {}
            }
        }

        let old_constraints: BTreeSet<ConstraintDef> = old_def
            .constraints
            .iter()
            .map(|c| c.renamed(|p| rename_ptr(p)))
            .collect();
        let new_constraints: BTreeSet<ConstraintDef> =
            new_def.constraints.iter().cloned().collect();

        for constraint in new_constraints.difference(&old_constraints) {
            ops.push(Operation::AddConstraint {
                type_name: new_name.to_string(),
                constraint: constraint.clone(),
            });
        }
        for constraint in old_constraints.difference(&new_constraints) {
            ops.push(Operation::DropConstraint {
                type_name: new_name.to_string(),
                constraint: constraint.clone(),
            });
        }
    }

    /// Links between created types are split out so creation never cycles.
    fn create_type(&self, def: &TypeDef, created: &BTreeSet<&str>, ops: &mut Vec<Operation>) {
        let mut def = def.clone();
        let (deferred, kept): (Vec<PointerDef>, Vec<PointerDef>) =
            def.pointers.drain(..).partition(|p| {
                p.is_link() && p.target != def.name && created.contains(p.target.as_str())
            });
        def.pointers = kept;

        let (late, early): (Vec<ConstraintDef>, Vec<ConstraintDef>) =
            def.constraints.drain(..).partition(|c| {
                deferred.iter().any(|p| c.covers(&p.name))
            });
        def.constraints = early;

        let type_name = def.name.clone();
        ops.push(Operation::CreateType { def });
        for pointer in deferred {
            ops.push(Operation::AddProperty {
                type_name: type_name.clone(),
                pointer,
            });
        }
        for constraint in late {
            ops.push(Operation::AddConstraint {
                type_name: type_name.clone(),
                constraint,
            });
        }
    }

    /// Links between dropped types are split out so dropping never cycles.
    fn drop_type(&self, def: &TypeDef, dropped: &BTreeSet<&str>, ops: &mut Vec<Operation>) {
        let mut def = def.clone();
        for base in def.bases.iter_mut() {
            *base = self.map_type(base);
        }
        for pointer in def.pointers.iter_mut() {
            pointer.target = self.map_type(&pointer.target);
        }

        let (split, kept): (Vec<PointerDef>, Vec<PointerDef>) =
            def.pointers.drain(..).partition(|p| {
                p.is_link() && p.target != def.name && dropped.contains(p.target.as_str())
            });
        def.pointers = kept;

        let (early, kept): (Vec<ConstraintDef>, Vec<ConstraintDef>) =
            def.constraints.drain(..).partition(|c| {
                split.iter().any(|p| c.covers(&p.name))
            });
        def.constraints = kept;

        for constraint in early {
            ops.push(Operation::DropConstraint {
                type_name: def.name.clone(),
                constraint,
            });
        }
        for pointer in split {
            ops.push(Operation::DropProperty {
                type_name: def.name.clone(),
                pointer,
            });
        }
        ops.push(Operation::DropType { def });
    }
}

fn alter_pointer(type_name: &str, from: &PointerDef, to: &PointerDef, ops: &mut Vec<Operation>) {
    let path = PointerPath::new(type_name, to.name.clone(), to.kind);

    if from.target != to.target {
        ops.push(Operation::AlterTarget {
            path: path.clone(),
            from: from.target.clone(),
            to: to.target.clone(),
        });
    }
    if from.cardinality != to.cardinality {
        ops.push(Operation::AlterCardinality {
            path: path.clone(),
            from: from.cardinality,
            to: to.cardinality,
        });
    }
    if from.required != to.required {
        ops.push(Operation::AlterRequired {
            path: path.clone(),
            to: to.required,
            has_default: to.default.is_some(),
        });
    }
    if from.default != to.default {
        ops.push(Operation::AlterDefault {
            path: path.clone(),
            from: from.default.clone(),
            to: to.default.clone(),
        });
    }
    if from.exclusive != to.exclusive {
        ops.push(Operation::AlterExclusive {
            path,
            to: to.exclusive,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Cardinality, PointerDef, SchemaSource};
    use crate::migration::operation::OperationKind;

    fn person(default: Option<&str>) -> TypeDef {
        let mut name = PointerDef::property("name", "str").required();
        name.default = default.map(String::from);
        TypeDef::object("Person").abstract_type().with_pointer(name)
    }

    fn snapshot(revision: u64, types: Vec<TypeDef>) -> SchemaSnapshot {
        SchemaSnapshot::build(revision, types).unwrap()
    }

    fn kinds(diff: &SchemaDiff) -> Vec<OperationKind> {
        diff.operations.iter().map(Operation::kind).collect()
    }

    #[test]
    fn test_self_diff_is_empty() {
        let s = snapshot(
            1,
            vec![
                person(Some("'unknown'")),
                TypeDef::object("Employee").extending("Person"),
            ],
        );

        let diff = SchemaDiff::compute(&s, &s).unwrap();
        assert!(diff.is_empty());
        assert!(diff.type_renames.is_empty());
    }

    #[test]
    fn test_add_type() {
        let from = snapshot(1, vec![person(None)]);
        let to = snapshot(2, vec![person(None), TypeDef::object("Team")]);

        let diff = SchemaDiff::compute(&from, &to).unwrap();
        assert_eq!(kinds(&diff), vec![OperationKind::CreateType]);
        assert_eq!(diff.from_revision, 1);
        assert_eq!(diff.to_revision, 2);
    }

    #[test]
    fn test_removing_override_scoped_to_subtype() {
        let from = snapshot(
            1,
            vec![
                person(Some("'unknown'")),
                TypeDef::object("Employee")
                    .extending("Person")
                    .with_pointer(PointerDef::property("name", "str").required()),
            ],
        );
        let to = snapshot(
            2,
            vec![
                person(Some("'unknown'")),
                TypeDef::object("Employee").extending("Person"),
            ],
        );

        let diff = SchemaDiff::compute(&from, &to).unwrap();
        assert_eq!(
            diff.operations,
            vec![Operation::AlterDefault {
                path: PointerPath::new("Employee", "name", crate::catalog::PointerKind::Property),
                from: None,
                to: Some("'unknown'".into()),
            }]
        );
    }

    #[test]
    fn test_base_default_change_not_repeated_on_subtypes() {
        let from = snapshot(
            1,
            vec![
                person(Some("'a'")),
                TypeDef::object("Employee").extending("Person"),
                TypeDef::object("Contractor")
                    .extending("Person")
                    .with_pointer(PointerDef::property("name", "str").required()),
            ],
        );
        let to = snapshot(
            2,
            vec![
                person(Some("'b'")),
                TypeDef::object("Employee").extending("Person"),
                TypeDef::object("Contractor")
                    .extending("Person")
                    .with_pointer(PointerDef::property("name", "str").required()),
            ],
        );

        let diff = SchemaDiff::compute(&from, &to).unwrap();
        assert_eq!(diff.operations.len(), 1);
        assert_eq!(diff.operations[0].type_name(), "Person");
    }

    #[test]
    fn test_kind_change_is_drop_and_add() {
        let from = snapshot(
            1,
            vec![
                TypeDef::object("Team"),
                TypeDef::object("User").with_pointer(PointerDef::property("team", "str")),
            ],
        );
        let to = snapshot(
            2,
            vec![
                TypeDef::object("Team"),
                TypeDef::object("User").with_pointer(PointerDef::link("team", "Team")),
            ],
        );

        let diff = SchemaDiff::compute(&from, &to).unwrap();
        assert_eq!(
            kinds(&diff),
            vec![OperationKind::AddProperty, OperationKind::DropProperty]
        );
    }

    #[test]
    fn test_attribute_alters() {
        let from = snapshot(
            1,
            vec![TypeDef::object("User")
                .with_pointer(PointerDef::property("tags", "str").multi())
                .with_pointer(PointerDef::property("email", "str"))],
        );
        let to = snapshot(
            2,
            vec![TypeDef::object("User")
                .with_pointer(PointerDef::property("tags", "str"))
                .with_pointer(PointerDef::property("email", "str").exclusive().required())],
        );

        let diff = SchemaDiff::compute(&from, &to).unwrap();
        assert_eq!(
            kinds(&diff),
            vec![
                OperationKind::AlterCardinality,
                OperationKind::AlterRequired,
                OperationKind::AlterExclusive,
            ]
        );
        match &diff.operations[0] {
            Operation::AlterCardinality { from, to, .. } => {
                assert_eq!(*from, Cardinality::Multi);
                assert_eq!(*to, Cardinality::Single);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_constraints_reported_on_owner() {
        let base = |constraint: bool| {
            let mut def = TypeDef::object("Person")
                .with_pointer(PointerDef::property("first", "str"))
                .with_pointer(PointerDef::property("last", "str"));
            if constraint {
                def = def.with_constraint(ConstraintDef::exclusive(["first", "last"]));
            }
            def
        };
        let from = snapshot(1, vec![base(false), TypeDef::object("Employee").extending("Person")]);
        let to = snapshot(2, vec![base(true), TypeDef::object("Employee").extending("Person")]);

        let diff = SchemaDiff::compute(&from, &to).unwrap();
        assert_eq!(kinds(&diff), vec![OperationKind::AddConstraint]);
        assert_eq!(diff.operations[0].type_name(), "Person");
    }

    #[test]
    fn test_type_rename_rejected_by_default() {
        let user = |name: &str| {
            TypeDef::object(name)
                .with_pointer(PointerDef::property("name", "str"))
                .with_pointer(PointerDef::property("email", "str"))
        };
        let from = snapshot(1, vec![user("User")]);
        let to = snapshot(2, vec![user("Account")]);

        assert!(matches!(
            SchemaDiff::compute(&from, &to),
            Err(MigrationError::AmbiguousDiff { .. })
        ));

        let never = DiffOptions::default().with_auto_rename(AutoRename::Never);
        let diff = SchemaDiff::compute_with(&from, &to, &never).unwrap();
        assert_eq!(
            kinds(&diff),
            vec![OperationKind::CreateType, OperationKind::DropType]
        );

        let accept = DiffOptions::default().with_auto_rename(AutoRename::Accept);
        let diff = SchemaDiff::compute_with(&from, &to, &accept).unwrap();
        assert_eq!(kinds(&diff), vec![OperationKind::RenameType]);
        assert_eq!(diff.old_name_of("Account"), "User");
    }

    #[test]
    fn test_type_rename_hint_follows_references() {
        let from = snapshot(
            1,
            vec![
                TypeDef::object("User"),
                TypeDef::object("Post").with_pointer(PointerDef::link("author", "User")),
            ],
        );
        let to = snapshot(
            2,
            vec![
                TypeDef::object("Account"),
                TypeDef::object("Post").with_pointer(PointerDef::link("author", "Account")),
            ],
        );

        let options =
            DiffOptions::default().with_hints(RenameHints::new().with_type("User", "Account"));
        let diff = SchemaDiff::compute_with(&from, &to, &options).unwrap();

        assert_eq!(kinds(&diff), vec![OperationKind::RenameType]);
        assert_eq!(diff.new_name_of("User"), "Account");
    }

    #[test]
    fn test_pointer_rename_hint() {
        let from = snapshot(
            1,
            vec![
                TypeDef::object("User")
                    .with_pointer(PointerDef::property("mail", "str"))
                    .with_constraint(ConstraintDef::exclusive(["mail"])),
                TypeDef::object("Admin")
                    .extending("User")
                    .with_pointer(PointerDef::property("mail", "str").required()),
            ],
        );
        let to = snapshot(
            2,
            vec![
                TypeDef::object("User")
                    .with_pointer(PointerDef::property("email", "str"))
                    .with_constraint(ConstraintDef::exclusive(["email"])),
                TypeDef::object("Admin")
                    .extending("User")
                    .with_pointer(PointerDef::property("email", "str").required()),
            ],
        );

        let options = DiffOptions::default()
            .with_hints(RenameHints::new().with_pointer("User", "mail", "email"));
        let diff = SchemaDiff::compute_with(&from, &to, &options).unwrap();

        assert_eq!(kinds(&diff), vec![OperationKind::RenameProperty]);
        assert_eq!(diff.pointer_renames["User"]["mail"], "email");
    }

    #[test]
    fn test_invalid_hint() {
        let s = snapshot(1, vec![TypeDef::object("User")]);

        let options =
            DiffOptions::default().with_hints(RenameHints::new().with_type("Ghost", "User"));
        assert!(matches!(
            SchemaDiff::compute_with(&s, &s, &options),
            Err(MigrationError::InvalidHint { .. })
        ));

        let options = DiffOptions::default()
            .with_hints(RenameHints::new().with_pointer("User", "nope", "other"));
        assert!(matches!(
            SchemaDiff::compute_with(&s, &s, &options),
            Err(MigrationError::InvalidHint { .. })
        ));
    }

    #[test]
    fn test_mutual_links_between_created_types_are_deferred() {
        let from = snapshot(1, vec![]);
        let to = SchemaSource::new(2)
            .with_type(TypeDef::object("A").with_pointer(PointerDef::link("b", "B")))
            .with_type(TypeDef::object("B").with_pointer(PointerDef::link("a", "A")))
            .build()
            .unwrap();

        let diff = SchemaDiff::compute(&from, &to).unwrap();
        assert_eq!(
            kinds(&diff),
            vec![
                OperationKind::CreateType,
                OperationKind::CreateType,
                OperationKind::AddProperty,
                OperationKind::AddProperty,
            ]
        );
        match &diff.operations[0] {
            Operation::CreateType { def } => assert!(def.pointers.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
