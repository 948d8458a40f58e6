//! Applying operations to a snapshot.
//!
//! Replays a plan against the declarations of a snapshot and re-validates
//! the result. Used to verify that a plan actually reaches its target.

use super::error::MigrationError;
use super::operation::{Operation, PointerPath};
use crate::catalog::{inherited_pointer, PointerDef, SchemaSnapshot, TypeDef};
use std::collections::{BTreeMap, VecDeque};

/// Apply operations in order, validating the schema after every step.
///
/// Each intermediate schema must be valid on its own, as it would be when
/// the emitted statements run one by one.
pub fn apply<'a>(
    snapshot: &SchemaSnapshot,
    operations: impl IntoIterator<Item = &'a Operation>,
    revision: u64,
) -> Result<SchemaSnapshot, MigrationError> {
    let mut types = snapshot.clone().into_declarations();
    let mut applied = None;
    for op in operations {
        apply_one(&mut types, op)?;
        let step = SchemaSnapshot::from_declarations(revision, types.clone())
            .map_err(|e| failure(op, format!("leaves an invalid schema: {}", e)))?;
        applied = Some(step);
    }

    match applied {
        Some(snapshot) => Ok(snapshot),
        None => Ok(SchemaSnapshot::from_declarations(revision, types)?),
    }
}

fn failure(op: &Operation, reason: impl Into<String>) -> MigrationError {
    MigrationError::Apply {
        operation: op.description(),
        reason: reason.into(),
    }
}

fn type_mut<'t>(
    types: &'t mut BTreeMap<String, TypeDef>,
    name: &str,
    op: &Operation,
) -> Result<&'t mut TypeDef, MigrationError> {
    types
        .get_mut(name)
        .ok_or_else(|| failure(op, format!("type {} does not exist", name)))
}

fn apply_one(types: &mut BTreeMap<String, TypeDef>, op: &Operation) -> Result<(), MigrationError> {
    match op {
        Operation::CreateType { def } => {
            if types.contains_key(&def.name) {
                return Err(failure(op, "type already exists"));
            }
            types.insert(def.name.clone(), def.clone());
        }
        Operation::DropType { def } => {
            types
                .remove(&def.name)
                .ok_or_else(|| failure(op, "type does not exist"))?;
        }
        Operation::RenameType { from, to, .. } => {
            if types.contains_key(to) {
                return Err(failure(op, format!("type {} already exists", to)));
            }
            let mut def = types
                .remove(from)
                .ok_or_else(|| failure(op, "type does not exist"))?;
            def.name = to.clone();
            types.insert(to.clone(), def);

            for def in types.values_mut() {
                for base in def.bases.iter_mut().filter(|b| b.as_str() == from.as_str()) {
                    *base = to.clone();
                }
                for pointer in def.pointers.iter_mut().filter(|p| p.target == *from) {
                    pointer.target = to.clone();
                }
            }
        }
        Operation::AlterBase { type_name, to, .. } => {
            type_mut(types, type_name, op)?.bases = to.clone();
        }
        Operation::AlterAbstract { type_name, to } => {
            type_mut(types, type_name, op)?.is_abstract = *to;
        }
        Operation::AddProperty { type_name, pointer } => {
            let def = type_mut(types, type_name, op)?;
            if def.declares(&pointer.name) {
                return Err(failure(op, "pointer is already declared"));
            }
            def.pointers.push(pointer.clone());
        }
        Operation::DropProperty { type_name, pointer } => {
            let def = type_mut(types, type_name, op)?;
            let before = def.pointers.len();
            def.pointers.retain(|p| p.name != pointer.name);
            if def.pointers.len() == before {
                return Err(failure(op, "pointer is not declared"));
            }
        }
        Operation::RenameProperty { path, to } => rename_pointer(types, path, to, op)?,
        Operation::AlterCardinality { path, to, .. } => {
            alter_pointer(types, path, op, |p| p.cardinality = *to)?
        }
        Operation::AlterDefault { path, to, .. } => {
            alter_pointer(types, path, op, |p| p.default = to.clone())?
        }
        Operation::AlterRequired { path, to, .. } => {
            alter_pointer(types, path, op, |p| p.required = *to)?
        }
        Operation::AlterTarget { path, to, .. } => {
            alter_pointer(types, path, op, |p| p.target = to.clone())?
        }
        Operation::AlterExclusive { path, to } => {
            alter_pointer(types, path, op, |p| p.exclusive = *to)?
        }
        Operation::AddConstraint {
            type_name,
            constraint,
        } => {
            let def = type_mut(types, type_name, op)?;
            if def.constraints.contains(constraint) {
                return Err(failure(op, "constraint already exists"));
            }
            def.constraints.push(constraint.clone());
        }
        Operation::DropConstraint {
            type_name,
            constraint,
        } => {
            let def = type_mut(types, type_name, op)?;
            let before = def.constraints.len();
            def.constraints.retain(|c| c != constraint);
            if def.constraints.len() == before {
                return Err(failure(op, "constraint does not exist"));
            }
        }
    }
    Ok(())
}

/// Alter a pointer as seen by one type, overriding the inherited declaration
/// if the type does not declare it.
fn alter_pointer(
    types: &mut BTreeMap<String, TypeDef>,
    path: &PointerPath,
    op: &Operation,
    change: impl FnOnce(&mut PointerDef),
) -> Result<(), MigrationError> {
    let inherited = inherited_pointer(types, &path.type_name, &path.name)?;
    let def = type_mut(types, &path.type_name, op)?;

    if !def.declares(&path.name) {
        let base = inherited
            .clone()
            .ok_or_else(|| failure(op, "pointer does not exist"))?;
        def.pointers.push(base);
    }

    if let Some(pointer) = def.get_pointer_mut(&path.name) {
        change(pointer);
    }

    // An override identical to what is inherited is redundant.
    if inherited.as_ref() == def.get_pointer(&path.name) {
        def.pointers.retain(|p| p.name != path.name);
    }
    Ok(())
}

/// Rename a pointer on its type, on descendant overrides, and in constraints.
fn rename_pointer(
    types: &mut BTreeMap<String, TypeDef>,
    path: &PointerPath,
    to: &str,
    op: &Operation,
) -> Result<(), MigrationError> {
    let def = type_mut(types, &path.type_name, op)?;
    let pointer = def
        .get_pointer_mut(&path.name)
        .ok_or_else(|| failure(op, "pointer is not declared"))?;
    pointer.name = to.to_string();

    let rename = |p: &str| {
        if p == path.name {
            to.to_string()
        } else {
            p.to_string()
        }
    };

    for name in lineage(types, &path.type_name) {
        if let Some(def) = types.get_mut(&name) {
            if name != path.type_name {
                if let Some(pointer) = def.get_pointer_mut(&path.name) {
                    pointer.name = to.to_string();
                }
            }
            def.constraints = def.constraints.iter().map(|c| c.renamed(rename)).collect();
        }
    }
    Ok(())
}

/// The type and everything extending it, breadth first.
fn lineage(types: &BTreeMap<String, TypeDef>, root: &str) -> Vec<String> {
    let mut seen = vec![root.to_string()];
    let mut queue = VecDeque::from([root.to_string()]);
    while let Some(current) = queue.pop_front() {
        for def in types.values() {
            if def.bases.contains(&current) && !seen.contains(&def.name) {
                seen.push(def.name.clone());
                queue.push_back(def.name.clone());
            }
        }
    }
    seen
}
