//! Inheritance resolution.
//!
//! Validates a set of declarations and computes, once per snapshot, the
//! C3 linearisation of every type and the effective pointers and constraints
//! each type exhibits. The first declaration found along a type's MRO wins.

use super::constraint::ConstraintDef;
use super::error::SchemaError;
use super::pointer::PointerDef;
use super::type_def::TypeDef;
use super::types::{PointerKind, ScalarType, TypeKind};
use std::collections::{BTreeMap, BTreeSet};

/// A pointer as seen from a type, with the type that declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPointer {
    /// The type whose declaration wins for this pointer.
    pub owner: String,
    /// The winning declaration.
    pub def: PointerDef,
}

/// A constraint as seen from a type, with the type that declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConstraint {
    /// The type declaring the constraint.
    pub owner: String,
    /// The constraint.
    pub def: ConstraintDef,
}

/// Precomputed inheritance lookups for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveTable {
    /// Type -> MRO, most-derived first, the type itself included.
    pub mro: BTreeMap<String, Vec<String>>,
    /// Type -> pointer name -> effective pointer.
    pub pointers: BTreeMap<String, BTreeMap<String, ResolvedPointer>>,
    /// Type -> effective constraints, deduplicated by pointer list.
    pub constraints: BTreeMap<String, Vec<ResolvedConstraint>>,
}

/// Validate declarations and build the effective table.
pub(crate) fn resolve(types: &BTreeMap<String, TypeDef>) -> Result<EffectiveTable, SchemaError> {
    for def in types.values() {
        check_declaration(def, types)?;
    }

    if let Some(path) = find_cycle(types) {
        return Err(SchemaError::InheritanceCycle { path });
    }

    let mut table = EffectiveTable::default();
    for name in types.keys() {
        linearize(name, types, &mut table.mro)?;
    }
    // Built-in scalars only appear in the cache as linearisation leaves.
    table.mro.retain(|name, _| types.contains_key(name));

    for (name, mro) in &table.mro {
        let pointers = effective_pointers(mro, types)?;
        let constraints = effective_constraints(mro, types);

        for resolved in &constraints {
            check_constraint(name, &resolved.def, &pointers)?;
        }

        table.pointers.insert(name.clone(), pointers);
        table.constraints.insert(name.clone(), constraints);
    }

    Ok(table)
}

/// The declaration `type_name` would inherit for `pointer` from its ancestors,
/// ignoring anything the type declares itself.
pub(crate) fn inherited_pointer(
    types: &BTreeMap<String, TypeDef>,
    type_name: &str,
    pointer: &str,
) -> Result<Option<PointerDef>, SchemaError> {
    let mut cache = BTreeMap::new();
    let mro = linearize(type_name, types, &mut cache)?;

    Ok(mro
        .iter()
        .skip(1)
        .filter_map(|ancestor| types.get(ancestor))
        .find_map(|def| def.get_pointer(pointer).cloned()))
}

/// Check whether `name` denotes a scalar: built-in or declared.
pub(crate) fn is_scalar_name(name: &str, types: &BTreeMap<String, TypeDef>) -> bool {
    ScalarType::parse(name).is_some()
        || types.get(name).is_some_and(|def| def.kind == TypeKind::Scalar)
}

fn check_declaration(def: &TypeDef, types: &BTreeMap<String, TypeDef>) -> Result<(), SchemaError> {
    if ScalarType::parse(&def.name).is_some() {
        return Err(SchemaError::ReservedName {
            name: def.name.clone(),
        });
    }

    let mut seen = BTreeSet::new();
    for pointer in &def.pointers {
        if !seen.insert(pointer.name.as_str()) {
            return Err(SchemaError::DuplicatePointer {
                type_name: def.name.clone(),
                pointer: pointer.name.clone(),
            });
        }
    }

    match def.kind {
        TypeKind::Scalar => check_scalar(def, types),
        TypeKind::Object => check_object(def, types),
    }
}

fn check_scalar(def: &TypeDef, types: &BTreeMap<String, TypeDef>) -> Result<(), SchemaError> {
    if !def.pointers.is_empty() || !def.constraints.is_empty() {
        return Err(SchemaError::ScalarWithPointers {
            name: def.name.clone(),
        });
    }
    if def.bases.len() > 1 {
        return Err(SchemaError::ScalarMultipleBases {
            name: def.name.clone(),
            count: def.bases.len(),
        });
    }
    if def.bases.is_empty() && !def.is_abstract {
        return Err(SchemaError::ScalarWithoutBase {
            name: def.name.clone(),
        });
    }

    for base in &def.bases {
        if ScalarType::parse(base).is_some() {
            continue;
        }
        match types.get(base) {
            None => {
                return Err(SchemaError::UnknownType {
                    name: base.clone(),
                    referenced_by: def.name.clone(),
                })
            }
            Some(b) if b.kind != TypeKind::Scalar => {
                return Err(SchemaError::BaseKindMismatch {
                    name: def.name.clone(),
                    kind: def.kind.to_string(),
                    base: base.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_object(def: &TypeDef, types: &BTreeMap<String, TypeDef>) -> Result<(), SchemaError> {
    for base in &def.bases {
        match types.get(base) {
            Some(b) if b.kind == TypeKind::Object => {}
            Some(_) => {
                return Err(SchemaError::BaseKindMismatch {
                    name: def.name.clone(),
                    kind: def.kind.to_string(),
                    base: base.clone(),
                })
            }
            None if ScalarType::parse(base).is_some() => {
                return Err(SchemaError::BaseKindMismatch {
                    name: def.name.clone(),
                    kind: def.kind.to_string(),
                    base: base.clone(),
                })
            }
            None => {
                return Err(SchemaError::UnknownType {
                    name: base.clone(),
                    referenced_by: def.name.clone(),
                })
            }
        }
    }

    for pointer in &def.pointers {
        let known = ScalarType::parse(&pointer.target).is_some()
            || types.contains_key(&pointer.target);
        if !known {
            return Err(SchemaError::UnknownType {
                name: pointer.target.clone(),
                referenced_by: format!("{}.{}", def.name, pointer.name),
            });
        }

        let target_is_scalar = is_scalar_name(&pointer.target, types);
        let fits = match pointer.kind {
            PointerKind::Property => target_is_scalar,
            PointerKind::Link => !target_is_scalar,
        };
        if !fits {
            return Err(SchemaError::PointerTargetMismatch {
                type_name: def.name.clone(),
                pointer: pointer.name.clone(),
                kind: pointer.kind.to_string(),
                target: pointer.target.clone(),
            });
        }
    }
    Ok(())
}

fn check_constraint(
    type_name: &str,
    constraint: &ConstraintDef,
    pointers: &BTreeMap<String, ResolvedPointer>,
) -> Result<(), SchemaError> {
    let distinct: BTreeSet<&String> = constraint.on.iter().collect();
    if constraint.on.is_empty() || distinct.len() != constraint.on.len() {
        return Err(SchemaError::MalformedConstraint {
            type_name: type_name.to_string(),
        });
    }

    for pointer in &constraint.on {
        if !pointers.contains_key(pointer) {
            return Err(SchemaError::UnknownConstraintPointer {
                type_name: type_name.to_string(),
                pointer: pointer.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn find_cycle(types: &BTreeMap<String, TypeDef>) -> Option<Vec<String>> {
    fn visit(
        name: &str,
        types: &BTreeMap<String, TypeDef>,
        marks: &mut BTreeMap<String, Mark>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| n == name)?;
                let mut path = stack[start..].to_vec();
                path.push(name.to_string());
                return Some(path);
            }
            None => {}
        }

        marks.insert(name.to_string(), Mark::Visiting);
        stack.push(name.to_string());

        if let Some(def) = types.get(name) {
            for base in &def.bases {
                if let Some(path) = visit(base, types, marks, stack) {
                    return Some(path);
                }
            }
        }

        stack.pop();
        marks.insert(name.to_string(), Mark::Done);
        None
    }

    let mut marks = BTreeMap::new();
    let mut stack = Vec::new();
    types
        .keys()
        .find_map(|name| visit(name, types, &mut marks, &mut stack))
}

/// C3 linearisation. Requires an acyclic graph.
fn linearize(
    name: &str,
    types: &BTreeMap<String, TypeDef>,
    cache: &mut BTreeMap<String, Vec<String>>,
) -> Result<Vec<String>, SchemaError> {
    if let Some(mro) = cache.get(name) {
        return Ok(mro.clone());
    }

    let def = match types.get(name) {
        Some(def) => def,
        None => return Ok(vec![name.to_string()]),
    };

    let mut seqs: Vec<Vec<String>> = Vec::with_capacity(def.bases.len() + 1);
    for base in &def.bases {
        seqs.push(linearize(base, types, cache)?);
    }
    seqs.push(def.bases.clone());

    let mut result = vec![name.to_string()];
    loop {
        seqs.retain(|seq| !seq.is_empty());
        if seqs.is_empty() {
            break;
        }

        let head = seqs
            .iter()
            .map(|seq| &seq[0])
            .find(|candidate| !seqs.iter().any(|seq| seq[1..].contains(candidate)))
            .cloned()
            .ok_or_else(|| SchemaError::InconsistentHierarchy {
                name: name.to_string(),
            })?;

        for seq in seqs.iter_mut() {
            if seq[0] == head {
                seq.remove(0);
            }
        }
        result.push(head);
    }

    cache.insert(name.to_string(), result.clone());
    Ok(result)
}

fn effective_pointers(
    mro: &[String],
    types: &BTreeMap<String, TypeDef>,
) -> Result<BTreeMap<String, ResolvedPointer>, SchemaError> {
    let mut pointers: BTreeMap<String, ResolvedPointer> = BTreeMap::new();

    for ancestor in mro {
        let Some(def) = types.get(ancestor) else {
            continue;
        };
        for pointer in &def.pointers {
            match pointers.get(&pointer.name) {
                Some(winner) if winner.def.kind != pointer.kind => {
                    return Err(SchemaError::IncompatibleOverride {
                        type_name: winner.owner.clone(),
                        pointer: pointer.name.clone(),
                        owner: ancestor.clone(),
                        inherited: pointer.kind.to_string(),
                        declared: winner.def.kind.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    pointers.insert(
                        pointer.name.clone(),
                        ResolvedPointer {
                            owner: ancestor.clone(),
                            def: pointer.clone(),
                        },
                    );
                }
            }
        }
    }

    Ok(pointers)
}

fn effective_constraints(mro: &[String], types: &BTreeMap<String, TypeDef>) -> Vec<ResolvedConstraint> {
    let mut seen = BTreeSet::new();
    let mut constraints = Vec::new();

    for ancestor in mro {
        let Some(def) = types.get(ancestor) else {
            continue;
        };
        for constraint in &def.constraints {
            if seen.insert(constraint.on.clone()) {
                constraints.push(ResolvedConstraint {
                    owner: ancestor.clone(),
                    def: constraint.clone(),
                });
            }
        }
    }

    constraints
}
