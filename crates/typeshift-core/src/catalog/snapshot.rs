//! Schema snapshots.

use super::error::SchemaError;
use super::pointer::PointerDef;
use super::resolve::{self, EffectiveTable, ResolvedConstraint, ResolvedPointer};
use super::type_def::TypeDef;
use super::types::canonical_type_name;
use crate::error::Error;
use rkyv::Archive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unvalidated schema declarations, as read from JSON or the revision store.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct SchemaSource {
    /// Revision number of this schema.
    #[serde(default)]
    pub revision: u64,
    /// Declared types.
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl SchemaSource {
    /// Create an empty source at the given revision.
    pub fn new(revision: u64) -> Self {
        Self {
            revision,
            types: Vec::new(),
        }
    }

    /// Add a type declaration.
    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }

    /// Parse a source from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the source as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize the source to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a source from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Validate the declarations into a snapshot.
    pub fn build(self) -> Result<SchemaSnapshot, SchemaError> {
        let mut types = BTreeMap::new();
        for def in self.types {
            let name = def.name.clone();
            if types.insert(name.clone(), def).is_some() {
                return Err(SchemaError::DuplicateType { name });
            }
        }
        SchemaSnapshot::from_declarations(self.revision, types)
    }
}

/// An immutable, validated schema at one revision.
///
/// Holds the declarations keyed by type name together with the effective
/// attribute table, so inheritance lookups are plain map reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot {
    revision: u64,
    types: BTreeMap<String, TypeDef>,
    effective: EffectiveTable,
    fingerprint: [u8; 32],
}

impl SchemaSnapshot {
    /// A snapshot with no declared types.
    pub fn empty(revision: u64) -> Self {
        Self {
            revision,
            types: BTreeMap::new(),
            effective: EffectiveTable::default(),
            fingerprint: fingerprint(&BTreeMap::new()),
        }
    }

    /// Build a snapshot from a list of declarations.
    pub fn build(revision: u64, types: Vec<TypeDef>) -> Result<Self, SchemaError> {
        SchemaSource { revision, types }.build()
    }

    /// Normalise and validate a declaration map.
    pub(crate) fn from_declarations(
        revision: u64,
        mut types: BTreeMap<String, TypeDef>,
    ) -> Result<Self, SchemaError> {
        for def in types.values_mut() {
            for base in def.bases.iter_mut() {
                *base = canonical_type_name(base);
            }
            for pointer in def.pointers.iter_mut() {
                pointer.target = canonical_type_name(&pointer.target);
            }
            def.canonicalize();
        }

        let effective = resolve::resolve(&types)?;
        let fingerprint = fingerprint(&types);

        Ok(Self {
            revision,
            types,
            effective,
            fingerprint,
        })
    }

    /// Revision number.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The same schema at another revision.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Iterate declarations in name order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// Declarations keyed by name.
    pub fn declarations(&self) -> &BTreeMap<String, TypeDef> {
        &self.types
    }

    /// Number of declared types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if no types are declared.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Get a declaration by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Check if a type is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Check whether `name` is a scalar, built-in or declared.
    pub fn is_scalar(&self, name: &str) -> bool {
        resolve::is_scalar_name(name, &self.types)
    }

    /// MRO of a type, most-derived first. Empty for unknown names.
    pub fn mro(&self, name: &str) -> &[String] {
        self.effective.mro.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Effective pointers of a type.
    pub fn pointers_of(&self, name: &str) -> Option<&BTreeMap<String, ResolvedPointer>> {
        self.effective.pointers.get(name)
    }

    /// Effective pointer of a type.
    pub fn pointer(&self, type_name: &str, pointer: &str) -> Option<&ResolvedPointer> {
        self.pointers_of(type_name)?.get(pointer)
    }

    /// The declaration a type inherits for `pointer`, ignoring its own.
    pub fn inherited_pointer(&self, type_name: &str, pointer: &str) -> Option<&PointerDef> {
        self.mro(type_name)
            .iter()
            .skip(1)
            .find_map(|ancestor| self.types.get(ancestor)?.get_pointer(pointer))
    }

    /// Effective constraints of a type.
    pub fn constraints_of(&self, name: &str) -> &[ResolvedConstraint] {
        self.effective
            .constraints
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The full effective attribute table.
    pub fn effective(&self) -> &EffectiveTable {
        &self.effective
    }

    /// Types that inherit from `name`, directly or transitively.
    pub fn descendants(&self, name: &str) -> Vec<&str> {
        self.effective
            .mro
            .iter()
            .filter(|(ty, mro)| ty.as_str() != name && mro.iter().any(|a| a == name))
            .map(|(ty, _)| ty.as_str())
            .collect()
    }

    /// blake3 digest of the canonical declarations.
    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    /// Hex form of [`fingerprint`](Self::fingerprint).
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }

    /// Convert back into an unvalidated source.
    pub fn to_source(&self) -> SchemaSource {
        SchemaSource {
            revision: self.revision,
            types: self.types.values().cloned().collect(),
        }
    }

    pub(crate) fn into_declarations(self) -> BTreeMap<String, TypeDef> {
        self.types
    }
}

fn fingerprint(types: &BTreeMap<String, TypeDef>) -> [u8; 32] {
    fn put(hasher: &mut blake3::Hasher, field: &str) {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }

    let mut hasher = blake3::Hasher::new();
    for def in types.values() {
        put(&mut hasher, &def.name);
        put(&mut hasher, &def.kind.to_string());
        put(&mut hasher, if def.is_abstract { "abstract" } else { "concrete" });
        hasher.update(&(def.bases.len() as u64).to_le_bytes());
        for base in &def.bases {
            put(&mut hasher, base);
        }
        hasher.update(&(def.pointers.len() as u64).to_le_bytes());
        for pointer in &def.pointers {
            put(&mut hasher, &pointer.name);
            put(&mut hasher, &pointer.kind.to_string());
            put(&mut hasher, &pointer.target);
            put(&mut hasher, &pointer.cardinality.to_string());
            hasher.update(&[pointer.required as u8, pointer.exclusive as u8]);
            match &pointer.default {
                Some(expr) => {
                    hasher.update(&[1]);
                    put(&mut hasher, expr);
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        hasher.update(&(def.constraints.len() as u64).to_le_bytes());
        for constraint in &def.constraints {
            put(&mut hasher, &constraint.signature());
        }
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ConstraintDef;

    fn sample() -> SchemaSource {
        SchemaSource::new(1)
            .with_type(
                TypeDef::object("Person")
                    .abstract_type()
                    .with_pointer(PointerDef::property("name", "std::str").required())
                    .with_pointer(PointerDef::property("email", "str").exclusive()),
            )
            .with_type(
                TypeDef::object("Employee")
                    .extending("Person")
                    .with_pointer(PointerDef::link("manager", "Employee"))
                    .with_constraint(ConstraintDef::exclusive(["name", "email"])),
            )
    }

    #[test]
    fn test_build_normalises_names() {
        let snapshot = sample().build().unwrap();

        let name = snapshot.pointer("Person", "name").unwrap();
        assert_eq!(name.def.target, "str");
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_effective_lookups() {
        let snapshot = sample().build().unwrap();

        assert_eq!(snapshot.mro("Employee"), ["Employee", "Person"]);
        assert_eq!(snapshot.pointers_of("Employee").unwrap().len(), 3);
        assert_eq!(snapshot.pointer("Employee", "email").unwrap().owner, "Person");
        assert_eq!(snapshot.constraints_of("Employee").len(), 1);
        assert!(snapshot.constraints_of("Person").is_empty());
        assert_eq!(snapshot.descendants("Person"), vec!["Employee"]);
    }

    #[test]
    fn test_duplicate_type() {
        let source = sample().with_type(TypeDef::object("Person"));

        assert_eq!(
            source.build(),
            Err(SchemaError::DuplicateType {
                name: "Person".into()
            })
        );
    }

    #[test]
    fn test_fingerprint_ignores_order_and_revision() {
        let a = sample().build().unwrap();

        let mut reordered = sample();
        reordered.types.reverse();
        for def in reordered.types.iter_mut() {
            def.pointers.reverse();
        }
        reordered.revision = 9;
        let b = reordered.build().unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint_hex().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_defaults() {
        let a = sample().build().unwrap();

        let mut changed = sample();
        changed.types[0].pointers[0].default = Some("'x'".into());
        let b = changed.build().unwrap();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_json_and_bytes() {
        let json = r#"{
            "revision": 3,
            "types": [
                {"name": "Email", "kind": "scalar", "bases": ["str"]},
                {"name": "User", "pointers": [
                    {"name": "email", "target": "Email", "exclusive": true}
                ]}
            ]
        }"#;
        let source = SchemaSource::from_json(json).unwrap();
        let decoded = SchemaSource::from_bytes(&source.to_bytes().unwrap()).unwrap();
        assert_eq!(source, decoded);

        let snapshot = decoded.build().unwrap();
        assert_eq!(snapshot.revision(), 3);
        assert!(snapshot.is_scalar("Email"));
        assert!(!snapshot.is_scalar("User"));
    }

    #[test]
    fn test_snapshot_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SchemaSnapshot>();
    }
}
