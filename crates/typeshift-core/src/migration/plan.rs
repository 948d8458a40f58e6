//! Migration plan generation.
//!
//! Orders the operations of a diff along their dependencies and interleaves
//! the data guards the operations need.

use super::diff::SchemaDiff;
use super::error::{MigrationError, PlanningError, SafetyGrade};
use super::grader::{MigrationGrade, SafetyGrader};
use super::operation::{Operation, PointerPath};
use super::probe::{Compatibility, DataProbe};
use crate::catalog::{Cardinality, ConstraintDef, PointerKind, SchemaSnapshot, TypeKind};
use serde::{Serialize, Serializer};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use tracing::{debug, instrument};

/// Derive a deterministic migration ID from the two snapshot fingerprints.
pub fn migration_id(from: &[u8; 32], to: &[u8; 32]) -> [u8; 16] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(from);
    hasher.update(to);
    let digest = hasher.finalize();
    let mut id = [0u8; 16];
    id.copy_from_slice(&digest.as_bytes()[..16]);
    id
}

pub(crate) fn as_hex<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes.as_ref()))
}

/// Planner configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Whether to allow Grade D (destructive) migrations.
    pub allow_destructive: bool,
}

impl PlannerConfig {
    /// Allow or forbid destructive plans.
    pub fn with_allow_destructive(mut self, allow: bool) -> Self {
        self.allow_destructive = allow;
        self
    }
}

/// A data check that must pass before the next operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "guard", rename_all = "snake_case")]
pub enum Guard {
    /// No instance may hold more than one value for the pointer.
    SingleCardinality {
        /// The pointer being narrowed.
        path: PointerPath,
    },
    /// Combined values of the pointers must be unique.
    Exclusive {
        /// The constrained type.
        type_name: String,
        /// Pointers covered.
        on: Vec<String>,
    },
}

impl Guard {
    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Guard::SingleCardinality { path } => {
                format!("check {} holds at most one value", path)
            }
            Guard::Exclusive { type_name, on } => {
                format!("check {}({}) holds no duplicates", type_name, on.join(", "))
            }
        }
    }
}

/// A step of a migration plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlannedStep {
    /// A data check.
    Guard(Guard),
    /// A schema operation.
    Apply(Operation),
}

impl PlannedStep {
    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            PlannedStep::Guard(guard) => guard.description(),
            PlannedStep::Apply(op) => op.description(),
        }
    }
}

/// A complete, ordered migration plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Deterministic migration ID.
    #[serde(serialize_with = "as_hex")]
    pub id: [u8; 16],
    /// Source schema revision.
    pub from_revision: u64,
    /// Target schema revision.
    pub to_revision: u64,
    /// Fingerprint of the source snapshot.
    #[serde(serialize_with = "as_hex")]
    pub from_fingerprint: [u8; 32],
    /// Fingerprint of the target snapshot.
    #[serde(serialize_with = "as_hex")]
    pub to_fingerprint: [u8; 32],
    /// Safety grade for this migration.
    pub grade: MigrationGrade,
    /// Ordered steps.
    pub steps: Vec<PlannedStep>,
}

impl MigrationPlan {
    /// Hex form of the ID.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Get the number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Check if the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The operations, in plan order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.steps.iter().filter_map(|step| match step {
            PlannedStep::Apply(op) => Some(op),
            PlannedStep::Guard(_) => None,
        })
    }

    /// The guards, in plan order.
    pub fn guards(&self) -> impl Iterator<Item = &Guard> {
        self.steps.iter().filter_map(|step| match step {
            PlannedStep::Guard(guard) => Some(guard),
            PlannedStep::Apply(_) => None,
        })
    }
}

/// Builds migration plans from diffs.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Create a planner.
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Order the diff's operations and attach data guards.
    #[instrument(skip_all, fields(operations = diff.operations.len()))]
    pub fn plan(
        &self,
        diff: &SchemaDiff,
        old: &SchemaSnapshot,
        new: &SchemaSnapshot,
        probe: &dyn DataProbe,
    ) -> Result<MigrationPlan, MigrationError> {
        let ctx = PlanContext::new(diff, old, new);
        let order = ctx.order()?;

        let mut steps = Vec::with_capacity(order.len());
        for index in order {
            let op = &diff.operations[index];
            for guard in ctx.check(op, probe)? {
                debug!(guard = %guard.description(), "guard scheduled");
                steps.push(PlannedStep::Guard(guard));
            }
            steps.push(PlannedStep::Apply(op.clone()));
        }

        let grade = SafetyGrader::grade(diff);
        if grade.overall_grade == SafetyGrade::D && !self.config.allow_destructive {
            let operation = grade
                .change_grades
                .iter()
                .find(|g| g.grade == SafetyGrade::D)
                .map(|g| g.change_description.clone())
                .unwrap_or_else(|| "migration".to_string());
            return Err(MigrationError::UnsafeOperation {
                operation,
                grade: SafetyGrade::D,
                requirement: "set allow_destructive=true to proceed".to_string(),
            });
        }

        debug!(steps = steps.len(), grade = %grade.overall_grade, "plan built");

        Ok(MigrationPlan {
            id: migration_id(&old.fingerprint(), &new.fingerprint()),
            from_revision: old.revision(),
            to_revision: new.revision(),
            from_fingerprint: old.fingerprint(),
            to_fingerprint: new.fingerprint(),
            grade,
            steps,
        })
    }
}

/// Type names an operation brings into or takes out of existence, and the
/// names it depends on.
#[derive(Default)]
struct Facts {
    claims: Vec<String>,
    frees: Vec<String>,
    requires: Vec<String>,
    releases: Vec<String>,
    claims_pointer: Option<(String, String)>,
    frees_pointer: Option<(String, String)>,
}

fn facts(op: &Operation) -> Facts {
    let mut f = Facts::default();
    match op {
        Operation::CreateType { def } => {
            f.claims.push(def.name.clone());
            f.requires
                .extend(def.references().filter(|r| *r != def.name).map(String::from));
        }
        Operation::DropType { def } => {
            f.frees.push(def.name.clone());
            f.releases
                .extend(def.references().filter(|r| *r != def.name).map(String::from));
        }
        Operation::RenameType { from, to, .. } => {
            f.frees.push(from.clone());
            f.claims.push(to.clone());
        }
        Operation::AlterBase {
            type_name, from, to, ..
        } => {
            f.requires.push(type_name.clone());
            f.requires.extend(to.iter().cloned());
            f.releases
                .extend(from.iter().filter(|b| !to.contains(b)).cloned());
        }
        Operation::AddProperty { type_name, pointer } => {
            f.requires.push(type_name.clone());
            f.requires.push(pointer.target.clone());
            f.claims_pointer = Some((type_name.clone(), pointer.name.clone()));
        }
        Operation::DropProperty { type_name, pointer } => {
            f.releases.push(pointer.target.clone());
            f.frees_pointer = Some((type_name.clone(), pointer.name.clone()));
        }
        Operation::RenameProperty { path, to } => {
            f.requires.push(path.type_name.clone());
            f.frees_pointer = Some((path.type_name.clone(), path.name.clone()));
            f.claims_pointer = Some((path.type_name.clone(), to.clone()));
        }
        Operation::AlterTarget { path, from, to } => {
            f.requires.push(path.type_name.clone());
            f.requires.push(to.clone());
            f.releases.push(from.clone());
        }
        Operation::AlterAbstract { type_name, .. } | Operation::AddConstraint { type_name, .. } => {
            f.requires.push(type_name.clone());
        }
        Operation::AlterCardinality { path, .. }
        | Operation::AlterDefault { path, .. }
        | Operation::AlterRequired { path, .. }
        | Operation::AlterExclusive { path, .. } => {
            f.requires.push(path.type_name.clone());
        }
        Operation::DropConstraint { .. } => {}
    }
    f
}

struct PlanContext<'a> {
    diff: &'a SchemaDiff,
    old: &'a SchemaSnapshot,
    new: &'a SchemaSnapshot,
    created: BTreeSet<&'a str>,
}

impl<'a> PlanContext<'a> {
    fn new(diff: &'a SchemaDiff, old: &'a SchemaSnapshot, new: &'a SchemaSnapshot) -> Self {
        let created = diff
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::CreateType { def } => Some(def.name.as_str()),
                _ => None,
            })
            .collect();
        Self {
            diff,
            old,
            new,
            created,
        }
    }

    /// Check whether `ancestor` is `type_name` or one of its bases, in either snapshot.
    fn inherits(&self, type_name: &str, ancestor: &str) -> bool {
        if type_name == ancestor || self.new.mro(type_name).iter().any(|a| a == ancestor) {
            return true;
        }
        let old_name = self.diff.old_name_of(type_name);
        self.old
            .mro(old_name)
            .iter()
            .any(|a| self.diff.new_name_of(a) == ancestor)
    }

    fn must_precede(&self, i: usize, j: usize, fi: &Facts, fj: &Facts) -> bool {
        let a = &self.diff.operations[i];
        let b = &self.diff.operations[j];

        if fi.claims.iter().any(|n| fj.requires.contains(n)) {
            return true;
        }
        if fi.frees.iter().any(|n| fj.claims.contains(n)) {
            return true;
        }
        if fi.frees_pointer.is_some() && fi.frees_pointer == fj.claims_pointer {
            return true;
        }
        // A declaration leaves an inheritance line before a conflicting one enters it.
        let conflicts = removed_pointers(a).into_iter().any(|(owner, name)| {
            declared_pointers(b).into_iter().any(|(t, p)| {
                p == name && t != owner && (self.inherits(t, owner) || self.inherits(owner, t))
            })
        });
        if conflicts {
            return true;
        }

        if let Operation::DropType { def } = b {
            if fi.releases.contains(&def.name) {
                return true;
            }
            let drops_member = matches!(
                a,
                Operation::DropProperty { .. } | Operation::DropConstraint { .. }
            );
            if drops_member && a.type_name() == def.name {
                return true;
            }
        }

        match (a, b) {
            (Operation::RenameProperty { path, to }, _) if i != j => {
                let touches = b.pointer_name() == Some(to.as_str())
                    || constraint_of(b).is_some_and(|c| c.covers(to));
                if touches && self.inherits(b.type_name(), &path.type_name) {
                    return true;
                }
            }
            (
                Operation::DropConstraint {
                    type_name,
                    constraint,
                },
                Operation::DropProperty {
                    type_name: owner,
                    pointer,
                },
            ) if constraint.covers(&pointer.name) && self.inherits(type_name, owner) => {
                return true;
            }
            (
                Operation::AddProperty {
                    type_name: owner,
                    pointer,
                },
                Operation::AddConstraint {
                    type_name,
                    constraint,
                },
            ) if constraint.covers(&pointer.name) && self.inherits(type_name, owner) => {
                return true;
            }
            _ => {}
        }

        // Ancestors settle before descendants alter what they inherit.
        if b.is_pointer_alter() {
            let target = b.type_name();
            let subject = a.type_name();
            let ancestor = subject != target && self.new.mro(target).iter().any(|t| t == subject);
            let same_pointer = a.pointer_name().is_some() && a.pointer_name() == b.pointer_name();
            match a {
                Operation::AlterBase { .. } if subject == target || ancestor => return true,
                Operation::AddProperty { .. } | Operation::RenameProperty { .. }
                    if ancestor && same_pointer =>
                {
                    return true
                }
                _ if a.is_pointer_alter() && ancestor && same_pointer => return true,
                _ => {}
            }
        }

        false
    }

    /// Topological order (Kahn), ties broken by priority then canonical index.
    fn order(&self) -> Result<Vec<usize>, PlanningError> {
        let ops = &self.diff.operations;
        let facts: Vec<Facts> = ops.iter().map(facts).collect();

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); ops.len()];
        let mut indegree = vec![0usize; ops.len()];
        for i in 0..ops.len() {
            for j in 0..ops.len() {
                if i != j && self.must_precede(i, j, &facts[i], &facts[j]) && successors[i].insert(j)
                {
                    indegree[j] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<(u8, usize)>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse((ops[i].kind().priority(), i)))
            .collect();

        let mut order = Vec::with_capacity(ops.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(i);
            for &j in &successors[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push(Reverse((ops[j].kind().priority(), j)));
                }
            }
        }

        if order.len() < ops.len() {
            let operations = (0..ops.len())
                .filter(|i| indegree[*i] > 0)
                .map(|i| ops[i].description())
                .collect();
            return Err(PlanningError::Cycle { operations });
        }
        Ok(order)
    }

    /// Old name of a type carried over from the old snapshot.
    fn old_type(&self, new_name: &str) -> Option<&'a str> {
        if self.created.contains(new_name) {
            return None;
        }
        let old_name = self.diff.old_name_of(new_name);
        self.old.get_type(old_name).map(|def| def.name.as_str())
    }

    fn old_pointer<'s>(&'s self, type_name: &str, pointer: &'s str) -> &'s str {
        self.diff.old_pointer_name(self.new.mro(type_name), pointer)
    }

    /// Instance count of a carried-over type unless it is known to be empty.
    fn populated(&self, new_name: &str, probe: &dyn DataProbe) -> Option<Option<u64>> {
        let old_name = self.old_type(new_name)?;
        match probe.instance_count(old_name) {
            Some(0) => None,
            count => Some(count),
        }
    }

    /// The type and descendants that see this type's declaration of `pointer`.
    fn affected(&self, type_name: &str, pointer: &str) -> Vec<String> {
        let mut types = vec![type_name.to_string()];
        types.extend(
            self.new
                .descendants(type_name)
                .into_iter()
                .filter(|d| {
                    self.new
                        .pointer(d, pointer)
                        .is_some_and(|p| p.owner == type_name)
                })
                .map(String::from),
        );
        types
    }

    fn check(&self, op: &'a Operation, probe: &dyn DataProbe) -> Result<Vec<Guard>, MigrationError> {
        match op {
            Operation::AlterCardinality {
                path,
                from: Cardinality::Multi,
                to: Cardinality::Single,
            } => self.check_narrowing(path, probe),
            Operation::AlterBase {
                type_name,
                kind: TypeKind::Scalar,
                ..
            } => {
                self.check_scalar_rebase(type_name, probe)?;
                Ok(Vec::new())
            }
            Operation::AlterAbstract {
                type_name,
                to: true,
            } => match self.populated(type_name, probe) {
                Some(instances) => Err(PlanningError::AbstractWithInstances {
                    type_name: type_name.clone(),
                    instances,
                }
                .into()),
                None => Ok(Vec::new()),
            },
            Operation::AddConstraint {
                type_name,
                constraint,
            } => self.check_exclusive(type_name, constraint, probe),
            Operation::AlterExclusive { path, to: true } => self.check_exclusive(
                &path.type_name,
                &ConstraintDef::exclusive([path.name.clone()]),
                probe,
            ),
            Operation::AlterRequired {
                path,
                to: true,
                has_default: false,
            } => {
                self.check_required(&path.type_name, &path.name, probe)?;
                Ok(Vec::new())
            }
            Operation::AddProperty { type_name, pointer }
                if pointer.required && pointer.default.is_none() =>
            {
                self.check_required(type_name, &pointer.name, probe)?;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn check_narrowing(
        &self,
        path: &'a PointerPath,
        probe: &dyn DataProbe,
    ) -> Result<Vec<Guard>, MigrationError> {
        let mut unknown = false;
        for subject in self.affected(&path.type_name, &path.name) {
            let Some(old_name) = self.old_type(&subject) else {
                continue;
            };
            let pointer = self.old_pointer(&subject, &path.name);
            match probe.check_single(old_name, pointer) {
                Compatibility::Compatible => {}
                Compatibility::Incompatible { count } => {
                    return Err(PlanningError::IncompatibleCardinality {
                        type_name: subject,
                        pointer: path.name.clone(),
                        count,
                    }
                    .into())
                }
                Compatibility::Unknown => unknown = true,
            }
        }

        if unknown {
            return Err(PlanningError::UncheckedNarrowing {
                type_name: path.type_name.clone(),
                pointer: path.name.clone(),
            }
            .into());
        }
        Ok(vec![Guard::SingleCardinality { path: path.clone() }])
    }

    fn check_scalar_rebase(&self, type_name: &str, probe: &dyn DataProbe) -> Result<(), MigrationError> {
        let Some(scalar) = self.old_type(type_name) else {
            return Ok(());
        };

        for def in self.old.types() {
            if def.is_scalar() || def.is_abstract {
                continue;
            }
            let uses_scalar = self.old.pointers_of(&def.name).is_some_and(|ptrs| {
                ptrs.values().any(|p| {
                    p.def.kind == PointerKind::Property
                        && (p.def.target == scalar
                            || self.old.mro(&p.def.target).iter().any(|a| a == scalar))
                })
            });
            if uses_scalar && probe.instance_count(&def.name) != Some(0) {
                return Err(MigrationError::ImmutableBase {
                    type_name: type_name.to_string(),
                    used_by: self.diff.new_name_of(&def.name).to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_exclusive(
        &self,
        type_name: &str,
        constraint: &ConstraintDef,
        probe: &dyn DataProbe,
    ) -> Result<Vec<Guard>, MigrationError> {
        let Some(old_name) = self.old_type(type_name) else {
            return Ok(Vec::new());
        };

        let old_pointers: Vec<String> = constraint
            .on
            .iter()
            .map(|p| self.old_pointer(type_name, p).to_string())
            .collect();
        let all_existing = old_pointers
            .iter()
            .all(|p| self.old.pointer(old_name, p).is_some());

        let answer = if all_existing {
            probe.check_exclusive(old_name, &old_pointers)
        } else if probe.instance_count(old_name) == Some(0) {
            Compatibility::Compatible
        } else {
            Compatibility::Unknown
        };

        match answer {
            Compatibility::Compatible => Ok(Vec::new()),
            Compatibility::Incompatible { count } => Err(MigrationError::ConstraintViolation {
                type_name: type_name.to_string(),
                constraint: constraint.signature(),
                duplicates: count,
            }),
            Compatibility::Unknown => Ok(vec![Guard::Exclusive {
                type_name: type_name.to_string(),
                on: constraint.on.clone(),
            }]),
        }
    }

    fn check_required(
        &self,
        type_name: &str,
        pointer: &str,
        probe: &dyn DataProbe,
    ) -> Result<(), MigrationError> {
        for subject in self.affected(type_name, pointer) {
            if let Some(instances) = self.populated(&subject, probe) {
                return Err(PlanningError::MissingDefault {
                    type_name: subject,
                    pointer: pointer.to_string(),
                    instances,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn constraint_of(op: &Operation) -> Option<&ConstraintDef> {
    match op {
        Operation::AddConstraint { constraint, .. } | Operation::DropConstraint { constraint, .. } => {
            Some(constraint)
        }
        _ => None,
    }
}

/// `(type, pointer)` pairs an operation declares.
fn declared_pointers(op: &Operation) -> Vec<(&str, &str)> {
    match op {
        Operation::AddProperty { type_name, pointer } => {
            vec![(type_name.as_str(), pointer.name.as_str())]
        }
        Operation::CreateType { def } => def
            .pointers
            .iter()
            .map(|p| (def.name.as_str(), p.name.as_str()))
            .collect(),
        _ => Vec::new(),
    }
}

/// `(type, pointer)` pairs an operation removes.
fn removed_pointers(op: &Operation) -> Vec<(&str, &str)> {
    match op {
        Operation::DropProperty { type_name, pointer } => {
            vec![(type_name.as_str(), pointer.name.as_str())]
        }
        Operation::DropType { def } => def
            .pointers
            .iter()
            .map(|p| (def.name.as_str(), p.name.as_str()))
            .collect(),
        _ => Vec::new(),
    }
}
