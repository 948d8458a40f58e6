//! Migration executor - orchestrates the migration workflow.
//!
//! Runs diff, plan and emit, verifies the plan by applying it, and commits
//! the result to a revision store.

use super::apply::apply;
use super::diff::{DiffOptions, SchemaDiff};
use super::emit::{Script, ScriptEmitter};
use super::error::MigrationError;
use super::plan::{MigrationPlan, Planner, PlannerConfig};
use super::probe::DataProbe;
use crate::catalog::SchemaSnapshot;
use crate::store::{MigrationRecord, RevisionStore};
use tracing::{debug, info, instrument, warn};

/// Migration executor configuration.
#[derive(Debug, Clone, Default)]
pub struct MigrationConfig {
    /// Rename detection options.
    pub diff: DiffOptions,
    /// Planner options.
    pub planner: PlannerConfig,
    /// Whether to run in dry-run mode (nothing is committed).
    pub dry_run: bool,
}

impl MigrationConfig {
    /// Set the rename detection options.
    pub fn with_diff(mut self, diff: DiffOptions) -> Self {
        self.diff = diff;
        self
    }

    /// Set the planner options.
    pub fn with_planner(mut self, planner: PlannerConfig) -> Self {
        self.planner = planner;
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Everything produced for one pair of snapshots.
#[derive(Debug, Clone)]
pub struct PreparedMigration {
    /// The diff.
    pub diff: SchemaDiff,
    /// The ordered plan.
    pub plan: MigrationPlan,
    /// The rendered script.
    pub script: Script,
}

/// Result of running a migration against a store.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// The ordered plan.
    pub plan: MigrationPlan,
    /// The rendered script.
    pub script: Script,
    /// The committed record, `None` for dry runs.
    pub record: Option<MigrationRecord>,
}

/// Migration executor.
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    config: MigrationConfig,
}

impl Migrator {
    /// Create a new executor.
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// The executor configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Diff two snapshots.
    pub fn diff(&self, old: &SchemaSnapshot, new: &SchemaSnapshot) -> Result<SchemaDiff, MigrationError> {
        SchemaDiff::compute_with(old, new, &self.config.diff)
    }

    /// Plan a migration between two snapshots.
    pub fn plan(
        &self,
        old: &SchemaSnapshot,
        new: &SchemaSnapshot,
        probe: &dyn DataProbe,
    ) -> Result<MigrationPlan, MigrationError> {
        Ok(self.prepare(old, new, probe)?.plan)
    }

    /// Diff, plan and emit.
    #[instrument(skip_all, fields(from = old.revision(), to = new.revision()))]
    pub fn prepare(
        &self,
        old: &SchemaSnapshot,
        new: &SchemaSnapshot,
        probe: &dyn DataProbe,
    ) -> Result<PreparedMigration, MigrationError> {
        let diff = self.diff(old, new)?;
        if diff.is_empty() {
            return Err(MigrationError::NoChanges {
                from_revision: old.revision(),
                to_revision: new.revision(),
            });
        }

        let plan = Planner::new(self.config.planner).plan(&diff, old, new, probe)?;
        for warning in &plan.grade.warnings {
            warn!(%warning, "migration warning");
        }
        let script = ScriptEmitter::emit(&plan);

        debug!(
            id = %plan.id_hex(),
            steps = plan.step_count(),
            grade = %plan.grade.overall_grade,
            "migration prepared"
        );
        Ok(PreparedMigration { diff, plan, script })
    }

    /// Check that applying the plan to `old` reproduces `new`.
    pub fn verify(
        &self,
        old: &SchemaSnapshot,
        new: &SchemaSnapshot,
        plan: &MigrationPlan,
    ) -> Result<SchemaSnapshot, MigrationError> {
        let applied = apply(old, plan.operations(), new.revision())?;
        let residue = SchemaDiff::compute(&applied, new)?;
        if let Some(op) = residue.operations.first() {
            return Err(MigrationError::Apply {
                operation: op.description(),
                reason: format!(
                    "plan leaves {} difference(s) from the target schema",
                    residue.change_count()
                ),
            });
        }
        Ok(applied)
    }

    /// Migrate the store's current schema to `target`.
    ///
    /// The target becomes the revision after the current one. Nothing is
    /// written in dry-run mode.
    #[instrument(skip_all, fields(dry_run = self.config.dry_run))]
    pub fn migrate(
        &self,
        store: &RevisionStore,
        target: SchemaSnapshot,
        probe: &dyn DataProbe,
    ) -> Result<MigrationOutcome, MigrationError> {
        let current = store
            .current()?
            .unwrap_or_else(|| SchemaSnapshot::empty(0));
        let target = target.with_revision(current.revision() + 1);

        let PreparedMigration { plan, script, .. } = self.prepare(&current, &target, probe)?;
        self.verify(&current, &target, &plan)?;

        if self.config.dry_run {
            info!(id = %plan.id_hex(), "dry run, nothing committed");
            return Ok(MigrationOutcome {
                plan,
                script,
                record: None,
            });
        }

        let record = MigrationRecord::new(&plan, &script);
        store.commit(&target, &record)?;
        store.flush()?;

        info!(
            id = %plan.id_hex(),
            from = plan.from_revision,
            to = plan.to_revision,
            "migration committed"
        );
        Ok(MigrationOutcome {
            plan,
            script,
            record: Some(record),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PointerDef, TypeDef};
    use crate::migration::probe::{EmptyDatabase, Unprobed};

    fn schema(types: Vec<TypeDef>) -> SchemaSnapshot {
        SchemaSnapshot::build(0, types).unwrap()
    }

    fn user() -> TypeDef {
        TypeDef::object("User").with_pointer(PointerDef::property("name", "str"))
    }

    #[test]
    fn test_no_changes() {
        let s = schema(vec![user()]);

        assert!(matches!(
            Migrator::default().prepare(&s, &s, &Unprobed),
            Err(MigrationError::NoChanges { .. })
        ));
    }

    #[test]
    fn test_migrate_commits_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let store = RevisionStore::open(dir.path()).unwrap();
        let migrator = Migrator::default();

        let first = migrator
            .migrate(&store, schema(vec![user()]), &EmptyDatabase)
            .unwrap();
        assert_eq!(first.plan.to_revision, 1);
        assert!(first.record.is_some());

        let second = migrator
            .migrate(
                &store,
                schema(vec![user(), TypeDef::object("Post")]),
                &EmptyDatabase,
            )
            .unwrap();
        assert_eq!(second.plan.from_revision, 1);
        assert_eq!(store.current_revision(), 2);
        assert_eq!(store.history().unwrap().len(), 2);
    }

    #[test]
    fn test_dry_run_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = RevisionStore::open(dir.path()).unwrap();
        let migrator = Migrator::new(MigrationConfig::default().with_dry_run(true));

        let outcome = migrator
            .migrate(&store, schema(vec![user()]), &EmptyDatabase)
            .unwrap();

        assert!(outcome.record.is_none());
        assert!(!outcome.script.is_empty());
        assert_eq!(store.current_revision(), 0);
    }

    #[test]
    fn test_destructive_needs_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = RevisionStore::open(dir.path()).unwrap();
        Migrator::default()
            .migrate(&store, schema(vec![user(), TypeDef::object("Post")]), &EmptyDatabase)
            .unwrap();

        let result = Migrator::default().migrate(&store, schema(vec![user()]), &EmptyDatabase);
        assert!(matches!(result, Err(MigrationError::UnsafeOperation { .. })));

        let forced = Migrator::new(
            MigrationConfig::default()
                .with_planner(PlannerConfig::default().with_allow_destructive(true)),
        )
        .migrate(&store, schema(vec![user()]), &EmptyDatabase)
        .unwrap();
        assert_eq!(
            forced.record.map(|r| r.status),
            Some(crate::store::MigrationStatus::Forced)
        );
    }
}
