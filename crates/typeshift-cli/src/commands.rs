//! Subcommands and their handlers.

use crate::config::{read_file, PlanArgs, RenameArgs};
use crate::error::CliError;
use crate::formatter::Formatter;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use typeshift_core::migration::{MigrationError, Migrator, SafetyGrader};
use typeshift_core::{RevisionStore, SchemaDiff, SchemaSnapshot, SchemaSource};

/// typeshift subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the graded changes between two schema files
    Diff {
        /// Current schema (JSON)
        old: PathBuf,
        /// Target schema (JSON)
        new: PathBuf,
        #[command(flatten)]
        rename: RenameArgs,
    },

    /// Plan the ordered, guarded migration between two schema files
    Plan {
        /// Current schema (JSON)
        old: PathBuf,
        /// Target schema (JSON)
        new: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Emit the migration script between two schema files
    Emit {
        /// Current schema (JSON)
        old: PathBuf,
        /// Target schema (JSON)
        new: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
        /// Write the script to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Migrate a revision store to a new schema
    Migrate {
        /// Revision store directory
        #[arg(long, value_name = "DIR")]
        store: PathBuf,
        /// Target schema (JSON)
        new: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
        /// Plan and verify without committing
        #[arg(long)]
        dry_run: bool,
    },

    /// List the migrations committed to a revision store
    History {
        /// Revision store directory
        #[arg(long, value_name = "DIR")]
        store: PathBuf,
    },

    /// Show the effective attribute table of a schema file
    Show {
        /// Schema (JSON)
        schema: PathBuf,
    },
}

impl Command {
    /// Run the command and return its formatted output.
    pub fn run(self, formatter: &dyn Formatter) -> Result<String, CliError> {
        match self {
            Command::Diff { old, new, rename } => {
                let (old, new) = load_pair(&old, &new)?;
                let diff = SchemaDiff::compute_with(&old, &new, &rename.into_options()?)?;
                Ok(formatter.format_diff(&diff, &SafetyGrader::grade(&diff)))
            }

            Command::Plan { old, new, plan } => {
                let (old, new) = load_pair(&old, &new)?;
                let config = plan.into_config()?;
                let migrator = Migrator::new(config.migration_config());
                match migrator.prepare(&old, &new, config.probe.probe()) {
                    Ok(prepared) => Ok(formatter.format_plan(&prepared.plan)),
                    Err(MigrationError::NoChanges { .. }) => Ok(no_changes(formatter)),
                    Err(e) => Err(e.into()),
                }
            }

            Command::Emit {
                old,
                new,
                plan,
                out,
            } => {
                let (old, new) = load_pair(&old, &new)?;
                let config = plan.into_config()?;
                let migrator = Migrator::new(config.migration_config());
                let script = match migrator.prepare(&old, &new, config.probe.probe()) {
                    Ok(prepared) => prepared.script,
                    Err(MigrationError::NoChanges { .. }) => return Ok(no_changes(formatter)),
                    Err(e) => return Err(e.into()),
                };

                match out {
                    Some(path) => {
                        let mut text = script.render();
                        text.push('\n');
                        std::fs::write(&path, text).map_err(|source| CliError::File {
                            path: path.clone(),
                            source,
                        })?;
                        info!(path = %path.display(), checksum = %script.checksum_hex(), "script written");
                        Ok(formatter.format_message(&format!(
                            "Wrote {} statement(s) to {}",
                            script.statements.len(),
                            path.display()
                        )))
                    }
                    None => Ok(formatter.format_script(&script)),
                }
            }

            Command::Migrate {
                store,
                new,
                plan,
                dry_run,
            } => {
                let target = load_schema(&new)?;
                let config = plan.into_config()?.with_dry_run(dry_run);
                let store = RevisionStore::open(&store)?;
                let migrator = Migrator::new(config.migration_config());
                match migrator.migrate(&store, target, config.probe.probe()) {
                    Ok(outcome) => Ok(formatter.format_migration(&outcome)),
                    Err(MigrationError::NoChanges { .. }) => Ok(no_changes(formatter)),
                    Err(e) => Err(e.into()),
                }
            }

            Command::History { store } => {
                let store = RevisionStore::open(&store)?;
                Ok(formatter.format_history(&store.history()?))
            }

            Command::Show { schema } => Ok(formatter.format_snapshot(&load_schema(&schema)?)),
        }
    }
}

fn no_changes(formatter: &dyn Formatter) -> String {
    formatter.format_message("No changes.")
}

/// Read and validate a schema file.
pub fn load_schema(path: &Path) -> Result<SchemaSnapshot, CliError> {
    let source = SchemaSource::from_json(&read_file(path)?)?;
    let snapshot = source.build().map_err(|source| CliError::Schema {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        path = %path.display(),
        revision = snapshot.revision(),
        fingerprint = %snapshot.fingerprint_hex(),
        "schema loaded"
    );
    Ok(snapshot)
}

/// Load two schema files. A target that does not carry a later revision
/// than the current schema is numbered as its successor.
fn load_pair(old: &Path, new: &Path) -> Result<(SchemaSnapshot, SchemaSnapshot), CliError> {
    let old = load_schema(old)?;
    let mut new = load_schema(new)?;
    if new.revision() <= old.revision() {
        new = new.with_revision(old.revision() + 1);
    }
    Ok((old, new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{JsonFormatter, TextFormatter};
    use tempfile::TempDir;

    const USERS: &str = r#"{"types": [
        {"name": "User", "pointers": [{"name": "name", "target": "std::str"}]}
    ]}"#;

    const USERS_WITH_EMAIL: &str = r#"{"types": [
        {"name": "User", "pointers": [
            {"name": "name", "target": "std::str"},
            {"name": "email", "target": "std::str"}
        ]}
    ]}"#;

    const ACCOUNTS: &str = r#"{"types": [
        {"name": "Account", "pointers": [{"name": "name", "target": "std::str"}]}
    ]}"#;

    struct TestContext {
        dir: TempDir,
    }

    impl TestContext {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn file(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        }

        fn store(&self) -> PathBuf {
            self.dir.path().join("store")
        }

        fn migrate(&self, schema: &str, plan: PlanArgs, dry_run: bool) -> Result<String, CliError> {
            Command::Migrate {
                store: self.store(),
                new: self.file("target.json", schema),
                plan,
                dry_run,
            }
            .run(&JsonFormatter)
        }
    }

    fn permissive() -> PlanArgs {
        PlanArgs {
            assume_empty: true,
            allow_destructive: true,
            ..PlanArgs::default()
        }
    }

    #[test]
    fn test_diff() {
        let ctx = TestContext::new();
        let output = Command::Diff {
            old: ctx.file("old.json", USERS),
            new: ctx.file("new.json", USERS_WITH_EMAIL),
            rename: RenameArgs::default(),
        }
        .run(&TextFormatter)
        .unwrap();

        assert!(output.contains("User.email"));
    }

    #[test]
    fn test_plan_without_changes() {
        let ctx = TestContext::new();
        let output = Command::Plan {
            old: ctx.file("old.json", USERS),
            new: ctx.file("new.json", USERS),
            plan: PlanArgs::default(),
        }
        .run(&TextFormatter)
        .unwrap();

        assert_eq!(output, "No changes.");
    }

    #[test]
    fn test_emit_to_file() {
        let ctx = TestContext::new();
        let out = ctx.dir.path().join("migration.edgeql");
        Command::Emit {
            old: ctx.file("old.json", USERS),
            new: ctx.file("new.json", USERS_WITH_EMAIL),
            plan: PlanArgs::default(),
            out: Some(out.clone()),
        }
        .run(&TextFormatter)
        .unwrap();

        let script = std::fs::read_to_string(out).unwrap();
        assert_eq!(
            script,
            "ALTER TYPE User { CREATE PROPERTY email: std::str; };\n"
        );
    }

    #[test]
    fn test_destructive_change_needs_flag() {
        let ctx = TestContext::new();
        let result = Command::Plan {
            old: ctx.file("old.json", USERS),
            new: ctx.file("new.json", ACCOUNTS),
            plan: PlanArgs {
                rename: RenameArgs {
                    auto_rename: typeshift_core::AutoRename::Never,
                    ..RenameArgs::default()
                },
                assume_empty: true,
                ..PlanArgs::default()
            },
        }
        .run(&TextFormatter);

        assert!(matches!(
            result,
            Err(CliError::Migration(MigrationError::UnsafeOperation { .. }))
        ));
    }

    #[test]
    fn test_rename_hint_from_flags() {
        let ctx = TestContext::new();
        let output = Command::Plan {
            old: ctx.file("old.json", USERS),
            new: ctx.file("new.json", ACCOUNTS),
            plan: PlanArgs {
                rename: RenameArgs {
                    renames: vec!["User=Account".to_string()],
                    ..RenameArgs::default()
                },
                ..PlanArgs::default()
            },
        }
        .run(&JsonFormatter)
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["steps"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_schema_names_file() {
        let ctx = TestContext::new();
        let path = ctx.file(
            "bad.json",
            r#"{"types": [{"name": "User", "bases": ["Missing"]}]}"#,
        );

        match (Command::Show { schema: path.clone() }).run(&TextFormatter) {
            Err(CliError::Schema { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected a schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_migrate_and_history() {
        let ctx = TestContext::new();
        ctx.migrate(USERS, permissive(), false).unwrap();
        ctx.migrate(USERS_WITH_EMAIL, permissive(), true).unwrap();
        ctx.migrate(USERS_WITH_EMAIL, permissive(), false).unwrap();

        let output = Command::History { store: ctx.store() }
            .run(&JsonFormatter)
            .unwrap();
        let records: serde_json::Value = serde_json::from_str(&output).unwrap();
        let records = records.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["from_revision"], 1);
        assert_eq!(records[1]["to_revision"], 2);
        assert_eq!(records[1]["status"], "applied");
    }

    #[test]
    fn test_migrate_unchanged_schema() {
        let ctx = TestContext::new();
        ctx.migrate(USERS, permissive(), false).unwrap();

        let output = ctx.migrate(USERS, permissive(), false).unwrap();
        assert!(output.contains("No changes."));
    }
}
