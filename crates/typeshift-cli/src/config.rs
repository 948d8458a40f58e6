//! Command-line flags and the configuration built from them.

use crate::error::CliError;
use clap::Args;
use std::path::{Path, PathBuf};
use typeshift_core::migration::{
    AutoRename, DataProbe, DiffOptions, EmptyDatabase, MigrationConfig, PlannerConfig,
    RenameHints, StaticProbe, Unprobed,
};

/// Rename detection flags.
#[derive(Args, Debug, Clone, Default)]
pub struct RenameArgs {
    /// Rename hint: `Old=New` for a type, `Type.old=new` for a pointer.
    #[arg(long = "rename", value_name = "OLD=NEW")]
    pub renames: Vec<String>,

    /// Policy for rename candidates no hint resolves (reject, accept, never).
    #[arg(long, value_name = "POLICY", default_value = "reject", value_parser = parse_auto_rename)]
    pub auto_rename: AutoRename,
}

fn parse_auto_rename(s: &str) -> Result<AutoRename, String> {
    s.parse()
}

impl RenameArgs {
    /// Convert the flags into diff options.
    pub fn into_options(self) -> Result<DiffOptions, CliError> {
        let mut hints = RenameHints::new();
        for hint in &self.renames {
            hints.add(hint)?;
        }
        Ok(DiffOptions::default()
            .with_hints(hints)
            .with_auto_rename(self.auto_rename))
    }
}

/// Planning flags.
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    #[command(flatten)]
    pub rename: RenameArgs,

    /// Instance statistics (JSON) used to check data-dependent changes.
    #[arg(long, value_name = "FILE", conflicts_with = "assume_empty")]
    pub stats: Option<PathBuf>,

    /// Assume the database holds no instances.
    #[arg(long)]
    pub assume_empty: bool,

    /// Allow destructive (grade D) changes.
    #[arg(long)]
    pub allow_destructive: bool,
}

impl PlanArgs {
    /// Convert the flags into a CLI configuration.
    pub fn into_config(self) -> Result<CliConfig, CliError> {
        let probe = match (&self.stats, self.assume_empty) {
            (Some(path), _) => ProbeSource::Stats(StaticProbe::from_json(&read_file(path)?)?),
            (None, true) => ProbeSource::Empty,
            (None, false) => ProbeSource::Unprobed,
        };

        Ok(CliConfig::default()
            .with_diff(self.rename.into_options()?)
            .with_probe(probe)
            .with_allow_destructive(self.allow_destructive))
    }
}

/// Where data-compatibility answers come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProbeSource {
    /// Nothing is known about existing data.
    #[default]
    Unprobed,
    /// The database is known to be empty.
    Empty,
    /// Statistics loaded from a file.
    Stats(StaticProbe),
}

impl ProbeSource {
    /// The probe to plan against.
    pub fn probe(&self) -> &dyn DataProbe {
        match self {
            ProbeSource::Unprobed => &Unprobed,
            ProbeSource::Empty => &EmptyDatabase,
            ProbeSource::Stats(stats) => stats,
        }
    }
}

/// Configuration for one CLI invocation.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Rename detection options.
    pub diff: DiffOptions,
    /// Planner options.
    pub planner: PlannerConfig,
    /// Data-compatibility source.
    pub probe: ProbeSource,
    /// Plan and verify without committing.
    pub dry_run: bool,
}

impl CliConfig {
    /// Set the rename detection options.
    pub fn with_diff(mut self, diff: DiffOptions) -> Self {
        self.diff = diff;
        self
    }

    /// Set the data-compatibility source.
    pub fn with_probe(mut self, probe: ProbeSource) -> Self {
        self.probe = probe;
        self
    }

    /// Allow or forbid destructive changes.
    pub fn with_allow_destructive(mut self, allow: bool) -> Self {
        self.planner = self.planner.with_allow_destructive(allow);
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The executor configuration.
    pub fn migration_config(&self) -> MigrationConfig {
        MigrationConfig::default()
            .with_diff(self.diff.clone())
            .with_planner(self.planner)
            .with_dry_run(self.dry_run)
    }
}

/// Read a whole file, naming it in the error.
pub fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::File {
        path: path.to_path_buf(),
        source,
    })
}
