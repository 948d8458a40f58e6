//! typeshift command-line tool
//!
//! Diffs schema files, plans and emits migration scripts, and keeps a
//! revision store of migrated schemas.

mod commands;
mod config;
mod error;
mod formatter;

use clap::Parser;
use commands::Command;
use formatter::{create_formatter, OutputFormat};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// typeshift schema migration tool
#[derive(Parser, Debug)]
#[command(name = "typeshift")]
#[command(version, about = "Schema diff and migration planner for inheriting object schemas")]
pub struct Args {
    /// Output format
    #[arg(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let formatter = create_formatter(args.format);
    match args.command.run(formatter.as_ref()) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so command output stays pipeable.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "typeshift=debug,typeshift_core=debug"
    } else {
        "typeshift=warn,typeshift_core=warn"
    };
    let filter = EnvFilter::try_from_env("TYPESHIFT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate() {
        let args = Args::try_parse_from([
            "typeshift",
            "migrate",
            "--store",
            "db",
            "schema.json",
            "--assume-empty",
            "--dry-run",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.format, OutputFormat::Json);
        assert!(matches!(
            args.command,
            Command::Migrate { dry_run: true, ref plan, .. } if plan.assume_empty
        ));
    }

    #[test]
    fn test_parse_repeated_renames() {
        let args = Args::try_parse_from([
            "typeshift",
            "-v",
            "diff",
            "old.json",
            "new.json",
            "--rename",
            "A=B",
            "--rename",
            "B.x=y",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Command::Diff { rename, .. } => assert_eq!(rename.renames, vec!["A=B", "B.x=y"]),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
