//! Output formatters for diffs, plans and history.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Serialize;
use typeshift_core::catalog::{ConstraintDef, PointerDef, TypeKind};
use typeshift_core::migration::{MigrationGrade, MigrationOutcome, Script};
use typeshift_core::{MigrationPlan, MigrationRecord, PlannedStep, SchemaDiff, SchemaSnapshot};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    Text,
    /// JSON documents
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a graded diff.
    fn format_diff(&self, diff: &SchemaDiff, grade: &MigrationGrade) -> String;

    /// Format an ordered plan.
    fn format_plan(&self, plan: &MigrationPlan) -> String;

    /// Format an emitted script.
    fn format_script(&self, script: &Script) -> String;

    /// Format the result of a migration against a store.
    fn format_migration(&self, outcome: &MigrationOutcome) -> String;

    /// Format the migration history of a store.
    fn format_history(&self, records: &[MigrationRecord]) -> String;

    /// Format the effective attribute table of a snapshot.
    fn format_snapshot(&self, snapshot: &SchemaSnapshot) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Text formatter using comfy-table.
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_diff(&self, diff: &SchemaDiff, grade: &MigrationGrade) -> String {
        if diff.is_empty() {
            return "No changes.".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["#", "Grade", "Change", "Reason"]);
        for (i, change) in grade.change_grades.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(change.grade),
                Cell::new(&change.change_description),
                Cell::new(&change.reasoning),
            ]);
        }

        let mut output = format!(
            "{}\n{} change(s), overall grade {}",
            table,
            diff.change_count(),
            grade.overall_grade
        );
        append_warnings(&mut output, &grade.warnings);
        output
    }

    fn format_plan(&self, plan: &MigrationPlan) -> String {
        let mut table = Table::new();
        table.set_header(vec!["#", "Step", "Description"]);
        for (i, step) in plan.steps.iter().enumerate() {
            let kind = match step {
                PlannedStep::Guard(_) => "guard",
                PlannedStep::Apply(_) => "apply",
            };
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(kind),
                Cell::new(step.description()),
            ]);
        }

        let mut output = format!(
            "Migration {} (revision {} -> {}, grade {})\n{}\n{} step(s)",
            plan.id_hex(),
            plan.from_revision,
            plan.to_revision,
            plan.grade.overall_grade,
            table,
            plan.step_count()
        );
        append_warnings(&mut output, &plan.grade.warnings);
        output
    }

    fn format_script(&self, script: &Script) -> String {
        script.render()
    }

    fn format_migration(&self, outcome: &MigrationOutcome) -> String {
        let plan = &outcome.plan;
        let status = match &outcome.record {
            Some(record) => format!("committed revision {} ({})", plan.to_revision, record.status),
            None => format!("dry run, revision {} not committed", plan.to_revision),
        };
        format!(
            "{}\n\n{}\n\n{}, checksum {}",
            self.format_plan(plan),
            outcome.script.render(),
            status,
            outcome.script.checksum_hex()
        )
    }

    fn format_history(&self, records: &[MigrationRecord]) -> String {
        if records.is_empty() {
            return "No migrations.".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "Revision", "From", "Id", "Grade", "Status", "Checksum", "Applied At",
        ]);
        for record in records {
            table.add_row(vec![
                Cell::new(record.to_revision),
                Cell::new(record.from_revision),
                Cell::new(record.id_hex()),
                Cell::new(record.grade),
                Cell::new(record.status),
                Cell::new(short_hex(&record.checksum)),
                Cell::new(record.applied_at),
            ]);
        }
        format!("{}\n{} migration(s)", table, records.len())
    }

    fn format_snapshot(&self, snapshot: &SchemaSnapshot) -> String {
        let mut types = Table::new();
        types.set_header(vec!["Type", "Kind", "MRO", "Constraints"]);

        let mut pointers = Table::new();
        pointers.set_header(vec![
            "Type",
            "Pointer",
            "Kind",
            "Target",
            "Cardinality",
            "Required",
            "Default",
            "Exclusive",
            "Declared In",
        ]);

        for def in snapshot.types() {
            let kind = match (def.kind, def.is_abstract) {
                (TypeKind::Object, true) => "abstract object".to_string(),
                (kind, _) => kind.to_string(),
            };
            let constraints: Vec<String> = snapshot
                .constraints_of(&def.name)
                .iter()
                .map(|c| c.def.to_string())
                .collect();
            types.add_row(vec![
                Cell::new(&def.name),
                Cell::new(kind),
                Cell::new(snapshot.mro(&def.name).join(", ")),
                Cell::new(constraints.join(", ")),
            ]);

            for (name, resolved) in snapshot.pointers_of(&def.name).into_iter().flatten() {
                let p = &resolved.def;
                pointers.add_row(vec![
                    Cell::new(&def.name),
                    Cell::new(name),
                    Cell::new(p.kind),
                    Cell::new(&p.target),
                    Cell::new(p.cardinality),
                    Cell::new(p.required),
                    Cell::new(p.default.as_deref().unwrap_or("")),
                    Cell::new(p.exclusive),
                    Cell::new(&resolved.owner),
                ]);
            }
        }

        format!(
            "Revision {} ({})\n{}\n{}",
            snapshot.revision(),
            snapshot.fingerprint_hex(),
            types,
            pointers
        )
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_diff(&self, diff: &SchemaDiff, grade: &MigrationGrade) -> String {
        to_json(&serde_json::json!({
            "diff": diff,
            "grade": grade,
        }))
    }

    fn format_plan(&self, plan: &MigrationPlan) -> String {
        to_json(plan)
    }

    fn format_script(&self, script: &Script) -> String {
        to_json(script)
    }

    fn format_migration(&self, outcome: &MigrationOutcome) -> String {
        to_json(&serde_json::json!({
            "plan": outcome.plan,
            "script": outcome.script,
            "record": outcome.record,
        }))
    }

    fn format_history(&self, records: &[MigrationRecord]) -> String {
        to_json(&records)
    }

    fn format_snapshot(&self, snapshot: &SchemaSnapshot) -> String {
        let types: Vec<EffectiveType<'_>> = snapshot
            .types()
            .map(|def| EffectiveType {
                name: &def.name,
                kind: def.kind,
                is_abstract: def.is_abstract,
                mro: snapshot.mro(&def.name),
                pointers: snapshot
                    .pointers_of(&def.name)
                    .into_iter()
                    .flatten()
                    .map(|(_, p)| EffectivePointer {
                        owner: &p.owner,
                        def: &p.def,
                    })
                    .collect(),
                constraints: snapshot
                    .constraints_of(&def.name)
                    .iter()
                    .map(|c| EffectiveConstraint {
                        owner: &c.owner,
                        def: &c.def,
                    })
                    .collect(),
            })
            .collect();

        to_json(&serde_json::json!({
            "revision": snapshot.revision(),
            "fingerprint": snapshot.fingerprint_hex(),
            "types": types,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({
            "message": message
        })
        .to_string()
    }
}

#[derive(Serialize)]
struct EffectiveType<'a> {
    name: &'a str,
    kind: TypeKind,
    #[serde(rename = "abstract")]
    is_abstract: bool,
    mro: &'a [String],
    pointers: Vec<EffectivePointer<'a>>,
    constraints: Vec<EffectiveConstraint<'a>>,
}

#[derive(Serialize)]
struct EffectivePointer<'a> {
    owner: &'a str,
    #[serde(flatten)]
    def: &'a PointerDef,
}

#[derive(Serialize)]
struct EffectiveConstraint<'a> {
    owner: &'a str,
    #[serde(flatten)]
    def: &'a ConstraintDef,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn append_warnings(output: &mut String, warnings: &[String]) {
    for warning in warnings {
        output.push_str("\nwarning: ");
        output.push_str(warning);
    }
}

/// First 12 hex digits, enough to tell checksums apart in a listing.
fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(6)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeshift_core::catalog::TypeDef;
    use typeshift_core::migration::{EmptyDatabase, Migrator};
    use typeshift_core::SafetyGrader;

    fn snapshots() -> (SchemaSnapshot, SchemaSnapshot) {
        let old = SchemaSnapshot::build(
            1,
            vec![TypeDef::object("User").with_pointer(PointerDef::property("name", "str"))],
        )
        .unwrap();
        let new = SchemaSnapshot::build(
            2,
            vec![TypeDef::object("User")
                .with_pointer(PointerDef::property("name", "str"))
                .with_pointer(PointerDef::property("email", "str"))],
        )
        .unwrap();
        (old, new)
    }

    #[test]
    fn test_text_diff() {
        let (old, new) = snapshots();
        let diff = SchemaDiff::compute(&old, &new).unwrap();
        let output = TextFormatter.format_diff(&diff, &SafetyGrader::grade(&diff));

        assert!(output.contains("User.email"));
        assert!(output.contains("1 change(s), overall grade A"));
    }

    #[test]
    fn test_text_empty_diff() {
        let (old, _) = snapshots();
        let diff = SchemaDiff::compute(&old, &old).unwrap();

        assert_eq!(
            TextFormatter.format_diff(&diff, &SafetyGrader::grade(&diff)),
            "No changes."
        );
    }

    #[test]
    fn test_json_plan() {
        let (old, new) = snapshots();
        let plan = Migrator::default().plan(&old, &new, &EmptyDatabase).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_plan(&plan)).unwrap();
        assert_eq!(value["id"], plan.id_hex());
        assert_eq!(value["steps"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_json_snapshot() {
        let (_, new) = snapshots();

        let value: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_snapshot(&new)).unwrap();
        assert_eq!(value["revision"], 2);
        assert_eq!(value["types"][0]["name"], "User");
        assert_eq!(value["types"][0]["pointers"][0]["owner"], "User");
        assert_eq!(value["types"][0]["pointers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_text_history_empty() {
        assert_eq!(TextFormatter.format_history(&[]), "No migrations.");
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab; 32]), "abababababab");
    }
}
