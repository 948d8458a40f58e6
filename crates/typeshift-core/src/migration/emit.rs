//! DDL script generation.
//!
//! Renders a migration plan as one statement per step, in plan order.

use super::operation::{Operation, PointerPath};
use super::plan::{as_hex, Guard, MigrationPlan, PlannedStep};
use crate::catalog::{Cardinality, ConstraintDef, PointerDef, PointerKind, TypeKind};
use serde::Serialize;
use tracing::debug;

/// A rendered migration script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Script {
    /// Statements, one per planned step.
    pub statements: Vec<String>,
    /// blake3 checksum of the rendered text.
    #[serde(serialize_with = "as_hex")]
    pub checksum: [u8; 32],
}

impl Script {
    fn new(statements: Vec<String>) -> Self {
        let checksum = *blake3::hash(statements.join("\n").as_bytes()).as_bytes();
        Self {
            statements,
            checksum,
        }
    }

    /// The full script text.
    pub fn render(&self) -> String {
        self.statements.join("\n")
    }

    /// Hex form of the checksum.
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }

    /// Check if the script has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Renders plans as DDL.
pub struct ScriptEmitter;

impl ScriptEmitter {
    /// Render every step of a plan.
    pub fn emit(plan: &MigrationPlan) -> Script {
        let statements: Vec<String> = plan
            .steps
            .iter()
            .map(|step| match step {
                PlannedStep::Guard(guard) => Self::guard(guard),
                PlannedStep::Apply(op) => Self::statement(op),
            })
            .collect();
        debug!(statements = statements.len(), "script emitted");
        Script::new(statements)
    }

    /// Render a single operation.
    pub fn statement(op: &Operation) -> String {
        match op {
            Operation::CreateType { def } => {
                let mut head = format!("CREATE {}", type_keyword(def.kind, def.is_abstract));
                head.push_str(&format!(" {}", def.name));
                if !def.bases.is_empty() {
                    head.push_str(&format!(" EXTENDING {}", def.bases.join(", ")));
                }
                let members: Vec<String> = def
                    .pointers
                    .iter()
                    .map(create_pointer)
                    .chain(def.constraints.iter().map(create_constraint))
                    .collect();
                format!("{}{};", head, block(&members))
            }
            Operation::DropType { def } => {
                format!("DROP {} {};", type_keyword(def.kind, false), def.name)
            }
            Operation::RenameType { kind, from, to } => {
                format!("ALTER {} {} RENAME TO {};", type_keyword(*kind, false), from, to)
            }
            Operation::AlterBase {
                type_name,
                kind,
                from,
                to,
            } => {
                let mut removed: Vec<&String> = from.iter().filter(|b| !to.contains(b)).collect();
                let mut added: Vec<&String> = to.iter().filter(|b| !from.contains(b)).collect();
                if removed.is_empty() && added.is_empty() {
                    // Same bases, new order.
                    removed = from.iter().collect();
                    added = to.iter().collect();
                }
                let mut commands = Vec::new();
                if !removed.is_empty() {
                    commands.push(format!("DROP EXTENDING {}", join(&removed)));
                }
                if !added.is_empty() {
                    commands.push(format!("EXTENDING {}", join(&added)));
                }
                alter_type(*kind, type_name, &commands)
            }
            Operation::AlterAbstract { type_name, to } => {
                let command = if *to { "SET ABSTRACT" } else { "RESET ABSTRACT" };
                alter_type(TypeKind::Object, type_name, &[command.to_string()])
            }
            Operation::AddProperty { type_name, pointer } => {
                alter_type(TypeKind::Object, type_name, &[create_pointer(pointer)])
            }
            Operation::DropProperty { type_name, pointer } => alter_type(
                TypeKind::Object,
                type_name,
                &[format!("DROP {} {}", pointer.kind.keyword(), pointer.name)],
            ),
            Operation::RenameProperty { path, to } => {
                alter_pointer(path, &format!("RENAME TO {}", to))
            }
            Operation::AlterCardinality { path, to, .. } => {
                let command = match to {
                    Cardinality::Single => "SET SINGLE",
                    Cardinality::Multi => "SET MULTI",
                };
                alter_pointer(path, command)
            }
            Operation::AlterDefault { path, to, .. } => match to {
                Some(expr) => alter_pointer(path, &format!("SET default := {}", expr)),
                None => alter_pointer(path, "RESET default"),
            },
            Operation::AlterRequired { path, to, .. } => {
                alter_pointer(path, if *to { "SET REQUIRED" } else { "SET OPTIONAL" })
            }
            Operation::AlterTarget { path, to, .. } => match path.kind {
                PointerKind::Property => alter_pointer(
                    path,
                    &format!("SET TYPE {} USING (<{}>.{})", to, to, path.name),
                ),
                PointerKind::Link => alter_pointer(path, &format!("SET TYPE {}", to)),
            },
            Operation::AlterExclusive { path, to } => {
                let command = if *to {
                    "CREATE CONSTRAINT exclusive"
                } else {
                    "DROP CONSTRAINT exclusive"
                };
                alter_pointer(path, command)
            }
            Operation::AddConstraint {
                type_name,
                constraint,
            } => alter_type(TypeKind::Object, type_name, &[create_constraint(constraint)]),
            Operation::DropConstraint {
                type_name,
                constraint,
            } => alter_type(
                TypeKind::Object,
                type_name,
                &[format!("DROP CONSTRAINT exclusive ON {}", constraint.subject_expr())],
            ),
        }
    }

    /// Render a guard as an assertion.
    pub fn guard(guard: &Guard) -> String {
        let message = quote(&format!("{} failed", guard.description()));
        match guard {
            Guard::SingleCardinality { path } => format!(
                "SELECT assert(NOT EXISTS (SELECT {} FILTER count(.{}) > 1), message := {});",
                path.type_name, path.name, message
            ),
            Guard::Exclusive { type_name, on } => {
                let keys: Vec<String> = on.iter().map(|p| format!(".{}", p)).collect();
                format!(
                    "SELECT assert(count((GROUP {} BY {})) = count({}), message := {});",
                    type_name,
                    keys.join(", "),
                    type_name,
                    message
                )
            }
        }
    }
}

fn type_keyword(kind: TypeKind, is_abstract: bool) -> String {
    let mut keyword = String::new();
    if is_abstract {
        keyword.push_str("ABSTRACT ");
    }
    if kind == TypeKind::Scalar {
        keyword.push_str("SCALAR ");
    }
    keyword.push_str("TYPE");
    keyword
}

fn join(names: &[&String]) -> String {
    names
        .iter()
        .map(|n| n.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// ` { a; b; }`, or nothing when there are no commands.
fn block(commands: &[String]) -> String {
    if commands.is_empty() {
        return String::new();
    }
    let body: Vec<String> = commands.iter().map(|c| format!("{};", c)).collect();
    format!(" {{ {} }}", body.join(" "))
}

fn alter_type(kind: TypeKind, type_name: &str, commands: &[String]) -> String {
    format!("ALTER {} {}{};", type_keyword(kind, false), type_name, block(commands))
}

fn alter_pointer(path: &PointerPath, command: &str) -> String {
    let inner = format!(
        "ALTER {} {}{}",
        path.kind.keyword(),
        path.name,
        block(&[command.to_string()])
    );
    alter_type(TypeKind::Object, &path.type_name, &[inner])
}

fn create_pointer(pointer: &PointerDef) -> String {
    let mut decl = String::from("CREATE ");
    if pointer.required {
        decl.push_str("REQUIRED ");
    }
    if pointer.cardinality == Cardinality::Multi {
        decl.push_str("MULTI ");
    }
    decl.push_str(&format!(
        "{} {}: {}",
        pointer.kind.keyword(),
        pointer.name,
        pointer.target
    ));

    let mut body = Vec::new();
    if let Some(expr) = &pointer.default {
        body.push(format!("SET default := {}", expr));
    }
    if pointer.exclusive {
        body.push("CREATE CONSTRAINT exclusive".to_string());
    }
    decl.push_str(&block(&body));
    decl
}

fn create_constraint(constraint: &ConstraintDef) -> String {
    format!("CREATE CONSTRAINT exclusive ON {}", constraint.subject_expr())
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}
