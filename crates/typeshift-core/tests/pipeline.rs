//! Integration tests for the diff, plan, emit and apply pipeline.

use typeshift_core::catalog::{ConstraintDef, PointerDef, SchemaSnapshot, SchemaSource, TypeDef};
use typeshift_core::migration::{
    apply, DiffOptions, EmptyDatabase, MigrationConfig, MigrationError, Migrator, Operation,
    OperationKind, PlannedStep, Planner, PlannerConfig, PlanningError, RenameHints, SchemaDiff,
    ScriptEmitter, Unprobed,
};
use typeshift_core::store::RevisionStore;

struct TestContext {
    old: SchemaSnapshot,
    new: SchemaSnapshot,
    options: DiffOptions,
}

impl TestContext {
    fn new(old: Vec<TypeDef>, new: Vec<TypeDef>) -> Self {
        Self {
            old: SchemaSnapshot::build(1, old).unwrap(),
            new: SchemaSnapshot::build(2, new).unwrap(),
            options: DiffOptions::default(),
        }
    }

    fn with_hints(mut self, hints: RenameHints) -> Self {
        self.options = self.options.with_hints(hints);
        self
    }

    fn diff(&self) -> Result<SchemaDiff, MigrationError> {
        SchemaDiff::compute_with(&self.old, &self.new, &self.options)
    }

    fn plan(
        &self,
        probe: &dyn typeshift_core::migration::DataProbe,
    ) -> Result<typeshift_core::migration::MigrationPlan, MigrationError> {
        let diff = self.diff()?;
        Planner::new(PlannerConfig::default().with_allow_destructive(true))
            .plan(&diff, &self.old, &self.new, probe)
    }
}

fn person(default: Option<&str>) -> TypeDef {
    let mut name = PointerDef::property("name", "str").required();
    name.default = default.map(String::from);
    TypeDef::object("Person")
        .abstract_type()
        .with_pointer(name)
        .with_pointer(PointerDef::property("email", "str").exclusive())
}

fn company_v1() -> Vec<TypeDef> {
    vec![
        person(Some("'unknown'")),
        TypeDef::object("Employee")
            .extending("Person")
            .with_pointer(PointerDef::property("name", "str").required())
            .with_pointer(PointerDef::property("salary", "int32"))
            .with_pointer(PointerDef::property("tags", "str").multi()),
        TypeDef::object("Team").with_pointer(PointerDef::property("label", "str")),
        TypeDef::object("Legacy").with_pointer(PointerDef::property("code", "str")),
        TypeDef::object("Badge").with_pointer(PointerDef::link("holder", "Employee")),
    ]
}

fn company_v2() -> Vec<TypeDef> {
    vec![
        person(Some("'unknown'")).with_pointer(PointerDef::property("nickname", "str")),
        TypeDef::object("Staff")
            .extending("Person")
            .with_pointer(PointerDef::property("salary", "int64"))
            .with_pointer(PointerDef::property("tags", "str"))
            .with_pointer(PointerDef::link("team", "Team")),
        TypeDef::object("Team")
            .with_pointer(PointerDef::property("label", "str"))
            .with_constraint(ConstraintDef::exclusive(["label"])),
        TypeDef::object("Badge").with_pointer(PointerDef::link("holder", "Staff")),
        TypeDef::object("Project")
            .with_pointer(PointerDef::property("title", "str").required())
            .with_pointer(PointerDef::link("lead", "Staff")),
    ]
}

fn company() -> TestContext {
    TestContext::new(company_v1(), company_v2())
        .with_hints(RenameHints::new().with_type("Employee", "Staff"))
}

#[test]
fn test_self_diff_is_empty() {
    let s = SchemaSnapshot::build(1, company_v1()).unwrap();

    assert!(SchemaDiff::compute(&s, &s).unwrap().is_empty());
}

#[test]
fn test_round_trip_reaches_target() {
    let ctx = company();
    let plan = ctx.plan(&EmptyDatabase).unwrap();
    let script = ScriptEmitter::emit(&plan);
    assert_eq!(script.statements.len(), plan.step_count());

    let applied = apply(&ctx.old, plan.operations(), ctx.new.revision()).unwrap();
    assert!(SchemaDiff::compute(&applied, &ctx.new).unwrap().is_empty());
    assert_eq!(applied.fingerprint(), ctx.new.fingerprint());
}

#[test]
fn test_plan_order() {
    let plan = company().plan(&EmptyDatabase).unwrap();
    let ops: Vec<&Operation> = plan.operations().collect();

    assert_eq!(ops[0].kind(), OperationKind::RenameType);

    let position = |kind: OperationKind, type_name: &str| {
        ops.iter()
            .position(|op| op.kind() == kind && op.type_name() == type_name)
            .unwrap()
    };
    assert!(position(OperationKind::CreateType, "Project") > 0);
    assert!(position(OperationKind::DropType, "Legacy") == ops.len() - 1);

    let guard = plan
        .steps
        .iter()
        .position(|s| matches!(s, PlannedStep::Guard(_)))
        .unwrap();
    assert!(matches!(
        &plan.steps[guard + 1],
        PlannedStep::Apply(Operation::AlterCardinality { .. })
    ));
}

#[test]
fn test_base_never_dropped_before_dependents() {
    let ctx = TestContext::new(
        vec![
            TypeDef::object("A"),
            TypeDef::object("B").extending("A"),
            TypeDef::object("C").extending("B"),
            TypeDef::object("Other").with_pointer(PointerDef::link("b", "B")),
        ],
        vec![TypeDef::object("Other")],
    );
    let plan = ctx.plan(&EmptyDatabase).unwrap();
    let order: Vec<String> = plan.operations().map(Operation::description).collect();

    let index = |needle: &str| order.iter().position(|d| d.ends_with(needle)).unwrap();
    assert!(index("Other.b") < index("type B"));
    assert!(index("type C") < index("type B"));
    assert!(index("type B") < index("type A"));
}

#[test]
fn test_narrowing_requires_check() {
    let ctx = TestContext::new(
        vec![TypeDef::object("User").with_pointer(PointerDef::property("tags", "str").multi())],
        vec![TypeDef::object("User").with_pointer(PointerDef::property("tags", "str"))],
    );

    assert!(matches!(
        ctx.plan(&Unprobed),
        Err(MigrationError::Planning(PlanningError::UncheckedNarrowing { .. }))
    ));
}

#[test]
fn test_removing_override_emits_single_default_change() {
    let json = |employee_override: bool| {
        let employee = if employee_override {
            r#"{"name": "Employee", "bases": ["Person"], "pointers": [
                {"name": "name", "target": "std::str", "required": true}
            ]}"#
        } else {
            r#"{"name": "Employee", "bases": ["Person"]}"#
        };
        format!(
            r#"{{"types": [
                {{"name": "Person", "abstract": true, "pointers": [
                    {{"name": "name", "target": "std::str", "required": true, "default": "'unknown'"}}
                ]}},
                {}
            ]}}"#,
            employee
        )
    };
    let old = SchemaSource::from_json(&json(true)).unwrap().build().unwrap();
    let new = SchemaSource::from_json(&json(false)).unwrap().build().unwrap();

    let diff = SchemaDiff::compute(&old, &new).unwrap();
    assert_eq!(diff.change_count(), 1);
    assert!(matches!(
        &diff.operations[0],
        Operation::AlterDefault { path, to: Some(expr), .. }
            if path.type_name == "Employee" && expr == "'unknown'"
    ));

    let plan = Planner::default().plan(&diff, &old, &new, &Unprobed).unwrap();
    assert_eq!(
        ScriptEmitter::emit(&plan).render(),
        "ALTER TYPE Employee { ALTER PROPERTY name { SET default := 'unknown'; }; };"
    );
}

#[test]
fn test_emit_is_deterministic() {
    let a = ScriptEmitter::emit(&company().plan(&EmptyDatabase).unwrap());
    let b = ScriptEmitter::emit(&company().plan(&EmptyDatabase).unwrap());

    assert_eq!(a.render(), b.render());
    assert_eq!(a.checksum, b.checksum);
}

#[test]
fn test_rename_swap_is_cycle() {
    let types = || {
        vec![
            TypeDef::object("A").with_pointer(PointerDef::property("name", "str")),
            TypeDef::object("B").with_pointer(PointerDef::property("name", "str")),
        ]
    };
    let ctx = TestContext::new(types(), types())
        .with_hints(RenameHints::new().with_type("A", "B").with_type("B", "A"));

    assert!(matches!(
        ctx.plan(&EmptyDatabase),
        Err(MigrationError::Planning(PlanningError::Cycle { .. }))
    ));
}

#[test]
fn test_snapshots_shared_across_threads() {
    let ctx = company();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| ctx.diff().unwrap().change_count()))
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(counts.windows(2).all(|w| w[0] == w[1]));
    });
}

#[test]
fn test_migrate_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = RevisionStore::open(dir.path()).unwrap();
    let config = MigrationConfig::default()
        .with_diff(DiffOptions::default().with_hints(RenameHints::new().with_type("Employee", "Staff")))
        .with_planner(PlannerConfig::default().with_allow_destructive(true));
    let migrator = Migrator::new(config);

    Migrator::default()
        .migrate(&store, SchemaSnapshot::build(0, company_v1()).unwrap(), &EmptyDatabase)
        .unwrap();
    let outcome = migrator
        .migrate(&store, SchemaSnapshot::build(0, company_v2()).unwrap(), &EmptyDatabase)
        .unwrap();

    let history = store.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].script, outcome.script.render());
    assert_eq!(
        store.current().unwrap().unwrap().fingerprint(),
        outcome.plan.to_fingerprint
    );
}
