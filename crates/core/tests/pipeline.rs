//! End-to-end compilation scenarios: the worked examples of the insert,
//! move, rejection and structural-sharing behaviour.

use lineage_core::pass5_upgrade::{
    FieldOperation, RefId, UpgradeBody, UpgradeContext, ValueExpr,
};
use lineage_core::{
    compile, load_config_str, CompileOptions, ConfigFormat, ErrorCategory, SchemaConfig,
    SchemaError, TypeRef, VersionedTypeRef,
};

fn config(json: &str) -> SchemaConfig {
    load_config_str(json, ConfigFormat::Json).unwrap()
}

fn field_names(c: &lineage_core::Compilation, name: &str, version: usize) -> Vec<String> {
    c.graph
        .node_at(name, version)
        .unwrap()
        .fields()
        .iter()
        .map(|f| f.name.clone())
        .collect()
}

fn assignments(
    c: &lineage_core::Compilation,
    name: &str,
    from: usize,
) -> Vec<(String, ValueExpr)> {
    match &c.plan.path(name, from).unwrap().body {
        UpgradeBody::Record { assignments, .. } => assignments
            .iter()
            .map(|a| (a.field.clone(), a.value.clone()))
            .collect(),
        other => panic!("expected a record upgrade, got {:?}", other),
    }
}

#[test]
fn insert_example() {
    let c = compile(
        &config(
            r#"{
                "current_version": "V1",
                "base_types": { "Point": { "fields": { "x": "int", "y": "int" } } },
                "versions": {
                    "V0": {},
                    "V1": { "previous": "V0", "transformations": [
                        { "kind": "insert", "type": "Point", "to": "z", "field_type": "int",
                          "initializer": "geo.ZeroInit" } ] }
                }
            }"#,
        ),
        &CompileOptions::default(),
    )
    .unwrap();

    assert_eq!(field_names(&c, "Point", 1), vec!["x", "y", "z"]);
    assert_eq!(field_names(&c, "Point", 0), vec!["x", "y"]);
    let init = ValueExpr::Initialize {
        initializer: RefId(0),
        context: UpgradeContext::None,
    };
    assert_eq!(
        assignments(&c, "Point", 0),
        vec![
            ("x".to_owned(), ValueExpr::OldField("x".into())),
            ("y".to_owned(), ValueExpr::OldField("y".into())),
            ("z".to_owned(), init),
        ]
    );
}

#[test]
fn move_example() {
    let c = compile(
        &config(
            r#"{
                "current_version": "V1",
                "base_types": { "User": { "fields": { "name": "string", "age": "int" } } },
                "versions": {
                    "V0": {},
                    "V1": { "previous": "V0", "transformations": [
                        { "kind": "move", "type": "User", "from": "age", "to": "years" } ] }
                }
            }"#,
        ),
        &CompileOptions::sequential(),
    )
    .unwrap();

    assert_eq!(field_names(&c, "User", 1), vec!["name", "years"]);
    let mapped = assignments(&c, "User", 0);
    assert_eq!(mapped[1], ("years".to_owned(), ValueExpr::OldField("age".into())));
}

#[test]
fn unknown_transformation_target_is_rejected() {
    let err = compile(
        &config(
            r#"{
                "current_version": "V1",
                "base_types": { "User": { "fields": { "name": "string" } } },
                "versions": {
                    "V0": {},
                    "V1": { "previous": "V0", "transformations": [
                        { "kind": "remove", "type": "Ghost", "from": "name" } ] }
                }
            }"#,
        ),
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnknownTypeReference);
    assert!(matches!(err, SchemaError::UnknownType { ref name, .. } if name == "Ghost"));
}

#[test]
fn dedup_example() {
    let c = compile(
        &config(
            r#"{
                "current_version": "V2",
                "base_types": {
                    "A": { "fields": { "x": "int" } },
                    "B": { "fields": { "label": "string" } },
                    "C": { "fields": { "a": "A" } }
                },
                "versions": {
                    "V0": {},
                    "V1": { "previous": "V0", "transformations": [
                        { "kind": "convert", "type": "A", "from": "x", "new_type": "long",
                          "converter": "acme.Widen" } ] },
                    "V2": { "previous": "V1", "changelog": "no shape changes" }
                }
            }"#,
        ),
        &CompileOptions { workers: 4 },
    )
    .unwrap();
    let g = &c.graph;
    let id = |name: &str, v: usize| g.node_at(name, v).unwrap().id;

    assert_eq!(id("B", 0), id("B", 1));
    assert_eq!(id("B", 1), id("B", 2));

    for name in ["A", "C"] {
        assert_ne!(id(name, 0), id(name, 1), "{}", name);
        assert_eq!(id(name, 1), id(name, 2), "{}", name);
    }
    assert_eq!(g.node_at("C", 0).unwrap().fields()[0].target, id("A", 0));
    assert_eq!(g.node_at("C", 2).unwrap().fields()[0].target, id("A", 2));

    let distinct_nodes = g.nodes().iter().filter(|n| n.name == "C").count();
    assert_eq!(distinct_nodes, 2);
    assert_eq!(c.plan.paths_for("C").count(), 1);
    assert_eq!(c.plan.paths_for("B").count(), 0);

    let upgraded = assignments(&c, "C", 0);
    assert_eq!(
        upgraded[0].1,
        ValueExpr::Upgrade {
            wrapper: lineage_core::Modifier::Plain,
            from: VersionedTypeRef::new("A", Some(0)),
            steps: vec![VersionedTypeRef::new("A", Some(2))],
            input: Box::new(ValueExpr::OldField("a".into())),
        }
    );
}

#[test]
fn interface_fields_must_survive_to_current() {
    let err = compile(
        &config(
            r#"{
                "current_version": "V1",
                "interfaces": { "Named": { "fields": { "name": "string" } } },
                "base_types": { "User": { "implements": ["Named"], "fields": { "name": "string" } } },
                "versions": {
                    "V0": {},
                    "V1": { "previous": "V0", "transformations": [
                        { "kind": "convert", "type": "User", "from": "name", "new_type": "-string",
                          "converter": "acme.Optional" } ] }
                }
            }"#,
        ),
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::FieldOperationConflict);
    assert!(err.to_string().contains("'-string'"), "{}", err);
}

#[test]
fn toml_configuration_compiles() {
    let text = r#"
current_version = "v2"

[base_types.Order.fields]
id = "long"
lines = "Line[]"

[base_types.Line.fields]
sku = "string"
qty = "int"

[versions.v1]

[versions.v2]
previous = "v1"

[[versions.v2.transformations]]
kind = "insert"
type = "Line"
to = "note"
field_type = "-string"
initializer = "shop.Defaults#NO_NOTE"
index = 1
"#;
    let cfg = load_config_str(text, ConfigFormat::Toml).unwrap();
    let c = compile(&cfg, &CompileOptions::default()).unwrap();
    assert_eq!(field_names(&c, "Line", 1), vec!["sku", "note", "qty"]);
    let order = c.graph.node_at("Order", 0).unwrap();
    assert_eq!(order.fields()[1].type_ref, TypeRef::array("Line"));
    assert_eq!(c.graph.labels("Order").unwrap(), vec![0, 1]);
    assert_eq!(c.graph.labels("§Line").unwrap(), vec![0, 1]);
}

fn operations(c: &lineage_core::Compilation, name: &str, from: usize) -> Vec<FieldOperation> {
    match &c.plan.path(name, from).unwrap().body {
        UpgradeBody::Record { operations, .. } => operations.clone(),
        other => panic!("expected a record upgrade, got {:?}", other),
    }
}

#[test]
fn field_inserted_then_removed_in_one_version() {
    let c = compile(
        &config(
            r#"{
                "current_version": "v1",
                "base_types": {
                    "A": { "fields": { "x": "int" } },
                    "P": { "fields": { "x": "int" } }
                },
                "versions": {
                    "v0": {},
                    "v1": { "previous": "v0", "transformations": [
                        { "kind": "insert", "type": "P", "to": "tmp", "field_type": "-A",
                          "initializer": "k.None" },
                        { "kind": "remove", "type": "P", "from": "tmp" } ] }
                }
            }"#,
        ),
        &CompileOptions { workers: 2 },
    )
    .unwrap();

    assert_eq!(field_names(&c, "P", 1), vec!["x"]);
    let ops = operations(&c, "P", 0);
    assert!(ops.contains(&FieldOperation::Insert {
        field: "tmp".into(),
        initializer: RefId(0),
    }));
    assert!(ops.contains(&FieldOperation::Remove { field: "tmp".into() }));
    assert_eq!(
        assignments(&c, "P", 0),
        vec![("x".to_owned(), ValueExpr::OldField("x".into()))]
    );
}

#[test]
fn field_converted_then_removed_in_one_version() {
    let c = compile(
        &config(
            r#"{
                "current_version": "v1",
                "base_types": { "P": { "fields": { "x": "int", "y": "int" } } },
                "versions": {
                    "v0": {},
                    "v1": { "previous": "v0", "transformations": [
                        { "kind": "convert", "type": "P", "from": "x", "new_type": "string[]",
                          "converter": "k.Split" },
                        { "kind": "remove", "type": "P", "from": "x" } ] }
                }
            }"#,
        ),
        &CompileOptions::sequential(),
    )
    .unwrap();

    assert_eq!(field_names(&c, "P", 1), vec!["y"]);
    assert_eq!(c.plan.references.len(), 1);
    assert_eq!(
        assignments(&c, "P", 0),
        vec![("y".to_owned(), ValueExpr::OldField("y".into()))]
    );
}

#[test]
fn inserted_field_moved_then_converted_in_one_version() {
    let c = compile(
        &config(
            r#"{
                "current_version": "v1",
                "base_types": {
                    "A": { "fields": { "x": "int" } },
                    "P": { "fields": { "x": "int" } }
                },
                "versions": {
                    "v0": {},
                    "v1": { "previous": "v0", "transformations": [
                        { "kind": "insert", "type": "P", "to": "n", "field_type": "int",
                          "initializer": "k.Zero" },
                        { "kind": "move", "type": "P", "from": "n", "to": "count", "index": 0 },
                        { "kind": "convert", "type": "P", "from": "count", "new_type": "-A",
                          "converter": "k.Wrap" } ] }
                }
            }"#,
        ),
        &CompileOptions::default(),
    )
    .unwrap();

    assert_eq!(field_names(&c, "P", 1), vec!["count", "x"]);
    let mapped = assignments(&c, "P", 0);
    assert_eq!(
        mapped[0].1,
        ValueExpr::Convert {
            converter: RefId(1),
            context: UpgradeContext::None,
            input: Box::new(ValueExpr::Initialize {
                initializer: RefId(0),
                context: UpgradeContext::None,
            }),
        }
    );
    assert_eq!(mapped[1], ("x".to_owned(), ValueExpr::OldField("x".into())));
}

#[test]
fn output_is_independent_of_worker_count() {
    let cfg = config(
        r#"{
            "current_version": "c",
            "base_types": {
                "P": { "fields": { "x": "int" } },
                "Q": { "fields": { "p": "-P", "ps": "P[]" } },
                "R": { "fields": { "q": "Q" } }
            },
            "super_types": { "Any": ["P", "Q", "R"] },
            "versions": {
                "a": {},
                "b": { "previous": "a", "transformations": [
                    { "kind": "insert", "type": "P", "to": "y", "field_type": "int", "initializer": "k.Zero" } ] },
                "c": { "previous": "b", "transformations": [
                    { "kind": "remove", "type": "Q", "from": "ps" } ] }
            }
        }"#,
    );
    let one = compile(&cfg, &CompileOptions::sequential()).unwrap().to_json();
    let many = compile(&cfg, &CompileOptions { workers: 8 }).unwrap().to_json();
    assert_eq!(one, many);
}
