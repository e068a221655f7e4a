//! Pass 6: Interchange JSON serialization -- the hand-off document for code
//! emitters: version chain, every distinct node, per-version node tables,
//! the code-reference registry and all upgrade paths.

use crate::graph::{TypeGraph, TypeKind, TypeNode};
use crate::model::{CodeRef, Modifier};
use crate::pass2_sequence::VersionChain;
use crate::pass5_upgrade::{
    ArmAction, FieldOperation, UpgradeBody, UpgradeContext, UpgradePath, UpgradePlan, ValueExpr,
};
use serde_json::{json, Map, Value};

pub fn serialize(chain: &VersionChain, graph: &TypeGraph, plan: &UpgradePlan) -> Value {
    let versions: Vec<Value> = chain
        .iter()
        .map(|v| {
            json!({
                "index": v.index,
                "name": v.name,
                "previous": v.previous,
                "current": v.is_current,
                "transformations": v.transformations.len(),
                "changelog": v.changelog,
            })
        })
        .collect();

    let nodes: Vec<Value> = graph.nodes().iter().map(serialize_node).collect();

    let tables: Vec<Value> = (0..graph.version_count())
        .map(|v| {
            let mut types = Map::new();
            for (name, id) in graph.table(v) {
                types.insert(name.to_owned(), json!(id.0));
            }
            json!({
                "version": chain.name_of(v),
                "types": Value::Object(types),
            })
        })
        .collect();

    let references: Vec<Value> = plan
        .references
        .iter()
        .enumerate()
        .map(|(id, r)| serialize_code_ref(id, r))
        .collect();

    let upgrades: Vec<Value> = plan.paths.iter().map(serialize_path).collect();

    json!({
        "lineage": crate::LINEAGE_FORMAT_VERSION,
        "current_version": chain.current().name,
        "versions": versions,
        "nodes": nodes,
        "tables": tables,
        "references": references,
        "upgrades": upgrades,
    })
}

pub fn serialize_node(node: &TypeNode) -> Value {
    let mut obj = Map::new();
    obj.insert("id".to_owned(), json!(node.id.0));
    obj.insert("name".to_owned(), json!(node.name));
    obj.insert("version".to_owned(), json!(node.version));
    obj.insert("kind".to_owned(), json!(node.kind.name()));
    match &node.kind {
        TypeKind::Base { fields } => {
            let fields: Vec<Value> = fields
                .iter()
                .map(|f| {
                    json!({
                        "name": f.name,
                        "type": f.type_ref.canonical(),
                        "target": f.target.0,
                    })
                })
                .collect();
            obj.insert("fields".to_owned(), Value::Array(fields));
        }
        TypeKind::Super { members } => {
            let members: Vec<Value> = members
                .iter()
                .map(|m| {
                    json!({
                        "discriminant": m.discriminant,
                        "name": m.name,
                        "target": m.target.0,
                    })
                })
                .collect();
            obj.insert("members".to_owned(), Value::Array(members));
        }
        TypeKind::Custom { class, serializer } => {
            obj.insert("class".to_owned(), json!(class.to_string()));
            obj.insert("serializer".to_owned(), json!(serializer.to_string()));
        }
        TypeKind::Native(kind) => {
            obj.insert("native".to_owned(), json!(kind.name()));
        }
        TypeKind::Nullable { of } | TypeKind::Array { of } => {
            obj.insert("of".to_owned(), json!(of.0));
        }
    }
    Value::Object(obj)
}

fn serialize_code_ref(id: usize, r: &CodeRef) -> Value {
    match r {
        CodeRef::Construct { path } => json!({
            "id": id,
            "kind": "construct",
            "path": path,
        }),
        CodeRef::StaticField { owner, field } => json!({
            "id": id,
            "kind": "static_field",
            "owner": owner,
            "field": field,
        }),
    }
}

pub fn serialize_path(path: &UpgradePath) -> Value {
    let mut obj = Map::new();
    obj.insert("type".to_owned(), json!(path.type_name));
    obj.insert("from".to_owned(), json!(path.from.to_string()));
    obj.insert("to".to_owned(), json!(path.to.to_string()));
    match &path.body {
        UpgradeBody::Record {
            operations,
            assignments,
        } => {
            obj.insert("kind".to_owned(), json!("record"));
            let ops: Vec<Value> = operations.iter().map(serialize_operation).collect();
            obj.insert("operations".to_owned(), Value::Array(ops));
            let assigned: Vec<Value> = assignments
                .iter()
                .map(|a| {
                    json!({
                        "field": a.field,
                        "type": a.type_ref.canonical(),
                        "value": serialize_expr(&a.value),
                    })
                })
                .collect();
            obj.insert("assignments".to_owned(), Value::Array(assigned));
        }
        UpgradeBody::Union { arms } => {
            obj.insert("kind".to_owned(), json!("union"));
            let arms: Vec<Value> = arms
                .iter()
                .map(|arm| {
                    let action = match &arm.action {
                        ArmAction::PassThrough => json!({ "op": "pass_through" }),
                        ArmAction::Upgrade(steps) => json!({
                            "op": "upgrade",
                            "steps": steps.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
                        }),
                    };
                    json!({
                        "discriminant": arm.discriminant,
                        "member": arm.member,
                        "from": arm.from.to_string(),
                        "to": arm.to.to_string(),
                        "action": action,
                    })
                })
                .collect();
            obj.insert("arms".to_owned(), Value::Array(arms));
        }
    }
    Value::Object(obj)
}

fn serialize_operation(op: &FieldOperation) -> Value {
    match op {
        FieldOperation::Carry { field } => json!({ "op": "carry", "field": field }),
        FieldOperation::Move { from, to } => json!({ "op": "move", "from": from, "to": to }),
        FieldOperation::Remove { field } => json!({ "op": "remove", "field": field }),
        FieldOperation::Insert { field, initializer } => {
            json!({ "op": "insert", "field": field, "initializer": initializer.0 })
        }
        FieldOperation::Convert { field, converter } => {
            json!({ "op": "convert", "field": field, "converter": converter.0 })
        }
        FieldOperation::Upgrade { field, steps } => json!({
            "op": "upgrade",
            "field": field,
            "steps": steps.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        }),
    }
}

fn serialize_expr(expr: &ValueExpr) -> Value {
    match expr {
        ValueExpr::OldField(field) => json!({ "op": "old_field", "field": field }),
        ValueExpr::Convert {
            converter,
            context,
            input,
        } => json!({
            "op": "convert",
            "converter": converter.0,
            "context": serialize_context(context),
            "input": serialize_expr(input),
        }),
        ValueExpr::Initialize {
            initializer,
            context,
        } => json!({
            "op": "initialize",
            "initializer": initializer.0,
            "context": serialize_context(context),
        }),
        ValueExpr::Upgrade {
            wrapper,
            from,
            steps,
            input,
        } => json!({
            "op": "upgrade",
            "wrapper": modifier_name(*wrapper),
            "from": from.to_string(),
            "steps": steps.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            "input": serialize_expr(input),
        }),
    }
}

fn serialize_context(context: &UpgradeContext) -> Value {
    match context {
        UpgradeContext::None => Value::Null,
        UpgradeContext::Fields(fields) => Value::Array(
            fields
                .iter()
                .map(|f| json!({ "field": f.field, "type": f.type_ref.canonical() }))
                .collect(),
        ),
    }
}

fn modifier_name(m: Modifier) -> &'static str {
    match m {
        Modifier::Plain => "plain",
        Modifier::Nullable => "nullable",
        Modifier::Array => "array",
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::compile;
    use crate::config::{load_config_str, ConfigFormat};
    use crate::context::CompileOptions;

    const SCHEMA: &str = r#"{
        "current_version": "v1",
        "custom_types": { "Money": { "class": "acme.Money", "serializer": "acme.MoneyCodec" } },
        "base_types": {
            "Point": { "fields": { "x": "int", "y": "int" } },
            "Line": { "fields": { "from": "Point", "to": "-Point", "cost": "Money" } }
        },
        "super_types": { "Shape": ["Point", "Line"] },
        "versions": {
            "v0": { "changelog": "initial" },
            "v1": { "previous": "v0", "transformations": [
                { "kind": "insert", "type": "Point", "to": "z", "field_type": "int",
                  "initializer": "geo.Defaults#ZERO" } ] }
        }
    }"#;

    fn bundle() -> serde_json::Value {
        let cfg = load_config_str(SCHEMA, ConfigFormat::Json).unwrap();
        compile(&cfg, &CompileOptions::sequential())
            .unwrap()
            .to_json()
    }

    #[test]
    fn bundle_header_and_versions() {
        let b = bundle();
        assert_eq!(b["lineage"], crate::LINEAGE_FORMAT_VERSION);
        assert_eq!(b["current_version"], "v1");
        assert_eq!(b["versions"][0]["changelog"], "initial");
        assert_eq!(b["versions"][1]["previous"], "v0");
        assert_eq!(b["versions"][1]["current"], true);
        assert_eq!(b["references"][0]["kind"], "static_field");
        assert_eq!(b["references"][0]["owner"], "geo.Defaults");
    }

    #[test]
    fn tables_share_unchanged_nodes() {
        let b = bundle();
        let v0 = &b["tables"][0]["types"];
        let v1 = &b["tables"][1]["types"];
        assert_eq!(v0["Money"], v1["Money"]);
        assert_eq!(v0["int"], v1["int"]);
        assert_ne!(v0["Point"], v1["Point"]);
        assert_ne!(v0["-Point"], v1["-Point"]);
        let line = &b["nodes"][v0["Line"].as_u64().unwrap() as usize];
        assert_eq!(line["kind"], "base");
        assert_eq!(line["version"], 0);
        assert_eq!(line["fields"][1]["type"], "-Point");
        assert_eq!(line["fields"][1]["target"], v0["-Point"]);
    }

    #[test]
    fn upgrades_are_serialized_with_ops() {
        let b = bundle();
        let upgrades = b["upgrades"].as_array().unwrap();
        let point = upgrades.iter().find(|u| u["type"] == "Point").unwrap();
        assert_eq!(point["kind"], "record");
        assert_eq!(point["from"], "Point@0");
        assert_eq!(point["assignments"][2]["value"]["op"], "initialize");
        assert_eq!(point["assignments"][2]["value"]["context"], serde_json::Value::Null);
        let line = upgrades.iter().find(|u| u["type"] == "Line").unwrap();
        assert_eq!(line["assignments"][1]["value"]["wrapper"], "nullable");
        let shape = upgrades.iter().find(|u| u["type"] == "Shape").unwrap();
        assert_eq!(shape["kind"], "union");
        assert_eq!(shape["arms"][0]["action"]["op"], "upgrade");
        assert_eq!(shape["arms"][1]["action"]["op"], "upgrade");
    }
}
