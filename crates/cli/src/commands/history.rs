use std::path::Path;

use lineage_core::pass6_serialize::{serialize_node, serialize_path};
use lineage_core::pass5_upgrade::{ArmAction, UpgradeBody};
use lineage_core::{CompileOptions, TypeKind, TypeNode, TypeRef};
use serde_json::json;

use crate::{exit_with_schema_error, load_or_exit, OutputFormat};

/// A node together with the run of versions it is in force for.
struct Span<'a> {
    node: &'a TypeNode,
    versions: Vec<&'a str>,
}

pub(crate) fn cmd_history(config: &Path, type_name: &str, output: OutputFormat, quiet: bool) {
    let schema = load_or_exit(config, output, quiet);
    let compilation = match lineage_core::compile(&schema, &CompileOptions::default()) {
        Ok(c) => c,
        Err(e) => exit_with_schema_error(&e, output, quiet),
    };
    let name = match TypeRef::parse(type_name) {
        Ok(r) => r.canonical(),
        Err(e) => exit_with_schema_error(&e, output, quiet),
    };

    let graph = &compilation.graph;
    let mut spans: Vec<Span> = Vec::new();
    for version in compilation.chain.iter() {
        let node = match graph.node_at(&name, version.index) {
            Ok(n) => n,
            Err(e) => exit_with_schema_error(&e, output, quiet),
        };
        match spans.last_mut() {
            Some(span) if span.node.id == node.id => span.versions.push(version.name.as_str()),
            _ => spans.push(Span {
                node,
                versions: vec![version.name.as_str()],
            }),
        }
    }
    let upgrades: Vec<_> = compilation.plan.paths_for(&name).collect();

    match output {
        OutputFormat::Json => {
            let nodes: Vec<_> = spans
                .iter()
                .map(|s| json!({ "versions": s.versions, "node": serialize_node(s.node) }))
                .collect();
            let paths: Vec<_> = upgrades.iter().map(|p| serialize_path(p)).collect();
            let doc = json!({ "type": name, "nodes": nodes, "upgrades": paths });
            println!(
                "{}",
                serde_json::to_string_pretty(&doc)
                    .unwrap_or_else(|e| format!("serialization error: {}", e))
            );
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            if let Some(first) = spans.first() {
                println!("{} ({})", name, first.node.kind.name());
            }
            for span in &spans {
                let covered = match span.versions.as_slice() {
                    [only] => (*only).to_owned(),
                    [first, .., last] => format!("{} .. {}", first, last),
                    [] => String::new(),
                };
                println!(
                    "  {:<20} {:<24} {}",
                    span.node.identity().to_string(),
                    covered,
                    shape(graph, span.node)
                );
            }
            for path in upgrades {
                println!("  upgrade {} -> {}: {}", path.from, path.to, steps(&path.body));
            }
        }
    }
}

/// One-line description of a node's shape.
fn shape(graph: &lineage_core::TypeGraph, node: &TypeNode) -> String {
    match &node.kind {
        TypeKind::Base { fields } => {
            let names: Vec<String> = fields
                .iter()
                .map(|f| format!("{}: {}", f.name, f.type_ref))
                .collect();
            format!("{{ {} }}", names.join(", "))
        }
        TypeKind::Super { members } => {
            let names: Vec<String> = members
                .iter()
                .map(|m| format!("{}={}", m.discriminant, graph.node(m.target).identity()))
                .collect();
            format!("[{}]", names.join(", "))
        }
        TypeKind::Custom { class, .. } => class.to_string(),
        TypeKind::Native(kind) => kind.name().to_owned(),
        TypeKind::Nullable { of } | TypeKind::Array { of } => {
            format!("of {}", graph.node(*of).identity())
        }
    }
}

fn steps(body: &UpgradeBody) -> String {
    match body {
        UpgradeBody::Record { operations, .. } => format!("{} field operations", operations.len()),
        UpgradeBody::Union { arms } => {
            let upgraded = arms
                .iter()
                .filter(|a| matches!(a.action, ArmAction::Upgrade(_)))
                .count();
            format!("{} arms, {} upgraded", arms.len(), upgraded)
        }
    }
}
