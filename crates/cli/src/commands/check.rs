use std::path::Path;

use lineage_core::CompileOptions;
use serde_json::json;

use crate::{exit_with_schema_error, load_or_exit, OutputFormat};

/// Run the whole pipeline and report what it found, without emitting the
/// interchange document.
pub(crate) fn cmd_check(config: &Path, output: OutputFormat, quiet: bool) {
    let schema = load_or_exit(config, output, quiet);
    let compilation = match lineage_core::compile(&schema, &CompileOptions::default()) {
        Ok(c) => c,
        Err(e) => exit_with_schema_error(&e, output, quiet),
    };

    let chain = &compilation.chain;
    let graph = &compilation.graph;
    let plan = &compilation.plan;
    let versioned = graph.nodes().iter().filter(|n| n.has_version()).count();

    match output {
        OutputFormat::Json => {
            let versions: Vec<_> = chain
                .iter()
                .map(|v| {
                    json!({
                        "name": v.name,
                        "transformations": v.transformations.len(),
                        "changed": graph.changed_at(v.index).map_or(0, |c| c.len()),
                    })
                })
                .collect();
            let summary = json!({
                "status": "ok",
                "current_version": chain.current().name,
                "versions": versions,
                "nodes": graph.nodes().len(),
                "versioned_nodes": versioned,
                "upgrades": plan.paths.len(),
                "references": plan.references.len(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .unwrap_or_else(|e| format!("serialization error: {}", e))
            );
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            println!(
                "ok: {} versions, current '{}'",
                chain.len(),
                chain.current().name
            );
            for version in chain.iter() {
                let changed = graph.changed_at(version.index).map_or(0, |c| c.len());
                println!(
                    "  {:<16} {} transformations, {} types change after",
                    version.name,
                    version.transformations.len(),
                    changed
                );
            }
            println!(
                "{} nodes ({} versioned), {} upgrade paths, {} code references",
                graph.nodes().len(),
                versioned,
                plan.paths.len(),
                plan.references.len()
            );
        }
    }
}
