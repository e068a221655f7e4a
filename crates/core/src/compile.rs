//! Six-pass compiler: schema configuration -> resolved type graph and
//! upgrade plan.
//!
//! This is a thin orchestrator that calls each pass module in order.

use crate::config::SchemaConfig;
use crate::context::{CompileOptions, RunContext};
use crate::error::SchemaError;
use crate::graph::TypeGraph;
use crate::pass1_load::{self, SchemaDefinition};
use crate::pass2_sequence::{self, VersionChain};
use crate::pass3_replay::{self, LayoutHistory};
use crate::pass4_graph;
use crate::pass5_upgrade::{self, UpgradePlan};
use crate::pass6_serialize;
use serde_json::Value;

/// Everything a run produces. Read-only once built.
#[derive(Debug)]
pub struct Compilation {
    pub definition: SchemaDefinition,
    pub chain: VersionChain,
    pub history: LayoutHistory,
    pub graph: TypeGraph,
    pub plan: UpgradePlan,
}

impl Compilation {
    /// Interchange JSON (pass 6).
    pub fn to_json(&self) -> Value {
        pass6_serialize::serialize(&self.chain, &self.graph, &self.plan)
    }
}

/// Compile the given configuration, or return the first error encountered.
pub fn compile(config: &SchemaConfig, options: &CompileOptions) -> Result<Compilation, SchemaError> {
    let ctx = RunContext::new(options.clone());

    // Pass 1: configuration validation
    let definition = pass1_load::load_definition(config)?;

    // Pass 2: version sequencing
    let chain = pass2_sequence::sequence_versions(&definition)?;

    // Pass 3: transformation replay, then interface conformance at current
    let history = pass3_replay::replay_transformations(&definition, &chain)?;
    pass3_replay::check_interfaces(&definition, &history, chain.current_index())?;

    // Pass 4: type graph
    let graph = pass4_graph::build_type_graph(&ctx, &definition, &chain, &history)?;

    // Pass 5: upgrade derivation
    let plan = pass5_upgrade::derive_upgrades(&ctx, &chain, &history, &graph)?;

    tracing::info!(
        versions = chain.len(),
        current = %chain.current().name,
        nodes = graph.nodes().len(),
        upgrades = plan.paths.len(),
        workers = ctx.options().workers,
        "compiled schema"
    );
    Ok(Compilation {
        definition,
        chain,
        history,
        graph,
        plan,
    })
}
