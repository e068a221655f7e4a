#![allow(clippy::result_large_err)]
//! lineage-core: Lineage schema-evolution compiler core library.
//!
//! Provides the six-pass pipeline from a versioned schema configuration to
//! a resolved, version-indexed type graph plus the upgrade paths between
//! consecutive shapes of every changed type.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`compile()`] -- run the full pipeline
//! - [`SchemaConfig`] -- configuration document model
//! - [`VersionChain`] -- ordered versions (Pass 2 output)
//! - [`LayoutHistory`] -- per-version field layouts (Pass 3 output)
//! - [`TypeGraph`] -- resolved type nodes (Pass 4 output)
//! - [`UpgradePlan`] -- derived upgrade paths (Pass 5 output)
//! - [`SchemaError`] -- compilation error type
//!
//! Individual pass entry functions are also re-exported for selective
//! pipeline execution.

/// Interchange document format version (the `"lineage"` field).
pub const LINEAGE_FORMAT_VERSION: &str = "1.0";

pub mod compile;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod index;
pub mod model;
pub mod pass1_load;
pub mod pass2_sequence;
pub mod pass3_replay;
pub mod pass4_graph;
pub mod pass5_upgrade;
pub mod pass6_serialize;

// ── Convenience re-exports: key types ────────────────────────────────

pub use compile::Compilation;
pub use config::{load_config_str, ConfigError, ConfigFormat, SchemaConfig};
pub use context::{CompileOptions, RunContext};
pub use error::{ErrorCategory, SchemaError};
pub use graph::{NodeId, TypeGraph, TypeKind, TypeNode};
pub use index::DependencyIndex;
pub use model::{CodeRef, Modifier, NativeKind, Transformation, TypeRef, VersionedTypeRef};
pub use pass2_sequence::VersionChain;
pub use pass3_replay::LayoutHistory;
pub use pass5_upgrade::UpgradePlan;

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use compile::compile;
pub use pass1_load::load_definition;
pub use pass2_sequence::sequence_versions;
pub use pass3_replay::replay_transformations;
pub use pass4_graph::build_type_graph;
pub use pass5_upgrade::derive_upgrades;
pub use pass6_serialize::serialize;
