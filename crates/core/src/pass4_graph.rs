//! Pass 4: Type graph construction -- build every node of the current
//! version, then walk back one version at a time, allocating new nodes only
//! for the fixed-point closure of changed types and sharing everything else.
//!
//! Construction is two-phase at every version: identities are allocated and
//! bound sequentially, then node bodies are filled in parallel into
//! write-once arena slots, resolving references through the
//! [`DependencyIndex`].

use crate::context::RunContext;
use crate::error::SchemaError;
use crate::graph::{Field, Member, NodeId, TypeGraph, TypeKind, TypeNode};
use crate::index::{DependencyIndex, References};
use crate::model::{Modifier, TypeRef};
use crate::pass1_load::{SchemaDefinition, TypeCategory};
use crate::pass2_sequence::VersionChain;
use crate::pass3_replay::LayoutHistory;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// What a graph name stands for.
#[derive(Debug, Clone)]
enum Entry {
    Declared(TypeCategory),
    Wrapper(TypeRef),
}

struct Arena {
    slots: Vec<OnceLock<TypeNode>>,
}

impl Arena {
    fn alloc(&mut self) -> NodeId {
        self.slots.push(OnceLock::new());
        NodeId(self.slots.len() - 1)
    }

    fn fill(&self, node: TypeNode) -> Result<(), SchemaError> {
        let Some(slot) = self.slots.get(node.id.0) else {
            return Err(SchemaError::Internal(format!(
                "node {} was never allocated",
                node.id.0
            )));
        };
        slot.set(node)
            .map_err(|n| SchemaError::Internal(format!("node {} filled twice", n.id.0)))
    }

    fn into_nodes(self) -> Result<Vec<TypeNode>, SchemaError> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.into_inner()
                    .ok_or_else(|| SchemaError::Internal(format!("node {} never filled", i)))
            })
            .collect()
    }
}

struct Builder<'a> {
    def: &'a SchemaDefinition,
    history: &'a LayoutHistory,
    entries: BTreeMap<String, Entry>,
}

impl Builder<'_> {
    fn is_versioned(&self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(Entry::Declared(category)) => category.has_version(),
            Some(Entry::Wrapper(t)) => self.def.catalog.is_versioned(t),
            None => false,
        }
    }

    fn references(&self, name: &str, version: usize) -> Vec<String> {
        match self.entries.get(name) {
            Some(Entry::Declared(TypeCategory::Base)) => {
                let mut out: Vec<String> = Vec::new();
                for t in self.history.layout(version, name).into_iter().flat_map(|l| l.values()) {
                    let target = t.canonical();
                    if !out.contains(&target) {
                        out.push(target);
                    }
                }
                out
            }
            Some(Entry::Declared(TypeCategory::Super)) => {
                self.def.super_types.get(name).cloned().unwrap_or_default()
            }
            Some(Entry::Wrapper(t)) => vec![t.name.clone()],
            _ => Vec::new(),
        }
    }

    /// Build the body of `name`'s node at `version`. Every reference it
    /// makes must already be bound at `version`.
    fn build(
        &self,
        index: &DependencyIndex,
        name: &str,
        version: usize,
        id: NodeId,
    ) -> Result<TypeNode, SchemaError> {
        let kind = match self.entries.get(name) {
            Some(Entry::Declared(TypeCategory::Base)) => {
                let Some(layout) = self.history.layout(version, name) else {
                    return Err(SchemaError::Internal(format!(
                        "no layout for '{}' at version {}",
                        name, version
                    )));
                };
                let fields = layout
                    .iter()
                    .map(|(field, t)| {
                        Ok(Field {
                            name: field.clone(),
                            type_ref: t.clone(),
                            target: index.resolve(&t.canonical(), version)?,
                        })
                    })
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                TypeKind::Base { fields }
            }
            Some(Entry::Declared(TypeCategory::Super)) => {
                let members = self
                    .def
                    .super_types
                    .get(name)
                    .into_iter()
                    .flatten()
                    .enumerate()
                    .map(|(i, member)| {
                        Ok(Member {
                            discriminant: i as u32,
                            name: member.clone(),
                            target: index.resolve(member, version)?,
                        })
                    })
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                TypeKind::Super { members }
            }
            Some(Entry::Declared(TypeCategory::Custom)) => {
                let Some(decl) = self.def.custom_types.get(name) else {
                    return Err(SchemaError::unknown_type(name, "the type graph"));
                };
                TypeKind::Custom {
                    class: decl.class.clone(),
                    serializer: decl.serializer.clone(),
                }
            }
            Some(Entry::Declared(TypeCategory::Native(kind))) => TypeKind::Native(*kind),
            Some(Entry::Wrapper(t)) => {
                let of = index.resolve(&t.name, version)?;
                match t.modifier {
                    Modifier::Nullable => TypeKind::Nullable { of },
                    Modifier::Array => TypeKind::Array { of },
                    Modifier::Plain => {
                        return Err(SchemaError::Internal(format!(
                            "wrapper '{}' without a modifier",
                            name
                        )))
                    }
                }
            }
            None => return Err(SchemaError::unknown_type(name, "the type graph")),
        };
        Ok(TypeNode {
            id,
            name: name.to_owned(),
            version: self.is_versioned(name).then_some(version),
            kind,
        })
    }
}

pub fn build_type_graph(
    ctx: &RunContext,
    def: &SchemaDefinition,
    chain: &VersionChain,
    history: &LayoutHistory,
) -> Result<TypeGraph, SchemaError> {
    let count = chain.len();
    if count == 0 || history.version_count() != count {
        return Err(SchemaError::Internal(format!(
            "layout history covers {} versions but the chain has {}",
            history.version_count(),
            count
        )));
    }
    let current = count - 1;

    let mut entries: BTreeMap<String, Entry> = def
        .catalog
        .iter()
        .map(|(name, category)| (name.to_owned(), Entry::Declared(category)))
        .collect();
    // Wrappers from every version, so that a field removed later still
    // resolves historically. Types introduced by a transformation count
    // even when a later step of the same version drops the field again.
    let snapshot_types = (0..count)
        .flat_map(|v| history.snapshots(v))
        .flat_map(|snapshot| snapshot.fields.values());
    let introduced_types = chain
        .iter()
        .flat_map(|version| &version.transformations)
        .filter_map(|step| step.introduced_type());
    let interface_types = def
        .interfaces
        .values()
        .flat_map(|decl| decl.fields.values());
    for t in snapshot_types
        .chain(introduced_types)
        .chain(interface_types)
        .filter(|t| t.is_wrapped())
    {
        entries
            .entry(t.canonical())
            .or_insert_with(|| Entry::Wrapper(t.clone()));
    }
    let builder = Builder {
        def,
        history,
        entries,
    };
    let names: Vec<&str> = builder.entries.keys().map(String::as_str).collect();

    let references: Vec<References> = (0..count)
        .map(|v| {
            names
                .iter()
                .map(|name| (name.to_string(), builder.references(name, v)))
                .collect()
        })
        .collect();
    let index = DependencyIndex::new(references);
    let mut arena = Arena { slots: Vec::new() };
    let mut changed: Vec<BTreeSet<String>> = vec![BTreeSet::new(); count];

    // Current version: one node per name.
    let mut jobs: Vec<(&str, NodeId)> = Vec::with_capacity(names.len());
    for name in &names {
        let id = arena.alloc();
        index.bind(name, current, id)?;
        jobs.push((name, id));
    }
    ctx.for_each(&jobs, |(name, id)| {
        arena.fill(builder.build(&index, name, current, *id)?)
    })?;

    for v in (0..current).rev() {
        let seed: Vec<&str> = history
            .snapshots(v)
            .filter(|s| s.differs_from_next)
            .map(|s| s.type_name.as_str())
            .collect();
        let closed = close_over_dependents(&index, &seed, v + 1);

        jobs.clear();
        for name in &names {
            if closed.contains(*name) {
                let id = arena.alloc();
                index.bind(name, v, id)?;
                jobs.push((name, id));
            } else {
                index.resolve_or_bind(name, v, || index.resolve(name, v + 1))?;
            }
        }
        ctx.for_each(&jobs, |(name, id)| {
            arena.fill(builder.build(&index, name, v, *id)?)
        })?;

        tracing::debug!(
            version = %chain.name_of(v),
            seeded = seed.len(),
            changed = closed.len(),
            "resolved changed set"
        );
        changed[v] = closed;
    }

    let nodes = arena.into_nodes()?;
    let graph = TypeGraph::new(nodes, index, changed);
    check_discriminants(&graph)?;

    tracing::info!(
        nodes = graph.nodes().len(),
        versions = count,
        "built type graph"
    );
    Ok(graph)
}

/// Fixed-point closure of `seed` under "referenced by" at `version`.
fn close_over_dependents(
    index: &DependencyIndex,
    seed: &[&str],
    version: usize,
) -> BTreeSet<String> {
    let mut closed: BTreeSet<String> = seed.iter().map(|s| s.to_string()).collect();
    let mut pending: Vec<String> = closed.iter().cloned().collect();
    while let Some(name) = pending.pop() {
        for dependent in index.dependents(&name, version) {
            if closed.insert(dependent.clone()) {
                pending.push(dependent.clone());
            }
        }
    }
    closed
}

/// Super-type members keep the discriminant they were introduced with, and
/// member lists only grow.
pub fn check_discriminants(graph: &TypeGraph) -> Result<(), SchemaError> {
    for node in graph.nodes() {
        let TypeKind::Super { members } = &node.kind else {
            continue;
        };
        let Some(next) = graph.successor(node)? else {
            continue;
        };
        let later = next.members();
        for member in members {
            let after = later
                .iter()
                .find(|m| m.name == member.name)
                .map(|m| m.discriminant);
            match after {
                Some(after) if after == member.discriminant => {}
                Some(after) => {
                    return Err(SchemaError::DiscriminantRenumbered {
                        super_type: node.name.clone(),
                        member: member.name.clone(),
                        before: member.discriminant,
                        after,
                        version: next.version.unwrap_or_default(),
                    })
                }
                None => {
                    return Err(SchemaError::Internal(format!(
                        "super type '{}' drops member '{}' after version {}",
                        node.name,
                        member.name,
                        node.version.unwrap_or_default()
                    )))
                }
            }
        }
    }
    Ok(())
}
