//! The resolved, version-indexed type graph.
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`]. A type
//! that does not change between two versions maps to the same `NodeId` at
//! both. A node's `version` is the newest version it is in force for: the
//! version at which the backward walk from current introduced it. The node
//! in force at `v` is the one with the smallest label `>= v`.

use crate::error::SchemaError;
use crate::index::DependencyIndex;
use crate::model::{CodeRef, NativeKind, TypeRef, VersionedTypeRef};
use serde::Serialize;
use std::collections::BTreeSet;

/// Arena position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Declared reference, sigils included.
    pub type_ref: TypeRef,
    /// Node the reference resolves to at this node's version.
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Position in the member list at introduction. Never renumbered.
    pub discriminant: u32,
    pub name: String,
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Base { fields: Vec<Field> },
    Super { members: Vec<Member> },
    Custom { class: CodeRef, serializer: CodeRef },
    Native(NativeKind),
    Nullable { of: NodeId },
    Array { of: NodeId },
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Base { .. } => "base",
            TypeKind::Super { .. } => "super",
            TypeKind::Custom { .. } => "custom",
            TypeKind::Native(_) => "native",
            TypeKind::Nullable { .. } => "nullable",
            TypeKind::Array { .. } => "array",
        }
    }
}

/// An immutable concrete type instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    pub id: NodeId,
    /// Declared name, or the canonical sigil spelling for wrappers.
    pub name: String,
    /// `None` for version-less leaves and wrappers of them.
    pub version: Option<usize>,
    pub kind: TypeKind,
}

impl TypeNode {
    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    pub fn identity(&self) -> VersionedTypeRef {
        VersionedTypeRef::new(self.name.clone(), self.version)
    }

    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Base { fields } => fields,
            _ => &[],
        }
    }

    pub fn members(&self) -> &[Member] {
        match &self.kind {
            TypeKind::Super { members } => members,
            _ => &[],
        }
    }
}

#[derive(Debug)]
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
    index: DependencyIndex,
    /// Closed changed set per version. Empty at the current version.
    changed: Vec<BTreeSet<String>>,
}

impl TypeGraph {
    pub(crate) fn new(
        nodes: Vec<TypeNode>,
        index: DependencyIndex,
        changed: Vec<BTreeSet<String>>,
    ) -> Self {
        TypeGraph {
            nodes,
            index,
            changed,
        }
    }

    pub fn version_count(&self) -> usize {
        self.index.version_count()
    }

    pub fn current(&self) -> usize {
        self.version_count().saturating_sub(1)
    }

    /// Every distinct node, in allocation order.
    pub fn nodes(&self) -> &[TypeNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &TypeNode {
        &self.nodes[id.0]
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    /// The node in force for `name` at `version`.
    pub fn node_at(&self, name: &str, version: usize) -> Result<&TypeNode, SchemaError> {
        let id = self.index.resolve(name, version)?;
        Ok(self.node(id))
    }

    /// Look up a node by its exact identity. A versioned reference must name
    /// a version at which a distinct node was introduced.
    pub fn resolve(&self, r: &VersionedTypeRef) -> Result<&TypeNode, SchemaError> {
        let node = self.node_at(&r.name, r.version.unwrap_or(0))?;
        if node.version != r.version {
            return Err(SchemaError::TypeNotFound {
                name: r.name.clone(),
                version: r.version.unwrap_or(0),
            });
        }
        Ok(node)
    }

    /// Versions at which `name` has a distinct node, ascending. Empty for
    /// version-less types.
    pub fn labels(&self, name: &str) -> Result<Vec<usize>, SchemaError> {
        let mut out: Vec<usize> = Vec::new();
        for v in 0..self.version_count() {
            if let Some(label) = self.node_at(name, v)?.version {
                if out.last() != Some(&label) {
                    out.push(label);
                }
            }
        }
        Ok(out)
    }

    /// The node that replaces `node` in the next version, if the type
    /// changes again before the current version.
    pub fn successor(&self, node: &TypeNode) -> Result<Option<&TypeNode>, SchemaError> {
        match node.version {
            Some(v) if v < self.current() => self.node_at(&node.name, v + 1).map(Some),
            _ => Ok(None),
        }
    }

    /// Node identities visited when upgrading `name` from the node labelled
    /// `from` to the node labelled `to`, excluding the start.
    pub fn upgrade_chain(
        &self,
        name: &str,
        from: usize,
        to: usize,
    ) -> Result<Vec<VersionedTypeRef>, SchemaError> {
        let mut steps = Vec::new();
        let mut cursor = from;
        while cursor < to {
            let next = self.node_at(name, cursor + 1)?;
            let Some(label) = next.version else {
                break;
            };
            if label > to {
                return Err(SchemaError::Internal(format!(
                    "upgrade chain of '{}' skips past version {}",
                    name, to
                )));
            }
            steps.push(next.identity());
            cursor = label;
        }
        Ok(steps)
    }

    pub fn changed_at(&self, version: usize) -> Option<&BTreeSet<String>> {
        self.changed.get(version)
    }

    pub fn dependents(&self, name: &str, version: usize) -> &[String] {
        self.index.dependents(name, version)
    }

    /// Name -> node table at `version`, sorted by name.
    pub fn table(&self, version: usize) -> Vec<(&str, NodeId)> {
        self.index
            .names(version)
            .filter_map(|name| self.index.resolve(name, version).ok().map(|id| (name, id)))
            .collect()
    }
}
