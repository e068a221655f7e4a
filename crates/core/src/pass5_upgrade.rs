//! Pass 5: Upgrade derivation -- for every non-current base or super node,
//! synthesize the procedure that turns an instance of that node into an
//! instance of its successor.
//!
//! Record upgrades replay the successor version's transformations over the
//! carried field values with the same primitive the layout replay uses, so
//! the derived field order matches the declared order by construction. The
//! order is still checked; a mismatch is fatal.

use crate::context::RunContext;
use crate::error::SchemaError;
use crate::graph::{NodeId, TypeGraph, TypeKind, TypeNode};
use crate::model::{CodeRef, Modifier, Transformation, TypeRef, VersionedTypeRef};
use crate::pass2_sequence::VersionChain;
use crate::pass3_replay::{apply_step, LayoutHistory};
use indexmap::{IndexMap, IndexSet};
use std::sync::OnceLock;

/// Position of a code reference in [`UpgradePlan::references`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePlan {
    /// Converter and initializer references, deduplicated, in first-use order.
    pub references: Vec<CodeRef>,
    /// Ordered by source version, then type name.
    pub paths: Vec<UpgradePath>,
}

impl UpgradePlan {
    pub fn reference(&self, id: RefId) -> Option<&CodeRef> {
        self.references.get(id.0)
    }

    /// The path that upgrades the node of `type_name` labelled `from`.
    pub fn path(&self, type_name: &str, from: usize) -> Option<&UpgradePath> {
        self.paths
            .iter()
            .find(|p| p.type_name == type_name && p.from.version == Some(from))
    }

    pub fn paths_for<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a UpgradePath> {
        self.paths.iter().filter(move |p| p.type_name == type_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePath {
    pub type_name: String,
    pub from: VersionedTypeRef,
    pub to: VersionedTypeRef,
    pub body: UpgradeBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpgradeBody {
    Record {
        /// Replay log followed by the carry/upgrade decision for each
        /// resulting field.
        operations: Vec<FieldOperation>,
        /// One value per successor field, in the successor's declared order.
        assignments: Vec<Assignment>,
    },
    Union {
        arms: Vec<UnionArm>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: String,
    pub type_ref: TypeRef,
    pub value: ValueExpr,
}

/// How a successor field's value is computed from the old instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    OldField(String),
    Convert {
        converter: RefId,
        context: UpgradeContext,
        input: Box<ValueExpr>,
    },
    Initialize {
        initializer: RefId,
        context: UpgradeContext,
    },
    /// Run the upgrade paths of a nested type, through a nullable or array
    /// helper when the field is wrapped.
    Upgrade {
        wrapper: Modifier,
        from: VersionedTypeRef,
        steps: Vec<VersionedTypeRef>,
        input: Box<ValueExpr>,
    },
}

/// Pre-transformation values handed to a converter or initializer.
#[derive(Debug, Clone, PartialEq)]
pub enum UpgradeContext {
    None,
    Fields(Vec<ContextField>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextField {
    pub field: String,
    pub type_ref: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperation {
    Carry {
        field: String,
    },
    Move {
        from: String,
        to: String,
    },
    Remove {
        field: String,
    },
    Insert {
        field: String,
        initializer: RefId,
    },
    Convert {
        field: String,
        converter: RefId,
    },
    Upgrade {
        field: String,
        steps: Vec<VersionedTypeRef>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionArm {
    pub discriminant: u32,
    pub member: String,
    pub from: VersionedTypeRef,
    pub to: VersionedTypeRef,
    pub action: ArmAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArmAction {
    PassThrough,
    Upgrade(Vec<VersionedTypeRef>),
}

/// A field value in flight during replay.
#[derive(Debug, Clone)]
struct Carried {
    value: ValueExpr,
    type_ref: TypeRef,
    target: NodeId,
}

pub fn derive_upgrades(
    ctx: &RunContext,
    chain: &VersionChain,
    history: &LayoutHistory,
    graph: &TypeGraph,
) -> Result<UpgradePlan, SchemaError> {
    let references = collect_references(chain);

    let mut jobs: Vec<&TypeNode> = graph
        .nodes()
        .iter()
        .filter(|n| matches!(n.kind, TypeKind::Base { .. } | TypeKind::Super { .. }))
        .filter(|n| n.version.is_some_and(|v| v < graph.current()))
        .collect();
    jobs.sort_by(|a, b| (a.version, &a.name).cmp(&(b.version, &b.name)));

    let deriver = Deriver {
        chain,
        history,
        graph,
        references: &references,
    };
    let slots: Vec<OnceLock<UpgradePath>> = jobs.iter().map(|_| OnceLock::new()).collect();
    let numbered: Vec<(usize, &TypeNode)> = jobs.into_iter().enumerate().collect();
    ctx.for_each(&numbered, |(slot, node)| {
        let path = deriver.derive(node)?;
        slots[*slot]
            .set(path)
            .map_err(|p| SchemaError::Internal(format!("upgrade of '{}' derived twice", p.from)))
    })?;

    let paths = slots
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .ok_or_else(|| SchemaError::Internal("upgrade path never derived".to_owned()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        paths = paths.len(),
        references = references.len(),
        "derived upgrade paths"
    );
    Ok(UpgradePlan {
        references: references.into_iter().collect(),
        paths,
    })
}

fn collect_references(chain: &VersionChain) -> IndexSet<CodeRef> {
    let mut out = IndexSet::new();
    for version in chain.iter() {
        for step in &version.transformations {
            match step {
                Transformation::Insert { initializer, .. } => {
                    out.insert(initializer.clone());
                }
                Transformation::Convert { converter, .. } => {
                    out.insert(converter.clone());
                }
                _ => {}
            }
        }
    }
    out
}

struct Deriver<'a> {
    chain: &'a VersionChain,
    history: &'a LayoutHistory,
    graph: &'a TypeGraph,
    references: &'a IndexSet<CodeRef>,
}

impl Deriver<'_> {
    fn derive(&self, node: &TypeNode) -> Result<UpgradePath, SchemaError> {
        let Some(next) = self.graph.successor(node)? else {
            return Err(SchemaError::Internal(format!(
                "'{}' has no successor to upgrade to",
                node.identity()
            )));
        };
        let body = match &node.kind {
            TypeKind::Base { .. } => self.derive_record(node, next)?,
            TypeKind::Super { .. } => self.derive_union(node, next)?,
            other => {
                return Err(SchemaError::Internal(format!(
                    "cannot derive an upgrade for {} node '{}'",
                    other.name(),
                    node.name
                )))
            }
        };
        tracing::debug!(from = %node.identity(), to = %next.identity(), "derived upgrade");
        Ok(UpgradePath {
            type_name: node.name.clone(),
            from: node.identity(),
            to: next.identity(),
            body,
        })
    }

    fn reference(&self, code: &CodeRef) -> Result<RefId, SchemaError> {
        self.references
            .get_index_of(code)
            .map(RefId)
            .ok_or_else(|| SchemaError::Internal(format!("unregistered code reference '{}'", code)))
    }

    fn derive_record(&self, old: &TypeNode, next: &TypeNode) -> Result<UpgradeBody, SchemaError> {
        let from_version = old.version.unwrap_or_default();
        let step_version = from_version + 1;
        let version_name = self.chain.name_of(step_version);
        let steps: &[Transformation] = self
            .history
            .snapshot(step_version, &old.name)
            .map(|s| s.transformations.as_slice())
            .unwrap_or(&[]);

        let mut carried: IndexMap<String, Carried> = old
            .fields()
            .iter()
            .map(|f| {
                let value = Carried {
                    value: ValueExpr::OldField(f.name.clone()),
                    type_ref: f.type_ref.clone(),
                    target: f.target,
                };
                (f.name.clone(), value)
            })
            .collect();
        let mut operations = Vec::new();

        for step in steps {
            let introduced = match step {
                Transformation::Move { from, to, .. } => {
                    operations.push(FieldOperation::Move {
                        from: from.clone(),
                        to: to.clone(),
                    });
                    None
                }
                Transformation::Remove { from, .. } => {
                    operations.push(FieldOperation::Remove {
                        field: from.clone(),
                    });
                    None
                }
                Transformation::Insert {
                    to,
                    field_type,
                    initializer,
                    ..
                } => {
                    let id = self.reference(initializer)?;
                    operations.push(FieldOperation::Insert {
                        field: to.clone(),
                        initializer: id,
                    });
                    Some((id, field_type))
                }
                Transformation::Convert {
                    from,
                    new_type,
                    converter,
                    ..
                } => {
                    let id = self.reference(converter)?;
                    operations.push(FieldOperation::Convert {
                        field: from.clone(),
                        converter: id,
                    });
                    Some((id, new_type))
                }
            };

            match introduced {
                Some((code, type_ref)) => {
                    let context = context_of(old, step, version_name)?;
                    let target = self
                        .graph
                        .index()
                        .resolve(&type_ref.canonical(), step_version)?;
                    apply_step(
                        &mut carried,
                        step,
                        version_name,
                        || {
                            Ok(Carried {
                                value: ValueExpr::Initialize {
                                    initializer: code,
                                    context: context.clone(),
                                },
                                type_ref: type_ref.clone(),
                                target,
                            })
                        },
                        |previous| {
                            Ok(Carried {
                                value: ValueExpr::Convert {
                                    converter: code,
                                    context: context.clone(),
                                    input: Box::new(previous.value.clone()),
                                },
                                type_ref: type_ref.clone(),
                                target,
                            })
                        },
                    )?;
                }
                None => apply_step(
                    &mut carried,
                    step,
                    version_name,
                    || {
                        Err(SchemaError::Internal(format!(
                            "{} step of '{}' asked for a new value",
                            step.kind(),
                            old.name
                        )))
                    },
                    |previous| Ok(previous.clone()),
                )?,
            }
        }

        let actual: Vec<&str> = carried.keys().map(String::as_str).collect();
        let expected: Vec<&str> = next.fields().iter().map(|f| f.name.as_str()).collect();
        check_field_order(old, next, &expected, &actual)?;

        let mut assignments = Vec::with_capacity(carried.len());
        for ((field, value), declared) in carried.into_iter().zip(next.fields()) {
            if value.type_ref != declared.type_ref {
                return Err(SchemaError::Internal(format!(
                    "upgrade of '{}' carries field '{}' as '{}' but {} declares '{}'",
                    old.identity(),
                    field,
                    value.type_ref,
                    next.identity(),
                    declared.type_ref
                )));
            }
            let expr = if value.target == declared.target {
                if value.value == ValueExpr::OldField(field.clone()) {
                    operations.push(FieldOperation::Carry {
                        field: field.clone(),
                    });
                }
                value.value
            } else {
                let (from, steps) = self.nested_chain(&value.type_ref, from_version, step_version)?;
                operations.push(FieldOperation::Upgrade {
                    field: field.clone(),
                    steps: steps.clone(),
                });
                ValueExpr::Upgrade {
                    wrapper: value.type_ref.modifier,
                    from,
                    steps,
                    input: Box::new(value.value),
                }
            };
            assignments.push(Assignment {
                field,
                type_ref: declared.type_ref.clone(),
                value: expr,
            });
        }

        Ok(UpgradeBody::Record {
            operations,
            assignments,
        })
    }

    /// Upgrade chain of the named type under a (possibly wrapped) reference,
    /// from its node at `from` to its node at `to`.
    fn nested_chain(
        &self,
        type_ref: &TypeRef,
        from: usize,
        to: usize,
    ) -> Result<(VersionedTypeRef, Vec<VersionedTypeRef>), SchemaError> {
        let start = self.graph.node_at(&type_ref.name, from)?;
        let end = self.graph.node_at(&type_ref.name, to)?;
        match (start.version, end.version) {
            (Some(a), Some(b)) => Ok((
                start.identity(),
                self.graph.upgrade_chain(&type_ref.name, a, b)?,
            )),
            _ => Err(SchemaError::Internal(format!(
                "field type '{}' changed between versions {} and {} but is not versioned",
                type_ref, from, to
            ))),
        }
    }

    fn derive_union(&self, old: &TypeNode, next: &TypeNode) -> Result<UpgradeBody, SchemaError> {
        let mut arms = Vec::with_capacity(old.members().len());
        for member in old.members() {
            let Some(successor) = next.members().iter().find(|m| m.name == member.name) else {
                return Err(SchemaError::Internal(format!(
                    "member '{}' of '{}' has no successor",
                    member.name,
                    old.identity()
                )));
            };
            let from = self.graph.node(member.target);
            let to = self.graph.node(successor.target);
            let action = match (from.version, to.version) {
                _ if member.target == successor.target => ArmAction::PassThrough,
                (Some(a), Some(b)) => {
                    ArmAction::Upgrade(self.graph.upgrade_chain(&member.name, a, b)?)
                }
                _ => {
                    return Err(SchemaError::Internal(format!(
                        "member '{}' of '{}' is not versioned",
                        member.name,
                        old.identity()
                    )))
                }
            };
            arms.push(UnionArm {
                discriminant: member.discriminant,
                member: member.name.clone(),
                from: from.identity(),
                to: to.identity(),
                action,
            });
        }
        Ok(UpgradeBody::Union { arms })
    }
}

fn context_of(
    old: &TypeNode,
    step: &Transformation,
    version: &str,
) -> Result<UpgradeContext, SchemaError> {
    if step.context().is_empty() {
        return Ok(UpgradeContext::None);
    }
    let fields = step
        .context()
        .iter()
        .map(|name| {
            old.fields()
                .iter()
                .find(|f| &f.name == name)
                .map(|f| ContextField {
                    field: f.name.clone(),
                    type_ref: f.type_ref.clone(),
                })
                .ok_or_else(|| SchemaError::FieldMissing {
                    type_name: old.name.clone(),
                    field: name.clone(),
                    version: version.to_owned(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(UpgradeContext::Fields(fields))
}

/// The derived field order must equal the successor's declared order.
fn check_field_order(
    old: &TypeNode,
    next: &TypeNode,
    expected: &[&str],
    actual: &[&str],
) -> Result<(), SchemaError> {
    if expected == actual {
        return Ok(());
    }
    Err(SchemaError::UpgradeConsistency {
        type_name: old.name.clone(),
        from: old.identity().to_string(),
        to: next.identity().to_string(),
        expected: expected.iter().map(|s| s.to_string()).collect(),
        actual: actual.iter().map(|s| s.to_string()).collect(),
    })
}
