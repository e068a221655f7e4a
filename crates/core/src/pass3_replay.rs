//! Pass 3: Transformation replay -- produce a field-layout snapshot for
//! every (base type, version) pair by replaying each version's
//! transformations, in declared order, on a copy of the previous layouts.

use crate::error::SchemaError;
use crate::model::{Transformation, TypeRef};
use crate::pass1_load::{SchemaDefinition, TypeCatalog, TypeCategory};
use crate::pass2_sequence::VersionChain;
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Ordered field name -> declared type.
pub type FieldLayout = IndexMap<String, TypeRef>;

/// The layout of one base type at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayoutSnapshot {
    pub type_name: String,
    pub version: usize,
    pub fields: FieldLayout,
    /// Transformations of this version that targeted this type, in order.
    pub transformations: Vec<Transformation>,
    /// Whether the next version's layout differs from this one. Always
    /// false at the current version.
    pub differs_from_next: bool,
}

/// Per-version layout snapshots plus per-version change markers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutHistory {
    versions: Vec<IndexMap<String, FieldLayoutSnapshot>>,
    changed: Vec<BTreeSet<String>>,
}

impl LayoutHistory {
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn snapshot(&self, version: usize, type_name: &str) -> Option<&FieldLayoutSnapshot> {
        self.versions.get(version)?.get(type_name)
    }

    pub fn layout(&self, version: usize, type_name: &str) -> Option<&FieldLayout> {
        self.snapshot(version, type_name).map(|s| &s.fields)
    }

    pub fn snapshots(&self, version: usize) -> impl Iterator<Item = &FieldLayoutSnapshot> {
        self.versions.get(version).into_iter().flat_map(|m| m.values())
    }

    /// Base types targeted by at least one transformation of `version`.
    pub fn changed_at(&self, version: usize) -> Option<&BTreeSet<String>> {
        self.changed.get(version)
    }

    pub fn differs_from_next(&self, version: usize, type_name: &str) -> bool {
        self.snapshot(version, type_name)
            .is_some_and(|s| s.differs_from_next)
    }
}

pub fn replay_transformations(
    def: &SchemaDefinition,
    chain: &VersionChain,
) -> Result<LayoutHistory, SchemaError> {
    let mut layouts: Vec<IndexMap<String, FieldLayout>> = Vec::with_capacity(chain.len());
    let mut changed: Vec<BTreeSet<String>> = Vec::with_capacity(chain.len());

    let root: IndexMap<String, FieldLayout> = def
        .base_types
        .iter()
        .map(|(name, decl)| (name.clone(), decl.fields.clone()))
        .collect();
    layouts.push(root);
    changed.push(BTreeSet::new());

    for version in chain.iter().skip(1) {
        let previous = &layouts[version.index - 1];
        let (next, marked) = replay_layouts(
            previous,
            &version.transformations,
            &version.name,
            &def.catalog,
        )?;
        tracing::debug!(
            version = %version.name,
            transformations = version.transformations.len(),
            changed_types = marked.len(),
            "replayed version"
        );
        layouts.push(next);
        changed.push(marked);
    }

    let mut versions = Vec::with_capacity(layouts.len());
    for (index, version_layouts) in layouts.iter().enumerate() {
        let mut snapshots = IndexMap::new();
        for (name, fields) in version_layouts {
            let differs_from_next = match layouts.get(index + 1) {
                Some(next) => next.get(name) != Some(fields) || changed[index + 1].contains(name),
                None => false,
            };
            let transformations = chain
                .get(index)
                .map(|v| {
                    v.transformations
                        .iter()
                        .filter(|t| t.type_name() == name)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            snapshots.insert(
                name.clone(),
                FieldLayoutSnapshot {
                    type_name: name.clone(),
                    version: index,
                    fields: fields.clone(),
                    transformations,
                    differs_from_next,
                },
            );
        }
        versions.push(snapshots);
    }

    Ok(LayoutHistory { versions, changed })
}

/// Replay one version's transformations against a deep copy of the
/// previous version's layouts. Returns the new layouts and the set of types
/// the transformations targeted.
///
/// Each step sees the effects of the steps before it; context fields are
/// looked up in `previous`, the pre-transformation layouts.
pub fn replay_layouts(
    previous: &IndexMap<String, FieldLayout>,
    transformations: &[Transformation],
    version: &str,
    catalog: &TypeCatalog,
) -> Result<(IndexMap<String, FieldLayout>, BTreeSet<String>), SchemaError> {
    let mut working = previous.clone();
    let mut marked = BTreeSet::new();

    for step in transformations {
        let type_name = step.type_name();
        match catalog.category(type_name) {
            Some(TypeCategory::Base) => {}
            Some(_) => {
                return Err(SchemaError::NotABaseType {
                    name: type_name.to_owned(),
                    version: version.to_owned(),
                })
            }
            None => {
                return Err(SchemaError::unknown_type(
                    type_name,
                    format!("a {} transformation in version '{}'", step.kind(), version),
                ))
            }
        }
        if let Some(t) = step.introduced_type() {
            if !catalog.contains(&t.name) {
                return Err(SchemaError::unknown_type(
                    &t.name,
                    format!(
                        "a {} transformation of '{}' in version '{}'",
                        step.kind(),
                        type_name,
                        version
                    ),
                ));
            }
        }

        let Some(before) = previous.get(type_name) else {
            return Err(SchemaError::Internal(format!(
                "no layout for base type '{}'",
                type_name
            )));
        };
        for field in step.context() {
            if !before.contains_key(field) {
                return Err(SchemaError::FieldMissing {
                    type_name: type_name.to_owned(),
                    field: field.clone(),
                    version: version.to_owned(),
                });
            }
        }

        let Some(layout) = working.get_mut(type_name) else {
            return Err(SchemaError::Internal(format!(
                "no working layout for base type '{}'",
                type_name
            )));
        };
        let introduced = || {
            step.introduced_type().cloned().ok_or_else(|| {
                SchemaError::Internal(format!("{} step introduces no field type", step.kind()))
            })
        };
        apply_step(layout, step, version, &introduced, |_| introduced())?;
        marked.insert(type_name.to_owned());
    }

    Ok((working, marked))
}

/// Apply a single transformation to an ordered field map in place.
///
/// Generic over the value so the upgrade deriver can replay the exact same
/// steps over carried values. `inserted` builds the value for an `Insert`;
/// `converted` maps the current value for a `Convert`. Neither is called
/// for `Move` or `Remove`.
pub(crate) fn apply_step<V>(
    layout: &mut IndexMap<String, V>,
    step: &Transformation,
    version: &str,
    inserted: impl FnOnce() -> Result<V, SchemaError>,
    converted: impl FnOnce(&V) -> Result<V, SchemaError>,
) -> Result<(), SchemaError> {
    let type_name = step.type_name();
    let missing = |field: &str| SchemaError::FieldMissing {
        type_name: type_name.to_owned(),
        field: field.to_owned(),
        version: version.to_owned(),
    };
    let occupied = |field: &str| SchemaError::SlotOccupied {
        type_name: type_name.to_owned(),
        field: field.to_owned(),
        version: version.to_owned(),
    };
    let out_of_range = |index: usize, len: usize| SchemaError::IndexOutOfRange {
        type_name: type_name.to_owned(),
        index,
        len,
        version: version.to_owned(),
    };

    match step {
        Transformation::Move {
            from, to, index, ..
        } => {
            let Some((slot, _, value)) = layout.shift_remove_full(from) else {
                return Err(missing(from));
            };
            if layout.contains_key(to) {
                return Err(occupied(to));
            }
            let at = index.unwrap_or(slot);
            if at > layout.len() {
                return Err(out_of_range(at, layout.len()));
            }
            layout.shift_insert(at, to.clone(), value);
        }
        Transformation::Insert { to, index, .. } => {
            if layout.contains_key(to) {
                return Err(occupied(to));
            }
            let at = index.unwrap_or(layout.len());
            if at > layout.len() {
                return Err(out_of_range(at, layout.len()));
            }
            layout.shift_insert(at, to.clone(), inserted()?);
        }
        Transformation::Remove { from, .. } => {
            if layout.shift_remove(from).is_none() {
                return Err(missing(from));
            }
        }
        Transformation::Convert { from, .. } => {
            let Some(value) = layout.get_mut(from) else {
                return Err(missing(from));
            };
            let next = converted(value)?;
            *value = next;
        }
    }
    Ok(())
}

/// Every base type must carry the fields of the interfaces it implements,
/// with identical declared types, at the current version.
pub fn check_interfaces(
    def: &SchemaDefinition,
    history: &LayoutHistory,
    current: usize,
) -> Result<(), SchemaError> {
    for (type_name, decl) in &def.base_types {
        let Some(layout) = history.layout(current, type_name) else {
            continue;
        };
        for iface in &decl.implements {
            let Some(iface_decl) = def.interfaces.get(iface) else {
                return Err(SchemaError::unknown_type(
                    iface,
                    format!("the implements list of base type '{}'", type_name),
                ));
            };
            for (field, expected) in &iface_decl.all_fields {
                let problem = match layout.get(field) {
                    None => "is missing at the current version".to_owned(),
                    Some(actual) if actual != expected => format!(
                        "is declared as '{}' but the interface declares '{}'",
                        actual, expected
                    ),
                    Some(_) => continue,
                };
                return Err(SchemaError::InterfaceMismatch {
                    type_name: type_name.clone(),
                    interface: iface.clone(),
                    field: field.clone(),
                    problem,
                });
            }
        }
    }
    Ok(())
}
