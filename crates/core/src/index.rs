//! Dependency index: per-version forward references between named types,
//! memoized reverse-dependency queries, and the compute-once
//! (name, version) -> node table.
//!
//! Every cache here is a [`OnceLock`]: the first writer wins, and readers
//! racing on an unresolved key all observe that single value.

use crate::error::SchemaError;
use crate::graph::NodeId;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Forward references of each named type at one version: base fields,
/// super members, or the wrapped type of a nullable/array wrapper.
pub type References = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub struct DependencyIndex {
    references: Vec<References>,
    dependents: Vec<OnceLock<BTreeMap<String, Vec<String>>>>,
    slots: Vec<BTreeMap<String, OnceLock<NodeId>>>,
}

impl DependencyIndex {
    /// `references[v]` must name every type known at version `v`, even
    /// those that reference nothing.
    pub fn new(references: Vec<References>) -> Self {
        let dependents = references.iter().map(|_| OnceLock::new()).collect();
        let slots = references
            .iter()
            .map(|refs| refs.keys().map(|k| (k.clone(), OnceLock::new())).collect())
            .collect();
        DependencyIndex {
            references,
            dependents,
            slots,
        }
    }

    pub fn version_count(&self) -> usize {
        self.references.len()
    }

    /// All names known at `version`, sorted.
    pub fn names(&self, version: usize) -> impl Iterator<Item = &str> {
        self.references
            .get(version)
            .into_iter()
            .flat_map(|r| r.keys().map(String::as_str))
    }

    pub fn references(&self, name: &str, version: usize) -> &[String] {
        self.references
            .get(version)
            .and_then(|r| r.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Types that directly reference `name` at `version`. Computed once per
    /// version on first query.
    pub fn dependents(&self, name: &str, version: usize) -> &[String] {
        let Some(cell) = self.dependents.get(version) else {
            return &[];
        };
        let map = cell.get_or_init(|| invert(&self.references[version]));
        map.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record the node for (name, version). Each key may be written once.
    pub fn bind(&self, name: &str, version: usize, id: NodeId) -> Result<(), SchemaError> {
        let slot = self.slot(name, version)?;
        slot.set(id).map_err(|_| {
            SchemaError::Internal(format!(
                "node for '{}' at version {} bound twice",
                name, version
            ))
        })
    }

    /// Return the node for (name, version), computing it with `compute` if
    /// the slot is still empty. Concurrent callers get the winning value.
    pub fn resolve_or_bind(
        &self,
        name: &str,
        version: usize,
        compute: impl FnOnce() -> Result<NodeId, SchemaError>,
    ) -> Result<NodeId, SchemaError> {
        let slot = self.slot(name, version)?;
        if let Some(id) = slot.get() {
            return Ok(*id);
        }
        let id = compute()?;
        let _ = slot.set(id);
        Ok(slot.get().copied().unwrap_or(id))
    }

    pub fn resolve(&self, name: &str, version: usize) -> Result<NodeId, SchemaError> {
        self.slot(name, version)?
            .get()
            .copied()
            .ok_or_else(|| not_found(name, version))
    }

    fn slot(&self, name: &str, version: usize) -> Result<&OnceLock<NodeId>, SchemaError> {
        self.slots
            .get(version)
            .and_then(|s| s.get(name))
            .ok_or_else(|| not_found(name, version))
    }
}

fn not_found(name: &str, version: usize) -> SchemaError {
    SchemaError::TypeNotFound {
        name: name.to_owned(),
        version,
    }
}

fn invert(references: &References) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (from, targets) in references {
        for to in targets {
            let entry = out.entry(to.clone()).or_default();
            if !entry.contains(from) {
                entry.push(from.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn refs(pairs: &[(&str, Vec<&str>)]) -> References {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn dependents_are_inverted_references() {
        let index = DependencyIndex::new(vec![refs(&[
            ("A", vec![]),
            ("B", vec!["A", "-A"]),
            ("-A", vec!["A"]),
            ("C", vec!["-A"]),
        ])]);
        assert_eq!(index.dependents("A", 0), ["-A".to_string(), "B".to_string()]);
        assert_eq!(index.dependents("-A", 0), ["B".to_string(), "C".to_string()]);
        assert!(index.dependents("C", 0).is_empty());
        assert!(index.dependents("A", 5).is_empty());
    }

    #[test]
    fn bind_is_write_once() {
        let index = DependencyIndex::new(vec![refs(&[("A", vec![])])]);
        index.bind("A", 0, NodeId(3)).unwrap();
        assert_eq!(index.resolve("A", 0).unwrap(), NodeId(3));
        let err = index.bind("A", 0, NodeId(4)).unwrap_err();
        assert!(matches!(err, SchemaError::Internal(_)));
    }

    #[test]
    fn unknown_key_is_type_not_found() {
        let index = DependencyIndex::new(vec![refs(&[("A", vec![])])]);
        assert_eq!(
            index.resolve("Z", 0).unwrap_err(),
            SchemaError::TypeNotFound {
                name: "Z".into(),
                version: 0
            }
        );
        assert!(matches!(
            index.resolve("A", 0).unwrap_err(),
            SchemaError::TypeNotFound { .. }
        ));
    }

    #[test]
    fn concurrent_resolution_observes_single_value() {
        let index = DependencyIndex::new(vec![refs(&[("A", vec![])])]);
        let computed = AtomicUsize::new(0);
        let seen: Vec<NodeId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let index = &index;
                    let computed = &computed;
                    scope.spawn(move || {
                        index
                            .resolve_or_bind("A", 0, || {
                                computed.fetch_add(1, Ordering::SeqCst);
                                Ok(NodeId(100 + i))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let first = seen[0];
        assert!(seen.iter().all(|id| *id == first));
        assert_eq!(index.resolve("A", 0).unwrap(), first);
        assert!(computed.load(Ordering::SeqCst) >= 1);
    }
}
