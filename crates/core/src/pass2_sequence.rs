//! Pass 2: Version sequencing -- order the declared versions into a single
//! linear chain from the unique root to the declared current version.

use crate::error::SchemaError;
use crate::model::Transformation;
use crate::pass1_load::SchemaDefinition;
use std::collections::{BTreeMap, HashSet};

/// A version at its position in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub index: usize,
    pub name: String,
    pub previous: Option<String>,
    pub is_current: bool,
    /// Transformations that turn the previous version's layouts into this
    /// version's layouts, in declared order.
    pub transformations: Vec<Transformation>,
    pub changelog: Option<String>,
}

/// Versions indexed `0..N-1` in chain order; the last one is current.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Version> {
        self.versions.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }

    pub fn current_index(&self) -> usize {
        self.versions.len().saturating_sub(1)
    }

    pub fn current(&self) -> &Version {
        &self.versions[self.current_index()]
    }

    /// Name of the version at `index`, or `"?"` when out of range. Used for
    /// error messages only.
    pub fn name_of(&self, index: usize) -> &str {
        self.versions.get(index).map_or("?", |v| v.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }
}

pub fn sequence_versions(def: &SchemaDefinition) -> Result<VersionChain, SchemaError> {
    for (name, decl) in &def.versions {
        if let Some(prev) = &decl.previous {
            if !def.versions.contains_key(prev) {
                return Err(SchemaError::UnknownVersion {
                    version: name.clone(),
                    previous: prev.clone(),
                });
            }
        }
    }

    let roots: Vec<&String> = def
        .versions
        .iter()
        .filter(|(_, d)| d.previous.is_none())
        .map(|(n, _)| n)
        .collect();
    let root = match roots.as_slice() {
        [] => return Err(SchemaError::NoRoot),
        [only] => (*only).clone(),
        many => {
            return Err(SchemaError::MultipleRoots(
                many.iter().map(|s| (*s).clone()).collect(),
            ))
        }
    };

    let mut next: BTreeMap<&str, &str> = BTreeMap::new();
    for (name, decl) in &def.versions {
        if let Some(prev) = &decl.previous {
            if let Some(first) = next.insert(prev.as_str(), name.as_str()) {
                return Err(SchemaError::MultipleNext {
                    previous: prev.clone(),
                    first: first.to_owned(),
                    second: name.clone(),
                });
            }
        }
    }

    if !def.versions[&root].transformations.is_empty() {
        return Err(SchemaError::RootHasTransformations(root));
    }

    let mut order: Vec<&str> = vec![root.as_str()];
    let mut seen: HashSet<&str> = HashSet::from([root.as_str()]);
    let mut cursor = root.as_str();
    while let Some(&succ) = next.get(cursor) {
        if !seen.insert(succ) {
            break;
        }
        order.push(succ);
        cursor = succ;
    }

    let last = order.last().copied().unwrap_or_default();
    if last != def.current_version || order.len() != def.versions.len() {
        return Err(SchemaError::CurrentMismatch {
            expected: def.current_version.clone(),
            found: last.to_owned(),
            visited: order.len(),
            total: def.versions.len(),
        });
    }

    let count = order.len();
    let versions = order
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let decl = &def.versions[name];
            Version {
                index,
                name: name.to_owned(),
                previous: decl.previous.clone(),
                is_current: index + 1 == count,
                transformations: decl.transformations.clone(),
                changelog: decl.changelog.clone(),
            }
        })
        .collect();

    tracing::debug!(versions = count, root = %root, "sequenced version chain");
    Ok(VersionChain { versions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_str, ConfigFormat};
    use crate::error::ErrorCategory;
    use crate::pass1_load::load_definition;

    fn chain_of(versions: &str, current: &str) -> Result<VersionChain, SchemaError> {
        let json = format!(
            r#"{{
                "current_version": "{}",
                "base_types": {{ "User": {{ "fields": {{ "name": "string" }} }} }},
                "versions": {}
            }}"#,
            current, versions
        );
        let cfg = load_config_str(&json, ConfigFormat::Json).unwrap();
        sequence_versions(&load_definition(&cfg).unwrap())
    }

    #[test]
    fn orders_by_previous_links_not_declaration() {
        let chain = chain_of(
            r#"{
                "c": { "previous": "b" },
                "a": {},
                "b": { "previous": "a" }
            }"#,
            "c",
        )
        .unwrap();
        let names: Vec<&str> = chain.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(chain.current().name, "c");
        assert!(chain.current().is_current);
        assert!(!chain.get(0).unwrap().is_current);
        assert_eq!(chain.by_name("b").unwrap().index, 1);
    }

    #[test]
    fn no_root() {
        let err = chain_of(
            r#"{ "a": { "previous": "b" }, "b": { "previous": "a" } }"#,
            "b",
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::NoRoot);
    }

    #[test]
    fn empty_version_map_has_no_root() {
        assert_eq!(chain_of("{}", "v1").unwrap_err(), SchemaError::NoRoot);
    }

    #[test]
    fn multiple_roots() {
        let err = chain_of(r#"{ "a": {}, "b": {} }"#, "b").unwrap_err();
        assert_eq!(err, SchemaError::MultipleRoots(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn multiple_next() {
        let err = chain_of(
            r#"{ "a": {}, "b": { "previous": "a" }, "c": { "previous": "a" } }"#,
            "c",
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MultipleNext {
                previous: "a".into(),
                first: "b".into(),
                second: "c".into()
            }
        );
    }

    #[test]
    fn root_with_transformations() {
        let err = chain_of(
            r#"{ "a": { "transformations": [ { "kind": "remove", "type": "User", "from": "name" } ] } }"#,
            "a",
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::RootHasTransformations("a".into()));
    }

    #[test]
    fn current_mismatch_on_wrong_tail() {
        let err = chain_of(r#"{ "a": {}, "b": { "previous": "a" } }"#, "a").unwrap_err();
        assert!(matches!(err, SchemaError::CurrentMismatch { ref found, .. } if found == "b"));
        assert_eq!(err.category(), ErrorCategory::ConfigurationStructureError);
    }

    #[test]
    fn current_mismatch_on_detached_cycle() {
        let err = chain_of(
            r#"{
                "a": {},
                "b": { "previous": "a" },
                "x": { "previous": "y" },
                "y": { "previous": "x" }
            }"#,
            "b",
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::CurrentMismatch {
                expected: "b".into(),
                found: "b".into(),
                visited: 2,
                total: 4
            }
        );
    }

    #[test]
    fn unknown_previous() {
        let err = chain_of(r#"{ "a": {}, "b": { "previous": "zz" } }"#, "b").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ConfigurationStructureError);
        assert!(matches!(err, SchemaError::UnknownVersion { .. }));
    }
}
