//! Pass 1: Configuration validation -- build the type catalog, parse type
//! and code references, detect duplicate names, dangling references and
//! interface inheritance cycles.

use crate::config::{SchemaConfig, TransformationConfig};
use crate::error::SchemaError;
use crate::model::{CodeRef, NativeKind, Transformation, TypeRef};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Declaration category of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Base,
    Super,
    Custom,
    Native(NativeKind),
}

impl TypeCategory {
    /// Whether nodes of this category evolve across versions.
    pub fn has_version(&self) -> bool {
        matches!(self, TypeCategory::Base | TypeCategory::Super)
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeCategory::Base => "base type",
            TypeCategory::Super => "super type",
            TypeCategory::Custom => "custom type",
            TypeCategory::Native(_) => "native type",
        })
    }
}

/// Name -> category lookup over every declared and built-in type.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    entries: BTreeMap<String, TypeCategory>,
}

impl TypeCatalog {
    pub fn category(&self, name: &str) -> Option<TypeCategory> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TypeCategory)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Whether a (possibly wrapped) reference evolves across versions.
    pub fn is_versioned(&self, t: &TypeRef) -> bool {
        self.category(&t.name).is_some_and(|c| c.has_version())
    }

    fn declare(&mut self, name: &str, category: TypeCategory) -> Result<(), SchemaError> {
        if let Some(first) = self.entries.get(name) {
            return Err(SchemaError::DuplicateTypeName {
                name: name.to_owned(),
                first: first.to_string(),
                second: category.to_string(),
            });
        }
        self.entries.insert(name.to_owned(), category);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub extends: Vec<String>,
    /// Own fields only.
    pub fields: IndexMap<String, TypeRef>,
    /// Own fields plus everything inherited through `extends`, parents first.
    pub all_fields: IndexMap<String, TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseDecl {
    pub implements: Vec<String>,
    /// Root-version layout.
    pub fields: IndexMap<String, TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomDecl {
    pub class: CodeRef,
    pub serializer: CodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionDecl {
    pub previous: Option<String>,
    pub transformations: Vec<Transformation>,
    pub changelog: Option<String>,
}

/// The validated, typed form of a [`SchemaConfig`].
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    pub current_version: String,
    pub catalog: TypeCatalog,
    pub interfaces: IndexMap<String, InterfaceDecl>,
    pub base_types: IndexMap<String, BaseDecl>,
    pub super_types: IndexMap<String, Vec<String>>,
    pub custom_types: IndexMap<String, CustomDecl>,
    pub versions: IndexMap<String, VersionDecl>,
}

pub fn load_definition(config: &SchemaConfig) -> Result<SchemaDefinition, SchemaError> {
    let catalog = build_catalog(config)?;

    let mut base_types = IndexMap::new();
    for (name, decl) in &config.base_types {
        let fields = parse_fields(&decl.fields, &catalog, |f| {
            format!("field '{}' of base type '{}'", f, name)
        })?;
        for iface in &decl.implements {
            if !config.interfaces.contains_key(iface) {
                return Err(SchemaError::unknown_type(
                    iface,
                    format!("the implements list of base type '{}'", name),
                ));
            }
        }
        base_types.insert(
            name.clone(),
            BaseDecl {
                implements: decl.implements.clone(),
                fields,
            },
        );
    }

    let mut super_types = IndexMap::new();
    for (name, members) in &config.super_types {
        let mut seen: HashSet<&str> = HashSet::new();
        for member in members {
            match catalog.category(member) {
                Some(TypeCategory::Base) => {}
                Some(other) => {
                    return Err(SchemaError::unknown_type(
                        member,
                        format!(
                            "super type '{}' as a member, but it is a {}; members must be base types",
                            name, other
                        ),
                    ))
                }
                None => {
                    return Err(SchemaError::unknown_type(
                        member,
                        format!("the member list of super type '{}'", name),
                    ))
                }
            }
            if !seen.insert(member.as_str()) {
                return Err(SchemaError::DuplicateTypeName {
                    name: member.clone(),
                    first: format!("a member of super type '{}'", name),
                    second: "a repeated member of the same super type".to_owned(),
                });
            }
        }
        super_types.insert(name.clone(), members.clone());
    }

    let mut custom_types = IndexMap::new();
    for (name, decl) in &config.custom_types {
        custom_types.insert(
            name.clone(),
            CustomDecl {
                class: CodeRef::parse(&decl.class)?,
                serializer: CodeRef::parse(&decl.serializer)?,
            },
        );
    }

    let interfaces = build_interfaces(config, &catalog)?;

    let mut versions = IndexMap::new();
    for (name, decl) in &config.versions {
        let transformations = decl
            .transformations
            .iter()
            .map(parse_transformation)
            .collect::<Result<Vec<_>, _>>()?;
        versions.insert(
            name.clone(),
            VersionDecl {
                previous: decl.previous.clone(),
                transformations,
                changelog: decl.changelog.clone(),
            },
        );
    }

    Ok(SchemaDefinition {
        current_version: config.current_version.clone(),
        catalog,
        interfaces,
        base_types,
        super_types,
        custom_types,
        versions,
    })
}

fn build_catalog(config: &SchemaConfig) -> Result<TypeCatalog, SchemaError> {
    let mut catalog = TypeCatalog::default();
    for kind in NativeKind::ALL {
        catalog.declare(kind.name(), TypeCategory::Native(kind))?;
    }
    for name in config.base_types.keys() {
        check_type_name(name)?;
        catalog.declare(name, TypeCategory::Base)?;
    }
    for name in config.super_types.keys() {
        check_type_name(name)?;
        catalog.declare(name, TypeCategory::Super)?;
    }
    for name in config.custom_types.keys() {
        check_type_name(name)?;
        catalog.declare(name, TypeCategory::Custom)?;
    }
    for name in config.interfaces.keys() {
        if let Some(first) = catalog.category(name) {
            return Err(SchemaError::DuplicateTypeName {
                name: name.clone(),
                first: first.to_string(),
                second: "interface".to_owned(),
            });
        }
    }
    Ok(catalog)
}

/// Declared names must parse as plain references: no sigils.
fn check_type_name(name: &str) -> Result<(), SchemaError> {
    let parsed = TypeRef::parse(name)?;
    if parsed.is_wrapped() || parsed.name != name {
        return Err(SchemaError::nesting(
            name,
            "declared type names cannot carry nullable or array sigils",
        ));
    }
    Ok(())
}

fn parse_fields(
    raw: &IndexMap<String, String>,
    catalog: &TypeCatalog,
    context: impl Fn(&str) -> String,
) -> Result<IndexMap<String, TypeRef>, SchemaError> {
    let mut fields = IndexMap::new();
    for (field, raw_type) in raw {
        let t = TypeRef::parse(raw_type)?;
        if !catalog.contains(&t.name) {
            return Err(SchemaError::unknown_type(&t.name, context(field)));
        }
        fields.insert(field.clone(), t);
    }
    Ok(fields)
}

fn parse_transformation(raw: &TransformationConfig) -> Result<Transformation, SchemaError> {
    let t = match raw {
        TransformationConfig::Move {
            type_name,
            from,
            to,
            index,
        } => Transformation::Move {
            type_name: type_name.clone(),
            from: from.clone(),
            to: to.clone(),
            index: *index,
        },
        TransformationConfig::Insert {
            type_name,
            to,
            field_type,
            initializer,
            context,
            index,
        } => Transformation::Insert {
            type_name: type_name.clone(),
            to: to.clone(),
            field_type: TypeRef::parse(field_type)?,
            initializer: CodeRef::parse(initializer)?,
            context: context.clone(),
            index: *index,
        },
        TransformationConfig::Remove { type_name, from } => Transformation::Remove {
            type_name: type_name.clone(),
            from: from.clone(),
        },
        TransformationConfig::Convert {
            type_name,
            from,
            new_type,
            converter,
            context,
        } => Transformation::Convert {
            type_name: type_name.clone(),
            from: from.clone(),
            new_type: TypeRef::parse(new_type)?,
            converter: CodeRef::parse(converter)?,
            context: context.clone(),
        },
    };
    Ok(t)
}

// ── Interfaces ───────────────────────────────────────────────────────────────

fn build_interfaces(
    config: &SchemaConfig,
    catalog: &TypeCatalog,
) -> Result<IndexMap<String, InterfaceDecl>, SchemaError> {
    for (name, decl) in &config.interfaces {
        for parent in &decl.extends {
            if !config.interfaces.contains_key(parent) {
                return Err(SchemaError::unknown_type(
                    parent,
                    format!("the extends list of interface '{}'", name),
                ));
            }
        }
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut in_stack: Vec<String> = Vec::new();
    for name in config.interfaces.keys() {
        detect_extends_cycle(name, config, &mut visited, &mut in_stack)?;
    }

    let mut out: IndexMap<String, InterfaceDecl> = IndexMap::new();
    for (name, decl) in &config.interfaces {
        let fields = parse_fields(&decl.fields, catalog, |f| {
            format!("field '{}' of interface '{}'", f, name)
        })?;
        out.insert(
            name.clone(),
            InterfaceDecl {
                extends: decl.extends.clone(),
                fields,
                all_fields: IndexMap::new(),
            },
        );
    }

    let names: Vec<String> = out.keys().cloned().collect();
    for name in &names {
        let mut all = IndexMap::new();
        collect_interface_fields(name, &out, &mut all)?;
        if let Some(decl) = out.get_mut(name) {
            decl.all_fields = all;
        }
    }
    Ok(out)
}

fn detect_extends_cycle(
    name: &str,
    config: &SchemaConfig,
    visited: &mut HashSet<String>,
    in_stack: &mut Vec<String>,
) -> Result<(), SchemaError> {
    if visited.contains(name) {
        return Ok(());
    }
    if let Some(pos) = in_stack.iter().position(|x| x == name) {
        let mut cycle: Vec<String> = in_stack[pos..].to_vec();
        cycle.push(name.to_owned());
        return Err(SchemaError::InterfaceCycle(cycle.join(" \u{2192} ")));
    }
    let Some(decl) = config.interfaces.get(name) else {
        return Ok(());
    };

    in_stack.push(name.to_owned());
    for parent in &decl.extends {
        detect_extends_cycle(parent, config, visited, in_stack)?;
    }
    in_stack.pop();
    visited.insert(name.to_owned());
    Ok(())
}

fn collect_interface_fields(
    name: &str,
    decls: &IndexMap<String, InterfaceDecl>,
    out: &mut IndexMap<String, TypeRef>,
) -> Result<(), SchemaError> {
    let Some(decl) = decls.get(name) else {
        return Ok(());
    };
    for parent in &decl.extends {
        collect_interface_fields(parent, decls, out)?;
    }
    for (field, t) in &decl.fields {
        match out.get(field) {
            Some(existing) if existing != t => {
                return Err(SchemaError::InterfaceMismatch {
                    type_name: name.to_owned(),
                    interface: name.to_owned(),
                    field: field.clone(),
                    problem: format!(
                        "is declared as '{}' but an extended interface declares '{}'",
                        t, existing
                    ),
                });
            }
            Some(_) => {}
            None => {
                out.insert(field.clone(), t.clone());
            }
        }
    }
    Ok(())
}
