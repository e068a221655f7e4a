//! Shared model types for the Lineage compiler.
//!
//! These types are produced by configuration loading (pass 1) and consumed
//! throughout the remaining passes. They live here so that pass modules can
//! import them without depending on each other.

use crate::error::SchemaError;
use serde::{Serialize, Serializer};
use std::fmt;

// ──────────────────────────────────────────────
// Type references
// ──────────────────────────────────────────────

/// How a field refers to its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Plain,
    Nullable,
    Array,
}

/// A type name plus a modifier. Nullable-of-array and array-of-nullable are
/// rejected at parse time, so a `TypeRef` always wraps a named type at most
/// once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    pub name: String,
    pub modifier: Modifier,
}

const NULLABLE_SIGIL: char = '-';
const ARRAY_SIGIL: char = '§';
const ARRAY_SUFFIX: &str = "[]";

impl TypeRef {
    pub fn plain(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            modifier: Modifier::Plain,
        }
    }

    pub fn nullable(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            modifier: Modifier::Nullable,
        }
    }

    pub fn array(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            modifier: Modifier::Array,
        }
    }

    /// Parse a sigil-annotated reference: `Name`, `-Name`, `Name[]` or the
    /// canonical array spelling `§Name`.
    pub fn parse(raw: &str) -> Result<TypeRef, SchemaError> {
        let s = raw.trim();
        let (nullable, rest) = match s.strip_prefix(NULLABLE_SIGIL) {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (array, inner) = if let Some(inner) = rest.strip_suffix(ARRAY_SUFFIX) {
            if inner.starts_with(ARRAY_SIGIL) {
                return Err(SchemaError::nesting(raw, "array of array"));
            }
            (true, inner)
        } else if let Some(inner) = rest.strip_prefix(ARRAY_SIGIL) {
            (true, inner)
        } else {
            (false, rest)
        };

        if nullable && array {
            return Err(SchemaError::nesting(raw, "nullable array"));
        }
        if inner.starts_with(NULLABLE_SIGIL) {
            return Err(SchemaError::nesting(
                raw,
                if array {
                    "array of nullable"
                } else {
                    "nullable of nullable"
                },
            ));
        }
        if inner.ends_with(ARRAY_SUFFIX) || inner.starts_with(ARRAY_SIGIL) {
            return Err(SchemaError::nesting(
                raw,
                if nullable {
                    "nullable array"
                } else {
                    "array of array"
                },
            ));
        }
        if inner.is_empty() {
            return Err(SchemaError::nesting(raw, "missing type name"));
        }
        if !inner
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return Err(SchemaError::nesting(raw, "unexpected character in type name"));
        }

        let modifier = match (nullable, array) {
            (true, _) => Modifier::Nullable,
            (_, true) => Modifier::Array,
            _ => Modifier::Plain,
        };
        Ok(TypeRef {
            name: inner.to_owned(),
            modifier,
        })
    }

    /// Canonical spelling. For wrapped references this is also the name of
    /// the wrapper node in the type graph.
    pub fn canonical(&self) -> String {
        match self.modifier {
            Modifier::Plain => self.name.clone(),
            Modifier::Nullable => format!("{}{}", NULLABLE_SIGIL, self.name),
            Modifier::Array => format!("{}{}", ARRAY_SIGIL, self.name),
        }
    }

    pub fn is_wrapped(&self) -> bool {
        self.modifier != Modifier::Plain
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for TypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

// ──────────────────────────────────────────────
// Native types
// ──────────────────────────────────────────────

/// The fixed set of built-in leaf types. Their names are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
    BigInt,
    Decimal,
}

impl NativeKind {
    pub const ALL: [NativeKind; 11] = [
        NativeKind::Boolean,
        NativeKind::Byte,
        NativeKind::Short,
        NativeKind::Int,
        NativeKind::Long,
        NativeKind::Float,
        NativeKind::Double,
        NativeKind::Char,
        NativeKind::String,
        NativeKind::BigInt,
        NativeKind::Decimal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NativeKind::Boolean => "boolean",
            NativeKind::Byte => "byte",
            NativeKind::Short => "short",
            NativeKind::Int => "int",
            NativeKind::Long => "long",
            NativeKind::Float => "float",
            NativeKind::Double => "double",
            NativeKind::Char => "char",
            NativeKind::String => "string",
            NativeKind::BigInt => "bigint",
            NativeKind::Decimal => "decimal",
        }
    }

    pub fn from_name(name: &str) -> Option<NativeKind> {
        NativeKind::ALL.into_iter().find(|k| k.name() == name)
    }
}

// ──────────────────────────────────────────────
// Versioned identities
// ──────────────────────────────────────────────

/// Identity of a concrete type instantiation. Version-less leaves (custom,
/// native, and wrappers of them) carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionedTypeRef {
    pub name: String,
    pub version: Option<usize>,
}

impl VersionedTypeRef {
    pub fn new(name: impl Into<String>, version: Option<usize>) -> Self {
        VersionedTypeRef {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for VersionedTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

impl Serialize for VersionedTypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ──────────────────────────────────────────────
// Code references
// ──────────────────────────────────────────────

/// Location of externally implemented migration code: either a type with a
/// zero-argument constructor, or a named static field on a holder type.
/// Lineage wires invocations of these but never executes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodeRef {
    Construct { path: String },
    StaticField { owner: String, field: String },
}

impl CodeRef {
    /// Parse `pkg.Type` or `pkg.Holder#FIELD`.
    pub fn parse(raw: &str) -> Result<CodeRef, SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidCodeRef {
            raw: raw.to_owned(),
            reason: reason.to_owned(),
        };
        let s = raw.trim();
        let valid_path = |p: &str| {
            !p.is_empty()
                && !p.starts_with('.')
                && !p.ends_with('.')
                && !p.contains("..")
                && p.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$')
        };
        match s.split_once('#') {
            Some((owner, field)) => {
                if !valid_path(owner) {
                    return Err(invalid("malformed owner type"));
                }
                if field.is_empty() || !field.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(invalid("malformed field name"));
                }
                Ok(CodeRef::StaticField {
                    owner: owner.to_owned(),
                    field: field.to_owned(),
                })
            }
            None => {
                if !valid_path(s) {
                    return Err(invalid("malformed type path"));
                }
                Ok(CodeRef::Construct { path: s.to_owned() })
            }
        }
    }
}

impl fmt::Display for CodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeRef::Construct { path } => f.write_str(path),
            CodeRef::StaticField { owner, field } => write!(f, "{}#{}", owner, field),
        }
    }
}

// ──────────────────────────────────────────────
// Transformations
// ──────────────────────────────────────────────

/// A field-level change applied to a base type when moving from the
/// previous version to the declaring version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformation {
    Move {
        type_name: String,
        from: String,
        to: String,
        index: Option<usize>,
    },
    Insert {
        type_name: String,
        to: String,
        field_type: TypeRef,
        initializer: CodeRef,
        context: Vec<String>,
        index: Option<usize>,
    },
    Remove {
        type_name: String,
        from: String,
    },
    Convert {
        type_name: String,
        from: String,
        new_type: TypeRef,
        converter: CodeRef,
        context: Vec<String>,
    },
}

impl Transformation {
    pub fn type_name(&self) -> &str {
        match self {
            Transformation::Move { type_name, .. }
            | Transformation::Insert { type_name, .. }
            | Transformation::Remove { type_name, .. }
            | Transformation::Convert { type_name, .. } => type_name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Transformation::Move { .. } => "move",
            Transformation::Insert { .. } => "insert",
            Transformation::Remove { .. } => "remove",
            Transformation::Convert { .. } => "convert",
        }
    }

    /// Context fields read from the pre-transformation instance.
    pub fn context(&self) -> &[String] {
        match self {
            Transformation::Insert { context, .. } | Transformation::Convert { context, .. } => {
                context
            }
            _ => &[],
        }
    }

    /// The type a transformation introduces into the layout, if any.
    pub fn introduced_type(&self) -> Option<&TypeRef> {
        match self {
            Transformation::Insert { field_type, .. } => Some(field_type),
            Transformation::Convert { new_type, .. } => Some(new_type),
            _ => None,
        }
    }
}
