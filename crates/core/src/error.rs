use serde::Serialize;

/// Top-level error taxonomy. Every [`SchemaError`] maps to exactly one
/// category; the CLI reports the category alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    ConfigurationStructureError,
    UnknownTypeReference,
    DuplicateTypeName,
    FieldOperationConflict,
    StructuralNestingViolation,
    UpgradeConsistencyError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ConfigurationStructureError => "ConfigurationStructureError",
            ErrorCategory::UnknownTypeReference => "UnknownTypeReference",
            ErrorCategory::DuplicateTypeName => "DuplicateTypeName",
            ErrorCategory::FieldOperationConflict => "FieldOperationConflict",
            ErrorCategory::StructuralNestingViolation => "StructuralNestingViolation",
            ErrorCategory::UpgradeConsistencyError => "UpgradeConsistencyError",
        }
    }
}

/// A compilation error. All errors are fatal: the pipeline stops at the
/// first one and produces no partial output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    // ── Version chain ────────────────────────────────────────────────
    #[error("no root version: every version declares a previous version")]
    NoRoot,

    #[error("multiple root versions: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("version '{previous}' is claimed as previous by both '{first}' and '{second}'")]
    MultipleNext {
        previous: String,
        first: String,
        second: String,
    },

    #[error("root version '{0}' declares transformations")]
    RootHasTransformations(String),

    #[error("version '{version}' names unknown previous version '{previous}'")]
    UnknownVersion { version: String, previous: String },

    #[error(
        "version chain ends at '{found}' after visiting {visited} of {total} versions, \
         but the current version is '{expected}'"
    )]
    CurrentMismatch {
        expected: String,
        found: String,
        visited: usize,
        total: usize,
    },

    #[error("invalid code reference '{raw}': {reason}")]
    InvalidCodeRef { raw: String, reason: String },

    #[error("interface inheritance cycle: {0}")]
    InterfaceCycle(String),

    #[error(
        "super type '{super_type}' renumbers member '{member}' from discriminant \
         {before} to {after} at version {version}"
    )]
    DiscriminantRenumbered {
        super_type: String,
        member: String,
        before: u32,
        after: u32,
        version: usize,
    },

    // ── Type references ──────────────────────────────────────────────
    #[error("unknown type '{name}' referenced by {context}")]
    UnknownType { name: String, context: String },

    #[error("type '{name}' has no node at version {version}")]
    TypeNotFound { name: String, version: usize },

    #[error("transformation in version '{version}' targets '{name}', which is not a base type")]
    NotABaseType { name: String, version: String },

    #[error("type name '{name}' declared as both {first} and {second}")]
    DuplicateTypeName {
        name: String,
        first: String,
        second: String,
    },

    // ── Field operations ─────────────────────────────────────────────
    #[error("field '{field}' is missing from '{type_name}' in version '{version}'")]
    FieldMissing {
        type_name: String,
        field: String,
        version: String,
    },

    #[error("field '{field}' already exists in '{type_name}' in version '{version}'")]
    SlotOccupied {
        type_name: String,
        field: String,
        version: String,
    },

    #[error(
        "index {index} is out of range for '{type_name}' ({len} fields) in version '{version}'"
    )]
    IndexOutOfRange {
        type_name: String,
        index: usize,
        len: usize,
        version: String,
    },

    #[error("type '{type_name}' implements '{interface}' but field '{field}' {problem}")]
    InterfaceMismatch {
        type_name: String,
        interface: String,
        field: String,
        problem: String,
    },

    // ── Nesting ──────────────────────────────────────────────────────
    #[error("illegal type reference '{raw}': {reason}")]
    StructuralNesting { raw: String, reason: String },

    // ── Upgrade derivation ───────────────────────────────────────────
    #[error(
        "upgrade of '{type_name}' from {from} to {to} produced fields [{}] \
         but the target declares [{}]",
        .actual.join(", "),
        .expected.join(", ")
    )]
    UpgradeConsistency {
        type_name: String,
        from: String,
        to: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchemaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SchemaError::NoRoot
            | SchemaError::MultipleRoots(_)
            | SchemaError::MultipleNext { .. }
            | SchemaError::RootHasTransformations(_)
            | SchemaError::UnknownVersion { .. }
            | SchemaError::CurrentMismatch { .. }
            | SchemaError::InvalidCodeRef { .. }
            | SchemaError::InterfaceCycle(_)
            | SchemaError::DiscriminantRenumbered { .. } => {
                ErrorCategory::ConfigurationStructureError
            }
            SchemaError::UnknownType { .. }
            | SchemaError::TypeNotFound { .. }
            | SchemaError::NotABaseType { .. } => ErrorCategory::UnknownTypeReference,
            SchemaError::DuplicateTypeName { .. } => ErrorCategory::DuplicateTypeName,
            SchemaError::FieldMissing { .. }
            | SchemaError::SlotOccupied { .. }
            | SchemaError::IndexOutOfRange { .. }
            | SchemaError::InterfaceMismatch { .. } => ErrorCategory::FieldOperationConflict,
            SchemaError::StructuralNesting { .. } => ErrorCategory::StructuralNestingViolation,
            SchemaError::UpgradeConsistency { .. } | SchemaError::Internal(_) => {
                ErrorCategory::UpgradeConsistencyError
            }
        }
    }

    pub(crate) fn unknown_type(name: &str, context: impl Into<String>) -> Self {
        SchemaError::UnknownType {
            name: name.to_owned(),
            context: context.into(),
        }
    }

    pub(crate) fn nesting(raw: &str, reason: impl Into<String>) -> Self {
        SchemaError::StructuralNesting {
            raw: raw.to_owned(),
            reason: reason.into(),
        }
    }

    /// Serialize to the JSON shape printed by `lineage --output json`.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "category": self.category().as_str(),
            "message":  self.to_string(),
        })
    }
}
