//! Errors raised while building, linking and flattening source files

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// An authoring mistake in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DslError {
    #[error("Block `{0}` is already defined")]
    DuplicateBlock(String),

    #[error("Field `{field}` is already defined in `{block}`")]
    DuplicateField { block: String, field: String },

    #[error("Nested block `{name}` in `{block}` is not permitted")]
    NestedBlock { block: String, name: String },

    #[error("Field `{path}` is not defined in `{block}`")]
    UndefinedField { block: String, path: String },

    #[error("Circular inheritance detected")]
    CircularInheritance,

    #[error("Parent type `{parent}` not found for `{derived}`")]
    ParentNotFound { parent: String, derived: String },

    #[error("Cannot resolve path `{0}` for retyping")]
    RetypePathNotFound(String),

    #[error("Cannot retype `{0}`: field does not exist")]
    RetypeFieldMissing(String),

    #[error("Cannot retype to `{0}`: type not linked")]
    RetypeTargetUnlinked(String),

    #[error("Cannot expand for-loop in `{block}`: {message}")]
    ForLoop { block: String, message: String },
}

/// Every authoring error found in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct DslErrors(pub Vec<DslError>);

impl fmt::Display for DslErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("\n"))
    }
}

impl DslErrors {
    pub fn single(error: DslError) -> Self {
        DslErrors(vec![error])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DslError> {
        self.0.iter()
    }

    pub fn contains(&self, error: &DslError) -> bool {
        self.0.contains(error)
    }
}

impl From<DslError> for DslErrors {
    fn from(error: DslError) -> Self {
        DslErrors::single(error)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode statements in `{}`: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No source registered for `{}`", .0.display())]
    Missing(PathBuf),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Unable to resolve import `{0}`")]
    ImportPathNotFound(String),

    #[error("Circular import detected at `{0}`")]
    CircularImport(String),

    #[error("Unknown stdlib type: {0}")]
    UnknownStdlibType(String),

    #[error("`{name}` is not defined in `{path}`")]
    SymbolNotFound { name: String, path: String },

    #[error("Unresolved type references remaining after linking: {}", .0.join(", "))]
    UnresolvedTypeReferences(Vec<String>),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to build `{}`:\n{source}", .path.display())]
    Build {
        path: PathBuf,
        #[source]
        source: DslErrors,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid project config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid package identifier `{0}`: expected `owner/name`")]
    InvalidPackage(String),
}
