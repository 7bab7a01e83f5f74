//! Parsed statements as produced by the upstream parser
//!
//! A source file arrives as a JSON document:
//!
//! ```json
//! { "statements": [
//!     { "stmt": "import", "name": "Resistor" },
//!     { "stmt": "block", "kind": "module", "name": "App", "body": [
//!         { "item": "new", "field": "r1", "type_name": "Resistor" },
//!         { "item": "connect", "lhs": "r1.p1", "rhs": "r1.p2" }
//!     ] }
//! ] }
//! ```

use serde::{Deserialize, Serialize};
use trellis_core::{IS_COMPONENT, IS_INTERFACE, IS_MODULE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl SourceFile {
    pub fn new(statements: Vec<Statement>) -> Self {
        SourceFile { statements }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// A top-level statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Statement {
    /// `import Name` when `path` is `None`, otherwise `from "path" import Name`.
    Import {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Block(BlockDef),
}

impl Statement {
    pub fn import(name: &str) -> Self {
        Statement::Import {
            name: name.to_string(),
            path: None,
        }
    }

    pub fn import_from(path: &str, name: &str) -> Self {
        Statement::Import {
            name: name.to_string(),
            path: Some(path.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Module,
    Component,
    Interface,
}

impl BlockKind {
    /// Trait attached to every type declared with this keyword.
    pub fn trait_name(self) -> &'static str {
        match self {
            BlockKind::Module => IS_MODULE,
            BlockKind::Component => IS_COMPONENT,
            BlockKind::Interface => IS_INTERFACE,
        }
    }
}

/// `module Name from Parent:` followed by an indented body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    pub kind: BlockKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub body: Vec<BodyItem>,
}

impl BlockDef {
    pub fn new(kind: BlockKind, name: &str) -> Self {
        BlockDef {
            kind,
            name: name.to_string(),
            parent: None,
            body: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn with(mut self, item: BodyItem) -> Self {
        self.body.push(item);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum BodyItem {
    /// `field = new TypeName`
    New { field: String, type_name: String },
    /// `lhs ~ rhs`, or `lhs ~> rhs` when directional.
    Connect {
        lhs: String,
        rhs: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        directional: bool,
        /// Indirect relation instead of an electrical connection.
        #[serde(default)]
        pointer: bool,
    },
    /// `target -> TypeName`
    Retype { target: String, type_name: String },
    /// `trait name`
    Trait { name: String },
    Pass,
    /// Kept verbatim for the for-loop expander.
    ForLoop { raw: String },
    /// Only valid at the top level; rejected by the builder.
    Block(BlockDef),
}

impl BodyItem {
    pub fn new_field(field: &str, type_name: &str) -> Self {
        BodyItem::New {
            field: field.to_string(),
            type_name: type_name.to_string(),
        }
    }

    pub fn connect(lhs: &str, rhs: &str) -> Self {
        BodyItem::Connect {
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
            name: None,
            directional: false,
            pointer: false,
        }
    }

    pub fn retype(target: &str, type_name: &str) -> Self {
        BodyItem::Retype {
            target: target.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

/// Split a dotted field path. Empty segments are dropped.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
