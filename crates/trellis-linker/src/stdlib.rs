//! Built-in type definitions shared by every compilation

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use trellis_core::{TypeGraph, TypeNode};

use crate::statements::BlockKind;

/// Read-only recipe for one built-in type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdlibDefinition {
    pub name: String,
    pub kind: BlockKind,
    pub parent: Option<String>,
    /// `(identifier, type name)` in declaration order.
    pub children: Vec<(String, String)>,
    pub traits: Vec<String>,
}

impl StdlibDefinition {
    fn new(name: &str, kind: BlockKind) -> Self {
        StdlibDefinition {
            name: name.to_string(),
            kind,
            parent: None,
            children: Vec::new(),
            traits: Vec::new(),
        }
    }

    fn child(mut self, identifier: &str, type_name: &str) -> Self {
        self.children
            .push((identifier.to_string(), type_name.to_string()));
        self
    }

    fn extends(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    fn with_trait(mut self, name: &str) -> Self {
        self.traits.push(name.to_string());
        self
    }
}

/// Name to definition table.
///
/// Holds no graph state, so one registry can be shared behind an `Arc` by
/// many compilations. Definitions are materialized into a [`TypeGraph`] on
/// first use and reused from that graph afterwards.
#[derive(Debug, Clone)]
pub struct StdlibRegistry {
    definitions: BTreeMap<String, StdlibDefinition>,
    allowlist: Option<BTreeSet<String>>,
}

impl StdlibRegistry {
    pub fn empty() -> Self {
        StdlibRegistry {
            definitions: BTreeMap::new(),
            allowlist: None,
        }
    }

    /// The electrical primitives and passives.
    pub fn builtin() -> Self {
        use BlockKind::{Component, Interface};

        let mut registry = Self::empty();
        registry.define(StdlibDefinition::new("Electrical", Interface));
        registry.define(
            StdlibDefinition::new("ElectricPower", Interface)
                .child("hv", "Electrical")
                .child("lv", "Electrical"),
        );
        registry.define(
            StdlibDefinition::new("ElectricLogic", Interface)
                .child("line", "Electrical")
                .child("reference", "ElectricPower"),
        );
        registry.define(
            StdlibDefinition::new("I2C", Interface)
                .child("scl", "ElectricLogic")
                .child("sda", "ElectricLogic"),
        );
        for passive in ["Resistor", "Capacitor", "Inductor"] {
            registry.define(
                StdlibDefinition::new(passive, Component)
                    .child("p1", "Electrical")
                    .child("p2", "Electrical")
                    .with_trait("can_bridge"),
            );
        }
        registry.define(
            StdlibDefinition::new("Diode", Component)
                .child("anode", "Electrical")
                .child("cathode", "Electrical")
                .with_trait("can_bridge"),
        );
        registry.define(StdlibDefinition::new("LED", Component).extends("Diode"));
        registry
    }

    pub fn define(&mut self, definition: StdlibDefinition) {
        self.definitions
            .insert(definition.name.clone(), definition);
    }

    /// Restrict lookups to `names`.
    pub fn with_allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definition(name).is_some()
    }

    pub fn definition(&self, name: &str) -> Option<&StdlibDefinition> {
        let allowed = self
            .allowlist
            .as_ref()
            .map_or(true, |allow| allow.contains(name));
        if allowed {
            self.definitions.get(name)
        } else {
            None
        }
    }

    /// Visible definition names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.definitions
            .keys()
            .map(String::as_str)
            .filter(|n| self.contains(n))
            .collect()
    }

    /// The built-in `name` inside `graph`, materializing it (and the types it
    /// depends on) the first time. `None` for unknown or disallowed names.
    pub fn get(&self, graph: &mut TypeGraph, name: &str) -> Option<TypeNode> {
        self.materialize(graph, name, &mut Vec::new())
    }

    fn materialize(
        &self,
        graph: &mut TypeGraph,
        name: &str,
        visiting: &mut Vec<String>,
    ) -> Option<TypeNode> {
        if let Some(existing) = graph.builtin(name) {
            return Some(existing);
        }
        let definition = self.definition(name)?;
        if visiting.iter().any(|v| v == name) {
            return None;
        }
        visiting.push(name.to_string());

        let parent = match &definition.parent {
            Some(parent) => Some(self.materialize(graph, parent, visiting)?),
            None => None,
        };
        let mut children = Vec::with_capacity(definition.children.len());
        for (identifier, type_name) in &definition.children {
            children.push((identifier, self.materialize(graph, type_name, visiting)?));
        }

        let ty = graph.add_type(name);
        graph.add_trait(ty, definition.kind.trait_name());
        for trait_name in &definition.traits {
            graph.add_trait(ty, trait_name);
        }
        for (identifier, child) in children {
            graph.add_make_child(ty, child, identifier);
        }
        if let Some(parent) = parent {
            let own: Vec<String> = definition.children.iter().map(|(id, _)| id.clone()).collect();
            graph.copy_type_structure(ty, parent, &own);
            graph.set_parent_type(ty, parent);
        }
        graph.register_builtin(name, ty);
        visiting.pop();

        debug!(ty = name, "materialized built-in");
        Some(ty)
    }
}

impl Default for StdlibRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
