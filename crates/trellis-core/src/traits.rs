//! Trait catalog: capability lookup with most-specific-match resolution

use std::collections::BTreeMap;

pub const IS_MODULE: &str = "is_module";
pub const IS_COMPONENT: &str = "is_component";
pub const IS_INTERFACE: &str = "is_interface";

/// Known traits and the trait each one specializes.
///
/// Asking a type for `is_module` is satisfied by an attached `is_component`,
/// because components are modules. When several attached traits satisfy a
/// query the deepest one in the hierarchy wins.
#[derive(Debug, Clone)]
pub struct TraitCatalog {
    parents: BTreeMap<String, Option<String>>,
}

impl TraitCatalog {
    /// A catalog with no traits at all.
    pub fn empty() -> Self {
        TraitCatalog {
            parents: BTreeMap::new(),
        }
    }

    /// The block traits every compilation knows about.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(IS_MODULE, None);
        catalog.register(IS_COMPONENT, Some(IS_MODULE));
        catalog.register(IS_INTERFACE, None);
        catalog
    }

    /// Register a trait, optionally specializing `parent`.
    pub fn register(&mut self, name: &str, parent: Option<&str>) {
        self.parents
            .insert(name.to_string(), parent.map(str::to_string));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    /// `name` followed by each trait it specializes, nearest first.
    pub fn lineage(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = name;
        while let Some(Some(parent)) = self.parents.get(current) {
            // A malformed catalog could loop; stop at the first repeat.
            if chain.iter().any(|c| c == parent) {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// Whether an attached `candidate` answers a query for `wanted`.
    pub fn satisfies(&self, candidate: &str, wanted: &str) -> bool {
        self.lineage(candidate).iter().any(|t| t == wanted)
    }

    /// Distance from the root of the hierarchy; larger is more specific.
    pub fn depth(&self, name: &str) -> usize {
        self.lineage(name).len() - 1
    }

    /// Pick the most specific of `attached` that satisfies `wanted`.
    /// Ties go to the earliest attachment.
    pub fn most_specific<'a>(&self, attached: &'a [String], wanted: &str) -> Option<&'a str> {
        attached
            .iter()
            .filter(|t| self.satisfies(t, wanted))
            .fold(None::<&'a String>, |best, t| match best {
                Some(b) if self.depth(b) >= self.depth(t) => Some(b),
                _ => Some(t),
            })
            .map(String::as_str)
    }
}

impl Default for TraitCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
