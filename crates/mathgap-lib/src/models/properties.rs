use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of world objects a proof tree can refer to before instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Agent,
    Entity,
    Attribute,
    Unit,
    Quantity,
}

impl PropertyType {
    pub fn label(&self) -> &'static str {
        match self {
            PropertyType::Agent => "agent",
            PropertyType::Entity => "entity",
            PropertyType::Attribute => "attribute",
            PropertyType::Unit => "unit",
            PropertyType::Quantity => "quantity",
        }
    }
}

/// Symbolic reference to a distinct world object.
///
/// Two keys denote the same object iff type and id are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyKey {
    pub property_type: PropertyType,
    pub id: u32,
}

impl PropertyKey {
    pub fn new(property_type: PropertyType, id: u32) -> Self {
        Self { property_type, id }
    }

    pub fn agent(id: u32) -> Self {
        Self::new(PropertyType::Agent, id)
    }

    pub fn entity(id: u32) -> Self {
        Self::new(PropertyType::Entity, id)
    }

    pub fn attribute(id: u32) -> Self {
        Self::new(PropertyType::Attribute, id)
    }

    pub fn unit(id: u32) -> Self {
        Self::new(PropertyType::Unit, id)
    }

    pub fn quantity(id: u32) -> Self {
        Self::new(PropertyType::Quantity, id)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.property_type.label(), self.id)
    }
}

/// Hands out property ids and remembers every id it handed out, per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTracker {
    used_ids: BTreeMap<PropertyType, Vec<u32>>,
}

impl PropertyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a free id for a property of the given type.
    /// Ids start at 1 and are never reused within a tracker.
    pub fn request_id(&mut self, property_type: PropertyType) -> u32 {
        let ids = self.used_ids.entry(property_type).or_default();
        let next = ids.iter().copied().max().unwrap_or(0) + 1;
        ids.push(next);
        next
    }

    pub fn request_key(&mut self, property_type: PropertyType) -> PropertyKey {
        PropertyKey::new(property_type, self.request_id(property_type))
    }

    /// Record an id that was handed out elsewhere. Returns false if it was
    /// already known.
    pub fn register(&mut self, key: PropertyKey) -> bool {
        let ids = self.used_ids.entry(key.property_type).or_default();
        if ids.contains(&key.id) {
            return false;
        }
        ids.push(key.id);
        true
    }

    pub fn get_by_type(&self, property_type: PropertyType) -> &[u32] {
        self.used_ids
            .get(&property_type)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_registered(&self, key: &PropertyKey) -> bool {
        self.get_by_type(key.property_type).contains(&key.id)
    }

    /// Number of ids handed out over all types
    pub fn len(&self) -> usize {
        self.used_ids.values().map(|ids| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
