use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::GenerationError;
use crate::models::expression::ExprId;
use crate::models::properties::PropertyKey;

/// How the subject of a comparison relates to its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    /// subj has `q` more than obj
    MoreThan,
    /// subj has `q` less than obj
    LessThan,
    /// subj has `q` times as many as obj
    TimesAsMany,
    /// subj has `1/q` of what obj has
    FractionOf,
}

impl ComparisonType {
    pub fn is_additive(&self) -> bool {
        matches!(self, ComparisonType::MoreThan | ComparisonType::LessThan)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComparisonType::MoreThan => "more_than",
            ComparisonType::LessThan => "less_than",
            ComparisonType::TimesAsMany => "times_as_many",
            ComparisonType::FractionOf => "fraction_of",
        }
    }
}

/// What one agent holds: agent, entity and the optional attribute and unit.
///
/// This is the identity tuple rules match on and the key temporal
/// annotations are attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableKey {
    pub agent: u32,
    pub entity: u32,
    pub attribute: Option<u32>,
    pub unit: Option<u32>,
}

impl VariableKey {
    pub fn new(agent: u32, entity: u32) -> Self {
        Self { agent, entity, attribute: None, unit: None }
    }

    pub fn with_attribute(mut self, attribute: Option<u32>) -> Self {
        self.attribute = attribute;
        self
    }

    pub fn with_unit(mut self, unit: Option<u32>) -> Self {
        self.unit = unit;
        self
    }

    /// Same entity, attribute and unit held by another agent
    pub fn with_agent(mut self, agent: u32) -> Self {
        self.agent = agent;
        self
    }

    pub fn property_keys(&self) -> Vec<PropertyKey> {
        let mut keys = vec![PropertyKey::agent(self.agent), PropertyKey::entity(self.entity)];
        keys.extend(self.attribute.map(PropertyKey::attribute));
        keys.extend(self.unit.map(PropertyKey::unit));
        keys
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", PropertyKey::agent(self.agent), PropertyKey::entity(self.entity))?;
        if let Some(attribute) = self.attribute {
            write!(f, ".{}", PropertyKey::attribute(attribute))?;
        }
        if let Some(unit) = self.unit {
            write!(f, ".{}", PropertyKey::unit(unit))?;
        }
        Ok(())
    }
}

/// Per entity slot: whether it carries a unit and which entities make it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub entity: u32,
    pub part_entities: Vec<u32>,
    pub attribute: Option<u32>,
    pub unit: Option<u32>,
}

impl EntitySpec {
    fn simple(key: &VariableKey) -> Self {
        Self {
            entity: key.entity,
            part_entities: Vec::new(),
            attribute: key.attribute,
            unit: key.unit,
        }
    }

    pub fn has_unit(&self) -> bool {
        self.unit.is_some()
    }

    pub fn has_part_entities(&self) -> bool {
        !self.part_entities.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FormType {
    Container,
    Transfer,
    Comp,
    CompEq,
    PartWhole,
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormType::Container => "Container",
            FormType::Transfer => "Transfer",
            FormType::Comp => "Comp",
            FormType::CompEq => "CompEq",
            FormType::PartWhole => "PartWhole",
        };
        f.write_str(name)
    }
}

/// A typed proposition with symbolic identity slots.
///
/// `quantity` starts unset and is assigned exactly once by symbolic
/// computation. `CompEq` is purely relational and has no quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogicalForm {
    /// `holder` has `quantity`
    Container {
        holder: VariableKey,
        quantity: Option<ExprId>,
    },
    /// `sender` gives `quantity` of an entity to `receiver`
    Transfer {
        receiver: Option<u32>,
        sender: Option<u32>,
        entity: u32,
        attribute: Option<u32>,
        unit: Option<u32>,
        quantity: Option<ExprId>,
    },
    /// `subj` compares to `obj` by `quantity`
    Comp {
        subj: VariableKey,
        obj: VariableKey,
        comp_type: ComparisonType,
        quantity: Option<ExprId>,
    },
    /// subj compares to obj exactly as other_subj compares to other_obj
    CompEq {
        subj: VariableKey,
        obj: VariableKey,
        comp_type: ComparisonType,
        other_subj: VariableKey,
        other_obj: VariableKey,
        other_comp_type: ComparisonType,
    },
    /// all parts together have `quantity` of the whole entity
    PartWhole {
        whole_entity: u32,
        whole_attribute: Option<u32>,
        whole_unit: Option<u32>,
        parts: Vec<VariableKey>,
        quantity: Option<ExprId>,
    },
}

impl LogicalForm {
    pub fn container(holder: VariableKey) -> Self {
        LogicalForm::Container { holder, quantity: None }
    }

    pub fn comp(subj: VariableKey, obj: VariableKey, comp_type: ComparisonType) -> Self {
        LogicalForm::Comp { subj, obj, comp_type, quantity: None }
    }

    pub fn part_whole(
        whole_entity: u32,
        whole_attribute: Option<u32>,
        whole_unit: Option<u32>,
        parts: Vec<VariableKey>,
    ) -> Self {
        LogicalForm::PartWhole {
            whole_entity,
            whole_attribute,
            whole_unit,
            parts,
            quantity: None,
        }
    }

    pub fn form_type(&self) -> FormType {
        match self {
            LogicalForm::Container { .. } => FormType::Container,
            LogicalForm::Transfer { .. } => FormType::Transfer,
            LogicalForm::Comp { .. } => FormType::Comp,
            LogicalForm::CompEq { .. } => FormType::CompEq,
            LogicalForm::PartWhole { .. } => FormType::PartWhole,
        }
    }

    pub fn quantity(&self) -> Option<ExprId> {
        match self {
            LogicalForm::Container { quantity, .. }
            | LogicalForm::Transfer { quantity, .. }
            | LogicalForm::Comp { quantity, .. }
            | LogicalForm::PartWhole { quantity, .. } => *quantity,
            LogicalForm::CompEq { .. } => None,
        }
    }

    /// Whether this form carries a quantity slot at all
    pub fn has_quantity(&self) -> bool {
        !matches!(self, LogicalForm::CompEq { .. })
    }

    /// Assign the quantity. A form's quantity can only be assigned once.
    pub fn set_quantity(&mut self, value: ExprId) -> Result<(), GenerationError> {
        let slot = match self {
            LogicalForm::Container { quantity, .. }
            | LogicalForm::Transfer { quantity, .. }
            | LogicalForm::Comp { quantity, .. }
            | LogicalForm::PartWhole { quantity, .. } => quantity,
            LogicalForm::CompEq { .. } => {
                return Err(GenerationError::violation(
                    "comparison equality carries no quantity",
                ))
            }
        };
        if let Some(existing) = slot {
            return Err(GenerationError::violation(format!(
                "quantity already assigned ({}), refusing {}",
                existing, value
            )));
        }
        *slot = Some(value);
        Ok(())
    }

    /// Identity equality: every slot except the quantity matches.
    pub fn slot_eq(&self, other: &LogicalForm) -> bool {
        match (self, other) {
            (LogicalForm::Container { holder: a, .. }, LogicalForm::Container { holder: b, .. }) => a == b,
            (
                LogicalForm::Transfer { receiver: r1, sender: s1, entity: e1, attribute: a1, unit: u1, .. },
                LogicalForm::Transfer { receiver: r2, sender: s2, entity: e2, attribute: a2, unit: u2, .. },
            ) => r1 == r2 && s1 == s2 && e1 == e2 && a1 == a2 && u1 == u2,
            (
                LogicalForm::Comp { subj: s1, obj: o1, comp_type: c1, .. },
                LogicalForm::Comp { subj: s2, obj: o2, comp_type: c2, .. },
            ) => s1 == s2 && o1 == o2 && c1 == c2,
            (a @ LogicalForm::CompEq { .. }, b @ LogicalForm::CompEq { .. }) => a == b,
            (
                LogicalForm::PartWhole { whole_entity: e1, whole_attribute: a1, whole_unit: u1, parts: p1, .. },
                LogicalForm::PartWhole { whole_entity: e2, whole_attribute: a2, whole_unit: u2, parts: p2, .. },
            ) => e1 == e2 && a1 == a2 && u1 == u2 && p1 == p2,
            _ => false,
        }
    }

    /// Variable keys this form states something about, in slot order.
    /// A transfer lists its receiver before its sender.
    pub fn variable_keys(&self) -> Vec<VariableKey> {
        match self {
            LogicalForm::Container { holder, .. } => vec![*holder],
            LogicalForm::Transfer { receiver, sender, entity, attribute, unit, .. } => [receiver, sender]
                .into_iter()
                .flatten()
                .map(|agent| VariableKey {
                    agent: *agent,
                    entity: *entity,
                    attribute: *attribute,
                    unit: *unit,
                })
                .collect(),
            LogicalForm::Comp { subj, obj, .. } => vec![*subj, *obj],
            LogicalForm::CompEq { subj, obj, other_subj, other_obj, .. } => {
                vec![*subj, *obj, *other_subj, *other_obj]
            }
            LogicalForm::PartWhole { parts, .. } => parts.clone(),
        }
    }

    /// Every identity property this form references, sorted and deduplicated.
    pub fn property_keys(&self) -> Vec<PropertyKey> {
        let mut keys: BTreeSet<PropertyKey> = self
            .variable_keys()
            .iter()
            .flat_map(|vk| vk.property_keys())
            .collect();

        match self {
            LogicalForm::Transfer { entity, attribute, unit, .. } => {
                keys.insert(PropertyKey::entity(*entity));
                keys.extend(attribute.map(PropertyKey::attribute));
                keys.extend(unit.map(PropertyKey::unit));
            }
            LogicalForm::PartWhole { whole_entity, whole_attribute, whole_unit, .. } => {
                keys.insert(PropertyKey::entity(*whole_entity));
                keys.extend(whole_attribute.map(PropertyKey::attribute));
                keys.extend(whole_unit.map(PropertyKey::unit));
            }
            _ => {}
        }

        keys.into_iter().collect()
    }

    pub fn entity_specs(&self) -> Vec<EntitySpec> {
        match self {
            LogicalForm::Container { holder, .. } => vec![EntitySpec::simple(holder)],
            LogicalForm::Transfer { entity, attribute, unit, .. } => vec![EntitySpec {
                entity: *entity,
                part_entities: Vec::new(),
                attribute: *attribute,
                unit: *unit,
            }],
            LogicalForm::Comp { subj, obj, .. } => vec![EntitySpec::simple(subj), EntitySpec::simple(obj)],
            LogicalForm::CompEq { subj, obj, other_subj, other_obj, .. } => [subj, obj, other_subj, other_obj]
                .into_iter()
                .map(EntitySpec::simple)
                .collect(),
            LogicalForm::PartWhole { whole_entity, whole_attribute, whole_unit, parts, .. } => {
                vec![EntitySpec {
                    entity: *whole_entity,
                    part_entities: parts.iter().map(|p| p.entity).collect(),
                    attribute: *whole_attribute,
                    unit: *whole_unit,
                }]
            }
        }
    }
}

fn fmt_quantity(quantity: &Option<ExprId>) -> String {
    quantity.map(|q| q.to_string()).unwrap_or_else(|| "?".to_string())
}

impl fmt::Display for LogicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalForm::Container { holder, quantity } => {
                write!(f, "cont({}, {})", holder, fmt_quantity(quantity))
            }
            LogicalForm::Transfer { receiver, sender, entity, quantity, .. } => {
                let agent = |a: &Option<u32>| a.map(|a| PropertyKey::agent(a).to_string()).unwrap_or_else(|| "-".to_string());
                write!(
                    f,
                    "transfer({} -> {}, {}, {})",
                    agent(sender),
                    agent(receiver),
                    PropertyKey::entity(*entity),
                    fmt_quantity(quantity)
                )
            }
            LogicalForm::Comp { subj, obj, comp_type, quantity } => {
                write!(f, "comp({} {} {}, {})", subj, comp_type.label(), obj, fmt_quantity(quantity))
            }
            LogicalForm::CompEq { subj, obj, comp_type, other_subj, other_obj, other_comp_type } => write!(
                f,
                "compeq({} {} {} == {} {} {})",
                subj,
                comp_type.label(),
                obj,
                other_subj,
                other_comp_type.label(),
                other_obj
            ),
            LogicalForm::PartWhole { whole_entity, parts, quantity, .. } => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(
                    f,
                    "partwhole({} = [{}], {})",
                    PropertyKey::entity(*whole_entity),
                    parts.join(", "),
                    fmt_quantity(quantity)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_quantity_once() {
        let mut form = LogicalForm::container(VariableKey::new(1, 1));
        assert!(form.set_quantity(ExprId(0)).is_ok());
        assert_eq!(form.quantity(), Some(ExprId(0)));
        let err = form.set_quantity(ExprId(1)).unwrap_err();
        assert!(matches!(err, GenerationError::ConstraintViolation { .. }));
        assert_eq!(form.quantity(), Some(ExprId(0)));
    }

    #[test]
    fn test_compeq_has_no_quantity() {
        let vk = VariableKey::new(1, 1);
        let mut form = LogicalForm::CompEq {
            subj: vk,
            obj: vk.with_agent(2),
            comp_type: ComparisonType::MoreThan,
            other_subj: vk.with_agent(3),
            other_obj: vk.with_agent(4),
            other_comp_type: ComparisonType::MoreThan,
        };
        assert!(!form.has_quantity());
        assert!(form.set_quantity(ExprId(0)).is_err());
        assert_eq!(form.variable_keys().len(), 4);
    }

    #[test]
    fn test_slot_eq_ignores_quantity() {
        let a = LogicalForm::comp(VariableKey::new(1, 1), VariableKey::new(2, 1), ComparisonType::MoreThan);
        let mut b = a.clone();
        b.set_quantity(ExprId(4)).unwrap();
        assert!(a.slot_eq(&b));
        assert_ne!(a, b);

        let c = LogicalForm::comp(VariableKey::new(1, 1), VariableKey::new(2, 1), ComparisonType::LessThan);
        assert!(!a.slot_eq(&c));
        assert!(!a.slot_eq(&LogicalForm::container(VariableKey::new(1, 1))));
    }

    #[test]
    fn test_transfer_keys_and_properties() {
        let form = LogicalForm::Transfer {
            receiver: Some(1),
            sender: None,
            entity: 2,
            attribute: None,
            unit: Some(3),
            quantity: None,
        };
        assert_eq!(form.variable_keys(), vec![VariableKey::new(1, 2).with_unit(Some(3))]);
        assert_eq!(
            form.property_keys(),
            vec![PropertyKey::agent(1), PropertyKey::entity(2), PropertyKey::unit(3)]
        );
        assert!(form.entity_specs()[0].has_unit());
    }

    #[test]
    fn test_part_whole_entity_spec() {
        let form = LogicalForm::part_whole(5, None, None, vec![VariableKey::new(1, 1), VariableKey::new(2, 2)]);
        let specs = form.entity_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].entity, 5);
        assert_eq!(specs[0].part_entities, vec![1, 2]);
        assert!(specs[0].has_part_entities());
        assert!(!specs[0].has_unit());
    }

    #[test]
    fn test_display() {
        let form = LogicalForm::container(VariableKey::new(1, 2).with_attribute(Some(3)));
        assert_eq!(form.to_string(), "cont(agent_1.entity_2.attribute_3, ?)");
    }
}
