use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::GenerationError;
use crate::models::logical_form::{ComparisonType, FormType, LogicalForm, VariableKey};
use crate::models::properties::{PropertyTracker, PropertyType};
use crate::models::rules::{Parametrization, RuleKind};
use crate::services::proof_tree::{NodeId, ProofTree};

use super::context::TreeGenConfig;

/// Produces the slot assignment for one rule application.
///
/// Fresh identities are requested from the tree's tracker so every id it
/// hands out stays registered.
pub trait ParametrizationSampler: Send + Sync {
    fn sample(
        &self,
        rule: RuleKind,
        node: NodeId,
        tree: &mut ProofTree,
        rng: &mut StdRng,
    ) -> Result<Parametrization, GenerationError>;

    /// Root form for a tree starting with `form_type`.
    fn create_start_form(
        &self,
        form_type: FormType,
        tracker: &mut PropertyTracker,
        rng: &mut StdRng,
    ) -> Result<LogicalForm, GenerationError>;
}

/// How a fresh variable picks its entity, attribute and unit
#[derive(Debug, Clone, Copy)]
enum Kind {
    /// Same entity, attribute and unit as this key
    Like(VariableKey),
    /// Fresh entity, with a fresh attribute/unit if enabled
    Fresh,
}

#[derive(Debug, Clone, Default)]
pub struct GeneralParametrizationSampler {
    pub config: TreeGenConfig,
}

impl GeneralParametrizationSampler {
    pub fn new(config: TreeGenConfig) -> Self {
        Self { config }
    }

    fn request_var(&self, tracker: &mut PropertyTracker, kind: Kind) -> VariableKey {
        let agent = tracker.request_id(PropertyType::Agent);
        match kind {
            Kind::Like(key) => key.with_agent(agent),
            Kind::Fresh => {
                let entity = tracker.request_id(PropertyType::Entity);
                let attribute = self.config.use_attribute.then(|| tracker.request_id(PropertyType::Attribute));
                let unit = self.config.use_unit.then(|| tracker.request_id(PropertyType::Unit));
                VariableKey::new(agent, entity).with_attribute(attribute).with_unit(unit)
            }
        }
    }

    fn kind_for(&self, like: VariableKey, same_entity_prob: f64, rng: &mut StdRng) -> Kind {
        if rng.gen_bool(same_entity_prob) {
            Kind::Like(like)
        } else {
            Kind::Fresh
        }
    }

    fn pick_comparison(
        allowed: &[ComparisonType],
        rng: &mut StdRng,
    ) -> Result<ComparisonType, GenerationError> {
        allowed
            .choose(rng)
            .copied()
            .ok_or_else(|| GenerationError::violation("no comparison type allowed"))
    }

    fn holder(rule: RuleKind, node: NodeId, tree: &ProofTree) -> Result<VariableKey, GenerationError> {
        match tree.form(node) {
            Some(LogicalForm::Container { holder, .. }) => Ok(*holder),
            Some(other) => Err(GenerationError::violation(format!(
                "{} expects a container conclusion, got {}",
                rule,
                other.form_type()
            ))),
            None => Err(GenerationError::violation(format!("unknown node {}", node))),
        }
    }

    /// Entities some part-whole in the tree splits up
    fn part_whole_entities(tree: &ProofTree) -> Vec<u32> {
        tree.nodes()
            .iter()
            .filter_map(|n| match &n.form {
                LogicalForm::PartWhole { parts, .. } => Some(parts.iter().map(|p| p.entity)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn fresh_parts(&self, count: usize, tracker: &mut PropertyTracker) -> Vec<VariableKey> {
        (0..count).map(|_| self.request_var(tracker, Kind::Fresh)).collect()
    }
}

impl ParametrizationSampler for GeneralParametrizationSampler {
    fn sample(
        &self,
        rule: RuleKind,
        node: NodeId,
        tree: &mut ProofTree,
        rng: &mut StdRng,
    ) -> Result<Parametrization, GenerationError> {
        match rule {
            RuleKind::ContCompCont => {
                let holder = Self::holder(rule, node, tree)?;
                let kind = self.kind_for(holder, self.config.comp_same_entity_prob, rng);
                let other = self.request_var(tree.properties_mut(), kind);

                let mut sides = [holder, other];
                sides.shuffle(rng);
                Ok(Parametrization::Comparison {
                    comp_type: Self::pick_comparison(&self.config.comp_allowed_comparisons, rng)?,
                    subj: sides[0],
                    obj: sides[1],
                })
            }
            RuleKind::ContTransferCont => {
                let holder = Self::holder(rule, node, tree)?;
                // a counterparty holding a split entity would change the whole
                let counterparty = if Self::part_whole_entities(tree).contains(&holder.entity) {
                    None
                } else {
                    Some(tree.properties_mut().request_id(PropertyType::Agent))
                };

                let mut parties = [Some(holder.agent), counterparty];
                parties.shuffle(rng);
                Ok(Parametrization::Transfer {
                    sender: parties[0],
                    receiver: parties[1],
                    attribute: holder.attribute,
                    unit: holder.unit,
                })
            }
            RuleKind::ContCompCompeqCont => {
                let holder = Self::holder(rule, node, tree)?;
                let kind = self.kind_for(holder, self.config.compeq_same_entity_prob, rng);
                let other = self.request_var(tree.properties_mut(), kind);

                let mut sides = [holder, other];
                sides.shuffle(rng);
                let other_subj = self.request_var(tree.properties_mut(), kind);
                let other_obj = self.request_var(tree.properties_mut(), kind);
                let comp_type = Self::pick_comparison(&self.config.compeq_allowed_comparisons, rng)?;
                Ok(Parametrization::ComparisonEquality {
                    comp_type,
                    other_comp_type: comp_type,
                    subj: sides[0],
                    obj: sides[1],
                    other_subj,
                    other_obj,
                })
            }
            RuleKind::ContContComp => Ok(Parametrization::None),
            RuleKind::ContPartWhole => match tree.form(node) {
                Some(LogicalForm::PartWhole { .. }) => Ok(Parametrization::None),
                Some(LogicalForm::Container { holder, .. }) => {
                    let holder = *holder;
                    let count = rng.gen_range(self.config.min_part_whole..=self.config.max_part_whole);
                    let tracker = tree.properties_mut();
                    let whole_entity = tracker.request_id(PropertyType::Entity);

                    let mut parts = self.fresh_parts(count.saturating_sub(1), tracker);
                    parts.push(holder);
                    parts.shuffle(rng);
                    Ok(Parametrization::PartWhole {
                        whole_entity,
                        whole_attribute: holder.attribute,
                        whole_unit: holder.unit,
                        parts,
                    })
                }
                Some(other) => Err(GenerationError::violation(format!(
                    "{} cannot conclude {}",
                    rule,
                    other.form_type()
                ))),
                None => Err(GenerationError::violation(format!("unknown node {}", node))),
            },
        }
    }

    fn create_start_form(
        &self,
        form_type: FormType,
        tracker: &mut PropertyTracker,
        rng: &mut StdRng,
    ) -> Result<LogicalForm, GenerationError> {
        match form_type {
            FormType::Container => Ok(LogicalForm::container(self.request_var(tracker, Kind::Fresh))),
            FormType::Comp => {
                let subj = self.request_var(tracker, Kind::Fresh);
                let kind = self.kind_for(subj, self.config.comp_same_entity_prob, rng);
                let obj = self.request_var(tracker, kind);
                let comp_type = Self::pick_comparison(&self.config.comp_allowed_comparisons, rng)?;
                Ok(LogicalForm::comp(subj, obj, comp_type))
            }
            FormType::PartWhole => {
                let whole_attribute = self.config.use_attribute.then(|| tracker.request_id(PropertyType::Attribute));
                let whole_unit = self.config.use_unit.then(|| tracker.request_id(PropertyType::Unit));
                let count = rng.gen_range(self.config.min_part_whole..=self.config.max_part_whole);
                let parts = (0..count)
                    .map(|_| {
                        let agent = tracker.request_id(PropertyType::Agent);
                        let entity = tracker.request_id(PropertyType::Entity);
                        VariableKey::new(agent, entity)
                            .with_attribute(whole_attribute)
                            .with_unit(whole_unit)
                    })
                    .collect();
                let whole_entity = tracker.request_id(PropertyType::Entity);
                Ok(LogicalForm::part_whole(whole_entity, whole_attribute, whole_unit, parts))
            }
            other => Err(GenerationError::violation(format!(
                "starting a tree with {} is not supported",
                other
            ))),
        }
    }
}
