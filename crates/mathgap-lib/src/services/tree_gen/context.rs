use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::models::logical_form::{ComparisonType, FormType};
use crate::models::rules::RuleKind;

/// Configuration for proof tree generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeGenConfig {
    /// Form types the root may be drawn from
    pub start_types: Vec<FormType>,
    /// Rules the generator may apply, in priority order for weighted policies
    pub rules: Vec<RuleKind>,
    /// Fewest parts a sampled part-whole gets
    pub min_part_whole: usize,
    /// Most parts a sampled part-whole gets
    pub max_part_whole: usize,
    /// Probability that a comparison stays within the conclusion's entity
    pub comp_same_entity_prob: f64,
    /// Probability that the borrowed comparison of a comp-eq uses the conclusion's entity
    pub compeq_same_entity_prob: f64,
    pub comp_allowed_comparisons: Vec<ComparisonType>,
    pub compeq_allowed_comparisons: Vec<ComparisonType>,
    /// Whether fresh entities carry an attribute
    pub use_attribute: bool,
    /// Whether fresh entities carry a unit
    pub use_unit: bool,
}

impl Default for TreeGenConfig {
    fn default() -> Self {
        Self {
            start_types: vec![FormType::Container],
            rules: RuleKind::ALL.to_vec(),
            min_part_whole: 2,
            max_part_whole: 4,
            comp_same_entity_prob: 0.5,
            compeq_same_entity_prob: 1.0,
            comp_allowed_comparisons: vec![ComparisonType::MoreThan, ComparisonType::LessThan],
            compeq_allowed_comparisons: vec![ComparisonType::MoreThan],
            use_attribute: false,
            use_unit: false,
        }
    }
}

impl TreeGenConfig {
    /// Preset for a target branch depth.
    /// Deep trees drop the part-whole converse, it grows the frontier fastest.
    pub fn for_depth(depth: usize) -> Self {
        let mut config = Self::default();
        if depth >= 4 {
            config.rules.retain(|r| *r != RuleKind::ContPartWhole);
            config.max_part_whole = 3;
        }
        if depth <= 1 {
            config.start_types = vec![FormType::Container, FormType::Comp, FormType::PartWhole];
        }
        config
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.use_attribute && self.use_unit {
            return Err(GenerationError::violation(
                "attributes and units cannot be used together",
            ));
        }
        if self.start_types.is_empty() {
            return Err(GenerationError::violation("at least one start type is required"));
        }
        if self.rules.is_empty() {
            return Err(GenerationError::violation("at least one inference rule is required"));
        }
        if self.min_part_whole < 2 || self.min_part_whole > self.max_part_whole {
            return Err(GenerationError::violation(format!(
                "part-whole bounds {}..={} must satisfy 2 <= min <= max",
                self.min_part_whole, self.max_part_whole
            )));
        }
        for (name, p) in [
            ("comp_same_entity_prob", self.comp_same_entity_prob),
            ("compeq_same_entity_prob", self.compeq_same_entity_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(GenerationError::violation(format!("{} must be within [0, 1], got {}", name, p)));
            }
        }
        if self.comp_allowed_comparisons.is_empty() || self.compeq_allowed_comparisons.is_empty() {
            return Err(GenerationError::violation("allowed comparison lists cannot be empty"));
        }
        Ok(())
    }
}
