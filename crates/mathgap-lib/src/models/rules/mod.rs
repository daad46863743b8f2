pub mod inference;
pub mod parametrization;
pub mod container;
pub mod comp;
pub mod part_whole;

pub use inference::{default_variable_times, InferenceRule, RuleKind};
pub use parametrization::Parametrization;
pub use container::{ContCompCompeqCont, ContCompCont, ContTransferCont};
pub use comp::ContContComp;
pub use part_whole::ContPartWhole;
