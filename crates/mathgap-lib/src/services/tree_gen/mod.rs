mod context;
mod criteria;
mod policy;
mod params;
mod builder;

pub use context::TreeGenConfig;
pub use criteria::{
    AnyCriterion,
    BranchDepthCriterion,
    ExhaustedCriterion,
    StoppingCriterion,
    TreeDepthCriterion,
    TreeWidthCriterion,
};
pub use policy::{NonlinearPolicy, RuleSamplingPolicy, UniformPolicy};
pub use params::{GeneralParametrizationSampler, ParametrizationSampler};
pub use builder::{GeneralGenerator, Generator, MultiGenerator};
