pub mod proof_tree;
pub mod time_dag;
pub mod tree_gen;
pub mod sampling;

pub use proof_tree::{Derivation, NodeId, ProofTree, TimePoint, TraversalOrder, TreeNode};
pub use time_dag::TimeDag;
pub use sampling::{
    CanonicalOrderSampler,
    FrontMovementOrderSampler,
    OrderRequest,
    OrderSampler,
    ProblemOrder,
    VariableTimeBasedSampler,
};
