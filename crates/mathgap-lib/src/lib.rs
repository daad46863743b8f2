//! Proof-tree generation for math word problems.
//!
//! Trees are built backwards from a conclusion with a closed set of
//! inference rules, their quantities are composed symbolically, and the
//! temporal annotations left by the rules give the orders in which the
//! facts of a problem may be stated.

pub mod error;
pub mod models;
pub mod services;

pub use error::{EvalError, GenerationError};
pub use models::rules::{InferenceRule, Parametrization, RuleKind};
pub use services::proof_tree::{NodeId, ProofTree};
pub use services::time_dag::TimeDag;
