pub mod properties;
pub mod expression;
pub mod logical_form;
pub mod timing;
pub mod rules;

pub use properties::*;
pub use expression::*;
pub use logical_form::*;
pub use timing::*;
