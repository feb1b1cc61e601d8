pub mod check;
pub mod model;
pub mod provider;

pub use check::{SecurityCheck, Violation, enforce};
pub use model::{
    ExceptionKind, ObjectKind, PathFilterSpec, SecurityExceptionSpec, SecurityRuleSpec,
};
pub use provider::{BuiltinTable, PolicyConfigProvider};

#[cfg(test)]
pub use provider::MockPolicyConfigProvider;
