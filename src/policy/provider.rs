#[cfg(test)]
use mockall::automock;

use super::model::{PathFilterSpec, SecurityExceptionSpec, SecurityRuleSpec};

/// Source of the security rule, exception and path filter tables
#[cfg_attr(test, automock)]
pub trait PolicyConfigProvider {
    /// Security rules in evaluation order
    fn security_rules(&self) -> Vec<SecurityRuleSpec>;
    fn security_exceptions(&self) -> Vec<SecurityExceptionSpec>;
    fn path_filters(&self) -> Vec<PathFilterSpec>;
}

/// Tables compiled into the binary
///
/// The shipped tables are empty; callers and tests fill them through the builders.
#[derive(Debug, Clone, Default)]
pub struct BuiltinTable {
    rules: Vec<SecurityRuleSpec>,
    exceptions: Vec<SecurityExceptionSpec>,
    filters: Vec<PathFilterSpec>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: SecurityRuleSpec) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_exception(mut self, exception: SecurityExceptionSpec) -> Self {
        self.exceptions.push(exception);
        self
    }

    pub fn with_filter(mut self, filter: PathFilterSpec) -> Self {
        self.filters.push(filter);
        self
    }
}

impl PolicyConfigProvider for BuiltinTable {
    fn security_rules(&self) -> Vec<SecurityRuleSpec> {
        self.rules.clone()
    }

    fn security_exceptions(&self) -> Vec<SecurityExceptionSpec> {
        self.exceptions.clone()
    }

    fn path_filters(&self) -> Vec<PathFilterSpec> {
        self.filters.clone()
    }
}
