use serde::{Deserialize, Serialize};

use crate::{error::ArmorError, rule::PathFilter};

/// Kind of rule line a security rule is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    #[default]
    File,
    Capability,
    Network,
    Signal,
    Ptrace,
}

/// One configured security rule
///
/// Exactly one of `permissions` (field check on file lines) or `regex`
/// (match against the whole line) is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct SecurityRuleSpec {
    #[serde(default)]
    pub object: ObjectKind,
    pub name: String,
    #[serde(default)]
    pub message: String,
    /// Flag a file line only when it grants every one of these characters
    #[serde(default)]
    pub permissions: Option<String>,
    /// Restrict the permission check to file paths matching this pattern
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// Pattern is matched against the profile's executable path
    ProfilePath,
    /// Pattern is matched against every line of the profile
    FullRegex,
}

/// Signed-off carve-out for a named security rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecurityExceptionSpec {
    pub rule: String,
    pub kind: ExceptionKind,
    pub pattern: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signoff: String,
}

/// Configured rewrite for log-derived paths
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathFilterSpec {
    pub pattern: String,
    pub replace: String,
}

impl PathFilterSpec {
    pub fn compile(&self) -> Result<PathFilter, ArmorError> {
        PathFilter::new(&self.pattern, &self.replace)
    }
}
