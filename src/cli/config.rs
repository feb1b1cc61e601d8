use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ArmorError,
    policy::{PathFilterSpec, PolicyConfigProvider, SecurityExceptionSpec, SecurityRuleSpec},
};

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ConfigFile {
    /// Security rules, evaluated in file order
    #[serde(default, rename = "rule")]
    pub rules: Vec<SecurityRuleSpec>,
    /// Signed-off exceptions to the rules above
    #[serde(default, rename = "exception")]
    pub exceptions: Vec<SecurityExceptionSpec>,
    /// Path rewrites for log-derived file rules
    #[serde(default, rename = "filter")]
    pub filters: Vec<PathFilterSpec>,
}

impl ConfigFile {
    /// Load configuration file
    pub fn load(path: &Path) -> Result<Self, ArmorError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| ArmorError::ConfigParse {
            path: PathBuf::from(path),
            source,
        })
    }
}

impl PolicyConfigProvider for ConfigFile {
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
