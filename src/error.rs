use thiserror::Error;

use std::path::PathBuf;

use crate::policy::Violation;

#[derive(Debug, Error)]
pub enum ArmorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile path is a directory, not a profile file: {path}")]
    IsDirectory { path: PathBuf },

    #[error(
        "library canonicalization produced the defective entry {sentinel} from {original}; \
         check the inputs for existing \"lib*.so*\" entries or report the filename"
    )]
    DefectiveLibraryPath { original: String, sentinel: String },

    #[error("no '/' found in library path: {original}")]
    MalformedLibraryPath { original: String },

    #[error("profile header is missing a name or executable path (name: '{name}', path: '{path}')")]
    EmptyProfileHeader { name: String, path: String },

    #[error("rule generation failed due to {} security violation(s)", .0.len())]
    SecurityViolations(Vec<Violation>),

    #[error("invalid pattern '{pattern}' in {context}: {source}")]
    InvalidPattern {
        pattern: String,
        context: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid security rule '{name}': {reason}")]
    InvalidSecurityRule { name: String, reason: String },

    #[error("fully qualified path to the process is required: {path}")]
    InvalidSkeletonPath { path: String },

    #[error("--profile-dir is required unless --create is given")]
    MissingProfileDir,
}

impl ArmorError {
    /// Fatal errors abort the whole run; everything else is reported per input.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ArmorError::IsDirectory { .. })
    }
}
