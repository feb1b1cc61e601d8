use std::fmt;

use regex::Regex;

use super::{
    library::{is_library_path, wildcard_library_version},
    mask::{MaskDialect, PermissionMask},
};
use crate::error::ArmorError;

/// Behaviour shared by as-ingested and canonical file rules, used by the diff engine
pub trait FileEntry: Clone + fmt::Debug + PartialEq {
    /// Path as it appears in this rule
    fn path(&self) -> &str;
    /// `<path> <mask>` line as this rule would be written
    fn line(&self) -> String;
    /// `<path> <mask>` with the mask in canonical letter order, for text comparison
    fn normalized_line(&self) -> String;
    /// Canonical path with every `*` removed; stable across library re-versioning
    fn correlation_key(&self) -> String;
}

/// File access exactly as read from a log record or a profile line
///
/// Nothing has been normalized yet: the mask is the raw text and the path may
/// still be quoted, hex encoded or carry a library version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAccess {
    pub path: String,
    pub mask: String,
    pub dialect: MaskDialect,
}

/// Canonical file access rule
///
/// Only [`FileAccess::canonicalize`] builds one, so a `FileRule` can never be
/// normalized twice: it no longer has the raw mask to normalize from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRule {
    path: String,
    mask: PermissionMask,
}

/// Path rewrite applied to log-derived file rules after canonicalization
///
/// The pattern needs two capture groups: the first is replaced by `replace`,
/// the second is kept as the remainder of the path.
#[derive(Debug, Clone)]
pub struct PathFilter {
    pattern: Regex,
    replace: String,
}

impl PathFilter {
    pub fn new(pattern: &str, replace: &str) -> Result<Self, ArmorError> {
        let compiled = Regex::new(pattern).map_err(|source| ArmorError::InvalidPattern {
            pattern: pattern.to_string(),
            context: "path filter".to_string(),
            source,
        })?;
        Ok(Self {
            pattern: compiled,
            replace: replace.to_string(),
        })
    }

    fn apply(&self, path: &str) -> Option<String> {
        let caps = self.pattern.captures(path)?;
        let rest = caps.get(2).map_or("", |m| m.as_str());
        Some(format!("{}{}", self.replace, rest))
    }
}

impl FileAccess {
    pub fn new(path: impl Into<String>, mask: impl Into<String>, dialect: MaskDialect) -> Self {
        Self {
            path: path.into(),
            mask: mask.into(),
            dialect,
        }
    }

    /// Normalize path and mask into a [`FileRule`]
    ///
    /// Log paths are unquoted, hex-decoded when they start with `2F` and made
    /// absolute. Library paths get version wildcards, then `filters` rewrite the
    /// path (log dialect only).
    pub fn canonicalize(self, filters: &[PathFilter]) -> Result<FileRule, ArmorError> {
        let mask = PermissionMask::parse(&self.mask, self.dialect);

        let mut path = self.path.trim_matches('"').to_string();
        if self.dialect == MaskDialect::Log {
            path = decode_hex_path(path);
            if !path.contains('/') {
                path.insert(0, '/');
            }
        }

        if is_library_path(&path) {
            path = wildcard_library_version(&path)?;
        }

        if self.dialect == MaskDialect::Log {
            for filter in filters {
                if let Some(rewritten) = filter.apply(&path) {
                    path = rewritten;
                }
            }
        }

        Ok(FileRule { path, mask })
    }
}

/// Audit records sometimes hex-encode names; an undecodable name is kept as-is
fn decode_hex_path(path: String) -> String {
    if path.len() <= 2 || !path.starts_with("2F") {
        return path;
    }
    match hex::decode(&path) {
        Ok(bytes) if bytes.is_ascii() => String::from_utf8(bytes).unwrap_or(path),
        _ => {
            log::debug!("name looks hex encoded but does not decode: {}", path);
            path
        }
    }
}

impl FileRule {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mask(&self) -> &PermissionMask {
        &self.mask
    }

    /// Grant every permission in `other` as well
    pub fn widen(&mut self, other: &PermissionMask) {
        self.mask.union(other);
    }

    /// Number of path separators, used to order file rules
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

impl fmt::Display for FileRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.mask)
    }
}

impl FileEntry for FileRule {
    fn path(&self) -> &str {
        &self.path
    }

    fn line(&self) -> String {
        self.to_string()
    }

    fn normalized_line(&self) -> String {
        self.to_string()
    }

    fn correlation_key(&self) -> String {
        self.path.replace('*', "")
    }
}

impl FileEntry for FileAccess {
    fn path(&self) -> &str {
        &self.path
    }

    fn line(&self) -> String {
        format!("{} {}", self.path, self.mask)
    }

    fn normalized_line(&self) -> String {
        format!(
            "{} {}",
            self.path.trim_matches('"'),
            PermissionMask::parse(&self.mask, self.dialect)
        )
    }

    fn correlation_key(&self) -> String {
        let canonical = if is_library_path(&self.path) {
            wildcard_library_version(&self.path).unwrap_or_else(|_| self.path.clone())
        } else {
            self.path.clone()
        };
        canonical.replace('*', "")
    }
}
