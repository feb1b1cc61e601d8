use std::fmt;

use regex::Regex;

use super::{
    model::{ExceptionKind, ObjectKind, SecurityExceptionSpec, SecurityRuleSpec},
    provider::PolicyConfigProvider,
};
use crate::{diag::Diagnostics, error::ArmorError};

const COMPONENT: &str = "security";

/// Unsuppressed match of a security rule against a profile line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub exe_path: String,
    pub rule_name: String,
    pub message: String,
    pub line: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "profile {}: violation {} ({}) on line: {}",
            self.exe_path, self.rule_name, self.message, self.line
        )
    }
}

/// Compiled test of one security rule
#[derive(Debug)]
enum RuleCheck {
    Regex(Regex),
    Permissions { chars: String, path: Option<Regex> },
}

impl RuleCheck {
    fn matches(&self, line: &str) -> bool {
        match self {
            RuleCheck::Regex(regex) => regex.is_match(line),
            RuleCheck::Permissions { chars, path } => {
                let Some((file_path, perms)) = file_line_fields(line) else {
                    return false;
                };
                if path.as_ref().is_some_and(|p| !p.is_match(file_path)) {
                    return false;
                }
                chars.chars().all(|c| perms.contains(c))
            }
        }
    }
}

/// Path and permission token of a file rule line; `None` for any other line
fn file_line_fields(line: &str) -> Option<(&str, &str)> {
    let mut tokens = line.split_whitespace();
    let path = tokens.next()?;
    let perms = tokens.next()?.trim_end_matches(',');
    if !path.starts_with('/') || !perms.contains(['r', 'w', 'm', 'x', 'a', 'c', 'd']) {
        return None;
    }
    Some((path, perms))
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    message: String,
    check: RuleCheck,
}

#[derive(Debug)]
struct CompiledException {
    rule: String,
    kind: ExceptionKind,
    pattern: Regex,
}

fn compile(pattern: &str, context: String) -> Result<Regex, ArmorError> {
    Regex::new(pattern).map_err(|source| ArmorError::InvalidPattern {
        pattern: pattern.to_string(),
        context,
        source,
    })
}

impl CompiledRule {
    fn new(spec: &SecurityRuleSpec) -> Result<Self, ArmorError> {
        let invalid = |reason: &str| ArmorError::InvalidSecurityRule {
            name: spec.name.clone(),
            reason: reason.to_string(),
        };
        let context = format!("security rule {}", spec.name);

        let check = match (&spec.regex, &spec.permissions) {
            (Some(regex), None) => RuleCheck::Regex(compile(regex, context)?),
            (None, Some(chars)) => {
                if spec.object != ObjectKind::File {
                    return Err(invalid("permission checks are only supported on file rules"));
                }
                if chars.is_empty() {
                    return Err(invalid("permission set is empty"));
                }
                let path = spec
                    .path
                    .as_deref()
                    .map(|p| compile(p, context))
                    .transpose()?;
                RuleCheck::Permissions {
                    chars: chars.clone(),
                    path,
                }
            }
            (Some(_), Some(_)) => return Err(invalid("set either regex or permissions, not both")),
            (None, None) => return Err(invalid("one of regex or permissions is required")),
        };

        Ok(Self {
            name: spec.name.clone(),
            message: spec.message.clone(),
            check,
        })
    }
}

/// Evaluates generated profiles against the configured security rules
#[derive(Debug, Default)]
pub struct SecurityCheck {
    rules: Vec<CompiledRule>,
    exceptions: Vec<CompiledException>,
}

impl SecurityCheck {
    /// Compile every rule and exception pattern up front
    pub fn new(
        rules: &[SecurityRuleSpec],
        exceptions: &[SecurityExceptionSpec],
    ) -> Result<Self, ArmorError> {
        let rules = rules
            .iter()
            .map(CompiledRule::new)
            .collect::<Result<Vec<_>, _>>()?;
        let exceptions = exceptions
            .iter()
            .map(|spec| {
                Ok(CompiledException {
                    rule: spec.rule.clone(),
                    kind: spec.kind,
                    pattern: compile(&spec.pattern, format!("exception for {}", spec.rule))?,
                })
            })
            .collect::<Result<Vec<_>, ArmorError>>()?;
        log::debug!(
            "security check loaded {} rules, {} exceptions",
            rules.len(),
            exceptions.len()
        );
        Ok(Self { rules, exceptions })
    }

    pub fn from_provider(provider: &dyn PolicyConfigProvider) -> Result<Self, ArmorError> {
        Self::new(&provider.security_rules(), &provider.security_exceptions())
    }

    /// Check every line of one profile against every rule
    ///
    /// Returns all unsuppressed matches; the caller decides whether to abort.
    pub fn check_profile(&self, exe_path: &str, lines: &[String]) -> Vec<Violation> {
        let mut violations = Vec::new();
        for line in lines {
            for rule in &self.rules {
                if !rule.check.matches(line) {
                    continue;
                }
                if self.is_excepted(rule, exe_path, lines) {
                    log::info!("Exception found for {} in {}: {}", rule.name, exe_path, line);
                    continue;
                }
                violations.push(Violation {
                    exe_path: exe_path.to_string(),
                    rule_name: rule.name.clone(),
                    message: rule.message.clone(),
                    line: line.clone(),
                });
            }
        }
        violations
    }

    fn is_excepted(&self, rule: &CompiledRule, exe_path: &str, lines: &[String]) -> bool {
        self.exceptions
            .iter()
            .filter(|exception| exception.rule == rule.name)
            .any(|exception| match exception.kind {
                ExceptionKind::ProfilePath => exception.pattern.is_match(exe_path),
                ExceptionKind::FullRegex => lines.iter().any(|l| exception.pattern.is_match(l)),
            })
    }
}

/// Turn collected violations into the fatal error, logging each one
pub fn enforce(violations: Vec<Violation>, diag: &mut Diagnostics) -> Result<(), ArmorError> {
    if violations.is_empty() {
        return Ok(());
    }
    for violation in &violations {
        diag.error(
            COMPONENT,
            Some(violation.exe_path.as_str()),
            format!(
                "security violation {} ({}) on line: {}",
                violation.rule_name, violation.message, violation.line
            ),
        );
    }
    Err(ArmorError::SecurityViolations(violations))
}
