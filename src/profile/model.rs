use std::collections::HashMap;

use crate::{
    error::ArmorError,
    rule::{LogOrigin, ProfileHeader, Rule, RuleBody, sort_for_output},
};

const INDENT: &str = "    ";

/// Flags written when the loaded profile carried none
pub const DEFAULT_FLAGS: &str = "complain";

/// Output file name used when none can be derived from the executable path
pub const LOST_AND_FOUND: &str = "lostandfound";

/// Output file name for an executable path: `/usr/bin/foo` becomes `usr.bin.foo`
pub fn profile_filename(exe_path: &str) -> String {
    let name = exe_path.replace('/', ".");
    name.strip_prefix('.').unwrap_or(&name).to_string()
}

/// Policy of one confined process for the current generation
#[derive(Debug, Clone, Default)]
pub struct ProcessProfile {
    pub name: String,
    pub exe_path: String,
    pub filename: String,
    pub flags: Option<String>,
    /// Lines written above the header, such as `#include <tunables/global>`
    pub preamble: Vec<String>,
    rules: Vec<Rule>,
    /// Canonical text of every held rule, mapped to the log record it came from
    origins: HashMap<String, Option<LogOrigin>>,
}

impl ProcessProfile {
    pub fn new(name: impl Into<String>, exe_path: impl Into<String>) -> Self {
        let exe_path = exe_path.into();
        Self {
            name: name.into(),
            filename: profile_filename(&exe_path),
            exe_path,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: Option<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_preamble(mut self, preamble: Vec<String>) -> Self {
        self.preamble = preamble;
        self
    }

    /// Add a rule unless one with the same canonical text is already held
    ///
    /// Header rules are ignored; the header is rendered from the profile fields.
    pub fn push(&mut self, rule: Rule) -> bool {
        if matches!(rule.body, RuleBody::Header(_)) {
            return false;
        }
        let text = rule.canonical_text();
        if self.origins.contains_key(&text) {
            return false;
        }
        self.origins.insert(text, rule.origin.clone());
        self.rules.push(rule);
        true
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Log metadata of the rule with this canonical text, if it came from a log
    pub fn origin(&self, text: &str) -> Option<&LogOrigin> {
        self.origins.get(text).and_then(Option::as_ref)
    }

    pub fn header(&self) -> ProfileHeader {
        ProfileHeader {
            name: self.name.clone(),
            path: self.exe_path.clone(),
            flags: Some(self.flags.clone().unwrap_or_else(|| DEFAULT_FLAGS.to_string())),
        }
    }

    /// Rule lines in output order, without indentation, as the security check sees them
    pub fn rule_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for rule in self.sorted_rules() {
            render_rule(&rule, "", &mut out);
        }
        out
    }

    fn sorted_rules(&self) -> Vec<Rule> {
        let mut rules = self.rules.clone();
        sort_for_output(&mut rules);
        rules
    }

    /// Render the profile text, optionally preceded by a generation stamp comment
    pub fn serialize(&self, stamp: Option<&str>) -> Result<String, ArmorError> {
        if self.name.is_empty() || self.exe_path.is_empty() {
            return Err(ArmorError::EmptyProfileHeader {
                name: self.name.clone(),
                path: self.exe_path.clone(),
            });
        }

        let mut lines = Vec::new();
        if let Some(stamp) = stamp {
            lines.push(format!("# Automated profile generated on {}", stamp));
        }
        lines.extend(self.preamble.iter().cloned());
        lines.push(format!("{} {{", self.header()));
        for rule in self.sorted_rules() {
            render_rule(&rule, INDENT, &mut lines);
        }
        lines.push("}".to_string());

        let mut text = lines.join("\n");
        text.push('\n');
        Ok(text)
    }
}

fn render_rule(rule: &Rule, indent: &str, out: &mut Vec<String>) {
    match &rule.body {
        RuleBody::Subprofile(sub) => {
            out.push(format!("{}{} {{", indent, sub.header));
            let inner = format!("{}{}", indent, INDENT);
            for nested in &sub.rules {
                render_rule(nested, &inner, out);
            }
            out.push(format!("{}}}", indent));
        }
        _ if rule.is_structural() => out.push(format!("{}{}", indent, rule.canonical_text())),
        _ => out.push(format!("{}{},", indent, rule.canonical_text())),
    }
}
