use std::collections::HashMap;

use crate::rule::{FileEntry, Rule, RuleBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    Added,
    Identical,
    Changed,
}

/// Outcome for one rule of the new generation
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRecord<A, B> {
    pub outcome: DiffOutcome,
    pub old: Option<Rule<A>>,
    pub new: Rule<B>,
    /// Wildcard-stripped path that paired the rules when their keys differed
    pub correlation_key: Option<String>,
}

/// Per-profile comparison result
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDiff<A, B> {
    pub records: Vec<DiffRecord<A, B>>,
    pub removed: Vec<Rule<A>>,
}

impl<A, B> ProfileDiff<A, B> {
    pub fn added(&self) -> Vec<&Rule<B>> {
        self.with_outcome(DiffOutcome::Added)
            .map(|record| &record.new)
            .collect()
    }

    /// `(old, new)` pairs
    pub fn changed(&self) -> Vec<(&Rule<A>, &Rule<B>)> {
        self.with_outcome(DiffOutcome::Changed)
            .filter_map(|record| record.old.as_ref().map(|old| (old, &record.new)))
            .collect()
    }

    pub fn identical(&self) -> usize {
        self.with_outcome(DiffOutcome::Identical).count()
    }

    /// Nothing added, changed or removed
    pub fn is_unchanged(&self) -> bool {
        self.removed.is_empty() && self.records.iter().all(|r| r.outcome == DiffOutcome::Identical)
    }

    fn with_outcome(&self, outcome: DiffOutcome) -> impl Iterator<Item = &DiffRecord<A, B>> {
        self.records.iter().filter(move |record| record.outcome == outcome)
    }
}

/// Identity used to pair a new rule with an old one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdentityKey {
    File(String),
    Capability(String),
    Network(String, String),
    Signal,
    Ptrace,
    Comment(String),
    Header(String),
    Include(String),
    Subprofile(String),
    Raw(String),
}

impl IdentityKey {
    fn of<F: FileEntry>(rule: &Rule<F>) -> Self {
        match &rule.body {
            RuleBody::File(file) => IdentityKey::File(file.path().trim_matches('"').to_string()),
            RuleBody::Capability(name) => IdentityKey::Capability(name.clone()),
            RuleBody::Network(net) => {
                let (family, sock_type) = net.key();
                IdentityKey::Network(family, sock_type)
            }
            RuleBody::Signal => IdentityKey::Signal,
            RuleBody::Ptrace => IdentityKey::Ptrace,
            RuleBody::Comment(text) => IdentityKey::Comment(text.clone()),
            RuleBody::Header(header) => IdentityKey::Header(header.name.clone()),
            RuleBody::Include(path) => IdentityKey::Include(path.clone()),
            RuleBody::Subprofile(sub) => IdentityKey::Subprofile(sub.header.name.clone()),
            RuleBody::Raw(text) => IdentityKey::Raw(text.clone()),
        }
    }
}

/// Text two paired rules are compared by; file masks are compared in canonical order
fn comparison_text<F: FileEntry>(rule: &Rule<F>) -> String {
    match &rule.body {
        RuleBody::File(file) => file.normalized_line(),
        _ => rule.canonical_text(),
    }
}

fn correlation_key<F: FileEntry>(rule: &Rule<F>) -> Option<String> {
    match &rule.body {
        RuleBody::File(file) => Some(file.correlation_key()),
        _ => None,
    }
}

/// Compare one profile's rules across two generations
///
/// Each new rule is paired with the first remaining old rule that has the same
/// identity key (path, capability name, network family and type, ...). A paired
/// rule is `Identical` when the texts agree and `Changed` otherwise; an unpaired
/// file rule is still `Changed` when its wildcard-stripped path matches a
/// remaining old file rule. Old rules that were never paired are removed.
///
/// # Arguments
/// * `old` - Rules of the previous generation, in any representation
/// * `new` - Rules of the current generation
///
/// # Returns
/// One record per new rule, in input order, plus the unpaired old rules
pub fn diff_rules<A: FileEntry, B: FileEntry>(old: &[Rule<A>], new: &[Rule<B>]) -> ProfileDiff<A, B> {
    let mut remaining: Vec<&Rule<A>> = old.iter().collect();
    let mut records = Vec::with_capacity(new.len());

    for rule in new {
        let key = IdentityKey::of(rule);
        let record = if let Some(pos) = remaining.iter().position(|o| IdentityKey::of(*o) == key) {
            let old_rule = remaining.remove(pos);
            let outcome = if comparison_text(old_rule) == comparison_text(rule) {
                DiffOutcome::Identical
            } else {
                DiffOutcome::Changed
            };
            DiffRecord {
                outcome,
                old: Some(old_rule.clone()),
                new: rule.clone(),
                correlation_key: None,
            }
        } else if let Some((pos, stripped)) = correlation_key(rule).and_then(|stripped| {
            remaining
                .iter()
                .position(|o| correlation_key(*o).as_ref() == Some(&stripped))
                .map(|pos| (pos, stripped))
        }) {
            DiffRecord {
                outcome: DiffOutcome::Changed,
                old: Some(remaining.remove(pos).clone()),
                new: rule.clone(),
                correlation_key: Some(stripped),
            }
        } else {
            DiffRecord {
                outcome: DiffOutcome::Added,
                old: None,
                new: rule.clone(),
                correlation_key: None,
            }
        };
        records.push(record);
    }

    ProfileDiff {
        records,
        removed: remaining.into_iter().cloned().collect(),
    }
}

/// Comparison of a whole generation against the previous one
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDiff<A, B> {
    /// Profiles with no counterpart in the previous generation
    pub new_profiles: Vec<String>,
    /// Per-rule results for profiles present in both generations
    pub profiles: Vec<(String, ProfileDiff<A, B>)>,
}

/// Diff every profile of the new generation, in the order given
pub fn diff_generation<A: FileEntry, B: FileEntry>(
    old: &HashMap<String, Vec<Rule<A>>>,
    new: &[(String, Vec<Rule<B>>)],
) -> GenerationDiff<A, B> {
    let mut result = GenerationDiff {
        new_profiles: Vec::new(),
        profiles: Vec::new(),
    };
    for (name, rules) in new {
        match old.get(name) {
            Some(old_rules) => result
                .profiles
                .push((name.clone(), diff_rules(old_rules, rules))),
            None => result.new_profiles.push(name.clone()),
        }
    }
    result
}
