use std::collections::HashMap;

use crate::{
    diag::Diagnostics,
    error::ArmorError,
    rule::{IngestedRule, Rule, RuleBody},
};

const COMPONENT: &str = "merge";

/// Identity of a log-derived rule; rules with equal keys collapse into one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MergeKey {
    File(String),
    Capability(String),
    Network(String, String),
    Signal,
    Ptrace,
    Comment(String),
}

impl MergeKey {
    fn of(rule: &Rule) -> Option<Self> {
        match &rule.body {
            RuleBody::File(file) => Some(MergeKey::File(file.path().to_string())),
            RuleBody::Capability(name) => Some(MergeKey::Capability(name.clone())),
            RuleBody::Network(net) => {
                let (family, sock_type) = net.key();
                Some(MergeKey::Network(family, sock_type))
            }
            RuleBody::Signal => Some(MergeKey::Signal),
            RuleBody::Ptrace => Some(MergeKey::Ptrace),
            RuleBody::Comment(text) => Some(MergeKey::Comment(text.clone())),
            _ => None,
        }
    }
}

/// Collapse log-derived rules to one representative per [`MergeKey`]
///
/// File masks are unioned, the last capability seen replaces earlier ones in
/// place, and everything else keeps its first occurrence.
fn collapse_log_rules(log_rules: &[Rule]) -> Vec<Rule> {
    let mut reps: Vec<Rule> = Vec::new();
    let mut slots: HashMap<MergeKey, usize> = HashMap::new();

    for rule in log_rules {
        let Some(key) = MergeKey::of(rule) else {
            reps.push(rule.clone());
            continue;
        };
        let Some(&slot) = slots.get(&key) else {
            slots.insert(key, reps.len());
            reps.push(rule.clone());
            continue;
        };
        if let (RuleBody::File(held), RuleBody::File(seen)) = (&mut reps[slot].body, &rule.body) {
            held.widen(seen.mask());
        } else if matches!(rule.body, RuleBody::Capability(_)) {
            reps[slot] = rule.clone();
        }
    }
    reps
}

/// Canonical file-derived rules, deduplicated by value only
fn collect_file_rules(
    profile: &str,
    file_rules: &[IngestedRule],
    diag: &mut Diagnostics,
) -> Result<Vec<Rule>, ArmorError> {
    let mut kept: Vec<Rule> = Vec::new();
    for rule in file_rules {
        if matches!(rule.body, RuleBody::Header(_)) {
            continue;
        }
        let rule = rule.clone().canonicalize(&[])?;
        if kept.contains(&rule) {
            continue;
        }
        if let RuleBody::File(file) = &rule.body {
            let same_path = kept
                .iter()
                .any(|k| matches!(&k.body, RuleBody::File(other) if other.path() == file.path()));
            if same_path {
                diag.warn(
                    COMPONENT,
                    Some(profile),
                    format!("{} appears more than once with different permissions, not merged", file.path()),
                );
            }
        }
        kept.push(rule);
    }
    Ok(kept)
}

/// Combine file-derived and log-derived rules of one profile
///
/// A log-derived file rule absorbs every file-derived rule on the same path,
/// unioning their masks. File-derived rules come first in the result; final
/// output order is decided at serialization.
pub fn merge_profile_rules(
    profile: &str,
    file_rules: &[IngestedRule],
    log_rules: &[Rule],
    diag: &mut Diagnostics,
) -> Result<Vec<Rule>, ArmorError> {
    let mut from_file = collect_file_rules(profile, file_rules, diag)?;
    let mut from_log = collapse_log_rules(log_rules);

    for rep in &mut from_log {
        let RuleBody::File(held) = &mut rep.body else {
            continue;
        };
        from_file.retain(|rule| match &rule.body {
            RuleBody::File(file) if file.path() == held.path() => {
                held.widen(file.mask());
                false
            }
            _ => true,
        });
    }

    log::debug!(
        "{}: {} rules kept from file, {} from logs",
        profile,
        from_file.len(),
        from_log.len()
    );
    from_file.extend(from_log);
    Ok(from_file)
}
