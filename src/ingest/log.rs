use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    diag::Diagnostics,
    error::ArmorError,
    rule::{
        FileAccess, IngestedRule, LogOrigin, MaskDialect, NetworkRule, PathFilter, Rule, RuleBody,
        RuleKind,
    },
};

const COMPONENT: &str = "log";

/// Prefix of the side comment carrying network metadata
pub const NETWORK_COMMENT_PREFIX: &str = "# NETCOM -";

static TIME_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*(\d+\.\d+)\]").expect("static regex"));
static AUDIT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"audit\((\d+\.\d+:\d+)\)").expect("static regex"));

/// One audit line split into its `key=value` tokens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    pub time: Option<String>,
    pub audit: Option<String>,
    fields: HashMap<String, String>,
}

impl LogRecord {
    /// Tokenize a raw line
    ///
    /// Every whitespace-separated token containing `=` is split on the first
    /// `=` only; base64 names may carry more.
    pub fn parse(line: &str) -> Self {
        let time = TIME_MARKER
            .captures(line)
            .map(|caps| caps[1].to_string());
        let audit = AUDIT_MARKER
            .captures(line)
            .map(|caps| caps[1].to_string());

        let fields = line
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self {
            time,
            audit,
            fields,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Field value with surrounding quotes removed; `None` when absent or empty
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim_matches(|c| c == '"' || c == '\''))
            .filter(|v| !v.is_empty())
    }

    /// Only lines with a non-empty `apparmor=` marker are policy events
    pub fn is_apparmor(&self) -> bool {
        self.get("apparmor").is_some()
    }

    fn operation(&self) -> &str {
        self.get("operation").unwrap_or_default()
    }

    fn origin(&self) -> LogOrigin {
        LogOrigin {
            operation: self.operation().to_string(),
            action: self.get("apparmor").unwrap_or_default().to_string(),
            pid: self.get("pid").map(str::to_string),
        }
    }
}

type Builder = fn(&LogRecord, &mut Diagnostics) -> Option<RuleBody<FileAccess>>;

struct Classifier {
    kind: RuleKind,
    matches: fn(&LogRecord) -> bool,
    build: Builder,
}

/// Record classifiers, tried in order; the first predicate that matches decides
///
/// `requested_mask` also shows up on network and signal records, so the file
/// predicate excludes those markers before accepting a mask as a file access.
const LOG_CLASSIFIERS: [Classifier; 5] = [
    Classifier {
        kind: RuleKind::File,
        matches: is_file_access,
        build: build_file_access,
    },
    Classifier {
        kind: RuleKind::Capability,
        matches: is_capability,
        build: build_capability,
    },
    Classifier {
        kind: RuleKind::Network,
        matches: |r| r.has("sock_type") || r.has("family"),
        build: build_network,
    },
    Classifier {
        kind: RuleKind::Signal,
        matches: |r| r.has("signal"),
        build: |_, _| Some(RuleBody::Signal),
    },
    Classifier {
        kind: RuleKind::Ptrace,
        matches: |r| r.operation().contains("ptrace"),
        build: |_, _| Some(RuleBody::Ptrace),
    },
];

fn is_file_access(record: &LogRecord) -> bool {
    if record.has("sock_type") || record.has("family") || record.has("signal") {
        return false;
    }
    let operation = record.operation();
    if operation.contains("ptrace") || operation.contains("capable") {
        return false;
    }
    record.has("requested_mask") || record.has("denied_mask")
}

fn is_capability(record: &LogRecord) -> bool {
    record.has("capability") || record.has("capname") || record.operation().contains("capable")
}

fn build_file_access(record: &LogRecord, diag: &mut Diagnostics) -> Option<RuleBody<FileAccess>> {
    let Some(name) = record.get("name") else {
        diag.warn(COMPONENT, record.get("profile"), "file record without a name, dropped");
        return None;
    };
    let mask = match record.get("requested_mask").or_else(|| record.get("denied_mask")) {
        Some(mask) => mask,
        None => {
            diag.warn(
                COMPONENT,
                record.get("profile"),
                format!("no requested or denied mask for {}, using rw", name),
            );
            "rw"
        }
    };
    Some(RuleBody::File(FileAccess::new(name, mask, MaskDialect::Log)))
}

fn build_capability(record: &LogRecord, _: &mut Diagnostics) -> Option<RuleBody<FileAccess>> {
    record
        .get("capname")
        .or_else(|| record.get("name"))
        .map(|name| RuleBody::Capability(name.to_string()))
}

fn build_network(record: &LogRecord, _: &mut Diagnostics) -> Option<RuleBody<FileAccess>> {
    let family = record.get("family")?;
    Some(RuleBody::Network(NetworkRule {
        family: family.to_string(),
        sock_type: record.get("sock_type").map(str::to_string),
        family_wide: true,
    }))
}

/// Pick the rule variant for a record; `None` drops the line
pub fn classify(record: &LogRecord, diag: &mut Diagnostics) -> Option<RuleBody<FileAccess>> {
    let classifier = LOG_CLASSIFIERS.iter().find(|c| (c.matches)(record))?;
    let body = (classifier.build)(record, diag);
    if body.is_none() {
        log::debug!("{:?} record could not be built: {:?}", classifier.kind, record);
    }
    body
}

/// Grouping key for the `profile=` field
///
/// Quotes are removed and anything from the first `//` on is cut, so
/// `/usr/bin/foo//null-24//null-7` groups with `/usr/bin/foo`.
pub fn normalize_profile_name(raw: &str) -> String {
    let name = raw.trim_matches(|c| c == '"' || c == '\'');
    match name.find("//") {
        Some(idx) => name[..idx].to_string(),
        None => name.to_string(),
    }
}

/// Collects canonical rules per profile from audit log lines
#[derive(Debug, Default)]
pub struct LogIngest {
    filters: Vec<PathFilter>,
    names: Vec<String>,
    entries: HashMap<String, Vec<Rule>>,
    seen_lines: HashSet<String>,
}

impl LogIngest {
    pub fn new(filters: Vec<PathFilter>) -> Self {
        Self {
            filters,
            ..Default::default()
        }
    }

    pub fn ingest_file(&mut self, path: &Path, diag: &mut Diagnostics) -> Result<(), ArmorError> {
        log::info!("Parsing log file: {}", path.display());
        let content = fs::read_to_string(path)?;
        self.ingest_str(&content, diag)
    }

    pub fn ingest_str(&mut self, content: &str, diag: &mut Diagnostics) -> Result<(), ArmorError> {
        for line in content.lines() {
            self.ingest_line(line, diag)?;
        }
        Ok(())
    }

    /// Parse one line into the per-profile rule lists
    ///
    /// Non-AppArmor and unclassifiable lines are dropped. The only error is a
    /// fatal canonicalization failure.
    pub fn ingest_line(&mut self, line: &str, diag: &mut Diagnostics) -> Result<(), ArmorError> {
        if !self.seen_lines.insert(line.to_string()) {
            return Ok(());
        }

        let record = LogRecord::parse(line);
        if !record.is_apparmor() {
            return Ok(());
        }
        let Some(body) = classify(&record, diag) else {
            return Ok(());
        };
        let Some(raw_profile) = record.get("profile") else {
            diag.warn(COMPONENT, None, format!("record without a profile, dropped: {}", line));
            return Ok(());
        };

        let name = normalize_profile_name(raw_profile);
        let origin = record.origin();
        let rule = IngestedRule::new(name.clone(), body)
            .with_origin(origin.clone())
            .canonicalize(&self.filters)?;

        let side_comment = match &rule.body {
            RuleBody::Network(net) => Some(network_comment(net, &origin)),
            _ => None,
        };

        if !self.names.contains(&name) {
            self.names.push(name.clone());
        }
        let rules = self.entries.entry(name.clone()).or_default();

        let text = rule.canonical_text();
        if !rules.iter().any(|existing| existing.canonical_text() == text) {
            rules.push(rule);
        }
        if let Some(comment) = side_comment {
            rules.push(Rule::new(name, RuleBody::Comment(comment)).with_origin(origin));
        }
        Ok(())
    }

    /// Profile names in first-seen order
    pub fn profile_names(&self) -> &[String] {
        &self.names
    }

    pub fn rules(&self, name: &str) -> Option<&[Rule]> {
        self.entries.get(name).map(Vec::as_slice)
    }
}

fn network_comment(net: &NetworkRule, origin: &LogOrigin) -> String {
    format!(
        "{} {} {} {}",
        NETWORK_COMMENT_PREFIX,
        net.family,
        net.sock_type.as_deref().unwrap_or_default(),
        origin.operation
    )
}
