use std::fmt;

use super::file::{FileAccess, FileEntry, FileRule, PathFilter};
use crate::error::ArmorError;

/// Kind tag of a rule, independent of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    Header,
    Include,
    Capability,
    Network,
    Comment,
    Signal,
    Ptrace,
    File,
    Raw,
    Subprofile,
}

impl RuleKind {
    /// Serialization group; lower values are written first
    pub fn priority(self) -> u8 {
        match self {
            RuleKind::Header => 0,
            RuleKind::Include => 5,
            RuleKind::Capability => 10,
            RuleKind::Network => 20,
            RuleKind::Comment => 25,
            RuleKind::Signal => 30,
            RuleKind::Ptrace => 35,
            RuleKind::File => 40,
            RuleKind::Raw => 50,
            RuleKind::Subprofile => 60,
        }
    }
}

/// Audit metadata kept for rules that came from a log line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOrigin {
    pub operation: String,
    pub action: String,
    pub pid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkRule {
    pub family: String,
    pub sock_type: Option<String>,
    /// Written as `network <family>` even when a socket type was observed
    pub family_wide: bool,
}

impl NetworkRule {
    /// Identity used by merge and diff: (address family, socket type)
    pub fn key(&self) -> (String, String) {
        (
            self.family.clone(),
            self.sock_type.clone().unwrap_or_default(),
        )
    }
}

impl fmt::Display for NetworkRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sock_type, self.family_wide) {
            (Some(sock_type), false) => write!(f, "network {} {}", self.family, sock_type),
            _ => write!(f, "network {}", self.family),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProfileHeader {
    pub name: String,
    pub path: String,
    /// Contents of `flags=(...)`, without the parentheses
    pub flags: Option<String>,
}

impl fmt::Display for ProfileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "profile {} {}", self.name, self.path)?;
        if let Some(flags) = &self.flags {
            write!(f, " flags=({})", flags)?;
        }
        Ok(())
    }
}

/// Nested profile block for an exec transition, carried as one rule of its parent
#[derive(Debug, Clone, PartialEq)]
pub struct Subprofile<F = FileRule> {
    pub header: ProfileHeader,
    pub rules: Vec<Rule<F>>,
}

/// Payload of a rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleBody<F = FileRule> {
    File(F),
    Capability(String),
    Network(NetworkRule),
    Signal,
    Ptrace,
    Comment(String),
    Header(ProfileHeader),
    Include(String),
    Subprofile(Subprofile<F>),
    /// Unrecognized profile line, kept verbatim and never transformed
    Raw(String),
}

/// One policy rule
///
/// `F` is the file-access representation: [`FileAccess`] straight out of an
/// ingest parser, [`FileRule`] once [`Rule::canonicalize`] has run.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule<F = FileRule> {
    pub body: RuleBody<F>,
    /// Owning profile name
    pub profile: String,
    pub origin: Option<LogOrigin>,
}

/// Rule as produced by the ingest parsers
pub type IngestedRule = Rule<FileAccess>;

impl<F> Rule<F> {
    pub fn new(profile: impl Into<String>, body: RuleBody<F>) -> Self {
        Self {
            body,
            profile: profile.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: LogOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn kind(&self) -> RuleKind {
        match &self.body {
            RuleBody::File(_) => RuleKind::File,
            RuleBody::Capability(_) => RuleKind::Capability,
            RuleBody::Network(_) => RuleKind::Network,
            RuleBody::Signal => RuleKind::Signal,
            RuleBody::Ptrace => RuleKind::Ptrace,
            RuleBody::Comment(_) => RuleKind::Comment,
            RuleBody::Header(_) => RuleKind::Header,
            RuleBody::Include(_) => RuleKind::Include,
            RuleBody::Subprofile(_) => RuleKind::Subprofile,
            RuleBody::Raw(_) => RuleKind::Raw,
        }
    }

    pub fn priority(&self) -> u8 {
        self.kind().priority()
    }

    /// Lines that are written without a trailing comma
    pub fn is_structural(&self) -> bool {
        matches!(
            self.kind(),
            RuleKind::Header | RuleKind::Subprofile | RuleKind::Include | RuleKind::Comment
        )
    }
}

impl<F: FileEntry> Rule<F> {
    /// Minimal profile-syntax text of the rule, without indentation or trailing comma
    ///
    /// Subprofiles render as their whole block, one inner rule per line.
    pub fn canonical_text(&self) -> String {
        match &self.body {
            RuleBody::File(file) => file.line(),
            RuleBody::Capability(name) => format!("capability {}", name),
            RuleBody::Network(net) => net.to_string(),
            RuleBody::Signal => "signal".to_string(),
            RuleBody::Ptrace => "ptrace".to_string(),
            RuleBody::Comment(text) => text.clone(),
            RuleBody::Header(header) => header.to_string(),
            RuleBody::Include(path) => format!("#include {}", path),
            RuleBody::Subprofile(sub) => {
                let mut text = format!("{} {{", sub.header);
                for rule in &sub.rules {
                    text.push('\n');
                    text.push_str(&rule.canonical_text());
                    if !rule.is_structural() {
                        text.push(',');
                    }
                }
                text.push_str("\n}");
                text
            }
            RuleBody::Raw(text) => text.clone(),
        }
    }
}

impl Rule<FileAccess> {
    /// Convert an as-ingested rule into its canonical form
    ///
    /// File accesses, including those nested in subprofiles, are normalized;
    /// every other variant is carried over unchanged.
    pub fn canonicalize(self, filters: &[PathFilter]) -> Result<Rule<FileRule>, ArmorError> {
        let body = match self.body {
            RuleBody::File(access) => RuleBody::File(access.canonicalize(filters)?),
            RuleBody::Subprofile(sub) => RuleBody::Subprofile(Subprofile {
                header: sub.header,
                rules: sub
                    .rules
                    .into_iter()
                    .map(|rule| rule.canonicalize(filters))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            RuleBody::Capability(name) => RuleBody::Capability(name),
            RuleBody::Network(net) => RuleBody::Network(net),
            RuleBody::Signal => RuleBody::Signal,
            RuleBody::Ptrace => RuleBody::Ptrace,
            RuleBody::Comment(text) => RuleBody::Comment(text),
            RuleBody::Header(header) => RuleBody::Header(header),
            RuleBody::Include(path) => RuleBody::Include(path),
            RuleBody::Raw(text) => RuleBody::Raw(text),
        };
        Ok(Rule {
            body,
            profile: self.profile,
            origin: self.origin,
        })
    }
}

/// Stable sort into serialization order
///
/// Kinds are grouped by priority; file rules are ordered deepest path first,
/// then lexically. Everything else keeps its relative order.
pub fn sort_for_output(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        a.priority().cmp(&b.priority()).then_with(|| match (&a.body, &b.body) {
            (RuleBody::File(fa), RuleBody::File(fb)) => fb
                .depth()
                .cmp(&fa.depth())
                .then_with(|| fa.path().cmp(fb.path())),
            _ => std::cmp::Ordering::Equal,
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::mask::MaskDialect;

    fn file(path: &str, mask: &str) -> Rule {
        Rule::new("p", RuleBody::File(FileAccess::new(path, mask, MaskDialect::Profile)))
            .canonicalize(&[])
            .unwrap()
    }

    #[test]
    fn canonical_text_per_variant() {
        assert_eq!(
            Rule::<FileRule>::new("p", RuleBody::Capability("CAP_SETUID".into())).canonical_text(),
            "capability CAP_SETUID"
        );
        let net = NetworkRule {
            family: "inet".into(),
            sock_type: Some("stream".into()),
            family_wide: true,
        };
        assert_eq!(
            Rule::<FileRule>::new("p", RuleBody::Network(net)).canonical_text(),
            "network inet"
        );
        assert_eq!(
            Rule::<FileRule>::new("p", RuleBody::Include("<abstractions/base>".into()))
                .canonical_text(),
            "#include <abstractions/base>"
        );
    }

    #[test]
    fn subprofile_renders_nested_block() {
        let sub = Subprofile {
            header: ProfileHeader {
                name: "child".into(),
                path: "/usr/bin/child".into(),
                flags: None,
            },
            rules: vec![file("/etc/hosts", "r"), Rule::new("p", RuleBody::Signal)],
        };
        let rule = Rule::new("p", RuleBody::Subprofile(sub));
        assert_eq!(
            rule.canonical_text(),
            "profile child /usr/bin/child {\n/etc/hosts r,\nsignal,\n}"
        );
        assert!(rule.is_structural());
    }

    #[test]
    fn sort_groups_by_priority_and_depth() {
        let mut rules = vec![
            file("/a", "r"),
            Rule::new("p", RuleBody::Raw("owner /x r".into())),
            file("/b/c/d", "r"),
            Rule::new("p", RuleBody::Capability("CAP_CHOWN".into())),
            file("/b/c", "r"),
            file("/a/b/c", "w"),
        ];
        sort_for_output(&mut rules);
        let texts: Vec<String> = rules.iter().map(Rule::canonical_text).collect();
        assert_eq!(
            texts,
            vec![
                "capability CAP_CHOWN",
                "/a/b/c w",
                "/b/c/d r",
                "/b/c r",
                "/a r",
                "owner /x r",
            ]
        );
    }

    #[test]
    fn canonicalize_reaches_into_subprofiles() {
        let sub = Subprofile {
            header: ProfileHeader::default(),
            rules: vec![Rule::new(
                "p",
                RuleBody::File(FileAccess::new("/lib/libc.so.6", "mr", MaskDialect::Profile)),
            )],
        };
        let rule = Rule::new("p", RuleBody::Subprofile(sub))
            .canonicalize(&[])
            .unwrap();
        let RuleBody::Subprofile(sub) = rule.body else {
            panic!("expected subprofile");
        };
        assert_eq!(sub.rules[0].canonical_text(), "/lib/libc.so* rm");
    }
}
