use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    diag::Diagnostics,
    error::ArmorError,
    rule::{
        FileAccess, IngestedRule, MaskDialect, NetworkRule, ProfileHeader, RuleBody, Subprofile,
        library::DEFECTIVE_SENTINEL,
    },
};

const COMPONENT: &str = "profile";

/// Permission characters that mark a two-token line as a file rule
const FILE_PERM_CHARS: &[char] = &['r', 'w', 'm', 'x', 'a', 'c', 'd', 'l', 'k'];

/// One profile file as loaded, before any normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedProfile {
    pub name: String,
    pub exe_path: String,
    pub flags: Option<String>,
    /// `#include` lines written above the profile header
    pub preamble: Vec<String>,
    /// File the profile was read from
    pub source: PathBuf,
    pub rules: Vec<IngestedRule>,
}

enum ParseState {
    TopLevel,
    InsideSubprofile(Subprofile<FileAccess>),
}

/// Line-at-a-time parser for profile text with nested subprofile blocks
pub struct ProfileParser {
    profile: ParsedProfile,
    state: ParseState,
}

impl ProfileParser {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            profile: ParsedProfile {
                source: source.into(),
                ..Default::default()
            },
            state: ParseState::TopLevel,
        }
    }

    fn has_header(&self) -> bool {
        !self.profile.name.is_empty() || !self.profile.exe_path.is_empty()
    }

    fn push(&mut self, body: RuleBody<FileAccess>) {
        let rule = IngestedRule::new(self.profile.name.clone(), body);
        match &mut self.state {
            ParseState::TopLevel => self.profile.rules.push(rule),
            ParseState::InsideSubprofile(sub) => sub.rules.push(rule),
        }
    }

    fn close_subprofile(&mut self) {
        if let ParseState::InsideSubprofile(sub) =
            std::mem::replace(&mut self.state, ParseState::TopLevel)
        {
            let rule = IngestedRule::new(self.profile.name.clone(), RuleBody::Subprofile(sub));
            self.profile.rules.push(rule);
        }
    }

    pub fn feed_line(&mut self, line: &str, diag: &mut Diagnostics) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        if trimmed == "}" {
            self.close_subprofile();
            return;
        }

        let tokens: Vec<&str> = trimmed
            .split_whitespace()
            .map(|t| t.trim_matches(|c| c == ',' || c == '}' || c == '\n'))
            .filter(|t| !t.is_empty())
            .collect();
        let Some(first) = tokens.first().copied() else {
            return;
        };

        if first.starts_with('#') && first != "#include" {
            // the generation stamp sits above the header and is not part of the policy
            if self.has_header() {
                self.push(RuleBody::Comment(trimmed.trim_end_matches(',').to_string()));
            }
            return;
        }

        if tokens.len() == 2 && first.starts_with('/') && tokens[1].contains(FILE_PERM_CHARS) {
            if first == DEFECTIVE_SENTINEL {
                diag.warn(
                    COMPONENT,
                    Some(self.profile.name.as_str()),
                    format!("removing defective entry {} from input", DEFECTIVE_SENTINEL),
                );
                return;
            }
            self.push(RuleBody::File(FileAccess::new(
                first,
                tokens[1],
                MaskDialect::Profile,
            )));
        } else if tokens.len() == 2 && first.starts_with("capability") {
            self.push(RuleBody::Capability(tokens[1].to_string()));
        } else if first.starts_with("profile") {
            self.header_line(&tokens, diag);
        } else if tokens.len() == 1 && first.starts_with("signal") {
            self.push(RuleBody::Signal);
        } else if tokens.len() == 1 && first.starts_with("ptrace") {
            self.push(RuleBody::Ptrace);
        } else if tokens.len() == 2 && first == "#include" {
            if self.has_header() {
                self.push(RuleBody::Include(tokens[1].to_string()));
            } else {
                self.profile.preamble.push(format!("#include {}", tokens[1]));
            }
        } else if first == "network" && (2..=3).contains(&tokens.len()) {
            self.push(RuleBody::Network(NetworkRule {
                family: tokens[1].to_string(),
                sock_type: tokens.get(2).map(|t| t.to_string()),
                family_wide: tokens.len() == 2,
            }));
        } else {
            diag.warn(
                COMPONENT,
                Some(self.profile.name.as_str()),
                format!("unknown rule type, kept verbatim: {}", trimmed),
            );
            self.push(RuleBody::Raw(trimmed.trim_end_matches(',').to_string()));
        }
    }

    fn header_line(&mut self, tokens: &[&str], diag: &mut Diagnostics) {
        if matches!(self.state, ParseState::InsideSubprofile(_)) {
            diag.warn(
                COMPONENT,
                Some(self.profile.name.as_str()),
                "profile nested more than one level deep, header ignored",
            );
            return;
        }

        let mut header = parse_header(tokens);
        if self.has_header() {
            self.state = ParseState::InsideSubprofile(Subprofile {
                header,
                rules: Vec::new(),
            });
            return;
        }

        let source = self.profile.source.display().to_string();
        if header.name.is_empty() {
            diag.manual_edit(
                COMPONENT,
                None,
                format!("profile header in {} has no name, using the file name", source),
            );
            header.name = self
                .profile
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        if header.path.is_empty() {
            if header.name.starts_with('/') {
                header.path = header.name.clone();
            } else {
                diag.manual_edit(
                    COMPONENT,
                    Some(header.name.as_str()),
                    format!("profile header in {} has no executable path", source),
                );
            }
        }

        self.profile.name = header.name.clone();
        self.profile.exe_path = header.path.clone();
        self.profile.flags = header.flags.clone();
        self.push(RuleBody::Header(header));
    }

    pub fn finish(mut self, diag: &mut Diagnostics) -> ParsedProfile {
        if matches!(self.state, ParseState::InsideSubprofile(_)) {
            diag.warn(
                COMPONENT,
                Some(self.profile.name.as_str()),
                "unterminated subprofile block closed at end of file",
            );
            self.close_subprofile();
        }
        self.profile
    }
}

/// `profile <name> <path> flags=(<flags>) {` with any of the trailing parts missing
fn parse_header(tokens: &[&str]) -> ProfileHeader {
    let mut header = ProfileHeader::default();
    let mut positional = Vec::new();
    let mut flags: Option<Vec<&str>> = None;

    for &token in tokens.iter().skip(1) {
        if let Some(open) = flags.as_mut() {
            if !open.last().is_some_and(|t| t.ends_with(')')) {
                open.push(token);
                continue;
            }
        }
        if token.starts_with("flags=") {
            flags = Some(vec![token]);
        } else if token != "{" {
            positional.push(token.trim_end_matches('{'));
        }
    }

    header.name = positional.first().map(|s| s.to_string()).unwrap_or_default();
    header.path = positional.get(1).map(|s| s.to_string()).unwrap_or_default();
    header.flags = flags.map(|parts| {
        parts
            .join(", ")
            .trim_start_matches("flags=")
            .trim_start_matches('(')
            .trim_end_matches('{')
            .trim_end_matches(')')
            .to_string()
    });
    header
}

/// Parse a whole profile text
pub fn parse_profile_text(source: impl Into<PathBuf>, text: &str, diag: &mut Diagnostics) -> ParsedProfile {
    let mut parser = ProfileParser::new(source);
    for line in text.lines() {
        parser.feed_line(line, diag);
    }
    parser.finish(diag)
}

/// Profiles loaded in one pass, keyed by header name
#[derive(Debug, Default)]
pub struct ProfileSet {
    names: Vec<String>,
    entries: HashMap<String, ParsedProfile>,
}

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an already parsed profile; a name seen before is rejected and `false` returned
    pub fn insert(&mut self, profile: ParsedProfile, diag: &mut Diagnostics) -> bool {
        if self.entries.contains_key(&profile.name) {
            diag.manual_edit(
                COMPONENT,
                Some(profile.name.as_str()),
                format!(
                    "duplicate profile name in {}, skipped; duplicates are NOT merged, merge them manually and delete the duplicate",
                    profile.source.display()
                ),
            );
            return false;
        }
        self.names.push(profile.name.clone());
        self.entries.insert(profile.name.clone(), profile);
        true
    }

    pub fn load_file(&mut self, path: &Path, diag: &mut Diagnostics) -> Result<(), ArmorError> {
        if path.is_dir() {
            return Err(ArmorError::IsDirectory {
                path: path.to_path_buf(),
            });
        }
        log::info!("Loading profile from file: {}", path.display());
        let text = fs::read_to_string(path)?;
        let profile = parse_profile_text(path, &text, diag);
        self.insert(profile, diag);
        Ok(())
    }

    /// Load every file in `dir` in name order, skipping names listed in `skip`
    pub fn load_dir(&mut self, dir: &Path, skip: &[String], diag: &mut Diagnostics) -> Result<(), ArmorError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        paths.sort();

        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if skip.contains(&file_name) {
                log::info!("Skipping profile due to skip list: {}", file_name);
                continue;
            }
            match self.load_file(&path, diag) {
                Ok(()) => {}
                Err(err) if !err.is_fatal() => diag.warn(COMPONENT, None, err.to_string()),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Profile names in load order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&ParsedProfile> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{FileEntry, RuleKind};
    use rstest::rstest;
    use std::io::Write;

    const FOO: &str = "\
# Automated profile generated on 01/01/2024 00:00:00
profile usr.bin.foo /usr/bin/foo flags=(complain, attach_disconnected) {
    #include <abstractions/base>
    capability setuid,
    /etc/passwd r,
    /usr/lib/libfoo-1.2.so mr,

    signal,
    ptrace,
    owner /home/*/.cache/** rw,
    profile helper /usr/bin/helper {
        /etc/hosts r,
        signal,
    }
}
";

    fn parse(text: &str) -> (ParsedProfile, Diagnostics) {
        let mut diag = Diagnostics::new();
        let profile = parse_profile_text("usr.bin.foo", text, &mut diag);
        (profile, diag)
    }

    #[test]
    fn parses_header_fields() {
        let (profile, _) = parse(FOO);
        assert_eq!(profile.name, "usr.bin.foo");
        assert_eq!(profile.exe_path, "/usr/bin/foo");
        assert_eq!(profile.flags.as_deref(), Some("complain, attach_disconnected"));
    }

    #[test]
    fn classifies_rule_lines() {
        let (profile, diag) = parse(FOO);
        let kinds: Vec<RuleKind> = profile.rules.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::Header,
                RuleKind::Include,
                RuleKind::Capability,
                RuleKind::File,
                RuleKind::File,
                RuleKind::Signal,
                RuleKind::Ptrace,
                RuleKind::Raw,
                RuleKind::Subprofile,
            ]
        );
        // only the raw rule is reported
        assert_eq!(diag.events().len(), 1);
    }

    #[test]
    fn file_rules_keep_written_form() {
        let (profile, _) = parse(FOO);
        let RuleBody::File(access) = &profile.rules[4].body else {
            panic!("expected file rule");
        };
        assert_eq!(access.line(), "/usr/lib/libfoo-1.2.so mr");
    }

    #[test]
    fn raw_rules_are_verbatim() {
        let (profile, _) = parse(FOO);
        assert_eq!(
            profile.rules[7].body,
            RuleBody::Raw("owner /home/*/.cache/** rw".to_string())
        );
    }

    #[test]
    fn subprofile_is_one_rule_of_its_parent() {
        let (profile, _) = parse(FOO);
        let RuleBody::Subprofile(sub) = &profile.rules[8].body else {
            panic!("expected subprofile");
        };
        assert_eq!(sub.header.name, "helper");
        assert_eq!(sub.header.path, "/usr/bin/helper");
        assert_eq!(sub.rules.len(), 2);
        assert_eq!(profile.rules[8].profile, "usr.bin.foo");
    }

    #[test]
    fn comments_inside_profile_are_kept() {
        let (profile, _) = parse("profile p /bin/p {\n  # NETCOM - inet stream create\n  network inet,\n}\n");
        assert_eq!(
            profile.rules[1].body,
            RuleBody::Comment("# NETCOM - inet stream create".to_string())
        );
        assert_eq!(profile.rules[2].kind(), RuleKind::Network);
    }

    #[test]
    fn includes_above_header_stay_in_preamble() {
        let (profile, diag) = parse("#include <tunables/global>\n\nprofile p /bin/p {\n  #include <abstractions/base>\n}\n");
        assert_eq!(profile.preamble, vec!["#include <tunables/global>"]);
        let kinds: Vec<RuleKind> = profile.rules.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![RuleKind::Header, RuleKind::Include]);
        assert!(diag.is_empty());
    }

    #[rstest]
    #[case("profile /usr/bin/bar {", "/usr/bin/bar", "/usr/bin/bar", 0)]
    #[case("profile bar {", "bar", "", 1)]
    #[case("profile {", "usr.bin.foo", "", 2)]
    fn missing_header_fields_need_manual_edit(
        #[case] header: &str,
        #[case] name: &str,
        #[case] path: &str,
        #[case] notices: usize,
    ) {
        let (profile, diag) = parse(&format!("{}\n}}\n", header));
        assert_eq!(profile.name, name);
        assert_eq!(profile.exe_path, path);
        assert_eq!(diag.count(crate::diag::Severity::ManualEdit), notices);
    }

    #[test]
    fn defective_sentinel_line_is_removed() {
        let (profile, diag) = parse("profile p /bin/p {\n  /lib*.so* mr,\n}\n");
        assert_eq!(profile.rules.len(), 1);
        assert_eq!(diag.events().len(), 1);
    }

    #[test]
    fn unterminated_subprofile_is_closed() {
        let (profile, diag) = parse("profile p /bin/p {\n  profile c /bin/c {\n  /x r,\n");
        assert_eq!(profile.rules.last().map(|r| r.kind()), Some(RuleKind::Subprofile));
        assert_eq!(diag.events().len(), 1);
    }

    #[test]
    fn load_dir_skips_duplicates_and_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        for (file, body) in [
            ("a", "profile foo /usr/bin/foo {\n  /a r,\n}\n"),
            ("b", "profile foo /usr/bin/foo2 {\n  /b r,\n}\n"),
            ("c", "profile bar /usr/bin/bar {\n}\n"),
            ("d", "profile baz /usr/bin/baz {\n}\n"),
        ] {
            let mut f = fs::File::create(dir.path().join(file)).unwrap();
            write!(f, "{}", body).unwrap();
        }
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let mut set = ProfileSet::new();
        let mut diag = Diagnostics::new();
        set.load_dir(dir.path(), &["d".to_string()], &mut diag).unwrap();

        assert_eq!(set.names(), ["foo", "bar"]);
        assert_eq!(set.get("foo").unwrap().exe_path, "/usr/bin/foo");
        // duplicate name + directory entry
        assert_eq!(diag.events().len(), 2);
    }

    #[test]
    fn loading_a_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = ProfileSet::new();
        let mut diag = Diagnostics::new();
        let err = set.load_file(dir.path(), &mut diag).unwrap_err();
        assert!(matches!(err, ArmorError::IsDirectory { .. }));
    }
}
