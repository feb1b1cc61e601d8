use armorgen::{
    diag::Diagnostics,
    error::ArmorError,
    ingest::{LogIngest, ProfileSet, parse_profile_text},
    policy::{
        BuiltinTable, ExceptionKind, SecurityCheck, SecurityExceptionSpec, SecurityRuleSpec,
    },
    profile::{DiffOutcome, Generator, diff_rules},
    rule::{Rule, RuleKind},
};
use rstest::rstest;

const OPEN_PASSWD: &str = r#"[ 1234.5678] audit: type=1400 audit(1700000000.123:42): apparmor="ALLOWED" operation="open" profile="/usr/bin/foo" name="/etc/passwd" requested_mask="r" pid=123"#;

fn ingest(lines: &[&str]) -> (LogIngest, Diagnostics) {
    let mut diag = Diagnostics::new();
    let mut logs = LogIngest::new(Vec::new());
    for line in lines {
        logs.ingest_line(line, &mut diag).unwrap();
    }
    (logs, diag)
}

fn texts(rules: &[Rule]) -> Vec<String> {
    rules.iter().map(Rule::canonical_text).collect()
}

fn nvram_table() -> BuiltinTable {
    BuiltinTable::new().with_rule(SecurityRuleSpec {
        name: "NVRAM_WRITE".into(),
        message: "write access under /nvram2".into(),
        permissions: Some("w".into()),
        path: Some("^/nvram2/".into()),
        ..Default::default()
    })
}

fn nvram_inputs() -> (ProfileSet, LogIngest, Diagnostics) {
    let mut diag = Diagnostics::new();
    let mut files = ProfileSet::new();
    let parsed = parse_profile_text(
        "usr.bin.foo",
        "profile usr.bin.foo /usr/bin/foo {\n  /nvram2/test_script.sh wrix,\n}\n",
        &mut diag,
    );
    files.insert(parsed, &mut diag);
    (files, LogIngest::new(Vec::new()), diag)
}

#[test]
fn open_record_becomes_file_rule() {
    let (logs, _) = ingest(&[OPEN_PASSWD]);
    assert_eq!(texts(logs.rules("/usr/bin/foo").unwrap()), vec!["/etc/passwd r"]);
}

#[rstest]
#[case::read_then_write("r", "w")]
#[case::write_then_read("w", "r")]
fn masks_merge_regardless_of_order(#[case] first: &str, #[case] second: &str) {
    let line = |mask: &str| OPEN_PASSWD.replace(r#"requested_mask="r""#, &format!(r#"requested_mask="{}""#, mask));
    let (logs, mut diag) = ingest(&[line(first).as_str(), line(second).as_str()]);

    let profiles = Generator::new(SecurityCheck::default())
        .build_profiles(&ProfileSet::new(), &logs, &mut diag)
        .unwrap();
    assert_eq!(texts(profiles[0].rules()), vec!["/etc/passwd rw"]);
}

#[test]
fn capability_record_becomes_capability_rule() {
    let (logs, _) = ingest(&[
        r#"apparmor="ALLOWED" operation="capable" profile="/usr/bin/foo" pid=1 capability=7 capname="CAP_SETUID""#,
    ]);
    assert_eq!(
        texts(logs.rules("/usr/bin/foo").unwrap()),
        vec!["capability CAP_SETUID"]
    );
}

#[test]
fn unexcepted_violation_aborts_the_run() {
    let (files, logs, mut diag) = nvram_inputs();
    let check = SecurityCheck::from_provider(&nvram_table()).unwrap();
    let err = Generator::new(check).generate(&files, &logs, &mut diag).unwrap_err();

    let ArmorError::SecurityViolations(violations) = err else {
        panic!("expected security violations");
    };
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, "/nvram2/test_script.sh rwix,");
    assert_eq!(violations[0].exe_path, "/usr/bin/foo");
}

#[test]
fn profile_path_exception_suppresses_violation() {
    let (files, logs, mut diag) = nvram_inputs();
    let table = nvram_table().with_exception(SecurityExceptionSpec {
        rule: "NVRAM_WRITE".into(),
        kind: ExceptionKind::ProfilePath,
        pattern: "^/usr/bin/foo$".into(),
        description: "legacy updater".into(),
        signoff: "security".into(),
    });
    let check = SecurityCheck::from_provider(&table).unwrap();
    let generated = Generator::new(check).generate(&files, &logs, &mut diag).unwrap();
    assert_eq!(generated.len(), 1);
}

#[test]
fn serialized_profile_reingests_to_same_rules() {
    let mut diag = Diagnostics::new();
    let mut files = ProfileSet::new();
    let source = "\
profile usr.bin.foo /usr/bin/foo flags=(complain) {
  #include <abstractions/base>
  capability net_bind_service,
  network inet stream,
  signal,
  ptrace,
  /usr/lib/libssl.so.3 mr,
  /var/log/foo/*.log w,
  owner /proc/*/status r,
  profile helper /usr/bin/helper {
    /etc/hosts r,
  }
}
";
    files.insert(parse_profile_text("usr.bin.foo", source, &mut diag), &mut diag);
    let (logs, _) = ingest(&[
        OPEN_PASSWD.replace("/usr/bin/foo", "usr.bin.foo").as_str(),
        r#"apparmor="ALLOWED" operation="create" profile="usr.bin.foo" family="inet6" sock_type="dgram" protocol=17"#,
    ]);

    let generated = Generator::new(SecurityCheck::default())
        .with_stamp("17/10/2026 10:00:00")
        .generate(&files, &logs, &mut diag)
        .unwrap();
    let first = &generated[0];

    let reparsed = parse_profile_text("usr.bin.foo", &first.text, &mut diag);
    let mut again: Vec<String> = reparsed
        .rules
        .into_iter()
        .filter(|rule| rule.kind() != RuleKind::Header)
        .map(|rule| rule.canonicalize(&[]).unwrap().canonical_text())
        .collect();
    let mut original = texts(first.profile.rules());
    again.sort();
    original.sort();
    assert_eq!(again, original);
}

#[test]
fn widened_mask_diffs_as_one_change() {
    let mut diag = Diagnostics::new();
    let old = parse_profile_text("x", "profile x /bin/x {\n  /x r,\n}\n", &mut diag);
    let new = parse_profile_text("x", "profile x /bin/x {\n  /x rw,\n}\n", &mut diag);
    let new: Vec<Rule> = new
        .rules
        .into_iter()
        .map(|rule| rule.canonicalize(&[]).unwrap())
        .collect();

    let diff = diff_rules(&old.rules, &new);
    let changed: Vec<_> = diff
        .records
        .iter()
        .filter(|r| r.outcome == DiffOutcome::Changed)
        .collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].new.canonical_text(), "/x rw");
    assert!(diff.added().is_empty());
    assert!(diff.removed.is_empty());
}

#[test]
fn library_version_change_is_not_add_and_remove() {
    let mut diag = Diagnostics::new();
    let old = parse_profile_text(
        "x",
        "profile x /bin/x {\n  /usr/lib/libfoo-1.2.so mr,\n}\n",
        &mut diag,
    );
    let new = parse_profile_text(
        "x",
        "profile x /bin/x {\n  /usr/lib/libfoo-*.so mr,\n}\n",
        &mut diag,
    );
    let new: Vec<Rule> = new
        .rules
        .into_iter()
        .map(|rule| rule.canonicalize(&[]).unwrap())
        .collect();

    let diff = diff_rules(&old.rules, &new);
    assert_eq!(diff.changed().len(), 1);
    assert!(diff.added().is_empty());
    assert!(diff.removed.is_empty());
}

#[test]
fn defective_library_name_is_fatal() {
    let mut diag = Diagnostics::new();
    let mut logs = LogIngest::new(Vec::new());
    let err = logs
        .ingest_line(
            r#"apparmor="ALLOWED" operation="file_mmap" profile="/usr/bin/foo" name="/lib*.so.1" requested_mask="mr""#,
            &mut diag,
        )
        .unwrap_err();
    assert!(matches!(err, ArmorError::DefectiveLibraryPath { .. }));
}

#[test]
fn exec_transition_masks_are_written_as_read() {
    let mut diag = Diagnostics::new();
    let mut files = ProfileSet::new();
    let source = "\
#include <tunables/global>
profile usr.bin.foo /usr/bin/foo {
  /usr/bin/helper Pix,
  /usr/bin/child cux,
  /usr/bin/tool rCix,
}
";
    files.insert(parse_profile_text("usr.bin.foo", source, &mut diag), &mut diag);

    let generated = Generator::new(SecurityCheck::default())
        .generate(&files, &LogIngest::new(Vec::new()), &mut diag)
        .unwrap();
    let text = &generated[0].text;
    assert!(text.starts_with("#include <tunables/global>\nprofile usr.bin.foo /usr/bin/foo "));
    assert!(text.contains("    /usr/bin/helper Pix,\n"));
    assert!(text.contains("    /usr/bin/child cux,\n"));
    assert!(text.contains("    /usr/bin/tool rCix,\n"));
}
