use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Generate AppArmor profiles from audit logs and existing profiles"
)]
pub struct Args {
    /// Directory holding the current profiles
    #[arg(long = "profile-dir", value_name = "DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Audit log file to learn rules from (repeatable)
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_files: Vec<PathBuf>,

    /// Write generated profiles into this directory instead of printing them
    #[arg(long = "write", value_name = "DIR")]
    pub write: Option<PathBuf>,

    /// Create a skeleton profile for the given absolute executable path
    #[arg(long = "create", value_name = "PROC")]
    pub create: Option<String>,

    /// Show the differences between the loaded and the generated profiles
    #[arg(long = "diff")]
    pub diff: bool,

    /// Profile file name to leave out when loading --profile-dir (repeatable)
    #[arg(long = "skip-profile", value_name = "NAME", value_delimiter = ',')]
    pub skip_profiles: Vec<String>,

    /// Path to configuration file (TOML) with security rules, exceptions and path filters
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Leave out the generation stamp comment
    #[arg(long = "no-stamp")]
    pub no_stamp: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_inputs() {
        let args = Args::parse_from([
            "armorgen",
            "--profile-dir",
            "/etc/apparmor.d",
            "--log-file",
            "a.log",
            "--log-file",
            "b.log",
            "--skip-profile",
            "usr.bin.x,usr.bin.y",
            "--diff",
        ]);
        assert_eq!(args.profile_dir, Some(PathBuf::from("/etc/apparmor.d")));
        assert_eq!(args.log_files.len(), 2);
        assert_eq!(args.skip_profiles, vec!["usr.bin.x", "usr.bin.y"]);
        assert!(args.diff);
        assert!(args.write.is_none());
    }

    #[test]
    fn create_needs_no_profile_dir() {
        let args = Args::parse_from(["armorgen", "--create", "/usr/bin/foo"]);
        assert_eq!(args.create.as_deref(), Some("/usr/bin/foo"));
        assert!(args.profile_dir.is_none());
    }
}
