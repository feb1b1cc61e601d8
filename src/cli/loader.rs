use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    diag::Diagnostics,
    error::ArmorError,
    ingest::{LogIngest, ProfileSet, parse_profile_text},
    policy::{BuiltinTable, PolicyConfigProvider, SecurityCheck},
    profile::{GeneratedProfile, GenerationDiff, Generator, diff_generation, local_stamp},
    rule::{FileAccess, FileRule, IngestedRule, Rule},
};

use super::{args::Args, config::ConfigFile, skeleton};

/// Profiles and log rules loaded for one run
#[derive(Debug, Default)]
pub struct Inputs {
    pub profiles: ProfileSet,
    pub logs: LogIngest,
}

/// Load the policy tables and the inputs named on the command line
pub struct InputLoader;

impl InputLoader {
    /// Config file tables when `--config` is given, the built-in tables otherwise
    pub fn provider(args: &Args) -> Result<Box<dyn PolicyConfigProvider>, ArmorError> {
        match args.config.as_ref() {
            Some(path) => {
                log::info!("Loading config file: {}", path.display());
                Ok(Box::new(ConfigFile::load(path)?))
            }
            None => Ok(Box::new(BuiltinTable::new())),
        }
    }

    pub fn load(
        args: &Args,
        provider: &dyn PolicyConfigProvider,
        diag: &mut Diagnostics,
    ) -> Result<Inputs, ArmorError> {
        let profile_dir = args
            .profile_dir
            .as_ref()
            .ok_or(ArmorError::MissingProfileDir)?;

        let mut profiles = ProfileSet::new();
        profiles.load_dir(profile_dir, &args.skip_profiles, diag)?;

        let filters = provider
            .path_filters()
            .iter()
            .map(|spec| spec.compile())
            .collect::<Result<Vec<_>, _>>()?;
        let mut logs = LogIngest::new(filters);
        for log_file in &args.log_files {
            logs.ingest_file(log_file, diag)?;
        }

        Ok(Inputs { profiles, logs })
    }
}

/// Run the whole command; buffered diagnostics are flushed however it ends
pub fn run(args: &Args) -> Result<(), ArmorError> {
    let mut diag = Diagnostics::new();
    let result = run_with(args, &mut diag);
    diag.flush();
    result
}

fn run_with(args: &Args, diag: &mut Diagnostics) -> Result<(), ArmorError> {
    if let Some(proc_path) = args.create.as_deref() {
        let dir = args.write.clone().unwrap_or_else(|| PathBuf::from("."));
        skeleton::create(proc_path, &dir)?;
        return Ok(());
    }

    let provider = InputLoader::provider(args)?;
    let inputs = InputLoader::load(args, provider.as_ref(), diag)?;

    let mut generator = Generator::new(SecurityCheck::from_provider(provider.as_ref())?);
    if !args.no_stamp {
        generator = generator.with_stamp(local_stamp());
    }
    let generated = generator.generate(&inputs.profiles, &inputs.logs, diag)?;

    match args.write.as_deref() {
        Some(dir) => write_profiles(dir, &generated, args, diag)?,
        None => {
            for entry in &generated {
                println!("Profile name: {}", entry.profile.filename);
                println!("{}", entry.text);
            }
        }
    }

    if args.diff {
        let diff = diff_against_loaded(&inputs.profiles, &generated)?;
        print!("{}", render_diff(&diff));
    }
    Ok(())
}

/// Write every generated profile and copy skipped profiles over unmodified
fn write_profiles(
    dir: &Path,
    generated: &[GeneratedProfile],
    args: &Args,
    diag: &mut Diagnostics,
) -> Result<(), ArmorError> {
    for entry in generated {
        let path = dir.join(&entry.profile.filename);
        fs::write(&path, &entry.text)?;
        log::info!("Wrote profile: {}", path.display());
    }

    let Some(profile_dir) = args.profile_dir.as_ref() else {
        return Ok(());
    };
    for skipped in &args.skip_profiles {
        let source = profile_dir.join(skipped);
        if !source.is_file() {
            diag.warn("write", None, format!("skipped profile {} not found", source.display()));
            continue;
        }
        fs::copy(&source, dir.join(skipped))?;
        log::info!("Copied skipped profile unmodified: {}", skipped);
    }
    Ok(())
}

/// Re-ingest the generated text and compare it with the profiles as loaded
///
/// Diagnostics from re-ingesting are discarded; the generated text is already
/// reported on.
pub fn diff_against_loaded(
    loaded: &ProfileSet,
    generated: &[GeneratedProfile],
) -> Result<GenerationDiff<FileAccess, FileRule>, ArmorError> {
    let old: HashMap<String, Vec<IngestedRule>> = loaded
        .names()
        .iter()
        .filter_map(|name| loaded.get(name).map(|p| (name.clone(), p.rules.clone())))
        .collect();

    let mut scratch = Diagnostics::new();
    let mut new = Vec::with_capacity(generated.len());
    for entry in generated {
        let parsed = parse_profile_text(&entry.profile.filename, &entry.text, &mut scratch);
        let rules = parsed
            .rules
            .into_iter()
            .map(|rule| rule.canonicalize(&[]))
            .collect::<Result<Vec<Rule>, _>>()?;
        new.push((parsed.name, rules));
    }

    Ok(diff_generation(&old, &new))
}

/// Human-readable diff report
pub fn render_diff(diff: &GenerationDiff<FileAccess, FileRule>) -> String {
    let mut out = String::from("******** Profile Diff Results ********\n");
    for name in &diff.new_profiles {
        out.push_str(&format!("New profile: {}\n", name));
    }
    for (name, profile) in &diff.profiles {
        if profile.is_unchanged() {
            continue;
        }
        out.push_str(&format!("Diff for profile: {}\n", name));
        out.push_str("Profile changes:\n");
        for (old, new) in profile.changed() {
            out.push_str(&format!("  {} -> {}\n", old.canonical_text(), new.canonical_text()));
        }
        out.push_str("New profile entries:\n");
        for rule in profile.added() {
            out.push_str(&format!("  {}\n", rule.canonical_text()));
        }
        out.push_str("Removed entries:\n");
        for rule in &profile.removed {
            out.push_str(&format!("  {}\n", rule.canonical_text()));
        }
    }
    out
}
