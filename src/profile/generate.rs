use crate::{
    diag::Diagnostics,
    error::ArmorError,
    ingest::{LogIngest, ProfileSet},
    policy::{SecurityCheck, enforce},
};

use super::{
    merge::merge_profile_rules,
    model::{LOST_AND_FOUND, ProcessProfile},
};

const COMPONENT: &str = "generate";

/// Format of the generation stamp comment
pub const STAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Current local time in [`STAMP_FORMAT`]
pub fn local_stamp() -> String {
    chrono::Local::now().format(STAMP_FORMAT).to_string()
}

/// A finished profile and its serialized text
#[derive(Debug, Clone)]
pub struct GeneratedProfile {
    pub profile: ProcessProfile,
    pub text: String,
}

/// Names to generate: profiles known only from files first, then every log-derived one
pub fn generation_order(files: &ProfileSet, logs: &LogIngest) -> Vec<String> {
    let log_names = logs.profile_names();
    let mut names: Vec<String> = files
        .names()
        .iter()
        .filter(|name| !log_names.contains(*name))
        .cloned()
        .collect();
    names.extend(log_names.iter().cloned());
    names
}

/// Builds, checks and serializes the profiles of one run
pub struct Generator {
    check: SecurityCheck,
    stamp: Option<String>,
}

impl Generator {
    pub fn new(check: SecurityCheck) -> Self {
        Self { check, stamp: None }
    }

    /// Prefix every profile with a generation stamp comment
    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.stamp = Some(stamp.into());
        self
    }

    fn resolve_exe(name: &str, files: &ProfileSet, diag: &mut Diagnostics) -> String {
        if let Some(parsed) = files.get(name) {
            if !parsed.exe_path.is_empty() {
                return parsed.exe_path.clone();
            }
        }
        if !name.starts_with('/') {
            diag.manual_edit(
                COMPONENT,
                Some(name),
                "executable path unknown, using the profile name; fix the profile header",
            );
        }
        name.to_string()
    }

    /// Merge file-derived and log-derived rules into one profile per name
    pub fn build_profiles(
        &self,
        files: &ProfileSet,
        logs: &LogIngest,
        diag: &mut Diagnostics,
    ) -> Result<Vec<ProcessProfile>, ArmorError> {
        let mut profiles = Vec::new();
        for name in generation_order(files, logs) {
            let exe_path = Self::resolve_exe(&name, files, diag);
            let parsed = files.get(&name);

            let mut profile = ProcessProfile::new(name.as_str(), exe_path)
                .with_flags(parsed.and_then(|p| p.flags.clone()))
                .with_preamble(parsed.map(|p| p.preamble.clone()).unwrap_or_default());
            if profile.filename.is_empty() {
                diag.manual_edit(
                    COMPONENT,
                    Some(name.as_str()),
                    format!("no output file name could be derived, writing to {}", LOST_AND_FOUND),
                );
                profile.filename = LOST_AND_FOUND.to_string();
            }

            let rules = merge_profile_rules(
                &name,
                parsed.map(|p| p.rules.as_slice()).unwrap_or_default(),
                logs.rules(&name).unwrap_or_default(),
                diag,
            )?;
            for rule in rules {
                profile.push(rule);
            }
            profiles.push(profile);
        }
        Ok(profiles)
    }

    /// Build every profile, check them all, then serialize
    ///
    /// Violations from every profile are collected before the run aborts.
    pub fn generate(
        &self,
        files: &ProfileSet,
        logs: &LogIngest,
        diag: &mut Diagnostics,
    ) -> Result<Vec<GeneratedProfile>, ArmorError> {
        let profiles = self.build_profiles(files, logs, diag)?;

        let violations = profiles
            .iter()
            .flat_map(|p| self.check.check_profile(&p.exe_path, &p.rule_lines()))
            .collect();
        enforce(violations, diag)?;

        profiles
            .into_iter()
            .map(|profile| {
                let text = profile.serialize(self.stamp.as_deref())?;
                log::info!("Generated profile {} ({})", profile.name, profile.filename);
                Ok(GeneratedProfile { profile, text })
            })
            .collect()
    }
}
