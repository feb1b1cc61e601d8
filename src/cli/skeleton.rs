use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{error::ArmorError, profile::profile_filename};

const SKELETON_FLAGS: &str = "complain, attach_disconnected";

/// Text of an empty profile for `proc_path`, with the file name it is written under
pub fn skeleton(proc_path: &str) -> Result<(String, String), ArmorError> {
    if !proc_path.starts_with('/') {
        return Err(ArmorError::InvalidSkeletonPath {
            path: proc_path.to_string(),
        });
    }
    let filename = profile_filename(proc_path);
    let text = format!(
        "profile {} {} flags=({}) {{\n}}\n",
        filename, proc_path, SKELETON_FLAGS
    );
    Ok((filename, text))
}

/// Write the skeleton profile for `proc_path` into `dir`
pub fn create(proc_path: &str, dir: &Path) -> Result<PathBuf, ArmorError> {
    let (filename, text) = skeleton(proc_path)?;
    let path = dir.join(filename);
    fs::write(&path, text)?;
    log::info!("Created skeleton profile: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diag::Diagnostics, ingest::parse_profile_text};

    #[test]
    fn relative_path_is_rejected() {
        assert!(matches!(
            skeleton("usr/bin/foo"),
            Err(ArmorError::InvalidSkeletonPath { .. })
        ));
    }

    #[test]
    fn written_skeleton_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = create("/usr/bin/foo", dir.path()).unwrap();
        assert_eq!(path, dir.path().join("usr.bin.foo"));

        let text = fs::read_to_string(&path).unwrap();
        let mut diag = Diagnostics::new();
        let parsed = parse_profile_text(&path, &text, &mut diag);
        assert_eq!(parsed.name, "usr.bin.foo");
        assert_eq!(parsed.exe_path, "/usr/bin/foo");
        assert_eq!(parsed.flags.as_deref(), Some(SKELETON_FLAGS));
        assert!(diag.is_empty());
    }
}
