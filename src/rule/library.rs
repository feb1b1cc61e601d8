use std::sync::LazyLock;

use regex::Regex;

use crate::error::ArmorError;

/// Entry an older release emitted for every library; never valid output
pub const DEFECTIVE_SENTINEL: &str = "/lib*.so*";

static LIBRARY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z+_\-0-9.*]+\.so([\s.0-9*]+)?$").expect("static regex")
});
static VERSION_INFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z+_]+)(-[0-9]\.)").expect("static regex"));
static SO_VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*\.so\.[0-9]").expect("static regex"));

/// Whether a path is a candidate for library version wildcarding at all
pub fn is_library_path(path: &str) -> bool {
    path.contains(".so")
}

/// Replace version numbers in a shared-library path with wildcards
///
/// `/usr/lib/libfoo-1.2.so` becomes `/usr/lib/libfoo-*.so` and
/// `/lib/libc.so.6` becomes `/lib/libc.so*`. Paths mentioning the loader cache
/// (`ld.so.`) or an httpd module (`mod_`) anywhere, and basenames that do not
/// look like a library, are returned unchanged. The function is idempotent on
/// its own output.
///
/// # Errors
/// * [`ArmorError::MalformedLibraryPath`] if the path has no `/`
/// * [`ArmorError::DefectiveLibraryPath`] if the result is the known-bad
///   [`DEFECTIVE_SENTINEL`]; callers must treat this as fatal
pub fn wildcard_library_version(path: &str) -> Result<String, ArmorError> {
    let Some(split) = path.rfind('/') else {
        return Err(ArmorError::MalformedLibraryPath {
            original: path.to_string(),
        });
    };
    let (dir, lib_name) = path.split_at(split + 1);

    if path.contains("ld.so.") || path.contains("mod_") {
        return Ok(path.to_string());
    }
    if !LIBRARY_NAME.is_match(lib_name) {
        return Ok(path.to_string());
    }

    let mut result = String::from(dir);
    match VERSION_INFIX.captures(lib_name) {
        Some(caps) => {
            result.push_str(&caps[1]);
            result.push_str("-*");
        }
        None => {
            let stem_end = lib_name.rfind(".so").unwrap_or(lib_name.len());
            result.push_str(&lib_name[..stem_end]);
        }
    }
    result.push_str(".so");

    // one trailing wildcard covers numeric suffixes and existing `.so*` / `.so.*` wildcards
    if SO_VERSION_SUFFIX.is_match(lib_name)
        || lib_name.contains(".so*")
        || lib_name.contains(".so.*")
    {
        result.push('*');
    }

    if result == DEFECTIVE_SENTINEL {
        return Err(ArmorError::DefectiveLibraryPath {
            original: path.to_string(),
            sentinel: result,
        });
    }

    Ok(result)
}
