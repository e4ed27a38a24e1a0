//! Built-artifact location.
//!
//! Primary lookup is a platform-specific glob pattern; if that yields
//! nothing (toolchains move their output layout between releases), a
//! recursive name-substring search over the build tree is the fallback.

use std::path::{Path, PathBuf};

/// Substitutes `{name}` and `{version}` placeholders in an output pattern.
pub(super) fn substitute(pattern: &str, name: &str, version: &str) -> String {
    pattern.replace("{name}", name).replace("{version}", version)
}

/// Finds the first (lexicographically smallest) match of `pattern` under
/// `root`. Returns `None` when the pattern is valid but matches nothing.
pub(super) fn by_pattern(root: &Path, pattern: &str) -> Option<PathBuf> {
    let full = root.join(pattern);
    let mut matches: Vec<PathBuf> = glob::glob(&full.to_string_lossy())
        .ok()?
        .filter_map(|entry| entry.ok())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Recursive fallback: first entry under `search_root` whose file name
/// contains `needle`. `bundle` selects directories ending in `.app` instead
/// of plain files; `ext` additionally constrains the file extension, so a
/// Windows lookup cannot pick up another platform's output.
pub(super) fn by_name_substring(
    search_root: &Path,
    needle: &str,
    bundle: bool,
    ext: Option<&str>,
) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = walkdir::WalkDir::new(search_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            if bundle {
                entry.file_type().is_dir() && name.contains(needle) && name.ends_with(".app")
            } else {
                entry.file_type().is_file()
                    && name.contains(needle)
                    && ext.is_none_or(|ext| {
                        entry.path().extension().is_some_and(|found| found == ext)
                    })
            }
        })
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}
