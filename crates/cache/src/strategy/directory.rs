//! Spool directory pattern resolution

use rewind_utils::RewindPaths;
use std::path::PathBuf;
use uuid::Uuid;

const TMPDIR_TOKEN: &str = "${tmpdir}";
const UUID_TOKEN: &str = "#uuid#";
const NAME_TOKEN: &str = "#name#";

/// Resolve a spool directory pattern
///
/// `${tmpdir}` becomes the temp directory (see [`RewindPaths::temp_dir`]),
/// `#uuid#` a fresh random UUID and `#name#` the strategy name with path
/// separators replaced.
pub fn resolve_spool_directory(pattern: &str, name: &str) -> PathBuf {
    let mut resolved = pattern.to_string();

    if resolved.contains(TMPDIR_TOKEN) {
        let tmpdir = RewindPaths::temp_dir();
        resolved = resolved.replace(TMPDIR_TOKEN, &tmpdir.to_string_lossy());
    }
    if resolved.contains(UUID_TOKEN) {
        resolved = resolved.replace(UUID_TOKEN, &Uuid::new_v4().to_string());
    }
    if resolved.contains(NAME_TOKEN) {
        resolved = resolved.replace(NAME_TOKEN, &sanitize_name(name));
    }

    PathBuf::from(resolved)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}
