//! Helpers for vault-relative, `/`-separated paths.

use std::cmp::Ordering;

/// Join path segments, skipping empty ones and collapsing duplicate slashes.
pub fn join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Last segment of a path.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Lower-cased extension of a path including the dot, if any.
pub fn extension(path: &str) -> Option<String> {
    let name = basename(path);
    name.rfind('.')
        .filter(|&idx| idx > 0)
        .map(|idx| name[idx..].to_lowercase())
}

/// Whether a path names a markdown document.
pub fn is_markdown(path: &str) -> bool {
    extension(path).as_deref() == Some(".md")
}

/// Compare names the way locale collation orders them: case-insensitive
/// first, lower case before upper case on ties.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Sort base names of full paths in collation order.
pub fn sorted_base_names(paths: &[String]) -> Vec<String> {
    let mut names: Vec<String> = paths.iter().map(|p| basename(p).to_string()).collect();
    names.sort_by(|a, b| compare_names(a, b));
    names
}
