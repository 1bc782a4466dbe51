//! Path normalization for search scopes.

use std::path::{Path, PathBuf};

use crate::error::{Result, SearchError};

/// Normalizes a path for comparison (forward slashes, no trailing slash).
pub fn normalize_path_for_compare(raw: &str) -> String {
    let mut normalized = raw.replace('\\', "/");

    while normalized.ends_with('/') {
        if normalized == "/" {
            break;
        }
        normalized.pop();
    }

    if normalized.is_empty() {
        "/".to_string()
    } else {
        normalized
    }
}

/// Checks if a candidate path lies at or below a scope root.
pub fn is_within_scope(candidate: &Path, scope: &Path) -> bool {
    let candidate = normalize_path_for_compare(candidate.to_string_lossy().as_ref());
    let scope = normalize_path_for_compare(scope.to_string_lossy().as_ref());
    if scope == "/" || candidate == scope {
        return true;
    }
    candidate.starts_with(format!("{scope}/").as_str())
}

/// Normalizes a caller-supplied scope path (handles ~ expansion) and
/// requires the result to be absolute.
pub fn normalize_scope_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SearchError::InvalidFilterShape(
            "paths: entries must not be empty".to_string(),
        ));
    }

    let expanded = if trimmed == "~" || trimmed.starts_with("~/") {
        expand_home_path(trimmed)?
    } else {
        PathBuf::from(trimmed)
    };
    if !expanded.is_absolute() {
        return Err(SearchError::InvalidFilterShape(format!(
            "paths: {trimmed:?} is not an absolute path"
        )));
    }
    Ok(PathBuf::from(normalize_path_for_compare(
        expanded.to_string_lossy().as_ref(),
    )))
}

fn expand_home_path(raw: &str) -> Result<PathBuf> {
    let home = std::env::var("HOME").map(PathBuf::from).map_err(|_| {
        SearchError::InvalidFilterShape(format!("paths: cannot expand {raw:?}, HOME is not set"))
    })?;
    if raw == "~" {
        return Ok(home);
    }
    let rest = raw.strip_prefix("~/").unwrap_or_default();
    Ok(home.join(rest))
}

/// Extracts the extension from a filename.
pub fn extension_of_name(name: &str) -> Option<String> {
    let split = name.rfind('.')?;
    if split == 0 || split + 1 >= name.len() {
        return None;
    }
    Some(name[split + 1..].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_dropped() {
        assert_eq!(normalize_path_for_compare("/tmp/docs/"), "/tmp/docs");
        assert_eq!(normalize_path_for_compare("/"), "/");
    }

    #[test]
    fn scope_matches_descendants_not_siblings() {
        let scope = Path::new("/tmp/docs");
        assert!(is_within_scope(Path::new("/tmp/docs/a.pdf"), scope));
        assert!(is_within_scope(Path::new("/tmp/docs"), scope));
        assert!(!is_within_scope(Path::new("/tmp/docs2/a.pdf"), scope));
        assert!(!is_within_scope(Path::new("/tmp/other.pdf"), scope));
    }

    #[test]
    fn relative_scope_is_rejected() {
        let error = normalize_scope_path("docs/reports").unwrap_err();
        assert!(matches!(error, SearchError::InvalidFilterShape(_)));
    }

    #[test]
    fn scope_is_normalized() {
        let path = normalize_scope_path(" /tmp/docs/ ").expect("absolute");
        assert_eq!(path, PathBuf::from("/tmp/docs"));
    }

    #[test]
    fn extension_ignores_dotfiles() {
        assert_eq!(extension_of_name("Report.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of_name(".bashrc"), None);
        assert_eq!(extension_of_name("trailing."), None);
    }
}
