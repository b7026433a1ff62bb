//! Path and URI helpers shared by the parser and the run state machine.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Resolve `path` against `cwd` (if relative) and fold `.`/`..` lexically.
///
/// No filesystem access: symlinks are not resolved, so two spellings of the
/// same file compare equal only when they agree lexically.
#[must_use]
pub fn normalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut out = Vec::new();
    for c in joined.components() {
        match c {
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

pub fn path_to_file_uri(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

/// Convert a `file://` URI to a path. Other schemes yield `None`.
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn relative_path_resolves_against_cwd() {
        assert_eq!(
            normalize_path(Path::new("src/Foo.php"), Path::new("/repo")),
            normalize_path(Path::new("/repo/src/Foo.php"), Path::new("/elsewhere"))
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn dot_segments_are_folded() {
        assert_eq!(
            normalize_path(Path::new("./src/../src/Foo.php"), Path::new("/repo")),
            PathBuf::from("/repo/src/Foo.php")
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn parent_dir_never_escapes_root() {
        assert_eq!(
            normalize_path(Path::new("/../../etc"), Path::new("/")),
            PathBuf::from("/etc")
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn uri_roundtrip() {
        let path = PathBuf::from("/home/test/src/Foo.php");
        let uri = path_to_file_uri(&path).unwrap();
        assert_eq!(uri, "file:///home/test/src/Foo.php");
        assert_eq!(file_uri_to_path(&uri), Some(path));
    }

    #[test]
    fn non_file_uris_are_rejected() {
        assert!(file_uri_to_path("untitled:Untitled-1").is_none());
        assert!(file_uri_to_path("https://example.com/a.php").is_none());
        assert!(file_uri_to_path("not-a-uri").is_none());
    }
}
