//! Lexical path cleaning for virtual (provider-relative) paths.
//!
//! Every provider treats paths as absolute and cleaned: `.`/`..` are
//! resolved and repeated slashes collapsed, purely as string
//! manipulation. This is distinct from [`crate::HostVfs`]'s physical-path
//! resolution, which additionally guards against symlink escape once a
//! cleaned path is joined to a real root directory.

use crate::error::{VfsError, VfsResult};

/// Clean `path` into a canonical absolute form (`/`, no `.`/`..`, no
/// repeated slashes). `..` above the root simply stays at the root,
/// since there is nothing above an absolute path to escape into here.
pub fn clean(path: &str) -> VfsResult<String> {
    if !path.starts_with('/') {
        return Err(VfsError::NotSupported(format!(
            "relative path not supported: {path}"
        )));
    }

    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

/// Split a cleaned path into its parent directory and final component.
/// The root's parent is itself.
#[must_use]
pub fn split_parent(cleaned: &str) -> (&str, &str) {
    if cleaned == "/" {
        return ("/", "");
    }
    match cleaned.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", cleaned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_slashes_and_dots() {
        assert_eq!(clean("/a//b/./c").unwrap(), "/a/b/c");
    }

    #[test]
    fn resolves_parent_refs() {
        assert_eq!(clean("/a/b/../c").unwrap(), "/a/c");
    }

    #[test]
    fn parent_refs_above_root_stay_at_root() {
        assert_eq!(clean("/../../a").unwrap(), "/a");
    }

    #[test]
    fn rejects_relative_paths() {
        assert!(clean("a/b").is_err());
    }

    #[test]
    fn splits_parent_and_name() {
        assert_eq!(split_parent("/a/b/c"), ("/a/b", "c"));
        assert_eq!(split_parent("/a"), ("/", "a"));
        assert_eq!(split_parent("/"), ("/", ""));
    }
}
