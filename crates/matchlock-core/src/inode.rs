//! Synthesizes stable 64-bit inode numbers for VFS providers with no
//! physical inode of their own (the `Memory` provider, or any path that
//! doesn't map onto a real filesystem entry).

use std::hash::{Hash, Hasher};

/// Reserved for the mount root.
pub const ROOT_INO: u64 = 1;

/// Hash `path` plus a file/dir tag into a 64-bit inode, reserving 0 and 1
/// (root) by shifting any collision to 2.
#[must_use]
pub fn synthesize(path: &str, is_dir: bool) -> u64 {
    if path == "/" {
        return ROOT_INO;
    }

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    is_dir.hash(&mut hasher);
    match hasher.finish() {
        0 | ROOT_INO => 2,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_reserved() {
        assert_eq!(synthesize("/", true), ROOT_INO);
    }

    #[test]
    fn distinct_paths_hash_differently() {
        assert_ne!(synthesize("/a", false), synthesize("/b", false));
    }

    #[test]
    fn file_and_dir_tag_differ_for_same_path() {
        assert_ne!(synthesize("/a", true), synthesize("/a", false));
    }

    #[test]
    fn never_returns_reserved_values() {
        assert_ne!(synthesize("/x", true), 0);
        assert_ne!(synthesize("/x", true), ROOT_INO);
    }
}
