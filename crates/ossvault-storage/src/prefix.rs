//! Root-prefix handling for object keys

/// Maps caller paths to object keys under a configured root, and back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPrefixer {
    prefix: String,
}

impl PathPrefixer {
    /// `root` may be empty; surrounding slashes are ignored.
    pub fn new(root: &str) -> Self {
        let root = root.trim_matches('/');
        let prefix = if root.is_empty() {
            String::new()
        } else {
            format!("{root}/")
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn prefix_path(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path.trim_start_matches('/'))
    }

    /// Directory key with exactly one trailing slash; the bucket root is `/`.
    pub fn prefix_directory_path(&self, path: &str) -> String {
        let key = self.prefix_path(path);
        let key = key.trim_end_matches('/');
        if key.is_empty() {
            "/".to_string()
        } else {
            format!("{key}/")
        }
    }

    pub fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        let key = key.trim_start_matches('/');
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }

    pub fn strip_directory_prefix<'a>(&self, key: &'a str) -> &'a str {
        self.strip_prefix(key).trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_root_is_identity() {
        let p = PathPrefixer::new("");
        assert_eq!(p.prefix_path("a/b.txt"), "a/b.txt");
        assert_eq!(p.prefix_path("/a/b.txt"), "a/b.txt");
        assert_eq!(p.prefix_directory_path(""), "/");
        assert_eq!(p.prefix_directory_path("docs"), "docs/");
    }

    #[test]
    fn root_is_normalized() {
        for root in ["tenant", "/tenant", "tenant/", "/tenant/"] {
            let p = PathPrefixer::new(root);
            assert_eq!(p.prefix(), "tenant/");
            assert_eq!(p.prefix_path("x.bin"), "tenant/x.bin");
            assert_eq!(p.prefix_directory_path("docs/"), "tenant/docs/");
            assert_eq!(p.prefix_directory_path(""), "tenant/");
        }
    }

    #[test]
    fn strip_reverses_prefix() {
        let p = PathPrefixer::new("tenant");
        assert_eq!(p.strip_prefix("tenant/docs/a.txt"), "docs/a.txt");
        assert_eq!(p.strip_directory_prefix("tenant/docs/"), "docs");
        assert_eq!(p.strip_prefix("other/a.txt"), "other/a.txt");
    }

    proptest! {
        #[test]
        fn prop_strip_reverses_prefix(root in "[a-z]{0,8}", path in "[a-z]{1,8}(/[a-z]{1,8}){0,3}") {
            let p = PathPrefixer::new(&root);
            let key = p.prefix_path(&path);
            prop_assert_eq!(p.strip_prefix(&key), path.as_str());
            prop_assert!(p.prefix_directory_path(&path).ends_with('/'));
        }
    }
}
