//! Client path validation and canonicalization.
//!
//! A client path is accepted when:
//! - after ASCII-lowercasing it matches `^[/0-9a-z \-_',]+(\.[a-z0-9]+)?$`
//! - it has at least one non-empty segment
//! - joined onto the storage root, it still resolves inside that root
//!
//! The last check is lexical and independent of the character filter, so a
//! relaxed pattern can never open a traversal hole on its own.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PathError;

static VALID_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[/0-9a-z \-_',]+(\.[a-z0-9]+)?$").expect("path pattern is valid")
});

/// A canonical, validated blob path: lowercase, `/`-separated, without
/// leading, trailing or repeated slashes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobPath(String);

impl BlobPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segments of the path, root first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Debug for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobPath({:?})", self.0)
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl AsRef<str> for BlobPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validates raw client paths against a storage root.
#[derive(Clone, Debug)]
pub struct PathValidator {
    root: PathBuf,
}

impl PathValidator {
    /// Build a validator for the given storage root.
    ///
    /// The root is made absolute and lexically normalized once here; no
    /// filesystem access happens during [`validate`](Self::validate).
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let root = resolve(&absolute).unwrap_or(absolute);
        Self { root }
    }

    /// The normalized storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and canonicalize an already percent-decoded client path.
    pub fn validate(&self, raw: &str) -> Result<BlobPath, PathError> {
        let lowered = raw.to_ascii_lowercase();
        if !VALID_PATH.is_match(&lowered) {
            return Err(PathError::Malformed(raw.to_string()));
        }

        let canonical = lowered
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if canonical.is_empty() {
            return Err(PathError::Empty);
        }

        match resolve(&self.root.join(&canonical)) {
            Some(joined) if joined.starts_with(&self.root) && joined != self.root => {
                Ok(BlobPath(canonical))
            }
            _ => Err(PathError::EscapesRoot(raw.to_string())),
        }
    }
}

/// Lexically resolve `.` and `..` components.
///
/// Returns `None` when a `..` would climb above the first component.
fn resolve(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn validator() -> PathValidator {
        PathValidator::new("/srv/blob/data")
    }

    #[test]
    fn accepts_simple_file() {
        let path = validator().validate("/foo.txt").unwrap();
        assert_eq!(path.as_str(), "foo.txt");
        assert_eq!(path.to_string(), "/foo.txt");
    }

    #[test]
    fn lowercases_and_collapses_slashes() {
        let path = validator().validate("//Docs///Q3 Report, Final.PDF").unwrap();
        assert_eq!(path.as_str(), "docs/q3 report, final.pdf");
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["docs", "q3 report, final.pdf"]);
    }

    #[test]
    fn accepts_without_leading_slash_or_extension() {
        assert_eq!(validator().validate("a/b_c-d'e").unwrap().as_str(), "a/b_c-d'e");
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(validator().validate("/dir/").unwrap().as_str(), "dir");
    }

    #[test]
    fn rejects_root_only() {
        assert_eq!(validator().validate("/"), Err(PathError::Empty));
        assert_eq!(validator().validate("///"), Err(PathError::Empty));
    }

    #[test]
    fn rejects_empty_string() {
        assert!(matches!(validator().validate(""), Err(PathError::Malformed(_))));
    }

    #[test]
    fn rejects_traversal() {
        for raw in ["/../etc/passwd", "/a/../../b", "/A../etc", "..", "/./x"] {
            assert!(validator().validate(raw).is_err(), "{raw} accepted");
        }
    }

    #[test]
    fn rejects_encoded_traversal_left_undecoded() {
        assert!(matches!(
            validator().validate("/A%2e%2e%2fetc"),
            Err(PathError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_second_extension() {
        assert!(validator().validate("/archive.tar.gz").is_err());
        assert!(validator().validate("/dir.d/file").is_err());
    }

    #[test]
    fn rejects_non_ascii() {
        assert!(validator().validate("/caf\u{e9}.txt").is_err());
        // Kelvin sign lowercases to an ASCII `k` under Unicode rules.
        assert!(validator().validate("/\u{212a}.txt").is_err());
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let v = PathValidator::new("data");
        assert!(v.root().is_absolute());
        assert!(v.validate("/x.bin").is_ok());
    }

    #[test]
    fn resolve_handles_dots() {
        assert_eq!(resolve(Path::new("/a/./b/../c")), Some(PathBuf::from("/a/c")));
        assert_eq!(resolve(Path::new("a/../..")), None);
    }

    #[test]
    fn containment_check_is_independent_of_the_pattern() {
        let v = validator();
        let escaped = resolve(&v.root().join("x/../../../etc")).unwrap();
        assert!(!escaped.starts_with(v.root()));
    }

    proptest! {
        #[test]
        fn forbidden_characters_are_rejected(
            prefix in "[a-z]{0,8}",
            bad in r##"[!"#$%&()*+:;<=>?@\[\\\]^`{|}~]"##,
            suffix in "[a-z]{0,8}",
        ) {
            let raw = format!("/{prefix}{bad}{suffix}");
            prop_assert!(validator().validate(&raw).is_err());
        }

        #[test]
        fn valid_paths_canonicalize_to_lowercase(
            segments in prop::collection::vec("[A-Za-z0-9 _,'-]{1,10}", 1..5),
            ext in "[A-Za-z0-9]{1,4}",
        ) {
            let raw = format!("/{}.{}", segments.join("/"), ext);
            let path = validator().validate(&raw).unwrap();
            prop_assert_eq!(path.as_str(), raw[1..].to_ascii_lowercase());
            prop_assert!(!path.as_str().starts_with('/'));
        }
    }
}
