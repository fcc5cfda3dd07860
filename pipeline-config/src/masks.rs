//! Literal secrets that must never show up in the UI or in logs.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

const REPLACEMENT: &str = "***";

/// Ordered list of passwords to redact.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordMasks(Vec<String>);

impl PasswordMasks {
    pub fn new<I, S>(masks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(masks.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Replaces every occurrence of every mask with `***`.
    ///
    /// Longer masks are applied first so a password that contains another
    /// one is still redacted as a whole. Returns the input unchanged (borrowed)
    /// when nothing matched.
    pub fn mask<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut ordered: Vec<&str> = self.iter().filter(|m| !m.is_empty()).collect();
        ordered.sort_by_key(|m| std::cmp::Reverse(m.len()));

        let mut result = Cow::Borrowed(text);
        for secret in ordered {
            if result.contains(secret) {
                result = Cow::Owned(result.replace(secret, REPLACEMENT));
            }
        }
        result
    }
}

// Never print the secrets themselves.
impl fmt::Debug for PasswordMasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<PasswordMasks with {} elements>", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_replaces_all_occurrences() {
        let masks = PasswordMasks::new(["s3cret", "hunter2"]);
        let masked = masks.mask("psql -p s3cret && echo s3cret hunter2");
        assert_eq!(masked, "psql -p *** && echo *** ***");
    }

    #[test]
    fn test_mask_borrows_when_nothing_matches() {
        let masks = PasswordMasks::new(["s3cret"]);
        assert!(matches!(masks.mask("nothing here"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_longest_mask_wins() {
        let masks = PasswordMasks::new(["abc", "abcdef"]);
        assert_eq!(masks.mask("x abcdef y"), "x *** y");
    }

    #[test]
    fn test_empty_mask_is_ignored() {
        let masks = PasswordMasks::new([""]);
        assert_eq!(masks.mask("text"), "text");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let masks = PasswordMasks::new(["s3cret"]);
        let printed = format!("{masks:?}");
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("1 elements"));
    }
}
