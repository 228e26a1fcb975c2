//! String operations behind the url pattern prefixes (`begin:`, `end:`,
//! `glob:`, regexes) and plain equality.

use regex::Regex;
use std::sync::Arc;

/// Pattern text kept alongside its lowercase form so case-insensitive
/// comparisons only fold the candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: String,
    pub lower: String,
}

impl CachedValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let lower = value.to_lowercase();
        Self { value, lower }
    }

    fn compare(&self, candidate: &str, case_sensitive: bool, op: fn(&str, &str) -> bool) -> bool {
        if case_sensitive {
            op(candidate, &self.value)
        } else {
            op(&candidate.to_lowercase(), &self.lower)
        }
    }

    #[inline]
    pub fn equals(&self, candidate: &str, case_sensitive: bool) -> bool {
        self.compare(candidate, case_sensitive, |a, b| a == b)
    }

    #[inline]
    pub fn starts(&self, candidate: &str, case_sensitive: bool) -> bool {
        self.compare(candidate, case_sensitive, |a, b| a.starts_with(b))
    }

    #[inline]
    pub fn ends(&self, candidate: &str, case_sensitive: bool) -> bool {
        self.compare(candidate, case_sensitive, |a, b| a.ends_with(b))
    }
}

impl From<&str> for CachedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One compiled string comparison.
#[derive(Debug, Clone)]
pub enum StringMatchCore {
    /// Exact string equality
    Equals(CachedValue),
    /// String starts with prefix (`^` and `begin:` url patterns)
    StartsWith(CachedValue),
    /// String ends with suffix (`end:` url patterns)
    EndsWith(CachedValue),
    /// Regex match (`glob:` patterns compile to one as well)
    Regex(Arc<Regex>),
}

impl StringMatchCore {
    pub fn equals(value: impl Into<String>) -> Self {
        Self::Equals(CachedValue::new(value))
    }

    pub fn starts_with(value: impl Into<String>) -> Self {
        Self::StartsWith(CachedValue::new(value))
    }

    pub fn ends_with(value: impl Into<String>) -> Self {
        Self::EndsWith(CachedValue::new(value))
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Arc::new(Regex::new(pattern)?)))
    }

    /// Build a matcher from a shell glob where `*` spans any run of characters
    /// (slashes included) and `?` exactly one.
    pub fn glob(glob: &str) -> Result<Self, regex::Error> {
        let mut pattern = String::with_capacity(glob.len() + 8);
        pattern.push('^');
        let mut buf = [0u8; 4];
        for ch in glob.chars() {
            match ch {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(other.encode_utf8(&mut buf))),
            }
        }
        pattern.push('$');
        Self::regex(&pattern)
    }

    /// `case_sensitive` is ignored for regexes; put `(?i)` in the pattern instead.
    pub fn matches(&self, value: &str, case_sensitive: bool) -> bool {
        match self {
            Self::Equals(cached) => cached.equals(value, case_sensitive),
            Self::StartsWith(cached) => cached.starts(value, case_sensitive),
            Self::EndsWith(cached) => cached.ends(value, case_sensitive),
            Self::Regex(regex) => regex.is_match(value),
        }
    }
}
