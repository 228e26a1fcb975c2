//! URL normalization for call records and url patterns.
//!
//! Absolute URLs are serialized the way a WHATWG URL parser does (dot segments
//! collapsed, scheme and host lower-cased, `/` for an empty path). Relative URLs
//! are resolved against a base when one is configured and otherwise reduced to
//! a normalized path plus query. Protocol-relative URLs keep their `//` form.

use crate::error::{Error, Result};
use url::Url;

const DUMMY_BASE: &str = "http://dummy.invalid/";

/// A normalized URL split into the pieces matchers look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Full normalized form, compared by exact url patterns
    pub href: String,
    /// Percent-encoded path, always starting with `/`
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    pub kind: UrlKind,
}

/// How the caller spelled the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Absolute,
    ProtocolRelative,
    Relative,
}

impl NormalizedUrl {
    /// Path plus `?query` when there is one.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Whether a string starts with a URL scheme (`scheme:`).
pub fn has_scheme(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    for c in chars {
        match c {
            ':' => return true,
            c if c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.') => {}
            _ => return false,
        }
    }
    false
}

/// Normalize a raw URL string, resolving relative forms against `base` when given.
pub fn normalize_url(raw: &str, base: Option<&Url>) -> Result<NormalizedUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidInput("url must not be empty".to_string()));
    }

    if let Some(rest) = raw.strip_prefix("//") {
        let parsed = parse(&format!("http://{rest}"), raw)?;
        let href = parsed.as_str().trim_start_matches("http:").to_string();
        return Ok(split(&parsed, href, UrlKind::ProtocolRelative));
    }

    if has_scheme(raw) {
        let parsed = parse(raw, raw)?;
        return Ok(split(&parsed, parsed.to_string(), UrlKind::Absolute));
    }

    if let Some(base) = base {
        let mut joined = base.join(raw).map_err(|e| {
            Error::InvalidInput(format!("cannot resolve '{raw}' against {base}: {e}"))
        })?;
        joined.set_fragment(None);
        return Ok(split(&joined, joined.to_string(), UrlKind::Absolute));
    }

    let dummy = Url::parse(DUMMY_BASE).map_err(|e| Error::InvalidInput(e.to_string()))?;
    let mut resolved = dummy
        .join(raw)
        .map_err(|e| Error::InvalidInput(format!("invalid relative url '{raw}': {e}")))?;
    resolved.set_fragment(None);
    let path = resolved.path().to_string();
    let query = resolved.query().map(str::to_string);
    let href = match &query {
        Some(q) => format!("{path}?{q}"),
        None => path.clone(),
    };
    Ok(NormalizedUrl {
        href,
        path,
        query,
        kind: UrlKind::Relative,
    })
}

fn parse(candidate: &str, original: &str) -> Result<Url> {
    let mut url = Url::parse(candidate)
        .map_err(|e| Error::InvalidInput(format!("invalid url '{original}': {e}")))?;
    url.set_fragment(None);
    Ok(url)
}

fn split(url: &Url, href: String, kind: UrlKind) -> NormalizedUrl {
    NormalizedUrl {
        href,
        path: url.path().to_string(),
        query: url.query().map(str::to_string),
        kind,
    }
}
