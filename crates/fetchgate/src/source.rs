use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Display;

/// Finds forced backends, with the syntax `scheme::url`,
/// for example `git::https://github.com/moonrepo/proto`.
static FORCED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9]+)::(.+)$").expect("valid forced scheme pattern"));

/// A raw source string, split into an optional forced scheme and the locator.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceDescriptor {
    /// Scheme explicitly requested with the `scheme::` prefix.
    pub forced_scheme: Option<String>,

    /// Everything after the forced prefix, or the entire input.
    pub locator: String,
}

impl SourceDescriptor {
    /// Parsing is total: every input produces a descriptor.
    pub fn parse(source: impl AsRef<str>) -> Self {
        let (forced_scheme, locator) = parse_forced_scheme(source.as_ref());

        Self {
            forced_scheme: forced_scheme.map(|scheme| scheme.to_owned()),
            locator: locator.to_owned(),
        }
    }
}

impl Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.forced_scheme {
            Some(scheme) => write!(f, "{scheme}::{}", self.locator),
            None => write!(f, "{}", self.locator),
        }
    }
}

impl From<&str> for SourceDescriptor {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Split a `scheme::locator` source into its parts. Only the first `::`
/// acts as the separator, and no other URL parsing happens here.
pub fn parse_forced_scheme(source: &str) -> (Option<&str>, &str) {
    match FORCED_REGEX.captures(source) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(scheme), Some(locator)) => (Some(scheme.as_str()), locator.as_str()),
            _ => (None, source),
        },
        None => (None, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_prefix() {
        assert_eq!(
            parse_forced_scheme("https://example.com/x"),
            (None, "https://example.com/x")
        );
        assert_eq!(parse_forced_scheme("./foo/bar"), (None, "./foo/bar"));
        assert_eq!(parse_forced_scheme(""), (None, ""));
    }

    #[test]
    fn forced_prefix() {
        assert_eq!(
            parse_forced_scheme("git::https://example.com/x"),
            (Some("git"), "https://example.com/x")
        );
    }

    #[test]
    fn only_first_separator() {
        assert_eq!(parse_forced_scheme("a::b::c"), (Some("a"), "b::c"));
    }

    #[test]
    fn requires_alphanumeric_scheme() {
        assert_eq!(parse_forced_scheme("git-x::foo"), (None, "git-x::foo"));
        assert_eq!(parse_forced_scheme("::foo"), (None, "::foo"));
        assert_eq!(parse_forced_scheme("git::"), (None, "git::"));
    }

    #[test]
    fn displays_round_trip() {
        let source = SourceDescriptor::parse("s3::bucket/key");

        assert_eq!(source.forced_scheme.as_deref(), Some("s3"));
        assert_eq!(source.to_string(), "s3::bucket/key");
    }
}
