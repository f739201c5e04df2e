use fetchgate::{FetchMode, SourceDescriptor, parse_forced_scheme};

mod forced_scheme {
    use super::*;

    #[test]
    fn leaves_sources_without_prefix_untouched() {
        for source in [
            "https://example.com/archive.zip",
            "file:///tmp/srcdir",
            "/tmp/srcdir",
            "relative/path",
            "git@github.com:moonrepo/proto.git",
            "C:\\Users\\fetch",
            "",
        ] {
            assert_eq!(parse_forced_scheme(source), (None, source));
        }
    }

    #[test]
    fn extracts_prefix_before_url() {
        assert_eq!(
            parse_forced_scheme("git::https://example.com/x"),
            (Some("git"), "https://example.com/x")
        );
    }

    #[test]
    fn only_consumes_first_separator() {
        assert_eq!(parse_forced_scheme("a::b::c"), (Some("a"), "b::c"));
    }

    #[test]
    fn allows_digits_in_scheme() {
        assert_eq!(
            parse_forced_scheme("s3::bucket/key"),
            (Some("s3"), "bucket/key")
        );
    }

    #[test]
    fn ignores_non_alphanumeric_prefixes() {
        assert_eq!(parse_forced_scheme("git+ssh::foo"), (None, "git+ssh::foo"));
        assert_eq!(parse_forced_scheme(" git::foo"), (None, " git::foo"));
    }
}

mod descriptor {
    use super::*;

    #[test]
    fn parses_forced() {
        let source = SourceDescriptor::parse("file::./local/dir");

        assert_eq!(
            source,
            SourceDescriptor {
                forced_scheme: Some("file".into()),
                locator: "./local/dir".into(),
            }
        );
    }

    #[test]
    fn parses_unforced() {
        let source = SourceDescriptor::from("https://example.com");

        assert_eq!(source.forced_scheme, None);
        assert_eq!(source.locator, "https://example.com");
        assert_eq!(source.to_string(), "https://example.com");
    }
}

mod fetch_mode {
    use super::*;

    #[test]
    fn defaults_to_unset() {
        assert_eq!(FetchMode::default(), FetchMode::Unset);
        assert!(!FetchMode::Unset.is_resolved());
        assert!(!FetchMode::Any.is_resolved());
        assert!(FetchMode::Directory.is_resolved());
        assert!(FetchMode::File.is_resolved());
    }
}
