use starbase_styles::{Style, Stylize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;
use url::Url;

#[derive(Error, Debug, miette::Diagnostic)]
pub enum DetectError {
    #[diagnostic(code(fetchgate::detect::invalid_path))]
    #[error("Unable to convert path {} into a file URL.", .path.style(Style::Path))]
    InvalidPath { path: PathBuf },

    #[diagnostic(
        code(fetchgate::detect::relative_path),
        help = "Set a working directory on the client, or provide an absolute path."
    )]
    #[error(
        "Relative source path {} requires a working directory.",
        .path.style(Style::Path),
    )]
    RelativePathWithoutPwd { path: PathBuf },

    #[diagnostic(
        code(fetchgate::detect::unrecognized),
        help = "Use a full URL, or force a backend with the scheme::url syntax."
    )]
    #[error("Unable to detect a source for {}.", .source_string.style(Style::Url))]
    Unrecognized { source_string: String },
}

/// Turns shorthand source strings into fully qualified URLs.
pub trait Detector: Send + Sync {
    /// Return `None` when the string isn't recognized by this detector.
    fn detect(&self, source: &str, pwd: Option<&Path>) -> Result<Option<String>, DetectError>;
}

/// Detects local file system paths, and converts them to `file://` URLs.
#[derive(Debug, Default)]
pub struct FileDetector;

impl Detector for FileDetector {
    fn detect(&self, source: &str, pwd: Option<&Path>) -> Result<Option<String>, DetectError> {
        if source.is_empty() {
            return Ok(None);
        }

        let mut path = PathBuf::from(source);

        if !path.is_absolute() {
            let Some(pwd) = pwd else {
                return Err(DetectError::RelativePathWithoutPwd { path });
            };

            path = pwd.join(path);
        }

        let url = Url::from_file_path(&path).map_err(|_| DetectError::InvalidPath { path })?;

        Ok(Some(url.to_string()))
    }
}

/// True when the string already carries a URL scheme. Single letter
/// schemes are rejected, as those are Windows drive letters.
pub fn has_url_scheme(source: &str) -> bool {
    Url::parse(source).is_ok_and(|url| url.scheme().len() > 1)
}

/// Qualify the source into a URL, trying each detector in order.
/// Sources that are already URLs are returned unchanged.
pub fn detect(
    source: &str,
    pwd: Option<&Path>,
    detectors: &[std::sync::Arc<dyn Detector>],
) -> Result<String, DetectError> {
    if has_url_scheme(source) {
        return Ok(source.to_owned());
    }

    for detector in detectors {
        if let Some(url) = detector.detect(source, pwd)? {
            trace!(source, url = &url, "Detected source");

            return Ok(url);
        }
    }

    Err(DetectError::Unrecognized {
        source_string: source.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn detectors() -> Vec<Arc<dyn Detector>> {
        vec![Arc::new(FileDetector)]
    }

    #[test]
    fn passes_urls_through() {
        assert_eq!(
            detect("https://example.com/file.txt", None, &detectors()).unwrap(),
            "https://example.com/file.txt"
        );
    }

    #[test]
    fn converts_absolute_paths() {
        assert_eq!(
            detect("/tmp/srcdir", None, &detectors()).unwrap(),
            "file:///tmp/srcdir"
        );
    }

    #[test]
    fn joins_relative_paths_to_pwd() {
        assert_eq!(
            detect("nested/dir", Some(Path::new("/work")), &detectors()).unwrap(),
            "file:///work/nested/dir"
        );
    }

    #[test]
    fn errors_for_relative_without_pwd() {
        assert!(matches!(
            detect("nested/dir", None, &detectors()),
            Err(DetectError::RelativePathWithoutPwd { .. })
        ));
    }

    #[test]
    fn errors_without_detectors() {
        assert!(matches!(
            detect("nested/dir", None, &[]),
            Err(DetectError::Unrecognized { .. })
        ));
    }
}
