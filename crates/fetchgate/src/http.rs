use serde::{Deserialize, Serialize};
use starbase_styles::{Style, Stylize};
use starbase_utils::fs::{self, FsError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Error, Debug, miette::Diagnostic)]
pub enum HttpClientError {
    #[diagnostic(transparent)]
    #[error(transparent)]
    Fs(#[from] Box<FsError>),

    #[diagnostic(code(fetchgate::http::client_failed))]
    #[error("Failed to create HTTP client.")]
    Client {
        #[source]
        error: Box<reqwest::Error>,
    },

    #[diagnostic(code(fetchgate::http::request_failed))]
    #[error("Failed to make HTTP request for {}.", .url.style(Style::Url))]
    Http {
        url: String,
        #[source]
        error: Box<reqwest::Error>,
    },

    #[diagnostic(code(fetchgate::http::invalid_cert))]
    #[error("Invalid certificate {}.", .path.style(Style::Path))]
    InvalidCert {
        path: PathBuf,
        #[source]
        error: Box<reqwest::Error>,
    },

    #[diagnostic(code(fetchgate::http::invalid_proxy))]
    #[error("Invalid proxy {}.", .url.style(Style::Url))]
    InvalidProxy {
        url: String,
        #[source]
        error: Box<reqwest::Error>,
    },
}

impl From<FsError> for HttpClientError {
    fn from(e: FsError) -> HttpClientError {
        HttpClientError::Fs(Box::new(e))
    }
}

/// Configures the HTTP(S) client shared by network backends.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpOptions {
    /// Skip certificate validation entirely.
    pub allow_invalid_certs: bool,

    /// Proxies to route requests through. An `http:` proxy applies to plain
    /// requests, and an `https:` proxy to secure ones.
    pub proxies: Vec<String>,

    /// Extra root certificate to trust, as a `.pem` or `.der` file.
    pub root_cert: Option<PathBuf>,
}

/// Create an HTTP(S) client with the provided options.
pub fn create_http_client_with_options(
    options: &HttpOptions,
) -> Result<reqwest::Client, HttpClientError> {
    debug!("Creating HTTP client");

    let mut client_builder = reqwest::Client::builder()
        .user_agent(format!("fetchgate@{}", env!("CARGO_PKG_VERSION")))
        .use_rustls_tls();

    if options.allow_invalid_certs {
        warn!("Accepting invalid certificates for every request");

        client_builder = client_builder.danger_accept_invalid_certs(true);
    }

    if let Some(root_cert) = &options.root_cert {
        trace!(root_cert = ?root_cert, "Adding user provided root certificate");

        let map_cert_error = |error: reqwest::Error| HttpClientError::InvalidCert {
            path: root_cert.to_path_buf(),
            error: Box::new(error),
        };

        match root_cert.extension().and_then(|ext| ext.to_str()) {
            Some("der") => {
                client_builder = client_builder.add_root_certificate(
                    reqwest::Certificate::from_der(&fs::read_file_bytes(root_cert)?)
                        .map_err(map_cert_error)?,
                )
            }
            Some("pem") => {
                client_builder = client_builder.add_root_certificate(
                    reqwest::Certificate::from_pem(&fs::read_file_bytes(root_cert)?)
                        .map_err(map_cert_error)?,
                )
            }
            _ => {
                warn!(
                    root_cert = ?root_cert,
                    "Invalid root certificate type, must be a DER or PEM file",
                );
            }
        };
    }

    for proxy in &options.proxies {
        let map_proxy_error = |error: reqwest::Error| HttpClientError::InvalidProxy {
            url: proxy.to_owned(),
            error: Box::new(error),
        };

        if proxy.starts_with("https:") {
            trace!(proxy, "Adding secure proxy to client");

            client_builder =
                client_builder.proxy(reqwest::Proxy::https(proxy).map_err(map_proxy_error)?);
        } else if proxy.starts_with("http:") {
            trace!(proxy, "Adding insecure proxy to client");

            client_builder =
                client_builder.proxy(reqwest::Proxy::http(proxy).map_err(map_proxy_error)?);
        } else {
            warn!(proxy, "Invalid proxy, only http or https URLs allowed");
        }
    }

    let client = client_builder
        .build()
        .map_err(|error| HttpClientError::Client {
            error: Box::new(error),
        })?;

    debug!("Created HTTP client");

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_default_client() {
        assert!(create_http_client_with_options(&HttpOptions::default()).is_ok());
    }

    #[test]
    fn errors_for_missing_root_cert() {
        let result = create_http_client_with_options(&HttpOptions {
            root_cert: Some(PathBuf::from("/missing/fetchgate/root.pem")),
            ..HttpOptions::default()
        });

        assert!(matches!(result, Err(HttpClientError::Fs(_))));
    }
}
