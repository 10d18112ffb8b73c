//! Resolving document locations to bytes.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on a fetched document.
const MAX_DOCUMENT_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {location} failed: {message}")]
    Network { location: String, message: String },
    #[error("{location} answered with HTTP status {status}")]
    Status { location: String, status: u16 },
    #[error("reading {} failed: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("unsupported location scheme in {0}")]
    UnsupportedScheme(String),
    #[error("{location} is larger than the document size limit")]
    TooLarge { location: String },
}

/// Turns a stored document location into its bytes.
pub trait DocumentFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

/// `http(s)://` through `ureq`; `file://` and bare paths through the filesystem.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }
}

impl HttpFetcher {
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("scorebook/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn fetch_http(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.agent.get(location).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => {
                FetchError::Status { location: location.to_owned(), status }
            }
            other => {
                FetchError::Network { location: location.to_owned(), message: other.to_string() }
            }
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_DOCUMENT_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| FetchError::Network {
                location: location.to_owned(),
                message: err.to_string(),
            })?;

        if bytes.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(FetchError::TooLarge { location: location.to_owned() });
        }
        Ok(bytes)
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(location, "fetching document");

        match classify(location) {
            Location::Http => self.fetch_http(location),
            Location::File(path) => read_file(&path),
            Location::Unsupported => Err(FetchError::UnsupportedScheme(location.to_owned())),
        }
    }
}

enum Location {
    Http,
    File(PathBuf),
    Unsupported,
}

fn classify(location: &str) -> Location {
    let lower = location.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Location::Http;
    }
    if let Some(path) = location.strip_prefix("file://") {
        return Location::File(PathBuf::from(path));
    }

    // A `scheme:` prefix that is not a Windows drive letter.
    match location.split_once(':') {
        Some((scheme, _))
            if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            Location::Unsupported
        }
        _ => Location::File(PathBuf::from(location)),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, FetchError> {
    std::fs::read(path).map_err(|source| FetchError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_plain_paths_and_file_urls() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("score.pdf");
        std::fs::write(&path, b"%PDF-1.4").expect("fixture should be written");

        let fetcher = HttpFetcher::default();
        let plain = fetcher.fetch(&path.display().to_string()).expect("fetch should succeed");
        let file_url = fetcher.fetch(&format!("file://{}", path.display()));
        assert_eq!(plain, b"%PDF-1.4");
        assert_eq!(file_url.expect("file url should be fetched"), b"%PDF-1.4");
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let missing = temp.path().join("missing.pdf");

        let err = HttpFetcher::default().fetch(&missing.display().to_string()).unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        let err = HttpFetcher::default().fetch("blob:scorebook/abc").unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(_)));
    }

    #[test]
    fn classifies_windows_drive_paths_as_files() {
        assert!(matches!(classify("C:\\scores\\a.pdf"), Location::File(_)));
        assert!(matches!(classify("HTTPS://cdn.example/a.pdf"), Location::Http));
    }
}
