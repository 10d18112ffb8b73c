//! Saving the open document.

use crate::fetch::{DocumentFetcher, FetchError};
use scorebook_viewer_core::DocumentReference;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("could not fetch document: {0}")]
    Fetch(#[from] FetchError),
    #[error("could not write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("no download directory available")]
    NoDownloadDirectory,
}

/// Where downloads end up (browser save dialog, download folder, ...).
pub trait DownloadSink: Send + Sync {
    /// Persist `bytes` under `file_name`; returns where they landed.
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError>;
}

/// Writes into a directory, never overwriting: a taken name gets a
/// ` (1)`, ` (2)`, ... suffix.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The user's download folder.
    pub fn user_downloads() -> Result<Self, DownloadError> {
        dirs::download_dir().map(Self::new).ok_or(DownloadError::NoDownloadDirectory)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(&self.dir)
            .map_err(|source| DownloadError::Write { path: self.dir.clone(), source })?;

        let (stem, extension) = split_extension(file_name);
        for attempt in 0u32.. {
            let candidate = match attempt {
                0 => self.dir.join(file_name),
                n => self.dir.join(format!("{stem} ({n}){extension}")),
            };

            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut file) => {
                    let written = file.write_all(bytes).and_then(|()| file.sync_all());
                    drop(file);
                    discard_on_error(&candidate, written)?;
                    return Ok(candidate);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(DownloadError::Write { path: candidate, source }),
            }
        }

        Err(DownloadError::Write {
            path: self.dir.join(file_name),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
        })
    }
}

/// Remove the file just created at `path` if writing it failed.
fn discard_on_error(path: &Path, written: io::Result<()>) -> Result<(), DownloadError> {
    let Err(source) = written else {
        return Ok(());
    };
    if let Err(err) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), %err, "could not remove partial download");
    }
    Err(DownloadError::Write { path: path.to_path_buf(), source })
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(index) if index > 0 => file_name.split_at(index),
        _ => (file_name, ""),
    }
}

/// Bytes of `reference`: the held buffer, or a fetch of its location.
pub fn materialize(
    reference: &DocumentReference,
    fetcher: &dyn DocumentFetcher,
) -> Result<Arc<[u8]>, FetchError> {
    match reference {
        DocumentReference::Buffer { bytes, .. } => Ok(bytes.clone()),
        DocumentReference::Url { location } => fetcher.fetch(location).map(Arc::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;

    #[test]
    fn saves_without_overwriting() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let sink = DirectorySink::new(temp.path().join("downloads"));

        let first = sink.save("score.pdf", b"one").expect("save should succeed");
        let second = sink.save("score.pdf", b"two").expect("save should succeed");
        let third = sink.save("score.pdf", b"three").expect("save should succeed");

        assert_eq!(first.file_name().expect("file name should succeed"), "score.pdf");
        assert_eq!(second.file_name().expect("file name should succeed"), "score (1).pdf");
        assert_eq!(third.file_name().expect("file name should succeed"), "score (2).pdf");
        assert_eq!(fs::read(first).expect("file should be readable"), b"one");
        assert_eq!(fs::read(second).expect("file should be readable"), b"two");
    }

    #[test]
    fn unwritable_directory_is_a_write_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let blocker = temp.path().join("file");
        fs::write(&blocker, b"").expect("fixture should be written");

        let sink = DirectorySink::new(blocker.join("nested"));
        assert!(matches!(sink.save("a.pdf", b"x"), Err(DownloadError::Write { .. })));
    }

    #[test]
    fn materialize_shares_buffers_and_fetches_locations() {
        let reference = DocumentReference::buffer("a.pdf", b"%PDF".to_vec());
        let DocumentReference::Buffer { bytes, .. } = &reference else { unreachable!() };
        let fetched = materialize(&reference, &HttpFetcher::default())
            .expect("materialize should succeed");
        assert!(Arc::ptr_eq(bytes, &fetched));

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("stored.pdf");
        fs::write(&path, b"%PDF-stored").expect("fixture should be written");
        let stored = DocumentReference::url(path.display().to_string());
        let fetched = materialize(&stored, &HttpFetcher::default()).expect("fetch should succeed");
        assert_eq!(&*fetched, b"%PDF-stored");
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("score.pdf");
        fs::write(&path, b"%PDF-trunc").expect("partial file should be written");

        let result = discard_on_error(&path, Err(io::Error::other("disk full")));
        assert!(matches!(result, Err(DownloadError::Write { .. })));
        assert!(!path.exists());

        assert!(discard_on_error(&path, Ok(())).is_ok());
    }

    #[test]
    fn extension_split_keeps_dotfiles_whole() {
        assert_eq!(split_extension("a.b.pdf"), ("a.b", ".pdf"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("plain"), ("plain", ""));
    }
}
