//! Sheet-music CRUD backend.
//!
//! [`SheetMusicStore`] is the narrow contract the library consumes. The hosted
//! backend lives elsewhere; [`LocalStore`] keeps records in a versioned JSON
//! file and the uploaded PDFs next to it. Practice sessions go through
//! [`PracticeEventStore`], kept by the same store in a second file.

mod practice;

pub use practice::PracticeEventStore;

use directories::ProjectDirs;
use scorebook_doc_model::{
    EventId, ItemId, NewSheetMusic, OwnerId, SheetMusicPatch, SheetMusicRecord, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const LIBRARY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported library schema version {0}")]
    UnsupportedVersion(u32),
    #[error("sheet music {0} not found")]
    NotFound(ItemId),
    #[error("sheet music {0} already exists")]
    AlreadyExists(ItemId),
    #[error("practice event {0} not found")]
    EventNotFound(EventId),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

pub trait SheetMusicStore: Send + Sync {
    /// Every record of `owner`, newest first.
    fn fetch_items(&self, owner: &OwnerId) -> Result<Vec<SheetMusicRecord>, StorageError>;

    /// Store the PDF and its metadata; returns the stored location.
    fn create_item(
        &self,
        owner: &OwnerId,
        item: &NewSheetMusic,
        pdf: &[u8],
    ) -> Result<String, StorageError>;

    fn update_item(
        &self,
        owner: &OwnerId,
        id: &ItemId,
        patch: &SheetMusicPatch,
    ) -> Result<(), StorageError>;

    /// Remove the PDF and the record.
    fn delete_item(&self, owner: &OwnerId, id: &ItemId) -> Result<(), StorageError>;
}

/// A versioned JSON document kept under the store root.
trait Envelope: Serialize + DeserializeOwned {
    const FILE_NAME: &'static str;
    const VERSION: u32;

    fn empty() -> Self;
    fn version(&self) -> u32;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryEnvelope {
    version: u32,
    items: Vec<SheetMusicRecord>,
}

impl Envelope for LibraryEnvelope {
    const FILE_NAME: &'static str = "library.json";
    const VERSION: u32 = LIBRARY_SCHEMA_VERSION;

    fn empty() -> Self {
        Self { version: Self::VERSION, items: Vec::new() }
    }

    fn version(&self) -> u32 {
        self.version
    }
}

/// File-backed store: `library.json` plus `files/<owner>/<id>.pdf`, and
/// `practice.json` for scheduled sessions.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("app", "Scorebook", "Scorebook")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self::with_root(dirs.data_local_dir().join("library")))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), write_lock: Mutex::new(()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn envelope_path<E: Envelope>(&self) -> PathBuf {
        self.root.join(E::FILE_NAME)
    }

    fn file_path(&self, owner: &OwnerId, id: &ItemId) -> PathBuf {
        self.root.join("files").join(file_component(owner.as_str())).join(format!(
            "{}.pdf",
            file_component(id.as_str())
        ))
    }

    fn load<E: Envelope>(&self) -> Result<E, StorageError> {
        let path = self.envelope_path::<E>();
        if !path.exists() {
            return Ok(E::empty());
        }

        let bytes = fs::read(path)?;
        let envelope: E = serde_json::from_slice(&bytes)?;
        if envelope.version() != E::VERSION {
            return Err(StorageError::UnsupportedVersion(envelope.version()));
        }
        Ok(envelope)
    }

    fn save<E: Envelope>(&self, envelope: &E) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let bytes = serde_json::to_vec_pretty(envelope)?;
        let tmp = self.root.join(format!("{}.tmp", E::FILE_NAME));
        fs::write(&tmp, bytes)?;
        fs::rename(tmp, self.envelope_path::<E>())?;
        Ok(())
    }

    /// Apply `f` to the envelope under the write lock and persist the result.
    fn modify<E: Envelope, T>(
        &self,
        f: impl FnOnce(&mut E) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut envelope = self.load()?;
        let value = f(&mut envelope)?;
        self.save(&envelope)?;
        Ok(value)
    }
}

impl SheetMusicStore for LocalStore {
    fn fetch_items(&self, owner: &OwnerId) -> Result<Vec<SheetMusicRecord>, StorageError> {
        let envelope: LibraryEnvelope = self.load()?;
        let mut items: Vec<_> =
            envelope.items.into_iter().filter(|item| item.owner_id == *owner).collect();
        items.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        Ok(items)
    }

    fn create_item(
        &self,
        owner: &OwnerId,
        item: &NewSheetMusic,
        pdf: &[u8],
    ) -> Result<String, StorageError> {
        let item = item.clone().validated()?;
        let path = self.file_path(owner, &item.id);

        self.modify(|envelope: &mut LibraryEnvelope| {
            if envelope.items.iter().any(|existing| existing.id == item.id) {
                return Err(StorageError::AlreadyExists(item.id.clone()));
            }

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, pdf)?;

            let location = path.display().to_string();
            envelope.items.push(item.into_record(owner.clone(), location.clone()));
            tracing::debug!(%owner, %location, "stored sheet music");
            Ok(location)
        })
    }

    fn update_item(
        &self,
        owner: &OwnerId,
        id: &ItemId,
        patch: &SheetMusicPatch,
    ) -> Result<(), StorageError> {
        patch.validate()?;

        self.modify(|envelope: &mut LibraryEnvelope| {
            let record = envelope
                .items
                .iter_mut()
                .find(|record| record.id == *id && record.owner_id == *owner)
                .ok_or_else(|| StorageError::NotFound(id.clone()))?;
            patch.apply_to(record);
            Ok(())
        })
    }

    fn delete_item(&self, owner: &OwnerId, id: &ItemId) -> Result<(), StorageError> {
        let path = self.file_path(owner, id);

        self.modify(|envelope: &mut LibraryEnvelope| {
            let before = envelope.items.len();
            envelope.items.retain(|record| !(record.id == *id && record.owner_id == *owner));
            if envelope.items.len() == before {
                return Err(StorageError::NotFound(id.clone()));
            }

            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), "stored PDF already missing");
                }
                Err(err) => return Err(err.into()),
            }
            Ok(())
        })
    }
}

fn file_component(raw: &str) -> String {
    raw.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' }).collect()
}
