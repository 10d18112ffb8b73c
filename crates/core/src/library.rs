//! The sheet-music list
//!
//! Mirrors the backend's records for one owner. Mutations go to the store
//! first and touch the in-memory list only once the store accepted them.

use crate::thumbnail::ThumbnailGenerator;
use chrono::{DateTime, Utc};
use scorebook_doc_model::{
    visible_items, ItemId, Listable, NewSheetMusic, OwnerId, SheetMusicPatch, SheetMusicRecord,
    ValidationError,
};
use scorebook_pdf_engine::looks_like_pdf;
use scorebook_storage::{SheetMusicStore, StorageError};
use scorebook_viewer_core::DocumentReference;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{0} is not a PDF document")]
    NotPdf(String),
    #[error("sheet music {0} not found")]
    NotFound(ItemId),
}

/// A list entry; its source is the stored document's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetMusicItem {
    pub id: ItemId,
    pub title: String,
    pub composer: String,
    pub source: DocumentReference,
    pub is_favorite: bool,
    pub date_added: DateTime<Utc>,
}

impl From<SheetMusicRecord> for SheetMusicItem {
    fn from(record: SheetMusicRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            composer: record.composer,
            source: DocumentReference::url(record.pdf_url),
            is_favorite: record.is_favorite,
            date_added: record.date_added,
        }
    }
}

impl Listable for SheetMusicItem {
    fn title(&self) -> &str {
        &self.title
    }

    fn composer(&self) -> &str {
        &self.composer
    }

    fn is_favorite(&self) -> bool {
        self.is_favorite
    }

    fn date_added(&self) -> DateTime<Utc> {
        self.date_added
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }

    fn set_composer(&mut self, composer: String) {
        self.composer = composer;
    }

    fn set_favorite(&mut self, is_favorite: bool) {
        self.is_favorite = is_favorite;
    }
}

/// Row shape for hosts and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    pub id: String,
    pub title: String,
    pub composer: String,
    pub is_favorite: bool,
    pub date_added: DateTime<Utc>,
    pub location: Option<String>,
}

impl From<&SheetMusicItem> for ItemSummary {
    fn from(item: &SheetMusicItem) -> Self {
        let location = match &item.source {
            DocumentReference::Url { location } => Some(location.clone()),
            DocumentReference::Buffer { .. } => None,
        };
        Self {
            id: item.id.to_string(),
            title: item.title.clone(),
            composer: item.composer.clone(),
            is_favorite: item.is_favorite,
            date_added: item.date_added,
            location,
        }
    }
}

pub struct Library {
    store: Arc<dyn SheetMusicStore>,
    owner: OwnerId,
    items: Vec<SheetMusicItem>,
    thumbnails: Option<ThumbnailGenerator>,
}

impl Library {
    pub fn load(store: Arc<dyn SheetMusicStore>, owner: OwnerId) -> Result<Self, LibraryError> {
        let items = store.fetch_items(&owner)?.into_iter().map(SheetMusicItem::from).collect();
        Ok(Self { store, owner, items, thumbnails: None })
    }

    /// Release thumbnail entries through `generator` as items leave the list.
    pub fn with_thumbnails(mut self, generator: ThumbnailGenerator) -> Self {
        self.thumbnails = Some(generator);
        self
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn items(&self) -> &[SheetMusicItem] {
        &self.items
    }

    pub fn get(&self, id: &ItemId) -> Option<&SheetMusicItem> {
        self.items.iter().find(|item| item.id == *id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Re-read the owner's records from the store.
    pub fn reload(&mut self) -> Result<(), LibraryError> {
        self.items =
            self.store.fetch_items(&self.owner)?.into_iter().map(SheetMusicItem::from).collect();
        if let Some(thumbnails) = &self.thumbnails {
            thumbnails.retain(self.items.iter().map(|item| item.id.as_str()));
        }
        Ok(())
    }

    /// Upload `bytes` with the given metadata.
    pub fn add(
        &mut self,
        title: &str,
        composer: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<&SheetMusicItem, LibraryError> {
        let new_item = NewSheetMusic::new(title, composer).validated()?;
        if !looks_like_pdf(bytes) {
            return Err(LibraryError::NotPdf(file_name.to_owned()));
        }

        let location = self.store.create_item(&self.owner, &new_item, bytes)?;
        let record = new_item.into_record(self.owner.clone(), location);
        tracing::info!(id = %record.id, title = record.title.as_str(), "added sheet music");

        self.items.push(record.into());
        let index = self.items.len() - 1;
        Ok(&self.items[index])
    }

    pub fn update(&mut self, id: &ItemId, patch: &SheetMusicPatch) -> Result<(), LibraryError> {
        patch.validate()?;
        let index = self.index_of(id)?;
        if patch.is_empty() {
            return Ok(());
        }

        self.store.update_item(&self.owner, id, patch)?;
        patch.apply_to(&mut self.items[index]);
        tracing::debug!(%id, "updated sheet music");
        Ok(())
    }

    /// Flip the favorite flag; returns the new value.
    pub fn toggle_favorite(&mut self, id: &ItemId) -> Result<bool, LibraryError> {
        let is_favorite = !self.items[self.index_of(id)?].is_favorite;
        self.update(id, &SheetMusicPatch::favorite(is_favorite))?;
        Ok(is_favorite)
    }

    /// Delete the item and its stored PDF, dropping its thumbnail entry.
    pub fn remove(&mut self, id: &ItemId) -> Result<SheetMusicItem, LibraryError> {
        let index = self.index_of(id)?;
        self.store.delete_item(&self.owner, id)?;

        let removed = self.items.remove(index);
        if let Some(thumbnails) = &self.thumbnails {
            thumbnails.release(id.as_str());
        }
        tracing::info!(%id, "removed sheet music");
        Ok(removed)
    }

    /// Matching items, favorites first, newest first.
    pub fn visible_items(&self, query: &str) -> Vec<&SheetMusicItem> {
        visible_items(&self.items, query)
    }

    /// Request thumbnails for the items `query` shows and release the rest.
    ///
    /// Returns the number of items shown.
    pub fn mount_thumbnails(&self, query: &str) -> usize {
        let visible = self.visible_items(query);
        if let Some(thumbnails) = &self.thumbnails {
            thumbnails.retain(visible.iter().map(|item| item.id.as_str()));
            for item in &visible {
                thumbnails.request(item.id.as_str(), &item.source);
            }
        }
        visible.len()
    }

    fn index_of(&self, id: &ItemId) -> Result<usize, LibraryError> {
        self.items
            .iter()
            .position(|item| item.id == *id)
            .ok_or_else(|| LibraryError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use crate::loader::{default_engine_factory, DocumentLoader};
    use crate::resources::ResourceLifecycle;
    use crate::thumbnail::ThumbnailOptions;
    use scorebook_cache::{ThumbnailCache, ThumbnailView};
    use scorebook_pdf_engine::fixtures;
    use scorebook_scheduler::JobScheduler;
    use scorebook_storage::LocalStore;

    struct Fixture {
        _temp: tempfile::TempDir,
        store: Arc<LocalStore>,
        scheduler: Arc<JobScheduler>,
        generator: ThumbnailGenerator,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let store = Arc::new(LocalStore::with_root(temp.path()));
        let scheduler = Arc::new(JobScheduler::new());
        let loader = DocumentLoader::new(
            ResourceLifecycle::default(),
            Arc::new(HttpFetcher::default()),
            default_engine_factory(),
        );
        let generator = ThumbnailGenerator::new(
            loader,
            scheduler.clone(),
            ThumbnailCache::new(),
            ThumbnailOptions::default(),
        );
        Fixture { _temp: temp, store, scheduler, generator }
    }

    fn library(f: &Fixture) -> Library {
        Library::load(f.store.clone(), OwnerId::from("owner-1"))
            .expect("library should load")
            .with_thumbnails(f.generator.clone())
    }

    fn titles(items: &[&SheetMusicItem]) -> Vec<String> {
        items.iter().map(|item| item.title.clone()).collect()
    }

    #[test]
    fn add_persists_and_appends() {
        let f = fixture();
        let mut library = library(&f);
        let pdf = fixtures::sample_pdf(2);
        let id = library.add("Clair de Lune", "Debussy", "clair.pdf", &pdf)
            .expect("add should succeed").id.clone();

        let item = library.get(&id).expect("item should exist");
        assert!(matches!(item.source, DocumentReference::Url { .. }));
        let reloaded = Library::load(f.store.clone(), OwnerId::from("owner-1"))
            .expect("load should succeed");
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.items()[0].id, id);
    }

    #[test]
    fn add_rejects_blank_metadata_and_non_pdf() {
        let f = fixture();
        let mut library = library(&f);

        assert!(matches!(
            library.add(" ", "Bach", "a.pdf", &fixtures::sample_pdf(1)),
            Err(LibraryError::Invalid(ValidationError::EmptyTitle))
        ));
        assert!(matches!(
            library.add("Notes", "Me", "notes.txt", b"plain text"),
            Err(LibraryError::NotPdf(_))
        ));
        assert!(library.is_empty());
    }

    #[test]
    fn toggle_and_update_propagate_to_store() {
        let f = fixture();
        let mut library = library(&f);
        let pdf = fixtures::sample_pdf(1);
        let id = library.add("Prelude", "Bach", "p.pdf", &pdf)
            .expect("add should succeed").id.clone();

        assert!(library.toggle_favorite(&id).expect("toggle favorite should succeed"));
        let patch = SheetMusicPatch { title: Some("Prelude in C".into()), ..Default::default() };
        library.update(&id, &patch).expect("update should succeed");

        let stored = f.store.fetch_items(&OwnerId::from("owner-1"))
            .expect("fetch items should succeed");
        assert!(stored[0].is_favorite);
        assert_eq!(stored[0].title, "Prelude in C");
        assert_eq!(library.get(&id).expect("item should exist").title, "Prelude in C");
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let f = fixture();
        let mut library = library(&f);
        let missing = ItemId::from("nope");

        assert!(matches!(library.toggle_favorite(&missing), Err(LibraryError::NotFound(_))));
        assert!(matches!(library.remove(&missing), Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn visible_items_filter_and_order() {
        let f = fixture();
        let mut library = library(&f);
        let pdf = fixtures::sample_pdf(1);
        let pause = || std::thread::sleep(std::time::Duration::from_millis(5));
        library.add("Arabesque", "Debussy", "a.pdf", &pdf).expect("add should succeed");
        pause();
        let gnossienne = library.add("Gnossienne", "Satie", "g.pdf", &pdf)
            .expect("add should succeed").id.clone();
        pause();
        library.add("Reverie", "Debussy", "r.pdf", &pdf).expect("add should succeed");
        library.toggle_favorite(&gnossienne).expect("toggle favorite should succeed");

        assert_eq!(titles(&library.visible_items("")), ["Gnossienne", "Reverie", "Arabesque"]);
        assert_eq!(titles(&library.visible_items("debussy")), ["Reverie", "Arabesque"]);
    }

    #[test]
    fn remove_drops_thumbnail_entry() {
        let f = fixture();
        let mut library = library(&f);
        let pdf = fixtures::sample_pdf(1);
        let id = library.add("Etude", "Chopin", "e.pdf", &pdf)
            .expect("add should succeed").id.clone();

        assert_eq!(library.mount_thumbnails(""), 1);
        f.scheduler.run_until_idle();
        assert!(matches!(f.generator.view(id.as_str()), ThumbnailView::Ready { .. }));

        library.remove(&id).expect("remove should succeed");
        assert_eq!(f.generator.view(id.as_str()), ThumbnailView::Missing);
        assert!(library.is_empty());
    }

    #[test]
    fn mounting_a_narrower_query_releases_hidden_items() {
        let f = fixture();
        let mut library = library(&f);
        let pdf = fixtures::sample_pdf(1);
        let bach = library.add("Invention", "Bach", "i.pdf", &pdf)
            .expect("add should succeed").id.clone();
        let satie = library.add("Gymnopedie", "Satie", "g.pdf", &pdf)
            .expect("add should succeed").id.clone();

        library.mount_thumbnails("");
        assert_eq!(library.mount_thumbnails("satie"), 1);

        assert_eq!(f.generator.view(bach.as_str()), ThumbnailView::Missing);
        assert_eq!(f.generator.view(satie.as_str()), ThumbnailView::Loading);
    }
}
