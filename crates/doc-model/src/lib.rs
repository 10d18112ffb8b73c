//! Records the library and the practice calendar are built from.

pub mod practice;

pub use practice::{
    sort_by_start, DayCell, EventId, MonthGrid, NewPracticeEvent, PracticeEvent,
    DEFAULT_EVENT_COLOR, VISIBLE_EVENTS_PER_DAY,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Fresh random id for a new item.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A library row as the backend stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMusicRecord {
    pub id: ItemId,
    pub owner_id: OwnerId,
    pub title: String,
    pub composer: String,
    /// Location of the stored PDF.
    pub pdf_url: String,
    pub is_favorite: bool,
    pub date_added: DateTime<Utc>,
}

/// Metadata for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSheetMusic {
    pub id: ItemId,
    pub title: String,
    pub composer: String,
    pub is_favorite: bool,
    pub date_added: DateTime<Utc>,
}

impl NewSheetMusic {
    pub fn new(title: impl Into<String>, composer: impl Into<String>) -> Self {
        Self {
            id: ItemId::generate(),
            title: title.into(),
            composer: composer.into(),
            is_favorite: false,
            date_added: Utc::now(),
        }
    }

    /// Trims title and composer and rejects empty ones.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.title = self.title.trim().to_owned();
        self.composer = self.composer.trim().to_owned();

        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.composer.is_empty() {
            return Err(ValidationError::EmptyComposer);
        }
        Ok(self)
    }

    pub fn into_record(self, owner_id: OwnerId, pdf_url: String) -> SheetMusicRecord {
        SheetMusicRecord {
            id: self.id,
            owner_id,
            title: self.title,
            composer: self.composer,
            pdf_url,
            is_favorite: self.is_favorite,
            date_added: self.date_added,
        }
    }
}

/// Partial update; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMusicPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl SheetMusicPatch {
    pub fn favorite(is_favorite: bool) -> Self {
        Self { is_favorite: Some(is_favorite), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.composer.is_none() && self.is_favorite.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(ValidationError::EmptyTitle);
        }
        if self.composer.as_deref().is_some_and(|composer| composer.trim().is_empty()) {
            return Err(ValidationError::EmptyComposer);
        }
        Ok(())
    }

    pub fn apply_to<T: Listable>(&self, target: &mut T) {
        if let Some(title) = &self.title {
            target.set_title(title.trim().to_owned());
        }
        if let Some(composer) = &self.composer {
            target.set_composer(composer.trim().to_owned());
        }
        if let Some(is_favorite) = self.is_favorite {
            target.set_favorite(is_favorite);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("composer must not be empty")]
    EmptyComposer,
    #[error("practice session ends before it starts")]
    EndsBeforeStart,
    #[error("color must be a #RRGGBB hex value")]
    InvalidColor,
}

/// Fields the list filters, sorts and patches on.
pub trait Listable {
    fn title(&self) -> &str;
    fn composer(&self) -> &str;
    fn is_favorite(&self) -> bool;
    fn date_added(&self) -> DateTime<Utc>;

    fn set_title(&mut self, title: String);
    fn set_composer(&mut self, composer: String);
    fn set_favorite(&mut self, is_favorite: bool);
}

impl Listable for SheetMusicRecord {
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

/// Case-insensitive substring match on title or composer. A blank query
/// matches everything.
pub fn matches_query<T: Listable>(item: &T, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }

    item.title().to_lowercase().contains(&query) || item.composer().to_lowercase().contains(&query)
}

/// Favorites first, then newest first.
pub fn listing_order<T: Listable>(a: &T, b: &T) -> Ordering {
    b.is_favorite().cmp(&a.is_favorite()).then_with(|| b.date_added().cmp(&a.date_added()))
}

/// Filter by `query` and sort for display.
pub fn visible_items<'a, T: Listable>(items: &'a [T], query: &str) -> Vec<&'a T> {
    let mut visible: Vec<&T> = items.iter().filter(|item| matches_query(*item, query)).collect();
    visible.sort_by(|a, b| listing_order(*a, *b));
    visible
}
