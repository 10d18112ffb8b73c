//! Scorebook core
//!
//! The viewing side of the sheet-music organizer: display-URL lifecycle,
//! document loading, list thumbnails, fullscreen coordination, the viewer
//! state machine, the library that feeds them, and the practice calendar.

pub mod calendar;
pub mod config;
pub mod download;
pub mod fetch;
pub mod fullscreen;
pub mod keyboard;
pub mod library;
pub mod loader;
pub mod notifications;
pub mod resources;
pub mod runtime;
pub mod thumbnail;
pub mod viewer;

pub use calendar::{CalendarError, DaySummary, EventSummary, MonthSummary, PracticeCalendar};
pub use config::{ConfigError, ScorebookConfig, ThumbnailConfig};
pub use download::{DirectorySink, DownloadError, DownloadSink};
pub use fetch::{DocumentFetcher, FetchError, HttpFetcher};
pub use fullscreen::{
    select_backend, Authority, FullscreenBackend, FullscreenCoordinator, FullscreenError,
    Subscription, Transition,
};
pub use keyboard::{KeyboardHub, ListenerId};
pub use library::{ItemSummary, Library, LibraryError, SheetMusicItem};
pub use loader::{default_engine_factory, DocumentLoader, EngineFactory, LoadError};
pub use notifications::{Notification, NotificationCenter, NotificationLevel};
pub use resources::{DisplayUrl, DisplayUrlLease, ResourceError, ResourceLifecycle};
pub use runtime::{Execution, Platform, RuntimeError, RuntimeParts, Scorebook};
pub use thumbnail::{ThumbnailError, ThumbnailGenerator, ThumbnailOptions};
pub use viewer::{ViewerController, ViewerServices};
