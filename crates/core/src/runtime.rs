//! Application wiring.
//!
//! [`Scorebook`] builds the shared services once from a [`ScorebookConfig`]
//! and the host's fullscreen platform, and hands out the viewer, the
//! thumbnail generator, and the libraries and practice calendars backed by
//! the configured store.

use crate::calendar::{CalendarError, PracticeCalendar};
use crate::config::{ConfigError, ScorebookConfig};
use crate::download::{DirectorySink, DownloadError, DownloadSink};
use crate::fetch::{DocumentFetcher, HttpFetcher};
use crate::fullscreen::{select_backend, BrowserFullscreenApi, FullscreenCoordinator, ShellBridge};
use crate::keyboard::KeyboardHub;
use crate::library::{Library, LibraryError};
use crate::loader::{default_engine_factory, DocumentLoader, EngineFactory};
use crate::notifications::NotificationCenter;
use crate::resources::ResourceLifecycle;
use crate::thumbnail::ThumbnailGenerator;
use crate::viewer::{ViewerController, ViewerServices};
use scorebook_cache::ThumbnailCache;
use scorebook_doc_model::OwnerId;
use scorebook_scheduler::{JobScheduler, WorkerPool, WorkerPoolConfig};
use scorebook_storage::{LocalStore, PracticeEventStore, SheetMusicStore, StorageError};
use std::io;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("failed to start workers: {0}")]
    Workers(#[source] io::Error),
}

/// The fullscreen APIs the host exposes. A shell, when present, wins.
#[derive(Clone)]
pub struct Platform {
    pub shell: Option<Arc<dyn ShellBridge>>,
    pub browser: Arc<dyn BrowserFullscreenApi>,
}

/// Who runs scheduled jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    /// Background threads, sized from the config.
    #[default]
    Workers,
    /// The host calls [`Scorebook::run_until_idle`] from its own loop.
    Manual,
}

/// Overrides for collaborators that otherwise come from the config.
#[derive(Default)]
pub struct RuntimeParts {
    pub fetcher: Option<Arc<dyn DocumentFetcher>>,
    pub downloads: Option<Arc<dyn DownloadSink>>,
    pub engines: Option<EngineFactory>,
}

pub struct Scorebook {
    config: ScorebookConfig,
    scheduler: Arc<JobScheduler>,
    lifecycle: ResourceLifecycle,
    viewer: ViewerController,
    thumbnails: ThumbnailGenerator,
    workers: Option<WorkerPool>,
}

impl Scorebook {
    pub fn new(
        config: ScorebookConfig,
        platform: Platform,
        execution: Execution,
    ) -> Result<Self, RuntimeError> {
        Self::with_parts(config, platform, execution, RuntimeParts::default())
    }

    pub fn with_parts(
        config: ScorebookConfig,
        platform: Platform,
        execution: Execution,
        parts: RuntimeParts,
    ) -> Result<Self, RuntimeError> {
        let keymap = config.keymap()?;
        let downloads = match parts.downloads {
            Some(sink) => sink,
            None => match &config.download_dir {
                Some(dir) => Arc::new(DirectorySink::new(dir)),
                None => Arc::new(DirectorySink::user_downloads()?),
            },
        };
        let fetcher = parts.fetcher.unwrap_or_else(|| Arc::new(HttpFetcher::default()));
        let engines = parts.engines.unwrap_or_else(default_engine_factory);

        let scheduler = Arc::new(JobScheduler::new());
        let lifecycle = ResourceLifecycle::default();
        let loader = DocumentLoader::new(lifecycle.clone(), fetcher, engines);

        let backend = select_backend(platform.shell, platform.browser);
        let fullscreen =
            Arc::new(FullscreenCoordinator::with_timeout(backend, config.fullscreen_timeout()));

        let thumbnails = ThumbnailGenerator::new(
            loader.clone(),
            scheduler.clone(),
            ThumbnailCache::new(),
            config.thumbnail_options(),
        );

        let viewer = ViewerController::new(ViewerServices {
            loader,
            scheduler: scheduler.clone(),
            fullscreen,
            keyboard: KeyboardHub::new(),
            keymap,
            notifications: NotificationCenter::new(),
            downloads,
        });

        let workers = match execution {
            Execution::Workers => {
                let pool_config = WorkerPoolConfig::new(config.worker_count());
                let pool =
                    WorkerPool::new(scheduler.clone(), pool_config).map_err(RuntimeError::Workers)?;
                Some(pool)
            }
            Execution::Manual => None,
        };

        tracing::info!(
            authority = %viewer.services().fullscreen.authority(),
            workers = workers.as_ref().map_or(0, WorkerPool::num_workers),
            "scorebook runtime ready"
        );
        Ok(Self { config, scheduler, lifecycle, viewer, thumbnails, workers })
    }

    pub fn config(&self) -> &ScorebookConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> &ResourceLifecycle {
        &self.lifecycle
    }

    pub fn viewer(&self) -> &ViewerController {
        &self.viewer
    }

    pub fn thumbnails(&self) -> &ThumbnailGenerator {
        &self.thumbnails
    }

    pub fn keyboard(&self) -> &KeyboardHub {
        &self.viewer.services().keyboard
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.viewer.services().notifications
    }

    pub fn fullscreen(&self) -> &Arc<FullscreenCoordinator> {
        &self.viewer.services().fullscreen
    }

    /// The configured library directory, or the platform default.
    pub fn store(&self) -> Result<Arc<dyn SheetMusicStore>, StorageError> {
        Ok(Arc::new(self.local_store()?))
    }

    /// Practice sessions, kept next to the library.
    pub fn event_store(&self) -> Result<Arc<dyn PracticeEventStore>, StorageError> {
        Ok(Arc::new(self.local_store()?))
    }

    fn local_store(&self) -> Result<LocalStore, StorageError> {
        match &self.config.library_dir {
            Some(dir) => Ok(LocalStore::with_root(dir)),
            None => LocalStore::from_default_project(),
        }
    }

    /// `owner`'s library, releasing thumbnails through this runtime.
    pub fn library(&self, owner: OwnerId) -> Result<Library, LibraryError> {
        let library = Library::load(self.store()?, owner)?;
        Ok(library.with_thumbnails(self.thumbnails.clone()))
    }

    pub fn calendar(&self, owner: OwnerId) -> Result<PracticeCalendar, CalendarError> {
        PracticeCalendar::load(self.event_store()?, owner)
    }

    /// Drain queued jobs on the calling thread; returns how many ran.
    ///
    /// Also gives up on an overdue fullscreen confirmation.
    pub fn run_until_idle(&self) -> usize {
        let ran = self.scheduler.run_until_idle();
        self.fullscreen().poll();
        ran
    }

    /// Close the viewer and stop the workers once their current jobs finish.
    pub fn shutdown(mut self) {
        self.viewer.close();
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
        }
        tracing::debug!("scorebook runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fullscreen::{Authority, SimulatedBrowser, SimulatedShell};
    use scorebook_doc_model::NewPracticeEvent;
    use scorebook_pdf_engine::fixtures;
    use scorebook_viewer_core::{DocumentReference, ViewerPhase};
    use std::time::{Duration, Instant};

    fn config(temp: &tempfile::TempDir) -> ScorebookConfig {
        ScorebookConfig {
            workers: 2,
            fullscreen_timeout_ms: 200,
            download_dir: Some(temp.path().join("downloads")),
            library_dir: Some(temp.path().join("library")),
            ..ScorebookConfig::default()
        }
    }

    fn browser_only() -> Platform {
        Platform { shell: None, browser: Arc::new(SimulatedBrowser::new()) }
    }

    #[test]
    fn shell_platform_wins() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let platform = Platform {
            shell: Some(Arc::new(SimulatedShell::new())),
            browser: Arc::new(SimulatedBrowser::new()),
        };
        let app = Scorebook::new(config(&temp), platform, Execution::Manual)
            .expect("runtime should start");

        assert_eq!(app.fullscreen().authority(), Authority::Shell);
        assert_eq!(app.fullscreen().confirm_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn invalid_keymap_fails_startup() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut config = config(&temp);
        config.keymap.insert("next_page".into(), vec!["hyper+x".into()]);

        let result = Scorebook::new(config, browser_only(), Execution::Manual);
        assert!(matches!(result, Err(RuntimeError::Config(ConfigError::Keymap(_)))));
    }

    #[test]
    fn manual_execution_waits_for_host() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let app = Scorebook::new(config(&temp), browser_only(), Execution::Manual)
            .expect("runtime should start");

        app.viewer().open(DocumentReference::buffer("a.pdf", fixtures::sample_pdf(2)), None);
        assert_eq!(app.viewer().phase(), ViewerPhase::Opening);
        assert_eq!(app.run_until_idle(), 1);
        assert_eq!(app.viewer().snapshot().total_pages, Some(2));

        app.shutdown();
    }

    #[test]
    fn workers_load_documents_in_background() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let app = Scorebook::new(config(&temp), browser_only(), Execution::Workers)
            .expect("runtime should start");
        app.viewer().open(DocumentReference::buffer("a.pdf", fixtures::sample_pdf(4)), None);

        let deadline = Instant::now() + Duration::from_secs(5);
        while app.viewer().phase() != ViewerPhase::Open && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(app.viewer().snapshot().total_pages, Some(4));

        let lifecycle = app.lifecycle().clone();
        app.shutdown();
        assert_eq!(lifecycle.live_count(), 0);
    }

    #[test]
    fn library_uses_configured_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let app = Scorebook::new(config(&temp), browser_only(), Execution::Manual)
            .expect("runtime should start");

        let mut library = app.library(OwnerId::from("me")).expect("library should succeed");
        library.add("Gymnopédie", "Satie", "g.pdf", &fixtures::sample_pdf(1))
            .expect("add should succeed");
        assert!(temp.path().join("library").join("library.json").exists());

        assert_eq!(library.mount_thumbnails(""), 1);
        app.run_until_idle();
        assert_eq!(app.thumbnails().cache().stats().ready, 1);
    }

    #[test]
    fn calendar_shares_the_library_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let app = Scorebook::new(config(&temp), browser_only(), Execution::Manual)
            .expect("runtime should start");

        let mut calendar = app.calendar(OwnerId::from("me")).expect("calendar should load");
        let start = chrono::Utc::now();
        calendar
            .add(NewPracticeEvent::new("Scales", start, start + chrono::Duration::minutes(30)))
            .expect("add should succeed");

        assert!(temp.path().join("library").join("practice.json").exists());
        let reopened = app.calendar(OwnerId::from("me")).expect("calendar should load");
        assert_eq!(reopened.events().len(), 1);
    }
}
