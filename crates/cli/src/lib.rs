use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use scorebook_cache::{ThumbnailCache, ThumbnailView};
use scorebook_core::fullscreen::{ShellBridge, SimulatedBrowser, SimulatedShell};
use scorebook_core::{
    default_engine_factory, DirectorySink, DocumentLoader, DownloadSink, EventSummary, Execution,
    HttpFetcher, ItemSummary, Notification, Platform, ResourceLifecycle, RuntimeParts, Scorebook,
    ScorebookConfig, ThumbnailGenerator,
};
use scorebook_doc_model::{
    EventId, ItemId, MonthGrid, NewPracticeEvent, OwnerId, SheetMusicPatch, DEFAULT_EVENT_COLOR,
};
use scorebook_scheduler::JobScheduler;
use scorebook_viewer_core::{DocumentReference, KeyChord, ViewerSnapshot};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Filter directives for the stderr log, e.g. `scorebook_core=debug`.
pub const LOG_ENV: &str = "SCOREBOOK_LOG";

#[derive(Debug, Parser)]
#[command(name = "scorebook")]
#[command(about = "Scorebook sheet-music CLI")]
pub struct Cli {
    /// Config file to read instead of the default location.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
    /// Render the list thumbnail of a score as a JPEG.
    Thumbnail {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        scale: Option<f32>,
        #[arg(long)]
        quality: Option<u8>,
    },
    /// Run a scripted viewer session, printing one JSON line per step.
    ///
    /// Commands are read from --script or stdin, one per line: next, prev,
    /// zoom-in, zoom-out, fullscreen, download, close, key <chord>,
    /// open <file>, os-fullscreen <on|off>, user-exit.
    View {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum, default_value_t = PlatformKind::Shell)]
        platform: PlatformKind,
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,
    },
    /// Manage the local sheet-music library.
    Library {
        #[arg(long, default_value = "local")]
        owner: String,
        #[command(subcommand)]
        command: LibraryCommand,
    },
    /// Manage scheduled practice sessions.
    Practice {
        #[arg(long, default_value = "local")]
        owner: String,
        #[command(subcommand)]
        command: PracticeCommand,
    },
    /// Print the effective configuration as TOML.
    Config,
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum LibraryCommand {
    /// List items, favorites first then newest first.
    List {
        #[arg(long, default_value = "")]
        query: String,
        /// Also generate the list thumbnails.
        #[arg(long)]
        thumbnails: bool,
    },
    /// Upload a PDF.
    Add {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        composer: String,
    },
    /// Flip an item's favorite flag.
    Favorite { id: String },
    /// Change title and/or composer.
    Rename {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        composer: Option<String>,
    },
    /// Delete an item and its stored PDF.
    Remove { id: String },
}

#[derive(Debug, Subcommand)]
enum PracticeCommand {
    /// List sessions, earliest first.
    List {
        /// Only sessions for this library item.
        #[arg(long, value_name = "ITEM_ID")]
        sheet: Option<String>,
    },
    /// Schedule a session.
    Add {
        #[arg(long)]
        title: String,
        /// RFC 3339 start time, e.g. 2024-03-05T18:00:00Z.
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long, default_value_t = 30)]
        minutes: u32,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_name = "ITEM_ID")]
        sheet: Option<String>,
        #[arg(long, default_value = DEFAULT_EVENT_COLOR)]
        color: String,
    },
    /// Flip a session's completed flag.
    Toggle { id: String },
    /// Delete a session.
    Remove { id: String },
    /// Print a month grid with each day's sessions.
    Month {
        /// `YYYY-MM`; defaults to the current month.
        #[arg(long, value_name = "YYYY-MM")]
        month: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlatformKind {
    /// Desktop window; requests confirm through the window event.
    Shell,
    /// Page fullscreen API only.
    Browser,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    source: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct ThumbnailOutput {
    output: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
struct ViewStep<'a> {
    step: usize,
    command: &'a str,
    snapshot: ViewerSnapshot,
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
struct ListedItem {
    #[serde(flatten)]
    item: ItemSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<ThumbnailView>,
}

/// Log to stderr, filtered by [`LOG_ENV`] (warnings by default).
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { source } => run_info(&source),
        Commands::Thumbnail { source, output, scale, quality } => {
            run_thumbnail(&config, &source, output.as_deref(), scale, quality)
        }
        Commands::View { source, title, platform, script } => {
            run_view(config, &source, title, platform, script.as_deref())
        }
        Commands::Library { owner, command } => run_library(config, &owner, command),
        Commands::Practice { owner, command } => run_practice(config, &owner, command),
        Commands::Config => {
            print!("{}", config.to_toml().context("failed to serialize config")?);
            Ok(())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ScorebookConfig> {
    let config = match path {
        Some(path) => {
            let mut config = ScorebookConfig::from_path(path)?;
            config.apply_env(|name| std::env::var(name).ok())?;
            config
        }
        None => ScorebookConfig::load()?,
    };
    Ok(config)
}

/// A local path becomes a buffer; `http(s)://` and `file://` stay locations.
fn reference_for(source: &str) -> Result<DocumentReference> {
    let lower = source.to_ascii_lowercase();
    if ["http://", "https://", "file://"].iter().any(|scheme| lower.starts_with(scheme)) {
        return Ok(DocumentReference::url(source));
    }

    let path = Path::new(source);
    if !path.exists() {
        bail!("file does not exist: {}", path.display());
    }
    if !path.is_file() {
        bail!("path is not a file: {}", path.display());
    }
    DocumentReference::from_file(path).with_context(|| format!("failed to read {}", path.display()))
}

fn loader() -> DocumentLoader {
    DocumentLoader::new(
        ResourceLifecycle::default(),
        Arc::new(HttpFetcher::default()),
        default_engine_factory(),
    )
}

fn run_info(source: &str) -> Result<()> {
    let reference = reference_for(source)?;
    let loader = loader();

    let lease = loader.lifecycle().lease(&reference)?;
    let url = lease.url().context("display URL already released")?;
    let document = loader.load(url).context("failed to open PDF")?;

    let page_count = document.page_count();
    let first_page_size_pt = if page_count > 0 {
        let size = document.page_size(0)?;
        Some(PageSizeOutput { width: size.width_pt, height: size.height_pt })
    } else {
        None
    };

    let payload = InfoOutput { source: source.to_owned(), page_count, first_page_size_pt };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_thumbnail(
    config: &ScorebookConfig,
    source: &str,
    output: Option<&Path>,
    scale: Option<f32>,
    quality: Option<u8>,
) -> Result<()> {
    let reference = reference_for(source)?;

    let mut options = config.thumbnail_options();
    if let Some(scale) = scale {
        if scale <= 0.0 {
            bail!("--scale must be positive");
        }
        options.scale = scale;
    }
    if let Some(quality) = quality {
        options.quality = quality.clamp(1, 100);
    }

    let generator = ThumbnailGenerator::new(
        loader(),
        Arc::new(JobScheduler::new()),
        ThumbnailCache::new(),
        options,
    );
    let thumbnail = generator.generate(&reference).context("failed to render thumbnail")?;

    let encoded = thumbnail
        .data_url
        .split_once(',')
        .map(|(_, data)| data)
        .context("thumbnail is not a data URL")?;
    let jpeg = STANDARD.decode(encoded).context("thumbnail data URL is not base64")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_thumbnail_output(source));
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, jpeg)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    let payload = ThumbnailOutput {
        output: output.display().to_string(),
        width: thumbnail.width,
        height: thumbnail.height,
    };
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}

fn default_thumbnail_output(source: &str) -> PathBuf {
    let path = Path::new(source);
    let stem = path.file_stem().and_then(|name| name.to_str()).unwrap_or("thumbnail");
    if path.exists() {
        path.with_file_name(format!("{stem}-thumb.jpg"))
    } else {
        PathBuf::from(format!("{stem}-thumb.jpg"))
    }
}

/// The configured directory, else the user's downloads, else the working directory.
fn download_sink(config: &ScorebookConfig) -> Arc<dyn DownloadSink> {
    if let Some(dir) = &config.download_dir {
        return Arc::new(DirectorySink::new(dir));
    }
    match DirectorySink::user_downloads() {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            tracing::warn!(%err, "saving downloads to the working directory");
            Arc::new(DirectorySink::new("."))
        }
    }
}

fn runtime(config: ScorebookConfig, platform: Platform) -> Result<Scorebook> {
    let parts = RuntimeParts { downloads: Some(download_sink(&config)), ..Default::default() };
    let app = Scorebook::with_parts(config, platform, Execution::Manual, parts)?;
    Ok(app)
}

fn run_view(
    config: ScorebookConfig,
    source: &str,
    title: Option<String>,
    platform: PlatformKind,
    script: Option<&Path>,
) -> Result<()> {
    let shell = Arc::new(SimulatedShell::new());
    let browser = Arc::new(SimulatedBrowser::new());
    let app = runtime(
        config,
        Platform {
            shell: (platform == PlatformKind::Shell).then(|| shell.clone() as Arc<dyn ShellBridge>),
            browser: browser.clone(),
        },
    )?;

    let viewer = app.viewer().clone();
    viewer.open(reference_for(source)?, title);
    let mut step = 0;
    emit_step(&app, step, "open")?;

    let input: Box<dyn BufRead> = match script {
        Some(path) => Box::new(BufReader::new(
            fs::File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    for line in input.lines() {
        let line = line.context("failed to read script")?;
        let command = line.trim();
        if command.is_empty() || command.starts_with('#') {
            continue;
        }

        let (verb, argument) = match command.split_once(char::is_whitespace) {
            Some((verb, argument)) => (verb, argument.trim()),
            None => (command, ""),
        };
        match verb {
            "next" => {
                viewer.next_page();
            }
            "prev" => {
                viewer.prev_page();
            }
            "zoom-in" => {
                viewer.zoom_in();
            }
            "zoom-out" => {
                viewer.zoom_out();
            }
            "fullscreen" => {
                if let Err(err) = viewer.toggle_fullscreen() {
                    app.notifications().error(format!("Fullscreen failed: {err}"));
                }
            }
            "download" => {
                viewer.download();
            }
            "close" => viewer.close(),
            "key" => {
                let chord: KeyChord = argument.parse()?;
                app.keyboard().dispatch(&chord);
            }
            "open" => {
                viewer.open(reference_for(argument)?, None);
            }
            "os-fullscreen" => {
                let on = match argument {
                    "on" => true,
                    "off" => false,
                    other => bail!("os-fullscreen expects on or off, got `{other}`"),
                };
                shell.simulate_os_change(on);
            }
            "user-exit" => browser.simulate_user_exit(),
            other => bail!("unknown view command `{other}`"),
        }

        step += 1;
        emit_step(&app, step, command)?;
    }

    app.shutdown();
    Ok(())
}

fn emit_step(app: &Scorebook, step: usize, command: &str) -> Result<()> {
    app.run_until_idle();
    let line = ViewStep {
        step,
        command,
        snapshot: app.viewer().snapshot(),
        notifications: app.notifications().drain(),
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

fn run_library(config: ScorebookConfig, owner: &str, command: LibraryCommand) -> Result<()> {
    let platform = Platform { shell: None, browser: Arc::new(SimulatedBrowser::new()) };
    let app = runtime(config, platform)?;
    let mut library = app.library(OwnerId::from(owner))?;

    match command {
        LibraryCommand::List { query, thumbnails } => {
            if thumbnails {
                library.mount_thumbnails(&query);
                app.run_until_idle();
            }
            let items: Vec<ListedItem> = library
                .visible_items(&query)
                .into_iter()
                .map(|item| ListedItem {
                    item: ItemSummary::from(item),
                    thumbnail: thumbnails.then(|| app.thumbnails().view(item.id.as_str())),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        LibraryCommand::Add { file, title, composer } => {
            let bytes =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let item = library.add(&title, &composer, &file_name, &bytes)?;
            println!("{}", serde_json::to_string_pretty(&ItemSummary::from(item))?);
        }
        LibraryCommand::Favorite { id } => {
            let id = ItemId::from(id.as_str());
            let is_favorite = library.toggle_favorite(&id)?;
            println!("{}", serde_json::json!({ "id": id, "is_favorite": is_favorite }));
        }
        LibraryCommand::Rename { id, title, composer } => {
            let id = ItemId::from(id.as_str());
            let patch = SheetMusicPatch { title, composer, is_favorite: None };
            if patch.is_empty() {
                bail!("nothing to change: pass --title and/or --composer");
            }
            library.update(&id, &patch)?;
            let item = library.get(&id).context("item vanished after update")?;
            println!("{}", serde_json::to_string_pretty(&ItemSummary::from(item))?);
        }
        LibraryCommand::Remove { id } => {
            let removed = library.remove(&ItemId::from(id.as_str()))?;
            println!("{}", serde_json::json!({ "removed": removed.id }));
        }
    }

    app.shutdown();
    Ok(())
}

fn parse_month(raw: &str) -> Result<MonthGrid> {
    let (year, month) = raw
        .split_once('-')
        .with_context(|| format!("expected YYYY-MM, got `{raw}`"))?;
    let year: i32 = year.parse().with_context(|| format!("invalid year in `{raw}`"))?;
    let month: u32 = month.parse().with_context(|| format!("invalid month in `{raw}`"))?;
    MonthGrid::new(year, month).with_context(|| format!("no such month `{raw}`"))
}

fn run_practice(config: ScorebookConfig, owner: &str, command: PracticeCommand) -> Result<()> {
    let platform = Platform { shell: None, browser: Arc::new(SimulatedBrowser::new()) };
    let app = runtime(config, platform)?;
    let mut calendar = app.calendar(OwnerId::from(owner))?;
    let today: NaiveDate = Utc::now().date_naive();

    match command {
        PracticeCommand::List { sheet } => {
            let events: Vec<EventSummary> = match sheet {
                Some(sheet) => calendar
                    .events_for_sheet(&ItemId::from(sheet.as_str()))
                    .into_iter()
                    .map(EventSummary::from)
                    .collect(),
                None => calendar.events().iter().map(EventSummary::from).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        PracticeCommand::Add { title, start, minutes, description, sheet, color } => {
            let end = start + Duration::minutes(i64::from(minutes));
            let mut event = NewPracticeEvent::new(title, start, end);
            event.description = description;
            event.color = color;
            if let Some(sheet) = sheet {
                event = event.for_sheet(ItemId::from(sheet.as_str()));
            }
            let stored = calendar.add(event)?;
            println!("{}", serde_json::to_string_pretty(&EventSummary::from(stored))?);
        }
        PracticeCommand::Toggle { id } => {
            let id = EventId::from(id.as_str());
            let is_completed = calendar.toggle_completion(&id)?;
            println!("{}", serde_json::json!({ "id": id, "is_completed": is_completed }));
        }
        PracticeCommand::Remove { id } => {
            let removed = calendar.remove(&EventId::from(id.as_str()))?;
            println!("{}", serde_json::json!({ "removed": removed.id }));
        }
        PracticeCommand::Month { month } => {
            let grid = match month {
                Some(raw) => parse_month(&raw)?,
                None => MonthGrid::containing(today),
            };
            println!("{}", serde_json::to_string_pretty(&calendar.month(grid, today))?);
        }
    }

    app.shutdown();
    Ok(())
}
