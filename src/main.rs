mod api;
mod app;
mod camera;
mod capture;
mod config;
mod controller;
mod error;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::{HttpRegistry, Registry};
use app::{App, Popup};
use camera::{CameraBackend, V4lBackend};
use capture::{CapturedImage, PHOTO_COUNT};
use config::AppConfig;
use controller::CaptureAndRegisterController;

#[derive(Parser, Debug)]
#[command(name = "facecap")]
#[command(version)]
#[command(about = "Capture four webcam photos and register a user with a face-embedding backend")]
struct Args {
    /// Backend base URL (overrides the config file)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// V4L2 capture device (overrides the config file)
    #[arg(long, value_name = "PATH")]
    device: Option<String>,

    /// Print the registered users as JSON and exit
    #[arg(long)]
    users: bool,

    /// Register USERNAME from four existing JPEG files, without the TUI
    #[arg(long, value_name = "USERNAME", requires = "photos")]
    register: Option<String>,

    /// A photo for --register; give it four times
    #[arg(long = "photo", value_name = "FILE", requires = "register")]
    photos: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let headless = args.users || args.register.is_some();
    init_logging(!headless);

    let mut config = AppConfig::load().unwrap_or_default();
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if let Some(device) = args.device {
        config.device = device;
    }

    // Handle CLI-only commands
    if args.users {
        return print_users(&config).await;
    }

    if let Some(username) = args.register {
        return register_headless(&config, &username, &args.photos).await;
    }

    run_tui(&config).await
}

/// Log to stderr in headless modes. The TUI owns the terminal, so there the
/// log goes to a file in the cache directory instead.
fn init_logging(tui: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if !tui {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
        return;
    }

    match open_log_file() {
        Some(file) => registry
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init(),
        None => registry.init(),
    }
}

fn open_log_file() -> Option<std::fs::File> {
    let dir = dirs::cache_dir()?.join("facecap");
    std::fs::create_dir_all(&dir).ok()?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("facecap.log"))
        .ok()
}

fn build_controller(config: &AppConfig) -> Result<CaptureAndRegisterController<HttpRegistry, V4lBackend>> {
    let registry = HttpRegistry::from_config(config).context("Failed to build HTTP client")?;
    let backend = V4lBackend::new(&config.device, config.capture_width, config.capture_height);
    Ok(CaptureAndRegisterController::new(registry, backend, config.jpeg_quality))
}

async fn print_users(config: &AppConfig) -> Result<()> {
    let registry = HttpRegistry::from_config(config).context("Failed to build HTTP client")?;
    let users = registry
        .fetch_users()
        .await
        .with_context(|| format!("Failed to fetch users from {}", config.users_url()))?;
    println!("{}", serde_json::to_string_pretty(&users)?);
    Ok(())
}

async fn register_headless(config: &AppConfig, username: &str, photos: &[PathBuf]) -> Result<()> {
    if photos.len() != PHOTO_COUNT {
        anyhow::bail!(
            "--register needs exactly {} --photo files, got {}",
            PHOTO_COUNT,
            photos.len()
        );
    }

    let mut controller = build_controller(config)?;
    for path in photos {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let image = CapturedImage::from_jpeg(bytes).with_context(|| format!("Invalid photo {}", path.display()))?;
        controller.add_image(image);
    }

    controller.set_username(username);
    controller
        .submit()
        .await
        .with_context(|| format!("Failed to register {} at {}", username.trim(), config.register_url()))?;

    println!("Registered {} ({} users on server)", username.trim(), controller.users().len());
    Ok(())
}

async fn run_tui(config: &AppConfig) -> Result<()> {
    ui::init_theme(theme::Theme::from_config(&config.theme));
    let controller = build_controller(config)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(controller, config.notifications);

    // Main loop
    let result = run_app(&mut terminal, &mut app);
    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app<R: Registry, B: CameraBackend>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<R, B>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        // ~30 fps keeps the live view smooth
        if event::poll(Duration::from_millis(33))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') if app.popup == Popup::None && !app.wants_text_input() => {
                            return Ok(())
                        }
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        _ => app.handle_key(key),
                    }
                }
            }
        }

        app.tick();
    }
}
