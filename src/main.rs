//! gridcalc - terminal spreadsheet with arithmetic formulas.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridcalc::application::{App, AppMode};
use gridcalc::infrastructure::{FileKeyValueStore, Settings, SheetRepository};
use gridcalc::presentation::{grid_viewport, render_ui, InputHandler};

#[derive(Debug, Parser)]
#[command(name = "gridcalc", version, about = "Terminal spreadsheet with arithmetic formulas")]
struct Cli {
    /// Settings file (defaults to <config dir>/gridcalc/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to this file; filter with GRIDCALC_LOG
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Directory holding saved spreadsheets
    #[arg(long, value_name = "DIR")]
    storage_dir: Option<PathBuf>,

    /// Load a CSV file into the grid at startup
    #[arg(long, value_name = "PATH", conflicts_with = "open")]
    import: Option<PathBuf>,

    /// Open a saved spreadsheet by id at startup
    #[arg(long, value_name = "ID")]
    open: Option<String>,
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_env("GRIDCALC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn build_app(cli: &Cli) -> Result<App> {
    let mut settings = Settings::load(cli.config.as_deref());
    if let Some(dir) = &cli.storage_dir {
        settings.storage_dir = Some(dir.clone());
    }

    let storage_dir = settings.storage_dir();
    info!(dir = %storage_dir.display(), "using storage directory");
    let repository = SheetRepository::new(FileKeyValueStore::new(storage_dir), settings.key_prefix.clone());
    let mut app = App::new(&settings, repository);

    if let Some(path) = &cli.import {
        let import = app
            .import_csv(path)
            .with_context(|| format!("cannot import {}", path.display()))?;
        app.status_message = Some(format!("Imported {} cells from {}", import.cells, path.display()));
    }
    if let Some(id) = &cli.open {
        app.open(id).with_context(|| format!("cannot open spreadsheet {id}"))?;
    }
    Ok(app)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let mut app = build_app(&cli)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.context("terminal error")
}

/// Draws and dispatches key presses until `q` is pressed in normal mode.
fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        let size = terminal.size()?;
        let (rows, cols) = grid_viewport(size.width, size.height);
        app.update_viewport_size(rows, cols);

        terminal.draw(|f| render_ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                match key.code {
                    KeyCode::Char('q') if app.mode == AppMode::Normal && key.modifiers.is_empty() => {
                        info!("quit");
                        return Ok(());
                    }
                    _ => InputHandler::handle_key_event(app, key.code, key.modifiers),
                }
            }
        }
    }
}
