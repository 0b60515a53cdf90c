use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use rsview::config::Settings;
use rsview::db::{ConnectionConfig, ConnectionStore, PgConnection, SslMode};
use rsview::ui::{PackedTable, ResultFrame, ResultView, TerminalEvents};

/// Scrollable, auto-sized viewer for PostgreSQL query results
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Use a saved connection by name
    #[arg(long = "connect")]
    connect: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    dbname: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long, value_enum)]
    sslmode: Option<SslMode>,

    /// Query to run at startup
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// Show single-row results as a column/value list
    #[arg(long)]
    pivot: bool,

    /// Show only the result table
    #[arg(long)]
    no_query_box: bool,

    /// Blank cells on each side of a column's widest value
    #[arg(long)]
    margin: Option<usize>,

    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn names_server(&self) -> bool {
        self.host.is_some() || self.port.is_some() || self.dbname.is_some() || self.user.is_some()
    }

    fn apply_to(&self, settings: &mut Settings) {
        if let Some(margin) = self.margin {
            settings.margin = margin;
        }
        if self.pivot {
            settings.best_layout = true;
        }
        if self.no_query_box {
            settings.query_box = false;
        }
        if let Some(ref path) = self.log_file {
            settings.log_file = Some(path.clone());
        }
    }
}

fn main() -> Result<()> {
    // Parse CLI args (before entering raw mode so --help / errors print normally)
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    cli.apply_to(&mut settings);
    init_logging(&settings.log_path())?;

    let (config, saved) = resolve_connection(&cli)?;
    let connection = PgConnection::connect(config.clone())
        .with_context(|| format!("Failed to connect to {}", config.display_string()))?;
    if saved {
        if let Err(e) = ConnectionStore::save_last_connection(&config.name) {
            tracing::warn!("could not remember last connection: {:#}", e);
        }
    }

    let mut view = ResultView::new(PackedTable::with_margin(settings.margin), settings.query_box);
    view.theme = settings.theme();
    view.best_layout = settings.best_layout;
    view.connection_label = config.display_string();
    let mut frame = ResultFrame::new(view, Some(Arc::new(connection)));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = frame.run(&mut terminal, &mut TerminalEvents, cli.command.as_deref());
    frame.dispose();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("exiting on error: {:#}", err);
        eprintln!("Error: {err:?}");
    }

    Ok(())
}

fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Pick the connection profile: `--connect`, else the last one used unless
/// a server was named on the command line, else defaults. Flags override
/// the profile. Returns whether the profile came from the saved list.
fn resolve_connection(cli: &Cli) -> Result<(ConnectionConfig, bool)> {
    let (mut config, saved) = if let Some(ref name) = cli.connect {
        match ConnectionStore::find(name)? {
            Some(config) => (config, true),
            None => {
                let names: Vec<String> = ConnectionStore::load()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| c.name)
                    .collect();
                bail!(
                    "no saved connection named {:?} (saved: {})",
                    name,
                    if names.is_empty() { "none".to_string() } else { names.join(", ") }
                );
            }
        }
    } else if !cli.names_server() {
        ConnectionStore::load_last_connection()
            .and_then(|name| ConnectionStore::find(&name).ok().flatten())
            .map(|config| (config, true))
            .unwrap_or_default()
    } else {
        (ConnectionConfig::default(), false)
    };

    if let Some(ref host) = cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref dbname) = cli.dbname {
        config.database = dbname.clone();
    }
    if let Some(ref user) = cli.user {
        config.username = user.clone();
    }
    if let Some(sslmode) = cli.sslmode {
        config.ssl_mode = sslmode;
    }

    // Resolve password: PGPASSWORD env var, then interactive prompt
    if config.password.is_empty() {
        if let Ok(pw) = std::env::var("PGPASSWORD") {
            config.password = pw;
        } else {
            let prompt = format!("Password for {}: ", config.display_string());
            config.password = rpassword::read_password_from_tty(Some(&prompt))?;
        }
    }

    Ok((config, saved))
}
