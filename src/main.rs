use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing_subscriber::EnvFilter;

use fichaje::{
    app_dirs::AppDirs,
    backend::HttpBackend,
    camera::CameraDirectory,
    capture::ScannerBackend,
    runtime::{spawn_terminal_events, AppEvent, ChannelEventSource, EventBus, FixedTicker, Runner},
    station::Station,
    store::{FileStateStore, StateStore},
    ui::{self, Focus},
};

const TICK_RATE_MS: u64 = 100;

/// attendance station tui: scan a QR credential, check people in and out
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal attendance station. Scans QR credentials with an attached camera, \
looks the roster up from a spreadsheet-backed web app and posts check-in/check-out events to it, \
keeping a per-device daily summary."
)]
pub struct Cli {
    /// base URL of the spreadsheet web-app backend
    #[clap(short, long)]
    url: String,

    /// role scoping both the remote roster and the local cache
    #[clap(short, long, default_value = "administrativo")]
    role: String,

    /// external scanner command emitting one decoded payload per stdout line
    #[clap(long, default_value = "zbarcam")]
    scanner_cmd: String,

    /// override the state file location (defaults to the per-user state dir)
    #[clap(long)]
    state_file: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let _log_guard = init_tracing();

    let backend = Arc::new(HttpBackend::new(cli.url.clone(), cli.role.clone())?);
    let store: Box<dyn StateStore> = match &cli.state_file {
        Some(path) => Box::new(FileStateStore::with_path(path)),
        None => Box::new(FileStateStore::for_role(&cli.role)),
    };

    let (bus, rx) = EventBus::channel();
    let mut station = Station::new(
        cli.role.clone(),
        backend,
        store,
        Box::new(ScannerBackend::new(cli.scanner_cmd.clone())),
        CameraDirectory::new(),
        bus.clone(),
    );
    station.bootstrap();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;

    spawn_terminal_events(bus);
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    let result = start_tui(&mut terminal, &mut station, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Logs go to a file under the state dir; the alternate screen owns stdout.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let dir = AppDirs::log_dir()?;
    std::fs::create_dir_all(&dir).ok()?;
    let appender = tracing_appender::rolling::never(dir, "fichaje.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    station: &mut Station,
    runner: &Runner<ChannelEventSource, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    let mut focus = Focus::People;
    let today = || Local::now().date_naive();

    terminal.draw(|f| ui::render(f, station, focus, today()))?;

    loop {
        match runner.step() {
            AppEvent::Key(key) => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => break,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                KeyCode::Char('s') => station.start_capture(),
                KeyCode::Char('x') => station.stop_capture(),
                KeyCode::Char('f') => station.flip_camera(),
                KeyCode::Char('r') => station.refresh_cameras(),
                KeyCode::Char('c') => station.clear_history(),
                KeyCode::Tab => focus = focus.toggle(),
                KeyCode::Up => match focus {
                    Focus::People => station.person_prev(),
                    Focus::Cameras => station.camera_prev(),
                },
                KeyCode::Down => match focus {
                    Focus::People => station.person_next(),
                    Focus::Cameras => station.camera_next(),
                },
                _ => {}
            },
            AppEvent::Resize => {}
            AppEvent::Tick => station.on_tick(Instant::now()),
            other => station.handle_event(other),
        }
        terminal.draw(|f| ui::render(f, station, focus, today()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_requires_url() {
        assert!(Cli::try_parse_from(["fichaje"]).is_err());
    }

    #[test]
    fn cli_default_values() {
        let cli = Cli::parse_from(["fichaje", "-u", "https://example.test/exec"]);

        assert_eq!(cli.url, "https://example.test/exec");
        assert_eq!(cli.role, "administrativo");
        assert_eq!(cli.scanner_cmd, "zbarcam");
        assert_eq!(cli.state_file, None);
    }

    #[test]
    fn cli_role_override() {
        let cli = Cli::parse_from(["fichaje", "-u", "https://example.test", "--role", "docente"]);
        assert_eq!(cli.role, "docente");

        let cli = Cli::parse_from(["fichaje", "-u", "https://example.test", "-r", "docente"]);
        assert_eq!(cli.role, "docente");
    }

    #[test]
    fn cli_scanner_and_state_overrides() {
        let cli = Cli::parse_from([
            "fichaje",
            "-u",
            "https://example.test",
            "--scanner-cmd",
            "my-scanner",
            "--state-file",
            "/tmp/fichaje-state.json",
        ]);

        assert_eq!(cli.scanner_cmd, "my-scanner");
        assert_eq!(
            cli.state_file,
            Some(PathBuf::from("/tmp/fichaje-state.json"))
        );
    }
}
