mod config;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dlog_docker::{DockerEngine, Runtime};
use dlog_session::{CacheFileFactory, DocumentFactory, Session, SinkFactory};
use dlog_tui::{Action, AppState, Event, EventHandler, KeyBindings, LogViewerScreen, Tui, ViewSource};

use crate::config::{Args, Config};

const DEFAULT_FILTER: &str = "dlog=debug,dlog_docker=debug,dlog_logs=debug,dlog_session=debug,dlog_tui=debug";

#[tokio::main]
async fn main() {
    let result = match Config::from_args(Args::parse()) {
        Ok(config) => run_app(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to `path` if given; without a file logging stays disabled
fn init_tracing(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}

async fn run_app(config: Config) -> Result<()> {
    init_tracing(config.log.as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?config, "starting dlog");

    let engine = DockerEngine::from_env().context("invalid DOCKER_HOST")?;
    tracing::info!(endpoint = %engine.endpoint(), "using docker endpoint");
    let runtime: Arc<dyn Runtime> = Arc::new(engine);

    if config.cache_file {
        let mut factory = CacheFileFactory::in_temp_dir();
        if let Some(lines) = config.max_lines {
            factory = factory.with_capacity(lines);
        }
        let session = Session::discover(runtime, factory, config.session_config())
            .await
            .context("failed to list containers")?;
        run_pager(session).await
    } else {
        let factory = match config.max_lines {
            Some(lines) => DocumentFactory::with_capacity(lines),
            None => DocumentFactory::new(),
        };
        let session = Session::discover(runtime, factory, config.session_config())
            .await
            .context("failed to list containers")?;
        run_pager(session).await
    }
}

async fn run_pager<F>(mut session: Session<F>) -> Result<()>
where
    F: SinkFactory,
    F::Sink: ViewSource,
{
    session.start().await.context("failed to load container logs")?;

    let mut tui = Tui::new().context("failed to initialize terminal")?;
    let mut events = EventHandler::new(Duration::from_millis(100));

    let result = event_loop(&mut session, &mut tui, &mut events).await;

    events.shutdown().await;
    tui.restore().context("failed to restore terminal")?;
    session.shutdown().await.context("failed to close docker client")?;

    result
}

async fn event_loop<F>(session: &mut Session<F>, tui: &mut Tui, events: &mut EventHandler) -> Result<()>
where
    F: SinkFactory,
    F::Sink: ViewSource,
{
    let keybindings = KeyBindings::new();
    let mut source_events = session.events().context("source events already taken")?;
    let mut state = AppState::new(session.label().unwrap_or_default());

    render(tui, &mut state, session)?;

    loop {
        tokio::select! {
            Some(event) = events.next() => match event {
                Event::Key(key) => match keybindings.get_action(&key) {
                    Some(Action::SwitchContainer(direction)) => {
                        let switched = session.switch_to(direction).await;
                        state.reset_view(session.label().unwrap_or_default());
                        if let Err(e) = switched {
                            state.show_error(e.to_string());
                        }
                    }
                    Some(action) => state.apply(&action),
                    None => {}
                },
                Event::Tick | Event::Resize(_, _) => {}
                Event::Error(e) => state.show_error(e),
            },

            Some(event) = source_events.recv() => {
                // Events queued by a load that has since been replaced are stale
                if event.load() == session.load_id() {
                    state.on_source_event(&event);
                }
            }
        }

        if state.should_quit {
            break;
        }

        render(tui, &mut state, session)?;
    }

    Ok(())
}

fn render<F>(tui: &mut Tui, state: &mut AppState, session: &Session<F>) -> Result<()>
where
    F: SinkFactory,
    F::Sink: ViewSource,
{
    let sink = session.current_sink();
    let view = sink.as_deref().map(|sink| sink as &dyn ViewSource);

    tui.terminal()
        .draw(|frame| LogViewerScreen::render(frame, state, view))?;
    Ok(())
}
