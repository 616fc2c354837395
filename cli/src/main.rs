
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use board_sync::board::parse_elements;
use board_sync::{
    BoardViewController, ChannelError, ChannelEvent, ConfigError, Element, LessonId, PersistenceError,
    PersistenceGateway, SessionCredentials, SyncConfig,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Time for the transport writer to flush `DISCONNECT` before the runtime exits.
const FLUSH_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing bearer token; pass --token or set BOARD_SYNC_TOKEN")]
    MissingToken,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("live channel failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("live channel closed")]
    ChannelClosed,
    #[error("timed out waiting for the live channel")]
    Timeout,
    #[error("failed to read {path}: {source}")]
    Input { path: String, source: io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to install signal handler: {0}")]
    Signal(io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "board-sync-cli", about = "Lesson board load/save and live-channel CLI")]
struct Cli {
    /// HTTP API origin; the channel endpoint is derived from it.
    #[arg(long, env = "BOARD_SYNC_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "BOARD_SYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// How long `push` and `status` wait for the live connection.
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the persisted board as pretty JSON.
    Load { lesson: LessonId },
    /// Save a JSON element array as the lesson's board.
    Save {
        lesson: LessonId,
        #[arg(long, default_value = "-", help = "Input file path, or - for stdin")]
        input: String,
    },
    /// Print the scene as one JSON line per change until Ctrl-C.
    Watch { lesson: LessonId },
    /// Append one element to the live board.
    Push {
        lesson: LessonId,
        #[arg(long)]
        data: String,
        /// Also persist the resulting board.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Connect, then print the connection status.
    Status { lesson: LessonId },
}

struct CliContext {
    config: SyncConfig,
    credentials: Arc<SessionCredentials>,
    wait: Duration,
}

impl CliContext {
    fn controller(&self, lesson: LessonId) -> Result<BoardViewController, CliError> {
        Ok(BoardViewController::from_config(lesson, &self.config, self.credentials.clone())?)
    }

    fn gateway(&self) -> Result<PersistenceGateway, CliError> {
        Ok(PersistenceGateway::new(&self.config, self.credentials.clone())?)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            eprintln!("warning: failed to load .env: {error}");
        }
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let ctx = context(&cli)?;

    match cli.command {
        Command::Load { lesson } => run_load(&ctx, lesson).await,
        Command::Save { lesson, input } => run_save(&ctx, lesson, &input).await,
        Command::Watch { lesson } => run_watch(&ctx, lesson).await,
        Command::Push { lesson, data, save } => run_push(&ctx, lesson, &data, save).await,
        Command::Status { lesson } => run_status(&ctx, lesson).await,
    }
}

fn context(cli: &Cli) -> Result<CliContext, CliError> {
    let config = SyncConfig::from_lookup(|key| match (key, &cli.base_url) {
        ("BOARD_SYNC_BASE_URL", Some(base_url)) => Some(base_url.clone()),
        _ => std::env::var(key).ok(),
    })?;
    let credentials = SessionCredentials::new();
    if !credentials.set(cli.token.clone().unwrap_or_default()) {
        return Err(CliError::MissingToken);
    }
    Ok(CliContext { config, credentials: Arc::new(credentials), wait: Duration::from_secs(cli.wait_secs) })
}

async fn run_load(ctx: &CliContext, lesson: LessonId) -> Result<(), CliError> {
    let elements = ctx.gateway()?.load(lesson).await?;
    println!("{}", serde_json::to_string_pretty(&elements)?);
    Ok(())
}

async fn run_save(ctx: &CliContext, lesson: LessonId, input: &str) -> Result<(), CliError> {
    let elements = read_elements(input)?;
    ctx.gateway()?.save(lesson, &elements).await?;
    eprintln!("saved lesson {lesson}: {} elements", elements.len());
    Ok(())
}

async fn run_watch(ctx: &CliContext, lesson: LessonId) -> Result<(), CliError> {
    let mut board = ctx.controller(lesson)?;
    let mut events = board.channel_events();
    let mut scene = board.watch_scene();

    if let Err(error) = board.mount().await {
        warn!(%lesson, error = %error, "board: starting from an empty scene");
    }
    print_scene(&scene.borrow_and_update().elements)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.map_err(CliError::Signal)?;
                info!(%lesson, "board: interrupted");
                break;
            }
            changed = scene.changed() => {
                if changed.is_err() {
                    break;
                }
                let elements = scene.borrow_and_update().elements.clone();
                print_scene(&elements)?;
            }
            event = events.recv() => match event {
                Ok(event) => eprintln!("{}", describe(&event)),
                Err(RecvError::Lagged(skipped)) => eprintln!("({skipped} events skipped)"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    board.unmount();
    tokio::time::sleep(FLUSH_GRACE).await;
    Ok(())
}

async fn run_push(ctx: &CliContext, lesson: LessonId, data: &str, save: bool) -> Result<(), CliError> {
    let element = serde_json::from_str::<Value>(data)?;
    let mut board = ctx.controller(lesson)?;
    let mut events = board.channel_events();

    // Appending to an unloaded scene would replace everyone's board with one element.
    if let Err(error) = board.mount().await {
        board.unmount();
        return Err(error.into());
    }
    let outcome = push_live(ctx, &board, &mut events, element, save).await;

    board.unmount();
    tokio::time::sleep(FLUSH_GRACE).await;
    outcome
}

async fn push_live(
    ctx: &CliContext,
    board: &BoardViewController,
    events: &mut broadcast::Receiver<ChannelEvent>,
    element: Element,
    save: bool,
) -> Result<(), CliError> {
    wait_connected(events, ctx.wait).await?;
    let published = board.edit_elements(|elements| elements.push(element));
    if !published {
        warn!(lesson = %board.lesson_id(), "board: update not published");
    }
    if save {
        board.save().await?;
    }
    eprintln!("pushed to lesson {}: {} elements, published={published} saved={save}", board.lesson_id(), board.scene().len());
    Ok(())
}

async fn run_status(ctx: &CliContext, lesson: LessonId) -> Result<(), CliError> {
    let mut board = ctx.controller(lesson)?;
    let mut events = board.channel_events();

    if let Err(error) = board.mount().await {
        warn!(%lesson, error = %error, "board: load failed");
    }
    if let Err(error) = wait_connected(&mut events, ctx.wait).await {
        warn!(%lesson, error = %error, "channel: not connected");
    }
    println!("{}", serde_json::to_string_pretty(&board.connection_status())?);

    board.unmount();
    tokio::time::sleep(FLUSH_GRACE).await;
    Ok(())
}

/// Wait for `Connected`, failing early on a terminal channel error.
async fn wait_connected(events: &mut broadcast::Receiver<ChannelEvent>, limit: Duration) -> Result<(), CliError> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(ChannelEvent::Connected { .. }) => return Ok(()),
                Ok(ChannelEvent::Error(error @ (ChannelError::MissingCredential | ChannelError::ReconnectExhausted { .. }))) => {
                    return Err(CliError::Channel(error));
                }
                Ok(event) => eprintln!("{}", describe(&event)),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(CliError::ChannelClosed),
            }
        }
    };

    tokio::time::timeout(limit, wait).await.map_err(|_| CliError::Timeout)?
}

fn read_elements(input: &str) -> Result<Vec<Element>, CliError> {
    let raw = if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|source| CliError::Input { path: "stdin".to_owned(), source })?;
        buf
    } else {
        fs::read_to_string(input).map_err(|source| CliError::Input { path: input.to_owned(), source })?
    };
    Ok(parse_elements(&raw)?)
}

fn describe(event: &ChannelEvent) -> String {
    match event {
        ChannelEvent::Connecting { lesson_id, attempt: 0 } => format!("connecting to lesson {lesson_id}"),
        ChannelEvent::Connecting { lesson_id, attempt } => format!("reconnecting to lesson {lesson_id} (attempt {attempt})"),
        ChannelEvent::Connected { lesson_id } => format!("connected to lesson {lesson_id}"),
        ChannelEvent::Disconnected { lesson_id } => format!("disconnected from lesson {lesson_id}"),
        ChannelEvent::Error(error) => format!("channel error: {error}"),
    }
}

fn print_scene(elements: &[Element]) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(elements)?);
    Ok(())
}
