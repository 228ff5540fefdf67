use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use planpoker::actions::Dispatcher;
use planpoker::command::{Command, HELP, resolve_task};
use planpoker::config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS};
use planpoker::error::ClientError;
use planpoker::lobby::Lobby;
use planpoker::net::api::{HttpApi, RoomBackend};
use planpoker::notify::{Notice, Notifier};
use planpoker::render::{render_identity, render_notice, render_room};
use planpoker::state::persist::BlobStore;
use planpoker::state::session::{SessionStore, SharedSession, lock};
use planpoker::sync::RoomSync;

#[derive(Parser, Debug)]
#[command(name = "planpoker", about = "Planning poker room client")]
struct Cli {
    #[arg(long, env = "PLANPOKER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Push channel URL; derived from the base URL when omitted.
    #[arg(long, env = "PLANPOKER_WS_URL")]
    ws_url: Option<String>,

    /// Directory for the persisted session.
    #[arg(long, env = "PLANPOKER_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[arg(long, env = "PLANPOKER_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    #[arg(long, env = "PLANPOKER_CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout_secs: u64,

    /// Give up on the push channel after this many failed connects in a row.
    #[arg(long, env = "PLANPOKER_MAX_RECONNECT_ATTEMPTS")]
    max_reconnect_attempts: Option<u32>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Create a room and join it as admin.
    Create {
        room_name: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        spectator: bool,
        /// Save the session without entering the room.
        #[arg(long)]
        detach: bool,
    },
    /// Join an existing room by its code.
    Join {
        room_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        spectator: bool,
        #[arg(long)]
        detach: bool,
    },
    /// Enter the room of the saved session.
    Room,
    /// Print the current room state once.
    Status,
    Whoami,
    /// Forget the saved session.
    Leave,
}

impl Cli {
    fn config(&self) -> Result<ClientConfig, ClientError> {
        let mut config = ClientConfig::new(&self.base_url)?;
        if let Some(ws_url) = &self.ws_url {
            config.ws_url.clone_from(ws_url);
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir.clone_from(dir);
        }
        config.poll_interval = Duration::from_millis(self.poll_interval_ms.max(1));
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        config.reconnect.max_attempts = self.max_reconnect_attempts;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!(error = %e, "failed to load .env");
        }
    }

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let config = cli.config()?;
    let backend: Arc<dyn RoomBackend> = Arc::new(HttpApi::new(&config.base_url, config.connect_timeout)?);
    let session = SessionStore::new(Some(BlobStore::new(&config.state_dir))).into_shared();
    let (notifier, mut notices) = Notifier::channel();
    let lobby = Lobby::new(backend.clone(), session.clone(), notifier.clone());

    match cli.command {
        CliCommand::Create { room_name, name, spectator, detach } => {
            let joined = lobby.create_room(&room_name, &name, spectator).await;
            print_pending(&mut notices);
            let joined = joined?;
            println!("room code: {}", joined.room.id);
            if detach {
                return Ok(());
            }
            run_room(&config, backend, session, notifier, notices).await
        }
        CliCommand::Join { room_id, name, spectator, detach } => {
            let joined = lobby.join_room(&room_id, &name, spectator).await;
            print_pending(&mut notices);
            joined?;
            if detach {
                return Ok(());
            }
            run_room(&config, backend, session, notifier, notices).await
        }
        CliCommand::Room => run_room(&config, backend, session, notifier, notices).await,
        CliCommand::Status => {
            let room_id = lock(&session).identity().ids().map(|(room, _)| room.to_owned());
            let room_id = room_id.ok_or(ClientError::NoSession)?;
            let snapshot = backend.fetch_snapshot(&room_id).await?;
            let mut store = lock(&session);
            store.apply_snapshot(snapshot);
            println!("{}", render_identity(store.identity()));
            println!("{}", render_room(&store));
            Ok(())
        }
        CliCommand::Whoami => {
            println!("{}", render_identity(lock(&session).identity()));
            Ok(())
        }
        CliCommand::Leave => {
            lobby.leave(None).await;
            println!("session cleared");
            Ok(())
        }
    }
}

fn print_pending(notices: &mut UnboundedReceiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        eprintln!("{}", render_notice(&notice));
    }
}

fn redraw(session: &SharedSession) {
    let view = render_room(&lock(session));
    println!("\n{view}\n> ");
}

enum Exit {
    Quit,
    Leave,
}

/// Interactive room view: redraw on every state change, print notices as
/// they arrive, run one command per input line.
async fn run_room(
    config: &ClientConfig,
    backend: Arc<dyn RoomBackend>,
    session: SharedSession,
    notifier: Notifier,
    mut notices: UnboundedReceiver<Notice>,
) -> Result<(), ClientError> {
    let sync = RoomSync::start(config, backend.clone(), session.clone(), notifier.clone())?;
    let dispatcher = Dispatcher::new(backend.clone(), sync.fetcher(), notifier.clone());
    let mut changes = sync.reconciler().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    redraw(&session);
    let exit = loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break Exit::Quit;
                }
                redraw(&session);
            }
            Some(notice) = notices.recv() => println!("{}", render_notice(&notice)),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break Exit::Quit;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break Exit::Quit,
                    Ok(Command::Leave) => break Exit::Leave,
                    Ok(command) => execute(&dispatcher, &session, command).await,
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    };

    match exit {
        Exit::Quit => {
            sync.shutdown().await;
            lock(&session).reset_game();
        }
        Exit::Leave => {
            Lobby::new(backend, session, notifier).leave(Some(sync)).await;
            println!("left room; session cleared");
        }
    }
    Ok(())
}

fn task_id(session: &SharedSession, arg: &str) -> Option<String> {
    let store = lock(session);
    match resolve_task(store.snapshot(), arg) {
        Ok(task) => Some(task.id.clone()),
        Err(e) => {
            eprintln!("{e}");
            None
        }
    }
}

async fn execute(dispatcher: &Dispatcher, session: &SharedSession, command: Command) {
    let result = match command {
        Command::Vote(card) => dispatcher.cast_vote(card).await,
        Command::Reveal => dispatcher.reveal_cards().await,
        Command::Reset => dispatcher.reset_votes().await,
        Command::Activate(arg) => {
            let Some(id) = task_id(session, &arg) else { return };
            dispatcher.set_active_task(&id).await
        }
        Command::Complete { task, score } => {
            let Some(id) = task_id(session, &task) else { return };
            dispatcher.complete_task(&id, score).await
        }
        Command::Cancel(arg) => {
            let Some(id) = task_id(session, &arg) else { return };
            dispatcher.cancel_task(&id).await
        }
        Command::Delete(arg) => {
            let Some(id) = task_id(session, &arg) else { return };
            dispatcher.delete_task(&id).await
        }
        Command::Add { title, description } => dispatcher.add_task(&title, &description).await,
        Command::Refresh => {
            if !dispatcher.refresh().await {
                eprintln!("refresh failed; keeping the last known state");
            }
            Ok(())
        }
        Command::Tasks => {
            redraw(session);
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Leave | Command::Quit => Ok(()),
    };

    // Already shown to the user as a notice.
    if let Err(e) = result {
        tracing::debug!(error = %e, "command failed");
    }
}
