use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gamevote::client::{ClientError, VoteClient, VoteOutcome};
use gamevote::config::{ClientConfig, ConfigError, StoreConfig};
use gamevote::error::{ErrorCode, describe};
use gamevote::identity::{self, FileStorage, LocalStorage, StorageError};
use gamevote::store::firebase::FirebaseStore;
use gamevote::store::{RealtimeStore, StoreError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Client(e) => e.error_code(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "gamevote", about = "Suggest and vote for community games on a shared realtime board")]
struct Cli {
    /// Local storage file holding this device's vote [env: GAMEVOTE_STORAGE_PATH]
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Collection path in the realtime database [env: GAMEVOTE_COLLECTION]
    #[arg(long)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board once.
    Board,
    /// Print the board on every change until interrupted.
    Watch,
    /// Suggest a community game.
    Add { name: String },
    /// Vote for an entry by id.
    Vote { id: String },
    /// Write the fixed entries and exit.
    Seed,
    /// Show which entry this device last voted for.
    Whoami,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", describe(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut client_config = ClientConfig::from_env();
    if let Some(path) = cli.storage {
        client_config.storage_path = path;
    }
    if let Some(collection) = cli.collection {
        client_config.collection = collection;
    }

    let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::new(&client_config.storage_path));
    if matches!(cli.command, Command::Whoami) {
        match identity::load_vote(storage.as_ref())?.voted_for() {
            Some(id) => println!("voted for {id}"),
            None => println!("no vote yet"),
        }
        return Ok(());
    }

    let store_config = StoreConfig::from_env()?;
    let store: Arc<dyn RealtimeStore> = Arc::new(FirebaseStore::new(&store_config)?);
    let client = VoteClient::mount(store, storage, &client_config.collection).await?;

    let result = dispatch(&client, cli.command).await;
    client.unmount().await;
    result
}

async fn dispatch(client: &VoteClient, command: Command) -> Result<(), CliError> {
    match command {
        Command::Board => {
            client.until(|_| true).await;
            print!("{}", client.board().await.render());
        }
        Command::Watch => watch(client).await,
        Command::Add { name } => match client.add_game(&name).await? {
            Some(id) => println!("added {id}"),
            None => println!("nothing added: name is blank"),
        },
        Command::Vote { id } => match client.vote(&id).await? {
            VoteOutcome::AlreadyVoted => println!("already voted for {id}"),
            VoteOutcome::Committed { previous, .. } => match previous.voted_for() {
                Some(previous) => println!("vote moved from {previous} to {id}"),
                None => println!("voted for {id}"),
            },
        },
        Command::Seed => println!("fixed entries written"),
        Command::Whoami => {}
    }
    Ok(())
}

async fn watch(client: &VoteClient) {
    client.until(|_| true).await;
    let mut updates = client.updates().await;
    print!("{}", client.board().await.render());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            update = updates.recv() => {
                if update.is_none() {
                    break;
                }
                println!();
                print!("{}", client.board().await.render());
            }
            _ = &mut ctrl_c => break,
        }
    }
}
