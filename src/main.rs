use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use langboost::auth::{Authenticator, StoreAuthenticator};
use langboost::config::{ConfigFile, ServerConfig};
use langboost::server::{AppState, create_router};
use langboost::store::{SqliteStore, Store};
use langboost::types::User;

#[derive(Parser)]
#[command(name = "langboost")]
#[command(about = "A localization backend with branch-scoped translation keys", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory holding the database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// TOML file with host, port, data_dir and page_size
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create the database
    Init {
        /// Data directory holding the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Create a user and print an API token for it
    CreateUser {
        /// Data directory holding the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Display name
        #[arg(long)]
        name: String,

        /// Unique login name, defaults to the display name
        #[arg(long)]
        username: Option<String>,
    },
}

fn db_path(data_dir: PathBuf) -> PathBuf {
    ServerConfig {
        data_dir,
        ..Default::default()
    }
    .db_path()
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    fs::create_dir_all(&data_dir)?;

    let db_path = db_path(data_dir);
    if db_path.exists() {
        bail!("Server already initialized. Database exists at: {}", db_path.display());
    }

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    println!("Initialized database at {}", db_path.display());
    Ok(())
}

fn run_create_user(data_dir: PathBuf, name: String, username: Option<String>) -> anyhow::Result<()> {
    let db_path = db_path(data_dir);
    if !db_path.exists() {
        bail!("Server not initialized. Run 'langboost admin init' first to create the database.");
    }

    let username = username.unwrap_or_else(|| name.clone());
    if username.trim().is_empty() || username.contains(char::is_whitespace) {
        bail!("Username cannot be empty or contain whitespace");
    }

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&db_path)?);
    store.initialize()?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        name,
        username,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user)?;

    let raw_token = StoreAuthenticator::new(store).issue_token(&user.id)?;

    println!();
    println!("========================================");
    println!("Created user '{}' ({}) with token:", user.username, user.id);
    println!();
    println!("  {raw_token}");
    println!();
    println!("Save this token, it won't be shown again.");
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let db_path = config.db_path();
    if !db_path.exists() {
        bail!("Server not initialized. Run 'langboost admin init' first to create the database.");
    }

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&db_path)?);
    store.initialize()?;

    let authenticator = Arc::new(StoreAuthenticator::new(store.clone()));
    let state = Arc::new(AppState::new(store, authenticator).with_page_size(config.page_size));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("langboost=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(data_dir)?,
            AdminCommands::CreateUser {
                data_dir,
                name,
                username,
            } => run_create_user(data_dir, name, username)?,
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            config,
        } => {
            let mut server_config = ServerConfig::default();
            if let Some(path) = config {
                server_config = server_config.merge(ConfigFile::load(&path)?);
            }
            // flags win over the file
            server_config = server_config.merge(ConfigFile {
                host,
                port,
                data_dir,
                page_size: None,
            });

            run_serve(server_config).await?;
        }
    }

    Ok(())
}
