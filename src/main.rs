use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use farmgate::cache::QueryCache;
use farmgate::config::{ClientConfig, ConfigError, Routes, normalize_base_url};
use farmgate::guard::{Guard, MemoryNavigator, Navigator, route_path};
use farmgate::net::api::ApiClient;
use farmgate::net::types::{ApiError, Credentials};
use farmgate::player::PlayerService;
use farmgate::session::{FailureReason, SessionManager};
use farmgate::signal::{self, SignalReceiver};
use farmgate::storage::{CredentialStore, FileStore};
use farmgate::view::{render_outcome, render_status, render_user};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("api request failed: {0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Session(FailureReason),
    #[error("not signed in")]
    NotSignedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "farmgate", about = "Farm game session client")]
struct Cli {
    /// Overrides `FARMGATE_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides `FARMGATE_STORAGE_PATH`.
    #[arg(long)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the stored credential and print the session.
    Status,
    /// Sign in and store the credential.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FARMGATE_PASSWORD")]
        password: String,
    },
    /// Create an account, then sign in with it.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FARMGATE_PASSWORD")]
        password: String,
    },
    /// Forget the stored credential and cached user.
    Logout,
    /// Open a protected screen and print what the guard decides.
    Open {
        /// Defaults to the home route.
        path: Option<String>,
    },
    /// Load the signed-in player's data, creating defaults where missing.
    Player,
}

struct App {
    session: Arc<SessionManager>,
    api: Arc<ApiClient>,
    navigator: Arc<MemoryNavigator>,
    signals: SignalReceiver,
}

impl App {
    fn build(config: &ClientConfig, start: &str) -> Result<Self, CliError> {
        let file = FileStore::new(&config.storage_path);
        tracing::debug!(path = %file.path().display(), "credential store");
        let store: Arc<dyn CredentialStore> = Arc::new(file);
        let (tx, signals) = signal::channel();
        let api = Arc::new(ApiClient::new(config, Arc::clone(&store))?.with_signals(tx));
        let cache = Arc::new(QueryCache::new());
        let session = Arc::new(SessionManager::new(api.clone(), store, cache, config.routes.clone()));
        let navigator = Arc::new(MemoryNavigator::new(start));
        Ok(Self { session, api, navigator, signals })
    }

    /// Apply any invalidation the API layer queued during the command.
    fn drain_signals(&mut self) {
        while let Some(invalidation) = self.signals.try_recv() {
            if let Some(redirect) = self.session.handle_signal(invalidation, &self.navigator.current_path()) {
                self.navigator.push(&redirect);
                println!("Redirecting to {redirect}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = normalize_base_url(&base_url)?;
    }
    if let Some(storage) = cli.storage {
        config.storage_path = storage;
    }

    let start = start_route(&cli.command, &config.routes);
    let mut app = App::build(&config, &start)?;

    let result = match cli.command {
        Command::Status => run_status(&app).await,
        Command::Login { email, password } => run_login(&app, &Credentials::new(email, password), false).await,
        Command::Register { email, password } => run_login(&app, &Credentials::new(email, password), true).await,
        Command::Logout => {
            app.session.logout();
            println!("{}", render_status(&app.session.state()));
            Ok(())
        }
        Command::Open { .. } => run_open(&app).await,
        Command::Player => run_player(&app).await,
    };

    app.drain_signals();
    result
}

/// Where the in-process router starts: the opened path, else home.
fn start_route(command: &Command, routes: &Routes) -> String {
    match command {
        Command::Open { path: Some(path) } => path.clone(),
        _ => routes.home.clone(),
    }
}

async fn run_status(app: &App) -> Result<(), CliError> {
    let state = app.session.mount().await;
    println!("{}", render_status(&state));
    Ok(())
}

async fn run_login(app: &App, credentials: &Credentials, register: bool) -> Result<(), CliError> {
    let outcome = if register {
        app.session.register(credentials).await
    } else {
        app.session.login(credentials).await
    };
    let user = outcome.map_err(CliError::Session)?;
    println!("{}", render_user(&user));
    Ok(())
}

async fn run_open(app: &App) -> Result<(), CliError> {
    let guard = Guard::new(Arc::clone(&app.session), app.navigator.clone());
    let _ = app.session.mount().await;

    let location = app.navigator.current_path();
    let outcome = if route_path(&location) == app.session.routes().home {
        guard.evaluate_player(|user, player_id| format!("{}\nEntering farm as player {player_id}", render_user(user)))
    } else {
        guard.evaluate(render_user)
    };

    println!("{}", render_outcome(&outcome));
    if let Some(failure) = app.session.state().failure {
        println!("{failure}");
    }
    Ok(())
}

async fn run_player(app: &App) -> Result<(), CliError> {
    let state = app.session.mount().await;
    let user = state.user().ok_or(CliError::NotSignedIn)?;
    let players = PlayerService::new(Arc::clone(&app.api), Arc::clone(app.session.cache()));
    let data = players.load_player_data(user.id).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
