use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use config::{Config, Environment, File};
use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use secretecho::api::{self, AppState};
use secretecho::auth::AuthState;
use secretecho::chat::SqliteChatStore;
use secretecho::companion::CompanionRegistry;
use secretecho::db::Database;
use secretecho::relay::{
    DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_WS_URL, GeminiConfig, GeminiConnector,
};
use secretecho::user::{AuthSessionRepository, UserRepository, UserService};

const APP_NAME: &str = "secretecho";

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("resolved paths: {:#?}", ctx.paths);

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "SecretEcho - companion chat backend server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP and WebSocket server
    Serve(ServeCommand),
    /// Create config directories and a default config file
    Init(InitCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct Settings {
    server: ServerSettings,
    database: DatabaseSettings,
    auth: AuthSettings,
    gemini: GeminiSettings,
    companions: CompanionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerSettings {
    host: String,
    port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct DatabaseSettings {
    /// Database file path; defaults to `<data dir>/secretecho.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct AuthSettings {
    /// HS256 signing secret; required to serve.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt_secret: Option<String>,
    /// Lifetime of issued auth sessions.
    session_ttl_hours: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            session_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct GeminiSettings {
    /// API key for the Gemini Live API; required to serve.
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    ws_url: String,
    model: String,
    connect_timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            ws_url: DEFAULT_GEMINI_WS_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            connect_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct CompanionSettings {
    /// Directory of `<code>/companion.toml` profiles layered over the
    /// built-in companions.
    #[serde(skip_serializing_if = "Option::is_none")]
    dir: Option<PathBuf>,
}

// ============================================================================
// Runtime context
// ============================================================================

#[derive(Debug, Clone)]
struct Paths {
    config_file: PathBuf,
    data_dir: PathBuf,
}

struct RuntimeContext {
    common: CommonOpts,
    paths: Paths,
    settings: Settings,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = match &common.config {
            Some(path) => path.clone(),
            None => dirs::config_dir()
                .ok_or_else(|| anyhow!("cannot determine config directory"))?
                .join(APP_NAME)
                .join("config.toml"),
        };
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("cannot determine data directory"))?
            .join(APP_NAME);

        let built = Config::builder()
            .add_source(File::from(config_file.as_path()).required(false))
            .add_source(Environment::with_prefix("SECRETECHO").separator("__"))
            .build()
            .context("loading configuration")?;
        let settings: Settings = built
            .try_deserialize()
            .context("deserializing configuration")?;

        Ok(Self {
            common,
            paths: Paths {
                config_file,
                data_dir,
            },
            settings,
        })
    }

    fn log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug || self.common.verbose >= 2 {
            LevelFilter::Debug
        } else if self.common.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Info
        }
    }

    fn init_logging(&self) {
        let level = self.log_level();
        env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .init();

        let directive = match level {
            LevelFilter::Trace => "trace",
            LevelFilter::Debug => "debug",
            LevelFilter::Error => "error",
            _ => "info",
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive)),
            )
            .try_init();
    }
}

// ============================================================================
// Command handlers
// ============================================================================

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let settings = &ctx.settings;

    let jwt_secret = settings
        .auth
        .jwt_secret
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| anyhow!("auth.jwt_secret is required (config file or SECRETECHO__AUTH__JWT_SECRET)"))?;
    let api_key = settings
        .gemini
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("gemini.api_key is required (config file or SECRETECHO__GEMINI__API_KEY)"))?;

    let db_path = settings
        .database
        .path
        .clone()
        .unwrap_or_else(|| ctx.paths.data_dir.join("secretecho.db"));
    info!("using database at {}", db_path.display());
    let database = Database::new(&db_path).await?;

    let auth = AuthState::new(jwt_secret, settings.auth.session_ttl_hours);
    let users = UserService::new(
        UserRepository::new(database.pool().clone()),
        AuthSessionRepository::new(database.pool().clone()),
        auth.clone(),
    );
    let chat = Arc::new(SqliteChatStore::new(database.pool().clone()));

    let companions = match &settings.companions.dir {
        Some(dir) => CompanionRegistry::with_overrides(dir)?,
        None => CompanionRegistry::builtin(),
    };
    info!("loaded {} companion profiles", companions.list().len());

    let connector = GeminiConnector::new(GeminiConfig {
        ws_url: settings.gemini.ws_url.clone(),
        api_key: api_key.to_string(),
        model: settings.gemini.model.clone(),
        connect_timeout: std::time::Duration::from_secs(settings.gemini.connect_timeout_secs),
    });

    let state = AppState::new(
        users,
        chat,
        Arc::new(companions),
        Arc::new(connector),
        auth,
    );
    let router = api::create_router(state);

    let host = cmd.host.unwrap_or_else(|| settings.server.host.clone());
    let port = cmd.port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", host, port))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, router).await.context("server error")
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }

    write_default_config(&ctx.paths.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!(
                "{}",
                toml::to_string_pretty(&ctx.settings).context("serializing config")?
            );
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn write_default_config(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let contents =
        toml::to_string_pretty(&Settings::default()).context("serializing default config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    println!("wrote default config to {}", path.display());
    Ok(())
}
