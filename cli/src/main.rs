use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aluga::app::{AppError, LoginError};
use aluga::config::{ConfigError, normalize_api_url};
use aluga::net::resources::Resource;
use aluga::net::types::ApiError;
use aluga::{App, ClientConfig, GuardView, Navigator};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const LOGOUT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("missing argument `{0}` for this action")]
    MissingArg(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "aluga-cli", about = "Aluga Aí session and API CLI")]
struct Cli {
    #[arg(long, env = "ALUGA_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "ALUGA_SESSION_COOKIE")]
    session_cookie: Option<String>,

    #[arg(long, env = "ALUGA_STORE_PATH")]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bootstrap the session and print the signed-in profile.
    Whoami,
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "ALUGA_PASSWORD")]
        password: String,
    },
    Logout,
    Api(ApiCommand),
}

#[derive(Args, Debug)]
struct ApiCommand {
    #[command(subcommand)]
    command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
enum ApiSubcommand {
    /// Full record of the signed-in user.
    Me,
    #[command(flatten)]
    Crud(CrudCommand),
}

#[derive(Subcommand, Debug)]
enum CrudCommand {
    Users(CrudArgs),
    Hotels(CrudArgs),
    Reviews(CrudArgs),
    Bookings(CrudArgs),
}

impl CrudCommand {
    fn split(self) -> (Resource, CrudArgs) {
        match self {
            Self::Users(args) => (Resource::Users, args),
            Self::Hotels(args) => (Resource::Hotels, args),
            Self::Reviews(args) => (Resource::Reviews, args),
            Self::Bookings(args) => (Resource::Bookings, args),
        }
    }
}

#[derive(Args, Debug)]
struct CrudArgs {
    action: CrudAction,
    id: Option<String>,
    #[arg(long)]
    data: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CrudAction {
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// Terminal "navigation": tell the user where the app would send them.
struct StderrNavigator;

impl Navigator for StderrNavigator {
    fn navigate(&self, route: &str) {
        eprintln!("redirect -> {route}");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(cli.api_url, cli.session_cookie, cli.store_path)?;
    let app = App::new(config, Arc::new(StderrNavigator))?;

    match cli.command {
        Command::Whoami => run_whoami(&app).await,
        Command::Login { username, password } => {
            let profile = app.login(&username, &password).await?;
            print_json(&serde_json::to_value(profile)?)
        }
        Command::Logout => run_logout(&app).await,
        Command::Api(api) => run_api(&app, api).await,
    }
}

fn build_config(
    api_url: Option<String>,
    session_cookie: Option<String>,
    store_path: Option<PathBuf>,
) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = api_url {
        config.api_url = normalize_api_url(&api_url)?;
    }
    if session_cookie.is_some() {
        config.session_cookie = session_cookie;
    }
    if store_path.is_some() {
        config.store_path = store_path;
    }
    Ok(config)
}

async fn run_whoami(app: &App) -> Result<(), CliError> {
    match app.guard().resolve().await {
        GuardView::Protected(profile) => {
            if profile.is_admin() {
                tracing::debug!("admin entries visible");
            }
            print_json(&serde_json::to_value(profile)?)
        }
        GuardView::Loading | GuardView::Nothing => Err(CliError::NotAuthenticated),
    }
}

async fn run_logout(app: &App) -> Result<(), CliError> {
    if let Some(remote) = app.logout() {
        if tokio::time::timeout(LOGOUT_GRACE, remote).await.is_err() {
            tracing::warn!("remote logout still pending at exit");
        }
    }
    println!("logged out");
    Ok(())
}

async fn run_api(app: &App, api: ApiCommand) -> Result<(), CliError> {
    let json = match api.command {
        ApiSubcommand::Me => app.api().current_user().await?,
        ApiSubcommand::Crud(crud) => {
            let (resource, args) = crud.split();
            let client = app.api().resource(resource);
            match args.action {
                CrudAction::List => client.list().await?,
                CrudAction::Get => client.get(require_id(args.id.as_deref())?).await?,
                CrudAction::Create => client.create(&parse_data(args.data.as_deref())?).await?,
                CrudAction::Update => {
                    let id = require_id(args.id.as_deref())?;
                    client.update(id, &parse_data(args.data.as_deref())?).await?
                }
                CrudAction::Delete => client.delete(require_id(args.id.as_deref())?).await?,
            }
        }
    };
    print_json(&json)
}

fn require_id(id: Option<&str>) -> Result<&str, CliError> {
    id.ok_or(CliError::MissingArg("id"))
}

fn parse_data(data: Option<&str>) -> Result<Value, CliError> {
    let data = data.ok_or(CliError::MissingArg("--data"))?;
    Ok(serde_json::from_str(data)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crud_command() {
        let cli = Cli::try_parse_from(["aluga-cli", "api", "hotels", "update", "h1", "--data", "{\"name\":\"Mar\"}"]).unwrap();
        let Command::Api(ApiCommand { command: ApiSubcommand::Crud(crud) }) = cli.command else {
            panic!("expected api crud command");
        };
        let (resource, args) = crud.split();
        assert_eq!(resource, Resource::Hotels);
        assert!(matches!(args.action, CrudAction::Update));
        assert_eq!(args.id.as_deref(), Some("h1"));
    }

    #[test]
    fn parses_me_command() {
        let cli = Cli::try_parse_from(["aluga-cli", "api", "me"]).unwrap();
        assert!(matches!(cli.command, Command::Api(ApiCommand { command: ApiSubcommand::Me })));
    }

    #[test]
    fn missing_id_and_data_are_reported() {
        assert!(matches!(require_id(None), Err(CliError::MissingArg("id"))));
        assert!(matches!(parse_data(None), Err(CliError::MissingArg("--data"))));
        assert!(matches!(parse_data(Some("{")), Err(CliError::InvalidJson(_))));
        assert_eq!(parse_data(Some("{\"a\":1}")).unwrap()["a"], 1);
    }

    #[test]
    fn flag_overrides_api_url() {
        let config = build_config(Some("http://example.test/".into()), Some("session=1".into()), None).unwrap();
        assert_eq!(config.api_url, "http://example.test");
        assert_eq!(config.session_cookie.as_deref(), Some("session=1"));
    }
}
