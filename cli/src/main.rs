use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use lmsfront::config::Timeouts;
use lmsfront::types::{Gender, ProfilePatch, Registration};
use lmsfront::{
    ApiClient, ApiError, ClientConfig, FileCredentialStore, NoticeLevel, SessionController, SessionPhase, TokenScheme,
};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] lmsfront::error::ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("not signed in; run `lms login` first")]
    NotSignedIn,
    #[error("refusing to delete the account without --yes")]
    NotConfirmed,
    #[error("nothing to update; pass at least one field")]
    EmptyPatch,
    #[error("could not read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "lms", about = "LMS account and session CLI")]
struct Cli {
    #[arg(long, env = "LMS_API_BASE_URL", default_value = lmsfront::config::DEFAULT_API_BASE_URL)]
    base_url: String,

    #[arg(long, env = "LMS_TOKEN_SCHEME", default_value = "pair")]
    token_scheme: TokenScheme,

    #[arg(long, env = "LMS_CREDENTIALS_PATH", default_value = ".lms-credentials.json")]
    credentials: PathBuf,

    #[arg(long, env = "LMS_REQUEST_TIMEOUT_SECS", default_value_t = lmsfront::config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    #[arg(long, env = "LMS_CONNECT_TIMEOUT_SECS", default_value_t = lmsfront::config::DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the tokens.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "LMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the signed-in user.
    Whoami,
    /// Sign out locally and on the server.
    Logout,
    /// Create a new account.
    Register(RegisterArgs),
    /// Check whether an email is already registered.
    CheckEmail { email: String },
    /// Partially update the signed-in user's profile.
    Update(ProfileArgs),
    /// Upload a new avatar image.
    Avatar { path: PathBuf },
    /// Permanently delete the signed-in account.
    DeleteAccount {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    Users(UsersCommand),
    /// List the public course catalog.
    Courses,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "LMS_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long, default_value = "")]
    patronymic: String,
    #[arg(long, default_value = "")]
    phone_number: String,
    #[arg(long, default_value = "")]
    telegram: String,
    #[arg(long, default_value = "", help = "YYYY-MM-DD")]
    date_birth: String,
    #[arg(long, value_parser = parse_gender)]
    gender: Option<Gender>,
    #[arg(long)]
    avatar: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    patronymic: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone_number: Option<String>,
    #[arg(long)]
    telegram: Option<String>,
    #[arg(long, value_parser = parse_gender)]
    gender: Option<Gender>,
    #[arg(long, help = "YYYY-MM-DD")]
    date_birth: Option<String>,
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    List,
    Get { id: i64 },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.base_url)?
        .with_token_scheme(cli.token_scheme)
        .with_timeouts(Timeouts { request_secs: cli.request_timeout, connect_secs: cli.connect_timeout });
    let api = ApiClient::from_config(&config)?;
    let store = Arc::new(FileCredentialStore::new(config.token_scheme, &cli.credentials));
    let session = SessionController::new(api, store);

    let mut notices = session.notices();
    let result = run(&session, cli.command).await;
    let shown = print_notices(&mut notices);
    if let Err(CliError::Api(e)) = &result {
        if shown == 0 {
            eprintln!("[error] {}", lmsfront::Notice::from(e).message);
        }
    }
    result
}

async fn run(session: &SessionController, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            print_json(&user_json(session, &user)?)
        }
        Command::Whoami => {
            let user = signed_in(session).await?;
            print_json(&user_json(session, &user)?)
        }
        Command::Logout => {
            session.logout().await;
            Ok(())
        }
        Command::Register(args) => {
            let created = session.api().register(registration(args)?).await?;
            print_json(&created)
        }
        Command::CheckEmail { email } => {
            let exists = session.api().check_email(&email).await?;
            print_json(&json!({ "email": email, "exists": exists }))
        }
        Command::Update(args) => {
            let patch = profile_patch(args);
            if patch.is_empty() {
                return Err(CliError::EmptyPatch);
            }
            signed_in(session).await?;
            let user = session.update_profile(&patch).await?;
            print_json(&user_json(session, &user)?)
        }
        Command::Avatar { path } => {
            let file = read_upload(&path)?;
            signed_in(session).await?;
            let user = session.upload_avatar(file).await?;
            print_json(&user_json(session, &user)?)
        }
        Command::DeleteAccount { yes } => {
            if !yes {
                return Err(CliError::NotConfirmed);
            }
            signed_in(session).await?;
            session.delete_account().await?;
            Ok(())
        }
        Command::Users(users) => run_users(session, users).await,
        Command::Courses => {
            let courses = session.api().courses().await?;
            print_json(&serde_json::to_value(courses)?)
        }
    }
}

async fn run_users(session: &SessionController, users: UsersCommand) -> Result<(), CliError> {
    signed_in(session).await?;
    let token = session.token();
    let outcome = match users.command {
        UsersSubcommand::List => session.api().list_users(token.as_deref()).await.map(serde_json::to_value),
        UsersSubcommand::Get { id } => session.api().get_user(token.as_deref(), id).await.map(serde_json::to_value),
    };
    match outcome {
        Ok(value) => print_json(&value?),
        Err(e) => {
            session.handle_error(&e);
            Err(e.into())
        }
    }
}

/// Resolve the stored session, failing unless a user is loaded.
async fn signed_in(session: &SessionController) -> Result<lmsfront::UserProfile, CliError> {
    let ready = session.ready().await;
    match (ready.phase(), ready.user) {
        (SessionPhase::Authenticated, Some(user)) => Ok(user),
        _ => Err(CliError::NotSignedIn),
    }
}

fn user_json(session: &SessionController, user: &lmsfront::UserProfile) -> Result<Value, CliError> {
    let mut value = serde_json::to_value(user)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("full_name".to_owned(), Value::String(user.full_name()));
        let avatar_url = session.api().endpoints().avatar_url(user.avatar.as_deref());
        map.insert("avatar_url".to_owned(), avatar_url.map_or(Value::Null, Value::String));
    }
    Ok(value)
}

fn registration(args: RegisterArgs) -> Result<Registration, CliError> {
    let avatar = match &args.avatar {
        Some(path) => Some(read_upload(path)?),
        None => None,
    };
    Ok(Registration {
        email: args.email,
        password: args.password,
        first_name: args.first_name,
        last_name: args.last_name,
        patronymic: args.patronymic,
        date_birth: args.date_birth,
        phone_number: args.phone_number,
        telegram: args.telegram,
        gender: args.gender,
        role: None,
        avatar,
    })
}

fn profile_patch(args: ProfileArgs) -> ProfilePatch {
    ProfilePatch {
        first_name: args.first_name,
        last_name: args.last_name,
        patronymic: args.patronymic,
        email: args.email,
        phone_number: args.phone_number,
        telegram: args.telegram,
        gender: args.gender,
        date_birth: args.date_birth,
    }
}

fn read_upload(path: &std::path::Path) -> Result<lmsfront::types::FileUpload, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadFile { path: path.to_owned(), source })?;
    let file_name = path.file_name().map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());
    Ok(lmsfront::types::FileUpload::new(file_name, bytes))
}

fn parse_gender(raw: &str) -> Result<Gender, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "m" | "male" => Ok(Gender::Male),
        "f" | "female" => Ok(Gender::Female),
        other => Err(format!("unknown gender `{other}`; expected m or f")),
    }
}

/// Drain queued notices to stderr, returning how many were shown.
fn print_notices(notices: &mut broadcast::Receiver<lmsfront::Notice>) -> usize {
    let mut shown = 0;
    while let Ok(notice) = notices.try_recv() {
        shown += 1;
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{tag}] {}", notice.message);
    }
    shown
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
