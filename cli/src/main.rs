use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use client::bridge::{Intent, SyncBridge};
use client::config::{ClientConfig, ConfigError};
use client::net::api::{ApiClient, ApiError};
use client::net::image::{self, ImageError};
use client::net::transport::TransportSession;
use client::net::types::{Message, User};
use client::observe::{SendRejection, SyncEvent, SyncObserver, TracingObserver};
use client::state::auth::{AuthError, AuthService, TokenStore};
use client::state::presence::PresenceTracker;
use client::util::day_groups::{clock_time, group_by_day};
use time::{OffsetDateTime, UtcOffset};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

const DEFAULT_LOG_FILTER: &str = "client=info,chat=info";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not logged in; run `chat login <email>` first")]
    NotLoggedIn,
    #[error("message needs --text or --image")]
    EmptyMessage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chat", about = "Direct-message chat client")]
struct Cli {
    #[arg(long, env = "CHAT_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "CHAT_SOCKET_URL")]
    socket_url: Option<String>,

    #[arg(long, env = "CHAT_TOKEN_PATH")]
    token_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session token.
    Login { email: String },
    /// Create an account (log in afterwards).
    Signup {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        email: String,
    },
    /// Forget the stored token.
    Logout,
    /// Show the logged-in profile.
    Me,
    /// List everyone you can message.
    Users,
    /// Print the conversation with a user, grouped by day.
    History { user_id: String },
    /// Send one message over REST.
    Send {
        user_id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, help = "Path to a PNG, JPEG, GIF or WebP attachment")]
        image: Option<PathBuf>,
    },
    /// Open a live conversation. Type to send; `/quit` to leave, `/reload` to refetch history.
    Chat { user_id: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url.trim_end_matches('/').to_owned();
    }
    if let Some(socket_url) = cli.socket_url {
        config.transport.socket_url = socket_url.trim_end_matches('/').to_owned();
    }
    if let Some(token_path) = cli.token_path {
        config.token_path = token_path;
    }

    let api = ApiClient::new(&config.api_url, config.request_timeout)?;
    let mut auth = AuthService::new(api, TokenStore::new(&config.token_path));
    auth.restore().await?;

    match cli.command {
        Command::Login { email } => {
            let user = auth.login(&email).await?;
            println!("logged in as {} ({})", user.display_name(), user.id);
            Ok(())
        }
        Command::Signup { first_name, last_name, email } => {
            let user = auth.signup(&first_name, &last_name, &email).await?;
            println!("account created for {}; now run `chat login {}`", user.display_name(), user.email);
            Ok(())
        }
        Command::Logout => {
            let (mut session, _events) = TransportSession::new(config.transport.clone());
            auth.logout(&mut session).await?;
            println!("logged out");
            Ok(())
        }
        Command::Me => {
            let user = auth.refresh_profile().await?;
            print_json(&serde_json::to_value(&user)?)
        }
        Command::Users => run_users(&auth).await,
        Command::History { user_id } => run_history(&auth, &user_id).await,
        Command::Send { user_id, text, image } => run_send(&auth, &user_id, text, image).await,
        Command::Chat { user_id } => run_chat(&mut auth, &config, &user_id).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn token(auth: &AuthService<ApiClient>) -> Result<&str, CliError> {
    auth.state().token.as_deref().ok_or(CliError::NotLoggedIn)
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

async fn run_users(auth: &AuthService<ApiClient>) -> Result<(), CliError> {
    let users = auth.api().users(token(auth)?).await?;
    for user in &users {
        println!("{}  {}  {}", user.id, user.display_name(), user.email);
    }
    Ok(())
}

async fn run_history(auth: &AuthService<ApiClient>, user_id: &str) -> Result<(), CliError> {
    let mut lines = stdin_lines();
    let messages = fetch_history(auth.api(), token(auth)?, user_id, &mut lines).await?;
    let names = HashMap::new();
    let now = local_now();
    for group in group_by_day(&messages, now) {
        println!("-- {} --", group.label);
        for message in group.messages {
            println!("{}", render_line(&names, message, now.offset(), false));
        }
    }
    Ok(())
}

async fn run_send(
    auth: &AuthService<ApiClient>,
    user_id: &str,
    text: Option<String>,
    image: Option<PathBuf>,
) -> Result<(), CliError> {
    let text = text.filter(|t| !t.trim().is_empty());
    let image = match image {
        Some(path) => Some(image::encode_data_uri(&path).await?),
        None => None,
    };
    if text.is_none() && image.is_none() {
        return Err(CliError::EmptyMessage);
    }

    let message = auth.api().send_message(token(auth)?, user_id, text.as_deref(), image.as_deref()).await?;
    print_json(&serde_json::to_value(&message)?)
}

type StdinLines = Lines<BufReader<Stdin>>;

fn stdin_lines() -> StdinLines {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Fetch a conversation, asking whether to try again after each failure.
/// Declining returns the last error.
async fn fetch_history(
    api: &ApiClient,
    bearer: &str,
    partner: &str,
    lines: &mut StdinLines,
) -> Result<Vec<Message>, CliError> {
    loop {
        match api.history(bearer, partner).await {
            Ok(messages) => return Ok(messages),
            Err(e) => {
                eprintln!("! history failed: {e}");
                eprint!("retry? [Y/n] ");
                let answer = lines.next_line().await?.unwrap_or_else(|| "n".to_owned());
                if !wants_retry(&answer) {
                    return Err(e.into());
                }
            }
        }
    }
}

fn wants_retry(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes")
}

// =============================================================================
// INTERACTIVE CHAT
// =============================================================================

async fn run_chat(auth: &mut AuthService<ApiClient>, config: &ClientConfig, partner: &str) -> Result<(), CliError> {
    let me = auth.refresh_profile().await?;
    let bearer = token(auth)?.to_owned();
    let users = auth.api().users(&bearer).await?;
    let mut lines = stdin_lines();
    let history = fetch_history(auth.api(), &bearer, partner, &mut lines).await?;

    let names = display_names(&me, &users);
    let partner_name = names.get(partner).cloned().unwrap_or_else(|| partner.to_owned());
    let offset = local_now().offset();
    let observer = Arc::new(ConsoleObserver { partner: partner.to_owned(), names, offset });

    let (mut session, events) = TransportSession::new(config.transport.clone());
    session.open(&bearer).await;

    let presence = PresenceTracker::new(config.typing_timeout);
    let mut bridge = SyncBridge::new(session, me.id.clone(), presence, observer.clone());
    bridge.set_users(users);
    bridge.load_history(partner, history);
    bridge.select_conversation(partner);

    println!("chatting with {partner_name}; /quit to leave, /image <path> to attach, /reload to refetch history");
    let now = local_now();
    for group in bridge.grouped(partner, now) {
        println!("-- {} --", group.label);
        for message in group.messages {
            println!("{}", render_line(&observer.names, message, offset, false));
        }
    }

    let (intents_tx, intents) = mpsc::unbounded_channel();
    let reload = Reload { api: auth.api().clone(), bearer: bearer.clone() };
    let input = tokio::spawn(read_input(lines, partner.to_owned(), reload, intents_tx));
    bridge.run(events, intents).await;
    input.abort();

    bridge.realtime_mut().close().await;
    Ok(())
}

/// What `/reload` needs to refetch the open conversation.
struct Reload {
    api: ApiClient,
    bearer: String,
}

/// Feed stdin lines to the bridge until EOF or `/quit`.
async fn read_input(mut lines: StdinLines, partner: String, reload: Reload, intents: mpsc::UnboundedSender<Intent>) {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "chat: stdin read failed");
                break;
            }
        };

        let batch = match parse_input(&line) {
            Input::Quit => break,
            Input::Blank => continue,
            Input::Text(text) => send_intents(&partner, Some(text), None),
            Input::Image(path) => match image::encode_data_uri(&path).await {
                Ok(uri) => send_intents(&partner, None, Some(uri)),
                Err(e) => {
                    eprintln!("! {e}");
                    continue;
                }
            },
            Input::Typing => vec![Intent::StartTyping { receiver_id: partner.clone() }],
            Input::StopTyping => vec![Intent::StopTyping { receiver_id: partner.clone() }],
            Input::Reload => match reload.api.history(&reload.bearer, &partner).await {
                Ok(messages) => {
                    println!("* reloaded {} messages", messages.len());
                    vec![Intent::LoadHistory { key: partner.clone(), messages }]
                }
                Err(e) => {
                    eprintln!("! history failed: {e}; /reload to retry");
                    continue;
                }
            },
        };
        for intent in batch {
            if intents.send(intent).is_err() {
                return;
            }
        }
    }
    let _ = intents.send(Intent::Shutdown);
}

/// A send always ends the typing indicator it may have started.
fn send_intents(partner: &str, text: Option<String>, image: Option<String>) -> Vec<Intent> {
    vec![
        Intent::Send { receiver_id: partner.to_owned(), text, image },
        Intent::StopTyping { receiver_id: partner.to_owned() },
    ]
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Blank,
    Text(String),
    Image(PathBuf),
    Typing,
    StopTyping,
    Reload,
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Blank;
    }
    match trimmed.split_once(' ').map_or((trimmed, ""), |(cmd, rest)| (cmd, rest.trim())) {
        ("/quit" | "/exit", _) => Input::Quit,
        ("/typing", _) => Input::Typing,
        ("/stop", _) => Input::StopTyping,
        ("/reload", _) => Input::Reload,
        ("/image", path) if !path.is_empty() => Input::Image(PathBuf::from(path)),
        _ => Input::Text(line.to_owned()),
    }
}

fn display_names(me: &User, users: &[User]) -> HashMap<String, String> {
    let mut names: HashMap<String, String> = users.iter().map(|u| (u.id.clone(), u.display_name())).collect();
    names.insert(me.id.clone(), "you".to_owned());
    names
}

fn render_line(
    names: &HashMap<String, String>,
    message: &client::net::types::Message,
    offset: UtcOffset,
    pending: bool,
) -> String {
    let who = names.get(&message.sender_id).map_or(message.sender_id.as_str(), String::as_str);
    let body = match (&message.text, &message.image) {
        (Some(text), Some(_)) => format!("{text} [image]"),
        (Some(text), None) => text.clone(),
        (None, Some(_)) => "[image]".to_owned(),
        (None, None) => String::new(),
    };
    let marker = if pending { " (sending)" } else { "" };
    format!("[{}] {who}: {body}{marker}", clock_time(message.created_at, offset))
}

/// Prints conversation activity for the open chat and logs everything.
struct ConsoleObserver {
    partner: String,
    names: HashMap<String, String>,
    offset: UtcOffset,
}

impl SyncObserver for ConsoleObserver {
    fn on_event(&self, event: &SyncEvent) {
        TracingObserver.on_event(event);

        match event {
            SyncEvent::Connected => println!("* connected"),
            SyncEvent::Disconnected { reason } => println!("* disconnected ({reason})"),
            SyncEvent::ConnectionFailed { reason } => println!("* connection failed ({reason})"),
            SyncEvent::MessageStored { key, message, optimistic } if *key == self.partner => {
                println!("{}", render_line(&self.names, message, self.offset, *optimistic));
            }
            SyncEvent::MessageStored { key, .. } => {
                let who = self.names.get(key).map_or(key.as_str(), String::as_str);
                println!("* new message from {who}");
            }
            SyncEvent::SendRejected { reason: SendRejection::NotConnected, .. } => {
                println!("* not connected, message not sent");
            }
            SyncEvent::TypingStarted { user_id, display_name } if *user_id == self.partner => {
                println!("* {display_name} is typing");
            }
            SyncEvent::PresenceChanged { user_id, online } if *user_id == self.partner => {
                let who = self.names.get(user_id).map_or(user_id.as_str(), String::as_str);
                let status = if *online { "online" } else { "offline" };
                println!("* {who} is {status}");
            }
            SyncEvent::BackendError { error, .. } => println!("* server error: {error}"),
            _ => {}
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
