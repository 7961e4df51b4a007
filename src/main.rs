use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use parley::api::{ApiClient, ApiError, ChatService};
use parley::storage::{FileStorage, MemoryStorage, Storage};
use parley::types::Message;
use parley::{Config, Conversation, Session, TokenStore};

#[derive(Parser)]
#[command(name = "parley", version, about = "Terminal chat client")]
struct Cli {
    /// Run against an in-process mock backend (state is lost on exit)
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register { email: String },
    /// Log in and remember the session
    Login { email: String },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Send a single prompt
    Send { prompt: Vec<String> },
    /// Print the chat history
    History,
    /// Delete the chat history
    Clear,
    /// Interactive chat (default)
    Chat,
}

type Input = Lines<BufReader<Stdin>>;

struct App {
    session: Session,
    conversation: Conversation,
    #[cfg(feature = "mock")]
    _mock: Option<parley::mock::MockServer>,
}

impl App {
    async fn connect(config: Config) -> Result<Self> {
        #[cfg(feature = "mock")]
        let mock = if config.use_mock {
            Some(
                parley::mock::MockServer::start()
                    .await
                    .context("Failed to start mock backend")?,
            )
        } else {
            None
        };
        #[cfg(not(feature = "mock"))]
        anyhow::ensure!(
            !config.use_mock,
            "This build has no mock backend; rebuild with the `mock` feature"
        );

        let storage: Arc<dyn Storage> = if config.use_mock {
            Arc::new(MemoryStorage::new())
        } else {
            let storage = config
                .storage_dir
                .as_ref()
                .map_or_else(FileStorage::default_location, FileStorage::new);
            match storage.dir() {
                Some(dir) => tracing::debug!(dir = %dir.display(), "using file storage"),
                None => tracing::warn!("no local data directory, session will not be saved"),
            }
            Arc::new(storage)
        };

        #[cfg(feature = "mock")]
        let base_url = mock
            .as_ref()
            .map(|m| m.base_url())
            .unwrap_or_else(|| config.api_base_url.clone());
        #[cfg(not(feature = "mock"))]
        let base_url = config.api_base_url.clone();

        let config = Config { api_base_url: base_url, ..config };
        let client = ApiClient::from_config(&config, TokenStore::new(storage))
            .context("Failed to build HTTP client")?;
        tracing::debug!(base_url = client.base_url(), "client ready");

        let session = Session::new(client.clone());
        session.restore();

        Ok(Self {
            session,
            conversation: Conversation::new(Arc::new(ChatService::new(client))),
            #[cfg(feature = "mock")]
            _mock: mock,
        })
    }

    /// Surface an API error, logging out if the session is gone.
    fn fail(&self, err: ApiError) -> anyhow::Error {
        self.session.handle_error(&err);
        err.into()
    }

    fn require_login(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            bail!("Not logged in. Run `parley login <email>` first.");
        }
        Ok(())
    }

    async fn register(&self, email: &str, input: &mut Input) -> Result<()> {
        let password = read_password(input).await?;
        let response = self
            .session
            .register(email, &password)
            .await
            .map_err(|e| self.fail(e))?;
        println!("{} You can now log in.", response.message);
        Ok(())
    }

    async fn login(&self, email: &str, input: &mut Input) -> Result<()> {
        let password = read_password(input).await?;
        let user = self
            .session
            .login(email, &password)
            .await
            .map_err(|e| self.fail(e))?;
        println!("Logged in as {}", user.email);
        Ok(())
    }

    async fn send(&self, prompt: &str) -> Result<()> {
        self.require_login()?;
        match self.conversation.send_message(prompt).await {
            Ok(Some(reply)) => print_message(&reply),
            Ok(None) => {}
            Err(err) => return Err(self.fail(err)),
        }
        Ok(())
    }

    async fn history(&self) -> Result<()> {
        self.require_login()?;
        self.conversation
            .refresh_history()
            .await
            .map_err(|e| self.fail(e))?;
        let messages = self.conversation.messages();
        if messages.is_empty() {
            println!("No messages yet.");
        }
        messages.iter().for_each(print_message);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.require_login()?;
        self.conversation
            .delete_history()
            .await
            .map_err(|e| self.fail(e))?;
        println!("History cleared.");
        Ok(())
    }

    async fn chat(&self, input: &mut Input) -> Result<()> {
        println!("Type a message, or /help for commands.");
        if self.session.is_authenticated() {
            // A failed history load is not fatal for the REPL.
            if let Err(err) = self.history().await {
                eprintln!("error: {err}");
            }
        }

        loop {
            prompt_marker().await?;
            let Some(line) = input.next_line().await? else {
                break;
            };
            let line = line.trim();
            let mut words = line.split_whitespace();

            let result = match words.next() {
                Some("/quit") | Some("/exit") => break,
                Some("/help") => {
                    print_help();
                    Ok(())
                }
                Some("/register") => match words.next() {
                    Some(email) => self.register(email, input).await,
                    None => Err(anyhow::anyhow!("usage: /register <email>")),
                },
                Some("/login") => match words.next() {
                    Some(email) => self.login(email, input).await,
                    None => Err(anyhow::anyhow!("usage: /login <email>")),
                },
                Some("/logout") => {
                    self.session.logout();
                    self.conversation.clear_history();
                    Ok(())
                }
                Some("/whoami") => {
                    whoami(&self.session);
                    Ok(())
                }
                Some("/history") => self.history().await,
                Some("/clear") => self.clear().await,
                Some(cmd) if cmd.starts_with('/') => Err(anyhow::anyhow!("unknown command {cmd}")),
                _ => self.send(line).await,
            };

            if let Err(err) = result {
                eprintln!("error: {err}");
            }
        }
        Ok(())
    }
}

fn whoami(session: &Session) {
    match session.user() {
        Some(user) => println!("{} ({})", user.email, user.id),
        None => println!("Not logged in."),
    }
}

fn print_message(message: &Message) {
    println!("> {}", message.prompt);
    println!("{}", message.response);
    println!();
}

fn print_help() {
    println!("/register <email>  create an account");
    println!("/login <email>     log in");
    println!("/logout            log out");
    println!("/whoami            show the current user");
    println!("/history           reload the history");
    println!("/clear             delete the history");
    println!("/quit              leave");
}

async fn prompt_marker() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"parley> ").await?;
    stdout.flush().await?;
    Ok(())
}

async fn read_password(input: &mut Input) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Password: ").await?;
    stdout.flush().await?;
    let password = input
        .next_line()
        .await?
        .context("No password given")?;
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    config.use_mock |= cli.mock;

    let app = App::connect(config).await?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Register { email } => app.register(&email, &mut input).await,
        Command::Login { email } => app.login(&email, &mut input).await,
        Command::Logout => {
            app.session.logout();
            Ok(())
        }
        Command::Whoami => {
            whoami(&app.session);
            Ok(())
        }
        Command::Send { prompt } => app.send(&prompt.join(" ")).await,
        Command::History => app.history().await,
        Command::Clear => app.clear().await,
        Command::Chat => app.chat(&mut input).await,
    }
}
