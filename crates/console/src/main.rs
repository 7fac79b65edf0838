use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use concept::logging::init_tracing;
use concept::session::SessionEvent;
use concept::state::{AppIconSelection, ComposerKey, IconType, MessageRole};
use concept::{ui, ApiClient, ConceptSession, Config, SessionOptions, Transport, TransportKind};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

type Session = ConceptSession<Transport, ApiClient>;
type Input = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(name = "concept-console", about = "Game Concept Builder -- terminal front-end")]
struct Cli {
    /// Path to config.toml (defaults to config.toml next to this exe)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Game app name (prompted for when omitted)
    #[arg(short, long)]
    name: Option<String>,

    /// Game requirements (prompted for when omitted)
    #[arg(short, long)]
    requirements: Option<String>,

    /// Use canned replies instead of the analysis service
    #[arg(long)]
    scripted: bool,
}

const HELP: &str = "\
Commands:
  /steps                       Show phase progress
  /form                        Show the concept form
  /transcript                  Show the whole conversation
  /session                     Show the server-side session
  /reset                       Start the conversation over
  /name <text>                 Rename the game
  /requirements <text>         Replace the requirements (before chatting)
  /icon <emoji> [background]   Pick the app icon
  /confirm                     Confirm the form and start the analysis
  /create                      Create the app and exit
  /quit                        Leave without creating anything
End a line with \\ to continue the message on the next line.";

enum Flow {
    Continue,
    Created,
    Quit,
}

// --- Event printer ---

/// Prints session events as they arrive. Streamed replies are printed as
/// deltas of the in-progress assistant message.
async fn print_events(mut rx: UnboundedReceiver<SessionEvent>) {
    let mut open: Option<(usize, String)> = None;
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Notify(notice) => println!("{}", ui::render_notification(&notice)),
            SessionEvent::FormConfirmed => println!("Concept confirmed. Analysis starting."),
            SessionEvent::StepsChanged { current, finished } => match current {
                Some(step) => println!("-- Phase: {} --", step.title()),
                None if finished => {
                    println!("-- All phases complete. Use /create to create the app. --")
                }
                None => {}
            },
            SessionEvent::MessageAppended { index, message } => {
                if message.role == MessageRole::Assistant {
                    print!("{}: ", ui::ASSISTANT_LABEL);
                    let _ = std::io::stdout().flush();
                    open = Some((index, String::new()));
                }
            }
            SessionEvent::MessageUpdated { index, content } => {
                let Some((open_index, shown)) = open.as_mut() else { continue };
                if *open_index != index {
                    continue;
                }
                match content.strip_prefix(shown.as_str()) {
                    Some(delta) => print!("{delta}"),
                    None => print!("\n{content}"),
                }
                let _ = std::io::stdout().flush();
                *shown = content;
            }
            SessionEvent::ProcessingChanged(false) => {
                if open.take().is_some() {
                    println!("\n");
                }
            }
            SessionEvent::ProcessingChanged(true) => {}
            SessionEvent::TranscriptCleared => println!("Conversation cleared."),
            SessionEvent::AppListStale => debug!("App list marked stale"),
            SessionEvent::Created { app_id } => println!("Created app {app_id}"),
            SessionEvent::Closed => println!("Session closed."),
            SessionEvent::Navigate(route) => println!("Opening {route}"),
        }
    }
}

// --- Input ---

async fn prompt(input: &mut Input, label: &str) -> Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    input.next_line().await.context("Failed to read stdin")
}

/// Read a possibly multi-line entry; lines ending in `\` continue it.
async fn prompt_multiline(input: &mut Input, label: &str) -> Result<Option<String>> {
    let mut text = String::new();
    let mut line = prompt(input, label).await?;
    while let Some(l) = line {
        match l.strip_suffix('\\') {
            Some(part) => {
                text.push_str(part);
                text.push('\n');
                line = input.next_line().await.context("Failed to read stdin")?;
            }
            None => {
                text.push_str(&l);
                return Ok(Some(text));
            }
        }
    }
    Ok(None)
}

/// Feed one stdin line through the composer. A trailing `\` is the
/// modifier+Enter newline; otherwise the line ends with a plain Enter.
async fn type_line(session: &mut Session, line: &str) {
    let (text, continued) = match line.strip_suffix('\\') {
        Some(text) => (text, true),
        None => (line, false),
    };
    for c in text.chars() {
        session.handle_key(ComposerKey::Char(c)).await;
    }
    session
        .handle_key(ComposerKey::Enter { modifier: continued })
        .await;
}

// --- Commands ---

async fn run_command(session: &mut Session, command: &str) -> Result<Flow> {
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "steps" => print!("{}", ui::render_steps(session.steps())),
        "form" => print!(
            "{}",
            ui::render_form(session.form(), session.requirements_frozen())
        ),
        "transcript" => println!("{}\n", ui::render_transcript(session.messages())),
        "session" => match session.session_info().await {
            Ok(Some(info)) => {
                println!("Session {} (status: {})", info.session_id, info.status);
                if let Some(updated) = &info.updated_at {
                    println!("Last updated {updated}");
                }
            }
            Ok(None) => println!("No analysis session yet."),
            Err(e) => println!("Could not fetch the session: {e}"),
        },
        "reset" => {
            if !session.reset_conversation().await {
                println!("Wait for the current reply before resetting.");
            }
        }
        "name" if !arg.is_empty() => session.set_name(arg),
        "requirements" if !arg.is_empty() => {
            if !session.set_requirements(arg) {
                println!("Requirements are locked once the conversation has started.");
            }
        }
        "icon" if !arg.is_empty() => {
            let mut parts = arg.split_whitespace();
            let icon = parts.next().unwrap_or_default().to_string();
            let background = parts.next().map(String::from);
            session.set_icon(AppIconSelection {
                icon_type: IconType::Emoji,
                icon,
                background,
            });
        }
        "confirm" => {
            if session.form().collapsed {
                println!("The form is already confirmed.");
            } else {
                session.confirm_form().await;
            }
        }
        "create" => {
            if session.create_app().await.is_some() {
                return Ok(Flow::Created);
            }
        }
        "quit" | "exit" => return Ok(Flow::Quit),
        _ => println!("{HELP}"),
    }
    Ok(Flow::Continue)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref());
    if cli.scripted {
        config.session.transport = TransportKind::Scripted;
    }
    if let Some(dir) = init_tracing(&config.logging) {
        println!("Logging to {}", dir.display());
    }

    if config.session.transport == TransportKind::Live && config.api.app_id.is_empty() {
        eprintln!("No [api] app_id in config.toml.");
        eprintln!();
        eprintln!("Usage:");
        eprintln!("  concept-console --config config.toml    Talk to the analysis service");
        eprintln!("  concept-console --scripted              Offline, canned replies");
        bail!("Nothing to talk to");
    }

    let client = ApiClient::new(&config.api).context("Failed to build HTTP client")?;
    let transport = Transport::from_config(&config, client.clone());
    info!("Starting concept session ({} transport)", transport.kind());

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));
    let mut session = ConceptSession::new(transport, client, tx, SessionOptions::from_config(&config));

    println!("Game Concept Builder");
    println!();

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let name = match cli.name {
        Some(name) => Some(name),
        None => prompt(&mut input, "Game name: ").await?,
    };
    session.set_name(name.unwrap_or_default());
    let requirements = match cli.requirements {
        Some(text) => Some(text),
        None => prompt_multiline(&mut input, "Describe your game: ").await?,
    };
    session.set_requirements(requirements.unwrap_or_default());

    if !session.confirm_form().await {
        println!("Fix the form with /name or /requirements, then /confirm.");
    }

    let mut flow = Flow::Quit;
    while let Some(line) = input.next_line().await.context("Failed to read stdin")? {
        if session.composer().text().is_empty() {
            if let Some(command) = line.trim().strip_prefix('/') {
                flow = run_command(&mut session, command).await?;
                match flow {
                    Flow::Continue => continue,
                    Flow::Created | Flow::Quit => break,
                }
            }
        }
        if !session.form().collapsed {
            println!("Confirm the form first (/confirm).");
            continue;
        }
        type_line(&mut session, &line).await;
    }

    match flow {
        Flow::Created => drop(session),
        Flow::Continue | Flow::Quit => session.close(),
    }
    // Ends once every sender, including a pending navigation, is gone.
    let _ = printer.await;
    Ok(())
}
