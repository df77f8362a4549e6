//! A terminal chat against a running relay.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_relay_client::{
    ChatSession, ChatSessionBuilder, ChatUpdate, History, SegmentPair, split,
};
use chat_relay_core::conversation::{Message, Role};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[derive(Debug, Parser)]
#[command(version, about = "Chat with a codebase through the relay")]
struct Args {
    /// URL of the relay's chat endpoint.
    #[arg(
        long,
        env = "CHAT_RELAY_ENDPOINT",
        default_value = "http://127.0.0.1:3000/api/chat"
    )]
    endpoint: String,

    /// JSON file the conversation is loaded from and saved to.
    #[arg(long)]
    history: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let history = match &args.history {
        Some(path) => match History::load(path).await {
            Ok(history) => history,
            Err(err) => {
                eprintln!("cannot load {}: {err}", path.display());
                return;
            }
        },
        None => History::default(),
    };
    for message in history.messages() {
        print_message(message);
    }

    let (session, mut updates) = ChatSessionBuilder::with_endpoint(args.endpoint)
        .with_history(history)
        .build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    'outer: loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if session.send_message(line).is_err() {
            break;
        }

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");

        loop {
            let update = select! {
                update = updates.recv() => {
                    let Some(update) = update else {
                        progress_bar.finish_and_clear();
                        break 'outer;
                    };
                    update
                },
                _ = sleep(Duration::from_millis(100)) => {
                    progress_bar.tick();
                    continue;
                }
            };

            match update {
                ChatUpdate::UserMessage(_) => {}
                ChatUpdate::Streaming { segments, .. } => {
                    progress_bar.set_message(progress_message(&segments));
                }
                ChatUpdate::Committed { segments, .. } => {
                    progress_bar.finish_and_clear();
                    print_answer(&segments);
                    if let Some(path) = &args.history {
                        save_history(&session, path).await;
                    }
                }
                ChatUpdate::Failed { error, .. } => {
                    progress_bar.finish_and_clear();
                    println!("{}❌ {}", BAR_CHAR.bright_red(), error.red());
                }
                ChatUpdate::Idle => {
                    progress_bar.finish_and_clear();
                    break;
                }
            }
        }
    }
}

fn progress_message(segments: &SegmentPair) -> String {
    if segments.is_reasoning_in_progress() || segments.visible.is_empty() {
        return "🤔 Thinking...".to_owned();
    }
    let last_line = segments.visible.lines().last().unwrap_or_default();
    format!("🤖 {last_line}")
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("> {}", message.content),
        Role::Assistant => print_answer(&split(&message.content)),
    }
}

fn print_answer(segments: &SegmentPair) {
    // Nothing to show for an empty answer.
    if segments.is_empty() {
        return;
    }
    if let Some(reasoning) = segments.reasoning.as_deref().filter(|r| !r.is_empty()) {
        for line in reasoning.lines() {
            println!("{}{}", BAR_CHAR.bright_black(), line.dimmed());
        }
    }
    if !segments.visible.is_empty() {
        println!(
            "{}🤖 {}",
            BAR_CHAR.bright_cyan(),
            segments.visible.bright_white()
        );
    }
}

async fn save_history(session: &ChatSession, path: &Path) {
    let result = match session.history().await {
        Ok(history) => history.save(path).await,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        warn!("cannot save history to {}: {err}", path.display());
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}
