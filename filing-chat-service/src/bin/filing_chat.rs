//! Terminal front end: one chat session on stdin/stdout.

use anyhow::Context;
use clap::Parser;
use filing_chat_service::{spawn_expiry_listener, telemetry::init_terminal_tracing};
use filing_dialogue::{
    Collaborators, DialogueConfig, DialogueMachine, DialogueRunner, Event, HttpEndpoints,
    InMemorySessionStorage, Intent, NotificationScheduler, Rating, Renderer,
};
use std::{sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};

const SESSION_ID: &str = "terminal";

#[derive(Parser, Debug)]
#[command(name = "filing-chat", about = "Chat with the SEC filing analysis backend")]
struct Args {
    /// Base URL serving /extract, /analyze and /feedback
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:5000")]
    backend_url: String,

    /// How long the feedback confirmation stays visible
    #[arg(long, default_value_t = 3000)]
    notification_ttl_ms: u64,
}

/// Prints intents as plain lines; visibility toggles only matter to a GUI.
struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&self, _session_id: &str, intent: &Intent) {
        match intent {
            Intent::AppendBotMessage { text } => println!("\nbot> {text}\n"),
            Intent::ShowLoading => println!("..."),
            Intent::ShowDocument { reference } => println!("[document] {reference}"),
            Intent::ShowFeedback => {
                println!("Rate this answer with /rate <0-3>, add /comment <text>, then /submit")
            }
            Intent::ShowNewQuery => println!("Type /new to ask about another filing"),
            Intent::RatingSelected { rating } => println!("[rating] {}", rating.label()),
            Intent::ShowAlert { text } => eprintln!("! {text}"),
            Intent::ShowNotification { text, .. } => println!("* {text}"),
            Intent::DisableInput => println!("(input locked)"),
            _ => {}
        }
    }
}

enum Command {
    Message(String),
    Event(Event),
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    match head {
        "/quit" | "/exit" => Ok(Command::Quit),
        "/new" => Ok(Command::Event(Event::NewQuery)),
        "/submit" => Ok(Command::Event(Event::SubmitFeedback)),
        "/comment" => Ok(Command::Event(Event::EditComment(rest.trim().to_string()))),
        "/rate" => rest
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(|value| Rating::try_from(value).ok())
            .map(|rating| Command::Event(Event::SelectRating(rating)))
            .ok_or_else(|| "usage: /rate <0-3>".to_string()),
        _ => Ok(Command::Message(line.to_string())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_terminal_tracing();
    let args = Args::parse();

    let config = DialogueConfig {
        notification_ttl: Duration::from_millis(args.notification_ttl_ms),
        ..DialogueConfig::default()
    };
    let (scheduler, expired) = NotificationScheduler::new();
    let runner = DialogueRunner::new(
        DialogueMachine::new(config),
        Arc::new(InMemorySessionStorage::new()),
        Collaborators::http(HttpEndpoints::from_base(&args.backend_url)),
        Arc::new(TerminalRenderer),
        scheduler,
    );
    spawn_expiry_listener(runner.clone(), expired);

    runner
        .start_session(SESSION_ID)
        .await
        .context("Failed to start session")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let event = match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(Command::Message(text)) => Event::UserMessage(text),
            Ok(Command::Event(event)) => event,
            Err(usage) => {
                eprintln!("{usage}");
                continue;
            }
        };
        runner
            .dispatch(SESSION_ID, event)
            .await
            .context("Dialogue step failed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert!(matches!(parse_command("/quit"), Ok(Command::Quit)));
        assert!(matches!(
            parse_command("/rate 2"),
            Ok(Command::Event(Event::SelectRating(Rating::PartiallyCorrect)))
        ));
        assert!(parse_command("/rate 7").is_err());
        assert!(matches!(
            parse_command("/comment  good job "),
            Ok(Command::Event(Event::EditComment(ref c))) if c == "good job"
        ));
        assert!(matches!(
            parse_command("Apple 2023 10-K"),
            Ok(Command::Message(ref m)) if m == "Apple 2023 10-K"
        ));
    }
}
