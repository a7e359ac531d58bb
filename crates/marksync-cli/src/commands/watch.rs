//! Watch command implementation.
//!
//! Opens a live session and re-renders the list whenever it changes, here
//! or in any other session on the same store. Lines read from stdin edit
//! the list through the session.

use std::io::BufRead;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::sync::mpsc;

use marksync_core::{BookmarkId, BookmarkList, SubscriptionStatus};

use crate::output;
use crate::session::{CliSession, storage};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Print each list snapshot as a JSON array
    #[arg(long)]
    pub json: bool,

    /// Ignore stdin and run until Ctrl+C
    #[arg(long)]
    pub no_input: bool,
}

/// A line typed at the watch prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Add { title: String, url: String },
    Delete(String),
    Reload,
    Resubscribe,
    Help,
    Quit,
}

const HELP: &str = "commands: add <title...> <url> | delete <id> | reload | resubscribe | quit";

/// Parse one input line. Blank lines parse to `None`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (verb, rest.as_slice()) {
        ("add", [title @ .., url]) if !title.is_empty() => Command::Add {
            title: title.join(" "),
            url: url.to_string(),
        },
        ("add", _) => return Err("usage: add <title...> <url>".to_string()),
        ("delete" | "rm", [id]) => Command::Delete(id.to_string()),
        ("delete" | "rm", _) => return Err("usage: delete <id>".to_string()),
        ("reload", []) => Command::Reload,
        ("resubscribe", []) => Command::Resubscribe,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) => return Err(format!("unknown command '{}'; {}", other, HELP)),
    };

    Ok(Some(command))
}

pub async fn run(args: WatchArgs) -> Result<()> {
    let profile = storage::require()?;

    eprintln!("{}", "Connecting...".dimmed());
    let session = profile.open_session().await?;

    if args.no_input {
        eprintln!("{}", "Press Ctrl+C to stop.".dimmed());
    } else {
        eprintln!("{}", HELP.dimmed());
    }

    let result = watch(&session, &args).await;
    session.close();
    result
}

async fn watch(session: &CliSession, args: &WatchArgs) -> Result<()> {
    let mut updates = session.updates();
    let mut status = session.status();
    render(&updates.borrow_and_update(), args.json)?;

    let reading = !args.no_input;
    let mut lines = if reading { stdin_lines() } else { mpsc::unbounded_channel().1 };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            line = lines.recv(), if reading => {
                let Some(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(session, command).await,
                    Ok(None) => {}
                    Err(message) => output::error(&message),
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = updates.borrow_and_update().clone();
                render(&list, args.json)?;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                report_status(&current);
            }
        }
    }

    Ok(())
}

/// Read stdin on its own thread so a pending read never holds up shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn execute(session: &CliSession, command: Command) {
    let result = match command {
        Command::Add { title, url } => session
            .add(&title, &url)
            .await
            .map(|record| output::success(&format!("Added {}", record.id))),
        Command::Delete(id) => match BookmarkId::new(id) {
            Ok(id) => session
                .remove(&id)
                .await
                .map(|()| output::success(&format!("Deleted {}", id))),
            Err(e) => Err(e),
        },
        Command::Reload => session.reload().await,
        Command::Resubscribe => session.resubscribe().await,
        Command::Help => {
            eprintln!("{}", HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
    }
}

fn render(list: &BookmarkList, json: bool) -> Result<()> {
    if json {
        return output::json(&list.as_slice());
    }

    println!();
    if list.is_empty() {
        output::note("No bookmarks.");
    }
    for record in list.iter() {
        output::bookmark(record);
    }
    Ok(())
}

fn report_status(status: &SubscriptionStatus) {
    match status {
        SubscriptionStatus::Active => eprintln!("{} {}", "LIVE".green(), status),
        SubscriptionStatus::Connecting => eprintln!("{} {}", "LIVE".dimmed(), status),
        SubscriptionStatus::Error(_) | SubscriptionStatus::TimedOut => eprintln!(
            "{} {} (type 'resubscribe' to retry)",
            "LIVE".red(),
            status
        ),
        SubscriptionStatus::Closed => eprintln!("{} {}", "LIVE".yellow(), status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_takes_last_word_as_url() {
        assert_eq!(
            parse_command("add The Rust Book https://doc.rust-lang.org/book"),
            Ok(Some(Command::Add {
                title: "The Rust Book".to_string(),
                url: "https://doc.rust-lang.org/book".to_string(),
            }))
        );
    }

    #[test]
    fn add_needs_title_and_url() {
        assert!(parse_command("add https://example.com").is_err());
        assert!(parse_command("add").is_err());
    }

    #[test]
    fn delete_takes_one_id() {
        assert_eq!(
            parse_command("rm 42"),
            Ok(Some(Command::Delete("42".to_string())))
        );
        assert!(parse_command("delete").is_err());
        assert!(parse_command("delete 1 2").is_err());
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("reload"), Ok(Some(Command::Reload)));
        assert_eq!(parse_command("resubscribe"), Ok(Some(Command::Resubscribe)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
        assert!(parse_command("frobnicate").is_err());
    }
}
