//! Interactive terminal chat.

use std::io::Write;

use anyhow::Result;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use ragchat_bot::Chatbot;
use ragchat_core::{ChatEntry, RagConfig};

/// Entries shown by the `history` command.
const HISTORY_SHOWN: usize = 5;

/// Characters of each query shown by the `history` command.
const HISTORY_PREVIEW: usize = 60;

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Quit,
    Help,
    History,
    Clear,
    Reload,
    Empty,
    Ask(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => Self::Empty,
            "quit" | "exit" | "bye" => Self::Quit,
            "help" => Self::Help,
            "history" => Self::History,
            "clear" => Self::Clear,
            "reload" => Self::Reload,
            _ => Self::Ask(line.to_string()),
        }
    }
}

/// Run the interactive chat until the user quits or presses Ctrl-C.
pub async fn run(config: RagConfig) -> Result<()> {
    print!("\x1b[2J\x1b[H");
    println!("ragchat - document chat with Google Gemini");
    println!("{}", "=".repeat(60));

    println!("Initializing chatbot...");
    let bot = match Chatbot::from_config(config) {
        Ok(bot) => bot,
        Err(e) => {
            println!("\nFailed to initialize chatbot: {}", e);
            println!("Please check your configuration and try again.");
            return Err(e.into());
        }
    };

    println!("Loading documents and preparing the vector store...");
    match bot.initialize().await {
        Ok(0) => {
            println!("No documents found in {}.", bot.documents_dir().display());
            println!("  Add some PDF, TXT, or MD files to the documents folder.");
            println!("  Continuing without document context...");
        }
        Ok(count) => println!("Vector store ready with {} documents", count),
        Err(e) => {
            error!("Failed to build vector store: {}", e);
            println!("Failed to build vector store: {}", e);
            println!("  Continuing without document context...");
        }
    }

    print_banner();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        // EOF and Ctrl-C both end the session
        let Some(line) = line else {
            println!("\n\nGoodbye! Thanks for chatting!");
            break;
        };

        match ChatCommand::parse(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => {
                println!("\nGoodbye! Thanks for chatting!");
                break;
            }
            ChatCommand::Help => print_help(),
            ChatCommand::History => print_history(&bot.chat_history()),
            ChatCommand::Clear => {
                bot.clear_chat_history();
                println!("\nChat history cleared.");
            }
            ChatCommand::Reload => {
                println!("\nReloading documents...");
                match bot.reload(None).await {
                    Ok(0) => println!("No documents found to reload."),
                    Ok(count) => println!("Vector store recreated with {} documents", count),
                    Err(e) => {
                        println!("\nError: {}", e);
                        println!("Please try again or type 'help' for assistance.");
                    }
                }
            }
            ChatCommand::Ask(question) => {
                info!("User query: {}", question);
                let response = bot.generate_response(&question, true).await;
                println!("\nBot:");
                println!("{}", "-".repeat(20));
                println!("{}", response);
                println!("{}", "-".repeat(20));
            }
        }
    }

    Ok(())
}

fn print_banner() {
    println!("\n{}", "=".repeat(40));
    println!("Chatbot ready! Type 'quit', 'exit', or 'bye' to end the conversation.");
    println!("  Type 'history' to view chat history.");
    println!("  Type 'clear' to clear chat history.");
    println!("  Type 'reload' to reload documents and recreate the vector store.");
    println!("  Type 'help' for more commands.");
    println!("{}", "-".repeat(40));
}

fn print_help() {
    println!("\nAvailable commands:");
    println!("  history        view recent chat history");
    println!("  clear          clear chat history");
    println!("  reload         reload documents and recreate the vector store");
    println!("  quit/exit/bye  exit the chatbot");
    println!("  anything else is sent as a question");
}

fn print_history(history: &[ChatEntry]) {
    if history.is_empty() {
        println!("\nNo chat history available.");
        return;
    }

    println!("\nRecent chat history:");
    println!("{}", "-".repeat(30));
    for line in history_lines(history) {
        println!("{}", line);
    }
}

/// `N. [HH:MM:SS] <query preview>...` for the most recent entries.
pub fn history_lines(history: &[ChatEntry]) -> Vec<String> {
    let start = history.len().saturating_sub(HISTORY_SHOWN);
    history[start..]
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let time = entry.timestamp.with_timezone(&Local).format("%H:%M:%S");
            let preview: String = entry.query.chars().take(HISTORY_PREVIEW).collect();
            format!("{}. [{}] {}...", i + 1, time, preview)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatCommand::parse("  QUIT "), ChatCommand::Quit);
        assert_eq!(ChatCommand::parse("bye"), ChatCommand::Quit);
        assert_eq!(ChatCommand::parse("Help"), ChatCommand::Help);
        assert_eq!(ChatCommand::parse("history"), ChatCommand::History);
        assert_eq!(ChatCommand::parse("clear"), ChatCommand::Clear);
        assert_eq!(ChatCommand::parse("reload"), ChatCommand::Reload);
        assert_eq!(ChatCommand::parse("   "), ChatCommand::Empty);
        assert_eq!(
            ChatCommand::parse(" What is Rust? "),
            ChatCommand::Ask("What is Rust?".to_string())
        );
    }

    #[test]
    fn test_history_lines_show_last_five() {
        let long = "x".repeat(100);
        let history: Vec<ChatEntry> = (0..7)
            .map(|i| {
                let query = if i == 6 { long.clone() } else { format!("question {}", i) };
                ChatEntry::new(&query, "answer", true)
            })
            .collect();

        let lines = history_lines(&history);

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("1. ["));
        assert!(lines[0].ends_with("] question 2..."));
        assert!(lines[4].ends_with(&format!("] {}...", "x".repeat(60))));
    }
}
