//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to navigate chats and manage their session without
//! sending a message.

/// A parsed chat command.
///
/// These commands control the application and are never sent as messages.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Reload and display the chat list.
    Chats,

    /// Create a new chat room with the given name.
    NewChat(String),

    /// Open a chat by sidebar number or identifier.
    Open(String),

    /// Attach a file to the open chat, with an optional caption.
    Attach {
        path: String,
        caption: Option<String>,
    },

    /// Show the signed-in user.
    Whoami,

    /// Sign out and return to the auth prompt.
    SignOut,

    /// Display help information.
    Help,

    /// Exit the application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(AppCommand)` if the input is a command, or `None` if it
/// should be sent as a regular message.
///
/// # Examples
///
/// ```
/// # use parlor::app::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/open 2").is_some());
/// assert!(parse_command("good morning").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<AppCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "chats" | "ls" => AppCommand::Chats,
        "new" => match argument {
            Some(name) => AppCommand::NewChat(name.to_string()),
            None => AppCommand::Invalid("/new requires a chat name".to_string()),
        },
        "open" => match argument {
            Some(target) => AppCommand::Open(target.to_string()),
            None => AppCommand::Invalid("/open requires a chat number or id".to_string()),
        },
        "attach" => parse_attach_command(argument),
        "whoami" => AppCommand::Whoami,
        "signout" | "logout" => AppCommand::SignOut,
        "help" | "?" => AppCommand::Help,
        "quit" | "exit" | "q" => AppCommand::Quit,
        _ => AppCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_attach_command(argument: Option<&str>) -> AppCommand {
    let Some(arg) = argument else {
        return AppCommand::Invalid("/attach requires a file path".to_string());
    };

    let mut parts = arg.splitn(2, ' ');
    let path = parts.next().unwrap().to_string();
    let caption = parts
        .next()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    AppCommand::Attach { path, caption }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /chats                 Reload and show the chat list
  /new <name>            Create a new chat room
  /open <n|id>           Open a chat by sidebar number or id
  /attach <path> [text]  Send a file (jpeg/png/gif/pdf/txt, up to 5MB)
  /whoami                Show the signed-in user
  /signout               Sign out
  /help                  Show this help message
  /quit                  Exit

Anything else you type is sent to the open chat."#
}
