//! Interactive terminal client for a parlor chat backend.
//!
//! # Usage
//!
//! ```bash
//! # Credentials from the environment
//! PARLOR_URL=https://chat.example.com PARLOR_API_KEY=anon-key parlor-chat
//!
//! # Or on the command line
//! parlor-chat --url https://chat.example.com --api-key anon-key
//!
//! # Disable colors (useful for piping output)
//! parlor-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/chats` - Reload and show the chat list
//! - `/new <name>` - Create a chat room
//! - `/open <n|id>` - Open a chat
//! - `/attach <path> [caption]` - Send a file
//! - `/signout` - Sign out
//! - `/quit` - Exit the application

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use bytes::Bytes;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use time::macros::format_description;

use parlor::app::{AppArgs, AppCommand, AppConfig, help_text, parse_command};
use parlor::{
    AttachmentSource, AttachmentUploader, Backend, Chat, ChatList, Message, MessageWindow,
    SessionWatch, content_type_for_extension, validate_sign_up,
};

/// Main entry point for the parlor-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = AppArgs::from_command_line_relaxed("parlor-chat [OPTIONS]");
    let config = AppConfig::from(args);

    let backend = Backend::new(config.url.clone(), config.api_key.clone())?;
    let mut rl = DefaultEditor::new()?;
    let printer = Printer {
        use_color: config.use_color,
    };

    // Flag for interrupt handling at the prompt
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("parlor-chat (backend: {})", backend.base_url());
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let Some(user_id) = sign_in_flow(&backend, &mut rl, &printer).await? else {
            break;
        };
        if !chat_flow(&backend, &config, user_id, &mut rl, &printer, &interrupted).await? {
            break;
        }
        // Signed out: fall through to the auth prompt again.
    }

    println!("Goodbye!");
    Ok(())
}

/// Prompts for sign-in or sign-up until a session exists.
///
/// Returns the signed-in user id, or `None` if the user quit.
async fn sign_in_flow(
    backend: &Backend,
    rl: &mut DefaultEditor,
    printer: &Printer,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    if let Some(session) = backend.current_session().await {
        printer.info(&format!(
            "Signed in as {}",
            session.user.email.as_deref().unwrap_or(&session.user.id)
        ));
        return Ok(Some(session.user.id));
    }

    loop {
        let choice = match rl.readline("[s]ign in, [r]egister, or [q]uit: ") {
            Ok(line) => line.trim().to_lowercase(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match choice.as_str() {
            "s" | "sign in" | "signin" => {
                let email = rl.readline("Email: ")?;
                let password = rl.readline("Password: ")?;
                match backend.sign_in(email.trim(), &password).await {
                    Ok(session) => {
                        printer.info(&format!(
                            "Signed in as {}",
                            session.user.email.as_deref().unwrap_or(&session.user.id)
                        ));
                        return Ok(Some(session.user.id));
                    }
                    Err(e) => printer.error(e.message()),
                }
            }
            "r" | "register" | "sign up" | "signup" => {
                let email = rl.readline("Email: ")?;
                let password = rl.readline("Password: ")?;
                let confirm = rl.readline("Confirm password: ")?;
                if let Err(e) = validate_sign_up(email.trim(), &password, &confirm) {
                    printer.error(e.message());
                    continue;
                }
                match backend.sign_up(email.trim(), &password).await {
                    Ok(user) => {
                        printer.info(&format!(
                            "Account created for {}. Sign in to continue.",
                            user.email.as_deref().unwrap_or(&user.id)
                        ));
                    }
                    Err(e) => printer.error(e.message()),
                }
            }
            "q" | "quit" => return Ok(None),
            _ => printer.error("Please answer s, r, or q."),
        }
    }
}

/// Runs the chat REPL until the user quits or signs out.
///
/// Returns `false` to exit the application, `true` to return to the auth
/// prompt.
async fn chat_flow(
    backend: &Backend,
    config: &AppConfig,
    user_id: String,
    rl: &mut DefaultEditor,
    printer: &Printer,
    interrupted: &Arc<AtomicBool>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut watch = SessionWatch::new(backend);
    let mut chats = ChatList::new(backend.clone());
    let mut window = MessageWindow::new(backend.clone(), user_id.clone());
    let uploader = AttachmentUploader::with_bucket(backend.clone(), config.bucket.clone());

    if let Err(e) = chats.refresh().await {
        printer.error(e.message());
    }
    print_sidebar(chats.chats());

    loop {
        interrupted.store(false, Ordering::Relaxed);

        // Show whatever the subscription delivered while we were idle.
        drain_inserts(&mut window, printer);

        if !watch.is_signed_in() {
            printer.info("Session ended. Sign in to continue.");
            window.close();
            return Ok(true);
        }

        let prompt = match window.chat_id().and_then(|id| chats.get(id)) {
            Some(chat) => format!("{}> ", chat.name),
            None => "> ".to_string(),
        };
        let readline = rl.readline(&prompt);

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        AppCommand::Quit => {
                            window.close();
                            return Ok(false);
                        }
                        AppCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        AppCommand::Chats => {
                            match chats.refresh().await {
                                Ok(()) => print_sidebar(chats.chats()),
                                Err(e) => printer.error(e.message()),
                            }
                        }
                        AppCommand::NewChat(name) => match chats.create(&name).await {
                            Ok(chat) => {
                                printer.info(&format!("Created chat: {}", chat.name));
                                print_sidebar(chats.chats());
                            }
                            Err(e) => printer.error(e.message()),
                        },
                        AppCommand::Open(target) => {
                            match resolve_chat(&chats, &target) {
                                Some(id) => {
                                    chats.select(id.clone());
                                    match window.open(&id).await {
                                        Ok(()) => {
                                            for message in window.messages() {
                                                print_message(message, &user_id, printer);
                                            }
                                        }
                                        Err(e) => printer.error(e.message()),
                                    }
                                }
                                None => printer
                                    .error(&format!("No chat matches {target:?}. Try /chats.")),
                            }
                        }
                        AppCommand::Attach { path, caption } => {
                            match stage_file(&path) {
                                Ok(file) => {
                                    let caption = caption.as_deref().unwrap_or("");
                                    match window.send_attachment(&uploader, &file, caption).await {
                                        Ok(message) => print_message(&message, &user_id, printer),
                                        Err(e) => printer.error(e.message()),
                                    }
                                }
                                Err(e) => printer.error(&e),
                            }
                        }
                        AppCommand::Whoami => match backend.session() {
                            Some(session) => printer.info(&format!(
                                "{} ({})",
                                session.user.email.as_deref().unwrap_or("no email"),
                                session.user.id
                            )),
                            None => printer.info("Not signed in."),
                        },
                        AppCommand::SignOut => {
                            backend.sign_out().await;
                            // The watch notices on the next pass.
                        }
                        AppCommand::Invalid(message) => {
                            printer.error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the open chat
                match window.send_text(line).await {
                    Ok(_) => {}
                    Err(e) => printer.error(e.message()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!();
                window.close();
                return Ok(false);
            }
            Err(err) => {
                printer.error(&format!("Input error: {}", err));
                window.close();
                return Ok(false);
            }
        }
    }
}

/// Prints and merges everything the subscription has already delivered.
fn drain_inserts<S: parlor::MessageStore>(window: &mut MessageWindow<S>, printer: &Printer) {
    match window.poll_inserts() {
        Ok(merged) => {
            let user_id = window.user_id().to_string();
            for message in &merged {
                print_message(message, &user_id, printer);
            }
        }
        Err(e) => printer.error(e.message()),
    }
}

/// Resolves a `/open` target: a sidebar number first, then a chat id.
fn resolve_chat<S: parlor::ChatStore>(chats: &ChatList<S>, target: &str) -> Option<String> {
    if let Ok(index) = target.parse::<usize>() {
        if index >= 1 {
            if let Some(chat) = chats.chats().get(index - 1) {
                return Some(chat.id.clone());
            }
        }
    }
    chats.get(target).map(|chat| chat.id.clone())
}

/// Reads a file from disk and stages it for upload.
fn stage_file(path: &str) -> Result<AttachmentSource, String> {
    let path = Path::new(path);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("Not a file path: {}", path.display()))?;
    let content_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(content_type_for_extension)
        .ok_or_else(|| {
            "Only images (JPEG, PNG, GIF), PDFs, and text files are allowed".to_string()
        })?;
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Ok(AttachmentSource::new(name, content_type, Bytes::from(bytes)))
}

fn print_sidebar(chats: &[Chat]) {
    if chats.is_empty() {
        println!("    (no chats yet; /new <name> creates one)");
        return;
    }
    println!("    Chats:");
    for (i, chat) in chats.iter().enumerate() {
        match chat.last_message.as_deref() {
            Some(last) => println!("      {}. {} - {}", i + 1, chat.name, last),
            None => println!("      {}. {}", i + 1, chat.name),
        }
    }
}

fn print_message(message: &Message, user_id: &str, printer: &Printer) {
    let clock = format_description!("[hour]:[minute]");
    let stamp = message
        .created_at
        .format(&clock)
        .unwrap_or_else(|_| "??:??".to_string());
    let who = if message.sender_id == user_id {
        "you"
    } else {
        &message.sender_id
    };
    let mut line = format!("[{stamp}] {who}: {}", message.content);
    if let Some(url) = message.attachment_url.as_deref() {
        let name = message.attachment_name.as_deref().unwrap_or("attachment");
        line.push_str(&format!(" [{name}: {url}]"));
    }
    printer.message(&line);
}

/// Minimal ANSI-aware output helpers.
struct Printer {
    use_color: bool,
}

impl Printer {
    fn info(&self, text: &str) {
        if self.use_color {
            println!("\x1b[2m{}\x1b[0m", text);
        } else {
            println!("{}", text);
        }
    }

    fn error(&self, text: &str) {
        eprintln!("{}", self.render_error(text));
    }

    // Same wording with and without color; ANSI only changes styling.
    fn render_error(&self, text: &str) -> String {
        if self.use_color {
            format!("\x1b[31mError: {}\x1b[0m", text)
        } else {
            format!("Error: {}", text)
        }
    }

    fn message(&self, text: &str) {
        println!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_wording_is_identical_with_and_without_color() {
        let plain = Printer { use_color: false }.render_error("boom");
        let colored = Printer { use_color: true }.render_error("boom");
        assert_eq!(plain, "Error: boom");
        let stripped = colored.replace("\x1b[31m", "").replace("\x1b[0m", "");
        assert_eq!(stripped, plain);
    }
}
