//! Terminal chat application module.
//!
//! This module provides the interactive layer the `parlor-chat` binary is
//! built from. It supports:
//!
//! - Email/password sign-in and sign-up with local validation
//! - A chat sidebar with selection, creation, and live message display
//! - File attachments with captions
//! - Slash commands for navigation and session control
//!
//! # Architecture
//!
//! The module is organized into two components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing and handling
//!
//! The controllers the application drives live in the library proper:
//! [`crate::ChatList`], [`crate::MessageWindow`], and
//! [`crate::AttachmentUploader`].

mod commands;
mod config;

pub use commands::{AppCommand, help_text, parse_command};
pub use config::{AppArgs, AppConfig};
