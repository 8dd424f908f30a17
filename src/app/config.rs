//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the application runs with.

use arrrg_derive::CommandLine;

use crate::storage::DEFAULT_BUCKET;

/// Command-line arguments for the parlor-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct AppArgs {
    /// Backend base URL.
    #[arrrg(optional, "Backend base URL (default: $PARLOR_URL)", "URL")]
    pub url: Option<String>,

    /// Project API key.
    #[arrrg(optional, "Project API key (default: $PARLOR_API_KEY)", "KEY")]
    pub api_key: Option<String>,

    /// Storage bucket for attachments.
    #[arrrg(optional, "Attachment bucket (default: chat-attachments)", "BUCKET")]
    pub bucket: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration for the chat application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend base URL; `None` falls back to the environment.
    pub url: Option<String>,

    /// Project API key; `None` falls back to the environment.
    pub api_key: Option<String>,

    /// Storage bucket attachments are uploaded to.
    pub bucket: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl AppConfig {
    /// Creates a configuration with defaults: credentials from the
    /// environment, the default bucket, colors on.
    pub fn new() -> Self {
        Self {
            url: None,
            api_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
            use_color: true,
        }
    }

    /// Sets the backend base URL.
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the project API key.
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the attachment bucket.
    pub fn with_bucket<S: Into<String>>(mut self, bucket: S) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<AppArgs> for AppConfig {
    fn from(args: AppArgs) -> Self {
        AppConfig {
            url: args.url,
            api_key: args.api_key,
            bucket: args.bucket.unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            use_color: !args.no_color,
        }
    }
}
