//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Prompt Provider - resolve and manage prompts
#[derive(Parser)]
#[command(
    name = "pp",
    about = "Resolve logical prompt keys against a remote prompt service with local fallbacks",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve one prompt, remote first, local default as fallback
    Get {
        /// Logical prompt key
        key: String,

        /// Exact version to fetch (overrides any label)
        #[arg(short = 'V', long)]
        version: Option<u32>,

        /// Label to fetch (overrides the configured version)
        #[arg(short = 'L', long)]
        label: Option<String>,

        /// Fetch a chat prompt instead of a text prompt
        #[arg(long)]
        chat: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Resolve several text prompts concurrently
    Batch {
        /// Logical prompt keys
        #[arg(required = true)]
        keys: Vec<String>,

        /// Label applied to every key
        #[arg(short = 'L', long)]
        label: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List prompts known to the remote service
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a new text prompt version
    Create {
        /// Logical prompt key
        key: String,

        /// Prompt text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,

        /// Read prompt text from a file
        #[arg(long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        meta: CreateArgs,
    },

    /// Create a new chat prompt version from a JSON file of messages
    CreateChat {
        /// Logical prompt key
        key: String,

        /// JSON array of {"role", "content"} objects
        #[arg(long)]
        file: PathBuf,

        #[command(flatten)]
        meta: CreateArgs,
    },

    /// Replace the labels of a prompt version
    UpdateLabels {
        /// Logical prompt key
        key: String,

        /// Prompt version
        version: u32,

        /// New labels (repeatable)
        #[arg(short = 'L', long = "label", required = true)]
        labels: Vec<String>,
    },

    /// Show the identity a key resolves to, without fetching
    Resolve {
        /// Logical prompt key
        key: String,

        #[arg(short = 'V', long)]
        version: Option<u32>,

        #[arg(short = 'L', long)]
        label: Option<String>,
    },

    /// Show the merged prompt registry
    Config {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Metadata flags shared by the create commands
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CreateArgs {
    /// Labels for the new version (repeatable)
    #[arg(short = 'L', long = "label")]
    pub labels: Vec<String>,

    /// Tags for the prompt (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Commit message for the new version
    #[arg(short = 'm', long)]
    pub commit_message: Option<String>,

    /// Opaque JSON config stored with the version (e.g. model parameters)
    #[arg(long = "prompt-config", value_name = "JSON")]
    pub prompt_config: Option<String>,
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prompt-provider")
        .join("logs")
        .join("prompt-provider.log")
}
