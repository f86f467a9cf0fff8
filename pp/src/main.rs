//! Prompt Provider CLI
//!
//! Resolves, lists and manages prompts from the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use prompt_provider::cli::{Cli, Command, CreateArgs, OutputFormat, get_log_path};
use prompt_provider::config::Config;
use prompt_provider::domain::{ChatMessage, PromptResult};
use prompt_provider::registry::ResolvedRegistry;
use prompt_provider::remote::DEFAULT_LABEL;
use prompt_provider::service::{CreateOptions, PromptService};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("main: ctrl_c received, cancelling");
            trigger.cancel();
        }
    });

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Get {
            key,
            version,
            label,
            chat,
            format,
        } => cmd_get(&config, &key, version, label.as_deref(), chat, format, &cancel).await,
        Command::Batch { keys, label, format } => cmd_batch(&config, &keys, label.as_deref(), format, &cancel).await,
        Command::List { format } => cmd_list(&config, format, &cancel).await,
        Command::Create {
            key,
            content,
            file,
            meta,
        } => cmd_create(&config, &key, content, file.as_deref(), meta, &cancel).await,
        Command::CreateChat { key, file, meta } => cmd_create_chat(&config, &key, &file, meta, &cancel).await,
        Command::UpdateLabels { key, version, labels } => {
            cmd_update_labels(&config, &key, version, &labels, &cancel).await
        }
        Command::Resolve { key, version, label } => cmd_resolve(&config, &key, version, label.as_deref()),
        Command::Config { format } => cmd_config(&config, format),
    }
}

fn service(config: &Config) -> Result<PromptService> {
    PromptService::from_config(config).context("Failed to initialize prompt service")
}

fn print_result(result: &PromptResult) {
    let version = result.version.map(|v| format!(" v{}", v)).unwrap_or_default();
    eprintln!(
        "{} {}{} [{}, {}]",
        "#".dimmed(),
        result.prompt_key.bold(),
        version,
        result.kind,
        result.source.to_string().cyan()
    );
    println!("{}", result.content);
}

async fn cmd_get(
    config: &Config,
    key: &str,
    version: Option<u32>,
    label: Option<&str>,
    chat: bool,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    debug!(%key, ?version, ?label, chat, ?format, "cmd_get: called");
    let service = service(config)?;

    let result = if chat {
        service.get_chat_prompt(key, version, label, cancel).await?
    } else {
        service.get_prompt(key, version, label, cancel).await?
    };

    let Some(result) = result else {
        return Err(eyre::eyre!("No prompt found for '{}'", key));
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_result(&result),
    }
    Ok(())
}

async fn cmd_batch(
    config: &Config,
    keys: &[String],
    label: Option<&str>,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    debug!(?keys, ?label, ?format, "cmd_batch: called");
    let service = service(config)?;
    let results = service.get_prompts(keys, label, cancel).await?;

    if results.is_empty() {
        return Err(eyre::eyre!("No prompts found"));
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Text => {
            for result in &results {
                print_result(result);
                println!();
            }
            eprintln!("{} of {} prompts resolved", results.len(), keys.len());
        }
    }
    Ok(())
}

async fn cmd_list(config: &Config, format: OutputFormat, cancel: &CancellationToken) -> Result<()> {
    debug!(?format, "cmd_list: called");
    let service = service(config)?;
    let prompts = service.list_prompts(cancel).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&prompts)?),
        OutputFormat::Text => {
            if prompts.is_empty() {
                println!("No prompts found");
                return Ok(());
            }
            for prompt in &prompts {
                let versions: Vec<String> = prompt.versions.iter().map(u32::to_string).collect();
                println!(
                    "{:32} versions: {:12} labels: {}",
                    prompt.name.bold(),
                    versions.join(","),
                    prompt.labels.join(", ").yellow()
                );
            }
        }
    }
    Ok(())
}

fn create_options(meta: CreateArgs) -> Result<CreateOptions> {
    let config = meta
        .prompt_config
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("Failed to parse --prompt-config as JSON")?;
    Ok(CreateOptions {
        labels: meta.labels,
        tags: meta.tags,
        commit_message: meta.commit_message,
        config,
    })
}

async fn cmd_create(
    config: &Config,
    key: &str,
    content: Option<String>,
    file: Option<&Path>,
    meta: CreateArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    debug!(%key, ?file, "cmd_create: called");
    let text = match (content, file) {
        (Some(text), _) => text,
        (None, Some(path)) => {
            fs::read_to_string(path).context(format!("Failed to read prompt from {}", path.display()))?
        }
        (None, None) => return Err(eyre::eyre!("Either --content or --file is required")),
    };

    let options = create_options(meta)?;
    let service = service(config)?;
    let created = service.create_prompt(key, &text, options, cancel).await?;
    println!(
        "{} {} version {}",
        "Created".green(),
        created.prompt_key.bold(),
        created.version.unwrap_or_default()
    );
    Ok(())
}

async fn cmd_create_chat(
    config: &Config,
    key: &str,
    file: &Path,
    meta: CreateArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    debug!(%key, ?file, "cmd_create_chat: called");
    let content = fs::read_to_string(file).context(format!("Failed to read messages from {}", file.display()))?;
    let messages: Vec<ChatMessage> =
        serde_json::from_str(&content).context(format!("Failed to parse messages in {}", file.display()))?;

    let options = create_options(meta)?;
    let service = service(config)?;
    let created = service.create_chat_prompt(key, messages, options, cancel).await?;
    println!(
        "{} {} version {}",
        "Created".green(),
        created.prompt_key.bold(),
        created.version.unwrap_or_default()
    );
    Ok(())
}

async fn cmd_update_labels(
    config: &Config,
    key: &str,
    version: u32,
    labels: &[String],
    cancel: &CancellationToken,
) -> Result<()> {
    debug!(%key, version, ?labels, "cmd_update_labels: called");
    let service = service(config)?;
    let updated = service.update_prompt_labels(key, version, labels, cancel).await?;
    println!(
        "{} {} version {}: {}",
        "Updated".green(),
        updated.prompt_key.bold(),
        version,
        updated.labels.join(", ").yellow()
    );
    Ok(())
}

fn cmd_resolve(config: &Config, key: &str, version: Option<u32>, label: Option<&str>) -> Result<()> {
    debug!(%key, ?version, ?label, "cmd_resolve: called");
    let registry = Arc::new(ResolvedRegistry::from_config(&config.prompts));
    let registered = registry.contains(key.trim());
    let identity = PromptService::new(registry, None).identity_for(key, version, label)?;

    println!("{:12} {}", "key:", key.trim().bold());
    println!("{:12} {}", "registered:", if registered { "yes".green() } else { "no".yellow() });
    println!("{:12} {}", "actual key:", identity.actual_key);
    match (identity.version, identity.label.as_deref()) {
        (Some(version), _) => println!("{:12} {}", "version:", version),
        (None, Some(label)) => println!("{:12} {}", "label:", label),
        (None, None) => println!("{:12} {} {}", "label:", DEFAULT_LABEL, "(default)".dimmed()),
    }
    Ok(())
}

fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_config: called");
    let registry = ResolvedRegistry::from_config(&config.prompts);

    match format {
        OutputFormat::Json => {
            let prompts: Vec<_> = registry.iter().collect();
            println!("{}", serde_json::to_string_pretty(&prompts)?);
        }
        OutputFormat::Text => {
            let remote = if config.remote.is_configured() {
                config.remote.resolved_base_url().unwrap_or_default().green()
            } else {
                "not configured".yellow()
            };
            println!("{:12} {}", "remote:", remote);
            println!("{:12} {}", "prompts:", registry.len());
            for prompt in registry.iter() {
                println!();
                println!("{}", prompt.logical_key.bold());
                println!("  {:10} {}", "key:", prompt.actual_key);
                if let Some(version) = prompt.version {
                    println!("  {:10} {}", "version:", version);
                }
                if let Some(label) = &prompt.label {
                    println!("  {:10} {}", "label:", label);
                }
                if let Some(text) = prompt.default_text() {
                    println!("  {:10} {}", "default:", text.lines().next().unwrap_or_default());
                }
                if let Some(messages) = prompt.default_chat() {
                    println!("  {:10} {} messages", "chat:", messages.len());
                }
            }
        }
    }
    Ok(())
}
