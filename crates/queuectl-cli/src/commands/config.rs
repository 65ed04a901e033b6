//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_database::connection::mask_password;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration after all overrides
    Show,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = redacted(super::load_config(config_path)?);
            match format {
                OutputFormat::Json => output::print_item(&config, format),
                OutputFormat::Table => print_table(&config),
            }
        }
    }

    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    config.database.url = mask_password(&config.database.url);
    config
}

fn print_table(config: &AppConfig) {
    println!("Database:");
    output::print_kv("url", &config.database.url);
    output::print_kv("max_connections", &config.database.max_connections.to_string());
    println!("Queue:");
    output::print_kv("backoff_base", &config.queue.backoff_base.to_string());
    output::print_kv("default_max_retries", &config.queue.default_max_retries.to_string());
    println!("Worker:");
    output::print_kv("poll_interval_ms", &config.worker.poll_interval_ms.to_string());
    output::print_kv(
        "command_timeout_seconds",
        &config.worker.command_timeout_seconds.to_string(),
    );
    output::print_kv("shell", &config.worker.shell);
    output::print_kv(
        "executable",
        config.worker.executable.as_deref().unwrap_or("(auto)"),
    );
    output::print_kv("pid_file", &config.worker.pid_file);
    println!("Logging:");
    output::print_kv("level", &config.logging.level);
    output::print_kv("format", &config.logging.format);
}
