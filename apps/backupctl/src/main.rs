use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{load_config, BackupStore, ClientConfig, StoreState};
use shared::domain::{BackupType, SettingsPatch};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "backupctl", about = "Operator console for the backup service")]
struct Args {
    /// Path to a toml config file (defaults to ./backupctl.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the backups known to the service.
    List,
    Create {
        #[arg(long = "type", default_value = "auto")]
        backup_type: BackupType,
        /// Wait for the post-create refresh and print the new listing.
        #[arg(long)]
        wait: bool,
    },
    Restore {
        name: String,
    },
    Delete {
        id: String,
    },
    /// Preview dashboard settings with the given overrides applied.
    Settings {
        #[arg(long)]
        retention_days: Option<u32>,
        #[arg(long)]
        auto_backup: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    apply_flags(&mut config, args.base_url, args.api_key);
    config.validate()?;
    info!(base_url = %config.base_url, "backupctl starting");

    let store = BackupStore::from_config(&config)?;
    let succeeded = run(&store, args.command).await;
    store.shutdown().await;

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Flags win over the config file and the environment.
fn apply_flags(config: &mut ClientConfig, base_url: Option<String>, api_key: Option<String>) {
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if let Some(api_key) = api_key {
        config.api_key = Some(api_key).filter(|key| !key.is_empty());
    }
}

async fn run(store: &Arc<BackupStore>, command: Command) -> bool {
    match command {
        Command::List => {
            store.fetch_backups().await;
            let state = store.snapshot().await;
            print_state(&state);
            state.error.is_none()
        }
        Command::Create { backup_type, wait } => {
            match store.create_backup(backup_type).await {
                Ok(outcome) => {
                    println!(
                        "Backup creation accepted ({backup_type}): {}",
                        outcome.backup_name.as_deref().unwrap_or("name not reported")
                    );
                    if let Some(output) = outcome.output.as_deref() {
                        println!("{}", output.trim_end());
                    }
                    if wait {
                        println!(
                            "Refreshing listing in {} ms...",
                            store.refresh_delay().as_millis()
                        );
                        store.settle().await;
                        print_state(&store.snapshot().await);
                    }
                    true
                }
                Err(err) => {
                    eprintln!("{err}");
                    false
                }
            }
        }
        Command::Restore { name } => {
            let outcome = store.restore_backup(&name).await;
            let message = outcome.message.unwrap_or_default();
            if outcome.success {
                println!("{message}");
            } else {
                eprintln!("Restore of {name} failed: {message}");
            }
            outcome.success
        }
        Command::Delete { id } => {
            let outcome = store.delete_backup(&id).await;
            let state = store.snapshot().await;
            if outcome.success {
                println!("Deleted {id}");
                print_state(&state);
            } else if let Some(error) = state.error {
                eprintln!("{error}");
            }
            outcome.success
        }
        Command::Settings {
            retention_days,
            auto_backup,
        } => {
            let settings = store
                .update_settings(SettingsPatch {
                    retention_days,
                    auto_backup,
                })
                .await;
            println!("retention_days = {}", settings.retention_days);
            println!("auto_backup    = {}", settings.auto_backup);
            true
        }
    }
}

fn print_state(state: &StoreState) {
    if let Some(error) = &state.error {
        eprintln!("{error}");
    }
    if state.backups.is_empty() {
        println!("No backups found.");
        return;
    }

    let width = state
        .backups
        .iter()
        .map(|backup| backup.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    println!("{:<width$}  {:<11}  {:<10}  SIZE", "NAME", "TYPE", "DATE");
    for backup in &state.backups {
        let date = backup
            .date
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<width$}  {:<11}  {:<10}  {}",
            backup.name,
            backup.kind.as_str(),
            date,
            backup.size.as_deref().unwrap_or("N/A"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn create_parses_backup_type() {
        let args = Args::parse_from(["backupctl", "create", "--type", "incremental", "--wait"]);
        match args.command {
            Command::Create { backup_type, wait } => {
                assert_eq!(backup_type, BackupType::Incremental);
                assert!(wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn flags_override_loaded_config() {
        let mut config = ClientConfig {
            base_url: "http://from-env:8000".into(),
            api_key: Some("env-key".into()),
            ..ClientConfig::default()
        };
        apply_flags(&mut config, Some("http://flag:9000".into()), Some(String::new()));
        assert_eq!(config.base_url, "http://flag:9000");
        assert_eq!(config.api_key, None);

        apply_flags(&mut config, None, Some("flag-key".into()));
        assert_eq!(config.base_url, "http://flag:9000");
        assert_eq!(config.api_key.as_deref(), Some("flag-key"));
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let args = Args::parse_from(["backupctl", "delete", "inc_1", "--base-url", "http://h:1"]);
        assert_eq!(args.base_url.as_deref(), Some("http://h:1"));
        assert!(matches!(args.command, Command::Delete { ref id } if id == "inc_1"));
    }
}
