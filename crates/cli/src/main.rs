use std::path::PathBuf;

use clap::{Parser, Subcommand};
use skyfleet_server::config::{ServerConfig, SqlDialect};

#[derive(Parser)]
#[command(author, version, about = "skyfleet ops CLI")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the TOML config (schema + semantic checks).
    Validate {
        /// Path to config.toml (defaults to SERVER_CONFIG_PATH or
        /// crates/server/res/config.toml).
        config_path: Option<PathBuf>,
    },
    /// Remove the local dev SQLite database, behind a safety flag.
    Clean {
        /// Path to config.toml (defaults to SERVER_CONFIG_PATH or
        /// crates/server/res/config.toml).
        config_path: Option<PathBuf>,
        /// Required to perform destructive actions.
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    match args.command {
        Command::Validate { config_path } => {
            let cfg_path = pick_config_path(config_path);
            let config = ServerConfig::load(&cfg_path)
                .await
                .map_err(|e| e.to_string())?;
            config.dialect().map_err(|e| e.to_string())?;
            println!("ok: config validated at {}", cfg_path.display());
        }
        Command::Clean {
            config_path,
            confirm,
        } => {
            if !confirm {
                return Err("refusing to clean without --confirm".to_string());
            }

            let cfg_path = pick_config_path(config_path);
            let config = ServerConfig::load(&cfg_path)
                .await
                .map_err(|e| e.to_string())?;

            if matches!(config.dialect().map_err(|e| e.to_string())?, SqlDialect::Sqlite) {
                let base_dir = cfg_path
                    .parent()
                    .ok_or_else(|| "config path has no parent".to_string())?;
                let db_path = config.sqlite_path(base_dir);
                if let Err(e) = std::fs::remove_file(&db_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(format!("failed to remove sqlite db: {e}"));
                    }
                }
            }

            println!("ok: cleaned local artifacts");
        }
    }

    Ok(())
}

fn pick_config_path(arg: Option<PathBuf>) -> PathBuf {
    if let Some(p) = arg {
        return p;
    }

    // CLI flags win; fall back to SERVER_CONFIG_PATH, then the repo-local
    // default.
    if let Ok(p) = std::env::var("SERVER_CONFIG_PATH") {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }

    PathBuf::from("crates/server/res/config.toml")
}
