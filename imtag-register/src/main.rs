//! imtag-register - register new images and their model tags
//!
//! Lists image files under a folder, skips content already registered, tags
//! the rest with the configured model and stores images and tags together.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imtag_common::config::{load_config, DatabaseConfig};
use imtag_common::db::{init_database, list_tables, reset_database};
use imtag_register::repositories::{ImagesRepository, ModelTagRepository};
use imtag_register::runtime::Runtime;
use tracing::info;

/// Command-line arguments for imtag-register
#[derive(Parser, Debug)]
#[command(name = "imtag-register")]
#[command(about = "Register new images and their model tags")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overriding `[logging].level` (RUST_LOG still wins)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema
    InitDb {
        /// Delete the existing database file first
        #[arg(long)]
        overwrite: bool,
    },

    /// Register every new image found in a folder
    Register {
        /// Folder (or single file) to read, relative to the root folder unless absolute
        image_dir: String,

        /// Descend into sub-directories
        #[arg(short, long)]
        recursive: bool,

        /// Concurrent extraction and tagging tasks
        #[arg(short = 'j', long)]
        workers: Option<usize>,
    },

    /// Print stored rows
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand, Debug)]
enum ShowTarget {
    /// Registered images
    Images {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Tag rows of the configured model
    ModelTag {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Row counts
    Counts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    imtag_common::logging::init(&config.logging, args.log_level.as_deref())
        .context("Failed to initialize logging")?;

    info!("Starting imtag-register v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::InitDb { overwrite } => {
            let db_path = config.resolve_database_path();
            let tag_table = config.tagger.tag_table();
            let DatabaseConfig::Sqlite { max_connections } = config.database;

            let pool = if overwrite {
                reset_database(&db_path, max_connections, tag_table).await
            } else {
                init_database(&db_path, max_connections, tag_table).await
            }
            .with_context(|| format!("Failed to initialize {}", db_path.display()))?;

            println!("Database: {}", db_path.display());
            for table in list_tables(&pool).await? {
                println!("  {}", table);
            }
            pool.close().await;
        }

        Command::Register {
            image_dir,
            recursive,
            workers,
        } => {
            let recursive = recursive || config.register.recursive;
            let n_workers = workers.unwrap_or(config.register.n_workers);

            let runtime = Runtime::build(config)
                .await
                .context("Failed to build runtime")?;

            let image_files = runtime
                .storage
                .list_files(&image_dir, recursive)
                .await
                .with_context(|| format!("Failed to list {}", image_dir))?;
            info!(count = image_files.len(), dir = %image_dir, recursive, "Listed input files");

            let register = runtime
                .register_new_image()
                .await
                .context("Failed to prepare registration")?;
            let summary = register.handle(&image_files, n_workers).await?;

            println!("{}", summary);
            runtime.pool.close().await;
        }

        Command::Show { what } => {
            let runtime = Runtime::build(config)
                .await
                .context("Failed to build runtime")?;

            match what {
                ShowTarget::Images { limit } => {
                    for entry in runtime.images.list(limit).await? {
                        println!(
                            "{:>6}  {}  {}x{}  {}  {} bytes  {}",
                            entry.image_id.unwrap_or_default(),
                            entry.hash,
                            entry.width,
                            entry.height,
                            entry.file_type,
                            entry.file_size,
                            entry.file_location,
                        );
                    }
                }
                ShowTarget::ModelTag { limit } => {
                    for entry in runtime.model_tag.list(limit).await? {
                        println!(
                            "{:>6}  {:<10}  {:<32}  {:.4}{}",
                            entry.image_id,
                            entry.category,
                            entry.tag,
                            entry.score,
                            if entry.archived { "  (archived)" } else { "" },
                        );
                    }
                }
                ShowTarget::Counts => {
                    println!("images:    {}", runtime.images.count().await?);
                    println!(
                        "{}: {}",
                        runtime.model_tag.table(),
                        runtime.model_tag.count().await?
                    );
                }
            }
            runtime.pool.close().await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_config_flag_only_from_command_line() {
        // The environment variable is resolved later by load_config
        std::env::set_var(imtag_common::config::CONFIG_ENV_VAR, "/from/env.toml");
        let args = Args::try_parse_from(["imtag-register", "show", "counts"]).unwrap();
        std::env::remove_var(imtag_common::config::CONFIG_ENV_VAR);
        assert_eq!(args.config, None);

        let args =
            Args::try_parse_from(["imtag-register", "-c", "/from/cli.toml", "show", "counts"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/from/cli.toml")));
        assert!(matches!(args.command, Command::Show { what: ShowTarget::Counts }));
    }
}
