//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use crate::store::CacheStore;
use crate::telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod admin;
mod status;

pub use admin::{ClearArgs, GetArgs, PurgeArgs};

#[derive(Parser, Debug)]
#[command(name = "oxprops")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "status", about = "Show cached entries per entity type")]
    Status(StatusArgs),

    #[command(name = "get", about = "Print a cached property value")]
    Get(GetArgs),

    #[command(name = "purge", about = "Delete cached entries of one instance")]
    Purge(PurgeArgs),

    #[command(name = "clear", about = "Delete every cached entry")]
    Clear(ClearArgs),
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

/// 命令执行所需的上下文
pub struct CliContext {
    pub config: Config,
    pub store: Arc<dyn CacheStore>,
}

impl CliContext {
    async fn open(path: Option<&PathBuf>) -> Result<Self> {
        let config = match path {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };
        init_tracing(&config.global.log_level);
        let store = crate::manager::open_store(&config.store)
            .await
            .context("Failed to open property cache store")?;
        Ok(Self { config, store })
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let ctx = CliContext::open(cli.config.as_ref()).await?;

    match &cli.command {
        Commands::Status(args) => status::execute(&ctx, args).await,
        Commands::Get(args) => admin::execute_get(&ctx, args).await,
        Commands::Purge(args) => admin::execute_purge(&ctx, args).await,
        Commands::Clear(args) => admin::execute_clear(&ctx, args).await,
    }
}
