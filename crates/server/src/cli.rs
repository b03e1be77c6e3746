use crate::auth::TokenAuthorizer;
use crate::error::{ErrorKind, Result};
use crate::ingest::DirectTransmitter;
use crate::loader::WebrootLoader;
use crate::routes::{AppState, build_router};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use figment::providers::Serialized;
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;
use ucss_cache::{CacheStore, Rewriter, StatsAggregator};
use ucss_config::Config;
use ucss_detect::{Transmitter, UpdateCssRequest};
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "ucss", version, about = "Detect, cache and strip unused CSS")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON, by extension).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Override the configured mode (enabled, stats, preview, disabled).
    #[arg(long, global = true)]
    pub mode: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the REST endpoints.
    Serve {
        /// Address to listen on instead of `server.listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Analyse a saved page and file the result in the cache.
    Detect {
        /// Rendered HTML of the page.
        page: PathBuf,
        /// URL the page was served at.
        #[arg(long)]
        url: Url,
        /// Document root that same-site stylesheet URLs map onto.
        #[arg(long)]
        webroot: PathBuf,
        /// Print the report instead of storing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Rewrite a saved page with its manifest and print the result.
    Rewrite {
        page: PathBuf,
        #[arg(long)]
        url: Url,
        /// Render as a privileged viewer would see it.
        #[arg(long)]
        privileged: bool,
    },
    /// Print cache counts and usage statistics as JSON.
    Stats,
    /// Delete every cached stylesheet and manifest.
    Clear,
}

impl Cli {
    /// Configuration from file and environment, with command-line overrides
    /// on top.
    pub fn load_config(&self) -> Result<Config> {
        let file = self.config.clone().or_else(Config::default_file);
        let mut figment = Config::figment(file.as_deref());
        if let Some(mode) = &self.mode {
            figment = figment.merge(Serialized::default("mode", mode));
        }
        if let Command::Serve { listen: Some(listen) } = &self.command {
            figment = figment.merge(Serialized::default("server.listen", listen));
        }
        Config::from_figment(figment).or_raise(|| ErrorKind::Config)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    match cli.command {
        Command::Serve { .. } => serve(&config).await,
        Command::Detect { page, url, webroot, dry_run } => detect(&config, &page, url, &webroot, dry_run).await,
        Command::Rewrite { page, url, privileged } => rewrite(&config, &page, &url, privileged).await,
        Command::Stats => stats(&config).await,
        Command::Clear => store(&config)?.clear().await.or_raise(|| ErrorKind::Cache),
    }
}

fn store(config: &Config) -> Result<CacheStore> {
    CacheStore::from_config(config).or_raise(|| ErrorKind::Cache)
}

async fn read_page(page: &Path) -> Result<String> {
    tokio::fs::read_to_string(page).await.or_raise(|| ErrorKind::Io(format!("could not read {}", page.display())))
}

#[instrument(skip_all, fields(listen = %config.server.listen, mode = %config.mode))]
async fn serve(config: &Config) -> Result<()> {
    let state = AppState {
        store: store(config)?,
        stats: StatsAggregator::new(config.stats.plugins_dir.clone()),
        auth: Arc::new(TokenAuthorizer::new(config.server.admin_token.clone())),
    };
    if config.server.admin_token.is_none() {
        tracing::warn!("no admin token configured, privileged endpoints will refuse every request");
    }
    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .or_raise(|| ErrorKind::Io(format!("could not bind {}", config.server.listen)))?;
    tracing::info!("listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .or_raise(|| ErrorKind::Io("server failed".to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[instrument(skip(config, webroot), fields(page = %page.display(), %url))]
async fn detect(config: &Config, page: &Path, url: Url, webroot: &Path, dry_run: bool) -> Result<()> {
    if !config.mode.runs_detection() {
        tracing::warn!(mode = %config.mode, "detection is disabled");
        return Ok(());
    }
    let html = read_page(page).await?;
    let loader = WebrootLoader::new(config.site_url.clone(), webroot);
    let Some(envelope) = ucss_detect::detect(&html, url, config, &loader).await.or_raise(|| ErrorKind::Detect)? else {
        tracing::info!("no eligible stylesheets on page");
        return Ok(());
    };
    if dry_run {
        let text = serde_json::to_string_pretty(&envelope).or_raise(|| ErrorKind::Io("could not print report".to_string()))?;
        println!("{text}");
        return Ok(());
    }
    let compressed_data = envelope.seal().or_raise(|| ErrorKind::Detect)?;
    let response = DirectTransmitter::new(store(config)?)
        .transmit(UpdateCssRequest { compressed_data })
        .await
        .or_raise(|| ErrorKind::Cache)?;
    println!("{}% of style rules removed across {} stylesheets", response.reduction, envelope.css.len());
    Ok(())
}

async fn rewrite(config: &Config, page: &Path, url: &Url, privileged: bool) -> Result<()> {
    let html = read_page(page).await?;
    let rewriter = Rewriter::from_config(config).or_raise(|| ErrorKind::Config)?;
    print!("{}", rewriter.rewrite(&store(config)?, &html, url, privileged).await);
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let store = store(config)?;
    let cache_data = store.cache_summary().await.or_raise(|| ErrorKind::Cache)?;
    let stats_data = StatsAggregator::new(config.stats.plugins_dir.clone()).collect(&store).await.or_raise(|| ErrorKind::Cache)?;
    let text = serde_json::to_string_pretty(&json!({ "cache_data": cache_data, "stats_data": stats_data }))
        .or_raise(|| ErrorKind::Io("could not print statistics".to_string()))?;
    println!("{text}");
    Ok(())
}
