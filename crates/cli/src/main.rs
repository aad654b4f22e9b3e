//! pricewatch command-line entry point.
//!
//! Runs one-shot lookups through the same cache and orchestrator the
//! extension uses, and inspects or clears the stored cache and session.
//! Results go to stdout as JSON lines; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pricewatch_client::{AggregateClient, AggregateConfig, Normalizer};
use pricewatch_core::{
    AppConfig, CacheStore, KeyNamespace, ProductEntry, ProductRequest, SessionStorage, StorageDb, best_deal,
    decode_key, derive_key, detect_platform, token_fingerprint,
};
use pricewatch_extension::{Orchestrator, RefreshOutcome, ResultView};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Lowest-price lookups across retail platforms
#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare prices for a product page URL
    Compare { url: String },

    /// Compare prices for a product name
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Inspect or clear cached results
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Inspect or clear the stored session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Count valid and expired entries
    Stats,
    /// Remove cached results
    Clear {
        /// Only clear one namespace
        #[arg(long, value_enum)]
        namespace: Option<Namespace>,
    },
    /// List cached keys with the request each was derived from
    Keys,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Show whether a session is stored
    Show,
    /// Clear the session and cached results
    Logout,
}

#[derive(Clone, Copy, ValueEnum)]
enum Namespace {
    Product,
    Search,
}

impl From<Namespace> for KeyNamespace {
    fn from(ns: Namespace) -> Self {
        match ns {
            Namespace::Product => KeyNamespace::Product,
            Namespace::Search => KeyNamespace::Search,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultLine<'a> {
    key: &'a str,
    from_cache: bool,
    best_deal: Option<&'a ProductEntry>,
    products: &'a [ProductEntry],
}

fn print_results(key: &str, products: &[ProductEntry], from_cache: bool) {
    let line = ResultLine { key, from_cache, best_deal: best_deal(products), products };
    match serde_json::to_string(&line) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "failed to encode results"),
    }
}

/// Prints refreshed results for the one request this process looks up.
struct StdoutView {
    key: String,
}

impl ResultView for StdoutView {
    fn current_key(&self) -> Option<String> {
        Some(self.key.clone())
    }

    fn show_results(&self, key: &str, products: &[ProductEntry], from_cache: bool) {
        print_results(key, products, from_cache);
    }
}

async fn lookup(config: &AppConfig, db: StorageDb, request: ProductRequest) -> Result<()> {
    let client = AggregateClient::new(AggregateConfig::from(config)).context("building aggregation client")?;
    let orchestrator =
        Orchestrator::new(CacheStore::new(db), Arc::new(client), Normalizer::new(config.placeholder_image.clone()));

    let view: Arc<dyn ResultView> = Arc::new(StdoutView { key: derive_key(&request) });

    let served = orchestrator.lookup(&request, &view).await?;
    print_results(&served.key, &served.products, served.from_cache);

    if let Some(refresh) = served.refresh {
        match refresh.await.context("refresh task")? {
            RefreshOutcome::Failed(e) => tracing::warn!(error = %e, "refresh failed; cached result stands"),
            outcome => tracing::debug!(?outcome, "refresh finished"),
        }
    }
    Ok(())
}

async fn cache_command(db: StorageDb, command: CacheCommands) -> Result<()> {
    let cache = CacheStore::new(db.clone());
    match command {
        CacheCommands::Stats => println!("{}", serde_json::to_string(&cache.stats().await)?),
        CacheCommands::Clear { namespace } => {
            let removed = match namespace {
                Some(ns) => cache.clear_namespace(ns.into()).await,
                None => cache.clear_all().await,
            };
            println!("{}", serde_json::json!({ "removed": removed }));
        }
        CacheCommands::Keys => {
            let prefixes: Vec<&str> = KeyNamespace::ALL.iter().map(|ns| ns.prefix()).collect();
            for (key, _) in db.scan_prefixes(&prefixes).await? {
                println!("{}", serde_json::json!({ "key": key, "request": decode_key(&key) }));
            }
        }
    }
    Ok(())
}

async fn session_command(db: StorageDb, command: SessionCommands) -> Result<()> {
    let session = SessionStorage::new(db.clone());
    match command {
        SessionCommands::Show => {
            let token = session.load_token().await?;
            let user = session.load_user().await?;
            println!(
                "{}",
                serde_json::json!({
                    "signedIn": token.is_some(),
                    "fingerprint": token.as_deref().map(token_fingerprint),
                    "user": user,
                })
            );
        }
        SessionCommands::Logout => {
            session.save_token(None).await?;
            session.save_user(None).await?;
            let removed = CacheStore::new(db).clear_all().await;
            tracing::info!(removed, "logged out; cache cleared");
            println!("{}", serde_json::json!({ "signedIn": false, "cacheRemoved": removed }));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let db = StorageDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;

    match cli.command {
        Commands::Compare { url } => {
            if detect_platform(&url).is_none() {
                anyhow::bail!("unsupported platform: {url}");
            }
            lookup(&config, db, ProductRequest::Url(url)).await
        }
        Commands::Search { query } => lookup(&config, db, ProductRequest::Query(query.join(" "))).await,
        Commands::Cache { command } => cache_command(db, command).await,
        Commands::Session { command } => session_command(db, command).await,
    }
}
