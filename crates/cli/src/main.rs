//! rescache command line entry point.
//!
//! Fetches URLs through the cached resource pipeline and inspects stored
//! outcomes. Logging goes to stderr so stdout carries only the output.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rescache_client::{FetchClient, FetchConfig, PlainUrl, Resource, ResourceClient};
use rescache_core::{AppConfig, CacheDb, Method, ResourceRecord};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rescache", version, about = "Fetch URLs through a persistent response cache")]
struct Cli {
    /// Database path, overriding RESCACHE_DB_PATH and the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch a URL unless a successful response is already stored
    Get(UrlArgs),
    /// Show the latest stored response for a URL without fetching
    Show(UrlArgs),
}

#[derive(Debug, Args)]
struct UrlArgs {
    /// URL to fetch; https:// is assumed when no scheme is given
    url: String,

    /// Accept header to send
    #[arg(long)]
    accept: Option<String>,

    /// Print the whole stored record as JSON instead of the body
    #[arg(long)]
    record: bool,
}

impl UrlArgs {
    fn resource(&self) -> Result<Resource<PlainUrl>> {
        let mut input = Map::new();
        if let Some(accept) = &self.accept {
            input.insert("accept".into(), Value::from(accept.as_str()));
        }
        Ok(Resource::configure(PlainUrl, &input)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = AppConfig::load().context("loading configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?
        .with_deadline(config.store_timeout());
    let transport = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let client = ResourceClient::new(db, transport).with_deadline(config.timeout());

    match cli.command {
        Commands::Get(args) => {
            let resource = args.resource()?;
            let record = client
                .get(&resource, vec![Value::from(args.url.as_str())], Map::new())
                .await?;
            print_record(&record, args.record)?;
        }
        Commands::Show(args) => {
            let resource = args.resource()?;
            let request = resource.build_request(Method::Get, vec![Value::from(args.url.as_str())], Map::new())?;
            let record = client.latest(&resource, &request).await?;
            print_record(&record, args.record)?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_record(record: &ResourceRecord, full: bool) -> Result<()> {
    if full {
        let output = json!({
            "record": record,
            "success": record.is_success(),
            "content_type": record.content_type(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        tracing::info!(id = record.id, status = record.status, identity = %record.identity, "stored response");
        println!("{}", record.body);
    }
    Ok(())
}
