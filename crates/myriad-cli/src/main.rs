//! Myriad CLI
//!
//! Command-line access to a Myriad property store:
//! - Browsing dimensions and their known values
//! - Tabular queries and context lookups
//! - Applying operation batches and deleting clusters
//! - Checkpointing the on-disk log

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use myriad_model::{epoch, Dimension, DimensionValues, Measure, MeasureSet, PropertyOperation};
use myriad_store::client::LOCAL_SCHEME;
use myriad_store::{LocalTransport, MyriadClient, MyriadStore, StoreConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

mod logging;
mod render;

pub const CONFIG_ENV: &str = "MYRIAD_CONFIG";
pub const DEFAULT_URI: &str = "local://cli";

#[derive(Parser)]
#[command(name = "myriad")]
#[command(author, version, about = "Myriad: dimensional property store")]
struct Cli {
    /// JSON configuration file (defaults to $MYRIAD_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the log and snapshot; overrides the configuration file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every dimension with its known values
    Metadata,
    /// List dimension names
    Dimensions,
    /// Tabulate stored clusters
    Query {
        /// Whitelist for one dimension, e.g. `Region=US,EU` (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Look up properties answering a context, e.g. `Region=US Env=Prod`
    Get { measures: Vec<String> },
    /// Show properties by key
    Show {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Apply an operation batch read from a JSON file (`-` for stdin)
    Put { operation: PathBuf },
    /// Remove the cluster of `key` tagged with exactly the given measures
    Delete { key: String, measures: Vec<String> },
    /// Register a value under a dimension
    AddMeasure { dimension: String, value: String },
    /// Register a new dimension
    AddDimension { name: String },
    /// Snapshot the store and empty its log
    Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub log_level: Option<String>,
    pub store: StoreConfig,
    pub uri: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            store: StoreConfig::default(),
            uri: DEFAULT_URI.to_string(),
        }
    }
}

impl CliConfig {
    /// `--config` wins over `$MYRIAD_CONFIG`; with neither, defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.store.data_dir = Some(dir);
    }
    logging::init_logging(config.log_level.as_deref())?;
    tracing::debug!(
        uri = %config.uri,
        data_dir = ?config.store.data_dir,
        "configuration loaded"
    );

    let store = Arc::new(MyriadStore::open(config.store.clone()).context("failed to open store")?);
    let client = connect(&config.uri, Arc::clone(&store))?;

    match cli.command {
        Commands::Metadata => {
            print!("{}", render::metadata(&client.get_metadata()?));
        }
        Commands::Dimensions => {
            for name in client.get_dimension_list()? {
                println!("{name}");
            }
        }
        Commands::Query { filters } => {
            let filters = filters
                .iter()
                .map(|f| parse_filter(f))
                .collect::<Result<Vec<_>>>()?;
            let rows = client
                .query(filters)
                .rows()
                .collect::<myriad_store::Result<Vec<_>>>()?;
            let dimensions = client.get_dimension_list()?;
            print!(
                "{}",
                render::rows(&rows, &config.store.property_dimension, &dimensions)
            );
            eprintln!("{} {} rows", "ok".green().bold(), rows.len());
        }
        Commands::Get { measures } => {
            let context = parse_measures(&measures)?;
            print!("{}", render::get_result(&client.get(context)?));
        }
        Commands::Show { keys } => {
            let properties = client.get_properties(keys.clone())?;
            for key in keys.iter().filter(|k| !properties.iter().any(|p| &p.key == *k)) {
                eprintln!("{} no property `{key}`", "warning".yellow().bold());
            }
            for property in &properties {
                print!("{}", render::property(property));
            }
        }
        Commands::Put { operation } => {
            let op = read_operation(&operation)?;
            let (property, digest) = client.put_property(op)?;
            print!("{}", render::property(&property));
            eprintln!("{} {}", "ok".green().bold(), digest);
        }
        Commands::Delete { key, measures } => {
            let measures = parse_measures(&measures)?;
            let property = client
                .get_properties(vec![key.clone()])?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("no property `{key}`"))?;
            let op = property
                .delete_operation(&measures, epoch::now())
                .ok_or_else(|| anyhow!("`{key}` has no cluster at {measures}"))?;
            let (property, _) = client.put_property(op)?;
            print!("{}", render::property(&property));
        }
        Commands::AddMeasure { dimension, value } => {
            let values = client.add_measure(Measure::parse(&dimension, value)?)?;
            print!("{}", render::metadata(&[values]));
        }
        Commands::AddDimension { name } => {
            let values = client.add_dimension(name)?;
            print!("{}", render::metadata(&[values]));
        }
        Commands::Checkpoint => {
            store.checkpoint().context("checkpoint failed")?;
            eprintln!("{} checkpoint written", "ok".green().bold());
        }
    }

    Ok(())
}

/// Register `store` with an in-process transport and hand back a client for
/// `uri`.
fn connect(uri: &str, store: Arc<MyriadStore>) -> Result<MyriadClient> {
    let uri = Url::parse(uri).with_context(|| format!("invalid store uri `{uri}`"))?;
    if uri.scheme() != LOCAL_SCHEME {
        bail!(
            "unsupported store uri `{uri}`: this binary only serves {LOCAL_SCHEME}:// stores"
        );
    }
    let name = uri
        .host_str()
        .ok_or_else(|| anyhow!("store uri `{uri}` has no name"))?;
    let transport = Arc::new(LocalTransport::new());
    let registered = transport.register(name, store)?;
    Ok(MyriadClient::new(registered, transport))
}

/// `Dim=value`
fn parse_measure(arg: &str) -> Result<Measure> {
    let (dimension, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected DIMENSION=VALUE, got `{arg}`"))?;
    Ok(Measure::parse(dimension.trim(), value.trim())?)
}

fn parse_measures(args: &[String]) -> Result<MeasureSet> {
    args.iter().map(|a| parse_measure(a)).collect()
}

/// `Dim=v1,v2`; `Dim=` leaves the axis unrestricted.
fn parse_filter(arg: &str) -> Result<DimensionValues> {
    let (dimension, values) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected DIMENSION=V1,V2, got `{arg}`"))?;
    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty());
    Ok(DimensionValues::new(Dimension::new(dimension.trim())?, values))
}

fn read_operation(path: &Path) -> Result<PropertyOperation> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)
            .context("failed to read operation from stdin")?;
        text
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read operation {}", path.display()))?
    };
    serde_json::from_str(&text).context("invalid operation batch")
}
