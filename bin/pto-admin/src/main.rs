//! PTO admin CLI
//!
//! Drives the raw data store and the observation store directly from the
//! command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pto_common::Config;
use pto_obs::{ObservationSet, ObservationStore};
use pto_raw::{RawDataStore, RawMetadata};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pto-admin")]
#[command(about = "PTO store admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path (JSON or TOML)
    #[arg(short, long, env = "PTO_CONFIG")]
    config: Option<PathBuf>,

    /// Raw data root, overriding the configuration
    #[arg(long)]
    raw_root: Option<PathBuf>,

    /// Observation database, overriding the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level, overriding the configuration
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Campaign operations
    Campaign {
        #[command(subcommand)]
        action: CampaignCommands,
    },
    /// Raw file operations
    File {
        #[command(subcommand)]
        action: FileCommands,
    },
    /// Observation set operations
    Obs {
        #[command(subcommand)]
        action: ObsCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CampaignCommands {
    /// List all campaigns
    List,
    /// Show campaign metadata
    Show {
        /// Campaign name
        name: String,
    },
    /// Create a campaign from a metadata JSON file
    Create {
        /// Campaign name
        name: String,
        /// Metadata JSON file
        metadata: PathBuf,
    },
    /// Replace a campaign's metadata
    PutMetadata {
        /// Campaign name
        name: String,
        /// Metadata JSON file
        metadata: PathBuf,
    },
    /// List the files in a campaign
    Files {
        /// Campaign name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum FileCommands {
    /// Show file metadata, with campaign metadata folded in
    Show {
        campaign: String,
        file: String,
    },
    /// Create or replace file metadata from a JSON file
    PutMetadata {
        campaign: String,
        file: String,
        /// Metadata JSON file
        metadata: PathBuf,
    },
    /// Store file data
    PutData {
        campaign: String,
        file: String,
        /// Local file to upload
        data: PathBuf,
        /// Replace existing data
        #[arg(long)]
        force: bool,
    },
    /// Write file data to stdout
    GetData {
        campaign: String,
        file: String,
    },
}

#[derive(Subcommand, Debug)]
enum ObsCommands {
    /// List observation set links
    List,
    /// Show an observation set
    Show {
        /// Set id (hex)
        id: String,
    },
    /// Create an observation set from a metadata JSON file
    Create {
        /// Metadata JSON file
        metadata: PathBuf,
    },
    /// Load a newline-delimited observation file into a set
    Load {
        /// Set id (hex)
        id: String,
        /// Observation file
        data: PathBuf,
    },
    /// Write a set's observations to stdout
    Dump {
        /// Set id (hex)
        id: String,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading configuration {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(root) = &args.raw_root {
        config = config.with_raw_root(root);
    }
    if let Some(db) = &args.database {
        config = config.with_database(db);
    }
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = Arc::new(config);
    match args.command {
        Commands::Campaign { action } => run_campaign(&config, action),
        Commands::File { action } => run_file(&config, action),
        Commands::Obs { action } => run_obs(&config, action),
    }
}

fn run_campaign(config: &Arc<Config>, action: CampaignCommands) -> Result<()> {
    let store = RawDataStore::open(Arc::clone(config))?;

    match action {
        CampaignCommands::List => {
            let mut names = store.campaign_names();
            names.sort();
            for name in names {
                println!("{name}");
            }
        }
        CampaignCommands::Show { name } => {
            let md = store.campaign_for_name(&name)?.campaign_metadata()?;
            print_json(&md.to_json(false))?;
        }
        CampaignCommands::Create { name, metadata } => {
            let md = read_metadata(&metadata)?;
            let campaign = store.create_campaign(&name, md)?;
            info!("Created campaign {}", campaign.name());
        }
        CampaignCommands::PutMetadata { name, metadata } => {
            let md = read_metadata(&metadata)?;
            store.campaign_for_name(&name)?.put_campaign_metadata(md)?;
        }
        CampaignCommands::Files { name } => {
            for file in store.campaign_for_name(&name)?.file_names()? {
                println!("{file}");
            }
        }
    }
    Ok(())
}

fn run_file(config: &Arc<Config>, action: FileCommands) -> Result<()> {
    let store = RawDataStore::open(Arc::clone(config))?;

    match action {
        FileCommands::Show { campaign, file } => {
            let md = store.campaign_for_name(&campaign)?.file_metadata(&file)?;
            print_json(&md.to_json(true))?;
        }
        FileCommands::PutMetadata {
            campaign,
            file,
            metadata,
        } => {
            let md = read_metadata(&metadata)?;
            let stored = store
                .campaign_for_name(&campaign)?
                .put_file_metadata(&file, md)?;
            print_json(&stored.to_json(true))?;
        }
        FileCommands::PutData {
            campaign,
            file,
            data,
            force,
        } => {
            let input = File::open(&data).with_context(|| format!("opening {}", data.display()))?;
            let written = store
                .campaign_for_name(&campaign)?
                .write_file_data(&file, force, input)?;
            info!("Wrote {} bytes to {}/{}", written, campaign, file);
        }
        FileCommands::GetData { campaign, file } => {
            let mut out = io::stdout().lock();
            store
                .campaign_for_name(&campaign)?
                .read_file_data_to(&file, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn run_obs(config: &Arc<Config>, action: ObsCommands) -> Result<()> {
    let store = ObservationStore::open(Arc::clone(config))?;

    match action {
        ObsCommands::List => {
            for id in store.set_ids()? {
                println!("{}", config.link_to(&format!("obs/{id:016x}"))?);
            }
        }
        ObsCommands::Show { id } => {
            let set = store.set_by_id(parse_set_id(&id)?)?;
            print_json(&set.to_json()?)?;
        }
        ObsCommands::Create { metadata } => {
            let file = File::open(&metadata)
                .with_context(|| format!("opening {}", metadata.display()))?;
            let mut set: ObservationSet = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing {}", metadata.display()))?;
            store.create_set(&mut set)?;
            print_json(&set.to_json()?)?;
        }
        ObsCommands::Load { id, data } => {
            let set_id = parse_set_id(&id)?;
            let file = File::open(&data).with_context(|| format!("opening {}", data.display()))?;
            let count = store.ingest_stream(set_id, BufReader::new(file))?;
            info!("Set {:016x} now holds {} observations", set_id, count);
        }
        ObsCommands::Dump { id } => {
            let mut out = io::stdout().lock();
            store.write_set_observations(parse_set_id(&id)?, &mut out)?;
        }
    }
    Ok(())
}

fn read_metadata(path: &Path) -> Result<RawMetadata> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    RawMetadata::from_reader(BufReader::new(file), None)
        .with_context(|| format!("parsing {}", path.display()))
}

fn parse_set_id(id: &str) -> Result<u64> {
    u64::from_str_radix(id.trim_start_matches("0x"), 16)
        .with_context(|| format!("invalid observation set id {id:?}"))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
