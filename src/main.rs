//! Almanac CLI
//!
//! Command-line interface for calendar-addressed series files:
//! - Create and inspect binary stores
//! - Read and write slots by calendar address
//! - Import/Export CSV

use almanac::config::{generate_default_config, Config, LoggingConfig};
use almanac::storage::{parse_dimension_list, HEADER_SIZE};
use almanac::{BinaryStore, CsvCodec, DimensionAddress, Odometer, OpenMode, SeriesMetadata};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "almanac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Calendar-addressed binary time-series store")]
#[command(long_about = "Almanac stores numeric series addressed by year, month or week, day and hour\nin dense binary files, and converts them to and from CSV.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a zero-filled binary store
    Create {
        /// Path of the new binary file
        path: PathBuf,
        /// Dimensions, coarsest first (e.g. year,month,day,hour)
        #[arg(short, long, conflicts_with = "metadata")]
        dimensions: Option<String>,
        /// First year covered
        #[arg(short, long, conflicts_with = "metadata")]
        start_year: Option<i32>,
        /// Number of consecutive years
        #[arg(short = 'n', long, default_value = "1", conflicts_with = "metadata")]
        years: u32,
        /// Unit label stored with the series (e.g. MWh)
        #[arg(short, long, conflicts_with = "metadata")]
        unit: Option<String>,
        /// Read the series layout from a TOML file instead
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },

    /// Show the layout of a binary store
    Info {
        path: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Read slots starting at an address
    Read {
        path: PathBuf,
        /// Address such as year=2024,month=2,day=29,hour=0
        address: String,
        /// Number of consecutive slots
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// Write consecutive slots starting at an address
    #[command(allow_negative_numbers = true)]
    Write {
        path: PathBuf,
        /// Address such as year=2024,month=2,day=29,hour=0
        address: String,
        /// Values, in canonical order
        #[arg(required = true)]
        values: Vec<f64>,
    },

    /// Import a CSV file into a binary store
    ///
    /// An existing target is opened; otherwise it is created from --metadata
    /// or from the TOML sidecar next to the CSV.
    Import {
        /// Source CSV file
        csv: PathBuf,
        /// Target binary file
        path: PathBuf,
        /// Create the target from this TOML layout
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },

    /// Export a binary store to CSV
    Export {
        /// Source binary file
        path: PathBuf,
        /// Target CSV file
        csv: PathBuf,
        /// Sum values into coarser buckets
        #[arg(short, long)]
        aggregate: bool,
        /// Dimensions kept when aggregating (implies --aggregate)
        #[arg(long)]
        to: Option<String>,
        /// Write coordinates as one ISO date/datetime column
        #[arg(long)]
        datetime: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging is not up yet, so config problems fail the command instead of warning
    let config_path = cli.config.clone().or_else(Config::default_path);
    let config = match &config_path {
        Some(path) => Config::load_with_env(path)?,
        None => Config::from_env()?,
    };
    init_logging(&config.logging)?;
    tracing::debug!("Almanac v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::debug!("Using default config with environment overrides"),
    }

    match cli.command {
        Commands::Create {
            path,
            dimensions,
            start_year,
            years,
            unit,
            metadata,
        } => {
            let metadata = match metadata {
                Some(file) => load_metadata(&file)?,
                None => {
                    let Some(dimensions) = dimensions else {
                        bail!("--dimensions is required unless --metadata is given");
                    };
                    let Some(start_year) = start_year else {
                        bail!("--start-year is required unless --metadata is given");
                    };
                    let metadata =
                        SeriesMetadata::new(parse_dimension_list(&dimensions)?, start_year, years)?;
                    match unit {
                        Some(unit) => metadata.with_unit(unit)?,
                        None => metadata,
                    }
                }
            };

            let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&metadata))?
                .sync_on_close(config.store.sync_on_close);
            store.close()?;
            println!("Created {:?}: {} ({} slots)", path, metadata, metadata.total_slots());
        }

        Commands::Info { path, format } => {
            let store = BinaryStore::open(&path, OpenMode::Read, None)?;
            let metadata = store.metadata();
            let file_size = std::fs::metadata(&path)?.len();

            match format {
                OutputFormat::Table => {
                    println!("File:        {}", path.display());
                    println!("Dimensions:  {}", metadata.dimension_names().join(", "));
                    println!(
                        "Years:       {}-{} ({})",
                        metadata.start_year(),
                        metadata.last_year(),
                        metadata.year_count()
                    );
                    println!("Slots:       {}", metadata.total_slots());
                    println!("Value width: {} bytes", metadata.value_width());
                    if !metadata.unit().is_empty() {
                        println!("Unit:        {}", metadata.unit());
                    }
                    println!("Version:     {}", metadata.version());
                    println!("File size:   {} bytes", file_size);
                }
                OutputFormat::Json => {
                    let info = serde_json::json!({
                        "path": path,
                        "metadata": metadata,
                        "total_slots": metadata.total_slots(),
                        "header_size": HEADER_SIZE,
                        "file_size": file_size,
                    });
                    println!("{}", serde_json::to_string_pretty(&info)?);
                }
            }
        }

        Commands::Read {
            path,
            address,
            count,
        } => {
            let mut store = BinaryStore::open(&path, OpenMode::Read, None)?;
            let address = DimensionAddress::parse(&address)?;
            let values = store.read_run(&address, count)?;

            let metadata = store.metadata().clone();
            for (addr, value) in Odometer::starting_at(&metadata, address)?.zip(values) {
                println!("{}\t{}", addr, value);
            }
        }

        Commands::Write {
            path,
            address,
            values,
        } => {
            let mut store = BinaryStore::open(&path, OpenMode::ReadWrite, None)?
                .sync_on_close(config.store.sync_on_close);
            let address = DimensionAddress::parse(&address)?;
            store.write(&address, &values)?;
            store.close()?;
            println!("Wrote {} value(s) at {}", values.len(), address);
        }

        Commands::Import {
            csv,
            path,
            metadata,
        } => {
            let codec = CsvCodec::from_config(&config.csv)?;
            let (store, rows) = match metadata {
                Some(file) => {
                    let metadata = load_metadata(&file)?;
                    let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&metadata))?;
                    let rows = codec.csv_to_bin(&csv, &mut store)?;
                    (store, rows)
                }
                None if path.exists() => {
                    let mut store = BinaryStore::open(&path, OpenMode::ReadWrite, None)?;
                    let rows = codec.csv_to_bin(&csv, &mut store)?;
                    (store, rows)
                }
                None => codec.csv_to_new_bin(&csv, &path)?,
            };
            store.sync_on_close(config.store.sync_on_close).close()?;
            println!("Imported {} rows into {:?}", rows, path);
        }

        Commands::Export {
            path,
            csv,
            aggregate,
            to,
            datetime,
        } => {
            let mut codec = CsvCodec::from_config(&config.csv)?;
            if datetime {
                codec = codec.with_datetime_column(true);
            }
            if let Some(target) = &to {
                codec = codec.with_target(parse_dimension_list(target)?);
            }

            let mut store = BinaryStore::open(&path, OpenMode::Read, None)?;
            let rows = codec.bin_to_csv(&mut store, &csv, aggregate || to.is_some())?;
            println!("Exported {} rows to {:?}", rows, csv);
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn load_metadata(path: &Path) -> anyhow::Result<SeriesMetadata> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata file {:?}", path))?;
    Ok(SeriesMetadata::from_toml(&content)?)
}

/// Install the global subscriber; logs go to stderr unless a file is configured
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("almanac={}", config.level)));

    let writer = match &config.file {
        Some(file) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .with_context(|| format!("Failed to open log file {:?}", file))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer = match config.format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()?;
    Ok(())
}
