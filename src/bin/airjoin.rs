use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use airjoin::etl::{run_batch, CsvSink, RunReport, SchemaCatalog, WarehouseSink};
use airjoin::vendor::JsonFileSource;
use airjoin::{MissingPositionPolicy, PipelineConfig};

#[derive(Parser)]
#[command(name = "airjoin")]
#[command(about = "Join mobile air-quality measurements to phone GPS fixes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge one batch of vendor payloads into a warehouse file
    Merge {
        /// Measures payload (JSON)
        #[arg(long)]
        measurements: PathBuf,

        /// Positions payload (JSON)
        #[arg(long)]
        positions: PathBuf,

        /// Output file path
        #[arg(long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Parquet)]
        format: OutputFormat,

        /// Pipeline config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding table schema files
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        /// Target table
        #[arg(long)]
        table: Option<String>,

        /// null-fill, drop or fail-fast
        #[arg(long)]
        missing_position: Option<MissingPositionPolicy>,

        /// Provenance tag for every row
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Print the resolved column list of a table
    Schema {
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        #[arg(long)]
        table: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Parquet,
    Csv,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            measurements,
            positions,
            output,
            format,
            config,
            schema_dir,
            table,
            missing_position,
            tenant,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = schema_dir {
                config.schema_dir = dir;
            }
            if let Some(table) = table {
                config.table = table;
            }
            if let Some(policy) = missing_position {
                config.missing_position = policy;
            }
            if let Some(tenant) = tenant {
                config.tenant = tenant;
            }
            config.validate()?;

            info!("Measurements: {}", measurements.display());
            info!("Positions: {}", positions.display());
            info!("Output: {} ({:?})", output.display(), format);

            let mut source = JsonFileSource::new(measurements, positions);
            let catalog = config.catalog();
            let mut sink = open_sink(format, &output, config.batch_size)?;
            let report = run_batch(&config, &mut source, &catalog, &mut sink)?;
            print_summary(&report);
        }
        Commands::Schema {
            schema_dir,
            table,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = schema_dir {
                config.schema_dir = dir;
            }
            if let Some(table) = table {
                config.table = table;
            }
            let schema = config.catalog().resolve(&config.table)?;
            for column in schema.columns() {
                let mode = if column.nullable { "NULLABLE" } else { "REQUIRED" };
                println!("{}\t{:?}\t{}", column.name, column.kind, mode);
            }
        }
    }

    Ok(())
}

/// Defaults, then the config file, then `AIRJOIN_*` variables.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn open_sink(
    format: OutputFormat,
    output: &Path,
    batch_size: usize,
) -> Result<Box<dyn WarehouseSink>> {
    match format {
        // Both sinks create `output` on first write, so a failed batch
        // leaves no empty file behind.
        OutputFormat::Csv => Ok(Box::new(CsvSink::create(output))),
        #[cfg(feature = "parquet")]
        OutputFormat::Parquet => Ok(Box::new(airjoin::etl::ParquetSink::create(
            output, batch_size,
        ))),
        #[cfg(not(feature = "parquet"))]
        OutputFormat::Parquet => {
            let _ = batch_size;
            anyhow::bail!("built without the parquet feature")
        }
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "merged={} errored={} skipped={}",
        report.stats.merged, report.stats.errored, report.stats.skipped
    );
    if report.stats.rejected_positions > 0 {
        println!("rejected_positions={}", report.stats.rejected_positions);
    }
    println!("rows_written={}", report.rows_written);
    for skipped in &report.skipped {
        println!(
            "skipped {}/{} at {}: {}",
            skipped.measurement.organization,
            skipped.measurement.device,
            skipped.measurement.timestamp,
            skipped.detail
        );
    }
}
