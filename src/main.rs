use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use zarr_convert::config::{Config, parse_region_spec};
use zarr_convert::logger::init_logging;
use zarr_convert::paths::PathResolver;
use zarr_convert::season::Season;
use zarr_convert::{Converter, VariablePolicy, runner, status};

#[derive(Args, Debug)]
struct PartitionArgs {
    /// JSON config file with seasons, regions, data_root, interpolate, jobs, variable_policy
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root directory containing 3.GFSFiltered<N>xInterpolation
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Season to process, e.g. 16-17 (repeatable)
    #[arg(long = "season", value_name = "SEASON")]
    seasons: Vec<Season>,

    /// Regions of a state, formatted as 'STATE=REGION[,REGION...]' (repeatable)
    #[arg(long = "region", value_name = "STATE=REGIONS")]
    regions: Vec<String>,

    /// Interpolation factor used when the inputs were produced
    #[arg(long)]
    interpolate: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Convert every partition's missing days into its Zarr store
    Convert {
        #[command(flatten)]
        partitions: PartitionArgs,

        /// Number of partitions converted in parallel
        #[arg(short, long)]
        jobs: Option<usize>,

        /// How later days whose variables differ from the first day are handled
        #[arg(long, value_enum)]
        variable_policy: Option<VariablePolicy>,
    },
    /// Report how far each partition's store has progressed
    Status {
        #[command(flatten)]
        partitions: PartitionArgs,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[derive(Parser)]
#[command(name = "zarr-convert")]
#[command(version)]
#[command(about = "Incrementally converts daily regional NetCDF files into Zarr stores")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (error, warn, info, debug, trace); defaults to RUST_LOG, then info
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {}", e);

        // Print the error chain for better context
        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {}", cause);
        }

        process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Convert {
            partitions,
            jobs,
            variable_policy,
        } => {
            let mut config = load_config(&partitions)?;
            if let Some(jobs) = jobs {
                config.jobs = jobs;
            }
            if let Some(policy) = variable_policy {
                config.variable_policy = policy;
            }
            config.validate().context("Invalid conversion settings")?;

            let converter = Converter::new(
                &config.data_root,
                config.interpolate,
                input_source()?,
                config.variable_policy,
            )
            .with_context(|| {
                format!(
                    "Failed to prepare output directory under '{}'",
                    config.data_root.display()
                )
            })?;

            let summary =
                runner::convert_local(Arc::new(converter), config.make_list(), config.jobs).await;
            if summary.failed > 0 {
                return Err(anyhow::anyhow!(
                    "{} of {} partitions failed",
                    summary.failed,
                    summary.total()
                ));
            }
            Ok(())
        }
        Command::Status {
            partitions,
            no_color,
        } => {
            let config = load_config(&partitions)?;
            config.validate().context("Invalid conversion settings")?;

            let resolver = PathResolver::new(&config.data_root, config.interpolate);
            let entries = status::collect(&resolver, &config.make_list())
                .context("Failed to read partition stores")?;
            status::StatusFormatter::new(!no_color).print(&entries);
            Ok(())
        }
    }
}

/// Merge the optional config file with command-line flags, flags winning
fn load_config(args: &PartitionArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let data_root = args
                .data_root
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Either --config or --data-root is required"))?;
            Config::new(Vec::new(), BTreeMap::new(), data_root)
        }
    };

    if let Some(root) = &args.data_root {
        config.data_root = root.clone();
    }
    if !args.seasons.is_empty() {
        config.seasons = args.seasons.clone();
    }
    if !args.regions.is_empty() {
        let mut regions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for raw in &args.regions {
            let (state, names) = parse_region_spec(raw)?;
            regions.entry(state).or_default().extend(names);
        }
        config.regions = regions;
    }
    if let Some(interpolate) = args.interpolate {
        config.interpolate = interpolate;
    }

    if !config.data_root.is_dir() {
        return Err(anyhow::anyhow!(
            "Data root '{}' does not exist or is not a directory.",
            config.data_root.display()
        ));
    }

    Ok(config)
}

#[cfg(feature = "netcdf")]
fn input_source() -> anyhow::Result<Box<dyn zarr_convert::DaySource>> {
    Ok(Box::new(zarr_convert::source::NetCdfSource::new()))
}

#[cfg(not(feature = "netcdf"))]
fn input_source() -> anyhow::Result<Box<dyn zarr_convert::DaySource>> {
    Err(anyhow::anyhow!(
        "This build cannot read NetCDF inputs. Rebuild with `--features netcdf`."
    ))
}
