use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use phenocam::core::quality::ImageCountThresholds;
use phenocam::core::roi::Roi;
use phenocam::core::solar::SolarGeometry;
use phenocam::core::time_filter::TimeWindow;
use phenocam::io::filename::{plan_renames, AcquisitionName};
use phenocam::io::image_reader::discover_images;
use phenocam::io::station::StationTable;
use phenocam::pipeline::{copy_time_window, write_daily_composites, ErrorPolicy};
use phenocam::{PhenoCamPipeline, PipelineConfig, SnowEncoding};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "phenocam")]
#[command(version, about = "SITES PhenoCam daily GCC/RCC time series", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the per-image and daily (L3) tables of an image folder
    Process {
        /// Folder with the images; snowy images in its SnowyImage sub-folder
        #[arg(value_name = "DIR")]
        input: PathBuf,

        /// Output directory (tables go to <OUT>/CSV)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// ROI polygon vertices in pixels
        #[arg(long, value_name = "X,Y;X,Y;...")]
        roi: Option<String>,

        /// Camera id; read from the first file name when omitted
        #[arg(long, value_name = "ID")]
        station: Option<String>,

        /// Compute solar elevation and quality flags
        #[arg(long)]
        solar: bool,

        /// JSON station table replacing the built-in coordinates
        #[arg(long, value_name = "FILE")]
        stations: Option<PathBuf>,

        /// Offset of the file-name clock from UTC in hours
        #[arg(long, value_name = "HOURS", allow_hyphen_values = true)]
        utc_offset: Option<f64>,

        /// Year of the series
        #[arg(long)]
        year: Option<i32>,

        /// Use the hourly image-count thresholds (2, 4) instead of half-hourly (3, 6)
        #[arg(long)]
        hourly: bool,

        /// Only use images taken between these hours (inclusive)
        #[arg(long, value_name = "START-END")]
        hours: Option<String>,

        /// Write snow as 100/200 instead of 1/2
        #[arg(long)]
        legacy_snow: bool,

        /// Leave out the units row of the daily table
        #[arg(long)]
        no_units: bool,

        /// Stop at the first unreadable or misnamed image
        #[arg(long)]
        strict: bool,

        /// Number of parallel threads
        #[arg(short = 'j', long, value_name = "N")]
        threads: Option<usize>,
    },

    /// Copy images inside the acquisition-time window to <OUT>/<year> (L1)
    Filter {
        #[arg(value_name = "DIR")]
        input: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,

        #[arg(long, value_name = "START-END", default_value = "10-14")]
        hours: String,
    },

    /// Write daily mean RGB images and per-pixel GCC/RCC rasters (L2)
    Composite {
        #[arg(value_name = "DIR")]
        input: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,
    },

    /// Rename station-specific image names to the standard convention (L0)
    Rename {
        #[arg(value_name = "DIR")]
        input: PathBuf,

        /// Camera id to put in the new names
        #[arg(long, value_name = "ID")]
        station: Option<String>,

        /// Only print the planned renames
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Process {
            input,
            out,
            roi,
            station,
            solar,
            stations,
            utc_offset,
            year,
            hourly,
            hours,
            legacy_snow,
            no_units,
            strict,
            threads,
        } => {
            let config = ProcessArgs {
                roi,
                station,
                solar,
                stations,
                utc_offset,
                year,
                hourly,
                hours,
                legacy_snow,
                no_units,
                strict,
            };
            cmd_process(&input, out.as_deref(), config, threads)
        }
        Commands::Filter { input, out, hours } => cmd_filter(&input, &out, &hours),
        Commands::Composite { input, out } => cmd_composite(&input, &out),
        Commands::Rename {
            input,
            station,
            dry_run,
        } => cmd_rename(&input, station.as_deref(), dry_run),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

struct ProcessArgs {
    roi: Option<String>,
    station: Option<String>,
    solar: bool,
    stations: Option<PathBuf>,
    utc_offset: Option<f64>,
    year: Option<i32>,
    hourly: bool,
    hours: Option<String>,
    legacy_snow: bool,
    no_units: bool,
    strict: bool,
}

fn parse_hours(text: &str) -> Result<TimeWindow> {
    let (start, end) = text
        .split_once('-')
        .with_context(|| format!("Hours must look like START-END, got '{}'", text))?;
    let start: u32 = start.trim().parse().context("Invalid start hour")?;
    let end: u32 = end.trim().parse().context("Invalid end hour")?;
    Ok(TimeWindow::new(start, end)?)
}

/// Camera id of the first correctly named image in `dir`
fn first_station_id(dir: &Path) -> Result<String> {
    discover_images(dir)?
        .iter()
        .find_map(|source| AcquisitionName::from_path(&source.path).ok())
        .map(|name| name.station_id)
        .with_context(|| format!("No correctly named images in {}", dir.display()))
}

fn solar_geometry(args: &ProcessArgs, dir: &Path) -> Result<SolarGeometry> {
    let table = match &args.stations {
        Some(path) => StationTable::from_json_file(path)
            .with_context(|| format!("Failed to load station table {}", path.display()))?,
        None => StationTable::builtin(),
    };
    let station_id = match &args.station {
        Some(id) => id.clone(),
        None => first_station_id(dir)?,
    };
    let geometry = table.geometry(&station_id)?;
    Ok(match args.utc_offset {
        Some(offset) => SolarGeometry::new(geometry.latitude, geometry.longitude, offset)?,
        None => geometry,
    })
}

fn cmd_process(input: &Path, out: Option<&Path>, args: ProcessArgs, threads: Option<usize>) -> Result<()> {
    if let Some(n) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let roi = args
        .roi
        .as_deref()
        .map(Roi::parse)
        .transpose()
        .context("Invalid ROI")?;
    let solar = if args.solar {
        Some(solar_geometry(&args, input)?)
    } else {
        None
    };
    let time_window = args.hours.as_deref().map(parse_hours).transpose()?;

    let config = PipelineConfig {
        roi,
        snow_encoding: if args.legacy_snow {
            SnowEncoding::Legacy
        } else {
            SnowEncoding::Level3
        },
        solar,
        thresholds: if args.hourly {
            ImageCountThresholds::hourly()
        } else {
            ImageCountThresholds::half_hourly()
        },
        time_window,
        error_policy: if args.strict {
            ErrorPolicy::Abort
        } else {
            ErrorPolicy::Skip
        },
        parallel: true,
        include_units_row: !args.no_units,
        year: args.year,
        station_id: args.station.clone(),
    };

    let pipeline = PhenoCamPipeline::new(config)?;
    let output = pipeline
        .run(input)
        .with_context(|| format!("Processing {} failed", input.display()))?;

    let out_dir = out.unwrap_or(input);
    let (images_path, daily_path) = pipeline
        .write_outputs(&output, out_dir)
        .with_context(|| format!("Failed to write tables to {}", out_dir.display()))?;

    println!("Images used:   {}", output.images.len());
    println!("Images skipped: {}", output.skipped.len());
    println!("Image table:   {}", images_path.display());
    println!("Daily table:   {}", daily_path.display());
    Ok(())
}

fn cmd_filter(input: &Path, out: &Path, hours: &str) -> Result<()> {
    let window = parse_hours(hours)?;
    let copied = copy_time_window(input, out, &window)
        .with_context(|| format!("Filtering {} failed", input.display()))?;
    println!("Copied {} images taken {}", copied, window);
    Ok(())
}

fn cmd_composite(input: &Path, out: &Path) -> Result<()> {
    let days = write_daily_composites(input, out)
        .with_context(|| format!("Building composites from {} failed", input.display()))?;
    println!("Wrote composites for {} days to {}", days, out.display());
    Ok(())
}

fn cmd_rename(input: &Path, station: Option<&str>, dry_run: bool) -> Result<()> {
    if !input.is_dir() {
        bail!("{} is not a directory", input.display());
    }
    let plan = plan_renames(input, station)?;
    for (from, to) in &plan {
        println!("{} -> {}", from.display(), to.display());
        if dry_run {
            continue;
        }
        if to.exists() {
            log::warn!("Not overwriting {}", to.display());
            continue;
        }
        std::fs::rename(from, to)
            .with_context(|| format!("Failed to rename {}", from.display()))?;
    }
    if dry_run {
        println!("{} files would be renamed", plan.len());
    }
    Ok(())
}
