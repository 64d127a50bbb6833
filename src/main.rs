use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::info;

use mode_objects_lib::errors::{ModeError, Result};
use mode_objects_lib::field::FieldTag;
use mode_objects_lib::output::write_all;
use mode_objects_lib::{load_field, run_mode, save_label_image, FuzzyConfig};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Object-based verification of a forecast field against an observation field")]
struct Args {
    /// Forecast field (8 or 16-bit grayscale image)
    #[clap(short, long, required_unless_present = "write_config")]
    fcst: Option<PathBuf>,

    /// Observation field on the same grid
    #[clap(short = 'b', long, required_unless_present = "write_config")]
    obs: Option<PathBuf>,

    /// Path to configuration file; built-in defaults when omitted
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Path to output directory
    #[clap(short, long, default_value = "mode_output")]
    output: PathBuf,

    /// Multiplier from pixel values to field values
    #[clap(short, long, default_value_t = 1.0)]
    scale: f64,

    /// Raw pixel value treated as missing data
    #[clap(long)]
    bad_value: Option<u16>,

    /// Write a default configuration file to this path and exit
    #[clap(long)]
    write_config: Option<PathBuf>,

    /// Enable debug logging and write label images
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if let Some(path) = &args.write_config {
        FuzzyConfig::default().save_to_file(path)?;
        info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => FuzzyConfig::from_file(path)?,
        None => FuzzyConfig::default(),
    };

    // Start timing
    let start_time = Instant::now();

    let (fcst_path, obs_path) = match (&args.fcst, &args.obs) {
        (Some(f), Some(o)) => (f, o),
        _ => {
            return Err(ModeError::Config(
                "both --fcst and --obs are required".to_string(),
            ))
        }
    };
    let fcst = load_field(fcst_path, args.scale, args.bad_value)?;
    let obs = load_field(obs_path, args.scale, args.bad_value)?;

    let result = run_mode(&fcst, &obs, &config)?;

    if args.output.exists() && !args.output.is_dir() {
        return Err(ModeError::InvalidPath(args.output.clone()));
    }
    write_all(&result, &config, &args.output)?;

    if args.debug {
        let debug_dir = args.output.join("debug");
        fs::create_dir_all(&debug_dir)?;
        for tag in [FieldTag::Fcst, FieldTag::Obs] {
            save_label_image(&result.field(tag).labels, debug_dir.join(format!("{}_labels.png", tag)))?;
        }
    }

    let elapsed = start_time.elapsed();
    info!("Processing completed in {:.2} seconds", elapsed.as_secs_f64());

    Ok(())
}
