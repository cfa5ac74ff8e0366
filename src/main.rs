//! Command line front end for the benchmarking configuration.
//!
//! # Usage
//!
//! ```bash
//! # write a fresh configuration file
//! cmbs init run/benchmark.cfg --temp-dir /scratch/cmbs \
//!   --start 1979-01-01 --stop 2000-12-31 --var rain --var sis \
//!   --model MPI-ESM-LR,CMIP5,amip,/data/cmip5
//!
//! # read it back and validate all plot option files
//! cmbs check run/benchmark.cfg --regions run/regions
//! ```
//!
//! Set `RUST_LOG` to change the log level, e.g. `RUST_LOG=cmbs_core=debug`.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cmbs_core::config::{with_trailing_separator, RunConfig, DATE_FORMAT};
use cmbs_core::expression::StandardContext;
use cmbs_core::models::{ModelEntry, ModelType};
use cmbs_core::plot_options::PlotOptions;
use cmbs_core::regions::RegionCatalog;
use cmbs_core::routines::{AnalysisRegistry, ANALYSIS_ROUTINES_FILE};
use cmbs_core::{CmbsResult, ConfigTemplate, ConfigWriter};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cmbs")]
#[command(about = "Read, validate and generate climate model benchmarking configurations")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a run configuration and validate the option files of its variables
    Check {
        /// Run configuration file
        config: PathBuf,

        /// Directory with region definition files (*.reg)
        #[arg(long)]
        regions: Option<PathBuf>,

        /// Print the parsed configuration as TOML
        #[arg(long)]
        dump: bool,
    },
    /// Write a new run configuration file
    Init {
        /// Output file
        output: PathBuf,

        /// Directory for preprocessed files
        #[arg(long)]
        temp_dir: PathBuf,

        /// First day of the analysis period (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        /// Last day of the analysis period (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        stop: NaiveDate,

        /// Variable to analyse, may be repeated
        #[arg(long = "var")]
        variables: Vec<String>,

        /// Temporal aggregation of all selected variables
        #[arg(long, default_value = "monthly")]
        interval: String,

        /// Model as ID,TYPE,EXPERIMENT,PATH, may be repeated
        #[arg(long = "model", value_parser = parse_model)]
        models: Vec<ModelEntry>,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| format!("{s}: {e}"))
}

fn parse_model(s: &str) -> Result<ModelEntry, String> {
    let fields: Vec<&str> = s.split(',').map(str::trim).collect();
    let [id, model_type, experiment, path] = fields[..] else {
        return Err(format!(
            "expected ID,TYPE,EXPERIMENT,PATH, found {} field(s)",
            fields.len()
        ));
    };
    Ok(ModelEntry {
        id: id.to_string(),
        model_type: model_type.parse::<ModelType>().map_err(|e| e.to_string())?,
        experiment: experiment.to_string(),
        data_dir: with_trailing_separator(path),
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cmbs=info,cmbs_core=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn check(config: PathBuf, regions: Option<PathBuf>, dump: bool) -> CmbsResult<()> {
    let cfg = RunConfig::from_path(&config)?;

    let registry = if cfg.options.configdir.join(ANALYSIS_ROUTINES_FILE).is_file() {
        AnalysisRegistry::from_config_dir(&cfg.options.configdir)?
    } else {
        warn!(
            configdir = %cfg.options.configdir.display(),
            "No {ANALYSIS_ROUTINES_FILE}, using the built-in routines"
        );
        AnalysisRegistry::standard()
    };
    let routines = registry.resolve(&cfg.variables)?;

    let ctx = StandardContext::from_env(&cfg.options.tempdir);
    let options = PlotOptions::read(&cfg, &ctx)?;

    let catalog = regions.map(|dir| RegionCatalog::read(&dir)).transpose()?;

    println!("Configuration: {}", config.display());
    println!(
        "Period: {} to {}{}",
        cfg.start_date,
        cfg.stop_date,
        if cfg.same_time_for_obs {
            " (also used for observations)"
        } else {
            ""
        }
    );
    for (variable, routine) in &routines {
        let datasets = options
            .get(variable)
            .map(|set| set.datasets().map(|(name, _)| name).collect::<Vec<_>>())
            .unwrap_or_default();
        println!(
            "  {variable:<24} {:<8} {:<32} {}",
            cfg.intervals.get(variable).map(String::as_str).unwrap_or(""),
            routine.routine_name(),
            datasets.join(", ")
        );
    }
    for model in &cfg.models {
        println!(
            "  model {} ({}, {}) {}",
            model.id,
            model.model_type,
            model.experiment,
            model.data_dir.display()
        );
    }
    if let Some(catalog) = &catalog {
        println!("Regions: {}", catalog.len());
    }

    if dump {
        match toml::to_string(&cfg) {
            Ok(text) => println!("\n{text}"),
            Err(e) => warn!("Cannot serialize configuration: {e}"),
        }
    }

    info!("Configuration is valid");
    Ok(())
}

fn init(template: ConfigTemplate, output: PathBuf) -> CmbsResult<()> {
    let writer = ConfigWriter::new(&output, "cmbs init")?;
    writer.save(&template)?;
    println!("Configuration written to {}", writer.filename().display());
    Ok(())
}

fn main() {
    init_logging();
    let args = Args::parse();

    let result = match args.command {
        Command::Check {
            config,
            regions,
            dump,
        } => check(config, regions, dump),
        Command::Init {
            output,
            temp_dir,
            start,
            stop,
            variables,
            interval,
            models,
        } => {
            let variables: Vec<&str> = variables.iter().map(String::as_str).collect();
            let temp_dir = with_trailing_separator(&temp_dir.to_string_lossy());
            let template = ConfigTemplate::new(temp_dir, start, stop, models)
                .with_variables(&variables, &interval);
            init(template, output)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
