//! Preprocessing through the Climate Data Operators command line tool.
//!
//! Each [`PreprocessingSpec`] maps to one `cdo` invocation writing a single
//! output file into the run's temporary directory. Output names are derived
//! from the input name and the operator, so a repeated request reuses the
//! file produced earlier unless it is forced.

use crate::errors::{CmbsError, CmbsResult};
use crate::plot_options::Interpolation;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// A single CDO operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CdoOperator {
    /// Select the period between two dates.
    SelDate { start: NaiveDate, stop: NaiveDate },
    SeasMean,
    /// Seasonal mean of December, January and February only.
    SeasMeanDjf,
    /// Grid cell area in m^2.
    GridArea,
    /// Divide by the field in another file.
    Div(PathBuf),
    /// Select months, 1 = January.
    SelMon(Vec<u32>),
    Remap {
        method: Interpolation,
        target_grid: String,
    },
    YearMean,
    YSeasMean,
    YSeasStd,
}

const MONTH_LETTERS: [char; 12] = ['J', 'F', 'M', 'A', 'M', 'J', 'J', 'A', 'S', 'O', 'N', 'D'];

impl CdoOperator {
    /// Operator chain as passed to `cdo`.
    pub fn arguments(&self) -> Vec<String> {
        match self {
            CdoOperator::SelDate { start, stop } => vec![format!(
                "seldate,{},{}",
                start.format("%Y-%m-%d"),
                stop.format("%Y-%m-%d")
            )],
            CdoOperator::SeasMean => vec!["seasmean".to_string()],
            CdoOperator::SeasMeanDjf => vec!["seasmean".to_string(), "-selseas,djf".to_string()],
            CdoOperator::GridArea => vec!["gridarea".to_string()],
            CdoOperator::Div(_) => vec!["div".to_string()],
            CdoOperator::SelMon(months) => {
                let months = months
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                vec![format!("selmon,{months}")]
            }
            CdoOperator::Remap {
                method,
                target_grid,
            } => vec![format!("{},{}", method.cdo_method(), target_grid)],
            CdoOperator::YearMean => vec!["yearmean".to_string()],
            CdoOperator::YSeasMean => vec!["yseasmean".to_string()],
            CdoOperator::YSeasStd => vec!["yseasstd".to_string()],
        }
    }

    /// Suffix appended to the input file stem for the output name.
    pub fn output_suffix(&self) -> String {
        match self {
            CdoOperator::SelDate { start, stop } => {
                format!("{}_{}", start.format("%Y-%m-%d"), stop.format("%Y-%m-%d"))
            }
            CdoOperator::SeasMean => "seasmean".to_string(),
            CdoOperator::SeasMeanDjf => "seasmean_djf".to_string(),
            CdoOperator::GridArea => "cell_area".to_string(),
            CdoOperator::Div(other) => {
                let stem = other
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("div_{stem}")
            }
            CdoOperator::SelMon(months) => (1..=12u32)
                .filter(|m| months.contains(m))
                .map(|m| MONTH_LETTERS[(m - 1) as usize])
                .collect(),
            CdoOperator::Remap { method, .. } => method.cdo_method().to_string(),
            CdoOperator::YearMean => "yearmean".to_string(),
            CdoOperator::YSeasMean => "yseasmean".to_string(),
            CdoOperator::YSeasStd => "yseasstd".to_string(),
        }
    }

    fn extra_inputs(&self) -> Vec<&Path> {
        match self {
            CdoOperator::Div(other) => vec![other.as_path()],
            _ => vec![],
        }
    }
}

/// Request for one preprocessing step.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingSpec {
    pub input: PathBuf,
    pub operator: CdoOperator,
    /// Run even if the output already exists.
    pub force: bool,
    /// Explicit output path instead of the derived name.
    pub output: Option<PathBuf>,
}

impl PreprocessingSpec {
    pub fn new(input: impl Into<PathBuf>, operator: CdoOperator) -> Self {
        Self {
            input: input.into(),
            operator,
            force: false,
            output: None,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Executes preprocessing steps and returns the output file.
///
/// Calls block until the step has finished.
pub trait CommandRunner {
    fn run(&self, spec: &PreprocessingSpec) -> CmbsResult<PathBuf>;
}

/// [`CommandRunner`] invoking the `cdo` executable.
#[derive(Debug, Clone)]
pub struct CdoRunner {
    tempdir: PathBuf,
    executable: String,
    options: Vec<String>,
    force: bool,
}

impl CdoRunner {
    /// Runner writing its results into `tempdir`.
    pub fn new(tempdir: impl Into<PathBuf>) -> Self {
        Self {
            tempdir: tempdir.into(),
            executable: "cdo".to_string(),
            options: vec!["-f".to_string(), "nc".to_string()],
            force: false,
        }
    }

    pub fn with_executable(mut self, executable: &str) -> Self {
        self.executable = executable.to_string();
        self
    }

    /// Recompute every output regardless of existing files.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn tempdir(&self) -> &Path {
        &self.tempdir
    }

    /// Output path for `spec` inside the temporary directory.
    pub fn output_path(&self, spec: &PreprocessingSpec) -> PathBuf {
        if let Some(output) = &spec.output {
            return output.clone();
        }
        let stem = spec
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.tempdir
            .join(format!("{stem}_{}.nc", spec.operator.output_suffix()))
    }

    /// The full command line for `spec`.
    pub fn command_line(&self, spec: &PreprocessingSpec) -> Vec<String> {
        let mut args = self.options.clone();
        args.extend(spec.operator.arguments());
        args.push(spec.input.display().to_string());
        args.extend(
            spec.operator
                .extra_inputs()
                .iter()
                .map(|p| p.display().to_string()),
        );
        args.push(self.output_path(spec).display().to_string());
        args
    }
}

impl CommandRunner for CdoRunner {
    fn run(&self, spec: &PreprocessingSpec) -> CmbsResult<PathBuf> {
        if !spec.input.exists() {
            return Err(CmbsError::NotFound {
                path: spec.input.clone(),
            });
        }
        let output = self.output_path(spec);
        if output.exists() && !(spec.force || self.force) {
            debug!(output = %output.display(), "File existing, no calculations will be performed");
            return Ok(output);
        }

        let args = self.command_line(spec);
        let printable = format!("{} {}", self.executable, args.join(" "));
        info!(command = %printable, "Running preprocessing");

        let status = Command::new(&self.executable)
            .args(&args)
            .status()
            .map_err(|e| CmbsError::Command {
                command: printable.clone(),
                message: e.to_string(),
            })?;
        if !status.success() {
            return Err(CmbsError::Command {
                command: printable,
                message: format!("exited with {status}"),
            });
        }
        Ok(output)
    }
}
