//! The primary run configuration.
//!
//! A run configuration file is read in four blocks, strictly in order:
//!
//! ```text
//! # comments and blank lines
//! BASEMAP,0
//! REPORT=my_report
//! REPORT_FORMAT=png
//! AUTHOR=Jane Doe
//! TEMP_DIR=/scratch/cmbs/
//! CLEAN_TEMPDIR,1
//! SUMMARY_ONLY,0
//! CONFIG_DIR=./configuration/
//! ##########
//! rain,1,season              <- variable, enabled flag, interval
//! albedo,0,monthly
//! ##########                 <- a comment line closes the variable block
//! 1979-01-01
//! 2012-12-31
//! use_for_observations,0
//! ##########
//! MPI-ESM-LR,CMIP5,amip,/data/cmip5/   <- models until end of file
//! ```
//!
//! See [`RunConfig::read`] for the parser and [`writer::ConfigWriter`] for the
//! inverse direction.

mod lines;
mod reader;
pub mod tempdir;
pub mod writer;

use crate::models::ModelEntry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{PathBuf, MAIN_SEPARATOR};

/// Output format of the generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Png,
    Pdf,
}

impl ReportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ReportFormat::Png => "png",
            ReportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Run-wide settings from the header block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub basemap: bool,
    pub report: String,
    pub report_format: ReportFormat,
    pub author: String,
    /// Scratch directory for preprocessed files, ends with a separator.
    pub tempdir: PathBuf,
    /// Remove `*.nc` from `tempdir` when the run starts.
    pub cleandir: bool,
    /// Only produce the summary plots.
    pub summary: bool,
    /// Directory holding the per-variable option files; must exist.
    pub configdir: PathBuf,
}

/// Parsed primary configuration. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub options: GlobalOptions,
    /// Selected variables in file order. Duplicates are kept.
    pub variables: Vec<String>,
    /// Temporal aggregation keyword per selected variable.
    pub intervals: BTreeMap<String, String>,
    pub start_date: NaiveDate,
    pub stop_date: NaiveDate,
    /// Use the model period for the observations as well.
    pub same_time_for_obs: bool,
    pub models: Vec<ModelEntry>,
}

/// Date format of the date block.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Append a path separator unless `path` already ends with one.
pub fn with_trailing_separator(path: &str) -> PathBuf {
    if path.ends_with(MAIN_SEPARATOR) || path.ends_with('/') {
        PathBuf::from(path)
    } else {
        PathBuf::from(format!("{path}{MAIN_SEPARATOR}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_separator_is_added_once() {
        let sep = MAIN_SEPARATOR;
        assert_eq!(
            with_trailing_separator("/data/x"),
            PathBuf::from(format!("/data/x{sep}"))
        );
        assert_eq!(with_trailing_separator("/data/x/"), PathBuf::from("/data/x/"));
    }
}
