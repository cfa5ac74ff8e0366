//! Generation of run configuration files.
//!
//! The output is not byte-identical to a hand-written file, but any file
//! written here is accepted by [`RunConfig::read`] as is.

use super::{GlobalOptions, ReportFormat, RunConfig, DATE_FORMAT};
use crate::errors::{CmbsError, CmbsResult};
use crate::models::ModelEntry;
use crate::routines::AnalysisRoutine;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const RULE: &str = "################################";

/// Everything needed to write a configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTemplate {
    pub basemap: bool,
    pub report: String,
    pub report_format: ReportFormat,
    pub author: String,
    pub temp_dir: PathBuf,
    pub clean_tempdir: bool,
    pub summary_only: bool,
    /// Defaults to `<output dir>/configuration/`.
    pub config_dir: Option<PathBuf>,
    /// Enabled variables, written in this order.
    pub variables: Vec<String>,
    /// Interval per variable; variables without an entry use `interval`.
    pub intervals: BTreeMap<String, String>,
    pub interval: String,
    pub start_date: NaiveDate,
    pub stop_date: NaiveDate,
    pub same_time_for_obs: bool,
    pub models: Vec<ModelEntry>,
}

impl ConfigTemplate {
    pub fn new(
        temp_dir: impl Into<PathBuf>,
        start_date: NaiveDate,
        stop_date: NaiveDate,
        models: Vec<ModelEntry>,
    ) -> Self {
        Self {
            basemap: false,
            report: "reportname_here".to_string(),
            report_format: ReportFormat::Png,
            author: "TheAuthorName".to_string(),
            temp_dir: temp_dir.into(),
            clean_tempdir: false,
            summary_only: false,
            config_dir: None,
            variables: Vec::new(),
            intervals: BTreeMap::new(),
            interval: "monthly".to_string(),
            start_date,
            stop_date,
            same_time_for_obs: false,
            models,
        }
    }

    /// Enable `variables`, all with the same interval.
    pub fn with_variables(mut self, variables: &[&str], interval: &str) -> Self {
        self.variables = variables.iter().map(|v| v.to_string()).collect();
        self.interval = interval.to_string();
        self
    }

    /// Template reproducing the structural content of `cfg`.
    pub fn from_run_config(cfg: &RunConfig) -> Self {
        let GlobalOptions {
            basemap,
            report,
            report_format,
            author,
            tempdir,
            cleandir,
            summary,
            configdir,
        } = cfg.options.clone();
        Self {
            basemap,
            report,
            report_format,
            author,
            temp_dir: tempdir,
            clean_tempdir: cleandir,
            summary_only: summary,
            config_dir: Some(configdir),
            variables: cfg.variables.clone(),
            intervals: cfg.intervals.clone(),
            interval: "monthly".to_string(),
            start_date: cfg.start_date,
            stop_date: cfg.stop_date,
            same_time_for_obs: cfg.same_time_for_obs,
            models: cfg.models.clone(),
        }
    }

    fn interval_of(&self, variable: &str) -> &str {
        self.intervals
            .get(variable)
            .map(String::as_str)
            .unwrap_or(&self.interval)
    }

    fn check(&self) -> CmbsResult<()> {
        if self.models.is_empty() {
            return Err(invalid("models", "", "at least one model"));
        }
        check_setting("report", &self.report)?;
        check_setting("author", &self.author)?;
        check_required("temp_dir", &self.temp_dir.to_string_lossy())?;
        check_setting("temp_dir", &self.temp_dir.to_string_lossy())?;
        if let Some(config_dir) = &self.config_dir {
            check_required("config_dir", &config_dir.to_string_lossy())?;
            check_setting("config_dir", &config_dir.to_string_lossy())?;
        }
        check_field("interval", &self.interval)?;
        check_required("interval", &self.interval)?;
        for v in &self.variables {
            check_field("variable", v)?;
            check_required("variable", v)?;
            let interval = self.interval_of(v);
            check_field("interval", interval)?;
            check_required("interval", interval)?;
        }
        for m in &self.models {
            check_field("model id", &m.id)?;
            check_required("model id", &m.id)?;
            check_field("experiment", &m.experiment)?;
            check_field("model path", &m.data_dir.to_string_lossy())?;
            check_required("model path", &m.data_dir.to_string_lossy())?;
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> CmbsError {
    CmbsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

/// Values must survive the comma separated, line oriented format.
fn check_field(key: &str, value: &str) -> CmbsResult<()> {
    if value.contains([',', '\n', '\r']) || value.trim_start().starts_with('#') {
        return Err(invalid(key, value, "no commas, line breaks or leading '#'"));
    }
    Ok(())
}

/// `KEY=value` header lines only need to stay on one line.
fn check_setting(key: &str, value: &str) -> CmbsResult<()> {
    if value.contains(['\n', '\r']) {
        return Err(invalid(key, value, "no line breaks"));
    }
    Ok(())
}

/// The reader trims fields, so blank values count as missing.
fn check_required(key: &str, value: &str) -> CmbsResult<()> {
    if value.trim().is_empty() {
        return Err(invalid(key, value, "a non-blank value"));
    }
    Ok(())
}

/// Writes a configuration file line by line.
pub struct ConfigWriter {
    filename: PathBuf,
    output_dir: PathBuf,
    generator: String,
}

impl ConfigWriter {
    /// Prepare writing to `filename`, replacing any existing file.
    pub fn new(filename: &Path, generator: &str) -> CmbsResult<Self> {
        let output_dir = filename
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if filename.exists() {
            fs::remove_file(filename)?;
        }
        if !output_dir.as_os_str().is_empty() && !output_dir.exists() {
            fs::create_dir_all(&output_dir)?;
        }
        Ok(Self {
            filename: filename.to_path_buf(),
            output_dir,
            generator: generator.to_string(),
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    fn write(&self, line: &str) -> CmbsResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.filename)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn write_all(&self, lines: &[&str]) -> CmbsResult<()> {
        lines.iter().try_for_each(|l| self.write(l))
    }

    /// Write the configuration described by `template`.
    ///
    /// The configuration directory is created when missing so that the
    /// result can be read back directly.
    pub fn save(&self, template: &ConfigTemplate) -> CmbsResult<()> {
        template.check()?;

        let config_dir = template
            .config_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("configuration").join(""));
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        let generated_at = chrono::Local::now().format("%a %b %e %H:%M:%S %Y");
        self.write_all(&[
            "######################################################",
            "# AUTOMATICALLY GENERATED configuration file for cmbs",
            &format!("# generated by {}", self.generator),
            "#",
            &format!("# generated at: {generated_at}"),
            "######################################################",
        ])?;

        self.write(&format!("basemap,{}", u8::from(template.basemap)))?;
        self.write(&format!("report={}", template.report))?;
        self.write(&format!(
            "report_format={}",
            template.report_format.name().to_ascii_uppercase()
        ))?;
        self.write(&format!("author={}", template.author))?;
        self.write(&format!("temp_dir={}", template.temp_dir.display()))?;
        self.write(&format!("clean_tempdir,{}", u8::from(template.clean_tempdir)))?;
        self.write(&format!("summary_only,{}", u8::from(template.summary_only)))?;
        self.write(&format!("config_dir={}", config_dir.display()))?;

        self.write_all(&[
            RULE,
            "# Specify variables to analyze",
            "#",
            "# name, [0,1], [monthly,season]",
            "#",
            "# 'name' specifies the variable name to be analyzed",
            "# [0,1] specifies if the data shall be used",
            "# [monthly,season] specifies the temporal scale of the analysis",
            RULE,
        ])?;

        for v in &template.variables {
            self.write(&format!("{v},1,{}", template.interval_of(v)))?;
        }
        for routine in AnalysisRoutine::ALL {
            let v = routine.variable();
            if !template.variables.iter().any(|selected| selected == v) {
                self.write(&format!("{v},0,{}", template.interval))?;
            }
        }
        self.write("")?;

        self.write_all(&[
            RULE,
            "# specify period to analyze",
            "# start-time YYYY-MM-DD",
            "# stop-time  YYYY-MM-DD",
            RULE,
        ])?;
        self.write(&template.start_date.format(DATE_FORMAT).to_string())?;
        self.write(&template.stop_date.format(DATE_FORMAT).to_string())?;
        self.write(&format!(
            "use_for_observations,{}",
            u8::from(template.same_time_for_obs)
        ))?;

        self.write_all(&[
            RULE,
            "# Register models to analyze",
            "# ID,TYPE,EXPERIMENT,PATH",
            "#",
            "# ID: unique ID to specify model, for CMIP5 ID is also part of the filenames!",
            "# TYPE: CMIP5, CMIP3, JSBACH_BOT, JSBACH_RAW or JSBACH_RAW2",
            "# EXPERIMENT: an experiment identifier",
            "# PATH: directory path where data is located",
            RULE,
            "",
            "#--- MODELS TO ANALYZE ---",
        ])?;
        for m in &template.models {
            self.write(&format!(
                "{},{},{},{}",
                m.id,
                m.model_type,
                m.experiment,
                m.data_dir.display()
            ))?;
        }
        Ok(())
    }
}
