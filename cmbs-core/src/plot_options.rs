//! Per-variable plot and analysis options.
//!
//! Every selected variable has an option file `<configdir>/<variable>.ini`.
//! Its `[OPTIONS]` section applies to all comparisons for the variable; every
//! other section configures one observational dataset.
//!
//! Loading runs these steps once per variable, in order:
//!
//! 1. coerce every value (`start` and `stop` are parsed as dates)
//! 2. in summary-only runs, switch off the detailed plots
//! 3. when the observations share the model period, overwrite `start`/`stop`
//! 4. translate `interpolation` into the remapping operator name
//! 5. validate required keys, `cticks` ordering and `obs_file` paths
//!
//! Problems found in steps 1, 4 and 5 are logged as they are found but only
//! raised once every variable has been checked, as a single
//! [`CmbsError::Validation`]. Missing files, malformed lines and failing
//! `#...#` expressions abort immediately.

use crate::config::RunConfig;
use crate::errors::{CmbsError, CmbsResult, ValidationIssue};
use crate::expression::ExpressionContext;
use crate::sections::SectionFile;
use crate::value::{coerce, OptionMap, OptionValue};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::MAIN_SEPARATOR;
use tracing::{error, info};

/// Name of the section holding the variable-wide options.
pub const OPTIONS_SECTION: &str = "OPTIONS";

/// Keys every `[OPTIONS]` section must define.
pub const REQUIRED_GLOBAL_OPTIONS: [&str; 12] = [
    "cticks",
    "map_difference",
    "map_seasons",
    "preprocess",
    "reichler_plot",
    "gleckler_plot",
    "hovmoeller_plot",
    "regional_analysis",
    "interpolation",
    "targetgrid",
    "projection",
    "global_mean",
];

/// Keys every observational dataset section must define.
pub const REQUIRED_DATASET_OPTIONS: [&str; 4] =
    ["obs_file", "obs_var", "gleckler_position", "scale_data"];

/// Plots switched off when only the summary report is produced.
pub const SUMMARY_DISABLED_PLOTS: [&str; 5] = [
    "map_difference",
    "map_seasons",
    "reichler_plot",
    "hovmoeller_plot",
    "regional_analysis",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Remapping method used when regridding to the target grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Bilinear,
    Conservative,
    Nearest,
}

impl Interpolation {
    pub const ALL: [Interpolation; 3] = [
        Interpolation::Bilinear,
        Interpolation::Conservative,
        Interpolation::Nearest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Bilinear => "bilinear",
            Interpolation::Conservative => "conservative",
            Interpolation::Nearest => "nearest",
        }
    }

    /// Operator name of the remapping tool.
    pub fn cdo_method(&self) -> &'static str {
        match self {
            Interpolation::Bilinear => "remapbil",
            Interpolation::Conservative => "remapcon",
            Interpolation::Nearest => "remapnn",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|i| i.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn from_cdo_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.cdo_method() == method)
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}

/// Options of one variable after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableOptionSet {
    pub variable: String,
    /// Content of the `[OPTIONS]` section.
    pub global_options: OptionMap,
    /// One entry per observational dataset section.
    pub dataset_sections: BTreeMap<String, OptionMap>,
    has_options_section: bool,
}

impl VariableOptionSet {
    /// Coerce the raw sections of an option file.
    fn from_sections(
        variable: &str,
        file: SectionFile,
        ctx: &dyn ExpressionContext,
        issues: &mut Vec<ValidationIssue>,
    ) -> CmbsResult<Self> {
        let mut global_options = OptionMap::new();
        let mut dataset_sections = BTreeMap::new();
        let mut has_options_section = false;

        for (name, raw) in file.into_sections() {
            let is_options = name.eq_ignore_ascii_case(OPTIONS_SECTION);
            let section_label = if is_options { OPTIONS_SECTION } else { name.as_str() };

            let mut map = OptionMap::new();
            for (key, value) in raw {
                let coerced = if key == "start" || key == "stop" {
                    if value.trim().is_empty() {
                        None
                    } else {
                        match parse_date(&value) {
                            Some(date) => Some(OptionValue::Date(date)),
                            None => {
                                record(
                                    issues,
                                    ValidationIssue::new(
                                        variable,
                                        Some(section_label),
                                        format!("invalid date '{value}' for {key}"),
                                    ),
                                );
                                Some(OptionValue::Text(value.trim().to_string()))
                            }
                        }
                    }
                } else {
                    coerce(&value, ctx)?
                };
                map.insert(key, coerced);
            }

            if is_options {
                has_options_section = true;
                global_options.extend(map);
            } else {
                dataset_sections.insert(name, map);
            }
        }

        Ok(Self {
            variable: variable.to_string(),
            global_options,
            dataset_sections,
            has_options_section,
        })
    }

    pub fn option(&self, key: &str) -> Option<&OptionValue> {
        self.global_options.get(key).and_then(Option::as_ref)
    }

    /// Boolean option, `false` when absent or not a boolean.
    pub fn flag(&self, key: &str) -> bool {
        self.option(key).and_then(OptionValue::as_bool).unwrap_or(false)
    }

    /// Remapping method, available once loading has finished.
    pub fn interpolation(&self) -> Option<Interpolation> {
        self.option("interpolation")
            .and_then(OptionValue::as_str)
            .and_then(Interpolation::from_cdo_method)
    }

    pub fn dataset(&self, name: &str) -> Option<&OptionMap> {
        self.dataset_sections.get(name)
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &OptionMap)> {
        self.dataset_sections.iter().map(|(n, m)| (n.as_str(), m))
    }

    fn disable_detailed_plots(&mut self) {
        for key in SUMMARY_DISABLED_PLOTS {
            if let Some(value) = self.global_options.get_mut(key) {
                info!(
                    variable = %self.variable,
                    option = key,
                    "Setting option to false because only the summary is requested"
                );
                *value = Some(OptionValue::Bool(false));
            }
        }
    }

    fn set_period(&mut self, start: NaiveDate, stop: NaiveDate) {
        self.global_options
            .insert("start".to_string(), Some(OptionValue::Date(start)));
        self.global_options
            .insert("stop".to_string(), Some(OptionValue::Date(stop)));
    }

    fn map_interpolation(&mut self, issues: &mut Vec<ValidationIssue>) {
        let Some(value) = self.global_options.get_mut("interpolation") else {
            return;
        };
        let method = value
            .as_ref()
            .and_then(OptionValue::as_str)
            .and_then(Interpolation::from_name);
        match method {
            Some(method) => *value = Some(OptionValue::Text(method.cdo_method().to_string())),
            None => {
                let found = value.as_ref().map(|v| v.to_string()).unwrap_or_default();
                record(
                    issues,
                    ValidationIssue::new(
                        &self.variable,
                        Some(OPTIONS_SECTION),
                        format!(
                            "invalid interpolation method '{found}', expected bilinear, conservative or nearest"
                        ),
                    ),
                );
            }
        }
    }

    fn validate(&mut self, issues: &mut Vec<ValidationIssue>) {
        let variable = self.variable.clone();

        if !self.has_options_section {
            record(
                issues,
                ValidationIssue::new(&variable, None, "missing OPTIONS section"),
            );
        } else {
            for key in REQUIRED_GLOBAL_OPTIONS {
                if !self.global_options.contains_key(key) {
                    record(
                        issues,
                        ValidationIssue::new(
                            &variable,
                            Some(OPTIONS_SECTION),
                            format!("missing global option: {key}"),
                        ),
                    );
                }
            }
            if let Some(message) = check_cticks(self.global_options.get("cticks")) {
                record(
                    issues,
                    ValidationIssue::new(&variable, Some(OPTIONS_SECTION), message),
                );
            }
        }

        for (name, section) in self.dataset_sections.iter_mut() {
            for key in REQUIRED_DATASET_OPTIONS {
                if !section.contains_key(key) {
                    record(
                        issues,
                        ValidationIssue::new(
                            &variable,
                            Some(name.as_str()),
                            format!("missing local option: {key}"),
                        ),
                    );
                }
            }
            if let Some(obs_file) = section.get_mut("obs_file") {
                match obs_file {
                    Some(OptionValue::Text(path)) => *path = normalize_obs_file(path),
                    _ => record(
                        issues,
                        ValidationIssue::new(
                            &variable,
                            Some(name.as_str()),
                            "obs_file must be a file or directory name",
                        ),
                    ),
                }
            }
        }
    }
}

/// `cticks` must be a numeric, non-decreasing list.
///
/// `None` means the key is absent, which the required-key check reports.
fn check_cticks(value: Option<&Option<OptionValue>>) -> Option<String> {
    let Some(items) = value?.as_ref().and_then(OptionValue::as_list) else {
        return Some("cticks option needs to be a list".to_string());
    };
    let mut ticks = Vec::with_capacity(items.len());
    for item in items {
        match item.as_number() {
            Some(x) => ticks.push(x),
            None => return Some(format!("cticks must be numeric, found '{item}'")),
        }
    }
    if ticks.windows(2).any(|w| w[1] < w[0]) {
        return Some("cticks are not in increasing order".to_string());
    }
    None
}

/// Observation paths name a NetCDF file or a directory.
fn normalize_obs_file(path: &str) -> String {
    let path = path.trim_end();
    if path.ends_with(MAIN_SEPARATOR)
        || path.ends_with('/')
        || path.ends_with(".nc")
        || path.ends_with(".nc4")
    {
        path.to_string()
    } else {
        format!("{path}{MAIN_SEPARATOR}")
    }
}

fn record(issues: &mut Vec<ValidationIssue>, issue: ValidationIssue) {
    error!("{issue}");
    issues.push(issue);
}

/// Loaded options for every selected variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotOptions {
    variables: Vec<VariableOptionSet>,
}

impl PlotOptions {
    /// Load, transform and validate the option files of all variables in `cfg`.
    pub fn read(cfg: &RunConfig, ctx: &dyn ExpressionContext) -> CmbsResult<Self> {
        let mut issues = Vec::new();
        let mut variables: Vec<VariableOptionSet> = Vec::new();

        for variable in &cfg.variables {
            if variables.iter().any(|v| &v.variable == variable) {
                continue;
            }
            let path = cfg.options.configdir.join(format!("{variable}.ini"));
            if !path.is_file() {
                return Err(CmbsError::Resource {
                    path,
                    message: "Plot option file not existing".to_string(),
                });
            }
            info!(variable = %variable, file = %path.display(), "Reading configuration");
            let file = SectionFile::from_path(&path)?;
            let set = VariableOptionSet::from_sections(variable, file, ctx, &mut issues)?;
            info!(
                variable = %variable,
                observations = ?set.dataset_sections.keys().collect::<Vec<_>>(),
                "Observations for this variable"
            );
            variables.push(set);
        }

        let mut options = Self { variables };
        options.finish(cfg, issues)?;
        Ok(options)
    }

    /// Steps 2 to 5 of the loading pipeline.
    fn finish(&mut self, cfg: &RunConfig, mut issues: Vec<ValidationIssue>) -> CmbsResult<()> {
        if cfg.options.summary {
            self.variables
                .iter_mut()
                .for_each(VariableOptionSet::disable_detailed_plots);
        }
        if cfg.same_time_for_obs {
            for set in self.variables.iter_mut() {
                set.set_period(cfg.start_date, cfg.stop_date);
            }
        }
        for set in self.variables.iter_mut() {
            set.map_interpolation(&mut issues);
        }
        for set in self.variables.iter_mut() {
            set.validate(&mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(CmbsError::Validation {
                count: issues.len(),
                issues,
            })
        }
    }

    pub fn get(&self, variable: &str) -> Option<&VariableOptionSet> {
        self.variables.iter().find(|v| v.variable == variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableOptionSet> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
