//! Analysis routines for the variables the toolkit knows how to benchmark.
//!
//! The configuration directory holds `analysis_routines.json`, mapping a
//! variable identifier to the name of its analysis routine:
//!
//! ```json
//! { "rain": "rainfall_analysis", "sis": "sis_analysis" }
//! ```
//!
//! Every routine name is resolved to an [`AnalysisRoutine`] when the table is
//! loaded, so an unknown name stops the run before any data is read.

use crate::errors::{CmbsError, CmbsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// File name of the routine table inside the configuration directory.
pub const ANALYSIS_ROUTINES_FILE: &str = "analysis_routines.json";

/// Handler for one benchmark variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalysisRoutine {
    Rainfall,
    Albedo,
    AlbedoVis,
    AlbedoNir,
    Sis,
    SurfaceUpwardFlux,
    TreeFraction,
    GrassFraction,
    PhenologyFaPar,
    Temperature,
    Evaporation,
    Wind,
    Twpa,
    Wvpa,
    Hair,
    Late,
    Budg,
    SeaIceExtent,
    SeaIceConcentration,
    Gpp,
}

impl AnalysisRoutine {
    pub const ALL: [AnalysisRoutine; 20] = [
        AnalysisRoutine::Rainfall,
        AnalysisRoutine::Albedo,
        AnalysisRoutine::AlbedoVis,
        AnalysisRoutine::AlbedoNir,
        AnalysisRoutine::Sis,
        AnalysisRoutine::SurfaceUpwardFlux,
        AnalysisRoutine::TreeFraction,
        AnalysisRoutine::GrassFraction,
        AnalysisRoutine::PhenologyFaPar,
        AnalysisRoutine::Temperature,
        AnalysisRoutine::Evaporation,
        AnalysisRoutine::Wind,
        AnalysisRoutine::Twpa,
        AnalysisRoutine::Wvpa,
        AnalysisRoutine::Hair,
        AnalysisRoutine::Late,
        AnalysisRoutine::Budg,
        AnalysisRoutine::SeaIceExtent,
        AnalysisRoutine::SeaIceConcentration,
        AnalysisRoutine::Gpp,
    ];

    /// Variable identifier used in configuration files.
    pub fn variable(&self) -> &'static str {
        match self {
            AnalysisRoutine::Rainfall => "rain",
            AnalysisRoutine::Albedo => "albedo",
            AnalysisRoutine::AlbedoVis => "albedo_vis",
            AnalysisRoutine::AlbedoNir => "albedo_nir",
            AnalysisRoutine::Sis => "sis",
            AnalysisRoutine::SurfaceUpwardFlux => "surface_upward_flux",
            AnalysisRoutine::TreeFraction => "tree",
            AnalysisRoutine::GrassFraction => "grass",
            AnalysisRoutine::PhenologyFaPar => "phenology_faPAR",
            AnalysisRoutine::Temperature => "temperature",
            AnalysisRoutine::Evaporation => "evap",
            AnalysisRoutine::Wind => "wind",
            AnalysisRoutine::Twpa => "twpa",
            AnalysisRoutine::Wvpa => "wvpa",
            AnalysisRoutine::Hair => "hair",
            AnalysisRoutine::Late => "late",
            AnalysisRoutine::Budg => "budg",
            AnalysisRoutine::SeaIceExtent => "seaice_extent",
            AnalysisRoutine::SeaIceConcentration => "seaice_concentration",
            AnalysisRoutine::Gpp => "gpp",
        }
    }

    /// Routine name as written in `analysis_routines.json`.
    pub fn routine_name(&self) -> &'static str {
        match self {
            AnalysisRoutine::Rainfall => "rainfall_analysis",
            AnalysisRoutine::Albedo => "albedo_analysis",
            AnalysisRoutine::AlbedoVis => "albedo_analysis_vis",
            AnalysisRoutine::AlbedoNir => "albedo_analysis_nir",
            AnalysisRoutine::Sis => "sis_analysis",
            AnalysisRoutine::SurfaceUpwardFlux => "surface_upward_flux_analysis",
            AnalysisRoutine::TreeFraction => "tree_fraction_analysis",
            AnalysisRoutine::GrassFraction => "grass_fraction_analysis",
            AnalysisRoutine::PhenologyFaPar => "phenology_faPAR_analysis",
            AnalysisRoutine::Temperature => "temperature_analysis",
            AnalysisRoutine::Evaporation => "evaporation_analysis",
            AnalysisRoutine::Wind => "wind_analysis",
            AnalysisRoutine::Twpa => "twpa_analysis",
            AnalysisRoutine::Wvpa => "wvpa_analysis",
            AnalysisRoutine::Hair => "hair_analysis",
            AnalysisRoutine::Late => "late_analysis",
            AnalysisRoutine::Budg => "budg_analysis",
            AnalysisRoutine::SeaIceExtent => "seaice_extent_analysis",
            AnalysisRoutine::SeaIceConcentration => "seaice_concentration_analysis",
            AnalysisRoutine::Gpp => "gpp_analysis",
        }
    }

    pub fn from_routine_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.routine_name() == name)
    }

    /// Default routine for a variable identifier.
    pub fn for_variable(variable: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.variable() == variable)
    }
}

impl fmt::Display for AnalysisRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.routine_name())
    }
}

/// Variables whose model data has to be read for `variables`.
///
/// Phenology needs the snow cover fraction even when snow is not analysed
/// itself.
pub fn data_variables(variables: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in variables {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    if out.iter().any(|v| v == "phenology_faPAR") && !out.iter().any(|v| v == "snow") {
        out.push("snow".to_string());
    }
    out
}

/// Variable → routine table, validated on load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisRegistry {
    routines: BTreeMap<String, AnalysisRoutine>,
}

impl AnalysisRegistry {
    /// Registry with every known variable mapped to its default routine.
    pub fn standard() -> Self {
        Self {
            routines: AnalysisRoutine::ALL
                .into_iter()
                .map(|r| (r.variable().to_string(), r))
                .collect(),
        }
    }

    /// Load `analysis_routines.json` from the configuration directory.
    pub fn from_config_dir(configdir: &Path) -> CmbsResult<Self> {
        let path = configdir.join(ANALYSIS_ROUTINES_FILE);
        if !path.is_file() {
            return Err(CmbsError::Resource {
                path,
                message: "Required analysis routine table not existing".to_string(),
            });
        }
        let table: BTreeMap<String, String> =
            serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        Self::from_table(table)
    }

    pub fn from_table(table: BTreeMap<String, String>) -> CmbsResult<Self> {
        let mut routines = BTreeMap::new();
        for (variable, name) in table {
            let routine =
                AnalysisRoutine::from_routine_name(&name).ok_or_else(|| CmbsError::InvalidValue {
                    key: format!("analysis routine for {variable}"),
                    value: name.clone(),
                    expected: "a known analysis routine".to_string(),
                })?;
            debug!(variable = %variable, routine = %routine, "analysis routine registered");
            routines.insert(variable, routine);
        }
        Ok(Self { routines })
    }

    pub fn get(&self, variable: &str) -> Option<AnalysisRoutine> {
        self.routines.get(variable).copied()
    }

    /// Routine for every selected variable, in order.
    ///
    /// Fails on the first variable without a routine.
    pub fn resolve(&self, variables: &[String]) -> CmbsResult<Vec<(String, AnalysisRoutine)>> {
        variables
            .iter()
            .map(|v| {
                self.get(v)
                    .map(|r| (v.clone(), r))
                    .ok_or_else(|| CmbsError::InvalidValue {
                        key: "variable".to_string(),
                        value: v.clone(),
                        expected: format!("a variable listed in {ANALYSIS_ROUTINES_FILE}"),
                    })
            })
            .collect()
    }
}
