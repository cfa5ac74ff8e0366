//! Registered models and the closed set of model data adapters.

use crate::errors::{CmbsError, CmbsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Data-access strategy used to read a model's raw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelType {
    /// CMIP5 archive layout; the model id is part of the file names.
    Cmip5,
    /// JSBACH output post-processed to BOT files.
    JsbachBot,
    /// Raw JSBACH output.
    JsbachRaw,
    Cmip3,
    /// Raw JSBACH output in the second generation file layout.
    JsbachRaw2,
}

impl ModelType {
    pub const ALL: [ModelType; 5] = [
        ModelType::Cmip5,
        ModelType::JsbachBot,
        ModelType::JsbachRaw,
        ModelType::Cmip3,
        ModelType::JsbachRaw2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelType::Cmip5 => "CMIP5",
            ModelType::JsbachBot => "JSBACH_BOT",
            ModelType::JsbachRaw => "JSBACH_RAW",
            ModelType::Cmip3 => "CMIP3",
            ModelType::JsbachRaw2 => "JSBACH_RAW2",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModelType {
    type Err = CmbsError;

    fn from_str(s: &str) -> CmbsResult<Self> {
        let s = s.trim();
        ModelType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CmbsError::InvalidValue {
                key: "model type".to_string(),
                value: s.to_string(),
                expected: "one of CMIP5, JSBACH_BOT, JSBACH_RAW, CMIP3, JSBACH_RAW2".to_string(),
            })
    }
}

/// One model run registered in the run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub model_type: ModelType,
    pub experiment: String,
    /// Data directory, always ending with a path separator.
    pub data_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("cmip5".parse::<ModelType>().unwrap(), ModelType::Cmip5);
        assert_eq!(
            "Jsbach_Raw2".parse::<ModelType>().unwrap(),
            ModelType::JsbachRaw2
        );
        assert_eq!(" JSBACH_BOT ".parse::<ModelType>().unwrap(), ModelType::JsbachBot);
    }

    #[test]
    fn unknown_type_names_the_value() {
        let err = "ECHAM6".parse::<ModelType>().unwrap_err();
        assert!(err.to_string().contains("ECHAM6"));
    }

    #[test]
    fn display_round_trips() {
        for t in ModelType::ALL {
            assert_eq!(t.to_string().parse::<ModelType>().unwrap(), t);
        }
    }
}
