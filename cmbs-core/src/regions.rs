//! Named geographic regions used for regional analysis.
//!
//! Regions are read from every `*.reg` file of a directory. Each non-comment
//! line defines one bounding box:
//!
//! ```text
//! # label, lon1, lon2, lat1, lat2
//! Europe,-10.,40.,35.,70.
//! ```

use crate::errors::{CmbsError, CmbsResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;
use walkdir::WalkDir;

/// File extension of region files.
pub const REGION_FILE_EXTENSION: &str = "reg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    LatLon,
}

/// Bounding box in signed degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub label: String,
    pub lon1: f64,
    pub lon2: f64,
    pub lat1: f64,
    pub lat2: f64,
    pub kind: RegionKind,
}

impl Region {
    pub fn new(label: &str, lon1: f64, lon2: f64, lat1: f64, lat2: f64) -> Self {
        Self {
            label: label.to_string(),
            lon1,
            lon2,
            lat1,
            lat2,
            kind: RegionKind::LatLon,
        }
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let (lon_min, lon_max) = (self.lon1.min(self.lon2), self.lon1.max(self.lon2));
        let (lat_min, lat_max) = (self.lat1.min(self.lat2), self.lat1.max(self.lat2));
        (lon_min..=lon_max).contains(&lon) && (lat_min..=lat_max).contains(&lat)
    }
}

/// Regions in file order, then line order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl RegionCatalog {
    /// Read all region files in `dir` (not recursive).
    ///
    /// Files are visited in file-name order.
    pub fn read(dir: &Path) -> CmbsResult<Self> {
        if !dir.is_dir() {
            return Err(CmbsError::Resource {
                path: dir.to_path_buf(),
                message: "Region directory not existing".to_string(),
            });
        }

        let mut catalog = Self::default();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| CmbsError::Resource {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().is_some_and(|e| e == REGION_FILE_EXTENSION)
            {
                catalog.read_file(path)?;
            }
        }

        info!(
            regions = ?catalog.regions.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(),
            "Regions"
        );
        Ok(catalog)
    }

    /// Add the regions of a single file.
    pub fn read_file(&mut self, path: &Path) -> CmbsResult<()> {
        let text = fs::read_to_string(path)?;
        self.parse(&text, &path.display().to_string())
    }

    fn parse(&mut self, text: &str, source_name: &str) -> CmbsResult<()> {
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |message: String| CmbsError::parse(source_name, idx + 1, message);

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [label, lon1, lon2, lat1, lat2] = fields[..] else {
                return Err(err(format!(
                    "Error in region file: expected 5 fields, found {}",
                    fields.len()
                )));
            };
            let coord = |s: &str| {
                s.parse::<f64>()
                    .map_err(|_| err(format!("invalid coordinate '{s}' for region {label}")))
            };
            let region = Region::new(label, coord(lon1)?, coord(lon2)?, coord(lat1)?, coord(lat2)?);

            if self.get(label).is_some() {
                return Err(err(format!("duplicate region label '{label}'")));
            }
            self.regions.push(region);
        }
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
