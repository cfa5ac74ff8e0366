//! Gridded fields and the sources they are loaded from.

use crate::errors::{CmbsError, CmbsResult};
use crate::value::OptionMap;
use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A variable on a regular lat/lon grid, dims `[time, lat, lon]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddedField {
    pub name: String,
    pub data: Array3<f64>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub time: Vec<NaiveDate>,
    pub units: String,
    pub label: String,
    /// `true` marks invalid cells.
    pub mask: Option<Array3<bool>>,
}

impl GriddedField {
    /// Build a field, checking the axes against the data shape.
    pub fn new(
        name: &str,
        data: Array3<f64>,
        lat: Array1<f64>,
        lon: Array1<f64>,
        time: Vec<NaiveDate>,
    ) -> CmbsResult<Self> {
        let (nt, nlat, nlon) = data.dim();
        if time.len() != nt || lat.len() != nlat || lon.len() != nlon {
            return Err(CmbsError::InvalidValue {
                key: format!("{name} axes"),
                value: format!("time={} lat={} lon={}", time.len(), lat.len(), lon.len()),
                expected: format!("time={nt} lat={nlat} lon={nlon}"),
            });
        }
        Ok(Self {
            name: name.to_string(),
            data,
            lat,
            lon,
            time,
            units: String::new(),
            label: name.to_string(),
            mask: None,
        })
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_mask(mut self, mask: Array3<bool>) -> CmbsResult<Self> {
        if mask.dim() != self.data.dim() {
            return Err(CmbsError::InvalidValue {
                key: format!("{} mask", self.name),
                value: format!("{:?}", mask.dim()),
                expected: format!("{:?}", self.data.dim()),
            });
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn ntime(&self) -> usize {
        self.time.len()
    }

    fn is_valid(&self, idx: (usize, usize, usize)) -> bool {
        let value = self.data[idx];
        !value.is_nan() && !self.mask.as_ref().is_some_and(|m| m[idx])
    }

    /// Mean over time per grid cell, ignoring masked and NaN values.
    ///
    /// Cells without any valid value are NaN.
    pub fn time_mean(&self) -> Array2<f64> {
        let (nt, nlat, nlon) = self.data.dim();
        Array2::from_shape_fn((nlat, nlon), |(j, i)| {
            let (sum, n) = (0..nt)
                .filter(|&t| self.is_valid((t, j, i)))
                .fold((0.0, 0usize), |(s, n), t| (s + self.data[(t, j, i)], n + 1));
            if n == 0 {
                f64::NAN
            } else {
                sum / n as f64
            }
        })
    }

    /// Multiply all values by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.data.mapv_inplace(|v| v * factor);
    }

    /// Keep only the time steps within `start..=stop`.
    pub fn select_period(&self, start: NaiveDate, stop: NaiveDate) -> Self {
        let keep: Vec<usize> = self
            .time
            .iter()
            .enumerate()
            .filter(|(_, t)| (start..=stop).contains(*t))
            .map(|(i, _)| i)
            .collect();
        Self {
            name: self.name.clone(),
            data: self.data.select(Axis(0), &keep),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            time: keep.iter().map(|&i| self.time[i]).collect(),
            units: self.units.clone(),
            label: self.label.clone(),
            mask: self.mask.as_ref().map(|m| m.select(Axis(0), &keep)),
        }
    }
}

/// Loads one variable from a file.
///
/// `options` are the dataset's plot options, e.g. `scale_data`.
pub trait DataSource {
    fn load(&self, path: &Path, variable: &str, options: &OptionMap) -> CmbsResult<GriddedField>;
}

/// Fields held in memory, keyed by path and variable.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataSource {
    fields: HashMap<(PathBuf, String), GriddedField>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, field: GriddedField) {
        self.fields.insert((path.into(), field.name.clone()), field);
    }
}

impl DataSource for MemoryDataSource {
    fn load(&self, path: &Path, variable: &str, options: &OptionMap) -> CmbsResult<GriddedField> {
        let mut field = self
            .fields
            .get(&(path.to_path_buf(), variable.to_string()))
            .cloned()
            .ok_or_else(|| CmbsError::NotFound {
                path: path.to_path_buf(),
            })?;

        if let Some(factor) = options
            .get("scale_data")
            .and_then(|v| v.as_ref())
            .and_then(|v| v.as_number())
        {
            debug!(variable, factor, "scaling data");
            field.scale(factor);
        }
        if let Some(units) = options
            .get("units")
            .and_then(|v| v.as_ref())
            .and_then(|v| v.as_str())
        {
            field.units = units.to_string();
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OptionValue;
    use ndarray::array;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 15).unwrap()
    }

    fn field() -> GriddedField {
        let data = Array3::from_shape_vec(
            (3, 1, 2),
            vec![1.0, 10.0, 3.0, f64::NAN, 5.0, 30.0],
        )
        .unwrap();
        GriddedField::new(
            "pr",
            data,
            array![0.0],
            array![0.0, 1.0],
            vec![date(2000, 1), date(2000, 2), date(2000, 3)],
        )
        .unwrap()
    }

    #[test]
    fn axes_must_match_data() {
        let err = GriddedField::new(
            "pr",
            Array3::zeros((2, 1, 1)),
            array![0.0],
            array![0.0],
            vec![date(2000, 1)],
        )
        .unwrap_err();
        assert!(matches!(err, CmbsError::InvalidValue { .. }));
    }

    #[test]
    fn time_mean_skips_invalid() {
        let f = field();
        let mean = f.time_mean();
        assert_eq!(mean[(0, 0)], 3.0);
        assert_eq!(mean[(0, 1)], 20.0);

        let mut mask = Array3::from_elem((3, 1, 2), false);
        mask[(2, 0, 0)] = true;
        let masked = f.with_mask(mask).unwrap();
        assert_eq!(masked.time_mean()[(0, 0)], 2.0);
    }

    #[test]
    fn select_period() {
        let f = field().select_period(date(2000, 2), date(2000, 12));
        assert_eq!(f.ntime(), 2);
        assert_eq!(f.data.dim(), (2, 1, 2));
        assert_eq!(f.data[(0, 0, 0)], 3.0);
    }

    #[test]
    fn memory_source() {
        let mut source = MemoryDataSource::new();
        source.insert("/data/gpcp.nc", field());

        let mut options = OptionMap::new();
        options.insert("scale_data".to_string(), Some(OptionValue::Number(2.0)));
        options.insert("units".to_string(), Some(OptionValue::Text("mm/d".to_string())));

        let loaded = source
            .load(Path::new("/data/gpcp.nc"), "pr", &options)
            .unwrap();
        assert_eq!(loaded.data[(0, 0, 0)], 2.0);
        assert_eq!(loaded.units, "mm/d");

        assert!(matches!(
            source
                .load(Path::new("/data/other.nc"), "pr", &options)
                .unwrap_err(),
            CmbsError::NotFound { .. }
        ));
        assert!(source
            .load(Path::new("/data/gpcp.nc"), "tas", &options)
            .is_err());
    }
}
