//! Configuration layer of the climate model benchmarking toolkit.
//!
//! A benchmarking run is described by a run configuration file (see
//! [`config`]) selecting variables, the analysis period and the models to
//! evaluate. Every variable has its own plot option file with the
//! observational datasets to compare against ([`plot_options`]).

pub mod cdo;
pub mod config;
pub mod data;
pub mod expression;
pub mod models;
pub mod plot_options;
pub mod regions;
pub mod routines;
pub mod sections;
pub mod value;

pub mod errors;

pub use config::writer::{ConfigTemplate, ConfigWriter};
pub use config::RunConfig;
pub use errors::{CmbsError, CmbsResult};
