//! End-to-end tests of the configuration pipeline.
//!
//! A run configuration is written to disk, read back and used to load the
//! plot options of its variables, the way a benchmarking run starts up.

use chrono::NaiveDate;
use cmbs_core::config::writer::{ConfigTemplate, ConfigWriter};
use cmbs_core::config::RunConfig;
use cmbs_core::errors::CmbsError;
use cmbs_core::expression::StandardContext;
use cmbs_core::models::{ModelEntry, ModelType};
use cmbs_core::plot_options::{Interpolation, PlotOptions};
use cmbs_core::routines::{AnalysisRegistry, AnalysisRoutine};
use cmbs_core::value::OptionValue;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const RAIN_OPTIONS: &str = "\
[OPTIONS]
cticks = [0, 1, 2, 4, 8]
map_difference = True
map_seasons = True
preprocess = True
reichler_plot = True
gleckler_plot = True
hovmoeller_plot = True
regional_analysis = False
interpolation = bilinear
targetgrid = t63grid
projection = robin
global_mean = True
start = 1950-01-01
stop = 1960-12-31

[GPCP]
obs_file = #get_data_pool_directory() + 'gpcp/gpcp_v2.nc'#
obs_var = precip
gleckler_position = 1
scale_data = 1.

[CRU]
obs_file = /data/cru
obs_var = pre
gleckler_position = 2
scale_data = 0.0333
";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn models() -> Vec<ModelEntry> {
    vec![
        ModelEntry {
            id: "MPI-ESM-LR".to_string(),
            model_type: ModelType::Cmip5,
            experiment: "amip".to_string(),
            data_dir: PathBuf::from("/data/cmip5/"),
        },
        ModelEntry {
            id: "jsb01".to_string(),
            model_type: ModelType::JsbachRaw2,
            experiment: "historical".to_string(),
            data_dir: PathBuf::from("/data/jsbach/"),
        },
    ]
}

/// A run directory with a configuration file for `rain` and `sis`.
struct Run {
    dir: TempDir,
    cfg_path: PathBuf,
}

impl Run {
    fn new(summary_only: bool, same_time_for_obs: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("run.cfg");

        let mut template = ConfigTemplate::new(
            dir.path().join("scratch").join(""),
            date(1979, 1, 1),
            date(2000, 12, 31),
            models(),
        )
        .with_variables(&["rain", "sis"], "monthly");
        template.intervals.insert("rain".to_string(), "season".to_string());
        template.summary_only = summary_only;
        template.same_time_for_obs = same_time_for_obs;
        template.report_format = cmbs_core::config::ReportFormat::Pdf;

        ConfigWriter::new(&cfg_path, "integration test")
            .unwrap()
            .save(&template)
            .unwrap();

        let run = Self { dir, cfg_path };
        run.write_options("rain", RAIN_OPTIONS);
        run.write_options(
            "sis",
            &RAIN_OPTIONS
                .replace("[GPCP]", "[CERES]")
                .replace("[CRU]", "[ISCCP]"),
        );
        run
    }

    fn config_dir(&self) -> PathBuf {
        self.dir.path().join("configuration")
    }

    fn write_options(&self, variable: &str, text: &str) {
        fs::write(self.config_dir().join(format!("{variable}.ini")), text).unwrap();
    }

    fn read(&self) -> RunConfig {
        RunConfig::from_path(&self.cfg_path).unwrap()
    }

    fn context(&self, cfg: &RunConfig) -> StandardContext {
        StandardContext::new("/pool/SEP/", &cfg.options.tempdir)
    }
}

mod run_configuration {
    use super::*;

    #[test]
    fn test_written_file_is_read_back() {
        let run = Run::new(false, false);
        let cfg = run.read();

        assert_eq!(cfg.variables, vec!["rain", "sis"]);
        assert_eq!(cfg.intervals["rain"], "season");
        assert_eq!(cfg.intervals["sis"], "monthly");
        assert_eq!(cfg.start_date, date(1979, 1, 1));
        assert_eq!(cfg.stop_date, date(2000, 12, 31));
        assert_eq!(cfg.models, models());
        assert_eq!(cfg.options.report_format.name(), "pdf");
        assert!(cfg.options.tempdir.is_dir());
    }

    #[test]
    fn test_rewriting_preserves_structure() {
        let run = Run::new(true, true);
        let first = run.read();

        let copy = run.dir.path().join("copy").join("run.cfg");
        ConfigWriter::new(&copy, "integration test")
            .unwrap()
            .save(&ConfigTemplate::from_run_config(&first))
            .unwrap();
        let second = RunConfig::from_path(&copy).unwrap();

        assert_eq!(second.variables, first.variables);
        assert_eq!(second.intervals, first.intervals);
        assert_eq!(second.start_date, first.start_date);
        assert_eq!(second.stop_date, first.stop_date);
        assert_eq!(second.same_time_for_obs, first.same_time_for_obs);
        assert_eq!(second.models, first.models);
        assert_eq!(second.options, first.options);
    }

    #[test]
    fn test_clean_tempdir_removes_netcdf_files() {
        let run = Run::new(false, false);
        let cfg = run.read();
        let scratch = cfg.options.tempdir.clone();
        fs::write(scratch.join("old.nc"), b"").unwrap();
        fs::write(scratch.join("keep.txt"), b"").unwrap();

        let text = fs::read_to_string(&run.cfg_path)
            .unwrap()
            .replace("clean_tempdir,0", "clean_tempdir,1");
        fs::write(&run.cfg_path, text).unwrap();
        run.read();

        assert!(!scratch.join("old.nc").exists());
        assert!(scratch.join("keep.txt").exists());
    }

    #[test]
    fn test_toml_dump_reads_back() {
        let run = Run::new(false, true);
        let cfg = run.read();
        let text = toml::to_string(&cfg).unwrap();
        assert!(text.contains("JSBACH_RAW2"));
        let back: RunConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_variables_resolve_to_routines() {
        let run = Run::new(false, false);
        let cfg = run.read();
        let resolved = AnalysisRegistry::standard().resolve(&cfg.variables).unwrap();
        assert_eq!(
            resolved,
            vec![
                ("rain".to_string(), AnalysisRoutine::Rainfall),
                ("sis".to_string(), AnalysisRoutine::Sis)
            ]
        );
    }
}

mod plot_options {
    use super::*;

    fn obs_file(options: &PlotOptions, variable: &str, dataset: &str) -> String {
        options
            .get(variable)
            .and_then(|v| v.dataset(dataset))
            .and_then(|d| d["obs_file"].clone())
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap()
    }

    #[test]
    fn test_options_are_loaded() {
        let run = Run::new(false, false);
        let cfg = run.read();
        let options = PlotOptions::read(&cfg, &run.context(&cfg)).unwrap();

        assert_eq!(options.len(), 2);
        let rain = options.get("rain").unwrap();
        assert!(rain.flag("map_difference"));
        assert_eq!(rain.interpolation(), Some(Interpolation::Bilinear));
        assert_eq!(rain.datasets().count(), 2);
        assert_eq!(
            rain.option("start"),
            Some(&OptionValue::Date(date(1950, 1, 1)))
        );

        assert_eq!(
            obs_file(&options, "rain", "GPCP"),
            "/pool/SEP/gpcp/gpcp_v2.nc"
        );
        assert_eq!(
            obs_file(&options, "rain", "CRU"),
            format!("/data/cru{}", std::path::MAIN_SEPARATOR)
        );
    }

    #[test]
    fn test_summary_only_disables_detailed_plots() {
        let run = Run::new(true, false);
        let cfg = run.read();
        let options = PlotOptions::read(&cfg, &run.context(&cfg)).unwrap();

        for set in options.iter() {
            assert!(!set.flag("map_difference"));
            assert!(!set.flag("map_seasons"));
            assert!(!set.flag("hovmoeller_plot"));
            assert!(set.flag("gleckler_plot"));
        }
    }

    #[test]
    fn test_model_period_is_used_for_observations() {
        let run = Run::new(false, true);
        let cfg = run.read();
        let options = PlotOptions::read(&cfg, &run.context(&cfg)).unwrap();

        let rain = options.get("rain").unwrap();
        assert_eq!(rain.option("start"), Some(&OptionValue::Date(date(1979, 1, 1))));
        assert_eq!(rain.option("stop"), Some(&OptionValue::Date(date(2000, 12, 31))));
    }

    #[test]
    fn test_issues_of_all_variables_are_collected() {
        let run = Run::new(false, false);
        run.write_options("rain", &RAIN_OPTIONS.replace("bilinear", "bicubic"));
        run.write_options(
            "sis",
            &RAIN_OPTIONS
                .replace("projection = robin\n", "")
                .replace("[0, 1, 2, 4, 8]", "[8, 4]"),
        );
        let cfg = run.read();

        match PlotOptions::read(&cfg, &run.context(&cfg)).unwrap_err() {
            CmbsError::Validation { count, issues } => {
                assert_eq!(count, 3);
                assert_eq!(issues[0].variable, "rain");
                assert!(issues.iter().all(|i| i.section.as_deref() == Some("OPTIONS")));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_option_file() {
        let run = Run::new(false, false);
        fs::remove_file(run.config_dir().join("sis.ini")).unwrap();
        let cfg = run.read();
        assert!(matches!(
            PlotOptions::read(&cfg, &run.context(&cfg)).unwrap_err(),
            CmbsError::Resource { .. }
        ));
    }

    #[test]
    fn test_unknown_expression_function_fails() {
        let run = Run::new(false, false);
        run.write_options(
            "rain",
            &RAIN_OPTIONS.replace("get_data_pool_directory()", "__import__('os')"),
        );
        let cfg = run.read();
        assert!(matches!(
            PlotOptions::read(&cfg, &run.context(&cfg)).unwrap_err(),
            CmbsError::Expression { .. }
        ));
    }

    #[test]
    fn test_options_serialize_to_json() {
        let run = Run::new(false, false);
        let cfg = run.read();
        let options = PlotOptions::read(&cfg, &run.context(&cfg)).unwrap();
        let json = serde_json::to_value(&options).unwrap();
        assert!(json.to_string().contains("remapbil"));
        assert!(Path::new(&cfg.options.configdir).is_dir());
    }
}
