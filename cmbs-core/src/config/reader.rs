use super::lines::{is_comment, LineReader};
use super::tempdir::prepare_temp_dir;
use super::{with_trailing_separator, GlobalOptions, ReportFormat, RunConfig, DATE_FORMAT};
use crate::errors::{CmbsError, CmbsResult};
use crate::models::{ModelEntry, ModelType};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Split `KEY=value` or `KEY,value` at whichever separator comes first.
fn split_setting(line: &str) -> Option<(String, &str)> {
    let idx = line.find(|c: char| c == '=' || c == ',')?;
    Some((line[..idx].trim().to_ascii_uppercase(), &line[idx + 1..]))
}

struct ConfigReader<R> {
    lines: LineReader<R>,
}

impl<R: BufRead> ConfigReader<R> {
    fn setting(&mut self, key: &str) -> CmbsResult<String> {
        let line = self
            .lines
            .next_content()?
            .ok_or_else(|| self.lines.error(format!("{key} missing in configuration file")))?;
        self.parse_setting(&line, key)
    }

    fn parse_setting(&self, line: &str, key: &str) -> CmbsResult<String> {
        match split_setting(line) {
            Some((found, value)) if found == key => Ok(value.trim().to_string()),
            _ => Err(self.lines.error(format!(
                "{key} missing in configuration file (found '{}')",
                line.trim()
            ))),
        }
    }

    fn flag(&self, key: &str, value: &str) -> CmbsResult<bool> {
        match value.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(self
                .lines
                .error(format!("invalid flag '{other}' for {key}, expected 0 or 1"))),
        }
    }

    fn bool_setting(&mut self, key: &str) -> CmbsResult<bool> {
        let value = self.setting(key)?;
        self.flag(key, &value)
    }

    fn directory_setting(&mut self, key: &str) -> CmbsResult<String> {
        let value = self.setting(key)?;
        if value.is_empty() {
            return Err(self.lines.error(format!("{key} must not be empty")));
        }
        Ok(value)
    }

    fn read_options(&mut self) -> CmbsResult<GlobalOptions> {
        let first = self
            .lines
            .next_content()?
            .ok_or_else(|| self.lines.error("configuration file is empty"))?;

        // BASEMAP is optional; without it the first line is already REPORT
        let (basemap, report) = match split_setting(&first) {
            Some((key, value)) if key == "BASEMAP" => {
                let basemap = self.flag("BASEMAP", value)?;
                (basemap, self.setting("REPORT")?)
            }
            _ => (false, self.parse_setting(&first, "REPORT")?),
        };
        let report = report.replace(' ', "");

        let format = self.setting("REPORT_FORMAT")?.to_ascii_lowercase();
        let report_format = match format.as_str() {
            "png" => ReportFormat::Png,
            "pdf" => ReportFormat::Pdf,
            _ => {
                return Err(CmbsError::InvalidValue {
                    key: "REPORT_FORMAT".to_string(),
                    value: format,
                    expected: "png or pdf".to_string(),
                })
            }
        };

        let author = self.setting("AUTHOR")?;
        let tempdir = with_trailing_separator(&self.directory_setting("TEMP_DIR")?);
        let cleandir = self.bool_setting("CLEAN_TEMPDIR")?;
        let summary = self.bool_setting("SUMMARY_ONLY")?;

        let configdir = with_trailing_separator(&self.directory_setting("CONFIG_DIR")?);
        if !configdir.is_dir() {
            return Err(CmbsError::Resource {
                path: configdir,
                message: "Configuration path is invalid".to_string(),
            });
        }

        Ok(GlobalOptions {
            basemap,
            report,
            report_format,
            author,
            tempdir,
            cleandir,
            summary,
            configdir,
        })
    }

    fn parse_variable(
        &self,
        line: &str,
        variables: &mut Vec<String>,
        intervals: &mut BTreeMap<String, String>,
    ) -> CmbsResult<()> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [name, flag, interval] = fields[..] else {
            return Err(self.lines.error(format!(
                "expected 'name,flag,interval' in variable block, found '{}'",
                line.trim()
            )));
        };
        if name.is_empty() {
            return Err(self.lines.error("empty variable name"));
        }
        if self.flag(name, flag)? {
            debug!(variable = name, interval, "variable selected");
            variables.push(name.to_string());
            intervals.insert(name.to_string(), interval.to_string());
        }
        Ok(())
    }

    /// Variable lines up to the next comment line.
    fn read_variables(&mut self) -> CmbsResult<(Vec<String>, BTreeMap<String, String>)> {
        let mut variables = Vec::new();
        let mut intervals = BTreeMap::new();

        let first = self
            .lines
            .next_content()?
            .ok_or_else(|| self.lines.error("variable block missing"))?;
        self.parse_variable(&first, &mut variables, &mut intervals)?;

        loop {
            let line = self.lines.next_raw()?.ok_or_else(|| {
                self.lines
                    .error("unexpected end of file: variable block must be closed by a comment line")
            })?;
            if line.trim().is_empty() {
                continue;
            }
            if is_comment(&line) {
                break;
            }
            self.parse_variable(&line, &mut variables, &mut intervals)?;
        }
        Ok((variables, intervals))
    }

    fn date(&mut self, what: &str) -> CmbsResult<NaiveDate> {
        let line = self
            .lines
            .next_content()?
            .ok_or_else(|| self.lines.error(format!("{what} date missing")))?;
        NaiveDate::parse_from_str(line.trim(), DATE_FORMAT).map_err(|e| {
            self.lines.error(format!(
                "invalid {what} date '{}', expected YYYY-MM-DD: {e}",
                line.trim()
            ))
        })
    }

    fn read_dates(&mut self) -> CmbsResult<(NaiveDate, NaiveDate, bool)> {
        let start = self.date("start")?;
        let stop = self.date("stop")?;
        let line = self
            .lines
            .next_content()?
            .ok_or_else(|| self.lines.error("flag for observation period missing"))?;
        let (key, value) = split_setting(&line).ok_or_else(|| {
            self.lines.error(format!(
                "expected '<name>,<0|1>' for observation period, found '{}'",
                line.trim()
            ))
        })?;
        let same_time = self.flag(&key, value)?;
        Ok((start, stop, same_time))
    }

    fn parse_model(&self, line: &str) -> CmbsResult<ModelEntry> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [id, model_type, experiment, path] = fields[..] else {
            return Err(self.lines.error(format!(
                "expected 'id,type,experiment,path' in model block, found '{}'",
                line.trim()
            )));
        };
        if id.is_empty() || path.is_empty() {
            return Err(self.lines.error("model id and path must not be empty"));
        }
        let model_type = model_type.parse::<ModelType>().map_err(|_| {
            self.lines
                .error(format!("unknown model type '{model_type}' for model '{id}'"))
        })?;
        Ok(ModelEntry {
            id: id.to_string(),
            model_type,
            experiment: experiment.to_string(),
            data_dir: with_trailing_separator(path),
        })
    }

    /// Model lines until end of file.
    fn read_models(&mut self) -> CmbsResult<Vec<ModelEntry>> {
        let mut models = Vec::new();
        while let Some(line) = self.lines.next_content()? {
            models.push(self.parse_model(&line)?);
        }
        if models.is_empty() {
            return Err(self.lines.error("no models registered"));
        }
        Ok(models)
    }
}

impl RunConfig {
    /// Read a run configuration file.
    ///
    /// See [`RunConfig::read`].
    pub fn from_path(path: &Path) -> CmbsResult<Self> {
        if !path.is_file() {
            return Err(CmbsError::Resource {
                path: path.to_path_buf(),
                message: "Configuration file not existing".to_string(),
            });
        }
        let file = File::open(path)?;
        Self::read(BufReader::new(file), &path.display().to_string())
    }

    /// Parse a run configuration.
    ///
    /// Any structural problem is fatal. On success the temporary directory is
    /// created, or cleaned of `*.nc` files when `CLEAN_TEMPDIR` is set.
    pub fn read<R: BufRead>(reader: R, source_name: &str) -> CmbsResult<Self> {
        info!(source = source_name, "Reading config file");
        let mut reader = ConfigReader {
            lines: LineReader::new(reader, source_name),
        };

        let options = reader.read_options()?;
        let (variables, intervals) = reader.read_variables()?;
        let (start_date, stop_date, same_time_for_obs) = reader.read_dates()?;
        let models = reader.read_models()?;

        if start_date > stop_date {
            warn!(%start_date, %stop_date, "start date is after stop date");
        }

        prepare_temp_dir(&options.tempdir, options.cleandir)?;

        info!(
            variables = variables.len(),
            models = models.len(),
            "Done reading config file"
        );
        Ok(RunConfig {
            options,
            variables,
            intervals,
            start_date,
            stop_date,
            same_time_for_obs,
            models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir(dir.path().join("configuration")).unwrap();
            Self { dir }
        }

        fn header(&self) -> String {
            format!(
                "# test configuration\n\
                 BASEMAP,0\n\
                 REPORT=my report\n\
                 REPORT_FORMAT=PDF\n\
                 AUTHOR=Jane Doe\n\
                 TEMP_DIR={}\n\
                 CLEAN_TEMPDIR,0\n\
                 SUMMARY_ONLY,1\n\
                 CONFIG_DIR={}\n",
                self.dir.path().join("tmp").display(),
                self.dir.path().join("configuration").display(),
            )
        }

        fn read(&self, text: &str) -> CmbsResult<RunConfig> {
            RunConfig::read(text.as_bytes(), "test.cfg")
        }
    }

    const BODY: &str = "##########\n\
        rain,1,season\n\
        \n\
        albedo,0,monthly\n\
        sis,1,monthly\n\
        ##########\n\
        1979-01-01\n\
        2000-12-31\n\
        use_for_observations,1\n\
        ##########\n\
        MPI-ESM-LR,CMIP5,amip,/data/cmip5\n\
        \n\
        # second run\n\
        jsb,jsbach_raw,exp01,/data/jsbach/\n";

    #[test]
    fn full_file() {
        let fx = Fixture::new();
        let cfg = fx.read(&(fx.header() + BODY)).unwrap();

        assert_eq!(cfg.options.report, "myreport");
        assert_eq!(cfg.options.report_format, ReportFormat::Pdf);
        assert_eq!(cfg.options.author, "Jane Doe");
        assert!(cfg.options.summary);
        assert!(!cfg.options.cleandir);
        assert!(!cfg.options.basemap);
        assert!(cfg.options.tempdir.is_dir());

        assert_eq!(cfg.variables, vec!["rain", "sis"]);
        assert_eq!(cfg.intervals["rain"], "season");
        assert!(!cfg.intervals.contains_key("albedo"));

        assert_eq!(cfg.start_date, NaiveDate::from_ymd_opt(1979, 1, 1).unwrap());
        assert_eq!(cfg.stop_date, NaiveDate::from_ymd_opt(2000, 12, 31).unwrap());
        assert!(cfg.same_time_for_obs);

        assert_eq!(cfg.models.len(), 2);
        assert_eq!(cfg.models[0].model_type, ModelType::Cmip5);
        assert_eq!(cfg.models[0].data_dir, with_trailing_separator("/data/cmip5"));
        assert_eq!(cfg.models[1].model_type, ModelType::JsbachRaw);
        assert_eq!(cfg.models[1].data_dir, std::path::PathBuf::from("/data/jsbach/"));
    }

    #[test]
    fn basemap_line_is_optional() {
        let fx = Fixture::new();
        let header = fx.header().replace("BASEMAP,0\n", "");
        let cfg = fx.read(&(header + BODY)).unwrap();
        assert_eq!(cfg.options.report, "myreport");
    }

    #[test]
    fn keys_are_case_insensitive() {
        let fx = Fixture::new();
        let header = fx
            .header()
            .replace("REPORT=", "report=")
            .replace("AUTHOR=", "Author=");
        assert!(fx.read(&(header + BODY)).is_ok());
    }

    #[test]
    fn invalid_report_format() {
        let fx = Fixture::new();
        let header = fx.header().replace("REPORT_FORMAT=PDF", "REPORT_FORMAT=svg");
        match fx.read(&(header + BODY)).unwrap_err() {
            CmbsError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "REPORT_FORMAT");
                assert_eq!(value, "svg");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_key_is_named() {
        let fx = Fixture::new();
        let header = fx.header().replace("AUTHOR=Jane Doe\n", "");
        let err = fx.read(&(header + BODY)).unwrap_err();
        assert!(err.to_string().contains("AUTHOR missing"), "{err}");
    }

    #[test]
    fn missing_config_dir_is_a_resource_error() {
        let fx = Fixture::new();
        let header = fx.header().replace("configuration", "does-not-exist");
        assert!(matches!(
            fx.read(&(header + BODY)).unwrap_err(),
            CmbsError::Resource { .. }
        ));
    }

    #[test]
    fn invalid_flag() {
        let fx = Fixture::new();
        let header = fx.header().replace("SUMMARY_ONLY,1", "SUMMARY_ONLY,yes");
        assert!(fx.read(&(header + BODY)).is_err());
    }

    #[test]
    fn unknown_model_type() {
        let fx = Fixture::new();
        let body = BODY.replace("jsbach_raw", "ECHAM5");
        let err = fx.read(&(fx.header() + &body)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ECHAM5"), "{message}");
        assert!(message.contains(":23:"), "{message}");
    }

    #[test]
    fn wrong_field_count_in_model_block() {
        let fx = Fixture::new();
        let body = BODY.replace("amip,/data/cmip5", "amip");
        assert!(matches!(
            fx.read(&(fx.header() + &body)).unwrap_err(),
            CmbsError::StructuralParse { .. }
        ));
    }

    #[test]
    fn wrong_field_count_in_variable_block() {
        let fx = Fixture::new();
        let body = BODY.replace("rain,1,season", "rain,1");
        assert!(fx.read(&(fx.header() + &body)).is_err());
    }

    #[test]
    fn unterminated_variable_block() {
        let fx = Fixture::new();
        let text = fx.header() + "#\nrain,1,season\n";
        assert!(fx.read(&text).is_err());
    }

    #[test]
    fn invalid_date() {
        let fx = Fixture::new();
        let body = BODY.replace("2000-12-31", "31.12.2000");
        assert!(fx.read(&(fx.header() + &body)).is_err());
    }

    #[test]
    fn no_models() {
        let fx = Fixture::new();
        let body = BODY.split("MPI-ESM-LR").next().unwrap().to_string();
        assert!(fx.read(&(fx.header() + &body)).is_err());
    }

    #[test]
    fn duplicate_variables_are_kept() {
        let fx = Fixture::new();
        let body = BODY.replace("sis,1,monthly", "rain,1,monthly");
        let cfg = fx.read(&(fx.header() + &body)).unwrap();
        assert_eq!(cfg.variables, vec!["rain", "rain"]);
        assert_eq!(cfg.intervals["rain"], "monthly");
    }

    #[test]
    fn from_path_requires_existing_file() {
        let fx = Fixture::new();
        assert!(matches!(
            RunConfig::from_path(&fx.dir.path().join("missing.cfg")).unwrap_err(),
            CmbsError::Resource { .. }
        ));
    }
}
