//! Parser for `key = value` files grouped into `[Section]` blocks.
//!
//! Supported syntax:
//!
//! - `[name]` starts a section; repeating a name continues that section
//! - `key = value` or `key: value`; keys are lower-cased
//! - lines starting with `#` or `;` are comments
//! - indented lines continue the previous value
//! - keys in `[DEFAULT]` are inherited by every other section

use crate::errors::{CmbsError, CmbsResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const DEFAULT_SECTION: &str = "DEFAULT";

/// Raw (uncoerced) content of a section file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionFile {
    /// Sections in order of first appearance.
    sections: Vec<(String, BTreeMap<String, String>)>,
}

impl SectionFile {
    pub fn from_path(path: &Path) -> CmbsResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, source_name: &str) -> CmbsResult<Self> {
        let mut defaults: BTreeMap<String, String> = BTreeMap::new();
        let mut sections: Vec<(String, BTreeMap<String, String>)> = Vec::new();
        // index into `sections`, None while inside [DEFAULT]
        let mut current: Option<Option<usize>> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end();
            let trimmed = line.trim_start();

            if trimmed.is_empty() {
                last_key = None;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // continuation of the previous value
            if line.starts_with([' ', '\t']) {
                if let (Some(section), Some(key)) = (current, last_key.as_ref()) {
                    let map = match section {
                        Some(i) => &mut sections[i].1,
                        None => &mut defaults,
                    };
                    if let Some(value) = map.get_mut(key) {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                        continue;
                    }
                }
            }

            if trimmed.starts_with('[') {
                let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
                    return Err(CmbsError::parse(
                        source_name,
                        line_no,
                        format!("malformed section header '{trimmed}'"),
                    ));
                };
                let name = name.trim();
                last_key = None;
                if name == DEFAULT_SECTION {
                    current = Some(None);
                } else if let Some(i) = sections.iter().position(|(n, _)| n == name) {
                    current = Some(Some(i));
                } else {
                    sections.push((name.to_string(), BTreeMap::new()));
                    current = Some(Some(sections.len() - 1));
                }
                continue;
            }

            let Some(section) = current else {
                return Err(CmbsError::parse(
                    source_name,
                    line_no,
                    "option line before the first section header",
                ));
            };
            let Some(idx) = trimmed.find(['=', ':']) else {
                return Err(CmbsError::parse(
                    source_name,
                    line_no,
                    format!("expected 'key = value', found '{trimmed}'"),
                ));
            };
            let key = trimmed[..idx].trim().to_lowercase();
            if key.is_empty() {
                return Err(CmbsError::parse(source_name, line_no, "empty option name"));
            }
            let value = trimmed[idx + 1..].trim().to_string();

            let map = match section {
                Some(i) => &mut sections[i].1,
                None => &mut defaults,
            };
            map.insert(key.clone(), value);
            last_key = Some(key);
        }

        for (_, map) in sections.iter_mut() {
            for (key, value) in &defaults {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        Ok(Self { sections })
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(n, _)| n.as_str())
    }

    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, map)| map)
    }

    pub fn into_sections(self) -> Vec<(String, BTreeMap<String, String>)> {
        self.sections
    }
}
