//! Run metadata encoded in test-beam file names.
//!
//! Files are named like `stats_Run42_LGAD-W3_200V_10keV_beamA_1.parquet`.
//! Several layouts are in use; the first that matches wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::error::Result;

/// Placeholder for a key the matching layout does not carry.
pub const UNKNOWN: &str = "unknown";

const PREFIX: &str =
    r"^stats_Run(?P<run>[.\d]+)_(?P<sensor>.+)_(?P<voltage>[.\d]+)(?P<volt_unit>V|v)_";
const ENERGY_UNIT: &str = r"(?P<energy_unit>keV|KeV|kev)";
const ENERGY: &str = r"(?P<energy>[.\d]+)";
const INDEX: &str = r"(?P<index>[.\d]+)";
const EXT: &str = r"\.(?:root|parquet)$";

/// Metadata of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    /// Run number.
    pub run: String,
    /// Sensor label.
    pub sensor: String,
    /// Bias voltage.
    pub voltage: String,
    /// Voltage unit as written.
    pub volt_unit: String,
    /// Beam energy.
    pub energy: String,
    /// Energy unit as written.
    pub energy_unit: String,
    /// Free-form note.
    pub user_note: String,
}

impl RunInfo {
    fn from_captures(caps: &Captures<'_>, file_name: &str) -> Self {
        let get = |key: &str| match caps.name(key) {
            Some(m) => m.as_str().to_string(),
            None => {
                tracing::warn!(file = file_name, key, "run metadata key not found");
                UNKNOWN.to_string()
            }
        };
        Self {
            run: get("run"),
            sensor: get("sensor"),
            voltage: get("voltage"),
            volt_unit: get("volt_unit"),
            energy: get("energy"),
            energy_unit: get("energy_unit"),
            user_note: get("user_note"),
        }
    }
}

/// Files grouped by run, with the metadata of each run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRuns {
    /// Files of each run, in input order.
    pub files: BTreeMap<String, Vec<PathBuf>>,
    /// Metadata of each run, from its first file.
    pub info: BTreeMap<String, RunInfo>,
}

/// Matches file names against the known layouts.
#[derive(Debug, Clone)]
pub struct FilenameParser {
    layouts: Vec<Regex>,
}

impl FilenameParser {
    /// Compile the known layouts.
    pub fn new() -> Result<Self> {
        let layouts = [
            format!(r"{PREFIX}{ENERGY}{ENERGY_UNIT}_(?P<user_note>.+)_{INDEX}{EXT}"),
            format!(r"{PREFIX}{ENERGY}{ENERGY_UNIT}_{INDEX}{EXT}"),
            format!(r"{PREFIX}(?P<user_note>.+?){ENERGY}{ENERGY_UNIT}_{INDEX}{EXT}"),
            format!(r"{PREFIX}(?P<energy>\d+){ENERGY_UNIT}{EXT}"),
            format!(r"{PREFIX}(?P<energy>\d+){ENERGY_UNIT}_(?P<user_note>.+){EXT}"),
        ]
        .iter()
        .map(|p| Regex::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { layouts })
    }

    /// Parse the file name of `path`; `None` if no layout matches.
    pub fn parse(&self, path: &Path) -> Option<RunInfo> {
        let file_name = path.file_name()?.to_str()?;
        self.layouts
            .iter()
            .find_map(|re| re.captures(file_name))
            .map(|caps| RunInfo::from_captures(&caps, file_name))
    }

    /// Group `files` by run. Unparseable names are logged and skipped.
    pub fn resolve_filenames<P: AsRef<Path>>(&self, files: &[P]) -> ResolvedRuns {
        let mut out = ResolvedRuns::default();
        for f in files {
            let path = f.as_ref();
            let Some(info) = self.parse(path) else {
                tracing::warn!(file = %path.display(), "no run metadata in file name");
                continue;
            };
            out.files.entry(info.run.clone()).or_default().push(path.to_path_buf());
            out.info.entry(info.run.clone()).or_insert(info);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> Option<RunInfo> {
        FilenameParser::new().unwrap().parse(Path::new(name))
    }

    #[test]
    fn full_layout() {
        let info = parse("/data/stats_Run42_LGAD-W3_200V_10keV_beamA_1.root").unwrap();
        assert_eq!(info.run, "42");
        assert_eq!(info.sensor, "LGAD-W3");
        assert_eq!(info.voltage, "200");
        assert_eq!(info.volt_unit, "V");
        assert_eq!(info.energy, "10");
        assert_eq!(info.energy_unit, "keV");
        assert_eq!(info.user_note, "beamA");
    }

    #[test]
    fn missing_note_is_unknown() {
        let info = parse("stats_Run7_S1_150v_5.5kev_3.parquet").unwrap();
        assert_eq!(info.energy, "5.5");
        assert_eq!(info.volt_unit, "v");
        assert_eq!(info.user_note, UNKNOWN);

        let info = parse("stats_Run8_S1_150V_12KeV.root").unwrap();
        assert_eq!(info.energy, "12");
        assert_eq!(info.user_note, UNKNOWN);
    }

    #[test]
    fn note_before_energy_and_note_after_energy() {
        let info = parse("stats_Run9_S2_100V_scanB12keV_4.root").unwrap();
        assert_eq!(info.user_note, "scanB");
        assert_eq!(info.energy, "12");

        let info = parse("stats_Run10_S2_100V_20keV_tilted.root").unwrap();
        assert_eq!(info.energy, "20");
        assert_eq!(info.user_note, "tilted");
    }

    #[test]
    fn unparseable_names_are_skipped() {
        assert!(parse("notes.txt").is_none());
        let parser = FilenameParser::new().unwrap();
        let runs = parser.resolve_filenames(&[
            "stats_Run1_S_100V_10keV_a_1.root",
            "garbage.root",
            "stats_Run1_S_100V_10keV_a_2.root",
            "stats_Run2_S_120V_10keV_a_1.root",
        ]);
        assert_eq!(runs.files.len(), 2);
        assert_eq!(runs.files["1"].len(), 2);
        assert_eq!(runs.info["2"].voltage, "120");
    }
}
