//! Analysis configuration: header keyword table, rule thresholds and
//! objective keywords, persisted as YAML.
//!
//! A configuration file may be partial. Keyword lists given for a field
//! replace that field's defaults; every other field keeps the built-in
//! variants. Threshold keys that are omitted keep their defaults.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    diagnosis::{ObjectiveKeywords, Thresholds},
    fields::{CanonicalField, KeywordTable},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisConfig {
    pub fields: KeywordTable,
    pub thresholds: Thresholds,
    pub objectives: ObjectiveKeywords,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    fields: BTreeMap<CanonicalField, Vec<String>>,
    thresholds: Thresholds,
    objectives: ObjectiveKeywords,
}

impl From<ConfigFile> for AnalysisConfig {
    fn from(file: ConfigFile) -> Self {
        AnalysisConfig {
            fields: KeywordTable::default().with_overrides(file.fields),
            thresholds: file.thresholds,
            objectives: file.objectives,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let parsed: ConfigFile =
            serde_yaml::from_reader(reader).context("Parsing analysis config YAML")?;
        Ok(parsed.into())
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let parsed: ConfigFile =
            serde_yaml::from_str(contents).context("Parsing analysis config YAML")?;
        Ok(parsed.into())
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                Self::load(path).with_context(|| format!("Loading config from {path:?}"))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing analysis config to YAML")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = self.to_yaml_string()?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(serialized.as_bytes())
            .with_context(|| format!("Writing config file {path:?}"))?;
        Ok(())
    }
}
