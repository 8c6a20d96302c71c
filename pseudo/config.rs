//! Run configuration, persisted as TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

use crate::aalen_johansen::DEFAULT_CENSORING_STATE;
use crate::data::{DEFAULT_STATE_COLUMN, DEFAULT_TIME_COLUMN, SampleColumns};
use crate::engine::{DEFAULT_ROW_INDEX_COLUMN, EngineOptions};

pub const DEFAULT_OUTPUT: &str = "pseudo_observations.tsv";

/// Which values the output blocks hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    Pseudo,
    LeaveOneOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PseudoConfig {
    pub time_column: String,
    pub state_column: String,
    pub censoring_state: u32,
    pub row_index_column: String,
    pub output: String,
    pub fixed_time_horizon: Option<f64>,
    pub mode: OutputMode,
}

impl Default for PseudoConfig {
    fn default() -> Self {
        Self {
            time_column: DEFAULT_TIME_COLUMN.to_string(),
            state_column: DEFAULT_STATE_COLUMN.to_string(),
            censoring_state: DEFAULT_CENSORING_STATE,
            row_index_column: DEFAULT_ROW_INDEX_COLUMN.to_string(),
            output: DEFAULT_OUTPUT.to_string(),
            fixed_time_horizon: None,
            mode: OutputMode::Pseudo,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error while reading or writing the configuration: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse configuration from TOML format: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Configuration field '{0}' must not be empty.")]
    EmptyField(&'static str),
    #[error("Column name '{0}' is used for more than one role.")]
    DuplicateColumn(String),
}

impl PseudoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("time_column", &self.time_column),
            ("state_column", &self.state_column),
            ("row_index_column", &self.row_index_column),
            ("output", &self.output),
        ];
        for (field, value) in named {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField(field));
            }
        }
        let columns = [&self.time_column, &self.state_column, &self.row_index_column];
        for (i, a) in columns.iter().enumerate() {
            if columns[i + 1..].contains(a) {
                return Err(ConfigError::DuplicateColumn(a.to_string()));
            }
        }
        Ok(())
    }

    pub fn sample_columns(&self) -> SampleColumns {
        SampleColumns {
            time: self.time_column.clone(),
            state: self.state_column.clone(),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            row_index_column: self.row_index_column.clone(),
        }
    }

    /// Saves the configuration to a TOML file.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file. Missing fields
    /// take their defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}
