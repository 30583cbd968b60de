//! Configuration record: a `serde`-deserialized settings file, mirroring the
//! original `lab2/config.json` shape but with typed enums in place of raw
//! strings.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::LearnerError;
use crate::teacher::MatMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnerMode {
    Manual,
    Automatic,
}

fn default_epsilon() -> String {
    "ε".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub alphabet: String,
    #[serde(default = "default_epsilon")]
    pub epsilon: String,
    pub learner_mode: LearnerMode,
    pub server_address: String,
    pub server_port: String,
    pub mat_mode: ConfigMatMode,
}

/// A `serde`-friendly mirror of `MatMode`; kept separate so the wire-facing
/// `teacher` module doesn't need to know about `serde`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMatMode {
    Easy,
    Medium,
    Hard,
}

impl From<ConfigMatMode> for MatMode {
    fn from(mode: ConfigMatMode) -> Self {
        match mode {
            ConfigMatMode::Easy => MatMode::Easy,
            ConfigMatMode::Medium => MatMode::Medium,
            ConfigMatMode::Hard => MatMode::Hard,
        }
    }
}

impl Config {
    pub fn alphabet_symbols(&self) -> Vec<char> {
        self.alphabet.chars().collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config, LearnerError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| LearnerError::Configuration(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| LearnerError::Configuration(format!("parsing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_well_formed_config() {
        let json = r#"{
            "alphabet": "ab",
            "epsilon": "ε",
            "learner_mode": "automatic",
            "server_address": "127.0.0.1",
            "server_port": "8080",
            "mat_mode": "easy"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.alphabet_symbols(), vec!['a', 'b']);
        assert_eq!(config.learner_mode, LearnerMode::Automatic);
        assert_eq!(config.mat_mode, ConfigMatMode::Easy);
    }

    #[test]
    fn epsilon_defaults_when_absent() {
        let json = r#"{
            "alphabet": "ab",
            "learner_mode": "manual",
            "server_address": "127.0.0.1",
            "server_port": "8080",
            "mat_mode": "hard"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.epsilon, "ε");
    }

    #[test]
    fn malformed_config_is_configuration_error() {
        let dir = std::env::temp_dir().join("mat_learner_config_test_missing.json");
        let err = load_config(&dir).unwrap_err();
        assert!(matches!(err, LearnerError::Configuration(_)));
    }
}
