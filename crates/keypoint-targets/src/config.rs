//! JSON configuration of a recognition setup.

use keypoint_targets_orb::OrbParams;
use keypoint_targets_recognition::{EvaluationOptions, RecognitionParams};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_tag() -> String {
    "orb".to_string()
}

/// Everything the CLI needs: list files, directories, naming tag and the
/// detector / recognition parameters. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reference_list: PathBuf,
    /// Directory the reference list's filenames are relative to.
    pub reference_dir: PathBuf,
    pub test_list: PathBuf,
    /// Directory the test list's filenames are relative to.
    pub test_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Names outputs of this configuration (`<tag>_results.json`, ...).
    #[serde(default = "default_tag")]
    pub tag: String,
    /// TrueType/OpenType font for overlay text; overlays carry no text
    /// without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<PathBuf>,
    pub recognition: RecognitionParams,
    pub orb: OrbParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reference_list: PathBuf::from("imgs/references.txt"),
            reference_dir: PathBuf::from("imgs/references"),
            test_list: PathBuf::from("imgs/tests.txt"),
            test_dir: PathBuf::from("imgs/tests"),
            output_dir: PathBuf::from("output"),
            tag: default_tag(),
            font: None,
            recognition: RecognitionParams::default(),
            orb: OrbParams::default(),
        }
    }
}

impl AppConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn evaluation_options(&self, save_results: bool) -> EvaluationOptions {
        EvaluationOptions {
            output_dir: self.output_dir.clone(),
            tag: self.tag.clone(),
            save_results,
        }
    }
}
