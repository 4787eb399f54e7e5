//! JSON case descriptions and the metadata written next to generated cases.

use crate::cases::{CaseOptions, OffsetRules, PreparedCase, Preset, SsboCase};
use crate::random_case::{Features, RandomCase};
use crate::storage::BlockLocation;
use crate::support::{SupportRequirements, TestStatus};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_owned(),
        source,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Preset(Preset),
    /// Only `use_physical_storage_buffer` of the options applies; everything
    /// else is drawn from the seed.
    Random { features: Features, seed: u32 },
}

/// One case as described on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseConfig {
    pub name: String,
    pub case: CaseKind,
    #[serde(default)]
    pub options: CaseOptions,
}

impl CaseConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(io_error(path))?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?).map_err(io_error(path))
    }

    pub fn build(&self) -> SsboCase {
        match &self.case {
            CaseKind::Preset(preset) => preset.build(self.name.clone(), &self.options),
            CaseKind::Random { features, seed } => RandomCase::generate(
                self.name.clone(),
                *features,
                *seed,
                self.options.use_physical_storage_buffer,
            ),
        }
    }
}

/// What a harness needs to know about a generated case besides its data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub name: String,
    pub buffer_sizes: Vec<usize>,
    pub block_locations: Vec<BlockLocation>,
    pub offset_rules: OffsetRules,
    pub requirements: SupportRequirements,
    /// Set once the case has been judged, or when it was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TestStatus>,
}

impl CaseMetadata {
    pub fn new(prepared: &PreparedCase, binding_alignment: usize) -> Self {
        Self {
            name: prepared.case.name.clone(),
            buffer_sizes: prepared.sizes.clone(),
            block_locations: prepared.block_locations(binding_alignment),
            offset_rules: prepared.offset_rules,
            requirements: prepared.requirements.clone(),
            status: None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(io_error(path))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?).map_err(io_error(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::LayoutFlags;
    use pretty_assertions::assert_eq;

    #[test]
    fn preset_config_from_json() {
        let json = r#"{
            "name": "single_struct_array",
            "case": { "preset": { "kind": "single_struct_array", "num_instances": 3 } },
            "options": { "layout": "STD140", "buffer_mode": "single" }
        }"#;
        let config: CaseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.options.layout, LayoutFlags::STD140);

        let case = config.build();
        assert_eq!(case.name, "single_struct_array");
        assert_eq!(case.interface.block(0).array_size(), 3);
    }

    #[test]
    fn basic_type_config_names_types_like_glsl() {
        let json = r#"{
            "name": "mat3x2",
            "case": { "preset": { "kind": "basic_type", "ty": { "basic": { "data_type": "mat3x2", "precision": null } } } }
        }"#;
        let config: CaseConfig = serde_json::from_str(json).unwrap();
        let case = config.build();
        let members = case.interface.block(0).members();
        assert_eq!(members[0].ty().basic_type().unwrap().to_string(), "mat3x2");
    }

    #[test]
    fn round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaseConfig {
            name: "random_7".into(),
            case: CaseKind::Random {
                features: Features::ALL_STD_LAYOUTS | Features::STRUCTS,
                seed: 7,
            },
            options: CaseOptions::default(),
        };
        let path = dir.path().join("case.json");
        config.write(&path).unwrap();
        assert_eq!(CaseConfig::from_path(&path).unwrap(), config);

        let prepared = config.build().prepare();
        let metadata = CaseMetadata::new(&prepared, 256);
        let path = dir.path().join("metadata.json");
        metadata.write(&path).unwrap();
        assert_eq!(CaseMetadata::from_path(&path).unwrap(), metadata);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CaseConfig::from_path("/nonexistent/case.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/case.json"));
    }
}
