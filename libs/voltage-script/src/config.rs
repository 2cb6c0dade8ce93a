//! Engine configuration
//!
//! Scripts, channel table and solar parameters come from one file (YAML,
//! JSON or TOML) with `VOLTAGE_SCRIPT_` environment overrides. Nested keys
//! are separated by `__`, e.g. `VOLTAGE_SCRIPT_COMPILER__MAX_NESTING_DEPTH=4`.
//!
//! ```yaml
//! compiler:
//!   max_nesting_depth: 8
//! channels:
//!   - { vchannel: 0, vmult: 1.0 }
//!   - { vchannel: 0 }
//! solar:
//!   peak_watts: 3500
//! integrations:
//!   - { name: grid, units: Watts, script: "I1" }
//! outputs:
//!   - { name: import, units: kWh, script: "G+grid" }
//! ```

use crate::compiler::CompileOptions;
use crate::engine::ScriptEngine;
use crate::error::{Result, ScriptError};
use crate::sample::ChannelTable;
use crate::solar::SimulatedSolar;
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "VOLTAGE_SCRIPT_";

/// One script definition: name, unit string and formula text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub name: String,
    /// Unit name; empty or unknown means Watts
    #[serde(default)]
    pub units: String,
    pub script: String,
}

impl ScriptConfig {
    pub fn new(name: impl Into<String>, units: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            script: script.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub compiler: CompileOptions,
    #[serde(default)]
    pub channels: ChannelTable,
    /// Simulated solar array behind virtual channel 0
    #[serde(default)]
    pub solar: Option<SimulatedSolar>,
    /// In dependency order: each may reference the ones before it
    #[serde(default)]
    pub integrations: Vec<ScriptConfig>,
    #[serde(default)]
    pub outputs: Vec<ScriptConfig>,
}

impl EngineConfig {
    /// Load from a file, format chosen by extension, then apply environment overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ScriptError::config("Config file must have an extension"))?;

        let figment = match extension {
            "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
            "json" => Figment::new().merge(Json::file(path)),
            "toml" => Figment::new().merge(Toml::file(path)),
            _ => {
                return Err(ScriptError::config(format!(
                    "Unsupported config file format: {}",
                    extension
                )))
            },
        };

        if !path.exists() {
            return Err(ScriptError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: EngineConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ScriptError::config(format!("Failed to load {}: {}", path.display(), e)))?;

        info!(
            "Loaded script config from {}: {} integrations, {} outputs, {} channels",
            path.display(),
            config.integrations.len(),
            config.outputs.len(),
            config.channels.len()
        );
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Compile every script and wire up accumulation logs
    pub fn build(&self) -> Result<ScriptEngine> {
        ScriptEngine::from_config(self)
    }
}
