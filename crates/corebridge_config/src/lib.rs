use std::path::Path;

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to open file: {0}")]
    Io(String),

    #[error("Failed to parse YAML: {0}")]
    Yaml(String),

    #[error("Missing configuration key `{0}`")]
    MissingKey(String),

    #[error("Configuration key `{key}` is not a number: {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("Duplicate {kind} name `{name}`")]
    Duplicate { kind: &'static str, name: String },

    #[error("{0}")]
    Invalid(String),
}

/// Manifest describing the component surface the bridge is built for.
///
/// The export table is indexed in insertion order: the host's call index `i`
/// refers to the `i`-th entry of `exports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Name of the source module whose exports are bound.
    pub source_name: String,
    /// Trace every call signature to the diagnostic stream.
    #[serde(default)]
    pub debug: bool,
    /// Enables the wall-clock feature (time origin latched on the first call).
    #[serde(default)]
    pub clocks: bool,
    /// Host imports made available to the guest, in binding order.
    #[serde(default)]
    pub imports: IndexMap<String, ImportConfig>,
    /// Component exports, in call-index order.
    #[serde(default)]
    pub exports: IndexMap<String, ExportConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// Number of core arguments the import takes.
    pub argcnt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Parameter descriptor, e.g. `i32,i64` or `*` for a packed parameter block.
    pub args: String,
    /// Return descriptor, e.g. `f64`, `*i32`, or empty for no return value.
    pub ret: String,
    /// Size in bytes of the result buffer.
    pub retsize: u32,
}

impl BridgeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file =
            std::fs::File::open(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: BridgeConfig =
            serde_yaml::from_reader(file).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(src: &str) -> Result<Self> {
        let config: BridgeConfig =
            serde_yaml::from_str(src).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read the manifest from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the manifest through `lookup`, using the environment key layout
    /// (`EXPORT_CNT`, `EXPORT{i}_NAME`, ...). Every key is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingKey(key.to_string()));
        let get_u32 = |key: &str| -> Result<u32> {
            let value = get(key)?;
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: key.to_string(),
                    value,
                })
        };

        let debug = get_u32(env::DEBUG)? != 0;
        let clocks = get_u32(env::FEATURE_CLOCKS)? != 0;
        let source_name = get(env::SOURCE_NAME)?;

        let mut imports = IndexMap::new();
        for i in 0..get_u32(env::IMPORT_CNT)? {
            let name = get(&format!("IMPORT{i}_NAME"))?;
            let argcnt = get_u32(&format!("IMPORT{i}_ARGCNT"))?;
            insert_unique(&mut imports, "import", name, ImportConfig { argcnt })?;
        }

        let mut exports = IndexMap::new();
        for i in 0..get_u32(env::EXPORT_CNT)? {
            let name = get(&format!("EXPORT{i}_NAME"))?;
            let export = ExportConfig {
                args: get(&format!("EXPORT{i}_ARGS"))?,
                ret: get(&format!("EXPORT{i}_RET"))?,
                retsize: get_u32(&format!("EXPORT{i}_RETSIZE"))?,
            };
            insert_unique(&mut exports, "export", name, export)?;
        }

        let config = BridgeConfig {
            source_name,
            debug,
            clocks,
            imports,
            exports,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.source_name.is_empty() {
            return Err(ConfigError::Invalid(
                "Source module name must not be empty".to_string(),
            ));
        }

        if self.imports.keys().any(|name| name.is_empty()) {
            return Err(ConfigError::Invalid(
                "Import name must not be empty".to_string(),
            ));
        }

        if self.exports.keys().any(|name| name.is_empty()) {
            return Err(ConfigError::Invalid(
                "Export name must not be empty".to_string(),
            ));
        }

        // A boxed result is written through a buffer of exactly `retsize` bytes.
        if let Some((name, _)) = self
            .exports
            .iter()
            .find(|(_, export)| export.ret.starts_with('*') && export.retsize == 0)
        {
            return Err(ConfigError::Invalid(format!(
                "Export `{name}` returns through a pointer but has no retsize"
            )));
        }

        Ok(())
    }
}

fn insert_unique<V>(
    map: &mut IndexMap<String, V>,
    kind: &'static str,
    name: String,
    value: V,
) -> Result<()> {
    match map.entry(name) {
        Entry::Occupied(entry) => Err(ConfigError::Duplicate {
            kind,
            name: entry.key().clone(),
        }),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

/// Environment keys of the manifest.
pub mod env {
    pub const DEBUG: &str = "DEBUG";
    pub const FEATURE_CLOCKS: &str = "FEATURE_CLOCKS";
    pub const SOURCE_NAME: &str = "SOURCE_NAME";
    pub const IMPORT_CNT: &str = "IMPORT_CNT";
    pub const EXPORT_CNT: &str = "EXPORT_CNT";
}
