//! Parameter store selection
//!
//! Parameters back `{ parameter = "/key" }` environment values and are
//! resolved while planning, never at apply time. Three sources:
//!
//! - the default file at `~/.config/gantry/parameters.toml`
//! - an explicit file given as `--params <path>`
//! - a remote store given as `--params <http(s) url>`, queried with
//!   `GET {base}/{key}` answering the raw value in the body

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use topology::{Error as TopologyError, ParameterStore};

/// Default parameter file location
pub fn default_params_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("gantry").join("parameters.toml"))
}

/// Pick a store from the `--params` argument.
///
/// An absent default file is not an error; lookups against the empty
/// store fail individually instead.
pub fn open(source: Option<&str>) -> Result<Box<dyn ParameterStore>> {
    match source {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Ok(Box::new(HttpParameters::new(url)))
        }
        Some(path) => {
            let path = crate::config::expand(Path::new(path));
            Ok(Box::new(FileParameters::load(&path)?))
        }
        None => {
            let path = default_params_path()?;
            if path.exists() {
                Ok(Box::new(FileParameters::load(&path)?))
            } else {
                log::debug!("No parameter file at {}", path.display());
                Ok(Box::new(FileParameters::default()))
            }
        }
    }
}

/// Flat TOML file of `"key" = "value"` pairs
///
/// Slash-prefixed keys need TOML quoting: `"/cloudflare/zone_id" = "..."`.
#[derive(Debug, Clone, Default)]
pub struct FileParameters {
    values: BTreeMap<String, String>,
}

impl FileParameters {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let values: BTreeMap<String, String> = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?;
        log::debug!("Loaded {} parameters from {}", values.len(), path.display());
        Ok(Self { values })
    }
}

impl ParameterStore for FileParameters {
    fn get(&self, key: &str) -> topology::Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| TopologyError::Parameter {
                key: key.to_string(),
                reason: "parameter not found".to_string(),
            })
    }
}

/// Remote parameter store speaking plain HTTP
pub struct HttpParameters {
    agent: ureq::Agent,
    base: String,
}

impl HttpParameters {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base, key.trim_start_matches('/'))
    }
}

impl ParameterStore for HttpParameters {
    fn get(&self, key: &str) -> topology::Result<String> {
        let url = self.url_for(key);
        log::debug!("Fetching parameter {key} from {url}");

        let mut response =
            self.agent
                .get(&url)
                .call()
                .map_err(|e| TopologyError::Parameter {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;

        let value = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TopologyError::Parameter {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(value.trim_end_matches('\n').to_string())
    }
}
