//! Configuration stored in `sidecheck.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::marker::{MarkerRegistry, MarkerRule};
use crate::core::side::Side;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "sidecheck.toml";

/// Scanner configuration (TOML).
///
/// Missing fields default to an empty classpath, no fixed side and the
/// built-in markers only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SidecheckConfig {
    /// Side the host runs on. The `--side` flag takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,

    /// Class directories and jars searched in order.
    pub classpath: Vec<PathBuf>,

    /// Extra markers on top of the built-in registry.
    pub markers: Vec<MarkerConfig>,
}

/// One additional side marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkerConfig {
    /// Annotation class name, internal name or descriptor.
    pub annotation: String,
    pub rule: MarkerRule,
}

impl SidecheckConfig {
    pub fn validate(&self) -> Result<()> {
        for (idx, entry) in self.classpath.iter().enumerate() {
            if entry.as_os_str().is_empty() {
                return Err(anyhow!("classpath[{idx}] must not be empty"));
            }
        }
        for (idx, marker) in self.markers.iter().enumerate() {
            let name = marker.annotation.trim();
            if name.is_empty() {
                return Err(anyhow!("markers[{idx}].annotation must not be empty"));
            }
            if name.chars().any(char::is_whitespace) {
                return Err(anyhow!(
                    "markers[{idx}].annotation must not contain whitespace (got '{name}')"
                ));
            }
        }
        Ok(())
    }

    /// Built-in markers extended with the configured ones.
    pub fn registry(&self) -> MarkerRegistry {
        MarkerRegistry::builtin().extended(
            self.markers
                .iter()
                .map(|marker| (marker.annotation.clone(), marker.rule)),
        )
    }

    /// Resolve relative classpath entries against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for entry in &mut self.classpath {
            if entry.is_relative() {
                *entry = base.join(&*entry);
            }
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SidecheckConfig::default()`. Relative
/// classpath entries are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<SidecheckConfig> {
    if !path.exists() {
        return Ok(SidecheckConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: SidecheckConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    if let Some(base) = path.parent() {
        cfg.resolve_paths(base);
    }
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SidecheckConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
