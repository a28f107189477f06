use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_MODEL_FILE: &str = "task_priority_model.json";
pub const DEFAULT_FEATURES_FILE: &str = "model_features.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub log: LogSection,
}

/// Artifact locations. Unset paths resolve inside the taskrank home.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    pub artifact: Option<PathBuf>,
    pub features: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Default config with every path spelled out, as written by `config init`.
    pub fn explicit(home: &Path) -> Self {
        Self {
            model: ModelSection {
                artifact: Some(home.join(DEFAULT_MODEL_FILE)),
                features: Some(home.join(DEFAULT_FEATURES_FILE)),
            },
            log: LogSection::default(),
        }
    }

    pub fn artifact_path(&self, home: &Path) -> PathBuf {
        self.model
            .artifact
            .clone()
            .unwrap_or_else(|| home.join(DEFAULT_MODEL_FILE))
    }

    pub fn features_path(&self, home: &Path) -> PathBuf {
        self.model
            .features
            .clone()
            .unwrap_or_else(|| home.join(DEFAULT_FEATURES_FILE))
    }
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

pub fn load_config(home: &Path) -> Result<Config> {
    let p = config_path(home);
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(home: &Path, cfg: &Config) -> Result<()> {
    let p = config_path(home);
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config(home: &Path) -> Result<()> {
    let p = config_path(home);
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(home, &Config::explicit(home))?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.artifact_path(dir.path()), dir.path().join(DEFAULT_MODEL_FILE));
        assert_eq!(cfg.log.filter, "info");
    }

    #[test]
    fn init_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path()).unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg, Config::explicit(dir.path()));
    }

    #[test]
    fn partial_file_fills_gaps() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            config_path(dir.path()),
            "[model]\nartifact = \"/srv/models/forest.json\"\n",
        )
        .unwrap();

        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg.artifact_path(dir.path()), PathBuf::from("/srv/models/forest.json"));
        assert_eq!(cfg.features_path(dir.path()), dir.path().join(DEFAULT_FEATURES_FILE));
        assert_eq!(cfg.log.filter, "info");
    }
}
