use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;
use serde::{Deserialize, Serialize};
use url::Url;

use infra::persistence::FileStorage;

use crate::gemini::ApiKey;

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_SCRIPT_URL: &str = "https://script.google.com/macros/s/AKfycbxSbm2_MC7RFB8YBh7XEJX7X9-Qp1i6_wvd1lzayxpEP2dF-Z99oHkD__amudmkrg/exec";
const DEFAULT_STORAGE_PATH: &str = ".takeout";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(display = "invalid url for {}: {:?}", _0, _1)]
    InvalidUrl(&'static str, String),
    #[error(display = "model name must not be empty")]
    EmptyModel,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub sheet: SheetConfig,
    pub storage: StorageConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<ApiKey>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct SheetConfig {
    pub script_url: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

/// Overrides read from `TAKEOUT_*` environment variables.
#[derive(Deserialize, Debug, Default)]
struct EnvOverrides {
    api_key: Option<String>,
    storage_path: Option<PathBuf>,
    script_url: Option<String>,
    model: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct EnvLogger {
    level: Option<LogLevel>,
    modules: HashMap<String, LogLevel>,
    timestamp_nanos: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        SheetConfig {
            script_url: DEFAULT_SCRIPT_URL.to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: PathBuf::from(DEFAULT_STORAGE_PATH),
        }
    }
}

impl Config {
    pub fn from_toml(src: &str) -> Result<Self> {
        let config: Config = toml::from_str(src).context("parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        let env: EnvOverrides = envy::prefixed("TAKEOUT_")
            .from_env()
            .context("read TAKEOUT_* environment")?;
        self.apply(env);
        self.validate()?;
        Ok(())
    }

    fn apply(&mut self, env: EnvOverrides) {
        debug!("Environment overrides: {:?}", env);
        if let Some(key) = env.api_key.filter(|k| !k.trim().is_empty()) {
            self.gemini.api_key = Some(ApiKey::new(key));
        }
        if let Some(path) = env.storage_path {
            self.storage.path = path;
        }
        if let Some(url) = env.script_url {
            self.sheet.script_url = url;
        }
        if let Some(model) = env.model {
            self.gemini.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gemini.endpoint()?;
        self.sheet.endpoint()?;
        if self.gemini.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        Ok(())
    }
}

impl GeminiConfig {
    /// The `generateContent` endpoint for the configured model.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let invalid = || ConfigError::InvalidUrl("gemini.base_url", self.base_url.clone());
        let mut base = Url::parse(&self.base_url).map_err(|_| invalid())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&format!("models/{}:generateContent", self.model))
            .map_err(|_| invalid())
    }
}

impl SheetConfig {
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.script_url)
            .map_err(|_| ConfigError::InvalidUrl("sheet.script_url", self.script_url.clone()))?;
        url.query_pairs_mut().append_pair("action", "saveOrder");
        Ok(url)
    }
}

impl StorageConfig {
    pub fn build(&self) -> Result<FileStorage> {
        debug!("Build storage from {:?}", self);
        let storage = FileStorage::open(&self.path).context("open storage")?;
        Ok(storage)
    }
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}

pub fn read_file(path: &Path) -> Result<String> {
    let mut config_buf = String::new();
    File::open(path)
        .with_context(|| format!("open {:?}", path))?
        .read_to_string(&mut config_buf)
        .with_context(|| format!("read {:?}", path))?;
    Ok(config_buf)
}
