//! Configuration types and validation for the gate
//! Author: kartik4091

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Which engine to select at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineChoice {
    /// Structural engine when compiled in, else the fallback
    Auto,
    Structural,
    Fallback,
}

impl std::str::FromStr for EngineChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(EngineChoice::Auto),
            "structural" => Ok(EngineChoice::Structural),
            "fallback" => Ok(EngineChoice::Fallback),
            other => Err(Error::Config(format!("Unknown engine: {}", other))),
        }
    }
}

/// Resource ceilings applied while parsing untrusted input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseLimits {
    pub max_nesting_depth: usize,
    pub max_decoded_stream_bytes: usize,
    pub max_objects: usize,
}

/// Global gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub upload_dir: PathBuf,
    pub max_upload_mb: u64,
    pub service_secret: String,
    pub bind_addr: String,
    pub engine: EngineChoice,
    /// Strip JS/AA keys from every dictionary reachable from the catalog
    pub deep_sweep: bool,
    pub limits: ParseLimits,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: 256,
            max_decoded_stream_bytes: 64 * MIB as usize,
            max_objects: 1_000_000,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./_uploads"),
            max_upload_mb: 15,
            service_secret: "dev-secret".to_string(),
            bind_addr: "127.0.0.1:8000".to_string(),
            engine: EngineChoice::Auto,
            deep_sweep: true,
            limits: ParseLimits::default(),
        }
    }
}

impl GateConfig {
    /// Upload ceiling in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(MIB)
    }

    /// Defaults, then the optional file, then `.env` and process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        // A missing .env is the normal case
        let _ = dotenvy::dotenv();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON or YAML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .or_else(|_| serde_yaml::from_str(&content))
            .map_err(|e| Error::Config(format!("Config parsing error: {}", e)))
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(mb) = lookup("MAX_UPLOAD_MB") {
            self.max_upload_mb = mb
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid MAX_UPLOAD_MB: {}", mb)))?;
        }
        if let Some(secret) = lookup("SERVICE_SECRET") {
            self.service_secret = secret;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(engine) = lookup("SANITIZER_ENGINE") {
            self.engine = engine.parse()?;
        }
        debug!(upload_dir = %self.upload_dir.display(), max_upload_mb = self.max_upload_mb, "Configuration overlay applied");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_upload_mb == 0 {
            return Err(Error::Config("max_upload_mb must be at least 1".into()));
        }
        if self.service_secret.is_empty() {
            return Err(Error::Config("service_secret must not be empty".into()));
        }
        if self.limits.max_nesting_depth == 0
            || self.limits.max_decoded_stream_bytes == 0
            || self.limits.max_objects == 0
        {
            return Err(Error::Config("Parse limits must be non-zero".into()));
        }
        Ok(())
    }
}
