//! Sanitization engines
//! Author: kartik4091
//!
//! An engine owns the parse, encryption check, scrub and serialize steps for
//! one document representation. Which engine runs is decided once at startup.

use tracing::info;

use crate::config::{EngineChoice, GateConfig};
use crate::error::{Error, Result};
use crate::types::{EngineMode, RemovalCounters};

#[cfg(feature = "fallback-engine")]
pub mod fallback;
#[cfg(feature = "structural-engine")]
pub mod structural;

#[cfg(feature = "fallback-engine")]
pub use fallback::FallbackEngine;
#[cfg(feature = "structural-engine")]
pub use structural::StructuralEngine;

/// The steps every engine provides. Each document is exclusively owned by a
/// single run.
pub trait SanitizeEngine: Send + Sync {
    type Document;

    /// Guarantee level reported in `notes`
    fn mode(&self) -> EngineMode;

    /// Parse validated bytes. Failures of documents that declare encryption
    /// are reported as [`Error::PasswordProtected`].
    fn parse(&self, data: &[u8]) -> Result<Self::Document>;

    fn check_encryption(&self, data: &[u8], doc: &Self::Document) -> Result<()>;

    fn page_count(&self, doc: &Self::Document) -> usize;

    fn scrub(&self, doc: &mut Self::Document) -> Result<RemovalCounters>;

    fn serialize(&self, doc: &mut Self::Document) -> Result<Vec<u8>>;
}

/// Engine implementations that can be selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Structural,
    Fallback,
}

/// Which engines this build carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub structural: bool,
    pub fallback: bool,
}

impl Availability {
    pub fn compiled() -> Self {
        Self {
            structural: cfg!(feature = "structural-engine"),
            fallback: cfg!(feature = "fallback-engine"),
        }
    }
}

/// Resolve a configured choice against what is available.
pub fn resolve_choice(choice: EngineChoice, available: Availability) -> Result<EngineKind> {
    match choice {
        EngineChoice::Auto if available.structural => Ok(EngineKind::Structural),
        EngineChoice::Auto if available.fallback => Ok(EngineKind::Fallback),
        EngineChoice::Auto => Err(Error::EngineUnavailable(
            "no sanitization engine compiled in".into(),
        )),
        EngineChoice::Structural if available.structural => Ok(EngineKind::Structural),
        EngineChoice::Fallback if available.fallback => Ok(EngineKind::Fallback),
        other => Err(Error::EngineUnavailable(format!(
            "{:?} engine not compiled in",
            other
        ))),
    }
}

/// The engine selected for this process
#[derive(Debug, Clone)]
pub enum Engine {
    #[cfg(feature = "structural-engine")]
    Structural(StructuralEngine),
    #[cfg(feature = "fallback-engine")]
    Fallback(FallbackEngine),
}

impl Engine {
    pub fn select(config: &GateConfig) -> Result<Self> {
        let kind = resolve_choice(config.engine, Availability::compiled())?;
        let engine = Self::build(kind, config)?;
        info!(engine = ?kind, mode = ?engine.mode(), "Sanitization engine selected");
        Ok(engine)
    }

    #[allow(unused_variables)]
    fn build(kind: EngineKind, config: &GateConfig) -> Result<Self> {
        match kind {
            #[cfg(feature = "structural-engine")]
            EngineKind::Structural => Ok(Engine::Structural(StructuralEngine::new(
                config.limits,
                config.deep_sweep,
            ))),
            #[cfg(feature = "fallback-engine")]
            EngineKind::Fallback => Ok(Engine::Fallback(FallbackEngine::new())),
            #[allow(unreachable_patterns)]
            other => Err(Error::EngineUnavailable(format!(
                "{:?} engine not compiled in",
                other
            ))),
        }
    }

    pub fn mode(&self) -> EngineMode {
        match *self {
            #[cfg(feature = "structural-engine")]
            Engine::Structural(ref engine) => engine.mode(),
            #[cfg(feature = "fallback-engine")]
            Engine::Fallback(ref engine) => engine.mode(),
        }
    }
}
