//! Sanitization Pipeline: Stage-by-Stage Execution
//! Author: kartik4091
//!
//! One request runs `Received → Validated → Parsed → EncryptionChecked →
//! Scrubbed → Serialized → Reported`. Any stage may end the run in
//! `Rejected(kind)`; nothing is retried.

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::config::GateConfig;
use crate::engine::{Engine, SanitizeEngine};
use crate::error::{Error, ErrorKind, Result};
use crate::report::ReportBuilder;
use crate::storage::SanitizedStore;
use crate::types::SanitizationReport;
use crate::verification::FormatValidator;

/// Per-request pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Parsed,
    EncryptionChecked,
    Scrubbed,
    Serialized,
    Reported,
    Rejected(ErrorKind),
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Reported | Stage::Rejected(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => write!(f, "Received"),
            Stage::Validated => write!(f, "Validated"),
            Stage::Parsed => write!(f, "Parsed"),
            Stage::EncryptionChecked => write!(f, "EncryptionChecked"),
            Stage::Scrubbed => write!(f, "Scrubbed"),
            Stage::Serialized => write!(f, "Serialized"),
            Stage::Reported => write!(f, "Reported"),
            Stage::Rejected(kind) => write!(f, "Rejected({})", kind),
        }
    }
}

/// Tracks the stages one run passes through.
#[derive(Debug)]
pub struct RunState {
    history: Vec<Stage>,
    started: Instant,
}

impl RunState {
    fn new() -> Self {
        Self {
            history: vec![Stage::Received],
            started: Instant::now(),
        }
    }

    pub fn current(&self) -> Stage {
        self.history.last().copied().unwrap_or(Stage::Received)
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = %self.current(), to = %next, "Stage transition");
        self.history.push(next);
    }

    /// Record the rejection and hand the error back.
    fn reject(&mut self, err: Error) -> Error {
        let stage = self.current();
        let kind = err.kind();
        warn!(%stage, %kind, error = %err, "Request rejected");
        self.history.push(Stage::Rejected(kind));
        err
    }
}

/// Orchestrates validation, the selected engine and publication. Shared by
/// concurrent requests; holds no per-request state.
pub struct Pipeline {
    validator: FormatValidator,
    engine: Engine,
    store: SanitizedStore,
}

impl Pipeline {
    /// Select the engine and open the storage directory.
    pub fn new(config: &GateConfig) -> Result<Self> {
        let engine = Engine::select(config)?;
        let store = SanitizedStore::new(&config.upload_dir)?;
        Ok(Self::from_parts(
            FormatValidator::new(config.max_upload_bytes()),
            engine,
            store,
        ))
    }

    pub fn from_parts(validator: FormatValidator, engine: Engine, store: SanitizedStore) -> Self {
        Self {
            validator,
            engine,
            store,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &SanitizedStore {
        &self.store
    }

    pub fn max_bytes(&self) -> u64 {
        self.validator.max_bytes()
    }

    /// Run one upload through every stage.
    pub fn process(&self, data: &[u8], declared_size: u64) -> Result<SanitizationReport> {
        self.process_traced(data, declared_size).0
    }

    /// Like [`Pipeline::process`], also returning the stages visited.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn process_traced(
        &self,
        data: &[u8],
        declared_size: u64,
    ) -> (Result<SanitizationReport>, RunState) {
        let mut state = RunState::new();
        let result: Result<SanitizationReport> = match self.engine {
            #[cfg(feature = "structural-engine")]
            Engine::Structural(ref engine) => self.drive(engine, data, declared_size, &mut state),
            #[cfg(feature = "fallback-engine")]
            Engine::Fallback(ref engine) => self.drive(engine, data, declared_size, &mut state),
        };
        let result = result.map_err(|e| state.reject(e));
        (result, state)
    }

    fn drive<E: SanitizeEngine>(
        &self,
        engine: &E,
        data: &[u8],
        declared_size: u64,
        state: &mut RunState,
    ) -> Result<SanitizationReport> {
        // Stage 1: Format validation
        self.validator.validate(data, declared_size)?;
        state.advance(Stage::Validated);

        // Stage 2: Parse into the engine's object model
        let mut document = engine.parse(data)?;
        state.advance(Stage::Parsed);

        // Stage 3: Refuse anything encrypted
        engine.check_encryption(data, &document)?;
        state.advance(Stage::EncryptionChecked);

        // Stage 4: Active content removal
        let pages = engine.page_count(&document);
        let removed = engine.scrub(&mut document)?;
        state.advance(Stage::Scrubbed);

        // Stage 5: Fresh byte stream
        let output = engine.serialize(&mut document)?;
        state.advance(Stage::Serialized);

        // Stage 6: Report and publish
        let builder = ReportBuilder::new(
            &output,
            declared_size.max(data.len() as u64),
            pages,
            removed,
            engine.mode(),
        );
        let path = self.store.persist(builder.file_id(), &output)?;
        let report = builder.build(&path);
        info!("{}", success_line(&report));
        state.advance(Stage::Reported);

        debug!(elapsed = ?state.started.elapsed(), "Pipeline finished");
        Ok(report)
    }
}

/// Completion log line; `size` is the upload size the report carries.
fn success_line(report: &SanitizationReport) -> String {
    let sha_prefix: String = report.sha256.chars().take(10).collect();
    format!(
        "sanitized file_id={} sha256={}... size={}",
        report.file_id, sha_prefix, report.size_bytes
    )
}
