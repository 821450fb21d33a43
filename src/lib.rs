//! Main Library File for the PDF Security Gate
//! Validates untrusted uploads, parses them into an owned object graph,
//! strips active content and writes a fresh document with an audit report.

// Configuration and Core Pipeline
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Stage 1: Format Validation
pub mod verification;

// Stage 2: Structure Parsing
pub mod structure;

// Stage 3: Encryption Detection
pub mod security;

// Stage 4: Active Content Removal
pub mod cleaner;

// Stage 5: Serialization
pub mod output;

// Stage 6: Reporting and Publication
pub mod report;
pub mod storage;

// Engines and the HTTP boundary
pub mod engine;
pub mod gateway;

pub use config::{EngineChoice, GateConfig, ParseLimits};
pub use engine::{Engine, SanitizeEngine};
pub use error::{Error, ErrorKind, Result, StructureError};
pub use pipeline::{Pipeline, Stage};
pub use storage::SanitizedStore;
pub use types::{EngineMode, PdfDocument, RemovalCategory, RemovalCounters, SanitizationReport};
pub use verification::FormatValidator;
