//! Primary engine built on the in-crate parser, scrubber and serializer

use crate::cleaner::ActiveContentScrubber;
use crate::config::ParseLimits;
use crate::error::Result;
use crate::output;
use crate::security;
use crate::structure::parse_document;
use crate::types::{EngineMode, PdfDocument, RemovalCounters};

use super::SanitizeEngine;

/// Full-guarantee engine: every scrubbing rule is enforced.
#[derive(Debug, Clone)]
pub struct StructuralEngine {
    limits: ParseLimits,
    scrubber: ActiveContentScrubber,
}

impl StructuralEngine {
    pub fn new(limits: ParseLimits, deep_sweep: bool) -> Self {
        Self {
            limits,
            scrubber: ActiveContentScrubber::new(deep_sweep),
        }
    }
}

impl Default for StructuralEngine {
    fn default() -> Self {
        Self::new(ParseLimits::default(), true)
    }
}

impl SanitizeEngine for StructuralEngine {
    type Document = PdfDocument;

    fn mode(&self) -> EngineMode {
        EngineMode::Full
    }

    fn parse(&self, data: &[u8]) -> Result<PdfDocument> {
        parse_document(data, &self.limits).map_err(|e| security::classify_parse_failure(data, e))
    }

    fn check_encryption(&self, _data: &[u8], doc: &PdfDocument) -> Result<()> {
        security::check_document(doc)
    }

    fn page_count(&self, doc: &PdfDocument) -> usize {
        doc.page_count()
    }

    fn scrub(&self, doc: &mut PdfDocument) -> Result<RemovalCounters> {
        self.scrubber.scrub(doc)
    }

    fn serialize(&self, doc: &mut PdfDocument) -> Result<Vec<u8>> {
        output::serialize(doc)
    }
}
