//! Sanitization report assembly
//! Author: kartik4091

use std::path::Path;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::{EngineMode, RemovalCounters, SanitizationReport};

/// Hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Random identifier, independent of the document content
pub fn new_file_id() -> String {
    Uuid::new_v4().to_string()
}

/// Collects the facts of one run; the storage path is supplied last, once
/// the output has been published.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    file_id: String,
    sha256: String,
    size_bytes: u64,
    pages: usize,
    removed: RemovalCounters,
    mode: EngineMode,
}

impl ReportBuilder {
    /// `output` is the serialized document; the digest is taken over it, not
    /// over the upload.
    pub fn new(
        output: &[u8],
        size_bytes: u64,
        pages: usize,
        removed: RemovalCounters,
        mode: EngineMode,
    ) -> Self {
        Self {
            file_id: new_file_id(),
            sha256: sha256_hex(output),
            size_bytes,
            pages,
            removed,
            mode,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn build(self, sanitized_path: &Path) -> SanitizationReport {
        SanitizationReport {
            file_id: self.file_id,
            sha256: self.sha256,
            size_bytes: self.size_bytes,
            is_pdf: true,
            is_encrypted: false,
            pages: self.pages,
            removed: self.removed,
            notes: self.mode.notes().to_string(),
            sanitized_path: sanitized_path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemovalCategory;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_ids_are_independent_of_content() {
        let a = ReportBuilder::new(b"same", 4, 1, RemovalCounters::new(), EngineMode::Full);
        let b = ReportBuilder::new(b"same", 4, 1, RemovalCounters::new(), EngineMode::Full);
        assert_eq!(a.sha256(), b.sha256());
        assert_ne!(a.file_id(), b.file_id());
        assert!(Uuid::parse_str(a.file_id()).is_ok());
    }

    #[test]
    fn test_build_report() {
        let mut removed = RemovalCounters::new();
        removed.increment(RemovalCategory::MetadataCleared);
        let report = ReportBuilder::new(b"%PDF-1.7", 100, 3, removed, EngineMode::Degraded)
            .build(Path::new("/tmp/x_sanitized.pdf"));

        assert!(report.is_pdf);
        assert!(!report.is_encrypted);
        assert_eq!(report.size_bytes, 100);
        assert_eq!(report.pages, 3);
        assert_eq!(report.sha256, sha256_hex(b"%PDF-1.7"));
        assert_eq!(report.notes, EngineMode::Degraded.notes());
        assert_eq!(report.sanitized_path, "/tmp/x_sanitized.pdf");
    }
}
