//! Audit report types returned to callers

use serde::{Deserialize, Serialize};

/// Removal categories tracked during scrubbing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCategory {
    JavaScript,
    OpenActions,
    EmbeddedFiles,
    AnnotationsRemoved,
    NamesJavaScript,
    MetadataCleared,
}

/// Per-category removal counts. Start at zero and only ever go up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalCounters {
    javascript: u32,
    open_actions: u32,
    embedded_files: u32,
    annotations_removed: u32,
    names_javascript: u32,
    metadata_cleared: u32,
}

impl RemovalCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, category: RemovalCategory) {
        *self.slot(category) += 1;
    }

    pub fn get(&self, category: RemovalCategory) -> u32 {
        match category {
            RemovalCategory::JavaScript => self.javascript,
            RemovalCategory::OpenActions => self.open_actions,
            RemovalCategory::EmbeddedFiles => self.embedded_files,
            RemovalCategory::AnnotationsRemoved => self.annotations_removed,
            RemovalCategory::NamesJavaScript => self.names_javascript,
            RemovalCategory::MetadataCleared => self.metadata_cleared,
        }
    }

    /// Sum over every category except `metadata_cleared`.
    pub fn active_content_total(&self) -> u32 {
        self.javascript
            + self.open_actions
            + self.embedded_files
            + self.annotations_removed
            + self.names_javascript
    }

    fn slot(&mut self, category: RemovalCategory) -> &mut u32 {
        match category {
            RemovalCategory::JavaScript => &mut self.javascript,
            RemovalCategory::OpenActions => &mut self.open_actions,
            RemovalCategory::EmbeddedFiles => &mut self.embedded_files,
            RemovalCategory::AnnotationsRemoved => &mut self.annotations_removed,
            RemovalCategory::NamesJavaScript => &mut self.names_javascript,
            RemovalCategory::MetadataCleared => &mut self.metadata_cleared,
        }
    }
}

/// Guarantee level of the engine that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Every scrubbing rule enforced
    Full,
    /// Coarse fallback; catalog-level removal not guaranteed
    Degraded,
}

impl EngineMode {
    pub fn notes(self) -> &'static str {
        match self {
            EngineMode::Full => "Sanitization complete",
            EngineMode::Degraded => {
                "Sanitization complete (degraded fallback engine: catalog-level OpenAction/AA/Names removal not guaranteed)"
            }
        }
    }
}

/// The audit record for one sanitized upload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationReport {
    pub file_id: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub is_pdf: bool,
    pub is_encrypted: bool,
    pub pages: usize,
    pub removed: RemovalCounters,
    pub notes: String,
    pub sanitized_path: String,
}
