//! Removal of active content from parsed documents
//! Author: kartik4091

pub mod active_content;
pub mod annotation_cleaner;

pub use active_content::{replace_document_info, sweep_reachable, ActiveContentScrubber};
pub use annotation_cleaner::{
    classify, filter_annots, listed_references, sever_references, AnnotationCleaner,
    FilteredAnnots, Malformed, BLOCKED_SUBTYPES, JS_KEYS,
};
