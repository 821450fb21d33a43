//! Active-content scrubbing
//! Author: kartik4091
//!
//! All decisions are made from key presence and subtype names. Script bytes
//! are never read.

use std::collections::HashSet;

use tracing::{debug, info, instrument};

use super::annotation_cleaner::{AnnotationCleaner, JS_KEYS};
use crate::error::{Error, Result, StructureError};
use crate::types::{
    Dictionary, Object, ObjectExt, ObjectId, PdfDocument, RemovalCategory, RemovalCounters,
};

/// Catalog keys that run actions without user interaction
const AUTO_ACTION_KEYS: [&[u8]; 2] = [b"OpenAction", b"AA"];

/// Applies every removal rule to a parsed, unencrypted document.
#[derive(Debug, Clone, Copy)]
pub struct ActiveContentScrubber {
    deep_sweep: bool,
}

impl Default for ActiveContentScrubber {
    fn default() -> Self {
        Self { deep_sweep: true }
    }
}

impl ActiveContentScrubber {
    pub fn new(deep_sweep: bool) -> Self {
        Self { deep_sweep }
    }

    #[instrument(skip_all, fields(pages = doc.page_count()))]
    pub fn scrub(&self, doc: &mut PdfDocument) -> Result<RemovalCounters> {
        let mut counters = RemovalCounters::new();

        replace_document_info(doc, &mut counters)?;

        let catalog = doc.catalog_mut().ok_or_else(|| {
            Error::MalformedStructure(StructureError::MissingObject("catalog".into()))
        })?;
        if catalog.remove(b"Metadata").is_some() {
            counters.increment(RemovalCategory::MetadataCleared);
        }
        for key in AUTO_ACTION_KEYS {
            if catalog.remove(key).is_some() {
                counters.increment(RemovalCategory::OpenActions);
            }
        }

        clean_names(doc, &mut counters);
        AnnotationCleaner::clean_pages(doc, &mut counters);

        if self.deep_sweep {
            sweep_reachable(doc, &mut counters);
        }

        info!(
            active = counters.active_content_total(),
            metadata = counters.get(RemovalCategory::MetadataCleared),
            "Scrub complete"
        );
        Ok(counters)
    }
}

/// Point the trailer at a brand new, empty, indirect info dictionary.
pub fn replace_document_info(doc: &mut PdfDocument, counters: &mut RemovalCounters) -> Result<()> {
    let info = doc.add_object(Dictionary::new().into())?;
    doc.trailer.set("Info", info);
    counters.increment(RemovalCategory::MetadataCleared);
    debug!(info = ?info, "Document info replaced");
    Ok(())
}

/// Drop the `JavaScript` and `EmbeddedFiles` name trees, each counted once.
fn clean_names(doc: &mut PdfDocument, counters: &mut RemovalCounters) {
    let names_ref = doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Names").ok())
        .and_then(|names| names.as_reference().ok());
    let names = match names_ref {
        Some(id) => doc.get_mut(id).and_then(ObjectExt::dict_mut),
        None => doc
            .catalog_mut()
            .and_then(|catalog| catalog.get_mut(b"Names").ok())
            .and_then(ObjectExt::dict_mut),
    };
    let Some(names) = names else {
        return;
    };

    if names.remove(b"JavaScript").is_some() {
        counters.increment(RemovalCategory::NamesJavaScript);
    }
    if names.remove(b"EmbeddedFiles").is_some() {
        counters.increment(RemovalCategory::EmbeddedFiles);
    }
}

/// Remove script and trigger keys from every dictionary reachable from the
/// catalog: pages, form fields, outline items and nested action chains.
pub fn sweep_reachable(doc: &mut PdfDocument, counters: &mut RemovalCounters) {
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut queue = vec![doc.catalog];

    while let Some(id) = queue.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(obj) = doc.get_mut(id) {
            sweep_value(obj, counters, &mut queue);
        }
    }
    debug!(visited = visited.len(), "Reachability sweep done");
}

fn sweep_value(obj: &mut Object, counters: &mut RemovalCounters, queue: &mut Vec<ObjectId>) {
    match obj {
        Object::Reference(id) => queue.push(*id),
        Object::Array(items) => {
            for item in items.iter_mut() {
                sweep_value(item, counters, queue);
            }
        }
        Object::Dictionary(dict) => sweep_dict(dict, counters, queue),
        Object::Stream(stream) => sweep_dict(&mut stream.dict, counters, queue),
        _ => {}
    }
}

fn sweep_dict(dict: &mut Dictionary, counters: &mut RemovalCounters, queue: &mut Vec<ObjectId>) {
    for key in JS_KEYS {
        if dict.remove(key).is_some() {
            counters.increment(RemovalCategory::JavaScript);
        }
    }
    for key in AUTO_ACTION_KEYS {
        if dict.remove(key).is_some() {
            counters.increment(RemovalCategory::OpenActions);
        }
    }
    for (_, value) in dict.iter_mut() {
        sweep_value(value, counters, queue);
    }
}
