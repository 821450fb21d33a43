//! Degraded engine backed by `lopdf`
//!
//! Only the coarse operations are applied: the document info is replaced and
//! page annotations are filtered. Catalog-level actions and name trees are
//! left alone, which is why reports from this engine carry the degraded note.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::cleaner::{filter_annots, listed_references, sever_references};
use crate::error::{Error, Result, StructureError};
use crate::security;
use crate::types::{EngineMode, RemovalCategory, RemovalCounters};

use super::SanitizeEngine;

#[derive(Debug, Clone, Default)]
pub struct FallbackEngine;

impl FallbackEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SanitizeEngine for FallbackEngine {
    type Document = Document;

    fn mode(&self) -> EngineMode {
        EngineMode::Degraded
    }

    fn parse(&self, data: &[u8]) -> Result<Document> {
        // The loader may try an empty password on its own; refuse first
        if security::has_encrypt_marker(data) {
            return Err(Error::PasswordProtected);
        }
        Document::load_mem(data).map_err(|e| {
            security::classify_parse_failure(data, StructureError::corrupted(0, e.to_string()))
        })
    }

    fn check_encryption(&self, _data: &[u8], doc: &Document) -> Result<()> {
        if doc.trailer.has(b"Encrypt") {
            return Err(Error::PasswordProtected);
        }
        Ok(())
    }

    fn page_count(&self, doc: &Document) -> usize {
        doc.get_pages().len()
    }

    fn scrub(&self, doc: &mut Document) -> Result<RemovalCounters> {
        let mut counters = RemovalCounters::new();

        let info = allocate_id(doc)?;
        doc.objects.insert(info, Object::Dictionary(Dictionary::new()));
        doc.trailer.set("Info", Object::Reference(info));
        counters.increment(RemovalCategory::MetadataCleared);

        let mut dropped = HashSet::new();
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page in pages {
            dropped.extend(clean_page(doc, page, &mut counters));
        }
        if !dropped.is_empty() {
            // Popups and replies would otherwise keep dropped annotations alive
            let severed: usize = doc
                .objects
                .values_mut()
                .map(|obj| sever_references(obj, &dropped))
                .sum();
            debug!(dropped = dropped.len(), severed, "Links to dropped annotations cut");
        }
        Ok(counters)
    }

    fn serialize(&self, doc: &mut Document) -> Result<Vec<u8>> {
        let pruned = doc.prune_objects();
        debug!(pruned = pruned.len(), "Dropped unreachable objects");
        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| Error::SerializationFailure(e.to_string()))?;
        Ok(out)
    }
}

/// Next free identifier. The loader takes `max_id` from the trailer's
/// `/Size`, which may sit below objects actually present.
fn allocate_id(doc: &mut Document) -> Result<ObjectId> {
    let highest = doc
        .objects
        .keys()
        .next_back()
        .map_or(0, |id| id.0)
        .max(doc.max_id);
    let number = highest
        .checked_add(1)
        .ok_or_else(|| StructureError::corrupted(0, "object numbers exhausted"))?;
    doc.max_id = number;
    Ok((number, 0))
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn clean_page(doc: &mut Document, page: ObjectId, counters: &mut RemovalCounters) -> Vec<ObjectId> {
    let annots = match doc.get_object(page).and_then(Object::as_dict) {
        Ok(dict) => match dict.get(b"Annots") {
            Ok(annots) => annots.clone(),
            Err(_) => return Vec::new(),
        },
        Err(_) => return Vec::new(),
    };

    let (kept, dropped) = match filter_annots(&annots, |obj| resolve(doc, obj)) {
        Ok(filtered) => {
            for hit in filtered.hits {
                counters.increment(hit);
            }
            (filtered.kept, filtered.dropped)
        }
        Err(reason) => {
            warn!(page = ?page, ?reason, "Malformed annotations, dropping all on page");
            counters.increment(RemovalCategory::AnnotationsRemoved);
            (Vec::new(), listed_references(&annots, |obj| resolve(doc, obj)))
        }
    };

    if let Ok(dict) = doc.get_object_mut(page).and_then(Object::as_dict_mut) {
        dict.set("Annots", Object::Array(kept));
    }
    dropped
}
