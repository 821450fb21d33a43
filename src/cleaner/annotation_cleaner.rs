//! Per-page annotation filtering
//! Author: kartik4091

use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use crate::types::{
    Dictionary, Object, ObjectExt, ObjectId, PdfDocument, RemovalCategory, RemovalCounters,
};

/// Keys that carry script source
pub const JS_KEYS: [&[u8]; 2] = [b"JS", b"JavaScript"];

/// Annotation subtypes that embed files or media players
pub const BLOCKED_SUBTYPES: [&[u8]; 4] = [b"FileAttachment", b"RichMedia", b"Movie", b"Sound"];

/// Annotation structure the filter cannot reason about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    AnnotsNotArray,
    EntryNotDictionary,
    ActionNotDictionary,
}

/// One page's `Annots` after filtering
#[derive(Debug, Default)]
pub struct FilteredAnnots {
    pub kept: Vec<Object>,
    /// Categories hit by the dropped entries
    pub hits: Vec<RemovalCategory>,
    /// Indirect annotations taken off the page
    pub dropped: Vec<ObjectId>,
}

/// Removal categories an annotation triggers; empty means keep.
///
/// Every matching condition is counted, so an attachment annotation that
/// also carries script contributes to both categories. `resolve` follows one
/// reference hop in whichever object model the caller holds.
pub fn classify<'a, R>(annot: &'a Dictionary, resolve: R) -> Result<Vec<RemovalCategory>, Malformed>
where
    R: Fn(&'a Object) -> Option<&'a Object>,
{
    let mut hits = Vec::new();

    if let Ok(action) = annot.get(b"A") {
        let action = resolve(action)
            .and_then(|obj| obj.dict())
            .ok_or(Malformed::ActionNotDictionary)?;
        if JS_KEYS.iter().any(|key| action.has(key)) {
            hits.push(RemovalCategory::JavaScript);
        }
    }
    if JS_KEYS.iter().any(|key| annot.has(key)) {
        hits.push(RemovalCategory::JavaScript);
    }
    if let Ok(subtype) = annot.get(b"Subtype").and_then(Object::as_name) {
        if BLOCKED_SUBTYPES.contains(&subtype) {
            hits.push(RemovalCategory::AnnotationsRemoved);
        }
    }
    Ok(hits)
}

/// Split an `Annots` value into surviving entries and dropped ones. Counts
/// are only meaningful when the whole array could be read.
pub fn filter_annots<'a, R>(annots: &'a Object, resolve: R) -> Result<FilteredAnnots, Malformed>
where
    R: Fn(&'a Object) -> Option<&'a Object> + Copy,
{
    let entries = resolve(annots)
        .and_then(|obj| obj.as_array().ok())
        .ok_or(Malformed::AnnotsNotArray)?;

    let mut filtered = FilteredAnnots {
        kept: Vec::with_capacity(entries.len()),
        ..FilteredAnnots::default()
    };
    for entry in entries {
        let annot = resolve(entry)
            .and_then(|obj| obj.dict())
            .ok_or(Malformed::EntryNotDictionary)?;
        let found = classify(annot, resolve)?;
        if found.is_empty() {
            filtered.kept.push(entry.clone());
            continue;
        }
        filtered.hits.extend(found);
        if let Object::Reference(id) = entry {
            filtered.dropped.push(*id);
        }
    }
    Ok(filtered)
}

/// Indirect entries listed in an `Annots` value, readable or not.
pub fn listed_references<'a, R>(annots: &'a Object, resolve: R) -> Vec<ObjectId>
where
    R: Fn(&'a Object) -> Option<&'a Object>,
{
    resolve(annots)
        .and_then(|obj| obj.as_array().ok())
        .map(|items| items.iter().filter_map(|item| item.as_reference().ok()).collect())
        .unwrap_or_default()
}

/// Remove every reference to a `dropped` object held inside `obj`.
/// Dictionary entries and array elements naming one are deleted; returns
/// how many went.
pub fn sever_references(obj: &mut Object, dropped: &HashSet<ObjectId>) -> usize {
    let is_dropped = |value: &Object| matches!(value, Object::Reference(id) if dropped.contains(id));
    match obj {
        Object::Array(items) => {
            let before = items.len();
            items.retain(|item| !is_dropped(item));
            let mut count = before - items.len();
            for item in items.iter_mut() {
                count += sever_references(item, dropped);
            }
            count
        }
        Object::Dictionary(dict) => sever_in_dict(dict, dropped),
        Object::Stream(stream) => sever_in_dict(&mut stream.dict, dropped),
        _ => 0,
    }
}

fn sever_in_dict(dict: &mut Dictionary, dropped: &HashSet<ObjectId>) -> usize {
    let mut count = 0;
    dict.as_hashmap_mut().retain(|_, value| {
        if matches!(value, Object::Reference(id) if dropped.contains(id)) {
            count += 1;
            return false;
        }
        count += sever_references(value, dropped);
        true
    });
    count
}

/// Filters `Annots` on every page in document order.
pub struct AnnotationCleaner;

impl AnnotationCleaner {
    #[instrument(skip_all, fields(pages = doc.pages.len()))]
    pub fn clean_pages(doc: &mut PdfDocument, counters: &mut RemovalCounters) {
        let mut dropped = HashSet::new();
        for page in doc.pages.clone() {
            dropped.extend(Self::clean_page(doc, page, counters));
        }
        if dropped.is_empty() {
            return;
        }

        // Popups name their parent and replies name what they answer
        let severed: usize = doc
            .objects
            .values_mut()
            .map(|obj| sever_references(obj, &dropped))
            .sum();
        debug!(dropped = dropped.len(), severed, "Links to dropped annotations cut");
    }

    fn clean_page(
        doc: &mut PdfDocument,
        page: ObjectId,
        counters: &mut RemovalCounters,
    ) -> Vec<ObjectId> {
        let Some(annots) = doc
            .get(page)
            .and_then(ObjectExt::dict)
            .and_then(|dict| dict.get(b"Annots").ok())
            .cloned()
        else {
            return Vec::new();
        };

        let (kept, dropped) = match filter_annots(&annots, |obj| doc.resolve(obj)) {
            Ok(filtered) => {
                for hit in filtered.hits {
                    counters.increment(hit);
                }
                (filtered.kept, filtered.dropped)
            }
            Err(reason) => {
                warn!(page = ?page, ?reason, "Malformed annotations, dropping all on page");
                counters.increment(RemovalCategory::AnnotationsRemoved);
                (Vec::new(), listed_references(&annots, |obj| doc.resolve(obj)))
            }
        };

        debug!(page = ?page, kept = kept.len(), dropped = dropped.len(), "Annotations filtered");
        if let Some(dict) = doc.get_mut(page).and_then(ObjectExt::dict_mut) {
            dict.set("Annots", Object::Array(kept));
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParseDiagnostics;
    use lopdf::dictionary;
    use std::collections::BTreeMap;

    fn annot(subtype: &str) -> Dictionary {
        dictionary! { "Type" => "Annot", "Subtype" => subtype }
    }

    fn doc_with_annots(annots: Object, extra: Vec<(ObjectId, Object)>) -> PdfDocument {
        let page = dictionary! { "Type" => "Page", "Annots" => annots };
        let mut objects: BTreeMap<ObjectId, Object> = extra.into_iter().collect();
        objects.insert((3, 0), page.into());
        PdfDocument {
            version: "1.7".into(),
            objects,
            trailer: Dictionary::new(),
            catalog: (1, 0),
            pages: vec![(3, 0)],
            diagnostics: ParseDiagnostics::default(),
        }
    }

    fn annots_of(doc: &PdfDocument) -> &Vec<Object> {
        doc.get((3, 0))
            .and_then(ObjectExt::dict)
            .and_then(|d| d.get(b"Annots").ok())
            .and_then(|a| a.as_array().ok())
            .unwrap()
    }

    fn dict_of(doc: &PdfDocument, id: ObjectId) -> &Dictionary {
        doc.get(id).and_then(ObjectExt::dict).unwrap()
    }

    #[test]
    fn test_file_attachment_dropped_link_kept() {
        let mut doc = doc_with_annots(
            vec![Object::Reference((10, 0)), Object::Reference((11, 0))].into(),
            vec![
                ((10, 0), annot("FileAttachment").into()),
                ((11, 0), annot("Link").into()),
            ],
        );
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);

        assert_eq!(counters.get(RemovalCategory::AnnotationsRemoved), 1);
        assert_eq!(annots_of(&doc), &vec![Object::Reference((11, 0))]);
    }

    #[test]
    fn test_popup_parent_and_reply_links_are_cut() {
        let mut attachment = annot("FileAttachment");
        attachment.set("FS", Object::Reference((20, 0)));
        attachment.set("Popup", Object::Reference((11, 0)));
        let mut popup = annot("Popup");
        popup.set("Parent", Object::Reference((10, 0)));
        let mut reply = annot("Text");
        reply.set("IRT", Object::Reference((10, 0)));
        reply.set("RT", "R");

        let mut doc = doc_with_annots(
            vec![
                Object::Reference((10, 0)),
                Object::Reference((11, 0)),
                Object::Reference((12, 0)),
            ]
            .into(),
            vec![
                ((10, 0), attachment.into()),
                ((11, 0), popup.into()),
                ((12, 0), reply.into()),
                ((20, 0), dictionary! { "Type" => "Filespec" }.into()),
            ],
        );
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);

        assert_eq!(
            annots_of(&doc),
            &vec![Object::Reference((11, 0)), Object::Reference((12, 0))]
        );
        assert!(!dict_of(&doc, (11, 0)).has(b"Parent"));
        assert!(!dict_of(&doc, (12, 0)).has(b"IRT"));
        assert!(dict_of(&doc, (12, 0)).has(b"RT"));

        let mut reachable = Vec::new();
        for id in [(3, 0), (11, 0), (12, 0)] {
            doc.get(id).unwrap().for_each_reference(&mut |r| reachable.push(r));
        }
        assert!(!reachable.contains(&(10, 0)));
    }

    #[test]
    fn test_javascript_action_and_direct_key() {
        let via_action = {
            let mut link = annot("Link");
            link.set(
                "A",
                dictionary! { "S" => "JavaScript", "JS" => Object::string_literal("app.alert(1)") },
            );
            link
        };
        let mut direct = annot("Widget");
        direct.set("JS", 1);

        let mut doc = doc_with_annots(Object::Array(vec![via_action.into(), direct.into()]), Vec::new());
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);

        assert_eq!(counters.get(RemovalCategory::JavaScript), 2);
        assert!(annots_of(&doc).is_empty());
    }

    #[test]
    fn test_multiple_conditions_each_count() {
        let mut both = annot("RichMedia");
        both.set("JS", 0);
        let mut doc = doc_with_annots(Object::Array(vec![both.into()]), Vec::new());
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);

        assert_eq!(counters.get(RemovalCategory::JavaScript), 1);
        assert_eq!(counters.get(RemovalCategory::AnnotationsRemoved), 1);
    }

    #[test]
    fn test_malformed_entry_drops_whole_page_once() {
        let mut popup = annot("Popup");
        popup.set("Parent", Object::Reference((10, 0)));
        let mut doc = doc_with_annots(
            vec![
                annot("FileAttachment").into(),
                Object::Integer(7),
                Object::Reference((10, 0)),
            ]
            .into(),
            vec![((10, 0), annot("Link").into()), ((11, 0), popup.into())],
        );
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);

        assert_eq!(counters.get(RemovalCategory::AnnotationsRemoved), 1);
        assert!(annots_of(&doc).is_empty());
        assert!(!dict_of(&doc, (11, 0)).has(b"Parent"));
    }

    #[test]
    fn test_non_array_annots_is_replaced_with_empty_array() {
        let mut doc = doc_with_annots(Object::Integer(3), Vec::new());
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);
        assert!(annots_of(&doc).is_empty());
        assert_eq!(counters.get(RemovalCategory::AnnotationsRemoved), 1);
    }

    #[test]
    fn test_empty_annots_stays_present() {
        let mut doc = doc_with_annots(Object::Array(Vec::new()), Vec::new());
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);
        assert!(annots_of(&doc).is_empty());
        assert_eq!(counters, RemovalCounters::new());
    }

    #[test]
    fn test_indirect_annots_array_becomes_direct() {
        let mut doc = doc_with_annots(
            Object::Reference((20, 0)),
            vec![(
                (20, 0),
                Object::Array(vec![annot("Sound").into(), annot("Text").into()]),
            )],
        );
        let mut counters = RemovalCounters::new();
        AnnotationCleaner::clean_pages(&mut doc, &mut counters);
        assert_eq!(annots_of(&doc).len(), 1);
        assert_eq!(counters.get(RemovalCategory::AnnotationsRemoved), 1);
    }

    #[test]
    fn test_sever_references_in_nested_values() {
        let dropped: HashSet<ObjectId> = [(5, 0)].into_iter().collect();
        let mut obj: Object = dictionary! {
            "Parent" => Object::Reference((5, 0)),
            "Kids" => vec![Object::Reference((5, 0)), Object::Reference((6, 0))],
            "Inner" => dictionary! {
                "IRT" => Object::Reference((5, 0)),
                "Keep" => Object::Reference((6, 0)),
            },
        }
        .into();

        assert_eq!(sever_references(&mut obj, &dropped), 3);
        let dict = obj.dict().unwrap();
        assert!(!dict.has(b"Parent"));
        assert_eq!(dict.get(b"Kids").unwrap(), &Object::Array(vec![Object::Reference((6, 0))]));
        assert!(dict.get(b"Inner").unwrap().as_dict().unwrap().has(b"Keep"));
    }
}
