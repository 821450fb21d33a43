//! Full-rewrite serializer
//! Author: kartik4091
//!
//! Builds a brand new `lopdf::Document` from the reachable object graph and
//! lets its writer lay out the file. Nothing from the input bytes is copied
//! except stream payloads of objects that are still reachable.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::xref::XrefType;
use lopdf::Document;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::types::{Dictionary, Object, ObjectExt, ObjectId, PdfDocument, Stream};

/// Object types the `lopdf` writer leaves out of a saved file
const UNWRITTEN_TYPES: [&[u8]; 3] = [b"ObjStm", b"XRef", b"Linearized"];

/// Serialize every object reachable from the trailer's `/Root` and `/Info`.
///
/// Objects are renumbered `1..=n` in ascending order of their original
/// identifiers, so identical input always yields identical output. The file
/// gets a classic cross-reference table.
#[instrument(skip_all, fields(objects = doc.objects.len()))]
pub fn serialize(doc: &PdfDocument) -> Result<Vec<u8>> {
    let root = trailer_ref(&doc.trailer, b"Root")?
        .ok_or_else(|| Error::SerializationFailure("trailer has no /Root reference".into()))?;
    let info = trailer_ref(&doc.trailer, b"Info")?;

    let reachable = collect_reachable(doc, root, info)?;
    let numbering: BTreeMap<ObjectId, u32> = reachable
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i as u32 + 1))
        .collect();

    let mut pdf = Document::with_version(doc.version.clone());
    pdf.reference_table.cross_reference_type = XrefType::CrossReferenceTable;

    for id in &reachable {
        let obj = doc
            .get(*id)
            .ok_or_else(|| Error::SerializationFailure(format!("object {:?} vanished", id)))?;
        if let Ok(kind) = obj.type_name() {
            if UNWRITTEN_TYPES.contains(&kind) {
                return Err(Error::SerializationFailure(format!(
                    "reachable object {:?} has type /{}",
                    id,
                    String::from_utf8_lossy(kind)
                )));
            }
        }
        pdf.objects.insert((numbering[id], 0), renumber_indirect(obj, &numbering)?);
    }
    pdf.max_id = reachable.len() as u32;

    pdf.trailer.set("Root", Object::Reference((numbering[&root], 0)));
    if let Some(info) = info {
        pdf.trailer.set("Info", Object::Reference((numbering[&info], 0)));
    }
    if let Ok(id) = doc.trailer.get(b"ID") {
        if is_file_identifier(id) {
            pdf.trailer.set("ID", id.clone());
        }
    }

    let mut out = Vec::new();
    pdf.save_to(&mut out)
        .map_err(|e| Error::SerializationFailure(e.to_string()))?;

    debug!(written = reachable.len(), bytes = out.len(), "Serialized document");
    Ok(out)
}

fn trailer_ref(trailer: &Dictionary, key: &[u8]) -> Result<Option<ObjectId>> {
    match trailer.get(key) {
        Err(_) => Ok(None),
        Ok(Object::Reference(id)) => Ok(Some(*id)),
        Ok(other) => Err(Error::SerializationFailure(format!(
            "trailer /{} is a {}, expected a reference",
            String::from_utf8_lossy(key),
            other.enum_variant()
        ))),
    }
}

/// `/ID` is kept only in its standard shape: an array of two strings.
fn is_file_identifier(obj: &Object) -> bool {
    matches!(obj, Object::Array(items)
        if items.len() == 2 && items.iter().all(|i| matches!(i, Object::String(..))))
}

/// Every object reachable from the roots, in ascending id order. A
/// reference to an absent object is an error.
fn collect_reachable(
    doc: &PdfDocument,
    root: ObjectId,
    info: Option<ObjectId>,
) -> Result<BTreeSet<ObjectId>> {
    let mut reachable = BTreeSet::new();
    let mut queue: Vec<ObjectId> = std::iter::once(root).chain(info).collect();

    while let Some(id) = queue.pop() {
        if reachable.contains(&id) {
            continue;
        }
        let obj = doc.get(id).ok_or_else(|| {
            Error::SerializationFailure(format!("reference to missing object {:?}", id))
        })?;
        reachable.insert(id);
        match obj {
            // The written /Length is always direct
            Object::Stream(stream) => {
                for (key, value) in stream.dict.iter() {
                    if key.as_slice() != b"Length" {
                        value.for_each_reference(&mut |r| queue.push(r));
                    }
                }
            }
            other => other.for_each_reference(&mut |r| queue.push(r)),
        }
    }
    Ok(reachable)
}

fn renumber_indirect(obj: &Object, numbering: &BTreeMap<ObjectId, u32>) -> Result<Object> {
    match obj {
        Object::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.remove(b"Length");
            let dict = renumber_dict(&dict, numbering)?;
            Ok(Object::Stream(Stream::new(dict, stream.content.clone())))
        }
        other => renumber_value(other, numbering),
    }
}

fn renumber_value(obj: &Object, numbering: &BTreeMap<ObjectId, u32>) -> Result<Object> {
    Ok(match obj {
        Object::Reference(id) => {
            let number = numbering.get(id).ok_or_else(|| {
                Error::SerializationFailure(format!("reference to missing object {:?}", id))
            })?;
            Object::Reference((*number, 0))
        }
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| renumber_value(item, numbering))
                .collect::<Result<_>>()?,
        ),
        Object::Dictionary(dict) => Object::Dictionary(renumber_dict(dict, numbering)?),
        Object::Stream(_) => {
            return Err(Error::SerializationFailure(
                "stream nested inside a direct value".into(),
            ))
        }
        other => other.clone(),
    })
}

fn renumber_dict(dict: &Dictionary, numbering: &BTreeMap<ObjectId, u32>) -> Result<Dictionary> {
    dict.iter()
        .map(|(key, value)| Ok((key.clone(), renumber_value(value, numbering)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseLimits;
    use crate::structure::parse_document;
    use crate::types::{ParseDiagnostics, StringFormat};
    use lopdf::dictionary;

    fn document() -> PdfDocument {
        let catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference((4, 0)),
        };
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference((7, 0))],
            "Count" => 1,
        };
        let page = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference((4, 0)),
            "Contents" => Object::Reference((9, 0)),
            "Tag" => Object::Name(b"A B".to_vec()),
        };
        let mut content = Stream::new(Dictionary::new(), b"BT ET".to_vec());
        content.dict.set("Length", Object::Reference((12, 0)));

        let mut objects = BTreeMap::new();
        objects.insert((2, 0), catalog.into());
        objects.insert((4, 0), pages.into());
        objects.insert((7, 0), page.into());
        objects.insert((9, 0), Object::Stream(content));
        objects.insert((12, 0), Object::Integer(5));
        objects.insert((30, 0), Object::string_literal("orphan secret"));
        objects.insert((31, 0), Dictionary::new().into());

        let id = Object::String(vec![1, 2], StringFormat::Hexadecimal);
        let trailer = dictionary! {
            "Root" => Object::Reference((2, 0)),
            "Info" => Object::Reference((31, 0)),
            "Encrypt" => Object::Reference((30, 0)),
            "ID" => vec![id.clone(), id],
        };

        PdfDocument {
            version: "1.5".into(),
            objects,
            trailer,
            catalog: (2, 0),
            pages: vec![(7, 0)],
            diagnostics: ParseDiagnostics::default(),
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_unreachable_objects_are_not_written() {
        let out = serialize(&document()).unwrap();
        assert!(out.starts_with(b"%PDF-1.5\n"));
        assert!(!contains(&out, b"orphan secret"));
        assert!(!contains(&out, b"/Encrypt"));
        assert!(contains(&out, b"/ID[<0102><0102>]"));
        assert!(contains(&out, b"\nxref\n"));
    }

    #[test]
    fn test_renumbering_and_direct_length() {
        let out = serialize(&document()).unwrap();
        let reparsed = parse_document(&out, &ParseLimits::default()).unwrap();

        // catalog, pages, page, content, info
        let ids: Vec<ObjectId> = reparsed.objects.keys().copied().collect();
        assert_eq!(ids, vec![(1, 0), (2, 0), (3, 0), (4, 0), (5, 0)]);
        assert_eq!(reparsed.catalog, (1, 0));
        assert_eq!(reparsed.trailer.get(b"Info").and_then(Object::as_reference).unwrap(), (5, 0));

        let Some(Object::Stream(content)) = reparsed.get((4, 0)) else {
            panic!("content stream missing");
        };
        assert_eq!(content.content, b"BT ET");
        assert_eq!(content.dict.get(b"Length").and_then(Object::as_i64).unwrap(), 5);
    }

    #[test]
    fn test_output_is_deterministic_and_reparses() {
        let doc = document();
        let first = serialize(&doc).unwrap();
        assert_eq!(first, serialize(&doc).unwrap());

        let reparsed = parse_document(&first, &ParseLimits::default()).unwrap();
        assert!(reparsed.diagnostics.is_clean());
        assert_eq!(reparsed.page_count(), 1);
        let page = reparsed.get(reparsed.pages[0]).and_then(ObjectExt::dict).unwrap();
        assert_eq!(page.get(b"Tag").and_then(Object::as_name).unwrap(), b"A B");
    }

    #[test]
    fn test_missing_reference_fails() {
        let mut doc = document();
        doc.objects.remove(&(7, 0));
        assert!(matches!(serialize(&doc), Err(Error::SerializationFailure(_))));
    }

    #[test]
    fn test_reachable_object_stream_is_refused() {
        let mut doc = document();
        let stream = Stream::new(dictionary! { "Type" => "ObjStm", "N" => 0 }, Vec::new());
        doc.objects.insert((40, 0), Object::Stream(stream));
        if let Some(Object::Dictionary(page)) = doc.get_mut((7, 0)) {
            page.set("Extra", Object::Reference((40, 0)));
        }
        assert!(matches!(serialize(&doc), Err(Error::SerializationFailure(_))));
    }
}
