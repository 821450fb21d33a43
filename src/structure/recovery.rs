//! Whole-file scan used when the cross-reference data cannot be trusted

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::cross_ref::{XrefEntry, XrefTable};
use super::lexer::{find_from, is_regular, is_whitespace, rfind, Lexer};
use crate::config::ParseLimits;
use crate::types::{Dictionary, Object};

/// Rebuild a table from every `N G obj` header in the file. Later definitions
/// of the same object number win, as they would in an incremental update.
pub fn recover_xref(data: &[u8], limits: &ParseLimits) -> XrefTable {
    let entries = scan_objects(data);
    let trailer = scan_trailer(data, limits).unwrap_or_default();
    if entries.is_empty() {
        warn!("Recovery scan found no object headers");
    } else {
        debug!(objects = entries.len(), has_root = trailer.has(b"Root"), "Recovered xref by scan");
    }
    XrefTable {
        entries,
        trailer,
        recovered: true,
    }
}

/// Offsets of every object header, keyed by object number.
pub fn scan_objects(data: &[u8]) -> BTreeMap<u32, XrefEntry> {
    let mut entries = BTreeMap::new();
    let mut from = 0;
    while let Some(hit) = find_from(data, b"obj", from) {
        from = hit + 3;
        if let Some(start) = header_start(data, hit) {
            let mut lexer = Lexer::new(data, start);
            if let Some(id) = lexer.parse_indirect_header() {
                if lexer.pos() == hit + 3 {
                    entries.insert(
                        id.0,
                        XrefEntry::InUse {
                            offset: start,
                            generation: id.1,
                        },
                    );
                }
            }
        }
    }
    entries
}

/// Walk back from `obj` over `N G ` to the first digit of `N`.
fn header_start(data: &[u8], obj_pos: usize) -> Option<usize> {
    let mut i = obj_pos;
    let skip_ws = |mut i: usize| {
        while i > 0 && is_whitespace(data[i - 1]) {
            i -= 1;
        }
        i
    };
    let skip_digits = |mut i: usize| {
        let end = i;
        while i > 0 && data[i - 1].is_ascii_digit() {
            i -= 1;
        }
        (i < end).then_some(i)
    };

    let before_ws = i;
    i = skip_ws(i);
    if i == before_ws {
        return None;
    }
    i = skip_digits(i)?;
    let before_ws = i;
    i = skip_ws(i);
    if i == before_ws {
        return None;
    }
    i = skip_digits(i)?;
    if i > 0 && is_regular(data[i - 1]) {
        return None;
    }
    Some(i)
}

/// The last `trailer` dictionary that names a document catalog.
pub fn scan_trailer(data: &[u8], limits: &ParseLimits) -> Option<Dictionary> {
    let mut end = data.len();
    while let Some(pos) = rfind(&data[..end], b"trailer") {
        let mut lexer =
            Lexer::new(data, pos + b"trailer".len()).with_max_depth(limits.max_nesting_depth);
        if let Ok(Object::Dictionary(mut dict)) = lexer.parse_object() {
            if dict.has(b"Root") {
                dict.remove(b"Prev");
                dict.remove(b"XRefStm");
                return Some(dict);
            }
        }
        end = pos;
    }
    None
}
