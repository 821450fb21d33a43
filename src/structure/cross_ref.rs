//! Cross-reference table and trailer reading
//! Author: kartik4091

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace};

use super::filters::decode_stream;
use super::lexer::{rfind, Lexer};
use crate::config::ParseLimits;
use crate::error::StructureError;
use crate::types::{Dictionary, Object, Stream};

type Result<T> = std::result::Result<T, StructureError>;

/// Upper bound on `/Prev` hops; real files rarely exceed a handful
const MAX_XREF_SECTIONS: usize = 512;

/// Where an object number lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    InUse { offset: usize, generation: u16 },
    Compressed { stream: u32, index: u32 },
}

/// Merged view over every cross-reference section
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    pub entries: BTreeMap<u32, XrefEntry>,
    pub trailer: Dictionary,
    pub recovered: bool,
}

impl XrefTable {
    /// Entries from older sections never override newer ones.
    fn merge_older(&mut self, entries: Vec<(u32, XrefEntry)>) {
        for (number, entry) in entries {
            self.entries.entry(number).or_insert(entry);
        }
    }

    fn merge_older_trailer(&mut self, trailer: &Dictionary) {
        for (key, value) in trailer.iter() {
            if matches!(key.as_slice(), b"Prev" | b"XRefStm") {
                continue;
            }
            if !self.trailer.has(key) {
                self.trailer.set(key.clone(), value.clone());
            }
        }
    }
}

/// One section: its entries and its trailer dictionary
struct XrefSection {
    entries: Vec<(u32, XrefEntry)>,
    trailer: Dictionary,
}

/// Offset recorded after the last `startxref` keyword.
pub fn locate_startxref(data: &[u8]) -> Result<usize> {
    let pos = rfind(data, b"startxref")
        .ok_or_else(|| StructureError::InvalidXref("startxref not found".into()))?;
    let mut lexer = Lexer::new(data, pos + b"startxref".len());
    lexer.skip_whitespace();
    let offset = lexer
        .read_unsigned()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| StructureError::InvalidXref("startxref offset unreadable".into()))?;
    if offset >= data.len() {
        return Err(StructureError::InvalidXref(format!(
            "startxref offset {} beyond end of file",
            offset
        )));
    }
    Ok(offset)
}

/// Follow the section chain from `startxref` back through `/Prev`.
pub fn read_xref_chain(data: &[u8], limits: &ParseLimits) -> Result<XrefTable> {
    let mut table = XrefTable::default();
    let mut visited = HashSet::new();
    let mut next = Some(locate_startxref(data)?);
    let mut first = true;

    while let Some(offset) = next.take() {
        if !visited.insert(offset) || visited.len() > MAX_XREF_SECTIONS {
            debug!(offset, "Stopping xref chain at repeated or excessive section");
            break;
        }
        let section = read_section(data, offset, limits)?;
        trace!(offset, entries = section.entries.len(), "Read xref section");

        table.merge_older(section.entries);
        // Hybrid files keep compressed objects in a side stream
        if let Some(stm) = section.trailer.get(b"XRefStm").ok().and_then(offset_value) {
            if visited.insert(stm) {
                match read_section(data, stm, limits) {
                    Ok(side) => table.merge_older(side.entries),
                    Err(e) => debug!(offset = stm, error = %e, "Ignoring unreadable XRefStm"),
                }
            }
        }

        if first {
            table.trailer = section.trailer.clone();
            table.trailer.remove(b"Prev");
            table.trailer.remove(b"XRefStm");
            first = false;
        } else {
            table.merge_older_trailer(&section.trailer);
        }
        next = section.trailer.get(b"Prev").ok().and_then(offset_value);

        if table.entries.len() > limits.max_objects {
            return Err(StructureError::corrupted(offset, "too many objects"));
        }
    }

    if !table.trailer.has(b"Root") {
        return Err(StructureError::InvalidTrailer("no /Root entry".into()));
    }
    Ok(table)
}

fn offset_value(obj: &Object) -> Option<usize> {
    obj.as_i64().ok().and_then(|v| usize::try_from(v).ok())
}

fn read_section(data: &[u8], offset: usize, limits: &ParseLimits) -> Result<XrefSection> {
    let mut lexer = Lexer::new(data, offset).with_max_depth(limits.max_nesting_depth);
    lexer.skip_whitespace();
    if lexer.at_keyword(b"xref") {
        lexer.set_pos(lexer.pos() + 4);
        return read_table(&mut lexer);
    }
    let id = lexer
        .parse_indirect_header()
        .ok_or_else(|| StructureError::InvalidXref(format!("no xref at offset {}", offset)))?;
    let stream = read_stream_object(&mut lexer)?;
    if !stream.dict.has_type(b"XRef") {
        return Err(StructureError::InvalidXref(format!(
            "object {} at offset {} is not an xref stream",
            id.0, offset
        )));
    }
    read_xref_stream(&stream, limits)
}

fn read_table(lexer: &mut Lexer<'_>) -> Result<XrefSection> {
    let mut entries = Vec::new();
    loop {
        lexer.skip_whitespace();
        if lexer.at_keyword(b"trailer") {
            lexer.set_pos(lexer.pos() + 7);
            let trailer = match lexer.parse_object()? {
                Object::Dictionary(dict) => dict,
                other => {
                    return Err(StructureError::InvalidTrailer(format!(
                        "trailer is a {}",
                        other.enum_variant()
                    )))
                }
            };
            return Ok(XrefSection { entries, trailer });
        }

        let start = lexer.read_unsigned().ok_or_else(|| bad_subsection(lexer.pos()))?;
        lexer.skip_whitespace();
        let count = lexer.read_unsigned().ok_or_else(|| bad_subsection(lexer.pos()))?;

        for i in 0..count {
            lexer.skip_whitespace();
            let offset = lexer.read_unsigned().ok_or_else(|| bad_subsection(lexer.pos()))?;
            lexer.skip_whitespace();
            let generation = lexer.read_unsigned().ok_or_else(|| bad_subsection(lexer.pos()))?;
            lexer.skip_whitespace();
            let kind = lexer.peek().ok_or_else(|| bad_subsection(lexer.pos()))?;
            lexer.set_pos(lexer.pos() + 1);

            let number = u32::try_from(start + i).map_err(|_| bad_subsection(lexer.pos()))?;
            match kind {
                b'n' if offset > 0 => entries.push((
                    number,
                    XrefEntry::InUse {
                        offset: usize::try_from(offset).map_err(|_| bad_subsection(lexer.pos()))?,
                        generation: u16::try_from(generation).unwrap_or(u16::MAX),
                    },
                )),
                // Free entries carry nothing worth keeping
                b'n' | b'f' => {}
                _ => return Err(bad_subsection(lexer.pos())),
            }
        }
    }
}

fn bad_subsection(pos: usize) -> StructureError {
    StructureError::InvalidXref(format!("bad subsection at {}", pos))
}

/// Parse the object body after an `N G obj` header; it must be a stream.
fn read_stream_object(lexer: &mut Lexer<'_>) -> Result<Stream> {
    let dict = match lexer.parse_object()? {
        Object::Dictionary(dict) => dict,
        other => {
            return Err(StructureError::InvalidXref(format!(
                "expected stream dictionary, found {}",
                other.enum_variant()
            )))
        }
    };
    let length = dict
        .get(b"Length")
        .ok()
        .and_then(offset_value)
        .ok_or_else(|| StructureError::InvalidXref("xref stream without direct /Length".into()))?;
    lexer.expect_keyword(b"stream")?;
    let start = skip_stream_eol(lexer.data(), lexer.pos());
    let end = start
        .checked_add(length)
        .filter(|&end| end <= lexer.data().len())
        .ok_or_else(|| StructureError::InvalidXref("xref stream runs past end of file".into()))?;
    Ok(Stream::new(dict, lexer.data()[start..end].to_vec()))
}

/// Position of the first payload byte after the `stream` keyword.
pub fn skip_stream_eol(data: &[u8], pos: usize) -> usize {
    match data.get(pos..pos + 2) {
        Some(b"\r\n") => pos + 2,
        _ => match data.get(pos) {
            Some(b'\n') | Some(b'\r') => pos + 1,
            _ => pos,
        },
    }
}

fn read_xref_stream(stream: &Stream, limits: &ParseLimits) -> Result<XrefSection> {
    let widths: Vec<usize> = stream
        .dict
        .get(b"W")
        .and_then(Object::as_array)
        .map(|items| items.iter().filter_map(offset_value).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(StructureError::InvalidXref("bad /W in xref stream".into()));
    }
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(StructureError::InvalidXref("zero-width xref rows".into()));
    }

    let size = stream.dict.get(b"Size").ok().and_then(offset_value).unwrap_or(0);
    let index: Vec<usize> = match stream.dict.get(b"Index").and_then(Object::as_array) {
        Ok(items) => items.iter().filter_map(offset_value).collect(),
        Err(_) => vec![0, size],
    };
    if index.len() % 2 != 0 {
        return Err(StructureError::InvalidXref("odd /Index length".into()));
    }

    let data = decode_stream(stream, limits.max_decoded_stream_bytes)?;
    let mut rows = data.chunks_exact(row_len);
    let mut entries = Vec::new();

    for pair in index.chunks_exact(2) {
        let (first, count) = (pair[0], pair[1]);
        for i in 0..count {
            let Some(row) = rows.next() else { break };
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { be_value(f1) };
            let number = u32::try_from(first + i)
                .map_err(|_| StructureError::InvalidXref("object number overflow".into()))?;
            match kind {
                1 => {
                    let offset = usize::try_from(be_value(f2)).unwrap_or(usize::MAX);
                    if offset > 0 {
                        entries.push((
                            number,
                            XrefEntry::InUse {
                                offset,
                                generation: u16::try_from(be_value(f3)).unwrap_or(u16::MAX),
                            },
                        ));
                    }
                }
                2 => entries.push((
                    number,
                    XrefEntry::Compressed {
                        stream: u32::try_from(be_value(f2)).unwrap_or(u32::MAX),
                        index: u32::try_from(be_value(f3)).unwrap_or(u32::MAX),
                    },
                )),
                _ => {}
            }
        }
    }

    let mut trailer = stream.dict.clone();
    for key in [&b"Type"[..], b"W", b"Index", b"Length", b"Filter", b"DecodeParms"] {
        trailer.remove(key);
    }
    Ok(XrefSection { entries, trailer })
}

fn be_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
