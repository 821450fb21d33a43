//! PDF document parser
//! Author: kartik4091
//!
//! Turns an untrusted byte buffer into a [`PdfDocument`]. The cross-reference
//! chain is tried first; when it is unusable the whole file is scanned for
//! object headers instead. Every limit in [`ParseLimits`] is enforced here.

use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, instrument, warn};

use super::cross_ref::{read_xref_chain, skip_stream_eol, XrefEntry, XrefTable};
use super::filters::decode_stream;
use super::lexer::{find_all, find_from, is_whitespace, Lexer};
use super::page_tree::collect_pages;
use super::recovery::{recover_xref, scan_objects};
use crate::config::ParseLimits;
use crate::error::StructureError;
use crate::types::{
    next_object_id, Dictionary, Object, ObjectExt, ObjectId, ParseDiagnostics, PdfDocument, Stream,
};

type Result<T> = std::result::Result<T, StructureError>;

const HEADER_WINDOW: usize = 1024;
const DEFAULT_VERSION: &str = "1.7";

/// Parse `data` into an owned document.
#[instrument(skip(data, limits), fields(len = data.len()))]
pub fn parse_document(data: &[u8], limits: &ParseLimits) -> Result<PdfDocument> {
    let (header_offset, version) = parse_header(data)?;
    let data = &data[header_offset..];

    let table = match read_xref_chain(data, limits) {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, "Cross-reference data unusable, scanning file");
            recover_xref(data, limits)
        }
    };

    let mut loader = ObjectLoader::new(data, limits, &table);
    loader.load_all()?;
    let ObjectLoader {
        mut objects,
        mut diagnostics,
        ..
    } = loader;
    diagnostics.recovered |= table.recovered;

    let mut trailer = table.trailer.clone();
    if !trailer.has(b"Root") {
        trailer = synthesize_trailer(&objects)
            .ok_or_else(|| StructureError::InvalidTrailer("no document catalog found".into()))?;
        diagnostics.recovered = true;
    }

    // Container objects are fully consumed by now
    objects.retain(|_, obj| {
        !obj.dict().map_or(false, |d| d.has_type(b"XRef") || d.has_type(b"ObjStm"))
    });

    let catalog = resolve_catalog(&mut objects, &mut trailer)?;
    diagnostics.dangling_references = normalize_references(&mut objects, &mut trailer);

    let pages = collect_pages(&objects, catalog, limits.max_nesting_depth)?;
    info!(
        objects = objects.len(),
        pages = pages.len(),
        recovered = diagnostics.recovered,
        dangling = diagnostics.dangling_references,
        "Parsed document"
    );

    Ok(PdfDocument {
        version,
        objects,
        trailer,
        catalog,
        pages,
        diagnostics,
    })
}

/// Locate `%PDF-` near the start of the buffer and read the version after it.
fn parse_header(data: &[u8]) -> Result<(usize, String)> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let offset = find_from(window, b"%PDF-", 0)
        .ok_or_else(|| StructureError::InvalidHeader("missing %PDF- marker".into()))?;
    let rest = &data[offset + 5..];
    let len = rest
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .count();
    let version = match std::str::from_utf8(&rest[..len]) {
        Ok(v) if is_version(v) => v.to_string(),
        _ => {
            debug!("Unreadable header version, assuming {}", DEFAULT_VERSION);
            DEFAULT_VERSION.to_string()
        }
    };
    Ok((offset, version))
}

fn is_version(v: &str) -> bool {
    let mut parts = v.split('.');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(major), Some(minor), None)
            if major.len() == 1 && !minor.is_empty() && minor.len() <= 2
    )
}

/// Reads every object named by a cross-reference table.
struct ObjectLoader<'a> {
    data: &'a [u8],
    limits: &'a ParseLimits,
    table: &'a XrefTable,
    /// Header offsets from a full scan, computed on first need
    scanned: Option<BTreeMap<u32, XrefEntry>>,
    /// Every `endstream` keyword offset, ascending, computed on first need
    endstreams: OnceCell<Vec<usize>>,
    objects: BTreeMap<ObjectId, Object>,
    diagnostics: ParseDiagnostics,
}

impl<'a> ObjectLoader<'a> {
    fn new(data: &'a [u8], limits: &'a ParseLimits, table: &'a XrefTable) -> Self {
        Self {
            data,
            limits,
            table,
            scanned: None,
            endstreams: OnceCell::new(),
            objects: BTreeMap::new(),
            diagnostics: ParseDiagnostics::default(),
        }
    }

    fn load_all(&mut self) -> Result<()> {
        let mut compressed: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        let table = self.table;

        for (&number, &entry) in &table.entries {
            match entry {
                XrefEntry::InUse { offset, generation } => {
                    self.load_direct(number, generation, offset)?;
                }
                XrefEntry::Compressed { stream, .. } => {
                    compressed.entry(stream).or_default().push(number);
                }
            }
        }

        for (stream, members) in compressed {
            self.unpack_listed(stream, &members)?;
        }

        // Without a trusted table, whatever object streams exist are the
        // only record of the objects compressed into them
        if self.table.recovered {
            let containers: Vec<ObjectId> = self
                .objects
                .iter()
                .filter(|(_, obj)| matches!(obj, Object::Stream(s) if s.dict.has_type(b"ObjStm")))
                .map(|(id, _)| *id)
                .collect();
            for id in containers {
                self.unpack_all(id)?;
            }
        }
        Ok(())
    }

    fn insert(&mut self, id: ObjectId, obj: Object) -> Result<()> {
        if self.objects.len() >= self.limits.max_objects && !self.objects.contains_key(&id) {
            return Err(StructureError::corrupted(0, format!(
                "more than {} objects",
                self.limits.max_objects
            )));
        }
        self.objects.insert(id, obj);
        Ok(())
    }

    fn load_direct(&mut self, number: u32, generation: u16, offset: usize) -> Result<()> {
        match self.read_object_at(offset, number) {
            Ok((id, obj)) => return self.insert(id, obj),
            Err(StructureError::NestingTooDeep(depth)) => {
                return Err(StructureError::NestingTooDeep(depth))
            }
            Err(e) => debug!(number, offset, error = %e, "Object not at recorded offset"),
        }

        // Stale offsets are common in hand-edited files
        let fallback = self.scanned_offset(number).filter(|&o| o != offset);
        if let Some(found) = fallback {
            match self.read_object_at(found, number) {
                Ok((id, obj)) => {
                    self.diagnostics.recovered = true;
                    return self.insert(id, obj);
                }
                Err(StructureError::NestingTooDeep(depth)) => {
                    return Err(StructureError::NestingTooDeep(depth))
                }
                Err(_) => {}
            }
        }
        warn!(number, generation, "Unreadable object skipped");
        self.diagnostics
            .unreadable_objects
            .push((number, generation));
        Ok(())
    }

    fn scanned_offset(&mut self, number: u32) -> Option<usize> {
        let data = self.data;
        let scanned = self.scanned.get_or_insert_with(|| scan_objects(data));
        match scanned.get(&number) {
            Some(XrefEntry::InUse { offset, .. }) => Some(*offset),
            _ => None,
        }
    }

    /// Parse `N G obj ... endobj` at `offset`, requiring object number `number`.
    fn read_object_at(&self, offset: usize, number: u32) -> Result<(ObjectId, Object)> {
        let mut lexer = Lexer::new(self.data, offset).with_max_depth(self.limits.max_nesting_depth);
        let id = lexer
            .parse_indirect_header()
            .ok_or_else(|| StructureError::corrupted(offset, "missing object header"))?;
        if id.0 != number {
            return Err(StructureError::corrupted(
                offset,
                format!("expected object {}, found {}", number, id.0),
            ));
        }
        let value = lexer.parse_object()?;
        lexer.skip_whitespace();
        if !lexer.at_keyword(b"stream") {
            return Ok((id, value));
        }

        let dict = match value {
            Object::Dictionary(dict) => dict,
            other => {
                return Err(StructureError::corrupted(
                    lexer.pos(),
                    format!("stream keyword after {}", other.enum_variant()),
                ))
            }
        };
        let start = skip_stream_eol(self.data, lexer.pos() + b"stream".len());
        let end = self.stream_end(&dict, start)?;
        Ok((id, Object::Stream(Stream::new(dict, self.data[start..end].to_vec()))))
    }

    /// End of a stream payload: trust `/Length` when `endstream` follows it,
    /// else take the next `endstream` keyword after `start`.
    fn stream_end(&self, dict: &Dictionary, start: usize) -> Result<usize> {
        let declared = match dict.get(b"Length") {
            Ok(Object::Integer(n)) => usize::try_from(*n).ok(),
            Ok(Object::Reference(id)) => self.indirect_length(*id),
            _ => None,
        };
        if let Some(end) = declared.and_then(|len| start.checked_add(len)) {
            if end <= self.data.len() && self.endstream_follows(end) {
                return Ok(end);
            }
        }

        let endstreams = self
            .endstreams
            .get_or_init(|| find_all(self.data, b"endstream"));
        let keyword = endstreams
            .get(endstreams.partition_point(|&pos| pos < start))
            .copied()
            .ok_or_else(|| StructureError::corrupted(start, "stream without endstream"))?;
        let mut end = keyword;
        if end > start && self.data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && self.data[end - 1] == b'\r' {
            end -= 1;
        }
        Ok(end)
    }

    fn endstream_follows(&self, pos: usize) -> bool {
        let mut lexer = Lexer::new(self.data, pos);
        while lexer.peek().map_or(false, is_whitespace) {
            lexer.set_pos(lexer.pos() + 1);
        }
        lexer.at_keyword(b"endstream")
    }

    /// Look up an indirect `/Length` without following further streams.
    fn indirect_length(&self, id: ObjectId) -> Option<usize> {
        let offset = match self.table.entries.get(&id.0)? {
            XrefEntry::InUse { offset, .. } => *offset,
            XrefEntry::Compressed { .. } => return None,
        };
        let mut lexer = Lexer::new(self.data, offset).with_max_depth(self.limits.max_nesting_depth);
        if lexer.parse_indirect_header()? != id {
            return None;
        }
        lexer
            .parse_object()
            .ok()?
            .as_i64()
            .ok()
            .and_then(|n| usize::try_from(n).ok())
    }

    fn object_stream(&self, number: u32) -> Option<Stream> {
        self.objects
            .range((number, 0)..=(number, u16::MAX))
            .next()
            .and_then(|(_, obj)| match obj {
                Object::Stream(stream) if stream.dict.has_type(b"ObjStm") => Some(stream.clone()),
                _ => None,
            })
    }

    /// Unpack the members the table assigns to object stream `number`.
    fn unpack_listed(&mut self, number: u32, members: &[u32]) -> Result<()> {
        let Some(stream) = self.object_stream(number) else {
            warn!(stream = number, "Missing object stream");
            self.diagnostics
                .unreadable_objects
                .extend(members.iter().map(|&n| (n, 0)));
            return Ok(());
        };
        let unpacked = match unpack_object_stream(&stream, self.limits) {
            Ok(unpacked) => unpacked,
            Err(StructureError::NestingTooDeep(depth)) => {
                return Err(StructureError::NestingTooDeep(depth))
            }
            Err(e) => {
                warn!(stream = number, error = %e, "Unreadable object stream");
                Vec::new()
            }
        };
        let unpacked: HashMap<u32, Object> = unpacked.into_iter().collect();
        for &member in members {
            match unpacked.get(&member) {
                Some(obj) => self.insert((member, 0), obj.clone())?,
                None => self.diagnostics.unreadable_objects.push((member, 0)),
            }
        }
        Ok(())
    }

    /// Unpack every member of a stream found by scanning; direct definitions win.
    fn unpack_all(&mut self, id: ObjectId) -> Result<()> {
        let Some(Object::Stream(stream)) = self.objects.get(&id).cloned() else {
            return Ok(());
        };
        match unpack_object_stream(&stream, self.limits) {
            Ok(unpacked) => {
                for (number, obj) in unpacked {
                    let member = (number, 0);
                    if !self.objects.contains_key(&member) {
                        self.insert(member, obj)?;
                    }
                }
                Ok(())
            }
            Err(StructureError::NestingTooDeep(depth)) => Err(StructureError::NestingTooDeep(depth)),
            Err(e) => {
                warn!(stream = ?id, error = %e, "Unreadable object stream");
                Ok(())
            }
        }
    }
}

/// Decode an object stream into `(number, object)` pairs.
pub fn unpack_object_stream(stream: &Stream, limits: &ParseLimits) -> Result<Vec<(u32, Object)>> {
    let count = stream
        .dict
        .get(b"N")
        .and_then(Object::as_i64)
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| StructureError::Decode("object stream without /N".into()))?;
    let first = stream
        .dict
        .get(b"First")
        .and_then(Object::as_i64)
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| StructureError::Decode("object stream without /First".into()))?;

    let decoded = decode_stream(stream, limits.max_decoded_stream_bytes)?;
    if first > decoded.len() {
        return Err(StructureError::Decode("/First beyond stream data".into()));
    }

    let mut index = Lexer::new(&decoded[..first], 0);
    let mut pairs = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        index.skip_whitespace();
        let number = index.read_unsigned().and_then(|n| u32::try_from(n).ok());
        index.skip_whitespace();
        let offset = index.read_unsigned().and_then(|n| usize::try_from(n).ok());
        match (number, offset) {
            (Some(number), Some(offset)) => pairs.push((number, offset)),
            _ => break,
        }
    }

    let mut objects = Vec::with_capacity(pairs.len());
    for (number, offset) in pairs {
        let Some(pos) = first.checked_add(offset).filter(|&p| p < decoded.len()) else {
            continue;
        };
        let mut lexer = Lexer::new(&decoded, pos).with_max_depth(limits.max_nesting_depth);
        match lexer.parse_object() {
            Ok(obj) => objects.push((number, obj)),
            Err(StructureError::NestingTooDeep(depth)) => {
                return Err(StructureError::NestingTooDeep(depth))
            }
            Err(e) => debug!(number, error = %e, "Skipping unreadable compressed object"),
        }
    }
    Ok(objects)
}

/// Trailer for files whose trailer dictionary is gone: an xref stream that
/// still names a catalog, else the first object typed as one.
fn synthesize_trailer(objects: &BTreeMap<ObjectId, Object>) -> Option<Dictionary> {
    let from_xref_stream = objects.values().rev().find_map(|obj| match obj {
        Object::Stream(s) if s.dict.has_type(b"XRef") && s.dict.has(b"Root") => {
            let mut trailer = Dictionary::new();
            for key in [&b"Root"[..], b"Info", b"ID", b"Encrypt"] {
                if let Ok(value) = s.dict.get(key) {
                    trailer.set(key, value.clone());
                }
            }
            Some(trailer)
        }
        _ => None,
    });
    if from_xref_stream.is_some() {
        return from_xref_stream;
    }

    let catalog = objects.iter().find_map(|(id, obj)| {
        obj.dict()
            .filter(|d| d.has_type(b"Catalog"))
            .map(|_| *id)
    })?;
    let mut trailer = Dictionary::new();
    trailer.set("Root", catalog);
    Some(trailer)
}

/// Resolve `/Root` to a dictionary object, promoting a direct catalog.
fn resolve_catalog(
    objects: &mut BTreeMap<ObjectId, Object>,
    trailer: &mut Dictionary,
) -> Result<ObjectId> {
    let root = trailer
        .get(b"Root")
        .cloned()
        .map_err(|_| StructureError::InvalidTrailer("no /Root entry".into()))?;
    match root {
        Object::Reference(id) => match objects.get(&id) {
            Some(Object::Dictionary(_)) => Ok(id),
            Some(other) => Err(StructureError::MissingObject(format!(
                "catalog {:?} is a {}",
                id,
                other.enum_variant()
            ))),
            None => Err(StructureError::MissingObject(format!("catalog {:?}", id))),
        },
        Object::Dictionary(dict) => {
            let id = next_object_id(objects)?;
            objects.insert(id, Object::Dictionary(dict));
            trailer.set("Root", id);
            Ok(id)
        }
        other => Err(StructureError::InvalidTrailer(format!(
            "/Root is a {}",
            other.enum_variant()
        ))),
    }
}

/// Replace references to absent objects with null and drop null dictionary
/// entries. Returns the number of references removed.
fn normalize_references(
    objects: &mut BTreeMap<ObjectId, Object>,
    trailer: &mut Dictionary,
) -> usize {
    let known: HashSet<ObjectId> = objects.keys().copied().collect();
    let mut dangling = 0;
    for obj in objects.values_mut() {
        dangling += drop_dangling(obj, &known);
    }
    // /Encrypt must survive so the encryption check still sees it
    let encrypt = trailer.remove(b"Encrypt");
    dangling += drop_dangling_in_dict(trailer, &known);
    if let Some(encrypt) = encrypt {
        trailer.set("Encrypt", encrypt);
    }
    if dangling > 0 {
        debug!(dangling, "Normalized dangling references");
    }
    dangling
}

fn drop_dangling(obj: &mut Object, known: &HashSet<ObjectId>) -> usize {
    let mut count = 0;
    match obj {
        Object::Reference(id) if !known.contains(id) => {
            *obj = Object::Null;
            count += 1;
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                count += drop_dangling(item, known);
            }
        }
        Object::Dictionary(dict) => count += drop_dangling_in_dict(dict, known),
        Object::Stream(stream) => count += drop_dangling_in_dict(&mut stream.dict, known),
        _ => {}
    }
    count
}

fn drop_dangling_in_dict(dict: &mut Dictionary, known: &HashSet<ObjectId>) -> usize {
    let mut count = 0;
    dict.as_hashmap_mut().retain(|_, value| {
        count += drop_dangling(value, known);
        !value.is_null()
    });
    count
}
