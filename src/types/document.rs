use std::collections::BTreeMap;

use super::object::{Dictionary, Object, ObjectExt, ObjectId};
use crate::error::StructureError;

/// What the parser had to tolerate to produce a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseDiagnostics {
    /// The cross-reference data was rebuilt from a full-file object scan
    pub recovered: bool,
    /// References to objects absent from the table, replaced by `null`
    pub dangling_references: usize,
    /// Objects listed in the table that could not be read
    pub unreadable_objects: Vec<ObjectId>,
}

impl ParseDiagnostics {
    pub fn is_clean(&self) -> bool {
        !self.recovered && self.dangling_references == 0 && self.unreadable_objects.is_empty()
    }
}

/// A parsed document, exclusively owned by one sanitization run.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    /// Header version, e.g. `1.7`
    pub version: String,
    pub objects: BTreeMap<ObjectId, Object>,
    pub trailer: Dictionary,
    pub catalog: ObjectId,
    /// Page objects in document order
    pub pages: Vec<ObjectId>,
    pub diagnostics: ParseDiagnostics,
}

impl PdfDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    /// Follow a reference one hop; direct values are returned as-is.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.objects.get(id),
            other => Some(other),
        }
    }

    pub fn catalog(&self) -> Option<&Dictionary> {
        self.get(self.catalog).and_then(ObjectExt::dict)
    }

    pub fn catalog_mut(&mut self) -> Option<&mut Dictionary> {
        let id = self.catalog;
        self.get_mut(id).and_then(ObjectExt::dict_mut)
    }

    /// Store `obj` under a fresh identifier above every existing one.
    pub fn add_object(&mut self, obj: Object) -> Result<ObjectId, StructureError> {
        let id = next_object_id(&self.objects)?;
        self.objects.insert(id, obj);
        Ok(id)
    }
}

/// Identifier one above the highest object number in use. Never wraps.
pub fn next_object_id(objects: &BTreeMap<ObjectId, Object>) -> Result<ObjectId, StructureError> {
    let highest = objects.keys().next_back().map_or(0, |id| id.0);
    let number = highest
        .checked_add(1)
        .ok_or_else(|| StructureError::corrupted(0, "object numbers exhausted"))?;
    Ok((number, 0))
}
