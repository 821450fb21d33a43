//! Page tree traversal

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::StructureError;
use crate::types::{Object, ObjectExt, ObjectId};

/// Page objects reachable from the catalog's `/Pages`, in document order.
///
/// Cycles are broken by a visited set, and trees deeper than `max_depth`
/// are rejected. Kids that are not references to dictionaries are skipped.
pub fn collect_pages(
    objects: &BTreeMap<ObjectId, Object>,
    catalog: ObjectId,
    max_depth: usize,
) -> Result<Vec<ObjectId>, StructureError> {
    let root = objects
        .get(&catalog)
        .and_then(ObjectExt::dict)
        .and_then(|dict| dict.get(b"Pages").ok())
        .and_then(|pages| pages.as_reference().ok())
        .filter(|id| objects.get(id).and_then(ObjectExt::dict).is_some())
        .ok_or_else(|| StructureError::MissingObject("page tree root /Pages".into()))?;

    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    // Explicit stack keeps deep trees off the call stack
    let mut stack = vec![(root, 0usize)];

    while let Some((id, depth)) = stack.pop() {
        if depth > max_depth {
            return Err(StructureError::NestingTooDeep(max_depth));
        }
        if !visited.insert(id) {
            debug!(node = ?id, "Page tree cycle skipped");
            continue;
        }
        let Some(node) = objects.get(&id).and_then(ObjectExt::dict) else {
            continue;
        };

        let kids = node.get(b"Kids").and_then(Object::as_array).ok();
        let is_leaf = node.has_type(b"Page") || (kids.is_none() && id != root);
        if is_leaf {
            pages.push(id);
            continue;
        }
        if let Some(kids) = kids {
            // Reverse so the first kid is visited first
            for kid in kids.iter().rev().filter_map(|kid| kid.as_reference().ok()) {
                stack.push((kid, depth + 1));
            }
        }
    }
    Ok(pages)
}
