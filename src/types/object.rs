//! Object model helpers
//! Author: kartik4091
//!
//! Documents are held as `lopdf` values. Names are stored without the
//! leading slash and with `#xx` escapes already decoded.

pub use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};

/// Queries the gate needs on top of what `lopdf::Object` offers.
pub trait ObjectExt {
    /// Dictionary of a dictionary or of a stream
    fn dict(&self) -> Option<&Dictionary>;

    fn dict_mut(&mut self) -> Option<&mut Dictionary>;

    /// Visit every reference held directly or through nested containers.
    fn for_each_reference<F: FnMut(ObjectId)>(&self, f: &mut F);
}

impl ObjectExt for Object {
    fn dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    fn dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&mut stream.dict),
            _ => None,
        }
    }

    fn for_each_reference<F: FnMut(ObjectId)>(&self, f: &mut F) {
        match self {
            Object::Reference(id) => f(*id),
            Object::Array(items) => items.iter().for_each(|item| item.for_each_reference(f)),
            Object::Dictionary(dict) => dict.iter().for_each(|(_, v)| v.for_each_reference(f)),
            Object::Stream(stream) => stream.dict.iter().for_each(|(_, v)| v.for_each_reference(f)),
            _ => {}
        }
    }
}

/// True when `key` holds the name `expected`.
pub fn name_is(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    dict.get(key).and_then(Object::as_name).ok() == Some(expected)
}
