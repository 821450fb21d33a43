//! Encryption detection
//! Author: kartik4091
//!
//! Encrypted documents are refused outright. Nothing is decrypted and no
//! partial sanitization is attempted.

use tracing::{debug, warn};

use crate::error::{Error, Result, StructureError};
use crate::structure::lexer::{find_from, is_regular};
use crate::types::PdfDocument;

const ENCRYPT_KEY: &[u8] = b"/Encrypt";

/// Reject a parsed document whose trailer carries an encryption dictionary.
pub fn check_document(doc: &PdfDocument) -> Result<()> {
    if doc.trailer.has(b"Encrypt") {
        warn!("Trailer declares /Encrypt");
        return Err(Error::PasswordProtected);
    }
    debug!("No encryption dictionary");
    Ok(())
}

/// True when the raw bytes contain an `/Encrypt` key.
///
/// `/EncryptMetadata` and similar longer names do not match.
pub fn has_encrypt_marker(data: &[u8]) -> bool {
    let mut from = 0;
    while let Some(pos) = find_from(data, ENCRYPT_KEY, from) {
        let next = data.get(pos + ENCRYPT_KEY.len()).copied();
        if !next.map_or(false, is_regular) {
            return true;
        }
        from = pos + ENCRYPT_KEY.len();
    }
    false
}

/// Map a parse failure onto the caller-visible taxonomy. A document that
/// declares encryption anywhere is reported as encrypted even when it is
/// also malformed.
pub fn classify_parse_failure(data: &[u8], err: StructureError) -> Error {
    if has_encrypt_marker(data) {
        warn!(error = %err, "Unparsable document declares encryption");
        Error::PasswordProtected
    } else {
        Error::MalformedStructure(err)
    }
}
