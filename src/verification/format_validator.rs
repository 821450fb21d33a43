//! Format gatekeeping ahead of any parsing
//! Author: kartik4091

use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// PDF magic, including the dash that precedes the version
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Content sniffing capability. Gate decisions treat a missing sniffer as
/// "header match is authoritative".
pub trait ContentSniffer: Send + Sync {
    /// Best-effort MIME classification of the buffer
    fn mime_type(&self, data: &[u8]) -> Option<&'static str>;
}

/// Magic-number sniffer covering the formats commonly disguised as PDFs.
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicSniffer;

impl ContentSniffer for MagicSniffer {
    fn mime_type(&self, data: &[u8]) -> Option<&'static str> {
        const SIGNATURES: &[(&[u8], &str)] = &[
            (b"%PDF-", "application/pdf"),
            (b"\x89PNG\r\n\x1a\n", "image/png"),
            (b"\xFF\xD8\xFF", "image/jpeg"),
            (b"GIF87a", "image/gif"),
            (b"GIF89a", "image/gif"),
            (b"PK\x03\x04", "application/zip"),
            (b"{\\rtf", "application/rtf"),
            (b"Rar!\x1a\x07", "application/vnd.rar"),
            (b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1", "application/x-ole-storage"),
            (b"MZ", "application/x-msdownload"),
            (b"\x7FELF", "application/x-elf"),
        ];

        if data.is_empty() {
            return None;
        }
        for &(magic, mime) in SIGNATURES {
            if data.starts_with(magic) {
                return Some(mime);
            }
        }
        Some("application/octet-stream")
    }
}

/// Outcome of the format checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCheck {
    pub is_pdf_header: bool,
    pub mime: Option<&'static str>,
}

impl FormatCheck {
    pub fn accepted(&self) -> bool {
        let mime_ok = match self.mime {
            Some(mime) => mime.contains("pdf"),
            None => true,
        };
        self.is_pdf_header && mime_ok
    }
}

/// Rejects empty, oversized and non-PDF input. Holds no per-request state.
pub struct FormatValidator {
    max_bytes: u64,
    sniffer: Option<Box<dyn ContentSniffer>>,
}

impl FormatValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            sniffer: Some(Box::new(MagicSniffer)),
        }
    }

    pub fn with_sniffer(mut self, sniffer: Option<Box<dyn ContentSniffer>>) -> Self {
        self.sniffer = sniffer;
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Compute header and MIME checks without deciding anything.
    pub fn inspect(&self, data: &[u8]) -> FormatCheck {
        FormatCheck {
            is_pdf_header: data.starts_with(PDF_MAGIC),
            mime: self.sniffer.as_ref().and_then(|s| s.mime_type(data)),
        }
    }

    /// Size ceiling only; usable before the rest of the checks.
    pub fn check_size(&self, declared_size: u64) -> Result<()> {
        if declared_size > self.max_bytes {
            return Err(Error::OversizedInput {
                size: declared_size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn validate(&self, data: &[u8], declared_size: u64) -> Result<FormatCheck> {
        if data.is_empty() || declared_size == 0 {
            return Err(Error::EmptyInput);
        }
        self.check_size(declared_size.max(data.len() as u64))?;

        let check = self.inspect(data);
        debug!(is_pdf_header = check.is_pdf_header, mime = ?check.mime, "Format inspected");
        if !check.accepted() {
            return Err(Error::UnsupportedFormat(
                check.mime.unwrap_or("unknown").to_string(),
            ));
        }
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSniffer(&'static str);

    impl ContentSniffer for FixedSniffer {
        fn mime_type(&self, _data: &[u8]) -> Option<&'static str> {
            Some(self.0)
        }
    }

    #[test]
    fn test_accepts_pdf_header() {
        let validator = FormatValidator::new(1024);
        let check = validator.validate(b"%PDF-1.7\n", 9).unwrap();
        assert!(check.is_pdf_header);
        assert_eq!(check.mime, Some("application/pdf"));
    }

    #[test]
    fn test_rejects_empty() {
        let validator = FormatValidator::new(1024);
        assert!(matches!(validator.validate(b"", 0), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_rejects_oversized() {
        let validator = FormatValidator::new(4);
        let err = validator.validate(b"%PDF-1.4", 8).unwrap_err();
        assert!(matches!(err, Error::OversizedInput { size: 8, limit: 4 }));
    }

    #[test]
    fn test_rejects_png_signature() {
        let validator = FormatValidator::new(1024);
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        let err = validator.validate(png, png.len() as u64).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref m) if m == "image/png"));
    }

    #[test]
    fn test_header_alone_is_authoritative_without_sniffer() {
        let validator = FormatValidator::new(1024).with_sniffer(None);
        assert!(validator.validate(b"%PDF-1.4", 8).is_ok());
        assert!(validator.validate(b"%!PS-Adobe", 10).is_err());
    }

    #[test]
    fn test_sniffer_disagreement_rejects() {
        let validator =
            FormatValidator::new(1024).with_sniffer(Some(Box::new(FixedSniffer("text/plain"))));
        assert!(matches!(
            validator.validate(b"%PDF-1.4", 8),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_header_must_be_at_offset_zero() {
        let validator = FormatValidator::new(1024);
        assert!(validator.validate(b"  %PDF-1.4", 10).is_err());
    }
}
