//! Shared PDF fixtures for integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;

/// Assembles a PDF with a correct classic cross-reference table.
pub struct PdfBuilder {
    version: &'static str,
    objects: BTreeMap<u32, Vec<u8>>,
    trailer: String,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.4",
            objects: BTreeMap::new(),
            trailer: "/Root 1 0 R".to_string(),
        }
    }

    pub fn object(mut self, num: u32, body: &str) -> Self {
        self.objects.insert(num, body.as_bytes().to_vec());
        self
    }

    pub fn stream(mut self, num: u32, dict: &str, data: &[u8]) -> Self {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.insert(num, body);
        self
    }

    /// Trailer entries other than `/Size`
    pub fn trailer(mut self, entries: &str) -> Self {
        self.trailer = entries.to_string();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = format!("%PDF-{}\n", self.version).into_bytes();
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut offsets = BTreeMap::new();
        for (num, body) in &self.objects {
            offsets.insert(*num, out.len());
            out.extend_from_slice(format!("{} 0 obj\n", num).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let size = self.objects.keys().next_back().map_or(1, |n| n + 1);
        let xref_offset = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for num in 1..size {
            match offsets.get(&num) {
                Some(offset) => out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes()),
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n",
                size, self.trailer, xref_offset
            )
            .as_bytes(),
        );
        out
    }
}

pub struct TestFixtures;

impl TestFixtures {
    /// Catalog 1, pages 2, page 3, content 4, info 5
    fn base() -> PdfBuilder {
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>",
            )
            .stream(4, "", b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET")
            .object(5, "<< /Author (Someone) /Producer (Test Writer 1.0) >>")
            .trailer("/Root 1 0 R /Info 5 0 R")
    }

    /// A document without any active content
    pub fn minimal_pdf() -> Vec<u8> {
        Self::base().build()
    }

    pub fn open_action_pdf() -> Vec<u8> {
        Self::base()
            .object(1, "<< /Type /Catalog /Pages 2 0 R /OpenAction 6 0 R >>")
            .object(6, "<< /S /JavaScript /JS (app.alert\\(1\\)) >>")
            .build()
    }

    /// Page with a FileAttachment annotation (6) and a plain link (7)
    pub fn file_attachment_pdf() -> Vec<u8> {
        Self::base()
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Annots [6 0 R 7 0 R] >>",
            )
            .object(
                6,
                "<< /Type /Annot /Subtype /FileAttachment /Rect [0 0 10 10] /FS 8 0 R >>",
            )
            .object(
                7,
                "<< /Type /Annot /Subtype /Link /Rect [0 0 50 50] /A << /S /URI /URI (https://example.com) >> >>",
            )
            .object(8, "<< /Type /Filespec /F (payload.exe) /EF << /F 9 0 R >> >>")
            .stream(9, "/Type /EmbeddedFile", b"MZ-EMBEDDED-PAYLOAD")
            .build()
    }

    /// FileAttachment (6) whose popup (10) points back through `/Parent`,
    /// plus a reply (11) answering it through `/IRT`
    pub fn popup_attachment_pdf() -> Vec<u8> {
        Self::base()
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Annots [6 0 R 10 0 R 11 0 R] >>",
            )
            .object(
                6,
                "<< /Type /Annot /Subtype /FileAttachment /Rect [0 0 10 10] /FS 8 0 R /Popup 10 0 R >>",
            )
            .object(8, "<< /Type /Filespec /F (payload.exe) /EF << /F 9 0 R >> >>")
            .stream(9, "/Type /EmbeddedFile", b"MZ-EMBEDDED-PAYLOAD")
            .object(
                10,
                "<< /Type /Annot /Subtype /Popup /Rect [20 20 200 100] /Parent 6 0 R >>",
            )
            .object(
                11,
                "<< /Type /Annot /Subtype /Text /Rect [0 0 10 10] /IRT 6 0 R /Contents (reply) >>",
            )
            .build()
    }

    /// Names/JavaScript tree with two named scripts
    pub fn names_javascript_pdf() -> Vec<u8> {
        Self::base()
            .object(1, "<< /Type /Catalog /Pages 2 0 R /Names 6 0 R >>")
            .object(6, "<< /JavaScript 7 0 R >>")
            .object(7, "<< /Names [(first) 8 0 R (second) 9 0 R] >>")
            .object(8, "<< /S /JavaScript /JS (this.print\\(\\)) >>")
            .object(9, "<< /S /JavaScript /JS (this.submitForm\\(\\)) >>")
            .build()
    }

    pub fn encrypted_pdf() -> Vec<u8> {
        Self::base()
            .object(
                6,
                "<< /Filter /Standard /V 2 /R 3 /Length 128 /P -3904 /O <7a2f5b1c> /U <4e1d8a90> >>",
            )
            .trailer("/Root 1 0 R /Info 5 0 R /Encrypt 6 0 R /ID [<0a0b0c0d> <0a0b0c0d>]")
            .build()
    }

    pub fn png_bytes() -> Vec<u8> {
        b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0".to_vec()
    }
}
