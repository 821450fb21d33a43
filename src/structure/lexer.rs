//! Byte-level reader for PDF values
//!
//! The lexer only recognises syntax. It never looks inside strings or stream
//! payloads beyond finding where they end.

use crate::error::StructureError;
use crate::types::{Dictionary, Object, ObjectId, StringFormat};

type Result<T> = std::result::Result<T, StructureError>;

pub const DEFAULT_MAX_DEPTH: usize = 256;

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C' | b'\0')
}

#[inline]
pub fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

#[inline]
pub fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Cursor over an untrusted buffer
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    max_depth: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Skip whitespace and comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// True when the cursor sits on `keyword` followed by a non-regular byte.
    pub fn at_keyword(&self, keyword: &[u8]) -> bool {
        let rest = self.remaining();
        rest.starts_with(keyword)
            && rest
                .get(keyword.len())
                .map_or(true, |&b| !is_regular(b))
    }

    pub fn expect_keyword(&mut self, keyword: &[u8]) -> Result<()> {
        self.skip_whitespace();
        if self.at_keyword(keyword) {
            self.pos += keyword.len();
            Ok(())
        } else {
            Err(StructureError::corrupted(
                self.pos,
                format!("expected '{}'", String::from_utf8_lossy(keyword)),
            ))
        }
    }

    /// Read a run of ASCII digits.
    pub fn read_unsigned(&mut self) -> Option<u64> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(b) = self.peek() {
            if !b.is_ascii_digit() {
                break;
            }
            value = value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    /// Parse an `N G obj` header, leaving the cursor after `obj`.
    pub fn parse_indirect_header(&mut self) -> Option<ObjectId> {
        let start = self.pos;
        let header = (|| {
            self.skip_whitespace();
            let number = u32::try_from(self.read_unsigned()?).ok()?;
            if !self.peek().map_or(false, is_whitespace) {
                return None;
            }
            self.skip_whitespace();
            let generation = u16::try_from(self.read_unsigned()?).ok()?;
            self.skip_whitespace();
            if !self.at_keyword(b"obj") {
                return None;
            }
            self.pos += 3;
            Some((number, generation))
        })();
        if header.is_none() {
            self.pos = start;
        }
        header
    }

    pub fn parse_object(&mut self) -> Result<Object> {
        self.parse_value(0)
    }

    fn parse_value(&mut self, depth: usize) -> Result<Object> {
        if depth > self.max_depth {
            return Err(StructureError::NestingTooDeep(self.max_depth));
        }
        self.skip_whitespace();
        let b = self
            .peek()
            .ok_or_else(|| StructureError::corrupted(self.pos, "unexpected end of data"))?;

        match b {
            b'/' => Ok(Object::Name(self.parse_name()?)),
            b'(' => self.parse_literal_string(),
            b'<' if self.remaining().starts_with(b"<<") => {
                Ok(Object::Dictionary(self.parse_dictionary(depth)?))
            }
            b'<' => self.parse_hex_string(),
            b'[' => self.parse_array(depth),
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.parse_number_or_reference(),
            _ if is_regular(b) => self.parse_keyword(),
            _ => Err(StructureError::corrupted(
                self.pos,
                format!("unexpected byte 0x{:02x}", b),
            )),
        }
    }

    pub fn parse_name(&mut self) -> Result<Vec<u8>> {
        if self.peek() != Some(b'/') {
            return Err(StructureError::corrupted(self.pos, "expected name"));
        }
        self.pos += 1;
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            if b == b'#' {
                let hex = self.data.get(self.pos + 1..self.pos + 3);
                if let Some(value) = hex.and_then(decode_hex_pair) {
                    name.push(value);
                    self.pos += 3;
                    continue;
                }
            }
            name.push(b);
            self.pos += 1;
        }
        Ok(name)
    }

    pub fn parse_dictionary(&mut self, depth: usize) -> Result<Dictionary> {
        self.pos += 2;
        let mut dict = Dictionary::new();
        loop {
            self.skip_whitespace();
            if self.remaining().starts_with(b">>") {
                self.pos += 2;
                return Ok(dict);
            }
            match self.peek() {
                Some(b'/') => {}
                Some(_) => {
                    return Err(StructureError::corrupted(self.pos, "expected dictionary key"))
                }
                None => return Err(StructureError::corrupted(self.pos, "unterminated dictionary")),
            }
            let key = self.parse_name()?;
            self.skip_whitespace();
            if self.remaining().starts_with(b">>") {
                // Key without a value reads as null, i.e. absent
                continue;
            }
            let value = self.parse_value(depth + 1)?;
            if !value.is_null() {
                dict.set(key, value);
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<Object> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Object::Array(items));
                }
                Some(_) => items.push(self.parse_value(depth + 1)?),
                None => return Err(StructureError::corrupted(self.pos, "unterminated array")),
            }
        }
    }

    fn parse_literal_string(&mut self) -> Result<Object> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        let mut nesting = 1usize;

        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'\\' => {
                    let Some(esc) = self.peek() else { break };
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => out.push(other),
                    }
                }
                b'(' => {
                    nesting += 1;
                    out.push(b);
                }
                b')' => {
                    nesting -= 1;
                    if nesting == 0 {
                        return Ok(Object::String(out, StringFormat::Literal));
                    }
                    out.push(b);
                }
                b'\r' => {
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    out.push(b'\n');
                }
                _ => out.push(b),
            }
        }
        Err(StructureError::corrupted(start, "unterminated string"))
    }

    fn parse_hex_string(&mut self) -> Result<Object> {
        let start = self.pos;
        self.pos += 1;
        let mut nibbles = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'>' => {
                    if nibbles.len() % 2 == 1 {
                        nibbles.push(0);
                    }
                    let bytes = nibbles.chunks(2).map(|p| (p[0] << 4) | p[1]).collect();
                    return Ok(Object::String(bytes, StringFormat::Hexadecimal));
                }
                _ if is_whitespace(b) => {}
                _ => match hex_value(b) {
                    Some(v) => nibbles.push(v),
                    None => return Err(StructureError::corrupted(self.pos - 1, "bad hex digit")),
                },
            }
        }
        Err(StructureError::corrupted(start, "unterminated hex string"))
    }

    fn parse_number_or_reference(&mut self) -> Result<Object> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !matches!(b, b'+' | b'-' | b'.' | b'0'..=b'9') {
                break;
            }
            self.pos += 1;
        }
        let data = self.data;
        let token = &data[start..self.pos];
        let text = std::str::from_utf8(token)
            .map_err(|_| StructureError::corrupted(start, "bad number"))?;

        if !token.contains(&b'.') {
            if let Ok(value) = text.parse::<i64>() {
                if let Some(reference) = self.try_reference(value) {
                    return Ok(reference);
                }
                return Ok(Object::Integer(value));
            }
        }
        match text.parse::<f64>().map(|value| value as f32) {
            Ok(value) if value.is_finite() => Ok(Object::Real(value)),
            // "-" or "." alone, seen in sloppy writers
            _ if token.iter().all(|b| !b.is_ascii_digit()) => Ok(Object::Integer(0)),
            _ => Err(StructureError::corrupted(start, "bad number")),
        }
    }

    /// After an integer, look ahead for `G R`.
    fn try_reference(&mut self, number: i64) -> Option<Object> {
        let number = u32::try_from(number).ok()?;
        let save = self.pos;
        let reference = (|| {
            if !self.peek().map_or(false, is_whitespace) {
                return None;
            }
            self.skip_whitespace();
            let generation = u16::try_from(self.read_unsigned()?).ok()?;
            self.skip_whitespace();
            if !self.at_keyword(b"R") {
                return None;
            }
            self.pos += 1;
            Some(Object::Reference((number, generation)))
        })();
        if reference.is_none() {
            self.pos = save;
        }
        reference
    }

    fn parse_keyword(&mut self) -> Result<Object> {
        let start = self.pos;
        while self.peek().map_or(false, is_regular) {
            self.pos += 1;
        }
        let data = self.data;
        match &data[start..self.pos] {
            b"true" => Ok(Object::Boolean(true)),
            b"false" => Ok(Object::Boolean(false)),
            b"null" => Ok(Object::Null),
            other => {
                self.pos = start;
                Err(StructureError::corrupted(
                    start,
                    format!("unexpected token '{}'", String::from_utf8_lossy(other)),
                ))
            }
        }
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_hex_pair(pair: &[u8]) -> Option<u8> {
    Some((hex_value(pair[0])? << 4) | hex_value(pair[1])?)
}

/// Last position of `needle` in `haystack`
pub fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// First position of `needle` at or after `from`
pub fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Every position of `needle`, ascending, from one pass over `haystack`.
pub fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        Lexer::new(input, 0).parse_object().unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"-42"), Object::Integer(-42));
        assert_eq!(parse(b"3.5"), Object::Real(3.5));
        assert_eq!(parse(b"-.5"), Object::Real(-0.5));
    }

    #[test]
    fn test_reference_lookahead() {
        assert_eq!(parse(b"12 0 R"), Object::Reference((12, 0)));
        let arr = parse(b"[1 0 0 1 0 0]");
        assert_eq!(arr.as_array().unwrap().len(), 6);
        let mixed = parse(b"[1 0 R 2]");
        assert_eq!(
            mixed,
            Object::Array(vec![
                Object::Reference((1, 0)),
                Object::Integer(2)
            ])
        );
    }

    #[test]
    fn test_name_hex_escape() {
        assert_eq!(parse(b"/Java#53cript"), Object::Name(b"JavaScript".to_vec()));
    }

    #[test]
    fn test_literal_string_escapes_and_nesting() {
        let obj = parse(b"(a\\(b\\) (nested) \\101\\\ncont)");
        assert_eq!(
            obj,
            Object::String(b"a(b) (nested) Acont".to_vec(), StringFormat::Literal)
        );
    }

    #[test]
    fn test_hex_string_odd_length() {
        assert_eq!(
            parse(b"<4142 4>"),
            Object::String(vec![0x41, 0x42, 0x40], StringFormat::Hexadecimal)
        );
    }

    #[test]
    fn test_dictionary_drops_null_entries() {
        let obj = parse(b"<< /Type /Catalog /OpenAction null /Pages 2 0 R /Dangling >>");
        let dict = obj.as_dict().unwrap();
        assert!(dict.has_type(b"Catalog"));
        assert!(!dict.has(b"OpenAction"));
        assert!(!dict.has(b"Dangling"));
        assert_eq!(dict.get(b"Pages").unwrap(), &Object::Reference((2, 0)));
    }

    #[test]
    fn test_comments_are_skipped() {
        let obj = parse(b"% leading\n[ 1 % inner\n 2 ]");
        assert_eq!(obj.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = [b"[".repeat(40), b"]".repeat(40)].concat();
        let err = Lexer::new(&deep, 0).with_max_depth(16).parse_object().unwrap_err();
        assert_eq!(err, StructureError::NestingTooDeep(16));
    }

    #[test]
    fn test_unterminated_input_is_an_error() {
        assert!(Lexer::new(b"<< /A (open", 0).parse_object().is_err());
        assert!(Lexer::new(b"[1 2", 0).parse_object().is_err());
    }

    #[test]
    fn test_indirect_header() {
        let mut lexer = Lexer::new(b"  7 0 obj << >> endobj", 0);
        assert_eq!(lexer.parse_indirect_header(), Some((7, 0)));
        assert!(lexer.parse_object().unwrap().as_dict().unwrap().is_empty());

        let mut bad = Lexer::new(b"7 0 objx", 0);
        assert_eq!(bad.parse_indirect_header(), None);
        assert_eq!(bad.pos(), 0);
    }

    #[test]
    fn test_search_helpers() {
        assert_eq!(rfind(b"xref ... startxref 9 startxref 12", b"startxref"), Some(21));
        assert_eq!(find_from(b"abcabc", b"abc", 1), Some(3));
        assert_eq!(find_from(b"abc", b"zz", 0), None);
        assert_eq!(find_all(b"endstream x endstream", b"endstream"), vec![0, 12]);
        assert!(find_all(b"end", b"endstream").is_empty());
    }
}
