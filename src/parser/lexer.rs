//! Byte-level tokenizer for PDF syntax.
//!
//! One `Lexer` reads a single buffer (the whole file, a decoded object
//! stream, or a decoded content stream). It has no knowledge of the
//! cross-reference table; indirect `/Length` values are handled by falling
//! back to an `endstream` scan when the declared length is absent or wrong.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectId, Stream};

pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// A "regular" character: anything that can continue a name or keyword.
pub fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Lexer { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Lexer { data, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    /// Skip whitespace and `%` comments (to end of line).
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Read a run of regular characters (a keyword such as `obj` or `true`).
    pub fn read_keyword(&mut self) -> &'a [u8] {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_regular(b) {
                self.pos += 1;
            } else {
                break;
            }
        }
        &self.data[start..self.pos]
    }

    /// Consume `keyword` (after skipping whitespace) or fail.
    pub fn expect_keyword(&mut self, keyword: &[u8]) -> Result<()> {
        self.skip_whitespace();
        let start = self.pos;
        let got = self.read_keyword();
        if got == keyword {
            Ok(())
        } else {
            Err(Error::malformed(format!(
                "expected '{}' at offset {}",
                String::from_utf8_lossy(keyword),
                start
            )))
        }
    }

    /// True when `keyword` is next; consumes it if so.
    pub fn try_keyword(&mut self, keyword: &[u8]) -> bool {
        self.skip_whitespace();
        let save = self.pos;
        if self.read_keyword() == keyword {
            true
        } else {
            self.pos = save;
            false
        }
    }

    /// Parse any object starting at the current position.
    pub fn parse_object(&mut self) -> Result<Object> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(Error::malformed("unexpected end of data")),
            Some(b'/') => Ok(Object::Name(self.parse_name()?)),
            Some(b'(') => Ok(Object::String(self.parse_literal_string()?)),
            Some(b'<') => {
                if self.peek_at(1) == Some(b'<') {
                    self.parse_dict_or_stream()
                } else {
                    Ok(Object::String(self.parse_hex_string()?))
                }
            }
            Some(b'[') => self.parse_array(),
            Some(b'0'..=b'9') | Some(b'+') | Some(b'-') | Some(b'.') => self.parse_numeric(),
            Some(_) => {
                let start = self.pos;
                let kw = self.read_keyword();
                match kw {
                    b"true" => Ok(Object::Boolean(true)),
                    b"false" => Ok(Object::Boolean(false)),
                    b"null" => Ok(Object::Null),
                    _ => Err(Error::malformed(format!(
                        "unexpected token {:?} at offset {}",
                        String::from_utf8_lossy(kw),
                        start
                    ))),
                }
            }
        }
    }

    /// Parse a number, or an indirect reference `N G R` when one follows.
    fn parse_numeric(&mut self) -> Result<Object> {
        let first = self.parse_number()?;
        if let Object::Integer(num) = first {
            if num >= 0 {
                // Trial-parse " G R"; back off if the shape does not match.
                let save = self.pos;
                self.skip_whitespace();
                if matches!(self.peek(), Some(b'0'..=b'9')) {
                    if let Ok(Object::Integer(gen)) = self.parse_number() {
                        if (0..=u16::MAX as i64).contains(&gen) {
                            self.skip_whitespace();
                            if self.peek() == Some(b'R')
                                && self.peek_at(1).map_or(true, |b| !is_regular(b))
                            {
                                self.pos += 1;
                                return Ok(Object::Reference((num as u32, gen as u16)));
                            }
                        }
                    }
                }
                self.pos = save;
            }
        }
        Ok(first)
    }

    /// Parse an integer or real. No exponent notation in PDF numbers.
    pub fn parse_number(&mut self) -> Result<Object> {
        self.skip_whitespace();
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        let mut has_dot = false;
        let mut has_digit = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => {
                    has_digit = true;
                    self.pos += 1;
                }
                b'.' if !has_dot => {
                    has_dot = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        if !has_digit {
            return Err(Error::malformed(format!("invalid number at offset {start}")));
        }
        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| Error::malformed("non-ascii number"))?;
        if has_dot {
            let value: f32 = text
                .parse()
                .map_err(|_| Error::malformed(format!("invalid real {text:?}")))?;
            Ok(Object::Real(value))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| Error::malformed(format!("invalid integer {text:?}")))?;
            Ok(Object::Integer(value))
        }
    }

    /// Parse a name token. `#xx` hex escapes are decoded.
    pub fn parse_name(&mut self) -> Result<String> {
        if self.peek() != Some(b'/') {
            return Err(Error::malformed(format!(
                "expected name at offset {}",
                self.pos
            )));
        }
        self.pos += 1;
        let mut bytes = Vec::new();
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let hi = self.peek().and_then(hex_value);
                let lo = self.peek_at(1).and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    bytes.push(hi * 16 + lo);
                    self.pos += 2;
                } else {
                    bytes.push(b'#');
                }
            } else {
                bytes.push(b);
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parse a `(...)` literal string with nesting and backslash escapes.
    fn parse_literal_string(&mut self) -> Result<Vec<u8>> {
        self.pos += 1; // consume '('
        let mut out = Vec::new();
        let mut depth = 1usize;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(b);
                }
                b'\\' => {
                    let esc = self
                        .peek()
                        .ok_or_else(|| Error::malformed("unterminated string escape"))?;
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'(' | b')' | b'\\' => out.push(esc),
                        b'\r' => {
                            // Line continuation; swallow an optional LF.
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (esc - b'0') as u16;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u16;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xff) as u8);
                        }
                        other => out.push(other),
                    }
                }
                _ => out.push(b),
            }
        }
        Err(Error::malformed("unterminated literal string"))
    }

    /// Parse a `<...>` hex string. An odd final digit implies a trailing 0.
    fn parse_hex_string(&mut self) -> Result<Vec<u8>> {
        self.pos += 1; // consume '<'
        let mut out = Vec::new();
        let mut pending: Option<u8> = None;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'>' {
                if let Some(hi) = pending {
                    out.push(hi * 16);
                }
                return Ok(out);
            }
            if is_whitespace(b) {
                continue;
            }
            let digit = hex_value(b)
                .ok_or_else(|| Error::malformed(format!("invalid hex digit {:?}", b as char)))?;
            match pending.take() {
                Some(hi) => out.push(hi * 16 + digit),
                None => pending = Some(digit),
            }
        }
        Err(Error::malformed("unterminated hex string"))
    }

    fn parse_array(&mut self) -> Result<Object> {
        self.pos += 1; // consume '['
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Object::Array(items));
                }
                None => return Err(Error::malformed("unterminated array")),
                _ => items.push(self.parse_object()?),
            }
        }
    }

    /// Parse `<< ... >>`, then a stream body when `stream` follows.
    fn parse_dict_or_stream(&mut self) -> Result<Object> {
        let dict = self.parse_dict()?;
        let save = self.pos;
        if self.try_keyword(b"stream") {
            let data = self.parse_stream_body(&dict)?;
            Ok(Object::Stream(Stream::new(dict, data)))
        } else {
            self.pos = save;
            Ok(Object::Dict(dict))
        }
    }

    pub fn parse_dict(&mut self) -> Result<Dict> {
        self.skip_whitespace();
        if self.peek() != Some(b'<') || self.peek_at(1) != Some(b'<') {
            return Err(Error::malformed(format!(
                "expected dictionary at offset {}",
                self.pos
            )));
        }
        self.pos += 2; // consume '<<'
        let mut dict = Dict::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    return Ok(dict);
                }
                Some(b'/') => {
                    let key = self.parse_name()?;
                    let value = self.parse_object()?;
                    dict.set(key, value);
                }
                Some(b) => {
                    return Err(Error::malformed(format!(
                        "expected name key in dictionary, found {:?} at offset {}",
                        b as char, self.pos
                    )))
                }
                None => return Err(Error::malformed("unterminated dictionary")),
            }
        }
    }

    /// Read stream payload bytes after the `stream` keyword.
    ///
    /// Uses `/Length` when it is a plausible inline integer; otherwise, or
    /// when the declared region is not followed by `endstream`, scans for
    /// the `endstream` keyword instead.
    fn parse_stream_body(&mut self, dict: &Dict) -> Result<Vec<u8>> {
        // An EOL after `stream` is required by the format; tolerate absence.
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        if self.peek() == Some(b'\n') {
            self.pos += 1;
        }
        let start = self.pos;

        if let Some(len) = dict.get_int("Length") {
            if len >= 0 {
                let end = start + len as usize;
                if end <= self.data.len() {
                    let mut probe = Lexer::at(self.data, end);
                    if probe.try_keyword(b"endstream") {
                        self.pos = probe.pos;
                        return Ok(self.data[start..end].to_vec());
                    }
                }
            }
        }

        let end = self
            .find_endstream(start)
            .ok_or_else(|| Error::malformed("stream without endstream"))?;
        let mut data_end = end;
        // Trim the EOL that belongs to the endstream delimiter, not the data.
        if data_end > start && self.data[data_end - 1] == b'\n' {
            data_end -= 1;
        }
        if data_end > start && self.data[data_end - 1] == b'\r' {
            data_end -= 1;
        }
        self.pos = end + b"endstream".len();
        Ok(self.data[start..data_end].to_vec())
    }

    fn find_endstream(&self, from: usize) -> Option<usize> {
        let needle = b"endstream";
        let data = self.data;
        let mut i = from;
        while i + needle.len() <= data.len() {
            if data[i..].starts_with(needle) {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Parse `N G obj <object> endobj` at the current position.
    pub fn parse_indirect_object(&mut self) -> Result<(ObjectId, Object)> {
        self.skip_whitespace();
        let num = match self.parse_number()? {
            Object::Integer(n) if n >= 0 => n as u32,
            other => {
                return Err(Error::malformed(format!(
                    "invalid object number: {other:?}"
                )))
            }
        };
        let gen = match self.parse_number()? {
            Object::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g as u16,
            other => {
                return Err(Error::malformed(format!(
                    "invalid generation number: {other:?}"
                )))
            }
        };
        self.expect_keyword(b"obj")?;
        let object = self.parse_object()?;
        // A missing endobj is tolerated; many writers get this wrong.
        let save = self.pos;
        if !self.try_keyword(b"endobj") {
            self.pos = save;
        }
        Ok(((num, gen), object))
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
