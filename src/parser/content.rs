//! Content-stream parsing: operands, operators, and inline images.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, Stream};
use crate::parser::lexer::{self, Lexer};

/// One drawing instruction: its operand list and operator tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<Object>,
}

impl ContentOp {
    pub fn number(&self, index: usize) -> Option<f32> {
        self.operands.get(index).and_then(Object::as_number)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.operands.get(index).and_then(Object::as_name)
    }
}

/// Splits a decoded content stream into [`ContentOp`]s.
///
/// Operand-level syntax errors (unterminated strings, broken
/// dictionaries) abort parsing; an unknown operator is just a token here
/// and is the interpreter's business to skip.
pub struct ContentParser<'a> {
    lexer: Lexer<'a>,
    data: &'a [u8],
}

impl<'a> ContentParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ContentParser {
            lexer: Lexer::new(data),
            data,
        }
    }

    pub fn parse_all(mut self) -> Result<Vec<ContentOp>> {
        let mut ops = Vec::new();
        let mut operands = Vec::new();
        loop {
            self.lexer.skip_whitespace();
            if self.lexer.at_end() {
                break;
            }
            match self.peek_class() {
                TokenClass::Operand => operands.push(self.lexer.parse_object()?),
                TokenClass::Keyword => {
                    let keyword = self.lexer.read_keyword();
                    if keyword.is_empty() {
                        return Err(Error::malformed(format!(
                            "stray delimiter in content stream at offset {}",
                            self.lexer.pos()
                        )));
                    }
                    match keyword {
                        b"true" => operands.push(Object::Boolean(true)),
                        b"false" => operands.push(Object::Boolean(false)),
                        b"null" => operands.push(Object::Null),
                        b"BI" => {
                            ops.push(self.parse_inline_image()?);
                            operands = Vec::new();
                        }
                        _ => {
                            ops.push(ContentOp {
                                operator: String::from_utf8_lossy(keyword).into_owned(),
                                operands: std::mem::take(&mut operands),
                            });
                        }
                    }
                }
            }
        }
        Ok(ops)
    }

    fn peek_class(&self) -> TokenClass {
        match self.data.get(self.lexer.pos()) {
            Some(b'/') | Some(b'(') | Some(b'<') | Some(b'[') | Some(b'0'..=b'9')
            | Some(b'+') | Some(b'-') | Some(b'.') => TokenClass::Operand,
            _ => TokenClass::Keyword,
        }
    }

    /// `BI` was consumed; read key/value pairs to `ID`, then the sample
    /// bytes up to a free-standing `EI`.
    fn parse_inline_image(&mut self) -> Result<ContentOp> {
        let mut dict = Dict::new();
        loop {
            self.lexer.skip_whitespace();
            if self.lexer.at_end() {
                return Err(Error::malformed("inline image without ID"));
            }
            if self.lexer.try_keyword(b"ID") {
                break;
            }
            let key = self.lexer.parse_name()?;
            let value = self.lexer.parse_object()?;
            dict.set(key, value);
        }
        // Exactly one whitespace byte separates ID from the samples.
        let mut start = self.lexer.pos();
        if self
            .data
            .get(start)
            .is_some_and(|&b| lexer::is_whitespace(b))
        {
            start += 1;
        }
        let end = find_inline_end(self.data, start)
            .ok_or_else(|| Error::malformed("inline image without EI"))?;
        let mut data_end = end;
        if data_end > start && lexer::is_whitespace(self.data[data_end - 1]) {
            data_end -= 1;
        }
        self.lexer.seek(end + 2);
        Ok(ContentOp {
            operator: "BI".to_string(),
            operands: vec![Object::Stream(Stream::new(
                dict,
                self.data[start..data_end].to_vec(),
            ))],
        })
    }
}

enum TokenClass {
    Operand,
    Keyword,
}

/// Find `EI` standing alone after the sample data.
fn find_inline_end(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 2 <= data.len() {
        if data[i] == b'E'
            && data[i + 1] == b'I'
            && (i == 0 || lexer::is_whitespace(data[i - 1]))
            && data.get(i + 2).map_or(true, |&b| !lexer::is_regular(b))
        {
            return Some(i);
        }
        i += 1;
    }
    None
}
