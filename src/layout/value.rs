//! Preference values as printed by `defaults read`.
//!
//! `defaults` prints the old-style (NeXTSTEP) plist syntax:
//!
//! ```text
//! (
//!     name,
//!     "creation date"
//! )
//! {
//!     name = 240;
//!     "creation date" = "120.5";
//! }
//! ```
//!
//! Arrays become ordered string lists, dicts become column -> width maps.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};

/// A layout value in its semantic shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrefValue {
    /// Array-shaped value: ordered column identifiers.
    List(Vec<String>),
    /// Dict-shaped value: column identifier -> width.
    Numbers(BTreeMap<String, f64>),
    /// Anything else, verbatim.
    Text(String),
}

/// Parse the stdout of `defaults read <domain> <key>`.
pub fn parse_defaults_output(output: &str) -> Result<PrefValue> {
    let trimmed = output.trim();
    if !(trimmed.starts_with('(') || trimmed.starts_with('{')) {
        return Ok(PrefValue::Text(trimmed.to_string()));
    }

    let mut parser = Parser::new(trimmed);
    let node = parser.value()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("trailing characters"));
    }
    node.into_pref_value()
}

enum Node {
    Scalar(String),
    Array(Vec<Node>),
    Dict(Vec<(String, Node)>),
}

impl Node {
    fn into_pref_value(self) -> Result<PrefValue> {
        match self {
            Node::Scalar(text) => Ok(PrefValue::Text(text)),
            Node::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Node::Scalar(text) => Ok(text),
                    _ => Err(Error::Malformed(
                        "nested container inside a column list".into(),
                    )),
                })
                .collect::<Result<Vec<_>>>()
                .map(PrefValue::List),
            Node::Dict(entries) => entries
                .into_iter()
                .map(|(key, value)| match value {
                    Node::Scalar(text) => text
                        .trim()
                        .parse::<f64>()
                        .map(|width| (key.clone(), width))
                        .map_err(|_| {
                            Error::Malformed(format!("width of '{key}' is not a number: {text}"))
                        }),
                    _ => Err(Error::Malformed(format!(
                        "width of '{key}' is a container"
                    ))),
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(PrefValue::Numbers),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, what: &str) -> Error {
        Error::Malformed(format!("defaults output: {what} at offset {}", self.pos))
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if self.src[self.pos..].starts_with("/*") {
                match self.src[self.pos..].find("*/") {
                    Some(end) => self.pos += end + 2,
                    None => self.pos = self.src.len(),
                }
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, want: char) -> Result<()> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == want => Ok(()),
            _ => Err(self.error(&format!("expected '{want}'"))),
        }
    }

    fn value(&mut self) -> Result<Node> {
        self.skip_ws();
        match self.peek() {
            Some('(') => self.array(),
            Some('{') => self.dict(),
            Some(_) => self.scalar().map(Node::Scalar),
            None => Err(self.error("unexpected end")),
        }
    }

    fn array(&mut self) -> Result<Node> {
        self.expect('(')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(')') {
                self.bump();
                return Ok(Node::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(')') => return Ok(Node::Array(items)),
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }

    fn dict(&mut self) -> Result<Node> {
        self.expect('{')?;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Node::Dict(entries));
            }
            let key = self.scalar()?;
            self.expect('=')?;
            let value = self.value()?;
            self.expect(';')?;
            entries.push((key, value));
        }
    }

    fn scalar(&mut self) -> Result<String> {
        self.skip_ws();
        match self.peek() {
            Some('"') => self.quoted(),
            Some('<') => {
                let end = self.src[self.pos..]
                    .find('>')
                    .ok_or_else(|| self.error("unterminated data"))?;
                let raw = self.src[self.pos..self.pos + end + 1].to_string();
                self.pos += end + 1;
                Ok(raw)
            }
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || matches!(c, ',' | ';' | '=' | ')' | '}' | '(' | '{') {
                        break;
                    }
                    self.bump();
                }
                if start == self.pos {
                    return Err(self.error("expected a value"));
                }
                Ok(self.src[start..self.pos].to_string())
            }
        }
    }

    fn quoted(&mut self) -> Result<String> {
        self.bump();
        let mut out = String::new();
        // \U escapes are UTF-16 code units and may form surrogate pairs
        let mut units: Vec<u16> = Vec::new();

        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            if c == '\\' {
                let esc = self.bump().ok_or_else(|| self.error("dangling escape"))?;
                if esc == 'U' || esc == 'u' {
                    let hex = self
                        .src
                        .get(self.pos..self.pos + 4)
                        .ok_or_else(|| self.error("short \\U escape"))?;
                    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                        return Err(self.error("bad \\U escape"));
                    }
                    let unit = u16::from_str_radix(hex, 16)
                        .map_err(|_| self.error("bad \\U escape"))?;
                    self.pos += 4;
                    units.push(unit);
                    continue;
                }
                flush_units(&mut units, &mut out);
                out.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                continue;
            }

            flush_units(&mut units, &mut out);
            if c == '"' {
                return Ok(out);
            }
            out.push(c);
        }
    }
}

fn flush_units(units: &mut Vec<u16>, out: &mut String) {
    if units.is_empty() {
        return;
    }
    out.extend(
        char::decode_utf16(units.drain(..)).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)),
    );
}
