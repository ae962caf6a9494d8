//! Structured Field values (RFC 8941) for the subset carried by message signatures:
//! Dictionaries whose members are Items or Inner Lists, with Parameters, and the bare item
//! types (Integers, Decimals, Strings, Tokens, Byte Sequences, Booleans).
//!
//! Parsing is strict: unknown structure is rejected, and parse errors identify the byte offset
//! at which parsing failed. Serialization is canonical, so a value that is parsed and
//! re-serialized always produces the same bytes on both peers.
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions.

use {
    crate::SignatureError,
    base64::{engine::general_purpose::STANDARD as BASE64, Engine as _},
    lazy_static::lazy_static,
    std::fmt::Write as _,
};

/// Largest absolute value of a Structured Field Integer (15 decimal digits).
const INTEGER_MAX_ABS: i64 = 999_999_999_999_999;

/// Largest absolute integral part of a Structured Field Decimal (12 decimal digits).
const DECIMAL_MAX_ABS_INTEGRAL: i64 = 999_999_999_999;

lazy_static! {
    /// Dictionary and parameter keys: lowercase alpha or `*` first, then
    /// lowercase alpha, digits, `_`, `-`, `.`, or `*`.
    static ref KEY: regex::Regex = regex::Regex::new(r"^[a-z*][a-z0-9_.*-]*$").unwrap();

    /// Tokens: alpha or `*` first, then tchar, `:`, or `/`.
    static ref TOKEN: regex::Regex =
        regex::Regex::new(r"^[A-Za-z*][!#$%&'*+.^_`|~:/0-9A-Za-z-]*$").unwrap();
}

/// A bare Structured Field value, without parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum BareItem {
    /// A signed integer of at most 15 decimal digits.
    Integer(i64),

    /// A decimal number, stored in thousandths (three fractional digits of precision).
    Decimal(i64),

    /// An ASCII string, serialized with surrounding double quotes.
    String(String),

    /// A token.
    Token(String),

    /// A byte sequence, serialized as `:base64:`.
    ByteSeq(Vec<u8>),

    /// A boolean, serialized as `?0` or `?1`.
    Boolean(bool),
}

impl BareItem {
    /// The string payload, when this is a String item.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            BareItem::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, when this is an Integer item.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BareItem::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The byte payload, when this is a Byte Sequence item.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BareItem::ByteSeq(b) => Some(b),
            _ => None,
        }
    }

    /// The boolean payload, when this is a Boolean item.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BareItem::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// An ordered parameter list attached to an item, inner list, or dictionary member.
pub type Parameters = Vec<(String, BareItem)>;

/// A bare item together with its parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// The item value.
    pub value: BareItem,

    /// Parameters, in serialization order.
    pub params: Parameters,
}

impl Item {
    /// An item with no parameters.
    pub fn new(value: BareItem) -> Self {
        Item {
            value,
            params: Parameters::new(),
        }
    }
}

/// A parenthesized list of items with list-level parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InnerList {
    /// The member items, in order.
    pub items: Vec<Item>,

    /// Parameters attached to the list itself, in serialization order.
    pub params: Parameters,
}

/// A dictionary member value: either a single item or an inner list.
#[derive(Clone, Debug, PartialEq)]
pub enum Member {
    /// A member carrying a single item.
    Item(Item),

    /// A member carrying an inner list.
    InnerList(InnerList),
}

/// An ordered dictionary of keys to members.
///
/// Duplicate keys on parse follow RFC 8941: the last value wins, and the member keeps its
/// first position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dictionary {
    members: Vec<(String, Member)>,
}

impl Dictionary {
    /// An empty dictionary.
    pub fn new() -> Self {
        Dictionary::default()
    }

    /// Set `key` to `member`, overwriting in place if the key is already present.
    pub fn insert(&mut self, key: String, member: Member) {
        for (existing, value) in &mut self.members {
            if *existing == key {
                *value = member;
                return;
            }
        }
        self.members.push((key, member));
    }

    /// Look up a member by key.
    pub fn get(&self, key: &str) -> Option<&Member> {
        self.members.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate members in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the dictionary has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Parse a complete header value as a Dictionary.
pub fn parse_dictionary(input: &str) -> Result<Dictionary, SignatureError> {
    let mut parser = Parser::new(input);
    parser.discard_sp();
    let dict = parser.parse_dictionary()?;
    parser.finish()?;
    Ok(dict)
}

/// Parse a complete header value as a List.
pub fn parse_list(input: &str) -> Result<Vec<Member>, SignatureError> {
    let mut parser = Parser::new(input);
    parser.discard_sp();
    let list = parser.parse_list()?;
    parser.finish()?;
    Ok(list)
}

/// Parse a complete header value as a single Item.
pub fn parse_item(input: &str) -> Result<Item, SignatureError> {
    let mut parser = Parser::new(input);
    parser.discard_sp();
    let item = parser.parse_item()?;
    parser.finish()?;
    Ok(item)
}

/// Serialize a Dictionary. Re-parsing the output yields an equal dictionary.
pub fn serialize_dictionary(dict: &Dictionary) -> Result<String, SignatureError> {
    let mut out = String::new();
    for (i, (key, member)) in dict.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        serialize_key(key, &mut out)?;
        match member {
            // A boolean true member value serializes as the bare key plus parameters.
            Member::Item(item) if item.value == BareItem::Boolean(true) => {
                serialize_parameters(&item.params, &mut out)?;
            }
            Member::Item(item) => {
                out.push('=');
                serialize_item_into(item, &mut out)?;
            }
            Member::InnerList(list) => {
                out.push('=');
                serialize_inner_list_into(list, &mut out)?;
            }
        }
    }
    Ok(out)
}

/// Serialize a List.
pub fn serialize_list(list: &[Member]) -> Result<String, SignatureError> {
    let mut out = String::new();
    for (i, member) in list.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match member {
            Member::Item(item) => serialize_item_into(item, &mut out)?,
            Member::InnerList(inner) => serialize_inner_list_into(inner, &mut out)?,
        }
    }
    Ok(out)
}

/// Serialize an Inner List, parentheses and list parameters included.
pub fn serialize_inner_list(list: &InnerList) -> Result<String, SignatureError> {
    let mut out = String::new();
    serialize_inner_list_into(list, &mut out)?;
    Ok(out)
}

/// Serialize a single Item with its parameters.
pub fn serialize_item(item: &Item) -> Result<String, SignatureError> {
    let mut out = String::new();
    serialize_item_into(item, &mut out)?;
    Ok(out)
}

fn serialize_inner_list_into(list: &InnerList, out: &mut String) -> Result<(), SignatureError> {
    out.push('(');
    for (i, item) in list.items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        serialize_item_into(item, out)?;
    }
    out.push(')');
    serialize_parameters(&list.params, out)
}

fn serialize_item_into(item: &Item, out: &mut String) -> Result<(), SignatureError> {
    serialize_bare_item(&item.value, out)?;
    serialize_parameters(&item.params, out)
}

/// Serialize parameters as `;key` or `;key=value` with no whitespace.
pub(crate) fn serialize_parameters(params: &Parameters, out: &mut String) -> Result<(), SignatureError> {
    for (key, value) in params {
        out.push(';');
        serialize_key(key, out)?;
        // Boolean true parameter values omit the `=value`.
        if *value != BareItem::Boolean(true) {
            out.push('=');
            serialize_bare_item(value, out)?;
        }
    }
    Ok(())
}

fn serialize_key(key: &str, out: &mut String) -> Result<(), SignatureError> {
    if !KEY.is_match(key) {
        return Err(SignatureError::InvalidConfig(format!("'{}' is not a valid structured field key", key)));
    }
    out.push_str(key);
    Ok(())
}

fn serialize_bare_item(value: &BareItem, out: &mut String) -> Result<(), SignatureError> {
    match value {
        BareItem::Integer(i) => {
            if *i > INTEGER_MAX_ABS || *i < -INTEGER_MAX_ABS {
                return Err(SignatureError::InvalidConfig(format!("integer {} exceeds 15 digits", i)));
            }
            write!(out, "{}", i).expect("writing to a String cannot fail");
        }
        BareItem::Decimal(thousandths) => {
            let integral = thousandths / 1000;
            if integral.abs() > DECIMAL_MAX_ABS_INTEGRAL {
                return Err(SignatureError::InvalidConfig(format!(
                    "decimal integral part {} exceeds 12 digits",
                    integral
                )));
            }
            if *thousandths < 0 {
                out.push('-');
            }
            let frac = (thousandths % 1000).abs();
            let mut frac_str = format!("{:03}", frac);
            while frac_str.len() > 1 && frac_str.ends_with('0') {
                frac_str.pop();
            }
            write!(out, "{}.{}", integral.abs(), frac_str).expect("writing to a String cannot fail");
        }
        BareItem::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '\\' | '"' => {
                        out.push('\\');
                        out.push(c);
                    }
                    ' '..='~' => out.push(c),
                    _ => {
                        return Err(SignatureError::InvalidConfig(format!(
                            "string contains non-ASCII character {:?}",
                            c
                        )))
                    }
                }
            }
            out.push('"');
        }
        BareItem::Token(t) => {
            if !TOKEN.is_match(t) {
                return Err(SignatureError::InvalidConfig(format!("'{}' is not a valid token", t)));
            }
            out.push_str(t);
        }
        BareItem::ByteSeq(bytes) => {
            out.push(':');
            out.push_str(&BASE64.encode(bytes));
            out.push(':');
        }
        BareItem::Boolean(b) => out.push_str(if *b {
            "?1"
        } else {
            "?0"
        }),
    }
    Ok(())
}

/// A strict, offset-tracking Structured Field parser over a single header value.
struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn err(&self, message: impl Into<String>) -> SignatureError {
        SignatureError::MalformedStructuredField {
            message: message.into(),
            offset: self.pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn discard_sp(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn discard_ows(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    /// Require that only trailing SP remains.
    fn finish(&mut self) -> Result<(), SignatureError> {
        self.discard_sp();
        if !self.eof() {
            return Err(self.err("trailing characters after value"));
        }
        Ok(())
    }

    fn parse_dictionary(&mut self) -> Result<Dictionary, SignatureError> {
        let mut dict = Dictionary::new();
        if self.eof() {
            return Ok(dict);
        }
        loop {
            let key = self.parse_key()?;
            let member = if self.peek() == Some(b'=') {
                self.bump();
                self.parse_member()?
            } else {
                // A bare key is boolean true, but may still carry parameters.
                Member::Item(Item {
                    value: BareItem::Boolean(true),
                    params: self.parse_parameters()?,
                })
            };
            dict.insert(key, member);

            self.discard_ows();
            if self.eof() {
                return Ok(dict);
            }
            if self.bump() != Some(b',') {
                self.pos -= 1;
                return Err(self.err("expected ',' between dictionary members"));
            }
            self.discard_ows();
            if self.eof() {
                return Err(self.err("trailing ',' at end of dictionary"));
            }
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Member>, SignatureError> {
        let mut list = Vec::new();
        if self.eof() {
            return Ok(list);
        }
        loop {
            list.push(self.parse_member()?);
            self.discard_ows();
            if self.eof() {
                return Ok(list);
            }
            if self.bump() != Some(b',') {
                self.pos -= 1;
                return Err(self.err("expected ',' between list members"));
            }
            self.discard_ows();
            if self.eof() {
                return Err(self.err("trailing ',' at end of list"));
            }
        }
    }

    fn parse_member(&mut self) -> Result<Member, SignatureError> {
        if self.peek() == Some(b'(') {
            Ok(Member::InnerList(self.parse_inner_list()?))
        } else {
            Ok(Member::Item(self.parse_item()?))
        }
    }

    fn parse_inner_list(&mut self) -> Result<InnerList, SignatureError> {
        if self.bump() != Some(b'(') {
            self.pos -= 1;
            return Err(self.err("expected '(' to open an inner list"));
        }
        let mut items = Vec::new();
        loop {
            self.discard_sp();
            match self.peek() {
                Some(b')') => {
                    self.bump();
                    return Ok(InnerList {
                        items,
                        params: self.parse_parameters()?,
                    });
                }
                Some(_) => {
                    items.push(self.parse_item()?);
                    // Items must be separated by SP or terminated by ')'.
                    match self.peek() {
                        Some(b' ') | Some(b')') => {}
                        _ => return Err(self.err("expected ' ' or ')' after inner list item")),
                    }
                }
                None => return Err(self.err("unterminated inner list")),
            }
        }
    }

    fn parse_item(&mut self) -> Result<Item, SignatureError> {
        let value = self.parse_bare_item()?;
        let params = self.parse_parameters()?;
        Ok(Item {
            value,
            params,
        })
    }

    fn parse_parameters(&mut self) -> Result<Parameters, SignatureError> {
        let mut params = Parameters::new();
        while self.peek() == Some(b';') {
            self.bump();
            self.discard_sp();
            let key = self.parse_key()?;
            let value = if self.peek() == Some(b'=') {
                self.bump();
                self.parse_bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            // Last occurrence wins, keeping the first position.
            if let Some(entry) = params.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
            } else {
                params.push((key, value));
            }
        }
        Ok(params)
    }

    fn parse_key(&mut self) -> Result<String, SignatureError> {
        match self.peek() {
            Some(c) if c.is_ascii_lowercase() || c == b'*' => {}
            _ => return Err(self.err("key must begin with lowercase alpha or '*'")),
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, b'_' | b'-' | b'.' | b'*') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn parse_bare_item(&mut self) -> Result<BareItem, SignatureError> {
        match self.peek() {
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            Some(b'"') => self.parse_string(),
            Some(c) if c.is_ascii_alphabetic() || c == b'*' => self.parse_token(),
            Some(b':') => self.parse_byte_seq(),
            Some(b'?') => self.parse_boolean(),
            _ => Err(self.err("expected a bare item")),
        }
    }

    fn parse_number(&mut self) -> Result<BareItem, SignatureError> {
        let negative = self.peek() == Some(b'-');
        if negative {
            self.bump();
        }
        let int_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let int_digits = self.pos - int_start;
        if int_digits == 0 {
            return Err(self.err("expected a digit"));
        }

        if self.peek() == Some(b'.') {
            if int_digits > 12 {
                return Err(self.err("decimal integral part exceeds 12 digits"));
            }
            self.bump();
            let frac_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
            let frac_digits = self.pos - frac_start;
            if frac_digits == 0 {
                return Err(self.err("decimal has no fractional digits"));
            }
            if frac_digits > 3 {
                return Err(self.err("decimal fraction exceeds 3 digits"));
            }
            let integral: i64 = digits_to_i64(&self.input[int_start..int_start + int_digits]);
            let mut frac: i64 = digits_to_i64(&self.input[frac_start..frac_start + frac_digits]);
            for _ in frac_digits..3 {
                frac *= 10;
            }
            let magnitude = integral * 1000 + frac;
            Ok(BareItem::Decimal(if negative {
                -magnitude
            } else {
                magnitude
            }))
        } else {
            if int_digits > 15 {
                return Err(self.err("integer exceeds 15 digits"));
            }
            let magnitude = digits_to_i64(&self.input[int_start..int_start + int_digits]);
            Ok(BareItem::Integer(if negative {
                -magnitude
            } else {
                magnitude
            }))
        }
    }

    fn parse_string(&mut self) -> Result<BareItem, SignatureError> {
        self.bump(); // opening '"'
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(b'"') => return Ok(BareItem::String(value)),
                Some(b'\\') => match self.bump() {
                    Some(c @ (b'"' | b'\\')) => value.push(c as char),
                    Some(_) => {
                        self.pos -= 1;
                        return Err(self.err("only '\\' and '\"' may be backslash-escaped"));
                    }
                    None => return Err(self.err("unterminated string")),
                },
                Some(c) if (0x20..=0x7e).contains(&c) => value.push(c as char),
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.err("string contains a non-ASCII or control byte"));
                }
                None => return Err(self.err("unterminated string")),
            }
        }
    }

    fn parse_token(&mut self) -> Result<BareItem, SignatureError> {
        let start = self.pos;
        self.bump(); // leading alpha or '*', checked by the dispatcher
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric()
                || matches!(c, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' | b':' | b'/')
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(BareItem::Token(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()))
    }

    fn parse_byte_seq(&mut self) -> Result<BareItem, SignatureError> {
        self.bump(); // opening ':'
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != b':') {
            self.pos += 1;
        }
        if self.bump() != Some(b':') {
            return Err(self.err("unterminated byte sequence"));
        }
        let encoded = &self.input[start..self.pos - 1];
        match BASE64.decode(encoded) {
            Ok(bytes) => Ok(BareItem::ByteSeq(bytes)),
            Err(_) => {
                self.pos = start;
                Err(self.err("invalid base64 in byte sequence"))
            }
        }
    }

    fn parse_boolean(&mut self) -> Result<BareItem, SignatureError> {
        self.bump(); // '?'
        match self.bump() {
            Some(b'0') => Ok(BareItem::Boolean(false)),
            Some(b'1') => Ok(BareItem::Boolean(true)),
            _ => {
                self.pos -= 1;
                Err(self.err("expected '0' or '1' after '?'"))
            }
        }
    }
}

/// Convert a validated run of at most 15 ASCII digits.
fn digits_to_i64(digits: &[u8]) -> i64 {
    let mut value: i64 = 0;
    for d in digits {
        value = value * 10 + i64::from(d - b'0');
    }
    value
}
