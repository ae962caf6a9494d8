//! Canonicalization functionality for signature generation and validation.
//!
//! This covers component identifiers, the resolution of derived and header components into
//! their canonical string values, and the assembly of the signature base -- the exact byte
//! string fed to the cryptographic primitive. Both peers must produce identical bytes here
//! despite differences in header representation, ordering, and folding.
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions.

use {
    crate::{
        header::SIGNATURE,
        sfv::{self, BareItem, InnerList, Item, Parameters},
        SignatureError,
    },
    http::{header::HeaderMap, Method, StatusCode, Uri},
    log::trace,
    std::fmt::{Display, Formatter, Result as FmtResult},
};

/// Derived component for the request method.
const AT_METHOD: &str = "@method";

/// Derived component for the full effective request URI.
const AT_TARGET_URI: &str = "@target-uri";

/// Derived component for the request authority.
const AT_AUTHORITY: &str = "@authority";

/// Derived component for the request scheme.
const AT_SCHEME: &str = "@scheme";

/// Derived component for the request target as it appears in the request line.
const AT_REQUEST_TARGET: &str = "@request-target";

/// Derived component for the request path.
const AT_PATH: &str = "@path";

/// Derived component for the raw query string.
const AT_QUERY: &str = "@query";

/// Derived component for a single query parameter, selected by the `name` parameter.
const AT_QUERY_PARAM: &str = "@query-param";

/// Derived component for the response status code.
const AT_STATUS: &str = "@status";

/// Derived component for a signature carried on the associated request, selected by `key`.
const AT_REQUEST_RESPONSE: &str = "@request-response";

/// Key of the final signature base line.
const AT_SIGNATURE_PARAMS: &str = "@signature-params";

/// All recognized derived component names.
const DERIVED_COMPONENTS: [&str; 10] = [
    AT_METHOD,
    AT_TARGET_URI,
    AT_AUTHORITY,
    AT_SCHEME,
    AT_REQUEST_TARGET,
    AT_PATH,
    AT_QUERY,
    AT_QUERY_PARAM,
    AT_STATUS,
    AT_REQUEST_RESPONSE,
];

/// Identifier parameter: re-serialize the value as a Structured Field.
const PARAM_SF: &str = "sf";

/// Identifier parameter: select a single member of a Dictionary-valued header.
const PARAM_KEY: &str = "key";

/// Identifier parameter: the query parameter name for [`@query-param`](AT_QUERY_PARAM).
const PARAM_NAME: &str = "name";

/// Identifier parameter: resolve against the associated request instead of the response.
const PARAM_REQ: &str = "req";

/// Identifies one covered component of a message: a lowercase header field name or a
/// `@`-prefixed derived component, plus its identifier parameters.
///
/// Two identifiers are equal when their names and their full parameter sets are equal,
/// regardless of parameter order.
#[derive(Clone, Debug)]
pub struct ComponentIdentifier {
    name: String,
    params: Parameters,
}

impl ComponentIdentifier {
    /// Create an identifier from a header field name or derived component name.
    ///
    /// Header names are lowercased. Derived names (starting with `@`) must be one of the
    /// recognized derived components.
    pub fn new(name: &str) -> Result<Self, SignatureError> {
        let name = name.to_ascii_lowercase();
        if let Err(msg) = validate_component_name(&name) {
            return Err(SignatureError::InvalidConfig(msg));
        }
        Ok(ComponentIdentifier {
            name,
            params: Parameters::new(),
        })
    }

    /// Create a `@query-param` identifier for the given query parameter name.
    pub fn query_param(name: &str) -> Result<Self, SignatureError> {
        Ok(ComponentIdentifier::new(AT_QUERY_PARAM)?.with_name(name))
    }

    /// Re-serialize the component value as a Structured Field before it enters the base.
    pub fn with_sf(mut self) -> Self {
        self.set_param(PARAM_SF, BareItem::Boolean(true));
        self
    }

    /// Select a single member of a Dictionary-valued header.
    pub fn with_key(mut self, key: &str) -> Self {
        self.set_param(PARAM_KEY, BareItem::String(key.to_string()));
        self
    }

    /// Resolve this component from the associated request when signing or verifying a
    /// response.
    pub fn with_req(mut self) -> Self {
        self.set_param(PARAM_REQ, BareItem::Boolean(true));
        self
    }

    fn with_name(mut self, name: &str) -> Self {
        self.set_param(PARAM_NAME, BareItem::String(name.to_string()));
        self
    }

    fn set_param(&mut self, key: &str, value: BareItem) {
        if let Some(entry) = self.params.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.params.push((key.to_string(), value));
        }
    }

    /// Rebuild an identifier from its wire form inside `Signature-Input`.
    ///
    /// Unlike [new](Self::new), this is strict about case: an uppercase name is rejected
    /// rather than folded, since the base must reproduce the peer's bytes exactly.
    pub(crate) fn from_item(item: &Item) -> Result<Self, SignatureError> {
        let BareItem::String(name) = &item.value else {
            return Err(SignatureError::MalformedComponent(
                "component identifier must be a quoted string".to_string(),
            ));
        };
        if let Err(msg) = validate_component_name(name) {
            return Err(SignatureError::MalformedComponent(msg));
        }
        for (key, value) in &item.params {
            let valid = match key.as_str() {
                PARAM_SF | PARAM_REQ => *value == BareItem::Boolean(true),
                PARAM_KEY | PARAM_NAME => matches!(value, BareItem::String(_)),
                _ => {
                    return Err(SignatureError::MalformedComponent(format!(
                        "unknown parameter '{}' on component \"{}\"",
                        key, name
                    )))
                }
            };
            if !valid {
                return Err(SignatureError::MalformedComponent(format!(
                    "parameter '{}' on component \"{}\" has the wrong type",
                    key, name
                )));
            }
        }
        Ok(ComponentIdentifier {
            name: name.clone(),
            params: item.params.clone(),
        })
    }

    /// The component name: a lowercase header field name or a `@`-prefixed derived name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire form of this identifier: a quoted string with its parameters.
    pub(crate) fn to_item(&self) -> Item {
        Item {
            value: BareItem::String(self.name.clone()),
            params: self.params.clone(),
        }
    }

    fn has_flag(&self, key: &str) -> bool {
        self.params.iter().any(|(k, v)| k == key && *v == BareItem::Boolean(true))
    }

    fn string_param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.as_string())
    }
}

impl Display for ComponentIdentifier {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match sfv::serialize_item(&self.to_item()) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "\"{}\"", self.name),
        }
    }
}

impl PartialEq for ComponentIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.params.len() == other.params.len()
            && self.params.iter().all(|(k, v)| other.params.iter().any(|(k2, v2)| k == k2 && v == v2))
    }
}

fn validate_component_name(name: &str) -> Result<(), String> {
    if name.starts_with('@') {
        if !DERIVED_COMPONENTS.contains(&name) {
            return Err(format!("unknown derived component '{}'", name));
        }
        return Ok(());
    }
    let valid_field_name = !name.is_empty()
        && name.bytes().all(|c| {
            c.is_ascii_lowercase()
                || c.is_ascii_digit()
                || matches!(c, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
        });
    if !valid_field_name {
        return Err(format!("'{}' is not a valid lowercase header field name", name));
    }
    Ok(())
}

/// An ordered list of covered components. The order determines the order of lines in the
/// signature base and is reflected literally in `Signature-Input`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields(Vec<ComponentIdentifier>);

impl Fields {
    /// An empty field list.
    pub fn new() -> Self {
        Fields::default()
    }

    /// Build a field list from plain header and derived component names, in order.
    pub fn from_names(names: &[&str]) -> Result<Self, SignatureError> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            fields.push(ComponentIdentifier::new(name)?);
        }
        Ok(Fields(fields))
    }

    /// Append an identifier.
    pub fn push(&mut self, identifier: ComponentIdentifier) {
        self.0.push(identifier);
    }

    /// Iterate the identifiers in order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentIdentifier> {
        self.0.iter()
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ComponentIdentifier> for Fields {
    fn from_iter<I: IntoIterator<Item = ComponentIdentifier>>(iter: I) -> Self {
        Fields(iter.into_iter().collect())
    }
}

/// A borrowed view over the signable parts of an HTTP request or response.
///
/// The view carries no body: message signatures cover headers and derived components only
/// (body integrity travels through a digest header, which is then covered like any other
/// header).
#[derive(Clone, Copy)]
pub struct Message<'a> {
    method: Option<&'a Method>,
    uri: Option<&'a Uri>,
    status: Option<StatusCode>,
    headers: &'a HeaderMap,
    request: Option<&'a Message<'a>>,
}

impl<'a> Message<'a> {
    /// View a request.
    pub fn request(parts: &'a http::request::Parts) -> Message<'a> {
        Message {
            method: Some(&parts.method),
            uri: Some(&parts.uri),
            status: None,
            headers: &parts.headers,
            request: None,
        }
    }

    /// View a response. Attach the request it answers with [with_request](Self::with_request)
    /// to resolve `req`-parameterized and `@request-response` components.
    pub fn response(parts: &'a http::response::Parts) -> Message<'a> {
        Message {
            method: None,
            uri: None,
            status: Some(parts.status),
            headers: &parts.headers,
            request: None,
        }
    }

    /// Associate the request this response answers.
    pub fn with_request(mut self, request: &'a Message<'a>) -> Message<'a> {
        self.request = Some(request);
        self
    }

    /// The message headers.
    pub fn headers(&self) -> &'a HeaderMap {
        self.headers
    }

    /// Resolve a component identifier against this message, producing its canonical string
    /// value for the signature base.
    pub fn resolve(&self, identifier: &ComponentIdentifier) -> Result<String, SignatureError> {
        let target = if identifier.has_flag(PARAM_REQ) {
            *self.request.ok_or_else(|| {
                SignatureError::MissingComponent(format!(
                    "no associated request to resolve {} against",
                    identifier
                ))
            })?
        } else {
            *self
        };

        if identifier.name().starts_with('@') {
            target.resolve_derived(identifier)
        } else {
            target.resolve_header(identifier)
        }
    }

    fn resolve_derived(&self, identifier: &ComponentIdentifier) -> Result<String, SignatureError> {
        match identifier.name() {
            AT_METHOD => Ok(self.require_method(AT_METHOD)?.as_str().to_ascii_uppercase()),
            AT_TARGET_URI => {
                let uri = self.require_uri(AT_TARGET_URI)?;
                let scheme = uri
                    .scheme_str()
                    .ok_or_else(|| missing(AT_TARGET_URI, "the request URI has no scheme"))?
                    .to_ascii_lowercase();
                let authority = self.authority_string(AT_TARGET_URI)?;
                let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
                Ok(format!("{}://{}{}", scheme, authority, path_and_query))
            }
            AT_AUTHORITY => self.authority_string(AT_AUTHORITY),
            AT_SCHEME => {
                let uri = self.require_uri(AT_SCHEME)?;
                let scheme =
                    uri.scheme_str().ok_or_else(|| missing(AT_SCHEME, "the request URI has no scheme"))?;
                Ok(scheme.to_ascii_lowercase())
            }
            AT_REQUEST_TARGET => {
                let uri = self.require_uri(AT_REQUEST_TARGET)?;
                Ok(uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string())
            }
            AT_PATH => {
                let uri = self.require_uri(AT_PATH)?;
                let path = uri.path();
                Ok(if path.is_empty() {
                    "/".to_string()
                } else {
                    path.to_string()
                })
            }
            AT_QUERY => {
                let uri = self.require_uri(AT_QUERY)?;
                Ok(format!("?{}", uri.query().unwrap_or("")))
            }
            AT_QUERY_PARAM => self.resolve_query_param(identifier),
            AT_STATUS => match self.status {
                Some(status) => Ok(status.as_str().to_string()),
                None => Err(missing(AT_STATUS, "only a response has a status code")),
            },
            AT_REQUEST_RESPONSE => self.resolve_request_response(identifier),
            other => Err(SignatureError::MalformedComponent(format!("unknown derived component '{}'", other))),
        }
    }

    fn require_method(&self, component: &str) -> Result<&Method, SignatureError> {
        self.method.ok_or_else(|| missing(component, "only a request has a method"))
    }

    fn require_uri(&self, component: &str) -> Result<&Uri, SignatureError> {
        self.uri.ok_or_else(|| missing(component, "only a request has a target URI"))
    }

    /// The lowercased host, with the port appended only when it is not the default for the
    /// scheme. Userinfo never appears: the `http` URI type exposes the host alone.
    fn authority_string(&self, component: &str) -> Result<String, SignatureError> {
        let uri = self.require_uri(component)?;
        let authority =
            uri.authority().ok_or_else(|| missing(component, "the request URI has no authority"))?;
        let host = authority.host().to_ascii_lowercase();
        Ok(match (authority.port_u16(), uri.scheme_str()) {
            (None, _) => host,
            (Some(443), Some("https")) | (Some(80), Some("http")) => host,
            (Some(port), _) => format!("{}:{}", host, port),
        })
    }

    fn resolve_query_param(&self, identifier: &ComponentIdentifier) -> Result<String, SignatureError> {
        let wanted = identifier.string_param(PARAM_NAME).ok_or_else(|| {
            SignatureError::MalformedComponent(format!("{} requires a '{}' parameter", AT_QUERY_PARAM, PARAM_NAME))
        })?;
        let uri = self.require_uri(AT_QUERY_PARAM)?;
        let query = uri.query().unwrap_or("");

        let mut found = None;
        let mut count = 0usize;
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if percent_decode(name)? == wanted {
                count += 1;
                found = Some(percent_decode(value)?);
            }
        }
        match count {
            1 => Ok(found.expect("count is 1")),
            0 => Err(missing(AT_QUERY_PARAM, &format!("query parameter '{}' is not present", wanted))),
            n => Err(missing(AT_QUERY_PARAM, &format!("query parameter '{}' occurs {} times", wanted, n))),
        }
    }

    /// The signature member of the associated request's `Signature` header, serialized as a
    /// byte sequence item. This lets a response signature cover the request signature it
    /// answers.
    fn resolve_request_response(&self, identifier: &ComponentIdentifier) -> Result<String, SignatureError> {
        let key = identifier.string_param(PARAM_KEY).ok_or_else(|| {
            SignatureError::MalformedComponent(format!("{} requires a '{}' parameter", AT_REQUEST_RESPONSE, PARAM_KEY))
        })?;
        let request = self
            .request
            .ok_or_else(|| missing(AT_REQUEST_RESPONSE, "no associated request is available"))?;

        let mut raw = Vec::new();
        for value in request.headers.get_all(SIGNATURE) {
            let s = value.to_str().map_err(|_| {
                SignatureError::MalformedComponent("request 'signature' header contains non-ASCII bytes".to_string())
            })?;
            raw.push(s.trim_matches([' ', '\t']).to_string());
        }
        if raw.is_empty() {
            return Err(missing(AT_REQUEST_RESPONSE, "the request has no 'signature' header"));
        }

        let dict = sfv::parse_dictionary(&raw.join(", ")).map_err(|e| {
            SignatureError::MalformedComponent(format!("request 'signature' header is not a dictionary: {}", e))
        })?;
        match dict.get(key) {
            Some(sfv::Member::Item(
                item @ Item {
                    value: BareItem::ByteSeq(_),
                    ..
                },
            )) => sfv::serialize_item(item)
                .map_err(|e| SignatureError::MalformedComponent(format!("request signature '{}': {}", key, e))),
            Some(_) => Err(SignatureError::MalformedComponent(format!(
                "request signature '{}' is not a byte sequence",
                key
            ))),
            None => Err(missing(AT_REQUEST_RESPONSE, &format!("the request carries no signature labeled '{}'", key))),
        }
    }

    fn resolve_header(&self, identifier: &ComponentIdentifier) -> Result<String, SignatureError> {
        let name = identifier.name();
        let mut values = Vec::new();
        for value in self.headers.get_all(name) {
            let s = value.to_str().map_err(|_| {
                SignatureError::MalformedComponent(format!("header '{}' contains non-ASCII bytes", name))
            })?;
            values.push(canonicalize_field_value(s));
        }
        if values.is_empty() {
            return Err(SignatureError::MissingComponent(format!("header '{}' is not present", name)));
        }
        let joined = values.join(", ");

        if let Some(key) = identifier.string_param(PARAM_KEY) {
            dictionary_member(&joined, key, name)
        } else if identifier.has_flag(PARAM_SF) {
            reserialize_structured(&joined, name)
        } else {
            Ok(joined)
        }
    }
}

/// Trim optional whitespace from both ends of a field value, and collapse any obs-fold
/// (line break plus padding) inside it to a single space.
fn canonicalize_field_value(value: &str) -> String {
    let trimmed = value.trim_matches([' ', '\t']);
    if !trimmed.contains(['\r', '\n']) {
        return trimmed.to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut whitespace = String::new();
    let mut folded = false;
    for c in trimmed.chars() {
        if matches!(c, ' ' | '\t' | '\r' | '\n') {
            whitespace.push(c);
            folded = folded || matches!(c, '\r' | '\n');
        } else {
            if !whitespace.is_empty() {
                if folded {
                    out.push(' ');
                } else {
                    out.push_str(&whitespace);
                }
                whitespace.clear();
                folded = false;
            }
            out.push(c);
        }
    }
    out
}

/// Parse a header value as a Structured Field and re-serialize it canonically. The concrete
/// type is not carried on the wire, so Dictionary, List, and Item are attempted in that
/// order.
fn reserialize_structured(value: &str, name: &str) -> Result<String, SignatureError> {
    let serialized = if let Ok(dict) = sfv::parse_dictionary(value) {
        sfv::serialize_dictionary(&dict)
    } else if let Ok(list) = sfv::parse_list(value) {
        sfv::serialize_list(&list)
    } else if let Ok(item) = sfv::parse_item(value) {
        sfv::serialize_item(&item)
    } else {
        return Err(SignatureError::MalformedComponent(format!(
            "header '{}' is not a parseable structured field",
            name
        )));
    };
    serialized.map_err(|e| SignatureError::MalformedComponent(format!("header '{}': {}", name, e)))
}

/// Extract and canonically serialize one member of a Dictionary-valued header.
fn dictionary_member(value: &str, key: &str, name: &str) -> Result<String, SignatureError> {
    let dict = sfv::parse_dictionary(value)
        .map_err(|e| SignatureError::MalformedComponent(format!("header '{}' is not a dictionary: {}", name, e)))?;
    let member = dict.get(key).ok_or_else(|| {
        SignatureError::MissingComponent(format!("dictionary key '{}' not found in header '{}'", key, name))
    })?;
    let serialized = match member {
        sfv::Member::Item(item) => sfv::serialize_item(item),
        sfv::Member::InnerList(list) => sfv::serialize_inner_list(list),
    };
    serialized.map_err(|e| SignatureError::MalformedComponent(format!("header '{}' member '{}': {}", name, key, e)))
}

fn missing(component: &str, detail: &str) -> SignatureError {
    SignatureError::MissingComponent(format!("{}: {}", component, detail))
}

fn percent_decode(value: &str) -> Result<String, SignatureError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(SignatureError::MalformedComponent(
                    "incomplete trailing escape % sequence".to_string(),
                ));
            }
            let hi = hex_digit(bytes[i + 1])?;
            let lo = hex_digit(bytes[i + 2])?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out)
        .map_err(|_| SignatureError::MalformedComponent("percent-decoded value is not valid UTF-8".to_string()))
}

fn hex_digit(c: u8) -> Result<u8, SignatureError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(SignatureError::MalformedComponent(format!(
            "illegal hex character in escape % pattern: {}",
            c as char
        ))),
    }
}

/// Assemble the signature base: one line per covered component, then the
/// `"@signature-params"` line carrying the serialized inner list. There is no newline after
/// the final line, and the inner list serialization here is the same one that goes into
/// `Signature-Input`.
pub fn build_signature_base(
    message: &Message<'_>,
    identifiers: &[ComponentIdentifier],
    params: &InnerList,
) -> Result<Vec<u8>, SignatureError> {
    let mut base = Vec::with_capacity(1024);
    for identifier in identifiers {
        let value = message.resolve(identifier)?;
        let serialized = sfv::serialize_item(&identifier.to_item())?;
        base.extend(serialized.as_bytes());
        base.extend(b": ");
        base.extend(value.as_bytes());
        base.push(b'\n');
    }
    base.extend(format!("\"{}\": ", AT_SIGNATURE_PARAMS).as_bytes());
    base.extend(sfv::serialize_inner_list(params)?.as_bytes());

    trace!("signature base:\n{}", String::from_utf8_lossy(&base));
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::{build_signature_base, canonicalize_field_value, percent_decode, ComponentIdentifier, Fields, Message};
    use crate::{
        sfv::{BareItem, InnerList},
        unittest::{get_request, post_request, response_parts},
        SignatureError,
    };

    fn resolve_one(message: &Message<'_>, identifier: ComponentIdentifier) -> Result<String, SignatureError> {
        message.resolve(&identifier)
    }

    #[test_log::test]
    fn test_derived_components() {
        let parts = get_request("https://User@Example.COM:443/foo%20bar?a=1&b=2");
        let message = Message::request(&parts);

        let cases = [
            ("@method", "GET"),
            ("@target-uri", "https://example.com/foo%20bar?a=1&b=2"),
            ("@authority", "example.com"),
            ("@scheme", "https"),
            ("@request-target", "/foo%20bar?a=1&b=2"),
            ("@path", "/foo%20bar"),
            ("@query", "?a=1&b=2"),
        ];
        for (name, expected) in cases {
            let resolved = resolve_one(&message, ComponentIdentifier::new(name).unwrap()).unwrap();
            assert_eq!(resolved, expected, "component {}", name);
        }
    }

    #[test_log::test]
    fn test_non_default_port_kept() {
        let parts = get_request("https://example.com:8443/x");
        let message = Message::request(&parts);
        let resolved = resolve_one(&message, ComponentIdentifier::new("@authority").unwrap()).unwrap();
        assert_eq!(resolved, "example.com:8443");
    }

    #[test_log::test]
    fn test_empty_query() {
        let parts = get_request("https://example.com/x");
        let message = Message::request(&parts);
        let resolved = resolve_one(&message, ComponentIdentifier::new("@query").unwrap()).unwrap();
        assert_eq!(resolved, "?");
    }

    #[test_log::test]
    fn test_query_param() {
        let parts = get_request("https://example.com/x?a=1&b=2");
        let message = Message::request(&parts);

        let resolved = resolve_one(&message, ComponentIdentifier::query_param("a").unwrap()).unwrap();
        assert_eq!(resolved, "1");

        let err = resolve_one(&message, ComponentIdentifier::query_param("c").unwrap()).unwrap_err();
        assert!(matches!(err, SignatureError::MissingComponent(_)), "got {}", err);

        // A repeated parameter cannot be covered unambiguously.
        let parts = get_request("https://example.com/x?a=1&a=2");
        let message = Message::request(&parts);
        let err = resolve_one(&message, ComponentIdentifier::query_param("a").unwrap()).unwrap_err();
        assert!(matches!(err, SignatureError::MissingComponent(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_query_param_percent_decoding() {
        let parts = get_request("https://example.com/x?na%6De=p%20q");
        let message = Message::request(&parts);
        let resolved = resolve_one(&message, ComponentIdentifier::query_param("name").unwrap()).unwrap();
        assert_eq!(resolved, "p q");
    }

    #[test_log::test]
    fn test_percent_decode_errors() {
        assert!(percent_decode("abc%2").is_err());
        assert!(percent_decode("abc%0J").is_err());
        assert_eq!(percent_decode("a%2Fb").unwrap(), "a/b");
    }

    #[test_log::test]
    fn test_header_joining_and_trimming() {
        let parts = post_request();
        let message = Message::request(&parts);

        let resolved = resolve_one(&message, ComponentIdentifier::new("x-list").unwrap()).unwrap();
        assert_eq!(resolved, "one, two, three");

        let resolved = resolve_one(&message, ComponentIdentifier::new("content-type").unwrap()).unwrap();
        assert_eq!(resolved, "application/json");

        let err = resolve_one(&message, ComponentIdentifier::new("x-absent").unwrap()).unwrap_err();
        assert!(matches!(err, SignatureError::MissingComponent(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_obs_fold_collapse() {
        assert_eq!(canonicalize_field_value("  plain value "), "plain value");
        assert_eq!(canonicalize_field_value("line one \r\n\t line two"), "line one line two");
        assert_eq!(canonicalize_field_value("keeps  internal   spaces"), "keeps  internal   spaces");
    }

    #[test_log::test]
    fn test_sf_reserialization() {
        let parts = post_request();
        let message = Message::request(&parts);

        // Whitespace in the raw value does not survive canonical re-serialization.
        let resolved = resolve_one(&message, ComponentIdentifier::new("x-dict").unwrap().with_sf()).unwrap();
        assert_eq!(resolved, "a=1, b=2;x;y=:NDQ=:");

        let err = resolve_one(&message, ComponentIdentifier::new("x-unstructured").unwrap().with_sf()).unwrap_err();
        assert!(matches!(err, SignatureError::MalformedComponent(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_dictionary_key_selection() {
        let parts = post_request();
        let message = Message::request(&parts);

        let resolved = resolve_one(&message, ComponentIdentifier::new("x-dict").unwrap().with_key("a")).unwrap();
        assert_eq!(resolved, "1");
        let resolved = resolve_one(&message, ComponentIdentifier::new("x-dict").unwrap().with_key("b")).unwrap();
        assert_eq!(resolved, "2;x;y=:NDQ=:");

        let err = resolve_one(&message, ComponentIdentifier::new("x-dict").unwrap().with_key("zz")).unwrap_err();
        assert!(matches!(err, SignatureError::MissingComponent(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_req_components_and_status() {
        let request_parts = post_request();
        let request = Message::request(&request_parts);
        let parts = response_parts(200);
        let response = Message::response(&parts).with_request(&request);

        let resolved = resolve_one(&response, ComponentIdentifier::new("@status").unwrap()).unwrap();
        assert_eq!(resolved, "200");

        let resolved = resolve_one(&response, ComponentIdentifier::new("@method").unwrap().with_req()).unwrap();
        assert_eq!(resolved, "POST");

        let err = resolve_one(&response, ComponentIdentifier::new("@method").unwrap()).unwrap_err();
        assert!(matches!(err, SignatureError::MissingComponent(_)), "got {}", err);

        let err = resolve_one(&request, ComponentIdentifier::new("@status").unwrap()).unwrap_err();
        assert!(matches!(err, SignatureError::MissingComponent(_)), "got {}", err);
    }

    #[test_log::test]
    fn test_identifier_equality_ignores_parameter_order() {
        let a = ComponentIdentifier::new("x-dict").unwrap().with_sf().with_key("a");
        let b = ComponentIdentifier::new("x-dict").unwrap().with_key("a").with_sf();
        assert_eq!(a, b);

        let c = ComponentIdentifier::new("x-dict").unwrap().with_key("a");
        assert_ne!(a, c);
        assert_ne!(ComponentIdentifier::new("@method").unwrap(), ComponentIdentifier::new("@path").unwrap());
    }

    #[test_log::test]
    fn test_unknown_names_rejected() {
        assert!(ComponentIdentifier::new("@bogus").is_err());
        assert!(ComponentIdentifier::new("spaced name").is_err());
        assert!(Fields::from_names(&["@method", "@nope"]).is_err());
    }

    #[test_log::test]
    fn test_signature_base_format() {
        let parts = get_request("https://example.com/foo");
        let message = Message::request(&parts);
        let identifiers = vec![ComponentIdentifier::new("@method").unwrap()];
        let params = InnerList {
            items: identifiers.iter().map(|id| id.to_item()).collect(),
            params: vec![
                ("created".to_string(), BareItem::Integer(1618884475)),
                ("keyid".to_string(), BareItem::String("key1".to_string())),
                ("alg".to_string(), BareItem::String("hmac-sha256".to_string())),
            ],
        };
        let base = build_signature_base(&message, &identifiers, &params).unwrap();
        assert_eq!(
            String::from_utf8(base).unwrap(),
            "\"@method\": GET\n\"@signature-params\": (\"@method\");created=1618884475;keyid=\"key1\";alg=\"hmac-sha256\""
        );
    }

    #[test_log::test]
    fn test_base_is_deterministic_and_order_sensitive() {
        let parts = get_request("https://example.com/foo");
        let message = Message::request(&parts);

        let forward = vec![
            ComponentIdentifier::new("@method").unwrap(),
            ComponentIdentifier::new("@authority").unwrap(),
        ];
        let reverse: Vec<_> = forward.iter().rev().cloned().collect();
        let params = InnerList::default();

        let once = build_signature_base(&message, &forward, &params).unwrap();
        let twice = build_signature_base(&message, &forward, &params).unwrap();
        assert_eq!(once, twice);

        let reversed = build_signature_base(&message, &reverse, &params).unwrap();
        assert_ne!(once, reversed);
    }

    #[test_log::test]
    fn test_base_ignores_unrelated_headers() {
        let mut first = get_request("https://example.com/foo");
        first.headers.insert("x-covered", "yes".parse().unwrap());
        first.headers.insert("x-noise", "one".parse().unwrap());

        let mut second = get_request("https://example.com/foo");
        second.headers.insert("x-other-noise", "two".parse().unwrap());
        second.headers.insert("x-covered", "yes".parse().unwrap());

        let identifiers = vec![
            ComponentIdentifier::new("@method").unwrap(),
            ComponentIdentifier::new("x-covered").unwrap(),
        ];
        let params = InnerList::default();
        let first_base = build_signature_base(&Message::request(&first), &identifiers, &params).unwrap();
        let second_base = build_signature_base(&Message::request(&second), &identifiers, &params).unwrap();
        assert_eq!(first_base, second_base);
    }
}
