//! Encoding and decoding of the `Signature-Input` and `Signature` headers.
//!
//! Both headers are Structured Field Dictionaries keyed by a caller-chosen label.
//! `Signature-Input` maps each label to an Inner List of covered component identifiers with
//! the signature parameters attached; `Signature` maps the same label to a Byte Sequence of
//! raw signature octets. Several labels may coexist in one message, arriving in a single
//! header value or spread over repeated header lines.

use {
    crate::{
        sfv::{self, BareItem, InnerList, Item, Member},
        SignatureError,
    },
    http::header::{HeaderMap, HeaderValue},
};

/// Name of the header carrying covered components and signature parameters per label.
pub const SIGNATURE_INPUT: &str = "signature-input";

/// Name of the header carrying the signature octets per label.
pub const SIGNATURE: &str = "signature";

/// The parsed `Signature-Input` header: an ordered mapping from label to the covered
/// component list with its signature parameters.
#[derive(Clone, Debug, Default)]
pub struct SignatureInput {
    members: Vec<(String, InnerList)>,
}

impl SignatureInput {
    /// Parse the `Signature-Input` header(s) of a message.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, SignatureError> {
        let raw = collect_header(headers, SIGNATURE_INPUT)?;
        let dict = sfv::parse_dictionary(&raw)?;

        let mut members = Vec::with_capacity(dict.len());
        for (label, member) in dict.iter() {
            match member {
                Member::InnerList(list) => members.push((label.to_string(), list.clone())),
                Member::Item(_) => {
                    return Err(SignatureError::MalformedComponent(format!(
                        "'{}' member '{}' is not an inner list",
                        SIGNATURE_INPUT, label
                    )))
                }
            }
        }
        Ok(SignatureInput {
            members,
        })
    }

    /// The covered component list and signature parameters recorded under `label`.
    pub fn get(&self, label: &str) -> Option<&InnerList> {
        self.members.iter().find(|(l, _)| l == label).map(|(_, list)| list)
    }

    /// The first label present, with its inner list.
    pub fn first(&self) -> Option<(&str, &InnerList)> {
        self.members.first().map(|(l, list)| (l.as_str(), list))
    }

    /// Labels, in the order they appear in the header.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(l, _)| l.as_str())
    }
}

/// The parsed `Signature` header: an ordered mapping from label to raw signature octets.
#[derive(Clone, Debug, Default)]
pub struct SignatureHeader {
    members: Vec<(String, Vec<u8>)>,
}

impl SignatureHeader {
    /// Parse the `Signature` header(s) of a message.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, SignatureError> {
        let raw = collect_header(headers, SIGNATURE)?;
        let dict = sfv::parse_dictionary(&raw)?;

        let mut members = Vec::with_capacity(dict.len());
        for (label, member) in dict.iter() {
            match member {
                Member::Item(Item {
                    value: BareItem::ByteSeq(bytes),
                    params,
                }) if params.is_empty() => members.push((label.to_string(), bytes.clone())),
                _ => {
                    return Err(SignatureError::MalformedComponent(format!(
                        "'{}' member '{}' is not a bare byte sequence",
                        SIGNATURE, label
                    )))
                }
            }
        }
        Ok(SignatureHeader {
            members,
        })
    }

    /// The signature octets recorded under `label`.
    pub fn get(&self, label: &str) -> Option<&[u8]> {
        self.members.iter().find(|(l, _)| l == label).map(|(_, sig)| sig.as_slice())
    }

    /// Labels, in the order they appear in the header.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(l, _)| l.as_str())
    }
}

/// Serialize a single dictionary member for one of the signature headers.
pub(crate) fn serialize_member(label: &str, member: Member) -> Result<String, SignatureError> {
    let mut dict = sfv::Dictionary::new();
    dict.insert(label.to_string(), member);
    sfv::serialize_dictionary(&dict)
}

/// Add a signed label to a message, merging with any `Signature-Input` and `Signature`
/// values already present so each header remains a single comma-separated dictionary.
pub fn attach_signature(
    headers: &mut HeaderMap,
    signature_input: HeaderValue,
    signature: HeaderValue,
) -> Result<(), SignatureError> {
    merge_into(headers, SIGNATURE_INPUT, signature_input)?;
    merge_into(headers, SIGNATURE, signature)
}

fn merge_into(headers: &mut HeaderMap, name: &'static str, addition: HeaderValue) -> Result<(), SignatureError> {
    let existing: Vec<String> = headers
        .get_all(name)
        .iter()
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| SignatureError::MalformedComponent(format!("header '{}' contains non-ASCII bytes", name)))
        })
        .collect::<Result<_, _>>()?;

    if existing.is_empty() {
        headers.insert(name, addition);
        return Ok(());
    }

    let addition = addition
        .to_str()
        .map_err(|_| SignatureError::MalformedComponent(format!("header '{}' contains non-ASCII bytes", name)))?;
    let merged = format!("{}, {}", existing.join(", "), addition);
    headers.insert(name, HeaderValue::from_str(&merged).expect("merged ASCII header values remain ASCII"));
    Ok(())
}

fn collect_header(headers: &HeaderMap, name: &'static str) -> Result<String, SignatureError> {
    let mut values = Vec::new();
    for value in headers.get_all(name) {
        let s = value.to_str().map_err(|_| {
            SignatureError::MalformedComponent(format!("header '{}' contains non-ASCII bytes", name))
        })?;
        values.push(s.trim_matches([' ', '\t']).to_string());
    }
    if values.is_empty() {
        return Err(SignatureError::MissingSignatureHeaders(format!("'{}' header is not present", name)));
    }
    Ok(values.join(", "))
}

#[cfg(test)]
mod tests {
    use super::{attach_signature, SignatureHeader, SignatureInput, SIGNATURE, SIGNATURE_INPUT};
    use crate::SignatureError;
    use http::header::{HeaderMap, HeaderValue};

    #[test_log::test]
    fn test_parse_both_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_INPUT,
            HeaderValue::from_static(r#"sig1=("@method" "@authority");created=1618884475;keyid="key1""#),
        );
        headers.insert(SIGNATURE, HeaderValue::from_static("sig1=:YWJjZGVmZ2g=:"));

        let input = SignatureInput::from_headers(&headers).unwrap();
        let list = input.get("sig1").unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(input.labels().collect::<Vec<_>>(), vec!["sig1"]);
        assert_eq!(input.first().unwrap().0, "sig1");

        let signatures = SignatureHeader::from_headers(&headers).unwrap();
        assert_eq!(signatures.get("sig1").unwrap(), b"abcdefgh");
        assert!(signatures.get("sig2").is_none());
    }

    #[test_log::test]
    fn test_multiple_header_lines_merge() {
        let mut headers = HeaderMap::new();
        headers.append(SIGNATURE_INPUT, HeaderValue::from_static(r#"sig1=("@method")"#));
        headers.append(SIGNATURE_INPUT, HeaderValue::from_static(r#"sig2=("@authority")"#));

        let input = SignatureInput::from_headers(&headers).unwrap();
        assert_eq!(input.labels().collect::<Vec<_>>(), vec!["sig1", "sig2"]);
    }

    #[test_log::test]
    fn test_missing_and_malformed() {
        let headers = HeaderMap::new();
        let err = SignatureInput::from_headers(&headers).unwrap_err();
        assert!(matches!(err, SignatureError::MissingSignatureHeaders(_)), "got {}", err);

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_INPUT, HeaderValue::from_static("sig1=42"));
        let err = SignatureInput::from_headers(&headers).unwrap_err();
        assert!(matches!(err, SignatureError::MalformedComponent(_)), "got {}", err);

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE, HeaderValue::from_static(r#"sig1="not bytes""#));
        let err = SignatureHeader::from_headers(&headers).unwrap_err();
        assert!(matches!(err, SignatureError::MalformedComponent(_)), "got {}", err);

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE, HeaderValue::from_static("sig1=:%%%:"));
        let err = SignatureHeader::from_headers(&headers).unwrap_err();
        assert!(
            matches!(
                err,
                SignatureError::MalformedStructuredField {
                    ..
                }
            ),
            "got {}",
            err
        );
    }

    #[test_log::test]
    fn test_attach_merges_existing() {
        let mut headers = HeaderMap::new();
        attach_signature(
            &mut headers,
            HeaderValue::from_static(r#"sig1=("@method")"#),
            HeaderValue::from_static("sig1=:YWJj:"),
        )
        .unwrap();
        attach_signature(
            &mut headers,
            HeaderValue::from_static(r#"sig2=("@authority")"#),
            HeaderValue::from_static("sig2=:ZGVm:"),
        )
        .unwrap();

        assert_eq!(
            headers.get(SIGNATURE_INPUT).unwrap(),
            r#"sig1=("@method"), sig2=("@authority")"#
        );
        assert_eq!(headers.get(SIGNATURE).unwrap(), "sig1=:YWJj:, sig2=:ZGVm:");

        let signatures = SignatureHeader::from_headers(&headers).unwrap();
        assert_eq!(signatures.get("sig1").unwrap(), b"abc");
        assert_eq!(signatures.get("sig2").unwrap(), b"def");
    }
}
